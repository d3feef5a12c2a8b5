//! Serializable settings for building a [`Flare`](crate::Flare).

use std::{collections::BTreeMap, time::Duration};

use http::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt as _, Snafu};

use crate::base_url::InvalidBaseUrl;

/// Settings loadable from any serde format.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlareSettings {
    /// The base URL every relative path is resolved against.
    pub base_url: String,
    /// The per-call timeout, in milliseconds.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Headers added to every request unless already set.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// If true, every exchange is logged.
    #[serde(default)]
    pub log_enabled: bool,
    /// TLS overrides for the bundled transport.
    #[serde(default)]
    pub tls: TlsSettings,
}

impl FlareSettings {
    /// The timeout as a [`Duration`].
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// The headers as a typed [`HeaderMap`].
    ///
    /// # Errors
    ///
    /// Returns an error if a name or value is not legal on the wire.
    pub fn header_map(&self) -> Result<HeaderMap, SettingsError> {
        let mut map = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in &self.headers {
            let header_name =
                HeaderName::from_bytes(name.as_bytes()).context(HeaderNameSnafu { name })?;
            let header_value = HeaderValue::from_str(value).context(HeaderValueSnafu { name })?;
            map.insert(header_name, header_value);
        }
        Ok(map)
    }
}

/// Certificate and hostname verification overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsSettings {
    /// Accept any server certificate.
    pub accept_invalid_certs: bool,
    /// Skip hostname verification.
    pub accept_invalid_hostnames: bool,
    /// Extra trusted root certificates, PEM encoded.
    pub root_certificates_pem: Vec<String>,
}

/// Errors applying [`FlareSettings`].
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    /// The base URL is invalid.
    #[snafu(display("Invalid base URL in settings"))]
    BaseUrl {
        /// The underlying error.
        source: InvalidBaseUrl,
    },
    /// A header name is invalid.
    #[snafu(display("Invalid header name `{name}` in settings"))]
    HeaderName {
        /// The header name.
        name: String,
        /// The underlying error.
        source: http::header::InvalidHeaderName,
    },
    /// A header value is invalid.
    #[snafu(display("Invalid value for header `{name}` in settings"))]
    HeaderValue {
        /// The header name.
        name: String,
        /// The underlying error.
        source: http::header::InvalidHeaderValue,
    },
}

impl crate::Error for SettingsError {
    fn is_retryable(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_minimal() {
        let settings: FlareSettings =
            serde_json::from_str(r#"{"base_url":"https://api.test"}"#).unwrap();

        assert_eq!(settings.base_url, "https://api.test");
        assert_eq!(settings.timeout(), None);
        assert!(!settings.log_enabled);
        assert_eq!(settings.tls, TlsSettings::default());
    }

    #[test]
    fn test_deserialize_full() {
        let settings: FlareSettings = serde_json::from_str(
            r#"{
                "base_url": "https://api.test",
                "timeout_ms": 1500,
                "headers": {"X-Client": "flare", "Accept": "application/json"},
                "log_enabled": true,
                "tls": {"accept_invalid_hostnames": true}
            }"#,
        )
        .unwrap();

        assert_eq!(settings.timeout(), Some(Duration::from_millis(1500)));
        assert!(settings.tls.accept_invalid_hostnames);
        assert!(!settings.tls.accept_invalid_certs);

        let headers = settings.header_map().unwrap();
        assert_eq!(headers["x-client"], "flare");
        assert_eq!(headers["accept"], "application/json");
    }

    #[test]
    fn test_invalid_header() {
        let settings = FlareSettings {
            base_url: "https://api.test".to_owned(),
            headers: BTreeMap::from([("bad name".to_owned(), "v".to_owned())]),
            ..FlareSettings::default()
        };
        assert!(matches!(
            settings.header_map(),
            Err(SettingsError::HeaderName { .. })
        ));
    }
}
