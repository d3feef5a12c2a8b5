//! A validated base URL.
//!
//! [`BaseUrl`] is a newtype over [`Url`] that guarantees the URL has been
//! parsed and uses a scheme that can carry HTTP requests. It can be
//! constructed from common string and URL types via [`IntoBaseUrl`].

use std::convert::Infallible;

use serde::{Deserialize, Serialize};
use snafu::{ResultExt as _, Snafu, ensure};
use url::Url;

/// A validated base URL against which relative method paths are resolved.
///
/// Once constructed, it can be freely cloned and shared between methods
/// without re-validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseUrl(Url);

impl Serialize for BaseUrl {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.0.as_str())
    }
}

impl<'de> Deserialize<'de> for BaseUrl {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.into_base_url().map_err(serde::de::Error::custom)
    }
}

impl BaseUrl {
    /// Returns the inner [`Url`].
    #[must_use]
    pub fn as_url(&self) -> &Url {
        &self.0
    }

    /// Returns the URL as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Joins a relative path (already stripped of leading slashes) and an
    /// optional pre-encoded query string onto this base URL.
    pub(crate) fn join(&self, relative: &str, query: &str) -> String {
        let mut out = String::with_capacity(self.0.as_str().len() + relative.len() + query.len() + 2);
        out.push_str(self.0.scheme());
        out.push_str("://");
        if let Some(host) = self.0.host_str() {
            out.push_str(host);
        }
        if let Some(port) = self.0.port() {
            out.push(':');
            out.push_str(&port.to_string());
        }

        let base_path = self.0.path();
        out.push_str(base_path);
        if !relative.is_empty() {
            if !base_path.ends_with('/') {
                out.push('/');
            }
            out.push_str(relative);
        }

        let base_query = self.0.query().unwrap_or_default();
        match (base_query.is_empty(), query.is_empty()) {
            (true, true) => {}
            (false, true) => {
                out.push('?');
                out.push_str(base_query);
            }
            (true, false) => {
                out.push('?');
                out.push_str(query);
            }
            (false, false) => {
                out.push('?');
                out.push_str(base_query);
                out.push('&');
                out.push_str(query);
            }
        }
        out
    }
}

/// The error returned when a string cannot be used as a base URL.
#[derive(Debug, Snafu)]
pub enum InvalidBaseUrl {
    /// The URL could not be parsed.
    #[snafu(display("Failed to parse base URL"))]
    Parse {
        /// The underlying parse error.
        source: url::ParseError,
    },
    /// The URL does not use an HTTP scheme.
    #[snafu(display("Base URL must use http or https, found `{scheme}`"))]
    UnsupportedScheme {
        /// The scheme that was found.
        scheme: String,
    },
}

impl crate::Error for InvalidBaseUrl {
    fn is_retryable(&self) -> bool {
        false
    }
}

/// Conversion trait for types that can be turned into a [`BaseUrl`].
pub trait IntoBaseUrl {
    /// The error type returned if the conversion fails.
    type Error;

    /// Attempts to convert this value into a [`BaseUrl`].
    fn into_base_url(self) -> Result<BaseUrl, Self::Error>;
}

impl IntoBaseUrl for BaseUrl {
    type Error = Infallible;

    fn into_base_url(self) -> Result<BaseUrl, Self::Error> {
        Ok(self)
    }
}

impl IntoBaseUrl for Url {
    type Error = InvalidBaseUrl;

    fn into_base_url(self) -> Result<BaseUrl, Self::Error> {
        ensure!(
            matches!(self.scheme(), "http" | "https"),
            UnsupportedSchemeSnafu {
                scheme: self.scheme()
            }
        );
        Ok(BaseUrl(self))
    }
}

impl IntoBaseUrl for &str {
    type Error = InvalidBaseUrl;

    fn into_base_url(self) -> Result<BaseUrl, Self::Error> {
        Url::parse(self).context(ParseSnafu)?.into_base_url()
    }
}

impl IntoBaseUrl for String {
    type Error = InvalidBaseUrl;

    fn into_base_url(self) -> Result<BaseUrl, Self::Error> {
        self.as_str().into_base_url()
    }
}
