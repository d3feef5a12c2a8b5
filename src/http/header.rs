use http::{HeaderName, HeaderValue};

use crate::request::Invocation;

/// A header name and value produced at call time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpHeader {
    /// The header name.
    pub name: String,
    /// The header value.
    pub value: String,
}

impl HttpHeader {
    /// Creates a header.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Returns `true` if both name and value are non-empty.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.name.is_empty() && !self.value.is_empty()
    }

    /// Converts into typed header parts, if both are legal on the wire.
    pub(crate) fn to_parts(&self) -> Option<(HeaderName, HeaderValue)> {
        if !self.is_valid() {
            return None;
        }
        let name = HeaderName::from_bytes(self.name.as_bytes()).ok()?;
        let value = HeaderValue::from_str(&self.value).ok()?;
        Some((name, value))
    }
}

/// Provides a header for each invocation of a method.
///
/// Returning `None`, or a header with an empty name or value, contributes
/// nothing.
pub trait DynamicHeader: Send + Sync {
    /// Produces the header for `invocation`.
    fn header(&self, invocation: &Invocation) -> Option<HttpHeader>;
}

impl<F> DynamicHeader for F
where
    F: Fn(&Invocation) -> Option<HttpHeader> + Send + Sync,
{
    fn header(&self, invocation: &Invocation) -> Option<HttpHeader> {
        self(invocation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validity() {
        assert!(HttpHeader::new("X-Token", "abc").to_parts().is_some());
        assert!(HttpHeader::new("", "abc").to_parts().is_none());
        assert!(HttpHeader::new("X-Token", "").to_parts().is_none());
        assert!(HttpHeader::new("bad header", "abc").to_parts().is_none());
    }
}
