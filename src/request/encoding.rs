use std::borrow::Cow;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

/// Everything except RFC 3986 unreserved characters.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Percent-encodes a path value, query name or value, or form value unless
/// it is marked as already encoded.
pub(crate) fn encode_component(value: &str, encoded: bool) -> Cow<'_, str> {
    if encoded {
        Cow::Borrowed(value)
    } else {
        utf8_percent_encode(value, COMPONENT).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encodes_reserved_characters() {
        assert_eq!(encode_component("a b/c?d=e&f", false), "a%20b%2Fc%3Fd%3De%26f");
        assert_eq!(encode_component("safe-._~09AZ", false), "safe-._~09AZ");
        assert_eq!(encode_component("é", false), "%C3%A9");
    }

    #[test]
    fn test_encoded_values_pass_through() {
        assert_eq!(encode_component("a%20b/c", true), "a%20b/c");
    }
}
