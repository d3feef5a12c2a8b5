//! Converters between runtime argument values and wire representations.
//!
//! - [`StringConverter`] turns scalar arguments into text for path
//!   segments and headers.
//! - [`FormFieldConverter`] flattens arguments of any shape into
//!   [`FormField`]s for query strings and form bodies.
//! - [`BodyCodec`] serializes request bodies and deserializes structured
//!   response bodies.

mod codec;
mod form_field;

pub use codec::{BodyCodec, JsonCodec, JsonCodecError};
pub use form_field::{FlattenError, FormField};

use crate::value::Value;

/// Converts an argument to text.
pub trait StringConverter: Send + Sync {
    /// Returns the text form of `value`, or `None` if it has none.
    fn convert(&self, value: &Value) -> Option<String>;
}

/// Converts booleans, numbers and strings to their natural text form.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScalarStringConverter;

impl StringConverter for ScalarStringConverter {
    fn convert(&self, value: &Value) -> Option<String> {
        value.as_scalar_text()
    }
}

/// Expands an argument into form fields.
pub trait FormFieldConverter: Send + Sync {
    /// Expands `value`, bound under `name`, into `FormField`s.
    ///
    /// A null `value` yields a single field holding `default`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if some part of `value` cannot become a field.
    fn convert(
        &self,
        name: &str,
        value: &Value,
        default: Option<&str>,
        encoded: bool,
    ) -> Result<Vec<FormField>, FlattenError>;
}

/// The default [`FormFieldConverter`].
///
/// Sequences expand to `name[i]` (0-based), maps and composite objects to
/// `name.member`, and parts are emitted as file, byte-buffer or stream
/// fields without further recursion. Null members are skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlatteningConverter;

impl FormFieldConverter for FlatteningConverter {
    fn convert(
        &self,
        name: &str,
        value: &Value,
        default: Option<&str>,
        encoded: bool,
    ) -> Result<Vec<FormField>, FlattenError> {
        let mut out = Vec::new();
        form_field::flatten(name, value, default, encoded, &mut out)?;
        Ok(out)
    }
}
