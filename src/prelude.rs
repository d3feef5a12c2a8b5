//! Imports for syntax extensions.

pub use crate::IntoBaseUrl as _;
pub use crate::call::FromReply as _;
pub use crate::convert::BodyCodec as _;
