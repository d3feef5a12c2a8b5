//! Adapting call outcomes to a method's declared return.

use std::path::PathBuf;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use snafu::{OptionExt as _, ResultExt as _};
use tokio::sync::oneshot;

use super::{
    Call, CallError, CanceledSnafu, HttpSnafu, ResolveSnafu, ShapeMismatchSnafu,
};
use crate::{
    response::{DeserializeSnafu, InternalResponse, Resolved},
    value::{BodyStream, RawBody},
};

/// The adapted result of invoking a method.
#[derive(Debug)]
pub enum Reply {
    /// The whole response, for methods declared as wrapped. Error statuses
    /// arrive here too.
    Response(InternalResponse),
    /// The resolved body of a 2xx response; `None` for 204 and 205.
    Body(Option<Resolved>),
}

impl Reply {
    fn kind(&self) -> &'static str {
        match self {
            Self::Response(_) => "wrapped response",
            Self::Body(None) => "empty",
            Self::Body(Some(resolved)) => resolved.kind(),
        }
    }
}

/// Runs `call` and adapts its outcome.
///
/// Wrapped methods execute directly and return every response. Other
/// methods run through the dispatch pool; a non-2xx status becomes
/// [`CallError::Http`]. Dropping the returned future cancels the call.
pub(crate) async fn adapt(call: Call) -> Result<Reply, CallError> {
    if call.template.returns.wrapped {
        return call.execute().await.map(Reply::Response);
    }

    let (tx, rx) = oneshot::channel();
    call.enqueue(move |result| drop(tx.send(result)))?;

    let guard = CancelOnDrop(Some(&call));
    let outcome = rx.await;
    guard.disarm();

    match outcome.ok().context(CanceledSnafu)??.into_success() {
        Ok(body) => Ok(Reply::Body(body)),
        Err(response) => HttpSnafu {
            status: response.status(),
            message: response.message().to_owned(),
            response: Box::new(response),
        }
        .fail(),
    }
}

struct CancelOnDrop<'a>(Option<&'a Call>);

impl CancelOnDrop<'_> {
    fn disarm(mut self) {
        self.0 = None;
    }
}

impl Drop for CancelOnDrop<'_> {
    fn drop(&mut self) {
        if let Some(call) = self.0 {
            call.cancel();
        }
    }
}

/// Conversion from a [`Reply`] into a caller-facing type.
pub trait FromReply: Sized {
    /// Converts the reply.
    ///
    /// # Errors
    ///
    /// Returns an error if the reply does not have this type's shape.
    fn from_reply(reply: Reply) -> Result<Self, CallError>;
}

fn mismatch<T>(expected: &'static str, reply: &Reply) -> Result<T, CallError> {
    ShapeMismatchSnafu {
        expected,
        found: reply.kind(),
    }
    .fail()
}

impl FromReply for Reply {
    fn from_reply(reply: Reply) -> Result<Self, CallError> {
        Ok(reply)
    }
}

impl FromReply for InternalResponse {
    fn from_reply(reply: Reply) -> Result<Self, CallError> {
        match reply {
            Reply::Response(response) => Ok(response),
            other => mismatch("wrapped response", &other),
        }
    }
}

impl FromReply for () {
    fn from_reply(_reply: Reply) -> Result<Self, CallError> {
        Ok(())
    }
}

impl FromReply for String {
    fn from_reply(reply: Reply) -> Result<Self, CallError> {
        match reply {
            Reply::Body(Some(Resolved::Text(text))) => Ok(text),
            other => mismatch("text", &other),
        }
    }
}

impl FromReply for Bytes {
    fn from_reply(reply: Reply) -> Result<Self, CallError> {
        match reply {
            Reply::Body(Some(Resolved::Bytes(bytes))) => Ok(bytes),
            other => mismatch("bytes", &other),
        }
    }
}

impl FromReply for Vec<u8> {
    fn from_reply(reply: Reply) -> Result<Self, CallError> {
        Bytes::from_reply(reply).map(Vec::from)
    }
}

impl FromReply for PathBuf {
    fn from_reply(reply: Reply) -> Result<Self, CallError> {
        match reply {
            Reply::Body(Some(Resolved::File(path))) => Ok(path),
            other => mismatch("file", &other),
        }
    }
}

impl FromReply for RawBody {
    fn from_reply(reply: Reply) -> Result<Self, CallError> {
        match reply {
            Reply::Body(Some(Resolved::Raw(raw))) => Ok(raw),
            other => mismatch("raw", &other),
        }
    }
}

impl FromReply for BodyStream {
    fn from_reply(reply: Reply) -> Result<Self, CallError> {
        match reply {
            Reply::Body(Some(Resolved::Stream(stream))) => Ok(stream),
            other => mismatch("stream", &other),
        }
    }
}

/// `None` for an empty body, otherwise the inner conversion.
impl<T: FromReply> FromReply for Option<T> {
    fn from_reply(reply: Reply) -> Result<Self, CallError> {
        match reply {
            Reply::Body(None) => Ok(None),
            other => T::from_reply(other).map(Some),
        }
    }
}

/// A structured body deserialized into `T`.
///
/// An empty body deserializes from JSON `null`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Json<T>(pub T);

impl<T> Json<T> {
    /// Unwraps the value.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T: DeserializeOwned> FromReply for Json<T> {
    fn from_reply(reply: Reply) -> Result<Self, CallError> {
        let value = match reply {
            Reply::Body(Some(Resolved::Structured(value))) => value,
            Reply::Body(None) => serde_json::Value::Null,
            other => return mismatch("structured", &other),
        };
        serde_json::from_value(value)
            .context(DeserializeSnafu)
            .context(ResolveSnafu)
            .map(Json)
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct User {
        id: u32,
        name: String,
    }

    #[test]
    fn test_json_conversion() {
        let reply = Reply::Body(Some(Resolved::Structured(serde_json::json!({
            "id": 42,
            "name": "A"
        }))));

        let Json(user) = Json::<User>::from_reply(reply).unwrap();
        assert_eq!(
            user,
            User {
                id: 42,
                name: "A".to_owned()
            }
        );
    }

    #[test]
    fn test_json_type_mismatch() {
        let reply = Reply::Body(Some(Resolved::Structured(serde_json::json!({"id": "x"}))));
        let err = Json::<User>::from_reply(reply).unwrap_err();
        assert!(matches!(err, CallError::Resolve { .. }));
    }

    #[test]
    fn test_empty_body() {
        assert_eq!(Option::<String>::from_reply(Reply::Body(None)).unwrap(), None);
        assert_eq!(
            Json::<Option<User>>::from_reply(Reply::Body(None)).unwrap(),
            Json(None)
        );
        assert!(<()>::from_reply(Reply::Body(None)).is_ok());
    }

    #[test]
    fn test_shape_mismatch() {
        let reply = Reply::Body(Some(Resolved::Text("hi".to_owned())));
        let err = Bytes::from_reply(reply).unwrap_err();
        assert!(matches!(
            err,
            CallError::ShapeMismatch {
                expected: "bytes",
                found: "text"
            }
        ));
    }

    #[test]
    fn test_bytes_to_vec() {
        let reply = Reply::Body(Some(Resolved::Bytes(Bytes::from_static(b"ab"))));
        assert_eq!(Vec::<u8>::from_reply(reply).unwrap(), b"ab");
    }
}
