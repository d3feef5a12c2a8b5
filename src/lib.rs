//! A declarative HTTP client.
//!
//! Describe a remote service once as a [`ServiceContract`](contract::ServiceContract):
//! each method names its HTTP verb, path template, body encoding, headers,
//! and the role of every parameter. [`Flare::create`] compiles each method
//! into an immutable [`RequestTemplate`](request::RequestTemplate) and
//! returns a [`Service`] that builds, sends, and resolves calls through a
//! pluggable [`HttpClient`](http::HttpClient).

#![forbid(unsafe_code)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod base_url;
mod cache;
pub mod call;
pub mod client;
pub mod config;
pub mod contract;
pub mod convert;
mod error;
pub mod http;
pub mod prelude;
pub mod request;
pub mod response;
pub mod value;

pub use base_url::{BaseUrl, IntoBaseUrl, InvalidBaseUrl};
pub use client::{Flare, InvokeError, Service};
pub use error::{BoxedError, Error};
pub use value::Value;

pub use bytes::Bytes;
