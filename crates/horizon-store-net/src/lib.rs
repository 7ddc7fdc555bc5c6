//! Networking module for Horizon Store.
//!
//! Remote stores talk to their backend through the [`Transport`] trait. This
//! crate defines that seam and ships [`HttpClient`], a reqwest-backed
//! implementation that speaks JSON over HTTP:
//!
//! - **GET** requests send parameters in the query string
//! - **POST** / **PATCH** requests send parameters as a JSON object body
//! - every response body is decoded as JSON
//!
//! Retry, caching and authentication refresh are deliberately left to the
//! caller or to a wrapping `Transport`.

pub mod error;
pub mod http;
mod transport;

pub use error::{NetworkError, Result};
pub use http::{Authentication, HttpClient, HttpClientBuilder, HttpMethod, TransportRequest};
pub use transport::Transport;
