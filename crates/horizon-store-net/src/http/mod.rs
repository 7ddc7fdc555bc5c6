//! HTTP transport for Horizon Store.
//!
//! # Example
//!
//! ```ignore
//! use horizon_store_net::http::{HttpClient, TransportRequest};
//! use horizon_store_net::Transport;
//!
//! let client = HttpClient::builder()
//!     .base_url("https://api.example.com/")?
//!     .build()?;
//!
//! // GET: parameters become the query string
//! let page = client
//!     .send(TransportRequest::get("users").param("start", 0).param("limit", 20))
//!     .await?;
//!
//! // PATCH: parameters become a JSON body
//! let ack = client
//!     .send(TransportRequest::patch("users").param("records", serde_json::json!([])))
//!     .await?;
//! ```

mod client;
mod request;

pub use client::{Authentication, HttpClient, HttpClientBuilder, HttpClientConfig};
pub use request::{HttpMethod, TransportRequest};
