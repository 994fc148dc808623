//! Blocking HTTP transport that rides through transient failures.
//!
//! The crate wraps any [`RequestExecutor`] with a retry policy and with
//! compliance for provider rate-limit headers:
//!
//! - transport errors and `500`, `502`, `503`, `504`, `429` responses are
//!   retried with exponential backoff, up to a fixed ceiling
//! - a `RateLimit-Remaining` header at or below zero pauses the calling thread
//!   until the `RateLimit-Reset` epoch, even after a successful response
//! - request bodies are buffered, so every attempt replays the same bytes
//!
//! Whether a final response counts as success is left to the caller.
//!
//! # Examples
//!
//! ```no_run
//! # use http_retry::{HttpRequest, ReqwestExecutor, RetryingTransport, TransportConfig};
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = TransportConfig::new().with_max_retries(3);
//! let executor = ReqwestExecutor::new(&config).map_err(|e| format!("{e:?}"))?;
//! let transport = RetryingTransport::new(executor, &config);
//!
//! let request = HttpRequest::get("https://api.example.com/v1/items").bearer_auth("token");
//! let response = transport.execute(&request).map_err(|e| format!("{e:?}"))?;
//! println!("{}", response.status());
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod rate_limit;
pub mod transport;
pub mod types;

pub use clock::Clock;
pub use clock::ManualClock;
pub use clock::SystemClock;
pub use config::TransportConfig;
pub use reqwest::header::HeaderMap;
pub use reqwest::Method;
pub use reqwest::StatusCode;
pub use error::TransportError;
pub use error::TransportResult;
pub use events::EventReporter;
pub use events::TracingReporter;
pub use events::TransportEvent;
pub use rate_limit::RateLimitState;
pub use transport::RetryingTransport;
pub use types::HttpRequest;
pub use types::HttpResponse;
pub use types::RequestExecutor;
pub use types::ReqwestExecutor;
