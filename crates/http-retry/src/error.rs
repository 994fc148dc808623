//! Error types for the retrying transport.

use core::error::Error;

use derive_more::Display;
use error_stack::Report;

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, Report<TransportError>>;

/// Errors that can occur while executing a request.
#[derive(Debug, Display)]
pub enum TransportError {
    /// Connection, TLS or protocol failure
    #[display("Network error: {message}")]
    Network { message: String },

    /// The per-call deadline elapsed
    #[display("Request timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// The response arrived but its body could not be read
    #[display("Failed to read response body: {message}")]
    Body { message: String },

    /// The request could not be built or the client could not be created
    #[display("Configuration error: {message}")]
    Configuration { message: String },
}

impl Error for TransportError {}
