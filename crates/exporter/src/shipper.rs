//! Compressed upload of a finished batch to the time-series sink.

use std::io::Write;

use error_stack::Report;
use flate2::write::GzEncoder;
use flate2::Compression;
use http_retry::HttpRequest;
use http_retry::RequestExecutor;
use http_retry::RetryingTransport;
use http_retry::StatusCode;
use http_retry::TransportError;
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::collector::Batch;

#[derive(Error, Debug)]
pub enum ShipError {
    #[error("batch is empty, nothing was collected")]
    EmptyBatch,
    #[error("failed to compress batch: {0}")]
    Compress(#[from] std::io::Error),
    #[error("upload failed: {0}")]
    Transport(Report<TransportError>),
    #[error("upload rejected with status {status}: {body}")]
    Rejected { status: StatusCode, body: String },
}

pub struct BatchShipper<'a, E> {
    transport: &'a RetryingTransport<E>,
    write_url: Url,
    token: String,
}

impl<'a, E> BatchShipper<'a, E>
where E: RequestExecutor
{
    pub fn new(transport: &'a RetryingTransport<E>, write_url: Url, token: impl Into<String>) -> Self {
        Self {
            transport,
            write_url,
            token: token.into(),
        }
    }

    /// Gzip `batch` and POST it once through the retrying transport.
    ///
    /// Only `204 No Content` counts as acknowledged.
    pub fn ship(&self, batch: &Batch) -> Result<(), ShipError> {
        if batch.is_empty() {
            return Err(ShipError::EmptyBatch);
        }

        let compressed = compress(batch.as_str().as_bytes())?;
        info!(
            records = batch.records(),
            raw_bytes = batch.as_str().len(),
            compressed_bytes = compressed.len(),
            "Shipping batch"
        );

        let request = HttpRequest::post(self.write_url.as_str())
            .header("Authorization", format!("Token {}", self.token))
            .header("Content-Encoding", "gzip")
            .header("Content-Type", "text/plain; charset=utf-8")
            .header("Accept", "application/json")
            .body(compressed);

        let response = self
            .transport
            .execute(&request)
            .map_err(ShipError::Transport)?;
        if response.status() != StatusCode::NO_CONTENT {
            return Err(ShipError::Rejected {
                status: response.status(),
                body: response.text(),
            });
        }

        info!(records = batch.records(), "Batch acknowledged");
        Ok(())
    }
}

fn compress(payload: &[u8]) -> Result<Vec<u8>, std::io::Error> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(payload)?;
    encoder.finish()
}
