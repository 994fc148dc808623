//! transport config

use std::time::Duration;

/// Retrying transport config.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// absolute deadline for one HTTP call, covering connect, handshake and headers
    pub request_timeout: Duration,
    /// deadline for establishing the connection
    pub connect_timeout: Duration,
    /// retries after the first attempt
    pub max_retries: u32,
    /// backoff before retry `n` is `backoff_unit * 2^n`
    pub backoff_unit: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportConfig {
    /// create new transport config with default parameters.
    pub fn new() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(30),
            max_retries: 3,
            backoff_unit: Duration::from_secs(1),
        }
    }

    /// set request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self.connect_timeout = self.connect_timeout.min(timeout);
        self
    }

    /// set retry ceiling.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// set backoff time unit.
    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.backoff_unit = unit;
        self
    }

    /// Backoff to wait before the retry numbered `retry` (starting at 0).
    pub fn backoff(&self, retry: u32) -> Duration {
        self.backoff_unit
            .saturating_mul(2u32.saturating_pow(retry))
    }
}
