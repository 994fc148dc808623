//! Structured events emitted by the transport.

use std::time::Duration;

use reqwest::StatusCode;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::rate_limit::InvalidHeader;

/// Something noteworthy happened while executing a request.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent<'a> {
    /// A retryable outcome was observed and another attempt will follow.
    RetryScheduled {
        url: &'a str,
        retry: u32,
        backoff: Duration,
        status: Option<StatusCode>,
        error: Option<String>,
    },
    /// The provider quota is exhausted, the caller thread is held until reset.
    RateLimitPause {
        url: &'a str,
        remaining: i64,
        wait: Duration,
    },
    /// A rate-limit header could not be interpreted, no pause was applied.
    InvalidRateLimitHeader { url: &'a str, reason: InvalidHeader },
    /// The final attempt was still retryable.
    RetriesExhausted { url: &'a str, attempts: u32 },
}

/// Receives transport events.
pub trait EventReporter: Send + Sync {
    fn report(&self, event: &TransportEvent<'_>);
}

/// Forwards transport events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl EventReporter for TracingReporter {
    fn report(&self, event: &TransportEvent<'_>) {
        match event {
            TransportEvent::RetryScheduled {
                url,
                retry,
                backoff,
                status,
                error,
            } => {
                warn!(
                    url,
                    retry = retry + 1,
                    backoff_secs = backoff.as_secs_f32(),
                    status = status.map(|s| s.as_u16()),
                    error = error.as_deref(),
                    "Previous request failed, retrying"
                );
            }
            TransportEvent::RateLimitPause {
                url,
                remaining,
                wait,
            } => {
                info!(
                    url,
                    remaining,
                    wait_secs = wait.as_secs_f32(),
                    "Rate limit exceeded, waiting until reset"
                );
            }
            TransportEvent::InvalidRateLimitHeader { url, reason } => {
                warn!(url, "Ignoring rate limit headers: {reason}");
            }
            TransportEvent::RetriesExhausted { url, attempts } => {
                error!(url, attempts, "Giving up after retries");
            }
        }
    }
}
