//! Provider rate-limit headers.

use std::time::Duration;

use chrono::DateTime;
use chrono::Utc;
use derive_more::Display;
use reqwest::header::HeaderMap;
use reqwest::header::HeaderValue;

pub const REMAINING_HEADER: &str = "ratelimit-remaining";
pub const RESET_HEADER: &str = "ratelimit-reset";

/// Quota state declared by one response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitState {
    pub remaining: i64,
    /// Only parsed once the quota is exhausted.
    pub reset: Option<DateTime<Utc>>,
}

/// Rate-limit headers that cannot drive a pause.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum InvalidHeader {
    /// A header is present but not an integer.
    #[display("invalid {header} header: {value:?}")]
    Malformed { header: &'static str, value: String },
    /// The quota is used up but no reset time was sent.
    #[display("quota exhausted (remaining {remaining}) but no reset header was sent")]
    MissingReset { remaining: i64 },
}

impl RateLimitState {
    /// `Ok(None)` when the response carries no remaining-quota header.
    pub fn from_headers(headers: &HeaderMap) -> Result<Option<Self>, InvalidHeader> {
        let Some(remaining) = headers.get(REMAINING_HEADER) else {
            return Ok(None);
        };
        let remaining = parse_epoch_or_count(REMAINING_HEADER, remaining)?;

        if remaining > 0 {
            return Ok(Some(Self {
                remaining,
                reset: None,
            }));
        }

        let value = headers
            .get(RESET_HEADER)
            .ok_or(InvalidHeader::MissingReset { remaining })?;
        let epoch = parse_epoch_or_count(RESET_HEADER, value)?;
        let reset = DateTime::from_timestamp(epoch, 0).ok_or_else(|| InvalidHeader::Malformed {
            header: RESET_HEADER,
            value: epoch.to_string(),
        })?;

        Ok(Some(Self {
            remaining,
            reset: Some(reset),
        }))
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining <= 0
    }

    /// How long to hold off before the next call, measured from `now`.
    ///
    /// `None` unless the quota is exhausted and the reset lies in the future.
    pub fn pause(&self, now: DateTime<Utc>) -> Option<Duration> {
        if !self.is_exhausted() {
            return None;
        }
        (self.reset? - now)
            .to_std()
            .ok()
            .filter(|wait| !wait.is_zero())
    }
}

fn parse_epoch_or_count(header: &'static str, value: &HeaderValue) -> Result<i64, InvalidHeader> {
    value
        .to_str()
        .ok()
        .and_then(|text| text.trim().parse().ok())
        .ok_or_else(|| InvalidHeader::Malformed {
            header,
            value: String::from_utf8_lossy(value.as_bytes()).into_owned(),
        })
}
