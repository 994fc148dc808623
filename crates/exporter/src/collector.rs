//! Discovery and concurrent retrieval of storage box records.
//!
//! One thread is spawned per page or per detail fetch. Every thread encodes
//! its records straight into the shared [`Accumulator`]; a failed fetch is
//! counted and logged but never stops its siblings.

use std::sync::atomic::AtomicU64;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::thread;

use chrono::DateTime;
use chrono::Utc;
use error_stack::Report;
use http_retry::HttpRequest;
use http_retry::HttpResponse;
use http_retry::RequestExecutor;
use http_retry::RetryingTransport;
use http_retry::StatusCode;
use http_retry::TransportError;
use thiserror::Error;
use tracing::debug;
use tracing::error;
use tracing::info;

use crate::config::CollectionPolicy;
use crate::encoder::MetricsEncoder;
use crate::provider::decode_api_error;
use crate::provider::DecodeError;
use crate::provider::ListDetailApi;
use crate::provider::Page;
use crate::provider::PaginatedApi;
use crate::provider::Provider;
use crate::record::ResourceRecord;
use crate::record::ResourceRef;

/// Longest slice of an unstructured error body kept for logging.
const BODY_SNIPPET_LIMIT: usize = 256;

/// Why a single fetch produced no records.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(Report<TransportError>),
    #[error("unexpected status {status}: {detail}")]
    Status { status: StatusCode, detail: String },
    #[error("failed to decode response: {0}")]
    Decode(#[from] DecodeError),
}

impl FetchError {
    fn from_response(response: &HttpResponse) -> Self {
        let detail = match decode_api_error(response.body()) {
            Some(api_error) => api_error.to_string(),
            None => response.text().chars().take(BODY_SNIPPET_LIMIT).collect(),
        };
        Self::Status {
            status: response.status(),
            detail,
        }
    }
}

/// Encoded lines of one run, frozen once collection is done.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    payload: String,
    records: usize,
}

impl Batch {
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn records(&self) -> usize {
        self.records
    }

    pub fn as_str(&self) -> &str {
        &self.payload
    }
}

/// Shared state mutated by every fetch thread.
///
/// Appends are serialized so each line lands whole; the error tally only
/// ever grows.
#[derive(Debug, Default)]
pub struct Accumulator {
    payload: Mutex<String>,
    records: AtomicUsize,
    errors: AtomicU64,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one complete, newline-terminated record.
    pub fn append(&self, line: &str) {
        self.payload
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_str(line);
        self.records.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Freeze the batch, returning it with the final error tally.
    pub fn finish(self) -> (Batch, u64) {
        let batch = Batch {
            payload: self
                .payload
                .into_inner()
                .unwrap_or_else(PoisonError::into_inner),
            records: self.records.into_inner(),
        };
        (batch, self.errors.into_inner())
    }
}

pub struct ResourceCollector<'a, E> {
    transport: &'a RetryingTransport<E>,
    encoder: &'a dyn MetricsEncoder,
    policy: CollectionPolicy,
    observed_at: DateTime<Utc>,
}

impl<'a, E> ResourceCollector<'a, E>
where E: RequestExecutor
{
    pub fn new(
        transport: &'a RetryingTransport<E>,
        encoder: &'a dyn MetricsEncoder,
        policy: CollectionPolicy,
        observed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            transport,
            encoder,
            policy,
            observed_at,
        }
    }

    /// Collect every record the provider exposes. Returns once all fetches finished.
    pub fn collect(&self, provider: &Provider, accumulator: &Accumulator) {
        match provider {
            Provider::Cloud(api) => self.collect_paginated(api, accumulator),
            Provider::Robot(api) => self.collect_list_detail(api, accumulator),
        }
    }

    /// Page 1 first to learn the page count, then pages 2..=last concurrently.
    pub fn collect_paginated(&self, api: &dyn PaginatedApi, accumulator: &Accumulator) {
        let Some(first) = self.fetch_page(api, 1, accumulator) else {
            return;
        };
        let last_page = first.last_page;
        self.ingest(&first.records, accumulator);

        if last_page < 2 {
            return;
        }
        info!(last_page, "Fetching remaining pages");

        thread::scope(|scope| {
            for page in 2..=last_page {
                scope.spawn(move || {
                    if let Some(fetched) = self.fetch_page(api, page, accumulator) {
                        self.ingest(&fetched.records, accumulator);
                    }
                });
            }
        });
    }

    /// One list call, then one detail fetch per reference.
    ///
    /// Above the policy threshold, launches are spaced by the cooldown.
    pub fn collect_list_detail(&self, api: &dyn ListDetailApi, accumulator: &Accumulator) {
        let refs = match self
            .fetch(&api.list_request())
            .and_then(|response| Ok(api.decode_list(response.body())?))
        {
            Ok(refs) => refs,
            Err(err) => {
                accumulator.record_failure();
                error!("Error listing storage boxes: {err}");
                return;
            }
        };

        let paced = refs.len() > self.policy.cooldown_threshold;
        if paced {
            info!(
                count = refs.len(),
                threshold = self.policy.cooldown_threshold,
                cooldown_secs = self.policy.cooldown.as_secs_f32(),
                "Pacing detail fetches to stay under the provider rate limit"
            );
        } else {
            info!(count = refs.len(), "Fetching storage box details");
        }

        thread::scope(|scope| {
            for (index, resource) in refs.iter().copied().enumerate() {
                if paced && index > 0 {
                    self.transport.clock().sleep(self.policy.cooldown);
                }
                scope.spawn(move || self.fetch_detail(api, resource, accumulator));
            }
        });
    }

    fn fetch_page(
        &self,
        api: &dyn PaginatedApi,
        page: u64,
        accumulator: &Accumulator,
    ) -> Option<Page> {
        match self
            .fetch(&api.page_request(page))
            .and_then(|response| Ok(api.decode_page(response.body())?))
        {
            Ok(fetched) => {
                debug!(page, records = fetched.records.len(), "Fetched page");
                Some(fetched)
            }
            Err(err) => {
                accumulator.record_failure();
                error!(page, "Error fetching page: {err}");
                None
            }
        }
    }

    fn fetch_detail(&self, api: &dyn ListDetailApi, resource: ResourceRef, accumulator: &Accumulator) {
        match self
            .fetch(&api.detail_request(resource))
            .and_then(|response| Ok(api.decode_detail(response.body())?))
        {
            Ok(record) => {
                debug!(resource_id = resource.0, "Fetched storage box");
                self.ingest(std::slice::from_ref(&record), accumulator);
            }
            Err(err) => {
                accumulator.record_failure();
                error!(resource_id = resource.0, "Error fetching storage box: {err}");
            }
        }
    }

    fn fetch(&self, request: &HttpRequest) -> Result<HttpResponse, FetchError> {
        let response = self
            .transport
            .execute(request)
            .map_err(FetchError::Transport)?;
        if !response.status().is_success() {
            return Err(FetchError::from_response(&response));
        }
        Ok(response)
    }

    fn ingest(&self, records: &[ResourceRecord], accumulator: &Accumulator) {
        for record in records {
            accumulator.append(&self.encoder.encode_record(record, self.observed_at));
        }
    }
}
