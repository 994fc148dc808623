use derive_more::Display;
use http_retry::ReqwestExecutor;
use http_retry::RetryingTransport;
use thiserror::Error;
use url::Url;

use crate::collector::Accumulator;
use crate::collector::ResourceCollector;
use crate::config::CollectionPolicy;
use crate::encoder::InfluxEncoder;
use crate::provider::Provider;
use crate::shipper::BatchShipper;
use crate::shipper::ShipError;

/// How a run that shipped its batch went.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum RunOutcome {
    #[display("shipped {records} records")]
    Complete { records: usize },
    /// Some fetches failed; what was collected still shipped.
    #[display("shipped {records} records, {errors} fetches failed")]
    Partial { records: usize, errors: u64 },
}

impl RunOutcome {
    fn new(records: usize, errors: u64) -> Self {
        if errors == 0 {
            Self::Complete { records }
        } else {
            Self::Partial { records, errors }
        }
    }

    /// Number of shipped records, or an error when any fetch failed.
    pub fn into_result(self) -> Result<usize, IncompleteRun> {
        match self {
            Self::Complete { records } => Ok(records),
            Self::Partial { records, errors } => Err(IncompleteRun { records, errors }),
        }
    }
}

/// The batch shipped but some storage boxes are missing from it.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Run incomplete: shipped {records} records, {errors} fetches failed")]
pub struct IncompleteRun {
    pub records: usize,
    pub errors: u64,
}

/// One collection run, from discovery to acknowledged upload.
pub struct Application {
    pub provider: Provider,
    pub transport: RetryingTransport<ReqwestExecutor>,
    pub encoder: InfluxEncoder,
    pub policy: CollectionPolicy,
    pub write_url: Url,
    pub sink_token: String,
}

impl Application {
    /// Collect every storage box and ship the batch.
    ///
    /// Errors are run-fatal: nothing was acknowledged by the sink.
    pub fn run(&self) -> Result<RunOutcome, ShipError> {
        let observed_at = self.transport.clock().now();
        tracing::info!(provider = self.provider.name(), "Collecting storage boxes");

        let accumulator = Accumulator::new();
        ResourceCollector::new(&self.transport, &self.encoder, self.policy, observed_at)
            .collect(&self.provider, &accumulator);
        let (batch, errors) = accumulator.finish();

        if errors > 0 {
            tracing::warn!(
                errors,
                records = batch.records(),
                "Collection finished with failed fetches"
            );
        } else {
            tracing::info!(records = batch.records(), "Collection finished");
        }

        BatchShipper::new(&self.transport, self.write_url.clone(), self.sink_token.as_str())
            .ship(&batch)?;

        Ok(RunOutcome::new(batch.records(), errors))
    }
}
