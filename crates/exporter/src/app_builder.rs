use anyhow::anyhow;
use anyhow::Context;
use anyhow::Result;
use http_retry::ReqwestExecutor;
use http_retry::RetryingTransport;

use crate::app::Application;
use crate::config::Cli;
use crate::config::Settings;
use crate::encoder::InfluxEncoder;
use crate::provider::Provider;

/// Application builder
pub struct ApplicationBuilder {
    cli: Cli,
}

impl ApplicationBuilder {
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Load settings and wire the transport, provider and sink together.
    pub fn build(self) -> Result<Application> {
        let settings = Settings::load(&self.cli.config, self.cli.provider)
            .with_context(|| format!("Invalid configuration in {}", self.cli.config.display()))?;
        let write_url = settings.write_url()?;

        let transport_config = self.cli.transport_config();
        let executor = ReqwestExecutor::new(&transport_config)
            .map_err(|report| anyhow!("Failed to create HTTP client: {report:?}"))?;
        let transport = RetryingTransport::new(executor, &transport_config);

        let provider = Provider::from_settings(
            self.cli.provider,
            &settings,
            self.cli.api_base_url.as_deref(),
        );
        tracing::info!(
            provider = provider.name(),
            sink = %write_url,
            max_retries = transport_config.max_retries,
            "Application configured"
        );

        Ok(Application {
            provider,
            transport,
            encoder: InfluxEncoder::new(),
            policy: self.cli.collection_policy(),
            write_url,
            sink_token: settings.influxdb_api_token,
        })
    }
}
