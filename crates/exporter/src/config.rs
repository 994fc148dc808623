use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use clap::ValueEnum;
use http_retry::TransportConfig;
use serde::Deserialize;
use thiserror::Error;
use url::Url;
use utils::version;

#[derive(Parser, Debug)]
#[command(about, long_about, version = &**version::VERSION)]
pub struct Cli {
    #[arg(
        long,
        env = "STORAGEBOX_EXPORTER_CONFIG",
        value_hint = clap::ValueHint::FilePath,
        default_value = "storagebox_exporter.json",
        help = "Path to the JSON settings file"
    )]
    pub config: PathBuf,

    #[arg(
        long,
        value_enum,
        env = "STORAGEBOX_EXPORTER_PROVIDER",
        default_value_t = ProviderKind::Cloud,
        help = "Which Hetzner API to collect storage boxes from"
    )]
    pub provider: ProviderKind,

    #[arg(long, help = "Override the provider API base URL")]
    pub api_base_url: Option<String>,

    #[arg(
        long,
        default_value = "30",
        help = "Absolute timeout for a single HTTP call, in seconds"
    )]
    pub request_timeout_secs: u64,

    #[arg(long, default_value = "3", help = "Retries after the first attempt")]
    pub max_retries: u32,

    #[arg(
        long,
        default_value = "200",
        help = "Detail fetches above this count are paced with --cooldown-secs"
    )]
    pub cooldown_threshold: usize,

    #[arg(
        long,
        default_value = "18",
        help = "Pause between detail fetch launches once the threshold is exceeded"
    )]
    pub cooldown_secs: u64,
}

impl Cli {
    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig::new()
            .with_request_timeout(Duration::from_secs(self.request_timeout_secs))
            .with_max_retries(self.max_retries)
    }

    pub fn collection_policy(&self) -> CollectionPolicy {
        CollectionPolicy {
            cooldown_threshold: self.cooldown_threshold,
            cooldown: Duration::from_secs(self.cooldown_secs),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum ProviderKind {
    /// Hetzner API, paginated storage box listing
    Cloud,
    /// Robot webservice, storage box list plus one detail call per box
    Robot,
}

/// Pacing applied to list-then-detail collection.
///
/// The provider's own rate limit is the real constraint; this only spreads a
/// large burst of detail calls out over time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionPolicy {
    pub cooldown_threshold: usize,
    pub cooldown: Duration,
}

impl Default for CollectionPolicy {
    fn default() -> Self {
        Self {
            cooldown_threshold: 200,
            cooldown: Duration::from_secs(18),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Error reading config file `{path}`: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Error reading configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("InfluxDBHost `{host}` is not a valid URL: {source}")]
    InvalidHost {
        host: String,
        source: url::ParseError,
    },
}

/// Settings file layout, keys as written by operators.
#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    #[serde(rename = "Bucket", default)]
    bucket: String,
    #[serde(rename = "InfluxDBHost", default)]
    influxdb_host: String,
    #[serde(rename = "InfluxDBApiToken", default)]
    influxdb_api_token: String,
    #[serde(rename = "Org", default)]
    org: String,
    #[serde(rename = "ApiToken", default)]
    api_token: String,
    #[serde(rename = "ApiUser", default)]
    api_user: String,
}

/// Validated settings, read-only for the whole run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub bucket: String,
    pub influxdb_host: String,
    pub influxdb_api_token: String,
    pub org: String,
    pub api_token: String,
    /// only set for providers that authenticate with user and password
    pub api_user: Option<String>,
}

impl Settings {
    pub fn load(path: impl AsRef<Path>, provider: ProviderKind) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let raw: SettingsFile = serde_json::from_reader(BufReader::new(file))?;
        Self::validate(raw, provider)
    }

    pub fn from_json(json: &str, provider: ProviderKind) -> Result<Self, ConfigError> {
        Self::validate(serde_json::from_str(json)?, provider)
    }

    fn validate(raw: SettingsFile, provider: ProviderKind) -> Result<Self, ConfigError> {
        fn required(value: String, key: &'static str) -> Result<String, ConfigError> {
            let value = value.trim().to_string();
            if value.is_empty() {
                Err(ConfigError::Missing(key))
            } else {
                Ok(value)
            }
        }

        let settings = Self {
            api_token: required(raw.api_token, "ApiToken")?,
            bucket: required(raw.bucket, "Bucket")?,
            influxdb_host: required(raw.influxdb_host, "InfluxDBHost")?,
            influxdb_api_token: required(raw.influxdb_api_token, "InfluxDBApiToken")?,
            org: required(raw.org, "Org")?,
            api_user: match provider {
                ProviderKind::Robot => Some(required(raw.api_user, "ApiUser")?),
                ProviderKind::Cloud => None,
            },
        };
        settings.write_url()?;
        Ok(settings)
    }

    /// Line-protocol write endpoint for the configured org and bucket.
    ///
    /// A bare host is assumed to speak https.
    pub fn write_url(&self) -> Result<Url, ConfigError> {
        let host = self.influxdb_host.trim_end_matches('/');
        let base = if host.contains("://") {
            host.to_string()
        } else {
            format!("https://{host}")
        };
        Url::parse_with_params(&format!("{base}/api/v2/write"), [
            ("precision", "s"),
            ("org", self.org.as_str()),
            ("bucket", self.bucket.as_str()),
        ])
        .map_err(|source| ConfigError::InvalidHost {
            host: self.influxdb_host.clone(),
            source,
        })
    }
}
