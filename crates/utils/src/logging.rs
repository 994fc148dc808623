//! provides logging helpers

use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::layer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry;

/// used when `RUST_LOG` is unset or unparsable; HTTP client internals stay quiet
const DEFAULT_DIRECTIVES: &str = "info,hyper_util=warn,reqwest=warn,rustls=warn";

fn filter_from(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_DIRECTIVES))
}

/// initiate the global tracing subscriber
///
/// Everything goes to stderr, stdout stays free for the process output.
pub fn init() {
    let directives = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let fmt_layer = layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_filter(filter_from(directives.as_deref()));

    registry().with(fmt_layer).init();
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;
    use tracing_subscriber::filter::LevelFilter;

    use super::*;

    #[test]
    fn defaults_to_info() {
        assert_eq!(filter_from(None).max_level_hint(), Some(LevelFilter::INFO));
    }

    #[test]
    fn directives_override_the_default() {
        assert_eq!(
            filter_from(Some("storagebox_exporter=debug")).max_level_hint(),
            Some(LevelFilter::DEBUG)
        );
    }

    #[test]
    fn invalid_directives_fall_back() {
        assert_eq!(
            filter_from(Some("storagebox_exporter=loud")).max_level_hint(),
            Some(LevelFilter::INFO)
        );
    }
}
