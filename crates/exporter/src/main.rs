use anyhow::Result;
use clap::Parser;
use storagebox_exporter::app_builder::ApplicationBuilder;
use storagebox_exporter::config::Cli;
use utils::logging;
use utils::version;

/// Sets up global panic hooks.
fn setup_global_hooks() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        default_hook(panic_info);
        tracing::error!("Thread panicked: {}", panic_info);
    }));
}

fn main() -> Result<()> {
    setup_global_hooks();
    logging::init();

    let cli = Cli::parse();
    tracing::info!("Starting storagebox exporter {}", &**version::VERSION);

    let app = ApplicationBuilder::new(cli).build()?;

    let records = app.run()?.into_result()?;
    tracing::info!(records, "Run complete");
    Ok(())
}
