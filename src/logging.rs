//! CLI args to configure logging.
use anyhow::{Context, Result};
use clap::Parser;
use tracing_log::LogTracer;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
pub struct LoggingCLIConfig {
    /// Log filter, e.g. `info` or `pull_msk_stats=debug,aws_config=warn`.
    #[clap(long, env = "RUST_LOG", default_value = "info")]
    log_filter: String,
}

/// Install the global subscriber, logs go to stderr.
pub fn setup_logging(config: LoggingCLIConfig) -> Result<()> {
    let filter = EnvFilter::try_new(&config.log_filter)
        .with_context(|| format!("invalid log filter: {}", config.log_filter))?;

    // route `log` records of the AWS SDK dependencies through tracing
    LogTracer::init()?;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}
