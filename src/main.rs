//! Pull raw usage data of Amazon MSK clusters.
use std::path::PathBuf;

use accounts::StatsConfig;
use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use client::{build_clients, ClientCLIConfig};
use logging::{setup_logging, LoggingCLIConfig};
use metrics::{Collection, CollectionCLIConfig};
use output::{write_report, OutputCLIConfig};
use pull::pull_account;
use runtime::{setup_runtime, RuntimeCLIConfig};
use source::AwsSource;
use tracing::info;

mod accounts;
mod client;
mod error;
mod logging;
mod metrics;
mod output;
mod pull;
mod runtime;
mod source;

/// CLI args.
#[derive(Debug, Parser)]
#[clap(name = "pull-msk-stats", about)]
struct Args {
    /// Location of the configuration file.
    #[clap(short = 'c', long = "config", value_name = "FILE")]
    config: PathBuf,

    /// Runtime config.
    #[clap(flatten)]
    runtime_cfg: RuntimeCLIConfig,

    /// Client config.
    #[clap(flatten)]
    client_cfg: ClientCLIConfig,

    /// Logging config.
    #[clap(flatten)]
    logging_cfg: LoggingCLIConfig,

    /// Metric collection config.
    #[clap(flatten)]
    collection_cfg: CollectionCLIConfig,

    /// Output config.
    #[clap(flatten)]
    output_cfg: OutputCLIConfig,
}

/// Main entry point.
fn main() -> Result<()> {
    let Args {
        config: config_path,
        runtime_cfg,
        client_cfg,
        logging_cfg,
        collection_cfg,
        output_cfg,
    } = Args::parse();

    let runtime = setup_runtime(runtime_cfg)?;
    runtime.block_on(async move {
        setup_logging(logging_cfg)?;

        let collection = Collection::try_from(collection_cfg)?;
        let config = StatsConfig::load(&config_path)?;

        info!(
            accounts = config.accounts.len(),
            "pulling MSK stats, this takes a while",
        );
        let today = Utc::now().date_naive();

        for account in &config.accounts {
            let clients = build_clients(&client_cfg, account).await;
            let source = AwsSource::new(clients);

            let report = pull_account(
                &source,
                &account.name,
                &account.region,
                &collection,
                today,
            )
            .await
            .with_context(|| format!("pull stats of account [{}]", account.name))?;

            write_report(&output_cfg, &report).await?;
        }

        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use clap::{error::ErrorKind, CommandFactory};

    use super::*;

    #[test]
    fn test_args_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_config_flag_required() {
        let err = Args::try_parse_from(["pull-msk-stats"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["pull-msk-stats", "-c", "config.cfg"]).unwrap();
        assert_eq!(args.config, PathBuf::from("config.cfg"));
        assert_eq!(
            Collection::try_from(args.collection_cfg).unwrap(),
            Collection::default()
        );
    }

    #[test]
    fn test_long_flags() {
        let args = Args::try_parse_from([
            "pull-msk-stats",
            "--config",
            "accounts.cfg",
            "--out-dir",
            "-",
            "--format",
            "json",
            "--period-days",
            "14",
            "--aggregation",
            "15m",
            "-j",
            "2",
        ])
        .unwrap();
        assert_eq!(args.config, PathBuf::from("accounts.cfg"));
        assert_eq!(
            Collection::try_from(args.collection_cfg).unwrap(),
            Collection {
                period_days: 14,
                aggregation_secs: 900,
            }
        );
    }

    #[test]
    fn test_bad_format() {
        let err =
            Args::try_parse_from(["pull-msk-stats", "-c", "x.cfg", "--format", "ods"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValueValidation);
    }
}
