//! Hourly clickstream normalizer.
//!
//! Reads one hour of raw NDJSON click events and rewrites the day partitions of the
//! `dim_users` and `fact_clicks` Parquet tables.
mod config;
mod job;
mod partition;
mod tables;
mod timestamp;
mod transform;

use std::process::ExitCode;
use std::sync::Arc;

use aws_config::BehaviorVersion;
use clap::Parser;
use log::{error, info};
use shared::setup_batch_logging;
use shared::store::S3Store;

use config::EtlConfig;
use partition::{parse_component, PartitionKey};

#[global_allocator]
static ALLOC: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Debug, Parser)]
#[command(name = "clickstream_etl", about = "Normalize one hour of raw clickstream")]
struct Cli {
    #[arg(value_parser = parse_component)]
    year: String,
    #[arg(value_parser = parse_component)]
    month: String,
    #[arg(value_parser = parse_component)]
    day: String,
    #[arg(value_parser = parse_component)]
    hour: String,
}

impl Cli {
    fn partition(&self) -> anyhow::Result<PartitionKey> {
        PartitionKey::new(&self.year, &self.month, &self.day, &self.hour)
    }
}

async fn run(cli: &Cli) -> anyhow::Result<()> {
    let partition = &cli.partition()?;
    let config = EtlConfig::from_env()?;
    info!(
        "Processing {} from {} into {}",
        partition.raw_path(),
        config.raw_base,
        config.processed_base
    );

    let aws_config = aws_config::load_defaults(BehaviorVersion::latest()).await;
    let store = Arc::new(S3Store::new(aws_sdk_s3::Client::new(&aws_config)));

    let summary = job::run_partition(store, &config, partition).await?;
    info!(
        "Read {} records from {} objects ({} skipped lines), wrote {} users and {} clicks in {} files, removed {} stale files",
        summary.records,
        summary.source_objects,
        summary.skipped_lines,
        summary.users,
        summary.facts,
        summary.files_written,
        summary.stale_files_removed
    );
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    // exits with status 2 on bad arguments
    let cli = Cli::parse();
    setup_batch_logging();

    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(
                "Partition {}/{}/{}/{} failed: {:#}",
                cli.year, cli.month, cli.day, cli.hour, e
            );
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_partition() {
        let cli = Cli::try_parse_from(["clickstream_etl", "2024", "01", "02", "03"]).unwrap();
        assert_eq!(
            cli.partition().unwrap(),
            PartitionKey::new("2024", "01", "02", "03").unwrap()
        );
    }

    #[test]
    fn test_cli_rejects_bad_arguments() {
        assert!(Cli::try_parse_from(["clickstream_etl", "2024", "01", "02"]).is_err());
        assert!(Cli::try_parse_from(["clickstream_etl", "2024", "01", "02", "3pm"]).is_err());
        assert!(
            Cli::try_parse_from(["clickstream_etl", "2024", "01", "02", "03", "04"]).is_err()
        );
    }

    #[test]
    fn test_cli_usage_error_exit_code() {
        let err = Cli::try_parse_from(["clickstream_etl"]).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
