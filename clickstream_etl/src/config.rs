use anyhow::{Context, Result};
use serde::Deserialize;
use shared::s3_uri::S3Uri;

/// Job settings, read from the environment.
#[derive(Debug, Clone, Deserialize)]
pub struct EtlConfig {
    /// Root of the raw hour-partitioned NDJSON (`.../clickstream/YYYY/MM/DD/HH/`).
    #[serde(default = "default_raw_base")]
    pub raw_base: S3Uri,
    /// Root the `dim_users` and `fact_clicks` tables are written under.
    #[serde(default = "default_processed_base")]
    pub processed_base: S3Uri,
    #[serde(default = "default_fact_output_units")]
    pub fact_output_units: usize,
    /// Source objects downloaded at once.
    #[serde(default = "default_read_concurrency")]
    pub read_concurrency: usize,
}

fn default_raw_base() -> S3Uri {
    S3Uri {
        bucket: "company-raw".to_string(),
        prefix: "clickstream/".to_string(),
    }
}

fn default_processed_base() -> S3Uri {
    S3Uri {
        bucket: "company-processed".to_string(),
        prefix: "clickstream/".to_string(),
    }
}

fn default_fact_output_units() -> usize {
    8
}

fn default_read_concurrency() -> usize {
    8
}

impl EtlConfig {
    pub fn from_env() -> Result<EtlConfig> {
        envy::from_env::<EtlConfig>()
            .context("invalid job configuration")?
            .validated()
    }

    fn validated(mut self) -> Result<EtlConfig> {
        self.fact_output_units = self.fact_output_units.max(1);
        self.read_concurrency = self.read_concurrency.max(1);
        Ok(self)
    }
}
