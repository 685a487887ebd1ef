//! One run of the hourly normalizer: read the raw hour, build both tables, replace the
//! day partitions.
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use futures::{stream, StreamExt, TryStreamExt};
use log::{debug, info, warn};
use rayon::prelude::*;
use shared::lines::{decode_lines, infer_compression};
use shared::s3_uri::S3Uri;
use shared::store::ObjectStore;
use shared::ClickEvent;

use crate::config::EtlConfig;
use crate::partition::PartitionKey;
use crate::tables::{
    click_fact_batch, part_file_name, serialize_parquet, user_dimension_batch, DIM_USERS_TABLE,
    FACT_CLICKS_TABLE,
};
use crate::transform::{
    build_click_facts, build_user_dimension, split_into_units, ClickFact, NormalizedEvent,
    UserDimension,
};

const PARQUET_CONTENT_TYPE: &str = "application/vnd.apache.parquet";

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub source_objects: usize,
    pub records: usize,
    pub skipped_lines: usize,
    pub users: usize,
    pub facts: usize,
    pub files_written: usize,
    pub stale_files_removed: usize,
}

/// Raw objects that belong to an hour: NDJSON, optionally compressed.
fn is_source_key(key: &str) -> bool {
    [".json", ".json.gz", ".json.gzip", ".json.zst", ".json.zstd"]
        .iter()
        .any(|ext| key.ends_with(ext))
}

struct SourceRecords {
    events: Vec<ClickEvent>,
    skipped_lines: usize,
}

async fn read_source(store: &dyn ObjectStore, bucket: &str, key: &str) -> Result<SourceRecords> {
    let reader = store.get(bucket, key).await?;
    let mut lines = decode_lines(reader, infer_compression(key));

    let mut records = SourceRecords {
        events: vec![],
        skipped_lines: 0,
    };
    while let Some(line) = lines.next().await {
        let line = line.with_context(|| format!("failed reading s3://{}/{}", bucket, key))?;
        if line.trim().is_empty() {
            continue;
        }
        match ClickEvent::from_line(&line) {
            Some(event) => records.events.push(event),
            None => records.skipped_lines += 1,
        }
    }
    debug!(
        "Read {} records from s3://{}/{}",
        records.events.len(),
        bucket,
        key
    );
    Ok(records)
}

/// A file to upload, relative to its table partition.
struct OutputFile {
    name: String,
    body: Vec<u8>,
}

struct EncodedTables {
    dim_users: Vec<OutputFile>,
    fact_clicks: Vec<OutputFile>,
}

/// CPU-bound: one Parquet file per non-empty output unit, encoded in parallel.
fn encode_tables(
    users: Vec<UserDimension>,
    facts: Vec<ClickFact>,
    fact_units: usize,
    partition: &PartitionKey,
) -> Result<EncodedTables> {
    let dim_users = if users.is_empty() {
        vec![]
    } else {
        vec![OutputFile {
            name: part_file_name(0),
            body: serialize_parquet(&user_dimension_batch(&users, partition)?)?,
        }]
    };

    let fact_clicks = split_into_units(facts, fact_units)
        .into_par_iter()
        .enumerate()
        .filter(|(_, rows)| !rows.is_empty())
        .map(|(n, rows)| {
            Ok(OutputFile {
                name: part_file_name(n),
                body: serialize_parquet(&click_fact_batch(&rows, partition)?)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(EncodedTables {
        dim_users,
        fact_clicks,
    })
}

/// Uploads `files` into `location`, then deletes every other object under it.
///
/// Returns `(written, removed)`.
async fn replace_partition(
    store: &dyn ObjectStore,
    location: &S3Uri,
    files: Vec<OutputFile>,
) -> Result<(usize, usize)> {
    let mut written = HashSet::new();
    for file in files {
        let key = location.key(&file.name);
        store
            .put(&location.bucket, &key, file.body, PARQUET_CONTENT_TYPE)
            .await?;
        written.insert(key);
    }

    let stale = store
        .list(&location.bucket, &location.prefix)
        .await?
        .into_iter()
        .filter(|key| !written.contains(key))
        .collect::<Vec<_>>();
    if !stale.is_empty() {
        info!("Removing {} stale files from {}", stale.len(), location);
        store.delete_many(&location.bucket, &stale).await?;
    }

    Ok((written.len(), stale.len()))
}

/// Normalizes one hour of raw events into the `dim_users` and `fact_clicks` partitions of
/// its day. Any read or write failure aborts the run; so does an hour without source
/// objects, which leaves the existing partitions as they are.
pub async fn run_partition(
    store: Arc<dyn ObjectStore>,
    config: &EtlConfig,
    partition: &PartitionKey,
) -> Result<RunSummary> {
    let start = Instant::now();
    let source = config.raw_base.join(&partition.raw_path());

    let keys = store
        .list(&source.bucket, &source.prefix)
        .await?
        .into_iter()
        .filter(|key| is_source_key(key))
        .collect::<Vec<_>>();
    if keys.is_empty() {
        return Err(anyhow!("no source objects under {}", source));
    }
    info!("Reading {} objects from {}", keys.len(), source);

    let mut summary = RunSummary {
        source_objects: keys.len(),
        ..Default::default()
    };

    let sources = stream::iter(keys.iter())
        .map(|key| read_source(store.as_ref(), &source.bucket, key))
        .buffered(config.read_concurrency)
        .try_collect::<Vec<_>>()
        .await?;

    let mut events = vec![];
    for records in sources {
        summary.skipped_lines += records.skipped_lines;
        events.extend(records.events.into_iter().map(NormalizedEvent::new));
    }
    if summary.skipped_lines > 0 {
        warn!("Skipped {} malformed lines", summary.skipped_lines);
    }
    summary.records = events.len();

    let users = build_user_dimension(&events);
    let facts = build_click_facts(&events);
    drop(events);
    summary.users = users.len();
    summary.facts = facts.len();
    info!(
        "Built {} user rows and {} fact rows in {:.2?}",
        summary.users,
        summary.facts,
        start.elapsed()
    );

    let fact_units = config.fact_output_units;
    let encode_partition = partition.clone();
    let tables = tokio::task::spawn_blocking(move || {
        encode_tables(users, facts, fact_units, &encode_partition)
    })
    .await
    .map_err(|e| anyhow!("encoding task failed: {}", e))??;

    let date_path = partition.date_path();
    for (table, files) in [
        (DIM_USERS_TABLE, tables.dim_users),
        (FACT_CLICKS_TABLE, tables.fact_clicks),
    ] {
        let location = config
            .processed_base
            .join(&format!("{}/{}", table, date_path));
        let (written, removed) = replace_partition(store.as_ref(), &location, files)
            .await
            .with_context(|| format!("failed to replace {}", location))?;
        info!("Wrote {} files to {}", written, location);
        summary.files_written += written;
        summary.stale_files_removed += removed;
    }

    info!("Partition {} done in {:.2?}", partition.raw_path(), start.elapsed());
    Ok(summary)
}
