use anyhow::{Context, Result};
use futures::StreamExt;
use log::{debug, error, info};
use serde::Serialize;
use serde_json::Value;
use shared::lines::{decode_lines, infer_compression};
use shared::s3_uri::S3Uri;
use shared::store::ObjectStore;

use crate::alert::{purchase_alert, Alert};
use crate::event::ObjectRef;
use crate::publisher::AlertPublisher;

/// Where alerts end up.
pub struct AlertSinks<'a> {
    pub store: &'a dyn ObjectStore,
    pub alerts_location: &'a S3Uri,
    pub publisher: &'a dyn AlertPublisher,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    pub bucket: String,
    pub key: String,
    pub lines: usize,
    pub skipped_lines: usize,
    pub alerts: usize,
    pub failed_deliveries: usize,
}

/// Key of the alert raised by line `line_number` (1-based) of `source_key`.
pub fn alert_key(alerts_location: &S3Uri, source_key: &str, line_number: usize) -> String {
    alerts_location.key(&format!("purchases/{}/{:08}.json", source_key, line_number))
}

/// Scans one object for purchase events and delivers an alert for each.
///
/// Bad lines and failed deliveries are counted, never fatal. Only a failure to read
/// the object itself is returned as an error.
pub async fn scan_object(
    source: &dyn ObjectStore,
    object: &ObjectRef,
    sinks: &AlertSinks<'_>,
) -> Result<ScanSummary> {
    let reader = source.get(&object.bucket, &object.key).await?;
    let mut lines = decode_lines(reader, infer_compression(&object.key));

    let mut summary = ScanSummary {
        bucket: object.bucket.clone(),
        key: object.key.clone(),
        ..Default::default()
    };

    while let Some(line) = lines.next().await {
        let line = line.with_context(|| {
            format!("failed reading s3://{}/{}", object.bucket, object.key)
        })?;
        summary.lines += 1;
        let line_number = summary.lines;

        if line.trim().is_empty() {
            summary.skipped_lines += 1;
            continue;
        }
        let record = match serde_json::from_str::<Value>(&line) {
            Ok(record) => record,
            Err(e) => {
                debug!("Skipping line {} of {}: {}", line_number, object.key, e);
                summary.skipped_lines += 1;
                continue;
            }
        };

        if let Some(alert) = purchase_alert(&record) {
            summary.alerts += 1;
            let key = alert_key(sinks.alerts_location, &object.key, line_number);
            summary.failed_deliveries += deliver(sinks, &key, &alert).await;
        }
    }

    info!(
        "Scanned s3://{}/{}: {} lines, {} skipped, {} alerts",
        summary.bucket, summary.key, summary.lines, summary.skipped_lines, summary.alerts
    );
    Ok(summary)
}

/// Stores and publishes one alert. Returns the number of failed side effects.
async fn deliver(sinks: &AlertSinks<'_>, key: &str, alert: &Alert) -> usize {
    let body = match serde_json::to_string(alert) {
        Ok(body) => body,
        Err(e) => {
            error!("Failed to encode alert {}: {}", key, e);
            return 2;
        }
    };

    let mut failures = 0;
    if let Err(e) = sinks
        .store
        .put(
            &sinks.alerts_location.bucket,
            key,
            body.clone().into_bytes(),
            "application/json",
        )
        .await
    {
        error!("Failed to store alert {}: {:#}", key, e);
        failures += 1;
    }
    if let Err(e) = sinks.publisher.publish(&body).await {
        error!("Failed to publish alert {}: {:#}", key, e);
        failures += 1;
    }
    failures
}
