//! Scans newly landed clickstream objects for purchases and raises an alert for each.
mod alert;
mod event;
mod publisher;
mod scanner;

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use async_once::AsyncOnce;
use aws_config::BehaviorVersion;
use lambda_runtime::{run, service_fn, Error as LambdaError, LambdaEvent};
use lazy_static::lazy_static;
use log::{debug, info};
use serde::Deserialize;
use serde_json::{json, Value};
use shared::s3_uri::S3Uri;
use shared::setup_logging;
use shared::store::S3Store;

use event::ObjectRef;
use publisher::SnsPublisher;
use scanner::{scan_object, AlertSinks};

#[global_allocator]
static ALLOC: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

/// Read from the function's environment.
#[derive(Debug, Deserialize)]
struct AlerterConfig {
    /// `s3://bucket/prefix` (or a bare bucket name) alerts are written under.
    alerts_bucket: S3Uri,
    sns_topic_arn: String,
}

lazy_static! {
    static ref AWS_CONFIG: AsyncOnce<aws_config::SdkConfig> =
        AsyncOnce::new(async { aws_config::load_defaults(BehaviorVersion::latest()).await });
    static ref S3_STORE: AsyncOnce<S3Store> =
        AsyncOnce::new(async { S3Store::new(aws_sdk_s3::Client::new(AWS_CONFIG.get().await)) });
    static ref SNS_CLIENT: AsyncOnce<aws_sdk_sns::Client> =
        AsyncOnce::new(async { aws_sdk_sns::Client::new(AWS_CONFIG.get().await) });
}

#[tokio::main]
async fn main() -> Result<(), LambdaError> {
    setup_logging();

    let config = envy::from_env::<AlerterConfig>()
        .context("ALERTS_BUCKET and SNS_TOPIC_ARN must be set")?;
    let config = Arc::new(config);
    info!(
        "Delivering alerts to {} and {}",
        config.alerts_bucket, config.sns_topic_arn
    );

    let func = service_fn(move |event| {
        let config = config.clone();
        async move { handler(&config, event).await }
    });
    run(func).await?;

    Ok(())
}

async fn handler(config: &AlerterConfig, event: LambdaEvent<Value>) -> Result<Value, LambdaError> {
    let start = Instant::now();
    debug!("Request: {:?}", event.payload);

    let object = ObjectRef::from_event(event.payload)?;
    info!("Scanning s3://{}/{}", object.bucket, object.key);

    let store = S3_STORE.get().await;
    let publisher = SnsPublisher::new(SNS_CLIENT.get().await.clone(), config.sns_topic_arn.clone());
    let sinks = AlertSinks {
        store,
        alerts_location: &config.alerts_bucket,
        publisher: &publisher,
    };

    let summary = scan_object(store, &object, &sinks).await?;
    debug!("Call lambda took {:.2?}", start.elapsed());

    let mut response = serde_json::to_value(&summary)?;
    response["status"] = json!("ok");
    Ok(response)
}
