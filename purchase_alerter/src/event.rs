//! EventBridge payloads that announce a new object.
use anyhow::{anyhow, Result};
use serde::Deserialize;

/// The object a scan is triggered for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub bucket: String,
    pub key: String,
}

#[derive(Debug, Deserialize)]
struct EventBridgeEvent {
    detail: ObjectDetail,
}

/// Either a CloudTrail `PutObject` data event or a native S3 "Object Created" event.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ObjectDetail {
    #[serde(rename_all = "camelCase")]
    CloudTrail { request_parameters: RequestParameters },
    ObjectCreated { bucket: BucketDetail, object: ObjectKeyDetail },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestParameters {
    bucket_name: String,
    key: String,
}

#[derive(Debug, Deserialize)]
struct BucketDetail {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ObjectKeyDetail {
    key: String,
}

impl ObjectRef {
    pub fn from_event(payload: serde_json::Value) -> Result<ObjectRef> {
        let event = serde_json::from_value::<EventBridgeEvent>(payload)
            .map_err(|e| anyhow!("Unsupported trigger event: {}", e))?;

        Ok(match event.detail {
            ObjectDetail::CloudTrail { request_parameters } => ObjectRef {
                bucket: request_parameters.bucket_name,
                key: request_parameters.key,
            },
            ObjectDetail::ObjectCreated { bucket, object } => ObjectRef {
                bucket: bucket.name,
                key: object.key,
            },
        })
    }
}
