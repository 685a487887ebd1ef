use anyhow::{Context, Result};
use async_trait::async_trait;

#[async_trait]
pub trait AlertPublisher: Send + Sync {
    async fn publish(&self, message: &str) -> Result<()>;
}

pub struct SnsPublisher {
    client: aws_sdk_sns::Client,
    topic_arn: String,
}

impl SnsPublisher {
    pub fn new(client: aws_sdk_sns::Client, topic_arn: String) -> Self {
        SnsPublisher { client, topic_arn }
    }
}

#[async_trait]
impl AlertPublisher for SnsPublisher {
    async fn publish(&self, message: &str) -> Result<()> {
        self.client
            .publish()
            .topic_arn(&self.topic_arn)
            .message(message)
            .send()
            .await
            .with_context(|| format!("failed to publish to {}", self.topic_arn))?;
        Ok(())
    }
}
