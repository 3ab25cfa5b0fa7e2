//! AWS SQS broker implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_sqs::config::BehaviorVersion;
use aws_sdk_sqs::types::{MessageAttributeValue, QueueAttributeName};
use aws_sdk_sqs::Client;
use tokio::sync::RwLock;
use tracing::{debug, info};

use marshal_core::config::{AwsConfig, QueueConfig};
use marshal_core::QueueName;

use crate::broker::{QueueHealth, TaskBroker};
use crate::envelope::{MessageId, TaskEnvelope};
use crate::error::QueueError;

/// SQS-backed broker. Each catalog queue maps to one SQS queue named
/// `{prefix}{queue}`; URLs are looked up once and cached.
pub struct SqsBroker {
    client: Client,
    name_prefix: String,
    urls: RwLock<HashMap<QueueName, String>>,
}

impl SqsBroker {
    /// Create a new SQS broker from project config.
    pub async fn new(aws: &AwsConfig, queue: &QueueConfig) -> Result<Self, QueueError> {
        let region = aws_sdk_sqs::config::Region::new(aws.region.clone());

        // Build the client config directly so a generic AWS_ENDPOINT_URL meant
        // for another service never redirects queue traffic.
        let mut sqs_config = aws_sdk_sqs::Config::builder()
            .region(region)
            .behavior_version(BehaviorVersion::latest());

        match (&aws.access_key_id, &aws.secret_access_key) {
            (Some(key_id), Some(secret)) => {
                let creds = Credentials::new(
                    key_id,
                    secret,
                    aws.session_token.clone(),
                    None,
                    "marshal-queue-static",
                );
                sqs_config = sqs_config.credentials_provider(creds);
            }
            (None, None) => {}
            _ => {
                return Err(QueueError::Auth(
                    "AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY must be set together".into(),
                ));
            }
        }

        if let Some(ref endpoint) = aws.endpoint_url {
            if !endpoint.is_empty() {
                let url = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
                    endpoint.clone()
                } else {
                    format!("https://{endpoint}")
                };
                sqs_config = sqs_config.endpoint_url(&url);
            }
        }

        let client = Client::from_conf(sqs_config.build());

        info!(
            region = %aws.region,
            prefix = queue.name_prefix.as_deref().unwrap_or(""),
            "SQS broker initialized"
        );

        Ok(Self {
            client,
            name_prefix: queue.name_prefix.clone().unwrap_or_default(),
            urls: RwLock::new(HashMap::new()),
        })
    }

    fn sqs_name(&self, queue: &QueueName) -> String {
        format!("{}{}", self.name_prefix, queue)
    }

    async fn queue_url(&self, queue: &QueueName) -> Result<String, QueueError> {
        if let Some(url) = self.urls.read().await.get(queue) {
            return Ok(url.clone());
        }

        let name = self.sqs_name(queue);
        let resp = self
            .client
            .get_queue_url()
            .queue_name(&name)
            .send()
            .await
            .map_err(|e| {
                let missing = e
                    .as_service_error()
                    .map(|se| se.is_queue_does_not_exist())
                    .unwrap_or(false);
                if missing {
                    QueueError::NotFound(name.clone())
                } else {
                    QueueError::Connection(format!("SQS get_queue_url failed: {e:?}"))
                }
            })?;

        let url = resp
            .queue_url()
            .ok_or_else(|| QueueError::NotFound(name.clone()))?
            .to_string();

        debug!(queue = %queue, url = %url, "resolved SQS queue url");
        self.urls.write().await.insert(queue.clone(), url.clone());
        Ok(url)
    }
}

fn string_attribute(value: impl Into<String>) -> Result<MessageAttributeValue, QueueError> {
    MessageAttributeValue::builder()
        .data_type("String")
        .string_value(value)
        .build()
        .map_err(|e| QueueError::Provider(format!("invalid message attribute: {e}")))
}

#[async_trait]
impl TaskBroker for SqsBroker {
    async fn submit(&self, queue: &QueueName, envelope: &TaskEnvelope) -> Result<MessageId, QueueError> {
        let url = self.queue_url(queue).await?;
        let body = envelope.to_json()?;

        let resp = self
            .client
            .send_message()
            .queue_url(&url)
            .message_body(body)
            .message_attributes("kind", string_attribute(envelope.kind.as_str())?)
            .message_attributes("attempt", string_attribute(envelope.attempt.to_string())?)
            .send()
            .await
            .map_err(|e| QueueError::Connection(format!("SQS send failed: {e:?}")))?;

        let id = resp.message_id().unwrap_or("unknown").to_string();
        debug!(queue = %queue, message_id = %id, kind = %envelope.kind, "submitted to SQS");
        Ok(MessageId(id))
    }

    async fn health_check(&self, queue: &QueueName) -> Result<QueueHealth, QueueError> {
        let url = self.queue_url(queue).await?;
        let resp = self
            .client
            .get_queue_attributes()
            .queue_url(&url)
            .attribute_names(QueueAttributeName::ApproximateNumberOfMessages)
            .send()
            .await
            .map_err(|e| QueueError::Connection(format!("SQS health check failed: {e:?}")))?;

        let count = resp
            .attributes()
            .and_then(|attrs| attrs.get(&QueueAttributeName::ApproximateNumberOfMessages))
            .and_then(|v| v.parse::<u64>().ok());

        Ok(QueueHealth {
            connected: true,
            approximate_message_count: count,
            provider: self.provider().to_string(),
        })
    }

    fn provider(&self) -> &str {
        "sqs"
    }
}
