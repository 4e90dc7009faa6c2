use std::time::Duration;

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_sqs::{Client, types::Message as SqsMessage};
use tokio::{sync::mpsc, time::sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    clients::{QueueConsumer, QueuePublisher},
    config::Config,
    errors::QueueError,
    models::{
        envelope::{AckToken, QueueEnvelope},
        notification::NotificationPayload,
    },
};

const RECEIVE_ERROR_PAUSE: Duration = Duration::from_secs(1);

pub struct SqsClient {
    client: Client,
    queue_url: String,
    wait_time_seconds: i32,
    max_messages: i32,
    visibility_timeout_seconds: i32,
}

impl SqsClient {
    pub async fn connect(config: &Config) -> Result<Self, Error> {
        let region = config
            .aws_region
            .clone()
            .ok_or_else(|| anyhow!("AWS_REGION is not configured"))?;

        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region))
            .load()
            .await;

        let mut builder = aws_sdk_sqs::config::Builder::from(&sdk_config);
        if let Some(endpoint) = &config.sqs_endpoint_url {
            builder = builder.endpoint_url(endpoint);
        }

        info!(queue_url = %config.consume_queue, "SQS client initialized");

        Ok(
            Self::new(Client::from_conf(builder.build()), config.consume_queue.clone())
                .with_polling(
                    config.sqs_wait_time_seconds,
                    config.sqs_max_messages,
                    config.sqs_visibility_timeout_seconds,
                ),
        )
    }

    pub fn new(client: Client, queue_url: String) -> Self {
        Self {
            client,
            queue_url,
            wait_time_seconds: 20,
            max_messages: 10,
            visibility_timeout_seconds: 60,
        }
    }

    /// Long-poll wait and batch size are clamped to what `ReceiveMessage` accepts.
    pub fn with_polling(
        mut self,
        wait_time_seconds: i32,
        max_messages: i32,
        visibility_timeout_seconds: i32,
    ) -> Self {
        self.wait_time_seconds = wait_time_seconds.clamp(0, 20);
        self.max_messages = max_messages.clamp(1, 10);
        self.visibility_timeout_seconds = visibility_timeout_seconds;
        self
    }

    async fn receive(&self) -> Result<Vec<SqsMessage>, QueueError> {
        let output = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(self.max_messages)
            .wait_time_seconds(self.wait_time_seconds)
            .visibility_timeout(self.visibility_timeout_seconds)
            .send()
            .await
            .map_err(|e| QueueError::Sqs(e.to_string()))?;

        Ok(output.messages.unwrap_or_default())
    }

    async fn delete(&self, receipt_handle: &str) -> Result<(), QueueError> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|e| QueueError::Sqs(e.to_string()))?;

        Ok(())
    }

    fn decode(message: &SqsMessage) -> Result<QueueEnvelope, QueueError> {
        let receipt_handle = message
            .receipt_handle()
            .ok_or_else(|| QueueError::Sqs("Missing receipt handle".to_string()))?;
        let body = message
            .body()
            .ok_or_else(|| QueueError::Sqs("Message body is empty".to_string()))?;
        let message_id = message.message_id().unwrap_or(receipt_handle).to_string();

        Ok(QueueEnvelope::decode(
            message_id,
            AckToken::ReceiptHandle(receipt_handle.to_string()),
            body.as_bytes(),
        )?)
    }

    async fn drop_malformed(&self, message: &SqsMessage, reason: &QueueError) {
        error!(
            queue_url = %self.queue_url,
            message_id = message.message_id().unwrap_or_default(),
            error = %reason,
            "Dropping malformed message"
        );

        if let Some(handle) = message.receipt_handle() {
            if let Err(e) = self.delete(handle).await {
                warn!(error = %e, "Failed to delete malformed message");
            }
        }
    }
}

#[async_trait]
impl QueueConsumer for SqsClient {
    async fn start(
        &self,
        cancel: CancellationToken,
        sink: mpsc::Sender<QueueEnvelope>,
    ) -> Result<(), QueueError> {
        info!(queue_url = %self.queue_url, "Polling started");

        loop {
            let received = tokio::select! {
                _ = cancel.cancelled() => break,
                received = self.receive() => received,
            };

            let messages = match received {
                Ok(messages) => messages,
                Err(e) => {
                    warn!(queue_url = %self.queue_url, error = %e, "Receive failed, pausing");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = sleep(RECEIVE_ERROR_PAUSE) => continue,
                    }
                }
            };

            if !messages.is_empty() {
                debug!(count = messages.len(), "Received messages");
            }

            for message in messages {
                match Self::decode(&message) {
                    Ok(envelope) => {
                        if sink.send(envelope).await.is_err() {
                            debug!("Delivery channel closed, stopping poller");
                            return Ok(());
                        }
                    }
                    Err(e) => self.drop_malformed(&message, &e).await,
                }
            }
        }

        info!(queue_url = %self.queue_url, "Polling stopped");
        Ok(())
    }

    async fn ack(&self, token: &AckToken) -> Result<(), QueueError> {
        let AckToken::ReceiptHandle(receipt_handle) = token else {
            return Err(QueueError::ForeignAckToken {
                backend: "SQS",
                token: token.to_string(),
            });
        };

        self.delete(receipt_handle).await?;

        debug!(queue_url = %self.queue_url, "Message acknowledged");
        Ok(())
    }

    async fn check_health(&self) -> Result<(), QueueError> {
        self.client
            .get_queue_attributes()
            .queue_url(&self.queue_url)
            .send()
            .await
            .map_err(|e| QueueError::Unavailable(e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl QueuePublisher for SqsClient {
    async fn publish(
        &self,
        destination: &str,
        payload: &NotificationPayload,
    ) -> Result<(), QueueError> {
        let body = serde_json::to_string(payload)?;

        let mut request = self
            .client
            .send_message()
            .queue_url(destination)
            .message_body(body);

        if destination.ends_with(".fifo") {
            request = request
                .message_group_id(&payload.topic)
                .message_deduplication_id(&payload.hash);
        }

        let output = request
            .send()
            .await
            .map_err(|e| QueueError::Sqs(e.to_string()))?;

        debug!(
            notification_id = %payload.id,
            queue_url = destination,
            message_id = output.message_id().unwrap_or_default(),
            "Notification published"
        );
        Ok(())
    }
}
