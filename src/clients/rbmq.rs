use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use futures_util::StreamExt;
use lapin::{
    BasicProperties, Channel, Connection, ConnectionProperties,
    message::Delivery,
    options::{
        BasicAckOptions, BasicCancelOptions, BasicConsumeOptions, BasicPublishOptions,
        BasicQosOptions, BasicRejectOptions, QueueDeclareOptions,
    },
    types::FieldTable,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    clients::{QueueConsumer, QueuePublisher},
    config::Config,
    errors::QueueError,
    models::{
        envelope::{AckToken, QueueEnvelope},
        notification::NotificationPayload,
    },
};

pub struct RabbitMqClient {
    connection: Connection,
    channel: Channel,
    queue_name: String,
}

impl RabbitMqClient {
    pub async fn connect(config: &Config) -> Result<Self, Error> {
        let url = config
            .rabbitmq_url
            .as_deref()
            .ok_or_else(|| anyhow!("RABBITMQ_URL is not configured"))?;

        info!("Connecting to RabbitMQ");

        let connection = Connection::connect(url, ConnectionProperties::default())
            .await
            .map_err(|e| anyhow!("Failed to connect to RabbitMQ: {}", e))?;

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| anyhow!("RabbitMQ channel creation failed: {}", e))?;

        channel
            .basic_qos(config.prefetch_count, BasicQosOptions::default())
            .await
            .map_err(|e| anyhow!("Failed to set up QoS: {}", e))?;

        let routed = [
            &config.high_priority_queue,
            &config.medium_priority_queue,
            &config.low_priority_queue,
        ];
        let mut queues = vec![config.consume_queue.as_str()];
        queues.extend(routed.into_iter().flatten().map(String::as_str));

        for queue in queues {
            Self::declare_queue(&channel, queue).await?;
        }

        info!(
            queue = %config.consume_queue,
            prefetch_count = config.prefetch_count,
            "RabbitMQ channel ready"
        );

        Ok(Self {
            connection,
            channel,
            queue_name: config.consume_queue.clone(),
        })
    }

    async fn declare_queue(channel: &Channel, queue: &str) -> Result<(), Error> {
        channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| anyhow!("Failed to declare queue {}: {}", queue, e))?;

        debug!(queue, "Queue declared");
        Ok(())
    }

    fn message_id(delivery: &Delivery) -> String {
        delivery
            .properties
            .message_id()
            .as_ref()
            .map(|id| id.as_str().to_string())
            .unwrap_or_else(|| delivery.delivery_tag.to_string())
    }

    async fn drop_malformed(&self, delivery: &Delivery, reason: &serde_json::Error) {
        error!(
            queue = %self.queue_name,
            delivery_tag = delivery.delivery_tag,
            error = %reason,
            "Dropping malformed message"
        );

        if let Err(e) = self
            .channel
            .basic_reject(delivery.delivery_tag, BasicRejectOptions { requeue: false })
            .await
        {
            warn!(error = %e, "Failed to reject malformed message");
        }
    }
}

#[async_trait]
impl QueueConsumer for RabbitMqClient {
    async fn start(
        &self,
        cancel: CancellationToken,
        sink: mpsc::Sender<QueueEnvelope>,
    ) -> Result<(), QueueError> {
        let consumer_tag = format!("delivery-worker-{}", Uuid::new_v4());

        let mut consumer = self
            .channel
            .basic_consume(
                &self.queue_name,
                &consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        info!(queue = %self.queue_name, consumer_tag = %consumer_tag, "Consumer started");

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => break,
                next = consumer.next() => next,
            };

            let delivery = match next {
                Some(Ok(delivery)) => delivery,
                Some(Err(e)) => {
                    error!(queue = %self.queue_name, error = %e, "Consumer stream failed");
                    return Err(e.into());
                }
                None => {
                    warn!(queue = %self.queue_name, "Consumer stream closed by broker");
                    return Ok(());
                }
            };

            let message_id = Self::message_id(&delivery);
            let ack_token = AckToken::DeliveryTag(delivery.delivery_tag);

            match QueueEnvelope::decode(message_id, ack_token, &delivery.data) {
                Ok(envelope) => {
                    if sink.send(envelope).await.is_err() {
                        debug!("Delivery channel closed, stopping consumer");
                        break;
                    }
                }
                Err(e) => self.drop_malformed(&delivery, &e).await,
            }
        }

        self.channel
            .basic_cancel(&consumer_tag, BasicCancelOptions::default())
            .await?;

        info!(queue = %self.queue_name, consumer_tag = %consumer_tag, "Consumer canceled");
        Ok(())
    }

    async fn ack(&self, token: &AckToken) -> Result<(), QueueError> {
        let delivery_tag = delivery_tag(token)?;

        self.channel
            .basic_ack(delivery_tag, BasicAckOptions::default())
            .await?;

        debug!(delivery_tag, "Message acknowledged");
        Ok(())
    }

    async fn check_health(&self) -> Result<(), QueueError> {
        if self.connection.status().connected() {
            Ok(())
        } else {
            Err(QueueError::Unavailable(
                "RabbitMQ connection is not open".to_string(),
            ))
        }
    }
}

#[async_trait]
impl QueuePublisher for RabbitMqClient {
    async fn publish(
        &self,
        destination: &str,
        payload: &NotificationPayload,
    ) -> Result<(), QueueError> {
        let body = serde_json::to_vec(payload)?;

        let properties = BasicProperties::default()
            .with_delivery_mode(2)
            .with_content_type("application/json".into())
            .with_message_id(payload.id.clone().into());

        self.channel
            .basic_publish(
                "",
                destination,
                BasicPublishOptions::default(),
                &body,
                properties,
            )
            .await?
            .await?;

        debug!(
            notification_id = %payload.id,
            queue = destination,
            "Notification published"
        );
        Ok(())
    }
}

fn delivery_tag(token: &AckToken) -> Result<u64, QueueError> {
    match token {
        AckToken::DeliveryTag(tag) => Ok(*tag),
        AckToken::ReceiptHandle(_) => Err(QueueError::ForeignAckToken {
            backend: "RabbitMQ",
            token: token.to_string(),
        }),
    }
}
