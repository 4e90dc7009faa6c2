use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    errors::QueueError,
    models::{
        envelope::{AckToken, QueueEnvelope},
        notification::NotificationPayload,
    },
};

pub mod auth;
pub mod email;
pub mod health;
pub mod http;
pub mod in_app;
pub mod rbmq;
pub mod records;
pub mod sqs;

/// Receives notification envelopes from one broker and acknowledges them.
#[async_trait]
pub trait QueueConsumer: Send + Sync {
    /// Forwards every decodable message into `sink` until `cancel` fires or the sink
    /// is closed. Blocks while the sink is full.
    async fn start(
        &self,
        cancel: CancellationToken,
        sink: mpsc::Sender<QueueEnvelope>,
    ) -> Result<(), QueueError>;

    /// Permanently removes one message from the queue.
    async fn ack(&self, token: &AckToken) -> Result<(), QueueError>;

    async fn check_health(&self) -> Result<(), QueueError>;
}

/// Places a serialized payload on a named destination.
#[async_trait]
pub trait QueuePublisher: Send + Sync {
    async fn publish(
        &self,
        destination: &str,
        payload: &NotificationPayload,
    ) -> Result<(), QueueError>;
}
