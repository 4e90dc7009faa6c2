use reqwest::StatusCode;
use thiserror::Error;

use crate::models::notification::Priority;

#[derive(Error, Debug)]
pub enum PayloadError {
    #[error("payload carries both raw content and a template reference")]
    AmbiguousContent,

    #[error("payload carries neither raw content nor a template reference")]
    MissingContent,

    #[error("payload declares no delivery channels")]
    NoChannels,
}

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("record service returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("failed to acquire bearer token: {0}")]
    Auth(String),

    #[error("request cannot be replayed: {0}")]
    Request(String),
}

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("AMQP error: {0}")]
    Amqp(#[from] lapin::Error),

    #[error("AWS SQS error: {0}")]
    Sqs(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{backend} cannot acknowledge {token}")]
    ForeignAckToken { backend: &'static str, token: String },

    #[error("Broker unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("no queue configured for priority {0}")]
    Unrouted(Priority),

    #[error("failed to enqueue notification: {0}")]
    Enqueue(#[source] QueueError),

    #[error("failed to update notification status: {0}")]
    StatusUpdate(#[source] ClientError),

    #[error("failed to enqueue notification: {enqueue}; failed to update its status: {status}")]
    EnqueueAndStatusUpdate {
        enqueue: QueueError,
        status: ClientError,
    },
}
