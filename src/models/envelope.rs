use std::fmt::{self, Display, Formatter};

use crate::models::notification::NotificationPayload;

/// Broker-specific handle needed to remove a message once it has been processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckToken {
    DeliveryTag(u64),
    ReceiptHandle(String),
}

impl Display for AckToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            AckToken::DeliveryTag(tag) => write!(f, "delivery-tag:{}", tag),
            AckToken::ReceiptHandle(handle) => write!(f, "receipt-handle:{}", handle),
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueueEnvelope {
    pub message_id: String,
    pub ack_token: AckToken,
    pub payload: NotificationPayload,
}

impl QueueEnvelope {
    pub fn decode(
        message_id: String,
        ack_token: AckToken,
        body: &[u8],
    ) -> Result<Self, serde_json::Error> {
        let payload = serde_json::from_slice::<NotificationPayload>(body)?;

        Ok(Self {
            message_id,
            ack_token,
            payload,
        })
    }
}
