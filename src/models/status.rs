use std::fmt::{Display, Formatter, Result};

use serde::{Deserialize, Serialize};

use crate::models::notification::Channel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NotificationStatus {
    Created,
    Queued,
    Sending,
    Sent,
    Failed,
    Canceled,
}

/// Outcome of one recipient on one channel. Rows with `Sent` form the dedup ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecipientStatus {
    Sending,
    Sent,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipientNotificationStatus {
    pub notification_id: String,
    pub user_id: String,
    pub channel: Channel,
    pub status: RecipientStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl RecipientNotificationStatus {
    pub fn sent(notification_id: &str, user_id: &str, channel: Channel) -> Self {
        Self {
            notification_id: notification_id.to_string(),
            user_id: user_id.to_string(),
            channel,
            status: RecipientStatus::Sent,
            error_message: None,
        }
    }

    pub fn failed(notification_id: &str, user_id: &str, channel: Channel, error: String) -> Self {
        Self {
            notification_id: notification_id.to_string(),
            user_id: user_id.to_string(),
            channel,
            status: RecipientStatus::Failed,
            error_message: Some(error),
        }
    }
}

impl Display for NotificationStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            NotificationStatus::Created => write!(f, "CREATED"),
            NotificationStatus::Queued => write!(f, "QUEUED"),
            NotificationStatus::Sending => write!(f, "SENDING"),
            NotificationStatus::Sent => write!(f, "SENT"),
            NotificationStatus::Failed => write!(f, "FAILED"),
            NotificationStatus::Canceled => write!(f, "CANCELED"),
        }
    }
}

impl Display for RecipientStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            RecipientStatus::Sending => write!(f, "SENDING"),
            RecipientStatus::Sent => write!(f, "SENT"),
            RecipientStatus::Failed => write!(f, "FAILED"),
        }
    }
}
