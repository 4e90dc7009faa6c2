use serde::{Deserialize, Serialize};

use crate::models::{
    notification::Priority,
    status::{NotificationStatus, RecipientNotificationStatus},
};

/// Shared envelope of every paginated list endpoint of the record service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", bound(deserialize = "T: Deserialize<'de>"))]
pub struct Page<T> {
    #[serde(default)]
    pub next_token: Option<String>,

    #[serde(default)]
    pub prev_token: Option<String>,

    #[serde(default)]
    pub result_count: u64,

    #[serde(default)]
    pub data: Vec<T>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub email: Option<String>,

    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub id: String,
    pub title: String,
    pub contents: String,

    #[serde(default)]
    pub is_html: bool,

    #[serde(default)]
    pub variables: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: NotificationStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusRequest {
    pub status: NotificationStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipientStatusesRequest {
    pub statuses: Vec<RecipientNotificationStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InAppBatch {
    pub notification_id: String,
    pub topic: String,
    pub priority: Priority,
    pub title: String,
    pub contents: String,
    pub user_ids: Vec<String>,
}
