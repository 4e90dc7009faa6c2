//! Typed operations the worker performs against the record service and the
//! delivery channels. `RecordServiceClient` implements the record-side traits
//! over HTTP.

use async_trait::async_trait;

use crate::{
    errors::ClientError,
    models::{
        notification::{Channel, RenderedMessage},
        records::{Recipient, Template},
        status::{NotificationStatus, RecipientNotificationStatus, RecipientStatus},
    },
};

#[async_trait]
pub trait RecipientProvider: Send + Sync {
    /// Every member of the distribution list, across all pages.
    async fn distribution_list_members(&self, name: &str) -> Result<Vec<String>, ClientError>;

    /// Delivery profile (name, e-mail, phone) of one user.
    async fn recipient(&self, user_id: &str) -> Result<Recipient, ClientError>;
}

#[async_trait]
pub trait TemplateProvider: Send + Sync {
    async fn template(&self, template_id: &str) -> Result<Template, ClientError>;
}

#[async_trait]
pub trait StatusProvider: Send + Sync {
    async fn notification_status(
        &self,
        notification_id: &str,
    ) -> Result<NotificationStatus, ClientError>;

    /// Ledger rows of the notification, filtered by channel and status. Empty filters
    /// match everything.
    async fn recipient_statuses(
        &self,
        notification_id: &str,
        channels: &[Channel],
        statuses: &[RecipientStatus],
    ) -> Result<Vec<RecipientNotificationStatus>, ClientError>;
}

#[async_trait]
pub trait StatusUpdater: Send + Sync {
    async fn update_status(
        &self,
        notification_id: &str,
        status: NotificationStatus,
        error_message: Option<String>,
    ) -> Result<(), ClientError>;

    async fn update_recipient_statuses(
        &self,
        notification_id: &str,
        statuses: &[RecipientNotificationStatus],
    ) -> Result<(), ClientError>;
}

/// One delivery medium. A batch either succeeds or fails as a whole.
#[async_trait]
pub trait ChannelSender: Send + Sync {
    fn channel(&self) -> Channel;

    /// Whether the recipient's profile carries an address usable on this channel.
    fn can_address(&self, _recipient: &Recipient) -> bool {
        true
    }

    async fn send(&self, message: &RenderedMessage, recipients: &[Recipient])
    -> anyhow::Result<()>;
}
