use std::sync::Arc;

use anyhow::{Error, Result};
use async_trait::async_trait;

use crate::{
    clients::records::RecordServiceClient,
    models::{
        notification::{Channel, RenderedMessage},
        records::{InAppBatch, Recipient},
    },
    providers::ChannelSender,
};

pub struct InAppSender {
    records: Arc<RecordServiceClient>,
}

impl InAppSender {
    pub fn new(records: Arc<RecordServiceClient>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl ChannelSender for InAppSender {
    fn channel(&self) -> Channel {
        Channel::InApp
    }

    async fn send(&self, message: &RenderedMessage, recipients: &[Recipient]) -> Result<(), Error> {
        let batch = InAppBatch {
            notification_id: message.notification_id.clone(),
            topic: message.topic.clone(),
            priority: message.priority,
            title: message.title.clone(),
            contents: message.body.clone(),
            user_ids: recipients.iter().map(|r| r.id.clone()).collect(),
        };

        self.records.deliver_in_app(&batch).await?;
        Ok(())
    }
}
