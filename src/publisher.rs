use std::sync::Arc;

use tracing::{info, warn};

use crate::{
    clients::QueuePublisher,
    errors::PublishError,
    models::{
        notification::NotificationPayload, routing::PriorityQueueRouting,
        status::NotificationStatus,
    },
    providers::StatusUpdater,
};

/// Enqueues notifications on the destination matching their priority and records
/// the outcome on the notification.
pub struct PriorityPublisher {
    routing: PriorityQueueRouting,
    queue: Arc<dyn QueuePublisher>,
    status_updater: Arc<dyn StatusUpdater>,
}

impl PriorityPublisher {
    pub fn new(
        routing: PriorityQueueRouting,
        queue: Arc<dyn QueuePublisher>,
        status_updater: Arc<dyn StatusUpdater>,
    ) -> Self {
        Self {
            routing,
            queue,
            status_updater,
        }
    }

    pub async fn publish(&self, notification: &NotificationPayload) -> Result<(), PublishError> {
        let destination = self
            .routing
            .destination(notification.priority)
            .ok_or(PublishError::Unrouted(notification.priority))?;

        let enqueued = self.queue.publish(destination, notification).await;

        let (status, error_message) = match &enqueued {
            Ok(()) => (NotificationStatus::Queued, None),
            Err(e) => {
                warn!(
                    notification_id = %notification.id,
                    destination,
                    error = %e,
                    "Failed to enqueue notification"
                );
                (NotificationStatus::Failed, Some(e.to_string()))
            }
        };

        let updated = self
            .status_updater
            .update_status(&notification.id, status, error_message)
            .await;

        match (enqueued, updated) {
            (Ok(()), Ok(())) => {
                info!(
                    notification_id = %notification.id,
                    priority = %notification.priority,
                    destination,
                    "Notification queued"
                );
                Ok(())
            }
            (Err(enqueue), Ok(())) => Err(PublishError::Enqueue(enqueue)),
            (Ok(()), Err(status)) => Err(PublishError::StatusUpdate(status)),
            (Err(enqueue), Err(status)) => {
                Err(PublishError::EnqueueAndStatusUpdate { enqueue, status })
            }
        }
    }
}
