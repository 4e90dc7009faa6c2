use std::{
    collections::{BTreeMap, BTreeSet, HashMap, HashSet},
    sync::Arc,
};

use anyhow::{Error, Result, anyhow};
use futures_util::future::join_all;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    clients::QueueConsumer,
    errors::ClientError,
    models::{
        envelope::QueueEnvelope,
        notification::{Channel, Content, NotificationPayload, RenderedMessage},
        records::Recipient,
        status::{NotificationStatus, RecipientNotificationStatus, RecipientStatus},
    },
    providers::{ChannelSender, RecipientProvider, StatusProvider, StatusUpdater, TemplateProvider},
    utils::render_template,
};

const DEFAULT_BUFFER: usize = 16;

/// How processing of one message ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The notification was canceled before delivery started.
    Canceled,
    /// Every recipient already had a `SENT` ledger row on every channel.
    AlreadyDelivered,
    /// No recipient could be resolved from the payload; nothing is owed.
    NoRecipients,
    /// Every pending recipient was delivered on every channel.
    Sent,
    /// Some delivery or bookkeeping step failed; the ledger records what succeeded.
    Failed { reason: String },
    /// Processing stopped before any delivery was attempted.
    Aborted { reason: String },
}

impl Outcome {
    pub fn should_acknowledge(&self) -> bool {
        matches!(
            self,
            Outcome::Canceled | Outcome::AlreadyDelivered | Outcome::NoRecipients | Outcome::Sent
        )
    }
}

struct ChannelReport {
    rows: Vec<RecipientNotificationStatus>,
    errors: Vec<String>,
}

pub struct Worker {
    consumer: Arc<dyn QueueConsumer>,
    recipients: Arc<dyn RecipientProvider>,
    templates: Arc<dyn TemplateProvider>,
    statuses: Arc<dyn StatusProvider>,
    status_updater: Arc<dyn StatusUpdater>,
    senders: HashMap<Channel, Arc<dyn ChannelSender>>,
    buffer: usize,
}

impl Worker {
    pub fn new(
        consumer: Arc<dyn QueueConsumer>,
        recipients: Arc<dyn RecipientProvider>,
        templates: Arc<dyn TemplateProvider>,
        statuses: Arc<dyn StatusProvider>,
        status_updater: Arc<dyn StatusUpdater>,
    ) -> Self {
        Self {
            consumer,
            recipients,
            templates,
            statuses,
            status_updater,
            senders: HashMap::new(),
            buffer: DEFAULT_BUFFER,
        }
    }

    pub fn with_sender(mut self, sender: Arc<dyn ChannelSender>) -> Self {
        self.senders.insert(sender.channel(), sender);
        self
    }

    pub fn with_buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer.max(1);
        self
    }

    /// Drains the consumer one message at a time until `cancel` fires or the
    /// consumer stops on its own. A message already being processed is finished.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), Error> {
        let (sink, mut deliveries) = mpsc::channel(self.buffer);

        let consumer = Arc::clone(&self.consumer);
        let consumer_cancel = cancel.clone();
        let receiver = tokio::spawn(async move { consumer.start(consumer_cancel, sink).await });

        info!(channels = ?self.senders.keys().collect::<Vec<_>>(), "Worker started");

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => break,
                next = deliveries.recv() => next,
            };

            let Some(envelope) = next else {
                debug!("Consumer closed the delivery channel");
                break;
            };

            self.handle(envelope).await;
        }

        // Unblocks a consumer waiting on a full channel.
        drop(deliveries);

        receiver
            .await
            .map_err(|e| anyhow!("Consumer task failed: {}", e))??;

        info!("Worker stopped");
        Ok(())
    }

    /// Processes one envelope and acknowledges it when nothing is left to retry.
    pub async fn handle(&self, envelope: QueueEnvelope) -> Outcome {
        let notification_id = envelope.payload.id.clone();

        info!(
            notification_id = %notification_id,
            message_id = %envelope.message_id,
            priority = %envelope.payload.priority,
            "Processing notification"
        );

        let outcome = self.process(&envelope.payload).await;

        if outcome.should_acknowledge() {
            match self.consumer.ack(&envelope.ack_token).await {
                Ok(()) => info!(
                    notification_id = %notification_id,
                    outcome = ?outcome,
                    "Message acknowledged"
                ),
                Err(e) => error!(
                    notification_id = %notification_id,
                    error = %e,
                    "Failed to acknowledge message"
                ),
            }
        } else {
            warn!(
                notification_id = %notification_id,
                outcome = ?outcome,
                "Message left for redelivery"
            );
        }

        outcome
    }

    async fn process(&self, payload: &NotificationPayload) -> Outcome {
        let id = payload.id.as_str();

        let current = match self.statuses.notification_status(id).await {
            Ok(status) => status,
            Err(e) => return self.abort(id, format!("failed to fetch status: {}", e)).await,
        };

        if current == NotificationStatus::Canceled {
            info!(notification_id = %id, "Notification canceled, skipping delivery");
            return Outcome::Canceled;
        }

        if let Err(e) = self
            .status_updater
            .update_status(id, NotificationStatus::Sending, None)
            .await
        {
            return self.abort(id, format!("failed to mark as sending: {}", e)).await;
        }

        let recipients = match self.resolve_recipients(payload).await {
            Ok(recipients) => recipients,
            Err(e) => return self.abort(id, format!("failed to resolve recipients: {}", e)).await,
        };

        if recipients.is_empty() {
            info!(notification_id = %id, "Notification resolved to no recipients");
            return match self
                .status_updater
                .update_status(id, NotificationStatus::Sent, None)
                .await
            {
                Ok(()) => Outcome::NoRecipients,
                Err(e) => Outcome::Aborted {
                    reason: format!("failed to mark as sent: {}", e),
                },
            };
        }

        let channels: Vec<Channel> = payload
            .channels
            .iter()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let delivered = match self
            .statuses
            .recipient_statuses(id, &channels, &[RecipientStatus::Sent])
            .await
        {
            Ok(rows) => rows,
            Err(e) => return self.abort(id, format!("failed to fetch ledger: {}", e)).await,
        };

        let pending = pending_by_channel(&recipients, &channels, &delivered);

        if pending.values().all(Vec::is_empty) {
            info!(notification_id = %id, "Every recipient already delivered");
            return match self
                .status_updater
                .update_status(id, NotificationStatus::Sent, None)
                .await
            {
                Ok(()) => Outcome::AlreadyDelivered,
                Err(e) => Outcome::Aborted {
                    reason: format!("failed to mark as sent: {}", e),
                },
            };
        }

        let mut failures = Vec::new();

        let remaining: Vec<&String> = recipients
            .iter()
            .filter(|user_id| pending.values().any(|ids| ids.contains(*user_id)))
            .collect();
        let profiles = self.lookup_profiles(id, &remaining, &mut failures).await;

        let message = match self.render(payload).await {
            Ok(message) => message,
            Err(e) => return self.abort(id, format!("failed to fetch template: {}", e)).await,
        };

        let reports = join_all(
            pending
                .iter()
                .filter(|(_, user_ids)| !user_ids.is_empty())
                .map(|(channel, user_ids)| {
                    self.deliver_channel(&message, *channel, user_ids, &profiles)
                }),
        )
        .await;

        let mut rows = Vec::new();
        for report in reports {
            rows.extend(report.rows);
            failures.extend(report.errors);
        }

        let (status, error_message) = if failures.is_empty() {
            (NotificationStatus::Sent, None)
        } else {
            (NotificationStatus::Failed, Some(failures.join("; ")))
        };

        if let Err(e) = self
            .status_updater
            .update_status(id, status, error_message)
            .await
        {
            error!(notification_id = %id, error = %e, "Failed to record final status");
            failures.push(format!("failed to record status {}: {}", status, e));
        }

        if let Err(e) = self.status_updater.update_recipient_statuses(id, &rows).await {
            error!(notification_id = %id, error = %e, "Failed to record recipient statuses");
            failures.push(format!("failed to record recipient statuses: {}", e));
        }

        if failures.is_empty() {
            info!(notification_id = %id, rows = rows.len(), "Notification sent");
            Outcome::Sent
        } else {
            Outcome::Failed {
                reason: failures.join("; "),
            }
        }
    }

    /// Marks the notification failed for visibility; the message stays on the queue.
    async fn abort(&self, id: &str, reason: String) -> Outcome {
        error!(notification_id = %id, reason = %reason, "Aborting notification");

        if let Err(e) = self
            .status_updater
            .update_status(id, NotificationStatus::Failed, Some(reason.clone()))
            .await
        {
            warn!(notification_id = %id, error = %e, "Failed to mark notification as failed");
        }

        Outcome::Aborted { reason }
    }

    /// Explicit recipients followed by distribution list members, without duplicates.
    async fn resolve_recipients(
        &self,
        payload: &NotificationPayload,
    ) -> Result<Vec<String>, ClientError> {
        let mut members = Vec::new();
        if let Some(list) = &payload.distribution_list {
            members = self.recipients.distribution_list_members(list).await?;
            debug!(
                notification_id = %payload.id,
                distribution_list = %list,
                members = members.len(),
                "Distribution list resolved"
            );
        }

        let mut seen = HashSet::new();
        Ok(payload
            .recipients
            .iter()
            .cloned()
            .chain(members)
            .filter(|user_id| seen.insert(user_id.clone()))
            .collect())
    }

    async fn lookup_profiles(
        &self,
        id: &str,
        user_ids: &[&String],
        failures: &mut Vec<String>,
    ) -> HashMap<String, Recipient> {
        let mut profiles = HashMap::with_capacity(user_ids.len());

        for user_id in user_ids {
            match self.recipients.recipient(user_id).await {
                Ok(profile) => {
                    profiles.insert(user_id.to_string(), profile);
                }
                Err(e) => {
                    warn!(
                        notification_id = %id,
                        user_id = %user_id,
                        error = %e,
                        "Profile lookup failed, skipping recipient"
                    );
                    failures.push(format!("profile lookup for {} failed: {}", user_id, e));
                }
            }
        }

        profiles
    }

    async fn render(&self, payload: &NotificationPayload) -> Result<RenderedMessage, ClientError> {
        let (title, body, is_html) = match &payload.content {
            Content::Raw { title, contents } => (title.clone(), contents.clone(), false),
            Content::Template(reference) => {
                let template = self.templates.template(&reference.template_id).await?;
                (
                    render_template(&template.title, &reference.variables),
                    render_template(&template.contents, &reference.variables),
                    template.is_html,
                )
            }
        };

        Ok(RenderedMessage {
            notification_id: payload.id.clone(),
            topic: payload.topic.clone(),
            priority: payload.priority,
            title,
            body,
            is_html,
        })
    }

    async fn deliver_channel(
        &self,
        message: &RenderedMessage,
        channel: Channel,
        user_ids: &[String],
        profiles: &HashMap<String, Recipient>,
    ) -> ChannelReport {
        let id = message.notification_id.as_str();
        let mut report = ChannelReport {
            rows: Vec::new(),
            errors: Vec::new(),
        };

        let Some(sender) = self.senders.get(&channel) else {
            let error = format!("no sender configured for channel {}", channel);
            warn!(notification_id = %id, channel = %channel, "No sender configured");
            report.rows = user_ids
                .iter()
                .filter(|user_id| profiles.contains_key(*user_id))
                .map(|user_id| RecipientNotificationStatus::failed(id, user_id, channel, error.clone()))
                .collect();
            report.errors.push(error);
            return report;
        };

        let mut batch = Vec::new();
        for user_id in user_ids {
            let Some(profile) = profiles.get(user_id) else {
                continue;
            };

            if sender.can_address(profile) {
                batch.push(profile.clone());
            } else {
                let error = format!("recipient has no {} address", channel);
                report
                    .rows
                    .push(RecipientNotificationStatus::failed(id, user_id, channel, error.clone()));
                report.errors.push(format!("{}: {}", user_id, error));
            }
        }

        if batch.is_empty() {
            return report;
        }

        match sender.send(message, &batch).await {
            Ok(()) => {
                debug!(notification_id = %id, channel = %channel, recipients = batch.len(), "Batch delivered");
                report.rows.extend(
                    batch
                        .iter()
                        .map(|r| RecipientNotificationStatus::sent(id, &r.id, channel)),
                );
            }
            Err(e) => {
                warn!(notification_id = %id, channel = %channel, error = %e, "Batch delivery failed");
                let error = e.to_string();
                report.rows.extend(batch.iter().map(|r| {
                    RecipientNotificationStatus::failed(id, &r.id, channel, error.clone())
                }));
                report.errors.push(format!("{} delivery failed: {}", channel, error));
            }
        }

        report
    }
}

/// Recipients still owed a delivery on each channel, in resolution order.
fn pending_by_channel(
    recipients: &[String],
    channels: &[Channel],
    delivered: &[RecipientNotificationStatus],
) -> BTreeMap<Channel, Vec<String>> {
    let sent: HashSet<(Channel, &str)> = delivered
        .iter()
        .filter(|row| row.status == RecipientStatus::Sent)
        .map(|row| (row.channel, row.user_id.as_str()))
        .collect();

    channels
        .iter()
        .map(|channel| {
            let pending = recipients
                .iter()
                .filter(|user_id| !sent.contains(&(*channel, user_id.as_str())))
                .cloned()
                .collect();
            (*channel, pending)
        })
        .collect()
}
