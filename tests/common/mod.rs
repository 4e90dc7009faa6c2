#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use delivery_worker::{
    clients::{QueueConsumer, QueuePublisher},
    errors::{ClientError, QueueError},
    models::{
        envelope::{AckToken, QueueEnvelope},
        notification::{Channel, Content, NotificationPayload, Priority, RenderedMessage},
        records::{Recipient, Template},
        status::{NotificationStatus, RecipientNotificationStatus, RecipientStatus},
    },
    providers::{ChannelSender, RecipientProvider, StatusProvider, StatusUpdater, TemplateProvider},
    worker::Worker,
};
use reqwest::StatusCode;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub fn unavailable() -> ClientError {
    ClientError::Status {
        status: StatusCode::SERVICE_UNAVAILABLE,
        body: "record service down".to_string(),
    }
}

pub fn not_found(what: &str) -> ClientError {
    ClientError::Status {
        status: StatusCode::NOT_FOUND,
        body: format!("{} not found", what),
    }
}

pub fn raw_payload(id: &str, recipients: &[&str], channels: &[Channel]) -> NotificationPayload {
    NotificationPayload {
        id: id.to_string(),
        hash: format!("hash-{}", id),
        topic: "billing".to_string(),
        priority: Priority::High,
        channels: channels.to_vec(),
        recipients: recipients.iter().map(|r| r.to_string()).collect(),
        distribution_list: None,
        content: Content::Raw {
            title: "Invoice ready".to_string(),
            contents: "Your invoice is ready".to_string(),
        },
    }
}

pub fn envelope(payload: NotificationPayload, tag: u64) -> QueueEnvelope {
    QueueEnvelope {
        message_id: format!("msg-{}", tag),
        ack_token: AckToken::DeliveryTag(tag),
        payload,
    }
}

pub fn profile(id: &str) -> Recipient {
    Recipient {
        id: id.to_string(),
        name: format!("User {}", id),
        email: Some(format!("{}@example.com", id)),
        phone: None,
    }
}

#[derive(Default)]
pub struct FakeConsumer {
    pub queued: Mutex<Vec<QueueEnvelope>>,
    pub acks: Mutex<Vec<AckToken>>,
}

impl FakeConsumer {
    pub fn with_messages(messages: Vec<QueueEnvelope>) -> Self {
        Self {
            queued: Mutex::new(messages),
            acks: Mutex::default(),
        }
    }

    pub fn acks(&self) -> Vec<AckToken> {
        self.acks.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueueConsumer for FakeConsumer {
    async fn start(
        &self,
        _cancel: CancellationToken,
        sink: mpsc::Sender<QueueEnvelope>,
    ) -> Result<(), QueueError> {
        let queued: Vec<_> = self.queued.lock().unwrap().drain(..).collect();
        for envelope in queued {
            if sink.send(envelope).await.is_err() {
                break;
            }
        }
        Ok(())
    }

    async fn ack(&self, token: &AckToken) -> Result<(), QueueError> {
        self.acks.lock().unwrap().push(token.clone());
        Ok(())
    }

    async fn check_health(&self) -> Result<(), QueueError> {
        Ok(())
    }
}

/// In-memory record service. The ledger upserts by (user, channel) like the real one.
#[derive(Default)]
pub struct FakeRecords {
    pub status: Mutex<Option<NotificationStatus>>,
    pub distribution_lists: Mutex<HashMap<String, Vec<String>>>,
    pub profiles: Mutex<HashMap<String, Recipient>>,
    pub templates: Mutex<HashMap<String, Template>>,
    pub ledger: Mutex<Vec<RecipientNotificationStatus>>,
    pub status_updates: Mutex<Vec<(NotificationStatus, Option<String>)>>,
    pub fail_ledger_reads: AtomicBool,
    pub fail_status_updates: AtomicBool,
    pub distribution_list_calls: AtomicUsize,
    pub profile_calls: AtomicUsize,
}

impl FakeRecords {
    pub fn with_status(status: NotificationStatus) -> Self {
        let records = Self::default();
        *records.status.lock().unwrap() = Some(status);
        records
    }

    pub fn add_profiles(&self, ids: &[&str]) {
        let mut profiles = self.profiles.lock().unwrap();
        for id in ids {
            profiles.insert(id.to_string(), profile(id));
        }
    }

    pub fn add_ledger_row(&self, row: RecipientNotificationStatus) {
        self.ledger.lock().unwrap().push(row);
    }

    pub fn ledger_row(&self, user_id: &str, channel: Channel) -> Option<RecipientNotificationStatus> {
        self.ledger
            .lock()
            .unwrap()
            .iter()
            .find(|row| row.user_id == user_id && row.channel == channel)
            .cloned()
    }

    pub fn status_updates(&self) -> Vec<(NotificationStatus, Option<String>)> {
        self.status_updates.lock().unwrap().clone()
    }

    pub fn last_status(&self) -> Option<NotificationStatus> {
        self.status_updates.lock().unwrap().last().map(|(status, _)| *status)
    }
}

#[async_trait]
impl RecipientProvider for FakeRecords {
    async fn distribution_list_members(&self, name: &str) -> Result<Vec<String>, ClientError> {
        self.distribution_list_calls.fetch_add(1, Ordering::SeqCst);
        self.distribution_lists
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| not_found("distribution list"))
    }

    async fn recipient(&self, user_id: &str) -> Result<Recipient, ClientError> {
        self.profile_calls.fetch_add(1, Ordering::SeqCst);
        self.profiles
            .lock()
            .unwrap()
            .get(user_id)
            .cloned()
            .ok_or_else(|| not_found("recipient"))
    }
}

#[async_trait]
impl TemplateProvider for FakeRecords {
    async fn template(&self, template_id: &str) -> Result<Template, ClientError> {
        self.templates
            .lock()
            .unwrap()
            .get(template_id)
            .cloned()
            .ok_or_else(|| not_found("template"))
    }
}

#[async_trait]
impl StatusProvider for FakeRecords {
    async fn notification_status(
        &self,
        _notification_id: &str,
    ) -> Result<NotificationStatus, ClientError> {
        (*self.status.lock().unwrap()).ok_or_else(unavailable)
    }

    async fn recipient_statuses(
        &self,
        _notification_id: &str,
        channels: &[Channel],
        statuses: &[RecipientStatus],
    ) -> Result<Vec<RecipientNotificationStatus>, ClientError> {
        if self.fail_ledger_reads.load(Ordering::SeqCst) {
            return Err(unavailable());
        }

        Ok(self
            .ledger
            .lock()
            .unwrap()
            .iter()
            .filter(|row| channels.is_empty() || channels.contains(&row.channel))
            .filter(|row| statuses.is_empty() || statuses.contains(&row.status))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl StatusUpdater for FakeRecords {
    async fn update_status(
        &self,
        _notification_id: &str,
        status: NotificationStatus,
        error_message: Option<String>,
    ) -> Result<(), ClientError> {
        if self.fail_status_updates.load(Ordering::SeqCst) {
            return Err(unavailable());
        }

        self.status_updates.lock().unwrap().push((status, error_message));
        *self.status.lock().unwrap() = Some(status);
        Ok(())
    }

    async fn update_recipient_statuses(
        &self,
        _notification_id: &str,
        statuses: &[RecipientNotificationStatus],
    ) -> Result<(), ClientError> {
        let mut ledger = self.ledger.lock().unwrap();
        for row in statuses {
            ledger.retain(|r| !(r.user_id == row.user_id && r.channel == row.channel));
            ledger.push(row.clone());
        }
        Ok(())
    }
}

pub struct FakeSender {
    channel: Channel,
    fail: bool,
    pub batches: Mutex<Vec<Vec<String>>>,
    pub messages: Mutex<Vec<RenderedMessage>>,
}

impl FakeSender {
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            fail: false,
            batches: Mutex::default(),
            messages: Mutex::default(),
        }
    }

    pub fn failing(channel: Channel) -> Self {
        Self {
            fail: true,
            ..Self::new(channel)
        }
    }

    pub fn batches(&self) -> Vec<Vec<String>> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChannelSender for FakeSender {
    fn channel(&self) -> Channel {
        self.channel
    }

    fn can_address(&self, recipient: &Recipient) -> bool {
        self.channel != Channel::Email || recipient.email.is_some()
    }

    async fn send(&self, message: &RenderedMessage, recipients: &[Recipient]) -> Result<()> {
        self.batches
            .lock()
            .unwrap()
            .push(recipients.iter().map(|r| r.id.clone()).collect());
        self.messages.lock().unwrap().push(message.clone());

        if self.fail {
            Err(anyhow!("smtp relay refused connection"))
        } else {
            Ok(())
        }
    }
}

#[derive(Default)]
pub struct FakeQueue {
    pub fail: bool,
    pub published: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl QueuePublisher for FakeQueue {
    async fn publish(
        &self,
        destination: &str,
        payload: &NotificationPayload,
    ) -> Result<(), QueueError> {
        if self.fail {
            return Err(QueueError::Unavailable("broker closed the channel".to_string()));
        }

        self.published
            .lock()
            .unwrap()
            .push((destination.to_string(), payload.id.clone()));
        Ok(())
    }
}

pub struct Harness {
    pub consumer: Arc<FakeConsumer>,
    pub records: Arc<FakeRecords>,
    pub in_app: Arc<FakeSender>,
    pub email: Arc<FakeSender>,
    pub worker: Worker,
}

impl Harness {
    pub fn new(records: FakeRecords) -> Self {
        Self::with_senders(records, FakeSender::new(Channel::InApp), FakeSender::new(Channel::Email))
    }

    pub fn with_senders(records: FakeRecords, in_app: FakeSender, email: FakeSender) -> Self {
        let consumer = Arc::new(FakeConsumer::default());
        let records = Arc::new(records);
        let in_app = Arc::new(in_app);
        let email = Arc::new(email);

        let worker = Worker::new(
            consumer.clone(),
            records.clone(),
            records.clone(),
            records.clone(),
            records.clone(),
        )
        .with_sender(in_app.clone())
        .with_sender(email.clone());

        Self {
            consumer,
            records,
            in_app,
            email,
            worker,
        }
    }
}
