use std::{
    collections::HashMap,
    fmt::{self, Display, Formatter},
};

use serde::{Deserialize, Serialize};

use crate::errors::PayloadError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Channel {
    #[serde(rename = "in-app")]
    InApp,
    #[serde(rename = "e-mail")]
    Email,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::InApp => "in-app",
            Channel::Email => "e-mail",
        }
    }
}

impl Display for Channel {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Display for Priority {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Priority::High => write!(f, "HIGH"),
            Priority::Medium => write!(f, "MEDIUM"),
            Priority::Low => write!(f, "LOW"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateRef {
    pub template_id: String,

    #[serde(default)]
    pub variables: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    Raw { title: String, contents: String },
    Template(TemplateRef),
}

/// What to send and to whom. Read-only to the delivery pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WirePayload", into = "WirePayload")]
pub struct NotificationPayload {
    pub id: String,
    pub hash: String,
    pub topic: String,
    pub priority: Priority,
    pub channels: Vec<Channel>,
    pub recipients: Vec<String>,
    pub distribution_list: Option<String>,
    pub content: Content,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePayload {
    id: String,
    hash: String,
    topic: String,
    priority: Priority,
    channels: Vec<Channel>,

    #[serde(default)]
    recipients: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    distribution_list: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    contents: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    template: Option<TemplateRef>,
}

impl TryFrom<WirePayload> for NotificationPayload {
    type Error = PayloadError;

    fn try_from(wire: WirePayload) -> Result<Self, Self::Error> {
        let has_raw = wire.title.is_some() || wire.contents.is_some();

        let content = match (wire.template, has_raw) {
            (Some(_), true) => return Err(PayloadError::AmbiguousContent),
            (Some(template), false) => Content::Template(template),
            (None, true) => Content::Raw {
                title: wire.title.unwrap_or_default(),
                contents: wire.contents.unwrap_or_default(),
            },
            (None, false) => return Err(PayloadError::MissingContent),
        };

        if wire.channels.is_empty() {
            return Err(PayloadError::NoChannels);
        }

        Ok(Self {
            id: wire.id,
            hash: wire.hash,
            topic: wire.topic,
            priority: wire.priority,
            channels: wire.channels,
            recipients: wire.recipients,
            distribution_list: wire.distribution_list,
            content,
        })
    }
}

impl From<NotificationPayload> for WirePayload {
    fn from(payload: NotificationPayload) -> Self {
        let (title, contents, template) = match payload.content {
            Content::Raw { title, contents } => (Some(title), Some(contents), None),
            Content::Template(template) => (None, None, Some(template)),
        };

        Self {
            id: payload.id,
            hash: payload.hash,
            topic: payload.topic,
            priority: payload.priority,
            channels: payload.channels,
            recipients: payload.recipients,
            distribution_list: payload.distribution_list,
            title,
            contents,
            template,
        }
    }
}

/// Content after template substitution, shared by every channel of one attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedMessage {
    pub notification_id: String,
    pub topic: String,
    pub priority: Priority,
    pub title: String,
    pub body: String,
    pub is_html: bool,
}
