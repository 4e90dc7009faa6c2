use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use tracing::{debug, info, warn};

use crate::{
    config::Config,
    models::{
        notification::{Channel, RenderedMessage},
        records::Recipient,
    },
    providers::ChannelSender,
};

/// Sends one message per recipient. Any submission failure fails the whole batch.
pub struct EmailSender<T = AsyncSmtpTransport<Tokio1Executor>> {
    transport: T,
    from: Mailbox,
}

impl EmailSender {
    /// Returns `None` when no SMTP relay is configured.
    pub fn from_config(config: &Config) -> Result<Option<Self>, Error> {
        let Some(host) = &config.smtp_host else {
            return Ok(None);
        };
        let from = config
            .smtp_from
            .as_deref()
            .ok_or_else(|| anyhow!("SMTP_FROM is required when SMTP_HOST is set"))?
            .parse::<Mailbox>()
            .map_err(|e| anyhow!("Invalid SMTP_FROM address: {}", e))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(host)?.port(config.smtp_port);

        if let (Some(user), Some(pass)) = (&config.smtp_username, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        info!(host = %host, port = config.smtp_port, "SMTP transport initialized");

        Ok(Some(Self::new(builder.build(), from)))
    }
}

impl<T> EmailSender<T> {
    pub fn new(transport: T, from: Mailbox) -> Self {
        Self { transport, from }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn build_message(&self, message: &RenderedMessage, recipient: &Recipient) -> Result<Message, Error> {
        let address = recipient
            .email
            .as_deref()
            .ok_or_else(|| anyhow!("recipient {} has no e-mail address", recipient.id))?;

        let name = (!recipient.name.is_empty()).then(|| recipient.name.clone());
        let to = Mailbox::new(name, address.parse()?);

        let content_type = if message.is_html {
            ContentType::TEXT_HTML
        } else {
            ContentType::TEXT_PLAIN
        };

        Ok(Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(&message.title)
            .header(content_type)
            .body(message.body.clone())?)
    }
}

#[async_trait]
impl<T> ChannelSender for EmailSender<T>
where
    T: AsyncTransport + Send + Sync,
    T::Error: std::error::Error + Send + Sync + 'static,
{
    fn channel(&self) -> Channel {
        Channel::Email
    }

    fn can_address(&self, recipient: &Recipient) -> bool {
        recipient.email.as_deref().is_some_and(|email| !email.is_empty())
    }

    async fn send(&self, message: &RenderedMessage, recipients: &[Recipient]) -> Result<(), Error> {
        for recipient in recipients {
            let email = self.build_message(message, recipient)?;

            if let Err(e) = self.transport.send(email).await {
                warn!(
                    notification_id = %message.notification_id,
                    recipient = %recipient.id,
                    error = %e,
                    "E-mail submission failed"
                );
                return Err(anyhow!("e-mail submission to {} failed: {}", recipient.id, e));
            }
        }

        debug!(
            notification_id = %message.notification_id,
            recipients = recipients.len(),
            "E-mail batch submitted"
        );

        Ok(())
    }
}
