use std::time::Duration;

use anyhow::{Error, Result, anyhow};
use dotenvy::dotenv;
use serde::Deserialize;

use crate::models::{retry::RetryConfig, routing::PriorityQueueRouting};

#[derive(Clone, Copy, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum QueueBackend {
    Rabbitmq,
    Sqs,
}

#[derive(Clone, Deserialize, Debug)]
pub struct Config {
    pub queue_backend: QueueBackend,
    /// Queue this worker consumes from: an AMQP queue name or an SQS queue URL.
    pub consume_queue: String,

    pub high_priority_queue: Option<String>,
    pub medium_priority_queue: Option<String>,
    pub low_priority_queue: Option<String>,

    pub rabbitmq_url: Option<String>,
    #[serde(default = "default_prefetch_count")]
    pub prefetch_count: u16,

    pub aws_region: Option<String>,
    pub sqs_endpoint_url: Option<String>,
    #[serde(default = "default_sqs_wait_time_seconds")]
    pub sqs_wait_time_seconds: i32,
    #[serde(default = "default_sqs_max_messages")]
    pub sqs_max_messages: i32,
    #[serde(default = "default_sqs_visibility_timeout_seconds")]
    pub sqs_visibility_timeout_seconds: i32,

    pub record_service_url: String,
    pub auth_token_url: Option<String>,
    pub auth_client_id: Option<String>,
    pub auth_client_secret: Option<String>,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    pub max_retry_attempts: u32,
    pub initial_retry_delay_ms: u64,
    pub max_retry_delay_ms: u64,
    #[serde(default = "default_rate_limit_margin_ms")]
    pub rate_limit_margin_ms: u64,

    pub smtp_host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub smtp_from: Option<String>,

    #[serde(default = "default_delivery_buffer")]
    pub delivery_buffer: usize,

    pub server_port: u16,
}

fn default_prefetch_count() -> u16 {
    10
}

fn default_sqs_wait_time_seconds() -> i32 {
    20
}

fn default_sqs_max_messages() -> i32 {
    10
}

fn default_sqs_visibility_timeout_seconds() -> i32 {
    60
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_page_size() -> u32 {
    100
}

fn default_rate_limit_margin_ms() -> u64 {
    100
}

fn default_smtp_port() -> u16 {
    587
}

fn default_delivery_buffer() -> usize {
    16
}

impl Config {
    pub fn load() -> Result<Self, Error> {
        dotenv().ok();

        let config = envy::from_env::<Self>()
            .map_err(|e| anyhow!("Invalid or missing environmental variable: {}", e))?;
        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> Result<(), Error> {
        match self.queue_backend {
            QueueBackend::Rabbitmq if self.rabbitmq_url.is_none() => {
                return Err(anyhow!("RABBITMQ_URL is required for the rabbitmq backend"));
            }
            QueueBackend::Sqs if self.aws_region.is_none() => {
                return Err(anyhow!("AWS_REGION is required for the sqs backend"));
            }
            _ => {}
        }

        if self.smtp_host.is_some() && self.smtp_from.is_none() {
            return Err(anyhow!("SMTP_FROM is required when SMTP_HOST is set"));
        }

        if self.delivery_buffer == 0 {
            return Err(anyhow!("DELIVERY_BUFFER must be greater than zero"));
        }

        Ok(())
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_retry_attempts,
            initial_delay_ms: self.initial_retry_delay_ms,
            max_delay_ms: self.max_retry_delay_ms,
            rate_limit_margin_ms: self.rate_limit_margin_ms,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn routing(&self) -> PriorityQueueRouting {
        PriorityQueueRouting::from_config(self)
    }
}
