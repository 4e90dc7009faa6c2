use std::{collections::HashMap, sync::Arc, time::Instant};

use chrono::Utc;
use reqwest::Client;
use tracing::{debug, warn};

use crate::{
    clients::QueueConsumer,
    models::health::{HealthCheckResponse, HealthStatus, ServiceHealth},
};

pub struct HealthChecker {
    consumer: Arc<dyn QueueConsumer>,
    http_client: Client,
    record_service_url: String,
}

impl HealthChecker {
    pub fn new(
        consumer: Arc<dyn QueueConsumer>,
        http_client: Client,
        record_service_url: &str,
    ) -> Self {
        Self {
            consumer,
            http_client,
            record_service_url: record_service_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn check_all(&self) -> HealthCheckResponse {
        let mut checks = HashMap::new();

        checks.insert("message_broker".to_string(), self.check_broker().await);
        checks.insert("record_service".to_string(), self.check_record_service().await);

        let status = determine_overall_status(&checks);

        HealthCheckResponse {
            status,
            timestamp: Utc::now(),
            checks,
        }
    }

    async fn check_broker(&self) -> ServiceHealth {
        let start = Instant::now();

        match self.consumer.check_health().await {
            Ok(()) => {
                let elapsed = start.elapsed().as_millis() as u64;
                debug!(response_time_ms = elapsed, "Broker health check passed");
                ServiceHealth::healthy(elapsed)
            }
            Err(e) => {
                warn!(error = %e, "Broker health check failed");
                ServiceHealth::unhealthy(e.to_string())
            }
        }
    }

    /// An unreachable record service only degrades the worker: messages stay on the
    /// queue until it recovers.
    async fn check_record_service(&self) -> ServiceHealth {
        let start = Instant::now();
        let url = format!("{}/health", self.record_service_url);

        match self.http_client.get(&url).send().await {
            Ok(response) if response.status().is_success() => {
                let elapsed = start.elapsed().as_millis() as u64;
                debug!(response_time_ms = elapsed, "Record service health check passed");
                ServiceHealth::healthy(elapsed)
            }
            Ok(response) => {
                warn!(status = %response.status(), "Record service reported unhealthy");
                ServiceHealth::degraded(format!("Health endpoint returned {}", response.status()))
            }
            Err(e) => {
                warn!(error = %e, "Record service unreachable");
                ServiceHealth::degraded(format!("Connection failed: {}", e))
            }
        }
    }
}

fn determine_overall_status(checks: &HashMap<String, ServiceHealth>) -> HealthStatus {
    if checks.values().any(|c| c.status == HealthStatus::Unhealthy) {
        HealthStatus::Unhealthy
    } else if checks.values().any(|c| c.status == HealthStatus::Degraded) {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    }
}
