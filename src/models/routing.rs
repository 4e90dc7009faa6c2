use std::collections::HashMap;

use crate::{config::Config, models::notification::Priority};

/// Destination per priority: an AMQP queue name or an SQS queue URL.
#[derive(Debug, Clone, Default)]
pub struct PriorityQueueRouting {
    destinations: HashMap<Priority, String>,
}

impl PriorityQueueRouting {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_destination(mut self, priority: Priority, destination: impl Into<String>) -> Self {
        self.destinations.insert(priority, destination.into());
        self
    }

    pub fn from_config(config: &Config) -> Self {
        let mut routing = Self::new();

        let configured = [
            (Priority::High, &config.high_priority_queue),
            (Priority::Medium, &config.medium_priority_queue),
            (Priority::Low, &config.low_priority_queue),
        ];

        for (priority, destination) in configured {
            if let Some(destination) = destination.as_ref().filter(|d| !d.is_empty()) {
                routing = routing.with_destination(priority, destination.clone());
            }
        }

        routing
    }

    pub fn destination(&self, priority: Priority) -> Option<&str> {
        self.destinations.get(&priority).map(String::as_str)
    }
}
