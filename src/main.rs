use std::sync::Arc;

use anyhow::{Error, Result};
use delivery_worker::{
    api::run_api_server,
    clients::{
        QueueConsumer, email::EmailSender, health::HealthChecker, http::ResilientClient,
        in_app::InAppSender, rbmq::RabbitMqClient, records::RecordServiceClient, sqs::SqsClient,
    },
    config::{Config, QueueBackend},
    worker::Worker,
};
use dotenvy::dotenv;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Error> {
    // RUST_LOG may come from .env, so load it before the subscriber reads the filter.
    dotenv().ok();

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::load().inspect_err(|e| error!(error = %e, "Failed to load configuration"))?;

    // lettre and the AWS SDK pull in different rustls providers; pin one.
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        warn!("A rustls crypto provider was already installed, keeping it");
    }

    let consumer: Arc<dyn QueueConsumer> = match config.queue_backend {
        QueueBackend::Rabbitmq => Arc::new(RabbitMqClient::connect(&config).await?),
        QueueBackend::Sqs => Arc::new(SqsClient::connect(&config).await?),
    };

    let http = ResilientClient::from_config(&config)?;
    let records = Arc::new(RecordServiceClient::new(
        http.clone(),
        &config.record_service_url,
        config.page_size,
    ));

    let mut worker = Worker::new(
        Arc::clone(&consumer),
        records.clone(),
        records.clone(),
        records.clone(),
        records.clone(),
    )
    .with_buffer(config.delivery_buffer)
    .with_sender(Arc::new(InAppSender::new(records.clone())));

    match EmailSender::from_config(&config)? {
        Some(email) => worker = worker.with_sender(Arc::new(email)),
        None => info!("SMTP_HOST not set, e-mail channel disabled"),
    }

    let cancel = CancellationToken::new();

    let health_checker = HealthChecker::new(
        Arc::clone(&consumer),
        http.http_client().clone(),
        &config.record_service_url,
    );
    let api = tokio::spawn(run_api_server(health_checker, config.server_port, cancel.clone()));

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
        }
        shutdown.cancel();
    });

    info!(backend = ?config.queue_backend, queue = %config.consume_queue, "Worker is ready to start");

    let result = worker.run(cancel.clone()).await;
    cancel.cancel();

    if let Err(e) = api.await? {
        error!(error = %e, "Health check server failed");
    }

    result
}
