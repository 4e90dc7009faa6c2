use std::{sync::Arc, time::Duration};

use anyhow::{Error, Result, anyhow};
use reqwest::{
    Client, Request, RequestBuilder, Response, StatusCode,
    header::{AUTHORIZATION, HeaderMap, HeaderValue, RETRY_AFTER},
};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::{
    clients::auth::BearerTokenCache, config::Config, errors::ClientError,
    models::retry::RetryConfig, utils::backoff_delay,
};

const RETRY_AFTER_MS: &str = "retry-after-ms";

/// HTTP client for the record service: attaches a bearer token and retries
/// rate-limited and 5xx responses with backoff.
#[derive(Clone)]
pub struct ResilientClient {
    http_client: Client,
    auth: Option<Arc<BearerTokenCache>>,
    retry_config: RetryConfig,
}

impl ResilientClient {
    pub fn new(
        http_client: Client,
        auth: Option<Arc<BearerTokenCache>>,
        retry_config: RetryConfig,
    ) -> Self {
        Self {
            http_client,
            auth,
            retry_config,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, Error> {
        let http_client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|_| anyhow!("Failed to create HTTP client"))?;

        let auth = match (
            &config.auth_token_url,
            &config.auth_client_id,
            &config.auth_client_secret,
        ) {
            (Some(url), Some(id), Some(secret)) => Some(Arc::new(BearerTokenCache::new(
                http_client.clone(),
                url.clone(),
                id.clone(),
                secret.clone(),
            ))),
            (None, _, _) => None,
            _ => {
                return Err(anyhow!(
                    "AUTH_CLIENT_ID and AUTH_CLIENT_SECRET are required with AUTH_TOKEN_URL"
                ));
            }
        };

        Ok(Self::new(http_client, auth, config.retry_config()))
    }

    pub fn http_client(&self) -> &Client {
        &self.http_client
    }

    pub async fn send(&self, request: RequestBuilder) -> Result<Response, ClientError> {
        let request = request.build()?;
        self.do_request_with_backoff(request, 0).await
    }

    pub async fn do_request_with_backoff(
        &self,
        request: Request,
        attempt: u32,
    ) -> Result<Response, ClientError> {
        let mut attempt = attempt;

        loop {
            let mut outgoing = request
                .try_clone()
                .ok_or_else(|| ClientError::Request("streaming body".to_string()))?;

            if let Some(auth) = &self.auth {
                let token = auth.bearer_token().await?;
                let value = HeaderValue::from_str(&format!("Bearer {}", token))
                    .map_err(|e| ClientError::Auth(e.to_string()))?;
                outgoing.headers_mut().insert(AUTHORIZATION, value);
            }

            let response = self.http_client.execute(outgoing).await?;
            let status = response.status();

            if status.is_success() {
                if attempt > 0 {
                    debug!(attempt, url = %request.url(), "Request succeeded after retry");
                }
                return Ok(response);
            }

            let retryable =
                status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();

            if !retryable || attempt >= self.retry_config.max_attempts {
                let body = response.text().await.unwrap_or_default();
                if retryable {
                    warn!(
                        status = %status,
                        url = %request.url(),
                        max_attempts = self.retry_config.max_attempts,
                        "Request failed after exhausting all retries"
                    );
                }
                return Err(ClientError::Status { status, body });
            }

            let delay = if status == StatusCode::TOO_MANY_REQUESTS {
                rate_limit_delay(response.headers(), &self.retry_config, attempt)
            } else {
                backoff_delay(&self.retry_config, attempt)
            };

            warn!(
                status = %status,
                url = %request.url(),
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Retryable response, backing off"
            );

            sleep(delay).await;
            attempt += 1;
        }
    }
}

/// Server-supplied wait hint plus the configured margin. Falls back to exponential
/// backoff when the response carries no usable hint.
fn rate_limit_delay(headers: &HeaderMap, config: &RetryConfig, attempt: u32) -> Duration {
    let header_value = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
    };

    let hint_ms = header_value(RETRY_AFTER_MS)
        .or_else(|| header_value(RETRY_AFTER.as_str()).map(|secs| secs.saturating_mul(1000)));

    match hint_ms {
        Some(ms) => Duration::from_millis(ms.saturating_add(config.rate_limit_margin_ms)),
        None => backoff_delay(config, attempt),
    }
}
