use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::errors::ClientError;

const DEFAULT_EXPIRES_IN_SECONDS: i64 = 300;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,

    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    DEFAULT_EXPIRES_IN_SECONDS
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    refresh_at: DateTime<Utc>,
}

impl CachedToken {
    /// The margin never exceeds half the token lifetime, so short-lived tokens are
    /// still reused for a while.
    fn new(access_token: String, expires_in: Duration, refresh_margin: Duration) -> Self {
        let lifetime = expires_in.max(Duration::zero());
        let margin = refresh_margin.min(lifetime / 2);

        Self {
            access_token,
            refresh_at: Utc::now() + lifetime - margin,
        }
    }

    fn is_fresh(&self) -> bool {
        Utc::now() < self.refresh_at
    }
}

/// Client-credentials bearer token shared by every outbound call of one process.
pub struct BearerTokenCache {
    http_client: Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    refresh_margin: Duration,
    cache: RwLock<Option<CachedToken>>,
}

impl BearerTokenCache {
    pub fn new(
        http_client: Client,
        token_url: String,
        client_id: String,
        client_secret: String,
    ) -> Self {
        info!(token_url = %token_url, "Bearer token cache initialized");

        Self {
            http_client,
            token_url,
            client_id,
            client_secret,
            refresh_margin: Duration::seconds(30),
            cache: RwLock::new(None),
        }
    }

    pub fn with_refresh_margin(mut self, refresh_margin: Duration) -> Self {
        self.refresh_margin = refresh_margin;
        self
    }

    pub async fn bearer_token(&self) -> Result<String, ClientError> {
        {
            let cache = self.cache.read().await;
            if let Some(token) = cache.as_ref().filter(|t| t.is_fresh()) {
                return Ok(token.access_token.clone());
            }
        }

        let mut cache = self.cache.write().await;

        // Another caller may have refreshed while we waited for the write lock.
        if let Some(token) = cache.as_ref().filter(|t| t.is_fresh()) {
            debug!("Reusing token refreshed by a concurrent caller");
            return Ok(token.access_token.clone());
        }

        let token = self.fetch_token().await?;
        let access_token = token.access_token.clone();
        *cache = Some(token);

        Ok(access_token)
    }

    async fn fetch_token(&self) -> Result<CachedToken, ClientError> {
        debug!(token_url = %self.token_url, "Fetching bearer token");

        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];

        let response = self
            .http_client
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| ClientError::Auth(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, "Token endpoint rejected client credentials");
            return Err(ClientError::Auth(format!("token endpoint returned {}: {}", status, body)));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| ClientError::Auth(format!("invalid token response: {}", e)))?;

        debug!(expires_in = token.expires_in, "Bearer token acquired");

        Ok(CachedToken::new(
            token.access_token,
            Duration::seconds(token.expires_in),
            self.refresh_margin,
        ))
    }
}
