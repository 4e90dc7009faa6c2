use async_trait::async_trait;
use reqwest::{RequestBuilder, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::{
    clients::http::ResilientClient,
    errors::ClientError,
    models::{
        notification::Channel,
        records::{
            InAppBatch, Page, Recipient, RecipientStatusesRequest, StatusResponse, Template,
            UpdateStatusRequest,
        },
        status::{NotificationStatus, RecipientNotificationStatus, RecipientStatus},
    },
    providers::{RecipientProvider, StatusProvider, StatusUpdater, TemplateProvider},
};

pub struct RecordServiceClient {
    client: ResilientClient,
    base_url: String,
    page_size: u32,
}

impl RecordServiceClient {
    pub fn new(client: ResilientClient, base_url: &str, page_size: u32) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        info!(base_url = %base_url, page_size, "Record service client initialized");

        Self {
            client,
            base_url,
            page_size,
        }
    }

    /// Appends `segments` to the base URL, percent-encoding each one so ids
    /// containing `/`, `?` or `#` stay inside their segment.
    fn url(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| ClientError::Request(format!("invalid record service url: {}", e)))?;

        url.path_segments_mut()
            .map_err(|_| ClientError::Request(format!("{} cannot be a base url", self.base_url)))?
            .pop_if_empty()
            .extend(segments);

        Ok(url)
    }

    async fn fetch_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ClientError> {
        let response = self.client.send(request).await?;

        response
            .json::<T>()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))
    }

    /// Follows `nextToken` until the service stops returning one.
    async fn fetch_all_pages<T: DeserializeOwned>(
        &self,
        url: Url,
        filters: &[(&str, String)],
    ) -> Result<Vec<T>, ClientError> {
        let mut items = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .http_client()
                .get(url.clone())
                .query(filters)
                .query(&[("maxResults", self.page_size)]);

            if let Some(token) = &next_token {
                request = request.query(&[("nextToken", token)]);
            }

            let page: Page<T> = self.fetch_json(request).await?;
            debug!(path = url.path(), result_count = page.result_count, "Fetched page");
            items.extend(page.data);

            match page.next_token.filter(|token| !token.is_empty()) {
                Some(token) => next_token = Some(token),
                None => break,
            }
        }

        Ok(items)
    }

    pub async fn deliver_in_app(&self, batch: &InAppBatch) -> Result<(), ClientError> {
        let request = self
            .client
            .http_client()
            .post(self.url(&["users", "notifications"])?)
            .json(batch);

        self.client.send(request).await?;

        debug!(
            notification_id = %batch.notification_id,
            recipients = batch.user_ids.len(),
            "In-app batch delivered"
        );

        Ok(())
    }
}

fn join_filter<T: ToString>(values: &[T]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

#[async_trait]
impl RecipientProvider for RecordServiceClient {
    async fn distribution_list_members(&self, name: &str) -> Result<Vec<String>, ClientError> {
        self.fetch_all_pages(self.url(&["distribution-lists", name, "recipients"])?, &[])
            .await
    }

    async fn recipient(&self, user_id: &str) -> Result<Recipient, ClientError> {
        let request = self
            .client
            .http_client()
            .get(self.url(&["recipients", user_id])?);

        self.fetch_json(request).await
    }
}

#[async_trait]
impl TemplateProvider for RecordServiceClient {
    async fn template(&self, template_id: &str) -> Result<Template, ClientError> {
        let request = self
            .client
            .http_client()
            .get(self.url(&["notifications", "templates", template_id])?);

        self.fetch_json(request).await
    }
}

#[async_trait]
impl StatusProvider for RecordServiceClient {
    async fn notification_status(
        &self,
        notification_id: &str,
    ) -> Result<NotificationStatus, ClientError> {
        let request = self
            .client
            .http_client()
            .get(self.url(&["notifications", notification_id, "status"])?);

        let response: StatusResponse = self.fetch_json(request).await?;
        Ok(response.status)
    }

    async fn recipient_statuses(
        &self,
        notification_id: &str,
        channels: &[Channel],
        statuses: &[RecipientStatus],
    ) -> Result<Vec<RecipientNotificationStatus>, ClientError> {
        let mut filters = Vec::new();
        if !channels.is_empty() {
            filters.push(("channels", join_filter(channels)));
        }
        if !statuses.is_empty() {
            filters.push(("statuses", join_filter(statuses)));
        }

        self.fetch_all_pages(
            self.url(&["notifications", notification_id, "recipients", "statuses"])?,
            &filters,
        )
        .await
    }
}

#[async_trait]
impl StatusUpdater for RecordServiceClient {
    async fn update_status(
        &self,
        notification_id: &str,
        status: NotificationStatus,
        error_message: Option<String>,
    ) -> Result<(), ClientError> {
        let request = self
            .client
            .http_client()
            .put(self.url(&["notifications", notification_id, "status"])?)
            .json(&UpdateStatusRequest {
                status,
                error_message,
            });

        self.client.send(request).await?;

        debug!(notification_id, status = %status, "Notification status updated");
        Ok(())
    }

    async fn update_recipient_statuses(
        &self,
        notification_id: &str,
        statuses: &[RecipientNotificationStatus],
    ) -> Result<(), ClientError> {
        if statuses.is_empty() {
            return Ok(());
        }

        let request = self
            .client
            .http_client()
            .post(self.url(&["notifications", notification_id, "recipients", "statuses"])?)
            .json(&RecipientStatusesRequest {
                statuses: statuses.to_vec(),
            });

        self.client.send(request).await?;

        debug!(
            notification_id,
            rows = statuses.len(),
            "Recipient statuses recorded"
        );
        Ok(())
    }
}
