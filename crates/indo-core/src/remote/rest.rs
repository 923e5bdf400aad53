//! PostgREST-style HTTP remote store.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::{RemoteError, RemoteResult, RemoteStore};
use crate::models::{
    EntityTable, MutationAction, MutationPayload, RemoteSnapshot, Task, TimeEntry, TimeEntryId,
};
use crate::util::{compact_text, normalize_http_base_url, normalize_text_option};

const REST_PREFIX: &str = "/rest/v1";
const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// Connection settings for [`RestRemoteStore`]
#[derive(Clone)]
pub struct RestRemoteStoreConfig {
    pub base_url: String,
    pub api_key: String,
    /// User session token; the API key is used as bearer when absent
    pub access_token: Option<String>,
    pub timeout: Duration,
}

impl std::fmt::Debug for RestRemoteStoreConfig {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("RestRemoteStoreConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl RestRemoteStoreConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            access_token: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    #[must_use]
    pub fn with_access_token(mut self, token: Option<String>) -> Self {
        self.access_token = normalize_text_option(token);
        self
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Clone)]
pub struct RestRemoteStore {
    base_url: String,
    api_key: String,
    bearer: String,
    client: reqwest::Client,
}

impl RestRemoteStore {
    pub fn new(config: RestRemoteStoreConfig) -> RemoteResult<Self> {
        let base_url = normalize_http_base_url(&config.base_url).ok_or_else(|| {
            RemoteError::InvalidPayload("base URL must include http:// or https://".to_string())
        })?;
        let api_key = normalize_text_option(Some(config.api_key))
            .ok_or_else(|| RemoteError::InvalidPayload("API key must not be empty".to_string()))?;
        let bearer = config.access_token.unwrap_or_else(|| api_key.clone());

        Ok(Self {
            base_url,
            api_key,
            bearer,
            client: reqwest::Client::builder().timeout(config.timeout).build()?,
        })
    }

    fn table_url(&self, table: EntityTable) -> String {
        format!("{}{REST_PREFIX}/{}", self.base_url, table.as_str())
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.bearer)
            .header(reqwest::header::ACCEPT, "application/json")
    }

    async fn send(request: RequestBuilder) -> RemoteResult<reqwest::Response> {
        let response = request.send().await.map_err(classify_transport_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Rejected {
                status: status.as_u16(),
                message: parse_api_error(status, &body),
            });
        }

        Ok(response)
    }

    async fn fetch_rows<T: DeserializeOwned>(
        &self,
        table: EntityTable,
        order: &str,
    ) -> RemoteResult<Vec<T>> {
        let request = self
            .request(Method::GET, &self.table_url(table))
            .query(&[("select", "*"), ("order", order)]);
        let response = Self::send(request).await?;
        let body = response.text().await.map_err(classify_transport_error)?;
        serde_json::from_str(&body).map_err(|error| {
            RemoteError::InvalidPayload(format!("{table} rows did not parse: {error}"))
        })
    }
}

#[async_trait]
impl RemoteStore for RestRemoteStore {
    async fn perform(&self, payload: &MutationPayload) -> RemoteResult<()> {
        let table = payload.table();
        let url = self.table_url(table);
        let fields = payload
            .to_fields()
            .map_err(|error| RemoteError::InvalidPayload(error.to_string()))?;
        let row_filter = format!("eq.{}", payload.target_id());

        let request = match payload.action() {
            // Replaying a create that already landed becomes a no-op
            MutationAction::Create => self
                .request(Method::POST, &url)
                .header("Prefer", "resolution=ignore-duplicates,return=minimal")
                .json(&fields),
            MutationAction::Update => self
                .request(Method::PATCH, &url)
                .query(&[("id", row_filter.as_str())])
                .header("Prefer", "return=minimal")
                .json(&fields),
            MutationAction::Delete => self
                .request(Method::DELETE, &url)
                .query(&[("id", row_filter.as_str())]),
        };

        Self::send(request).await?;
        tracing::debug!(
            "Remote {} on {table} for {} confirmed",
            payload.action(),
            payload.target_id()
        );
        Ok(())
    }

    async fn fetch_all(&self) -> RemoteResult<RemoteSnapshot> {
        let (tasks, time_entries) = tokio::try_join!(
            self.fetch_rows::<Task>(EntityTable::Tasks, "created_at.desc"),
            self.fetch_rows::<TimeEntry>(EntityTable::TimeEntries, "start_time.desc"),
        )?;
        Ok(RemoteSnapshot {
            tasks,
            time_entries,
        })
    }

    async fn fetch_time_entry(&self, id: TimeEntryId) -> RemoteResult<Option<TimeEntry>> {
        let row_filter = format!("eq.{id}");
        let request = self
            .request(Method::GET, &self.table_url(EntityTable::TimeEntries))
            .query(&[("select", "*"), ("id", row_filter.as_str())]);
        let response = Self::send(request).await?;
        let rows: Vec<TimeEntry> = response.json().await.map_err(|error| {
            RemoteError::InvalidPayload(format!("time entry row did not parse: {error}"))
        })?;
        Ok(rows.into_iter().next())
    }
}

fn classify_transport_error(error: reqwest::Error) -> RemoteError {
    if error.is_connect() || error.is_timeout() {
        RemoteError::Unreachable(error.to_string())
    } else {
        RemoteError::Http(error)
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: Option<String>,
    error: Option<String>,
    hint: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return match payload.hint {
                Some(hint) => format!("{} ({hint})", message.trim()),
                None => message.trim().to_string(),
            };
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        trimmed
    }
}
