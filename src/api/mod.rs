//! Backend REST API client
//!
//! Single normalization boundary over the bot backend. Every response is
//! decoded into one canonical schema from [`crate::types`]; error bodies
//! carry a human-readable `detail` string that is surfaced verbatim to the
//! operator.

use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderValue, CONTENT_TYPE},
    Client,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::bot_config::BotConfig;
use crate::types::{
    AccountSnapshot, ActionRecord, BotStatus, ClearResponse, ConfigResponse, ItemsResponse,
    Position,
};

/// Failure of a single backend request.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// Non-success status with the server's `detail` message.
    #[error("{detail}")]
    Server { status: u16, detail: String },
    /// Connect / timeout / TLS failure before a response arrived.
    #[error("request failed: {0}")]
    Transport(String),
    /// The body did not match the canonical schema.
    #[error("unexpected response shape: {0}")]
    Decode(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ApiError::Decode(e.to_string())
        } else {
            ApiError::Transport(e.to_string())
        }
    }
}

/// Error body shape used by the backend on every failure path.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    detail: String,
}

/// Fetch/mutation boundary the sync and mutation coordinators run against.
///
/// The production implementation is [`ApiClient`]; tests substitute scripted
/// fakes to exercise race and failure behavior without a live backend.
#[async_trait]
pub trait BackendApi: Send + Sync {
    async fn fetch_account(&self) -> ApiResult<AccountSnapshot>;
    async fn fetch_positions(&self) -> ApiResult<Vec<Position>>;
    async fn fetch_actions(&self, limit: usize) -> ApiResult<Vec<ActionRecord>>;
    async fn fetch_bot_status(&self) -> ApiResult<BotStatus>;
    async fn fetch_bot_config(&self) -> ApiResult<BotConfig>;
    /// POST the full draft as `{updates}`; returns the server-confirmed config.
    async fn update_bot_config(&self, updates: &BotConfig) -> ApiResult<BotConfig>;
    async fn start_bot(&self) -> ApiResult<()>;
    async fn stop_bot(&self) -> ApiResult<()>;
    async fn flatten_positions(&self) -> ApiResult<()>;
    /// Returns the number of removed action records.
    async fn clear_actions(&self) -> ApiResult<u64>;
}

#[derive(Debug, Serialize)]
struct ConfigUpdateRequest<'a> {
    updates: &'a BotConfig,
}

/// REST client for the bot backend.
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Create a new client rooted at `base_url`.
    pub fn new(base_url: &str, timeout_ms: u64) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .default_headers(headers)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Map a non-success response to `ApiError::Server`, preferring the
    /// structured `detail` body over the raw text.
    async fn into_api_error(response: reqwest::Response) -> ApiError {
        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        let detail = match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) if !body.detail.is_empty() => body.detail,
            _ if !text.is_empty() => text,
            _ => format!("backend returned status {}", status),
        };
        ApiError::Server { status, detail }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        let url = self.url(path);
        debug!("GET {}", url);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(Self::into_api_error(response).await);
        }
        Ok(response.json::<T>().await?)
    }

    async fn post_json<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: Option<&B>,
    ) -> ApiResult<T> {
        let url = self.url(path);
        debug!("POST {}", url);
        let mut request = self.client.post(&url);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(Self::into_api_error(response).await);
        }
        Ok(response.json::<T>().await?)
    }

    /// Fire-and-refresh command: status checked, body discarded.
    async fn post_command(&self, path: &str) -> ApiResult<()> {
        let url = self.url(path);
        debug!("POST {}", url);
        let response = self.client.post(&url).send().await?;
        if !response.status().is_success() {
            return Err(Self::into_api_error(response).await);
        }
        Ok(())
    }
}

#[async_trait]
impl BackendApi for ApiClient {
    async fn fetch_account(&self) -> ApiResult<AccountSnapshot> {
        self.get_json("account").await
    }

    async fn fetch_positions(&self) -> ApiResult<Vec<Position>> {
        let response: ItemsResponse<Position> = self.get_json("positions").await?;
        Ok(response.items)
    }

    async fn fetch_actions(&self, limit: usize) -> ApiResult<Vec<ActionRecord>> {
        let response: ItemsResponse<ActionRecord> =
            self.get_json(&format!("actions?limit={}", limit)).await?;
        Ok(response.items)
    }

    async fn fetch_bot_status(&self) -> ApiResult<BotStatus> {
        self.get_json("bot/status").await
    }

    async fn fetch_bot_config(&self) -> ApiResult<BotConfig> {
        let response: ConfigResponse<BotConfig> = self.get_json("bot/config").await?;
        Ok(response.config)
    }

    async fn update_bot_config(&self, updates: &BotConfig) -> ApiResult<BotConfig> {
        let request = ConfigUpdateRequest { updates };
        let response: ConfigResponse<BotConfig> =
            self.post_json("bot/config", Some(&request)).await?;
        Ok(response.config)
    }

    async fn start_bot(&self) -> ApiResult<()> {
        self.post_command("bot/start").await
    }

    async fn stop_bot(&self) -> ApiResult<()> {
        self.post_command("bot/stop").await
    }

    async fn flatten_positions(&self) -> ApiResult<()> {
        self.post_command("flatten").await
    }

    async fn clear_actions(&self) -> ApiResult<u64> {
        let response: ClearResponse = self.post_json::<_, ()>("actions/clear", None).await?;
        Ok(response.removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = ApiClient::new("http://localhost:8000/api/", 1000);
        assert_eq!(client.url("account"), "http://localhost:8000/api/account");
        assert_eq!(client.url("/bot/status"), "http://localhost:8000/api/bot/status");
    }

    #[test]
    fn test_error_body_prefers_detail_field() {
        let body: ErrorBody = serde_json::from_str(r#"{"detail": "account unauthorized"}"#).unwrap();
        assert_eq!(body.detail, "account unauthorized");
    }

    #[test]
    fn test_api_error_displays_server_detail_verbatim() {
        let err = ApiError::Server {
            status: 503,
            detail: "alpaca unreachable".to_string(),
        };
        assert_eq!(err.to_string(), "alpaca unreachable");
    }
}
