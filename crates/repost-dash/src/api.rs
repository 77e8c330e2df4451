//! HTTP client for the repost backend.
//!
//! Every method is a single request; deadlines are applied by the caller via
//! [`with_deadline`] so the same call can carry different budgets (config
//! load vs. status poll).

use std::future::Future;
use std::time::Duration;

use reqwest::{multipart, Client, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use repost_proto::protocol::{
    ChannelRef, ChannelStats, ChannelStatsSummary, ClearQueueResult, Config, ControlAck,
    ErrorDetail, ImportResult, LogEntry, PostConfig, Progress,
};

use crate::error::ApiError;

/// Run `fut`, converting an overrun into [`ApiError::Timeout`].
pub async fn with_deadline<T>(
    limit: Duration,
    fut: impl Future<Output = Result<T, ApiError>>,
) -> Result<T, ApiError> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| ApiError::Timeout(limit))?
}

#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        let client = Client::builder().build()?;
        Ok(Self {
            client,
            base: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    // ── Config ───────────────────────────────────────────────────────────────

    pub async fn get_config(&self) -> Result<Config, ApiError> {
        self.get_json("/api/config").await
    }

    pub async fn save_config(&self, config: &Config) -> Result<Config, ApiError> {
        self.post_json("/api/config", config).await
    }

    /// Returns the channel the server stored (falls back to the one sent).
    pub async fn set_stock_channel(&self, channel: &ChannelRef) -> Result<ChannelRef, ApiError> {
        let body = self.post_raw("/api/config/stock-channel", channel).await?;
        Ok(echoed(&body, "channel").unwrap_or_else(|| channel.clone()))
    }

    pub async fn set_destination_channels(
        &self,
        channels: &[ChannelRef],
    ) -> Result<Vec<ChannelRef>, ApiError> {
        let body = self
            .post_raw("/api/config/destination-channels", channels)
            .await?;
        Ok(echoed(&body, "channels").unwrap_or_else(|| channels.to_vec()))
    }

    pub async fn set_post_config(&self, post_config: &PostConfig) -> Result<PostConfig, ApiError> {
        let body = self.post_raw("/api/config/post-config", post_config).await?;
        Ok(echoed(&body, "config").unwrap_or_else(|| post_config.clone()))
    }

    pub async fn channel_stats(&self) -> Result<Vec<ChannelStats>, ApiError> {
        self.get_json("/api/config/channel-stats").await
    }

    pub async fn channel_stats_summary(&self) -> Result<ChannelStatsSummary, ApiError> {
        self.get_json("/api/config/channel-stats/summary").await
    }

    /// Raw backup document, written to disk untouched.
    pub async fn export_config(&self) -> Result<Vec<u8>, ApiError> {
        let resp = self.client.get(self.url("/api/config/export")).send().await?;
        let resp = check(resp).await?;
        Ok(resp.bytes().await?.to_vec())
    }

    pub async fn import_config(
        &self,
        file_name: &str,
        contents: Vec<u8>,
    ) -> Result<ImportResult, ApiError> {
        let part = multipart::Part::bytes(contents)
            .file_name(file_name.to_string())
            .mime_str("application/json")?;
        let form = multipart::Form::new().part("file", part);
        let resp = self
            .client
            .post(self.url("/api/config/import"))
            .multipart(form)
            .send()
            .await?;
        decode(check(resp).await?).await
    }

    // ── Control ──────────────────────────────────────────────────────────────

    pub async fn start(&self) -> Result<ControlAck, ApiError> {
        self.post_empty("/api/control/start").await
    }

    pub async fn stop(&self) -> Result<ControlAck, ApiError> {
        self.post_empty("/api/control/stop").await
    }

    pub async fn post_now(&self) -> Result<ControlAck, ApiError> {
        self.post_empty("/api/control/post-now").await
    }

    pub async fn clear_queue(&self) -> Result<ClearQueueResult, ApiError> {
        self.post_empty("/api/control/clear-queue").await
    }

    pub async fn get_status(&self) -> Result<Progress, ApiError> {
        self.get_json("/api/control/status").await
    }

    // ── Logs ─────────────────────────────────────────────────────────────────

    pub async fn log_history(&self) -> Result<Vec<LogEntry>, ApiError> {
        self.get_json("/api/logs/history").await
    }

    /// Open the push stream.  The caller owns the body.
    pub async fn open_event_stream(&self) -> Result<Response, ApiError> {
        let resp = self
            .client
            .get(self.url("/api/logs/stream"))
            .header("Accept", "text/event-stream")
            .send()
            .await?;
        check(resp).await
    }

    // ── Plumbing ─────────────────────────────────────────────────────────────

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let resp = self.client.get(self.url(path)).send().await?;
        decode(check(resp).await?).await
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let resp = self.client.post(self.url(path)).json(body).send().await?;
        decode(check(resp).await?).await
    }

    async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let resp = self.client.post(self.url(path)).send().await?;
        decode(check(resp).await?).await
    }

    /// POST and return the body bytes without decoding.
    async fn post_raw<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Vec<u8>, ApiError> {
        let resp = self.client.post(self.url(path)).json(body).send().await?;
        let resp = check(resp).await?;
        Ok(resp.bytes().await?.to_vec())
    }
}

/// Turn a non-2xx response into [`ApiError::Status`], keeping the server's
/// `detail` text when the body has one.
async fn check(resp: Response) -> Result<Response, ApiError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<ErrorDetail>(&body)
        .map(|d| d.detail)
        .unwrap_or_else(|_| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        });
    debug!("api: HTTP {} body={:?}", status.as_u16(), body);
    Err(ApiError::Status {
        status: status.as_u16(),
        detail,
    })
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, ApiError> {
    let bytes = resp.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(e.to_string()))
}

/// Setter endpoints answer `{"message": ..., "<key>": <stored value>}`.
fn echoed<T: DeserializeOwned>(body: &[u8], key: &str) -> Option<T> {
    let value: Value = serde_json::from_slice(body).ok()?;
    serde_json::from_value(value.get(key)?.clone()).ok()
}
