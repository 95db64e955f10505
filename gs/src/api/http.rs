//! reqwest implementation of [`ThreadApi`]

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Response};
use serde_json::Value;
use tracing::debug;

use super::types::ArchiveResponse;
use super::{ApiError, ChatReply, EventStream, GenerateRequest, ThreadApi, ThreadSnapshot, ThreadSummary};
use crate::config::ServerConfig;
use crate::sse::decode_stream;

/// HTTP client for the generation server
#[derive(Debug, Clone)]
pub struct HttpThreadApi {
    base_url: String,
    http: Client,
    request_timeout: Duration,
}

impl HttpThreadApi {
    /// Create a client from server configuration
    ///
    /// Only the connect phase is bounded for the generation stream; a total
    /// timeout would cut long generations short. Other calls use
    /// `request-timeout-ms`.
    pub fn from_config(config: &ServerConfig) -> Result<Self, ApiError> {
        debug!(?config, "from_config: called");
        let http = Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .build()
            .map_err(ApiError::Network)?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http,
            request_timeout: Duration::from_millis(config.request_timeout_ms),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Fail non-success responses with their body as the message
    async fn check_status(response: Response) -> Result<Response, ApiError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response.text().await.unwrap_or_default();
        debug!(status, "check_status: non-success response");
        Err(ApiError::Http { status, message })
    }

    async fn get_json(&self, path: &str) -> Result<Value, ApiError> {
        debug!(%path, "get_json: called");
        let response = self
            .http
            .get(self.url(path))
            .timeout(self.request_timeout)
            .send()
            .await?;
        let response = Self::check_status(response).await?;
        Ok(response.json().await?)
    }
}

/// Surface `{"error": "..."}` bodies that arrive with a 200 status
fn reject_error_body(body: &Value) -> Result<(), ApiError> {
    match body.get("error").and_then(Value::as_str) {
        Some(message) => Err(ApiError::Server(message.to_string())),
        None => Ok(()),
    }
}

#[async_trait]
impl ThreadApi for HttpThreadApi {
    async fn open_generation(&self, request: &GenerateRequest) -> Result<EventStream, ApiError> {
        debug!(
            thread_id = ?request.thread_id,
            resume_action = ?request.resume_action,
            "open_generation: called"
        );
        let response = self
            .http
            .post(self.url("/generate"))
            .header("accept", "text/event-stream")
            .json(request)
            .send()
            .await?;
        let response = Self::check_status(response).await?;

        debug!(status = %response.status(), "open_generation: stream opened");
        let chunks = Box::pin(response.bytes_stream().map(|chunk| chunk.map_err(ApiError::Network)));
        Ok(decode_stream(chunks).boxed())
    }

    async fn load_thread(&self, thread_id: &str) -> Result<ThreadSnapshot, ApiError> {
        debug!(%thread_id, "load_thread: called");
        let body = self.get_json(&format!("/threads/{thread_id}")).await?;
        ThreadSnapshot::from_history(body)
    }

    async fn list_threads(&self) -> Result<Vec<ThreadSummary>, ApiError> {
        debug!("list_threads: called");
        let body = self.get_json("/threads").await?;
        Ok(serde_json::from_value(body)?)
    }

    async fn toggle_archive(&self, thread_id: &str) -> Result<bool, ApiError> {
        debug!(%thread_id, "toggle_archive: called");
        let response = self
            .http
            .patch(self.url(&format!("/threads/{thread_id}/archive")))
            .timeout(self.request_timeout)
            .send()
            .await?;
        let body: Value = Self::check_status(response).await?.json().await?;
        reject_error_body(&body)?;
        let archive: ArchiveResponse = serde_json::from_value(body)?;
        Ok(archive.is_archived)
    }

    async fn chat(&self, thread_id: &str, message: &str) -> Result<ChatReply, ApiError> {
        debug!(%thread_id, message_len = message.len(), "chat: called");
        let response = self
            .http
            .post(self.url(&format!("/threads/{thread_id}/chat")))
            .timeout(self.request_timeout)
            .json(&serde_json::json!({ "message": message }))
            .send()
            .await?;
        let body: Value = Self::check_status(response).await?.json().await?;
        reject_error_body(&body)?;
        Ok(serde_json::from_value(body)?)
    }

    async fn health(&self) -> Result<(), ApiError> {
        debug!("health: called");
        let body = self.get_json("/health").await?;
        match body.get("status").and_then(Value::as_str) {
            Some("ok") => Ok(()),
            _ => Err(ApiError::InvalidResponse(format!("unexpected health body: {body}"))),
        }
    }
}
