//! Best-effort mobile push via the Expo push API. Runs strictly after
//! persistence and live delivery; a failed chunk is logged and skipped, never
//! surfaced to the caller.

use std::sync::Arc;

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct PushMessage {
    pub to: String,
    pub title: String,
    pub body: String,
    pub sound: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl PushMessage {
    pub fn new(
        to: String,
        title: impl Into<String>,
        body: impl Into<String>,
        data: Option<serde_json::Value>,
    ) -> Self {
        Self {
            to,
            title: title.into(),
            body: body.into(),
            sound: "default",
            data,
        }
    }
}

/// Tokens the provider will accept. Anything else is dropped before dispatch.
pub fn is_valid_push_token(token: &str) -> bool {
    (token.starts_with("ExponentPushToken[") || token.starts_with("ExpoPushToken["))
        && token.ends_with(']')
}

/// One provider round-trip with an already-sized batch.
#[axum::async_trait]
pub trait PushGateway: Send + Sync {
    async fn send_chunk(&self, messages: Vec<PushMessage>) -> anyhow::Result<()>;
}

pub struct ExpoPushGateway {
    client: reqwest::Client,
    api_url: String,
}

impl ExpoPushGateway {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.into(),
        }
    }
}

#[axum::async_trait]
impl PushGateway for ExpoPushGateway {
    async fn send_chunk(&self, messages: Vec<PushMessage>) -> anyhow::Result<()> {
        let res = self
            .client
            .post(&self.api_url)
            .json(&messages)
            .send()
            .await?;

        if !res.status().is_success() {
            anyhow::bail!("push provider returned {}", res.status());
        }
        Ok(())
    }
}

/// Splits messages into provider-sized chunks and sends them one by one.
/// A chunk failure never aborts the remaining chunks.
pub struct PushDispatcher {
    gateway: Arc<dyn PushGateway>,
    chunk_size: usize,
}

impl PushDispatcher {
    pub fn new(gateway: Arc<dyn PushGateway>, chunk_size: usize) -> Self {
        Self {
            gateway,
            chunk_size: chunk_size.max(1),
        }
    }

    pub async fn dispatch(&self, messages: Vec<PushMessage>) {
        let valid: Vec<PushMessage> = messages
            .into_iter()
            .filter(|m| is_valid_push_token(&m.to))
            .collect();
        if valid.is_empty() {
            return;
        }

        let total = valid.len();
        for (index, chunk) in valid.chunks(self.chunk_size).enumerate() {
            if let Err(e) = self.gateway.send_chunk(chunk.to_vec()).await {
                tracing::error!(
                    error = %e,
                    chunk = index,
                    chunk_size = chunk.len(),
                    total_messages = total,
                    "push chunk failed, continuing with remaining chunks"
                );
            }
        }
    }
}

/// Records chunks instead of sending them. Test double.
#[derive(Default)]
pub struct RecordingPushGateway {
    chunks: std::sync::Mutex<Vec<Vec<PushMessage>>>,
}

impl RecordingPushGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chunks(&self) -> Vec<Vec<PushMessage>> {
        self.chunks.lock().unwrap().clone()
    }
}

#[axum::async_trait]
impl PushGateway for RecordingPushGateway {
    async fn send_chunk(&self, messages: Vec<PushMessage>) -> anyhow::Result<()> {
        self.chunks.lock().unwrap().push(messages);
        Ok(())
    }
}
