// src/assistant.rs
//! Chat proxy: forwards dashboard conversations to the inference service.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::arena::client::DEFAULT_MODEL;
use crate::error::{AppError, AppResult, Upstream};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub model: Option<String>,
}

/// Assistant reply as returned to the browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatReply {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelRoster {
    pub models: Vec<String>,
    pub default: String,
}

#[derive(Clone)]
pub struct AssistantClient {
    base_url: String,
    http: reqwest::Client,
}

impl AssistantClient {
    pub fn new(base_url: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        }
    }

    pub fn from_base_url(base_url: impl Into<String>, timeout: Duration) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("meda-gateway/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(4))
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(anyhow::Error::new(e).context("building chat client")))?;
        Ok(Self::new(base_url, http))
    }

    pub async fn models(&self) -> AppResult<ModelRoster> {
        let resp = self
            .http
            .get(format!("{}/models", self.base_url))
            .send()
            .await
            .map_err(|e| AppError::upstream_fetch(Upstream::Inference, e))?;
        if !resp.status().is_success() {
            return Err(AppError::upstream_fetch(
                Upstream::Inference,
                format!("models returned HTTP {}", resp.status()),
            ));
        }
        resp.json::<ModelRoster>()
            .await
            .map_err(|e| AppError::upstream_unreadable(Upstream::Inference, e))
    }

    /// One non-streaming chat round trip. The last message is the user's question.
    pub async fn chat(&self, req: &ChatRequest) -> AppResult<ChatReply> {
        if req.messages.is_empty() {
            return Err(AppError::BadRequest("messages must not be empty".into()));
        }

        #[derive(Serialize)]
        struct UpstreamChat<'a> {
            messages: &'a [ChatMessage],
            model: &'a str,
            stream: bool,
        }

        let body = UpstreamChat {
            messages: &req.messages,
            model: req.model.as_deref().unwrap_or(DEFAULT_MODEL),
            stream: false,
        };

        metrics::counter!("chat_requests_total").increment(1);
        let resp = self
            .http
            .post(format!("{}/chat", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(inference_fetch_error)?;

        let status = resp.status();
        if status == reqwest::StatusCode::BAD_REQUEST {
            // The service rejects unknown models with 400.
            return Err(AppError::BadRequest("Invalid model".into()));
        }
        if !status.is_success() {
            return Err(inference_fetch_error(format!("chat returned HTTP {status}")));
        }

        let reply: ChatReply = resp.json().await.map_err(|e| {
            metrics::counter!("chat_errors_total").increment(1);
            AppError::upstream_unreadable(Upstream::Inference, e)
        })?;
        tracing::debug!(target: "chat", chars = reply.content.len(), "chat reply received");
        Ok(reply)
    }
}

fn inference_fetch_error(e: impl std::fmt::Display) -> AppError {
    metrics::counter!("chat_errors_total").increment(1);
    AppError::upstream_fetch(Upstream::Inference, e)
}
