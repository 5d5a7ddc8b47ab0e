// src/arena/client.rs
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::consumer::StreamConsumer;
use crate::error::{AppError, AppResult, Upstream};

pub const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";
pub const DEFAULT_MAX_ROUNDS: u32 = 25;

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}
fn default_max_rounds() -> u32 {
    DEFAULT_MAX_ROUNDS
}

/// Body sent to the debate service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateRequest {
    pub symptoms: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,
}

impl DebateRequest {
    pub fn new(symptoms: impl Into<String>) -> Self {
        Self {
            symptoms: symptoms.into(),
            model: default_model(),
            max_rounds: default_max_rounds(),
        }
    }
}

/// Starts debates on the inference service.
#[derive(Clone)]
pub struct DebateClient {
    base_url: String,
    http: reqwest::Client,
}

impl DebateClient {
    pub fn new(base_url: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        }
    }

    /// Client without an overall request timeout: a debate body stays open for
    /// as long as the service keeps talking.
    pub fn from_base_url(base_url: impl Into<String>) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("meda-gateway/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(4))
            .build()
            .map_err(|e| AppError::Internal(anyhow::Error::new(e).context("building debate client")))?;
        Ok(Self::new(base_url, http))
    }

    pub fn stream_url(&self) -> String {
        format!("{}/arena/debate-stream", self.base_url)
    }

    /// Open a new debate and hand back a fresh consumer for its event stream.
    pub async fn start(&self, req: &DebateRequest) -> AppResult<StreamConsumer> {
        let resp = self
            .http
            .post(self.stream_url())
            .json(req)
            .send()
            .await
            .map_err(|e| AppError::upstream_fetch(Upstream::Inference, e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(AppError::upstream_fetch(
                Upstream::Inference,
                format!("debate service returned HTTP {status}"),
            ));
        }

        metrics::counter!("arena_sessions_total").increment(1);
        Ok(StreamConsumer::new(resp.bytes_stream()))
    }
}
