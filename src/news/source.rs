// src/news/source.rs
use async_trait::async_trait;
use std::time::Duration;

use crate::error::{AppError, AppResult, Upstream};

/// Where the raw feed text comes from.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch_text(&self) -> AppResult<String>;
    fn name(&self) -> &'static str;
}

/// Feed fetched over HTTP GET from a configured URL.
pub struct HttpFeed {
    url: String,
    client: reqwest::Client,
}

impl HttpFeed {
    pub fn new(url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            url: url.into(),
            client,
        }
    }

    pub fn from_url(url: impl Into<String>) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("meda-gateway/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::Internal(anyhow::Error::new(e).context("building feed client")))?;
        Ok(Self::new(url, client))
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl FeedSource for HttpFeed {
    async fn fetch_text(&self) -> AppResult<String> {
        let resp = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| AppError::upstream_fetch(Upstream::News, e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(AppError::upstream_fetch(
                Upstream::News,
                format!("feed returned HTTP {status}"),
            ));
        }

        resp.text()
            .await
            .map_err(|e| AppError::upstream_unreadable(Upstream::News, e))
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Feed text held in memory. Used by tests and the probe binary.
pub struct FixtureFeed {
    content: String,
}

impl FixtureFeed {
    pub fn from_fixture(content: &str) -> Self {
        Self {
            content: content.to_string(),
        }
    }
}

#[async_trait]
impl FeedSource for FixtureFeed {
    async fn fetch_text(&self) -> AppResult<String> {
        Ok(self.content.clone())
    }

    fn name(&self) -> &'static str {
        "fixture"
    }
}
