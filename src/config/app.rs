// src/config/app.rs
use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "config/app.toml";
pub const ENV_CONFIG_PATH: &str = "MEDA_CONFIG_PATH";

const DEV_JWT_SECRET: &str = "meda-dev-secret";

fn default_inference_base_url() -> String {
    "http://localhost:8000".to_string()
}
fn default_news_cache_ttl_secs() -> u64 {
    300
}
fn default_debate_timeout_secs() -> u64 {
    600
}
fn default_chat_timeout_secs() -> u64 {
    120
}
fn default_session_ttl_days() -> u64 {
    7
}
const MAX_SESSION_TTL_DAYS: u64 = 365;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// RSS feed behind `/api/news`. Unset means the endpoint reports a config error.
    #[serde(default)]
    pub news_api_url: Option<String>,
    #[serde(default = "default_inference_base_url")]
    pub inference_base_url: String,
    /// "ENV" (or absent) means: read from JWT_SECRET.
    #[serde(default)]
    pub jwt_secret: Option<String>,
    #[serde(default = "default_news_cache_ttl_secs")]
    pub news_cache_ttl_secs: u64,
    #[serde(default = "default_debate_timeout_secs")]
    pub debate_timeout_secs: u64,
    #[serde(default = "default_chat_timeout_secs")]
    pub chat_timeout_secs: u64,
    #[serde(default = "default_session_ttl_days")]
    pub session_ttl_days: u64,
    #[serde(default)]
    pub secure_cookies: bool,
    #[serde(default)]
    pub metrics_enabled: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            news_api_url: None,
            inference_base_url: default_inference_base_url(),
            jwt_secret: None,
            news_cache_ttl_secs: default_news_cache_ttl_secs(),
            debate_timeout_secs: default_debate_timeout_secs(),
            chat_timeout_secs: default_chat_timeout_secs(),
            session_ttl_days: default_session_ttl_days(),
            secure_cookies: false,
            metrics_enabled: false,
        }
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn non_empty(v: String) -> Option<String> {
    let t = v.trim();
    (!t.is_empty()).then(|| t.to_string())
}

impl AppConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let cfg: AppConfig =
            toml::from_str(&data).with_context(|| format!("parsing {}", path.display()))?;
        Ok(cfg.sanitized())
    }

    /// Load using env var + fallbacks, then apply environment overrides:
    /// 1) $MEDA_CONFIG_PATH (must exist)
    /// 2) config/app.toml
    /// 3) built-in defaults
    pub fn load() -> anyhow::Result<Self> {
        let base = if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                bail!("{ENV_CONFIG_PATH} points to non-existent path {}", pb.display());
            }
            Self::load_from_file(&pb)?
        } else if Path::new(DEFAULT_CONFIG_PATH).exists() {
            Self::load_from_file(DEFAULT_CONFIG_PATH)?
        } else {
            Self::default()
        };
        Ok(base.with_env_overrides(|k| std::env::var(k).ok()))
    }

    /// Override fields from environment-style lookups (`NEWS_API_URL`, ...).
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("NEWS_API_URL").and_then(non_empty) {
            self.news_api_url = Some(v);
        }
        if let Some(v) = lookup("INFERENCE_BASE_URL").and_then(non_empty) {
            self.inference_base_url = v;
        }
        if let Some(v) = lookup("JWT_SECRET").and_then(non_empty) {
            self.jwt_secret = Some(v);
        }
        if let Some(v) = lookup("NEWS_CACHE_TTL_SECS").and_then(|s| s.trim().parse().ok()) {
            self.news_cache_ttl_secs = v;
        }
        if let Some(v) = lookup("DEBATE_TIMEOUT_SECS").and_then(|s| s.trim().parse().ok()) {
            self.debate_timeout_secs = v;
        }
        if let Some(v) = lookup("MEDA_SECURE_COOKIES").and_then(|s| parse_flag(&s)) {
            self.secure_cookies = v;
        }
        if let Some(v) = lookup("MEDA_METRICS").and_then(|s| parse_flag(&s)) {
            self.metrics_enabled = v;
        }
        self.sanitized()
    }

    fn sanitized(mut self) -> Self {
        self.inference_base_url = self.inference_base_url.trim_end_matches('/').to_string();
        if self
            .jwt_secret
            .as_deref()
            .is_some_and(|s| s.trim().is_empty() || s.trim().eq_ignore_ascii_case("env"))
        {
            self.jwt_secret = None;
        }
        if self.news_api_url.as_deref().is_some_and(|s| s.trim().is_empty()) {
            self.news_api_url = None;
        }
        if self.debate_timeout_secs == 0 {
            self.debate_timeout_secs = default_debate_timeout_secs();
        }
        if self.chat_timeout_secs == 0 {
            self.chat_timeout_secs = default_chat_timeout_secs();
        }
        if self.session_ttl_days == 0 {
            self.session_ttl_days = default_session_ttl_days();
        }
        self.session_ttl_days = self.session_ttl_days.min(MAX_SESSION_TTL_DAYS);
        self
    }

    /// The session signing secret. Debug builds fall back to a fixed dev secret.
    pub fn resolve_jwt_secret(&self) -> anyhow::Result<String> {
        match &self.jwt_secret {
            Some(s) => Ok(s.clone()),
            None if cfg!(debug_assertions) => {
                tracing::warn!("JWT_SECRET is not set; using the development secret");
                Ok(DEV_JWT_SECRET.to_string())
            }
            None => bail!("JWT_SECRET is not set. Please define it in your .env file."),
        }
    }

    pub fn news_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.news_cache_ttl_secs)
    }

    pub fn debate_timeout(&self) -> Duration {
        Duration::from_secs(self.debate_timeout_secs)
    }

    pub fn chat_timeout(&self) -> Duration {
        Duration::from_secs(self.chat_timeout_secs)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_days.saturating_mul(24 * 3600))
    }
}
