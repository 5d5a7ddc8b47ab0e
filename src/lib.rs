// src/lib.rs
// Public library surface for the server binary, the probe binary and integration tests.

pub mod accounts;
pub mod api;
pub mod arena;
pub mod assistant;
pub mod config;
pub mod error;
pub mod metrics;
pub mod news;
pub mod telemetry;

pub use crate::api::{router, AppState};
pub use crate::error::{AppError, AppResult};

use axum::Router;

use crate::config::AppConfig;

/// Build the full application router from config file + environment.
pub async fn app() -> anyhow::Result<Router> {
    let cfg = AppConfig::load()?;
    app_with_config(cfg)
}

/// Build the application router from an explicit config.
/// `/metrics` is mounted only when `metrics_enabled` is set.
pub fn app_with_config(cfg: AppConfig) -> anyhow::Result<Router> {
    let metrics_on = cfg.metrics_enabled;
    let state = AppState::from_config(cfg)?;
    let mut app = router(state);
    if metrics_on {
        let m = crate::metrics::Metrics::init()?;
        app = app.merge(m.router());
    }
    Ok(app)
}
