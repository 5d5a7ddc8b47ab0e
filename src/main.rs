//! MEDA gateway: binary entrypoint.
//! Boots the Axum HTTP server with routes, shared state and middleware.

use shuttle_axum::ShuttleAxum;
use tracing::info;

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    meda_gateway::telemetry::init_tracing();

    let router = meda_gateway::app().await?;
    info!("meda gateway router ready");

    Ok(router.into())
}
