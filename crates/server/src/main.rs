use std::{net::SocketAddr, sync::Arc};

use axum::{routing::get, Json, Router};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod agent;
mod app_state;
mod config;
mod ws;

use agent::{ReportMemory, ScriptedAgent};
use app_state::AppState;
use config::load_settings;

#[derive(Debug, Serialize)]
struct StatusResponse {
    status: &'static str,
    message: &'static str,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let settings = load_settings();
    let agent = ScriptedAgent::new(
        Arc::new(ReportMemory::default()),
        &settings.search_base_url,
        settings.stage_delay(),
        settings.max_critique_rounds,
    )?
    .with_run_limit(settings.max_concurrent_runs);
    let state = AppState {
        agent: Arc::new(agent),
    };
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "research server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/healthz", get(healthz))
        .route("/ws", get(ws::ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn root() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "ok",
        message: "Reasoning Agent Server is running",
    })
}

async fn healthz() -> &'static str {
    "ok"
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
