#![forbid(unsafe_code)]

use std::{env, net::SocketAddr, sync::Arc};

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use flagdesk_adapter::{
    AdapterHealthResponse, AdapterRuntime, EventAdapterRequest, EventAdapterResponse,
};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let bind = env::var("FLAGDESK_HTTP_BIND").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
    let addr: SocketAddr = bind.parse()?;

    let runtime = Arc::new(AdapterRuntime::default_from_env()?);
    let startup = runtime.clone();
    match tokio::task::spawn_blocking(move || startup.resume_pending_deletions()).await? {
        Ok(reports) if !reports.is_empty() => {
            info!(resumed = reports.len(), "pending deletions completed at startup")
        }
        Ok(_) => {}
        // Left pending; the next delete of the same challenge resumes it.
        Err(reason) => error!(reason = %reason, "pending deletion resume failed at startup"),
    }

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/events", post(run_event))
        .with_state(runtime);

    info!(%addr, "flagdesk_adapter_http listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
        return;
    }
    info!("shutdown requested");
}

async fn healthz(
    State(runtime): State<Arc<AdapterRuntime>>,
) -> (StatusCode, Json<AdapterHealthResponse>) {
    let joined = tokio::task::spawn_blocking(move || runtime.health_report()).await;
    match joined {
        Ok(Ok(response)) => (StatusCode::OK, Json(response)),
        Ok(Err(reason)) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(AdapterHealthResponse::unhealthy(reason)),
        ),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(AdapterHealthResponse::unhealthy(format!(
                "health task failed: {err}"
            ))),
        ),
    }
}

// Store calls may sleep between retries, so dispatch runs off the async workers.
async fn run_event(
    State(runtime): State<Arc<AdapterRuntime>>,
    Json(request): Json<EventAdapterRequest>,
) -> (StatusCode, Json<EventAdapterResponse>) {
    let joined = tokio::task::spawn_blocking(move || runtime.handle_event(request)).await;
    match joined {
        Ok(Ok(response)) => (StatusCode::OK, Json(response)),
        Ok(Err(reason)) => (
            StatusCode::BAD_REQUEST,
            Json(EventAdapterResponse::rejected(reason)),
        ),
        Err(err) => {
            error!(error = %err, "event task failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(EventAdapterResponse::rejected(format!(
                    "event task failed: {err}"
                ))),
            )
        }
    }
}
