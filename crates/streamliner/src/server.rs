//! Fleet HTTP server
//!
//! Serves a started `MultiDeviceFleet` to remote proxies: `POST /fleet_server`
//! takes a call envelope and answers `{"result": ...}`. Failures come back as
//! a non-200 status with the error text as body.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use crate::{
    config::FleetConfig,
    envelope::{CallEnvelope, CallResponse},
    error::FleetError,
    fleet::{FleetOptions, MultiDeviceFleet},
    metrics,
    model_runtime::Registry,
    proxy::ModelProxy,
};

/// Incoming envelopes go through the proxy, so unknown models and methods
/// missing from `proxy_methods` are rejected before reaching a worker.
#[derive(Clone)]
pub struct ServerState {
    pub proxy: ModelProxy,
}

impl IntoResponse for FleetError {
    fn into_response(self) -> Response {
        let status = match &self {
            FleetError::ModelNotFound(_) => StatusCode::NOT_FOUND,
            FleetError::MethodNotConfigured { .. }
            | FleetError::UnknownClass(_)
            | FleetError::Config(_)
            | FleetError::Json(_) => StatusCode::BAD_REQUEST,
            FleetError::WorkerExited(_) => StatusCode::SERVICE_UNAVAILABLE,
            FleetError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            FleetError::Remote { .. } | FleetError::Transport(_) => StatusCode::BAD_GATEWAY,
            FleetError::Worker { .. } | FleetError::Io(_) | FleetError::Other(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, self.to_string()).into_response()
    }
}

async fn fleet_server(
    State(state): State<ServerState>,
    Json(envelope): Json<CallEnvelope>,
) -> Result<Json<CallResponse>, FleetError> {
    let target = envelope.target();
    let CallEnvelope { model_name, method_name, args, kwargs } = envelope;
    let mut handle = state.proxy.model(&model_name)?;
    if let Some(method) = method_name.as_deref() {
        handle = handle.method(method).map_err(|e| {
            warn!("Rejected {}: {}", target, e);
            e
        })?;
    }
    match handle.call(args, kwargs).await {
        Ok(result) => Ok(Json(CallResponse { result })),
        Err(e) => {
            warn!("Call to {} failed: {}", target, e);
            Err(e)
        }
    }
}

async fn get_metrics() -> Response {
    match metrics::gather_text() {
        Ok(text) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

pub fn build_router(proxy: ModelProxy) -> Router {
    Router::new()
        .route("/fleet_server", post(fleet_server))
        .route("/healthz", get(|| async { "OK" }))
        .route("/metrics", get(get_metrics))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(600)))
        .with_state(ServerState { proxy })
}

/// Start the fleet described by `cfg` and serve it until Ctrl-C, then stop
/// every worker.
pub async fn run_fleet_server(cfg: FleetConfig) -> anyhow::Result<()> {
    crate::telemetry::init_tracing();
    if let Err(e) = metrics::init_metrics() {
        warn!("Failed to initialize metrics: {}", e);
    }
    cfg.print_config();

    let registry = Arc::new(Registry::with_defaults());
    let options = FleetOptions {
        dispatch_timeout: cfg.dispatch_timeout(),
    };
    let mut fleet = MultiDeviceFleet::start_with_options(
        cfg.device_indices.clone(),
        cfg.builder_config(),
        registry,
        options,
    )
    .await?;

    let addr = cfg.api_addr()?;
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            fleet.stop().await;
            return Err(e.into());
        }
    };
    info!("Fleet server listening on http://{}", addr);

    let proxy = match fleet.model_proxy() {
        Ok(proxy) => proxy,
        Err(e) => {
            fleet.stop().await;
            return Err(e.into());
        }
    };
    let app = build_router(proxy);
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    fleet.stop().await;
    served?;
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl-C, shutting down"),
        Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
    }
}
