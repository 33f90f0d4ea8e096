//! HTTP API Module
//!
//! JSON endpoints for turns, session state, action lifecycle and rule cache
//! control. Every response carries an `x-request-id` header that also tags
//! the request's log events.

pub mod dto;
pub mod error;
pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    http::{HeaderValue, Request},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Extension, Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::HttpConfig;
use crate::protocol::Handler;

use self::handlers::{actions, admin, rules, sessions};

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Middleware: tag each request with an id and a tracing span.
async fn request_id_middleware(req: Request<Body>, next: Next) -> Response {
    let request_id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map_or_else(|| Uuid::new_v4().to_string(), str::to_string);

    let span = tracing::info_span!(
        "http_request",
        request_id = %request_id,
        method = %req.method(),
        path = %req.uri().path()
    );

    let mut response = next.run(req).instrument(span).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Creates the Axum router
pub fn create_router(handler: Arc<Handler>, config: &HttpConfig) -> Router {
    // Build CORS layer
    let cors = if !config.cors_origins.is_empty() {
        // Explicit origins configured: restrict to those
        let origins: Vec<_> = config
            .cors_origins
            .iter()
            .filter_map(|s| {
                let parsed = s.parse();
                if parsed.is_err() {
                    tracing::warn!(origin = %s, "cors_origin_ignored");
                }
                parsed.ok()
            })
            .collect();
        Some(
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any),
        )
    } else if config.cors_allow_all {
        // Explicit dev mode opt-in: allow all origins
        Some(CorsLayer::permissive())
    } else {
        // Default: same-origin only
        None
    };

    let mut app = Router::new()
        .route("/health", get(admin::health))
        .route("/sessions/:id/infer", post(sessions::infer))
        .route(
            "/sessions/:id/state",
            get(sessions::get_state).post(sessions::set_state),
        )
        .route("/sessions/:id/dtmf/menu", post(sessions::dtmf_menu))
        .route("/sessions/:id/dtmf/input", post(sessions::dtmf_input))
        .route("/sessions/:id/actions/start", post(actions::start_action))
        .route("/sessions/:id/actions/check", post(actions::check_timeout))
        .route("/rules/invalidate", post(rules::invalidate))
        .layer(Extension(handler))
        .layer(RequestBodyLimitLayer::new(config.max_body_bytes))
        .layer(middleware::from_fn(request_id_middleware));

    if let Some(cors) = cors {
        app = app.layer(cors);
    }

    app
}

/// Starts the HTTP server with graceful shutdown support.
///
/// Listens for SIGINT (ctrl-c) and SIGTERM. On shutdown, stops accepting
/// connections, stops the expiry reaper and waits for dispatched actions
/// to finish.
pub async fn start_http_server(
    handler: Arc<Handler>,
    config: &HttpConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = create_router(Arc::clone(&handler), config);

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    if let Some(period) = handler.reap_interval() {
        tokio::spawn(run_reaper(Arc::clone(&handler), period, shutdown_rx));
    }
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    let socket = tokio::net::TcpSocket::new_v4()?;
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    let listener = socket.listen(1024)?;

    tracing::info!(%addr, "http_server_listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);

    // Give running actions a bounded window to record their outcome
    if tokio::time::timeout(std::time::Duration::from_secs(10), handler.shutdown())
        .await
        .is_err()
    {
        tracing::warn!("action_drain_timed_out");
    }

    Ok(())
}

/// Purge expired session attributes every `period` until shutdown
async fn run_reaper(
    handler: Arc<Handler>,
    period: std::time::Duration,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(period);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = handler.reap_expired().await {
                    tracing::warn!(error = %e, "expiry_reaper_failed");
                }
            }
            _ = shutdown.changed() => {
                tracing::debug!("expiry_reaper_stopped");
                break;
            }
        }
    }
}

/// Wait for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "ctrl_c_handler_failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    () = ctrl_c => tracing::info!(signal = "SIGINT", "shutdown_requested"),
                    _ = sigterm.recv() => tracing::info!(signal = "SIGTERM", "shutdown_requested"),
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "sigterm_handler_failed");
                ctrl_c.await;
                tracing::info!(signal = "SIGINT", "shutdown_requested");
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await;
        tracing::info!(signal = "SIGINT", "shutdown_requested");
    }
}
