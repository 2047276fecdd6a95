//! nottif-gateway: event log, live fan-out, orchestration and HTTP API.
//!
//! Provides:
//! - [`EventLog`]: bounded newest-first record of notification attempts
//! - [`Broadcaster`]: per-subscriber queues fed by one coordinator task
//! - [`Orchestrator`]: ties config, notifier, scheduler and event log together
//! - axum router for the `/api` endpoints, including an SSE event stream

pub mod broadcast;
pub mod event_log;
pub mod handlers;
pub mod orchestrator;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, post};
use tokio_util::sync::CancellationToken;
use tracing::info;

pub use broadcast::{Broadcaster, Subscription};
pub use event_log::{EVENT_LOG_CAPACITY, EventLog};
pub use orchestrator::{Orchestrator, OrchestratorError, RemoveOutcome};

/// Shared gateway state.
pub struct GatewayState {
    pub orchestrator: Arc<Orchestrator>,
    /// Ends open event streams so graceful shutdown is not held up by them.
    pub shutdown: CancellationToken,
}

/// Build the API router around an orchestrator.
pub fn router(orchestrator: Arc<Orchestrator>, shutdown: CancellationToken) -> Router {
    let state = Arc::new(GatewayState {
        orchestrator,
        shutdown,
    });

    Router::new()
        .route("/api/healthcheck", get(handlers::healthcheck))
        .route("/api/send", post(handlers::send))
        .route("/api/webhook/test", post(handlers::webhook_test))
        .route("/api/webhook/update", post(handlers::webhook_update))
        .route("/api/cron/list", get(handlers::cron_list))
        .route("/api/cron/add", post(handlers::cron_add))
        .route("/api/cron/delete/{id}", delete(handlers::cron_delete))
        .route("/api/events", get(handlers::events))
        .route("/api/events/stream", get(handlers::events_stream))
        .with_state(state)
}

/// Serve the API on `addr` until `shutdown` is cancelled.
pub async fn start_gateway(
    orchestrator: Arc<Orchestrator>,
    addr: SocketAddr,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let app = router(orchestrator, shutdown.clone());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Gateway listening on {}", listener.local_addr()?);
    info!("  Health: http://{addr}/api/healthcheck");
    info!("  Events: http://{addr}/api/events/stream");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    info!("Gateway stopped");
    Ok(())
}
