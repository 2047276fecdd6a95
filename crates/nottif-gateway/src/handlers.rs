//! HTTP handlers for the `/api` routes.

use std::convert::Infallible;
use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures::{Stream, StreamExt, stream};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use nottif_cron::ScheduleError;
use nottif_types::{CronJob, Event, EventSource, Identity};

use crate::GatewayState;
use crate::orchestrator::{OrchestratorError, RemoveOutcome};

/// Error response rendered as `{"error": message}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

fn parse_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    match body {
        Ok(Json(value)) => Ok(value),
        Err(rejection) => {
            debug!("Rejected request body: {rejection}");
            Err(ApiError::bad_request("Invalid request body"))
        }
    }
}

/// GET /api/healthcheck
pub async fn healthcheck() -> &'static str {
    "OK"
}

#[derive(Debug, Deserialize)]
pub struct SendRequest {
    #[serde(default)]
    pub content: String,
    pub username: Option<String>,
    pub avatar_url: Option<String>,
}

/// POST /api/send
pub async fn send(
    State(state): State<Arc<GatewayState>>,
    body: Result<Json<SendRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let request = parse_body(body)?;
    if request.content.is_empty() {
        return Err(ApiError::bad_request("Content field is required"));
    }

    let identity = Identity {
        username: request.username.filter(|s| !s.is_empty()),
        avatar_url: request.avatar_url.filter(|s| !s.is_empty()),
    };
    let sent = state
        .orchestrator
        .record_and_notify(EventSource::Api, &request.content, Some(identity))
        .await;
    if sent {
        Ok(Json(json!({ "status": "sent" })))
    } else {
        Err(ApiError::internal("Failed to send notification"))
    }
}

/// POST /api/webhook/test
pub async fn webhook_test(State(state): State<Arc<GatewayState>>) -> Result<Json<Value>, ApiError> {
    if state.orchestrator.send_test().await {
        Ok(Json(json!({ "status": "sent" })))
    } else {
        Err(ApiError::internal("Failed to send test notification"))
    }
}

#[derive(Debug, Deserialize)]
pub struct WebhookUpdateRequest {
    pub url: String,
}

/// POST /api/webhook/update
pub async fn webhook_update(
    State(state): State<Arc<GatewayState>>,
    body: Result<Json<WebhookUpdateRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let request = parse_body(body)?;
    match state.orchestrator.update_webhook_url(&request.url).await {
        Ok(()) => {
            state
                .orchestrator
                .record(EventSource::System, "Updated Webhook URL", true)
                .await;
            Ok(Json(json!({ "status": "updated" })))
        }
        Err(e) => {
            warn!("Webhook update failed: {e}");
            Err(ApiError::internal("Failed to save config"))
        }
    }
}

/// GET /api/cron/list
pub async fn cron_list(State(state): State<Arc<GatewayState>>) -> Json<Vec<CronJob>> {
    Json(state.orchestrator.list_cron_jobs().await)
}

#[derive(Debug, Deserialize)]
pub struct CronAddRequest {
    pub message: String,
    pub schedule: String,
}

/// POST /api/cron/add
pub async fn cron_add(
    State(state): State<Arc<GatewayState>>,
    body: Result<Json<CronAddRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CronJob>), ApiError> {
    let request = parse_body(body)?;
    if request.message.is_empty() || request.schedule.trim().is_empty() {
        return Err(ApiError::bad_request("Message and schedule are required"));
    }

    match state
        .orchestrator
        .add_cron_job(&request.message, request.schedule.trim())
        .await
    {
        Ok(job) => {
            let message = format!("Added cron job: {}", job.message);
            state
                .orchestrator
                .record(EventSource::System, &message, true)
                .await;
            Ok((StatusCode::CREATED, Json(job)))
        }
        Err(OrchestratorError::Schedule(ScheduleError::EngineStopped)) => Err(ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "Scheduler is shutting down",
        )),
        Err(e @ OrchestratorError::Schedule(_)) => Err(ApiError::bad_request(e.to_string())),
        Err(e) => {
            warn!("Adding cron job failed: {e}");
            Err(ApiError::internal("Failed to save config"))
        }
    }
}

/// DELETE /api/cron/delete/{id}
pub async fn cron_delete(
    State(state): State<Arc<GatewayState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    match state.orchestrator.remove_cron_job(&id).await {
        Ok(RemoveOutcome::Removed(job)) => {
            let message = format!("Deleted cron job: {}", job.message);
            state
                .orchestrator
                .record(EventSource::System, &message, true)
                .await;
            Ok(Json(json!({ "status": "deleted" })))
        }
        Ok(RemoveOutcome::NotFound) => {
            Err(ApiError::new(StatusCode::NOT_FOUND, "Cron job not found"))
        }
        Err(e) => {
            warn!(job_id = %id, "Deleting cron job failed: {e}");
            Err(ApiError::internal("Failed to save config"))
        }
    }
}

/// GET /api/events
pub async fn events(State(state): State<Arc<GatewayState>>) -> Json<Vec<Event>> {
    Json(state.orchestrator.current_events().await)
}

/// GET /api/events/stream
///
/// Sends the current log first, then every published snapshot. The
/// subscription is released when the client disconnects or the gateway
/// shuts down.
pub async fn events_stream(
    State(state): State<Arc<GatewayState>>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let (initial, subscription) = state.orchestrator.subscribe_to_events().await;
    let initial: Arc<str> = match serde_json::to_string(&initial) {
        Ok(json) => json.into(),
        Err(e) => {
            warn!("Failed to serialize event log: {e}");
            Arc::from("[]")
        }
    };

    let frames = stream::iter([initial])
        .chain(subscription)
        .take_until(state.shutdown.clone().cancelled_owned())
        .map(|payload| Ok(SseEvent::default().data(&*payload)));
    Sse::new(frames).keep_alive(KeepAlive::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_status() {
        let response = ApiError::new(StatusCode::NOT_FOUND, "Cron job not found").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_send_request_optional_fields() {
        let request: SendRequest = serde_json::from_str(r#"{"content":"hi"}"#).unwrap();
        assert_eq!(request.content, "hi");
        assert!(request.username.is_none());
        assert!(request.avatar_url.is_none());

        let request: SendRequest = serde_json::from_str("{}").unwrap();
        assert!(request.content.is_empty());
    }
}
