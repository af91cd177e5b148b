use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;
use utoipa::ToSchema;

use crate::common::AppState;
use crate::reconcile::{CollectionState, Snapshot};

/// Health check endpoint
///
/// Returns 200 OK if the process is running. Suitable for liveness checks.
#[utoipa::path(
    get,
    path = "/healthz",
    responses(
        (status = 200, description = "Service is healthy"),
    ),
    tag = "health"
)]
pub async fn healthz() -> StatusCode {
    StatusCode::OK
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ViewHealth {
    pub view: String,
    pub state: CollectionState,
    /// Whether the view is receiving change events.
    pub live: bool,
    pub items: usize,
    pub error: Option<String>,
}

impl ViewHealth {
    fn of<T>(view: &str, snapshot: &Snapshot<T>) -> Self {
        Self {
            view: view.to_string(),
            state: snapshot.state,
            live: snapshot.live,
            items: snapshot.items.len(),
            error: snapshot.error.clone(),
        }
    }

    fn is_healthy(&self) -> bool {
        self.state == CollectionState::Ready && self.live
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub views: Vec<ViewHealth>,
}

/// Readiness endpoint
///
/// 200 when every live view is loaded and subscribed, 503 otherwise.
#[utoipa::path(
    get,
    path = "/readyz",
    responses(
        (status = 200, description = "All views ready", body = ReadinessResponse),
        (status = 503, description = "At least one view is loading, failed or not live", body = ReadinessResponse),
    ),
    tag = "health"
)]
pub async fn readyz(State(state): State<AppState>) -> (StatusCode, Json<ReadinessResponse>) {
    let views = vec![
        ViewHealth::of("sensors", &state.views.sensors.snapshot()),
        ViewHealth::of("current_sensor_status", &state.views.statuses.snapshot()),
        ViewHealth::of("water_level_readings_today", &state.views.today_snapshot().await),
    ];
    let ready = views.iter().all(ViewHealth::is_healthy);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(ReadinessResponse { ready, views }))
}
