use axum::{Json, extract::State};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::common::AppState;
use crate::error::AppResult;
use crate::telemetry::StatusLevel;
use crate::telemetry::history::average_water_level;

#[derive(Debug, Serialize, ToSchema)]
pub struct StatusCount {
    pub status: StatusLevel,
    pub label: String,
    pub count: usize,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DashboardResponse {
    pub sensor_count: usize,
    /// Sensors with a current measurement
    pub reporting_count: usize,
    /// Mean current water level in cm, one decimal (null if nothing reports)
    pub average_water_level: Option<f64>,
    /// Current sensor count per status, in ascending severity
    pub status_counts: Vec<StatusCount>,
    /// Most recent reading time across sensors
    pub last_reading_time: Option<DateTime<Utc>>,
    /// Whether the status view is receiving change events
    pub live: bool,
}

/// Dashboard summary of current sensor statuses
#[utoipa::path(
    get,
    path = "/api/dashboard",
    responses(
        (status = 200, description = "Summary of current statuses", body = DashboardResponse),
        (status = 502, description = "Status fetch failed"),
        (status = 503, description = "Status view not ready"),
    ),
    tag = "sensors"
)]
pub async fn get_dashboard(State(state): State<AppState>) -> AppResult<Json<DashboardResponse>> {
    let snapshot = state
        .views
        .statuses
        .ready_within(state.config.view_ready_timeout())
        .await?;
    let statuses = snapshot.items.as_slice();

    let status_counts = StatusLevel::ALL
        .iter()
        .map(|&level| StatusCount {
            status: level,
            label: level.label().to_string(),
            count: statuses.iter().filter(|s| s.status == Some(level)).count(),
        })
        .collect();

    Ok(Json(DashboardResponse {
        sensor_count: statuses.len(),
        reporting_count: statuses.iter().filter(|s| s.water_level.is_some()).count(),
        average_water_level: average_water_level(statuses).map(|avg| (avg * 10.0).round() / 10.0),
        status_counts,
        last_reading_time: statuses.iter().filter_map(|s| s.reading_time).max(),
        live: snapshot.live,
    }))
}
