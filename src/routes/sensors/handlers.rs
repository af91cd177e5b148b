use axum::{
    Json,
    extract::{Path, State},
};
use std::collections::BTreeSet;

use super::types::LocationsResponse;
use crate::common::AppState;
use crate::error::{AppError, AppResult};
use crate::telemetry::{Sensor, SensorCurrentStatus};

/// Current status of every sensor
#[utoipa::path(
    get,
    path = "/api/sensors/status",
    responses(
        (status = 200, description = "Current statuses ordered by sensor name", body = Vec<SensorCurrentStatus>),
        (status = 502, description = "Status fetch failed"),
        (status = 503, description = "Status view not ready"),
    ),
    tag = "sensors"
)]
pub async fn list_statuses(
    State(state): State<AppState>,
) -> AppResult<Json<Vec<SensorCurrentStatus>>> {
    let snapshot = state
        .views
        .statuses
        .ready_within(state.config.view_ready_timeout())
        .await?;

    Ok(Json(snapshot.items.to_vec()))
}

/// Get a sensor's details
#[utoipa::path(
    get,
    path = "/api/sensors/{sensor_id}",
    params(
        ("sensor_id" = String, Path, description = "Sensor ID"),
    ),
    responses(
        (status = 200, description = "Sensor found", body = Sensor),
        (status = 404, description = "Sensor not found"),
    ),
    tag = "sensors"
)]
pub async fn get_sensor(
    State(state): State<AppState>,
    Path(sensor_id): Path<String>,
) -> AppResult<Json<Sensor>> {
    let snapshot = state
        .views
        .sensors
        .ready_within(state.config.view_ready_timeout())
        .await?;

    snapshot
        .items
        .iter()
        .find(|s| s.id == sensor_id)
        .cloned()
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Sensor '{sensor_id}' not found")))
}

/// Get one sensor's current status
#[utoipa::path(
    get,
    path = "/api/sensors/{sensor_id}/status",
    params(
        ("sensor_id" = String, Path, description = "Sensor ID"),
    ),
    responses(
        (status = 200, description = "Current status", body = SensorCurrentStatus),
        (status = 404, description = "No status row for this sensor"),
    ),
    tag = "sensors"
)]
pub async fn get_sensor_status(
    State(state): State<AppState>,
    Path(sensor_id): Path<String>,
) -> AppResult<Json<SensorCurrentStatus>> {
    let snapshot = state
        .views
        .statuses
        .ready_within(state.config.view_ready_timeout())
        .await?;

    snapshot
        .items
        .iter()
        .find(|s| s.id == sensor_id)
        .cloned()
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("No status for sensor '{sensor_id}'")))
}

/// List locations that have a network-active sensor
#[utoipa::path(
    get,
    path = "/api/locations",
    responses(
        (status = 200, description = "Distinct sorted locations", body = LocationsResponse),
    ),
    tag = "sensors"
)]
pub async fn list_locations(State(state): State<AppState>) -> AppResult<Json<LocationsResponse>> {
    let snapshot = state
        .views
        .sensors
        .ready_within(state.config.view_ready_timeout())
        .await?;

    let locations: BTreeSet<String> = snapshot
        .items
        .iter()
        .filter(|s| s.network_status)
        .map(|s| s.location.trim())
        .filter(|location| !location.is_empty())
        .map(str::to_string)
        .collect();

    Ok(Json(LocationsResponse {
        locations: locations.into_iter().collect(),
    }))
}
