use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use chrono::Utc;
use futures::Stream;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::StreamExt;

use super::types::LiveFrame;
use crate::common::AppState;
use crate::error::{AppError, AppResult};
use crate::reconcile::{DayView, Scope};
use crate::telemetry::WaterLevelReading;

/// Live chart series of a sensor's readings today
///
/// Streams one `snapshot` event per change of a sensor-scoped view of the
/// current UTC day. At UTC midnight the view moves to the new day and the
/// series starts over. The view is released when the client disconnects.
#[utoipa::path(
    get,
    path = "/api/sensors/{sensor_id}/live",
    params(
        ("sensor_id" = String, Path, description = "Sensor ID"),
    ),
    responses(
        (status = 200, description = "text/event-stream of LiveFrame JSON", body = LiveFrame, content_type = "text/event-stream"),
        (status = 404, description = "Sensor not found"),
    ),
    tag = "sensors"
)]
pub async fn live_sensor(
    State(state): State<AppState>,
    Path(sensor_id): Path<String>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let sensors = state
        .views
        .sensors
        .ready_within(state.config.view_ready_timeout())
        .await?;
    if !sensors.items.iter().any(|s| s.id == sensor_id) {
        return Err(AppError::NotFound(format!("Sensor '{sensor_id}' not found")));
    }

    let day: DayView<WaterLevelReading> = DayView::spawn(
        Arc::clone(&state.store),
        Scope::all().sensor(sensor_id.clone()),
        state.config.conflict_policy(),
        Utc::now(),
    );
    tracing::debug!(sensor_id = %sensor_id, "Live series stream opened");

    let check_every = Duration::from_secs(state.config.rollover_check_interval_seconds.max(1));
    let stream = day.follow(check_every, Utc::now).map(move |snapshot| {
        let frame = LiveFrame::new(&sensor_id, &snapshot);
        let data = serde_json::to_string(&frame).unwrap_or_else(|_| "{}".into());
        Ok(Event::default().event("snapshot").data(data))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
