use axum::{
    Json,
    extract::{Query, State},
    response::IntoResponse,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::common::AppState;
use crate::error::AppResult;
use crate::routes::resolve_window;
use crate::services::cache::{cache_header, readings_for_window};
use crate::telemetry::series::{build_series, chart_domain};
use crate::telemetry::{ChartPoint, DayWindow, WaterLevelReading};

#[derive(Debug, Deserialize, IntoParams)]
pub struct ReadingsQuery {
    /// Only readings of this sensor
    pub sensor_id: Option<String>,
    /// Start of range (inclusive, RFC 3339)
    pub start: Option<DateTime<Utc>>,
    /// End of range (inclusive, RFC 3339)
    pub end: Option<DateTime<Utc>>,
    /// A whole UTC day (YYYY-MM-DD); alternative to start/end
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReadingsResponse {
    pub sensor_id: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub count: usize,
    /// Oldest first
    pub readings: Vec<WaterLevelReading>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct SeriesQuery {
    pub sensor_id: String,
    /// UTC day (YYYY-MM-DD), default today
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, Serialize, ToSchema)]
pub struct ChartDomain {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SeriesResponse {
    pub sensor_id: String,
    pub window: DayWindow,
    /// Readings the series was built from
    pub source_count: usize,
    pub points: Vec<ChartPoint>,
    pub domain: ChartDomain,
}

/// Readings in a time window
///
/// Windows inside the current UTC day are served from the live view; closed
/// windows are cached (`X-Cache: LIVE | HIT | MISS`).
#[utoipa::path(
    get,
    path = "/api/readings",
    params(ReadingsQuery),
    responses(
        (status = 200, description = "Readings retrieved successfully", body = ReadingsResponse),
        (status = 400, description = "Invalid window"),
        (status = 502, description = "Store fetch failed"),
    ),
    tag = "readings"
)]
pub async fn get_readings(
    State(state): State<AppState>,
    Query(query): Query<ReadingsQuery>,
) -> AppResult<impl IntoResponse> {
    let (start, end) = resolve_window(
        query.date,
        query.start,
        query.end,
        state.config.max_range_days,
    )?;

    let (readings, source) =
        readings_for_window(&state, query.sensor_id.as_deref(), start, end).await?;

    tracing::debug!(
        sensor_id = ?query.sensor_id,
        %start,
        %end,
        count = readings.len(),
        source = source.as_str(),
        "Readings served"
    );

    Ok((
        cache_header(source),
        Json(ReadingsResponse {
            sensor_id: query.sensor_id,
            start,
            end,
            count: readings.len(),
            readings: readings.to_vec(),
        }),
    ))
}

/// Chart series of one sensor for a UTC day
///
/// Downsampled to at most 100 points with a 5-point trailing moving average.
#[utoipa::path(
    get,
    path = "/api/series",
    params(SeriesQuery),
    responses(
        (status = 200, description = "Chart-ready series", body = SeriesResponse),
        (status = 502, description = "Store fetch failed"),
    ),
    tag = "readings"
)]
pub async fn get_series(
    State(state): State<AppState>,
    Query(query): Query<SeriesQuery>,
) -> AppResult<impl IntoResponse> {
    let window = match query.date {
        Some(date) => DayWindow::for_date(date),
        None => state.views.today_window().await,
    };

    let (readings, source) =
        readings_for_window(&state, Some(&query.sensor_id), window.start, window.end).await?;

    let points = build_series(&readings);
    let (min, max) = chart_domain(&points);

    Ok((
        cache_header(source),
        Json(SeriesResponse {
            sensor_id: query.sensor_id,
            window,
            source_count: readings.len(),
            points,
            domain: ChartDomain { min, max },
        }),
    ))
}
