use axum::{
    Json,
    extract::{Query, State},
    response::IntoResponse,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use utoipa::{IntoParams, ToSchema};

use crate::common::AppState;
use crate::error::AppResult;
use crate::services::cache::{cache_header, readings_for_window};
use crate::telemetry::history::HistoryFilter;
use crate::telemetry::{
    ChartPoint, DayWindow, StatusDistributionBucket, StatusLevel, WaterLevelReading, build_series,
    distribution, sort_descending_by_time,
};

#[derive(Debug, Deserialize, IntoParams)]
pub struct HistoryQuery {
    /// UTC day (YYYY-MM-DD), default today
    pub date: Option<NaiveDate>,
    /// Only sensors at this location
    pub location: Option<String>,
    /// Only readings recorded with this status
    pub status: Option<StatusLevel>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HistoryResponse {
    pub date: NaiveDate,
    pub window: DayWindow,
    pub location: Option<String>,
    pub status: Option<StatusLevel>,
    pub total: usize,
    /// Always four buckets: normal, warning, siaga, danger
    pub distribution: Vec<StatusDistributionBucket>,
    /// Newest first
    pub readings: Vec<WaterLevelReading>,
    /// Oldest first, downsampled and smoothed
    pub series: Vec<ChartPoint>,
}

/// Readings history and status distribution for a UTC day
#[utoipa::path(
    get,
    path = "/api/history",
    params(HistoryQuery),
    responses(
        (status = 200, description = "History for the day", body = HistoryResponse),
        (status = 502, description = "Store fetch failed"),
    ),
    tag = "history"
)]
pub async fn get_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> AppResult<impl IntoResponse> {
    let window = match query.date {
        Some(date) => DayWindow::for_date(date),
        None => state.views.today_window().await,
    };

    let sensor_ids = match query.location.as_deref() {
        Some(location) => {
            let sensors = state
                .views
                .sensors
                .ready_within(state.config.view_ready_timeout())
                .await?;
            let ids: HashSet<String> = sensors
                .items
                .iter()
                .filter(|s| s.location.trim().eq_ignore_ascii_case(location.trim()))
                .map(|s| s.id.clone())
                .collect();
            Some(ids)
        }
        None => None,
    };

    let filter = HistoryFilter {
        status: query.status,
        sensor_ids,
    };

    let (readings, source) = readings_for_window(&state, None, window.start, window.end).await?;
    let ascending = filter.apply(readings.to_vec());

    let series = build_series(&ascending);
    let buckets = distribution(&ascending);
    let mut descending = ascending;
    sort_descending_by_time(&mut descending);

    tracing::debug!(
        date = %window.date(),
        location = ?query.location,
        status = ?query.status,
        total = descending.len(),
        "History served"
    );

    Ok((
        cache_header(source),
        Json(HistoryResponse {
            date: window.date(),
            window,
            location: query.location,
            status: query.status,
            total: descending.len(),
            distribution: buckets.to_vec(),
            readings: descending,
            series,
        }),
    ))
}
