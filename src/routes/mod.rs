pub mod dashboard;
pub mod health;
pub mod history;
pub mod readings;
pub mod sensors;
pub mod status;

use axum::{Router, routing::get};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::common::AppState;
use crate::error::{AppError, AppResult};
use crate::telemetry::{DayWindow, window};

/// Resolve `date` or `start`/`end` query parameters into an instant range.
///
/// No parameters means the current UTC day.
pub fn resolve_window(
    date: Option<NaiveDate>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    max_range_days: i64,
) -> AppResult<(DateTime<Utc>, DateTime<Utc>)> {
    match (date, start, end) {
        (Some(date), None, None) => {
            let window = DayWindow::for_date(date);
            Ok((window.start, window.end))
        }
        (Some(_), _, _) => Err(AppError::BadRequest(
            "Use either date or start/end, not both".to_string(),
        )),
        (None, Some(start), Some(end)) => {
            if end < start {
                return Err(AppError::BadRequest("end must not be before start".to_string()));
            }
            if end - start > Duration::days(max_range_days) {
                return Err(AppError::BadRequest(format!(
                    "Range exceeds {max_range_days} days"
                )));
            }
            Ok((start, end))
        }
        (None, None, None) => {
            let window = window::today();
            Ok((window.start, window.end))
        }
        _ => Err(AppError::BadRequest(
            "Both start and end are required".to_string(),
        )),
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::healthz,
        health::readyz,
        status::classify_level,
        status::list_bands,
        dashboard::get_dashboard,
        sensors::list_statuses,
        sensors::get_sensor,
        sensors::get_sensor_status,
        sensors::live_sensor,
        sensors::list_locations,
        readings::get_readings,
        readings::get_series,
        history::get_history,
    ),
    components(
        schemas(
            crate::telemetry::StatusLevel,
            crate::telemetry::Sensor,
            crate::telemetry::SensorCurrentStatus,
            crate::telemetry::WaterLevelReading,
            crate::telemetry::ChartPoint,
            crate::telemetry::StatusDistributionBucket,
            crate::telemetry::DayWindow,
            crate::reconcile::CollectionState,
            health::ReadinessResponse,
            health::ViewHealth,
            status::ClassificationResponse,
            status::BandResponse,
            dashboard::DashboardResponse,
            dashboard::StatusCount,
            sensors::LocationsResponse,
            sensors::LiveFrame,
            readings::ReadingsResponse,
            readings::SeriesResponse,
            readings::ChartDomain,
            history::HistoryResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "status", description = "Water-level status classification"),
        (name = "sensors", description = "Sensors and their current status"),
        (name = "readings", description = "Water-level readings and chart series"),
        (name = "history", description = "Daily history and status distribution"),
    ),
    info(
        title = "Flood Watch API",
        description = "Live water-level status and aggregated telemetry",
        version = "0.1.0"
    )
)]
struct ApiDoc;

pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/status/classify", get(status::classify_level))
        .route("/status/bands", get(status::list_bands))
        .route("/dashboard", get(dashboard::get_dashboard))
        .route("/sensors/status", get(sensors::list_statuses))
        .route("/sensors/{sensor_id}", get(sensors::get_sensor))
        .route("/sensors/{sensor_id}/status", get(sensors::get_sensor_status))
        .route("/sensors/{sensor_id}/live", get(sensors::live_sensor))
        .route("/locations", get(sensors::list_locations))
        .route("/readings", get(readings::get_readings))
        .route("/series", get(readings::get_series))
        .route("/history", get(history::get_history))
        .layer(RequestBodyLimitLayer::new(1024 * 1024)); // 1MB body limit

    let health_routes = Router::new()
        .route("/healthz", get(health::healthz))
        .route("/readyz", get(health::readyz));

    // OpenAPI documentation
    let docs_routes = Router::new().merge(Scalar::with_url("/docs", ApiDoc::openapi()));

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .merge(docs_routes)
        .layer(CompressionLayer::new())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
