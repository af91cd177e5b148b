use axum::{Json, extract::Query};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::error::{AppError, AppResult};
use crate::telemetry::{STATUS_BANDS, StatusLevel, classify};

#[derive(Debug, Deserialize, IntoParams)]
pub struct ClassifyQuery {
    /// Water level in centimeters
    pub level: f64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ClassificationResponse {
    pub level: f64,
    pub status: StatusLevel,
    pub label: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BandResponse {
    pub status: StatusLevel,
    pub label: String,
    /// Inclusive lower bound in cm (null for the lowest band)
    pub lower_cm: Option<f64>,
    /// Exclusive upper bound in cm (null for the highest band)
    pub upper_cm: Option<f64>,
}

/// Classify a water level
#[utoipa::path(
    get,
    path = "/api/status/classify",
    params(ClassifyQuery),
    responses(
        (status = 200, description = "Status of the given level", body = ClassificationResponse),
        (status = 400, description = "Level is not a finite number"),
    ),
    tag = "status"
)]
pub async fn classify_level(
    Query(query): Query<ClassifyQuery>,
) -> AppResult<Json<ClassificationResponse>> {
    if !query.level.is_finite() {
        return Err(AppError::BadRequest("level must be a finite number".to_string()));
    }
    let status = classify(query.level);

    Ok(Json(ClassificationResponse {
        level: query.level,
        status,
        label: status.label().to_string(),
    }))
}

/// Threshold bands used for classification and chart shading
#[utoipa::path(
    get,
    path = "/api/status/bands",
    responses(
        (status = 200, description = "Bands in ascending severity", body = Vec<BandResponse>),
    ),
    tag = "status"
)]
pub async fn list_bands() -> Json<Vec<BandResponse>> {
    let bands = STATUS_BANDS
        .iter()
        .map(|band| BandResponse {
            status: band.level,
            label: band.level.label().to_string(),
            lower_cm: band.lower_cm,
            upper_cm: band.upper_cm,
        })
        .collect();

    Json(bands)
}
