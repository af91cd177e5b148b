use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::status::{StatusLevel, classify, lenient_status};

/// A provisioned water-level sensor (read-only cached copy).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Sensor {
    pub id: String,
    pub name: String,
    pub location: String,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    pub installation_date: DateTime<Utc>,
    pub sensor_type: String,
    #[serde(default)]
    pub last_calibration: Option<DateTime<Utc>>,
    /// Battery percentage, 0-100; `None` when unknown.
    #[serde(default)]
    pub battery_level: Option<i32>,
    /// Network connectivity flag.
    pub network_status: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Single-row-per-sensor projection of the latest measurement.
///
/// `status` is `None` exactly when `water_level` is `None`; otherwise it is
/// `classify(water_level)`. Use [`SensorCurrentStatus::with_derived_status`]
/// on anything that arrives from outside.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SensorCurrentStatus {
    pub id: String,
    pub name: String,
    pub location: String,
    #[serde(default)]
    pub battery_level: Option<i32>,
    #[serde(default)]
    pub water_level: Option<f64>,
    #[serde(default, deserialize_with = "lenient_status")]
    pub status: Option<StatusLevel>,
    #[serde(default)]
    pub reading_time: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl SensorCurrentStatus {
    /// Recompute `status` from `water_level`, dropping non-finite levels.
    #[must_use]
    pub fn with_derived_status(mut self) -> Self {
        self.water_level = self.water_level.filter(|level| level.is_finite());
        self.status = self.water_level.map(classify);
        self
    }
}

/// Immutable water-level measurement.
///
/// An unknown or missing status tag decodes as `classify(water_level)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(from = "ReadingRow")]
pub struct WaterLevelReading {
    pub id: String,
    pub sensor_id: String,
    /// Centimeters.
    pub water_level: f64,
    /// Status recorded at ingestion time.
    pub status: StatusLevel,
    pub reading_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl WaterLevelReading {
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.water_level.is_finite()
    }
}

#[derive(Deserialize)]
struct ReadingRow {
    id: String,
    sensor_id: String,
    water_level: f64,
    #[serde(default, deserialize_with = "lenient_status")]
    status: Option<StatusLevel>,
    reading_time: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl From<ReadingRow> for WaterLevelReading {
    fn from(row: ReadingRow) -> Self {
        Self {
            status: row.status.unwrap_or_else(|| classify(row.water_level)),
            id: row.id,
            sensor_id: row.sensor_id,
            water_level: row.water_level,
            reading_time: row.reading_time,
            created_at: row.created_at,
        }
    }
}

/// One chart-ready point.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ChartPoint {
    /// `HH:MM` of the reading time in UTC.
    pub label: String,
    /// Measurement rounded to the nearest centimeter.
    pub value: i64,
    /// Trailing simple moving average, one decimal.
    pub smoothed: Option<f64>,
    pub time: DateTime<Utc>,
    /// Classification of the displayed value.
    pub status: StatusLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct StatusDistributionBucket {
    pub status: StatusLevel,
    pub count: usize,
    /// Rounded share of the counted readings, 0-100.
    pub percentage: u32,
}
