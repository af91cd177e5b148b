use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::reconcile::{CollectionState, Snapshot};
use crate::telemetry::series::{build_series, chart_domain};
use crate::telemetry::{ChartPoint, WaterLevelReading};

#[derive(Debug, Serialize, ToSchema)]
pub struct LocationsResponse {
    /// Distinct locations of network-active sensors, sorted
    pub locations: Vec<String>,
}

/// One Server-Sent Event frame of a sensor's live series.
#[derive(Debug, Serialize, ToSchema)]
pub struct LiveFrame {
    pub sensor_id: String,
    pub state: CollectionState,
    pub live: bool,
    pub revision: u64,
    pub error: Option<String>,
    /// Readings held for today
    pub count: usize,
    pub latest_reading_time: Option<DateTime<Utc>>,
    pub points: Vec<ChartPoint>,
    pub domain_min: f64,
    pub domain_max: f64,
}

impl LiveFrame {
    pub fn new(sensor_id: &str, snapshot: &Snapshot<WaterLevelReading>) -> Self {
        let points = build_series(&snapshot.items);
        let (domain_min, domain_max) = chart_domain(&points);

        Self {
            sensor_id: sensor_id.to_string(),
            state: snapshot.state,
            live: snapshot.live,
            revision: snapshot.revision,
            error: snapshot.error.clone(),
            count: snapshot.items.len(),
            latest_reading_time: snapshot.items.last().map(|r| r.reading_time),
            points,
            domain_min,
            domain_max,
        }
    }
}
