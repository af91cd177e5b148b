//! Status distribution and ordering helpers over reading snapshots.

use std::collections::HashSet;

use super::model::{SensorCurrentStatus, StatusDistributionBucket, WaterLevelReading};
use super::status::{StatusLevel, classify};

/// Count readings per status level.
///
/// Always yields the four levels in `normal, warning, siaga, danger` order.
/// Readings with a non-finite measurement are skipped; percentages are taken
/// over the counted readings and are all zero when nothing was counted.
#[must_use]
pub fn distribution(readings: &[WaterLevelReading]) -> [StatusDistributionBucket; 4] {
    let mut counts = [0usize; 4];
    for reading in readings.iter().filter(|r| r.is_finite()) {
        counts[classify(reading.water_level) as usize] += 1;
    }
    let total: usize = counts.iter().sum();

    StatusLevel::ALL.map(|status| {
        let count = counts[status as usize];
        StatusDistributionBucket {
            status,
            count,
            percentage: percentage(count, total),
        }
    })
}

fn percentage(count: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    (count as f64 / total as f64 * 100.0).round() as u32
}

/// Newest first, stable for equal timestamps. Used for tabular display.
pub fn sort_descending_by_time(readings: &mut [WaterLevelReading]) {
    readings.sort_by(|a, b| b.reading_time.cmp(&a.reading_time));
}

/// Oldest first, stable for equal timestamps. Used as chart input.
pub fn sort_ascending_by_time(readings: &mut [WaterLevelReading]) {
    readings.sort_by_key(|r| r.reading_time);
}

/// Mean water level across sensors that currently report a measurement.
#[must_use]
pub fn average_water_level(statuses: &[SensorCurrentStatus]) -> Option<f64> {
    let levels: Vec<f64> = statuses
        .iter()
        .filter_map(|s| s.water_level)
        .filter(|level| level.is_finite())
        .collect();
    if levels.is_empty() {
        return None;
    }
    Some(levels.iter().sum::<f64>() / levels.len() as f64)
}

/// Optional narrowing applied to a history query.
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub status: Option<StatusLevel>,
    /// Keep only readings from these sensors (e.g. resolved from a location).
    pub sensor_ids: Option<HashSet<String>>,
}

impl HistoryFilter {
    /// The status filter uses the same classification as [`distribution`],
    /// not the tag stored at ingestion, so the buckets and the filtered rows
    /// always agree.
    #[must_use]
    pub fn matches(&self, reading: &WaterLevelReading) -> bool {
        self.status
            .is_none_or(|status| reading.is_finite() && classify(reading.water_level) == status)
            && self
                .sensor_ids
                .as_ref()
                .is_none_or(|ids| ids.contains(&reading.sensor_id))
    }

    #[must_use]
    pub fn apply(&self, readings: Vec<WaterLevelReading>) -> Vec<WaterLevelReading> {
        readings.into_iter().filter(|r| self.matches(r)).collect()
    }
}
