//! Resampling and smoothing of raw readings into chart series.

use super::model::{ChartPoint, WaterLevelReading};
use super::status::{DANGER_THRESHOLD_CM, classify};

/// Upper bound on the number of points handed to a chart.
pub const TARGET_POINTS: usize = 100;

/// Trailing window size of the simple moving average.
pub const SMA_PERIOD: usize = 5;

/// Headroom kept above the danger threshold so the band is always visible.
const DOMAIN_HEADROOM_CM: f64 = 50.0;

/// Build a bounded, smoothed chart series from readings in any order.
///
/// Non-finite measurements are dropped, the rest are sorted by reading time
/// (stable) and stride-sampled down to at most [`TARGET_POINTS`]. Each point's
/// smoothed value is the mean of up to [`SMA_PERIOD`] retained raw
/// measurements ending at that point.
#[must_use]
pub fn build_series(readings: &[WaterLevelReading]) -> Vec<ChartPoint> {
    let mut valid: Vec<&WaterLevelReading> = readings.iter().filter(|r| r.is_finite()).collect();
    valid.sort_by_key(|r| r.reading_time);

    let stride = sampling_stride(valid.len());
    let sampled: Vec<&WaterLevelReading> = valid.into_iter().step_by(stride).collect();

    sampled
        .iter()
        .enumerate()
        .map(|(index, reading)| {
            let start = (index + 1).saturating_sub(SMA_PERIOD);
            let window = &sampled[start..=index];
            let sum: f64 = window.iter().map(|r| r.water_level).sum();
            let sma = sum / window.len() as f64;

            let value = reading.water_level.round();
            ChartPoint {
                label: reading.reading_time.format("%H:%M").to_string(),
                value: value as i64,
                smoothed: Some(round_to_tenth(sma)),
                time: reading.reading_time,
                status: classify(value),
            }
        })
        .collect()
}

/// Stride that keeps at most [`TARGET_POINTS`] of `len` elements.
///
/// Rounds up rather than taking `floor(len / 100)`: a floored stride yields
/// up to 199 points for inputs just under 200, breaking the 100-point bound.
#[must_use]
pub fn sampling_stride(len: usize) -> usize {
    if len > TARGET_POINTS {
        len.div_ceil(TARGET_POINTS)
    } else {
        1
    }
}

/// Y-axis range for a series: values floored/ceiled to tens, the danger band
/// always in view, at least 10 cm of padding and never below zero.
#[must_use]
pub fn chart_domain(points: &[ChartPoint]) -> (f64, f64) {
    let ceiling = DANGER_THRESHOLD_CM + DOMAIN_HEADROOM_CM;
    if points.is_empty() {
        return (0.0, ceiling);
    }

    let lowest = points.iter().map(|p| p.value).min().unwrap_or_default() as f64;
    let highest = points.iter().map(|p| p.value).max().unwrap_or_default() as f64;

    let min = (lowest / 10.0).floor() * 10.0;
    let max = (highest.max(ceiling) / 10.0).ceil() * 10.0;
    let padding = ((max - min) * 0.1).max(10.0);

    ((min - padding).max(0.0), max + padding)
}

fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
