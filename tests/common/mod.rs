//! Shared fixtures for integration tests.
#![allow(dead_code)]

use chrono::{DateTime, Utc};
use flood_watch::telemetry::{Sensor, SensorCurrentStatus, StatusLevel, WaterLevelReading, classify};

pub fn at(rfc3339: &str) -> DateTime<Utc> {
    rfc3339.parse().expect("valid timestamp")
}

pub fn reading(id: &str, sensor_id: &str, level: f64, time: DateTime<Utc>) -> WaterLevelReading {
    WaterLevelReading {
        id: id.to_string(),
        sensor_id: sensor_id.to_string(),
        water_level: level,
        status: if level.is_finite() { classify(level) } else { StatusLevel::Normal },
        reading_time: time,
        created_at: time,
    }
}

pub fn status(id: &str, name: &str, level: Option<f64>) -> SensorCurrentStatus {
    SensorCurrentStatus {
        id: id.to_string(),
        name: name.to_string(),
        location: format!("{name} bridge"),
        battery_level: Some(80),
        water_level: level,
        status: level.map(classify),
        reading_time: level.map(|_| at("2024-03-10T08:00:00Z")),
        updated_at: at("2024-03-10T08:00:00Z"),
    }
}

pub fn sensor(id: &str, name: &str, location: &str, network_status: bool) -> Sensor {
    Sensor {
        id: id.to_string(),
        name: name.to_string(),
        location: location.to_string(),
        latitude: Some(-6.2),
        longitude: Some(106.8),
        installation_date: at("2023-01-01T00:00:00Z"),
        sensor_type: "ultrasonic".to_string(),
        last_calibration: None,
        battery_level: Some(90),
        network_status,
        created_at: at("2023-01-01T00:00:00Z"),
        updated_at: at("2023-01-01T00:00:00Z"),
    }
}
