//! sea-orm entities for the tables the service reads.

pub mod current_sensor_status;
pub mod sensors;
pub mod water_level_readings;
