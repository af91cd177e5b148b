//! Pure telemetry computations: classification, UTC windows, chart series and
//! status distributions. Nothing in here performs I/O.

pub mod history;
pub mod model;
pub mod series;
pub mod status;
pub mod window;

pub use history::{distribution, sort_ascending_by_time, sort_descending_by_time};
pub use model::{ChartPoint, Sensor, SensorCurrentStatus, StatusDistributionBucket, WaterLevelReading};
pub use series::build_series;
pub use status::{STATUS_BANDS, StatusLevel, classify};
pub use window::{DayWindow, day_window, same_utc_day};
