//! Access to the external telemetry store.
//!
//! The store is the source of truth. The service only reads from it: bulk
//! fetches for cold start and range queries, plus a change stream per table
//! that the live views reconcile against.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;

use crate::reconcile::ChangeEvent;
use crate::telemetry::{Sensor, SensorCurrentStatus, WaterLevelReading};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Tables the service reads and subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Sensors,
    CurrentSensorStatus,
    WaterLevelReadings,
}

impl Table {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Sensors => "sensors",
            Self::CurrentSensorStatus => "current_sensor_status",
            Self::WaterLevelReadings => "water_level_readings",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "sensors" => Some(Self::Sensors),
            "current_sensor_status" => Some(Self::CurrentSensorStatus),
            "water_level_readings" => Some(Self::WaterLevelReadings),
            _ => None,
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Column an equality filter can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterField {
    Id,
    SensorId,
    Location,
    Status,
}

/// `field = value` narrowing for fetches and subscriptions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Filter {
    pub field: FilterField,
    pub value: String,
}

impl Filter {
    pub fn eq(field: FilterField, value: impl Into<String>) -> Self {
        Self {
            field,
            value: value.into(),
        }
    }
}

/// A typed row from one of the [`Table`]s.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Sensor(Sensor),
    Status(SensorCurrentStatus),
    Reading(WaterLevelReading),
}

impl Record {
    #[must_use]
    pub fn table(&self) -> Table {
        match self {
            Self::Sensor(_) => Table::Sensors,
            Self::Status(_) => Table::CurrentSensorStatus,
            Self::Reading(_) => Table::WaterLevelReadings,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Sensor(s) => &s.id,
            Self::Status(s) => &s.id,
            Self::Reading(r) => &r.id,
        }
    }

    /// Value of `field` on this row, if the table has such a column.
    #[must_use]
    pub fn field(&self, field: FilterField) -> Option<&str> {
        match (self, field) {
            (_, FilterField::Id) => Some(self.id()),
            (Self::Reading(r), FilterField::SensorId) => Some(&r.sensor_id),
            (Self::Reading(r), FilterField::Status) => Some(r.status.as_str()),
            (Self::Sensor(s), FilterField::Location) => Some(&s.location),
            (Self::Status(s), FilterField::Location) => Some(&s.location),
            (Self::Status(s), FilterField::Status) => s.status.map(|level| level.as_str()),
            _ => None,
        }
    }

    #[must_use]
    pub fn matches(&self, filter: Option<&Filter>) -> bool {
        filter.is_none_or(|f| self.field(f.field) == Some(f.value.as_str()))
    }

    /// Instant used by range queries on this row's table.
    #[must_use]
    pub fn time(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Sensor(s) => Some(s.updated_at),
            Self::Status(s) => s.reading_time,
            Self::Reading(r) => Some(r.reading_time),
        }
    }

    /// Decode a JSON row of `table`.
    ///
    /// # Errors
    ///
    /// Returns the serde error when the row does not match the table's shape.
    pub fn from_json(table: Table, value: serde_json::Value) -> Result<Self, serde_json::Error> {
        Ok(match table {
            Table::Sensors => Self::Sensor(serde_json::from_value(value)?),
            Table::CurrentSensorStatus => Self::Status(serde_json::from_value(value)?),
            Table::WaterLevelReadings => Self::Reading(serde_json::from_value(value)?),
        })
    }
}

impl ChangeEvent<Record> {
    /// True when either side of the change passes `filter`.
    #[must_use]
    pub fn matches(&self, filter: Option<&Filter>) -> bool {
        self.new.as_ref().is_some_and(|r| r.matches(filter))
            || self.old.as_ref().is_some_and(|r| r.matches(filter))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Subscription error: {0}")]
    Subscription(String),

    #[error("Malformed payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("Filter on {field:?} is not supported for table {table}")]
    UnsupportedFilter { table: Table, field: FilterField },

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Change stream handed out by [`TelemetryStore::subscribe`].
///
/// Dropping the receiver ends the subscription.
pub type ChangeReceiver = mpsc::Receiver<ChangeEvent<Record>>;

#[async_trait]
pub trait TelemetryStore: Send + Sync {
    /// All rows of `table` matching `filter`.
    async fn fetch_all(&self, table: Table, filter: Option<&Filter>) -> StoreResult<Vec<Record>>;

    /// Rows of `table` whose time column lies in `[start, end]`.
    async fn fetch_range(
        &self,
        table: Table,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        filter: Option<&Filter>,
    ) -> StoreResult<Vec<Record>>;

    /// Stream of insert/update/delete events for `table`.
    async fn subscribe(&self, table: Table, filter: Option<Filter>) -> StoreResult<ChangeReceiver>;
}
