use chrono::{DateTime, Utc};
use std::fmt::Debug;

use crate::store::{Filter, FilterField, Record, Table};
use crate::telemetry::{Sensor, SensorCurrentStatus, WaterLevelReading, same_utc_day};

/// What part of a table a live view tracks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scope {
    /// Only rows belonging to this sensor.
    pub sensor_id: Option<String>,
    /// Only rows whose time falls on this instant's UTC day.
    pub anchor: Option<DateTime<Utc>>,
}

impl Scope {
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn sensor(mut self, sensor_id: impl Into<String>) -> Self {
        self.sensor_id = Some(sensor_id.into());
        self
    }

    #[must_use]
    pub fn on_day_of(mut self, anchor: DateTime<Utc>) -> Self {
        self.anchor = Some(anchor);
        self
    }

    /// Store-side filter equivalent to the sensor part of this scope.
    #[must_use]
    pub fn filter_for(&self, table: Table) -> Option<Filter> {
        let field = match table {
            Table::WaterLevelReadings => FilterField::SensorId,
            Table::Sensors | Table::CurrentSensorStatus => FilterField::Id,
        };
        self.sensor_id
            .as_ref()
            .map(|sensor_id| Filter::eq(field, sensor_id.clone()))
    }
}

/// A row type a [`Collection`](super::Collection) can hold.
pub trait Entity: Clone + Debug + Send + Sync + 'static {
    const TABLE: Table;

    /// Sort invariant of the collection.
    type Key: Ord;

    fn id(&self) -> &str;

    fn sort_key(&self) -> Self::Key;

    fn from_record(record: Record) -> Option<Self>;

    /// Whether this row belongs in a view with `scope`.
    fn in_scope(&self, scope: &Scope) -> bool;

    /// Re-derive computed fields instead of trusting the payload.
    #[must_use]
    fn normalize(self) -> Self {
        self
    }

    /// Monotonic revision used when stale updates are rejected.
    fn revision(&self) -> Option<DateTime<Utc>> {
        None
    }
}

impl Entity for Sensor {
    const TABLE: Table = Table::Sensors;
    type Key = (String, String);

    fn id(&self) -> &str {
        &self.id
    }

    fn sort_key(&self) -> Self::Key {
        (self.name.clone(), self.id.clone())
    }

    fn from_record(record: Record) -> Option<Self> {
        match record {
            Record::Sensor(sensor) => Some(sensor),
            _ => None,
        }
    }

    fn in_scope(&self, scope: &Scope) -> bool {
        scope.sensor_id.as_ref().is_none_or(|id| *id == self.id)
    }

    fn revision(&self) -> Option<DateTime<Utc>> {
        Some(self.updated_at)
    }
}

impl Entity for SensorCurrentStatus {
    const TABLE: Table = Table::CurrentSensorStatus;
    type Key = (String, String);

    fn id(&self) -> &str {
        &self.id
    }

    fn sort_key(&self) -> Self::Key {
        (self.name.clone(), self.id.clone())
    }

    fn from_record(record: Record) -> Option<Self> {
        match record {
            Record::Status(status) => Some(status),
            _ => None,
        }
    }

    fn in_scope(&self, scope: &Scope) -> bool {
        scope.sensor_id.as_ref().is_none_or(|id| *id == self.id)
    }

    fn normalize(self) -> Self {
        self.with_derived_status()
    }

    fn revision(&self) -> Option<DateTime<Utc>> {
        Some(self.updated_at)
    }
}

impl Entity for WaterLevelReading {
    const TABLE: Table = Table::WaterLevelReadings;
    type Key = DateTime<Utc>;

    fn id(&self) -> &str {
        &self.id
    }

    fn sort_key(&self) -> Self::Key {
        self.reading_time
    }

    fn from_record(record: Record) -> Option<Self> {
        match record {
            Record::Reading(reading) => Some(reading),
            _ => None,
        }
    }

    fn in_scope(&self, scope: &Scope) -> bool {
        scope.sensor_id.as_ref().is_none_or(|id| *id == self.sensor_id)
            && scope
                .anchor
                .is_none_or(|anchor| same_utc_day(self.reading_time, anchor))
    }
}
