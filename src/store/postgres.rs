//! Postgres-backed [`TelemetryStore`].
//!
//! Bulk reads go through sea-orm. Change streams use `LISTEN` on the channel
//! fed by the `notify_telemetry_change()` trigger; each subscription holds its
//! own listener connection and stops when the receiver is dropped.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sqlx::postgres::PgListener;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Select};
use serde::Deserialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::{ChangeReceiver, Filter, FilterField, Record, StoreError, StoreResult, Table, TelemetryStore};
use crate::entity::{current_sensor_status, sensors, water_level_readings};
use crate::reconcile::{ChangeEvent, EventType};
use crate::telemetry::{Sensor, SensorCurrentStatus, WaterLevelReading, classify};

/// Body of a `telemetry_changes` notification.
#[derive(Debug, Deserialize)]
struct Notification {
    table: String,
    #[serde(rename = "type")]
    event_type: EventType,
    #[serde(default)]
    record: Option<serde_json::Value>,
    #[serde(default)]
    old_record: Option<serde_json::Value>,
}

#[derive(Clone)]
pub struct PgStore {
    db: DatabaseConnection,
    channel: String,
    buffer: usize,
}

impl PgStore {
    pub fn new(db: DatabaseConnection, channel: impl Into<String>, buffer: usize) -> Self {
        Self {
            db,
            channel: channel.into(),
            buffer,
        }
    }

    async fn fetch(
        &self,
        table: Table,
        range: Option<(DateTime<Utc>, DateTime<Utc>)>,
        filter: Option<&Filter>,
    ) -> StoreResult<Vec<Record>> {
        // A malformed id cannot match any uuid column.
        if let Some(f) = filter
            && matches!(f.field, FilterField::Id | FilterField::SensorId)
            && Uuid::parse_str(&f.value).is_err()
        {
            return Ok(Vec::new());
        }

        let records = match table {
            Table::Sensors => {
                let mut query = filter_sensors(sensors::Entity::find(), filter)?;
                if let Some((start, end)) = range {
                    query = query.filter(sensors::Column::UpdatedAt.between(start, end));
                }
                query
                    .order_by_asc(sensors::Column::Name)
                    .all(&self.db)
                    .await?
                    .into_iter()
                    .map(|m| Record::Sensor(m.into()))
                    .collect()
            }
            Table::CurrentSensorStatus => {
                let mut query = filter_statuses(current_sensor_status::Entity::find(), filter)?;
                if let Some((start, end)) = range {
                    query = query.filter(current_sensor_status::Column::ReadingTime.between(start, end));
                }
                query
                    .order_by_asc(current_sensor_status::Column::Name)
                    .all(&self.db)
                    .await?
                    .into_iter()
                    .map(|m| Record::Status(m.into()))
                    .collect()
            }
            Table::WaterLevelReadings => {
                let mut query = filter_readings(water_level_readings::Entity::find(), filter)?;
                if let Some((start, end)) = range {
                    query = query.filter(water_level_readings::Column::ReadingTime.between(start, end));
                }
                query
                    .order_by_asc(water_level_readings::Column::ReadingTime)
                    .all(&self.db)
                    .await?
                    .into_iter()
                    .map(|m| Record::Reading(m.into()))
                    .collect()
            }
        };

        Ok(records)
    }
}

fn parsed_id(filter: &Filter) -> Uuid {
    Uuid::parse_str(&filter.value).unwrap_or_default()
}

fn filter_sensors(
    query: Select<sensors::Entity>,
    filter: Option<&Filter>,
) -> StoreResult<Select<sensors::Entity>> {
    let Some(f) = filter else {
        return Ok(query);
    };
    match f.field {
        FilterField::Id => Ok(query.filter(sensors::Column::Id.eq(parsed_id(f)))),
        FilterField::Location => Ok(query.filter(sensors::Column::Location.eq(f.value.as_str()))),
        field => Err(StoreError::UnsupportedFilter {
            table: Table::Sensors,
            field,
        }),
    }
}

fn filter_statuses(
    query: Select<current_sensor_status::Entity>,
    filter: Option<&Filter>,
) -> StoreResult<Select<current_sensor_status::Entity>> {
    let Some(f) = filter else {
        return Ok(query);
    };
    match f.field {
        FilterField::Id => Ok(query.filter(current_sensor_status::Column::Id.eq(parsed_id(f)))),
        FilterField::Location => {
            Ok(query.filter(current_sensor_status::Column::Location.eq(f.value.as_str())))
        }
        FilterField::Status => {
            Ok(query.filter(current_sensor_status::Column::Status.eq(f.value.as_str())))
        }
        field => Err(StoreError::UnsupportedFilter {
            table: Table::CurrentSensorStatus,
            field,
        }),
    }
}

fn filter_readings(
    query: Select<water_level_readings::Entity>,
    filter: Option<&Filter>,
) -> StoreResult<Select<water_level_readings::Entity>> {
    let Some(f) = filter else {
        return Ok(query);
    };
    match f.field {
        FilterField::Id => Ok(query.filter(water_level_readings::Column::Id.eq(parsed_id(f)))),
        FilterField::SensorId => {
            Ok(query.filter(water_level_readings::Column::SensorId.eq(parsed_id(f))))
        }
        FilterField::Status => {
            Ok(query.filter(water_level_readings::Column::Status.eq(f.value.as_str())))
        }
        field => Err(StoreError::UnsupportedFilter {
            table: Table::WaterLevelReadings,
            field,
        }),
    }
}

impl From<sensors::Model> for Sensor {
    fn from(m: sensors::Model) -> Self {
        Self {
            id: m.id.to_string(),
            name: m.name,
            location: m.location,
            latitude: m.latitude,
            longitude: m.longitude,
            installation_date: m.installation_date.with_timezone(&Utc),
            sensor_type: m.sensor_type,
            last_calibration: m.last_calibration.map(|t| t.with_timezone(&Utc)),
            battery_level: m.battery_level,
            network_status: m.network_status,
            created_at: m.created_at.with_timezone(&Utc),
            updated_at: m.updated_at.with_timezone(&Utc),
        }
    }
}

impl From<current_sensor_status::Model> for SensorCurrentStatus {
    fn from(m: current_sensor_status::Model) -> Self {
        Self {
            id: m.id.to_string(),
            name: m.name,
            location: m.location,
            battery_level: m.battery_level,
            water_level: m.water_level,
            status: m.status.as_deref().and_then(|s| s.parse().ok()),
            reading_time: m.reading_time.map(|t| t.with_timezone(&Utc)),
            updated_at: m.updated_at.with_timezone(&Utc),
        }
    }
}

impl From<water_level_readings::Model> for WaterLevelReading {
    fn from(m: water_level_readings::Model) -> Self {
        Self {
            id: m.id.to_string(),
            sensor_id: m.sensor_id.to_string(),
            status: m.status.parse().unwrap_or_else(|_| classify(m.water_level)),
            water_level: m.water_level,
            reading_time: m.reading_time.with_timezone(&Utc),
            created_at: m.created_at.with_timezone(&Utc),
        }
    }
}

/// Decode a `notify_telemetry_change()` payload into a change event for
/// `table`.
///
/// Returns `Ok(None)` for notifications about other tables. A `null`
/// `record` or `old_record` is treated as absent.
///
/// # Errors
///
/// Returns `StoreError::Payload` when the envelope or a row does not decode.
pub fn decode_notification(payload: &str, table: Table) -> StoreResult<Option<ChangeEvent<Record>>> {
    let notification: Notification = serde_json::from_str(payload)?;
    if Table::from_name(&notification.table) != Some(table) {
        return Ok(None);
    }
    let new = notification
        .record
        .filter(|v| !v.is_null())
        .map(|v| Record::from_json(table, v))
        .transpose()?;
    let old = notification
        .old_record
        .filter(|v| !v.is_null())
        .map(|v| Record::from_json(table, v))
        .transpose()?;
    Ok(Some(ChangeEvent {
        event_type: notification.event_type,
        new,
        old,
    }))
}

async fn forward(
    mut listener: PgListener,
    table: Table,
    filter: Option<Filter>,
    tx: mpsc::Sender<ChangeEvent<Record>>,
) {
    loop {
        let received = tokio::select! {
            () = tx.closed() => break,
            received = listener.try_recv() => received,
        };

        let notification = match received {
            Ok(Some(notification)) => notification,
            Ok(None) => {
                // Events may have been missed; close so the view goes non-live.
                tracing::warn!(%table, "Listener connection lost");
                break;
            }
            Err(e) => {
                tracing::error!(%table, error = %e, "Listener failed");
                break;
            }
        };

        let event = match decode_notification(notification.payload(), table) {
            Ok(Some(event)) => event,
            Ok(None) => continue,
            Err(e) => {
                tracing::warn!(%table, error = %e, "Skipping malformed change notification");
                continue;
            }
        };

        if !event.matches(filter.as_ref()) {
            continue;
        }
        if tx.send(event).await.is_err() {
            break;
        }
    }

    if let Err(e) = listener.unlisten_all().await {
        tracing::debug!(%table, error = %e, "Unlisten failed");
    }
    tracing::debug!(%table, "Postgres subscription closed");
}

#[async_trait]
impl TelemetryStore for PgStore {
    async fn fetch_all(&self, table: Table, filter: Option<&Filter>) -> StoreResult<Vec<Record>> {
        self.fetch(table, None, filter).await
    }

    async fn fetch_range(
        &self,
        table: Table,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        filter: Option<&Filter>,
    ) -> StoreResult<Vec<Record>> {
        self.fetch(table, Some((start, end)), filter).await
    }

    async fn subscribe(&self, table: Table, filter: Option<Filter>) -> StoreResult<ChangeReceiver> {
        let pool = self.db.get_postgres_connection_pool();
        let mut listener = PgListener::connect_with(pool)
            .await
            .map_err(|e| StoreError::Subscription(e.to_string()))?;
        listener
            .listen(&self.channel)
            .await
            .map_err(|e| StoreError::Subscription(e.to_string()))?;

        let (tx, rx) = mpsc::channel(self.buffer);
        tokio::spawn(forward(listener, table, filter, tx));

        tracing::debug!(%table, channel = %self.channel, "Postgres subscription opened");
        Ok(rx)
    }
}
