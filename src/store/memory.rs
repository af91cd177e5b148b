//! In-process [`TelemetryStore`].
//!
//! Holds the three tables in memory and fans row changes out to subscribers.
//! Bulk fetches can be paused and failed on demand, which makes the cold-start
//! and error paths of the live views reproducible.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Mutex;
use tokio::sync::{mpsc, watch};

use super::{ChangeReceiver, Filter, Record, StoreError, StoreResult, Table, TelemetryStore};
use crate::reconcile::ChangeEvent;

const DEFAULT_BUFFER: usize = 1024;

struct Subscriber {
    table: Table,
    filter: Option<Filter>,
    tx: mpsc::Sender<ChangeEvent<Record>>,
}

#[derive(Default)]
struct Inner {
    rows: BTreeMap<(Table, String), Record>,
    subscribers: Vec<Subscriber>,
    fail_fetches: Option<String>,
}

pub struct MemoryStore {
    inner: Mutex<Inner>,
    fetch_gate: watch::Sender<bool>,
    buffer: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_buffer(DEFAULT_BUFFER)
    }

    #[must_use]
    pub fn with_buffer(buffer: usize) -> Self {
        let (fetch_gate, _) = watch::channel(true);
        Self {
            inner: Mutex::new(Inner::default()),
            fetch_gate,
            buffer,
        }
    }

    /// Seed a row without emitting a change event.
    pub fn seed(&self, record: Record) {
        self.with_inner(|inner| {
            inner
                .rows
                .insert((record.table(), record.id().to_string()), record);
        });
    }

    /// Insert or replace a row and emit the matching event.
    pub fn upsert(&self, record: Record) {
        let key = (record.table(), record.id().to_string());
        let event = self.with_inner(|inner| match inner.rows.insert(key, record.clone()) {
            Some(old) => ChangeEvent::update(record, Some(old)),
            None => ChangeEvent::insert(record),
        });
        self.emit(event);
    }

    /// Remove a row and emit a delete event. No-op if absent.
    pub fn delete(&self, table: Table, id: &str) {
        let removed = self.with_inner(|inner| inner.rows.remove(&(table, id.to_string())));
        if let Some(old) = removed {
            self.emit(ChangeEvent::delete(old));
        }
    }

    /// Deliver an event to matching subscribers without touching the rows.
    pub fn emit(&self, event: ChangeEvent<Record>) {
        let Some(table) = event.new.as_ref().or(event.old.as_ref()).map(Record::table) else {
            return;
        };
        self.with_inner(|inner| {
            inner.subscribers.retain(|sub| !sub.tx.is_closed());
            for sub in inner
                .subscribers
                .iter()
                .filter(|sub| sub.table == table && event.matches(sub.filter.as_ref()))
            {
                if let Err(e) = sub.tx.try_send(event.clone()) {
                    tracing::warn!(%table, error = %e, "Dropping change for slow subscriber");
                }
            }
        });
    }

    /// Hold every bulk fetch until [`resume_fetches`](Self::resume_fetches).
    pub fn pause_fetches(&self) {
        self.fetch_gate.send_replace(false);
    }

    pub fn resume_fetches(&self) {
        self.fetch_gate.send_replace(true);
    }

    /// Make fetches fail with `message` until cleared with `None`.
    pub fn fail_fetches(&self, message: Option<&str>) {
        self.with_inner(|inner| inner.fail_fetches = message.map(str::to_string));
    }

    /// Close every subscription, as a dropped connection would.
    pub fn disconnect_all(&self) {
        self.with_inner(|inner| inner.subscribers.clear());
    }

    /// Number of open subscriptions on `table`.
    #[must_use]
    pub fn subscriber_count(&self, table: Table) -> usize {
        self.with_inner(|inner| {
            inner.subscribers.retain(|sub| !sub.tx.is_closed());
            inner.subscribers.iter().filter(|sub| sub.table == table).count()
        })
    }

    fn with_inner<R>(&self, f: impl FnOnce(&mut Inner) -> R) -> R {
        let mut guard = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    async fn pass_gate(&self) -> StoreResult<()> {
        let mut gate = self.fetch_gate.subscribe();
        gate.wait_for(|open| *open)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        match self.with_inner(|inner| inner.fail_fetches.clone()) {
            Some(message) => Err(StoreError::Unavailable(message)),
            None => Ok(()),
        }
    }

    fn select(&self, table: Table, predicate: impl Fn(&Record) -> bool) -> Vec<Record> {
        let mut rows: Vec<Record> = self.with_inner(|inner| {
            inner
                .rows
                .iter()
                .filter(|((t, _), record)| *t == table && predicate(*record))
                .map(|(_, record)| record.clone())
                .collect()
        });
        rows.sort_by_key(Record::time);
        rows
    }
}

#[async_trait]
impl TelemetryStore for MemoryStore {
    async fn fetch_all(&self, table: Table, filter: Option<&Filter>) -> StoreResult<Vec<Record>> {
        self.pass_gate().await?;
        Ok(self.select(table, |record| record.matches(filter)))
    }

    async fn fetch_range(
        &self,
        table: Table,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        filter: Option<&Filter>,
    ) -> StoreResult<Vec<Record>> {
        self.pass_gate().await?;
        Ok(self.select(table, |record| {
            record.matches(filter) && record.time().is_some_and(|t| t >= start && t <= end)
        }))
    }

    async fn subscribe(&self, table: Table, filter: Option<Filter>) -> StoreResult<ChangeReceiver> {
        let (tx, rx) = mpsc::channel(self.buffer);
        self.with_inner(|inner| inner.subscribers.push(Subscriber { table, filter, tx }));
        tracing::debug!(%table, "Memory store subscription opened");
        Ok(rx)
    }
}
