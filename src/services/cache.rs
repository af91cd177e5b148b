//! Caching of historical reading ranges.
//!
//! Ranges inside the current UTC day are answered from the live readings
//! view. Only ranges that have already ended are cached; entries expire by TTL
//! and are dropped early when a reading change lands inside their range.
//!
//! | Range | Served from |
//! |-------|-------------|
//! | Today (UTC) | live view, never cached |
//! | Closed past range | cache, filled on miss |
//! | Open range (end >= now) | store, not cached |

use chrono::{DateTime, Utc};
use moka::future::Cache;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::common::AppState;
use crate::error::AppResult;
use crate::reconcile::Entity;
use crate::store::{Filter, FilterField, Table};
use crate::telemetry::{WaterLevelReading, sort_ascending_by_time};

/// Build a cache key from a prefix and components.
///
/// Components are joined with `:` separator. Empty components are included
/// to ensure different queries produce different keys.
pub fn cache_key(prefix: &str, components: &[&str]) -> String {
    let mut key = prefix.to_string();
    for c in components {
        key.push(':');
        key.push_str(c);
    }
    key
}

#[derive(Debug, Clone)]
pub struct CachedRange {
    pub sensor_id: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub readings: Arc<Vec<WaterLevelReading>>,
}

impl CachedRange {
    /// Whether a reading with this sensor and time could belong to the range.
    #[must_use]
    pub fn covers(&self, sensor_id: &str, at: DateTime<Utc>) -> bool {
        self.sensor_id.as_deref().is_none_or(|id| id == sensor_id) && at >= self.start && at <= self.end
    }
}

#[derive(Clone)]
pub struct RangeCache {
    inner: Cache<String, CachedRange>,
    /// Bumped by every invalidation, before it takes effect.
    generation: Arc<AtomicU64>,
}

impl RangeCache {
    #[must_use]
    pub fn new(max_entries: u64, ttl: Duration) -> Self {
        let inner = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .support_invalidation_closures()
            .build();
        Self {
            inner,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Current invalidation generation. Take it before fetching a range
    /// that will be passed to [`insert_fetched`](Self::insert_fetched).
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub async fn get(&self, key: &str) -> Option<CachedRange> {
        self.inner.get(key).await
    }

    /// Insert a range fetched at `generation`, unless an invalidation has
    /// happened since. Returns whether the entry was kept.
    pub async fn insert_fetched(&self, key: String, range: CachedRange, generation: u64) -> bool {
        if self.generation() != generation {
            return false;
        }
        self.inner.insert(key.clone(), range).await;
        // An invalidation that raced the insert may predate the entry.
        if self.generation() != generation {
            self.inner.invalidate(&key).await;
            return false;
        }
        true
    }

    /// Drop every entry whose range could contain `reading`.
    pub fn invalidate_reading(&self, reading: &WaterLevelReading) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        let sensor_id = reading.sensor_id.clone();
        let at = reading.reading_time;
        if let Err(e) = self
            .inner
            .invalidate_entries_if(move |_, range| range.covers(&sensor_id, at))
        {
            tracing::warn!(error = %e, "Range invalidation rejected, clearing cache");
            self.inner.invalidate_all();
        }
    }

    pub fn invalidate_all(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.inner.invalidate_all();
        tracing::debug!("cache_cleared");
    }

    /// Process pending maintenance so counts and lookups are current.
    pub async fn sync(&self) {
        self.inner.run_pending_tasks().await;
    }

    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }
}

/// Where a range of readings was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadSource {
    /// Today's live view.
    Live,
    Cache,
    Store,
}

impl ReadSource {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Live => "LIVE",
            Self::Cache => "HIT",
            Self::Store => "MISS",
        }
    }
}

/// Readings in `[start, end]`, oldest first, optionally for one sensor.
///
/// Ranges inside the current UTC day come from the live view; closed ranges
/// go through the cache; anything else hits the store.
pub async fn readings_for_window(
    state: &AppState,
    sensor_id: Option<&str>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> AppResult<(Arc<Vec<WaterLevelReading>>, ReadSource)> {
    let today = state.views.today_window().await;
    if start >= today.start && end <= today.end {
        let (_, snapshot) = state
            .views
            .today_ready(state.config.view_ready_timeout())
            .await?;
        let readings: Vec<WaterLevelReading> = snapshot
            .items
            .iter()
            .filter(|r| sensor_id.is_none_or(|id| r.sensor_id == id))
            .filter(|r| r.reading_time >= start && r.reading_time <= end)
            .cloned()
            .collect();
        return Ok((Arc::new(readings), ReadSource::Live));
    }

    let closed = end < Utc::now();
    let key = cache_key(
        "readings",
        &[sensor_id.unwrap_or(""), &start.to_rfc3339(), &end.to_rfc3339()],
    );

    if closed && let Some(cached) = state.range_cache.get(&key).await {
        tracing::debug!(cache_key = %key, count = cached.readings.len(), "cache_hit");
        return Ok((cached.readings, ReadSource::Cache));
    }

    let generation = state.range_cache.generation();
    let filter = sensor_id.map(|id| Filter::eq(FilterField::SensorId, id));
    let records = state
        .store
        .fetch_range(Table::WaterLevelReadings, start, end, filter.as_ref())
        .await?;

    let mut readings: Vec<WaterLevelReading> = records
        .into_iter()
        .filter_map(WaterLevelReading::from_record)
        .collect();
    sort_ascending_by_time(&mut readings);
    let readings = Arc::new(readings);

    if closed {
        let range = CachedRange {
            sensor_id: sensor_id.map(str::to_string),
            start,
            end,
            readings: Arc::clone(&readings),
        };
        if state.range_cache.insert_fetched(key.clone(), range, generation).await {
            tracing::debug!(cache_key = %key, count = readings.len(), "cache_stored");
        } else {
            tracing::debug!(cache_key = %key, "cache_skipped_after_invalidation");
        }
    }

    Ok((readings, ReadSource::Store))
}

/// `X-Cache` response header for `source`.
#[must_use]
pub fn cache_header(source: ReadSource) -> [(&'static str, &'static str); 1] {
    [("x-cache", source.as_str())]
}
