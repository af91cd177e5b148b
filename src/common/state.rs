use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::config::Config;
use crate::reconcile::{
    CollectionState, ConflictPolicy, DayView, Entity, LiveView, Scope, Snapshot, ViewError,
    wait_ready,
};
use crate::services::cache::RangeCache;
use crate::store::TelemetryStore;
use crate::telemetry::{DayWindow, Sensor, SensorCurrentStatus, WaterLevelReading};

/// The long-lived views the API serves from.
pub struct LiveViews {
    pub sensors: LiveView<Sensor>,
    pub statuses: LiveView<SensorCurrentStatus>,
    /// All readings of the current UTC day, replaced at midnight.
    today: RwLock<DayView<WaterLevelReading>>,
}

impl LiveViews {
    /// Start every view. Must be called inside a Tokio runtime.
    pub fn spawn(store: Arc<dyn TelemetryStore>, policy: ConflictPolicy, now: DateTime<Utc>) -> Self {
        let sensors = LiveView::spawn(Arc::clone(&store), Scope::all(), policy);
        let statuses = LiveView::spawn(Arc::clone(&store), Scope::all(), policy);
        let today = DayView::spawn(store, Scope::all(), policy, now);

        Self {
            sensors,
            statuses,
            today: RwLock::new(today),
        }
    }

    /// Window the readings view is currently anchored to.
    pub async fn today_window(&self) -> DayWindow {
        self.today.read().await.window()
    }

    /// Latest snapshot of the readings view, loaded or not.
    pub async fn today_snapshot(&self) -> Snapshot<WaterLevelReading> {
        self.today.read().await.view().snapshot()
    }

    /// Readings view snapshot once it has loaded, together with its window.
    ///
    /// # Errors
    ///
    /// Propagates [`ViewError`] from the view.
    pub async fn today_ready(
        &self,
        timeout: Duration,
    ) -> Result<(DayWindow, Snapshot<WaterLevelReading>), ViewError> {
        let (window, rx) = {
            let day = self.today.read().await;
            (day.window(), day.view().watch())
        };
        let snapshot = tokio::time::timeout(timeout, wait_ready(rx))
            .await
            .map_err(|_| ViewError::Timeout(timeout))??;
        Ok((window, snapshot))
    }

    /// Re-anchor the readings view when `now` has moved to a new UTC day.
    ///
    /// Returns `true` if a new view was started.
    pub async fn rotate_if_needed(&self, now: DateTime<Utc>) -> bool {
        let previous = self.today.write().await.roll_over(now);
        let Some(previous) = previous else {
            return false;
        };
        previous.dispose().await;

        tracing::info!(day = %now.date_naive(), "Readings view rotated to new UTC day");
        true
    }

    /// Reload every view that failed or lost its change stream.
    ///
    /// Returns the number of views asked to reload.
    pub async fn reload_unhealthy(&self) -> usize {
        let mut reloaded = usize::from(reload_if_unhealthy(&self.sensors));
        reloaded += usize::from(reload_if_unhealthy(&self.statuses));
        reloaded += usize::from(reload_if_unhealthy(self.today.read().await.view()));
        reloaded
    }
}

fn reload_if_unhealthy<T: Entity>(view: &LiveView<T>) -> bool {
    let snapshot = view.snapshot();
    let unhealthy = match snapshot.state {
        CollectionState::Failed => true,
        CollectionState::Ready => !snapshot.live,
        CollectionState::Uninitialized | CollectionState::Loading => false,
    };
    if unhealthy {
        tracing::info!(
            table = %T::TABLE,
            state = ?snapshot.state,
            live = snapshot.live,
            "Reloading unhealthy live view"
        );
        view.reload();
    }
    unhealthy
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn TelemetryStore>,
    pub config: Arc<Config>,
    pub views: Arc<LiveViews>,
    pub range_cache: RangeCache,
}

impl AppState {
    /// Build the state and start the live views.
    pub fn new(store: Arc<dyn TelemetryStore>, config: Config) -> Self {
        let views = LiveViews::spawn(Arc::clone(&store), config.conflict_policy(), Utc::now());
        let range_cache = RangeCache::new(
            config.cache_max_entries,
            Duration::from_secs(config.cache_ttl_seconds),
        );

        Self {
            store,
            config: Arc::new(config),
            views: Arc::new(views),
            range_cache,
        }
    }
}
