//! Views bounded to "today" that follow the UTC day across midnight.

use chrono::{DateTime, Utc};
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior};
use tokio_stream::wrappers::WatchStream;

use super::collection::{ConflictPolicy, Snapshot};
use super::entity::{Entity, Scope};
use super::view::LiveView;
use crate::store::TelemetryStore;
use crate::telemetry::window::today;
use crate::telemetry::{DayWindow, day_window};

/// A [`LiveView`] anchored to one UTC day, re-spawned on the next day by
/// [`roll_over`](Self::roll_over).
pub struct DayView<T: Entity> {
    store: Arc<dyn TelemetryStore>,
    /// Scope without the day anchor.
    scope: Scope,
    policy: ConflictPolicy,
    view: LiveView<T>,
}

impl<T: Entity> DayView<T> {
    /// Start a view over `scope` on the UTC day of `now`. Any anchor already
    /// set on `scope` is replaced.
    pub fn spawn(
        store: Arc<dyn TelemetryStore>,
        scope: Scope,
        policy: ConflictPolicy,
        now: DateTime<Utc>,
    ) -> Self {
        let view = LiveView::spawn(Arc::clone(&store), scope.clone().on_day_of(now), policy);
        Self {
            store,
            scope,
            policy,
            view,
        }
    }

    #[must_use]
    pub fn view(&self) -> &LiveView<T> {
        &self.view
    }

    #[must_use]
    pub fn window(&self) -> DayWindow {
        self.view.scope().anchor.map_or_else(today, day_window)
    }

    /// Re-anchor to the UTC day of `now` if it differs from the current one.
    ///
    /// Returns the replaced view so the caller can dispose of it.
    pub fn roll_over(&mut self, now: DateTime<Utc>) -> Option<LiveView<T>> {
        if self.window().contains(now) {
            return None;
        }
        let next = LiveView::spawn(
            Arc::clone(&self.store),
            self.scope.clone().on_day_of(now),
            self.policy,
        );
        Some(std::mem::replace(&mut self.view, next))
    }

    /// Snapshots of the current day's view, switching to a fresh view when
    /// `clock` crosses UTC midnight. The day is checked every `check_every`.
    ///
    /// Dropping the stream drops the view.
    pub fn follow<C>(self, check_every: Duration, clock: C) -> DayFrames<T, C>
    where
        C: Fn() -> DateTime<Utc> + Unpin,
    {
        let mut ticks = tokio::time::interval(check_every);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let frames = WatchStream::new(self.view.watch());
        DayFrames {
            day: self,
            frames,
            ticks,
            clock,
        }
    }
}

/// Stream returned by [`DayView::follow`].
pub struct DayFrames<T: Entity, C> {
    day: DayView<T>,
    frames: WatchStream<Snapshot<T>>,
    ticks: Interval,
    clock: C,
}

impl<T, C> Stream for DayFrames<T, C>
where
    T: Entity,
    C: Fn() -> DateTime<Utc> + Unpin,
{
    type Item = Snapshot<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        while this.ticks.poll_tick(cx).is_ready() {
            let now = (this.clock)();
            if let Some(previous) = this.day.roll_over(now) {
                // Dropping aborts the old view; its frames are no longer polled.
                drop(previous);
                this.frames = WatchStream::new(this.day.view().watch());
                tracing::debug!(
                    table = %T::TABLE,
                    day = %now.date_naive(),
                    "Followed view rolled over to new UTC day"
                );
            }
        }

        Pin::new(&mut this.frames).poll_next(cx)
    }
}
