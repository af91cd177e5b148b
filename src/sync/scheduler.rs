use chrono::Utc;
use std::time::Duration;
use tokio::time::{MissedTickBehavior, interval};

use crate::common::AppState;
use crate::store::{Record, Table};

/// Keep the live views anchored and healthy.
///
/// Each tick re-anchors the readings view when the UTC day has changed and
/// reloads any view that failed or lost its change stream.
pub async fn run_day_rollover(state: AppState) {
    let interval_secs = state.config.rollover_check_interval_seconds;
    tracing::info!(interval_secs, "Starting day rollover scheduler");

    let mut ticker = interval(Duration::from_secs(interval_secs));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // The views were just started; nothing to check yet.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        tick(&state).await;
    }
}

/// One rollover and health pass.
pub async fn tick(state: &AppState) {
    state.views.rotate_if_needed(Utc::now()).await;
    let reloaded = state.views.reload_unhealthy().await;
    if reloaded > 0 {
        tracing::debug!(reloaded, "Requested view reloads");
    }
}

/// Drop cached ranges as reading changes arrive.
///
/// If the change stream closes, the whole cache is cleared (events may have
/// been missed) and the subscription is reopened after a delay.
pub async fn run_cache_invalidation(state: AppState) {
    let delay = Duration::from_secs(state.config.resubscribe_delay_seconds);
    tracing::info!(delay_secs = delay.as_secs(), "Starting range cache invalidation");

    loop {
        match state.store.subscribe(Table::WaterLevelReadings, None).await {
            Ok(mut rx) => {
                state.range_cache.invalidate_all();
                while let Some(event) = rx.recv().await {
                    for record in [event.new, event.old].into_iter().flatten() {
                        if let Record::Reading(reading) = record {
                            state.range_cache.invalidate_reading(&reading);
                        }
                    }
                }
                tracing::warn!("Reading change stream closed, cache cleared");
                state.range_cache.invalidate_all();
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to subscribe for cache invalidation");
            }
        }
        tokio::time::sleep(delay).await;
    }
}
