//! Tests for live views driven by a store's change stream.
//!
//! Run with: cargo test --test reconciler_test

mod common;

use common::{at, reading, status};
use flood_watch::common::LiveViews;
use flood_watch::reconcile::{
    ChangeEvent, CollectionState, ConflictPolicy, DayView, Entity, LiveView, Scope, Snapshot,
    ViewError,
};
use flood_watch::store::{MemoryStore, Record, Table, TelemetryStore};
use flood_watch::telemetry::{SensorCurrentStatus, StatusLevel, WaterLevelReading};
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::{Stream, StreamExt};

const WAIT: Duration = Duration::from_secs(5);

async fn wait_until<T: Entity>(
    view: &LiveView<T>,
    predicate: impl Fn(&Snapshot<T>) -> bool,
) -> Snapshot<T> {
    let mut rx = view.watch();
    let snapshot = tokio::time::timeout(WAIT, rx.wait_for(|s| predicate(s)))
        .await
        .expect("timed out waiting for snapshot")
        .expect("view task ended")
        .clone();
    snapshot
}

async fn wait_subscribers(store: &MemoryStore, table: Table, expected: usize) {
    for _ in 0..500 {
        if store.subscriber_count(table) == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "expected {expected} subscribers on {table}, found {}",
        store.subscriber_count(table)
    );
}

fn status_view(store: &Arc<MemoryStore>) -> LiveView<SensorCurrentStatus> {
    let store: Arc<dyn TelemetryStore> = store.clone();
    LiveView::spawn(store, Scope::all(), ConflictPolicy::LastApplied)
}

#[tokio::test]
async fn loads_existing_rows_and_follows_changes() {
    let store = Arc::new(MemoryStore::new());
    store.seed(Record::Status(status("s1", "Alpha", Some(40.0))));
    store.seed(Record::Status(status("s2", "Beta", None)));

    let view = status_view(&store);
    let snapshot = view.ready_within(WAIT).await.unwrap();
    assert_eq!(snapshot.items.len(), 2);
    assert!(snapshot.live);

    store.upsert(Record::Status(status("s2", "Beta", Some(160.0))));
    let snapshot = wait_until(&view, |s| {
        s.items.iter().any(|i| i.id == "s2" && i.water_level.is_some())
    })
    .await;
    let beta = snapshot.items.iter().find(|i| i.id == "s2").unwrap();
    assert_eq!(beta.status, Some(StatusLevel::Siaga));

    store.delete(Table::CurrentSensorStatus, "s1");
    let snapshot = wait_until(&view, |s| s.items.len() == 1).await;
    assert_eq!(snapshot.items[0].id, "s2");
}

#[tokio::test]
async fn events_during_cold_start_are_not_lost() {
    let store = Arc::new(MemoryStore::new());
    store.seed(Record::Status(status("s1", "Alpha", Some(40.0))));
    store.pause_fetches();

    let view = status_view(&store);
    wait_subscribers(&store, Table::CurrentSensorStatus, 1).await;
    wait_until(&view, |s| s.state == CollectionState::Loading).await;

    // Delivered only through the stream; the fetch still returns the old row.
    store.emit(ChangeEvent::update(
        Record::Status(status("s1", "Alpha", Some(230.0))),
        None,
    ));
    store.emit(ChangeEvent::insert(Record::Status(status("s7", "Eta", None))));

    store.resume_fetches();
    // s7 exists only in the stream, and arrived after the s1 update.
    let snapshot = wait_until(&view, |s| s.is_ready() && s.items.len() == 2).await;
    let alpha = snapshot.items.iter().find(|i| i.id == "s1").unwrap();
    assert_eq!(alpha.status, Some(StatusLevel::Danger));
}

#[tokio::test]
async fn incoming_status_tags_are_recomputed() {
    let store = Arc::new(MemoryStore::new());
    let view = status_view(&store);
    view.ready_within(WAIT).await.unwrap();

    let mut row = status("s1", "Alpha", Some(180.0));
    row.status = Some(StatusLevel::Normal);
    store.upsert(Record::Status(row));

    let snapshot = wait_until(&view, |s| !s.items.is_empty()).await;
    assert_eq!(snapshot.items[0].status, Some(StatusLevel::Siaga));
}

#[tokio::test]
async fn fetch_failure_surfaces_and_reload_recovers() {
    let store = Arc::new(MemoryStore::new());
    store.seed(Record::Status(status("s1", "Alpha", Some(40.0))));
    store.fail_fetches(Some("connection refused"));

    let view = status_view(&store);
    match view.ready_within(WAIT).await {
        Err(ViewError::FetchFailed(message)) => assert!(message.contains("connection refused")),
        other => panic!("expected fetch failure, got {other:?}"),
    }
    assert_eq!(view.snapshot().state, CollectionState::Failed);

    // No automatic retry.
    store.fail_fetches(None);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(view.snapshot().state, CollectionState::Failed);

    view.reload();
    let snapshot = wait_until(&view, |s| s.is_ready()).await;
    assert_eq!(snapshot.items.len(), 1);
    assert!(snapshot.error.is_none());
}

#[tokio::test]
async fn closed_stream_marks_view_not_live_until_reload() {
    let store = Arc::new(MemoryStore::new());
    let view = status_view(&store);
    view.ready_within(WAIT).await.unwrap();

    store.disconnect_all();
    let snapshot = wait_until(&view, |s| !s.live).await;
    assert_eq!(snapshot.state, CollectionState::Ready);

    view.reload();
    wait_until(&view, |s| s.live && s.is_ready()).await;
    wait_subscribers(&store, Table::CurrentSensorStatus, 1).await;

    store.upsert(Record::Status(status("s1", "Alpha", Some(10.0))));
    wait_until(&view, |s| s.items.len() == 1).await;
}

#[tokio::test]
async fn dispose_releases_the_subscription() {
    let store = Arc::new(MemoryStore::new());
    let view = status_view(&store);
    view.ready_within(WAIT).await.unwrap();
    wait_subscribers(&store, Table::CurrentSensorStatus, 1).await;

    let rx = view.watch();
    view.dispose().await;
    wait_subscribers(&store, Table::CurrentSensorStatus, 0).await;

    let revision = rx.borrow().revision;
    store.upsert(Record::Status(status("s1", "Alpha", Some(10.0))));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(rx.borrow().revision, revision);
    assert!(rx.has_changed().is_err(), "sender should be gone");
}

#[tokio::test]
async fn dropping_a_view_cancels_it() {
    let store = Arc::new(MemoryStore::new());
    let view = status_view(&store);
    view.ready_within(WAIT).await.unwrap();

    drop(view);
    wait_subscribers(&store, Table::CurrentSensorStatus, 0).await;
}

#[tokio::test]
async fn views_are_independently_cancellable() {
    let store = Arc::new(MemoryStore::new());
    let first = status_view(&store);
    let second = status_view(&store);
    first.ready_within(WAIT).await.unwrap();
    second.ready_within(WAIT).await.unwrap();
    wait_subscribers(&store, Table::CurrentSensorStatus, 2).await;

    first.dispose().await;
    wait_subscribers(&store, Table::CurrentSensorStatus, 1).await;

    store.upsert(Record::Status(status("s1", "Alpha", Some(10.0))));
    wait_until(&second, |s| s.items.len() == 1).await;
}

#[tokio::test]
async fn sensor_day_view_only_tracks_its_sensor_and_day() {
    let store = Arc::new(MemoryStore::new());
    let anchor = at("2024-03-10T12:00:00Z");
    store.seed(Record::Reading(reading("r1", "s1", 50.0, at("2024-03-10T01:00:00Z"))));
    store.seed(Record::Reading(reading("r2", "s2", 60.0, at("2024-03-10T02:00:00Z"))));
    store.seed(Record::Reading(reading("r0", "s1", 70.0, at("2024-03-09T23:00:00Z"))));

    let dyn_store: Arc<dyn TelemetryStore> = store.clone();
    let view: LiveView<WaterLevelReading> = LiveView::spawn(
        dyn_store,
        Scope::all().sensor("s1").on_day_of(anchor),
        ConflictPolicy::LastApplied,
    );
    let snapshot = view.ready_within(WAIT).await.unwrap();
    let ids: Vec<&str> = snapshot.items.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, ["r1"]);

    // Other sensor, other day, then a match.
    store.upsert(Record::Reading(reading("r3", "s2", 10.0, at("2024-03-10T03:00:00Z"))));
    store.upsert(Record::Reading(reading("r4", "s1", 10.0, at("2024-03-11T00:00:00Z"))));
    store.upsert(Record::Reading(reading("r5", "s1", 10.0, at("2024-03-10T00:30:00Z"))));

    let snapshot = wait_until(&view, |s| s.items.len() == 2).await;
    let ids: Vec<&str> = snapshot.items.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, ["r5", "r1"]);
}

#[tokio::test]
async fn today_view_rotates_at_utc_midnight() {
    let store = Arc::new(MemoryStore::new());
    store.seed(Record::Reading(reading("a", "s1", 50.0, at("2024-03-09T10:00:00Z"))));
    store.seed(Record::Reading(reading("b", "s1", 60.0, at("2024-03-10T00:30:00Z"))));
    let shared: Arc<dyn TelemetryStore> = store.clone();
    let views = LiveViews::spawn(shared, ConflictPolicy::LastApplied, at("2024-03-09T23:59:00Z"));

    let (window, snapshot) = views.today_ready(WAIT).await.unwrap();
    assert_eq!(window.date().to_string(), "2024-03-09");
    assert_eq!(snapshot.items.len(), 1);
    assert_eq!(snapshot.items[0].id, "a");

    assert!(!views.rotate_if_needed(at("2024-03-09T23:59:59Z")).await);
    assert!(views.rotate_if_needed(at("2024-03-10T00:00:01Z")).await);
    assert!(!views.rotate_if_needed(at("2024-03-10T12:00:00Z")).await);

    let (window, snapshot) = views.today_ready(WAIT).await.unwrap();
    assert_eq!(window.date().to_string(), "2024-03-10");
    assert_eq!(snapshot.items.len(), 1);
    assert_eq!(snapshot.items[0].id, "b");

    // The previous day's subscription was released.
    wait_subscribers(&store, Table::WaterLevelReadings, 1).await;
}

async fn next_matching<S>(
    frames: &mut S,
    predicate: impl Fn(&Snapshot<WaterLevelReading>) -> bool,
) -> Snapshot<WaterLevelReading>
where
    S: Stream<Item = Snapshot<WaterLevelReading>> + Unpin,
{
    tokio::time::timeout(WAIT, async {
        while let Some(snapshot) = frames.next().await {
            if predicate(&snapshot) {
                return snapshot;
            }
        }
        panic!("frame stream ended");
    })
    .await
    .expect("timed out waiting for frame")
}

fn reading_ids(snapshot: &Snapshot<WaterLevelReading>) -> Vec<String> {
    snapshot.items.iter().map(|r| r.id.clone()).collect()
}

#[tokio::test]
async fn followed_day_view_moves_to_the_next_utc_day() {
    let store = Arc::new(MemoryStore::new());
    store.seed(Record::Reading(reading("a", "s1", 50.0, at("2024-03-09T10:00:00Z"))));
    store.seed(Record::Reading(reading("b", "s1", 60.0, at("2024-03-10T00:30:00Z"))));
    store.seed(Record::Reading(reading("c", "s2", 70.0, at("2024-03-10T01:00:00Z"))));

    let clock = Arc::new(std::sync::Mutex::new(at("2024-03-09T23:59:00Z")));
    let now = {
        let clock = Arc::clone(&clock);
        move || *clock.lock().unwrap()
    };

    let shared: Arc<dyn TelemetryStore> = store.clone();
    let day: DayView<WaterLevelReading> = DayView::spawn(
        shared,
        Scope::all().sensor("s1"),
        ConflictPolicy::LastApplied,
        now(),
    );
    assert_eq!(day.window().date().to_string(), "2024-03-09");
    let mut frames = day.follow(Duration::from_millis(10), now);

    let first = next_matching(&mut frames, Snapshot::is_ready).await;
    assert_eq!(reading_ids(&first), ["a"]);

    // Past midnight a new reading only reaches the view of the new day.
    *clock.lock().unwrap() = at("2024-03-10T00:00:05Z");
    let rolled = next_matching(&mut frames, |s| s.is_ready() && reading_ids(s) == ["b"]).await;
    assert!(rolled.live);
    wait_subscribers(&store, Table::WaterLevelReadings, 1).await;

    store.upsert(Record::Reading(reading("d", "s1", 80.0, at("2024-03-10T02:00:00Z"))));
    next_matching(&mut frames, |s| reading_ids(s) == ["b", "d"]).await;

    drop(frames);
    wait_subscribers(&store, Table::WaterLevelReadings, 0).await;
}

#[tokio::test]
async fn day_view_rolls_over_only_on_a_new_utc_day() {
    let store: Arc<dyn TelemetryStore> = Arc::new(MemoryStore::new());
    let mut day: DayView<WaterLevelReading> = DayView::spawn(
        store,
        Scope::all().on_day_of(at("2024-01-01T00:00:00Z")),
        ConflictPolicy::LastApplied,
        at("2024-03-10T08:00:00Z"),
    );
    // The anchor on the passed scope is replaced by `now`'s day.
    assert_eq!(day.window().date().to_string(), "2024-03-10");

    assert!(day.roll_over(at("2024-03-10T23:59:59.999Z")).is_none());
    let previous = day.roll_over(at("2024-03-11T00:00:00Z"));
    assert!(previous.is_some());
    assert_eq!(day.window().date().to_string(), "2024-03-11");
}
