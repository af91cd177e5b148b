//! Tests for the reconciled in-memory collection.
//!
//! Run with: cargo test --test collection_test

mod common;

use chrono::Duration;
use common::{at, reading, status};
use flood_watch::reconcile::{
    Applied, ChangeEvent, Collection, CollectionState, ConflictPolicy, IgnoreReason, Scope,
};
use flood_watch::telemetry::{SensorCurrentStatus, StatusLevel, WaterLevelReading};

fn ready_statuses(rows: Vec<SensorCurrentStatus>) -> Collection<SensorCurrentStatus> {
    let mut collection = Collection::new(Scope::all(), ConflictPolicy::LastApplied);
    assert!(collection.begin_loading());
    collection.complete_load(rows);
    collection
}

fn ids<T: flood_watch::reconcile::Entity>(collection: &Collection<T>) -> Vec<String> {
    collection.items().iter().map(|i| i.id().to_string()).collect()
}

#[test]
fn lifecycle_moves_through_loading_to_ready() {
    let mut collection: Collection<SensorCurrentStatus> =
        Collection::new(Scope::all(), ConflictPolicy::default());
    assert_eq!(collection.state(), CollectionState::Uninitialized);

    assert!(collection.begin_loading());
    assert!(!collection.begin_loading(), "second load request while loading");
    assert_eq!(collection.state(), CollectionState::Loading);

    collection.complete_load(vec![status("s1", "Alpha", Some(10.0))]);
    assert_eq!(collection.state(), CollectionState::Ready);
    assert_eq!(collection.items().len(), 1);
}

#[test]
fn events_during_loading_are_replayed_in_arrival_order() {
    let mut collection = Collection::new(Scope::all(), ConflictPolicy::LastApplied);
    collection.begin_loading();

    let first = collection.handle(ChangeEvent::update(status("s1", "Alpha", Some(120.0)), None));
    let second = collection.handle(ChangeEvent::update(status("s1", "Alpha", Some(210.0)), None));
    collection.handle(ChangeEvent::insert(status("s3", "Gamma", Some(5.0))));
    assert_eq!(first, Applied::Buffered);
    assert_eq!(second, Applied::Buffered);
    assert_eq!(collection.pending_len(), 3);
    assert!(collection.items().is_empty());

    let replayed = collection.complete_load(vec![
        status("s1", "Alpha", Some(50.0)),
        status("s2", "Beta", None),
    ]);
    assert_eq!(replayed, 3);
    assert_eq!(collection.pending_len(), 0);

    let s1 = collection.get("s1").unwrap();
    assert_eq!(s1.water_level, Some(210.0));
    assert_eq!(s1.status, Some(StatusLevel::Danger));
    assert_eq!(ids(&collection), ["s1", "s2", "s3"]);
}

#[test]
fn insert_then_delete_leaves_no_trace() {
    let mut collection = ready_statuses(vec![status("s1", "Alpha", Some(10.0))]);

    assert_eq!(
        collection.handle(ChangeEvent::insert(status("s9", "Omega", Some(1.0)))),
        Applied::Inserted
    );
    assert_eq!(
        collection.handle(ChangeEvent::delete(status("s9", "Omega", Some(1.0)))),
        Applied::Removed
    );
    assert!(collection.get("s9").is_none());
    assert_eq!(ids(&collection), ["s1"]);

    // Idempotent
    assert_eq!(
        collection.handle(ChangeEvent::delete(status("s9", "Omega", Some(1.0)))),
        Applied::Ignored(IgnoreReason::Absent)
    );
}

#[test]
fn update_recomputes_status_from_water_level() {
    let mut collection = ready_statuses(vec![status("s1", "Alpha", Some(10.0))]);

    let mut incoming = status("s1", "Alpha", Some(180.0));
    incoming.status = Some(StatusLevel::Normal);
    assert_eq!(collection.handle(ChangeEvent::update(incoming, None)), Applied::Replaced);
    assert_eq!(collection.get("s1").unwrap().status, Some(StatusLevel::Siaga));

    let mut cleared = status("s1", "Alpha", None);
    cleared.status = Some(StatusLevel::Danger);
    collection.handle(ChangeEvent::update(cleared, None));
    assert_eq!(collection.get("s1").unwrap().status, None);
}

#[test]
fn bulk_load_normalizes_statuses() {
    let mut stale = status("s1", "Alpha", Some(260.0));
    stale.status = Some(StatusLevel::Warning);
    let mut broken = status("s2", "Beta", Some(f64::NAN));
    broken.status = Some(StatusLevel::Siaga);

    let collection = ready_statuses(vec![stale, broken]);
    assert_eq!(collection.get("s1").unwrap().status, Some(StatusLevel::Danger));
    let s2 = collection.get("s2").unwrap();
    assert_eq!(s2.water_level, None);
    assert_eq!(s2.status, None);
}

#[test]
fn statuses_stay_sorted_by_name_on_rename() {
    let mut collection = ready_statuses(vec![
        status("s1", "Alpha", None),
        status("s2", "Beta", None),
        status("s3", "Gamma", None),
    ]);

    collection.handle(ChangeEvent::update(status("s1", "Zulu", None), None));
    assert_eq!(ids(&collection), ["s2", "s3", "s1"]);

    collection.handle(ChangeEvent::insert(status("s4", "Delta", None)));
    assert_eq!(ids(&collection), ["s2", "s4", "s3", "s1"]);
}

#[test]
fn readings_keep_reading_time_order_not_arrival_order() {
    let base = at("2024-03-10T10:00:00Z");
    let mut collection: Collection<WaterLevelReading> =
        Collection::new(Scope::all().on_day_of(base), ConflictPolicy::LastApplied);
    collection.begin_loading();
    collection.complete_load(vec![
        reading("r3", "s1", 30.0, base + Duration::minutes(30)),
        reading("r1", "s1", 10.0, base),
    ]);
    assert_eq!(ids(&collection), ["r1", "r3"]);

    collection.handle(ChangeEvent::insert(reading("r2", "s1", 20.0, base + Duration::minutes(15))));
    assert_eq!(ids(&collection), ["r1", "r2", "r3"]);

    // Correction keeps position
    collection.handle(ChangeEvent::update(
        reading("r2", "s1", 25.0, base + Duration::minutes(15)),
        None,
    ));
    assert_eq!(ids(&collection), ["r1", "r2", "r3"]);
    assert_eq!(collection.get("r2").unwrap().water_level, 25.0);
}

#[test]
fn day_bounded_view_ignores_other_days() {
    let anchor = at("2024-03-10T12:00:00Z");
    let mut collection: Collection<WaterLevelReading> =
        Collection::new(Scope::all().on_day_of(anchor), ConflictPolicy::LastApplied);
    collection.begin_loading();
    collection.complete_load(vec![
        reading("today", "s1", 10.0, at("2024-03-10T01:00:00Z")),
        reading("yesterday", "s1", 10.0, at("2024-03-09T23:59:59Z")),
    ]);
    assert_eq!(ids(&collection), ["today"]);

    let outcome = collection.handle(ChangeEvent::insert(reading(
        "tomorrow",
        "s1",
        10.0,
        at("2024-03-11T00:00:00Z"),
    )));
    assert_eq!(outcome, Applied::Ignored(IgnoreReason::OutOfScope));
}

#[test]
fn update_moving_a_held_reading_off_the_day_removes_it() {
    let anchor = at("2024-03-10T12:00:00Z");
    let mut collection: Collection<WaterLevelReading> =
        Collection::new(Scope::all().on_day_of(anchor), ConflictPolicy::LastApplied);
    collection.begin_loading();
    collection.complete_load(vec![
        reading("r1", "s1", 10.0, at("2024-03-10T01:00:00Z")),
        reading("r2", "s1", 20.0, at("2024-03-10T02:00:00Z")),
    ]);

    let corrected = reading("r1", "s1", 10.0, at("2024-03-09T23:00:00Z"));
    let outcome = collection.handle(ChangeEvent::update(corrected, None));
    assert_eq!(outcome, Applied::Removed);
    assert!(collection.get("r1").is_none());
    assert_eq!(ids(&collection), ["r2"]);

    // Same correction again: nothing held, nothing to do.
    let again = reading("r1", "s1", 10.0, at("2024-03-09T23:00:00Z"));
    assert_eq!(
        collection.handle(ChangeEvent::update(again, None)),
        Applied::Ignored(IgnoreReason::OutOfScope)
    );
}

#[test]
fn update_moving_a_held_reading_to_another_sensor_removes_it() {
    let mut collection: Collection<WaterLevelReading> =
        Collection::new(Scope::all().sensor("s1"), ConflictPolicy::LastApplied);
    collection.begin_loading();
    let t = at("2024-03-10T10:00:00Z");
    collection.complete_load(vec![reading("a", "s1", 1.0, t)]);

    assert_eq!(
        collection.handle(ChangeEvent::update(reading("a", "s2", 1.0, t), None)),
        Applied::Removed
    );
    assert!(collection.items().is_empty());
}

#[test]
fn sensor_scope_filters_rows() {
    let mut collection: Collection<WaterLevelReading> =
        Collection::new(Scope::all().sensor("s1"), ConflictPolicy::LastApplied);
    collection.begin_loading();
    collection.complete_load(vec![]);

    let t = at("2024-03-10T10:00:00Z");
    assert_eq!(
        collection.handle(ChangeEvent::insert(reading("a", "s2", 1.0, t))),
        Applied::Ignored(IgnoreReason::OutOfScope)
    );
    assert_eq!(
        collection.handle(ChangeEvent::insert(reading("b", "s1", 1.0, t))),
        Applied::Inserted
    );
}

#[test]
fn failed_collection_drops_events_until_reloaded() {
    let mut collection: Collection<SensorCurrentStatus> =
        Collection::new(Scope::all(), ConflictPolicy::LastApplied);
    collection.begin_loading();
    collection.handle(ChangeEvent::insert(status("s1", "Alpha", None)));
    collection.fail("connection refused");

    assert_eq!(collection.state(), CollectionState::Failed);
    assert_eq!(collection.pending_len(), 0);
    assert_eq!(
        collection.snapshot(false).error.as_deref(),
        Some("connection refused")
    );
    assert_eq!(
        collection.handle(ChangeEvent::insert(status("s2", "Beta", None))),
        Applied::Ignored(IgnoreReason::NotLoaded)
    );

    assert!(collection.begin_loading());
    collection.complete_load(vec![status("s3", "Gamma", None)]);
    assert_eq!(ids(&collection), ["s3"]);
    assert!(collection.snapshot(true).error.is_none());
}

#[test]
fn missing_payloads_are_ignored() {
    let mut collection = ready_statuses(vec![]);
    let event: ChangeEvent<SensorCurrentStatus> = ChangeEvent {
        event_type: flood_watch::reconcile::EventType::Update,
        new: None,
        old: None,
    };
    assert_eq!(
        collection.handle(event),
        Applied::Ignored(IgnoreReason::MissingPayload)
    );
}

#[test]
fn last_applied_wins_by_default() {
    let mut collection = ready_statuses(vec![status("s1", "Alpha", Some(10.0))]);

    let mut newer = status("s1", "Alpha", Some(120.0));
    newer.updated_at = at("2024-03-10T09:00:00Z");
    let mut older = status("s1", "Alpha", Some(20.0));
    older.updated_at = at("2024-03-10T07:00:00Z");

    collection.handle(ChangeEvent::update(newer, None));
    collection.handle(ChangeEvent::update(older, None));
    assert_eq!(collection.get("s1").unwrap().water_level, Some(20.0));
}

#[test]
fn reject_stale_keeps_the_newer_revision() {
    let mut collection = Collection::new(Scope::all(), ConflictPolicy::RejectStale);
    collection.begin_loading();
    collection.complete_load(vec![status("s1", "Alpha", Some(10.0))]);

    let mut newer = status("s1", "Alpha", Some(120.0));
    newer.updated_at = at("2024-03-10T09:00:00Z");
    let mut older = status("s1", "Alpha", Some(20.0));
    older.updated_at = at("2024-03-10T07:00:00Z");

    assert_eq!(collection.handle(ChangeEvent::update(newer, None)), Applied::Replaced);
    assert_eq!(
        collection.handle(ChangeEvent::update(older, None)),
        Applied::Ignored(IgnoreReason::Stale)
    );
    assert_eq!(collection.get("s1").unwrap().water_level, Some(120.0));
}

#[test]
fn snapshots_are_immutable_copies() {
    let mut collection = ready_statuses(vec![status("s1", "Alpha", None)]);
    let before = collection.snapshot(true);

    collection.handle(ChangeEvent::insert(status("s2", "Beta", None)));
    let after = collection.snapshot(true);

    assert_eq!(before.items.len(), 1);
    assert_eq!(after.items.len(), 2);
    assert!(after.revision > before.revision);
}
