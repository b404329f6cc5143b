use chrono::{DateTime, Utc};

use calyx_core::config::{ExpansionLimits, RecurrenceConfig, ZeroInstancePolicy};
use calyx_rfc::rfc::ical::core::{EventDuration, EventTime, RecurrenceId};
use calyx_rfc::rfc::ical::expand::TimeZoneResolver;
use calyx_service::caldav::model::{MasterEvent, OverrideField, Override};
use calyx_service::caldav::notify::{ChangeKind, CollectingChangeSink};
use calyx_service::caldav::recurrence::{ExpansionWindow, InvalidOverrideReason};
use calyx_service::caldav::service::{
    RecurrenceContext, add_event, get_occurrence, get_recurrences, remove_event, update_event,
};
use calyx_service::caldav::store::{MemoryStore, RecurrenceStore};
use calyx_service::error::ServiceError;

fn value(text: &str) -> EventTime {
    text.parse().expect("valid value")
}

fn instant(text: &str) -> DateTime<Utc> {
    value(text).naive().and_utc()
}

fn rid(text: &str) -> RecurrenceId {
    text.parse().expect("valid rid")
}

fn standup() -> MasterEvent {
    MasterEvent::new("standup@example.com", value("20240101T090000Z"))
        .with_duration(EventDuration::minutes(15))
        .with_summary("Standup")
        .with_rrule("FREQ=DAILY;COUNT=10".parse().expect("valid rule"))
}

fn stored_ids(store: &MemoryStore, master: &MasterEvent) -> Vec<String> {
    let id = store.master_by_uid(&master.uid).expect("stored");
    store
        .instances(id)
        .into_iter()
        .map(|instance| instance.recurrence_id.to_string())
        .collect()
}

#[test_log::test]
fn fast_path_and_full_expansion_agree() {
    let resolver = TimeZoneResolver::new();
    let ctx = RecurrenceContext::with_resolver(&resolver);
    let sink = CollectingChangeSink::new();

    let note = Override::new(rid("20240104T090000Z")).with_summary("Demo day");
    let edited = standup()
        .with_exdate(value("20240103T090000Z"))
        .with_exdate(value("20240104T090000Z"))
        .with_rdate(value("20240120T090000Z"));

    // incremental: add, then edit only dates
    let mut fast = MemoryStore::new();
    let fast_id = add_event(&mut fast, &sink, &ctx, standup(), vec![note.clone()])
        .expect("add")
        .master_id;
    let fast_outcome =
        update_event(&mut fast, &sink, &ctx, fast_id, edited.clone(), Vec::new()).expect("update");
    assert!(fast_outcome.fast_path);

    // full: a fresh store receiving the edited master directly
    let mut full = MemoryStore::new();
    add_event(&mut full, &sink, &ctx, edited.clone(), Vec::new()).expect("add");

    assert_eq!(stored_ids(&fast, &edited), stored_ids(&full, &edited));
    assert_eq!(stored_ids(&fast, &edited).len(), 9);
    assert_eq!((fast_outcome.added, fast_outcome.removed), (1, 2));
}

#[test_log::test]
fn rule_change_expands_again_and_keeps_matching_overrides() {
    let resolver = TimeZoneResolver::new();
    let ctx = RecurrenceContext::with_resolver(&resolver);
    let mut store = MemoryStore::new();
    let sink = CollectingChangeSink::new();

    let late = Override::new(rid("20240109T090000Z")).with_summary("Late");
    let early = Override::new(rid("20240102T090000Z")).with_summary("Early");
    let master_id = add_event(&mut store, &sink, &ctx, standup(), vec![late, early.clone()])
        .expect("add")
        .master_id;
    sink.take();

    let mut shorter = standup();
    shorter.rrules = vec!["FREQ=DAILY;COUNT=5".parse().expect("valid rule")];
    let outcome =
        update_event(&mut store, &sink, &ctx, master_id, shorter, Vec::new()).expect("update");

    assert!(!outcome.fast_path);
    assert_eq!(outcome.removed, 5);
    assert_eq!(
        store
            .instance(master_id, &rid("20240102T090000Z"))
            .and_then(|instance| instance.overrides.clone()),
        Some(early)
    );
    assert!(store.instance(master_id, &rid("20240109T090000Z")).is_none());

    let changes = sink.take();
    assert_eq!(changes.len(), 5);
    assert!(changes.iter().all(|change| change.kind == ChangeKind::Removed));
}

#[test_log::test]
fn moving_dtstart_moves_every_instance() {
    let resolver = TimeZoneResolver::new();
    let ctx = RecurrenceContext::with_resolver(&resolver);
    let mut store = MemoryStore::new();
    let sink = CollectingChangeSink::new();
    let master_id = add_event(&mut store, &sink, &ctx, standup(), Vec::new())
        .expect("add")
        .master_id;

    let mut later = standup();
    later.start = value("20240101T100000Z");
    let outcome =
        update_event(&mut store, &sink, &ctx, master_id, later, Vec::new()).expect("update");

    // recurrence-ids are nominal starts, so every one is replaced
    assert_eq!((outcome.added, outcome.removed), (10, 10));
    assert!(store.instance(master_id, &rid("20240101T100000Z")).is_some());
}

#[test_log::test]
fn pending_overrides_on_update() {
    let resolver = TimeZoneResolver::new();
    let ctx = RecurrenceContext::with_resolver(&resolver);
    let mut store = MemoryStore::new();
    let sink = CollectingChangeSink::new();
    let master_id = add_event(&mut store, &sink, &ctx, standup(), Vec::new())
        .expect("add")
        .master_id;

    let mut cleared = Override::new(rid("20240105T090000Z"));
    cleared.summary = OverrideField::Cleared;
    let stray = Override::new(rid("20240301T090000Z")).with_summary("Nope");

    let outcome = update_event(
        &mut store,
        &sink,
        &ctx,
        master_id,
        standup(),
        vec![cleared, stray],
    )
    .expect("update");

    assert!(outcome.fast_path);
    assert_eq!(outcome.updated, 1);
    assert_eq!(outcome.invalid_overrides.len(), 1);
    assert_eq!(
        outcome.invalid_overrides[0].reason,
        InvalidOverrideReason::NoSuchOccurrence
    );

    let view = get_occurrence(&store, &ctx, master_id, &rid("20240105T090000Z")).expect("view");
    assert_eq!(view.summary, None);
    assert!(view.overridden);
}

#[test_log::test]
fn update_to_empty_set_respects_policy() {
    let resolver = TimeZoneResolver::new();
    let sink = CollectingChangeSink::new();
    let single = MasterEvent::new("once@example.com", value("20240101T090000Z"))
        .with_rrule("FREQ=DAILY;COUNT=2".parse().expect("valid rule"));
    let emptied = single
        .clone()
        .with_exdate(value("20240101T090000Z"))
        .with_exdate(value("20240102T090000Z"));

    let reject = RecurrenceContext::with_resolver(&resolver);
    let mut store = MemoryStore::new();
    let master_id = add_event(&mut store, &sink, &reject, single.clone(), Vec::new())
        .expect("add")
        .master_id;
    let err = update_event(&mut store, &sink, &reject, master_id, emptied.clone(), Vec::new())
        .expect_err("rejected");
    assert!(matches!(err, ServiceError::NoInstancesForRecurringEvent { .. }));
    assert_eq!(store.instances(master_id).len(), 2);
    assert_eq!(store.master(master_id).map(|m| m.exdates.len()), Some(0));

    let demote = reject.with_policy(ZeroInstancePolicy::Demote);
    let outcome = update_event(&mut store, &sink, &demote, master_id, emptied, Vec::new())
        .expect("demoted");
    assert!(outcome.demoted);
    assert_eq!(outcome.removed, 2);
    assert!(store.instances(master_id).is_empty());
    assert!(store.master(master_id).is_some_and(|m| !m.is_recurring()));
}

#[test_log::test]
fn principal_limits_bound_materialization() {
    let resolver = TimeZoneResolver::new();
    let config = RecurrenceConfig {
        principals: [(
            "intern".to_owned(),
            calyx_core::config::PrincipalLimits {
                max_years: None,
                max_instances: Some(3),
            },
        )]
        .into_iter()
        .collect(),
        ..RecurrenceConfig::default()
    };
    let ctx = RecurrenceContext::from_config(&config, Some("intern"), &resolver).expect("context");
    assert_eq!(
        ctx.limits,
        ExpansionLimits {
            max_years: 10,
            max_instances: 3
        }
    );

    let mut store = MemoryStore::new();
    let sink = CollectingChangeSink::new();
    let outcome = add_event(&mut store, &sink, &ctx, standup(), Vec::new()).expect("add");
    assert_eq!(outcome.added, 3);
}

#[test_log::test]
fn window_queries_and_removal() {
    let resolver = TimeZoneResolver::new();
    let ctx = RecurrenceContext::with_resolver(&resolver);
    let mut store = MemoryStore::new();
    let sink = CollectingChangeSink::new();
    let master_id = add_event(&mut store, &sink, &ctx, standup(), Vec::new())
        .expect("add")
        .master_id;

    let window = ExpansionWindow::between(instant("20240103T000000Z"), instant("20240105T000000Z"));
    let visible = get_recurrences(&store, &ctx, master_id, &window).expect("query");
    let ids: Vec<&str> = visible.iter().map(|o| o.recurrence_id.as_str()).collect();
    assert_eq!(ids, ["20240103T090000Z", "20240104T090000Z"]);

    sink.take();
    remove_event(&mut store, &sink, master_id).expect("remove");
    assert_eq!(sink.take().len(), 10);
    assert!(matches!(
        get_recurrences(&store, &ctx, master_id, &window),
        Err(ServiceError::NotFound(_))
    ));
}
