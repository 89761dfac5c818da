//! End-to-end adherence scenarios.
//!
//! Each test drives the engine the way the runner would: commands from the
//! conversation layer plus explicit job ticks at chosen instants, against an
//! in-memory store and a recording transport.

use std::sync::Arc;

use caretrack_core::storage::{Config, SqliteStore};
use caretrack_core::{
    Caregiver, DebouncePolicy, Engine, EntryStatus, Medication, MemoryTransport,
    NotificationStatus, Patient, Response,
};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

const PATIENT: &str = "15551234567";
const ALICE_CAREGIVER: &str = "15557770001";
const BOB_CAREGIVER: &str = "15557770002";

// ============================================================================
// Test Helpers
// ============================================================================

fn t(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

fn new_york() -> Tz {
    "America/New_York".parse().unwrap()
}

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 4, 14).unwrap()
}

/// Instant of a New York wall-clock time on the test day.
fn local(h: u32, m: u32) -> DateTime<Utc> {
    new_york()
        .from_local_datetime(&day().and_time(t(h, m)))
        .single()
        .unwrap()
        .with_timezone(&Utc)
}

fn setup(config: Config) -> (Engine, Arc<MemoryTransport>) {
    let store = Arc::new(SqliteStore::open_memory().unwrap());
    let transport = Arc::new(MemoryTransport::new());
    let engine = Engine::new(store, transport.clone(), config);
    (engine, transport)
}

/// Registered, active patient with a 07:00-22:00 day.
fn active_patient(engine: &Engine, medications: Vec<Medication>) {
    let patient = Patient::new(PATIENT, "America/New_York").unwrap();
    engine.register_patient(patient).unwrap();
    engine
        .set_wake_sleep_times(PATIENT, t(7, 0), t(22, 0), local(6, 0))
        .unwrap();
    for med in medications {
        engine.add_medication(PATIENT, med, local(6, 0)).unwrap();
    }
    engine.activate(PATIENT, local(6, 0)).unwrap();
}

fn aspirin() -> Medication {
    Medication::new("Aspirin", 1, 2, 20).unwrap().with_reminders(true)
}

// ============================================================================
// Scheduling
// ============================================================================

#[test]
fn test_end_to_end_schedule() {
    let (engine, _) = setup(Config::default());
    active_patient(&engine, vec![aspirin()]);

    let patient = engine.patient(PATIENT).unwrap();
    assert_eq!(patient.schedule.len(), 20);

    let tz = new_york();
    let first = patient.schedule[0].scheduled_at.with_timezone(&tz);
    let second = patient.schedule[1].scheduled_at.with_timezone(&tz);
    let last = patient.schedule[19].scheduled_at.with_timezone(&tz);
    assert_eq!((first.date_naive(), first.time()), (day(), t(8, 0)));
    assert_eq!((second.date_naive(), second.time()), (day(), t(21, 0)));
    assert_eq!(last.date_naive(), day() + Duration::days(9));
    assert_eq!(last.time(), t(21, 0));

    let summary = engine.schedule_summary(PATIENT).unwrap();
    assert_eq!(summary["Aspirin"], vec![t(8, 0), t(21, 0)]);
}

#[test]
fn test_activation_after_first_dose_starts_tomorrow() {
    let (engine, _) = setup(Config::default());
    let patient = Patient::new(PATIENT, "America/New_York")
        .unwrap()
        .with_day(t(7, 0), t(22, 0));
    engine.register_patient(patient).unwrap();
    engine
        .add_medication(
            PATIENT,
            Medication::new("Statin", 1, 1, 5).unwrap().with_instructions("before bed"),
            local(6, 0),
        )
        .unwrap();
    engine.enable_reminders(PATIENT, "Statin", local(22, 30)).unwrap();

    let patient = engine.patient(PATIENT).unwrap();
    assert_eq!(patient.schedule.len(), 5);
    let first = patient.schedule[0].scheduled_at.with_timezone(&new_york());
    assert_eq!(first.date_naive(), day() + Duration::days(1));
    assert_eq!(first.time(), t(21, 0));
}

#[test]
fn test_nightly_materialize_keeps_tonights_dose() {
    let (engine, transport) = setup(Config::default());
    active_patient(&engine, vec![aspirin()]);

    // midnight UTC is 20:00 in New York
    let report = engine.materialize_tick(Utc.with_ymd_and_hms(2026, 4, 15, 0, 0, 0).unwrap());
    assert_eq!(report.errors, 0);

    let patient = engine.patient(PATIENT).unwrap();
    let tonight: Vec<_> = patient
        .schedule
        .iter()
        .filter(|e| e.scheduled_at == local(21, 0))
        .collect();
    assert_eq!(tonight.len(), 1);
    assert!(tonight[0].is_pending());
    assert!(!patient.schedule.iter().any(|e| e.scheduled_at == local(8, 0)));
    assert_eq!(patient.schedule.len(), 21);

    engine.dispatch_tick(local(21, 0));
    assert_eq!(transport.sent_to(PATIENT).len(), 1);
}

#[test]
fn test_midday_restart_keeps_remaining_doses() {
    let (engine, _) = setup(Config::default());
    active_patient(&engine, vec![aspirin()]);

    engine.materialize_tick(local(12, 0));
    engine.materialize_tick(local(12, 5));

    let patient = engine.patient(PATIENT).unwrap();
    assert_eq!(
        patient.schedule.iter().filter(|e| e.scheduled_at == local(21, 0)).count(),
        1
    );
}

// ============================================================================
// Dispatch and replies
// ============================================================================

#[test]
fn test_dispatch_then_taken() {
    let (engine, transport) = setup(Config::default());
    active_patient(&engine, vec![aspirin()]);

    let report = engine.dispatch_tick(local(8, 5));
    assert_eq!(report.messages_sent, 1);
    let sent = transport.sent_to(PATIENT);
    assert_eq!(sent.len(), 1);
    assert!(sent[0].body.contains("*Aspirin*:"));
    assert!(sent[0].body.contains("08:00 AM"));
    assert!(sent[0].body.contains("reply D"));

    let outcome = engine
        .record_response(PATIENT, "d".parse::<Response>().unwrap(), local(8, 10))
        .unwrap();
    assert!(outcome.changed());

    let patient = engine.patient(PATIENT).unwrap();
    assert_eq!(patient.schedule[0].status, EntryStatus::Taken);
    let med = patient.medication("Aspirin").unwrap();
    assert_eq!(med.pill_count, 19);
    assert_eq!(med.taken_count, 1);

    let follow_up = engine.follow_up_tick(local(8, 40));
    assert_eq!(follow_up.messages_sent, 0);
    assert_eq!(transport.sent_to(PATIENT).len(), 1);
}

#[test]
fn test_patient_debounce() {
    let (engine, transport) = setup(Config::default());
    let mut early = Medication::new("Aspirin", 1, 1, 10).unwrap().with_reminders(true);
    early.custom_times = vec![t(8, 0)];
    let mut later = Medication::new("Metformin", 1, 1, 10).unwrap().with_reminders(true);
    later.custom_times = vec![t(8, 20)];
    active_patient(&engine, vec![early, later]);

    assert_eq!(engine.dispatch_tick(local(8, 0)).messages_sent, 1);

    // Metformin is due but the last reminder went out 12 minutes ago.
    let report = engine.dispatch_tick(local(8, 12));
    assert_eq!(report.messages_sent, 0);
    let patient = engine.patient(PATIENT).unwrap();
    let metformin = patient
        .schedule
        .iter()
        .find(|e| e.medication == "Metformin")
        .unwrap();
    assert!(!metformin.reminder_sent);

    assert_eq!(engine.dispatch_tick(local(8, 16)).messages_sent, 1);
    let sent = transport.sent_to(PATIENT);
    assert_eq!(sent.len(), 2);
    assert!(sent[1].body.contains("*Metformin*:"));
}

#[test]
fn test_medication_debounce_policy() {
    let mut config = Config::default();
    config.dispatch.debounce = DebouncePolicy::Medication;
    let (engine, transport) = setup(config);
    let mut early = Medication::new("Aspirin", 1, 1, 10).unwrap().with_reminders(true);
    early.custom_times = vec![t(8, 0)];
    let mut later = Medication::new("Metformin", 1, 1, 10).unwrap().with_reminders(true);
    later.custom_times = vec![t(8, 15)];
    active_patient(&engine, vec![early, later]);

    engine.dispatch_tick(local(8, 0));
    // Aspirin is still awaiting an answer, Metformin is not held back.
    assert_eq!(engine.dispatch_tick(local(8, 5)).messages_sent, 1);
    assert_eq!(transport.sent_to(PATIENT).len(), 2);
}

#[test]
fn test_delivery_failure_retries_next_tick() {
    let (engine, transport) = setup(Config::default());
    active_patient(&engine, vec![aspirin()]);

    transport.set_fail_all(true);
    let report = engine.dispatch_tick(local(8, 0));
    assert_eq!(report.delivery_failures, 1);
    let patient = engine.patient(PATIENT).unwrap();
    assert_eq!(patient.notifications[0].status, NotificationStatus::Failed);
    assert!(patient.notifications[0].error.is_some());
    assert!(!patient.schedule[0].reminder_sent);

    transport.set_fail_all(false);
    let report = engine.dispatch_tick(local(8, 1));
    assert_eq!(report.messages_sent, 1);
    let patient = engine.patient(PATIENT).unwrap();
    assert!(patient.schedule[0].reminder_sent);
    assert_eq!(patient.notifications.len(), 2);
    assert!(patient.notifications[1].is_pending());
}

// ============================================================================
// Follow-up and escalation
// ============================================================================

#[test]
fn test_follow_up_progression() {
    let (engine, transport) = setup(Config::default());
    active_patient(&engine, vec![aspirin()]);
    engine
        .add_caregiver(
            PATIENT,
            Caregiver::new("Carol", ALICE_CAREGIVER, vec![PATIENT.into()]),
        )
        .unwrap();

    let sent_at = local(8, 0);
    engine.dispatch_tick(sent_at);

    engine.follow_up_tick(sent_at + Duration::minutes(25));
    assert_eq!(engine.patient(PATIENT).unwrap().notifications[0].resends, 1);

    engine.follow_up_tick(sent_at + Duration::minutes(55));
    assert_eq!(engine.patient(PATIENT).unwrap().notifications[0].resends, 2);

    let report = engine.follow_up_tick(sent_at + Duration::minutes(65));
    assert_eq!(report.escalations, 1);
    let patient = engine.patient(PATIENT).unwrap();
    assert_eq!(patient.notifications[0].status, NotificationStatus::Skipped);
    assert_eq!(patient.schedule[0].status, EntryStatus::Skipped);
    assert_eq!(patient.medication("Aspirin").unwrap().skipped_count, 1);

    let patient_messages = transport.sent_to(PATIENT);
    assert_eq!(patient_messages.len(), 3);
    assert!(patient_messages[1].body.contains("(Attempt 2/3)"));
    assert!(patient_messages[2].body.contains("(Attempt 3/3)"));
    assert_eq!(transport.sent_to(ALICE_CAREGIVER).len(), 1);

    engine.follow_up_tick(sent_at + Duration::minutes(120));
    assert_eq!(transport.sent_to(ALICE_CAREGIVER).len(), 1);
}

#[test]
fn test_escalation_targets_owner_caregiver() {
    let (engine, transport) = setup(Config::default());
    let mut a = Medication::new("Aspirin", 1, 1, 10)
        .unwrap()
        .with_owner("alice")
        .with_reminders(true);
    a.custom_times = vec![t(8, 0)];
    let mut b = Medication::new("Lisinopril", 1, 1, 10)
        .unwrap()
        .with_owner("bob")
        .with_reminders(true);
    b.custom_times = vec![t(12, 0)];
    active_patient(&engine, vec![a, b]);
    engine
        .add_caregiver(PATIENT, Caregiver::new("Carol", ALICE_CAREGIVER, vec!["alice".into()]))
        .unwrap();
    engine
        .add_caregiver(PATIENT, Caregiver::new("Dave", BOB_CAREGIVER, vec!["bob".into()]))
        .unwrap();

    let sent_at = local(8, 0);
    engine.dispatch_tick(sent_at);
    for minutes in [20, 30, 40] {
        engine.follow_up_tick(sent_at + Duration::minutes(minutes));
    }

    let alerts = transport.sent_to(ALICE_CAREGIVER);
    assert_eq!(alerts.len(), 1);
    assert!(alerts[0].body.contains("• Aspirin"));
    assert!(!alerts[0].body.contains("Lisinopril"));
    assert!(transport.sent_to(BOB_CAREGIVER).is_empty());
}

#[test]
fn test_skip_reply_stops_follow_up() {
    let (engine, transport) = setup(Config::default());
    active_patient(&engine, vec![aspirin()]);
    engine.dispatch_tick(local(8, 0));
    engine
        .record_response(PATIENT, Response::Skipped, local(8, 3))
        .unwrap();

    let report = engine.follow_up_tick(local(8, 45));
    assert_eq!(report.messages_sent, 0);
    assert_eq!(report.escalations, 0);
    assert_eq!(transport.sent_to(PATIENT).len(), 1);
    let med = engine.patient(PATIENT).unwrap();
    assert_eq!(med.medication("Aspirin").unwrap().skipped_count, 1);
}
