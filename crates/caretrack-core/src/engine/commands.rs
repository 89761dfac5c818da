//! External operations. Each one locks the patient and commits once.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, NaiveTime, Utc};

use super::{normalize_id, Engine, COMMAND_LOCK_WAIT};
use crate::error::{CoreError, Result, ValidationError};
use crate::model::{Caregiver, Medication, NotificationStatus, Patient, PatientStatus};
use crate::reminder::{self, Response, ResponseOutcome};
use crate::schedule;

/// How a re-materialization changed a patient's schedule.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleChange {
    pub added: usize,
    pub removed: usize,
    /// Medications with too few pills for a single day.
    pub refill_needed: Vec<String>,
}

/// How a regeneration treats pending doses the fresh schedule leaves out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Regenerate {
    /// Drop them. Used when times or supply change.
    Replace,
    /// Keep the ones still ahead of `now` that precede the fresh schedule.
    KeepUpcoming,
}

/// Regenerate the named medications' entries from their current supply.
pub(crate) fn reschedule(
    patient: &mut Patient,
    names: &[String],
    now: DateTime<Utc>,
) -> std::result::Result<ScheduleChange, ValidationError> {
    regenerate(patient, names, now, Regenerate::Replace)
}

pub(crate) fn regenerate(
    patient: &mut Patient,
    names: &[String],
    now: DateTime<Utc>,
    mode: Regenerate,
) -> std::result::Result<ScheduleChange, ValidationError> {
    let tz = patient.tz()?;
    let plans = schedule::plans_for(patient, names);
    let materialized = schedule::materialize(&plans, tz, now);

    let before: HashSet<String> = patient.schedule.iter().map(|e| e.id.clone()).collect();
    match mode {
        Regenerate::Replace => schedule::merge(&mut patient.schedule, names, materialized.entries),
        Regenerate::KeepUpcoming => {
            schedule::merge_keeping_upcoming(&mut patient.schedule, names, materialized.entries, now)
        }
    }
    let kept = patient.schedule.iter().filter(|e| before.contains(&e.id)).count();
    let change = ScheduleChange {
        added: patient.schedule.len() - kept,
        removed: before.len() - kept,
        refill_needed: materialized.refill_needed,
    };

    for medication in &change.refill_needed {
        tracing::warn!(patient = %patient.id, %medication, "not enough pills for a day, refill needed");
    }
    tracing::debug!(
        patient = %patient.id,
        added = change.added,
        removed = change.removed,
        "schedule regenerated"
    );
    Ok(change)
}

fn enabled_medications(patient: &Patient) -> Vec<String> {
    patient
        .medications
        .iter()
        .filter(|m| m.reminders_enabled)
        .map(|m| m.name.clone())
        .collect()
}

/// Open reminders are closed without escalation when reminders stop.
fn close_open_notifications(patient: &mut Patient) {
    for n in patient.notifications.iter_mut().filter(|n| n.is_pending()) {
        n.status = NotificationStatus::Skipped;
    }
}

fn known_medication<'a>(patient: &'a mut Patient, name: &str) -> Result<&'a mut Medication> {
    patient
        .medication_mut(name)
        .ok_or_else(|| ValidationError::UnknownMedication(name.to_string()).into())
}

impl Engine {
    /// # Errors
    /// Returns an error if the patient is already registered.
    pub fn register_patient(&self, mut patient: Patient) -> Result<Patient> {
        let _guard = self
            .locks
            .lock_within(&patient.id, COMMAND_LOCK_WAIT)
            .ok_or_else(|| CoreError::PatientBusy(patient.id.clone()))?;
        self.store.create(&mut patient)?;
        tracing::info!(patient = %patient.id, timezone = %patient.timezone, "patient registered");
        Ok(patient)
    }

    /// Add a medication; scheduled right away if its reminders are on.
    ///
    /// # Errors
    /// Returns an error if the name is taken or the patient is unknown.
    pub fn add_medication(&self, id: &str, medication: Medication, now: DateTime<Utc>) -> Result<ScheduleChange> {
        self.with_patient(id, |patient| {
            let name = medication.name.clone();
            let enabled = medication.reminders_enabled;
            patient.add_medication(medication)?;
            tracing::info!(patient = %patient.id, medication = %name, "medication added");
            if enabled {
                Ok(reschedule(patient, &[name], now)?)
            } else {
                Ok(ScheduleChange::default())
            }
        })
    }

    /// # Errors
    /// Returns an error if the caregiver phone is invalid.
    pub fn add_caregiver(&self, id: &str, caregiver: Caregiver) -> Result<()> {
        self.with_patient(id, |patient| {
            tracing::info!(patient = %patient.id, caregiver = %caregiver.name, "caregiver added");
            Ok(patient.add_caregiver(caregiver)?)
        })
    }

    /// Turn reminders on for one medication and schedule it.
    ///
    /// # Errors
    /// Returns an error for unknown patients or medications.
    pub fn enable_reminders(&self, id: &str, medication: &str, now: DateTime<Utc>) -> Result<ScheduleChange> {
        self.with_patient(id, |patient| {
            known_medication(patient, medication)?.reminders_enabled = true;
            Ok(reschedule(patient, &[medication.to_string()], now)?)
        })
    }

    /// Turn reminders off for one medication and drop its unsent entries.
    ///
    /// # Errors
    /// Returns an error for unknown patients or medications.
    pub fn disable_reminders(&self, id: &str, medication: &str, now: DateTime<Utc>) -> Result<ScheduleChange> {
        self.with_patient(id, |patient| {
            known_medication(patient, medication)?.reminders_enabled = false;
            Ok(reschedule(patient, &[medication.to_string()], now)?)
        })
    }

    /// # Errors
    /// Returns an error if the patient cannot be loaded or saved.
    pub fn record_response(&self, id: &str, response: Response, now: DateTime<Utc>) -> Result<ResponseOutcome> {
        self.with_patient(id, |patient| Ok(reminder::record_response(patient, response, now)))
    }

    /// Set the waking window and reschedule medications that follow it.
    ///
    /// # Errors
    /// Returns an error if the patient cannot be loaded or saved.
    pub fn set_wake_sleep_times(
        &self,
        id: &str,
        wake: NaiveTime,
        sleep: NaiveTime,
        now: DateTime<Utc>,
    ) -> Result<ScheduleChange> {
        self.with_patient(id, |patient| {
            patient.wake_time = Some(wake);
            patient.sleep_time = Some(sleep);
            let names: Vec<String> = patient
                .medications
                .iter()
                .filter(|m| m.reminders_enabled && m.custom_times.is_empty())
                .map(|m| m.name.clone())
                .collect();
            Ok(reschedule(patient, &names, now)?)
        })
    }

    /// Override a medication's dose times. An empty list goes back to
    /// computed times.
    ///
    /// # Errors
    /// Returns an error for unknown patients or medications.
    pub fn set_custom_times(
        &self,
        id: &str,
        medication: &str,
        mut times: Vec<NaiveTime>,
        now: DateTime<Utc>,
    ) -> Result<ScheduleChange> {
        times.sort_unstable();
        times.dedup();
        self.with_patient(id, |patient| {
            known_medication(patient, medication)?.custom_times = times;
            Ok(reschedule(patient, &[medication.to_string()], now)?)
        })
    }

    /// # Errors
    /// Returns an error if the patient cannot be loaded or saved.
    pub fn activate(&self, id: &str, now: DateTime<Utc>) -> Result<ScheduleChange> {
        self.with_patient(id, |patient| {
            patient.activate();
            patient.opt_out_at = None;
            patient.resume_nudged_at = None;
            patient.last_interaction = Some(now);
            let names = enabled_medications(patient);
            tracing::info!(patient = %patient.id, "patient activated");
            Ok(reschedule(patient, &names, now)?)
        })
    }

    /// # Errors
    /// Returns an error if the patient cannot be loaded or saved.
    pub fn pause(&self, id: &str, now: DateTime<Utc>) -> Result<()> {
        self.with_patient(id, |patient| {
            patient.status = PatientStatus::Paused;
            patient.notifications_enabled = false;
            patient.opt_out_at = Some(now);
            patient.resume_nudged_at = None;
            patient.last_interaction = Some(now);
            patient.schedule.retain(|e| !e.is_pending());
            close_open_notifications(patient);
            tracing::info!(patient = %patient.id, "reminders paused");
            Ok(())
        })
    }

    /// # Errors
    /// Returns an error if the patient cannot be loaded or saved.
    pub fn resume(&self, id: &str, now: DateTime<Utc>) -> Result<ScheduleChange> {
        self.with_patient(id, |patient| {
            patient.status = PatientStatus::Active;
            patient.notifications_enabled = true;
            patient.opt_out_at = None;
            patient.resume_nudged_at = None;
            patient.last_interaction = Some(now);
            let names = enabled_medications(patient);
            tracing::info!(patient = %patient.id, "reminders resumed");
            Ok(reschedule(patient, &names, now)?)
        })
    }

    /// # Errors
    /// Returns an error if the patient cannot be loaded or saved.
    pub fn stop(&self, id: &str, now: DateTime<Utc>) -> Result<()> {
        self.with_patient(id, |patient| {
            patient.status = PatientStatus::Inactive;
            patient.notifications_enabled = false;
            patient.last_interaction = Some(now);
            for med in &mut patient.medications {
                med.reminders_enabled = false;
            }
            patient.schedule.retain(|e| !e.is_pending());
            close_open_notifications(patient);
            tracing::info!(patient = %patient.id, "patient stopped");
            Ok(())
        })
    }

    /// Distinct local times of each medication's pending doses.
    ///
    /// # Errors
    /// Returns an error if the patient cannot be loaded.
    pub fn schedule_summary(&self, id: &str) -> Result<BTreeMap<String, Vec<NaiveTime>>> {
        let patient = self.store.load(&normalize_id(id))?;
        let tz = patient.tz()?;
        let pending: Vec<_> = patient.schedule.iter().filter(|e| e.is_pending()).cloned().collect();
        Ok(schedule::local_times_by_medication(&pending, tz))
    }
}
