//! One-pass job ticks over every patient.
//!
//! A tick never aborts on a single patient: busy, unreadable or failing
//! patients are counted in the [`TickReport`] and the pass moves on.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::commands::{regenerate, Regenerate};
use super::Engine;
use crate::error::{CoreError, Result};
use crate::model::{Patient, PatientStatus};
use crate::reminder::{message, DispatchOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Dispatch,
    FollowUp,
    Materialize,
    ResumeNudge,
}

impl JobKind {
    pub const ALL: [JobKind; 4] = [
        JobKind::Dispatch,
        JobKind::FollowUp,
        JobKind::Materialize,
        JobKind::ResumeNudge,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            JobKind::Dispatch => "dispatch",
            JobKind::FollowUp => "follow_up",
            JobKind::Materialize => "materialize",
            JobKind::ResumeNudge => "resume_nudge",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == value || k.as_str().replace('_', "-") == value)
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counters for one tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub job: JobKind,
    pub scanned: usize,
    /// Patients whose aggregate was saved.
    pub changed: usize,
    /// Patients skipped because another job held them.
    pub busy: usize,
    /// Patients that failed to load, process or save.
    pub errors: usize,
    pub messages_sent: usize,
    pub delivery_failures: usize,
    pub escalations: usize,
    /// (patient, medication) pairs that ran out of pills.
    pub refill_needed: Vec<(String, String)>,
}

impl TickReport {
    fn new(job: JobKind) -> Self {
        Self {
            job,
            scanned: 0,
            changed: 0,
            busy: 0,
            errors: 0,
            messages_sent: 0,
            delivery_failures: 0,
            escalations: 0,
            refill_needed: Vec::new(),
        }
    }
}

impl fmt::Display for TickReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: scanned {}, changed {}, sent {}, failed deliveries {}, escalations {}, busy {}, errors {}",
            self.job,
            self.scanned,
            self.changed,
            self.messages_sent,
            self.delivery_failures,
            self.escalations,
            self.busy,
            self.errors
        )
    }
}

impl Engine {
    pub fn run_job(&self, job: JobKind, now: DateTime<Utc>) -> TickReport {
        match job {
            JobKind::Dispatch => self.dispatch_tick(now),
            JobKind::FollowUp => self.follow_up_tick(now),
            JobKind::Materialize => self.materialize_tick(now),
            JobKind::ResumeNudge => self.resume_nudge_tick(now),
        }
    }

    /// Send reminders for doses due at `now`.
    pub fn dispatch_tick(&self, now: DateTime<Utc>) -> TickReport {
        self.for_each_patient(JobKind::Dispatch, |patient, report| {
            let outcome = self.dispatcher.dispatch(patient, now)?;
            match &outcome {
                DispatchOutcome::Sent { .. } => report.messages_sent += 1,
                DispatchOutcome::Failed { .. } => report.delivery_failures += 1,
                _ => {}
            }
            Ok(outcome.changed())
        })
    }

    /// Resend or escalate unanswered reminders.
    pub fn follow_up_tick(&self, now: DateTime<Utc>) -> TickReport {
        self.for_each_patient(JobKind::FollowUp, |patient, report| {
            let result = self.follow_up.process(patient, now);
            report.messages_sent += result.resent;
            report.delivery_failures += result.failed;
            report.escalations += result.escalated;
            for escalation in &result.escalations {
                report.messages_sent += escalation.notified.len();
                report.delivery_failures += escalation.failures.len();
            }
            Ok(result.changed())
        })
    }

    /// Regenerate every enabled medication of active patients from the
    /// remaining supply. Doses still due before the fresh schedule starts
    /// are kept, so the pass can run at any hour.
    pub fn materialize_tick(&self, now: DateTime<Utc>) -> TickReport {
        self.for_each_patient(JobKind::Materialize, |patient, report| {
            if !patient.receives_reminders() {
                return Ok(false);
            }
            let names: Vec<String> = patient
                .medications
                .iter()
                .filter(|m| m.reminders_enabled)
                .map(|m| m.name.clone())
                .collect();
            let change = regenerate(patient, &names, now, Regenerate::KeepUpcoming)?;
            for medication in &change.refill_needed {
                report.refill_needed.push((patient.id.clone(), medication.clone()));
            }
            Ok(change.added + change.removed > 0)
        })
    }

    /// Ask long-paused patients once per opt-out whether to resume.
    pub fn resume_nudge_tick(&self, now: DateTime<Utc>) -> TickReport {
        let after = Duration::days(i64::from(self.config.jobs.resume_nudge_after_days));
        self.for_each_patient(JobKind::ResumeNudge, |patient, report| {
            if patient.status != PatientStatus::Paused {
                return Ok(false);
            }
            let Some(opt_out) = patient.opt_out_at else {
                return Ok(false);
            };
            if now - opt_out < after || patient.resume_nudged_at == Some(opt_out) {
                return Ok(false);
            }
            match self.transport.send(&patient.id, message::RESUME_NUDGE) {
                Ok(()) => {
                    patient.resume_nudged_at = Some(opt_out);
                    report.messages_sent += 1;
                    tracing::info!(patient = %patient.id, "resume nudge sent");
                    Ok(true)
                }
                Err(error) => {
                    report.delivery_failures += 1;
                    tracing::warn!(patient = %patient.id, %error, "resume nudge failed");
                    Ok(false)
                }
            }
        })
    }

    /// Lock, load, process and save each patient in turn. `f` returns
    /// whether the patient must be saved.
    fn for_each_patient<F>(&self, job: JobKind, mut f: F) -> TickReport
    where
        F: FnMut(&mut Patient, &mut TickReport) -> Result<bool>,
    {
        let mut report = TickReport::new(job);
        let ids = match self.store.list_ids() {
            Ok(ids) => ids,
            Err(error) => {
                tracing::error!(%job, %error, "cannot list patients");
                report.errors += 1;
                return report;
            }
        };

        for id in ids {
            report.scanned += 1;
            let Some(_guard) = self.locks.try_lock(&id) else {
                tracing::debug!(%job, patient = %id, "patient busy, skipped this tick");
                report.busy += 1;
                continue;
            };
            let outcome = self
                .store
                .load(&id)
                .map_err(CoreError::from)
                .and_then(|mut patient| {
                    if f(&mut patient, &mut report)? {
                        self.store.save(&mut patient)?;
                        Ok(true)
                    } else {
                        Ok(false)
                    }
                });
            match outcome {
                Ok(true) => report.changed += 1,
                Ok(false) => {}
                Err(error) => {
                    tracing::warn!(%job, patient = %id, %error, "patient skipped");
                    report.errors += 1;
                }
            }
        }

        tracing::debug!(%job, scanned = report.scanned, changed = report.changed, "tick finished");
        report
    }
}
