//! Due-dose matching and reminder dispatch.
//!
//! One pass looks at one patient: find pending entries due within the
//! tolerance window, apply the debounce policy, send a single message
//! covering every due medication and record the notification.
//!
//! Entries are only marked as reminded after the transport confirms
//! delivery. A failed send leaves them eligible for the next tick
//! (at-least-once delivery).

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::message;
use crate::error::{TransportError, ValidationError};
use crate::model::{Notification, Patient};
use crate::transport::Transport;

/// How recently-sent reminders suppress new ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DebouncePolicy {
    /// No reminder within `min_gap` of the patient's last one.
    #[default]
    Patient,
    /// Leave out medications that already have a pending notification.
    Medication,
}

impl DebouncePolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            DebouncePolicy::Patient => "patient",
            DebouncePolicy::Medication => "medication",
        }
    }
}

/// Dispatch tuning.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Entries within ± this of now are due.
    pub tolerance: Duration,
    /// Minimum time between two reminders (patient policy).
    pub min_gap: Duration,
    pub debounce: DebouncePolicy,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            tolerance: Duration::minutes(10),
            min_gap: Duration::minutes(15),
            debounce: DebouncePolicy::Patient,
        }
    }
}

/// What a dispatch pass did for one patient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Patient is not active or has notifications off.
    Ineligible,
    NothingDue,
    /// Entries were due but suppressed by the debounce policy.
    Debounced { due: usize },
    Sent {
        notification_id: String,
        entries: usize,
        medications: Vec<String>,
    },
    Failed { error: TransportError },
}

impl DispatchOutcome {
    /// Whether the patient aggregate was modified and must be saved.
    pub fn changed(&self) -> bool {
        matches!(self, DispatchOutcome::Sent { .. } | DispatchOutcome::Failed { .. })
    }
}

/// Sends batched reminders for due schedule entries.
pub struct Dispatcher {
    config: DispatchConfig,
    transport: Arc<dyn Transport>,
}

impl Dispatcher {
    pub fn new(config: DispatchConfig, transport: Arc<dyn Transport>) -> Self {
        Self { config, transport }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Indices of entries due at `now`, ordered by scheduled instant.
    pub fn due_entries(&self, patient: &Patient, now: DateTime<Utc>) -> Vec<usize> {
        let mut due: Vec<usize> = patient
            .schedule
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_pending() && !e.reminder_sent)
            .filter(|(_, e)| {
                patient
                    .medication(&e.medication)
                    .is_some_and(|m| m.reminders_enabled)
            })
            .filter(|(_, e)| (e.scheduled_at - now).abs() <= self.config.tolerance)
            .map(|(i, _)| i)
            .collect();
        due.sort_by_key(|&i| patient.schedule[i].scheduled_at);
        due
    }

    fn apply_debounce(&self, patient: &Patient, now: DateTime<Utc>, due: Vec<usize>) -> Vec<usize> {
        match self.config.debounce {
            DebouncePolicy::Patient => match patient.last_reminder_sent {
                Some(last) if now - last < self.config.min_gap => Vec::new(),
                _ => due,
            },
            DebouncePolicy::Medication => due
                .into_iter()
                .filter(|&i| {
                    let med = &patient.schedule[i].medication;
                    !patient
                        .notifications
                        .iter()
                        .any(|n| n.is_pending() && n.covers(med))
                })
                .collect(),
        }
    }

    /// Run one dispatch pass for a patient.
    ///
    /// # Errors
    /// Returns an error if the patient's time zone is invalid.
    pub fn dispatch(
        &self,
        patient: &mut Patient,
        now: DateTime<Utc>,
    ) -> Result<DispatchOutcome, ValidationError> {
        if !patient.receives_reminders() {
            return Ok(DispatchOutcome::Ineligible);
        }
        let tz = patient.tz()?;

        let due = self.due_entries(patient, now);
        if due.is_empty() {
            return Ok(DispatchOutcome::NothingDue);
        }
        let due_count = due.len();
        let due = self.apply_debounce(patient, now, due);
        if due.is_empty() {
            tracing::debug!(patient = %patient.id, due = due_count, "reminder debounced");
            return Ok(DispatchOutcome::Debounced { due: due_count });
        }

        let mut groups: Vec<(String, Vec<DateTime<Utc>>)> = Vec::new();
        for &i in &due {
            let entry = &patient.schedule[i];
            match groups.iter_mut().find(|(name, _)| *name == entry.medication) {
                Some((_, times)) => times.push(entry.scheduled_at),
                None => groups.push((entry.medication.clone(), vec![entry.scheduled_at])),
            }
        }
        let medications: Vec<String> = groups.iter().map(|(name, _)| name.clone()).collect();
        let body = message::reminder_body(&groups, tz);

        match self.transport.send(&patient.id, &body) {
            Ok(()) => {
                for &i in &due {
                    patient.schedule[i].reminder_sent = true;
                }
                patient.last_reminder_sent = Some(now);
                let notification = Notification::pending(now, medications.clone());
                let notification_id = notification.id.clone();
                patient.notifications.push(notification);
                tracing::info!(
                    patient = %patient.id,
                    entries = due.len(),
                    medications = ?medications,
                    "reminder sent"
                );
                Ok(DispatchOutcome::Sent {
                    notification_id,
                    entries: due.len(),
                    medications,
                })
            }
            Err(error) => {
                tracing::warn!(patient = %patient.id, %error, "reminder delivery failed");
                patient
                    .notifications
                    .push(Notification::failed(now, medications, error.to_string()));
                Ok(DispatchOutcome::Failed { error })
            }
        }
    }
}
