//! Patient replies to reminders.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};

use crate::error::ValidationError;
use crate::model::{EntryStatus, NotificationStatus, Patient};

/// A patient's answer to the latest reminder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    Taken,
    Skipped,
}

impl Response {
    pub fn notification_status(self) -> NotificationStatus {
        match self {
            Response::Taken => NotificationStatus::Taken,
            Response::Skipped => NotificationStatus::Skipped,
        }
    }

    pub fn entry_status(self) -> EntryStatus {
        match self {
            Response::Taken => EntryStatus::Taken,
            Response::Skipped => EntryStatus::Skipped,
        }
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Taken => write!(f, "taken"),
            Response::Skipped => write!(f, "skipped"),
        }
    }
}

impl FromStr for Response {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "d" | "taken" => Ok(Response::Taken),
            "s" | "skip" | "skipped" => Ok(Response::Skipped),
            other => Err(ValidationError::InvalidValue {
                field: "response".into(),
                message: format!("'{other}' is not D or S"),
            }),
        }
    }
}

/// Result of applying a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseOutcome {
    /// No pending notification; nothing changed.
    NothingPending,
    Recorded {
        notification_id: String,
        response: Response,
        /// Medications whose schedule entry was updated.
        applied: Vec<String>,
        /// Medications on the notification with no pending entry left.
        unmatched: Vec<String>,
    },
}

impl ResponseOutcome {
    pub fn changed(&self) -> bool {
        matches!(self, ResponseOutcome::Recorded { .. })
    }

    /// Confirmation text for the patient.
    pub fn reply_text(&self) -> String {
        match self {
            ResponseOutcome::NothingPending => {
                "There are no pending medication reminders to respond to.".to_string()
            }
            ResponseOutcome::Recorded {
                response: Response::Taken,
                applied,
                ..
            } => format!("Thanks! Marked as taken: {}.", applied.join(", ")),
            ResponseOutcome::Recorded {
                response: Response::Skipped,
                applied,
                ..
            } => format!("Noted. Marked as skipped: {}.", applied.join(", ")),
        }
    }
}

/// Close the reminded (or else earliest) pending entry of each medication
/// and update its counters. Returns the (applied, unmatched) medication names.
pub(crate) fn settle_entries(
    patient: &mut Patient,
    medications: &[String],
    response: Response,
    now: DateTime<Utc>,
) -> (Vec<String>, Vec<String>) {
    let mut applied = Vec::new();
    let mut unmatched = Vec::new();
    for name in medications {
        let Some(idx) = patient.entry_to_settle(name) else {
            tracing::debug!(patient = %patient.id, medication = %name, "no pending entry to settle");
            unmatched.push(name.clone());
            continue;
        };
        let entry = &mut patient.schedule[idx];
        entry.status = response.entry_status();
        entry.taken_at = Some(now);
        if let Some(med) = patient.medication_mut(name) {
            match response {
                Response::Taken => med.record_taken(),
                Response::Skipped => med.record_skipped(),
            }
        }
        applied.push(name.clone());
    }
    (applied, unmatched)
}

/// Apply a reply to the patient's most recent pending notification.
pub fn record_response(patient: &mut Patient, response: Response, now: DateTime<Utc>) -> ResponseOutcome {
    let Some(idx) = patient.latest_pending_notification() else {
        return ResponseOutcome::NothingPending;
    };
    patient.notifications[idx].status = response.notification_status();
    let notification_id = patient.notifications[idx].id.clone();
    let medications = patient.notifications[idx].medications.clone();

    let (applied, unmatched) = settle_entries(patient, &medications, response, now);
    patient.last_interaction = Some(now);
    tracing::info!(
        patient = %patient.id,
        %response,
        applied = applied.len(),
        unmatched = unmatched.len(),
        "response recorded"
    );
    ResponseOutcome::Recorded {
        notification_id,
        response,
        applied,
        unmatched,
    }
}
