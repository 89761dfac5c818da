//! Follow-up state machine for unanswered reminders.
//!
//! A pending notification moves through at most three steps, all timed
//! from its original `sent_at`:
//!
//! ```text
//! resends 0 --(first)--> resend, attempt 2/3
//! resends 1 --(second)-> resend, attempt 3/3
//! resends 2 --(final)--> skipped, caregivers alerted
//! ```
//!
//! Only one step is taken per notification per pass, so a loop that was
//! stalled for an hour still walks the stages tick by tick.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use super::escalation::{EscalationReport, Escalator};
use super::message;
use super::response::{settle_entries, Response};
use crate::model::{Notification, NotificationStatus, Patient};
use crate::transport::Transport;

/// Elapsed-time thresholds, measured from the original send.
#[derive(Debug, Clone)]
pub struct FollowUpConfig {
    pub first_resend: Duration,
    pub second_resend: Duration,
    pub escalate: Duration,
}

impl Default for FollowUpConfig {
    fn default() -> Self {
        Self {
            first_resend: Duration::minutes(20),
            second_resend: Duration::minutes(30),
            escalate: Duration::minutes(40),
        }
    }
}

/// The next step due for a pending notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowUpAction {
    /// Resend; `attempt` counts the original as 1.
    Resend { attempt: u8 },
    Escalate,
}

impl FollowUpConfig {
    /// Step due for `notification` at `now`, if any.
    pub fn next_action(&self, notification: &Notification, now: DateTime<Utc>) -> Option<FollowUpAction> {
        if !notification.is_pending() {
            return None;
        }
        let elapsed = now - notification.sent_at;
        match notification.resends {
            0 if elapsed >= self.first_resend => Some(FollowUpAction::Resend { attempt: 2 }),
            1 if elapsed >= self.second_resend => Some(FollowUpAction::Resend { attempt: 3 }),
            n if n >= 2 && elapsed >= self.escalate => Some(FollowUpAction::Escalate),
            _ => None,
        }
    }
}

/// What one follow-up pass did for a patient.
#[derive(Debug, Clone, Default)]
pub struct FollowUpReport {
    pub resent: usize,
    pub failed: usize,
    pub escalated: usize,
    pub escalations: Vec<EscalationReport>,
}

impl FollowUpReport {
    pub fn changed(&self) -> bool {
        self.resent + self.failed + self.escalated > 0
    }
}

/// Drives pending notifications through resend and escalation.
pub struct FollowUp {
    config: FollowUpConfig,
    transport: Arc<dyn Transport>,
    escalator: Arc<dyn Escalator>,
}

impl FollowUp {
    pub fn new(config: FollowUpConfig, transport: Arc<dyn Transport>, escalator: Arc<dyn Escalator>) -> Self {
        Self {
            config,
            transport,
            escalator,
        }
    }

    pub fn config(&self) -> &FollowUpConfig {
        &self.config
    }

    /// Advance every pending notification of one patient by at most one step.
    pub fn process(&self, patient: &mut Patient, now: DateTime<Utc>) -> FollowUpReport {
        let mut report = FollowUpReport::default();
        if !patient.receives_reminders() {
            return report;
        }

        let mut to_escalate: Vec<Vec<String>> = Vec::new();
        for idx in 0..patient.notifications.len() {
            let Some(action) = self.config.next_action(&patient.notifications[idx], now) else {
                continue;
            };
            match action {
                FollowUpAction::Resend { attempt } => {
                    let body = message::follow_up_body(&patient.notifications[idx].medications, attempt);
                    match self.transport.send(&patient.id, &body) {
                        Ok(()) => {
                            patient.notifications[idx].resends += 1;
                            report.resent += 1;
                            tracing::info!(patient = %patient.id, attempt, "follow-up resent");
                        }
                        Err(error) => {
                            let notification = &mut patient.notifications[idx];
                            notification.status = NotificationStatus::Failed;
                            notification.error = Some(error.to_string());
                            report.failed += 1;
                            tracing::warn!(patient = %patient.id, attempt, %error, "follow-up delivery failed");
                        }
                    }
                }
                FollowUpAction::Escalate => {
                    let notification = &mut patient.notifications[idx];
                    notification.status = NotificationStatus::Skipped;
                    to_escalate.push(notification.medications.clone());
                }
            }
        }

        for medications in to_escalate {
            settle_entries(patient, &medications, Response::Skipped, now);
            tracing::info!(patient = %patient.id, medications = ?medications, "reminder unanswered, escalating");
            report.escalations.push(self.escalator.escalate(patient, &medications));
            report.escalated += 1;
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EntryStatus, Medication, ScheduleEntry};
    use crate::transport::MemoryTransport;
    use chrono::TimeZone;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingEscalator {
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl Escalator for RecordingEscalator {
        fn escalate(&self, _patient: &Patient, skipped: &[String]) -> EscalationReport {
            self.calls.lock().unwrap().push(skipped.to_vec());
            EscalationReport::default()
        }
    }

    fn sent_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 8, 0, 0).unwrap()
    }

    fn patient() -> Patient {
        let mut p = Patient::new("15551234567", "UTC").unwrap();
        p.add_medication(Medication::new("Aspirin", 1, 2, 20).unwrap().with_reminders(true))
            .unwrap();
        p.activate();
        let mut entry = ScheduleEntry::pending("Aspirin", sent_at());
        entry.reminder_sent = true;
        p.schedule.push(entry);
        p.notifications.push(Notification::pending(sent_at(), vec!["Aspirin".into()]));
        p
    }

    fn follow_up(transport: &Arc<MemoryTransport>, escalator: &Arc<RecordingEscalator>) -> FollowUp {
        FollowUp::new(FollowUpConfig::default(), transport.clone(), escalator.clone())
    }

    #[test]
    fn next_action_thresholds() {
        let cfg = FollowUpConfig::default();
        let mut n = Notification::pending(sent_at(), vec!["A".into()]);
        assert_eq!(cfg.next_action(&n, sent_at() + Duration::minutes(19)), None);
        assert_eq!(
            cfg.next_action(&n, sent_at() + Duration::minutes(20)),
            Some(FollowUpAction::Resend { attempt: 2 })
        );
        n.resends = 1;
        assert_eq!(cfg.next_action(&n, sent_at() + Duration::minutes(29)), None);
        n.resends = 2;
        assert_eq!(
            cfg.next_action(&n, sent_at() + Duration::minutes(40)),
            Some(FollowUpAction::Escalate)
        );
        n.status = NotificationStatus::Taken;
        assert_eq!(cfg.next_action(&n, sent_at() + Duration::hours(5)), None);
    }

    #[test]
    fn progression_resend_resend_escalate() {
        let transport = Arc::new(MemoryTransport::new());
        let escalator = Arc::new(RecordingEscalator::default());
        let fu = follow_up(&transport, &escalator);
        let mut p = patient();

        let r = fu.process(&mut p, sent_at() + Duration::minutes(25));
        assert_eq!(r.resent, 1);
        assert_eq!(p.notifications[0].resends, 1);
        assert!(transport.sent()[0].body.contains("(Attempt 2/3)"));

        let r = fu.process(&mut p, sent_at() + Duration::minutes(55));
        assert_eq!(r.resent, 1);
        assert_eq!(p.notifications[0].resends, 2);
        assert!(transport.sent()[1].body.contains("(Attempt 3/3)"));

        let r = fu.process(&mut p, sent_at() + Duration::minutes(65));
        assert_eq!(r.escalated, 1);
        assert_eq!(p.notifications[0].status, NotificationStatus::Skipped);
        assert_eq!(p.schedule[0].status, EntryStatus::Skipped);
        assert_eq!(p.medication("Aspirin").unwrap().skipped_count, 1);
        assert_eq!(escalator.calls.lock().unwrap().len(), 1);

        let r = fu.process(&mut p, sent_at() + Duration::minutes(90));
        assert!(!r.changed());
        assert_eq!(escalator.calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn one_step_per_pass_after_a_stall() {
        let transport = Arc::new(MemoryTransport::new());
        let escalator = Arc::new(RecordingEscalator::default());
        let fu = follow_up(&transport, &escalator);
        let mut p = patient();

        fu.process(&mut p, sent_at() + Duration::hours(2));
        assert_eq!(p.notifications[0].resends, 1);
        assert!(p.notifications[0].is_pending());
        assert!(escalator.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn resend_failure_is_terminal() {
        let transport = Arc::new(MemoryTransport::new());
        transport.set_fail_all(true);
        let escalator = Arc::new(RecordingEscalator::default());
        let fu = follow_up(&transport, &escalator);
        let mut p = patient();

        let r = fu.process(&mut p, sent_at() + Duration::minutes(21));
        assert_eq!(r.failed, 1);
        assert_eq!(p.notifications[0].status, NotificationStatus::Failed);
        assert_eq!(p.notifications[0].resends, 0);
        assert!(p.notifications[0].error.is_some());

        transport.set_fail_all(false);
        let r = fu.process(&mut p, sent_at() + Duration::minutes(50));
        assert!(!r.changed());
        assert!(transport.sent().is_empty());
    }

    #[test]
    fn paused_patient_is_left_alone() {
        let transport = Arc::new(MemoryTransport::new());
        let escalator = Arc::new(RecordingEscalator::default());
        let mut p = patient();
        p.notifications_enabled = false;
        let r = follow_up(&transport, &escalator).process(&mut p, sent_at() + Duration::minutes(30));
        assert!(!r.changed());
    }
}
