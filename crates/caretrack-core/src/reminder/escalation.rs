//! Caregiver alerts for skipped doses.

use std::sync::Arc;

use super::message;
use crate::error::TransportError;
use crate::model::Patient;
use crate::transport::Transport;

/// Per-caregiver delivery results of one escalation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EscalationReport {
    /// Caregiver phones that received an alert.
    pub notified: Vec<String>,
    /// Caregiver phones whose alert failed.
    pub failures: Vec<(String, TransportError)>,
}

impl EscalationReport {
    pub fn is_empty(&self) -> bool {
        self.notified.is_empty() && self.failures.is_empty()
    }
}

/// Reacts to medications a patient skipped.
pub trait Escalator: Send + Sync {
    fn escalate(&self, patient: &Patient, skipped: &[String]) -> EscalationReport;
}

/// Routes each skipped medication to the caregivers of its owner.
pub struct CaregiverEscalator {
    transport: Arc<dyn Transport>,
}

impl CaregiverEscalator {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }
}

impl Escalator for CaregiverEscalator {
    fn escalate(&self, patient: &Patient, skipped: &[String]) -> EscalationReport {
        let mut report = EscalationReport::default();

        // (medication, owner); medications no longer on file fall back to the patient.
        let owned: Vec<(&str, &str)> = skipped
            .iter()
            .map(|name| {
                let owner = patient
                    .medication(name)
                    .map_or(patient.id.as_str(), |m| patient.owner_of(m));
                (name.as_str(), owner)
            })
            .collect();

        for caregiver in patient.caregivers.iter().filter(|c| c.notifications_enabled) {
            let mut meds: Vec<String> = Vec::new();
            for (name, owner) in &owned {
                if caregiver.responsible_for(owner) && !meds.iter().any(|m| m == name) {
                    meds.push((*name).to_string());
                }
            }
            if meds.is_empty() {
                continue;
            }
            let body = message::escalation_body(&patient.id, &meds);
            match self.transport.send(&caregiver.phone, &body) {
                Ok(()) => {
                    tracing::info!(
                        patient = %patient.id,
                        caregiver = %caregiver.name,
                        medications = ?meds,
                        "caregiver alerted"
                    );
                    report.notified.push(caregiver.phone.clone());
                }
                Err(error) => {
                    tracing::warn!(
                        patient = %patient.id,
                        caregiver = %caregiver.name,
                        %error,
                        "caregiver alert failed"
                    );
                    report.failures.push((caregiver.phone.clone(), error));
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Caregiver, Medication};
    use crate::transport::MemoryTransport;

    const ALICE_CG: &str = "15550000001";
    const BOB_CG: &str = "15550000002";

    fn patient() -> Patient {
        let mut p = Patient::new("15551234567", "UTC").unwrap();
        p.add_medication(Medication::new("A", 1, 1, 10).unwrap().with_owner("alice"))
            .unwrap();
        p.add_medication(Medication::new("B", 1, 1, 10).unwrap().with_owner("bob"))
            .unwrap();
        p.add_caregiver(Caregiver::new("Carol", ALICE_CG, vec!["alice".into()]))
            .unwrap();
        p.add_caregiver(Caregiver::new("Dave", BOB_CG, vec!["bob".into()]))
            .unwrap();
        p
    }

    #[test]
    fn routes_by_owner() {
        let transport = Arc::new(MemoryTransport::new());
        let escalator = CaregiverEscalator::new(transport.clone());
        let report = escalator.escalate(&patient(), &["A".into()]);

        assert_eq!(report.notified, vec![ALICE_CG.to_string()]);
        let sent = transport.sent_to(ALICE_CG);
        assert_eq!(sent.len(), 1);
        assert!(sent[0].body.contains("• A"));
        assert!(transport.sent_to(BOB_CG).is_empty());
    }

    #[test]
    fn unowned_medication_routes_to_patient_caregivers() {
        let transport = Arc::new(MemoryTransport::new());
        let mut p = patient();
        p.add_medication(Medication::new("C", 1, 1, 10).unwrap()).unwrap();
        p.add_caregiver(Caregiver::new("Erin", "15550000003", vec![p.id.clone()]))
            .unwrap();
        let report = CaregiverEscalator::new(transport.clone()).escalate(&p, &["C".into()]);
        assert_eq!(report.notified, vec!["15550000003".to_string()]);
    }

    #[test]
    fn failure_does_not_stop_other_caregivers() {
        let transport = Arc::new(MemoryTransport::new());
        transport.fail_for(ALICE_CG);
        let report =
            CaregiverEscalator::new(transport.clone()).escalate(&patient(), &["A".into(), "B".into()]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, ALICE_CG);
        assert_eq!(report.notified, vec![BOB_CG.to_string()]);
    }

    #[test]
    fn disabled_caregiver_is_skipped() {
        let transport = Arc::new(MemoryTransport::new());
        let mut p = patient();
        p.caregivers[0].notifications_enabled = false;
        let report = CaregiverEscalator::new(transport.clone()).escalate(&p, &["A".into()]);
        assert!(report.is_empty());
        assert!(transport.sent().is_empty());
    }
}
