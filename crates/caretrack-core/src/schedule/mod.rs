//! Dose scheduling: instruction hints, daily dose times and dated entries.

pub mod calculator;
pub mod instructions;
pub mod materializer;
pub mod time_input;

pub use calculator::{compute_dose_times, slots_for, DoseSlot};
pub use instructions::{InstructionHint, InstructionProfile};
pub use materializer::{
    local_instant, local_times_by_medication, materialize, merge, merge_keeping_upcoming, Materialized,
    MedicationPlan,
};
pub use time_input::{parse_sleep_time, parse_time_list, parse_time_of_day, parse_wake_time};

use chrono::NaiveTime;

use crate::model::Patient;

/// Plans for the named medications that have reminders enabled.
///
/// Medications without custom times need the patient's wake and sleep
/// times; they are left out until both are known.
pub fn plans_for(patient: &Patient, names: &[String]) -> Vec<MedicationPlan> {
    patient
        .medications
        .iter()
        .filter(|m| m.reminders_enabled && names.contains(&m.name))
        .filter_map(|m| {
            let slots = if !m.custom_times.is_empty() {
                // custom times ignore the waking window
                slots_for(NaiveTime::MIN, NaiveTime::MIN, m)
            } else if let (Some(wake), Some(sleep)) = (patient.wake_time, patient.sleep_time) {
                slots_for(wake, sleep, m)
            } else {
                tracing::debug!(
                    patient = %patient.id,
                    medication = %m.name,
                    "no waking window yet, not scheduling"
                );
                return None;
            };
            Some(MedicationPlan::new(m.name.clone(), slots, m.pill_count))
        })
        .collect()
}
