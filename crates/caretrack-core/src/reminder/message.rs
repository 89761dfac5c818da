//! Message bodies sent to patients and caregivers.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

pub const REPLY_HINT: &str = "Please reply D to confirm taken or S to skip.";

pub const RESUME_NUDGE: &str =
    "Hi! Would you like to resume your medication reminders? Reply RESUME to continue.";

/// Total attempts a notification gets: the original plus two resends.
pub const MAX_ATTEMPTS: u8 = 3;

/// One reminder listing each medication with its due time(s) in local time.
pub fn reminder_body(groups: &[(String, Vec<DateTime<Utc>>)], tz: Tz) -> String {
    let mut body = String::from("Medication Reminder:\n");
    for (medication, due) in groups {
        body.push_str(&format!("\n*{medication}*:\n"));
        for at in due {
            body.push_str(&format!("- {}\n", at.with_timezone(&tz).format("%I:%M %p")));
        }
    }
    body.push('\n');
    body.push_str(REPLY_HINT);
    body
}

/// Resend of an unanswered reminder. `attempt` counts the original as 1.
pub fn follow_up_body(medications: &[String], attempt: u8) -> String {
    format!(
        "Reminder again:\nMedication: {}\n(Attempt {attempt}/{MAX_ATTEMPTS})\n{REPLY_HINT}",
        medications.join(", ")
    )
}

/// Caregiver alert for skipped medications.
pub fn escalation_body(patient_id: &str, medications: &[String]) -> String {
    let lines: Vec<String> = medications.iter().map(|m| format!("• {m}")).collect();
    format!("Alert: {patient_id} has skipped:\n{}", lines.join("\n"))
}
