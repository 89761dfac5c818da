use caretrack_core::schedule::parse_time_list;
use caretrack_core::Medication;
use chrono::Utc;
use clap::Subcommand;

use crate::common::{open_engine, print_change};

#[derive(Subcommand)]
pub enum MedicationAction {
    /// Add a medication to a patient
    Add {
        /// Patient phone number
        phone: String,
        /// Medication name
        name: String,
        /// Pills per dose
        #[arg(long, default_value = "1")]
        dosage: u32,
        /// Doses per day (1-10)
        #[arg(long, default_value = "1")]
        per_day: u8,
        /// Pills on hand
        #[arg(long)]
        pills: u32,
        /// Free-text instructions (e.g. "take with food")
        #[arg(long, default_value = "")]
        instructions: String,
        /// Person taking it, when not the patient
        #[arg(long)]
        owner: Option<String>,
        /// Turn reminders on right away
        #[arg(long)]
        enable: bool,
    },
    /// Turn reminders on
    Enable { phone: String, name: String },
    /// Turn reminders off
    Disable { phone: String, name: String },
    /// Override dose times; an empty list reverts to computed times
    SetTimes {
        phone: String,
        name: String,
        /// Comma-separated times (e.g. "8am, 2pm, 20:00")
        #[arg(default_value = "")]
        times: String,
    },
}

pub fn run(action: MedicationAction) -> Result<(), Box<dyn std::error::Error>> {
    let engine = open_engine()?;
    let now = Utc::now();
    match action {
        MedicationAction::Add {
            phone,
            name,
            dosage,
            per_day,
            pills,
            instructions,
            owner,
            enable,
        } => {
            let mut medication = Medication::new(name, dosage, per_day, pills)?
                .with_instructions(instructions)
                .with_reminders(enable);
            if let Some(owner) = owner {
                medication = medication.with_owner(owner);
            }
            let change = engine.add_medication(&phone, medication, now)?;
            println!("added");
            print_change(&change);
        }
        MedicationAction::Enable { phone, name } => {
            let change = engine.enable_reminders(&phone, &name, now)?;
            print_change(&change);
        }
        MedicationAction::Disable { phone, name } => {
            let change = engine.disable_reminders(&phone, &name, now)?;
            print_change(&change);
        }
        MedicationAction::SetTimes { phone, name, times } => {
            let (valid, invalid) = parse_time_list(&times);
            if !invalid.is_empty() {
                return Err(format!("unrecognized times: {}", invalid.join(", ")).into());
            }
            let change = engine.set_custom_times(&phone, &name, valid, now)?;
            print_change(&change);
        }
    }
    Ok(())
}
