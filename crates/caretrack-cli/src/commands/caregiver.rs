use caretrack_core::Caregiver;
use clap::Subcommand;

use crate::common::open_engine;

#[derive(Subcommand)]
pub enum CaregiverAction {
    /// Add a caregiver to a patient
    Add {
        /// Patient phone number
        phone: String,
        /// Caregiver name
        name: String,
        /// Caregiver phone number
        caregiver_phone: String,
        /// People they look after, comma-separated (defaults to the patient)
        #[arg(long = "for", value_delimiter = ',')]
        persons: Vec<String>,
    },
}

pub fn run(action: CaregiverAction) -> Result<(), Box<dyn std::error::Error>> {
    let engine = open_engine()?;
    match action {
        CaregiverAction::Add {
            phone,
            name,
            caregiver_phone,
            mut persons,
        } => {
            if persons.is_empty() {
                persons.push(phone.trim_start_matches('+').to_string());
            }
            engine.add_caregiver(&phone, Caregiver::new(name, caregiver_phone, persons))?;
            println!("added");
        }
    }
    Ok(())
}
