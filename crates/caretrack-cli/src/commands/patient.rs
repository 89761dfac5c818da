use caretrack_core::schedule::{parse_sleep_time, parse_wake_time};
use caretrack_core::{Patient, Response};
use chrono::Utc;
use clap::Subcommand;

use crate::common::{format_time, open_engine, print_change};

#[derive(Subcommand)]
pub enum PatientAction {
    /// Register a new patient
    Add {
        /// Phone number (10-15 digits, leading + allowed)
        phone: String,
        /// IANA time zone
        #[arg(long, default_value = "UTC")]
        timezone: String,
        /// Wake time (e.g. "7am", "06:30")
        #[arg(long)]
        wake: Option<String>,
        /// Sleep time (e.g. "10pm", "23:00")
        #[arg(long)]
        sleep: Option<String>,
    },
    /// Show a patient
    Show {
        phone: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List registered patients
    List,
    /// Start reminders
    Activate { phone: String },
    /// Pause reminders until resumed
    Pause { phone: String },
    /// Resume reminders after a pause
    Resume { phone: String },
    /// Stop reminders for every medication
    Stop { phone: String },
    /// Change the waking window
    SetTimes {
        phone: String,
        wake: String,
        sleep: String,
    },
    /// Record a reply (D = taken, S = skipped)
    Respond { phone: String, reply: String },
}

pub fn run(action: PatientAction) -> Result<(), Box<dyn std::error::Error>> {
    let engine = open_engine()?;
    let now = Utc::now();
    match action {
        PatientAction::Add {
            phone,
            timezone,
            wake,
            sleep,
        } => {
            let mut patient = Patient::new(phone, timezone)?;
            if let Some(wake) = wake {
                patient.wake_time = Some(parse_wake_time(&wake)?);
            }
            if let Some(sleep) = sleep {
                patient.sleep_time = Some(parse_sleep_time(&sleep)?);
            }
            let patient = engine.register_patient(patient)?;
            println!("registered {}", patient.id);
        }
        PatientAction::Show { phone, json } => {
            let patient = engine.patient(&phone)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&patient)?);
            } else {
                print_patient(&patient);
            }
        }
        PatientAction::List => {
            for id in engine.patient_ids()? {
                println!("{id}");
            }
        }
        PatientAction::Activate { phone } => {
            let change = engine.activate(&phone, now)?;
            println!("activated");
            print_change(&change);
        }
        PatientAction::Pause { phone } => {
            engine.pause(&phone, now)?;
            println!("paused");
        }
        PatientAction::Resume { phone } => {
            let change = engine.resume(&phone, now)?;
            println!("resumed");
            print_change(&change);
        }
        PatientAction::Stop { phone } => {
            engine.stop(&phone, now)?;
            println!("stopped");
        }
        PatientAction::SetTimes { phone, wake, sleep } => {
            let wake = parse_wake_time(&wake)?;
            let sleep = parse_sleep_time(&sleep)?;
            let change = engine.set_wake_sleep_times(&phone, wake, sleep, now)?;
            print_change(&change);
        }
        PatientAction::Respond { phone, reply } => {
            let response: Response = reply.parse()?;
            let outcome = engine.record_response(&phone, response, now)?;
            println!("{}", outcome.reply_text());
        }
    }
    Ok(())
}

fn print_patient(patient: &Patient) {
    println!("Patient:   {}", patient.id);
    println!("Status:    {}", patient.status.as_str());
    println!("Time zone: {}", patient.timezone);
    match (patient.wake_time, patient.sleep_time) {
        (Some(wake), Some(sleep)) => {
            println!("Day:       {} - {}", format_time(wake), format_time(sleep));
        }
        _ => println!("Day:       not set"),
    }
    println!("Medications:");
    for m in &patient.medications {
        println!(
            "  {} ({} x{}/day, {} left, reminders {})",
            m.name,
            m.dosage,
            m.doses_per_day,
            m.pill_count,
            if m.reminders_enabled { "on" } else { "off" }
        );
    }
    let pending = patient.schedule.iter().filter(|e| e.is_pending()).count();
    println!("Pending doses: {pending}");
    println!("Caregivers: {}", patient.caregivers.len());
}
