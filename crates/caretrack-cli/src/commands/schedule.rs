use caretrack_core::schedule::{
    compute_dose_times, parse_sleep_time, parse_wake_time, InstructionProfile,
};
use clap::Subcommand;

use crate::common::{format_time, open_engine, print_summary};

#[derive(Subcommand)]
pub enum ScheduleAction {
    /// Preview daily dose times without touching any patient
    Preview {
        #[arg(long)]
        wake: String,
        #[arg(long)]
        sleep: String,
        /// Doses per day (1-10)
        #[arg(long, default_value = "1")]
        per_day: u8,
        #[arg(long, default_value = "1")]
        dosage: u32,
        #[arg(long, default_value = "")]
        instructions: String,
    },
    /// Upcoming dose times per medication
    Show { phone: String },
}

pub fn run(action: ScheduleAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        ScheduleAction::Preview {
            wake,
            sleep,
            per_day,
            dosage,
            instructions,
        } => {
            let wake = parse_wake_time(&wake)?;
            let sleep = parse_sleep_time(&sleep)?;
            let profile = InstructionProfile::classify(&instructions);
            for slot in compute_dose_times(wake, sleep, &profile, per_day, dosage) {
                println!("{}  x{}", format_time(slot.time), slot.dosage);
            }
        }
        ScheduleAction::Show { phone } => {
            let engine = open_engine()?;
            print_summary(&engine.schedule_summary(&phone)?);
        }
    }
    Ok(())
}
