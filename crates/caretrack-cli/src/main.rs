use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod common;

#[derive(Parser)]
#[command(name = "caretrack-cli", version, about = "CareTrack medication reminder CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Patient registration and lifecycle
    Patient {
        #[command(subcommand)]
        action: commands::patient::PatientAction,
    },
    /// Medications of a patient
    Medication {
        #[command(subcommand)]
        action: commands::medication::MedicationAction,
    },
    /// Caregivers alerted on skipped doses
    Caregiver {
        #[command(subcommand)]
        action: commands::caregiver::CaregiverAction,
    },
    /// Dose time previews and schedule summaries
    Schedule {
        #[command(subcommand)]
        action: commands::schedule::ScheduleAction,
    },
    /// Run a single job tick
    Job {
        #[command(subcommand)]
        action: commands::job::JobAction,
    },
    /// Run all job loops until interrupted
    Serve,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let configured = caretrack_core::Config::read_or_default().logging.filter;
        EnvFilter::try_new(configured).unwrap_or_else(|_| EnvFilter::new("caretrack=info"))
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing();
    let result = match cli.command {
        Commands::Config { action } => commands::config::run(action),
        Commands::Patient { action } => commands::patient::run(action),
        Commands::Medication { action } => commands::medication::run(action),
        Commands::Caregiver { action } => commands::caregiver::run(action),
        Commands::Schedule { action } => commands::schedule::run(action),
        Commands::Job { action } => commands::job::run(action),
        Commands::Serve => commands::serve::run(),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
