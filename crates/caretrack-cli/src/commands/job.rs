use caretrack_core::JobKind;
use chrono::Utc;
use clap::Subcommand;

use crate::common::open_engine;

#[derive(Subcommand)]
pub enum JobAction {
    /// Run one tick of a job now
    Run {
        /// dispatch, follow-up, materialize, resume-nudge or all
        job: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn run(action: JobAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        JobAction::Run { job, json } => {
            let jobs = if job == "all" {
                JobKind::ALL.to_vec()
            } else {
                vec![JobKind::parse(&job).ok_or_else(|| format!("unknown job: {job}"))?]
            };
            let engine = open_engine()?;
            let now = Utc::now();
            for kind in jobs {
                let report = engine.run_job(kind, now);
                if json {
                    println!("{}", serde_json::to_string(&report)?);
                } else {
                    println!("{report}");
                    for (patient, medication) in &report.refill_needed {
                        println!("  refill needed: {patient} {medication}");
                    }
                }
            }
        }
    }
    Ok(())
}
