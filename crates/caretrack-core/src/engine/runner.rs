//! Background loops driving the job ticks.
//!
//! Every job gets its own task with a `tokio::time::interval`. Missed ticks
//! are skipped rather than bursted, and the synchronous tick body runs on
//! the blocking pool. A loop awaits its tick before taking the next one,
//! so the same job never overlaps with itself.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Timelike, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use super::{Engine, JobKind};

/// Lets a daily job through once per UTC date, at or after `hour`.
#[derive(Debug, Clone)]
pub(crate) struct DailyGate {
    hour: u32,
    last_run: Option<NaiveDate>,
}

impl DailyGate {
    pub(crate) fn new(hour: u32) -> Self {
        Self { hour, last_run: None }
    }

    pub(crate) fn should_run(&mut self, now: DateTime<Utc>) -> bool {
        let today = now.date_naive();
        if now.hour() < self.hour || self.last_run == Some(today) {
            return false;
        }
        self.last_run = Some(today);
        true
    }
}

/// Builder for the background job loops.
pub struct Runner {
    engine: Arc<Engine>,
    period: Duration,
    jobs: Vec<JobKind>,
}

/// Running loops. Dropping the handle also stops them, but without
/// waiting for in-flight ticks.
pub struct RunnerHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Runner {
    pub fn new(engine: Arc<Engine>) -> Self {
        let period = Duration::from_secs(engine.config().jobs.tick_seconds.max(1));
        Self {
            engine,
            period,
            jobs: JobKind::ALL.to_vec(),
        }
    }

    /// Override the tick period from the configuration.
    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// Run only the given jobs.
    pub fn with_jobs(mut self, jobs: &[JobKind]) -> Self {
        self.jobs = jobs.to_vec();
        self
    }

    /// Start all loops on the current tokio runtime.
    pub fn spawn(self) -> RunnerHandle {
        let (shutdown, rx) = watch::channel(false);
        let hours = &self.engine.config().jobs;
        info!(
            period = ?self.period,
            jobs = ?self.jobs,
            transport = self.engine.transport().name(),
            "starting job loops"
        );
        let tasks = self
            .jobs
            .iter()
            .map(|&job| {
                let hour = match job {
                    JobKind::Dispatch | JobKind::FollowUp => None,
                    JobKind::Materialize => Some(hours.materialize_hour),
                    JobKind::ResumeNudge => Some(hours.resume_nudge_hour),
                };
                tokio::spawn(job_loop(
                    Arc::clone(&self.engine),
                    job,
                    self.period,
                    hour.map(DailyGate::new),
                    rx.clone(),
                ))
            })
            .collect();

        RunnerHandle { shutdown, tasks }
    }
}

impl RunnerHandle {
    /// Signal every loop to stop and wait for in-flight ticks to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                error!("job loop ended abnormally: {e}");
            }
        }
        info!("job loops stopped");
    }
}

async fn job_loop(
    engine: Arc<Engine>,
    job: JobKind,
    period: Duration,
    mut daily: Option<DailyGate>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
        }

        let now = Utc::now();
        if let Some(gate) = daily.as_mut() {
            if !gate.should_run(now) {
                continue;
            }
        }

        let engine = Arc::clone(&engine);
        match tokio::task::spawn_blocking(move || engine.run_job(job, now)).await {
            Ok(report) if report.changed > 0 || report.errors > 0 || !report.refill_needed.is_empty() => {
                info!(%job, "{report}");
                for (patient, medication) in &report.refill_needed {
                    info!(%patient, %medication, "refill needed");
                }
            }
            Ok(report) => debug!(%job, "{report}"),
            Err(e) => error!(%job, "tick panicked: {e}"),
        }
    }
    debug!(%job, "job loop finished");
}
