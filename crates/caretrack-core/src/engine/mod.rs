//! The engine façade: store, transport, locks and configuration in one
//! place, with the external operations and one-pass job ticks.
//!
//! Every mutation follows the same shape: take the patient lock, load the
//! aggregate, mutate it, save it back with the version check. Jobs skip
//! patients whose lock is held; commands wait briefly before giving up
//! with [`CoreError::PatientBusy`].

mod commands;
mod jobs;
mod locks;
mod runner;

pub use commands::ScheduleChange;
pub use jobs::{JobKind, TickReport};
pub use locks::{PatientGuard, PatientLocks};
pub use runner::{Runner, RunnerHandle};

use std::sync::Arc;
use std::time::Duration;

use crate::error::{CoreError, Result};
use crate::model::Patient;
use crate::reminder::{CaregiverEscalator, Dispatcher, Escalator, FollowUp};
use crate::storage::{Config, PatientStore};
use crate::transport::Transport;

/// How long a command waits for a patient held by a job.
const COMMAND_LOCK_WAIT: Duration = Duration::from_secs(2);

pub struct Engine {
    store: Arc<dyn PatientStore>,
    transport: Arc<dyn Transport>,
    locks: PatientLocks,
    config: Config,
    dispatcher: Dispatcher,
    follow_up: FollowUp,
}

impl Engine {
    pub fn new(store: Arc<dyn PatientStore>, transport: Arc<dyn Transport>, config: Config) -> Self {
        let escalator: Arc<dyn Escalator> = Arc::new(CaregiverEscalator::new(Arc::clone(&transport)));
        Self::with_escalator(store, transport, config, escalator)
    }

    /// Use a custom escalation policy instead of caregiver alerts.
    pub fn with_escalator(
        store: Arc<dyn PatientStore>,
        transport: Arc<dyn Transport>,
        config: Config,
        escalator: Arc<dyn Escalator>,
    ) -> Self {
        let dispatcher = Dispatcher::new(config.dispatch_config(), Arc::clone(&transport));
        let follow_up = FollowUp::new(config.follow_up_config(), Arc::clone(&transport), escalator);
        Self {
            store,
            transport,
            locks: PatientLocks::new(),
            config,
            dispatcher,
            follow_up,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn locks(&self) -> &PatientLocks {
        &self.locks
    }

    /// Load a patient without locking.
    ///
    /// # Errors
    /// Returns an error if the patient does not exist or cannot be read.
    pub fn patient(&self, id: &str) -> Result<Patient> {
        Ok(self.store.load(&normalize_id(id))?)
    }

    /// # Errors
    /// Returns an error if the store cannot be read.
    pub fn patient_ids(&self) -> Result<Vec<String>> {
        Ok(self.store.list_ids()?)
    }

    /// Lock, load, mutate and save one patient. Nothing is written when
    /// `f` fails or leaves the aggregate unchanged.
    fn with_patient<T>(&self, id: &str, f: impl FnOnce(&mut Patient) -> Result<T>) -> Result<T> {
        let id = normalize_id(id);
        let _guard = self
            .locks
            .lock_within(&id, COMMAND_LOCK_WAIT)
            .ok_or_else(|| CoreError::PatientBusy(id.clone()))?;
        let mut patient = self.store.load(&id)?;
        let before = patient.clone();
        let out = f(&mut patient)?;
        if patient != before {
            self.store.save(&mut patient)?;
        }
        Ok(out)
    }
}

fn normalize_id(id: &str) -> String {
    id.trim().trim_start_matches('+').to_string()
}
