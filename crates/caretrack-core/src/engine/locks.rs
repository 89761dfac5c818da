//! In-process per-patient mutual exclusion.

use std::collections::HashSet;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Registry of patients currently held by a job or command.
#[derive(Debug, Default)]
pub struct PatientLocks {
    held: Mutex<HashSet<String>>,
    /// Signalled whenever a guard is dropped.
    released: Condvar,
}

/// Releases the patient when dropped.
#[derive(Debug)]
pub struct PatientGuard<'a> {
    locks: &'a PatientLocks,
    id: String,
}

impl PatientLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the patient if nobody holds it.
    pub fn try_lock(&self, id: &str) -> Option<PatientGuard<'_>> {
        let mut held = self.held.lock().ok()?;
        if !held.insert(id.to_string()) {
            return None;
        }
        Some(self.guard(id))
    }

    /// Take the patient, waiting up to `wait` for its holder to release it.
    pub fn lock_within(&self, id: &str, wait: Duration) -> Option<PatientGuard<'_>> {
        let deadline = Instant::now() + wait;
        let mut held = self.held.lock().ok()?;
        while held.contains(id) {
            let remaining = deadline.checked_duration_since(Instant::now())?;
            let (guard, timeout) = self.released.wait_timeout(held, remaining).ok()?;
            held = guard;
            if timeout.timed_out() && held.contains(id) {
                return None;
            }
        }
        held.insert(id.to_string());
        Some(self.guard(id))
    }

    pub fn is_locked(&self, id: &str) -> bool {
        self.held.lock().map(|h| h.contains(id)).unwrap_or(false)
    }

    fn guard(&self, id: &str) -> PatientGuard<'_> {
        PatientGuard {
            locks: self,
            id: id.to_string(),
        }
    }
}

impl Drop for PatientGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut held) = self.locks.held.lock() {
            held.remove(&self.id);
        }
        self.locks.released.notify_all();
    }
}
