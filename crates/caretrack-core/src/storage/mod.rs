mod config;
pub mod database;

pub use config::{
    Config, DispatchSection, FollowUpSection, JobsSection, LoggingSection, TransportKind,
    TransportSection,
};
pub use database::SqliteStore;

use std::path::PathBuf;

use crate::error::{ConfigError, StoreError};
use crate::model::Patient;

/// Where the data directory lives, without touching the filesystem.
///
/// `CARETRACK_DATA_DIR` wins when set. Otherwise `~/.config/caretrack`,
/// or `~/.config/caretrack-dev` when `CARETRACK_ENV=dev`.
pub fn data_dir_path() -> PathBuf {
    match std::env::var("CARETRACK_DATA_DIR") {
        Ok(explicit) if !explicit.trim().is_empty() => PathBuf::from(explicit),
        _ => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("CARETRACK_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("caretrack-dev")
            } else {
                base_dir.join("caretrack")
            }
        }
    }
}

/// Returns the data directory, creating it if needed.
///
/// # Errors
/// Returns an error if the directory cannot be created.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = data_dir_path();
    std::fs::create_dir_all(&dir)
        .map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}

/// Durable home of patient aggregates.
///
/// `save` must be atomic per patient and reject writes whose
/// `patient.version` no longer matches the stored one. On success the
/// in-memory version is bumped to the new stored value.
pub trait PatientStore: Send + Sync {
    fn list_ids(&self) -> Result<Vec<String>, StoreError>;

    fn load(&self, id: &str) -> Result<Patient, StoreError>;

    /// Insert a new patient. Fails with `AlreadyExists` on duplicate ids.
    fn create(&self, patient: &mut Patient) -> Result<(), StoreError>;

    /// Replace the stored aggregate if its version is unchanged.
    fn save(&self, patient: &mut Patient) -> Result<(), StoreError>;
}
