//! Core error types for caretrack-core.
//!
//! This module defines the error hierarchy using thiserror. Delivery
//! failures are ordinary values in the reminder flow (they end up on a
//! failed notification), so `TransportError` is kept separate from the
//! storage and validation errors that abort an operation.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for caretrack-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Persistence errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Message transport errors
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Patient is being processed by another job
    #[error("Patient {0} is busy, try again")]
    PatientBusy(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Persistence errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Stored row could not be decoded
    #[error("Corrupt record in {table}: {message}")]
    Corrupt { table: String, message: String },

    /// Patient not found
    #[error("Patient not found: {0}")]
    NotFound(String),

    /// Patient already registered
    #[error("Patient already exists: {0}")]
    AlreadyExists(String),

    /// Optimistic version check failed
    #[error("Patient {id} was modified concurrently (expected version {expected})")]
    StaleVersion { id: String, expected: i64 },

    /// Database is locked
    #[error("Database is locked")]
    Locked,
}

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown configuration key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Data directory could not be resolved or created
    #[error("Data directory unavailable: {0}")]
    DataDir(String),
}

/// Outbound message delivery errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Provider refused the message
    #[error("Message to {to} rejected ({status}): {message}")]
    Rejected {
        to: String,
        status: u16,
        message: String,
    },

    /// Provider could not be reached
    #[error("Message provider unreachable: {0}")]
    Unreachable(String),

    /// Transport is missing credentials or settings
    #[error("Transport misconfigured: {0}")]
    Misconfigured(String),
}

/// Validation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },

    /// Time of day could not be parsed
    #[error("Invalid time '{0}': use formats like 7am, 8:30pm or 21:15")]
    InvalidTime(String),

    /// Time parsed but outside the allowed part of the day
    #[error("Time '{input}' is not a valid {expected} time")]
    TimeOutOfRange { input: String, expected: String },

    /// Unknown IANA time zone
    #[error("Unknown time zone: {0}")]
    UnknownTimeZone(String),

    /// Value outside of its allowed range
    #[error("'{field}' must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: String,
        min: i64,
        max: i64,
        value: i64,
    },

    /// Named medication does not exist on the patient
    #[error("Unknown medication: {0}")]
    UnknownMedication(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(inner, _msg) => match inner.code {
                rusqlite::ErrorCode::DatabaseLocked | rusqlite::ErrorCode::DatabaseBusy => {
                    StoreError::Locked
                }
                _ => StoreError::QueryFailed(err.to_string()),
            },
            _ => StoreError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Store(err.into())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
