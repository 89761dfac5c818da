//! # CareTrack Core Library
//!
//! Medication adherence engine: turns a patient's day and prescriptions
//! into dated dose reminders, delivers them as text messages, follows up
//! on silence and alerts caregivers when doses go unanswered.
//!
//! All operations are available through the `caretrack-cli` binary, which
//! is a thin layer over this crate.
//!
//! ## Architecture
//!
//! - **Schedule**: instruction hints, daily dose times, and materialization
//!   of dated entries bounded by the remaining pill supply
//! - **Reminder**: dispatch of due doses, the resend/escalate follow-up
//!   ladder, caregiver escalation and patient replies
//! - **Storage**: SQLite patient store and TOML configuration
//! - **Transport**: outbound message delivery (log, in-memory, Twilio)
//! - **Engine**: per-patient locking, external operations, job ticks and
//!   the async runner
//!
//! ## Key Components
//!
//! - [`Engine`]: entry point for commands and job ticks
//! - [`Patient`]: the aggregate every operation loads and saves
//! - [`SqliteStore`]: durable [`PatientStore`]
//! - [`Config`]: configuration management
//! - [`Transport`]: trait for message delivery

pub mod engine;
pub mod error;
pub mod model;
pub mod reminder;
pub mod schedule;
pub mod storage;
pub mod transport;

pub use engine::{Engine, JobKind, Runner, RunnerHandle, ScheduleChange, TickReport};
pub use error::{ConfigError, CoreError, Result, StoreError, TransportError, ValidationError};
pub use model::{
    Caregiver, EntryStatus, Medication, Notification, NotificationStatus, Patient, PatientStatus,
    ScheduleEntry,
};
pub use reminder::{DebouncePolicy, Response, ResponseOutcome};
pub use storage::{Config, PatientStore, SqliteStore};
pub use transport::{LogTransport, MemoryTransport, Transport, TwilioTransport};
