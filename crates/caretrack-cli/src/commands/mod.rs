pub mod caregiver;
pub mod config;
pub mod job;
pub mod medication;
pub mod patient;
pub mod schedule;
pub mod serve;
