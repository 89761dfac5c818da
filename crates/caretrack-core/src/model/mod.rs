//! Patient aggregate and the records it owns.
//!
//! A [`Patient`] is the unit of locking and persistence: medications,
//! schedule entries, notifications and caregivers are always loaded,
//! mutated and saved together.

mod medication;
mod notification;
mod patient;

pub use medication::{Medication, MAX_DOSES_PER_DAY};
pub use notification::{Notification, NotificationStatus};
pub use patient::{parse_timezone, Caregiver, EntryStatus, Patient, PatientStatus, ScheduleEntry};
