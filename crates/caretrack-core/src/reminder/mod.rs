//! Reminder delivery, follow-up, escalation and reply handling.

pub mod dispatch;
pub mod escalation;
pub mod followup;
pub mod message;
pub mod response;

pub use dispatch::{DebouncePolicy, DispatchConfig, DispatchOutcome, Dispatcher};
pub use escalation::{CaregiverEscalator, EscalationReport, Escalator};
pub use followup::{FollowUp, FollowUpAction, FollowUpConfig, FollowUpReport};
pub use response::{record_response, Response, ResponseOutcome};
