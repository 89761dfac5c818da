//! Outbound message delivery.
//!
//! Every component that talks to patients or caregivers receives a
//! [`Transport`] instead of reaching for a global client. Delivery is
//! fire-and-confirm: `Ok(())` means the provider accepted the message.

mod memory;
mod twilio;

pub use memory::{MemoryTransport, OutboundMessage};
pub use twilio::{TwilioSettings, TwilioTransport, DEFAULT_API_BASE as DEFAULT_TWILIO_API_BASE};

use crate::error::TransportError;

/// A channel that can deliver a text body to an address (phone number).
pub trait Transport: Send + Sync {
    /// Short identifier used in logs (e.g. "twilio", "log").
    fn name(&self) -> &str;

    /// Deliver `body` to `to`.
    fn send(&self, to: &str, body: &str) -> Result<(), TransportError>;
}

/// Transport that only logs. Useful for dry runs and local development.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTransport;

impl Transport for LogTransport {
    fn name(&self) -> &str {
        "log"
    }

    fn send(&self, to: &str, body: &str) -> Result<(), TransportError> {
        tracing::info!(to, body, "message (log transport)");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_transport_always_succeeds() {
        assert!(LogTransport.send("15551234567", "hello").is_ok());
        assert_eq!(LogTransport.name(), "log");
    }
}
