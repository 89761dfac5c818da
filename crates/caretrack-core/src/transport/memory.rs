use std::collections::HashSet;
use std::sync::Mutex;

use super::Transport;
use crate::error::TransportError;

/// A message accepted by [`MemoryTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub to: String,
    pub body: String,
}

/// In-process transport that records every message.
///
/// Addresses can be marked as failing to exercise delivery-error paths.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    sent: Mutex<Vec<OutboundMessage>>,
    failing: Mutex<HashSet<String>>,
    fail_all: Mutex<bool>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every message to `to` from now on.
    pub fn fail_for(&self, to: &str) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.insert(to.to_string());
        }
    }

    /// Reject (or stop rejecting) every message.
    pub fn set_fail_all(&self, fail: bool) {
        if let Ok(mut flag) = self.fail_all.lock() {
            *flag = fail;
        }
    }

    /// Accepted messages, oldest first.
    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Accepted messages to one address.
    pub fn sent_to(&self, to: &str) -> Vec<OutboundMessage> {
        self.sent().into_iter().filter(|m| m.to == to).collect()
    }

    pub fn clear(&self) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.clear();
        }
    }
}

impl Transport for MemoryTransport {
    fn name(&self) -> &str {
        "memory"
    }

    fn send(&self, to: &str, body: &str) -> Result<(), TransportError> {
        let fail_all = self.fail_all.lock().map(|f| *f).unwrap_or(false);
        let failing = self
            .failing
            .lock()
            .map(|f| f.contains(to))
            .unwrap_or(false);
        if fail_all || failing {
            return Err(TransportError::Rejected {
                to: to.to_string(),
                status: 400,
                message: "rejected by memory transport".into(),
            });
        }
        let mut sent = self
            .sent
            .lock()
            .map_err(|_| TransportError::Unreachable("memory transport poisoned".into()))?;
        sent.push(OutboundMessage {
            to: to.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}
