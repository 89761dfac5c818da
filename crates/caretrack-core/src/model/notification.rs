use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Acknowledgement state of an outbound reminder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Pending,
    Taken,
    Skipped,
    Failed,
}

impl NotificationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationStatus::Pending => "pending",
            NotificationStatus::Taken => "taken",
            NotificationStatus::Skipped => "skipped",
            NotificationStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(NotificationStatus::Pending),
            "taken" => Some(NotificationStatus::Taken),
            "skipped" => Some(NotificationStatus::Skipped),
            "failed" => Some(NotificationStatus::Failed),
            _ => None,
        }
    }
}

/// One reminder message covering one or more medications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub sent_at: DateTime<Utc>,
    pub medications: Vec<String>,
    pub status: NotificationStatus,
    /// Follow-up resends so far (0..=2).
    pub resends: u8,
    #[serde(default)]
    pub error: Option<String>,
}

impl Notification {
    /// A delivered reminder awaiting the patient's reply.
    pub fn pending(sent_at: DateTime<Utc>, medications: Vec<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            sent_at,
            medications,
            status: NotificationStatus::Pending,
            resends: 0,
            error: None,
        }
    }

    /// A reminder whose delivery failed.
    pub fn failed(sent_at: DateTime<Utc>, medications: Vec<String>, error: String) -> Self {
        Self {
            status: NotificationStatus::Failed,
            error: Some(error),
            ..Self::pending(sent_at, medications)
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == NotificationStatus::Pending
    }

    pub fn covers(&self, medication: &str) -> bool {
        self.medications.iter().any(|m| m == medication)
    }
}
