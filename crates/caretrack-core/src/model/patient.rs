use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use super::{Medication, Notification};
use crate::error::ValidationError;

/// Lifecycle state driven by the conversation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatientStatus {
    Active,
    Paused,
    Inactive,
}

impl PatientStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PatientStatus::Active => "active",
            PatientStatus::Paused => "paused",
            PatientStatus::Inactive => "inactive",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(PatientStatus::Active),
            "paused" => Some(PatientStatus::Paused),
            "inactive" => Some(PatientStatus::Inactive),
            _ => None,
        }
    }
}

/// Outcome of a single scheduled dose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Pending,
    Taken,
    Skipped,
}

impl EntryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryStatus::Pending => "pending",
            EntryStatus::Taken => "taken",
            EntryStatus::Skipped => "skipped",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(EntryStatus::Pending),
            "taken" => Some(EntryStatus::Taken),
            "skipped" => Some(EntryStatus::Skipped),
            _ => None,
        }
    }
}

/// One dated dose of one medication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub id: String,
    pub medication: String,
    pub scheduled_at: DateTime<Utc>,
    pub status: EntryStatus,
    #[serde(default)]
    pub taken_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reminder_sent: bool,
}

impl ScheduleEntry {
    pub fn pending(medication: impl Into<String>, scheduled_at: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            medication: medication.into(),
            scheduled_at,
            status: EntryStatus::Pending,
            taken_at: None,
            reminder_sent: false,
        }
    }

    /// Identity used for de-duplication: (medication, instant).
    pub fn key(&self) -> (&str, DateTime<Utc>) {
        (self.medication.as_str(), self.scheduled_at)
    }

    pub fn is_pending(&self) -> bool {
        self.status == EntryStatus::Pending
    }
}

/// Someone to alert when doses go unacknowledged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caregiver {
    pub name: String,
    pub phone: String,
    /// Medication owners this caregiver looks after.
    pub persons: Vec<String>,
    #[serde(default)]
    pub notifications_enabled: bool,
}

impl Caregiver {
    pub fn new(name: impl Into<String>, phone: impl Into<String>, persons: Vec<String>) -> Self {
        Self {
            name: name.into(),
            phone: phone.into(),
            persons,
            notifications_enabled: true,
        }
    }

    pub fn responsible_for(&self, person: &str) -> bool {
        self.persons.iter().any(|p| p == person)
    }
}

/// Aggregate root: everything the engine knows about one patient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    /// Phone number, digits only. Also the messaging address.
    pub id: String,
    /// IANA zone name, e.g. `America/New_York`.
    pub timezone: String,
    pub wake_time: Option<NaiveTime>,
    pub sleep_time: Option<NaiveTime>,
    pub status: PatientStatus,
    pub notifications_enabled: bool,
    pub medications: Vec<Medication>,
    pub schedule: Vec<ScheduleEntry>,
    pub notifications: Vec<Notification>,
    pub caregivers: Vec<Caregiver>,
    pub last_reminder_sent: Option<DateTime<Utc>>,
    pub opt_out_at: Option<DateTime<Utc>>,
    /// Opt-out instant for which the resume nudge was already sent.
    pub resume_nudged_at: Option<DateTime<Utc>>,
    pub last_interaction: Option<DateTime<Utc>>,
    /// Optimistic concurrency token, bumped by the store on every save.
    pub version: i64,
}

fn validate_phone(value: &str, field: &str) -> Result<(), ValidationError> {
    let ok = (10..=15).contains(&value.len()) && value.chars().all(|c| c.is_ascii_digit());
    if ok {
        Ok(())
    } else {
        Err(ValidationError::InvalidValue {
            field: field.into(),
            message: format!("{value} is not a valid phone number"),
        })
    }
}

impl Patient {
    /// Register a new, inactive patient.
    ///
    /// # Errors
    /// Returns an error if the phone number is not 10-15 digits or the
    /// time zone is unknown.
    pub fn new(id: impl Into<String>, timezone: impl Into<String>) -> Result<Self, ValidationError> {
        let id = id.into().trim_start_matches('+').to_string();
        validate_phone(&id, "phone")?;
        let timezone = timezone.into();
        parse_timezone(&timezone)?;
        Ok(Self {
            id,
            timezone,
            wake_time: None,
            sleep_time: None,
            status: PatientStatus::Inactive,
            notifications_enabled: false,
            medications: Vec::new(),
            schedule: Vec::new(),
            notifications: Vec::new(),
            caregivers: Vec::new(),
            last_reminder_sent: None,
            opt_out_at: None,
            resume_nudged_at: None,
            last_interaction: None,
            version: 0,
        })
    }

    pub fn with_day(mut self, wake: NaiveTime, sleep: NaiveTime) -> Self {
        self.wake_time = Some(wake);
        self.sleep_time = Some(sleep);
        self
    }

    /// Parsed time zone.
    ///
    /// # Errors
    /// Returns an error if the stored zone name is not a known IANA zone.
    pub fn tz(&self) -> Result<Tz, ValidationError> {
        parse_timezone(&self.timezone)
    }

    /// Whether the dispatch and follow-up loops should look at this patient.
    pub fn receives_reminders(&self) -> bool {
        self.status == PatientStatus::Active && self.notifications_enabled
    }

    pub fn medication(&self, name: &str) -> Option<&Medication> {
        self.medications.iter().find(|m| m.name == name)
    }

    pub fn medication_mut(&mut self, name: &str) -> Option<&mut Medication> {
        self.medications.iter_mut().find(|m| m.name == name)
    }

    /// # Errors
    /// Returns an error if a medication with the same name exists.
    pub fn add_medication(&mut self, medication: Medication) -> Result<(), ValidationError> {
        if self.medication(&medication.name).is_some() {
            return Err(ValidationError::InvalidValue {
                field: "name".into(),
                message: format!("{} is already registered", medication.name),
            });
        }
        self.medications.push(medication);
        Ok(())
    }

    /// # Errors
    /// Returns an error if the caregiver phone number is invalid.
    pub fn add_caregiver(&mut self, caregiver: Caregiver) -> Result<(), ValidationError> {
        validate_phone(&caregiver.phone, "caregiver phone")?;
        self.caregivers.retain(|c| c.phone != caregiver.phone);
        self.caregivers.push(caregiver);
        Ok(())
    }

    /// Person a medication's escalations are routed by.
    pub fn owner_of<'a>(&'a self, medication: &'a Medication) -> &'a str {
        medication.owner.as_deref().unwrap_or(&self.id)
    }

    /// Mark active. Medications whose supply ran out start over from the
    /// initial count.
    pub fn activate(&mut self) {
        self.status = PatientStatus::Active;
        self.notifications_enabled = true;
        for med in &mut self.medications {
            if med.pill_count == 0 {
                med.pill_count = med.initial_count;
            }
        }
    }

    /// Index of the pending notification with the latest `sent_at`.
    pub fn latest_pending_notification(&self) -> Option<usize> {
        self.notifications
            .iter()
            .enumerate()
            .filter(|(_, n)| n.is_pending())
            .max_by_key(|(_, n)| n.sent_at)
            .map(|(i, _)| i)
    }

    /// Index of the pending entry a reply for `medication` settles: the
    /// earliest one a reminder went out for, else the earliest pending one.
    pub fn entry_to_settle(&self, medication: &str) -> Option<usize> {
        let earliest = |reminded_only: bool| {
            self.schedule
                .iter()
                .enumerate()
                .filter(|(_, e)| e.medication == medication && e.is_pending())
                .filter(|(_, e)| !reminded_only || e.reminder_sent)
                .min_by_key(|(_, e)| e.scheduled_at)
                .map(|(i, _)| i)
        };
        earliest(true).or_else(|| earliest(false))
    }
}

/// Parse an IANA zone name.
///
/// # Errors
/// Returns [`ValidationError::UnknownTimeZone`] for unknown names.
pub fn parse_timezone(name: &str) -> Result<Tz, ValidationError> {
    name.parse::<Tz>()
        .map_err(|_| ValidationError::UnknownTimeZone(name.to_string()))
}
