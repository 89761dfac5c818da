use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Highest accepted doses-per-day value.
pub const MAX_DOSES_PER_DAY: u8 = 10;

/// A prescription owned by a patient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Medication {
    pub name: String,
    /// Person this prescription belongs to. `None` means the patient.
    #[serde(default)]
    pub owner: Option<String>,
    /// Pills per dose.
    pub dosage: u32,
    pub doses_per_day: u8,
    #[serde(default)]
    pub instructions: String,
    pub initial_count: u32,
    /// Remaining pills.
    pub pill_count: u32,
    #[serde(default)]
    pub reminders_enabled: bool,
    /// Overrides the computed dose times when non-empty.
    #[serde(default)]
    pub custom_times: Vec<NaiveTime>,
    /// Cumulative pills taken.
    #[serde(default)]
    pub taken_count: u32,
    /// Cumulative doses skipped.
    #[serde(default)]
    pub skipped_count: u32,
}

impl Medication {
    /// Create a medication with a full supply and reminders disabled.
    ///
    /// # Errors
    /// Returns an error if the name is blank, `dosage` or `initial_count`
    /// is zero, or `doses_per_day` is outside 1..=10.
    pub fn new(
        name: impl Into<String>,
        dosage: u32,
        doses_per_day: u8,
        initial_count: u32,
    ) -> Result<Self, ValidationError> {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(ValidationError::InvalidValue {
                field: "name".into(),
                message: "medication name is empty".into(),
            });
        }
        if dosage == 0 {
            return Err(ValidationError::OutOfRange {
                field: "dosage".into(),
                min: 1,
                max: i64::from(u32::MAX),
                value: 0,
            });
        }
        if !(1..=MAX_DOSES_PER_DAY).contains(&doses_per_day) {
            return Err(ValidationError::OutOfRange {
                field: "doses_per_day".into(),
                min: 1,
                max: i64::from(MAX_DOSES_PER_DAY),
                value: i64::from(doses_per_day),
            });
        }
        if initial_count == 0 {
            return Err(ValidationError::OutOfRange {
                field: "initial_count".into(),
                min: 1,
                max: i64::from(u32::MAX),
                value: 0,
            });
        }
        Ok(Self {
            name,
            owner: None,
            dosage,
            doses_per_day,
            instructions: String::new(),
            initial_count,
            pill_count: initial_count,
            reminders_enabled: false,
            custom_times: Vec::new(),
            taken_count: 0,
            skipped_count: 0,
        })
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        let owner = owner.into();
        self.owner = if owner.trim().is_empty() {
            None
        } else {
            Some(owner)
        };
        self
    }

    pub fn with_pill_count(mut self, pill_count: u32) -> Self {
        self.pill_count = pill_count;
        self
    }

    pub fn with_reminders(mut self, enabled: bool) -> Self {
        self.reminders_enabled = enabled;
        self
    }

    /// Record a taken dose. The remaining count never goes below zero.
    pub fn record_taken(&mut self) {
        self.pill_count = self.pill_count.saturating_sub(self.dosage);
        self.taken_count += self.dosage;
    }

    pub fn record_skipped(&mut self) {
        self.skipped_count += 1;
    }
}
