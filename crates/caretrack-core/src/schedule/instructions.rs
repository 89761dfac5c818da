//! Keyword classification of free-text dosing instructions.
//!
//! Deliberately simple: lowercase substring matching. The calculator only
//! sees the resulting [`InstructionProfile`], so this step can be replaced
//! without touching the spacing rules.

use serde::{Deserialize, Serialize};

/// A timing hint recognised in the instruction text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstructionHint {
    BeforeBed,
    Breakfast,
    AfterMeal,
    BeforeMeal,
    Dinner,
}

impl InstructionHint {
    /// Every hint, in single-dose priority order.
    pub const ALL: [InstructionHint; 5] = [
        InstructionHint::BeforeBed,
        InstructionHint::Breakfast,
        InstructionHint::AfterMeal,
        InstructionHint::BeforeMeal,
        InstructionHint::Dinner,
    ];

    fn keywords(self) -> &'static [&'static str] {
        match self {
            InstructionHint::BeforeBed => &["before bed", "sleep"],
            InstructionHint::Breakfast => &["breakfast", "morning"],
            InstructionHint::AfterMeal => &["after meal", "after food"],
            InstructionHint::BeforeMeal => &["before meal", "before food"],
            InstructionHint::Dinner => &["dinner"],
        }
    }
}

/// Set of hints found in one instruction string. Empty means no hint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstructionProfile {
    bits: u8,
}

impl InstructionProfile {
    pub fn none() -> Self {
        Self::default()
    }

    /// Scan `text` case-insensitively for every keyword class.
    pub fn classify(text: &str) -> Self {
        let lower = text.to_lowercase();
        InstructionHint::ALL
            .iter()
            .filter(|hint| hint.keywords().iter().any(|k| lower.contains(k)))
            .fold(Self::none(), |profile, hint| profile.with(*hint))
    }

    pub fn with(mut self, hint: InstructionHint) -> Self {
        self.bits |= 1 << hint as u8;
        self
    }

    pub fn has(&self, hint: InstructionHint) -> bool {
        self.bits & (1 << hint as u8) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    /// Either meal hint, with no specific meal named.
    pub fn mentions_meal(&self) -> bool {
        self.has(InstructionHint::AfterMeal) || self.has(InstructionHint::BeforeMeal)
    }

    /// Highest-priority hint present.
    pub fn primary(&self) -> Option<InstructionHint> {
        InstructionHint::ALL.into_iter().find(|h| self.has(*h))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_case_insensitively() {
        let p = InstructionProfile::classify("Take BEFORE BED with water");
        assert!(p.has(InstructionHint::BeforeBed));
        assert_eq!(p.primary(), Some(InstructionHint::BeforeBed));
    }

    #[test]
    fn sleep_counts_as_before_bed() {
        assert!(InstructionProfile::classify("may cause sleepiness").has(InstructionHint::BeforeBed));
    }

    #[test]
    fn multiple_hints_are_kept() {
        let p = InstructionProfile::classify("one in the morning, one before bed");
        assert!(p.has(InstructionHint::Breakfast));
        assert!(p.has(InstructionHint::BeforeBed));
        assert!(!p.has(InstructionHint::Dinner));
    }

    #[test]
    fn meal_hints() {
        assert!(InstructionProfile::classify("take after food").mentions_meal());
        assert!(InstructionProfile::classify("Before meals").mentions_meal());
        assert!(!InstructionProfile::classify("with dinner").mentions_meal());
        assert!(InstructionProfile::classify("with dinner").has(InstructionHint::Dinner));
    }

    #[test]
    fn empty_text_has_no_hint() {
        let p = InstructionProfile::classify("");
        assert!(p.is_empty());
        assert_eq!(p.primary(), None);
    }
}
