//! Parsing of human-entered times of day ("7am", "8:30 pm", "21:15").

use chrono::{NaiveTime, Timelike};

use crate::error::ValidationError;

/// Parse a time of day in 12- or 24-hour form.
///
/// # Errors
/// Returns [`ValidationError::InvalidTime`] if the input is not of the form
/// `H`, `HH`, `H:MM` or `HH:MM`, optionally followed by `am`/`pm`.
pub fn parse_time_of_day(input: &str) -> Result<NaiveTime, ValidationError> {
    let invalid = || ValidationError::InvalidTime(input.to_string());
    let lower = input.trim().to_lowercase();

    let (clock, period) = if let Some(rest) = lower.strip_suffix("am") {
        (rest.trim_end(), Some(false))
    } else if let Some(rest) = lower.strip_suffix("pm") {
        (rest.trim_end(), Some(true))
    } else {
        (lower.as_str(), None)
    };

    let (hour_str, minute_str) = match clock.split_once(':') {
        Some((h, m)) => (h, Some(m)),
        None => (clock, None),
    };
    if hour_str.is_empty()
        || hour_str.len() > 2
        || !hour_str.chars().all(|c| c.is_ascii_digit())
    {
        return Err(invalid());
    }
    let mut hour: u32 = hour_str.parse().map_err(|_| invalid())?;
    let minute: u32 = match minute_str {
        Some(m) if m.len() == 2 && m.chars().all(|c| c.is_ascii_digit()) => {
            m.parse().map_err(|_| invalid())?
        }
        Some(_) => return Err(invalid()),
        None => 0,
    };

    match period {
        Some(pm) => {
            if !(1..=12).contains(&hour) {
                return Err(invalid());
            }
            if pm && hour < 12 {
                hour += 12;
            }
            if !pm && hour == 12 {
                hour = 0;
            }
        }
        None if hour > 23 => return Err(invalid()),
        None => {}
    }

    NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(invalid)
}

/// Parse a wake-up time; must fall between 04:00 and 11:59.
///
/// # Errors
/// Returns an error if the input does not parse or is outside the morning.
pub fn parse_wake_time(input: &str) -> Result<NaiveTime, ValidationError> {
    let time = parse_time_of_day(input)?;
    if (4..=11).contains(&time.hour()) {
        Ok(time)
    } else {
        Err(ValidationError::TimeOutOfRange {
            input: input.to_string(),
            expected: "morning".into(),
        })
    }
}

/// Parse a bedtime; must fall between 20:00 and 03:59.
///
/// # Errors
/// Returns an error if the input does not parse or is outside the night.
pub fn parse_sleep_time(input: &str) -> Result<NaiveTime, ValidationError> {
    let time = parse_time_of_day(input)?;
    let hour = time.hour();
    if hour >= 20 || hour <= 3 {
        Ok(time)
    } else {
        Err(ValidationError::TimeOutOfRange {
            input: input.to_string(),
            expected: "night".into(),
        })
    }
}

/// Parse a comma-separated list of times, splitting good from bad entries.
pub fn parse_time_list(input: &str) -> (Vec<NaiveTime>, Vec<String>) {
    let mut valid = Vec::new();
    let mut invalid = Vec::new();
    for part in input.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match parse_time_of_day(part) {
            Ok(t) => valid.push(t),
            Err(_) => invalid.push(part.to_string()),
        }
    }
    (valid, invalid)
}
