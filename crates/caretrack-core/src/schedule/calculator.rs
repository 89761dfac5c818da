//! Daily dose-time calculation.
//!
//! Turns a patient's waking window, a medication's frequency and its
//! instruction hints into dose slots (time of day + dosage). Pure: no
//! clock, no time zone, no dates.
//!
//! ## Spacing rules
//!
//! - 1 dose: before-bed → sleep − 1h, breakfast → wake + 1h,
//!   meal → window midpoint, otherwise wake + 1h
//! - 2 doses: (wake + 1h, sleep − 1h), shifted around meals for
//!   before/after-meal hints
//! - 3+ doses: evenly spaced across the (possibly narrowed) window,
//!   with the first/last dose pinned to the breakfast/bedtime anchor

use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use super::instructions::{InstructionHint, InstructionProfile};
use crate::model::{Medication, MAX_DOSES_PER_DAY};

const MINUTES_PER_DAY: i64 = 24 * 60;
const HOUR: i64 = 60;

/// One daily dose: when, and how many pills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoseSlot {
    pub time: NaiveTime,
    pub dosage: u32,
}

fn minutes_of(time: NaiveTime) -> i64 {
    i64::from(time.hour()) * HOUR + i64::from(time.minute())
}

/// Wrap a minute offset into a time of day.
fn time_of(minutes: i64) -> NaiveTime {
    let m = minutes.rem_euclid(MINUTES_PER_DAY);
    // rem_euclid keeps m in 0..1440, so this always succeeds
    NaiveTime::from_hms_opt((m / HOUR) as u32, (m % HOUR) as u32, 0).unwrap_or(NaiveTime::MIN)
}

/// Compute the daily dose slots for one medication.
///
/// `frequency` is clamped to 1..=10. A sleep time at or before the wake
/// time is taken to be on the following day. Slots come back in the order
/// they occur after waking.
pub fn compute_dose_times(
    wake: NaiveTime,
    sleep: NaiveTime,
    profile: &InstructionProfile,
    frequency: u8,
    dosage: u32,
) -> Vec<DoseSlot> {
    let frequency = frequency.clamp(1, MAX_DOSES_PER_DAY);
    let wake_min = minutes_of(wake);
    let mut sleep_min = minutes_of(sleep);
    if sleep_min <= wake_min {
        sleep_min += MINUTES_PER_DAY;
    }

    let mut offsets = match frequency {
        1 => vec![single_dose(wake_min, sleep_min, profile)],
        2 => twice_daily(wake_min, sleep_min, profile).to_vec(),
        n => spread(wake_min, sleep_min, profile, n),
    };
    offsets.sort_unstable();

    offsets
        .into_iter()
        .map(|m| DoseSlot {
            time: time_of(m),
            dosage,
        })
        .collect()
}

fn single_dose(wake: i64, sleep: i64, profile: &InstructionProfile) -> i64 {
    if profile.has(InstructionHint::BeforeBed) {
        sleep - HOUR
    } else if profile.has(InstructionHint::Breakfast) {
        wake + HOUR
    } else if profile.mentions_meal() {
        wake + (sleep - wake) / 2
    } else {
        wake + HOUR
    }
}

fn twice_daily(wake: i64, sleep: i64, profile: &InstructionProfile) -> [i64; 2] {
    let bedtime_pair = [wake + HOUR, sleep - HOUR];
    match profile.primary() {
        Some(InstructionHint::AfterMeal) => [wake + HOUR, sleep - 2 * HOUR],
        Some(InstructionHint::BeforeMeal) => [wake + HOUR / 2, sleep - 3 * HOUR],
        // before-bed, breakfast, dinner and no hint share the default pair
        _ => bedtime_pair,
    }
}

fn spread(wake: i64, sleep: i64, profile: &InstructionProfile, frequency: u8) -> Vec<i64> {
    let breakfast = profile.has(InstructionHint::Breakfast);
    let bedtime = profile.has(InstructionHint::BeforeBed);

    let mut start = if breakfast { wake + HOUR } else { wake };
    let mut end = if bedtime { sleep - HOUR } else { sleep };
    if end <= start {
        start = wake;
        end = wake + HOUR * i64::from(frequency);
    }

    let steps = i64::from(frequency) - 1;
    let span = end - start;
    let mut points: Vec<i64> = (0..=steps)
        .map(|i| start + ((i * span) as f64 / steps as f64).round() as i64)
        .collect();

    if breakfast {
        points[0] = wake + HOUR;
    }
    if bedtime {
        if let Some(last) = points.last_mut() {
            *last = sleep - HOUR;
        }
    }
    points
}

/// Dose slots for a medication, honouring custom times when set.
pub fn slots_for(wake: NaiveTime, sleep: NaiveTime, medication: &Medication) -> Vec<DoseSlot> {
    if !medication.custom_times.is_empty() {
        let mut times = medication.custom_times.clone();
        times.sort_unstable();
        times.dedup();
        return times
            .into_iter()
            .map(|time| DoseSlot {
                time,
                dosage: medication.dosage,
            })
            .collect();
    }
    compute_dose_times(
        wake,
        sleep,
        &InstructionProfile::classify(&medication.instructions),
        medication.doses_per_day,
        medication.dosage,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn times(slots: &[DoseSlot]) -> Vec<NaiveTime> {
        slots.iter().map(|s| s.time).collect()
    }

    fn profile(text: &str) -> InstructionProfile {
        InstructionProfile::classify(text)
    }

    #[test]
    fn once_daily_defaults_to_hour_after_wake() {
        let slots = compute_dose_times(t(7, 0), t(22, 0), &profile(""), 1, 1);
        assert_eq!(times(&slots), vec![t(8, 0)]);
    }

    #[test]
    fn once_daily_before_bed() {
        let slots = compute_dose_times(t(7, 0), t(22, 30), &profile("Take before bed"), 1, 2);
        assert_eq!(times(&slots), vec![t(21, 30)]);
        assert_eq!(slots[0].dosage, 2);
    }

    #[test]
    fn once_daily_with_meal_uses_midpoint() {
        let slots = compute_dose_times(t(7, 0), t(23, 0), &profile("after food"), 1, 1);
        assert_eq!(times(&slots), vec![t(15, 0)]);
    }

    #[test]
    fn once_daily_breakfast_beats_meal() {
        let slots = compute_dose_times(t(6, 30), t(22, 0), &profile("with breakfast, before food"), 1, 1);
        assert_eq!(times(&slots), vec![t(7, 30)]);
    }

    #[test]
    fn twice_daily_default_pair() {
        let slots = compute_dose_times(t(7, 0), t(22, 0), &profile(""), 2, 1);
        assert_eq!(times(&slots), vec![t(8, 0), t(21, 0)]);
        let slots = compute_dose_times(t(7, 0), t(22, 0), &profile("with dinner"), 2, 1);
        assert_eq!(times(&slots), vec![t(8, 0), t(21, 0)]);
    }

    #[test]
    fn twice_daily_around_meals() {
        let after = compute_dose_times(t(7, 0), t(22, 0), &profile("after meals"), 2, 1);
        assert_eq!(times(&after), vec![t(8, 0), t(20, 0)]);
        let before = compute_dose_times(t(7, 0), t(22, 0), &profile("before meals"), 2, 1);
        assert_eq!(times(&before), vec![t(7, 30), t(19, 0)]);
    }

    #[test]
    fn three_doses_spread_across_window() {
        let slots = compute_dose_times(t(7, 0), t(23, 0), &profile(""), 3, 1);
        assert_eq!(times(&slots), vec![t(7, 0), t(15, 0), t(23, 0)]);
    }

    #[test]
    fn three_doses_pinned_to_breakfast_and_bed() {
        let slots = compute_dose_times(
            t(7, 0),
            t(23, 0),
            &profile("morning and before bed"),
            3,
            1,
        );
        assert_eq!(times(&slots), vec![t(8, 0), t(15, 0), t(22, 0)]);
    }

    #[test]
    fn inverted_window_falls_back_to_hourly_from_wake() {
        // 07:00 -> 08:30 with both anchors leaves no room
        let slots = compute_dose_times(t(7, 0), t(8, 30), &profile("breakfast, before bed"), 4, 1);
        // fallback window 07:00..11:00, then both anchors pinned
        assert_eq!(times(&slots), vec![t(7, 30), t(8, 0), t(8, 20), t(9, 40)]);
    }

    #[test]
    fn window_past_midnight_wraps() {
        let slots = compute_dose_times(t(10, 0), t(1, 0), &profile("before bed"), 1, 1);
        assert_eq!(times(&slots), vec![t(0, 0)]);
        let slots = compute_dose_times(t(10, 0), t(1, 0), &profile(""), 2, 1);
        assert_eq!(times(&slots), vec![t(11, 0), t(0, 0)]);
    }

    #[test]
    fn rounding_to_nearest_minute() {
        let slots = compute_dose_times(t(7, 0), t(22, 0), &profile(""), 7, 1);
        // 900 minutes / 6 = 150 minute steps
        assert_eq!(slots[1].time, t(9, 30));
        let slots = compute_dose_times(t(7, 0), t(22, 1), &profile(""), 4, 1);
        // 901 / 3 = 300.33 -> 300, 600.67 -> 601
        assert_eq!(times(&slots), vec![t(7, 0), t(12, 0), t(17, 1), t(22, 1)]);
    }

    #[test]
    fn custom_times_override_computation() {
        let mut med = Medication::new("Aspirin", 2, 2, 40).unwrap();
        med.custom_times = vec![t(20, 0), t(9, 15), t(9, 15)];
        let slots = slots_for(t(7, 0), t(22, 0), &med);
        assert_eq!(times(&slots), vec![t(9, 15), t(20, 0)]);
        assert!(slots.iter().all(|s| s.dosage == 2));
    }

    fn any_time() -> impl Strategy<Value = NaiveTime> {
        (0u32..24, 0u32..60).prop_map(|(h, m)| NaiveTime::from_hms_opt(h, m, 0).unwrap())
    }

    proptest! {
        #[test]
        fn before_bed_single_dose_is_hour_before_sleep(
            wake in any_time(),
            sleep in any_time(),
            extra in "[a-z ]{0,12}",
        ) {
            let text = format!("{extra} before bed");
            let slots = compute_dose_times(wake, sleep, &profile(&text), 1, 1);
            prop_assert_eq!(slots.len(), 1);
            let expected = time_of(minutes_of(sleep) - HOUR);
            prop_assert_eq!(slots[0].time, expected);
        }

        #[test]
        fn unpinned_doses_are_ordered_within_window(
            wake_h in 4u32..12,
            wake_m in 0u32..60,
            sleep_h in 20u32..24,
            sleep_m in 0u32..60,
            frequency in 2u8..=10,
            text in prop::sample::select(vec!["", "after meals", "before food", "with dinner", "take with water"]),
        ) {
            let wake = t(wake_h, wake_m);
            let sleep = t(sleep_h, sleep_m);
            let slots = compute_dose_times(wake, sleep, &profile(text), frequency, 1);
            prop_assert_eq!(slots.len(), frequency as usize);
            for pair in slots.windows(2) {
                prop_assert!(pair[0].time <= pair[1].time);
            }
            for slot in &slots {
                prop_assert!(slot.time >= wake && slot.time <= sleep);
            }
        }

        #[test]
        fn always_one_slot_per_dose(
            wake in any_time(),
            sleep in any_time(),
            frequency in 1u8..=10,
        ) {
            let slots = compute_dose_times(wake, sleep, &profile("morning before bed"), frequency, 1);
            prop_assert_eq!(slots.len(), frequency as usize);
        }
    }
}
