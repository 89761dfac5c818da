//! Expansion of daily dose slots into dated schedule entries.
//!
//! The number of days is bounded by the remaining pill supply. If any of a
//! medication's doses for today has already passed, the whole of today is
//! skipped for that medication and the schedule starts tomorrow.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Days, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use super::calculator::DoseSlot;
use crate::model::ScheduleEntry;

/// Everything needed to materialize one medication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MedicationPlan {
    pub medication: String,
    /// Distinct times of day, ascending.
    pub slots: Vec<DoseSlot>,
    pub pill_count: u32,
}

impl MedicationPlan {
    /// Build a plan. Slots sharing a time are merged and their dosages added.
    pub fn new(medication: impl Into<String>, mut slots: Vec<DoseSlot>, pill_count: u32) -> Self {
        slots.sort_by_key(|s| s.time);
        let mut merged: Vec<DoseSlot> = Vec::with_capacity(slots.len());
        for slot in slots {
            match merged.last_mut() {
                Some(last) if last.time == slot.time => last.dosage += slot.dosage,
                _ => merged.push(slot),
            }
        }
        Self {
            medication: medication.into(),
            slots: merged,
            pill_count,
        }
    }

    /// Pills needed for one full day.
    pub fn daily_dosage(&self) -> u32 {
        self.slots.iter().map(|s| s.dosage).sum()
    }

    /// Whole days the remaining supply covers.
    pub fn total_days(&self) -> u32 {
        match self.daily_dosage() {
            0 => 0,
            daily => self.pill_count / daily,
        }
    }
}

/// Result of a materialization pass.
#[derive(Debug, Clone, Default)]
pub struct Materialized {
    /// Entries ordered by instant, then medication.
    pub entries: Vec<ScheduleEntry>,
    /// Medications whose supply does not cover a single day.
    pub refill_needed: Vec<String>,
}

/// Resolve a local wall-clock time on a date to an instant.
///
/// Ambiguous times (DST fall-back) take the earlier instant; times inside
/// a DST gap are moved forward by an hour.
pub fn local_instant(tz: Tz, date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    let naive = date.and_time(time);
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| {
            tz.from_local_datetime(&(naive + chrono::Duration::hours(1)))
                .earliest()
        })
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
}

/// Expand plans into dated entries, in the patient's time zone.
pub fn materialize(plans: &[MedicationPlan], tz: Tz, now: DateTime<Utc>) -> Materialized {
    let today = now.with_timezone(&tz).date_naive();
    let mut out = Materialized::default();

    for plan in plans {
        let total_days = plan.total_days();
        if total_days == 0 {
            out.refill_needed.push(plan.medication.clone());
            continue;
        }

        let passed_today = plan
            .slots
            .iter()
            .any(|slot| local_instant(tz, today, slot.time) < now);
        let first_day = if passed_today {
            today.checked_add_days(Days::new(1)).unwrap_or(today)
        } else {
            today
        };

        for offset in 0..u64::from(total_days) {
            let Some(date) = first_day.checked_add_days(Days::new(offset)) else {
                break;
            };
            // a slot pushed out of a DST gap can land on the next slot
            let mut seen = HashSet::new();
            for slot in &plan.slots {
                let at = local_instant(tz, date, slot.time);
                if seen.insert(at) {
                    out.entries.push(ScheduleEntry::pending(plan.medication.clone(), at));
                }
            }
        }
    }

    sort_entries(&mut out.entries);
    out
}

/// Replace the schedule of `affected` medications with `fresh` entries.
///
/// Kept: entries of other medications, answered entries, entries a
/// reminder already went out for, and entries identical (medication and
/// instant) to a fresh one. Fresh entries are only added where no entry
/// with the same medication and instant remains.
pub fn merge(existing: &mut Vec<ScheduleEntry>, affected: &[String], fresh: Vec<ScheduleEntry>) {
    merge_with(existing, affected, fresh, |_| false);
}

/// Like [`merge`], but also keeps pending entries at or after `now` that
/// come before the first fresh entry of their medication. Used by the
/// nightly pass, whose fresh schedule may start tomorrow while doses are
/// still due today.
pub fn merge_keeping_upcoming(
    existing: &mut Vec<ScheduleEntry>,
    affected: &[String],
    fresh: Vec<ScheduleEntry>,
    now: DateTime<Utc>,
) {
    let mut fresh_start: BTreeMap<String, DateTime<Utc>> = BTreeMap::new();
    for entry in &fresh {
        fresh_start
            .entry(entry.medication.clone())
            .and_modify(|at| *at = (*at).min(entry.scheduled_at))
            .or_insert(entry.scheduled_at);
    }
    merge_with(existing, affected, fresh, |e| {
        e.scheduled_at >= now
            && fresh_start
                .get(&e.medication)
                .map_or(true, |start| e.scheduled_at < *start)
    });
}

fn merge_with(
    existing: &mut Vec<ScheduleEntry>,
    affected: &[String],
    fresh: Vec<ScheduleEntry>,
    keep: impl Fn(&ScheduleEntry) -> bool,
) {
    let fresh_keys: HashSet<(&str, DateTime<Utc>)> = fresh.iter().map(ScheduleEntry::key).collect();

    existing.retain(|e| {
        !affected.contains(&e.medication)
            || !e.is_pending()
            || e.reminder_sent
            || fresh_keys.contains(&e.key())
            || keep(e)
    });

    let kept: HashSet<(String, DateTime<Utc>)> = existing
        .iter()
        .map(|e| (e.medication.clone(), e.scheduled_at))
        .collect();
    existing.extend(
        fresh
            .into_iter()
            .filter(|e| !kept.contains(&(e.medication.clone(), e.scheduled_at))),
    );
    sort_entries(existing);
}

fn sort_entries(entries: &mut [ScheduleEntry]) {
    entries.sort_by(|a, b| {
        a.scheduled_at
            .cmp(&b.scheduled_at)
            .then_with(|| a.medication.cmp(&b.medication))
    });
}

/// Distinct local dose times per medication, ascending.
pub fn local_times_by_medication(
    entries: &[ScheduleEntry],
    tz: Tz,
) -> BTreeMap<String, Vec<NaiveTime>> {
    let mut out: BTreeMap<String, Vec<NaiveTime>> = BTreeMap::new();
    for entry in entries {
        let local = entry.scheduled_at.with_timezone(&tz).time();
        let times = out.entry(entry.medication.clone()).or_default();
        if !times.contains(&local) {
            times.push(local);
        }
    }
    for times in out.values_mut() {
        times.sort_unstable();
    }
    out
}
