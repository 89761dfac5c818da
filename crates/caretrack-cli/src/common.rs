//! Shared helpers for command handlers.

use std::collections::BTreeMap;
use std::sync::Arc;

use caretrack_core::{Config, Engine, ScheduleChange, SqliteStore};
use chrono::NaiveTime;

/// Engine over the data directory database and configured transport.
pub fn open_engine() -> Result<Engine, Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let store = SqliteStore::open()?;
    let transport = config.build_transport()?;
    Ok(Engine::new(Arc::new(store), transport, config))
}

pub fn format_time(time: NaiveTime) -> String {
    time.format("%-I:%M %p").to_string()
}

/// "Aspirin at 8:00 AM, 9:00 PM" lines.
pub fn print_summary(summary: &BTreeMap<String, Vec<NaiveTime>>) {
    if summary.is_empty() {
        println!("no upcoming doses");
        return;
    }
    for (medication, times) in summary {
        let times: Vec<String> = times.iter().map(|t| format_time(*t)).collect();
        println!("{medication} at {}", times.join(", "));
    }
}

pub fn print_change(change: &ScheduleChange) {
    println!("schedule: {} added, {} removed", change.added, change.removed);
    for medication in &change.refill_needed {
        println!("refill needed: {medication}");
    }
}
