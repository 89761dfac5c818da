//! SQLite-backed patient store.
//!
//! Each aggregate is spread over normalized tables:
//! - `patients` (one row, carries the `version` token)
//! - `medications`, `caregivers` (ordered by `position`)
//! - `schedule_entries`, `notifications`
//!
//! Instants are stored as RFC 3339 text in UTC, times of day as `HH:MM`
//! and string lists as JSON arrays. A save replaces all child rows inside
//! one transaction, guarded by the version check on the patient row.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, NaiveTime, Utc};
use indoc::indoc;
use rusqlite::{params, Connection, OptionalExtension, Transaction};

use super::{data_dir, PatientStore};
use crate::error::{CoreError, StoreError};
use crate::model::{
    Caregiver, EntryStatus, Medication, Notification, NotificationStatus, Patient, PatientStatus,
    ScheduleEntry,
};

const SCHEMA_VERSION: i32 = 1;

const SCHEMA_V1: &str = indoc! {"
    CREATE TABLE IF NOT EXISTS patients (
        id                    TEXT PRIMARY KEY,
        timezone              TEXT NOT NULL,
        wake_time             TEXT,
        sleep_time            TEXT,
        status                TEXT NOT NULL,
        notifications_enabled INTEGER NOT NULL DEFAULT 0,
        last_reminder_sent    TEXT,
        opt_out_at            TEXT,
        resume_nudged_at      TEXT,
        last_interaction      TEXT,
        version               INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS medications (
        patient_id        TEXT NOT NULL REFERENCES patients(id) ON DELETE CASCADE,
        position          INTEGER NOT NULL,
        name              TEXT NOT NULL,
        owner             TEXT,
        dosage            INTEGER NOT NULL,
        doses_per_day     INTEGER NOT NULL,
        instructions      TEXT NOT NULL DEFAULT '',
        initial_count     INTEGER NOT NULL,
        pill_count        INTEGER NOT NULL,
        reminders_enabled INTEGER NOT NULL DEFAULT 0,
        custom_times      TEXT NOT NULL DEFAULT '[]',
        taken_count       INTEGER NOT NULL DEFAULT 0,
        skipped_count     INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (patient_id, name)
    );

    CREATE TABLE IF NOT EXISTS schedule_entries (
        id            TEXT PRIMARY KEY,
        patient_id    TEXT NOT NULL REFERENCES patients(id) ON DELETE CASCADE,
        medication    TEXT NOT NULL,
        scheduled_at  TEXT NOT NULL,
        status        TEXT NOT NULL,
        taken_at      TEXT,
        reminder_sent INTEGER NOT NULL DEFAULT 0,
        UNIQUE (patient_id, medication, scheduled_at)
    );

    CREATE TABLE IF NOT EXISTS notifications (
        id          TEXT PRIMARY KEY,
        patient_id  TEXT NOT NULL REFERENCES patients(id) ON DELETE CASCADE,
        sent_at     TEXT NOT NULL,
        medications TEXT NOT NULL,
        status      TEXT NOT NULL,
        resends     INTEGER NOT NULL DEFAULT 0,
        error       TEXT
    );

    CREATE TABLE IF NOT EXISTS caregivers (
        patient_id            TEXT NOT NULL REFERENCES patients(id) ON DELETE CASCADE,
        position              INTEGER NOT NULL,
        phone                 TEXT NOT NULL,
        name                  TEXT NOT NULL,
        persons               TEXT NOT NULL,
        notifications_enabled INTEGER NOT NULL DEFAULT 1,
        PRIMARY KEY (patient_id, phone)
    );

    CREATE INDEX IF NOT EXISTS idx_entries_patient_time ON schedule_entries(patient_id, scheduled_at);
    CREATE INDEX IF NOT EXISTS idx_notifications_patient_status ON notifications(patient_id, status);
"};

/// Patient store over a single SQLite connection.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open `caretrack.db` in the data directory.
    ///
    /// # Errors
    /// Returns an error if the data directory or database cannot be opened.
    pub fn open() -> Result<Self, CoreError> {
        let path = data_dir()?.join("caretrack.db");
        Ok(Self::open_path(path)?)
    }

    /// Open (or create) a database file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or migrated.
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path).map_err(|source| StoreError::OpenFailed {
            path: path.clone(),
            source,
        })?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Self::init(conn, Some(path))
    }

    /// Open an in-memory database.
    ///
    /// # Errors
    /// Returns an error if the schema cannot be created.
    pub fn open_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// Database file, `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::QueryFailed("connection mutex poisoned".into()))
    }
}

fn migrate(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY);")?;
    let current: i32 = conn
        .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
            row.get::<_, Option<i32>>(0)
        })?
        .unwrap_or(0);
    if current < 1 {
        conn.execute_batch(SCHEMA_V1)?;
        conn.execute("DELETE FROM schema_version", [])?;
        conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [SCHEMA_VERSION])?;
        tracing::debug!(version = SCHEMA_VERSION, "database schema created");
    }
    Ok(())
}

// --- encoding helpers -------------------------------------------------------

fn instant(value: DateTime<Utc>) -> String {
    value.to_rfc3339()
}

fn opt_instant(value: Option<DateTime<Utc>>) -> Option<String> {
    value.map(instant)
}

fn time_of_day(value: NaiveTime) -> String {
    value.format("%H:%M").to_string()
}

fn corrupt(table: &str, message: impl Into<String>) -> StoreError {
    StoreError::Corrupt {
        table: table.to_string(),
        message: message.into(),
    }
}

fn parse_instant(table: &str, value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| corrupt(table, format!("bad instant '{value}': {e}")))
}

fn parse_opt_instant(table: &str, value: Option<String>) -> Result<Option<DateTime<Utc>>, StoreError> {
    value.as_deref().map(|v| parse_instant(table, v)).transpose()
}

fn parse_time_of_day(table: &str, value: &str) -> Result<NaiveTime, StoreError> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .map_err(|e| corrupt(table, format!("bad time '{value}': {e}")))
}

fn json_list(values: &[String]) -> Result<String, StoreError> {
    serde_json::to_string(values).map_err(|e| StoreError::QueryFailed(e.to_string()))
}

fn parse_json_list(table: &str, value: &str) -> Result<Vec<String>, StoreError> {
    serde_json::from_str(value).map_err(|e| corrupt(table, format!("bad list '{value}': {e}")))
}

// --- row writers ------------------------------------------------------------

fn write_children(tx: &Transaction<'_>, patient: &Patient) -> Result<(), StoreError> {
    for table in ["medications", "schedule_entries", "notifications", "caregivers"] {
        tx.execute(&format!("DELETE FROM {table} WHERE patient_id = ?1"), [&patient.id])?;
    }

    {
        let mut stmt = tx.prepare(
            "INSERT INTO medications (patient_id, position, name, owner, dosage, doses_per_day,
                 instructions, initial_count, pill_count, reminders_enabled, custom_times,
                 taken_count, skipped_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        )?;
        for (position, med) in patient.medications.iter().enumerate() {
            let times: Vec<String> = med.custom_times.iter().map(|t| time_of_day(*t)).collect();
            stmt.execute(params![
                patient.id,
                position as i64,
                med.name,
                med.owner,
                med.dosage,
                med.doses_per_day,
                med.instructions,
                med.initial_count,
                med.pill_count,
                med.reminders_enabled,
                json_list(&times)?,
                med.taken_count,
                med.skipped_count,
            ])?;
        }
    }

    {
        let mut stmt = tx.prepare(
            "INSERT INTO schedule_entries (id, patient_id, medication, scheduled_at, status,
                 taken_at, reminder_sent)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;
        for entry in &patient.schedule {
            stmt.execute(params![
                entry.id,
                patient.id,
                entry.medication,
                instant(entry.scheduled_at),
                entry.status.as_str(),
                opt_instant(entry.taken_at),
                entry.reminder_sent,
            ])?;
        }
    }

    {
        let mut stmt = tx.prepare(
            "INSERT INTO notifications (id, patient_id, sent_at, medications, status, resends, error)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;
        for n in &patient.notifications {
            stmt.execute(params![
                n.id,
                patient.id,
                instant(n.sent_at),
                json_list(&n.medications)?,
                n.status.as_str(),
                n.resends,
                n.error,
            ])?;
        }
    }

    let mut stmt = tx.prepare(
        "INSERT INTO caregivers (patient_id, position, phone, name, persons, notifications_enabled)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    for (position, c) in patient.caregivers.iter().enumerate() {
        stmt.execute(params![
            patient.id,
            position as i64,
            c.phone,
            c.name,
            json_list(&c.persons)?,
            c.notifications_enabled,
        ])?;
    }
    Ok(())
}

// --- row readers ------------------------------------------------------------

struct PatientRow {
    timezone: String,
    wake_time: Option<String>,
    sleep_time: Option<String>,
    status: String,
    notifications_enabled: bool,
    last_reminder_sent: Option<String>,
    opt_out_at: Option<String>,
    resume_nudged_at: Option<String>,
    last_interaction: Option<String>,
    version: i64,
}

fn read_medications(conn: &Connection, id: &str) -> Result<Vec<Medication>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT name, owner, dosage, doses_per_day, instructions, initial_count, pill_count,
                reminders_enabled, custom_times, taken_count, skipped_count
         FROM medications WHERE patient_id = ?1 ORDER BY position",
    )?;
    let rows = stmt.query_map([id], |row| {
        Ok((
            Medication {
                name: row.get(0)?,
                owner: row.get(1)?,
                dosage: row.get(2)?,
                doses_per_day: row.get(3)?,
                instructions: row.get(4)?,
                initial_count: row.get(5)?,
                pill_count: row.get(6)?,
                reminders_enabled: row.get(7)?,
                custom_times: Vec::new(),
                taken_count: row.get(9)?,
                skipped_count: row.get(10)?,
            },
            row.get::<_, String>(8)?,
        ))
    })?;

    let mut medications = Vec::new();
    for row in rows {
        let (mut med, times) = row?;
        med.custom_times = parse_json_list("medications", &times)?
            .iter()
            .map(|t| parse_time_of_day("medications", t))
            .collect::<Result<_, _>>()?;
        medications.push(med);
    }
    Ok(medications)
}

fn read_schedule(conn: &Connection, id: &str) -> Result<Vec<ScheduleEntry>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, medication, scheduled_at, status, taken_at, reminder_sent
         FROM schedule_entries WHERE patient_id = ?1 ORDER BY scheduled_at, medication",
    )?;
    let rows = stmt.query_map([id], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, Option<String>>(4)?,
            row.get::<_, bool>(5)?,
        ))
    })?;

    let mut schedule = Vec::new();
    for row in rows {
        let (entry_id, medication, scheduled_at, status, taken_at, reminder_sent) = row?;
        schedule.push(ScheduleEntry {
            id: entry_id,
            medication,
            scheduled_at: parse_instant("schedule_entries", &scheduled_at)?,
            status: EntryStatus::parse(&status)
                .ok_or_else(|| corrupt("schedule_entries", format!("unknown status '{status}'")))?,
            taken_at: parse_opt_instant("schedule_entries", taken_at)?,
            reminder_sent,
        });
    }
    Ok(schedule)
}

fn read_notifications(conn: &Connection, id: &str) -> Result<Vec<Notification>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, sent_at, medications, status, resends, error
         FROM notifications WHERE patient_id = ?1 ORDER BY sent_at",
    )?;
    let rows = stmt.query_map([id], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, u8>(4)?,
            row.get::<_, Option<String>>(5)?,
        ))
    })?;

    let mut notifications = Vec::new();
    for row in rows {
        let (nid, sent_at, medications, status, resends, error) = row?;
        notifications.push(Notification {
            id: nid,
            sent_at: parse_instant("notifications", &sent_at)?,
            medications: parse_json_list("notifications", &medications)?,
            status: NotificationStatus::parse(&status)
                .ok_or_else(|| corrupt("notifications", format!("unknown status '{status}'")))?,
            resends,
            error,
        });
    }
    Ok(notifications)
}

fn read_caregivers(conn: &Connection, id: &str) -> Result<Vec<Caregiver>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT name, phone, persons, notifications_enabled
         FROM caregivers WHERE patient_id = ?1 ORDER BY position",
    )?;
    let rows = stmt.query_map([id], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, bool>(3)?,
        ))
    })?;

    let mut caregivers = Vec::new();
    for row in rows {
        let (name, phone, persons, notifications_enabled) = row?;
        caregivers.push(Caregiver {
            name,
            phone,
            persons: parse_json_list("caregivers", &persons)?,
            notifications_enabled,
        });
    }
    Ok(caregivers)
}

impl PatientStore for SqliteStore {
    fn list_ids(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT id FROM patients ORDER BY id")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    fn load(&self, id: &str) -> Result<Patient, StoreError> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT timezone, wake_time, sleep_time, status, notifications_enabled,
                        last_reminder_sent, opt_out_at, resume_nudged_at, last_interaction, version
                 FROM patients WHERE id = ?1",
                [id],
                |row| {
                    Ok(PatientRow {
                        timezone: row.get(0)?,
                        wake_time: row.get(1)?,
                        sleep_time: row.get(2)?,
                        status: row.get(3)?,
                        notifications_enabled: row.get(4)?,
                        last_reminder_sent: row.get(5)?,
                        opt_out_at: row.get(6)?,
                        resume_nudged_at: row.get(7)?,
                        last_interaction: row.get(8)?,
                        version: row.get(9)?,
                    })
                },
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        Ok(Patient {
            id: id.to_string(),
            timezone: row.timezone,
            wake_time: row
                .wake_time
                .as_deref()
                .map(|t| parse_time_of_day("patients", t))
                .transpose()?,
            sleep_time: row
                .sleep_time
                .as_deref()
                .map(|t| parse_time_of_day("patients", t))
                .transpose()?,
            status: PatientStatus::parse(&row.status)
                .ok_or_else(|| corrupt("patients", format!("unknown status '{}'", row.status)))?,
            notifications_enabled: row.notifications_enabled,
            medications: read_medications(&conn, id)?,
            schedule: read_schedule(&conn, id)?,
            notifications: read_notifications(&conn, id)?,
            caregivers: read_caregivers(&conn, id)?,
            last_reminder_sent: parse_opt_instant("patients", row.last_reminder_sent)?,
            opt_out_at: parse_opt_instant("patients", row.opt_out_at)?,
            resume_nudged_at: parse_opt_instant("patients", row.resume_nudged_at)?,
            last_interaction: parse_opt_instant("patients", row.last_interaction)?,
            version: row.version,
        })
    }

    fn create(&self, patient: &mut Patient) -> Result<(), StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM patients WHERE id = ?1)",
            [&patient.id],
            |row| row.get(0),
        )?;
        if exists {
            return Err(StoreError::AlreadyExists(patient.id.clone()));
        }
        tx.execute(
            "INSERT INTO patients (id, timezone, wake_time, sleep_time, status, notifications_enabled,
                 last_reminder_sent, opt_out_at, resume_nudged_at, last_interaction, version)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 0)",
            params![
                patient.id,
                patient.timezone,
                patient.wake_time.map(time_of_day),
                patient.sleep_time.map(time_of_day),
                patient.status.as_str(),
                patient.notifications_enabled,
                opt_instant(patient.last_reminder_sent),
                opt_instant(patient.opt_out_at),
                opt_instant(patient.resume_nudged_at),
                opt_instant(patient.last_interaction),
            ],
        )?;
        write_children(&tx, patient)?;
        tx.commit()?;
        patient.version = 0;
        tracing::debug!(patient = %patient.id, "patient created");
        Ok(())
    }

    fn save(&self, patient: &mut Patient) -> Result<(), StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let updated = tx.execute(
            "UPDATE patients
             SET timezone = ?2, wake_time = ?3, sleep_time = ?4, status = ?5,
                 notifications_enabled = ?6, last_reminder_sent = ?7, opt_out_at = ?8,
                 resume_nudged_at = ?9, last_interaction = ?10, version = version + 1
             WHERE id = ?1 AND version = ?11",
            params![
                patient.id,
                patient.timezone,
                patient.wake_time.map(time_of_day),
                patient.sleep_time.map(time_of_day),
                patient.status.as_str(),
                patient.notifications_enabled,
                opt_instant(patient.last_reminder_sent),
                opt_instant(patient.opt_out_at),
                opt_instant(patient.resume_nudged_at),
                opt_instant(patient.last_interaction),
                patient.version,
            ],
        )?;
        if updated == 0 {
            let exists: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM patients WHERE id = ?1)",
                [&patient.id],
                |row| row.get(0),
            )?;
            return Err(if exists {
                StoreError::StaleVersion {
                    id: patient.id.clone(),
                    expected: patient.version,
                }
            } else {
                StoreError::NotFound(patient.id.clone())
            });
        }
        write_children(&tx, patient)?;
        tx.commit()?;
        patient.version += 1;
        Ok(())
    }
}
