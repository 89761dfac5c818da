//! TOML-based engine configuration.
//!
//! Sections:
//! - `dispatch`: tolerance window and debounce policy
//! - `follow_up`: resend and escalation thresholds
//! - `jobs`: tick interval and daily job hours
//! - `transport`: log or Twilio delivery
//! - `logging`: default tracing filter
//!
//! Stored at `<data dir>/config.toml`. Twilio credentials may instead come
//! from `TWILIO_ACCOUNT_SID`, `TWILIO_AUTH_TOKEN` and `TWILIO_PHONE_NUMBER`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use super::{data_dir, data_dir_path};
use crate::error::ConfigError;
use crate::reminder::{DebouncePolicy, DispatchConfig, FollowUpConfig};
use crate::transport::{LogTransport, Transport, TwilioSettings, TwilioTransport};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchSection {
    #[serde(default = "default_tolerance")]
    pub tolerance_minutes: u32,
    #[serde(default = "default_min_gap")]
    pub min_gap_minutes: u32,
    #[serde(default)]
    pub debounce: DebouncePolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FollowUpSection {
    #[serde(default = "default_first_resend")]
    pub first_resend_minutes: u32,
    #[serde(default = "default_second_resend")]
    pub second_resend_minutes: u32,
    #[serde(default = "default_escalate")]
    pub escalate_minutes: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobsSection {
    /// Dispatch and follow-up cadence.
    #[serde(default = "default_tick_seconds")]
    pub tick_seconds: u64,
    /// UTC hour of the nightly materialize pass.
    #[serde(default = "default_materialize_hour")]
    pub materialize_hour: u32,
    /// UTC hour of the daily resume-nudge pass.
    #[serde(default = "default_resume_nudge_hour")]
    pub resume_nudge_hour: u32,
    #[serde(default = "default_resume_nudge_after_days")]
    pub resume_nudge_after_days: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Log,
    Twilio,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportSection {
    #[serde(default)]
    pub kind: TransportKind,
    #[serde(default)]
    pub account_sid: String,
    #[serde(default)]
    pub auth_token: String,
    #[serde(default)]
    pub from_number: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSection {
    /// `tracing_subscriber::EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "default_filter")]
    pub filter: String,
}

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub dispatch: DispatchSection,
    #[serde(default)]
    pub follow_up: FollowUpSection,
    #[serde(default)]
    pub jobs: JobsSection,
    #[serde(default)]
    pub transport: TransportSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

fn default_tolerance() -> u32 {
    10
}
fn default_min_gap() -> u32 {
    15
}
fn default_first_resend() -> u32 {
    20
}
fn default_second_resend() -> u32 {
    30
}
fn default_escalate() -> u32 {
    40
}
fn default_tick_seconds() -> u64 {
    60
}
fn default_materialize_hour() -> u32 {
    0
}
fn default_resume_nudge_hour() -> u32 {
    10
}
fn default_resume_nudge_after_days() -> u32 {
    7
}
fn default_api_base() -> String {
    crate::transport::DEFAULT_TWILIO_API_BASE.into()
}
fn default_filter() -> String {
    "caretrack=info".into()
}

impl Default for DispatchSection {
    fn default() -> Self {
        Self {
            tolerance_minutes: default_tolerance(),
            min_gap_minutes: default_min_gap(),
            debounce: DebouncePolicy::default(),
        }
    }
}

impl Default for FollowUpSection {
    fn default() -> Self {
        Self {
            first_resend_minutes: default_first_resend(),
            second_resend_minutes: default_second_resend(),
            escalate_minutes: default_escalate(),
        }
    }
}

impl Default for JobsSection {
    fn default() -> Self {
        Self {
            tick_seconds: default_tick_seconds(),
            materialize_hour: default_materialize_hour(),
            resume_nudge_hour: default_resume_nudge_hour(),
            resume_nudge_after_days: default_resume_nudge_after_days(),
        }
    }
}

impl Default for TransportSection {
    fn default() -> Self {
        Self {
            kind: TransportKind::Log,
            account_sid: String::new(),
            auth_token: String::new(),
            from_number: String::new(),
            api_base: default_api_base(),
        }
    }
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            filter: default_filter(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dispatch: DispatchSection::default(),
            follow_up: FollowUpSection::default(),
            jobs: JobsSection::default(),
            transport: TransportSection::default(),
            logging: LoggingSection::default(),
        }
    }
}

fn invalid(key: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.into(),
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }
        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let mut parts = key.split('.').peekable();
        if key.is_empty() {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            if parts.peek().is_some() {
                current = current.get_mut(part).ok_or_else(unknown)?;
                continue;
            }
            let obj = current.as_object_mut().ok_or_else(unknown)?;
            let existing = obj.get(part).ok_or_else(unknown)?;
            let new_value = match existing {
                serde_json::Value::Bool(_) => serde_json::Value::Bool(
                    value
                        .parse::<bool>()
                        .map_err(|_| invalid(key, format!("'{value}' is not true/false")))?,
                ),
                serde_json::Value::Number(_) => serde_json::Value::Number(
                    value
                        .parse::<u64>()
                        .map_err(|_| invalid(key, format!("'{value}' is not a whole number")))?
                        .into(),
                ),
                serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                    return Err(invalid(key, "is a section, not a value"))
                }
                _ => serde_json::Value::String(value.into()),
            };
            obj.insert(part.to_string(), new_value);
            return Ok(());
        }
        Err(unknown())
    }

    /// Default location in the data directory.
    ///
    /// # Errors
    /// Returns an error if the data directory cannot be created.
    pub fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from the data directory, writing defaults on first use.
    ///
    /// # Errors
    /// Returns an error if the file exists but is invalid, or if the
    /// default file cannot be written.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    /// Load from `path`, writing defaults if the file does not exist.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed, fails
    /// validation, or the default file cannot be written.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let load_failed = |message: String| ConfigError::LoadFailed {
            path: path.to_path_buf(),
            message,
        };
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let mut cfg: Config = toml::from_str(&content).map_err(|e| load_failed(e.to_string()))?;
                cfg.apply_env();
                cfg.validate()?;
                Ok(cfg)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let mut cfg = Self::default();
                cfg.save_to(path)?;
                cfg.apply_env();
                Ok(cfg)
            }
            Err(e) => Err(load_failed(e.to_string())),
        }
    }

    /// Persist to the data directory.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    /// # Errors
    /// Returns an error if the config cannot be serialized or written.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))
    }

    /// Twilio credentials from the environment override the file.
    pub fn apply_env(&mut self) {
        let vars = [
            ("TWILIO_ACCOUNT_SID", &mut self.transport.account_sid),
            ("TWILIO_AUTH_TOKEN", &mut self.transport.auth_token),
            ("TWILIO_PHONE_NUMBER", &mut self.transport.from_number),
        ];
        for (name, slot) in vars {
            if let Ok(value) = std::env::var(name) {
                if !value.trim().is_empty() {
                    *slot = value;
                }
            }
        }
    }

    /// # Errors
    /// Returns an error naming the first invalid key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dispatch.tolerance_minutes == 0 {
            return Err(invalid("dispatch.tolerance_minutes", "must be greater than 0"));
        }
        let f = &self.follow_up;
        if f.first_resend_minutes == 0 {
            return Err(invalid("follow_up.first_resend_minutes", "must be greater than 0"));
        }
        if f.second_resend_minutes <= f.first_resend_minutes {
            return Err(invalid(
                "follow_up.second_resend_minutes",
                "must be greater than first_resend_minutes",
            ));
        }
        if f.escalate_minutes <= f.second_resend_minutes {
            return Err(invalid(
                "follow_up.escalate_minutes",
                "must be greater than second_resend_minutes",
            ));
        }
        if self.jobs.tick_seconds == 0 {
            return Err(invalid("jobs.tick_seconds", "must be greater than 0"));
        }
        for (key, hour) in [
            ("jobs.materialize_hour", self.jobs.materialize_hour),
            ("jobs.resume_nudge_hour", self.jobs.resume_nudge_hour),
        ] {
            if hour > 23 {
                return Err(invalid(key, "must be an hour between 0 and 23"));
            }
        }
        Ok(())
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a value by dot-separated key, validate, and save to `path`.
    ///
    /// # Errors
    /// Returns an error if the key is unknown, the value does not parse or
    /// fails validation, or the file cannot be written.
    pub fn set_at(&mut self, path: &Path, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json = serde_json::to_value(&*self).map_err(|e| invalid(key, e.to_string()))?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config = serde_json::from_value(json).map_err(|e| invalid(key, e.to_string()))?;
        updated.validate()?;
        *self = updated;
        self.save_to(path)
    }

    /// [`Config::set_at`] against the data directory file.
    ///
    /// # Errors
    /// See [`Config::set_at`].
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        self.set_at(&Self::path()?, key, value)
    }

    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            tolerance: Duration::minutes(i64::from(self.dispatch.tolerance_minutes)),
            min_gap: Duration::minutes(i64::from(self.dispatch.min_gap_minutes)),
            debounce: self.dispatch.debounce,
        }
    }

    pub fn follow_up_config(&self) -> FollowUpConfig {
        FollowUpConfig {
            first_resend: Duration::minutes(i64::from(self.follow_up.first_resend_minutes)),
            second_resend: Duration::minutes(i64::from(self.follow_up.second_resend_minutes)),
            escalate: Duration::minutes(i64::from(self.follow_up.escalate_minutes)),
        }
    }

    /// Build the configured transport.
    ///
    /// # Errors
    /// Returns an error if Twilio is selected without credentials.
    pub fn build_transport(&self) -> Result<Arc<dyn Transport>, ConfigError> {
        match self.transport.kind {
            TransportKind::Log => Ok(Arc::new(LogTransport)),
            TransportKind::Twilio => {
                let settings = TwilioSettings {
                    account_sid: self.transport.account_sid.clone(),
                    auth_token: self.transport.auth_token.clone(),
                    from_number: self.transport.from_number.clone(),
                    api_base: self.transport.api_base.clone(),
                };
                let transport = TwilioTransport::new(settings)
                    .map_err(|e| invalid("transport", e.to_string()))?;
                Ok(Arc::new(transport))
            }
        }
    }

    /// Read the data directory file if present, without creating anything.
    /// Falls back to defaults when it is missing or invalid.
    pub fn read_or_default() -> Self {
        Self::read_or_default_from(&data_dir_path().join("config.toml"))
    }

    pub fn read_or_default_from(path: &Path) -> Self {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|content| toml::from_str(&content).ok())
            .unwrap_or_default()
    }
}
