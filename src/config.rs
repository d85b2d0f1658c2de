/// Service configuration: global preferences, devices and triggers.
///
/// Loaded from a TOML file with three sections:
///
/// ```toml
/// [prefs]
/// api_key = "..."
/// download_interval = 900
///
/// [[devices]]
/// id = 1
/// name = "Peoria"
/// kind = "weather"
/// latitude = "40.69"
/// longitude = "-89.59"
///
/// [[triggers]]
/// id = 10
/// name = "Peoria offline"
/// kind = "weather_site_offline"
/// device = 1
/// offline_timer = 60
/// ```
///
/// The API key may be supplied through `FORECAST_API_KEY` instead (a `.env`
/// file is honoured). Every field is validated before the service starts;
/// failures are reported per field with the message shown to the user.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::analysis::clock::{DateTimeFormat, TimePreference};
use crate::analysis::format::{Precision, Units, WindNameStyle};
use crate::model::{DeviceId, DeviceKind, LocationKey, TriggerId};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const DEFAULT_CONFIG_PATH: &str = "forecast.toml";

/// Environment variable that overrides `prefs.api_key`.
pub const API_KEY_ENV: &str = "FORECAST_API_KEY";

pub const DEFAULT_BASE_URL: &str = "https://api.darksky.net/forecast";

/// Layout of the `last_successful_poll` and `next_poll` stamps.
pub const POLL_STAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Stamp used before the first successful poll.
pub const NEVER_POLLED: &str = "1970-01-01 00:00:00";

/// How often the run loop wakes to check whether a poll is due.
pub const WAKE_INTERVAL: Duration = Duration::from_secs(30);

/// Grace period before the first check after startup.
pub const STARTUP_DELAY: Duration = Duration::from_secs(5);

/// Longest accepted download interval: one day, in seconds.
pub const MAX_DOWNLOAD_INTERVAL: u64 = 86_400;

/// Timeout for every outbound HTTP request.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(20);

/// Triggers fire on temperatures at or below this reading, which only a
/// failing station reports.
pub const IMPLAUSIBLE_TEMPERATURE: f64 = -55.0;

// ---------------------------------------------------------------------------
// Preferences
// ---------------------------------------------------------------------------

/// Global preferences shared by every device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Prefs {
    pub api_key: String,
    pub base_url: String,
    pub language: String,
    /// Unit system requested from the API (`auto`, `us`, `si`, `ca`, `uk2`).
    pub units: String,
    /// Seconds between polls.
    pub download_interval: u64,

    /// Daily call ceiling as entered by the user.
    #[serde(deserialize_with = "string_or_number")]
    pub call_counter: String,
    /// Calls made today, as reported by the API.
    pub daily_call_counter: u32,

    pub alert_logging: bool,
    pub no_alert_logging: bool,
    pub show_debug_level: String,

    pub ui_date_format: String,
    pub ui_time_format: String,
    pub ui_temp_decimal: usize,
    pub ui_percentage_decimal: usize,
    pub ui_wind_decimal: usize,
    pub ui_distance_decimal: usize,
    pub ui_index_decimal: usize,
    pub rain_decimal: usize,
    pub item_list_temp_decimal: usize,
    pub ui_wind_name: WindNameStyle,

    pub updater_email: String,
    pub updater_emails_enabled: bool,

    pub last_successful_poll: String,
    pub next_poll: String,

    /// Append every fetched document to a daily file under `logs_dir`.
    pub dump_json: bool,
    pub logs_dir: PathBuf,
}

impl Default for Prefs {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            language: "en".to_string(),
            units: "auto".to_string(),
            download_interval: 900,
            call_counter: "999".to_string(),
            daily_call_counter: 0,
            alert_logging: false,
            no_alert_logging: false,
            show_debug_level: "30".to_string(),
            ui_date_format: "YYYY-MM-DD".to_string(),
            ui_time_format: "military".to_string(),
            ui_temp_decimal: 1,
            ui_percentage_decimal: 1,
            ui_wind_decimal: 1,
            ui_distance_decimal: 0,
            ui_index_decimal: 0,
            rain_decimal: 2,
            item_list_temp_decimal: 1,
            ui_wind_name: WindNameStyle::Long,
            updater_email: String::new(),
            updater_emails_enabled: false,
            last_successful_poll: NEVER_POLLED.to_string(),
            next_poll: NEVER_POLLED.to_string(),
            dump_json: false,
            logs_dir: PathBuf::from("logs"),
        }
    }
}

impl Prefs {
    pub fn precision(&self) -> Precision {
        Precision {
            temperature: self.ui_temp_decimal,
            percentage: self.ui_percentage_decimal,
            wind: self.ui_wind_decimal,
            distance: self.ui_distance_decimal,
            index: self.ui_index_decimal,
            rain: self.rain_decimal,
            item_list_temperature: self.item_list_temp_decimal,
        }
    }

    pub fn formats(&self) -> DateTimeFormat {
        DateTimeFormat::from_prefs(&self.ui_date_format, &self.ui_time_format)
    }

    /// Clamped to `MAX_DOWNLOAD_INTERVAL`, so an unvalidated value cannot
    /// overflow the schedule.
    pub fn interval(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.download_interval.min(MAX_DOWNLOAD_INTERVAL) as i64)
    }

    /// An unreadable stamp counts as never polled, so a poll is due.
    pub fn next_poll_at(&self) -> NaiveDateTime {
        parse_stamp(&self.next_poll).unwrap_or(NaiveDateTime::default())
    }

    /// Records a completed cycle at `now` and schedules the next one.
    pub fn schedule_after(&mut self, now: NaiveDateTime) {
        self.last_successful_poll = now.format(POLL_STAMP_FORMAT).to_string();
        let next = now.checked_add_signed(self.interval()).unwrap_or(now);
        self.next_poll = next.format(POLL_STAMP_FORMAT).to_string();
    }
}

pub fn parse_stamp(stamp: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(stamp.trim(), POLL_STAMP_FORMAT).ok()
}

// ---------------------------------------------------------------------------
// Devices
// ---------------------------------------------------------------------------

fn default_true() -> bool {
    true
}

fn default_ui_display() -> usize {
    1
}

fn default_email_time() -> String {
    "01:00".to_string()
}

/// One user-configured device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    pub name: String,
    pub kind: DeviceKind,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// False until the user has completed the device's settings.
    #[serde(default = "default_true")]
    pub configured: bool,

    #[serde(default, deserialize_with = "string_or_number")]
    pub latitude: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub longitude: String,
    #[serde(default)]
    pub units: Units,
    #[serde(default)]
    pub time_zone: TimePreference,
    /// Hourly devices: which forecast hour's temperature to show.
    #[serde(default = "default_ui_display")]
    pub ui_display: usize,
    #[serde(default)]
    pub suppress_weather_alerts: bool,

    #[serde(default)]
    pub weather_summary_email: bool,
    /// Earliest hour ("HH:MM") the daily summary may go out.
    #[serde(default = "default_email_time")]
    pub weather_summary_email_time: String,

    #[serde(default)]
    pub image_source: String,
    #[serde(default)]
    pub image_destination: String,
}

impl Device {
    /// Cache key for this device's forecast document.
    pub fn location(&self) -> LocationKey {
        LocationKey::new(self.latitude.clone(), self.longitude.clone())
    }

    /// "lat, long" to five decimals, for the host's address column.
    pub fn address(&self) -> Option<String> {
        let lat = self.latitude.trim().parse::<f64>().ok()?;
        let long = self.longitude.trim().parse::<f64>().ok()?;
        Some(format!("{lat:.5}, {long:.5}"))
    }
}

// ---------------------------------------------------------------------------
// Triggers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    /// Fires when a location stops reporting or reports impossible data.
    WeatherSiteOffline,
    /// Fires while a device has active severe weather alerts.
    WeatherAlert,
}

fn default_offline_timer() -> String {
    "60".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    pub id: TriggerId,
    pub name: String,
    pub kind: TriggerKind,
    pub device: DeviceId,
    /// Minutes without a new observation before the location is offline.
    #[serde(default = "default_offline_timer", deserialize_with = "string_or_number")]
    pub offline_timer: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Trigger {
    pub fn offline_minutes(&self) -> Option<i64> {
        self.offline_timer.trim().parse::<i64>().ok().filter(|m| *m > 0)
    }
}

// ---------------------------------------------------------------------------
// Whole file
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub prefs: Prefs,
    pub devices: Vec<Device>,
    pub triggers: Vec<Trigger>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid configuration file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("{0}")]
    Invalid(#[from] ValidationErrors),
}

/// Reads, applies the environment override and validates.
pub fn load_config(path: &Path) -> Result<ServiceConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut config = parse_config(&text)?;
    config.apply_api_key_override(std::env::var(API_KEY_ENV).ok());
    config.validate()?;
    Ok(config)
}

/// Parses without validating.
pub fn parse_config(text: &str) -> Result<ServiceConfig, ConfigError> {
    Ok(toml::from_str(text)?)
}

impl ServiceConfig {
    /// A non-blank value replaces whatever the file said.
    pub fn apply_api_key_override(&mut self, value: Option<String>) {
        if let Some(key) = value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
            self.prefs.api_key = key;
        }
    }

    /// Validates everything; field names are prefixed with their section.
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();

        if let Err(e) = validate_prefs(&self.prefs) {
            errors.merge("prefs", e);
        }
        for (i, device) in self.devices.iter().enumerate() {
            if let Err(e) = validate_device(device) {
                errors.merge(&format!("devices[{i}]"), e);
            }
            if self.devices[..i].iter().any(|d| d.id == device.id) {
                errors.insert(format!("devices[{i}].id"), "Device ids must be unique.");
            }
        }
        for (i, trigger) in self.triggers.iter().enumerate() {
            if let Err(e) = validate_trigger(trigger, &self.triggers) {
                errors.merge(&format!("triggers[{i}]"), e);
            }
            match self.devices.iter().find(|d| d.id == trigger.device) {
                None => errors.insert(
                    format!("triggers[{i}].device"),
                    "The selected device does not exist.",
                ),
                Some(d) if !d.kind.is_weather_bearing() => errors.insert(
                    format!("triggers[{i}].device"),
                    "Please select a weather device.",
                ),
                Some(_) => {}
            }
        }

        errors.into_result()
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Field name to user-facing message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    fields: BTreeMap<String, String>,
}

impl ValidationErrors {
    pub fn insert(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.fields.insert(field.into(), message.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    fn merge(&mut self, prefix: &str, other: ValidationErrors) {
        for (field, message) in other.fields {
            self.fields.insert(format!("{prefix}.{field}"), message);
        }
    }

    fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Configuration Errors: there are one or more settings that need to be corrected."
        )?;
        for (field, message) in &self.fields {
            write!(f, "\n  {field}: {message}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

pub fn validate_prefs(prefs: &Prefs) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::default();

    if prefs.api_key.is_empty() {
        errors.insert("api_key", "An API key is required. See help for details.");
    } else if prefs.api_key.contains(' ') {
        errors.insert("api_key", "The API key can't contain a space.");
    }

    match prefs.call_counter.trim().parse::<i64>() {
        Err(_) => errors.insert("call_counter", "The call counter can only contain integers."),
        Ok(n) if n < 0 => errors.insert(
            "call_counter",
            "The call counter value must be a positive integer.",
        ),
        Ok(_) => {}
    }

    if prefs.download_interval == 0 {
        errors.insert(
            "download_interval",
            "The download interval must be greater than zero.",
        );
    } else if prefs.download_interval > MAX_DOWNLOAD_INTERVAL {
        errors.insert(
            "download_interval",
            "The download interval can't be longer than one day (86400 seconds).",
        );
    }

    errors.into_result()
}

/// Only weather-bearing devices have a location to check.
pub fn validate_device(device: &Device) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::default();
    if !device.kind.is_weather_bearing() {
        return Ok(());
    }

    let in_range = |text: &str, limit: f64| {
        text.trim()
            .parse::<f64>()
            .map(|v| (-limit..=limit).contains(&v))
            .unwrap_or(false)
    };
    if !in_range(&device.latitude, 90.0) {
        errors.insert("latitude", "The latitude value must be between -90 and 90.");
    }
    if !in_range(&device.longitude, 180.0) {
        errors.insert("longitude", "The longitude value must be between -180 and 180.");
    }

    errors.into_result()
}

/// `all` is every configured trigger, used for the one-offline-trigger
/// per device rule.
pub fn validate_trigger(trigger: &Trigger, all: &[Trigger]) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::default();
    if trigger.kind != TriggerKind::WeatherSiteOffline {
        return Ok(());
    }

    let duplicate = all.iter().any(|other| {
        other.kind == TriggerKind::WeatherSiteOffline
            && other.device == trigger.device
            && other.id != trigger.id
    });
    if duplicate {
        errors.insert(
            "device",
            "Please select a weather device without an existing offline trigger.",
        );
    }

    if trigger.offline_minutes().is_none() {
        errors.insert(
            "offline_timer",
            "You must enter a valid time value in minutes (positive integer greater than zero).",
        );
    }

    errors.into_result()
}

/// Accepts `40.5`, `40` or `"40.5"` and keeps the text form.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Integer(i64),
        Float(f64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Integer(i) => i.to_string(),
        Raw::Float(f) => f.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
