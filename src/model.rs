/// Core data types for the forecast polling service.
///
/// This module defines the shared domain model imported by all other modules:
/// location keys, normalized readings, device state values and the error
/// kinds that flow between the fetch, parse and orchestration layers.
/// It performs no I/O.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Sentinels and fixed limits
// ---------------------------------------------------------------------------

/// Numeric half of the sentinel pair used for unusable readings.
pub const SENTINEL_VALUE: f64 = -99.0;

/// Display half of the sentinel pair used for unusable readings.
pub const SENTINEL_TEXT: &str = "--";

/// Returned by the nested lookup when a key is absent at any level.
pub const NOT_AVAILABLE: &str = "Not available";

/// Readings at or below this value are treated as corrupt.
///
/// -99 F expressed in Celsius: anything more extreme than the sentinel
/// itself is station garbage (e.g. -999) rather than real weather.
pub const CORRUPTION_FLOOR: f64 = -55.728;

/// Number of hourly forecast entries published per device.
pub const HOURLY_CAP: usize = 24;

/// Number of daily forecast entries published per device.
pub const DAILY_CAP: usize = 8;

/// Number of alert slots kept on a weather device.
pub const ALERT_SLOTS: usize = 5;

/// Host-assigned device identifier.
pub type DeviceId = i64;

/// Host-assigned trigger identifier.
pub type TriggerId = i64;

// ---------------------------------------------------------------------------
// Location key
// ---------------------------------------------------------------------------

/// Cache key for one upstream fetch.
///
/// Equality is textual: "40.5" and "40.50" are different locations and
/// are fetched separately.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocationKey {
    pub latitude: String,
    pub longitude: String,
}

impl LocationKey {
    pub fn new(latitude: impl Into<String>, longitude: impl Into<String>) -> Self {
        Self {
            latitude: latitude.into(),
            longitude: longitude.into(),
        }
    }
}

impl fmt::Display for LocationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.latitude, self.longitude)
    }
}

// ---------------------------------------------------------------------------
// Readings and state values
// ---------------------------------------------------------------------------

/// Result of normalizing one physical quantity.
///
/// `value` is always finite; `text` is the human rendering before any unit
/// is applied. Units belong on the display side only.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub value: f64,
    pub text: String,
}

impl Reading {
    pub fn sentinel() -> Self {
        Self {
            value: SENTINEL_VALUE,
            text: SENTINEL_TEXT.to_string(),
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.text == SENTINEL_TEXT
    }

    /// Rounded integer companion used for the `*Icon` states.
    pub fn icon(&self) -> i64 {
        self.value.round() as i64
    }
}

/// A value stored in a device state record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StateValue {
    Bool(bool),
    Integer(i64),
    Number(f64),
    Text(String),
}

impl StateValue {
    /// Interprets the value as an epoch or count. Text that does not parse
    /// yields `None`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            StateValue::Integer(i) => Some(*i),
            StateValue::Number(n) if n.is_finite() => Some(n.trunc() as i64),
            StateValue::Text(s) => s
                .trim()
                .parse::<i64>()
                .ok()
                .or_else(|| s.trim().parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            StateValue::Integer(i) => Some(*i as f64),
            StateValue::Number(n) => Some(*n),
            StateValue::Text(s) => s.trim().parse::<f64>().ok(),
            StateValue::Bool(_) => None,
        }
    }

    /// Legacy records stored booleans as "true"/"false" strings.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            StateValue::Bool(b) => Some(*b),
            StateValue::Text(s) if s.eq_ignore_ascii_case("true") => Some(true),
            StateValue::Text(s) if s.eq_ignore_ascii_case("false") => Some(false),
            _ => None,
        }
    }
}

impl fmt::Display for StateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateValue::Bool(b) => write!(f, "{}", if *b { "True" } else { "False" }),
            StateValue::Integer(i) => write!(f, "{}", i),
            StateValue::Number(n) => write!(f, "{:?}", n),
            StateValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<bool> for StateValue {
    fn from(value: bool) -> Self {
        StateValue::Bool(value)
    }
}

impl From<i64> for StateValue {
    fn from(value: i64) -> Self {
        StateValue::Integer(value)
    }
}

impl From<f64> for StateValue {
    fn from(value: f64) -> Self {
        StateValue::Number(value)
    }
}

impl From<String> for StateValue {
    fn from(value: String) -> Self {
        StateValue::Text(value)
    }
}

impl From<&str> for StateValue {
    fn from(value: &str) -> Self {
        StateValue::Text(value.to_string())
    }
}

/// One `(key, value, display)` triple handed to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateUpdate {
    pub key: String,
    pub value: StateValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ui_value: Option<String>,
}

impl StateUpdate {
    pub fn new(key: impl Into<String>, value: impl Into<StateValue>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            ui_value: None,
        }
    }

    pub fn with_ui(
        key: impl Into<String>,
        value: impl Into<StateValue>,
        ui_value: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            ui_value: Some(ui_value.into()),
        }
    }

    /// Numeric side from the reading, display side from an already
    /// formatted string.
    pub fn reading(key: impl Into<String>, reading: &Reading, ui_value: impl Into<String>) -> Self {
        Self::with_ui(key, reading.value, ui_value)
    }
}

/// Ordered batch of state updates for one device.
pub type StateList = Vec<StateUpdate>;

// ---------------------------------------------------------------------------
// Devices and categories
// ---------------------------------------------------------------------------

/// The closed set of device types the service publishes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    /// Current conditions plus severe weather alerts.
    Weather,
    Hourly,
    Daily,
    Astronomy,
    SatelliteImage,
}

impl DeviceKind {
    /// Devices that need a forecast document for their location.
    pub fn is_weather_bearing(self) -> bool {
        !matches!(self, DeviceKind::SatelliteImage)
    }

    /// Parsers applied to this device, in order.
    pub fn categories(self) -> &'static [Category] {
        match self {
            DeviceKind::Weather => &[Category::Current, Category::Alerts],
            DeviceKind::Hourly => &[Category::Hourly],
            DeviceKind::Daily => &[Category::Daily],
            DeviceKind::Astronomy => &[Category::Astronomy],
            DeviceKind::SatelliteImage => &[],
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKind::Weather => write!(f, "Weather"),
            DeviceKind::Hourly => write!(f, "Hourly"),
            DeviceKind::Daily => write!(f, "Daily"),
            DeviceKind::Astronomy => write!(f, "Astronomy"),
            DeviceKind::SatelliteImage => write!(f, "SatelliteImage"),
        }
    }
}

/// One subtree of the forecast document with its own parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Current,
    Alerts,
    Hourly,
    Daily,
    Astronomy,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Current => write!(f, "weather device"),
            Category::Alerts => write!(f, "weather alert"),
            Category::Hourly => write!(f, "hourly forecast"),
            Category::Daily => write!(f, "daily forecast"),
            Category::Astronomy => write!(f, "astronomy"),
        }
    }
}

// ---------------------------------------------------------------------------
// Display state
// ---------------------------------------------------------------------------

/// Icon shown next to a device in the host UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SensorIcon {
    SensorOn,
    SensorOff,
    TemperatureSensorOn,
    TemperatureSensor,
}

/// The primary `onOffState` of a device plus its icon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayState {
    pub value: StateValue,
    pub ui_value: String,
    pub icon: SensorIcon,
}

impl DisplayState {
    pub fn online(ui_value: impl Into<String>, icon: SensorIcon) -> Self {
        Self {
            value: StateValue::Bool(true),
            ui_value: ui_value.into(),
            icon,
        }
    }

    pub fn off(ui_value: impl Into<String>) -> Self {
        Self {
            value: StateValue::Bool(false),
            ui_value: ui_value.into(),
            icon: SensorIcon::SensorOff,
        }
    }

    /// Set by the offline trigger pass; distinct from a plain "off".
    pub fn location_offline() -> Self {
        Self {
            value: StateValue::Text("offline".to_string()),
            ui_value: "offline".to_string(),
            icon: SensorIcon::TemperatureSensor,
        }
    }

    pub fn is_online(&self) -> bool {
        self.value == StateValue::Bool(true)
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Raised by the host's sleep primitive when shutdown was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("shutdown requested")]
pub struct Stopped;

/// Errors that can arise when fetching a forecast document.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    /// Non-2xx HTTP response from the forecast API.
    #[error("HTTP error: {0}")]
    HttpStatus(u16),
    /// Connection refused, DNS failure, TLS failure and similar.
    #[error("Request failed: {0}")]
    Transport(String),
    /// The request did not complete within the client timeout.
    #[error("Request timed out: {0}")]
    Timeout(String),
    /// The response body was not a JSON document.
    #[error("Parse error: {0}")]
    Decode(String),
    /// Shutdown was requested while waiting to retry.
    #[error("fetch abandoned: {0}")]
    Stopped(#[from] Stopped),
}

impl FetchError {
    /// Transient failures are retried with backoff; decode failures are not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FetchError::HttpStatus(_) | FetchError::Transport(_) | FetchError::Timeout(_)
        )
    }
}

/// Data-shape failures found while walking a forecast document.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("no cached weather data for location {0}")]
    MissingDocument(LocationKey),
    #[error("weather data has no usable '{0}' section")]
    MissingSection(String),
    #[error("field '{0}' is missing or not numeric")]
    MissingField(String),
    #[error("unknown timezone '{0}'")]
    UnknownTimezone(String),
    #[error("epoch {0} is out of range")]
    InvalidEpoch(i64),
}

/// Failures reported by the host collaborator.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("unknown device id {0}")]
    UnknownDevice(DeviceId),
    #[error("unknown trigger id {0}")]
    UnknownTrigger(TriggerId),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not serialize host state: {0}")]
    Serialize(String),
    #[error("email could not be sent: {0}")]
    Email(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
