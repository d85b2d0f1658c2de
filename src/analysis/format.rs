/// Display formatting for normalized readings.
///
/// Every formatter takes the reading's text form, the precision from the
/// global preferences and the unit suffix configured on the device. If the
/// text is not a number (usually the "--" sentinel) each formatter falls
/// back in its own way, listed on the function.

use serde::{Deserialize, Serialize};

use crate::model::{Reading, SENTINEL_TEXT};

// ---------------------------------------------------------------------------
// Units and precision
// ---------------------------------------------------------------------------

/// Per-device unit suffixes. All default to empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Units {
    pub temperature: String,
    pub percentage: String,
    pub pressure: String,
    pub wind: String,
    pub distance: String,
    pub index: String,
    /// Older device configs call this `rain_amount`.
    #[serde(alias = "rain_amount")]
    pub rain: String,
}

/// Decimal places per quantity, taken from the global preferences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Precision {
    pub temperature: usize,
    pub percentage: usize,
    pub wind: usize,
    pub distance: usize,
    /// Also used for pressure.
    pub index: usize,
    pub rain: usize,
    pub item_list_temperature: usize,
}

impl Default for Precision {
    fn default() -> Self {
        Self {
            temperature: 1,
            percentage: 1,
            wind: 1,
            distance: 0,
            index: 0,
            rain: 2,
            item_list_temperature: 1,
        }
    }
}

/// Long ("Northeast") or short ("NE") compass names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum WindNameStyle {
    #[default]
    Long,
    Short,
}

// ---------------------------------------------------------------------------
// Formatters
// ---------------------------------------------------------------------------

fn parse_number(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Fixed-point rendering of a plain value.
pub fn fixed(value: f64, precision: usize) -> String {
    format!("{:.*}", precision, value)
}

/// Falls back to `text + unit`.
fn fixed_or_suffixed(text: &str, precision: usize, unit: &str) -> String {
    match parse_number(text) {
        Some(v) => format!("{}{}", fixed(v, precision), unit),
        None => format!("{}{}", text, unit),
    }
}

/// Falls back to `"--"` without a unit.
pub fn temperature(text: &str, precision: usize, unit: &str) -> String {
    match parse_number(text) {
        Some(v) => format!("{}{}", fixed(v, precision), unit),
        None => SENTINEL_TEXT.to_string(),
    }
}

pub fn percentage(text: &str, precision: usize, unit: &str) -> String {
    fixed_or_suffixed(text, precision, unit)
}

/// Uses the index precision.
pub fn pressure(text: &str, precision: usize, unit: &str) -> String {
    fixed_or_suffixed(text, precision, unit)
}

pub fn distance(text: &str, precision: usize, unit: &str) -> String {
    fixed_or_suffixed(text, precision, unit)
}

pub fn index(text: &str, precision: usize, unit: &str) -> String {
    fixed_or_suffixed(text, precision, unit)
}

/// Falls back to the bare text.
pub fn wind(text: &str, precision: usize, unit: &str) -> String {
    match parse_number(text) {
        Some(v) => format!("{}{}", fixed(v, precision), unit),
        None => text.to_string(),
    }
}

/// Placeholder spellings are returned untouched; anything else that is not
/// a number falls back to the bare text.
pub fn rain(text: &str, precision: usize, unit: &str) -> String {
    if matches!(text, "NA" | "N/A" | "--" | "") {
        return text.to_string();
    }
    match parse_number(text) {
        Some(v) => format!("{}{}", fixed(v, precision), unit),
        None => text.to_string(),
    }
}

/// The short temperature rendering used in host device lists.
pub fn item_list_temperature(reading: &Reading, precision: usize, unit: &str) -> String {
    if reading.is_sentinel() {
        return SENTINEL_TEXT.to_string();
    }
    format!("{}{}", fixed(reading.value, precision), unit)
}

// ---------------------------------------------------------------------------
// Names
// ---------------------------------------------------------------------------

const LONG_WIND_NAMES: [&str; 8] = [
    "North", "Northeast", "East", "Southeast", "South", "Southwest", "West", "Northwest",
];

const SHORT_WIND_NAMES: [&str; 8] = ["N", "NE", "E", "SE", "S", "SW", "W", "NW"];

/// Compass sector for a bearing in degrees. Each sector spans 45 degrees
/// centred on its heading; negative and >360 bearings wrap.
pub fn wind_name(degrees: f64, style: WindNameStyle) -> &'static str {
    let shifted = (degrees.round() + 22.5).rem_euclid(360.0);
    let sector = ((shifted / 45.0) as usize).min(7);
    match style {
        WindNameStyle::Long => LONG_WIND_NAMES[sector],
        WindNameStyle::Short => SHORT_WIND_NAMES[sector],
    }
}

/// Compass name for a normalized bearing; the sentinel has no direction.
pub fn wind_name_for(bearing: &Reading, style: WindNameStyle) -> String {
    if bearing.is_sentinel() {
        SENTINEL_TEXT.to_string()
    } else {
        wind_name(bearing.value, style).to_string()
    }
}

/// Lunar phase name for a phase fraction.
///
/// The quarters are exact points; everything between them is a crescent
/// or gibbous phase. Anything past the last quarter counts as waning.
pub fn moon_phase_name(phase: f64) -> &'static str {
    if phase == 0.0 {
        "New"
    } else if 0.0 < phase && phase < 0.25 {
        "Waxing Crescent"
    } else if phase == 0.25 {
        "First Quarter"
    } else if 0.25 < phase && phase < 0.5 {
        "Waxing Gibbous"
    } else if phase == 0.5 {
        "Full"
    } else if 0.5 < phase && phase < 0.75 {
        "Waning Gibbous"
    } else if phase == 0.75 {
        "Last Quarter"
    } else if 0.75 < phase {
        "Waning Crescent"
    } else {
        "Unknown"
    }
}

/// Replaces dashes so icon names are usable as image identifiers
/// (`partly-cloudy-day` becomes `partly_cloudy_day`).
pub fn icon_name(icon: &str) -> String {
    icon.replace('-', "_")
}
