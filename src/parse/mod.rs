/// Per-category parsers from a forecast document to device states.
///
/// Each parser walks one subtree of the document and returns the full flat
/// list of states for one device plus, where the category owns it, the
/// device's display state. Parsers never touch the host: the poll cycle
/// decides what to do with the result, including marking the device off
/// when a parser fails.
///
/// Submodules:
/// - `current`   - `currently` section for Weather devices.
/// - `alerts`    - `alerts[]` into the five alert slots.
/// - `hourly`    - first 24 entries of `hourly.data`.
/// - `daily`     - first 8 entries of `daily.data`.
/// - `astronomy` - sun and moon fields from `daily.data`.

pub mod alerts;
pub mod astronomy;
pub mod current;
pub mod daily;
pub mod hourly;

use serde_json::Value;

use crate::analysis::clock::{self, DateTimeFormat, TimePreference, Zone};
use crate::analysis::format::{Precision, Units, WindNameStyle};
use crate::analysis::lookup::{lookup, lookup_epoch, lookup_text};
use crate::config::{Device, Prefs};
use crate::model::{Category, DisplayState, ParseError, StateList, StateUpdate};

// ---------------------------------------------------------------------------
// Parse context
// ---------------------------------------------------------------------------

/// When and how alert text is written to the log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlertLogging {
    /// Global alert logging preference.
    pub enabled: bool,
    /// Also log when there are no alerts.
    pub log_when_clear: bool,
    /// Per-device suppression.
    pub suppressed: bool,
}

impl AlertLogging {
    pub fn active(&self) -> bool {
        self.enabled && !self.suppressed
    }
}

/// Everything a parser needs besides the document itself.
#[derive(Debug, Clone)]
pub struct ParseContext<'a> {
    pub device_name: &'a str,
    pub units: &'a Units,
    pub precision: Precision,
    pub wind_names: WindNameStyle,
    pub formats: DateTimeFormat,
    pub time_zone: TimePreference,
    /// 1-based hourly entry whose temperature is shown on the device.
    pub ui_display: usize,
    pub alert_logging: AlertLogging,
}

impl<'a> ParseContext<'a> {
    pub fn for_device(prefs: &Prefs, device: &'a Device) -> Self {
        Self {
            device_name: &device.name,
            units: &device.units,
            precision: prefs.precision(),
            wind_names: prefs.ui_wind_name,
            formats: prefs.formats(),
            time_zone: device.time_zone,
            ui_display: device.ui_display,
            alert_logging: AlertLogging {
                enabled: prefs.alert_logging,
                log_when_clear: !prefs.no_alert_logging,
                suppressed: device.suppress_weather_alerts,
            },
        }
    }
}

/// Output of one category parser.
#[derive(Debug, Clone, PartialEq)]
pub struct Parsed {
    pub states: StateList,
    /// `None` when the category does not own the device's display.
    pub display: Option<DisplayState>,
}

impl Category {
    /// Dispatches to the parser for this category.
    pub fn parse(self, document: &Value, ctx: &ParseContext<'_>) -> Result<Parsed, ParseError> {
        match self {
            Category::Current => current::parse(document, ctx),
            Category::Alerts => alerts::parse(document, ctx),
            Category::Hourly => hourly::parse(document, ctx),
            Category::Daily => daily::parse(document, ctx),
            Category::Astronomy => astronomy::parse(document, ctx),
        }
    }
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// The embedded observation timestamp used for staleness checks.
pub fn observation_epoch(document: &Value) -> Option<i64> {
    lookup_epoch(document, &["currently", "time"])
}

/// `currentObservationEpoch`, `currentObservation` and
/// `currentObservation24hr`, all rendered on the server clock.
pub fn observation_states(
    document: &Value,
    formats: &DateTimeFormat,
) -> Result<StateList, ParseError> {
    let epoch = observation_epoch(document)
        .ok_or_else(|| ParseError::MissingField("currently.time".into()))?;
    let local = clock::localize(epoch, Zone::Server)?;
    let stamp = clock::last_updated(&local);
    let stamp_24hr = local.format(&formats.date_time()).to_string();

    Ok(vec![
        StateUpdate::with_ui("currentObservationEpoch", epoch, epoch.to_string()),
        StateUpdate::with_ui("currentObservation", stamp.clone(), stamp),
        StateUpdate::new("currentObservation24hr", stamp_24hr),
    ])
}

/// The document's own IANA timezone.
pub fn document_zone(document: &Value) -> Result<Zone, ParseError> {
    match lookup(document, &["timezone"]) {
        Some(Value::String(name)) => Ok(Zone::Location(clock::location_zone(name)?)),
        _ => Err(ParseError::MissingField("timezone".into())),
    }
}

/// Rendering zone for a device's time preference.
pub fn preferred_zone(document: &Value, pref: TimePreference) -> Result<Zone, ParseError> {
    match pref {
        TimePreference::TimeHere => Ok(Zone::Server),
        TimePreference::TimeThere => document_zone(document),
    }
}

/// The `data` array of a forecast section.
pub fn forecast_entries<'a>(document: &'a Value, section: &str) -> Result<&'a [Value], ParseError> {
    document
        .get(section)
        .and_then(|s| s.get("data"))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .ok_or_else(|| ParseError::MissingSection(format!("{section}.data")))
}

/// Forecast timestamp of one entry.
pub fn entry_epoch(entry: &Value, section: &str, number: usize) -> Result<i64, ParseError> {
    lookup_epoch(entry, &["time"])
        .ok_or_else(|| ParseError::MissingField(format!("{section}.data[{}].time", number - 1)))
}

/// Zero-padded state name prefix so host UIs sort chronologically
/// (`h01_`, `d08_`).
pub fn slot_prefix(letter: char, number: usize) -> String {
    format!("{letter}{number:02}_")
}

/// Text field published verbatim.
pub fn text_state(key: impl Into<String>, entry: &Value, field: &str) -> StateUpdate {
    StateUpdate::new(key, lookup_text(entry, &[field]))
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use serde_json::json;

    #[test]
    fn test_slot_prefix_is_zero_padded() {
        assert_eq!(slot_prefix('h', 1), "h01_");
        assert_eq!(slot_prefix('h', 24), "h24_");
        assert_eq!(slot_prefix('d', 8), "d08_");
    }

    #[test]
    fn test_observation_states_use_embedded_epoch() {
        let states = observation_states(&document(), &DateTimeFormat::default()).unwrap();
        assert_eq!(states[0].key, "currentObservationEpoch");
        assert_eq!(states[0].value, OBSERVED.into());
        assert!(matches!(&states[1].value, crate::model::StateValue::Text(s) if s.starts_with("Last updated on ")));
    }

    #[test]
    fn test_missing_observation_epoch_is_a_parse_error() {
        let err = observation_states(&json!({"currently": {}}), &DateTimeFormat::default()).unwrap_err();
        assert_eq!(err, ParseError::MissingField("currently.time".into()));
    }

    #[test]
    fn test_forecast_entries_requires_data_array() {
        assert_eq!(forecast_entries(&document(), "hourly").unwrap().len(), 30);
        assert_eq!(
            forecast_entries(&json!({"hourly": {"summary": "x"}}), "hourly"),
            Err(ParseError::MissingSection("hourly.data".into()))
        );
    }

    #[test]
    fn test_time_there_needs_document_zone() {
        assert_eq!(
            preferred_zone(&json!({}), TimePreference::TimeThere),
            Err(ParseError::MissingField("timezone".into()))
        );
        assert_eq!(preferred_zone(&json!({}), TimePreference::TimeHere), Ok(Zone::Server));
    }

    #[test]
    fn test_alert_logging_respects_suppression() {
        let on = AlertLogging { enabled: true, log_when_clear: true, suppressed: false };
        assert!(on.active());
        assert!(!AlertLogging { suppressed: true, ..on }.active());
        assert!(!AlertLogging::default().active());
    }
}
