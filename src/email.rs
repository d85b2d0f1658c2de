/// Once-daily forecast summary email for Daily devices.
///
/// A Daily device with `weather_summary_email` set sends one summary of
/// `daily.data[0]` per calendar day, on the first cycle at or after its
/// configured hour. Two states track this on the device:
///   - `weatherSummaryEmailSent`      - bool, "Err" in the UI when the
///     document could not be summarised (retrying would fail the same way).
///   - `weatherSummaryEmailTimestamp` - "YYYY-MM-DD" of the last send; a
///     different date resets the sent flag.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde_json::Value;

use crate::analysis::clock::{self, Zone};
use crate::analysis::format::{WindNameStyle, wind_name};
use crate::analysis::lookup::{lookup, lookup_text, lookup_text_or};
use crate::analysis::normalize::coerce_f64;
use crate::config::{Device, Prefs};
use crate::host::Host;
use crate::logging::{self, Source};
use crate::model::{NOT_AVAILABLE, ParseError, StateUpdate, StateValue};
use crate::parse::{document_zone, forecast_entries};

pub const SUBJECT: &str = "Daily Weather Summary";

pub const SENT_STATE: &str = "weatherSummaryEmailSent";
pub const TIMESTAMP_STATE: &str = "weatherSummaryEmailTimestamp";

const RULE: &str = "--------------------------------------";

// ---------------------------------------------------------------------------
// Gating
// ---------------------------------------------------------------------------

/// Hour of day from an "HH:MM" preference; unreadable values mean 01:00.
pub fn summary_hour(pref: &str) -> u32 {
    NaiveTime::parse_from_str(pref.trim(), "%H:%M")
        .map(|t| t.hour())
        .unwrap_or(1)
}

/// Whether a summary should go out now.
///
/// `sent` and `last_sent` are the device's current states. A sent flag
/// from a previous day no longer counts.
pub fn summary_due_at(device: &Device, sent: bool, last_sent: Option<&str>, now: NaiveDateTime) -> bool {
    if !device.weather_summary_email {
        return false;
    }
    let sent_today = sent && last_sent.and_then(parse_sent_date) == Some(now.date());
    !sent_today && now.hour() >= summary_hour(&device.weather_summary_email_time)
}

fn parse_sent_date(stamp: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(stamp.trim(), "%Y-%m-%d").ok()
}

// ---------------------------------------------------------------------------
// Composition
// ---------------------------------------------------------------------------

/// Builds the message body from the first daily entry.
///
/// Every numeric field must be present; a missing one fails the whole
/// summary rather than sending a partial report.
pub fn compose_summary(device: &Device, document: &Value, wind_names: WindNameStyle) -> Result<String, ParseError> {
    let day = forecast_entries(document, "daily")?
        .first()
        .ok_or_else(|| ParseError::MissingSection("daily.data".into()))?;
    let number = |field: &str| {
        lookup(day, &[field])
            .and_then(coerce_f64)
            .ok_or_else(|| ParseError::MissingField(format!("daily.data[0].{field}")))
    };
    let units = &device.units;

    let epoch = number("time")? as i64;
    let zone = document_zone(document).unwrap_or(Zone::Server);
    let day_name = clock::localize(epoch, zone)?.format("%A").to_string();

    let precip_type = match lookup_text(day, &["precipType"]) {
        t if t == NOT_AVAILABLE => "Precipitation".to_string(),
        t => capitalize(&t),
    };

    let high = number("temperatureHigh")?.round();
    let low = number("temperatureLow")?.round();
    let chance = (number("precipProbability")? * 100.0) as i64;
    let total = number("precipIntensity")? * 24.0;
    let bearing = wind_name(number("windBearing")?, wind_names);
    let speed = number("windSpeed")?.round();
    let gust = number("windGust")?.round();
    let clouds = (number("cloudCover")? * 100.0) as i64;
    let humidity = (number("humidity")? * 100.0) as i64;
    let ozone = number("ozone")?.round();
    let pressure = number("pressure")?.round();
    let uv = number("uvIndex")?;
    let visibility = (number("visibility")? * 4.0).round() / 4.0;
    let long_range = lookup_text_or(document, &["daily", "summary"], "Not available.");

    let mut body = String::new();
    body.push_str(&format!("{}\n{}\n\n", device.name, RULE));
    body.push_str(&format!("{} Forecast:\n{}\n", day_name, RULE));
    body.push_str(&format!("{}\n\n", lookup_text(day, &["summary"])));
    body.push_str(&format!("High: {}{}\n", high, units.temperature));
    body.push_str(&format!("Low: {}{}\n", low, units.temperature));
    body.push_str(&format!("Chance of {}: {}{}\n", precip_type, chance, units.percentage));
    body.push_str(&format!("Total Precipitation: {:.2}{}\n", total, units.rain));
    body.push_str(&format!(
        "Winds out of the {} at {}{} -- gusting to {}{}\n",
        bearing, speed, units.wind, gust, units.wind
    ));
    body.push_str(&format!("Clouds: {}{}\n", clouds, units.percentage));
    body.push_str(&format!("Humidity: {}{}\n", humidity, units.percentage));
    body.push_str(&format!("Ozone: {}{}\n", ozone, units.index));
    body.push_str(&format!("Pressure: {}{}\n", pressure, units.pressure));
    body.push_str(&format!("UV: {}{}\n", uv, units.index));
    body.push_str(&format!("Visibility: {:.2}{}\n\n", visibility, units.distance));
    body.push_str(&format!("Long Range Forecast:\n{}\n{}\n\n", RULE, long_range));
    body.push_str(&format!(
        "{}\nThis email sent at your request on behalf of the forecast service.\n",
        RULE
    ));

    Ok(body)
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

// ---------------------------------------------------------------------------
// Sending
// ---------------------------------------------------------------------------

/// Sends the summary when due. Returns whether a message went out.
///
/// A document that cannot be summarised marks the summary sent with an
/// "Err" display so it is not retried all day. A failed send is only
/// logged; the next cycle tries again.
pub fn maybe_send<H: Host + ?Sized>(
    host: &mut H,
    device: &Device,
    document: &Value,
    prefs: &Prefs,
    now: NaiveDateTime,
) -> bool {
    let sent = host
        .state(device.id, SENT_STATE)
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    let last_sent = host.state(device.id, TIMESTAMP_STATE).map(|v| v.to_string());
    if !summary_due_at(device, sent, last_sent.as_deref(), now) {
        return false;
    }

    let body = match compose_summary(device, document, prefs.ui_wind_name) {
        Ok(body) => body,
        Err(e) => {
            logging::debug(
                Source::Email,
                Some(&device.name),
                &format!("Unable to compile forecast data: {e}"),
            );
            let update = StateUpdate::with_ui(SENT_STATE, true, "Err");
            if let Err(e) = host.update_states(device.id, &[update]) {
                logging::warn(Source::Device, Some(&device.name), &e.to_string());
            }
            return false;
        }
    };

    if let Err(e) = host.send_email(&prefs.updater_email, SUBJECT, &body) {
        logging::warn(
            Source::Email,
            Some(&device.name),
            &format!("Unable to send forecast email message. Will keep trying. {e}"),
        );
        return false;
    }

    let updates = [
        StateUpdate::new(SENT_STATE, true),
        StateUpdate::new(
            TIMESTAMP_STATE,
            StateValue::Text(now.format("%Y-%m-%d").to_string()),
        ),
    ];
    if let Err(e) = host.update_states(device.id, &updates) {
        logging::warn(Source::Device, Some(&device.name), &e.to_string());
    }
    true
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
