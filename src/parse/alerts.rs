/// Severe weather alerts into the five alert slots of a Weather device.
///
/// Every slot is written on every parse, either with an alert or with a
/// blank, so alerts that have expired upstream disappear from the device.

use serde_json::Value;

use crate::analysis::clock::{self, TimePreference, Zone};
use crate::analysis::lookup::lookup;
use crate::logging::{self, Source};
use crate::model::{ALERT_SLOTS, ParseError, StateList, StateUpdate};
use crate::parse::{ParseContext, Parsed, document_zone};

const NOT_PROVIDED: &str = "Not provided.";

const SLOT_STATES: [&str; 7] = [
    "alertDescription",
    "alertExpires",
    "alertRegions",
    "alertSeverity",
    "alertTime",
    "alertTitle",
    "alertUri",
];

/// Width used when alert descriptions are written to the log.
const LOG_WRAP_WIDTH: usize = 120;

/// One alert with every field resolved to display text.
#[derive(Debug, Clone, PartialEq)]
struct AlertText {
    description: String,
    expires: String,
    regions: String,
    severity: String,
    time: String,
    title: String,
    uri: String,
}

pub fn parse(document: &Value, ctx: &ParseContext<'_>) -> Result<Parsed, ParseError> {
    let alerts: &[Value] = match lookup(document, &["alerts"]) {
        Some(Value::Array(items)) => items,
        Some(_) => return Err(ParseError::MissingSection("alerts".into())),
        None => &[],
    };
    let present = lookup(document, &["alerts"]).is_some();

    let resolved = alerts
        .iter()
        .take(ALERT_SLOTS)
        .map(|alert| resolve(alert, document, ctx))
        .collect::<Result<Vec<_>, _>>()?;

    let mut states = StateList::new();
    for slot in 1..=ALERT_SLOTS {
        match resolved.get(slot - 1) {
            Some(alert) => {
                states.push(StateUpdate::new(format!("alertDescription{slot}"), alert.description.clone()));
                states.push(StateUpdate::new(format!("alertExpires{slot}"), alert.expires.clone()));
                states.push(StateUpdate::new(format!("alertRegions{slot}"), alert.regions.clone()));
                states.push(StateUpdate::new(format!("alertSeverity{slot}"), alert.severity.clone()));
                states.push(StateUpdate::new(format!("alertTime{slot}"), alert.time.clone()));
                states.push(StateUpdate::new(format!("alertTitle{slot}"), alert.title.clone()));
                states.push(StateUpdate::new(format!("alertUri{slot}"), alert.uri.clone()));
            }
            None => {
                for name in SLOT_STATES {
                    states.push(StateUpdate::with_ui(format!("{name}{slot}"), " ", " "));
                }
            }
        }
    }

    states.push(StateUpdate::with_ui(
        "alertStatus",
        present,
        if present { "True" } else { "False" },
    ));
    states.push(StateUpdate::new("alertCount", alerts.len() as i64));

    if ctx.alert_logging.active() {
        log_alerts(ctx, present, alerts);
    }

    Ok(Parsed {
        states,
        display: None,
    })
}

fn resolve(alert: &Value, document: &Value, ctx: &ParseContext<'_>) -> Result<AlertText, ParseError> {
    let text = |field: &str| match alert.get(field) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => NOT_PROVIDED.to_string(),
        Some(other) => other.to_string(),
    };
    let regions = match alert.get("regions") {
        Some(Value::Array(items)) => items
            .iter()
            .map(|r| r.as_str().map(str::to_string).unwrap_or_else(|| r.to_string()))
            .collect::<Vec<_>>()
            .join(", "),
        _ => text("regions"),
    };

    Ok(AlertText {
        description: text("description").trim().to_string(),
        expires: alert_time(alert.get("expires"), document, ctx)?,
        regions,
        severity: text("severity"),
        time: alert_time(alert.get("time"), document, ctx)?,
        title: text("title").trim().to_string(),
        uri: text("uri"),
    })
}

/// "Time here" uses a fixed ISO-style stamp; "time there" follows the user's
/// date and time preferences in the location's zone.
fn alert_time(raw: Option<&Value>, document: &Value, ctx: &ParseContext<'_>) -> Result<String, ParseError> {
    let Some(epoch) = raw.and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64))) else {
        return Ok(NOT_PROVIDED.to_string());
    };
    match ctx.time_zone {
        TimePreference::TimeHere => {
            let local = clock::localize(epoch, Zone::Server)?;
            Ok(local.format("%Y-%m-%d %H:%M").to_string())
        }
        TimePreference::TimeThere => {
            let local = clock::localize(epoch, document_zone(document)?)?;
            Ok(local.format(&ctx.formats.date_time()).to_string())
        }
    }
}

fn log_alerts(ctx: &ParseContext<'_>, present: bool, alerts: &[Value]) {
    let device = Some(ctx.device_name);
    if !present || alerts.is_empty() {
        if ctx.alert_logging.log_when_clear {
            logging::info(Source::Device, device, "There are no severe weather alerts.");
        }
        return;
    }

    match alerts.len() {
        1 => logging::info(Source::Device, device, "There is 1 severe weather alert."),
        n if n <= ALERT_SLOTS => logging::info(
            Source::Device,
            device,
            &format!("There are {n} severe weather alerts."),
        ),
        _ => logging::info(
            Source::Device,
            device,
            &format!("Only the first {ALERT_SLOTS} alerts are retained."),
        ),
    }

    for alert in alerts {
        let description = alert
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or(NOT_PROVIDED)
            .trim();
        let wrapped = wrap(description, LOG_WRAP_WIDTH);
        logging::info(Source::Device, device, &format!("\n{wrapped}"));
    }
}

/// Wraps a description for the log. Words longer than `width` are split.
fn wrap(text: &str, width: usize) -> String {
    textwrap::wrap(text, width).join("\n")
}
