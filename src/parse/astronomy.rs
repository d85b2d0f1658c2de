/// Sunrise, sunset and moon phase for Astronomy devices.
///
/// The fields come from the first `daily.data` entry that carries each of
/// them, which in practice is today.

use serde_json::Value;

use crate::analysis::clock;
use crate::analysis::format::{self, moon_phase_name};
use crate::analysis::lookup::{lookup, lookup_epoch};
use crate::analysis::normalize::{coerce_f64, normalize_f64, normalize_percent};
use crate::model::{DisplayState, ParseError, SensorIcon, StateUpdate};
use crate::parse::{ParseContext, Parsed, forecast_entries, observation_states, preferred_zone};

pub fn parse(document: &Value, ctx: &ParseContext<'_>) -> Result<Parsed, ParseError> {
    forecast_entries(document, "daily")?;
    let zone = preferred_zone(document, ctx.time_zone)?;
    let p = ctx.precision;
    let u = ctx.units;

    let mut states = observation_states(document, &ctx.formats)?;

    for name in ["sunriseTime", "sunsetTime"] {
        let epoch = lookup_epoch(document, &["daily", "data", name])
            .ok_or_else(|| ParseError::MissingField(format!("daily.data.{name}")))?;
        let local = clock::localize(epoch, zone)?;
        states.push(StateUpdate::new(name, local.format(&ctx.formats.date_time()).to_string()));
        states.push(StateUpdate::new(
            format!("{name}Short"),
            local.format(&ctx.formats.time).to_string(),
        ));
    }

    let raw_phase = lookup(document, &["daily", "data", "moonPhase"]);
    let phase = raw_phase
        .and_then(coerce_f64)
        .ok_or_else(|| ParseError::MissingField("daily.data.moonPhase".into()))?;

    let percent = normalize_percent(raw_phase);
    states.push(StateUpdate::reading("moonPhase", &percent,
        format::percentage(&percent.text, p.percentage, &u.percentage)));

    let whole = normalize_f64(percent.value.trunc());
    states.push(StateUpdate::reading("moonPhaseIcon", &whole,
        format::percentage(&whole.text, p.percentage, &u.percentage)));

    states.push(StateUpdate::new("moonPhaseName", moon_phase_name(phase)));

    Ok(Parsed {
        states,
        display: Some(DisplayState::online(" ", SensorIcon::SensorOn)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StateValue;
    use crate::parse::fixtures::*;
    use serde_json::json;

    #[test]
    fn test_sun_times_in_location_zone() {
        let parsed = parse(&document(), &context()).unwrap();
        let s = &parsed.states;
        assert_eq!(value_of(s, "sunriseTime"), &StateValue::Text("2024-06-03 05:30".into()));
        assert_eq!(value_of(s, "sunriseTimeShort"), &StateValue::Text("05:30".into()));
        assert_eq!(value_of(s, "sunsetTime"), &StateValue::Text("2024-06-03 20:15".into()));
        assert_eq!(value_of(s, "sunsetTimeShort"), &StateValue::Text("20:15".into()));
    }

    #[test]
    fn test_moon_phase_states() {
        let parsed = parse(&document(), &context()).unwrap();
        let s = &parsed.states;
        assert_eq!(value_of(s, "moonPhase"), &StateValue::Number(90.0));
        assert_eq!(ui_of(s, "moonPhase"), Some("90.0%"));
        assert_eq!(value_of(s, "moonPhaseIcon"), &StateValue::Number(90.0));
        assert_eq!(value_of(s, "moonPhaseName"), &StateValue::Text("Waning Crescent".into()));
        assert_eq!(parsed.display.unwrap().ui_value, " ");
    }

    #[test]
    fn test_fields_found_in_later_entries() {
        let mut doc = document();
        doc["daily"]["data"][0].as_object_mut().unwrap().remove("moonPhase");
        doc["daily"]["data"][1]["moonPhase"] = json!(0.25);
        let parsed = parse(&doc, &context()).unwrap();
        assert_eq!(
            value_of(&parsed.states, "moonPhaseName"),
            &StateValue::Text("First Quarter".into())
        );
    }

    #[test]
    fn test_missing_moon_phase_fails() {
        let mut doc = document();
        for day in doc["daily"]["data"].as_array_mut().unwrap() {
            day.as_object_mut().unwrap().remove("moonPhase");
        }
        assert_eq!(
            parse(&doc, &context()).unwrap_err(),
            ParseError::MissingField("daily.data.moonPhase".into())
        );
    }
}
