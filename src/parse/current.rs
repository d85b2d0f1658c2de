/// Current conditions (`currently`) for Weather devices.
///
/// Every numeric quantity is published twice: the normalized reading with
/// its formatted display, and an integer `*Icon` companion that host UIs
/// use to pick an image.

use serde_json::Value;

use crate::analysis::format::{self, item_list_temperature, wind_name_for};
use crate::analysis::lookup::{lookup, lookup_text};
use crate::analysis::normalize::{normalize, normalize_percent};
use crate::model::{
    DisplayState, ParseError, Reading, SENTINEL_TEXT, SensorIcon, StateList, StateUpdate,
};
use crate::parse::{ParseContext, Parsed, observation_states};

/// Pushes a reading and its rounded icon companion.
fn push_measure(states: &mut StateList, key: &str, reading: &Reading, ui: String) {
    states.push(StateUpdate::reading(key, reading, ui));
    states.push(StateUpdate::new(format!("{key}Icon"), reading.icon()));
}

pub fn parse(document: &Value, ctx: &ParseContext<'_>) -> Result<Parsed, ParseError> {
    let currently = lookup(document, &["currently"])
        .filter(|c| c.is_object())
        .ok_or_else(|| ParseError::MissingSection("currently".into()))?;
    let field = |name: &str| lookup(currently, &[name]);
    let p = ctx.precision;
    let u = ctx.units;

    let mut states = observation_states(document, &ctx.formats)?;

    let apparent = normalize(field("apparentTemperature"));
    push_measure(&mut states, "apparentTemperature", &apparent,
        format::temperature(&apparent.text, p.temperature, &u.temperature));

    let cloud_cover = normalize_percent(field("cloudCover"));
    push_measure(&mut states, "cloudCover", &cloud_cover,
        format::percentage(&cloud_cover.text, p.percentage, &u.percentage));

    let dew_point = normalize(field("dewPoint"));
    push_measure(&mut states, "dewpoint", &dew_point,
        format::temperature(&dew_point.text, p.temperature, &u.temperature));

    let humidity = normalize_percent(field("humidity"));
    push_measure(&mut states, "humidity", &humidity,
        format::percentage(&humidity.text, p.percentage, &u.percentage));

    states.push(StateUpdate::new("icon", format::icon_name(&lookup_text(currently, &["icon"]))));

    let storm_bearing = normalize(field("nearestStormBearing"));
    push_measure(&mut states, "nearestStormBearing", &storm_bearing,
        format::index(&storm_bearing.text, p.index, &u.index));

    let storm_distance = normalize(field("nearestStormDistance"));
    push_measure(&mut states, "nearestStormDistance", &storm_distance,
        format::distance(&storm_distance.text, p.distance, &u.distance));

    let ozone = normalize(field("ozone"));
    push_measure(&mut states, "ozone", &ozone, format::index(&ozone.text, p.index, &u.index));

    let pressure = normalize(field("pressure"));
    push_measure(&mut states, "pressure", &pressure,
        format::pressure(&pressure.text, p.index, &u.pressure));

    let precip_intensity = normalize(field("precipIntensity"));
    push_measure(&mut states, "precipIntensity", &precip_intensity,
        format::rain(&precip_intensity.text, p.rain, &u.rain));

    let precip_probability = normalize_percent(field("precipProbability"));
    push_measure(&mut states, "precipProbability", &precip_probability,
        format::percentage(&precip_probability.text, p.percentage, &u.percentage));

    states.push(StateUpdate::new("summary", lookup_text(currently, &["summary"])));

    let temperature = normalize(field("temperature"));
    push_measure(&mut states, "temperature", &temperature,
        format::temperature(&temperature.text, p.temperature, &u.temperature));

    let uv = normalize(field("uvIndex"));
    push_measure(&mut states, "uv", &uv, format::index(&uv.text, p.index, &u.index));

    let visibility = normalize(field("visibility"));
    push_measure(&mut states, "visibility", &visibility,
        format::distance(&visibility.text, p.distance, &u.distance));

    // Fractional bearings are noise; show whole degrees.
    let wind_bearing = normalize(field("windBearing"));
    let bearing_ui = if wind_bearing.is_sentinel() {
        SENTINEL_TEXT.to_string()
    } else {
        format!("{}", wind_bearing.value as i64)
    };
    push_measure(&mut states, "windBearing", &wind_bearing, bearing_ui);
    let bearing_name = wind_name_for(&wind_bearing, ctx.wind_names);
    states.push(StateUpdate::new("windBearingName", bearing_name.clone()));

    let wind_gust = normalize(field("windGust"));
    push_measure(&mut states, "windGust", &wind_gust,
        format::wind(&wind_gust.text, p.wind, &u.wind));

    let wind_speed = normalize(field("windSpeed"));
    push_measure(&mut states, "windSpeed", &wind_speed,
        format::wind(&wind_speed.text, p.wind, &u.wind));

    let speed_text = if wind_speed.is_sentinel() {
        SENTINEL_TEXT.to_string()
    } else {
        format!("{:.0}", wind_speed.value.round())
    };
    states.push(StateUpdate::new(
        "windString",
        format!("{} at {}{}", bearing_name, speed_text, u.wind),
    ));

    let display = DisplayState::online(
        item_list_temperature(&temperature, p.item_list_temperature, &u.temperature),
        SensorIcon::TemperatureSensorOn,
    );

    Ok(Parsed {
        states,
        display: Some(display),
    })
}
