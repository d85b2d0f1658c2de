/// Daily forecast (`daily.data`) for Daily devices.
///
/// Only the first 8 entries are published, as `d01_` through `d08_`. Dates
/// are always rendered in the forecast location's timezone: a day that
/// starts at local midnight there may begin the previous evening here.

use serde_json::Value;

use crate::analysis::clock;
use crate::analysis::format::{self, wind_name_for};
use crate::analysis::lookup::{lookup, lookup_text};
use crate::analysis::normalize::{normalize, normalize_f64, normalize_percent};
use crate::model::{
    DAILY_CAP, DisplayState, ParseError, Reading, SensorIcon, StateUpdate,
};
use crate::parse::{
    ParseContext, Parsed, document_zone, entry_epoch, forecast_entries, observation_states,
    slot_prefix, text_state,
};

/// Expected total over 24 hours of a mean hourly intensity.
pub fn precip_total(intensity: &Reading) -> Reading {
    if intensity.is_sentinel() {
        return Reading::sentinel();
    }
    normalize_f64(intensity.value * 24.0)
}

pub fn parse(document: &Value, ctx: &ParseContext<'_>) -> Result<Parsed, ParseError> {
    let entries = forecast_entries(document, "daily")?;
    let zone = document_zone(document)?;
    let p = ctx.precision;
    let u = ctx.units;

    let mut states = vec![StateUpdate::new(
        "daily_summary",
        lookup_text(document, &["daily", "summary"]),
    )];
    states.extend(observation_states(document, &ctx.formats)?);

    let mut today_high = 0_i64;
    let mut today_low = 0_i64;

    for (index, entry) in entries.iter().take(DAILY_CAP).enumerate() {
        let number = index + 1;
        let prefix = slot_prefix('d', number);
        let key = |name: &str| format!("{prefix}{name}");
        let field = |name: &str| lookup(entry, &[name]);

        let cloud_cover = normalize_percent(field("cloudCover"));
        states.push(StateUpdate::reading(key("cloudCover"), &cloud_cover,
            format::percentage(&cloud_cover.text, p.percentage, &u.percentage)));

        let local = clock::localize(entry_epoch(entry, "daily", number)?, zone)?;
        let date = local.format("%Y-%m-%d").to_string();
        let day_long = local.format("%A").to_string();
        let day_short = local.format("%a").to_string();
        states.push(StateUpdate::with_ui(key("date"), date.clone(), date));
        states.push(StateUpdate::with_ui(key("day"), day_long.clone(), day_long));
        states.push(StateUpdate::with_ui(key("day_short"), day_short.clone(), day_short));

        let humidity = normalize_percent(field("humidity"));
        states.push(StateUpdate::reading(key("humidity"), &humidity,
            format::percentage(&humidity.text, p.percentage, &u.percentage)));

        states.push(StateUpdate::new(key("icon"), format::icon_name(&lookup_text(entry, &["icon"]))));

        let ozone = normalize(field("ozone"));
        states.push(StateUpdate::reading(key("ozone"), &ozone,
            format::index(&ozone.text, p.index, &u.index)));

        let intensity = normalize(field("precipIntensity"));
        states.push(StateUpdate::reading(key("precipIntensity"), &intensity,
            format::rain(&intensity.text, p.rain, &u.rain)));

        let chance = normalize_percent(field("precipProbability"));
        states.push(StateUpdate::reading(key("precipChance"), &chance,
            format::percentage(&chance.text, p.percentage, &u.percentage)));

        let total = precip_total(&intensity);
        states.push(StateUpdate::reading(key("precipTotal"), &total,
            format::rain(&total.text, p.rain, &u.rain)));

        states.push(text_state(key("precipType"), entry, "precipType"));

        let pressure = normalize(field("pressure"));
        states.push(StateUpdate::reading(key("pressure"), &pressure,
            format::pressure(&pressure.text, p.index, &u.pressure)));

        states.push(text_state(key("summary"), entry, "summary"));

        let high = normalize(field("temperatureHigh"));
        states.push(StateUpdate::reading(key("temperatureHigh"), &high,
            format::temperature(&high.text, p.temperature, &u.temperature)));

        let low = normalize(field("temperatureLow"));
        states.push(StateUpdate::reading(key("temperatureLow"), &low,
            format::temperature(&low.text, p.temperature, &u.temperature)));

        if number == 1 {
            today_high = high.icon();
            today_low = low.icon();
        }

        let uv = normalize(field("uvIndex"));
        states.push(StateUpdate::reading(key("uvIndex"), &uv, format::index(&uv.text, p.index, &u.index)));

        let visibility = normalize(field("visibility"));
        states.push(StateUpdate::reading(key("visibility"), &visibility,
            format::distance(&visibility.text, p.distance, &u.distance)));

        let bearing = normalize(field("windBearing"));
        states.push(StateUpdate::reading(key("windBearing"), &bearing, bearing.text.clone()));
        states.push(StateUpdate::new(key("windBearingName"), wind_name_for(&bearing, ctx.wind_names)));

        let gust = normalize(field("windGust"));
        states.push(StateUpdate::reading(key("windGust"), &gust, format::wind(&gust.text, p.wind, &u.wind)));

        let speed = normalize(field("windSpeed"));
        states.push(StateUpdate::reading(key("windSpeed"), &speed, format::wind(&speed.text, p.wind, &u.wind)));
    }

    let unit = &u.temperature;
    let display = DisplayState::online(
        format!("{today_high}{unit}/{today_low}{unit}"),
        SensorIcon::SensorOn,
    );

    Ok(Parsed {
        states,
        display: Some(display),
    })
}
