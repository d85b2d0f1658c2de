/// Hourly forecast (`hourly.data`) for Hourly devices.
///
/// Only the first 24 entries are published, as `h01_` through `h24_`.

use serde_json::Value;

use crate::analysis::clock;
use crate::analysis::format::{self, wind_name_for};
use crate::analysis::lookup::{lookup, lookup_text};
use crate::analysis::normalize::{normalize, normalize_percent};
use crate::model::{DisplayState, HOURLY_CAP, ParseError, SensorIcon, StateUpdate};
use crate::parse::{
    ParseContext, Parsed, entry_epoch, forecast_entries, observation_states, preferred_zone,
    slot_prefix, text_state,
};

pub fn parse(document: &Value, ctx: &ParseContext<'_>) -> Result<Parsed, ParseError> {
    let entries = forecast_entries(document, "hourly")?;
    let zone = preferred_zone(document, ctx.time_zone)?;
    let p = ctx.precision;
    let u = ctx.units;

    let mut states = vec![StateUpdate::new(
        "hourly_summary",
        lookup_text(document, &["hourly", "summary"]),
    )];
    states.extend(observation_states(document, &ctx.formats)?);

    let mut shown_temperature = 0_i64;

    for (index, entry) in entries.iter().take(HOURLY_CAP).enumerate() {
        let number = index + 1;
        let prefix = slot_prefix('h', number);
        let key = |name: &str| format!("{prefix}{name}");
        let field = |name: &str| lookup(entry, &[name]);

        let epoch = entry_epoch(entry, "hourly", number)?;
        let local = clock::localize(epoch, zone)?;
        let day_long = local.format("%A").to_string();
        let day_short = local.format("%a").to_string();
        states.push(StateUpdate::with_ui(key("day"), day_long.clone(), day_long));
        states.push(StateUpdate::with_ui(key("day_short"), day_short.clone(), day_short));
        states.push(StateUpdate::new(key("epoch"), epoch));
        states.push(StateUpdate::with_ui(
            key("hour"),
            local.format("%H:%M").to_string(),
            local.format(&ctx.formats.time).to_string(),
        ));

        let cloud_cover = normalize_percent(field("cloudCover"));
        states.push(StateUpdate::reading(key("cloudCover"), &cloud_cover,
            format::percentage(&cloud_cover.text, p.percentage, &u.percentage)));

        let humidity = normalize_percent(field("humidity"));
        states.push(StateUpdate::reading(key("humidity"), &humidity,
            format::percentage(&humidity.text, p.percentage, &u.percentage)));

        let intensity = normalize(field("precipIntensity"));
        states.push(StateUpdate::reading(key("precipIntensity"), &intensity,
            format::rain(&intensity.text, p.rain, &u.rain)));

        let chance = normalize_percent(field("precipProbability"));
        states.push(StateUpdate::reading(key("precipChance"), &chance,
            format::percentage(&chance.text, p.percentage, &u.percentage)));

        states.push(StateUpdate::new(key("icon"), format::icon_name(&lookup_text(entry, &["icon"]))));

        let ozone = normalize(field("ozone"));
        states.push(StateUpdate::reading(key("ozone"), &ozone,
            format::index(&ozone.text, p.index, &u.index)));

        states.push(text_state(key("precipType"), entry, "precipType"));

        let pressure = normalize(field("pressure"));
        states.push(StateUpdate::reading(key("pressure"), &pressure,
            format::pressure(&pressure.text, p.index, &u.pressure)));

        states.push(text_state(key("summary"), entry, "summary"));

        let temperature = normalize(field("temperature"));
        states.push(StateUpdate::reading(key("temperature"), &temperature,
            format::temperature(&temperature.text, p.temperature, &u.temperature)));
        if number == ctx.ui_display {
            shown_temperature = temperature.icon();
        }

        let uv = normalize(field("uvIndex"));
        states.push(StateUpdate::reading(key("uvIndex"), &uv, format::index(&uv.text, p.index, &u.index)));

        let bearing = normalize(field("windBearing"));
        states.push(StateUpdate::reading(key("windBearing"), &bearing, bearing.text.clone()));
        states.push(StateUpdate::new(key("windBearingName"), wind_name_for(&bearing, ctx.wind_names)));

        let gust = normalize(field("windGust"));
        states.push(StateUpdate::reading(key("windGust"), &gust, format::wind(&gust.text, p.wind, &u.wind)));

        let speed = normalize(field("windSpeed"));
        states.push(StateUpdate::reading(key("windSpeed"), &speed, format::wind(&speed.text, p.wind, &u.wind)));

        let visibility = normalize(field("visibility"));
        states.push(StateUpdate::reading(key("visibility"), &visibility,
            format::distance(&visibility.text, p.distance, &u.distance)));
    }

    let display = DisplayState::online(
        format!("{}{}", shown_temperature, u.temperature),
        SensorIcon::SensorOn,
    );

    Ok(Parsed {
        states,
        display: Some(display),
    })
}
