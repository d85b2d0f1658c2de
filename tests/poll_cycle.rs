/// Integration tests for the poll cycle
///
/// These tests drive `Poller` against a scripted forecast source and a
/// simulated `LocalHost`, so no network access or real sleeping is needed.
/// They cover:
/// 1. Corrupt and fractional readings as they land in device states
/// 2. Staleness: only strictly newer observations are applied
/// 3. Alert slots are cleared when alerts expire upstream
/// 4. Transient failures back off and retry, and shutdown ends the wait
/// 5. Offline and severe weather triggers after a cycle
/// 6. Devices that are skipped or fail still show a status
///
/// Run with: cargo test --test poll_cycle

use std::cell::RefCell;
use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Value, json};

use forecast_service::config::parse_config;
use forecast_service::host::{Host, LocalHost};
use forecast_service::ingest::darksky::{Fetched, WeatherSource};
use forecast_service::model::{DisplayState, FetchError, LocationKey, StateValue, Stopped};
use forecast_service::poll::Poller;

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

const OBSERVED: i64 = 1_717_441_500;

/// Hands out scripted responses in order; an exhausted script is a 503.
struct Scripted {
    responses: RefCell<VecDeque<Result<Value, FetchError>>>,
    calls: RefCell<usize>,
}

impl Scripted {
    fn new(responses: Vec<Result<Value, FetchError>>) -> Self {
        Self {
            responses: RefCell::new(responses.into()),
            calls: RefCell::new(0),
        }
    }

    fn calls(&self) -> usize {
        *self.calls.borrow()
    }
}

impl WeatherSource for Scripted {
    fn fetch(&self, _location: &LocationKey) -> Result<Fetched, FetchError> {
        *self.calls.borrow_mut() += 1;
        let next = self
            .responses
            .borrow_mut()
            .pop_front()
            .unwrap_or(Err(FetchError::HttpStatus(503)));
        next.map(|document| Fetched { document, api_calls: Some(42) })
    }
}

const CONFIG: &str = r#"
    [prefs]
    api_key = "test-key"

    [[devices]]
    id = 1
    name = "Peoria"
    kind = "weather"
    latitude = "40.69"
    longitude = "-89.59"
    units = { temperature = "°F", percentage = "%" }

    [[triggers]]
    id = 10
    name = "Peoria offline"
    kind = "weather_site_offline"
    device = 1
    offline_timer = 60

    [[triggers]]
    id = 11
    name = "Peoria severe weather"
    kind = "weather_alert"
    device = 1
"#;

fn host(budget: Option<usize>) -> LocalHost {
    LocalHost::new(parse_config(CONFIG).unwrap()).simulated(budget)
}

fn at(epoch: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(epoch, 0).unwrap()
}

fn alert(title: &str) -> Value {
    json!({
        "title": title,
        "severity": "warning",
        "time": OBSERVED - 600,
        "expires": OBSERVED + 7200,
        "description": "Flooding is occurring or is imminent.",
        "uri": "https://alerts.weather.gov/example",
        "regions": ["Peoria", "Tazewell"]
    })
}

/// A minimal document for a Weather device.
fn document(observed: i64, temperature: f64, alerts: Option<Vec<Value>>) -> Value {
    let mut doc = json!({
        "latitude": 40.69,
        "longitude": -89.59,
        "timezone": "America/Chicago",
        "currently": {
            "time": observed,
            "summary": "Clear",
            "icon": "clear-day",
            "temperature": temperature,
            "apparentTemperature": 72.0,
            "humidity": 0.55,
            "windBearing": 95,
            "windSpeed": 5.0
        }
    });
    if let Some(alerts) = alerts {
        doc["alerts"] = Value::Array(alerts);
    }
    doc
}

fn display(host: &LocalHost, id: i64) -> Option<DisplayState> {
    host.record(id).and_then(|r| r.display.clone())
}

fn ui(host: &LocalHost, key: &str) -> String {
    host.record(1).unwrap().states[key].ui_value.clone()
}

// ---------------------------------------------------------------------------
// Published states
// ---------------------------------------------------------------------------

#[test]
fn test_cycle_publishes_cleaned_readings() {
    let source = Scripted::new(vec![Ok(document(OBSERVED, -999.0, None))]);
    let mut poller = Poller::new(source, host(None));

    let summary = poller.refresh_weather_data_at(at(OBSERVED + 120)).unwrap();
    assert_eq!(summary.updated, 1);

    let h = poller.host();
    assert_eq!(h.state(1, "temperature"), Some(StateValue::Number(-99.0)));
    assert_eq!(ui(h, "temperature"), "--");
    assert_eq!(h.state(1, "humidity"), Some(StateValue::Number(55.0)));
    assert_eq!(ui(h, "humidity"), "55.0%");
    assert_eq!(h.state(1, "windBearingName"), Some(StateValue::Text("East".into())));
    assert_eq!(h.state(1, "currentObservationEpoch"), Some(StateValue::Integer(OBSERVED)));
    assert_eq!(h.prefs().daily_call_counter, 42);
}

#[test]
fn test_only_newer_observations_are_applied() {
    let source = Scripted::new(vec![
        Ok(document(OBSERVED, 70.0, None)),
        Ok(document(OBSERVED, 71.0, None)),
        Ok(document(OBSERVED - 300, 72.0, None)),
        Ok(document(OBSERVED + 300, 73.0, None)),
    ]);
    let mut poller = Poller::new(source, host(None));
    let now = at(OBSERVED + 600);

    assert_eq!(poller.refresh_weather_data_at(now).unwrap().updated, 1);
    assert_eq!(poller.refresh_weather_data_at(now).unwrap().skipped, 1, "same observation");
    assert_eq!(poller.refresh_weather_data_at(now).unwrap().skipped, 1, "older observation");
    assert_eq!(poller.refresh_weather_data_at(now).unwrap().updated, 1, "newer observation");

    assert_eq!(poller.host().state(1, "temperature"), Some(StateValue::Number(73.0)));
}

#[test]
fn test_expired_alerts_clear_their_slots() {
    let source = Scripted::new(vec![
        Ok(document(
            OBSERVED,
            70.0,
            Some(vec![alert("Flood Warning"), alert("Flood Watch"), alert("Heat Advisory")]),
        )),
        Ok(document(OBSERVED + 300, 70.0, None)),
    ]);
    let mut poller = Poller::new(source, host(None));

    poller.refresh_weather_data_at(at(OBSERVED + 60)).unwrap();
    let h = poller.host();
    assert_eq!(h.state(1, "alertStatus"), Some(StateValue::Bool(true)));
    assert_eq!(h.state(1, "alertTitle3"), Some(StateValue::Text("Heat Advisory".into())));
    assert_eq!(h.state(1, "alertRegions1"), Some(StateValue::Text("Peoria, Tazewell".into())));
    assert_eq!(h.state(1, "alertTitle4"), Some(StateValue::Text(" ".into())));

    poller.refresh_weather_data_at(at(OBSERVED + 360)).unwrap();
    let h = poller.host();
    assert_eq!(h.state(1, "alertStatus"), Some(StateValue::Bool(false)));
    assert_eq!(ui(h, "alertStatus"), "False");
    for slot in 1..=5 {
        for name in ["alertTitle", "alertDescription", "alertUri"] {
            assert_eq!(
                h.state(1, &format!("{name}{slot}")),
                Some(StateValue::Text(" ".into())),
                "{name}{slot} should be blank"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Communication failures
// ---------------------------------------------------------------------------

#[test]
fn test_transient_failures_back_off_then_recover() {
    let source = Scripted::new(vec![
        Err(FetchError::HttpStatus(503)),
        Err(FetchError::Timeout("read timed out".into())),
        Ok(document(OBSERVED, 70.0, None)),
    ]);
    let mut poller = Poller::new(source, host(None));

    let summary = poller.refresh_weather_data_at(at(OBSERVED + 60)).unwrap();
    assert_eq!(summary.updated, 1);

    let h = poller.host();
    assert_eq!(h.sleeps(), &[Duration::from_secs(10), Duration::from_secs(20)]);
    let display = h.record(1).unwrap().display.clone().unwrap();
    assert!(display.is_online(), "a successful fetch clears \"No Comm\"");
}

#[test]
fn test_shutdown_while_backing_off_stops_the_cycle() {
    let source = Scripted::new(vec![]);
    let mut poller = Poller::new(source, host(Some(2)));

    let result = poller.refresh_weather_data_at(at(OBSERVED + 60));
    assert_eq!(result, Err(Stopped));

    let h = poller.host();
    assert_eq!(h.sleeps().len(), 3);
    assert_eq!(h.record(1).unwrap().display.clone().unwrap(), DisplayState::off("No Comm"));
    assert_eq!(h.prefs().next_poll, "1970-01-01 00:00:00", "an abandoned cycle is not rescheduled");
}

#[test]
fn test_decode_failure_is_not_retried() {
    let source = Scripted::new(vec![Err(FetchError::Decode("expected value".into()))]);
    let mut poller = Poller::new(source, host(None));

    let summary = poller.refresh_weather_data_at(at(OBSERVED + 60)).unwrap();
    assert_eq!(summary.failed, 1);
    assert!(poller.host().sleeps().is_empty());
    assert_eq!(
        poller.host().record(1).unwrap().display.clone().unwrap(),
        DisplayState::off("No Comm")
    );
}

#[test]
fn test_decode_failure_fails_every_device_at_the_location() {
    let config = r#"
        [prefs]
        api_key = "test-key"

        [[devices]]
        id = 1
        name = "Peoria"
        kind = "weather"
        latitude = "40.69"
        longitude = "-89.59"

        [[devices]]
        id = 2
        name = "Peoria Hourly"
        kind = "hourly"
        latitude = "40.69"
        longitude = "-89.59"
    "#;
    let host = LocalHost::new(parse_config(config).unwrap()).simulated(None);
    let source = Scripted::new(vec![Err(FetchError::Decode("expected value".into()))]);
    let mut poller = Poller::new(source, host);

    let summary = poller.refresh_weather_data_at(at(OBSERVED + 60)).unwrap();
    assert_eq!(summary.failed, 2);
    assert_eq!(poller.source().calls(), 1, "the bad body is not fetched twice");
    for id in [1, 2] {
        assert_eq!(display(poller.host(), id), Some(DisplayState::off("No Comm")), "device {id}");
    }
}

#[test]
fn test_document_without_observation_time_leaves_display_alone() {
    let mut doc = document(OBSERVED, 70.0, None);
    doc["currently"].as_object_mut().unwrap().remove("time");
    let source = Scripted::new(vec![Ok(doc)]);
    let mut poller = Poller::new(source, host(None));

    let summary = poller.refresh_weather_data_at(at(OBSERVED + 60)).unwrap();
    assert_eq!(summary.skipped, 1);
    assert_eq!(display(poller.host(), 1), None, "no reading means no online status");
}

#[test]
fn test_unconfigured_device_is_shown_off() {
    let config = r#"
        [prefs]
        api_key = "test-key"

        [[devices]]
        id = 1
        name = "New device"
        kind = "weather"
        latitude = "40.69"
        longitude = "-89.59"
        configured = false
    "#;
    let host = LocalHost::new(parse_config(config).unwrap()).simulated(None);
    let mut poller = Poller::new(Scripted::new(vec![]), host);

    let summary = poller.refresh_weather_data_at(at(OBSERVED + 60)).unwrap();
    assert_eq!(summary.skipped, 1);
    assert_eq!(poller.source().calls(), 0);
    let shown = display(poller.host(), 1).unwrap();
    assert!(!shown.is_online());
    assert_eq!(shown, DisplayState::off(" "));
}

// ---------------------------------------------------------------------------
// Triggers
// ---------------------------------------------------------------------------

#[test]
fn test_implausible_temperature_marks_location_offline() {
    let source = Scripted::new(vec![Ok(document(OBSERVED, -999.0, None))]);
    let mut poller = Poller::new(source, host(None));

    poller.run_cycle_at(at(OBSERVED + 120)).unwrap();

    let h = poller.host();
    assert_eq!(h.executed_triggers(), &[10]);
    assert_eq!(h.record(1).unwrap().display.clone().unwrap(), DisplayState::location_offline());
}

#[test]
fn test_silent_location_fires_offline_trigger() {
    let source = Scripted::new(vec![Ok(document(OBSERVED, 70.0, None))]);
    let mut poller = Poller::new(source, host(None));

    poller.refresh_weather_data_at(at(OBSERVED + 120)).unwrap();
    assert!(poller.process_triggers_at(at(OBSERVED + 1800)).is_empty(), "30 minutes is within the timer");

    let firings = poller.process_triggers_at(at(OBSERVED + 7200));
    assert_eq!(firings.len(), 1);
    assert_eq!(
        firings[0].message("Peoria"),
        "Peoria location appears to be offline for 0 days, 2 hrs, 0 mins"
    );
    assert_eq!(poller.host().executed_triggers(), &[10]);
}

#[test]
fn test_active_alerts_fire_severe_weather_trigger() {
    let source = Scripted::new(vec![Ok(document(OBSERVED, 70.0, Some(vec![alert("Tornado Warning")])))]);
    let mut poller = Poller::new(source, host(None));

    poller.run_cycle_at(at(OBSERVED + 120)).unwrap();

    assert_eq!(poller.source().calls(), 1);
    assert_eq!(poller.host().executed_triggers(), &[11]);
}
