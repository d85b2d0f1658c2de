/// Forecast API client
///
/// Retrieves one forecast document per location from the Dark Sky style
/// `forecast/{key}/{lat},{long}` endpoint. The document is kept as untyped
/// JSON: every section is optional and the parsers look fields up by path.
///
/// API Documentation: https://darksky.net/dev/docs

use std::time::Duration;

use serde_json::Value;

use crate::config::{HTTP_TIMEOUT, Prefs};
use crate::host::Host;
use crate::logging::{self, Source};
use crate::model::{DisplayState, FetchError, LocationKey};

/// Response header carrying the number of calls made today.
pub const CALLS_HEADER: &str = "X-Forecast-API-Calls";

/// First retry delay, also the per-attempt increment.
pub const BACKOFF_STEP: Duration = Duration::from_secs(10);

/// Delays grow by one step until they reach this ceiling.
pub const BACKOFF_CEILING: Duration = Duration::from_secs(60);

/// Delay used for every retry after the ceiling.
pub const LONG_RETRY: Duration = Duration::from_secs(900);

// ============================================================================
// Source seam
// ============================================================================

/// A decoded forecast plus the call count the API reported with it.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched {
    pub document: Value,
    pub api_calls: Option<u32>,
}

/// One GET per location. Implementations do not retry.
pub trait WeatherSource {
    fn fetch(&self, location: &LocationKey) -> Result<Fetched, FetchError>;
}

impl<T: WeatherSource + ?Sized> WeatherSource for &T {
    fn fetch(&self, location: &LocationKey) -> Result<Fetched, FetchError> {
        (**self).fetch(location)
    }
}

// ============================================================================
// HTTP client
// ============================================================================

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout(err.to_string())
        } else if err.is_decode() {
            FetchError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            FetchError::HttpStatus(status.as_u16())
        } else {
            FetchError::Transport(err.to_string())
        }
    }
}

pub struct DarkSkyClient {
    client: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
    units: String,
    language: String,
}

impl DarkSkyClient {
    pub fn new(prefs: &Prefs) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: prefs.base_url.trim_end_matches('/').to_string(),
            api_key: prefs.api_key.clone(),
            units: prefs.units.clone(),
            language: prefs.language.clone(),
        })
    }

    /// Minutely data is never used, so it is excluded to keep responses small.
    pub fn forecast_url(&self, location: &LocationKey) -> String {
        build_forecast_url(
            &self.base_url,
            &self.api_key,
            location,
            &self.units,
            &self.language,
        )
    }
}

pub fn build_forecast_url(
    base_url: &str,
    api_key: &str,
    location: &LocationKey,
    units: &str,
    language: &str,
) -> String {
    format!(
        "{}/{}/{},{}?exclude=minutely&units={}&lang={}",
        base_url,
        api_key,
        location.latitude.trim(),
        location.longitude.trim(),
        units,
        language
    )
}

impl WeatherSource for DarkSkyClient {
    fn fetch(&self, location: &LocationKey) -> Result<Fetched, FetchError> {
        logging::debug(Source::Api, None, &format!("Requesting forecast for {}", location));

        let response = self
            .client
            .get(self.forecast_url(location))
            .header("Accept", "application/json")
            .send()?;

        if !response.status().is_success() {
            return Err(FetchError::HttpStatus(response.status().as_u16()));
        }

        let api_calls = response
            .headers()
            .get(CALLS_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u32>().ok());

        let body = response.text()?;
        let document = serde_json::from_str(&body).map_err(|e| FetchError::Decode(e.to_string()))?;

        Ok(Fetched {
            document,
            api_calls,
        })
    }
}

// ============================================================================
// Retry with backoff
// ============================================================================

/// Retry delays: 10s, 20s, ... 60s, then 900s forever.
#[derive(Debug, Clone)]
pub struct Backoff {
    next: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self { next: BACKOFF_STEP }
    }
}

impl Backoff {
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = if delay < BACKOFF_CEILING {
            delay + BACKOFF_STEP
        } else {
            LONG_RETRY
        };
        delay
    }
}

/// Fetches `location`, retrying transient failures until one succeeds or
/// shutdown is requested.
///
/// While waiting, every device is shown as "No Comm" and `comm_error` is
/// raised so the cycle knows its displays are stale. Decode failures are
/// returned immediately: retrying would get the same body.
pub fn fetch_with_backoff<S, H>(
    source: &S,
    location: &LocationKey,
    host: &mut H,
    comm_error: &mut bool,
) -> Result<Fetched, FetchError>
where
    S: WeatherSource + ?Sized,
    H: Host + ?Sized,
{
    let mut backoff = Backoff::default();
    loop {
        match source.fetch(location) {
            Ok(fetched) => return Ok(fetched),
            Err(err) if err.is_transient() => {
                let delay = backoff.next_delay();
                logging::log_fetch_failure(location, "Forecast request for", &err);
                logging::warn(
                    Source::Api,
                    None,
                    &format!(
                        "Unable to reach the forecast service. Retrying in {} seconds.",
                        delay.as_secs()
                    ),
                );
                *comm_error = true;
                mark_all_offline(host);
                host.sleep(delay)?;
            }
            Err(err) => return Err(err),
        }
    }
}

fn mark_all_offline<H: Host + ?Sized>(host: &mut H) {
    for device in host.devices() {
        if let Err(e) = host.set_display(device.id, DisplayState::off("No Comm")) {
            logging::debug(Source::Device, Some(&device.name), &format!("Could not mark offline: {e}"));
        }
    }
}
