/// The poll orchestrator.
///
/// One thread, one loop: wake every 30 seconds, and when the scheduled poll
/// time has passed run a cycle:
///
/// ```text
///   Idle ─▶ Fetching ─▶ Parsing ─▶ (next device) ... ─▶ Triggers ─▶ Idle
/// ```
///
/// A cycle walks every device in order. Weather-bearing devices fetch their
/// location's document through a per-cycle cache, so devices sharing a
/// location cost one request. A device is only updated when the document's
/// observation is strictly newer than what the device already shows.
///
/// Failures are contained per device: a parse error marks that device off
/// and the cycle moves on. Only a shutdown request ends a cycle early.

use std::collections::HashMap;

use chrono::{DateTime, Local, NaiveDateTime, Utc};
use serde_json::Value;
use thiserror::Error;

use crate::alert::stalenesses::is_newer_observation;
use crate::alert::triggers::{DeviceSnapshot, Firing, evaluate_at};
use crate::config::{Device, Prefs, STARTUP_DELAY, WAKE_INTERVAL};
use crate::dump;
use crate::email;
use crate::host::Host;
use crate::ingest::darksky::{WeatherSource, fetch_with_backoff};
use crate::ingest::image::{ImageDownloader, ImageError};
use crate::logging::{self, Source};
use crate::model::{
    DeviceKind, DisplayState, FetchError, HostError, LocationKey, ParseError, SensorIcon, Stopped,
};
use crate::parse::{ParseContext, observation_epoch};

/// Wall-clock time on the server, as stored in the poll stamps.
pub fn server_time(now: DateTime<Utc>) -> NaiveDateTime {
    now.with_timezone(&Local).naive_local()
}

// ---------------------------------------------------------------------------
// Cycle state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Fetching,
    Parsing,
    Triggers,
}

/// Device counts for one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub total: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Context that lives for exactly one cycle.
#[derive(Debug, Default)]
struct PollCycle {
    documents: HashMap<LocationKey, Value>,
    /// Locations whose fetch failed for good; later devices there fail the
    /// same way without another request.
    failures: HashMap<LocationKey, FetchError>,
    /// Raised while the last fetch or download failed, cleared on success.
    comm_error: bool,
    summary: CycleSummary,
}

/// Why one device could not be refreshed.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Host(#[from] HostError),
    #[error(transparent)]
    Image(#[from] ImageError),
}

impl DeviceError {
    /// Display state left on a device whose refresh failed.
    pub fn display(&self) -> DisplayState {
        match self {
            DeviceError::Fetch(_) => DisplayState::off("No Comm"),
            DeviceError::Image(ImageError::BadType(_)) => DisplayState::off("Bad Type"),
            DeviceError::Image(_) => DisplayState::off("No comm"),
            DeviceError::Parse(_) | DeviceError::Host(_) => DisplayState::off(" "),
        }
    }
}

enum Outcome {
    Updated,
    Skipped,
}

// ---------------------------------------------------------------------------
// Poller
// ---------------------------------------------------------------------------

pub struct Poller<S, H> {
    source: S,
    host: H,
    images: Option<ImageDownloader>,
    force_dump: bool,
    phase: Phase,
}

impl<S: WeatherSource, H: Host> Poller<S, H> {
    pub fn new(source: S, host: H) -> Self {
        Self {
            source,
            host,
            images: None,
            force_dump: false,
            phase: Phase::Idle,
        }
    }

    /// Enables SatelliteImage devices. Without a downloader they are skipped.
    pub fn with_images(mut self, downloader: ImageDownloader) -> Self {
        self.images = Some(downloader);
        self
    }

    /// Dumps every cycle regardless of the `dump_json` preference.
    pub fn with_dump(mut self, force: bool) -> Self {
        self.force_dump = force;
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Runs until the host reports shutdown.
    pub fn run(&mut self) -> Result<(), Stopped> {
        logging::debug(Source::System, None, "Starting main thread.");
        self.host.sleep(STARTUP_DELAY)?;

        loop {
            let now = Utc::now();
            if self.poll_due_at(now) {
                self.run_cycle_at(now)?;
            }
            self.host.sleep(WAKE_INTERVAL)?;
        }
    }

    pub fn poll_due_at(&self, now: DateTime<Utc>) -> bool {
        server_time(now) > self.host.prefs().next_poll_at()
    }

    /// A scheduled cycle: refresh every device, then process triggers.
    pub fn run_cycle_at(&mut self, now: DateTime<Utc>) -> Result<CycleSummary, Stopped> {
        let summary = self.refresh_weather_data_at(now)?;
        self.process_triggers_at(now);
        logging::debug(Source::System, None, "Weather data cycle complete.");
        Ok(summary)
    }

    /// Manual refresh outside the schedule. Triggers are not processed.
    pub fn refresh_now(&mut self) -> Result<CycleSummary, Stopped> {
        self.refresh_weather_data_at(Utc::now())
    }

    /// Refreshes every device and reschedules the next poll.
    pub fn refresh_weather_data_at(&mut self, now: DateTime<Utc>) -> Result<CycleSummary, Stopped> {
        let mut prefs = self.host.prefs();
        let mut cycle = PollCycle::default();
        let devices = self.host.devices();

        if devices.is_empty() {
            logging::info(Source::System, None, "There aren't any devices to poll yet. Sleeping.");
        }

        for device in &devices {
            cycle.summary.total += 1;
            match self.refresh_device(&mut cycle, &mut prefs, device, now) {
                Ok(Outcome::Updated) => cycle.summary.updated += 1,
                Ok(Outcome::Skipped) => cycle.summary.skipped += 1,
                Err(DeviceError::Fetch(FetchError::Stopped(stopped))) => {
                    self.phase = Phase::Idle;
                    return Err(stopped);
                }
                Err(e) => {
                    cycle.summary.failed += 1;
                    logging::error(
                        Source::Device,
                        Some(&device.name),
                        &format!("Problem refreshing weather data: {e}"),
                    );
                    if let Err(e) = self.host.set_display(device.id, e.display()) {
                        logging::debug(Source::Device, Some(&device.name), &e.to_string());
                    }
                }
            }
        }

        logging::debug(
            Source::System,
            None,
            &format!("{} locations polled.", cycle.documents.len()),
        );
        self.warn_on_call_limit(&prefs);

        prefs.schedule_after(server_time(now));
        if let Err(e) = self.host.save_prefs(&prefs) {
            logging::error(Source::System, None, &format!("Unable to save preferences: {e}"));
        }

        if prefs.dump_json || self.force_dump {
            if let Err(e) = dump::write_dump(&prefs.logs_dir, &cycle.documents, server_time(now)) {
                logging::info(Source::System, None, &format!("Unable to write to the log folder: {e}"));
            }
        }

        let s = cycle.summary;
        logging::log_cycle_summary(s.total, s.updated, s.skipped, s.failed);
        self.phase = Phase::Idle;
        Ok(s)
    }

    fn refresh_device(
        &mut self,
        cycle: &mut PollCycle,
        prefs: &mut Prefs,
        device: &Device,
        now: DateTime<Utc>,
    ) -> Result<Outcome, DeviceError> {
        if !device.configured {
            logging::info(
                Source::Device,
                Some(&device.name),
                "A device has been created, but is not fully configured.",
            );
            self.host.set_display(device.id, DisplayState::off(" "))?;
            return Ok(Outcome::Skipped);
        }
        if !device.enabled {
            logging::debug(
                Source::Device,
                Some(&device.name),
                "Device communication is disabled. Skipping.",
            );
            self.host.set_display(device.id, DisplayState::off("Disabled"))?;
            return Ok(Outcome::Skipped);
        }

        logging::debug(Source::Device, Some(&device.name), "Processing device.");
        if device.kind == DeviceKind::SatelliteImage {
            return self.refresh_image(cycle, device);
        }

        self.phase = Phase::Fetching;
        let location = device.location();
        self.ensure_document(cycle, prefs, &location)?;
        let document = cycle
            .documents
            .get(&location)
            .ok_or_else(|| ParseError::MissingDocument(location.clone()))?;

        let Some(fetched) = observation_epoch(document) else {
            let message = "Cannot determine age of data. Skipping until next scheduled poll.";
            if cycle.comm_error {
                logging::debug(Source::Device, Some(&device.name), message);
            } else {
                logging::warn(Source::Device, Some(&device.name), message);
            }
            return Ok(Outcome::Skipped);
        };
        self.host
            .set_display(device.id, DisplayState::online(" ", SensorIcon::SensorOn))?;
        let stored = self
            .host
            .state(device.id, "currentObservationEpoch")
            .and_then(|v| v.as_i64());
        if !is_newer_observation(stored, fetched) {
            logging::info(
                Source::Device,
                Some(&device.name),
                "Latest data are not newer than data we already have. Skipping update.",
            );
            return Ok(Outcome::Skipped);
        }

        self.phase = Phase::Parsing;
        let ctx = ParseContext::for_device(prefs, device);
        let mut failure = None;
        for category in device.kind.categories() {
            match category.parse(document, &ctx) {
                Ok(parsed) => {
                    self.host.update_states(device.id, &parsed.states)?;
                    if let Some(display) = parsed.display {
                        self.host.set_display(device.id, display)?;
                    }
                }
                Err(e) => {
                    logging::debug(
                        Source::Device,
                        Some(&device.name),
                        &format!("Problem parsing {category} data: {e}"),
                    );
                    failure.get_or_insert(e);
                }
            }
        }

        if let Some(address) = device.address() {
            self.host.set_address(device.id, &address)?;
        }
        if let Some(e) = failure {
            return Err(e.into());
        }

        if device.kind == DeviceKind::Daily && prefs.updater_emails_enabled {
            email::maybe_send(&mut self.host, device, document, prefs, server_time(now));
        }
        Ok(Outcome::Updated)
    }

    /// Fetches `location` unless this cycle already has it.
    fn ensure_document(
        &mut self,
        cycle: &mut PollCycle,
        prefs: &mut Prefs,
        location: &LocationKey,
    ) -> Result<(), FetchError> {
        if let Some(failure) = cycle.failures.get(location) {
            logging::debug(
                Source::Api,
                None,
                &format!("Location {} already failed this cycle.", location),
            );
            return Err(failure.clone());
        }
        if cycle.documents.contains_key(location) {
            logging::debug(
                Source::Api,
                None,
                &format!("Location {} already fetched this cycle.", location),
            );
            return Ok(());
        }

        match fetch_with_backoff(&self.source, location, &mut self.host, &mut cycle.comm_error) {
            Ok(fetched) => {
                if let Some(calls) = fetched.api_calls {
                    prefs.daily_call_counter = calls;
                }
                cycle.documents.insert(location.clone(), fetched.document);
                cycle.comm_error = false;
                Ok(())
            }
            Err(FetchError::Stopped(stopped)) => Err(FetchError::Stopped(stopped)),
            Err(e) => {
                if let FetchError::Decode(message) = &e {
                    logging::error(Source::Api, None, &format!("Unable to decode data: {message}"));
                }
                cycle.comm_error = true;
                cycle.failures.insert(location.clone(), e.clone());
                Err(e)
            }
        }
    }

    fn refresh_image(&mut self, cycle: &mut PollCycle, device: &Device) -> Result<Outcome, DeviceError> {
        let Some(downloader) = &self.images else {
            logging::debug(Source::Image, Some(&device.name), "Image downloads are not enabled.");
            return Ok(Outcome::Skipped);
        };
        if let Err(e) = downloader.download(&device.image_source, &device.image_destination) {
            cycle.comm_error = true;
            return Err(e.into());
        }
        cycle.comm_error = false;
        self.host
            .set_display(device.id, DisplayState::online(" ", SensorIcon::SensorOn))?;
        Ok(Outcome::Updated)
    }

    fn warn_on_call_limit(&self, prefs: &Prefs) {
        let Ok(limit) = prefs.call_counter.trim().parse::<u32>() else {
            return;
        };
        if prefs.daily_call_counter >= limit {
            logging::warn(
                Source::Api,
                None,
                &format!(
                    "Daily call counter {} has reached the configured limit of {}.",
                    prefs.daily_call_counter, limit
                ),
            );
        }
    }

    // -----------------------------------------------------------------------
    // Triggers and manual actions
    // -----------------------------------------------------------------------

    /// Evaluates all triggers, marks offline locations and executes the
    /// enabled triggers. Returns what fired.
    pub fn process_triggers_at(&mut self, now: DateTime<Utc>) -> Vec<Firing> {
        self.phase = Phase::Triggers;
        let devices = self.host.devices();
        let snapshots: Vec<DeviceSnapshot> = devices
            .iter()
            .filter(|d| d.kind.is_weather_bearing())
            .map(|d| DeviceSnapshot::from_host(&self.host, d.id, &d.name, d.enabled))
            .collect();

        let firings = evaluate_at(&snapshots, &self.host.triggers(), now);
        for firing in &firings {
            let name = devices
                .iter()
                .find(|d| d.id == firing.device())
                .map(|d| d.name.as_str())
                .unwrap_or("unknown device");

            if let Firing::Offline { device, .. } = firing {
                if let Err(e) = self.host.set_display(*device, DisplayState::location_offline()) {
                    logging::debug(Source::Device, Some(name), &e.to_string());
                }
            }
            if let Some(trigger) = firing.executes() {
                logging::warn(Source::Trigger, Some(name), &firing.message(name));
                if let Err(e) = self.host.execute_trigger(trigger) {
                    logging::error(Source::Trigger, Some(name), &e.to_string());
                }
            }
        }

        self.phase = Phase::Idle;
        firings
    }

    /// Enables or disables communication for every device.
    pub fn set_all_enabled(&mut self, enabled: bool) -> Result<(), HostError> {
        for device in self.host.devices() {
            self.host.set_enabled(device.id, enabled)?;
            if !enabled {
                self.host.set_display(device.id, DisplayState::off("Disabled"))?;
            }
        }
        let verb = if enabled { "enabled" } else { "disabled" };
        logging::info(Source::System, None, &format!("Communication {verb} for all devices."));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
