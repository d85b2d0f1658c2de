/// The host collaborator: device state storage, triggers, email and sleep.
///
/// The poll cycle never owns device state. Everything it publishes goes
/// through the `Host` trait, and the only thing it reads back is what it
/// needs for staleness and trigger checks. `LocalHost` is the standalone
/// implementation used by the binary and the tests: state lives in memory
/// and is snapshotted to a JSON file after every cycle.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{Device, Prefs, ServiceConfig, Trigger};
use crate::logging::{self, Source};
use crate::model::{DeviceId, DisplayState, HostError, StateUpdate, StateValue, Stopped, TriggerId};

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

pub trait Host {
    /// Every device, in a stable order.
    fn devices(&self) -> Vec<Device>;

    /// Last published value of one state, if any.
    fn state(&self, device: DeviceId, key: &str) -> Option<StateValue>;

    /// Applies a batch in order; later entries for the same key win.
    fn update_states(&mut self, device: DeviceId, updates: &[StateUpdate]) -> Result<(), HostError>;

    fn set_display(&mut self, device: DeviceId, display: DisplayState) -> Result<(), HostError>;

    fn set_address(&mut self, device: DeviceId, address: &str) -> Result<(), HostError>;

    fn set_enabled(&mut self, device: DeviceId, enabled: bool) -> Result<(), HostError>;

    fn triggers(&self) -> Vec<Trigger>;

    fn execute_trigger(&mut self, trigger: TriggerId) -> Result<(), HostError>;

    fn send_email(&mut self, to: &str, subject: &str, body: &str) -> Result<(), HostError>;

    fn prefs(&self) -> Prefs;

    fn save_prefs(&mut self, prefs: &Prefs) -> Result<(), HostError>;

    /// Blocks for `duration` unless shutdown is requested first.
    fn sleep(&mut self, duration: Duration) -> Result<(), Stopped>;
}

// ---------------------------------------------------------------------------
// Local host
// ---------------------------------------------------------------------------

/// One published state: the value plus its display string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateEntry {
    pub value: StateValue,
    pub ui_value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub states: BTreeMap<String, StateEntry>,
    pub display: Option<DisplayState>,
    pub address: Option<String>,
}

/// A message handed to `send_email`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    prefs: Option<Prefs>,
    records: BTreeMap<DeviceId, DeviceRecord>,
    enabled: BTreeMap<DeviceId, bool>,
}

/// Handle that requests shutdown of a running `LocalHost`.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct LocalHost {
    devices: Vec<Device>,
    triggers: Vec<Trigger>,
    prefs: Prefs,
    records: BTreeMap<DeviceId, DeviceRecord>,
    snapshot_path: Option<PathBuf>,
    stop: StopHandle,
    /// Real sleeping for the daemon; tests record the request instead.
    real_sleep: bool,
    /// Shutdown after this many sleeps (tests only ever set this).
    sleep_budget: Option<usize>,
    sleeps: Vec<Duration>,
    executed: Vec<TriggerId>,
    outbox: Vec<Email>,
}

impl LocalHost {
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            devices: config.devices,
            triggers: config.triggers,
            prefs: config.prefs,
            records: BTreeMap::new(),
            snapshot_path: None,
            stop: StopHandle::default(),
            real_sleep: true,
            sleep_budget: None,
            sleeps: Vec::new(),
            executed: Vec::new(),
            outbox: Vec::new(),
        }
    }

    /// Persists state to `path` after each prefs save, restoring whatever
    /// a previous run left there.
    pub fn with_snapshot(mut self, path: &Path) -> Result<Self, HostError> {
        if path.exists() {
            let text = std::fs::read_to_string(path)?;
            let snapshot: Snapshot =
                serde_json::from_str(&text).map_err(|e| HostError::Serialize(e.to_string()))?;
            self.records = snapshot.records;
            if let Some(saved) = snapshot.prefs {
                self.prefs.last_successful_poll = saved.last_successful_poll;
                self.prefs.next_poll = saved.next_poll;
                self.prefs.daily_call_counter = saved.daily_call_counter;
            }
            for device in &mut self.devices {
                if let Some(enabled) = snapshot.enabled.get(&device.id) {
                    device.enabled = *enabled;
                }
            }
            logging::debug(
                Source::System,
                None,
                &format!("Restored state for {} devices from {}", self.records.len(), path.display()),
            );
        }
        self.snapshot_path = Some(path.to_path_buf());
        Ok(self)
    }

    /// Sleeps return immediately and are recorded; after `budget` sleeps the
    /// host reports shutdown.
    pub fn simulated(mut self, budget: Option<usize>) -> Self {
        self.real_sleep = false;
        self.sleep_budget = budget;
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn record(&self, device: DeviceId) -> Option<&DeviceRecord> {
        self.records.get(&device)
    }

    pub fn sleeps(&self) -> &[Duration] {
        &self.sleeps
    }

    pub fn executed_triggers(&self) -> &[TriggerId] {
        &self.executed
    }

    pub fn outbox(&self) -> &[Email] {
        &self.outbox
    }

    /// Writes the snapshot now, if one is configured.
    pub fn save(&self) -> Result<(), HostError> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };
        let snapshot = Snapshot {
            prefs: Some(self.prefs.clone()),
            records: self.records.clone(),
            enabled: self.devices.iter().map(|d| (d.id, d.enabled)).collect(),
        };
        let text = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| HostError::Serialize(e.to_string()))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, text)?;
        Ok(())
    }

    fn record_mut(&mut self, device: DeviceId) -> Result<&mut DeviceRecord, HostError> {
        if !self.devices.iter().any(|d| d.id == device) {
            return Err(HostError::UnknownDevice(device));
        }
        Ok(self.records.entry(device).or_default())
    }
}

impl Host for LocalHost {
    fn devices(&self) -> Vec<Device> {
        self.devices.clone()
    }

    fn state(&self, device: DeviceId, key: &str) -> Option<StateValue> {
        self.records
            .get(&device)
            .and_then(|r| r.states.get(key))
            .map(|entry| entry.value.clone())
    }

    fn update_states(&mut self, device: DeviceId, updates: &[StateUpdate]) -> Result<(), HostError> {
        let record = self.record_mut(device)?;
        for update in updates {
            let ui_value = update
                .ui_value
                .clone()
                .unwrap_or_else(|| update.value.to_string());
            record.states.insert(
                update.key.clone(),
                StateEntry {
                    value: update.value.clone(),
                    ui_value,
                },
            );
        }
        Ok(())
    }

    fn set_display(&mut self, device: DeviceId, display: DisplayState) -> Result<(), HostError> {
        self.record_mut(device)?.display = Some(display);
        Ok(())
    }

    fn set_address(&mut self, device: DeviceId, address: &str) -> Result<(), HostError> {
        self.record_mut(device)?.address = Some(address.to_string());
        Ok(())
    }

    fn set_enabled(&mut self, device: DeviceId, enabled: bool) -> Result<(), HostError> {
        let entry = self
            .devices
            .iter_mut()
            .find(|d| d.id == device)
            .ok_or(HostError::UnknownDevice(device))?;
        entry.enabled = enabled;
        Ok(())
    }

    fn triggers(&self) -> Vec<Trigger> {
        self.triggers.clone()
    }

    fn execute_trigger(&mut self, trigger: TriggerId) -> Result<(), HostError> {
        let found = self
            .triggers
            .iter()
            .find(|t| t.id == trigger)
            .ok_or(HostError::UnknownTrigger(trigger))?;
        logging::info(Source::Trigger, None, &format!("Executing trigger \"{}\"", found.name));
        self.executed.push(trigger);
        Ok(())
    }

    fn send_email(&mut self, to: &str, subject: &str, body: &str) -> Result<(), HostError> {
        if to.trim().is_empty() {
            return Err(HostError::Email("no recipient address configured".into()));
        }
        logging::info(Source::Email, None, &format!("Queued \"{subject}\" for {to}"));
        self.outbox.push(Email {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }

    fn prefs(&self) -> Prefs {
        self.prefs.clone()
    }

    fn save_prefs(&mut self, prefs: &Prefs) -> Result<(), HostError> {
        self.prefs = prefs.clone();
        self.save()
    }

    fn sleep(&mut self, duration: Duration) -> Result<(), Stopped> {
        if self.stop.is_stopped() {
            return Err(Stopped);
        }
        if !self.real_sleep {
            self.sleeps.push(duration);
            if let Some(budget) = self.sleep_budget {
                if self.sleeps.len() > budget {
                    return Err(Stopped);
                }
            }
            return Ok(());
        }

        // Wake once a second so a stop request is honoured promptly.
        let tick = Duration::from_secs(1);
        let mut remaining = duration;
        while !remaining.is_zero() {
            let step = remaining.min(tick);
            std::thread::sleep(step);
            remaining -= step;
            if self.stop.is_stopped() {
                return Err(Stopped);
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use crate::model::SensorIcon;

    const CONFIG: &str = r#"
        [prefs]
        api_key = "k"

        [[devices]]
        id = 1
        name = "Peoria"
        kind = "weather"
        latitude = "40.69"
        longitude = "-89.59"

        [[triggers]]
        id = 10
        name = "Peoria offline"
        kind = "weather_site_offline"
        device = 1
    "#;

    fn host() -> LocalHost {
        LocalHost::new(parse_config(CONFIG).unwrap()).simulated(None)
    }

    #[test]
    fn test_later_updates_for_same_key_win() {
        let mut h = host();
        h.update_states(1, &[
            StateUpdate::with_ui("alertTitle1", " ", " "),
            StateUpdate::new("alertTitle1", "Flood Warning"),
        ]).unwrap();
        let entry = &h.record(1).unwrap().states["alertTitle1"];
        assert_eq!(entry.value, StateValue::Text("Flood Warning".into()));
        assert_eq!(entry.ui_value, "Flood Warning", "missing ui value falls back to the value text");
    }

    #[test]
    fn test_unknown_device_is_rejected() {
        let mut h = host();
        assert!(matches!(
            h.set_display(99, DisplayState::off(" ")),
            Err(HostError::UnknownDevice(99))
        ));
    }

    #[test]
    fn test_trigger_execution_is_recorded() {
        let mut h = host();
        h.execute_trigger(10).unwrap();
        assert_eq!(h.executed_triggers(), &[10]);
        assert!(matches!(h.execute_trigger(11), Err(HostError::UnknownTrigger(11))));
    }

    #[test]
    fn test_email_needs_recipient() {
        let mut h = host();
        assert!(h.send_email("", "s", "b").is_err());
        h.send_email("me@example.com", "s", "b").unwrap();
        assert_eq!(h.outbox().len(), 1);
    }

    #[test]
    fn test_simulated_sleep_budget() {
        let mut h = LocalHost::new(parse_config(CONFIG).unwrap()).simulated(Some(2));
        assert_eq!(h.sleep(Duration::from_secs(5)), Ok(()));
        assert_eq!(h.sleep(Duration::from_secs(30)), Ok(()));
        assert_eq!(h.sleep(Duration::from_secs(30)), Err(Stopped));
        assert_eq!(h.sleeps().len(), 3);
    }

    #[test]
    fn test_stop_handle_interrupts_sleep() {
        let mut h = host();
        h.stop_handle().stop();
        assert_eq!(h.sleep(Duration::from_secs(3600)), Err(Stopped));
    }

    #[test]
    fn test_stop_from_signal_thread_ends_real_sleep() {
        let mut h = LocalHost::new(parse_config(CONFIG).unwrap());
        let stop = h.stop_handle();
        let signal = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(200));
            stop.stop();
        });
        let started = std::time::Instant::now();
        assert_eq!(h.sleep(Duration::from_secs(3600)), Err(Stopped));
        assert!(started.elapsed() < Duration::from_secs(5));
        signal.join().unwrap();
    }

    #[test]
    fn test_snapshot_round_trips_state_and_poll_stamps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let mut first = LocalHost::new(parse_config(CONFIG).unwrap())
            .with_snapshot(&path)
            .unwrap();
        first.update_states(1, &[StateUpdate::new("currentObservationEpoch", 1_717_441_500_i64)]).unwrap();
        first.set_display(1, DisplayState::online("71.3°F", SensorIcon::TemperatureSensorOn)).unwrap();
        first.set_enabled(1, false).unwrap();
        let mut prefs = first.prefs();
        prefs.next_poll = "2024-06-03 14:20:00".into();
        first.save_prefs(&prefs).unwrap();

        let second = LocalHost::new(parse_config(CONFIG).unwrap())
            .with_snapshot(&path)
            .unwrap();
        assert_eq!(second.state(1, "currentObservationEpoch"), Some(StateValue::Integer(1_717_441_500)));
        assert_eq!(second.prefs().next_poll, "2024-06-03 14:20:00");
        assert!(!second.devices()[0].enabled, "enabled flag survives a restart");
        assert_eq!(second.record(1).unwrap().display.as_ref().unwrap().ui_value, "71.3°F");
    }
}
