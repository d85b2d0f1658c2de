/// Trigger evaluation.
///
/// Two trigger kinds exist:
///   - WeatherSiteOffline: the location's last observation is older than the
///     trigger's timer, or the station reports a temperature no real location
///     produces (failing stations fall back to -99).
///   - WeatherAlert: the location currently has severe weather alerts.
///
/// Evaluation is pure: it takes a snapshot of each device's relevant states
/// and returns the firings. The poller applies them to the host, which keeps
/// the rules testable with a fixed clock.

use chrono::{DateTime, Duration, Utc};

use crate::alert::stalenesses::{describe_age, is_offline_at, observation_age_at};
use crate::config::{IMPLAUSIBLE_TEMPERATURE, Trigger, TriggerKind};
use crate::host::Host;
use crate::model::{DeviceId, TriggerId};

/// What the trigger pass needs to know about one device.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceSnapshot {
    pub id: DeviceId,
    pub name: String,
    pub enabled: bool,
    pub observation_epoch: Option<i64>,
    pub temperature: Option<f64>,
    pub alert_status: bool,
}

impl DeviceSnapshot {
    /// Reads the published states back from the host.
    pub fn from_host<H: Host + ?Sized>(host: &H, id: DeviceId, name: &str, enabled: bool) -> Self {
        Self {
            id,
            name: name.to_string(),
            enabled,
            observation_epoch: host.state(id, "currentObservationEpoch").and_then(|v| v.as_i64()),
            temperature: host.state(id, "temperature").and_then(|v| v.as_f64()),
            alert_status: host
                .state(id, "alertStatus")
                .and_then(|v| v.as_bool())
                .unwrap_or(false),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OfflineReason {
    /// No new observation for this long.
    Silent(Duration),
    /// Reported temperature at or below the implausible limit.
    ImplausibleTemperature(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Firing {
    /// The device is shown offline whether or not the trigger is enabled;
    /// `execute` says whether the host trigger should run.
    Offline {
        trigger: TriggerId,
        device: DeviceId,
        reason: OfflineReason,
        execute: bool,
    },
    SevereWeather {
        trigger: TriggerId,
        device: DeviceId,
    },
}

impl Firing {
    pub fn device(&self) -> DeviceId {
        match self {
            Firing::Offline { device, .. } | Firing::SevereWeather { device, .. } => *device,
        }
    }

    /// `Some(id)` when the host trigger should be executed.
    pub fn executes(&self) -> Option<TriggerId> {
        match self {
            Firing::Offline { trigger, execute: true, .. } => Some(*trigger),
            Firing::Offline { .. } => None,
            Firing::SevereWeather { trigger, .. } => Some(*trigger),
        }
    }

    /// Log line for an executed trigger.
    pub fn message(&self, device_name: &str) -> String {
        match self {
            Firing::Offline { reason: OfflineReason::Silent(age), .. } => format!(
                "{} location appears to be offline for {}",
                device_name,
                describe_age(*age)
            ),
            Firing::Offline { reason: OfflineReason::ImplausibleTemperature(_), .. } => format!(
                "{} location appears to be offline (ambient temperature lower than {}).",
                device_name, IMPLAUSIBLE_TEMPERATURE
            ),
            Firing::SevereWeather { .. } => {
                format!("{} location has at least one severe weather alert.", device_name)
            }
        }
    }
}

/// Evaluates every trigger against every device.
///
/// Offline triggers only consider enabled devices that have reported at
/// least once. Age is checked first; the temperature check only runs when
/// the location is still reporting.
pub fn evaluate_at(devices: &[DeviceSnapshot], triggers: &[Trigger], now: DateTime<Utc>) -> Vec<Firing> {
    let mut firings = Vec::new();

    for device in devices {
        for trigger in triggers.iter().filter(|t| t.device == device.id) {
            match trigger.kind {
                TriggerKind::WeatherSiteOffline => {
                    if let Some(reason) = offline_reason(device, trigger, now) {
                        firings.push(Firing::Offline {
                            trigger: trigger.id,
                            device: device.id,
                            reason,
                            execute: trigger.enabled,
                        });
                    }
                }
                TriggerKind::WeatherAlert => {
                    if trigger.enabled && device.alert_status {
                        firings.push(Firing::SevereWeather {
                            trigger: trigger.id,
                            device: device.id,
                        });
                    }
                }
            }
        }
    }

    firings
}

fn offline_reason(device: &DeviceSnapshot, trigger: &Trigger, now: DateTime<Utc>) -> Option<OfflineReason> {
    if !device.enabled {
        return None;
    }
    let epoch = device.observation_epoch?;
    let minutes = trigger.offline_minutes()?;
    if is_offline_at(epoch, minutes, now).ok()? {
        let age = observation_age_at(epoch, now).ok()?;
        Some(OfflineReason::Silent(age))
    } else {
        device
            .temperature
            .filter(|t| *t <= IMPLAUSIBLE_TEMPERATURE)
            .map(OfflineReason::ImplausibleTemperature)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, 19, 5, 0).unwrap()
    }

    fn device(minutes_old: i64) -> DeviceSnapshot {
        DeviceSnapshot {
            id: 1,
            name: "Peoria".into(),
            enabled: true,
            observation_epoch: Some((fixed_now() - Duration::minutes(minutes_old)).timestamp()),
            temperature: Some(71.3),
            alert_status: false,
        }
    }

    fn trigger(id: TriggerId, kind: TriggerKind, timer: &str, enabled: bool) -> Trigger {
        Trigger {
            id,
            name: format!("trigger {id}"),
            kind,
            device: 1,
            offline_timer: timer.into(),
            enabled,
        }
    }

    #[test]
    fn test_fresh_location_fires_nothing() {
        let triggers = [trigger(10, TriggerKind::WeatherSiteOffline, "60", true)];
        assert!(evaluate_at(&[device(5)], &triggers, fixed_now()).is_empty());
    }

    #[test]
    fn test_silent_location_fires_offline_trigger() {
        let triggers = [trigger(10, TriggerKind::WeatherSiteOffline, "60", true)];
        let firings = evaluate_at(&[device(3 * 60 + 5)], &triggers, fixed_now());
        assert_eq!(firings.len(), 1);
        assert_eq!(firings[0].executes(), Some(10));
        assert_eq!(
            firings[0].message("Peoria"),
            "Peoria location appears to be offline for 0 days, 3 hrs, 5 mins"
        );
    }

    #[test]
    fn test_offline_timer_boundary_is_inclusive() {
        let triggers = [trigger(10, TriggerKind::WeatherSiteOffline, "60", true)];
        assert!(evaluate_at(&[device(59)], &triggers, fixed_now()).is_empty());

        let firings = evaluate_at(&[device(60)], &triggers, fixed_now());
        assert!(matches!(
            firings[..],
            [Firing::Offline { reason: OfflineReason::Silent(age), .. }] if age == Duration::minutes(60)
        ));
    }

    #[test]
    fn test_disabled_trigger_still_reports_offline_but_does_not_execute() {
        let triggers = [trigger(10, TriggerKind::WeatherSiteOffline, "60", false)];
        let firings = evaluate_at(&[device(120)], &triggers, fixed_now());
        assert_eq!(firings.len(), 1);
        assert_eq!(firings[0].device(), 1);
        assert_eq!(firings[0].executes(), None);
    }

    #[test]
    fn test_implausible_temperature_fires_offline_trigger() {
        let mut d = device(5);
        d.temperature = Some(-99.0);
        let triggers = [trigger(10, TriggerKind::WeatherSiteOffline, "60", true)];
        let firings = evaluate_at(&[d], &triggers, fixed_now());
        assert!(matches!(
            firings[0],
            Firing::Offline { reason: OfflineReason::ImplausibleTemperature(t), .. } if t == -99.0
        ));
        assert!(firings[0].message("Peoria").contains("lower than -55"));
    }

    #[test]
    fn test_disabled_or_unreported_device_is_ignored() {
        let triggers = [trigger(10, TriggerKind::WeatherSiteOffline, "60", true)];
        let mut disabled = device(600);
        disabled.enabled = false;
        let mut unreported = device(600);
        unreported.observation_epoch = None;
        assert!(evaluate_at(&[disabled, unreported], &triggers, fixed_now()).is_empty());
    }

    #[test]
    fn test_severe_weather_trigger_follows_alert_status() {
        let triggers = [trigger(20, TriggerKind::WeatherAlert, "60", true)];
        assert!(evaluate_at(&[device(5)], &triggers, fixed_now()).is_empty());

        let mut alerted = device(5);
        alerted.alert_status = true;
        let firings = evaluate_at(&[alerted], &triggers, fixed_now());
        assert_eq!(firings, vec![Firing::SevereWeather { trigger: 20, device: 1 }]);
        assert_eq!(
            firings[0].message("Peoria"),
            "Peoria location has at least one severe weather alert."
        );
    }

    #[test]
    fn test_disabled_severe_weather_trigger_is_skipped() {
        let mut alerted = device(5);
        alerted.alert_status = true;
        let triggers = [trigger(20, TriggerKind::WeatherAlert, "60", false)];
        assert!(evaluate_at(&[alerted], &triggers, fixed_now()).is_empty());
    }

    #[test]
    fn test_triggers_for_other_devices_are_ignored() {
        let mut t = trigger(10, TriggerKind::WeatherSiteOffline, "60", true);
        t.device = 2;
        assert!(evaluate_at(&[device(600)], &[t], fixed_now()).is_empty());
    }
}
