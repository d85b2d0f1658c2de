//! Location Verification Module
//!
//! Checks every configured location against the live forecast API to see
//! which ones respond and which document sections come back. Useful after
//! adding devices or changing the API key, before leaving the service to run.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::Device;
use crate::ingest::darksky::WeatherSource;
use crate::model::LocationKey;

/// Sections every parser family depends on.
const EXPECTED_SECTIONS: [&str; 4] = ["currently", "hourly", "daily", "timezone"];

// ============================================================================
// Verification Results
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    pub timestamp: String,
    pub results: Vec<LocationVerification>,
    pub summary: VerificationSummary,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationSummary {
    pub total: usize,
    pub working: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationVerification {
    pub location: LocationKey,
    /// Names of the devices sharing this location.
    pub devices: Vec<String>,
    pub status: VerificationStatus,
    pub api_responsive: bool,
    pub sections_available: Vec<String>,
    pub sections_missing: Vec<String>,
    pub hourly_count: usize,
    pub daily_count: usize,
    pub alert_count: usize,
    pub api_calls: Option<u32>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum VerificationStatus {
    Success,
    PartialSuccess,
    Failed,
}

// ============================================================================
// Document checks
// ============================================================================

/// Fills in section presence and entry counts from a fetched document.
pub fn verify_document(result: &mut LocationVerification, document: &Value) {
    for section in EXPECTED_SECTIONS {
        if document.get(section).is_some_and(|v| !v.is_null()) {
            result.sections_available.push(section.to_string());
        } else {
            result.sections_missing.push(section.to_string());
        }
    }

    let count = |section: &str| {
        document
            .get(section)
            .and_then(|s| s.get("data"))
            .and_then(Value::as_array)
            .map_or(0, Vec::len)
    };
    result.hourly_count = count("hourly");
    result.daily_count = count("daily");

    if let Some(alerts) = document.get("alerts").and_then(Value::as_array) {
        result.sections_available.push("alerts".to_string());
        result.alert_count = alerts.len();
    }

    result.status = if result.sections_missing.is_empty() {
        VerificationStatus::Success
    } else if result.sections_available.is_empty() {
        result.error_message = Some("Response contained no forecast sections".to_string());
        VerificationStatus::Failed
    } else {
        VerificationStatus::PartialSuccess
    };
}

pub fn verify_location<S: WeatherSource + ?Sized>(
    source: &S,
    location: &LocationKey,
    devices: Vec<String>,
) -> LocationVerification {
    let mut result = LocationVerification {
        location: location.clone(),
        devices,
        status: VerificationStatus::Failed,
        api_responsive: false,
        sections_available: Vec::new(),
        sections_missing: Vec::new(),
        hourly_count: 0,
        daily_count: 0,
        alert_count: 0,
        api_calls: None,
        error_message: None,
    };

    match source.fetch(location) {
        Ok(fetched) => {
            result.api_responsive = true;
            result.api_calls = fetched.api_calls;
            verify_document(&mut result, &fetched.document);
        }
        Err(e) => {
            result.error_message = Some(format!("API request failed: {}", e));
        }
    }

    result
}

// ============================================================================
// Full Verification Runner
// ============================================================================

/// One request per distinct location among the weather-bearing devices.
pub fn run_full_verification<S: WeatherSource + ?Sized>(source: &S, devices: &[Device]) -> VerificationReport {
    let mut locations: BTreeMap<LocationKey, Vec<String>> = BTreeMap::new();
    for device in devices.iter().filter(|d| d.kind.is_weather_bearing()) {
        locations
            .entry(device.location())
            .or_default()
            .push(device.name.clone());
    }

    let mut report = VerificationReport {
        timestamp: Utc::now().to_rfc3339(),
        results: Vec::new(),
        summary: VerificationSummary {
            total: locations.len(),
            ..VerificationSummary::default()
        },
    };

    println!("Verifying forecast locations...");
    for (location, names) in locations {
        print!("  {} ... ", location);
        let result = verify_location(source, &location, names);

        match result.status {
            VerificationStatus::Success => {
                println!(
                    "✓ OK ({} hourly, {} daily, {} alerts)",
                    result.hourly_count, result.daily_count, result.alert_count
                );
                report.summary.working += 1;
            }
            VerificationStatus::PartialSuccess => {
                println!("⚠ Partial (missing: {:?})", result.sections_missing);
                report.summary.working += 1;
            }
            VerificationStatus::Failed => {
                println!("✗ FAILED: {}", result.error_message.as_deref().unwrap_or("Unknown"));
                report.summary.failed += 1;
            }
        }

        report.results.push(result);
    }

    report
}

pub fn print_summary(report: &VerificationReport) {
    let rule = "═".repeat(60);
    println!("\n{}", rule);
    println!("VERIFICATION SUMMARY");
    println!("{}", rule);
    println!();
    println!(
        "Locations:    {}/{} working  ({} failed)",
        report.summary.working, report.summary.total, report.summary.failed
    );

    let success_rate = if report.summary.total > 0 {
        (report.summary.working as f64 / report.summary.total as f64) * 100.0
    } else {
        0.0
    };
    println!("Overall Success Rate: {:.1}%", success_rate);
    println!("{}", rule);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use crate::ingest::darksky::Fetched;
    use crate::model::FetchError;
    use serde_json::json;

    struct Canned(Result<Value, FetchError>);

    impl WeatherSource for Canned {
        fn fetch(&self, _location: &LocationKey) -> Result<Fetched, FetchError> {
            self.0.clone().map(|document| Fetched { document, api_calls: Some(7) })
        }
    }

    fn location() -> LocationKey {
        LocationKey::new("40.69", "-89.59")
    }

    #[test]
    fn test_complete_document_is_success() {
        let doc = json!({
            "timezone": "America/Chicago",
            "currently": {"time": 1},
            "hourly": {"data": [{}, {}]},
            "daily": {"data": [{}]},
            "alerts": [{"title": "Flood Warning"}]
        });
        let result = verify_location(&Canned(Ok(doc)), &location(), vec!["Peoria".into()]);
        assert_eq!(result.status, VerificationStatus::Success);
        assert_eq!(result.hourly_count, 2);
        assert_eq!(result.daily_count, 1);
        assert_eq!(result.alert_count, 1);
        assert_eq!(result.api_calls, Some(7));
    }

    #[test]
    fn test_missing_sections_are_partial() {
        let doc = json!({"timezone": "America/Chicago", "currently": {"time": 1}});
        let result = verify_location(&Canned(Ok(doc)), &location(), vec![]);
        assert_eq!(result.status, VerificationStatus::PartialSuccess);
        assert_eq!(result.sections_missing, vec!["hourly", "daily"]);
    }

    #[test]
    fn test_fetch_error_is_failure() {
        let result = verify_location(&Canned(Err(FetchError::HttpStatus(403))), &location(), vec![]);
        assert_eq!(result.status, VerificationStatus::Failed);
        assert!(!result.api_responsive);
        assert_eq!(result.error_message.as_deref(), Some("API request failed: HTTP error: 403"));
    }

    #[test]
    fn test_shared_locations_are_verified_once() {
        let config = parse_config(
            r#"
            [[devices]]
            id = 1
            name = "Peoria"
            kind = "weather"
            latitude = "40.69"
            longitude = "-89.59"

            [[devices]]
            id = 2
            name = "Peoria Daily"
            kind = "daily"
            latitude = "40.69"
            longitude = "-89.59"

            [[devices]]
            id = 3
            name = "Radar"
            kind = "satellite_image"
            "#,
        )
        .unwrap();
        let report = run_full_verification(&Canned(Ok(json!({}))), &config.devices);
        assert_eq!(report.summary.total, 1);
        assert_eq!(report.results[0].devices, vec!["Peoria", "Peoria Daily"]);
        assert_eq!(report.summary.failed, 1, "an empty document has no sections");
    }
}
