/// Sentinel substitution for corrupt or missing numeric readings.
///
/// Weather stations occasionally report physically impossible values
/// (-999 is the usual offender) or omit a field entirely. Every numeric
/// quantity passes through here before it is published, so a device never
/// shows garbage: unusable input becomes the `(-99.0, "--")` pair.

use serde_json::Value;

use crate::model::{CORRUPTION_FLOOR, Reading};

/// Coerces a JSON scalar to a finite float.
///
/// Numbers are taken as-is; strings are parsed after trimming. Anything
/// else, including `NaN`/`inf` spellings, is not a number.
pub fn coerce_f64(raw: &Value) -> Option<f64> {
    let value = match raw {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    value.is_finite().then_some(value)
}

/// Normalizes a looked-up value.
///
/// Absent, non-numeric, non-finite and `<= -55.728` inputs all yield the
/// sentinel. The floor is inclusive.
pub fn normalize(raw: Option<&Value>) -> Reading {
    match raw.and_then(coerce_f64) {
        Some(value) => normalize_f64(value),
        None => Reading::sentinel(),
    }
}

/// Normalizes a fraction in `[0, 1]` as a percentage.
///
/// Scaling happens before the floor check, so a fraction of -0.6 is still
/// corrupt. Binary float noise from the multiplication is removed so that
/// 0.55 renders as "55.0".
pub fn normalize_percent(raw: Option<&Value>) -> Reading {
    match raw.and_then(coerce_f64) {
        Some(fraction) => normalize_f64(clean(fraction * 100.0)),
        None => Reading::sentinel(),
    }
}

/// Normalizes an already-computed float.
pub fn normalize_f64(value: f64) -> Reading {
    if !value.is_finite() || value <= CORRUPTION_FLOOR {
        return Reading::sentinel();
    }
    Reading {
        value,
        text: format!("{:?}", value),
    }
}

/// Rounds away representation error left by scaling (55.00000000000001).
fn clean(value: f64) -> f64 {
    (value * 1e9).round() / 1e9
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ordinary_reading_passes_through() {
        let r = normalize(Some(&json!(71.25)));
        assert_eq!(r.value, 71.25);
        assert_eq!(r.text, "71.25");
    }

    #[test]
    fn test_whole_numbers_keep_decimal_point() {
        assert_eq!(normalize(Some(&json!(55))).text, "55.0");
    }

    #[test]
    fn test_station_garbage_becomes_sentinel() {
        let r = normalize(Some(&json!(-999)));
        assert_eq!(r.value, -99.0);
        assert_eq!(r.text, "--");
        assert!(r.is_sentinel());
    }

    #[test]
    fn test_floor_is_inclusive() {
        assert!(normalize(Some(&json!(-55.728))).is_sentinel(), "exactly at the floor is corrupt");
        assert!(!normalize(Some(&json!(-55.7))).is_sentinel(), "just above the floor is valid");
    }

    #[test]
    fn test_missing_and_text_values_become_sentinel() {
        assert!(normalize(None).is_sentinel());
        assert!(normalize(Some(&json!("Not available"))).is_sentinel());
        assert!(normalize(Some(&json!(null))).is_sentinel());
        assert!(normalize(Some(&json!("NaN"))).is_sentinel());
    }

    #[test]
    fn test_numeric_strings_are_accepted() {
        assert_eq!(normalize(Some(&json!(" 29.92 "))).value, 29.92);
    }

    #[test]
    fn test_percent_scaling_is_clean() {
        let r = normalize_percent(Some(&json!(0.55)));
        assert_eq!(r.value, 55.0);
        assert_eq!(r.text, "55.0");
        assert_eq!(normalize_percent(Some(&json!(0.07))).text, "7.0");
    }

    #[test]
    fn test_percent_floor_applies_after_scaling() {
        assert!(normalize_percent(Some(&json!(-0.6))).is_sentinel());
        assert!(!normalize_percent(Some(&json!(-0.5))).is_sentinel());
    }
}
