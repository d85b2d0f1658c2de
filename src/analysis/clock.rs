/// Epoch localization and date/time display preferences.
///
/// Forecast epochs are UTC seconds. Devices render them either in the
/// server's own timezone ("time here") or in the forecast location's
/// timezone as named by the document's `timezone` field ("time there").

use chrono::{DateTime, FixedOffset, Local, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::model::ParseError;

/// Which clock a device renders forecast times in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimePreference {
    #[default]
    TimeHere,
    TimeThere,
}

/// A resolved rendering zone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Zone {
    Server,
    Location(Tz),
}

/// Resolves an IANA name from the forecast document.
pub fn location_zone(name: &str) -> Result<Tz, ParseError> {
    name.parse::<Tz>()
        .map_err(|_| ParseError::UnknownTimezone(name.to_string()))
}

/// Converts a UTC epoch into wall-clock time in `zone`.
pub fn localize(epoch: i64, zone: Zone) -> Result<DateTime<FixedOffset>, ParseError> {
    let utc = Utc
        .timestamp_opt(epoch, 0)
        .single()
        .ok_or(ParseError::InvalidEpoch(epoch))?;
    Ok(match zone {
        Zone::Server => utc.with_timezone(&Local).fixed_offset(),
        Zone::Location(tz) => utc.with_timezone(&tz).fixed_offset(),
    })
}

// ---------------------------------------------------------------------------
// Format preferences
// ---------------------------------------------------------------------------

/// strftime patterns derived from the user's date and time preferences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateTimeFormat {
    pub date: String,
    pub time: String,
}

impl DateTimeFormat {
    pub fn from_prefs(date_pref: &str, time_pref: &str) -> Self {
        Self {
            date: date_pattern(date_pref).to_string(),
            time: time_pattern(time_pref).to_string(),
        }
    }

    /// Date and time joined by a space.
    pub fn date_time(&self) -> String {
        format!("{} {}", self.date, self.time)
    }
}

impl Default for DateTimeFormat {
    fn default() -> Self {
        Self::from_prefs("YYYY-MM-DD", "military")
    }
}

/// Unknown preferences fall back to ISO ordering.
pub fn date_pattern(pref: &str) -> &'static str {
    match pref {
        "MM-DD-YYYY" => "%m-%d-%Y",
        "DD-MM-YYYY" => "%d-%m-%Y",
        "YYYY-DD-MM" => "%Y-%d-%m",
        _ => "%Y-%m-%d",
    }
}

/// Unknown preferences fall back to 24-hour time.
pub fn time_pattern(pref: &str) -> &'static str {
    match pref {
        "standard" => "%I:%M",
        "standard_am_pm" => "%I:%M %p",
        _ => "%H:%M",
    }
}

/// The long observation stamp, e.g. "Last updated on Jun 03, 14:05 PM -0500".
pub fn last_updated(time: &DateTime<FixedOffset>) -> String {
    time.format("Last updated on %b %d, %H:%M %p %z").to_string()
}
