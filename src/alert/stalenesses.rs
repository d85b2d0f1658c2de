/// Observation staleness detection.
///
/// Two questions are asked of every observation epoch:
///   - is the freshly fetched document newer than what the device already
///     shows? Only then are its states replaced. Personal weather stations
///     sometimes report an older observation than the previous poll, and
///     regressing the device to it would be worse than showing nothing new.
///   - how long has it been since the location last reported? Offline
///     triggers compare that age against their timer.
///
/// # Clock injection
/// All age functions accept a `now: DateTime<Utc>` parameter rather than
/// calling `Utc::now()` internally, so tests are fully deterministic.

use chrono::{DateTime, Duration, Utc};

use crate::model::ParseError;

// ---------------------------------------------------------------------------
// Newer-than guard
// ---------------------------------------------------------------------------

/// `true` when `fetched` is strictly newer than `stored`.
///
/// A device that has never been updated counts as epoch 0, so any real
/// observation replaces it. Equal epochs are the same observation and are
/// skipped.
pub fn is_newer_observation(stored: Option<i64>, fetched: i64) -> bool {
    fetched > stored.unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Age
// ---------------------------------------------------------------------------

/// Time elapsed from the observation at `epoch` to `now`.
///
/// Observations stamped in the future (clock skew between the station and
/// this host) have a zero age.
pub fn observation_age_at(epoch: i64, now: DateTime<Utc>) -> Result<Duration, ParseError> {
    let observed = DateTime::<Utc>::from_timestamp(epoch, 0).ok_or(ParseError::InvalidEpoch(epoch))?;
    Ok((now - observed).max(Duration::zero()))
}

/// Returns `true` once the observation is at least `max_age_minutes` old.
///
/// Reaching the threshold exactly counts: a 60 minute timer fires on the
/// poll that finds a 60 minute old reading.
pub fn is_offline_at(epoch: i64, max_age_minutes: i64, now: DateTime<Utc>) -> Result<bool, ParseError> {
    Ok(observation_age_at(epoch, now)?.num_minutes() >= max_age_minutes)
}

/// "X days, Y hrs, Z mins", used in offline log messages.
pub fn describe_age(age: Duration) -> String {
    let minutes = age.num_minutes().max(0);
    format!(
        "{} days, {} hrs, {} mins",
        minutes / (24 * 60),
        (minutes / 60) % 24,
        minutes % 60
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
