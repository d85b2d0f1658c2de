/// Pure helpers for turning raw forecast values into publishable states.
///
/// Nothing in here touches the network, the host or the clock; every
/// function is deterministic given its inputs.
///
/// Submodules:
/// - `lookup`    - tolerant nested lookup into a forecast document.
/// - `normalize` - sentinel substitution for corrupt numeric readings.
/// - `format`    - unit/precision formatting, wind and moon phase names.
/// - `clock`     - epoch localization and date/time format preferences.

pub mod clock;
pub mod format;
pub mod lookup;
pub mod normalize;
