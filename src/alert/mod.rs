/// Offline detection and trigger evaluation.
///
/// - `stalenesses` - newer-than guard and observation age, clock injected.
/// - `triggers`    - offline and severe-weather trigger rules.

pub mod stalenesses;
pub mod triggers;
