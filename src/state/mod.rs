//! Per-device state machines consulted by the combinator.

mod frequency_cap;
mod refire;

pub use frequency_cap::FrequencyCapState;
pub use refire::RefireState;
