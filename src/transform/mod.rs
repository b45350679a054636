//! Derived-series transforms
//!
//! The transform engine turns already-fetched (or still-pending) series data
//! into new named series:
//!
//! - **TimeShift**: values from an earlier window, realigned for display
//! - **MovingAverage**: running mean over a dependency's datapoints
//! - **Arithmetic**: a formula evaluated across all collected targets
//!
//! All three are stateless; the scheduler owns dispatch and dependency
//! resolution, and calls into here with resolved inputs.

pub mod engine;
mod ring;

pub use engine::{arithmetic, build_value_table, moving_average, shift_series, ValueTable};
pub use ring::RingAverager;
