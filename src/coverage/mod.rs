//! Interval coverage tracking.
//!
//! Each channel owns a set of disjoint, non-touching time ranges that have
//! already been fetched into the cache. The set answers two questions:
//! - what is loaded (`intervals`, `covered_within`)
//! - what is missing from a requested range (`unloaded_ranges`)
//!
//! Coverage is only extended by bulk historical loads. A single live sample
//! never closes a gap.

mod file;
mod set;

pub use set::IntervalCoverage;
