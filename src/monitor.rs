//! Named consumers of channel data.

use crate::types::Timestamp;
use std::collections::BTreeSet;

/// The time window a monitor currently wants delivered.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RangeOfInterest {
    pub start: f64,
    pub end: f64,
    /// Point budget the host asked for. Stored, not enforced.
    pub max_points: u64,
    /// When the host last moved the window.
    pub updated: Timestamp,
}

/// A named consumer: the channels it watches and the window it looks at.
///
/// Monitors reference channels by name only; subscription bookkeeping lives
/// in the registry owned by the `DataManager`.
#[derive(Clone, Debug)]
pub struct Monitor {
    name: String,
    channels: BTreeSet<String>,
    range: Option<RangeOfInterest>,
}

impl Monitor {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            channels: BTreeSet::new(),
            range: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Watched channels, sorted.
    pub fn channels(&self) -> impl Iterator<Item = &str> {
        self.channels.iter().map(String::as_str)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn is_monitoring(&self, channel: &str) -> bool {
        self.channels.contains(channel)
    }

    /// `None` until the host sets a range; delivery skips such monitors.
    pub fn range(&self) -> Option<&RangeOfInterest> {
        self.range.as_ref()
    }

    pub(crate) fn add_channel(&mut self, channel: &str) -> bool {
        self.channels.insert(channel.to_string())
    }

    pub(crate) fn remove_channel(&mut self, channel: &str) -> bool {
        self.channels.remove(channel)
    }

    pub(crate) fn set_range(&mut self, start: f64, end: f64, max_points: u64) {
        self.range = Some(RangeOfInterest {
            start,
            end,
            max_points,
            updated: Timestamp::now(),
        });
    }
}
