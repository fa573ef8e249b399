//! Reference-counted channel subscriptions.

use super::binding::TransportBinding;
use crate::error::{CacheError, Result};
use std::collections::HashMap;
use tracing::debug;

/// Counts how many monitors want each channel.
///
/// The network subscription for a channel is open exactly while its count is
/// positive: the 0 -> 1 transition opens it, 1 -> 0 closes it, every other
/// change only touches the counter.
///
/// Every open gets a fresh generation number, handed to the transport
/// callbacks. Reports tagged with an older generation belong to a
/// subscription that no longer exists.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    entries: HashMap<String, Entry>,
    next_generation: u64,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    count: u32,
    generation: u64,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a reference on `channel`. Returns true if this call opened the
    /// network subscription.
    ///
    /// If opening fails the count is left untouched, so the caller can retry.
    pub fn acquire(&mut self, channel: &str, binding: &TransportBinding) -> Result<bool> {
        if let Some(entry) = self.entries.get_mut(channel) {
            entry.count += 1;
            debug!(channel, refcount = entry.count, "acquired");
            return Ok(false);
        }

        let generation = self.bump_generation();
        binding.open(channel, generation)?;
        self.entries
            .insert(channel.to_string(), Entry { count: 1, generation });
        debug!(channel, generation, refcount = 1, "acquired");
        Ok(true)
    }

    /// Drop a reference on `channel`. Returns true if this call closed the
    /// network subscription. Releasing an unreferenced channel is a no-op.
    ///
    /// The count is decremented even if closing fails; the error is returned
    /// for logging.
    pub fn release(&mut self, channel: &str, binding: &TransportBinding) -> Result<bool> {
        let Some(entry) = self.entries.get_mut(channel) else {
            return Ok(false);
        };

        entry.count = entry.count.saturating_sub(1);
        debug!(channel, refcount = entry.count, "released");
        if entry.count > 0 {
            return Ok(false);
        }

        self.entries.remove(channel);
        binding.close(channel)?;
        Ok(true)
    }

    /// Forget a channel entirely (the transport already dropped it).
    /// Returns the count it had.
    pub fn reset(&mut self, channel: &str) -> u32 {
        self.entries.remove(channel).map_or(0, |e| e.count)
    }

    /// Like [`reset`](Self::reset), but only if `generation` is the open
    /// subscription. A stale generation leaves everything alone and returns 0.
    pub fn reset_generation(&mut self, channel: &str, generation: u64) -> u32 {
        if self.generation(channel) != Some(generation) {
            return 0;
        }
        self.reset(channel)
    }

    /// Re-open every referenced channel after a reconnect. Counts are not
    /// changed; each re-open gets a new generation. Returns the channels that
    /// failed to re-open, with the generation they were given.
    pub fn resubscribe_all(&mut self, binding: &TransportBinding) -> Vec<(String, u64, CacheError)> {
        let mut failed = Vec::new();
        for channel in self.active_channels() {
            let generation = self.bump_generation();
            if let Some(entry) = self.entries.get_mut(&channel) {
                entry.generation = generation;
            }
            if let Err(e) = binding.open(&channel, generation) {
                failed.push((channel, generation, e));
            }
        }
        failed
    }

    pub fn refcount(&self, channel: &str) -> u32 {
        self.entries.get(channel).map_or(0, |e| e.count)
    }

    /// Generation of the open subscription, if any.
    pub fn generation(&self, channel: &str) -> Option<u64> {
        self.entries.get(channel).map(|e| e.generation)
    }

    pub fn is_open(&self, channel: &str) -> bool {
        self.refcount(channel) > 0
    }

    /// Channels with a positive count, sorted.
    pub fn active_channels(&self) -> Vec<String> {
        let mut channels: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, e)| e.count > 0)
            .map(|(c, _)| c.clone())
            .collect();
        channels.sort();
        channels
    }

    fn bump_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }
}
