//! Owner of monitors, channel caches and subscriptions.

use crate::coverage::IntervalCoverage;
use crate::error::{CacheError, Result};
use crate::monitor::Monitor;
use crate::store::{CacheStore, ChannelStore};
use crate::subscriptions::{SubscriptionRegistry, TransportBinding};
use crate::types::{check_range, Interval, Sample, SeriesBatch};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info};

/// Samples and coverage of one channel.
pub struct ChannelCache {
    pub store: ChannelStore,
    pub coverage: IntervalCoverage,
}

/// Routes host requests to monitors and the subscription registry, and owns
/// every per-channel cache.
///
/// All state is owned here and mutated from a single thread; nothing is
/// shared or locked.
pub struct DataManager {
    store: CacheStore,
    binding: TransportBinding,
    registry: SubscriptionRegistry,
    monitors: BTreeMap<String, Monitor>,
    channels: HashMap<String, ChannelCache>,
}

impl DataManager {
    /// A manager whose subscriptions go through `binding`.
    pub fn new(store: CacheStore, binding: TransportBinding) -> Self {
        Self {
            store,
            binding,
            registry: SubscriptionRegistry::new(),
            monitors: BTreeMap::new(),
            channels: HashMap::new(),
        }
    }

    /// A manager with no live transport (history only).
    pub fn detached(store: CacheStore) -> Self {
        Self::new(store, TransportBinding::detached())
    }

    // --- Monitors ---

    /// Get a monitor, creating it with no channels and no range.
    pub fn get_monitor(&mut self, name: &str) -> &Monitor {
        self.monitors
            .entry(name.to_string())
            .or_insert_with(|| Monitor::new(name))
    }

    pub fn monitor(&self, name: &str) -> Option<&Monitor> {
        self.monitors.get(name)
    }

    /// Monitors in name order.
    pub fn monitors(&self) -> impl Iterator<Item = &Monitor> {
        self.monitors.values()
    }

    /// Names of monitors watching `channel`.
    pub fn subscribers_of(&self, channel: &str) -> Vec<&str> {
        self.monitors
            .values()
            .filter(|m| m.is_monitoring(channel))
            .map(Monitor::name)
            .collect()
    }

    /// Start watching `channel` from `monitor`. Returns false if it was
    /// already watched.
    ///
    /// If the transport refuses the subscription the monitor is left
    /// unchanged and the error returned.
    pub fn monitor_channel(&mut self, monitor: &str, channel: &str) -> Result<bool> {
        let entry = self
            .monitors
            .entry(monitor.to_string())
            .or_insert_with(|| Monitor::new(monitor));
        if entry.is_monitoring(channel) {
            return Ok(false);
        }

        self.registry.acquire(channel, &self.binding)?;
        entry.add_channel(channel);
        debug!(monitor, channel, "monitoring channel");
        Ok(true)
    }

    /// Stop watching `channel` from `monitor`. Returns false (and releases
    /// nothing) if it was not watched.
    pub fn stop_monitor_channel(&mut self, monitor: &str, channel: &str) -> Result<bool> {
        let entry = self
            .monitors
            .entry(monitor.to_string())
            .or_insert_with(|| Monitor::new(monitor));
        if !entry.remove_channel(channel) {
            return Ok(false);
        }

        debug!(monitor, channel, "stopped monitoring channel");
        self.registry.release(channel, &self.binding)?;
        Ok(true)
    }

    /// Move a monitor's window. `start > end` is rejected and nothing changes.
    pub fn set_range_of_interest(
        &mut self,
        monitor: &str,
        start: f64,
        end: f64,
        max_points: u64,
    ) -> Result<()> {
        check_range(start, end)?;
        self.monitors
            .entry(monitor.to_string())
            .or_insert_with(|| Monitor::new(monitor))
            .set_range(start, end, max_points);
        debug!(monitor, start, end, max_points, "range of interest updated");
        Ok(())
    }

    // --- Subscriptions ---

    pub fn refcount(&self, channel: &str) -> u32 {
        self.registry.refcount(channel)
    }

    /// Channels with an open network subscription.
    pub fn active_channels(&self) -> Vec<String> {
        self.registry.active_channels()
    }

    /// Generation of the channel's open subscription, if any.
    pub fn subscription_generation(&self, channel: &str) -> Option<u64> {
        self.registry.generation(channel)
    }

    /// Re-open every referenced channel after the transport reconnected.
    /// Returns the channels that failed, with the generation of the attempt.
    pub fn resubscribe_all(&mut self) -> Vec<(String, u64, CacheError)> {
        let channels = self.registry.active_channels();
        info!(count = channels.len(), "resubscribing after reconnect");
        self.registry.resubscribe_all(&self.binding)
    }

    /// Forget a subscription the transport dropped on its own.
    ///
    /// The channel is removed from every monitor and its count cleared so the
    /// host can subscribe again. Returns the monitors that lost it.
    ///
    /// A report for an older `generation` than the open subscription is
    /// stale and changes nothing.
    pub fn drop_subscription(&mut self, channel: &str, generation: u64) -> Vec<String> {
        if self.registry.reset_generation(channel, generation) == 0 {
            debug!(channel, generation, "ignoring failure of a stale subscription");
            return Vec::new();
        }
        self.monitors
            .values_mut()
            .filter_map(|m| m.remove_channel(channel).then(|| m.name().to_string()))
            .collect()
    }

    // --- Channel data ---

    /// Get the cache of `channel`, opening or creating it.
    pub fn get_channel_cache(&mut self, channel: &str) -> Result<&mut ChannelCache> {
        open_cache(&self.store, &mut self.channels, channel)
    }

    /// The cache of `channel` if it is already open.
    pub fn channel_cache(&self, channel: &str) -> Option<&ChannelCache> {
        self.channels.get(channel)
    }

    /// Every channel known in memory or on disk, sorted.
    pub fn channels(&self) -> Result<Vec<String>> {
        let mut names: BTreeSet<String> = self.channels.keys().cloned().collect();
        names.extend(self.store.channels()?);
        Ok(names.into_iter().collect())
    }

    /// Append one live sample. Coverage is not touched.
    pub fn append_sample(&mut self, channel: &str, sample: Sample) -> Result<()> {
        sample.validate()?;
        self.get_channel_cache(channel)?.store.append(sample)
    }

    /// Samples of `channel` in `[start, end)`. A channel that was never seen
    /// yields an empty batch.
    pub fn query_range(&mut self, channel: &str, start: f64, end: f64) -> Result<SeriesBatch> {
        check_range(start, end)?;
        if !self.channels.contains_key(channel) && !self.store.has_channel(channel) {
            return Ok(SeriesBatch::default());
        }
        let cache = self.get_channel_cache(channel)?;
        Ok(cache.store.between(start, end)?.iter().copied().collect())
    }

    /// Store a bulk historical fetch of `[start, end)` and mark the range
    /// loaded.
    ///
    /// Every sample must be finite and inside the range; otherwise nothing is
    /// written. Coverage is only extended once all samples are stored.
    pub fn ingest_history(
        &mut self,
        channel: &str,
        start: f64,
        end: f64,
        samples: &[Sample],
    ) -> Result<()> {
        check_range(start, end)?;
        for sample in samples {
            sample.validate()?;
            if sample.timestamp < start || sample.timestamp >= end {
                return Err(CacheError::InvalidSample(format!(
                    "timestamp {} outside [{}, {})",
                    sample.timestamp, start, end
                )));
            }
        }

        let cache = open_cache(&self.store, &mut self.channels, channel)?;
        let (_, appended) = cache.store.append_all(samples);
        appended?;

        cache.coverage.mark_loaded(start, end)?;
        self.store.save_coverage(channel, &cache.coverage)?;
        debug!(channel, start, end, samples = samples.len(), "history ingested");
        Ok(())
    }

    /// Gaps of `channel` inside `[start, end)`. An unknown channel is one
    /// big gap.
    pub fn unloaded_ranges(&mut self, channel: &str, start: f64, end: f64) -> Result<Vec<Interval>> {
        check_range(start, end)?;
        if !self.channels.contains_key(channel) && !self.store.has_channel(channel) {
            return IntervalCoverage::new().unloaded_ranges(start, end);
        }
        self.get_channel_cache(channel)?
            .coverage
            .unloaded_ranges(start, end)
    }

    /// Gaps in every channel of a monitor's current window. Empty if the
    /// monitor is unknown or has no range.
    pub fn missing_for_monitor(&mut self, name: &str) -> Result<Vec<(String, Vec<Interval>)>> {
        let Some(monitor) = self.monitors.get(name) else {
            return Ok(Vec::new());
        };
        let Some(range) = monitor.range().copied() else {
            return Ok(Vec::new());
        };
        let channels: Vec<String> = monitor.channels().map(str::to_string).collect();

        let mut missing = Vec::new();
        for channel in channels {
            let gaps = self.unloaded_ranges(&channel, range.start, range.end)?;
            if !gaps.is_empty() {
                missing.push((channel, gaps));
            }
        }
        Ok(missing)
    }

    /// Flush every open channel log.
    pub fn sync(&mut self) -> Result<()> {
        for cache in self.channels.values_mut() {
            cache.store.sync()?;
        }
        Ok(())
    }
}

fn open_cache<'a>(
    store: &CacheStore,
    channels: &'a mut HashMap<String, ChannelCache>,
    channel: &str,
) -> Result<&'a mut ChannelCache> {
    if !channels.contains_key(channel) {
        let (samples, coverage) = store.open_channel(channel)?;
        debug!(channel, samples = samples.len(), "opened channel cache");
        channels.insert(
            channel.to_string(),
            ChannelCache {
                store: samples,
                coverage,
            },
        );
    }
    channels
        .get_mut(channel)
        .ok_or_else(|| CacheError::UnknownChannel(channel.to_string()))
}
