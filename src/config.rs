//! Cache configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for a cache engine.
#[derive(Clone, Debug)]
pub struct CacheConfig {
    /// Backing directory. `None` keeps everything in memory.
    pub path: Option<PathBuf>,

    /// Whether to create the directory if it doesn't exist.
    pub create_if_missing: bool,

    /// Period of the historical delivery tick.
    pub tick_interval: Duration,

    /// Prefix prepended to a channel name to form its transport topic.
    pub topic_prefix: String,

    /// Sync each sample log every N appends.
    pub sync_interval: u64,

    /// Max host messages buffered before new ones are dropped.
    pub outbox_capacity: usize,

    /// Max queued host requests and transport events.
    pub queue_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: None,
            create_if_missing: true,
            tick_interval: Duration::from_secs(1),
            topic_prefix: "realtime.data_".to_string(),
            sync_interval: 100,
            outbox_capacity: 10_000,
            queue_capacity: 10_000,
        }
    }
}

impl CacheConfig {
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    pub fn with_topic_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.topic_prefix = prefix.into();
        self
    }

    pub fn with_outbox_capacity(mut self, capacity: usize) -> Self {
        self.outbox_capacity = capacity;
        self
    }

    /// Transport topic for a channel.
    pub fn topic_for(&self, channel: &str) -> String {
        format!("{}{}", self.topic_prefix, channel)
    }
}
