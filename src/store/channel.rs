//! Per-channel sample table with a timestamp index.

use super::log::SampleLog;
use crate::error::Result;
use crate::types::{check_range, Sample};
use std::cmp::Ordering;
use std::path::Path;

/// Samples of one channel, ordered by timestamp.
///
/// Samples live in memory sorted by timestamp (ties keep arrival order) and,
/// when a backing log is attached, every append is written to it first.
pub struct ChannelStore {
    channel: String,
    samples: Vec<Sample>,
    log: Option<SampleLog>,
}

impl ChannelStore {
    /// A store with no backing file.
    pub fn in_memory(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            samples: Vec::new(),
            log: None,
        }
    }

    /// Open (or create) a file-backed store and replay what it holds.
    pub fn open(path: impl AsRef<Path>, channel: &str, sync_interval: u64) -> Result<Self> {
        let (log, mut samples) = SampleLog::open(path, channel, sync_interval)?;
        // Stable, so equal timestamps keep their log order.
        samples.sort_by(|a, b| a.timestamp.partial_cmp(&b.timestamp).unwrap_or(Ordering::Equal));

        Ok(Self {
            channel: channel.to_string(),
            samples,
            log: Some(log),
        })
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Append one sample. Non-finite samples are rejected before anything is
    /// written.
    pub fn append(&mut self, sample: Sample) -> Result<()> {
        sample.validate()?;

        if let Some(log) = self.log.as_mut() {
            log.append(sample)?;
        }

        match self.samples.last() {
            Some(last) if last.timestamp > sample.timestamp => {
                let pos = self
                    .samples
                    .partition_point(|s| s.timestamp <= sample.timestamp);
                self.samples.insert(pos, sample);
            }
            _ => self.samples.push(sample),
        }

        Ok(())
    }

    /// Append several samples in order. Stops at the first failure and
    /// returns how many were stored before it.
    pub fn append_all(&mut self, samples: &[Sample]) -> (usize, Result<()>) {
        for (i, sample) in samples.iter().enumerate() {
            if let Err(e) = self.append(*sample) {
                return (i, Err(e));
            }
        }
        (samples.len(), Ok(()))
    }

    /// Samples with `start <= timestamp < end`, ascending.
    pub fn between(&self, start: f64, end: f64) -> Result<&[Sample]> {
        check_range(start, end)?;
        let lo = self.samples.partition_point(|s| s.timestamp < start);
        let hi = self.samples.partition_point(|s| s.timestamp < end);
        Ok(&self.samples[lo..hi.max(lo)])
    }

    /// Earliest and latest stored timestamps.
    pub fn span(&self) -> Option<(f64, f64)> {
        match (self.samples.first(), self.samples.last()) {
            (Some(first), Some(last)) => Some((first.timestamp, last.timestamp)),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn is_persistent(&self) -> bool {
        self.log.is_some()
    }

    /// Flush the backing log, if any.
    pub fn sync(&mut self) -> Result<()> {
        if let Some(log) = self.log.as_mut() {
            log.sync()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CacheError;
    use tempfile::TempDir;

    fn timestamps(samples: &[Sample]) -> Vec<f64> {
        samples.iter().map(|s| s.timestamp).collect()
    }

    #[test]
    fn test_between_is_half_open() {
        let mut store = ChannelStore::in_memory("c1");
        for ts in [100.0, 150.0, 200.0, 250.0] {
            store.append(Sample::new(ts, ts / 10.0)).unwrap();
        }

        let hits = store.between(100.0, 200.0).unwrap();
        assert_eq!(timestamps(hits), vec![100.0, 150.0]);
    }

    #[test]
    fn test_out_of_order_append_is_sorted() {
        let mut store = ChannelStore::in_memory("c1");
        for ts in [5.0, 1.0, 3.0, 2.0, 4.0] {
            store.append(Sample::new(ts, 0.0)).unwrap();
        }
        assert_eq!(
            timestamps(store.between(0.0, 10.0).unwrap()),
            vec![1.0, 2.0, 3.0, 4.0, 5.0]
        );
        assert_eq!(store.span(), Some((1.0, 5.0)));
    }

    #[test]
    fn test_duplicate_timestamps_kept() {
        let mut store = ChannelStore::in_memory("c1");
        store.append(Sample::new(1.0, 10.0)).unwrap();
        store.append(Sample::new(1.0, 11.0)).unwrap();

        let hits = store.between(0.0, 2.0).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].value, 10.0);
        assert_eq!(hits[1].value, 11.0);
    }

    #[test]
    fn test_invalid_query_and_sample() {
        let mut store = ChannelStore::in_memory("c1");
        assert!(matches!(
            store.between(10.0, 0.0),
            Err(CacheError::InvalidRange { .. })
        ));
        assert!(store.append(Sample::new(f64::NAN, 1.0)).is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn test_reopen_restores_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("c1.log");

        {
            let mut store = ChannelStore::open(&path, "c1", 1).unwrap();
            store.append(Sample::new(30.0, 3.0)).unwrap();
            store.append(Sample::new(10.0, 1.0)).unwrap();
            store.append(Sample::new(20.0, 2.0)).unwrap();
            assert!(store.is_persistent());
        }

        let store = ChannelStore::open(&path, "c1", 1).unwrap();
        assert_eq!(
            timestamps(store.between(0.0, 100.0).unwrap()),
            vec![10.0, 20.0, 30.0]
        );
    }

    #[test]
    fn test_append_all_reports_partial() {
        let mut store = ChannelStore::in_memory("c1");
        let batch = [
            Sample::new(1.0, 1.0),
            Sample::new(2.0, f64::INFINITY),
            Sample::new(3.0, 3.0),
        ];
        let (stored, result) = store.append_all(&batch);
        assert_eq!(stored, 1);
        assert!(result.is_err());
        assert_eq!(store.len(), 1);
    }
}
