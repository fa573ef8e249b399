//! Core types for the channel cache.

use crate::error::{CacheError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// A single point of a channel: `(timestamp, value)`.
///
/// Samples are immutable once stored. Several samples may share a timestamp.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: f64,
    pub value: f64,
}

impl Sample {
    pub fn new(timestamp: f64, value: f64) -> Self {
        Self { timestamp, value }
    }

    /// Reject NaN and infinite components.
    pub fn validate(&self) -> Result<()> {
        if !self.timestamp.is_finite() {
            return Err(CacheError::InvalidSample(format!(
                "non-finite timestamp {}",
                self.timestamp
            )));
        }
        if !self.value.is_finite() {
            return Err(CacheError::InvalidSample(format!(
                "non-finite value {} at {}",
                self.value, self.timestamp
            )));
        }
        Ok(())
    }
}

/// A time span `[start, end)` already cached for a channel.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub start: f64,
    pub end: f64,
}

impl Interval {
    /// Build an interval, rejecting `start > end` and NaN bounds.
    pub fn new(start: f64, end: f64) -> Result<Self> {
        check_range(start, end)?;
        Ok(Self { start, end })
    }

    pub fn len(&self) -> f64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Validate a `(start, end)` pair at a call boundary.
pub fn check_range(start: f64, end: f64) -> Result<()> {
    if start.is_nan() || end.is_nan() || start > end {
        return Err(CacheError::InvalidRange { start, end });
    }
    Ok(())
}

/// Parallel timestamp/value arrays, the shape the host consumes.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SeriesBatch {
    pub timestamps: Vec<f64>,
    pub values: Vec<f64>,
}

impl SeriesBatch {
    pub fn single(sample: Sample) -> Self {
        Self {
            timestamps: vec![sample.timestamp],
            values: vec![sample.value],
        }
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

impl FromIterator<Sample> for SeriesBatch {
    fn from_iter<I: IntoIterator<Item = Sample>>(iter: I) -> Self {
        let mut batch = SeriesBatch::default();
        for sample in iter {
            batch.timestamps.push(sample.timestamp);
            batch.values.push(sample.value);
        }
        batch
    }
}

/// Filesystem-safe key for a channel name (SHA-256, hex encoded).
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ChannelKey(pub [u8; 32]);

impl ChannelKey {
    pub fn for_channel(channel: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(channel.as_bytes());
        ChannelKey(hasher.finalize().into())
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChannelKey({}...)", &self.to_hex()[..8])
    }
}

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time. Clocks before the epoch read as zero.
    pub fn now() -> Self {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as i64)
            .unwrap_or(0);
        Timestamp(micros)
    }

    /// Seconds since epoch as a float.
    pub fn as_secs_f64(&self) -> f64 {
        self.0 as f64 / 1_000_000.0
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_rejects_inverted_range() {
        assert!(matches!(
            Interval::new(5.0, 1.0),
            Err(CacheError::InvalidRange { .. })
        ));
        assert!(Interval::new(1.0, 1.0).unwrap().is_empty());
    }

    #[test]
    fn test_nan_range_rejected() {
        assert!(check_range(f64::NAN, 1.0).is_err());
        assert!(check_range(0.0, f64::NAN).is_err());
    }

    #[test]
    fn test_sample_validation() {
        assert!(Sample::new(1.0, 2.0).validate().is_ok());
        assert!(Sample::new(f64::INFINITY, 2.0).validate().is_err());
        assert!(Sample::new(1.0, f64::NAN).validate().is_err());
    }

    #[test]
    fn test_series_batch_from_samples() {
        let batch: SeriesBatch = vec![Sample::new(1.0, 10.0), Sample::new(2.0, 20.0)]
            .into_iter()
            .collect();
        assert_eq!(batch.timestamps, vec![1.0, 2.0]);
        assert_eq!(batch.values, vec![10.0, 20.0]);
    }

    #[test]
    fn test_channel_key_is_stable() {
        let a = ChannelKey::for_channel("OPC1:channelA");
        let b = ChannelKey::for_channel("OPC1:channelA");
        assert_eq!(a, b);
        assert_eq!(a.to_hex().len(), 64);
        assert_ne!(a, ChannelKey::for_channel("OPC2:channelB"));
    }
}
