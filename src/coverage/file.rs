//! On-disk snapshot of a coverage set.

use super::IntervalCoverage;
use crate::error::{CacheError, Result};
use crate::types::Interval;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::Path;

/// Magic bytes for coverage files.
const COVERAGE_MAGIC: &[u8; 4] = b"COV\0";

/// Current coverage format version.
const COVERAGE_VERSION: u8 = 1;

/// Magic + version + length prefix + trailing checksum.
const COVERAGE_OVERHEAD: u64 = 4 + 1 + 8 + 4;

impl IntervalCoverage {
    /// Write the coverage set to `path`, replacing any previous snapshot.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let tmp = path.with_extension("cov.tmp");

        let encoded = rmp_serde::to_vec(self.intervals())?;

        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp)?;

            file.write_all(COVERAGE_MAGIC)?;
            file.write_all(&[COVERAGE_VERSION])?;
            file.write_all(&(encoded.len() as u64).to_le_bytes())?;
            file.write_all(&encoded)?;
            file.write_all(&crc32fast::hash(&encoded).to_le_bytes())?;
            file.sync_all()?;
        }

        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Load a coverage set. A missing file is an empty set.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::new());
        }

        let mut file = File::open(path)?;
        let file_len = file.metadata()?.len();

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != COVERAGE_MAGIC {
            return Err(CacheError::InvalidFormat("Invalid coverage magic".into()));
        }

        let mut version = [0u8; 1];
        file.read_exact(&mut version)?;
        if version[0] != COVERAGE_VERSION {
            return Err(CacheError::InvalidFormat(format!(
                "Unsupported coverage version: {}",
                version[0]
            )));
        }

        let mut len_bytes = [0u8; 8];
        file.read_exact(&mut len_bytes)?;
        let len = u64::from_le_bytes(len_bytes);
        if len.checked_add(COVERAGE_OVERHEAD) != Some(file_len) {
            return Err(CacheError::Corruption(format!(
                "coverage file {} declares {} payload bytes but is {} bytes long",
                path.display(),
                len,
                file_len
            )));
        }

        let mut encoded = vec![0u8; len as usize];
        file.read_exact(&mut encoded)?;

        let mut checksum_bytes = [0u8; 4];
        file.read_exact(&mut checksum_bytes)?;
        let stored = u32::from_le_bytes(checksum_bytes);
        let computed = crc32fast::hash(&encoded);
        if stored != computed {
            return Err(CacheError::ChecksumMismatch {
                expected: stored,
                got: computed,
            });
        }

        let intervals: Vec<Interval> = rmp_serde::from_slice(&encoded)?;
        Ok(Self::from_sorted(intervals))
    }
}
