//! Backing directory holding every channel's log and coverage snapshot.

use super::channel::ChannelStore;
use super::log::SampleLog;
use crate::config::CacheConfig;
use crate::coverage::IntervalCoverage;
use crate::error::{CacheError, Result};
use crate::types::ChannelKey;
use fs2::FileExt;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Magic bytes for the cache manifest.
const CACHE_MAGIC: &[u8; 4] = b"CMX\0";

/// Current cache format version.
const CACHE_VERSION: u8 = 1;

const CHANNELS_DIR: &str = "channels";

/// On-disk layout of an opened cache directory.
struct DiskLayout {
    root: PathBuf,
    /// Lock file for exclusive access.
    _lock_file: File,
}

/// Factory for channel stores and coverage sets.
///
/// With no backing path everything lives in memory and is lost on exit.
/// With a path, each channel gets `channels/<sha256>.log` for samples and
/// `channels/<sha256>.cov` for coverage.
pub struct CacheStore {
    disk: Option<DiskLayout>,
    sync_interval: u64,
}

impl CacheStore {
    /// A store that never touches the filesystem.
    pub fn memory() -> Self {
        Self {
            disk: None,
            sync_interval: SampleLog::DEFAULT_SYNC_INTERVAL,
        }
    }

    /// Open according to `config.path`.
    pub fn open(config: &CacheConfig) -> Result<Self> {
        let Some(path) = config.path.as_ref() else {
            return Ok(Self::memory());
        };

        if path.join("MANIFEST").exists() {
            Self::verify_manifest(path)?;
        } else if config.create_if_missing {
            fs::create_dir_all(path.join(CHANNELS_DIR))?;
            Self::write_manifest(path)?;
        } else {
            return Err(CacheError::NotInitialized);
        }

        let lock_file = Self::acquire_lock(path)?;
        fs::create_dir_all(path.join(CHANNELS_DIR))?;

        debug!(path = %path.display(), "opened cache directory");

        Ok(Self {
            disk: Some(DiskLayout {
                root: path.clone(),
                _lock_file: lock_file,
            }),
            sync_interval: config.sync_interval,
        })
    }

    pub fn is_persistent(&self) -> bool {
        self.disk.is_some()
    }

    /// Open the sample table and coverage set of `channel`.
    pub fn open_channel(&self, channel: &str) -> Result<(ChannelStore, IntervalCoverage)> {
        match &self.disk {
            None => Ok((ChannelStore::in_memory(channel), IntervalCoverage::new())),
            Some(disk) => {
                let store = ChannelStore::open(
                    Self::log_path(&disk.root, channel),
                    channel,
                    self.sync_interval,
                )?;
                let coverage = IntervalCoverage::load(Self::coverage_path(&disk.root, channel))?;
                Ok((store, coverage))
            }
        }
    }

    /// True if `channel` has a sample log on disk.
    pub fn has_channel(&self, channel: &str) -> bool {
        match &self.disk {
            None => false,
            Some(disk) => Self::log_path(&disk.root, channel).exists(),
        }
    }

    /// Persist the coverage set of `channel`.
    pub fn save_coverage(&self, channel: &str, coverage: &IntervalCoverage) -> Result<()> {
        if let Some(disk) = &self.disk {
            coverage.save(Self::coverage_path(&disk.root, channel))?;
        }
        Ok(())
    }

    /// Channels that have a sample log on disk.
    pub fn channels(&self) -> Result<Vec<String>> {
        let Some(disk) = &self.disk else {
            return Ok(Vec::new());
        };

        let mut names = Vec::new();
        for entry in fs::read_dir(disk.root.join(CHANNELS_DIR))? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("log") {
                continue;
            }
            match SampleLog::peek_channel(&path) {
                Ok(name) => names.push(name),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable sample log"),
            }
        }
        names.sort();
        Ok(names)
    }

    fn log_path(root: &Path, channel: &str) -> PathBuf {
        let key = ChannelKey::for_channel(channel);
        root.join(CHANNELS_DIR).join(format!("{}.log", key.to_hex()))
    }

    fn coverage_path(root: &Path, channel: &str) -> PathBuf {
        let key = ChannelKey::for_channel(channel);
        root.join(CHANNELS_DIR).join(format!("{}.cov", key.to_hex()))
    }

    fn write_manifest(path: &Path) -> Result<()> {
        let mut file = File::create(path.join("MANIFEST"))?;
        file.write_all(CACHE_MAGIC)?;
        file.write_all(&[CACHE_VERSION])?;
        file.sync_all()?;
        Ok(())
    }

    fn verify_manifest(path: &Path) -> Result<()> {
        let mut file = File::open(path.join("MANIFEST"))?;

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != CACHE_MAGIC {
            return Err(CacheError::InvalidFormat("Invalid cache magic".into()));
        }

        let mut version = [0u8; 1];
        file.read_exact(&mut version)?;
        if version[0] != CACHE_VERSION {
            return Err(CacheError::InvalidFormat(format!(
                "Unsupported cache version: {}",
                version[0]
            )));
        }

        Ok(())
    }

    fn acquire_lock(path: &Path) -> Result<File> {
        let lock_file = File::create(path.join("LOCK"))?;
        lock_file
            .try_lock_exclusive()
            .map_err(|_| CacheError::Locked)?;
        Ok(lock_file)
    }
}
