//! Append-only sample log for one channel.

use crate::error::{CacheError, Result};
use crate::types::Sample;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Magic bytes for sample logs.
const LOG_MAGIC: &[u8; 4] = b"SMP\0";

/// Current log format version.
const LOG_VERSION: u8 = 1;

/// Sample record size: timestamp + value + checksum.
const SAMPLE_RECORD_SIZE: u64 = 8 + 8 + 4;

/// Append-only log of `(timestamp, value)` records.
///
/// Layout: magic, version, channel name (u16 length + bytes), then fixed-size
/// records. Each record carries a CRC32 of its 16 data bytes.
pub struct SampleLog {
    /// Path to the log file.
    path: PathBuf,

    /// Log file handle.
    file: File,

    /// Current file size (for appending).
    file_size: u64,

    /// Number of writes since last sync.
    writes_since_sync: u64,

    /// Sync every N writes.
    sync_interval: u64,
}

impl SampleLog {
    /// Default sync interval.
    pub const DEFAULT_SYNC_INTERVAL: u64 = 100;

    /// Open or create the log for `channel` and replay its samples.
    ///
    /// A torn trailing record (short write or bad checksum on the very last
    /// record) is truncated away. A bad record anywhere else is corruption.
    pub fn open(
        path: impl AsRef<Path>,
        channel: &str,
        sync_interval: u64,
    ) -> Result<(Self, Vec<Sample>)> {
        let path = path.as_ref().to_path_buf();

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;

        let mut file_size = file.metadata()?.len();

        let samples = if file_size == 0 {
            Self::write_header(&mut file, channel)?;
            file.sync_all()?;
            file_size = file.stream_position()?;
            Vec::new()
        } else {
            let stored = Self::read_header(&mut file)?;
            if stored != channel {
                return Err(CacheError::InvalidFormat(format!(
                    "Sample log {} belongs to channel {:?}, not {:?}",
                    path.display(),
                    stored,
                    channel
                )));
            }
            let header_len = file.stream_position()?;
            let (samples, valid_end) = Self::replay(&file, header_len, file_size)?;
            if valid_end < file_size {
                warn!(
                    path = %path.display(),
                    dropped_bytes = file_size - valid_end,
                    "truncating torn tail of sample log"
                );
                file.set_len(valid_end)?;
                file.sync_all()?;
                file_size = valid_end;
            }
            samples
        };

        Ok((
            Self {
                path,
                file,
                file_size,
                writes_since_sync: 0,
                sync_interval: sync_interval.max(1),
            },
            samples,
        ))
    }

    /// Read only the channel name stored in a log header.
    pub fn peek_channel(path: impl AsRef<Path>) -> Result<String> {
        let mut file = File::open(path)?;
        Self::read_header(&mut file)
    }

    /// Append a sample to the end of the log.
    pub fn append(&mut self, sample: Sample) -> Result<()> {
        let mut record = [0u8; SAMPLE_RECORD_SIZE as usize];
        record[0..8].copy_from_slice(&sample.timestamp.to_le_bytes());
        record[8..16].copy_from_slice(&sample.value.to_le_bytes());
        let checksum = crc32fast::hash(&record[0..16]);
        record[16..20].copy_from_slice(&checksum.to_le_bytes());

        self.file.seek(SeekFrom::Start(self.file_size))?;
        self.file.write_all(&record)?;
        self.file_size += SAMPLE_RECORD_SIZE;

        self.writes_since_sync += 1;
        if self.writes_since_sync >= self.sync_interval {
            self.file.sync_all()?;
            self.writes_since_sync = 0;
        }

        Ok(())
    }

    /// Force sync all pending writes to disk.
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        self.writes_since_sync = 0;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get current file size.
    pub fn size(&self) -> u64 {
        self.file_size
    }

    fn write_header(file: &mut File, channel: &str) -> Result<()> {
        let name = channel.as_bytes();
        if name.len() > u16::MAX as usize {
            return Err(CacheError::InvalidSample(format!(
                "channel name too long ({} bytes)",
                name.len()
            )));
        }
        file.write_all(LOG_MAGIC)?;
        file.write_all(&[LOG_VERSION])?;
        file.write_all(&(name.len() as u16).to_le_bytes())?;
        file.write_all(name)?;
        Ok(())
    }

    fn read_header(file: &mut File) -> Result<String> {
        file.seek(SeekFrom::Start(0))?;

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != LOG_MAGIC {
            return Err(CacheError::InvalidFormat("Invalid sample log magic".into()));
        }

        let mut version = [0u8; 1];
        file.read_exact(&mut version)?;
        if version[0] != LOG_VERSION {
            return Err(CacheError::InvalidFormat(format!(
                "Unsupported sample log version: {}",
                version[0]
            )));
        }

        let mut len_bytes = [0u8; 2];
        file.read_exact(&mut len_bytes)?;
        let len = u16::from_le_bytes(len_bytes) as usize;
        let mut name = vec![0u8; len];
        file.read_exact(&mut name)?;

        String::from_utf8(name)
            .map_err(|e| CacheError::InvalidFormat(format!("Channel name is not UTF-8: {}", e)))
    }

    /// Read every record after the header. Returns the samples and the offset
    /// just past the last good record.
    fn replay(file: &File, header_len: u64, file_size: u64) -> Result<(Vec<Sample>, u64)> {
        let mut file = file.try_clone()?;
        file.seek(SeekFrom::Start(header_len))?;
        let mut reader = BufReader::new(file);

        let body = file_size - header_len;
        let full_records = body / SAMPLE_RECORD_SIZE;
        let mut samples = Vec::with_capacity(full_records as usize);
        let mut offset = header_len;

        for i in 0..full_records {
            let mut record = [0u8; SAMPLE_RECORD_SIZE as usize];
            reader.read_exact(&mut record)?;

            let stored = u32::from_le_bytes([record[16], record[17], record[18], record[19]]);
            let computed = crc32fast::hash(&record[0..16]);
            if stored != computed {
                let is_last = i + 1 == full_records && body % SAMPLE_RECORD_SIZE == 0;
                if is_last {
                    return Ok((samples, offset));
                }
                return Err(CacheError::Corruption(format!(
                    "sample checksum mismatch at offset {}",
                    offset
                )));
            }

            let mut ts = [0u8; 8];
            ts.copy_from_slice(&record[0..8]);
            let mut value = [0u8; 8];
            value.copy_from_slice(&record[8..16]);
            samples.push(Sample {
                timestamp: f64::from_le_bytes(ts),
                value: f64::from_le_bytes(value),
            });
            offset += SAMPLE_RECORD_SIZE;
        }

        Ok((samples, offset))
    }
}
