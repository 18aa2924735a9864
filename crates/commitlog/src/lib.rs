//! # Commitlog - segmented, append-only record log
//!
//! Ties [`segment::Segment`]s together into one ordered log addressed by a
//! monotonically increasing offset.
//!
//! ## Architecture
//!
//! ```text
//! Caller
//!   |
//!   v
//! ┌──────────────────────────────────────────────┐
//! │                     LOG                      │
//! │                                              │
//! │ append.rs → (write lock) active segment      │
//! │               |  store frame → index entry   │
//! │               |                              │
//! │               |  (segment maxed?)  yes       │
//! │               v                              │
//! │            rotate() → new active segment     │
//! │                                              │
//! │ read.rs → (read lock) find [base, next)      │
//! │            → index → store frame             │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! ## Module Responsibilities
//!
//! | Module       | Purpose                                             |
//! |--------------|-----------------------------------------------------|
//! | [`lib.rs`]   | `Log` struct, `open`, accessors, `Debug`, `Drop`    |
//! | [`recovery`] | directory scan, segment reopening on startup        |
//! | [`append`]   | `append()`, rotation                                |
//! | [`read`]     | `read()`, sequential [`LogReader`]                  |
//! | [`volatile`] | [`MemoryLog`], the non-persistent variant           |
//!
//! ## Concurrency
//!
//! One `RwLock` guards the segment list. `append` holds it exclusively, so
//! offsets are handed out one at a time with no gaps or duplicates; `read`
//! shares it, so any number of reads run together but never observe a
//! segment mid-rotation. `Log` is `Send + Sync`; share it with `Arc<Log>`.
//!
//! Below the log lock each store keeps its file behind a `Mutex` and flushes
//! pending appends before a read, so reads that hit the same segment run one
//! at a time. Reads on different segments do not contend.

mod append;
mod read;
mod recovery;
mod volatile;

use config::{ConfigError, LogConfig};
use segment::{Segment, SegmentError};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use tracing::{info, warn};

pub use read::LogReader;
pub use volatile::MemoryLog;

/// Errors surfaced by [`Log`] and [`MemoryLog`].
#[derive(Debug, Error)]
pub enum LogError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("config: {0}")]
    Config(#[from] ConfigError),

    #[error("segment: {0}")]
    Segment(#[from] SegmentError),

    /// No segment holds this offset: never assigned, or in the future.
    #[error("offset {0} out of range")]
    OutOfRange(u64),

    /// A thread panicked while holding the log lock.
    #[error("log lock poisoned")]
    Poisoned,

    /// The log was closed.
    #[error("log is closed")]
    Closed,
}

impl LogError {
    /// True when the error means "no record at that offset".
    pub fn is_out_of_range(&self) -> bool {
        match self {
            LogError::OutOfRange(_) => true,
            LogError::Segment(e) => e.is_out_of_range(),
            _ => false,
        }
    }
}

/// The two operations a collaborator (e.g. a request handler) needs.
///
/// Implemented by the durable [`Log`] and the volatile [`MemoryLog`], so a
/// caller holding `Arc<dyn CommitLog>` does not care which one it got.
pub trait CommitLog: Send + Sync {
    /// Appends `record`, returning the offset assigned to it.
    fn append(&self, record: &[u8]) -> Result<u64, LogError>;

    /// Returns the record stored at `offset`.
    fn read(&self, offset: u64) -> Result<Vec<u8>, LogError>;
}

/// Segment list guarded by the log's lock. The last segment is active.
pub(crate) struct Segments {
    pub(crate) list: Vec<Segment>,
    pub(crate) closed: bool,
}

impl Segments {
    pub(crate) fn active(&self) -> &Segment {
        // never empty: `Log::open` guarantees at least one segment
        &self.list[self.list.len() - 1]
    }
}

/// A durable, segmented commit log rooted at one directory.
///
/// # Write Path
///
/// 1. Take the write lock.
/// 2. If the active segment is already maxed, rotate first.
/// 3. Append to the active segment (store frame, then index entry).
/// 4. If that made the segment maxed, rotate to a new segment whose base
///    offset is the offset just assigned + 1.
///
/// # Read Path
///
/// Take the read lock, find the segment whose `[base, next)` range holds
/// the offset, and let it look the record up.
///
/// # Recovery
///
/// [`Log::open`] reopens every segment found in the directory, oldest
/// first, so appends continue numbering where the previous run stopped.
pub struct Log {
    dir: PathBuf,
    config: LogConfig,
    pub(crate) segments: RwLock<Segments>,
}

impl std::fmt::Debug for Log {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // try_read: Debug must not block behind an in-flight append
        let snapshot = self.segments.try_read().ok().map(|segs| {
            (
                segs.list.len(),
                segs.list[0].base_offset(),
                segs.active().next_offset(),
                segs.active().store_size(),
                segs.closed,
            )
        });

        let mut d = f.debug_struct("Log");
        d.field("dir", &self.dir)
            .field("max_store_bytes", &self.config.max_store_bytes)
            .field("max_index_bytes", &self.config.max_index_bytes);
        match snapshot {
            Some((count, lowest, next, store_size, closed)) => {
                d.field("segment_count", &count)
                    .field("lowest_offset", &lowest)
                    .field("next_offset", &next)
                    .field("active_store_size", &store_size)
                    .field("closed", &closed);
            }
            None => {
                d.field("segments", &"<locked>");
            }
        }
        d.finish()
    }
}

impl Log {
    /// Opens the log in `dir`, creating the directory if needed.
    ///
    /// Zero thresholds in `config` fall back to the defaults (1024 bytes).
    ///
    /// # Recovery Steps
    ///
    /// 1. Normalize and validate the config.
    /// 2. Scan `dir` for `<base>.store` / `<base>.index` files.
    /// 3. Reopen one segment per base offset, ascending.
    /// 4. If none exist, create the first segment at `config.initial_offset`.
    pub fn open<P: AsRef<Path>>(dir: P, config: LogConfig) -> Result<Self, LogError> {
        let dir = dir.as_ref().to_path_buf();
        let config = config.normalized();
        config.validate()?;

        std::fs::create_dir_all(&dir)?;

        let mut list = recovery::load_segments(&dir, config)?;
        if list.is_empty() {
            list.push(Segment::new(&dir, config.initial_offset, config)?);
        }

        let lowest = list[0].base_offset();
        let next = list[list.len() - 1].next_offset();
        info!(
            dir = %dir.display(),
            segments = list.len(),
            lowest_offset = lowest,
            next_offset = next,
            "log opened"
        );

        Ok(Self {
            dir,
            config,
            segments: RwLock::new(Segments { list, closed: false }),
        })
    }

    /// Closes every segment. Later appends and reads fail with
    /// `LogError::Closed`; closing twice is a no-op.
    ///
    /// Every segment is attempted; the first error is returned.
    pub fn close(&self) -> Result<(), LogError> {
        let mut segs = self.write_lock()?;
        if segs.closed {
            return Ok(());
        }
        segs.closed = true;

        let mut first_err = None;
        for seg in segs.list.iter_mut() {
            if let Err(e) = seg.close() {
                warn!(base_offset = seg.base_offset(), error = %e, "segment close failed");
                first_err.get_or_insert(e);
            }
        }
        info!(dir = %self.dir.display(), "log closed");

        match first_err {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    /// Base offset of the oldest segment.
    pub fn lowest_offset(&self) -> Result<u64, LogError> {
        Ok(self.read_lock()?.list[0].base_offset())
    }

    /// Offset of the newest record, or `None` if the log holds no records.
    pub fn highest_offset(&self) -> Result<Option<u64>, LogError> {
        let segs = self.read_lock()?;
        let lowest = segs.list[0].base_offset();
        let next = segs.active().next_offset();
        Ok((next > lowest).then(|| next - 1))
    }

    /// The offset the next append will receive.
    pub fn next_offset(&self) -> Result<u64, LogError> {
        Ok(self.read_lock()?.active().next_offset())
    }

    pub fn segment_count(&self) -> Result<usize, LogError> {
        Ok(self.read_lock()?.list.len())
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The normalized config this log runs with.
    #[must_use]
    pub fn config(&self) -> LogConfig {
        self.config
    }

    pub(crate) fn read_lock(&self) -> Result<RwLockReadGuard<'_, Segments>, LogError> {
        self.segments.read().map_err(|_| LogError::Poisoned)
    }

    pub(crate) fn write_lock(&self) -> Result<RwLockWriteGuard<'_, Segments>, LogError> {
        self.segments.write().map_err(|_| LogError::Poisoned)
    }
}

impl CommitLog for Log {
    fn append(&self, record: &[u8]) -> Result<u64, LogError> {
        Log::append(self, record)
    }

    fn read(&self, offset: u64) -> Result<Vec<u8>, LogError> {
        Log::read(self, offset)
    }
}

/// Best-effort close on drop.
///
/// Errors are ignored because Drop cannot propagate them; the segments'
/// own drops still release every handle and mapping.
impl Drop for Log {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests;
