//! # Segment - one bounded slice of the commit log
//!
//! A segment pairs a [`store::Store`] (record bytes) with an
//! [`index::Index`] (relative offset -> store position) and covers the
//! contiguous offset range `[base_offset, next_offset)`.
//!
//! ## On-disk naming
//!
//! ```text
//! <dir>/00000000000000000016.store
//! <dir>/00000000000000000016.index
//! ```
//!
//! The stem is the zero-padded decimal base offset (20 digits fit any
//! `u64`), so a lexicographic directory listing is also offset order and
//! [`parse_base_offset`] recovers the number on startup.
//!
//! ## Lifecycle
//!
//! ```text
//! Active --append makes it maxed--> Maxed --log rotates--> Closed (read-only)
//! ```

mod recovery;

use config::LogConfig;
use index::{Index, IndexError};
use std::io;
use std::path::{Path, PathBuf};
use store::{Store, StoreError};
use thiserror::Error;
use tracing::warn;

/// Extension of the record file.
pub const STORE_EXT: &str = "store";
/// Extension of the offset index file.
pub const INDEX_EXT: &str = "index";

/// Errors that can occur during segment operations.
#[derive(Debug, Error)]
pub enum SegmentError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("index: {0}")]
    Index(#[from] IndexError),

    #[error("store: {0}")]
    Store(#[from] StoreError),

    /// The offset is not in `[base, next)`.
    #[error("offset {offset} out of range [{base}, {next})")]
    OutOfRange { offset: u64, base: u64, next: u64 },

    /// The segment already holds `u32::MAX + 1` records.
    #[error("relative offset for {0} does not fit in u32")]
    RelativeOffsetOverflow(u64),
}

impl SegmentError {
    /// True when the error means "no record at that offset".
    pub fn is_out_of_range(&self) -> bool {
        match self {
            SegmentError::OutOfRange { .. } => true,
            SegmentError::Index(e) => e.is_out_of_range(),
            SegmentError::Store(e) => e.is_out_of_range(),
            _ => false,
        }
    }
}

/// Zero-padded file stem for a segment starting at `base_offset`.
#[must_use]
pub fn file_stem(base_offset: u64) -> String {
    format!("{:020}", base_offset)
}

/// Path of the store file for `base_offset` under `dir`.
#[must_use]
pub fn store_path(dir: &Path, base_offset: u64) -> PathBuf {
    dir.join(format!("{}.{}", file_stem(base_offset), STORE_EXT))
}

/// Path of the index file for `base_offset` under `dir`.
#[must_use]
pub fn index_path(dir: &Path, base_offset: u64) -> PathBuf {
    dir.join(format!("{}.{}", file_stem(base_offset), INDEX_EXT))
}

/// Extracts the base offset from a segment file path.
///
/// Returns `None` for anything that is not `<u64>.store` or `<u64>.index`.
#[must_use]
pub fn parse_base_offset(path: &Path) -> Option<u64> {
    let ext = path.extension()?.to_str()?;
    if ext != STORE_EXT && ext != INDEX_EXT {
        return None;
    }
    path.file_stem()?.to_str()?.parse().ok()
}

/// A store + index pair covering `[base_offset, next_offset)`.
pub struct Segment {
    base_offset: u64,
    next_offset: u64,
    store: Store,
    index: Index,
    config: LogConfig,
}

impl std::fmt::Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segment")
            .field("base_offset", &self.base_offset)
            .field("next_offset", &self.next_offset)
            .field("store_size", &self.store.size())
            .field("index_size", &self.index.size())
            .field("maxed", &self.is_maxed())
            .finish()
    }
}

impl Segment {
    /// Opens (or creates) the segment starting at `base_offset` under `dir`.
    ///
    /// Existing files are reconciled first: index entries that do not point
    /// at a complete frame are dropped and store bytes past the last indexed
    /// frame are cut, so `next_offset = base_offset + index entries` always
    /// names the next free offset after a restart.
    ///
    /// # Errors
    ///
    /// Propagates store/index open failures. A store opened before a failing
    /// index open is released before returning.
    pub fn new<P: AsRef<Path>>(
        dir: P,
        base_offset: u64,
        config: LogConfig,
    ) -> Result<Self, SegmentError> {
        let dir = dir.as_ref();
        let config = config.normalized();

        let store = Store::open(store_path(dir, base_offset))?;
        let index = Index::open(index_path(dir, base_offset), config.max_index_bytes)?;

        let mut segment = Self {
            base_offset,
            next_offset: base_offset,
            store,
            index,
            config,
        };
        segment.reconcile()?;
        segment.next_offset = base_offset + segment.index.len();
        Ok(segment)
    }

    /// Appends `record`, returning the absolute offset assigned to it.
    ///
    /// The store write happens first. If the index entry cannot be written
    /// the frame is cut from the store again, so a failed append assigns no
    /// offset and leaves the two files in step.
    pub fn append(&mut self, record: &[u8]) -> Result<u64, SegmentError> {
        let offset = self.next_offset;
        let relative = u32::try_from(offset - self.base_offset)
            .map_err(|_| SegmentError::RelativeOffsetOverflow(offset))?;

        let (_, pos) = self.store.append(record)?;

        if let Err(e) = self.index.write(relative, pos) {
            if let Err(undo) = self.store.truncate(pos) {
                warn!(
                    base_offset = self.base_offset,
                    offset,
                    error = %undo,
                    "could not roll back store after index write failure"
                );
            }
            return Err(e.into());
        }

        self.next_offset += 1;
        Ok(offset)
    }

    /// Reads the record at absolute `offset`.
    pub fn read(&self, offset: u64) -> Result<Vec<u8>, SegmentError> {
        if !self.contains(offset) {
            return Err(SegmentError::OutOfRange {
                offset,
                base: self.base_offset,
                next: self.next_offset,
            });
        }
        let (_, pos) = self.index.read((offset - self.base_offset) as i64)?;
        Ok(self.store.read(pos)?)
    }

    /// True when the segment should stop taking appends: the store reached
    /// `max_store_bytes`, or the index reached `max_index_bytes` or has no
    /// room for another entry.
    #[must_use]
    pub fn is_maxed(&self) -> bool {
        self.store.size() >= self.config.max_store_bytes
            || self.index.size() >= self.config.max_index_bytes
            || self.index.is_full()
    }

    /// True if `offset` falls in `[base_offset, next_offset)`.
    #[must_use]
    pub fn contains(&self, offset: u64) -> bool {
        self.base_offset <= offset && offset < self.next_offset
    }

    /// Syncs both files without closing them.
    ///
    /// The log calls this when it rotates away from a segment, so a sealed
    /// segment is on disk even if the process dies before `close`.
    pub fn flush(&mut self) -> Result<(), SegmentError> {
        self.store.flush()?;
        self.index.flush()?;
        Ok(())
    }

    /// Closes the store, then the index.
    ///
    /// Both are attempted even if the first fails; the first error wins.
    pub fn close(&mut self) -> Result<(), SegmentError> {
        let store = self.store.close();
        let index = self.index.close();
        store?;
        index?;
        Ok(())
    }

    #[must_use]
    pub fn base_offset(&self) -> u64 {
        self.base_offset
    }

    #[must_use]
    pub fn next_offset(&self) -> u64 {
        self.next_offset
    }

    /// Number of records in the segment.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.next_offset - self.base_offset
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.next_offset == self.base_offset
    }

    #[must_use]
    pub fn store_size(&self) -> u64 {
        self.store.size()
    }

    #[must_use]
    pub fn index_size(&self) -> u64 {
        self.index.size()
    }

    #[must_use]
    pub fn store_path(&self) -> &Path {
        self.store.path()
    }

    #[must_use]
    pub fn index_path(&self) -> &Path {
        self.index.path()
    }
}
