//! # Index - memory-mapped offset index
//!
//! Maps a segment-relative offset to the byte position of its frame in the
//! companion store file.
//!
//! ## Binary Entry Format
//!
//! ```text
//! [relative_offset: u32 BE][position: u64 BE]   (12 bytes)
//! ```
//!
//! Entry `n` lives at byte `n * ENTRY_WIDTH`, so lookups are a slice read
//! with no parse step.
//!
//! ## File lifecycle
//!
//! On [`Index::open`] the file is pre-extended to its full capacity and
//! mapped read/write; a mapping cannot be grown in place on every platform,
//! so capacity is fixed for the life of the index. The number of bytes that
//! actually hold entries (the *logical size*) is tracked separately and the
//! file is truncated back down to it on [`Index::close`]:
//!
//! ```text
//! sync mapping -> sync file -> unmap -> truncate -> close
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use index::{Index, LATEST};
//!
//! let mut idx = Index::open("00000000000000000000.index", 1024).unwrap();
//! idx.write(0, 0).unwrap();
//! idx.write(1, 18).unwrap();
//! assert_eq!(idx.read(LATEST).unwrap(), (1, 18));
//! idx.close().unwrap();
//! ```

use byteorder::{BigEndian, ByteOrder};
use memmap2::MmapMut;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Width of the relative-offset field.
pub const OFFSET_WIDTH: u64 = 4;
/// Width of the store-position field.
pub const POSITION_WIDTH: u64 = 8;
/// Width of one index entry on disk.
pub const ENTRY_WIDTH: u64 = OFFSET_WIDTH + POSITION_WIDTH;

/// Sentinel accepted by [`Index::read`] meaning "the last written entry".
pub const LATEST: i64 = -1;

/// Errors that can occur during index operations.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Stat, truncate, map, or sync failed.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A read was issued against an index with no entries.
    #[error("index is empty")]
    Empty,

    /// The requested entry lies past the logical size.
    #[error("index entry {0} out of range")]
    OutOfRange(i64),

    /// The mapped region has no room for another entry.
    #[error("index is full ({capacity} bytes)")]
    Full { capacity: u64 },

    /// The index was already closed.
    #[error("index is closed")]
    Closed,
}

impl IndexError {
    /// True for the "no such entry" flavours (`Empty`, `OutOfRange`).
    pub fn is_out_of_range(&self) -> bool {
        matches!(self, IndexError::Empty | IndexError::OutOfRange(_))
    }
}

struct Mapped {
    file: File,
    mmap: MmapMut,
}

/// A fixed-capacity, memory-mapped index file.
///
/// Writes go straight into the mapping; only the single append path of the
/// owning segment mutates it, so no internal lock is needed.
pub struct Index {
    path: PathBuf,
    /// `None` once [`close`](Index::close) has run.
    mapped: Option<Mapped>,
    /// Logical size: bytes of valid entries.
    size: u64,
    /// Mapped capacity in bytes.
    capacity: u64,
}

impl std::fmt::Debug for Index {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Index")
            .field("path", &self.path)
            .field("entries", &self.len())
            .field("size", &self.size)
            .field("capacity", &self.capacity)
            .field("closed", &self.mapped.is_none())
            .finish()
    }
}

impl Index {
    /// Opens (or creates) the index file at `path` and maps `max_index_bytes`
    /// of it read/write.
    ///
    /// The current file length becomes the logical size (rounded down to a
    /// whole entry). A file that is already larger than `max_index_bytes`,
    /// e.g. written under a bigger limit, keeps its length as capacity so no
    /// entry is lost.
    ///
    /// # Errors
    ///
    /// Returns `IndexError::Io` if the file cannot be opened, stat'ed,
    /// extended, or mapped. The file handle is released on every error path.
    pub fn open<P: AsRef<Path>>(path: P, max_index_bytes: u64) -> Result<Self, IndexError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        let on_disk = file.metadata()?.len();
        let size = on_disk - on_disk % ENTRY_WIDTH;
        let capacity = max_index_bytes.max(size);

        file.set_len(capacity)?;

        // SAFETY: the file is opened read/write, sized to `capacity` above, and
        // owned by this index for as long as the mapping lives. Nothing else in
        // the process resizes it while mapped.
        let mmap = unsafe { MmapMut::map_mut(&file)? };

        debug!(path = %path.display(), size, capacity, "index opened");

        Ok(Self {
            path,
            mapped: Some(Mapped { file, mmap }),
            size,
            capacity,
        })
    }

    /// Reads entry `n`, returning `(relative_offset, position)`.
    ///
    /// Pass [`LATEST`] (`-1`) to read the most recently written entry.
    ///
    /// # Errors
    ///
    /// - `IndexError::Empty` if nothing has been written.
    /// - `IndexError::OutOfRange` if `(n + 1) * ENTRY_WIDTH` exceeds the
    ///   logical size, or `n` is negative and not the sentinel.
    pub fn read(&self, n: i64) -> Result<(u32, u64), IndexError> {
        let mapped = self.mapped.as_ref().ok_or(IndexError::Closed)?;
        if self.size == 0 {
            return Err(IndexError::Empty);
        }

        let start = if n == LATEST {
            self.size - ENTRY_WIDTH
        } else {
            if n < 0 {
                return Err(IndexError::OutOfRange(n));
            }
            let end = (n as u64)
                .checked_add(1)
                .and_then(|c| c.checked_mul(ENTRY_WIDTH))
                .ok_or(IndexError::OutOfRange(n))?;
            if end > self.size {
                return Err(IndexError::OutOfRange(n));
            }
            n as u64 * ENTRY_WIDTH
        };

        let start = start as usize;
        let mid = start + OFFSET_WIDTH as usize;
        let end = start + ENTRY_WIDTH as usize;
        let off = BigEndian::read_u32(&mapped.mmap[start..mid]);
        let pos = BigEndian::read_u64(&mapped.mmap[mid..end]);
        Ok((off, pos))
    }

    /// Appends one entry at the current logical size.
    ///
    /// # Errors
    ///
    /// Returns `IndexError::Full` when the entry would not fit in the mapped
    /// capacity; the logical size is unchanged in that case.
    pub fn write(&mut self, off: u32, pos: u64) -> Result<(), IndexError> {
        let mapped = self.mapped.as_mut().ok_or(IndexError::Closed)?;
        if self.size + ENTRY_WIDTH > self.capacity {
            return Err(IndexError::Full {
                capacity: self.capacity,
            });
        }

        let start = self.size as usize;
        let mid = start + OFFSET_WIDTH as usize;
        let end = start + ENTRY_WIDTH as usize;
        BigEndian::write_u32(&mut mapped.mmap[start..mid], off);
        BigEndian::write_u64(&mut mapped.mmap[mid..end], pos);
        self.size += ENTRY_WIDTH;
        Ok(())
    }

    /// Shrinks the logical size to the first `entries` entries.
    ///
    /// Used by recovery to drop entries that do not match the store. Bytes
    /// past the new size are zeroed so a later crash cannot resurrect them.
    /// Growing is not allowed; a larger `entries` is a no-op.
    pub fn truncate_entries(&mut self, entries: u64) -> Result<(), IndexError> {
        let mapped = self.mapped.as_mut().ok_or(IndexError::Closed)?;
        let new_size = entries.saturating_mul(ENTRY_WIDTH);
        if new_size >= self.size {
            return Ok(());
        }
        mapped.mmap[new_size as usize..self.size as usize].fill(0);
        self.size = new_size;
        Ok(())
    }

    /// Synchronously flushes the mapped region to disk without closing.
    pub fn flush(&self) -> Result<(), IndexError> {
        let mapped = self.mapped.as_ref().ok_or(IndexError::Closed)?;
        mapped.mmap.flush()?;
        Ok(())
    }

    /// Flushes the mapping and file to disk, truncates the file to the
    /// logical size, and releases the handle.
    ///
    /// Calling `close` twice is a no-op.
    pub fn close(&mut self) -> Result<(), IndexError> {
        let Some(Mapped { file, mmap }) = self.mapped.take() else {
            return Ok(());
        };

        mmap.flush()?;
        file.sync_all()?;
        // the mapping must be gone before the file shrinks beneath it
        drop(mmap);
        file.set_len(self.size)?;
        file.sync_all()?;

        debug!(path = %self.path.display(), size = self.size, "index closed");
        Ok(())
    }

    /// Number of entries written.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.size / ENTRY_WIDTH
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Logical size in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Mapped capacity in bytes.
    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// True when another entry would not fit.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.size + ENTRY_WIDTH > self.capacity
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Best-effort close on drop.
///
/// Errors are ignored because Drop cannot propagate them; entries already
/// written through the mapping are still in the page cache.
impl Drop for Index {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
