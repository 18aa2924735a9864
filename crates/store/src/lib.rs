//! # Store - append-only record file
//!
//! Holds the record bytes of one segment as a sequence of length-prefixed
//! frames. The companion index remembers where each frame starts.
//!
//! ## Binary Frame Format
//!
//! ```text
//! [len: u64 BE][record bytes ...]
//! ```
//!
//! The store never interprets record bytes and carries no checksum; a frame
//! whose length would run past end-of-file is reported as corrupt.
//!
//! ## Example
//!
//! ```rust,no_run
//! use store::Store;
//!
//! let mut s = Store::open("00000000000000000000.store").unwrap();
//! let (_n, pos) = s.append(b"hello").unwrap();
//! assert_eq!(s.read(pos).unwrap(), b"hello");
//! s.close().unwrap();
//! ```

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, error};

/// Width of the length prefix in front of every record.
pub const LEN_WIDTH: u64 = 8;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// The position is at or beyond the written length.
    #[error("store position {0} out of range")]
    OutOfRange(u64),

    /// The frame at this position runs past end-of-file.
    #[error("corrupt frame at position {0}")]
    Corrupt(u64),

    /// A reader panicked while holding the file lock.
    #[error("store lock poisoned")]
    Poisoned,

    /// The store was already closed.
    #[error("store is closed")]
    Closed,

    /// A failed append could not be rolled back; the file no longer matches
    /// the store size and further appends are refused.
    #[error("store failed after an unrecoverable write error")]
    Failed,
}

impl StoreError {
    pub fn is_out_of_range(&self) -> bool {
        matches!(self, StoreError::OutOfRange(_))
    }
}

/// The store file as seen by its `BufWriter`.
///
/// Test builds can cap how many more bytes may be written, to exercise the
/// short-write paths of [`Store::append`].
struct StoreFile {
    file: File,
    #[cfg(test)]
    write_budget: Option<u64>,
}

impl Write for StoreFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        #[cfg(test)]
        if let Some(budget) = self.write_budget.as_mut() {
            if *budget == 0 {
                return Err(io::Error::new(io::ErrorKind::Other, "no space left on device"));
            }
            let n = buf.len().min(*budget as usize);
            let n = self.file.write(&buf[..n])?;
            *budget -= n as u64;
            return Ok(n);
        }
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

/// Append-only, length-prefixed record file.
///
/// Appends go through a `BufWriter`; reads flush it first, so a frame is
/// readable as soon as `append` returns. Reads take `&self` and share the one
/// file handle through a `Mutex`. The file is opened in append mode, so the
/// seek a read performs never moves the write position.
pub struct Store {
    path: PathBuf,
    /// `None` once [`close`](Store::close) has run.
    file: Option<Mutex<BufWriter<StoreFile>>>,
    /// Logical length: sum of all frame sizes, including buffered bytes.
    size: u64,
    /// Set when a failed append left the file out of step with `size`.
    failed: bool,
    /// Reusable frame buffer to avoid allocation on every append.
    scratch: Vec<u8>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("path", &self.path)
            .field("size", &self.size)
            .field("closed", &self.file.is_none())
            .field("failed", &self.failed)
            .finish()
    }
}

impl Store {
    /// Opens (or creates) the store file at `path`.
    ///
    /// The current file length becomes the store size, so appends continue
    /// after whatever was written before.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)?;
        let size = file.metadata()?.len();

        debug!(path = %path.display(), size, "store opened");

        Ok(Self {
            path,
            file: Some(Mutex::new(BufWriter::new(StoreFile {
                file,
                #[cfg(test)]
                write_budget: None,
            }))),
            size,
            failed: false,
            scratch: Vec::with_capacity(256),
        })
    }

    /// Appends one frame, returning `(bytes_written, position)` where
    /// `position` is the byte offset at which the frame begins.
    ///
    /// Frames already buffered are flushed on their own before a frame that
    /// does not fit next to them, so a failed write only ever involves the
    /// new frame. On error the store size is not advanced and any part of
    /// the new frame that reached the file is cut again. If that cut is not
    /// possible the store turns `Failed` and refuses further appends.
    pub fn append(&mut self, record: &[u8]) -> Result<(u64, u64), StoreError> {
        if self.failed {
            return Err(StoreError::Failed);
        }
        let w = self
            .file
            .as_mut()
            .ok_or(StoreError::Closed)?
            .get_mut()
            .map_err(|_| StoreError::Poisoned)?;

        let pos = self.size;
        let written = LEN_WIDTH + record.len() as u64;

        // Build the whole frame first so it reaches the writer in one call.
        self.scratch.clear();
        self.scratch.write_u64::<BigEndian>(record.len() as u64)?;
        self.scratch.extend_from_slice(record);

        // a failed flush keeps the unwritten frames buffered and in order
        if w.buffer().len() + self.scratch.len() > w.capacity() {
            w.flush()?;
        }

        if let Err(e) = w.write_all(&self.scratch) {
            if !w.buffer().is_empty() || !cut_back(&w.get_ref().file, pos) {
                error!(path = %self.path.display(), pos, "store append could not be rolled back");
                self.failed = true;
            }
            return Err(e.into());
        }

        self.size += written;
        Ok((written, pos))
    }

    /// Returns the full width (prefix + record) of the frame at `pos`
    /// without reading the record bytes.
    pub fn frame_len(&self, pos: u64) -> Result<u64, StoreError> {
        if pos >= self.size {
            return Err(StoreError::OutOfRange(pos));
        }
        if pos + LEN_WIDTH > self.size {
            return Err(StoreError::Corrupt(pos));
        }

        let mut w = self
            .file
            .as_ref()
            .ok_or(StoreError::Closed)?
            .lock()
            .map_err(|_| StoreError::Poisoned)?;

        w.flush()?;
        let f = &mut w.get_mut().file;
        f.seek(SeekFrom::Start(pos))?;
        let len = f.read_u64::<BigEndian>()?;

        let width = LEN_WIDTH.checked_add(len).ok_or(StoreError::Corrupt(pos))?;
        match pos.checked_add(width) {
            Some(end) if end <= self.size => Ok(width),
            _ => Err(StoreError::Corrupt(pos)),
        }
    }

    /// Reads the record whose frame starts at `pos`.
    ///
    /// # Errors
    ///
    /// - `StoreError::OutOfRange` if `pos` is at or past the store size.
    /// - `StoreError::Corrupt` if the length prefix or the record it
    ///   announces would run past the end of the store.
    pub fn read(&self, pos: u64) -> Result<Vec<u8>, StoreError> {
        if pos >= self.size {
            return Err(StoreError::OutOfRange(pos));
        }
        if pos + LEN_WIDTH > self.size {
            return Err(StoreError::Corrupt(pos));
        }

        let mut w = self
            .file
            .as_ref()
            .ok_or(StoreError::Closed)?
            .lock()
            .map_err(|_| StoreError::Poisoned)?;

        // make buffered frames visible to the read below
        w.flush()?;
        let f = &mut w.get_mut().file;
        f.seek(SeekFrom::Start(pos))?;
        let len = f.read_u64::<BigEndian>()?;

        let end = (pos + LEN_WIDTH)
            .checked_add(len)
            .ok_or(StoreError::Corrupt(pos))?;
        if end > self.size {
            return Err(StoreError::Corrupt(pos));
        }

        let mut record = vec![0u8; len as usize];
        f.read_exact(&mut record)?;
        Ok(record)
    }

    /// Cuts the store back to `size` bytes, discarding later frames.
    ///
    /// Used to undo a frame whose index entry could not be written, and by
    /// recovery to drop a torn tail. Sizes at or past the current size are a
    /// no-op.
    pub fn truncate(&mut self, size: u64) -> Result<(), StoreError> {
        if size >= self.size {
            return Ok(());
        }
        let w = self
            .file
            .as_mut()
            .ok_or(StoreError::Closed)?
            .get_mut()
            .map_err(|_| StoreError::Poisoned)?;

        w.flush()?;
        w.get_ref().file.set_len(size)?;
        debug!(path = %self.path.display(), from = self.size, to = size, "store truncated");
        self.size = size;
        Ok(())
    }

    /// Flushes buffered frames to the OS and syncs them to disk.
    pub fn flush(&mut self) -> Result<(), StoreError> {
        let w = self
            .file
            .as_mut()
            .ok_or(StoreError::Closed)?
            .get_mut()
            .map_err(|_| StoreError::Poisoned)?;
        w.flush()?;
        w.get_ref().file.sync_all()?;
        Ok(())
    }

    /// Flushes and syncs, then releases the file handle.
    ///
    /// Calling `close` twice is a no-op.
    pub fn close(&mut self) -> Result<(), StoreError> {
        if self.file.is_none() {
            return Ok(());
        }
        self.flush()?;
        self.file = None;
        debug!(path = %self.path.display(), size = self.size, "store closed");
        Ok(())
    }

    /// Logical size in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True once a failed append could not be rolled back.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.failed
    }

    /// Limits how many more bytes reach the file; `None` lifts the limit.
    #[cfg(test)]
    fn set_write_budget(&mut self, budget: Option<u64>) {
        if let Some(lock) = self.file.as_mut() {
            if let Ok(w) = lock.get_mut() {
                w.get_mut().write_budget = budget;
            }
        }
    }
}

/// Cuts a partially written frame off the end of `file`, as long as the
/// file still reaches `pos`. Returns false when that cannot be done.
fn cut_back(file: &File, pos: u64) -> bool {
    match file.metadata() {
        Ok(meta) if meta.len() >= pos => file.set_len(pos).is_ok(),
        _ => false,
    }
}

#[cfg(test)]
mod tests;
