/// Read path: `read()` and sequential iteration.
///
/// Reads share the log's read lock, so they run concurrently with each
/// other and are only held back while an append or rotation is in flight.
use crate::{Log, LogError};

impl Log {
    /// Returns the record stored at `offset`.
    ///
    /// Segments are scanned oldest first for the one whose
    /// `[base_offset, next_offset)` range holds `offset`.
    ///
    /// # Errors
    ///
    /// - `LogError::OutOfRange` if no segment holds `offset` (never
    ///   assigned, or not assigned yet).
    /// - `LogError::Segment` for index/store failures, including `Corrupt`.
    pub fn read(&self, offset: u64) -> Result<Vec<u8>, LogError> {
        let segs = self.read_lock()?;
        if segs.closed {
            return Err(LogError::Closed);
        }

        let segment = segs
            .list
            .iter()
            .find(|s| s.contains(offset))
            .ok_or(LogError::OutOfRange(offset))?;
        Ok(segment.read(offset)?)
    }

    /// Returns an iterator over `(offset, record)` pairs starting at
    /// `offset` and running to the current end of the log.
    ///
    /// Each step takes the read lock on its own, so appends made while
    /// iterating are picked up.
    pub fn iter_from(&self, offset: u64) -> LogReader<'_> {
        LogReader {
            log: self,
            next: offset,
            done: false,
        }
    }
}

/// Sequential reader returned by [`Log::iter_from`].
///
/// Stops at the first offset that is out of range. Any other error is
/// yielded once and ends the iteration.
pub struct LogReader<'a> {
    log: &'a Log,
    next: u64,
    done: bool,
}

impl Iterator for LogReader<'_> {
    type Item = Result<(u64, Vec<u8>), LogError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.log.read(self.next) {
            Ok(record) => {
                let offset = self.next;
                self.next += 1;
                Some(Ok((offset, record)))
            }
            Err(e) if e.is_out_of_range() => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
