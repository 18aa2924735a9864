/// Startup reconciliation of a segment's index against its store.
///
/// An index that was never closed still has its full pre-allocated length,
/// with a zero-filled tail that looks like entries. A store may also hold a
/// frame whose index entry never made it out. Both are trimmed here so the
/// index describes exactly the complete frames at the front of the store.
use index::ENTRY_WIDTH;
use store::StoreError;
use tracing::{debug, warn};

use crate::{Segment, SegmentError};

impl Segment {
    /// Drops index entries and store bytes that do not line up.
    ///
    /// Entry `i` is kept while it carries relative offset `i`, starts exactly
    /// where the previous frame ended, and that frame fits in the store.
    ///
    /// A zero-filled entry 0 reads as `(0, 0)`, which is also what a real
    /// first entry holds. So when the first frame reached the store but its
    /// entry never reached the index, the frame is kept and comes back as the
    /// segment's first record. Every later unindexed frame is cut.
    pub(crate) fn reconcile(&mut self) -> Result<(), SegmentError> {
        let entries = self.index.len();
        let mut valid = 0u64;
        let mut end = 0u64;

        while valid < entries {
            let (relative, pos) = self.index.read(valid as i64)?;
            if u64::from(relative) != valid || pos != end {
                break;
            }
            match self.store.frame_len(pos) {
                Ok(width) => end = pos + width,
                Err(StoreError::OutOfRange(_)) | Err(StoreError::Corrupt(_)) => break,
                Err(e) => return Err(e.into()),
            }
            valid += 1;
        }

        if valid < entries {
            // a zero-filled tail from an unclean shutdown is expected, not alarming
            debug!(
                base_offset = self.base_offset,
                kept = valid,
                dropped = entries - valid,
                "trimming index tail"
            );
            self.index.truncate_entries(valid)?;
        }

        if end < self.store.size() {
            warn!(
                base_offset = self.base_offset,
                kept_bytes = end,
                dropped_bytes = self.store.size() - end,
                "discarding unindexed store tail"
            );
            self.store.truncate(end)?;
        }

        debug_assert_eq!(self.index.size(), valid * ENTRY_WIDTH);
        Ok(())
    }
}
