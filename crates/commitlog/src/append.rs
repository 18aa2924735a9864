/// Write path: `append()` and segment rotation.
///
/// Appends hold the log's write lock for their whole duration, so offset
/// assignment and rotation are serialized across all callers.
use segment::Segment;
use tracing::{info, warn};

use crate::{Log, LogError, Segments};

impl Log {
    /// Appends `record` to the active segment and returns its offset.
    ///
    /// Offsets increase by exactly one per successful append, across segment
    /// boundaries. A failed append assigns no offset.
    ///
    /// If the append leaves the active segment maxed, a new segment starting
    /// at `offset + 1` becomes active. Should creating it fail, the record is
    /// still stored and its offset returned; the rotation is retried at the
    /// start of the next append, which reports the error if it persists.
    pub fn append(&self, record: &[u8]) -> Result<u64, LogError> {
        let mut segs = self.write_lock()?;
        if segs.closed {
            return Err(LogError::Closed);
        }

        if segs.active().is_maxed() {
            self.rotate(&mut segs)?;
        }

        let offset = active_mut(&mut segs).append(record)?;

        if segs.active().is_maxed() {
            if let Err(e) = self.rotate(&mut segs) {
                warn!(offset, error = %e, "rotation after append failed, will retry");
            }
        }

        Ok(offset)
    }

    /// Seals the active segment and opens its successor at the active
    /// segment's next offset.
    fn rotate(&self, segs: &mut Segments) -> Result<(), LogError> {
        let base = segs.active().next_offset();
        let next = Segment::new(self.dir(), base, self.config())?;

        // the old segment only serves reads from here on
        if let Err(e) = active_mut(segs).flush() {
            warn!(error = %e, "flushing sealed segment failed");
        }

        info!(
            sealed = segs.active().base_offset(),
            base_offset = base,
            segments = segs.list.len() + 1,
            "rotated to new segment"
        );
        segs.list.push(next);
        Ok(())
    }
}

fn active_mut(segs: &mut Segments) -> &mut Segment {
    let last = segs.list.len() - 1;
    &mut segs.list[last]
}
