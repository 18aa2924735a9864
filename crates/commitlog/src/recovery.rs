/// Startup path: rebuilding the segment list from the log directory.
use config::LogConfig;
use segment::{parse_base_offset, Segment};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, warn};

use crate::LogError;

/// Returns the distinct base offsets of all segment files in `dir`,
/// ascending. Files that are not `<u64>.store` / `<u64>.index` are skipped.
pub(crate) fn scan_base_offsets(dir: &Path) -> Result<Vec<u64>, LogError> {
    let mut bases = BTreeSet::new();

    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        match parse_base_offset(&path) {
            // .store and .index share a base; the set keeps one
            Some(base) => {
                bases.insert(base);
            }
            None => debug!(path = %path.display(), "skipping non-segment file"),
        }
    }

    Ok(bases.into_iter().collect())
}

/// Reopens every segment in `dir`, oldest first.
///
/// Neighbouring segments are expected to be contiguous
/// (`next.base == prev.next_offset`); a gap, e.g. from a lost tail in a
/// sealed segment, is logged and leaves its offsets unreadable.
pub(crate) fn load_segments(dir: &Path, config: LogConfig) -> Result<Vec<Segment>, LogError> {
    let mut segments: Vec<Segment> = Vec::new();

    for base in scan_base_offsets(dir)? {
        let seg = Segment::new(dir, base, config)?;
        debug!(
            base_offset = base,
            next_offset = seg.next_offset(),
            "segment reopened"
        );

        if let Some(prev) = segments.last() {
            if prev.next_offset() != base {
                warn!(
                    prev_base = prev.base_offset(),
                    prev_next = prev.next_offset(),
                    base_offset = base,
                    "segments are not contiguous"
                );
            }
        }
        segments.push(seg);
    }

    Ok(segments)
}
