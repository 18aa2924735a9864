use std::fs;
use std::path::Path;

pub fn count_files_with_ext(dir: &Path, ext: &str) -> usize {
    fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|s| s.to_str())
                .map(|x| x == ext)
                .unwrap_or(false)
        })
        .count()
}

/// A record whose bytes encode `i`, so mixups are visible on read-back.
pub fn record(i: usize) -> Vec<u8> {
    format!("record-{:06}", i).into_bytes()
}
