use super::*;
use std::fs;
use tempfile::tempdir;

const RECORD: &[u8] = b"hello world";
const FRAME: u64 = LEN_WIDTH + RECORD.len() as u64;

// -------------------- Append & read --------------------

#[test]
fn append_returns_width_and_position() {
    let dir = tempdir().unwrap();
    let mut s = Store::open(dir.path().join("0.store")).unwrap();

    for i in 0..3 {
        let (n, pos) = s.append(RECORD).unwrap();
        assert_eq!(n, FRAME);
        assert_eq!(pos, i * FRAME);
    }
    assert_eq!(s.size(), 3 * FRAME);
}

#[test]
fn read_sees_unflushed_appends() {
    let dir = tempdir().unwrap();
    let mut s = Store::open(dir.path().join("0.store")).unwrap();

    let (_, p0) = s.append(b"first").unwrap();
    let (_, p1) = s.append(b"").unwrap();
    let (_, p2) = s.append(b"third").unwrap();

    assert_eq!(s.read(p0).unwrap(), b"first");
    assert_eq!(s.read(p1).unwrap(), b"");
    assert_eq!(s.read(p2).unwrap(), b"third");
}

#[test]
fn appends_after_read_land_at_the_end() {
    let dir = tempdir().unwrap();
    let mut s = Store::open(dir.path().join("0.store")).unwrap();

    let (_, p0) = s.append(b"a").unwrap();
    assert_eq!(s.read(p0).unwrap(), b"a");

    let (_, p1) = s.append(b"b").unwrap();
    assert_eq!(p1, LEN_WIDTH + 1);
    assert_eq!(s.read(p1).unwrap(), b"b");
    assert_eq!(s.read(p0).unwrap(), b"a");
}

#[test]
fn read_past_end_is_out_of_range() {
    let dir = tempdir().unwrap();
    let mut s = Store::open(dir.path().join("0.store")).unwrap();
    s.append(RECORD).unwrap();

    let err = s.read(FRAME).unwrap_err();
    assert!(matches!(err, StoreError::OutOfRange(p) if p == FRAME));
    assert!(err.is_out_of_range());
}

// -------------------- Binary layout & corruption --------------------

#[test]
fn frame_is_big_endian_length_then_bytes() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("0.store");

    let mut s = Store::open(&path).unwrap();
    s.append(b"abc").unwrap();
    s.close().unwrap();

    assert_eq!(fs::read(&path).unwrap(), vec![0, 0, 0, 0, 0, 0, 0, 3, b'a', b'b', b'c']);
}

#[test]
fn frame_running_past_eof_is_corrupt() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("0.store");

    // length prefix claims 100 bytes, only 3 follow
    let mut bytes = 100u64.to_be_bytes().to_vec();
    bytes.extend_from_slice(b"abc");
    fs::write(&path, &bytes).unwrap();

    let s = Store::open(&path).unwrap();
    assert!(matches!(s.read(0), Err(StoreError::Corrupt(0))));
}

#[test]
fn truncated_length_prefix_is_corrupt() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("0.store");
    fs::write(&path, [0u8, 0, 0]).unwrap();

    let s = Store::open(&path).unwrap();
    assert!(matches!(s.read(0), Err(StoreError::Corrupt(0))));
}

#[test]
fn huge_length_prefix_is_corrupt_not_oom() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("0.store");
    fs::write(&path, u64::MAX.to_be_bytes()).unwrap();

    let s = Store::open(&path).unwrap();
    assert!(matches!(s.read(0), Err(StoreError::Corrupt(0))));
}

// -------------------- Reopen --------------------

#[test]
fn reopen_continues_after_existing_frames() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("0.store");

    {
        let mut s = Store::open(&path).unwrap();
        s.append(RECORD).unwrap();
        s.append(RECORD).unwrap();
        s.close().unwrap();
    }

    let mut s = Store::open(&path).unwrap();
    assert_eq!(s.size(), 2 * FRAME);
    let (_, pos) = s.append(b"more").unwrap();
    assert_eq!(pos, 2 * FRAME);
    assert_eq!(s.read(FRAME).unwrap(), RECORD);
    assert_eq!(s.read(pos).unwrap(), b"more");
}

#[test]
fn drop_flushes_buffered_frames() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("0.store");

    {
        let mut s = Store::open(&path).unwrap();
        s.append(RECORD).unwrap();
    }

    assert_eq!(fs::metadata(&path).unwrap().len(), FRAME);
}

// -------------------- Truncate & close --------------------

#[test]
fn truncate_discards_later_frames() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("0.store");

    let mut s = Store::open(&path).unwrap();
    s.append(RECORD).unwrap();
    s.append(RECORD).unwrap();

    s.truncate(FRAME).unwrap();
    assert_eq!(s.size(), FRAME);
    assert!(matches!(s.read(FRAME), Err(StoreError::OutOfRange(_))));
    assert_eq!(fs::metadata(&path).unwrap().len(), FRAME);

    let (_, pos) = s.append(b"again").unwrap();
    assert_eq!(pos, FRAME);
    assert_eq!(s.read(pos).unwrap(), b"again");
}

#[test]
fn close_is_idempotent_and_disables_io() {
    let dir = tempdir().unwrap();
    let mut s = Store::open(dir.path().join("0.store")).unwrap();
    s.append(RECORD).unwrap();

    s.close().unwrap();
    s.close().unwrap();

    assert!(matches!(s.append(RECORD), Err(StoreError::Closed)));
    assert!(matches!(s.read(0), Err(StoreError::Closed)));
}

// -------------------- Frame width --------------------

#[test]
fn frame_len_reports_prefix_plus_record() {
    let dir = tempdir().unwrap();
    let mut s = Store::open(dir.path().join("0.store")).unwrap();

    let (_, p0) = s.append(RECORD).unwrap();
    let (_, p1) = s.append(b"").unwrap();

    assert_eq!(s.frame_len(p0).unwrap(), FRAME);
    assert_eq!(s.frame_len(p1).unwrap(), LEN_WIDTH);
    assert!(matches!(s.frame_len(s.size()), Err(StoreError::OutOfRange(_))));
}

#[test]
fn frame_len_flags_torn_tail() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("0.store");

    let mut bytes = 3u64.to_be_bytes().to_vec();
    bytes.extend_from_slice(b"abc");
    bytes.extend_from_slice(&9u64.to_be_bytes());
    bytes.extend_from_slice(b"tor");
    fs::write(&path, &bytes).unwrap();

    let s = Store::open(&path).unwrap();
    assert_eq!(s.frame_len(0).unwrap(), 11);
    assert!(matches!(s.frame_len(11), Err(StoreError::Corrupt(11))));
}

// -------------------- Write failures --------------------

fn file_len(s: &Store) -> u64 {
    fs::metadata(s.path()).unwrap().len()
}

#[test]
fn failed_flush_keeps_buffered_frames_intact() {
    let dir = tempdir().unwrap();
    let mut s = Store::open(dir.path().join("0.store")).unwrap();

    let (_, a) = s.append(b"record-A").unwrap();
    assert_eq!(file_len(&s), 0, "first frame should still be buffered");

    // disk full: flushing the buffered frame ahead of the big one fails
    s.set_write_budget(Some(0));
    let err = s.append(&vec![9u8; 64 * 1024]).unwrap_err();
    assert!(matches!(err, StoreError::Io(_)));
    assert_eq!(s.size(), 16);
    assert!(!s.is_failed());

    s.set_write_budget(None);
    assert_eq!(s.read(a).unwrap(), b"record-A");

    let (_, b) = s.append(b"record-B").unwrap();
    assert_eq!(b, 16);
    assert_eq!(s.read(a).unwrap(), b"record-A");
    assert_eq!(s.read(b).unwrap(), b"record-B");

    s.flush().unwrap();
    assert_eq!(file_len(&s), s.size());
    assert_eq!(s.size(), 32);
}

#[test]
fn short_write_of_new_frame_is_cut_back() {
    let dir = tempdir().unwrap();
    let mut s = Store::open(dir.path().join("0.store")).unwrap();

    let (_, a) = s.append(b"record-A").unwrap();

    // room for the buffered frame plus 100 bytes of the next one
    s.set_write_budget(Some(16 + 100));
    assert!(s.append(&vec![9u8; 64 * 1024]).is_err());
    assert_eq!(s.size(), 16);
    assert_eq!(file_len(&s), 16);
    assert!(!s.is_failed());

    s.set_write_budget(None);
    let (_, b) = s.append(b"record-B").unwrap();
    assert_eq!(b, 16);
    assert_eq!(s.read(a).unwrap(), b"record-A");
    assert_eq!(s.read(b).unwrap(), b"record-B");

    s.flush().unwrap();
    assert_eq!(file_len(&s), s.size());
}

#[test]
fn unrecoverable_write_failure_marks_store_failed() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("0.store");
    let mut s = Store::open(&path).unwrap();

    s.append(b"record-A").unwrap();
    s.flush().unwrap();

    // the file shrinks underneath the store, so it cannot be cut back to 16
    fs::OpenOptions::new()
        .write(true)
        .open(&path)
        .unwrap()
        .set_len(0)
        .unwrap();

    s.set_write_budget(Some(0));
    assert!(matches!(s.append(&vec![9u8; 64 * 1024]), Err(StoreError::Io(_))));
    assert!(s.is_failed());
    assert_eq!(s.size(), 16);

    s.set_write_budget(None);
    assert!(matches!(s.append(b"x"), Err(StoreError::Failed)));
    assert_eq!(file_len(&s), 0);
}
