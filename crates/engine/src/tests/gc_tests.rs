use super::helpers::{bucket_bytes, count_dat_files, open_small, open_store};
use anyhow::Result;
use record::RecordReader;
use std::fs;
use tempfile::tempdir;

/// Counts the records remaining across every data file of a bucket.
fn count_records(bucket_dir: &std::path::Path) -> usize {
    let mut total = 0;
    for entry in fs::read_dir(bucket_dir).unwrap() {
        let path = entry.unwrap().path();
        if path.extension().and_then(|s| s.to_str()) != Some("dat") {
            continue;
        }
        let mut reader = RecordReader::open(&path).unwrap();
        while reader.next_record(false).unwrap().is_some() {
            total += 1;
        }
    }
    total
}

// --------------------- Reclaiming superseded versions ---------------------

#[test]
fn gc_leaves_one_live_record_per_key() -> Result<()> {
    let dir = tempdir()?;
    let mut store = open_store(dir.path());

    store.set(b"a", b"1")?;
    store.set(b"a", b"2")?;
    store.set(b"a", b"3")?;
    store.gc("0")?;

    let bucket = dir.path().join("0");
    assert_eq!(count_dat_files(&bucket), 1);
    assert_eq!(count_records(&bucket), 1);
    assert_eq!(store.get(b"a")?.unwrap(), b"3");
    Ok(())
}

#[test]
fn gc_preserves_reads_and_never_grows_the_bucket() -> Result<()> {
    let dir = tempdir()?;
    let mut store = open_small(dir.path(), 256);

    for i in 0..10u8 {
        store.set(&[b'k', i], &[i; 20])?;
    }
    for i in 0..5u8 {
        store.set(&[b'k', i], &[i + 100; 20])?; // supersede half
    }
    store.remove(b"\x6b\x07")?; // k7

    let bucket = dir.path().join("0");
    let before = bucket_bytes(&bucket);
    store.gc("0")?;
    assert!(bucket_bytes(&bucket) <= before);

    for i in 0..5u8 {
        assert_eq!(store.get(&[b'k', i])?.unwrap(), vec![i + 100; 20]);
    }
    for i in 5..10u8 {
        if i == 7 {
            assert!(store.get(&[b'k', i])?.is_none());
        } else {
            assert_eq!(store.get(&[b'k', i])?.unwrap(), vec![i; 20]);
        }
    }
    Ok(())
}

#[test]
fn gc_without_tombstones_is_a_noop() -> Result<()> {
    let dir = tempdir()?;
    let mut store = open_store(dir.path());

    store.set(b"a", b"1")?;
    store.set(b"b", b"2")?;

    let bucket = dir.path().join("0");
    let before = bucket_bytes(&bucket);
    store.gc("0")?;

    assert_eq!(bucket_bytes(&bucket), before);
    assert_eq!(count_dat_files(&bucket), 1);
    assert_eq!(store.get(b"a")?.unwrap(), b"1");
    assert_eq!(store.get(b"b")?.unwrap(), b"2");
    Ok(())
}

#[test]
fn gc_after_remove_leaves_nothing() -> Result<()> {
    let dir = tempdir()?;
    let mut store = open_store(dir.path());

    store.set(b"k", b"v")?;
    store.remove(b"k")?;
    store.gc("0")?;

    let bucket = dir.path().join("0");
    assert_eq!(count_records(&bucket), 0);
    assert!(store.get(b"k")?.is_none());
    Ok(())
}

// --------------------- Cross-file tombstones ---------------------

#[test]
fn gc_reclaims_across_file_boundaries() -> Result<()> {
    let dir = tempdir()?;
    // every record overshoots the threshold, so the shadowed record, its
    // tombstone, and the replacement all land in different files
    let mut store = open_small(dir.path(), 8);

    store.set(b"k", b"aaaaaaaaaa")?;
    store.set(b"k", b"bbbbbbbbbb")?;
    let bucket = dir.path().join("0");
    assert!(count_dat_files(&bucket) >= 3);

    store.gc("0")?;

    assert_eq!(count_records(&bucket), 1);
    assert_eq!(store.get(b"k")?.unwrap(), b"bbbbbbbbbb");
    Ok(())
}

#[test]
fn gc_returns_vacated_fids_to_the_free_list() -> Result<()> {
    let dir = tempdir()?;
    let mut store = open_small(dir.path(), 8);

    store.set(b"k", b"aaaaaaaaaa")?;
    store.set(b"k", b"bbbbbbbbbb")?;
    store.gc("0")?;

    // the next writes reuse the vacated fids instead of growing max_fid
    store.set(b"x", b"cccccccccc")?;
    store.set(b"y", b"dddddddddd")?;

    let bucket = dir.path().join("0");
    assert_eq!(store.get(b"x")?.unwrap(), b"cccccccccc");
    assert_eq!(store.get(b"y")?.unwrap(), b"dddddddddd");
    assert!(
        bucket.join("0000000000.dat").exists() || bucket.join("0000000001.dat").exists(),
        "vacated low fids should be written again"
    );
    Ok(())
}

// --------------------- Durability of GC results ---------------------

#[test]
fn reopen_after_gc_agrees() -> Result<()> {
    let dir = tempdir()?;
    {
        let mut store = open_small(dir.path(), 64);
        store.set(b"a", b"one")?;
        store.set(b"a", b"two")?;
        store.set(b"b", b"stay")?;
        store.remove(b"b")?;
        store.set(b"c", b"keep")?;
        store.gc("0")?;

        assert_eq!(store.get(b"a")?.unwrap(), b"two");
        assert!(store.get(b"b")?.is_none());
        assert_eq!(store.get(b"c")?.unwrap(), b"keep");
    }

    let store = open_small(dir.path(), 64);
    assert_eq!(store.get(b"a")?.unwrap(), b"two");
    assert!(store.get(b"b")?.is_none());
    assert_eq!(store.get(b"c")?.unwrap(), b"keep");
    Ok(())
}

#[test]
fn gc_twice_is_stable() -> Result<()> {
    let dir = tempdir()?;
    let mut store = open_store(dir.path());

    store.set(b"k", b"v1")?;
    store.set(b"k", b"v2")?;
    store.gc("0")?;
    let bucket = dir.path().join("0");
    let after_first = bucket_bytes(&bucket);

    store.gc("0")?;
    assert_eq!(bucket_bytes(&bucket), after_first);
    assert_eq!(store.get(b"k")?.unwrap(), b"v2");
    Ok(())
}

#[test]
fn gc_unknown_bucket_is_an_error() {
    let dir = tempdir().unwrap();
    let mut store = open_store(dir.path());

    assert!(store.gc("no-such-bucket").is_err());
}
