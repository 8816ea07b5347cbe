/// Cold-start recovery: bucket discovery and data-file replay.
///
/// Opening a database scans the root for bucket subdirectories, then replays
/// every data file of every bucket in ascending fid order. Because files are
/// strictly append-only, that replay order reproduces the original write
/// order, so the keydir ends up pointing at exactly the newest record for
/// each live key.
use anyhow::Result;
use keydir::{KeyDir, Slot};
use record::{RecordError, RecordReader};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;

use crate::bucket::{data_path, parse_fid, Bucket};
use crate::DEFAULT_BUCKET;

/// Discovers buckets: every non-hidden subdirectory of `root` becomes one,
/// with `max_fid` taken from the largest well-formed `*.dat` filename.
/// A root with no buckets gets the default bucket `"0"` created on disk.
pub(crate) fn scan_buckets(root: &Path) -> Result<HashMap<String, Bucket>> {
    let mut buckets = HashMap::new();

    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = match entry.file_name().into_string() {
            Ok(name) => name,
            Err(_) => continue,
        };
        if name.starts_with('.') {
            continue;
        }

        let mut max_fid = 0;
        for file in fs::read_dir(entry.path())? {
            let file = file?;
            if let Some(fid) = file.file_name().to_str().and_then(parse_fid) {
                max_fid = max_fid.max(fid);
            }
        }

        buckets.insert(
            name,
            Bucket {
                act_fid: 0,
                max_fid,
                free_fids: Vec::new(),
            },
        );
    }

    if buckets.is_empty() {
        fs::create_dir_all(root.join(DEFAULT_BUCKET))?;
        buckets.insert(DEFAULT_BUCKET.to_string(), Bucket::new());
    }

    Ok(buckets)
}

/// Replays one bucket's data files into the keydir.
///
/// Files are visited for fids `0..=max_fid` in order; records are read
/// without values. A live record overwrites the key's slot (later appends
/// supersede earlier ones), a tombstone removes the key. A missing file
/// below `max_fid` is a gap and joins the bucket's free list. Trailing
/// garbage in a file (truncated tail or a nonsense header) ends that file's
/// scan; everything before it has already been applied.
pub(crate) fn replay_bucket(
    root: &Path,
    name: &str,
    bucket: &mut Bucket,
    keydir: &mut KeyDir,
) -> Result<()> {
    for fid in 0..=bucket.max_fid {
        let path = data_path(root, name, fid);
        let mut reader = match RecordReader::open(&path) {
            Ok(reader) => reader,
            Err(RecordError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                if fid < bucket.max_fid {
                    bucket.free_fids.push(fid);
                }
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        loop {
            match reader.next_record(false) {
                Ok(Some(rec)) => {
                    if rec.header.is_tombstone() {
                        keydir.remove(&rec.key);
                    } else {
                        keydir.insert(
                            rec.key,
                            Slot {
                                bucket: name.to_string(),
                                header: rec.header,
                            },
                        );
                    }
                }
                Ok(None) | Err(RecordError::Corrupt) => break,
                Err(RecordError::Io(e)) => return Err(e.into()),
            }
        }
    }

    Ok(())
}
