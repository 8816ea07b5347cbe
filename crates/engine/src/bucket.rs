//! Bucket file management: data-file naming, fid allocation, and the
//! active-file rotation policy.
//!
//! A bucket is a subdirectory of the database root holding data files named
//! `NNNNNNNNNN.dat` (ten zero-padded decimal digits). All appends for a
//! bucket go to its active file until the size threshold is crossed, which
//! bounds per-file size (so GC units stay bounded) while keeping reads
//! file-local. Fids vacated by GC are reused before `max_fid` grows, keeping
//! the fid space dense.

use anyhow::Result;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Width of the zero-padded fid in a data filename.
const FID_DIGITS: usize = 10;

/// Extension of every data file.
const DATA_EXT: &str = "dat";

/// In-memory metadata for one bucket.
#[derive(Debug, Default)]
pub(crate) struct Bucket {
    /// File id currently receiving appends.
    pub act_fid: u32,
    /// Largest known file id.
    pub max_fid: u32,
    /// File ids <= max_fid that exist as gaps or were vacated by GC.
    pub free_fids: Vec<u32>,
}

impl Bucket {
    pub fn new() -> Self {
        Self::default()
    }

    /// Picks a file id with no data behind it and makes it the active fid:
    /// a recycled fid from the free list if one exists, else `max_fid + 1`.
    pub fn next_empty_fid(&mut self) -> u32 {
        match self.free_fids.pop() {
            Some(fid) => self.act_fid = fid,
            None => {
                self.max_fid += 1;
                self.act_fid = self.max_fid;
            }
        }
        self.act_fid
    }
}

/// Path of the data file for `fid` within `bucket`:
/// `<root>/<bucket>/<fid:010>.dat`.
pub(crate) fn data_path(root: &Path, bucket: &str, fid: u32) -> PathBuf {
    root.join(bucket).join(format!("{fid:010}.{DATA_EXT}"))
}

/// Parses a fid out of a well-formed data filename, e.g.
/// `"0000000042.dat"` -> `Some(42)`. Anything else -> `None`.
pub(crate) fn parse_fid(filename: &str) -> Option<u32> {
    let stem = filename.strip_suffix(&format!(".{DATA_EXT}"))?;
    if stem.len() != FID_DIGITS || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stem.parse().ok()
}

/// Resolves the `(fid, offset)` for the next append to `bucket`.
///
/// Starting from the current active fid: a missing file means appends start
/// at offset 0; a file below the size threshold is appended to at its
/// current size; a full file advances the active fid (to `max_fid` if not
/// already there, else to a fresh fid via [`Bucket::next_empty_fid`]) and
/// the check repeats.
pub(crate) fn active_slot(
    root: &Path,
    file_size: u64,
    name: &str,
    bucket: &mut Bucket,
) -> Result<(u32, u64)> {
    loop {
        let path = data_path(root, name, bucket.act_fid);
        let size = match fs::metadata(&path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok((bucket.act_fid, 0)),
            Err(e) => return Err(e.into()),
        };
        if size < file_size {
            return Ok((bucket.act_fid, size));
        }
        if bucket.act_fid != bucket.max_fid {
            bucket.act_fid = bucket.max_fid;
        } else {
            bucket.next_empty_fid();
        }
    }
}
