/// Per-bucket offline compaction.
///
/// GC reclaims the space held by tombstones and the records they shadow.
/// Pass 1 scans the whole bucket and builds a working table keyed by file
/// id: every tombstone contributes a drop marker at its target's
/// `(fid, offset)` and a second marker at its own physical location, so both
/// the tombstone and the shadowed record are reclaimed in one cycle even
/// when they live in different files. Pass 2 walks each file named by the
/// table, skips marked records, re-appends the surviving live records to a
/// fresh active file (through the normal rotation policy), and deletes any
/// file that lost a record, returning its fid to the free list.
///
/// Each marker carries the tombstone's key, and a record is only dropped
/// when its key matches the marker. A stale tombstone whose target fid was
/// recycled can therefore at worst duplicate a survivor, never drop an
/// unrelated record.
///
/// Running GC concurrently with writes is unsupported.
use anyhow::{Context, Result};
use keydir::Slot;
use record::{append_record, Record, RecordError, RecordReader};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;

use crate::bucket::{self, data_path};
use crate::Store;

impl Store {
    /// Compacts one bucket.
    ///
    /// A bucket with no tombstones is left untouched. Otherwise survivors
    /// are rewritten into a fresh active file, the keydir is repointed at
    /// their new locations, and vacated files are deleted from disk.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown bucket or on I/O failure during the
    /// scan, rewrite, or delete steps.
    pub fn gc(&mut self, name: &str) -> Result<()> {
        let Store {
            root,
            file_size,
            buckets,
            keydir,
            ..
        } = self;
        let b = buckets
            .get_mut(name)
            .ok_or_else(|| anyhow::anyhow!("unknown bucket: {name:?}"))?;

        // Pass 1: collect drop markers, keyed by the file they apply to.
        let mut drops: HashMap<u32, HashMap<u32, Vec<u8>>> = HashMap::new();
        for fid in 0..=b.max_fid {
            let path = data_path(root, name, fid);
            let mut reader = match RecordReader::open(&path) {
                Ok(reader) => reader,
                Err(RecordError::Io(e)) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };

            loop {
                match reader.next_record(false) {
                    Ok(Some(rec)) if rec.header.is_tombstone() => {
                        let phys = u32::try_from(rec.offset)
                            .context("record offset exceeds u32")?;
                        // one marker for the shadowed record...
                        drops
                            .entry(rec.header.fid)
                            .or_default()
                            .insert(rec.header.offset, rec.key.clone());
                        // ...and one for the tombstone itself, at its
                        // physical location
                        drops.entry(fid).or_default().insert(phys, rec.key);
                    }
                    Ok(Some(_)) => {}
                    Ok(None) | Err(RecordError::Corrupt) => break,
                    Err(RecordError::Io(e)) => return Err(e.into()),
                }
            }
        }

        if drops.is_empty() {
            return Ok(());
        }

        // Pass 2: advance to a fresh file first, so survivors never land in
        // a file this cycle still has to scan.
        let mut outputs: HashSet<u32> = HashSet::new();
        outputs.insert(b.next_empty_fid());

        let mut fids: Vec<u32> = drops.keys().copied().collect();
        fids.sort_unstable();

        for in_fid in fids {
            if outputs.contains(&in_fid) {
                continue;
            }
            let path = data_path(root, name, in_fid);
            let mut reader = match RecordReader::open(&path) {
                Ok(reader) => reader,
                Err(RecordError::Io(e)) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            let locals = drops.get_mut(&in_fid).expect("fid taken from drops keys");

            let mut has_skip = false;
            loop {
                let rec = match reader.next_record(true) {
                    Ok(Some(rec)) => rec,
                    Ok(None) | Err(RecordError::Corrupt) => break,
                    Err(RecordError::Io(e)) => return Err(e.into()),
                };
                let phys =
                    u32::try_from(rec.offset).context("record offset exceeds u32")?;

                if locals.get(&phys).map(|k| *k == rec.key).unwrap_or(false) {
                    locals.remove(&phys);
                    has_skip = true;
                    continue;
                }
                let Record {
                    header: old, key, value, ..
                } = rec;
                let value = match value {
                    // tombstones aimed elsewhere are simply not copied
                    None => continue,
                    Some(value) => value,
                };

                // survivor: rewrite through the rotation policy
                let (fid, offset) = bucket::active_slot(root, *file_size, name, b)?;
                outputs.insert(fid);
                let mut header = old;
                header.fid = fid;
                header.offset =
                    u32::try_from(offset).context("active file offset exceeds u32")?;
                append_record(data_path(root, name, fid), &header, &key, Some(&value))?;
                keydir.insert(
                    key,
                    Slot {
                        bucket: name.to_string(),
                        header,
                    },
                );
            }

            drop(reader);
            if has_skip {
                fs::remove_file(&path)?;
                b.free_fids.push(in_fid);
            }
        }

        Ok(())
    }
}
