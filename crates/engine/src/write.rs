/// Write path: `set()` and `remove()`.
///
/// All mutations flow through this module. A `set` that changes an existing
/// key first appends a tombstone shadowing the prior record, then appends
/// the replacement and repoints the keydir; a `set` that repeats the current
/// value touches nothing on disk. A `remove` drops the key from the keydir
/// and appends a tombstone carrying the coordinates of the record it
/// shadows, so compaction can find both.
use anyhow::{Context, Result};
use keydir::Slot;
use record::{append_record, checksum, RecordHeader, HEADER_BYTES};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::bucket::data_path;
use crate::{Store, MAX_KEY_SIZE, MAX_VALUE_SIZE};

impl Store {
    /// Inserts or updates a key-value pair.
    ///
    /// If the key already holds exactly `value`, this is a no-op: nothing is
    /// appended and the on-disk byte count is unchanged. Otherwise any prior
    /// record is tombstoned first, then the new record is appended to the
    /// active file and the keydir is updated.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty or oversized key/value, or on I/O
    /// failure. After a failed append the keydir may already be updated;
    /// subsequent reads are authoritative.
    pub fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        anyhow::ensure!(!key.is_empty(), "key must not be empty");
        anyhow::ensure!(!value.is_empty(), "value must not be empty");
        anyhow::ensure!(
            key.len() <= MAX_KEY_SIZE,
            "key too large: {} bytes (max {})",
            key.len(),
            MAX_KEY_SIZE
        );
        anyhow::ensure!(
            value.len() <= MAX_VALUE_SIZE,
            "value too large: {} bytes (max {})",
            value.len(),
            MAX_VALUE_SIZE
        );

        if let Some(prior) = self.keydir.get(key).cloned() {
            if let Some(existing) = self.read_value_at(&prior)? {
                if existing == value {
                    return Ok(());
                }
            }

            // Shadow the prior record before the replacement lands. The
            // tombstone keeps the prior fid/offset so GC can locate it.
            let mut tomb = prior.header;
            tomb.vsize = 0;
            let (fid, _) = self.active_slot()?;
            append_record(data_path(&self.root, &self.active, fid), &tomb, key, None)?;
        }

        let (fid, offset) = self.active_slot()?;
        let header = RecordHeader {
            time: unix_now()?,
            fid,
            offset: u32::try_from(offset).context("active file offset exceeds u32")?,
            ksize: key.len() as u32,
            vsize: value.len() as u32,
            crc32: checksum(key, value),
        };
        append_record(
            data_path(&self.root, &self.active, fid),
            &header,
            key,
            Some(value),
        )?;

        self.keydir.insert(
            key.to_vec(),
            Slot {
                bucket: self.active.clone(),
                header,
            },
        );
        Ok(())
    }

    /// Deletes a key by appending a tombstone to the active file.
    ///
    /// Returns `Ok(false)` if the key is unknown (delete is not idempotent),
    /// `Ok(true)` once the key is dropped from the keydir and the tombstone
    /// is on disk. The tombstone preserves the deleted record's original
    /// `fid`/`offset` so GC can reclaim it.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty key or on I/O failure.
    pub fn remove(&mut self, key: &[u8]) -> Result<bool> {
        anyhow::ensure!(!key.is_empty(), "key must not be empty");

        let slot = match self.keydir.remove(key) {
            Some(slot) => slot,
            None => return Ok(false),
        };

        let mut tomb = slot.header;
        tomb.vsize = 0;
        let (fid, _) = self.active_slot()?;
        append_record(data_path(&self.root, &self.active, fid), &tomb, key, None)?;
        Ok(true)
    }

    /// Reads the value bytes of the record a slot points at, by seeking past
    /// its header and key. Returns `Ok(None)` when the file has vanished or
    /// is too short; the caller then skips the same-value optimization.
    fn read_value_at(&self, slot: &Slot) -> Result<Option<Vec<u8>>> {
        let path = data_path(&self.root, &slot.bucket, slot.header.fid);
        let mut file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let body_start = u64::from(slot.header.offset)
            + HEADER_BYTES as u64
            + u64::from(slot.header.ksize);
        file.seek(SeekFrom::Start(body_start))?;

        let mut value = vec![0u8; slot.header.vsize as usize];
        match file.read_exact(&mut value) {
            Ok(()) => Ok(Some(value)),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Current wall-clock time as unix seconds, the header's `time` field.
fn unix_now() -> Result<u32> {
    let secs = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
    u32::try_from(secs).context("system clock beyond u32 unix seconds")
}
