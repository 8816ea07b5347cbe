/// Read path: `get()`.
///
/// A point lookup is one keydir probe plus one open + seek + read of the
/// record the slot points at. The record is verified before its value is
/// returned: the on-disk key must equal the requested key, and the CRC32 of
/// key + value must equal the indexed checksum. Verification failures read as
/// "not found" rather than errors, matching the store's thin error taxonomy.
use anyhow::Result;
use record::{checksum, RecordError, RecordReader};
use std::fs::File;
use std::io::{self, Seek, SeekFrom};

use crate::bucket::data_path;
use crate::Store;

impl Store {
    /// Looks up a key, returning `Ok(Some(value))` if found and intact.
    ///
    /// Returns `Ok(None)` for an unknown key, a key whose data file has
    /// vanished, or a record that fails key/CRC verification (a corruption
    /// signal).
    ///
    /// # Errors
    ///
    /// Returns an error for an empty key or on I/O failure other than the
    /// file being missing.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        anyhow::ensure!(!key.is_empty(), "key must not be empty");

        let slot = match self.keydir.get(key) {
            Some(slot) => slot,
            None => return Ok(None),
        };

        let path = data_path(&self.root, &slot.bucket, slot.header.fid);
        let mut file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        file.seek(SeekFrom::Start(u64::from(slot.header.offset)))?;

        let mut reader = RecordReader::from_reader(file);
        let rec = match reader.next_record(true) {
            Ok(Some(rec)) => rec,
            // a short or nonsense record where the slot points is corruption
            Ok(None) | Err(RecordError::Corrupt) => return Ok(None),
            Err(RecordError::Io(e)) => return Err(e.into()),
        };

        let value = match rec.value {
            Some(value) => value,
            None => return Ok(None),
        };
        if rec.key != key || checksum(&rec.key, &value) != slot.header.crc32 {
            return Ok(None);
        }

        Ok(Some(value))
    }
}
