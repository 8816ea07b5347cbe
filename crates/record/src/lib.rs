//! # Record - On-Disk Record Codec
//!
//! Serializes and deserializes the append-only records that make up an
//! EmberKV bucket's data files.
//!
//! Every mutation (`SET` or `DEL`) becomes one record appended to the end of
//! the bucket's active data file. A data file is nothing but a concatenation
//! of records; there is no index block, footer, or padding.
//!
//! ## Binary Record Format
//!
//! ```text
//! [time: u32 LE][fid: u32 LE][offset: u32 LE][ksize: u32 LE][vsize: u32 LE][crc32: u32 LE][key][value?]
//! ```
//!
//! The header is exactly [`HEADER_BYTES`] (24) bytes. `vsize == 0` marks a
//! **tombstone**: the record carries no value bytes, and its `fid`/`offset`
//! fields locate the earlier record it deletes. For live records `fid` and
//! `offset` are the physical location the record was appended at, and
//! `crc32` covers the concatenation of key and value.
//!
//! The layout is a compatibility surface: it must stay bit-exact so existing
//! databases remain readable.
//!
//! ## Example
//!
//! ```rust,no_run
//! use record::{append_record, checksum, RecordHeader, RecordReader};
//!
//! let header = RecordHeader {
//!     time: 1,
//!     fid: 0,
//!     offset: 0,
//!     ksize: 5,
//!     vsize: 5,
//!     crc32: checksum(b"hello", b"world"),
//! };
//! append_record("0000000000.dat", &header, b"hello", Some(b"world")).unwrap();
//!
//! let mut r = RecordReader::open("0000000000.dat").unwrap();
//! while let Some(rec) = r.next_record(true).unwrap() {
//!     println!("{:?} at byte {}", rec.key, rec.offset);
//! }
//! ```

use byteorder::{ByteOrder, LittleEndian};
use crc32fast::Hasher as Crc32;
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read, Write};
use std::path::Path;

use thiserror::Error;

/// Size of the fixed record header in bytes: six little-endian `u32` fields.
pub const HEADER_BYTES: usize = 24;

/// Maximum key size we'll allocate during reads (64 KiB). Prevents OOM on corrupt files.
pub const MAX_KEY_BYTES: usize = 64 * 1024;
/// Maximum value size we'll allocate during reads (10 MiB). Prevents OOM on corrupt files.
pub const MAX_VALUE_BYTES: usize = 10 * 1024 * 1024;

/// Errors that can occur while encoding or decoding records.
#[derive(Debug, Error)]
pub enum RecordError {
    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A header declared a zero-length key or a key/value beyond the
    /// allocation caps.
    #[error("corrupt record header")]
    Corrupt,
}

/// The fixed 24-byte header that starts every record.
///
/// All fields are unsigned 32-bit integers stored little-endian, in field
/// order. For a live record `fid`/`offset` name the file and byte offset the
/// record was appended at; for a tombstone they name the record being
/// deleted, and `crc32` is carried over from that record unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    /// Write time, unix seconds.
    pub time: u32,
    /// File id the record logically belongs to.
    pub fid: u32,
    /// Byte offset the record logically belongs at.
    pub offset: u32,
    /// Key length in bytes. Always > 0 in a well-formed record.
    pub ksize: u32,
    /// Value length in bytes. 0 denotes a tombstone.
    pub vsize: u32,
    /// CRC32 over key + value.
    pub crc32: u32,
}

impl RecordHeader {
    /// Returns `true` if this header marks a deletion.
    #[must_use]
    pub fn is_tombstone(&self) -> bool {
        self.vsize == 0
    }

    /// Serializes the header into its 24-byte on-disk form.
    #[must_use]
    pub fn encode(&self) -> [u8; HEADER_BYTES] {
        let mut buf = [0u8; HEADER_BYTES];
        LittleEndian::write_u32(&mut buf[0..4], self.time);
        LittleEndian::write_u32(&mut buf[4..8], self.fid);
        LittleEndian::write_u32(&mut buf[8..12], self.offset);
        LittleEndian::write_u32(&mut buf[12..16], self.ksize);
        LittleEndian::write_u32(&mut buf[16..20], self.vsize);
        LittleEndian::write_u32(&mut buf[20..24], self.crc32);
        buf
    }

    /// Deserializes a header from its 24-byte on-disk form.
    #[must_use]
    pub fn decode(buf: &[u8; HEADER_BYTES]) -> Self {
        Self {
            time: LittleEndian::read_u32(&buf[0..4]),
            fid: LittleEndian::read_u32(&buf[4..8]),
            offset: LittleEndian::read_u32(&buf[8..12]),
            ksize: LittleEndian::read_u32(&buf[12..16]),
            vsize: LittleEndian::read_u32(&buf[16..20]),
            crc32: LittleEndian::read_u32(&buf[20..24]),
        }
    }
}

/// Computes the CRC32 of `key` followed by `value`, starting from seed 0.
///
/// This is the checksum stored in [`RecordHeader::crc32`] for live records.
#[must_use]
pub fn checksum(key: &[u8], value: &[u8]) -> u32 {
    let mut hasher = Crc32::new();
    hasher.update(key);
    hasher.update(value);
    hasher.finalize()
}

/// Appends one record to the data file at `path`.
///
/// The file is opened in create+append mode, the header, key, and (for live
/// records) value are written as a single `write_all`, and the file is
/// closed when the handle drops. One open-append-close cycle per call; no
/// partial-record rollback is attempted on failure.
///
/// Pass `value: None` for tombstones.
pub fn append_record<P: AsRef<Path>>(
    path: P,
    header: &RecordHeader,
    key: &[u8],
    value: Option<&[u8]>,
) -> Result<(), RecordError> {
    let mut buf =
        Vec::with_capacity(HEADER_BYTES + key.len() + value.map_or(0, <[u8]>::len));
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(key);
    if let Some(v) = value {
        buf.extend_from_slice(v);
    }

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(&buf)?;
    file.flush()?;
    Ok(())
}

/// One decoded record, together with the byte offset its header started at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Byte offset of the header start, relative to where the reader began.
    pub offset: u64,
    /// The decoded header.
    pub header: RecordHeader,
    /// The key bytes.
    pub key: Vec<u8>,
    /// The value bytes. `None` for tombstones and for reads that skip values.
    pub value: Option<Vec<u8>>,
}

/// Sequential reader over a data file's records.
///
/// The reader is generic over any `Read` implementor, allowing it to be used
/// with real files (`RecordReader<File>`) or in-memory buffers for testing.
///
/// A truncated tail record (fewer than 24 header bytes, or a header whose
/// body was cut short by a crash mid-append) terminates the scan cleanly:
/// [`next_record`](RecordReader::next_record) returns `Ok(None)` and all
/// complete records before it have already been yielded. The trailing bytes
/// are left in place for a later compaction to rewrite.
pub struct RecordReader<R: Read> {
    rdr: BufReader<R>,
    pos: u64,
}

impl RecordReader<File> {
    /// Opens a data file for sequential scanning.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<RecordReader<File>, RecordError> {
        let f = File::open(path)?;
        Ok(RecordReader {
            rdr: BufReader::new(f),
            pos: 0,
        })
    }
}

impl<R: Read> RecordReader<R> {
    /// Constructs a reader from any `Read` implementor.
    ///
    /// Useful for unit tests that supply an in-memory buffer (e.g.
    /// `Cursor<Vec<u8>>`), or for reading a single record after seeking a
    /// file to a known offset.
    pub fn from_reader(reader: R) -> Self {
        RecordReader {
            rdr: BufReader::new(reader),
            pos: 0,
        }
    }

    /// Byte offset of the next record's header start.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Reads the next record, or `Ok(None)` at end of stream.
    ///
    /// With `want_value == false` the value bytes are skipped instead of
    /// read, and [`Record::value`] is `None`; recovery uses this to replay a
    /// file without pulling every value into memory.
    ///
    /// # Termination
    ///
    /// - **Clean EOF** (no more bytes) -> `Ok(None)`.
    /// - **Truncated tail** (partial header or partial body at end, e.g.
    ///   from a crash mid-append) -> `Ok(None)`.
    /// - **Absurd header** (`ksize == 0`, or sizes beyond the allocation
    ///   caps) -> `Err(RecordError::Corrupt)`.
    /// - **I/O error** -> `Err(RecordError::Io(...))`.
    pub fn next_record(&mut self, want_value: bool) -> Result<Option<Record>, RecordError> {
        let start = self.pos;

        let mut hdr_buf = [0u8; HEADER_BYTES];
        match self.rdr.read_exact(&mut hdr_buf) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(RecordError::Io(e)),
        }
        let header = RecordHeader::decode(&hdr_buf);

        let ksize = header.ksize as usize;
        let vsize = header.vsize as usize;
        if ksize == 0 || ksize > MAX_KEY_BYTES || vsize > MAX_VALUE_BYTES {
            return Err(RecordError::Corrupt);
        }

        let mut key = vec![0u8; ksize];
        match self.rdr.read_exact(&mut key) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(RecordError::Io(e)),
        }

        let value = if vsize == 0 {
            None
        } else if want_value {
            let mut val = vec![0u8; vsize];
            match self.rdr.read_exact(&mut val) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
                Err(e) => return Err(RecordError::Io(e)),
            }
            Some(val)
        } else {
            // skip the value bytes without materializing them
            let skipped = io::copy(
                &mut self.rdr.by_ref().take(vsize as u64),
                &mut io::sink(),
            )?;
            if skipped < vsize as u64 {
                return Ok(None);
            }
            None
        };

        self.pos = start + (HEADER_BYTES + ksize + vsize) as u64;
        Ok(Some(Record {
            offset: start,
            header,
            key,
            value,
        }))
    }
}
