//! # Engine - EmberKV Storage Engine
//!
//! The central orchestrator that ties together the [`record`] and [`keydir`]
//! crates into a complete Bitcask-style key-value store.
//!
//! ## Architecture
//!
//! ```text
//! Client
//!   |
//!   v
//! ┌───────────────────────────────────────────────┐
//! │                   STORE                       │
//! │                                               │
//! │ write.rs → tombstone prior → append record    │
//! │              |                                │
//! │              v                                │
//! │           keydir insert                       │
//! │                                               │
//! │ read.rs → keydir lookup → seek + read + CRC   │
//! │                                               │
//! │ gc.rs   → collect tombstones → rewrite        │
//! │           survivors → delete vacated files    │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! ## Module Responsibilities
//!
//! | Module        | Purpose                                                |
//! |---------------|--------------------------------------------------------|
//! | [`lib.rs`]    | `Store` struct, `Config`, open, accessors, `Debug`     |
//! | [`bucket`]    | Data-file naming, fid allocation, active-file rotation |
//! | [`recovery`]  | Bucket scan + ordered replay into the keydir           |
//! | [`write`]     | `set()` and `remove()`                                 |
//! | [`read`]      | `get()`                                                |
//! | [`gc`]        | Per-bucket two-pass offline compaction                 |
//!
//! ## On-Disk Layout
//!
//! ```text
//! <root>/
//!   <bucket>/
//!     0000000000.dat
//!     0000000001.dat
//!     ...
//! ```
//!
//! Each `.dat` file is a strictly append-only concatenation of records (see
//! the [`record`] crate for the 24-byte header layout). Nothing is ever
//! truncated or mutated in place; the only file-level deletion is GC
//! removing a whole vacated file.
//!
//! ## Concurrency
//!
//! The store is single-threaded and non-reentrant: all operations are
//! synchronous blocking calls through `&mut self`. No file handles are held
//! across calls, no locks are taken, and multi-process access to the same
//! directory is unsupported.
mod bucket;
mod gc;
mod read;
mod recovery;
mod write;

use anyhow::Result;
use bucket::Bucket;
use keydir::KeyDir;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Maximum allowed key size in bytes (64 KiB).
pub const MAX_KEY_SIZE: usize = record::MAX_KEY_BYTES;
/// Maximum allowed value size in bytes (10 MiB).
pub const MAX_VALUE_SIZE: usize = record::MAX_VALUE_BYTES;

/// Default active-file size threshold (64 MiB). Once the active file reaches
/// this size, the next append rotates to a fresh file id first.
pub const DEFAULT_FILE_SIZE: u64 = 64 * 1024 * 1024;

/// Name of the bucket created when a fresh database directory is opened.
pub const DEFAULT_BUCKET: &str = "0";

/// Store configuration.
///
/// `dir` is the database root; every bucket is a subdirectory of it.
/// `file_size` bounds how large a data file may grow before appends rotate
/// to a new file id (appends may overshoot by at most one record, since the
/// size is checked before the append, not after).
#[derive(Debug, Clone)]
pub struct Config {
    /// Database root directory. Created if missing.
    pub dir: PathBuf,
    /// Active-file rotation threshold in bytes.
    pub file_size: u64,
}

impl Config {
    /// Configuration with the default 64 MiB rotation threshold.
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            file_size: DEFAULT_FILE_SIZE,
        }
    }

    /// Overrides the rotation threshold. Small values are handy in tests.
    #[must_use]
    pub fn with_file_size(mut self, bytes: u64) -> Self {
        self.file_size = bytes;
        self
    }
}

/// The Bitcask-style store: append-only data files per bucket plus a global
/// in-memory key index.
///
/// # Write Path
///
/// 1. If the key exists and the new value equals the old one, return without
///    touching disk.
/// 2. Otherwise tombstone the prior record (if any), then append the new
///    record to the active file and point the keydir at it.
///
/// # Read Path
///
/// Keydir lookup, then a single open + seek + read of the record, verifying
/// that the stored key matches and the CRC32 of key + value equals the indexed
/// checksum. Any mismatch reads as "not found".
///
/// # Recovery
///
/// On [`Store::open`] every bucket's files are replayed in ascending fid
/// order, which, files being append-only, is equivalent to replaying
/// writes in wall-clock order.
pub struct Store {
    root: PathBuf,
    file_size: u64,
    buckets: HashMap<String, Bucket>,
    /// Name of the bucket currently receiving appends.
    active: String,
    keydir: KeyDir,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("root", &self.root)
            .field("file_size", &self.file_size)
            .field("active_bucket", &self.active)
            .field("bucket_count", &self.buckets.len())
            .field("key_count", &self.keydir.len())
            .finish()
    }
}

impl Store {
    /// Opens (or creates) a database rooted at `config.dir`, performing full
    /// recovery from the data files on disk.
    ///
    /// # Recovery Steps
    ///
    /// 1. Create the root directory if it does not exist.
    /// 2. Scan non-hidden subdirectories into buckets; a fresh root gets the
    ///    default bucket `"0"`.
    /// 3. Replay every bucket's files (fids `0..=max_fid`, records in file
    ///    order, values skipped): live records land in the keydir, tombstones
    ///    drop their key, and a missing fid below `max_fid` joins the
    ///    bucket's free list.
    /// 4. Position each bucket's active fid on a writable target.
    pub fn open(config: Config) -> Result<Self> {
        std::fs::create_dir_all(&config.dir)?;

        let mut buckets = recovery::scan_buckets(&config.dir)?;
        let mut keydir = KeyDir::new();

        // Sorted order keeps replay deterministic across runs; within a
        // bucket, ascending fid order is wall-clock write order.
        let mut names: Vec<String> = buckets.keys().cloned().collect();
        names.sort();
        for name in &names {
            let b = buckets.get_mut(name).expect("bucket just scanned");
            recovery::replay_bucket(&config.dir, name, b, &mut keydir)?;
        }

        for name in &names {
            let b = buckets.get_mut(name).expect("bucket just scanned");
            bucket::active_slot(&config.dir, config.file_size, name, b)?;
        }

        let active = if buckets.contains_key(DEFAULT_BUCKET) {
            DEFAULT_BUCKET.to_string()
        } else {
            names.first().expect("at least the default bucket").clone()
        };

        Ok(Self {
            root: config.dir,
            file_size: config.file_size,
            buckets,
            active,
            keydir,
        })
    }

    /// Returns all bucket names, sorted.
    #[must_use]
    pub fn buckets(&self) -> Vec<String> {
        let mut names: Vec<String> = self.buckets.keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns every live key, in arbitrary order. The index is global:
    /// keys written under any bucket are visible here.
    #[must_use]
    pub fn keys(&self) -> Vec<Vec<u8>> {
        self.keydir.keys().map(<[u8]>::to_vec).collect()
    }

    /// Name of the bucket currently receiving appends.
    #[must_use]
    pub fn active_bucket(&self) -> &str {
        &self.active
    }

    /// Switches the write target to `name`, creating the bucket (directory
    /// and in-memory entry) on first reference.
    ///
    /// Switching buckets does not change which keys are visible, only where
    /// new records are appended.
    pub fn change_bucket(&mut self, name: &str) -> Result<()> {
        anyhow::ensure!(!name.is_empty(), "bucket name must not be empty");
        anyhow::ensure!(
            !name.starts_with('.'),
            "bucket name must not be hidden: {name:?}"
        );
        anyhow::ensure!(
            !name.contains(['/', '\\']),
            "bucket name must not contain path separators: {name:?}"
        );

        if !self.buckets.contains_key(name) {
            std::fs::create_dir_all(self.root.join(name))?;
            self.buckets.insert(name.to_string(), Bucket::new());
        }
        self.active = name.to_string();
        Ok(())
    }

    /// The configured rotation threshold in bytes.
    #[must_use]
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Resolves the `(fid, offset)` the next append to the active bucket
    /// should land at, rotating to a fresh file first if the current one has
    /// reached the size threshold.
    pub(crate) fn active_slot(&mut self) -> Result<(u32, u64)> {
        let Store {
            root,
            file_size,
            buckets,
            active,
            ..
        } = self;
        let b = buckets
            .get_mut(active.as_str())
            .ok_or_else(|| anyhow::anyhow!("active bucket {active:?} missing"))?;
        bucket::active_slot(root, *file_size, active, b)
    }
}

#[cfg(test)]
mod tests;
