use crate::{Config, Store};
use std::fs;
use std::path::Path;

/// Opens a store with the default 64 MiB rotation threshold.
pub fn open_store(dir: &Path) -> Store {
    Store::open(Config::new(dir)).unwrap()
}

/// Opens a store with a tiny rotation threshold to force file rotation.
pub fn open_small(dir: &Path, file_size: u64) -> Store {
    Store::open(Config::new(dir).with_file_size(file_size)).unwrap()
}

/// Number of `.dat` files in one bucket directory.
pub fn count_dat_files(bucket_dir: &Path) -> usize {
    fs::read_dir(bucket_dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|s| s.to_str())
                .map(|ext| ext == "dat")
                .unwrap_or(false)
        })
        .count()
}

/// Total size in bytes of all `.dat` files in one bucket directory.
pub fn bucket_bytes(bucket_dir: &Path) -> u64 {
    fs::read_dir(bucket_dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|s| s.to_str())
                .map(|ext| ext == "dat")
                .unwrap_or(false)
        })
        .map(|e| e.metadata().unwrap().len())
        .sum()
}
