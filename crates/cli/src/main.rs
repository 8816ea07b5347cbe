//! # CLI - EmberKV Interactive Shell
//!
//! A REPL-style command-line interface for the EmberKV store. Reads commands
//! from stdin, executes them against the store, and prints results to
//! stdout. Designed for both interactive use and scripted testing (pipe
//! commands via stdin).
//!
//! ## Commands
//!
//! ```text
//! SET key value      Insert or update a key-value pair
//! GET key            Look up a key (prints value or "(nil)")
//! DEL key            Delete a key (writes a tombstone)
//! KEYS               List every live key
//! BUCKETS            List all buckets
//! BUCKET name        Switch the active bucket (created on first use)
//! GC [bucket]        Compact a bucket (default: the active bucket)
//! STATS              Print store debug info
//! EXIT / QUIT        Shut down
//! ```
//!
//! ## Configuration
//!
//! All settings are controlled via environment variables:
//!
//! ```text
//! EMBER_DIR           Database root directory       (default: "data/ember")
//! EMBER_FILE_SIZE_MB  Rotation threshold in MiB     (default: 64)
//! ```
//!
//! ## Example
//!
//! ```text
//! $ cargo run -p cli
//! EmberKV started (dir=data/ember, file_size=64MiB, buckets=1)
//! > SET name Alice
//! OK
//! > GET name
//! Alice
//! > DEL name
//! OK
//! > GET name
//! (nil)
//! > EXIT
//! bye
//! ```

use anyhow::Result;
use engine::{Config, Store};
use std::io::{self, BufRead, Write};

/// Reads a configuration value from the environment, falling back to `default`.
fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn main() -> Result<()> {
    let dir = env_or("EMBER_DIR", "data/ember");
    let file_size_mb: u64 = env_or("EMBER_FILE_SIZE_MB", "64").parse().unwrap_or(64);

    let mut store = Store::open(Config::new(&dir).with_file_size(file_size_mb * 1024 * 1024))?;

    println!(
        "EmberKV started (dir={}, file_size={}MiB, buckets={})",
        dir,
        file_size_mb,
        store.buckets().len()
    );
    println!("Commands: SET key value | GET key | DEL key | KEYS");
    println!("          BUCKETS | BUCKET name | GC [bucket] | STATS | EXIT");
    print!("> ");
    io::stdout().flush().ok();

    let stdin = io::stdin();

    for line in stdin.lock().lines() {
        let line = line?;
        let mut parts = line.split_whitespace();
        if let Some(cmd) = parts.next() {
            match cmd.to_uppercase().as_str() {
                "SET" => {
                    if let Some(k) = parts.next() {
                        let v: String = parts.collect::<Vec<&str>>().join(" ");
                        if v.is_empty() {
                            println!("ERR usage: SET key value");
                        } else {
                            match store.set(k.as_bytes(), v.as_bytes()) {
                                Ok(()) => println!("OK"),
                                Err(e) => println!("ERR set failed: {}", e),
                            }
                        }
                    } else {
                        println!("ERR usage: SET key value");
                    }
                }
                "GET" => {
                    if let Some(k) = parts.next() {
                        match store.get(k.as_bytes()) {
                            Ok(Some(v)) => println!("{}", String::from_utf8_lossy(&v)),
                            Ok(None) => println!("(nil)"),
                            Err(e) => println!("ERR read failed: {}", e),
                        }
                    } else {
                        println!("ERR usage: GET key");
                    }
                }
                "DEL" => {
                    if let Some(k) = parts.next() {
                        match store.remove(k.as_bytes()) {
                            Ok(true) => println!("OK"),
                            Ok(false) => println!("(not found)"),
                            Err(e) => println!("ERR del failed: {}", e),
                        }
                    } else {
                        println!("ERR usage: DEL key");
                    }
                }
                "KEYS" => {
                    let mut keys = store.keys();
                    keys.sort();
                    if keys.is_empty() {
                        println!("(empty)");
                    } else {
                        for k in &keys {
                            println!("{}", String::from_utf8_lossy(k));
                        }
                        println!("({} keys)", keys.len());
                    }
                }
                "BUCKETS" => {
                    for name in store.buckets() {
                        if name == store.active_bucket() {
                            println!("{} (active)", name);
                        } else {
                            println!("{}", name);
                        }
                    }
                }
                "BUCKET" => {
                    if let Some(name) = parts.next() {
                        match store.change_bucket(name) {
                            Ok(()) => println!("OK"),
                            Err(e) => println!("ERR bucket failed: {}", e),
                        }
                    } else {
                        println!("ERR usage: BUCKET name");
                    }
                }
                "GC" => {
                    let name = parts
                        .next()
                        .unwrap_or(store.active_bucket())
                        .to_string();
                    match store.gc(&name) {
                        Ok(()) => println!("OK (bucket={})", name),
                        Err(e) => println!("ERR gc failed: {}", e),
                    }
                }
                "STATS" => {
                    println!("{:?}", store);
                }
                "EXIT" | "QUIT" => {
                    println!("bye");
                    break;
                }
                other => {
                    println!("unknown command: {}", other);
                }
            }
        }

        print!("> ");
        io::stdout().flush().ok();
    }

    Ok(())
}
