//! Shared infrastructure utilities for pyprov.
//!
//! - **`atomic_write`**: Crash-safe file persistence (temp + rename)
//! - **`fs`**: Cache filesystem helpers that treat "already gone" as success

pub mod atomic_write;
pub mod fs;

pub use atomic_write::{AtomicWriteOptions, FileSyncPolicy, atomic_write, atomic_write_with_options};
pub use fs::{read_marker, read_optional, remove_path};
