//! Core domain types for pyprov.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Everything here can be used from any layer of the application.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory

mod platform;
mod version;

pub use platform::{Arch, PlatformParseError, Stack};
pub use version::{PythonVersion, ReleaseLine, VersionParseError, VersionSpec};
