//! # XFER Files
//!
//! Where transfer bytes come from and go to.
//!
//! This crate provides:
//! - Windowed file reads for outgoing transfers
//! - Temp-file writes with atomic commit for incoming transfers
//! - Location kinds and path resolution (cache directory, temp names)
//! - The content-addressed object store interface and an in-memory store

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod chunker;
pub mod paths;
pub mod store;

pub use chunker::{TempFileWriter, WindowReader, rename_or_copy};
pub use paths::{LocationKind, PathResolver};
pub use store::{MemoryObjectStore, ObjectKey, ObjectStore, ObjectType};

/// Bytes held in memory before a transfer reads ahead or flushes (64 KiB).
pub const MAX_BUFFER_SIZE: usize = 64 * 1024;

/// Suffix marking a file as a transfer temporary.
pub const TEMP_SUFFIX: &str = ".tmp";

/// Whether `name` carries the temp suffix.
#[must_use]
pub fn has_temp_suffix(name: &str) -> bool {
    name.ends_with(TEMP_SUFFIX)
}
