//! Filename policy for inbound file requests.
//!
//! This is the only gate between a remote request and the local filesystem.
//! A request is served only if its name is either
//!
//! - a one-shot token previously handed to [`ExpectedFiles::expect`]
//!   (location [`LocationKind::None`]), or
//! - a strictly shaped temp name inside the cache directory
//!   (location [`LocationKind::Cache`]).
//!
//! Anything else is refused, and the refusal is never reported back to the
//! requester.

use std::collections::HashMap;
use thiserror::Error;
use xfer_files::{LocationKind, TEMP_SUFFIX};

/// Prefix older peers use to name the cache directory inline.
pub const LEGACY_CACHE_PREFIX: &str = "data/";

/// Shortest accepted cache filename, suffix included.
pub const MIN_CACHE_FILENAME_LEN: usize = 6;

/// Longest accepted cache filename, suffix included.
pub const MAX_CACHE_FILENAME_LEN: usize = 50;

/// Multiset of pre-authorized filenames.
#[derive(Debug, Clone, Default)]
pub struct ExpectedFiles {
    names: HashMap<String, usize>,
}

impl ExpectedFiles {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Authorize `name` once more.
    pub fn expect(&mut self, name: &str) {
        *self.names.entry(name.to_string()).or_default() += 1;
    }

    /// Consume one authorization for `name`. Returns `false` if none was left.
    pub fn validate(&mut self, name: &str) -> bool {
        match self.names.get_mut(name) {
            Some(count) if *count > 1 => {
                *count -= 1;
                true
            }
            Some(_) => {
                self.names.remove(name);
                true
            }
            None => false,
        }
    }

    /// Authorizations left for `name`.
    #[must_use]
    pub fn count(&self, name: &str) -> usize {
        self.names.get(name).copied().unwrap_or(0)
    }

    /// Total authorizations left.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.values().sum()
    }

    /// Whether no authorizations are left.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Whether `name` is an acceptable cache-directory filename.
///
/// Accepted names are 6 to 50 bytes: a stem of ASCII letters, digits, `_`
/// or `-`, followed by `.tmp`. Case-sensitive, no separators.
#[must_use]
pub fn verify_cache_filename(name: &str) -> bool {
    let len = name.len();
    if !(MIN_CACHE_FILENAME_LEN..=MAX_CACHE_FILENAME_LEN).contains(&len) {
        return false;
    }
    let Some(stem) = name.strip_suffix(TEMP_SUFFIX) else {
        return false;
    };
    stem.bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// Why a requested filename was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilenameRejection {
    /// Unrestricted name that was never pre-authorized
    #[error("SECURITY: Unapproved filename '{0}'")]
    Unapproved(String),

    /// Cache name that does not match the allowed pattern
    #[error("SECURITY: Illegal cache filename '{0}'")]
    IllegalCacheName(String),

    /// Location kind that is never served
    #[error("SECURITY: Restricted file dir enum: {0}")]
    RestrictedLocation(u8),
}

/// A requested filename that passed the policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovedFile {
    /// Name after legacy prefix removal
    pub name: String,
    /// Location the name resolves under
    pub location: LocationKind,
}

/// Apply the filename policy to an inbound request.
///
/// An unrestricted name with the legacy `data/` prefix is rewritten to a
/// cache name first. Approving an unrestricted name consumes its token.
///
/// # Errors
///
/// Returns the [`FilenameRejection`] describing why the name was refused.
pub fn check_requested_filename(
    filename: &str,
    location: LocationKind,
    expected: &mut ExpectedFiles,
) -> Result<ApprovedFile, FilenameRejection> {
    let (name, location) = match (location, filename.strip_prefix(LEGACY_CACHE_PREFIX)) {
        (LocationKind::None, Some(rest)) => (rest, LocationKind::Cache),
        _ => (filename, location),
    };

    match location {
        LocationKind::None => {
            if !expected.validate(name) {
                return Err(FilenameRejection::Unapproved(name.to_string()));
            }
        }
        LocationKind::Cache => {
            if !verify_cache_filename(name) {
                return Err(FilenameRejection::IllegalCacheName(name.to_string()));
            }
        }
        LocationKind::Other(kind) => return Err(FilenameRejection::RestrictedLocation(kind)),
    }

    Ok(ApprovedFile {
        name: name.to_string(),
        location,
    })
}
