//! Location kinds and path resolution.

use crate::TEMP_SUFFIX;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Base directory a requested file name is relative to.
///
/// Only [`LocationKind::None`] and [`LocationKind::Cache`] can ever be served;
/// every other wire value is carried as `Other` so it can be logged and refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LocationKind {
    /// No base directory; the name must be pre-authorized.
    None,
    /// The cache directory.
    Cache,
    /// Any other base directory.
    Other(u8),
}

impl LocationKind {
    const NONE_WIRE: u8 = 0;
    const CACHE_WIRE: u8 = 4;

    /// Wire value.
    #[must_use]
    pub const fn to_u8(self) -> u8 {
        match self {
            Self::None => Self::NONE_WIRE,
            Self::Cache => Self::CACHE_WIRE,
            Self::Other(v) => v,
        }
    }

    /// Parse a wire value.
    #[must_use]
    pub const fn from_u8(value: u8) -> Self {
        match value {
            Self::NONE_WIRE => Self::None,
            Self::CACHE_WIRE => Self::Cache,
            v => Self::Other(v),
        }
    }
}

impl fmt::Display for LocationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Cache => write!(f, "cache"),
            Self::Other(v) => write!(f, "dir#{v}"),
        }
    }
}

/// Expands location kinds into concrete paths and names temp files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathResolver {
    cache_dir: PathBuf,
    temp_dir: PathBuf,
}

impl PathResolver {
    /// Create a resolver
    ///
    /// # Arguments
    ///
    /// * `cache_dir` - Directory [`LocationKind::Cache`] names resolve into
    /// * `temp_dir` - Directory incoming transfers stage their bytes in
    #[must_use]
    pub fn new(cache_dir: impl Into<PathBuf>, temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            temp_dir: temp_dir.into(),
        }
    }

    /// Cache directory
    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Temp directory
    #[must_use]
    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    /// Resolve `name` under `kind`
    ///
    /// `None` passes the name through untouched; `Other` kinds have no
    /// mapping and resolve to nothing.
    #[must_use]
    pub fn expand(&self, kind: LocationKind, name: &str) -> Option<PathBuf> {
        match kind {
            LocationKind::None => Some(PathBuf::from(name)),
            LocationKind::Cache => Some(self.cache_dir.join(name)),
            LocationKind::Other(_) => None,
        }
    }

    /// A fresh, unused temp file path
    #[must_use]
    pub fn temp_filename(&self) -> PathBuf {
        self.temp_dir
            .join(format!("{}{}", Uuid::new_v4().simple(), TEMP_SUFFIX))
    }
}

impl Default for PathResolver {
    fn default() -> Self {
        let temp = std::env::temp_dir();
        Self::new(temp.join("xfer-cache"), temp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_wire_values() {
        assert_eq!(LocationKind::from_u8(0), LocationKind::None);
        assert_eq!(LocationKind::from_u8(4), LocationKind::Cache);
        assert_eq!(LocationKind::from_u8(2), LocationKind::Other(2));
        for v in 0..=u8::MAX {
            assert_eq!(LocationKind::from_u8(v).to_u8(), v);
        }
    }

    #[test]
    fn test_expand() {
        let resolver = PathResolver::new("/var/cache/xfer", "/tmp");
        assert_eq!(
            resolver.expand(LocationKind::Cache, "abc.tmp"),
            Some(PathBuf::from("/var/cache/xfer/abc.tmp"))
        );
        assert_eq!(
            resolver.expand(LocationKind::None, "/srv/out.bin"),
            Some(PathBuf::from("/srv/out.bin"))
        );
        assert_eq!(resolver.expand(LocationKind::Other(1), "x"), None);
    }

    #[test]
    fn test_temp_filenames_are_unique() {
        let resolver = PathResolver::new("/cache", "/scratch");
        let a = resolver.temp_filename();
        let b = resolver.temp_filename();
        assert_ne!(a, b);
        assert!(a.starts_with("/scratch"));
        assert!(a.to_string_lossy().ends_with(TEMP_SUFFIX));
    }

    proptest::proptest! {
        #[test]
        fn prop_cache_names_stay_in_cache(name in "[a-zA-Z0-9_-]{1,40}\\.tmp") {
            let resolver = PathResolver::new("/cache", "/scratch");
            let path = resolver.expand(LocationKind::Cache, &name).unwrap();
            proptest::prop_assert_eq!(path.parent(), Some(Path::new("/cache")));
        }
    }
}
