//! Transfer identifiers.

use std::fmt;
use uuid::Uuid;

/// 64-bit transfer id.
///
/// Generated from the low bytes of a random UUID. There is no collision
/// check; two live transfers sharing an id is an accepted risk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransferId(u64);

impl TransferId {
    /// Generate a fresh, non-zero id.
    #[must_use]
    pub fn generate() -> Self {
        loop {
            let uuid = Uuid::new_v4();
            let mut low = [0u8; 8];
            low.copy_from_slice(&uuid.as_bytes()[..8]);
            let id = u64::from_le_bytes(low);
            if id != 0 {
                return Self(id);
            }
        }
    }

    /// Wrap a raw wire value.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw wire value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generate_non_zero_and_distinct() {
        let ids: HashSet<_> = (0..1000).map(|_| TransferId::generate()).collect();
        assert_eq!(ids.len(), 1000);
        assert!(!ids.contains(&TransferId::from_raw(0)));
    }

    #[test]
    fn test_display_hex() {
        assert_eq!(TransferId::from_raw(0xabc).to_string(), "0000000000000abc");
        assert_eq!(TransferId::from_raw(42).as_u64(), 42);
    }
}
