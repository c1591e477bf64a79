//! Pair keys.

use linkage_binning::EntityId;
use serde::{Deserialize, Serialize};

/// Unordered pair of entities, stored with the smaller id first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PairKey {
    primary: EntityId,
    secondary: EntityId,
}

impl PairKey {
    /// Build a key; argument order does not matter.
    pub fn new(a: EntityId, b: EntityId) -> Self {
        if a <= b {
            Self { primary: a, secondary: b }
        } else {
            Self { primary: b, secondary: a }
        }
    }

    /// The entity whose owner owns the entry.
    pub const fn primary(&self) -> EntityId {
        self.primary
    }

    pub const fn secondary(&self) -> EntityId {
        self.secondary
    }

    /// Whether `a` is stored first, i.e. quantities stored "from a to b"
    /// can be used as-is.
    pub fn is_primary(&self, a: EntityId) -> bool {
        self.primary == a
    }
}

impl std::fmt::Display for PairKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.primary, self.secondary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_unordered() {
        let k1 = PairKey::new(EntityId(5), EntityId(2));
        let k2 = PairKey::new(EntityId(2), EntityId(5));
        assert_eq!(k1, k2);
        assert_eq!(k1.primary(), EntityId(2));
        assert!(k1.is_primary(EntityId(2)));
        assert!(!k1.is_primary(EntityId(5)));
    }

    #[test]
    fn display() {
        assert_eq!(PairKey::new(EntityId(3), EntityId(1)).to_string(), "(#1, #3)");
    }
}
