//! Immutable markings.

use crate::definition::PlaceId;
use std::fmt;
use std::sync::Arc;

/// A marking: one token count per place of a net, indexed by [`PlaceId`].
///
/// Markings are value types. Equality, ordering and hashing are structural
/// over the counts, and nothing mutates a marking after construction; the
/// firing rule always builds a fresh one. Cloning shares the underlying
/// buffer.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Marking(Arc<[u64]>);

impl Marking {
    /// Creates a marking from counts in place-id order.
    pub fn from_counts(counts: impl Into<Vec<u64>>) -> Self {
        Self(Arc::from(counts.into()))
    }

    /// Returns the token count of a place, or 0 when the place is outside
    /// this marking.
    pub fn tokens(&self, place: PlaceId) -> u64 {
        self.0.get(place.index()).copied().unwrap_or(0)
    }

    /// Returns the counts in place-id order.
    pub fn counts(&self) -> &[u64] {
        &self.0
    }

    /// Returns the number of places covered.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the sum of all token counts.
    pub fn total_tokens(&self) -> u128 {
        self.0.iter().map(|&c| c as u128).sum()
    }
}

impl fmt::Debug for Marking {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.iter()).finish()
    }
}

impl From<Vec<u64>> for Marking {
    fn from(counts: Vec<u64>) -> Self {
        Self::from_counts(counts)
    }
}
