//! Collection aliases used throughout the mesh layer.
//!
//! Hash maps and sets use the Fx hasher from `rustc-hash`; keys are slotmap
//! handles or small integer tuples, so `SipHash`'s DoS resistance buys
//! nothing. Small per-cell buffers live on the stack via `smallvec`.

use rustc_hash::{FxBuildHasher, FxHashMap, FxHashSet};
use slotmap::SparseSecondaryMap;
use smallvec::SmallVec;

#[cfg(not(feature = "dense-slotmap"))]
use slotmap::SlotMap;

#[cfg(feature = "dense-slotmap")]
use slotmap::DenseSlotMap;

use crate::core::triangulation_data_structure::{CellKey, VertexKey};

pub use std::collections::hash_map::Entry;
pub use uuid::Uuid;

// =============================================================================
// STORAGE BACKEND
// =============================================================================

/// Arena holding the vertices or cells of a [`Tds`](crate::core::triangulation_data_structure::Tds).
///
/// `DenseSlotMap` (the default `dense-slotmap` feature) iterates faster;
/// `SlotMap` (`--no-default-features`) removes faster.
#[cfg(not(feature = "dense-slotmap"))]
pub type StorageMap<K, V> = SlotMap<K, V>;

/// Arena holding the vertices or cells of a [`Tds`](crate::core::triangulation_data_structure::Tds).
///
/// `DenseSlotMap` (the default `dense-slotmap` feature) iterates faster;
/// `SlotMap` (`--no-default-features`) removes faster.
#[cfg(feature = "dense-slotmap")]
pub type StorageMap<K, V> = DenseSlotMap<K, V>;

// =============================================================================
// HASHING
// =============================================================================

/// Hash map with the Fx hasher.
pub type FastHashMap<K, V> = FxHashMap<K, V>;

/// Hash set with the Fx hasher.
pub type FastHashSet<T> = FxHashSet<T>;

/// Creates a [`FastHashMap`] with room for `capacity` entries.
#[must_use]
pub fn fast_hash_map_with_capacity<K, V>(capacity: usize) -> FastHashMap<K, V> {
    FastHashMap::with_capacity_and_hasher(capacity, FxBuildHasher)
}

/// Creates a [`FastHashSet`] with room for `capacity` entries.
#[must_use]
pub fn fast_hash_set_with_capacity<T>(capacity: usize) -> FastHashSet<T> {
    FastHashSet::with_capacity_and_hasher(capacity, FxBuildHasher)
}

/// Stack-first vector; spills to the heap past `N` elements.
pub type SmallBuffer<T, const N: usize> = SmallVec<[T; N]>;

// =============================================================================
// DOMAIN ALIASES
// =============================================================================

/// UUID → vertex key index.
pub type UuidToVertexKeyMap = FastHashMap<Uuid, VertexKey>;

/// UUID → cell key index.
pub type UuidToCellKeyMap = FastHashMap<Uuid, CellKey>;

/// Set of cell keys.
pub type CellKeySet = FastHashSet<CellKey>;

/// Set of vertex keys.
pub type VertexKeySet = FastHashSet<VertexKey>;

/// Cells around an edge. Most interior edges have 4 to 7 incident cells.
pub type CellKeyBuffer = SmallBuffer<CellKey, 8>;

/// Sorted vertex keys of a triangular facet, used to match facets of
/// neighboring cells.
pub type FacetVertexKeys = [VertexKey; 3];

/// Facet → `(cell, facet index)` occurrences.
pub type FacetToCellsMap = FastHashMap<FacetVertexKeys, SmallBuffer<(CellKey, u8), 2>>;

/// Side table keyed by cells, sparse so that it can be filled incrementally.
pub type CellSecondaryMap<V> = SparseSecondaryMap<CellKey, V>;

/// Side table keyed by vertices.
pub type VertexSecondaryMap<V> = SparseSecondaryMap<VertexKey, V>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_helpers_preallocate() {
        let map: FastHashMap<u32, u32> = fast_hash_map_with_capacity(64);
        assert!(map.capacity() >= 64);
        let set: FastHashSet<u32> = fast_hash_set_with_capacity(16);
        assert!(set.capacity() >= 16);
    }

    #[test]
    fn small_buffer_stays_inline_up_to_capacity() {
        let mut buf: CellKeyBuffer = SmallBuffer::new();
        for _ in 0..8 {
            buf.push(CellKey::default());
        }
        assert!(!buf.spilled());
        buf.push(CellKey::default());
        assert!(buf.spilled());
    }
}
