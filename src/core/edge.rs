//! Canonical edge identifiers.
//!
//! Edges are not stored; they are implied by the cells. [`EdgeKey`] names an
//! edge by its two endpoints with a canonical order, so `(a, b)` and
//! `(b, a)` compare and hash the same.
//!
//! The order comes from internal slotmap keys and is not stable across
//! meshes; sort by vertex UUID when a reproducible order is needed.

use crate::core::triangulation_data_structure::VertexKey;
use slotmap::Key;

/// Canonical identifier for an undirected edge.
///
/// ```rust
/// use tetra_remesh::core::edge::EdgeKey;
/// use tetra_remesh::core::triangulation_data_structure::VertexKey;
/// use slotmap::KeyData;
///
/// let a = VertexKey::from(KeyData::from_ffi(1));
/// let b = VertexKey::from(KeyData::from_ffi(2));
/// assert_eq!(EdgeKey::new(a, b), EdgeKey::new(b, a));
/// assert!(EdgeKey::new(b, a).contains(a));
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeKey {
    v0: VertexKey,
    v1: VertexKey,
}

impl EdgeKey {
    /// Creates a canonical edge key; endpoints are reordered by raw key.
    #[must_use]
    pub fn new(a: VertexKey, b: VertexKey) -> Self {
        if a.data().as_ffi() <= b.data().as_ffi() {
            Self { v0: a, v1: b }
        } else {
            Self { v0: b, v1: a }
        }
    }

    /// First endpoint in canonical order.
    #[inline]
    #[must_use]
    pub const fn v0(self) -> VertexKey {
        self.v0
    }

    /// Second endpoint in canonical order.
    #[inline]
    #[must_use]
    pub const fn v1(self) -> VertexKey {
        self.v1
    }

    /// Both endpoints.
    #[inline]
    #[must_use]
    pub const fn endpoints(self) -> (VertexKey, VertexKey) {
        (self.v0, self.v1)
    }

    /// `true` if `v` is an endpoint.
    #[inline]
    #[must_use]
    pub fn contains(self, v: VertexKey) -> bool {
        self.v0 == v || self.v1 == v
    }

    /// `true` if both endpoints are the same vertex.
    #[inline]
    #[must_use]
    pub fn is_degenerate(self) -> bool {
        self.v0 == self.v1
    }
}

impl From<(VertexKey, VertexKey)> for EdgeKey {
    fn from((a, b): (VertexKey, VertexKey)) -> Self {
        Self::new(a, b)
    }
}
