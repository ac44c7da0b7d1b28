//! Tetrahedral cells.
//!
//! A [`Cell`] references four vertices and up to four neighbors. Neighbor
//! `i` is the cell across the facet opposite vertex `i`, so the facet shared
//! with `neighbors[i]` is made of the other three vertices. Besides the
//! combinatorics a cell carries a subdomain index, an identity stamp,
//! optional user data and an optional back-reference to the cell it was
//! derived from in an input mesh.
//!
//! Vertex and neighbor keys are only meaningful inside the arena of the
//! owning [`Tds`](crate::core::Tds).

use super::{
    collections::FacetVertexKeys,
    traits::DataType,
    triangulation_data_structure::{CellKey, VertexKey},
    util::{UNSET_STAMP, UuidValidationError, validate_uuid},
};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors from [`Cell::is_valid`].
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CellValidationError {
    /// The identity stamp is unset or malformed.
    #[error("Invalid UUID: {source}")]
    InvalidUuid {
        /// Underlying UUID error.
        #[from]
        source: UuidValidationError,
    },
    /// The same vertex appears twice.
    #[error("Duplicate vertices: cell contains non-unique vertices which is not allowed")]
    DuplicateVertices,
    /// A vertex slot was never wired.
    #[error("Unwired vertex slot {index}")]
    UnwiredVertex {
        /// Slot index in `0..4`.
        index: usize,
    },
}

// =============================================================================
// SUBDOMAIN INDEX
// =============================================================================

/// Material region a cell belongs to. `0` is the outside / unassigned region.
///
/// ```
/// use tetra_remesh::core::cell::SubdomainIndex;
///
/// let inside = SubdomainIndex::from(3);
/// assert!(!inside.is_outside());
/// assert!(SubdomainIndex::default().is_outside());
/// ```
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SubdomainIndex(pub i32);

impl SubdomainIndex {
    /// The outside region.
    pub const OUTSIDE: Self = Self(0);

    /// `true` for the outside region.
    #[must_use]
    pub const fn is_outside(self) -> bool {
        self.0 == 0
    }
}

impl From<i32> for SubdomainIndex {
    fn from(value: i32) -> Self {
        Self(value)
    }
}

impl fmt::Display for SubdomainIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// CELL
// =============================================================================

/// A tetrahedron of a [`Tds`](crate::core::Tds).
///
/// `V` is the user data type (use `()` for none).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(bound(serialize = "V: DataType", deserialize = "V: DataType"))]
pub struct Cell<V>
where
    V: DataType,
{
    vertices: [VertexKey; 4],
    neighbors: [Option<CellKey>; 4],
    uuid: Uuid,
    subdomain: SubdomainIndex,
    /// Optional user data.
    #[serde(default)]
    pub data: Option<V>,
    #[serde(default)]
    input_cell: Option<CellKey>,
}

impl<V> Cell<V>
where
    V: DataType,
{
    /// Creates an unstamped cell over `vertices` with no neighbors.
    ///
    /// # Errors
    ///
    /// Returns [`CellValidationError::DuplicateVertices`] if a vertex is
    /// repeated.
    pub fn new(vertices: [VertexKey; 4]) -> Result<Self, CellValidationError> {
        let mut cell = Self::unwired(SubdomainIndex::OUTSIDE, None, None);
        cell.vertices = vertices;
        if cell.has_duplicate_vertices() {
            return Err(CellValidationError::DuplicateVertices);
        }
        Ok(cell)
    }

    /// A cell with payload but no vertices or neighbors yet.
    ///
    /// Converters produce these; the clone engine wires the combinatorics.
    #[must_use]
    pub fn unwired(
        subdomain: SubdomainIndex,
        data: Option<V>,
        input_cell: Option<CellKey>,
    ) -> Self {
        Self {
            vertices: [VertexKey::default(); 4],
            neighbors: [None; 4],
            uuid: UNSET_STAMP,
            subdomain,
            data,
            input_cell,
        }
    }

    /// Vertex keys in cell order.
    #[inline]
    #[must_use]
    pub const fn vertices(&self) -> &[VertexKey; 4] {
        &self.vertices
    }

    /// Vertex at slot `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i >= 4`.
    #[inline]
    #[must_use]
    pub const fn vertex(&self, i: usize) -> VertexKey {
        self.vertices[i]
    }

    /// Neighbor slots; slot `i` is opposite vertex `i`.
    #[inline]
    #[must_use]
    pub const fn neighbors(&self) -> &[Option<CellKey>; 4] {
        &self.neighbors
    }

    /// Neighbor opposite vertex `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i >= 4`.
    #[inline]
    #[must_use]
    pub const fn neighbor(&self, i: usize) -> Option<CellKey> {
        self.neighbors[i]
    }

    pub(crate) const fn set_vertices(&mut self, vertices: [VertexKey; 4]) {
        self.vertices = vertices;
    }

    pub(crate) const fn set_neighbor(&mut self, i: usize, neighbor: Option<CellKey>) {
        self.neighbors[i] = neighbor;
    }

    pub(crate) const fn clear_neighbors(&mut self) {
        self.neighbors = [None; 4];
    }

    /// Identity stamp.
    #[inline]
    #[must_use]
    pub const fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Resets the identity stamp to the unset sentinel.
    #[inline]
    pub const fn clear_uuid(&mut self) {
        self.uuid = UNSET_STAMP;
    }

    pub(crate) const fn set_uuid(&mut self, uuid: Uuid) {
        self.uuid = uuid;
    }

    /// Material region.
    #[inline]
    #[must_use]
    pub const fn subdomain(&self) -> SubdomainIndex {
        self.subdomain
    }

    /// Sets the material region.
    #[inline]
    pub const fn set_subdomain(&mut self, subdomain: SubdomainIndex) {
        self.subdomain = subdomain;
    }

    /// Cell of the input mesh this cell derives from, if tracked.
    ///
    /// The key belongs to the input mesh, not to the mesh owning this cell.
    #[inline]
    #[must_use]
    pub const fn input_cell(&self) -> Option<CellKey> {
        self.input_cell
    }

    /// Sets the input-mesh back-reference.
    #[inline]
    pub const fn set_input_cell(&mut self, input_cell: Option<CellKey>) {
        self.input_cell = input_cell;
    }

    /// Slot of `vertex` in this cell.
    #[must_use]
    pub fn index_of(&self, vertex: VertexKey) -> Option<usize> {
        self.vertices.iter().position(|&v| v == vertex)
    }

    /// `true` if `vertex` is one of the four vertices.
    #[must_use]
    pub fn contains_vertex(&self, vertex: VertexKey) -> bool {
        self.vertices.contains(&vertex)
    }

    /// Slot of `neighbor` among the neighbor slots.
    #[must_use]
    pub fn neighbor_index(&self, neighbor: CellKey) -> Option<usize> {
        self.neighbors.iter().position(|&n| n == Some(neighbor))
    }

    /// The three vertices of the facet opposite vertex `i`, in cell order.
    #[must_use]
    pub fn facet_vertices(&self, i: usize) -> [VertexKey; 3] {
        let mut out = [VertexKey::default(); 3];
        let mut k = 0;
        for (j, &v) in self.vertices.iter().enumerate() {
            if j != i {
                out[k] = v;
                k += 1;
            }
        }
        out
    }

    /// Order-independent key of the facet opposite vertex `i`.
    #[must_use]
    pub fn facet_key(&self, i: usize) -> FacetVertexKeys {
        let mut key = self.facet_vertices(i);
        key.sort_unstable();
        key
    }

    /// `true` if some vertex appears twice.
    #[must_use]
    pub fn has_duplicate_vertices(&self) -> bool {
        (0..4).any(|i| (i + 1..4).any(|j| self.vertices[i] == self.vertices[j]))
    }

    /// Checks the identity stamp and the vertex slots.
    ///
    /// # Errors
    ///
    /// Returns [`CellValidationError`] for an unset stamp, an unwired vertex
    /// slot or a repeated vertex.
    pub fn is_valid(&self) -> Result<(), CellValidationError> {
        validate_uuid(&self.uuid)?;
        if let Some(index) = self.vertices.iter().position(|v| *v == VertexKey::default()) {
            return Err(CellValidationError::UnwiredVertex { index });
        }
        if self.has_duplicate_vertices() {
            return Err(CellValidationError::DuplicateVertices);
        }
        Ok(())
    }
}
