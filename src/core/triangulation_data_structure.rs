//! Combinatorial storage for 3D tetrahedral meshes.
//!
//! [`Tds`] owns the vertices and cells of a mesh in two slotmap arenas and
//! keeps the incidence and adjacency between them. It follows the layout of
//! [CGAL's 3D triangulation data structure](https://doc.cgal.org/latest/TDS_3/index.html):
//!
//! - The mesh is closed by a single **infinite vertex**. It owns no point and
//!   is shared by one **infinite cell** per boundary facet, so every facet of
//!   a valid mesh is shared by exactly two cells.
//! - Cells store four vertex keys and four neighbor slots; neighbor `i` lies
//!   across the facet opposite vertex `i`.
//! - Each vertex stores one incident cell. The full star of a vertex is
//!   recovered by walking neighbors from it.
//!
//! Handles are slotmap keys. A key stays valid until its element is removed;
//! stale keys are detected by the `contains_*` and `get_*` accessors.
//!
//! # Invariants
//!
//! | Invariant | Checked by |
//! |---|---|
//! | UUID ↔ key maps agree with the arenas | `validate_vertex_mappings`, `validate_cell_mappings` |
//! | Cells have four distinct, live vertices and a stamp | `validate_cells` |
//! | Each facet is shared by at most two cells | `validate_facet_sharing` |
//! | Adjacency is symmetric and neighbors share the opposite facet | `validate_neighbors` |
//! | Vertices point at a live incident cell; only the infinite vertex lacks a point | `validate_vertex_incidence` |
//!
//! # Examples
//!
//! ```rust
//! use tetra_remesh::prelude::*;
//!
//! let tds: Tds<FastKernel<f64>> = MeshBuilder::new()
//!     .points([[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]])
//!     .tetrahedra([[0, 1, 2, 3]])
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(tds.number_of_vertices(), 5); // four finite + the infinite vertex
//! assert_eq!(tds.number_of_finite_cells(), 1);
//! assert_eq!(tds.number_of_cells(), 5); // one infinite cell per boundary facet
//! assert!(tds.is_valid().is_ok());
//! ```

// =============================================================================
// IMPORTS
// =============================================================================

use std::fmt::Debug;

use slotmap::new_key_type;
use thiserror::Error;
use uuid::Uuid;

use crate::core::collections::{
    CellKeyBuffer, CellKeySet, Entry, FacetToCellsMap, FastHashMap, FastHashSet, SmallBuffer,
    StorageMap,
    UuidToCellKeyMap, UuidToVertexKeyMap, fast_hash_map_with_capacity,
    fast_hash_set_with_capacity,
};
use crate::core::{
    cell::{Cell, CellValidationError},
    edge::EdgeKey,
    facet::{FacetError, FacetHandle},
    traits::DataType,
    util::make_uuid,
    vertex::{Vertex, VertexValidationError},
};
use crate::geometry::kernel::Kernel;
use crate::geometry::point::Point;

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Kind of element an error refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// A vertex.
    Vertex,
    /// A cell.
    Cell,
}

/// Errors raised by the structural edit primitives of [`Tds`].
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TdsMutationError {
    /// An element with this stamp is already stored.
    #[error("Duplicate UUID: {entity:?} with UUID {uuid} already exists")]
    DuplicateUuid {
        /// Kind of element.
        entity: EntityKind,
        /// The duplicated stamp.
        uuid: Uuid,
    },
    /// A vertex key does not belong to this mesh (or was removed).
    #[error("Vertex {key:?} not found")]
    VertexNotFound {
        /// The stale key.
        key: VertexKey,
    },
    /// A cell key does not belong to this mesh (or was removed).
    #[error("Cell {key:?} not found")]
    CellNotFound {
        /// The stale key.
        key: CellKey,
    },
    /// The cell cannot be stored.
    #[error("Invalid cell: {source}")]
    InvalidCell {
        /// Underlying cell error.
        #[from]
        source: CellValidationError,
    },
    /// A facet handle does not fit the mesh.
    #[error("Invalid facet: {source}")]
    InvalidFacet {
        /// Underlying facet error.
        #[from]
        source: FacetError,
    },
    /// A vertex still belongs to cells and cannot be removed.
    #[error("Vertex {key:?} is still used by {cells} cell(s)")]
    VertexInUse {
        /// The vertex.
        key: VertexKey,
        /// Number of cells referencing it.
        cells: usize,
    },
    /// The operation would create a second infinite vertex or remove the only one.
    #[error("Infinite vertex misuse: {message}")]
    InfiniteVertex {
        /// What was attempted.
        message: String,
    },
}

/// Errors reported by [`Tds::is_valid`] and [`Tds::validation_report`].
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TriangulationValidationError {
    /// A cell fails its own checks.
    #[error("Invalid cell {cell_id}: {source}")]
    InvalidCell {
        /// Stamp of the cell.
        cell_id: Uuid,
        /// Underlying cell error.
        source: CellValidationError,
    },
    /// A vertex fails its own checks.
    #[error("Invalid vertex {vertex_id}: {source}")]
    InvalidVertex {
        /// Stamp of the vertex.
        vertex_id: Uuid,
        /// Underlying vertex error.
        source: VertexValidationError,
    },
    /// Neighbor slots are empty, dangling, asymmetric, or disagree with the
    /// shared facet.
    #[error("Invalid neighbor relationships: {message}")]
    InvalidNeighbors {
        /// Description of the failure.
        message: String,
    },
    /// A facet is shared by more than two cells.
    #[error("Invalid facet sharing: {message}")]
    InvalidFacetSharing {
        /// Description of the failure.
        message: String,
    },
    /// UUID ↔ key maps disagree with the arenas.
    #[error("{entity:?} mapping inconsistency: {message}")]
    MappingInconsistency {
        /// Kind of element.
        entity: EntityKind,
        /// Description of the failure.
        message: String,
    },
    /// The cells do not form one piece, or a vertex star splits into
    /// several fans.
    #[error("Mesh is not connected: {message}")]
    Disconnected {
        /// Description of the failure.
        message: String,
    },
    /// Vertex incidence is broken (missing point, stale incident cell, ...).
    #[error("Internal data structure inconsistency: {message}")]
    InconsistentDataStructure {
        /// Description of the failure.
        message: String,
    },
}

/// Groups validation errors in a [`TriangulationValidationReport`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum InvariantKind {
    /// Vertex UUID ↔ key map.
    VertexMappings,
    /// Cell UUID ↔ key map.
    CellMappings,
    /// Per-vertex validity (finite coordinates, stamp).
    VertexValidity,
    /// Per-cell validity (distinct live vertices, stamp).
    CellValidity,
    /// Each facet shared by at most two cells.
    FacetSharing,
    /// Symmetric adjacency across shared facets, no open slots.
    NeighborConsistency,
    /// One connected complex; every vertex star is a single fan.
    Connectivity,
    /// Incident-cell hints and point presence.
    VertexIncidence,
}

/// One violated invariant.
#[derive(Clone, Debug)]
pub struct InvariantViolation {
    /// Which invariant failed.
    pub kind: InvariantKind,
    /// The first error found for it.
    pub error: TriangulationValidationError,
}

/// All invariants violated by a mesh, in check order.
#[derive(Clone, Debug)]
pub struct TriangulationValidationReport {
    /// The violations.
    pub violations: Vec<InvariantViolation>,
}

impl TriangulationValidationReport {
    /// `true` if nothing was recorded.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    /// `true` if an invariant of `kind` failed.
    #[must_use]
    pub fn contains(&self, kind: InvariantKind) -> bool {
        self.violations.iter().any(|v| v.kind == kind)
    }
}

// =============================================================================
// KEYS
// =============================================================================

new_key_type! {
    /// Handle of a vertex in a [`Tds`].
    pub struct VertexKey;
}

new_key_type! {
    /// Handle of a cell in a [`Tds`].
    pub struct CellKey;
}

// =============================================================================
// TDS
// =============================================================================

/// Arena-backed tetrahedral mesh closed by an infinite vertex.
///
/// # Generic Parameters
///
/// * `K` - geometric kernel; fixes the coordinate scalar
/// * `U` - vertex data type
/// * `V` - cell data type
#[derive(Clone, Debug)]
pub struct Tds<K, U = (), V = ()>
where
    K: Kernel,
    U: DataType,
    V: DataType,
{
    vertices: StorageMap<VertexKey, Vertex<K::Scalar, U>>,
    cells: StorageMap<CellKey, Cell<V>>,
    pub(crate) uuid_to_vertex_key: UuidToVertexKeyMap,
    pub(crate) uuid_to_cell_key: UuidToCellKeyMap,
    infinite_vertex: VertexKey,
    kernel: K,
    generation: u64,
}

impl<K, U, V> Default for Tds<K, U, V>
where
    K: Kernel,
    U: DataType,
    V: DataType,
{
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// CONSTRUCTION AND BULK STATE
// =============================================================================

impl<K, U, V> Tds<K, U, V>
where
    K: Kernel,
    U: DataType,
    V: DataType,
{
    /// Creates a mesh holding only the infinite vertex.
    #[must_use]
    pub fn new() -> Self {
        Self::with_kernel(K::default())
    }

    /// Creates an empty mesh with an explicit kernel instance.
    #[must_use]
    pub fn with_kernel(kernel: K) -> Self {
        let mut tds = Self {
            vertices: StorageMap::with_key(),
            cells: StorageMap::with_key(),
            uuid_to_vertex_key: UuidToVertexKeyMap::default(),
            uuid_to_cell_key: UuidToCellKeyMap::default(),
            infinite_vertex: VertexKey::default(),
            kernel,
            generation: 0,
        };
        let uuid = make_uuid();
        let mut sentinel = Vertex::empty();
        sentinel.set_uuid(uuid);
        tds.infinite_vertex = tds.vertices.insert(sentinel);
        tds.uuid_to_vertex_key.insert(uuid, tds.infinite_vertex);
        tds
    }

    /// The kernel used for geometric constructions on this mesh.
    #[inline]
    #[must_use]
    pub const fn kernel(&self) -> &K {
        &self.kernel
    }

    /// Removes every cell and finite vertex.
    ///
    /// The infinite vertex survives with the same key, reset to the empty
    /// sentinel under a fresh stamp.
    pub fn clear(&mut self) {
        let infinite = self.infinite_vertex;
        self.cells.clear();
        self.vertices.retain(|key, _| key == infinite);
        self.uuid_to_cell_key.clear();
        self.uuid_to_vertex_key.clear();
        self.replace_infinite_vertex(Vertex::empty());
        tracing::trace!(generation = self.generation, "cleared mesh");
    }

    /// Overwrites the infinite vertex in place, keeping its key.
    ///
    /// The point is dropped and the stamp replaced with a fresh one.
    pub(crate) fn replace_infinite_vertex(&mut self, mut vertex: Vertex<K::Scalar, U>) {
        let key = self.infinite_vertex;
        if let Some(old) = self.vertices.get(key) {
            self.uuid_to_vertex_key.remove(&old.uuid());
        }
        let uuid = make_uuid();
        vertex.set_point(None);
        vertex.set_uuid(uuid);
        vertex.incident_cell = self
            .vertices
            .get(key)
            .and_then(|v| v.incident_cell)
            .filter(|c| self.cells.contains_key(*c));
        if let Some(slot) = self.vertices.get_mut(key) {
            *slot = vertex;
        } else {
            self.infinite_vertex = self.vertices.insert(vertex);
        }
        self.uuid_to_vertex_key.insert(uuid, self.infinite_vertex);
        self.bump_generation();
    }

    /// Structural change counter. Any insertion, removal or rewiring bumps it.
    #[inline]
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    const fn bump_generation(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }

    /// `-1` for a mesh without cells, `3` otherwise.
    #[must_use]
    pub fn dimension(&self) -> i32 {
        if self.cells.is_empty() { -1 } else { 3 }
    }
}

// =============================================================================
// QUERIES
// =============================================================================

impl<K, U, V> Tds<K, U, V>
where
    K: Kernel,
    U: DataType,
    V: DataType,
{
    /// Key of the infinite vertex.
    #[inline]
    #[must_use]
    pub const fn infinite_vertex(&self) -> VertexKey {
        self.infinite_vertex
    }

    /// `true` if `key` is the infinite vertex.
    #[inline]
    #[must_use]
    pub fn is_infinite_vertex(&self, key: VertexKey) -> bool {
        key == self.infinite_vertex
    }

    /// `true` if the cell contains the infinite vertex. Unknown keys are
    /// reported as finite.
    #[must_use]
    pub fn is_infinite_cell(&self, key: CellKey) -> bool {
        self.cells
            .get(key)
            .is_some_and(|c| c.contains_vertex(self.infinite_vertex))
    }

    /// `true` if one endpoint is the infinite vertex.
    #[must_use]
    pub fn is_infinite_edge(&self, edge: EdgeKey) -> bool {
        edge.contains(self.infinite_vertex)
    }

    /// Number of vertices, the infinite vertex included.
    #[must_use]
    pub fn number_of_vertices(&self) -> usize {
        self.vertices.len()
    }

    /// Number of vertices with a point.
    #[must_use]
    pub fn number_of_finite_vertices(&self) -> usize {
        self.vertices.len().saturating_sub(1)
    }

    /// Number of cells, infinite cells included.
    #[must_use]
    pub fn number_of_cells(&self) -> usize {
        self.cells.len()
    }

    /// Number of cells not containing the infinite vertex.
    #[must_use]
    pub fn number_of_finite_cells(&self) -> usize {
        self.finite_cells().count()
    }

    /// All vertices with their keys.
    pub fn vertices(&self) -> impl Iterator<Item = (VertexKey, &Vertex<K::Scalar, U>)> {
        self.vertices.iter()
    }

    /// Vertices other than the infinite vertex.
    pub fn finite_vertices(&self) -> impl Iterator<Item = (VertexKey, &Vertex<K::Scalar, U>)> {
        let infinite = self.infinite_vertex;
        self.vertices.iter().filter(move |(k, _)| *k != infinite)
    }

    /// All vertex keys.
    pub fn vertex_keys(&self) -> impl Iterator<Item = VertexKey> + '_ {
        self.vertices.keys()
    }

    /// All cells with their keys.
    pub fn cells(&self) -> impl Iterator<Item = (CellKey, &Cell<V>)> {
        self.cells.iter()
    }

    /// Cells that do not contain the infinite vertex.
    pub fn finite_cells(&self) -> impl Iterator<Item = (CellKey, &Cell<V>)> {
        let infinite = self.infinite_vertex;
        self.cells
            .iter()
            .filter(move |(_, c)| !c.contains_vertex(infinite))
    }

    /// All cell keys.
    pub fn cell_keys(&self) -> impl Iterator<Item = CellKey> + '_ {
        self.cells.keys()
    }

    /// Vertex by key.
    #[must_use]
    pub fn get_vertex(&self, key: VertexKey) -> Option<&Vertex<K::Scalar, U>> {
        self.vertices.get(key)
    }

    /// Mutable vertex by key. Changing the stamp through this handle is not
    /// possible; payload, dimension and point are.
    #[must_use]
    pub fn get_vertex_mut(&mut self, key: VertexKey) -> Option<&mut Vertex<K::Scalar, U>> {
        self.vertices.get_mut(key)
    }

    /// Point of a vertex; `None` for the infinite vertex or a stale key.
    #[must_use]
    pub fn point(&self, key: VertexKey) -> Option<&Point<K::Scalar, 3>> {
        self.vertices.get(key).and_then(Vertex::point)
    }

    /// Cell by key.
    #[must_use]
    pub fn get_cell(&self, key: CellKey) -> Option<&Cell<V>> {
        self.cells.get(key)
    }

    /// Mutable cell by key. Vertex and neighbor slots are only editable
    /// through the `Tds` primitives.
    #[must_use]
    pub fn get_cell_mut(&mut self, key: CellKey) -> Option<&mut Cell<V>> {
        self.cells.get_mut(key)
    }

    /// `true` if the vertex key is live.
    #[must_use]
    pub fn contains_vertex(&self, key: VertexKey) -> bool {
        self.vertices.contains_key(key)
    }

    /// `true` if the cell key is live.
    #[must_use]
    pub fn contains_cell(&self, key: CellKey) -> bool {
        self.cells.contains_key(key)
    }

    /// Vertex key for a stamp.
    #[must_use]
    pub fn vertex_key_from_uuid(&self, uuid: &Uuid) -> Option<VertexKey> {
        self.uuid_to_vertex_key.get(uuid).copied()
    }

    /// Cell key for a stamp.
    #[must_use]
    pub fn cell_key_from_uuid(&self, uuid: &Uuid) -> Option<CellKey> {
        self.uuid_to_cell_key.get(uuid).copied()
    }

    /// Slot of `vertex` in `cell`.
    #[must_use]
    pub fn index_of(&self, cell: CellKey, vertex: VertexKey) -> Option<usize> {
        self.cells.get(cell).and_then(|c| c.index_of(vertex))
    }

    /// Slot of `cell` in the neighbor list of its neighbor `i`.
    #[must_use]
    pub fn mirror_index(&self, cell: CellKey, i: usize) -> Option<usize> {
        let neighbor = self.cells.get(cell)?.neighbors().get(i).copied().flatten()?;
        self.cells.get(neighbor)?.neighbor_index(cell)
    }

    /// The same facet seen from the other side.
    #[must_use]
    pub fn mirror_facet(&self, facet: FacetHandle) -> Option<FacetHandle> {
        let i = facet.checked_index().ok()?;
        let neighbor = self.cells.get(facet.cell_key())?.neighbor(i)?;
        let j = self.mirror_index(facet.cell_key(), i)?;
        u8::try_from(j).ok().map(|j| FacetHandle::new(neighbor, j))
    }

    /// Cells containing `vertex`.
    ///
    /// Walks the star from the vertex's incident cell across facets that
    /// contain the vertex. Falls back to a scan when the hint is missing.
    #[must_use]
    pub fn incident_cells(&self, vertex: VertexKey) -> Vec<CellKey> {
        let hint = self
            .vertices
            .get(vertex)
            .and_then(|v| v.incident_cell)
            .filter(|&c| {
                self.cells
                    .get(c)
                    .is_some_and(|cell| cell.contains_vertex(vertex))
            });

        let Some(start) = hint else {
            return self
                .cells
                .iter()
                .filter(|(_, c)| c.contains_vertex(vertex))
                .map(|(k, _)| k)
                .collect();
        };

        let mut visited: CellKeySet = fast_hash_set_with_capacity(32);
        let mut stack: SmallBuffer<CellKey, 32> = SmallBuffer::new();
        let mut star = Vec::new();
        visited.insert(start);
        stack.push(start);
        while let Some(current) = stack.pop() {
            star.push(current);
            let Some(cell) = self.cells.get(current) else {
                continue;
            };
            for (i, neighbor) in cell.neighbors().iter().enumerate() {
                // Only facets containing the vertex stay inside its star.
                if cell.vertex(i) == vertex {
                    continue;
                }
                if let Some(n) = *neighbor
                    && self.cells.get(n).is_some_and(|c| c.contains_vertex(vertex))
                    && visited.insert(n)
                {
                    stack.push(n);
                }
            }
        }
        star
    }

    /// Cells containing both endpoints of `edge`.
    #[must_use]
    pub fn cells_around_edge(&self, edge: EdgeKey) -> CellKeyBuffer {
        self.incident_cells(edge.v0())
            .into_iter()
            .filter(|&c| {
                self.cells
                    .get(c)
                    .is_some_and(|cell| cell.contains_vertex(edge.v1()))
            })
            .collect()
    }

    /// `true` if some cell contains both vertices.
    #[must_use]
    pub fn has_edge(&self, a: VertexKey, b: VertexKey) -> bool {
        a != b && !self.cells_around_edge(EdgeKey::new(a, b)).is_empty()
    }

    /// A handle to the facet `abc`, if some cell has it.
    #[must_use]
    pub fn has_facet(&self, a: VertexKey, b: VertexKey, c: VertexKey) -> Option<FacetHandle> {
        self.incident_cells(a).into_iter().find_map(|ck| {
            let cell = self.cells.get(ck)?;
            if !(cell.contains_vertex(b) && cell.contains_vertex(c)) {
                return None;
            }
            let opposite = cell
                .vertices()
                .iter()
                .position(|&v| v != a && v != b && v != c)?;
            u8::try_from(opposite)
                .ok()
                .map(|i| FacetHandle::new(ck, i))
        })
    }

    /// Every edge of the mesh, infinite edges included.
    #[must_use]
    pub fn edges(&self) -> FastHashSet<EdgeKey> {
        let mut edges = fast_hash_set_with_capacity(self.cells.len() * 2);
        for cell in self.cells.values() {
            let v = cell.vertices();
            for i in 0..4 {
                for j in (i + 1)..4 {
                    edges.insert(EdgeKey::new(v[i], v[j]));
                }
            }
        }
        edges
    }

    /// Edges between two finite vertices.
    #[must_use]
    pub fn finite_edges(&self) -> Vec<EdgeKey> {
        self.edges()
            .into_iter()
            .filter(|e| !self.is_infinite_edge(*e))
            .collect()
    }
}

// =============================================================================
// EDIT PRIMITIVES
// =============================================================================

impl<K, U, V> Tds<K, U, V>
where
    K: Kernel,
    U: DataType,
    V: DataType,
{
    /// Stores a finite vertex.
    ///
    /// An unset stamp is replaced with a fresh one. The incident-cell hint
    /// is cleared.
    ///
    /// # Errors
    ///
    /// Returns [`TdsMutationError::InfiniteVertex`] if the vertex has no
    /// point, and [`TdsMutationError::DuplicateUuid`] if its stamp is taken.
    pub fn insert_vertex(
        &mut self,
        mut vertex: Vertex<K::Scalar, U>,
    ) -> Result<VertexKey, TdsMutationError> {
        if vertex.is_infinite() {
            return Err(TdsMutationError::InfiniteVertex {
                message: "a mesh has exactly one vertex without a point".to_string(),
            });
        }
        if vertex.uuid().is_nil() {
            vertex.set_uuid(make_uuid());
        }
        vertex.incident_cell = None;

        let uuid = vertex.uuid();
        match self.uuid_to_vertex_key.entry(uuid) {
            Entry::Occupied(_) => Err(TdsMutationError::DuplicateUuid {
                entity: EntityKind::Vertex,
                uuid,
            }),
            Entry::Vacant(e) => {
                let key = self.vertices.insert(vertex);
                e.insert(key);
                self.bump_generation();
                Ok(key)
            }
        }
    }

    /// Stores a cell over live vertices, with empty neighbor slots.
    ///
    /// An unset stamp is replaced with a fresh one. Vertices without a live
    /// incident cell adopt the new cell.
    ///
    /// # Errors
    ///
    /// Returns [`TdsMutationError::VertexNotFound`] for a stale vertex key,
    /// [`TdsMutationError::InvalidCell`] for repeated vertices and
    /// [`TdsMutationError::DuplicateUuid`] if the stamp is taken.
    pub fn insert_cell(&mut self, mut cell: Cell<V>) -> Result<CellKey, TdsMutationError> {
        for &v in cell.vertices() {
            if !self.vertices.contains_key(v) {
                return Err(TdsMutationError::VertexNotFound { key: v });
            }
        }
        if cell.has_duplicate_vertices() {
            return Err(CellValidationError::DuplicateVertices.into());
        }
        if cell.uuid().is_nil() {
            cell.set_uuid(make_uuid());
        }
        cell.clear_neighbors();

        let uuid = cell.uuid();
        let vertices = *cell.vertices();
        let key = match self.uuid_to_cell_key.entry(uuid) {
            Entry::Occupied(_) => {
                return Err(TdsMutationError::DuplicateUuid {
                    entity: EntityKind::Cell,
                    uuid,
                });
            }
            Entry::Vacant(e) => {
                let key = self.cells.insert(cell);
                e.insert(key);
                key
            }
        };

        for v in vertices {
            if let Some(vertex) = self.vertices.get_mut(v) {
                let live = vertex
                    .incident_cell
                    .is_some_and(|c| self.cells.contains_key(c));
                if !live {
                    vertex.incident_cell = Some(key);
                }
            }
        }
        self.bump_generation();
        Ok(key)
    }

    /// Removes a cell.
    ///
    /// Neighbors lose their slot pointing at it; vertices whose hint was this
    /// cell move to a surviving neighbor that contains them, if any.
    pub fn remove_cell(&mut self, key: CellKey) -> Option<Cell<V>> {
        let cell = self.cells.remove(key)?;
        self.uuid_to_cell_key.remove(&cell.uuid());

        for neighbor in cell.neighbors().iter().flatten() {
            if let Some(n) = self.cells.get_mut(*neighbor) {
                for j in 0..4 {
                    if n.neighbor(j) == Some(key) {
                        n.set_neighbor(j, None);
                    }
                }
            }
        }

        for &v in cell.vertices() {
            let Some(vertex) = self.vertices.get(v) else {
                continue;
            };
            if vertex.incident_cell != Some(key) {
                continue;
            }
            let replacement = cell.neighbors().iter().flatten().copied().find(|&n| {
                self.cells
                    .get(n)
                    .is_some_and(|c| c.contains_vertex(v))
            });
            if let Some(vertex) = self.vertices.get_mut(v) {
                vertex.incident_cell = replacement;
            }
        }

        self.bump_generation();
        Some(cell)
    }

    /// Removes a finite vertex that no cell references.
    ///
    /// # Errors
    ///
    /// Returns [`TdsMutationError::InfiniteVertex`] for the infinite vertex,
    /// [`TdsMutationError::VertexNotFound`] for a stale key and
    /// [`TdsMutationError::VertexInUse`] while cells still reference it.
    pub fn remove_vertex(
        &mut self,
        key: VertexKey,
    ) -> Result<Vertex<K::Scalar, U>, TdsMutationError> {
        if self.is_infinite_vertex(key) {
            return Err(TdsMutationError::InfiniteVertex {
                message: "the infinite vertex cannot be removed".to_string(),
            });
        }
        if !self.vertices.contains_key(key) {
            return Err(TdsMutationError::VertexNotFound { key });
        }
        let users = self
            .cells
            .values()
            .filter(|c| c.contains_vertex(key))
            .count();
        if users > 0 {
            return Err(TdsMutationError::VertexInUse { key, cells: users });
        }
        let vertex = self
            .vertices
            .remove(key)
            .ok_or(TdsMutationError::VertexNotFound { key })?;
        self.uuid_to_vertex_key.remove(&vertex.uuid());
        self.bump_generation();
        Ok(vertex)
    }

    /// Makes `c1` and `c2` neighbors across the facets opposite `i1` and `i2`.
    ///
    /// # Errors
    ///
    /// Returns [`TdsMutationError::CellNotFound`] for a stale key and
    /// [`TdsMutationError::InvalidFacet`] for an index outside `0..4`.
    pub fn set_adjacency(
        &mut self,
        c1: CellKey,
        i1: usize,
        c2: CellKey,
        i2: usize,
    ) -> Result<(), TdsMutationError> {
        for (cell, index) in [(c1, i1), (c2, i2)] {
            if !self.cells.contains_key(cell) {
                return Err(TdsMutationError::CellNotFound { key: cell });
            }
            if index >= 4 {
                return Err(FacetError::InvalidFacetIndex {
                    index: u8::try_from(index).unwrap_or(u8::MAX),
                }
                .into());
            }
        }
        self.set_neighbor(c1, i1, Some(c2));
        self.set_neighbor(c2, i2, Some(c1));
        self.bump_generation();
        Ok(())
    }

    /// Writes one neighbor slot without touching the other side.
    pub(crate) fn set_neighbor(&mut self, cell: CellKey, i: usize, neighbor: Option<CellKey>) {
        if let Some(c) = self.cells.get_mut(cell) {
            c.set_neighbor(i, neighbor);
        }
    }

    /// Points the vertex's incident-cell hint at `cell`.
    pub(crate) fn set_incident_cell(&mut self, vertex: VertexKey, cell: Option<CellKey>) {
        if let Some(v) = self.vertices.get_mut(vertex) {
            v.incident_cell = cell;
        }
    }

    /// Recomputes every incident-cell hint from scratch.
    pub fn assign_incident_cells(&mut self) {
        for vertex in self.vertices.values_mut() {
            vertex.incident_cell = None;
        }
        for (key, cell) in &self.cells {
            for &v in cell.vertices() {
                if let Some(vertex) = self.vertices.get_mut(v)
                    && vertex.incident_cell.is_none()
                {
                    vertex.incident_cell = Some(key);
                }
            }
        }
        self.bump_generation();
    }

    /// Builds the facet → cells incidence of the whole mesh.
    #[must_use]
    pub fn build_facet_to_cells_map(&self) -> FacetToCellsMap {
        let mut map: FacetToCellsMap = fast_hash_map_with_capacity(self.cells.len() * 2);
        for (key, cell) in &self.cells {
            for i in 0..4u8 {
                map.entry(cell.facet_key(usize::from(i)))
                    .or_default()
                    .push((key, i));
            }
        }
        map
    }
}

// =============================================================================
// VALIDATION
// =============================================================================

impl<K, U, V> Tds<K, U, V>
where
    K: Kernel,
    U: DataType,
    V: DataType,
{
    /// Checks that the vertex UUID map is a bijection onto the arena.
    ///
    /// # Errors
    ///
    /// Returns [`TriangulationValidationError::MappingInconsistency`].
    pub fn validate_vertex_mappings(&self) -> Result<(), TriangulationValidationError> {
        if self.uuid_to_vertex_key.len() != self.vertices.len() {
            return Err(TriangulationValidationError::MappingInconsistency {
                entity: EntityKind::Vertex,
                message: format!(
                    "{} UUID mappings for {} vertices",
                    self.uuid_to_vertex_key.len(),
                    self.vertices.len()
                ),
            });
        }
        for (key, vertex) in &self.vertices {
            if self.uuid_to_vertex_key.get(&vertex.uuid()) != Some(&key) {
                return Err(TriangulationValidationError::MappingInconsistency {
                    entity: EntityKind::Vertex,
                    message: format!("vertex {key:?} is not mapped by its UUID {}", vertex.uuid()),
                });
            }
        }
        if !self.vertices.contains_key(self.infinite_vertex) {
            return Err(TriangulationValidationError::MappingInconsistency {
                entity: EntityKind::Vertex,
                message: "infinite vertex key is stale".to_string(),
            });
        }
        Ok(())
    }

    /// Checks that the cell UUID map is a bijection onto the arena.
    ///
    /// # Errors
    ///
    /// Returns [`TriangulationValidationError::MappingInconsistency`].
    pub fn validate_cell_mappings(&self) -> Result<(), TriangulationValidationError> {
        if self.uuid_to_cell_key.len() != self.cells.len() {
            return Err(TriangulationValidationError::MappingInconsistency {
                entity: EntityKind::Cell,
                message: format!(
                    "{} UUID mappings for {} cells",
                    self.uuid_to_cell_key.len(),
                    self.cells.len()
                ),
            });
        }
        for (key, cell) in &self.cells {
            if self.uuid_to_cell_key.get(&cell.uuid()) != Some(&key) {
                return Err(TriangulationValidationError::MappingInconsistency {
                    entity: EntityKind::Cell,
                    message: format!("cell {key:?} is not mapped by its UUID {}", cell.uuid()),
                });
            }
        }
        Ok(())
    }

    /// Runs [`Vertex::is_valid`] on every vertex.
    ///
    /// # Errors
    ///
    /// Returns [`TriangulationValidationError::InvalidVertex`] for the first
    /// failing vertex.
    pub fn validate_vertices(&self) -> Result<(), TriangulationValidationError> {
        for vertex in self.vertices.values() {
            vertex
                .is_valid()
                .map_err(|source| TriangulationValidationError::InvalidVertex {
                    vertex_id: vertex.uuid(),
                    source,
                })?;
        }
        Ok(())
    }

    /// Runs [`Cell::is_valid`] on every cell and checks that its vertices
    /// are live.
    ///
    /// # Errors
    ///
    /// Returns [`TriangulationValidationError::InvalidCell`] or
    /// [`TriangulationValidationError::InconsistentDataStructure`].
    pub fn validate_cells(&self) -> Result<(), TriangulationValidationError> {
        for (key, cell) in &self.cells {
            cell.is_valid()
                .map_err(|source| TriangulationValidationError::InvalidCell {
                    cell_id: cell.uuid(),
                    source,
                })?;
            if let Some(v) = cell.vertices().iter().find(|v| !self.vertices.contains_key(**v)) {
                return Err(TriangulationValidationError::InconsistentDataStructure {
                    message: format!("cell {key:?} references missing vertex {v:?}"),
                });
            }
        }
        Ok(())
    }

    /// Checks that no facet belongs to more than two cells.
    ///
    /// # Errors
    ///
    /// Returns [`TriangulationValidationError::InvalidFacetSharing`].
    pub fn validate_facet_sharing(&self) -> Result<(), TriangulationValidationError> {
        for (facet, sharing) in self.build_facet_to_cells_map() {
            if sharing.len() > 2 {
                return Err(TriangulationValidationError::InvalidFacetSharing {
                    message: format!(
                        "facet {facet:?} is shared by {} cells: {:?}",
                        sharing.len(),
                        sharing.iter().map(|(c, _)| *c).collect::<Vec<_>>()
                    ),
                });
            }
        }
        Ok(())
    }

    /// Checks adjacency: every slot is filled, neighbors exist, point back,
    /// share the facet opposite the slot, and cells sharing a facet are
    /// linked.
    ///
    /// A mesh with cells is closed by its infinite cells, so an empty slot is
    /// an open facet.
    ///
    /// # Errors
    ///
    /// Returns [`TriangulationValidationError::InvalidNeighbors`].
    pub fn validate_neighbors(&self) -> Result<(), TriangulationValidationError> {
        let invalid = |message: String| TriangulationValidationError::InvalidNeighbors { message };

        for (key, cell) in &self.cells {
            for i in 0..4 {
                let Some(n) = cell.neighbor(i) else {
                    return Err(invalid(format!(
                        "cell {key:?} has no neighbor {i}; facet is open"
                    )));
                };
                if n == key {
                    return Err(invalid(format!("cell {key:?} is its own neighbor {i}")));
                }
                if (0..i).any(|j| cell.neighbor(j) == Some(n)) {
                    return Err(invalid(format!(
                        "cell {key:?} lists {n:?} in two neighbor slots"
                    )));
                }
                let Some(other) = self.cells.get(n) else {
                    return Err(invalid(format!(
                        "cell {key:?} neighbor {i} is the missing cell {n:?}"
                    )));
                };
                let Some(j) = other.neighbor_index(key) else {
                    return Err(invalid(format!(
                        "cell {key:?} lists {n:?} as neighbor {i}, but not vice versa"
                    )));
                };
                if cell.facet_key(i) != other.facet_key(j) {
                    return Err(invalid(format!(
                        "cells {key:?} and {n:?} are neighbors but do not share the facet opposite slot {i}"
                    )));
                }
            }
        }

        for (facet, sharing) in self.build_facet_to_cells_map() {
            if let [(c1, i1), (c2, i2)] = sharing.as_slice()
                && (self.cells[*c1].neighbor(usize::from(*i1)) != Some(*c2)
                    || self.cells[*c2].neighbor(usize::from(*i2)) != Some(*c1))
            {
                return Err(invalid(format!(
                    "cells {c1:?} and {c2:?} share facet {facet:?} but are not linked"
                )));
            }
        }
        Ok(())
    }

    /// Checks that the cells form one piece and that the star of every
    /// vertex is a single fan.
    ///
    /// Two tetrahedra touching at a vertex, or two disjoint ones, give the
    /// infinite vertex a split star even when every facet is matched.
    ///
    /// # Errors
    ///
    /// Returns [`TriangulationValidationError::Disconnected`].
    pub fn validate_connectivity(&self) -> Result<(), TriangulationValidationError> {
        let disconnected = |message: String| TriangulationValidationError::Disconnected { message };
        let Some(start) = self.cells.keys().next() else {
            return Ok(());
        };

        let mut reached: CellKeySet = fast_hash_set_with_capacity(self.cells.len());
        let mut stack: Vec<CellKey> = vec![start];
        reached.insert(start);
        while let Some(current) = stack.pop() {
            let Some(cell) = self.cells.get(current) else {
                continue;
            };
            for &n in cell.neighbors().iter().flatten() {
                if self.cells.contains_key(n) && reached.insert(n) {
                    stack.push(n);
                }
            }
        }
        if reached.len() != self.cells.len() {
            return Err(disconnected(format!(
                "{} of {} cells are cut off from cell {start:?}",
                self.cells.len() - reached.len(),
                self.cells.len()
            )));
        }

        let mut containing: FastHashMap<VertexKey, usize> =
            fast_hash_map_with_capacity(self.vertices.len());
        for cell in self.cells.values() {
            for &v in cell.vertices() {
                *containing.entry(v).or_insert(0) += 1;
            }
        }
        for (v, count) in containing {
            let star = self.incident_cells(v).len();
            if star != count {
                return Err(disconnected(format!(
                    "star of vertex {v:?} reaches {star} of its {count} cells"
                )));
            }
        }
        Ok(())
    }

    /// Checks incident-cell hints and point presence.
    ///
    /// Every vertex of a mesh with cells must point at a live cell that
    /// contains it; only the infinite vertex may lack a point.
    ///
    /// # Errors
    ///
    /// Returns [`TriangulationValidationError::InconsistentDataStructure`].
    pub fn validate_vertex_incidence(&self) -> Result<(), TriangulationValidationError> {
        let inconsistent =
            |message: String| TriangulationValidationError::InconsistentDataStructure { message };

        for (key, vertex) in &self.vertices {
            let infinite = self.is_infinite_vertex(key);
            if infinite != vertex.is_infinite() {
                return Err(inconsistent(if infinite {
                    format!("infinite vertex {key:?} carries a point")
                } else {
                    format!("finite vertex {key:?} has no point")
                }));
            }
            match vertex.incident_cell {
                Some(c) => {
                    if !self.cells.get(c).is_some_and(|cell| cell.contains_vertex(key)) {
                        return Err(inconsistent(format!(
                            "vertex {key:?} points at cell {c:?} which does not contain it"
                        )));
                    }
                }
                None if infinite && self.cells.is_empty() => {}
                None => {
                    return Err(inconsistent(format!("vertex {key:?} has no incident cell")));
                }
            }
        }
        Ok(())
    }

    /// Runs every check and collects all failing invariants.
    ///
    /// Mapping failures short-circuit, since later checks assume the maps
    /// are sound.
    ///
    /// # Errors
    ///
    /// Returns the report when at least one invariant fails.
    pub fn validation_report(&self) -> Result<(), TriangulationValidationReport> {
        type Check<K, U, V> = fn(&Tds<K, U, V>) -> Result<(), TriangulationValidationError>;

        let mappings: [(InvariantKind, Check<K, U, V>); 2] = [
            (InvariantKind::VertexMappings, Self::validate_vertex_mappings),
            (InvariantKind::CellMappings, Self::validate_cell_mappings),
        ];
        let structure: [(InvariantKind, Check<K, U, V>); 6] = [
            (InvariantKind::VertexValidity, Self::validate_vertices),
            (InvariantKind::CellValidity, Self::validate_cells),
            (InvariantKind::FacetSharing, Self::validate_facet_sharing),
            (InvariantKind::NeighborConsistency, Self::validate_neighbors),
            (InvariantKind::Connectivity, Self::validate_connectivity),
            (InvariantKind::VertexIncidence, Self::validate_vertex_incidence),
        ];

        let run = |checks: &[(InvariantKind, Check<K, U, V>)]| -> Vec<InvariantViolation> {
            checks
                .iter()
                .filter_map(|(kind, check)| {
                    check(self).err().map(|error| InvariantViolation { kind: *kind, error })
                })
                .collect()
        };

        let mut violations = run(&mappings);
        if violations.is_empty() {
            violations = run(&structure);
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(TriangulationValidationReport { violations })
        }
    }

    /// Runs every check and returns the first failure.
    ///
    /// # Errors
    ///
    /// Returns the first [`TriangulationValidationError`] found.
    pub fn is_valid(&self) -> Result<(), TriangulationValidationError> {
        self.validate_vertex_mappings()?;
        self.validate_cell_mappings()?;
        self.validate_vertices()?;
        self.validate_cells()?;
        self.validate_facet_sharing()?;
        self.validate_neighbors()?;
        self.validate_connectivity()?;
        self.validate_vertex_incidence()
    }
}
