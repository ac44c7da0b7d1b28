//! Cloning a mesh into another representation.
//!
//! [`copy_tds_into`] rebuilds a source [`Tds`] inside a target `Tds` whose
//! kernel and payload types may differ. Every source element yields exactly
//! one target element through a [`ConversionPolicy`]; vertex slots, neighbor
//! slots and incident-cell hints are then remapped one-to-one, so the target
//! is combinatorially isomorphic to the source.
//!
//! The traversal is a breadth-first walk over cell adjacency seeded with the
//! star of the infinite vertex. Each cell and each neighbor slot is visited a
//! constant number of times.
//!
//! The source infinite vertex maps to the target's own infinite vertex. That
//! vertex keeps its key, takes the converted payload, loses any point and
//! gets a fresh stamp.
//!
//! On failure the target is cleared; a partially built mesh is never left
//! behind.
//!
//! Set `TETRA_REMESH_CLONE_TRACE` to log each element at `trace` level.
//!
//! # Examples
//!
//! ```rust
//! use tetra_remesh::prelude::*;
//!
//! let source: Tds<FastKernel<f64>> = MeshBuilder::new()
//!     .points([[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]])
//!     .tetrahedra([[0, 1, 2, 3]])
//!     .build()
//!     .unwrap();
//!
//! let target: Tds<FastKernel<f32>> =
//!     clone_tds(&source, &FreshConversion::fresh()).unwrap();
//! assert_eq!(target.number_of_vertices(), source.number_of_vertices());
//! assert_eq!(target.number_of_cells(), source.number_of_cells());
//! assert!(target.is_valid().is_ok());
//! ```

use std::collections::VecDeque;

use thiserror::Error;

use crate::core::collections::{CellSecondaryMap, VertexSecondaryMap};
use crate::core::conversion::{CellConverter, ConversionError, ConversionPolicy, VertexConverter};
use crate::core::traits::DataType;
use crate::core::triangulation_data_structure::{
    CellKey, Tds, TdsMutationError, TriangulationValidationError, VertexKey,
};
use crate::geometry::kernel::Kernel;

/// Errors raised while cloning a mesh.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CloneError {
    /// The source violates a mesh invariant.
    #[error("Source mesh is structurally inconsistent: {source}")]
    StructuralInconsistency {
        /// The violated invariant.
        #[from]
        source: TriangulationValidationError,
    },
    /// A converter failed.
    #[error(transparent)]
    Conversion(#[from] ConversionError),
    /// The target refused an element.
    #[error("Target mesh rejected an element: {0}")]
    Target(#[from] TdsMutationError),
}

/// Source → target key correspondence produced by a clone.
#[derive(Clone, Debug, Default)]
pub struct CloneMap {
    vertices: VertexSecondaryMap<VertexKey>,
    cells: CellSecondaryMap<CellKey>,
}

impl CloneMap {
    /// Target vertex cloned from `source`.
    #[must_use]
    pub fn vertex(&self, source: VertexKey) -> Option<VertexKey> {
        self.vertices.get(source).copied()
    }

    /// Target cell cloned from `source`.
    #[must_use]
    pub fn cell(&self, source: CellKey) -> Option<CellKey> {
        self.cells.get(source).copied()
    }

    /// `(source, target)` vertex pairs.
    pub fn vertex_pairs(&self) -> impl Iterator<Item = (VertexKey, VertexKey)> + '_ {
        self.vertices.iter().map(|(s, t)| (s, *t))
    }

    /// `(source, target)` cell pairs.
    pub fn cell_pairs(&self) -> impl Iterator<Item = (CellKey, CellKey)> + '_ {
        self.cells.iter().map(|(s, t)| (s, *t))
    }

    /// Number of mapped vertices.
    #[must_use]
    pub fn number_of_vertices(&self) -> usize {
        self.vertices.len()
    }

    /// Number of mapped cells.
    #[must_use]
    pub fn number_of_cells(&self) -> usize {
        self.cells.len()
    }
}

#[inline]
fn clone_trace_enabled() -> bool {
    std::env::var_os("TETRA_REMESH_CLONE_TRACE").is_some()
}

/// Clones `source` into a new mesh with a default target kernel.
///
/// # Errors
///
/// See [`copy_tds_into`].
pub fn clone_tds<Ks, Us, Vs, Kt, Ut, Vt, VC, CC>(
    source: &Tds<Ks, Us, Vs>,
    policy: &ConversionPolicy<VC, CC>,
) -> Result<Tds<Kt, Ut, Vt>, CloneError>
where
    Ks: Kernel,
    Us: DataType,
    Vs: DataType,
    Kt: Kernel,
    Ut: DataType,
    Vt: DataType,
    VC: VertexConverter<Ks, Us, Kt, Ut>,
    CC: CellConverter<Vs, Vt>,
{
    let mut target = Tds::new();
    copy_tds_into(source, policy, &mut target)?;
    Ok(target)
}

/// Clears `target` and rebuilds `source` inside it.
///
/// # Errors
///
/// Returns [`CloneError::StructuralInconsistency`] if `source` fails
/// [`Tds::is_valid`] (open facets, asymmetric adjacency, or pieces the walk
/// from the infinite vertex would miss), and [`CloneError::Conversion`] if a
/// converter fails. `target` is left cleared in every error case.
pub fn copy_tds_into<Ks, Us, Vs, Kt, Ut, Vt, VC, CC>(
    source: &Tds<Ks, Us, Vs>,
    policy: &ConversionPolicy<VC, CC>,
    target: &mut Tds<Kt, Ut, Vt>,
) -> Result<CloneMap, CloneError>
where
    Ks: Kernel,
    Us: DataType,
    Vs: DataType,
    Kt: Kernel,
    Ut: DataType,
    Vt: DataType,
    VC: VertexConverter<Ks, Us, Kt, Ut>,
    CC: CellConverter<Vs, Vt>,
{
    target.clear();
    match copy_elements(source, policy, target) {
        Ok(map) => {
            tracing::debug!(
                vertices = map.number_of_vertices(),
                cells = map.number_of_cells(),
                generation = target.generation(),
                "cloned mesh"
            );
            Ok(map)
        }
        Err(err) => {
            tracing::debug!(error = %err, "clone failed; target cleared");
            target.clear();
            Err(err)
        }
    }
}

fn copy_elements<Ks, Us, Vs, Kt, Ut, Vt, VC, CC>(
    source: &Tds<Ks, Us, Vs>,
    policy: &ConversionPolicy<VC, CC>,
    target: &mut Tds<Kt, Ut, Vt>,
) -> Result<CloneMap, CloneError>
where
    Ks: Kernel,
    Us: DataType,
    Vs: DataType,
    Kt: Kernel,
    Ut: DataType,
    Vt: DataType,
    VC: VertexConverter<Ks, Us, Kt, Ut>,
    CC: CellConverter<Vs, Vt>,
{
    // Validity includes connectivity, so the walk below reaches everything.
    source.is_valid()?;
    let trace = clone_trace_enabled();

    let mut map = CloneMap {
        vertices: VertexSecondaryMap::with_capacity(source.number_of_vertices()),
        cells: CellSecondaryMap::with_capacity(source.number_of_cells()),
    };

    // The infinite vertex is reused, not recreated.
    let source_infinite = source.infinite_vertex();
    let Some(infinite) = source.get_vertex(source_infinite) else {
        return Err(TriangulationValidationError::InconsistentDataStructure {
            message: "source infinite vertex is missing".to_string(),
        }
        .into());
    };
    let converted = policy.vertex.create(source_infinite, infinite)?;
    target.replace_infinite_vertex(converted);
    map.vertices.insert(source_infinite, target.infinite_vertex());

    // Breadth-first walk over cell adjacency from the infinite star.
    let mut queue: VecDeque<CellKey> = VecDeque::with_capacity(source.number_of_cells());
    let mut enqueued: CellSecondaryMap<()> = CellSecondaryMap::with_capacity(source.number_of_cells());
    for ck in source.incident_cells(source_infinite) {
        if enqueued.insert(ck, ()).is_none() {
            queue.push_back(ck);
        }
    }

    while let Some(ck) = queue.pop_front() {
        let Some(cell) = source.get_cell(ck) else {
            continue;
        };

        let mut vertices = [VertexKey::default(); 4];
        for (slot, &sv) in cell.vertices().iter().enumerate() {
            vertices[slot] = match map.vertices.get(sv) {
                Some(&tv) => tv,
                None => {
                    let Some(vertex) = source.get_vertex(sv) else {
                        return Err(TdsMutationError::VertexNotFound { key: sv }.into());
                    };
                    let tv = target.insert_vertex(policy.vertex.create(sv, vertex)?)?;
                    if trace {
                        tracing::trace!(source = ?sv, target = ?tv, "cloned vertex");
                    }
                    map.vertices.insert(sv, tv);
                    tv
                }
            };
        }

        let mut converted = policy.cell.create(ck, cell)?;
        converted.set_vertices(vertices);
        let tc = target.insert_cell(converted)?;
        if trace {
            tracing::trace!(source = ?ck, target = ?tc, "cloned cell");
        }
        map.cells.insert(ck, tc);

        for &n in cell.neighbors().iter().flatten() {
            if enqueued.insert(n, ()).is_none() {
                queue.push_back(n);
            }
        }
    }

    // Mirror adjacency and incidence slot by slot.
    for (sc, &tc) in &map.cells {
        let Some(cell) = source.get_cell(sc) else {
            continue;
        };
        for (slot, neighbor) in cell.neighbors().iter().enumerate() {
            let mirrored = neighbor.and_then(|n| map.cells.get(n).copied());
            target.set_neighbor(tc, slot, mirrored);
        }
    }
    for (sv, &tv) in &map.vertices {
        let incident = source
            .get_vertex(sv)
            .and_then(|v| v.incident_cell)
            .and_then(|c| map.cells.get(c).copied());
        target.set_incident_cell(tv, incident);
    }

    Ok(map)
}

/// Re-applies the converters' `update` to every element pair in `map`.
///
/// Use it to refresh payload (points, dimensions, tags, data) after the
/// source changed without a structural edit. Target stamps are kept, since
/// the target elements keep their identity. Either every element is updated
/// or none is.
///
/// # Errors
///
/// Returns [`CloneError::Conversion`] if a converter fails and
/// [`CloneError::Target`] if `map` names an element missing on either side.
pub fn sync_payload<Ks, Us, Vs, Kt, Ut, Vt, VC, CC>(
    source: &Tds<Ks, Us, Vs>,
    policy: &ConversionPolicy<VC, CC>,
    target: &mut Tds<Kt, Ut, Vt>,
    map: &CloneMap,
) -> Result<(), CloneError>
where
    Ks: Kernel,
    Us: DataType,
    Vs: DataType,
    Kt: Kernel,
    Ut: DataType,
    Vt: DataType,
    VC: VertexConverter<Ks, Us, Kt, Ut>,
    CC: CellConverter<Vs, Vt>,
{
    let mut vertices = Vec::with_capacity(map.number_of_vertices());
    for (sv, tv) in map.vertex_pairs() {
        let s = source
            .get_vertex(sv)
            .ok_or(TdsMutationError::VertexNotFound { key: sv })?;
        let mut staged = *target
            .get_vertex(tv)
            .ok_or(TdsMutationError::VertexNotFound { key: tv })?;
        let uuid = staged.uuid();
        policy.vertex.update(sv, s, &mut staged)?;
        staged.set_uuid(uuid);
        if target.is_infinite_vertex(tv) {
            staged.set_point(None);
        }
        vertices.push((tv, staged));
    }

    let mut cells = Vec::with_capacity(map.number_of_cells());
    for (sc, tc) in map.cell_pairs() {
        let s = source
            .get_cell(sc)
            .ok_or(TdsMutationError::CellNotFound { key: sc })?;
        let mut staged = target
            .get_cell(tc)
            .ok_or(TdsMutationError::CellNotFound { key: tc })?
            .clone();
        let uuid = staged.uuid();
        policy.cell.update(sc, s, &mut staged)?;
        staged.set_uuid(uuid);
        cells.push((tc, staged));
    }

    for (tv, staged) in vertices {
        if let Some(slot) = target.get_vertex_mut(tv) {
            *slot = staged;
        }
    }
    for (tc, staged) in cells {
        if let Some(slot) = target.get_cell_mut(tc) {
            *slot = staged;
        }
    }
    Ok(())
}
