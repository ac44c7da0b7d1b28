//! Local combinatorial mutations: edge split and 2-3 / 3-2 flips.
//!
//! Each mutation removes a small set of cells and replaces it with a new set
//! that covers the same region and keeps the same outer facets. Every new
//! cell is derived from a removed cell by substituting vertices, which keeps
//! the orientation of a positively oriented mesh:
//!
//! | Mutation | Removed | Created | Rule |
//! |---|---|---|---|
//! | [`split_edge`] `ab` at `m` | every cell around `ab` | two per removed cell | `a → m` and `b → m` |
//! | [`flip_2_3`] facet `pqr` between `a` and `b` | 2 | 3 | the cell holding `a`, with each of `p`, `q`, `r` → `b` |
//! | [`flip_3_2`] edge `ab` of degree 3, ring `xyz` | 3 | 2 | a cell `abxy`, with `b → z` and with `a → z` |
//!
//! Only topological feasibility is checked; whether a flip improves or even
//! preserves the geometry is up to the caller.
//!
//! All mutations are all-or-nothing. Preconditions are checked and every
//! neighbor slot of the new cells is planned against the outer facets before
//! the first write. A `before_*` visitor veto leaves the mesh untouched.
//!
//! New cells inherit the subdomain and input-cell back-reference of the cell
//! they were derived from; their user data is empty (see
//! [`DataPropagator`](crate::core::visitor::DataPropagator)).

use thiserror::Error;

use crate::core::cell::{Cell, SubdomainIndex};
use crate::core::collections::{
    CellKeyBuffer, CellKeySet, FacetVertexKeys, FastHashMap, SmallBuffer,
    fast_hash_map_with_capacity,
};
use crate::core::edge::EdgeKey;
use crate::core::facet::FacetHandle;
use crate::core::traits::DataType;
use crate::core::triangulation_data_structure::{
    CellKey, Tds, TdsMutationError, TriangulationValidationError, VertexKey,
};
use crate::core::vertex::Vertex;
use crate::core::visitor::{RemeshingVisitor, VisitorError};
use crate::geometry::kernel::Kernel;
use crate::geometry::point::Point;
use crate::geometry::traits::coordinate::{Coordinate, CoordinateValidationError};

/// Errors raised by the mutation algorithms.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum MutationError {
    /// A vertex or cell handle no longer belongs to the mesh.
    #[error("Stale handle: {message}")]
    StaleHandle {
        /// Which handle.
        message: String,
    },
    /// The edge touches the infinite vertex.
    #[error("Edge {edge:?} is incident to the infinite vertex")]
    InfiniteEdge {
        /// The edge.
        edge: EdgeKey,
    },
    /// A cell involved in a flip contains the infinite vertex.
    #[error("Cell {cell:?} is infinite")]
    InfiniteCell {
        /// The cell.
        cell: CellKey,
    },
    /// No cell contains both endpoints.
    #[error("Edge {edge:?} is not in the mesh")]
    EdgeNotFound {
        /// The edge.
        edge: EdgeKey,
    },
    /// A 3-2 flip needs exactly three cells around the edge.
    #[error("Edge {edge:?} has {degree} incident cells, expected {expected}")]
    InvalidDegree {
        /// The edge.
        edge: EdgeKey,
        /// Cells found around it.
        degree: usize,
        /// Cells required.
        expected: usize,
    },
    /// The flip would create an edge or triangle that already exists.
    #[error("Mutation would duplicate an existing simplex: {message}")]
    WouldDuplicate {
        /// Which simplex.
        message: String,
    },
    /// The cells of a flip belong to different subdomains.
    #[error("Flip mixes subdomains {first} and {second}")]
    MixedSubdomains {
        /// Subdomain of the first cell.
        first: SubdomainIndex,
        /// A differing subdomain.
        second: SubdomainIndex,
    },
    /// The point of a split is not finite.
    #[error("Invalid split point: {source}")]
    InvalidPoint {
        /// Underlying coordinate error.
        #[from]
        source: CoordinateValidationError,
    },
    /// A `before_*` hook vetoed the mutation.
    #[error(transparent)]
    Rejected(#[from] VisitorError),
    /// The new cells do not close up against the outer facets.
    #[error("Cannot wire new cells: {message}")]
    Wiring {
        /// Description of the mismatch.
        message: String,
    },
    /// A storage primitive failed.
    #[error(transparent)]
    Tds(#[from] TdsMutationError),
    /// The mesh failed validation after the mutation.
    #[error("Mesh invalid after mutation: {0}")]
    Validation(#[from] TriangulationValidationError),
}

// =============================================================================
// REPLACEMENT PLANNING
// =============================================================================

/// A cell to create, derived from `parent`.
#[derive(Clone, Copy, Debug)]
struct NewCell {
    vertices: [VertexKey; 4],
    parent: CellKey,
}

#[derive(Clone, Copy, Debug)]
enum Link {
    /// Two new cells share a facet.
    Inner {
        first: (usize, usize),
        second: (usize, usize),
    },
    /// A new cell takes over a facet from a surviving neighbor.
    Outer {
        new: (usize, usize),
        neighbor: CellKey,
        slot: usize,
    },
}

#[derive(Debug)]
struct Replacement {
    old: CellKeyBuffer,
    new: SmallBuffer<NewCell, 8>,
    links: Vec<Link>,
}

fn sorted_facet(vertices: &[VertexKey; 4], i: usize) -> FacetVertexKeys {
    let mut facet = [VertexKey::default(); 3];
    let mut k = 0;
    for (j, &v) in vertices.iter().enumerate() {
        if j != i {
            facet[k] = v;
            k += 1;
        }
    }
    facet.sort_unstable();
    facet
}

/// Checks that `new` exactly re-covers the outer facets of `old` and records
/// every neighbor link. Does not write.
fn plan_replacement<K, U, V>(
    tds: &Tds<K, U, V>,
    old: CellKeyBuffer,
    new: SmallBuffer<NewCell, 8>,
    placeholder: Option<VertexKey>,
) -> Result<Replacement, MutationError>
where
    K: Kernel,
    U: DataType,
    V: DataType,
{
    let old_set: CellKeySet = old.iter().copied().collect();

    let mut outer: FastHashMap<FacetVertexKeys, Option<(CellKey, usize)>> =
        fast_hash_map_with_capacity(old.len() * 4);
    for &ck in &old {
        let cell = tds.get_cell(ck).ok_or_else(|| MutationError::StaleHandle {
            message: format!("cell {ck:?}"),
        })?;
        for i in 0..4 {
            let across = match cell.neighbor(i) {
                Some(n) if old_set.contains(&n) => continue,
                Some(n) => {
                    let slot = tds
                        .get_cell(n)
                        .and_then(|other| other.neighbor_index(ck))
                        .ok_or_else(|| MutationError::Wiring {
                            message: format!("neighbor {n:?} of {ck:?} does not point back"),
                        })?;
                    Some((n, slot))
                }
                None => None,
            };
            outer.insert(cell.facet_key(i), across);
        }
    }

    let mut facets: FastHashMap<FacetVertexKeys, SmallBuffer<(usize, usize), 2>> =
        fast_hash_map_with_capacity(new.len() * 4);
    for (k, planned) in new.iter().enumerate() {
        for (slot, &v) in planned.vertices.iter().enumerate() {
            if Some(v) != placeholder && !tds.contains_vertex(v) {
                return Err(MutationError::StaleHandle {
                    message: format!("vertex {v:?}"),
                });
            }
            if planned.vertices[..slot].contains(&v) {
                return Err(MutationError::Wiring {
                    message: format!("new cell {k} repeats vertex {v:?}"),
                });
            }
        }
        for i in 0..4 {
            facets
                .entry(sorted_facet(&planned.vertices, i))
                .or_default()
                .push((k, i));
        }
    }

    let mut links = Vec::with_capacity(facets.len());
    for (facet, owners) in &facets {
        match (owners.as_slice(), outer.remove(facet)) {
            ([first, second], None) => links.push(Link::Inner {
                first: *first,
                second: *second,
            }),
            ([new], Some(Some((neighbor, slot)))) => links.push(Link::Outer {
                new: *new,
                neighbor,
                slot,
            }),
            ([_], Some(None)) => {}
            (owners, _) => {
                return Err(MutationError::Wiring {
                    message: format!(
                        "facet {facet:?} would be shared by {} new cell(s)",
                        owners.len()
                    ),
                });
            }
        }
    }
    if !outer.is_empty() {
        return Err(MutationError::Wiring {
            message: format!("{} outer facet(s) left uncovered", outer.len()),
        });
    }

    Ok(Replacement { old, new, links })
}

/// Applies a planned replacement and reports each new cell to the visitor.
fn commit_replacement<K, U, V, R>(
    tds: &mut Tds<K, U, V>,
    plan: &Replacement,
    visitor: &mut R,
) -> Result<CellKeyBuffer, MutationError>
where
    K: Kernel,
    U: DataType,
    V: DataType,
    R: RemeshingVisitor<K, U, V> + ?Sized,
{
    let snapshots: FastHashMap<CellKey, Cell<V>> = plan
        .old
        .iter()
        .filter_map(|&ck| tds.get_cell(ck).map(|c| (ck, c.clone())))
        .collect();

    let mut created = CellKeyBuffer::new();
    for planned in &plan.new {
        let (subdomain, input_cell) = snapshots
            .get(&planned.parent)
            .map_or((SubdomainIndex::OUTSIDE, None), |p| (p.subdomain(), p.input_cell()));
        let mut cell = Cell::unwired(subdomain, None, input_cell);
        cell.set_vertices(planned.vertices);
        match tds.insert_cell(cell) {
            Ok(key) => created.push(key),
            Err(err) => {
                for key in created {
                    tds.remove_cell(key);
                }
                return Err(err.into());
            }
        }
    }

    for &ck in &plan.old {
        tds.remove_cell(ck);
    }

    for link in &plan.links {
        match *link {
            Link::Inner {
                first: (a, i),
                second: (b, j),
            } => tds.set_adjacency(created[a], i, created[b], j)?,
            Link::Outer {
                new: (a, i),
                neighbor,
                slot,
            } => tds.set_adjacency(created[a], i, neighbor, slot)?,
        }
    }

    for (planned, &key) in plan.new.iter().zip(&created) {
        for &v in &planned.vertices {
            tds.set_incident_cell(v, Some(key));
        }
    }

    for (planned, &key) in plan.new.iter().zip(&created) {
        let (Some(parent), Some(cell)) = (snapshots.get(&planned.parent), tds.get_cell_mut(key))
        else {
            continue;
        };
        visitor.after_add_cell(planned.parent, parent, key, cell);
    }

    Ok(created)
}

// =============================================================================
// PRECONDITION HELPERS
// =============================================================================

fn finite_edge_cells<K, U, V>(
    tds: &Tds<K, U, V>,
    edge: EdgeKey,
) -> Result<CellKeyBuffer, MutationError>
where
    K: Kernel,
    U: DataType,
    V: DataType,
{
    for v in [edge.v0(), edge.v1()] {
        if !tds.contains_vertex(v) {
            return Err(MutationError::StaleHandle {
                message: format!("vertex {v:?}"),
            });
        }
    }
    if tds.is_infinite_edge(edge) {
        return Err(MutationError::InfiniteEdge { edge });
    }
    if edge.is_degenerate() {
        return Err(MutationError::EdgeNotFound { edge });
    }
    let cells = tds.cells_around_edge(edge);
    if cells.is_empty() {
        return Err(MutationError::EdgeNotFound { edge });
    }
    Ok(cells)
}

fn require_finite_same_subdomain<K, U, V>(
    tds: &Tds<K, U, V>,
    cells: &[CellKey],
) -> Result<(), MutationError>
where
    K: Kernel,
    U: DataType,
    V: DataType,
{
    let mut first = None;
    for &ck in cells {
        let cell = tds.get_cell(ck).ok_or_else(|| MutationError::StaleHandle {
            message: format!("cell {ck:?}"),
        })?;
        if tds.is_infinite_cell(ck) {
            return Err(MutationError::InfiniteCell { cell: ck });
        }
        match first {
            None => first = Some(cell.subdomain()),
            Some(s) if s != cell.subdomain() => {
                return Err(MutationError::MixedSubdomains {
                    first: s,
                    second: cell.subdomain(),
                });
            }
            Some(_) => {}
        }
    }
    Ok(())
}

fn split_cells<K, U, V>(
    tds: &Tds<K, U, V>,
    ring: &[CellKey],
    edge: EdgeKey,
    m: VertexKey,
) -> Result<SmallBuffer<NewCell, 8>, MutationError>
where
    K: Kernel,
    U: DataType,
    V: DataType,
{
    let mut cells = SmallBuffer::new();
    for &ck in ring {
        let cell = tds.get_cell(ck).ok_or_else(|| MutationError::StaleHandle {
            message: format!("cell {ck:?}"),
        })?;
        for from in [edge.v0(), edge.v1()] {
            cells.push(NewCell {
                vertices: substituted(*cell.vertices(), from, m),
                parent: ck,
            });
        }
    }
    Ok(cells)
}

fn substituted(vertices: [VertexKey; 4], from: VertexKey, to: VertexKey) -> [VertexKey; 4] {
    vertices.map(|v| if v == from { to } else { v })
}

// =============================================================================
// EDGE SPLIT
// =============================================================================

/// Splits a finite edge at the kernel midpoint of its endpoints.
///
/// # Errors
///
/// See [`split_edge_at`].
pub fn split_edge<K, U, V, R>(
    tds: &mut Tds<K, U, V>,
    edge: EdgeKey,
    visitor: &mut R,
) -> Result<VertexKey, MutationError>
where
    K: Kernel,
    U: DataType,
    V: DataType,
    R: RemeshingVisitor<K, U, V> + ?Sized,
{
    let (Some(p), Some(q)) = (tds.point(edge.v0()), tds.point(edge.v1())) else {
        finite_edge_cells(tds, edge)?;
        return Err(MutationError::InfiniteEdge { edge });
    };
    let midpoint = tds.kernel().midpoint(p, q);
    split_edge_at(tds, edge, midpoint, visitor)
}

/// Splits a finite edge at `point`.
///
/// Every cell around the edge is replaced by two cells, one with each
/// endpoint swapped for the new vertex. The new vertex takes the higher
/// feature dimension of the two endpoints and no data.
///
/// Hooks: `before_split(edge)`, then `after_add_cell` once per new cell
/// (paired with the cell it was cut from), then `after_split(new_vertex)`.
///
/// # Errors
///
/// Returns [`MutationError::StaleHandle`], [`MutationError::InfiniteEdge`]
/// or [`MutationError::EdgeNotFound`] for an unusable edge,
/// [`MutationError::InvalidPoint`] for a non-finite point and
/// [`MutationError::Rejected`] when `before_split` vetoes. The mesh is
/// unchanged in every error case.
pub fn split_edge_at<K, U, V, R>(
    tds: &mut Tds<K, U, V>,
    edge: EdgeKey,
    point: Point<K::Scalar, 3>,
    visitor: &mut R,
) -> Result<VertexKey, MutationError>
where
    K: Kernel,
    U: DataType,
    V: DataType,
    R: RemeshingVisitor<K, U, V> + ?Sized,
{
    let ring = finite_edge_cells(tds, edge)?;
    point.validate()?;

    let (a, b) = edge.endpoints();

    // Dry run with a key no vertex can have.
    let placeholder = VertexKey::default();
    let dry = split_cells(tds, &ring, edge, placeholder)?;
    plan_replacement(tds, ring.clone(), dry, Some(placeholder))?;

    visitor.before_split(tds, edge)?;

    let dimension = match (tds.get_vertex(a), tds.get_vertex(b)) {
        (Some(va), Some(vb)) => va.dimension().max(vb.dimension()),
        _ => Default::default(),
    };
    let m = tds.insert_vertex(Vertex::unstamped(Some(point), dimension, None))?;

    let plan = match split_cells(tds, &ring, edge, m)
        .and_then(|cells| plan_replacement(tds, ring.clone(), cells, None))
    {
        Ok(plan) => plan,
        Err(err) => {
            tds.remove_vertex(m)?;
            return Err(err);
        }
    };
    let created = match commit_replacement(tds, &plan, visitor) {
        Ok(created) => created,
        Err(err) => {
            tds.remove_vertex(m)?;
            return Err(err);
        }
    };

    tracing::debug!(
        edge = ?edge,
        vertex = ?m,
        removed = ring.len(),
        created = created.len(),
        "split edge"
    );
    visitor.after_split(tds, m);
    Ok(m)
}

// =============================================================================
// FLIPS
// =============================================================================

/// Replaces the two finite cells sharing `facet` by three cells around the
/// edge joining their opposite vertices.
///
/// Hooks: `before_flip(facet.cell_key())`, `after_add_cell` for each new
/// cell (all paired with `facet.cell_key()`), `after_flip(first new cell)`.
/// Returns the new cells.
///
/// # Errors
///
/// Returns [`MutationError::InfiniteCell`] if either cell is infinite,
/// [`MutationError::WouldDuplicate`] if the opposite vertices are already
/// joined by an edge, [`MutationError::MixedSubdomains`] if the cells lie in
/// different subdomains and [`MutationError::Rejected`] on a veto. The mesh
/// is unchanged in every error case.
pub fn flip_2_3<K, U, V, R>(
    tds: &mut Tds<K, U, V>,
    facet: FacetHandle,
    visitor: &mut R,
) -> Result<CellKeyBuffer, MutationError>
where
    K: Kernel,
    U: DataType,
    V: DataType,
    R: RemeshingVisitor<K, U, V> + ?Sized,
{
    let c1 = facet.cell_key();
    let i = facet.checked_index().map_err(TdsMutationError::from)?;
    let first = tds.get_cell(c1).ok_or_else(|| MutationError::StaleHandle {
        message: format!("cell {c1:?}"),
    })?;
    let c2 = first.neighbor(i).ok_or_else(|| MutationError::Wiring {
        message: format!("facet {i} of {c1:?} has no neighbor"),
    })?;
    require_finite_same_subdomain(tds, &[c1, c2])?;

    let a = first.vertex(i);
    let second = tds.get_cell(c2).ok_or_else(|| MutationError::StaleHandle {
        message: format!("cell {c2:?}"),
    })?;
    let j = second
        .neighbor_index(c1)
        .ok_or_else(|| MutationError::Wiring {
            message: format!("{c2:?} does not point back to {c1:?}"),
        })?;
    let b = second.vertex(j);
    if tds.has_edge(a, b) {
        return Err(MutationError::WouldDuplicate {
            message: format!("edge {a:?}-{b:?}"),
        });
    }

    let vertices = *first.vertices();
    let new: SmallBuffer<NewCell, 8> = (0..4)
        .filter(|&s| s != i)
        .map(|s| NewCell {
            vertices: substituted(vertices, vertices[s], b),
            parent: c1,
        })
        .collect();
    let old: CellKeyBuffer = [c1, c2].into_iter().collect();
    let plan = plan_replacement(tds, old, new, None)?;

    visitor.before_flip(tds, c1)?;
    let created = commit_replacement(tds, &plan, visitor)?;
    tracing::debug!(removed = ?[c1, c2], created = ?created.as_slice(), "flip 2-3");
    visitor.after_flip(tds, created[0]);
    Ok(created)
}

/// Replaces the three finite cells around an edge of degree 3 by two cells
/// sharing the triangle of the three ring vertices.
///
/// Hooks: `before_flip(c)` where `c` is the first cell around the edge,
/// `after_add_cell` for each new cell (paired with `c`), `after_flip(first
/// new cell)`. Returns the new cells.
///
/// # Errors
///
/// Returns [`MutationError::InvalidDegree`] unless exactly three cells
/// surround the edge, [`MutationError::InfiniteCell`] if one of them is
/// infinite, [`MutationError::WouldDuplicate`] if the ring triangle already
/// exists, [`MutationError::MixedSubdomains`] and
/// [`MutationError::Rejected`]. The mesh is unchanged in every error case.
pub fn flip_3_2<K, U, V, R>(
    tds: &mut Tds<K, U, V>,
    edge: EdgeKey,
    visitor: &mut R,
) -> Result<CellKeyBuffer, MutationError>
where
    K: Kernel,
    U: DataType,
    V: DataType,
    R: RemeshingVisitor<K, U, V> + ?Sized,
{
    let ring = finite_edge_cells(tds, edge)?;
    if ring.len() != 3 {
        return Err(MutationError::InvalidDegree {
            edge,
            degree: ring.len(),
            expected: 3,
        });
    }
    require_finite_same_subdomain(tds, &ring)?;

    let (a, b) = edge.endpoints();
    let mut apexes: SmallBuffer<VertexKey, 4> = SmallBuffer::new();
    for &ck in &ring {
        if let Some(cell) = tds.get_cell(ck) {
            for &v in cell.vertices() {
                if v != a && v != b && !apexes.contains(&v) {
                    apexes.push(v);
                }
            }
        }
    }
    let [x, y, z] = apexes.as_slice() else {
        return Err(MutationError::Wiring {
            message: format!("edge {edge:?} has {} ring vertices", apexes.len()),
        });
    };
    if tds.has_facet(*x, *y, *z).is_some() {
        return Err(MutationError::WouldDuplicate {
            message: format!("triangle {x:?}-{y:?}-{z:?}"),
        });
    }

    let c1 = ring[0];
    let vertices = *tds
        .get_cell(c1)
        .ok_or_else(|| MutationError::StaleHandle {
            message: format!("cell {c1:?}"),
        })?
        .vertices();
    let far = *[*x, *y, *z]
        .iter()
        .find(|v| !vertices.contains(v))
        .ok_or_else(|| MutationError::Wiring {
            message: format!("first cell {c1:?} holds the whole ring"),
        })?;
    let new: SmallBuffer<NewCell, 8> = [b, a]
        .into_iter()
        .map(|from| NewCell {
            vertices: substituted(vertices, from, far),
            parent: c1,
        })
        .collect();
    let plan = plan_replacement(tds, ring.clone(), new, None)?;

    visitor.before_flip(tds, c1)?;
    let created = commit_replacement(tds, &plan, visitor)?;
    tracing::debug!(edge = ?edge, removed = ?ring.as_slice(), created = ?created.as_slice(), "flip 3-2");
    visitor.after_flip(tds, created[0]);
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::builder::MeshBuilder;
    use crate::core::vertex::FeatureDimension;
    use crate::core::visitor::{DefaultRemeshingVisitor, EventRecorder, VisitorEvent};
    use crate::geometry::kernel::FastKernel;

    type TestTds = Tds<FastKernel<f64>, (), u8>;

    fn single_tet() -> TestTds {
        MeshBuilder::new()
            .points([
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [0.0, 1.0, 0.0],
                [0.0, 0.0, 1.0],
            ])
            .tetrahedra([[0, 1, 2, 3]])
            .subdomains([3])
            .build()
            .unwrap()
    }

    /// Two tetrahedra glued on the triangle z = 0 with apexes above and below.
    fn bipyramid() -> TestTds {
        MeshBuilder::new()
            .points([
                [0.0, 0.0, 1.0],
                [0.0, 0.0, -1.0],
                [1.0, 0.0, 0.0],
                [-0.5, 0.866, 0.0],
                [-0.5, -0.866, 0.0],
            ])
            .tetrahedra([[0, 2, 3, 4], [1, 2, 3, 4]])
            .subdomains([1, 1])
            .build()
            .unwrap()
    }

    fn vertex_at(tds: &TestTds, coords: [f64; 3]) -> VertexKey {
        tds.finite_vertices()
            .find(|(_, v)| v.point().map(Coordinate::to_array) == Some(coords))
            .map(|(k, _)| k)
            .unwrap()
    }

    fn assert_positive(tds: &TestTds) {
        for (_, cell) in tds.finite_cells() {
            let points = cell.vertices().map(|v| *tds.point(v).unwrap());
            assert_eq!(tds.kernel().orientation(&points).unwrap(), 1);
        }
    }

    #[test]
    fn split_single_tet_edge() {
        let mut tds = single_tet();
        let edge = EdgeKey::new(
            vertex_at(&tds, [0.0, 0.0, 0.0]),
            vertex_at(&tds, [1.0, 0.0, 0.0]),
        );
        let mut recorder = EventRecorder::new();
        let m = split_edge(&mut tds, edge, &mut recorder).unwrap();

        assert_eq!(tds.number_of_vertices(), 6);
        assert_eq!(tds.number_of_cells(), 8);
        assert_eq!(tds.number_of_finite_cells(), 2);
        assert_eq!(tds.point(m).map(Coordinate::to_array), Some([0.5, 0.0, 0.0]));
        assert!(!tds.has_edge(edge.v0(), edge.v1()));
        assert!(tds.is_valid().is_ok());
        assert_positive(&tds);

        let events = recorder.events();
        assert_eq!(events.first(), Some(&VisitorEvent::BeforeSplit(edge)));
        assert_eq!(events.last(), Some(&VisitorEvent::AfterSplit(m)));
        assert_eq!(recorder.added_cells().len(), 6);
        for (_, cell) in tds.finite_cells() {
            assert_eq!(cell.subdomain(), SubdomainIndex(3));
        }
    }

    #[test]
    fn split_takes_higher_endpoint_dimension() {
        let mut tds = single_tet();
        let a = vertex_at(&tds, [0.0, 0.0, 0.0]);
        let b = vertex_at(&tds, [0.0, 0.0, 1.0]);
        tds.get_vertex_mut(a).unwrap().set_dimension(FeatureDimension::Corner);
        tds.get_vertex_mut(b).unwrap().set_dimension(FeatureDimension::Surface);
        let m = split_edge(&mut tds, EdgeKey::new(a, b), &mut DefaultRemeshingVisitor).unwrap();
        assert_eq!(tds.get_vertex(m).unwrap().dimension(), FeatureDimension::Surface);
    }

    #[test]
    fn split_rejects_infinite_and_missing_edges() {
        let mut tds = single_tet();
        let a = vertex_at(&tds, [0.0, 0.0, 0.0]);
        let infinite = EdgeKey::new(a, tds.infinite_vertex());
        assert!(matches!(
            split_edge(&mut tds, infinite, &mut DefaultRemeshingVisitor),
            Err(MutationError::InfiniteEdge { .. })
        ));
        assert!(matches!(
            split_edge_at(
                &mut tds,
                EdgeKey::new(a, a),
                Point::new([0.0, 0.0, 0.0]),
                &mut DefaultRemeshingVisitor
            ),
            Err(MutationError::EdgeNotFound { .. })
        ));
    }

    #[test]
    fn split_with_nan_point_leaves_mesh_alone() {
        let mut tds = single_tet();
        let before = (tds.number_of_vertices(), tds.number_of_cells());
        let edge = tds.finite_edges()[0];
        let err = split_edge_at(
            &mut tds,
            edge,
            Point::new([f64::NAN, 0.0, 0.0]),
            &mut DefaultRemeshingVisitor,
        )
        .unwrap_err();
        assert!(matches!(err, MutationError::InvalidPoint { .. }));
        assert_eq!((tds.number_of_vertices(), tds.number_of_cells()), before);
    }

    #[test]
    fn flip_2_3_then_3_2_restores_counts() {
        let mut tds = bipyramid();
        let (c1, cell) = tds.finite_cells().next().unwrap();
        let i = cell
            .neighbors()
            .iter()
            .position(|n| n.is_some_and(|n| !tds.is_infinite_cell(n)))
            .unwrap();

        let mut recorder = EventRecorder::new();
        let facet = FacetHandle::new(c1, u8::try_from(i).unwrap());
        let created = flip_2_3(&mut tds, facet, &mut recorder).unwrap();
        assert_eq!(created.len(), 3);
        assert_eq!(tds.number_of_finite_cells(), 3);
        assert!(tds.is_valid().is_ok());
        assert_positive(&tds);
        assert_eq!(recorder.events()[0], VisitorEvent::BeforeFlip(c1));
        assert_eq!(recorder.events()[4], VisitorEvent::AfterFlip(created[0]));

        let top = vertex_at(&tds, [0.0, 0.0, 1.0]);
        let bottom = vertex_at(&tds, [0.0, 0.0, -1.0]);
        let axis = EdgeKey::new(top, bottom);
        assert_eq!(tds.cells_around_edge(axis).len(), 3);

        flip_3_2(&mut tds, axis, &mut recorder).unwrap();
        assert_eq!(tds.number_of_finite_cells(), 2);
        assert!(!tds.has_edge(top, bottom));
        assert!(tds.is_valid().is_ok());
        assert_positive(&tds);
    }

    #[test]
    fn flips_refuse_infinite_cells_and_wrong_degree() {
        let mut tds = single_tet();
        let (c, _) = tds.finite_cells().next().unwrap();
        assert!(matches!(
            flip_2_3(&mut tds, FacetHandle::new(c, 0), &mut DefaultRemeshingVisitor),
            Err(MutationError::InfiniteCell { .. })
        ));

        let edge = tds.finite_edges()[0];
        assert!(matches!(
            flip_3_2(&mut tds, edge, &mut DefaultRemeshingVisitor),
            Err(MutationError::InfiniteCell { .. })
        ));

        let mut bi = bipyramid();
        let rim = EdgeKey::new(
            vertex_at(&bi, [1.0, 0.0, 0.0]),
            vertex_at(&bi, [-0.5, 0.866, 0.0]),
        );
        assert_eq!(
            flip_3_2(&mut bi, rim, &mut DefaultRemeshingVisitor),
            Err(MutationError::InvalidDegree {
                edge: rim,
                degree: 4,
                expected: 3,
            })
        );
    }
}
