//! Fluent builder that closes a finite tetrahedral complex into a [`Tds`].
//!
//! Input is an indexed list of points (or prebuilt vertices) and a list of
//! tetrahedra referencing them. [`MeshBuilder::build`] then:
//!
//! 1. stores every vertex,
//! 2. orients each tetrahedron positively with the kernel's orientation test,
//! 3. links finite cells that share a facet,
//! 4. adds one infinite cell per boundary facet and links the infinite fan.
//!
//! The result is checked with [`Tds::is_valid`] before it is returned.
//!
//! # Examples
//!
//! ```rust
//! use tetra_remesh::prelude::*;
//!
//! // Two tetrahedra glued along the triangle (1, 2, 3).
//! let tds: Tds<FastKernel<f64>, (), ()> = MeshBuilder::new()
//!     .points([
//!         [0.0, 0.0, 0.0],
//!         [1.0, 0.0, 0.0],
//!         [0.0, 1.0, 0.0],
//!         [0.0, 0.0, 1.0],
//!         [1.0, 1.0, 1.0],
//!     ])
//!     .tetrahedra([[0, 1, 2, 3], [1, 2, 3, 4]])
//!     .subdomains([1, 2])
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(tds.number_of_finite_cells(), 2);
//! assert_eq!(tds.number_of_cells(), 2 + 6);
//! ```

use thiserror::Error;

use crate::core::cell::{Cell, SubdomainIndex};
use crate::core::collections::{FacetVertexKeys, FastHashMap, SmallBuffer, fast_hash_map_with_capacity};
use crate::core::traits::DataType;
use crate::core::triangulation_data_structure::{
    CellKey, Tds, TdsMutationError, TriangulationValidationError, VertexKey,
};
use crate::core::vertex::{FeatureDimension, Vertex, VertexValidationError};
use crate::geometry::kernel::Kernel;
use crate::geometry::point::Point;
use crate::geometry::traits::coordinate::{
    Coordinate, CoordinateConversionError, CoordinateScalar,
};

/// Errors raised by [`MeshBuilder::build`].
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum MeshBuildError {
    /// An input vertex has no point or a non-finite coordinate.
    #[error("Invalid input vertex {index}: {source}")]
    InvalidVertex {
        /// Position in the input.
        index: usize,
        /// Underlying vertex error.
        source: VertexValidationError,
    },
    /// An input vertex has no point.
    #[error("Input vertex {index} has no point")]
    MissingPoint {
        /// Position in the input.
        index: usize,
    },
    /// A tetrahedron references a vertex index past the end of the input.
    #[error("Tetrahedron {tetrahedron} references vertex {index}, but only {len} vertices were given")]
    VertexIndexOutOfRange {
        /// Tetrahedron position in the input.
        tetrahedron: usize,
        /// The offending vertex index.
        index: usize,
        /// Number of input vertices.
        len: usize,
    },
    /// A tetrahedron repeats a vertex or is flat.
    #[error("Tetrahedron {tetrahedron} is degenerate")]
    DegenerateTetrahedron {
        /// Tetrahedron position in the input.
        tetrahedron: usize,
    },
    /// The orientation test could not evaluate a tetrahedron.
    #[error("Cannot orient tetrahedron {tetrahedron}: {source}")]
    Orientation {
        /// Tetrahedron position in the input.
        tetrahedron: usize,
        /// Underlying coordinate error.
        source: CoordinateConversionError,
    },
    /// A triangle is shared by more than two tetrahedra.
    #[error("Triangle shared by {count} tetrahedra (first: {tetrahedron})")]
    NonManifoldFacet {
        /// One tetrahedron owning the triangle.
        tetrahedron: usize,
        /// Number of owners.
        count: usize,
    },
    /// The boundary surface is not a closed 2-manifold, so the infinite fan
    /// cannot be linked.
    #[error("Boundary is not a closed surface: {message}")]
    NonManifoldBoundary {
        /// Description of the failure.
        message: String,
    },
    /// The tetrahedra do not form one connected solid, or pieces touch only
    /// at a vertex.
    #[error("Tetrahedra do not form one connected solid: {message}")]
    Disconnected {
        /// Description of the failure.
        message: String,
    },
    /// An input vertex is not used by any tetrahedron.
    #[error("Input vertex {index} is not used by any tetrahedron")]
    UnusedVertex {
        /// Position in the input.
        index: usize,
    },
    /// Subdomain or cell data lists are longer than the tetrahedron list.
    #[error("{what} has {len} entries for {tetrahedra} tetrahedra")]
    LengthMismatch {
        /// Which list.
        what: &'static str,
        /// Its length.
        len: usize,
        /// Number of tetrahedra.
        tetrahedra: usize,
    },
    /// A storage primitive failed.
    #[error(transparent)]
    Tds(#[from] TdsMutationError),
    /// The finished mesh failed validation.
    #[error("Built mesh is invalid: {0}")]
    Validation(#[from] TriangulationValidationError),
}

/// Fluent builder for a closed [`Tds`].
///
/// # Type Parameters
///
/// - `T` - coordinate scalar; must match the kernel passed to
///   [`build_with_kernel`](Self::build_with_kernel)
/// - `U` - vertex data type
/// - `V` - cell data type
#[derive(Clone, Debug)]
pub struct MeshBuilder<T, U = (), V = ()>
where
    T: CoordinateScalar,
    U: DataType,
    V: DataType,
{
    vertices: Vec<Vertex<T, U>>,
    tetrahedra: Vec<[usize; 4]>,
    subdomains: Vec<SubdomainIndex>,
    cell_data: Vec<Option<V>>,
}

impl<T, U, V> Default for MeshBuilder<T, U, V>
where
    T: CoordinateScalar,
    U: DataType,
    V: DataType,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, U, V> MeshBuilder<T, U, V>
where
    T: CoordinateScalar,
    U: DataType,
    V: DataType,
{
    /// Creates an empty builder.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            vertices: Vec::new(),
            tetrahedra: Vec::new(),
            subdomains: Vec::new(),
            cell_data: Vec::new(),
        }
    }

    /// Appends bare points. Their vertices get no data and an unset dimension.
    #[must_use]
    pub fn points<I>(mut self, points: I) -> Self
    where
        I: IntoIterator<Item = [T; 3]>,
    {
        self.vertices.extend(points.into_iter().map(|coords| {
            Vertex::unstamped(Some(Point::new(coords)), FeatureDimension::Unset, None)
        }));
        self
    }

    /// Appends prebuilt vertices, keeping their dimension and data.
    #[must_use]
    pub fn vertices<I>(mut self, vertices: I) -> Self
    where
        I: IntoIterator<Item = Vertex<T, U>>,
    {
        self.vertices.extend(vertices);
        self
    }

    /// Appends tetrahedra as indices into the vertex list.
    #[must_use]
    pub fn tetrahedra<I>(mut self, tetrahedra: I) -> Self
    where
        I: IntoIterator<Item = [usize; 4]>,
    {
        self.tetrahedra.extend(tetrahedra);
        self
    }

    /// Subdomain index per tetrahedron, in input order. Missing entries are
    /// [`SubdomainIndex::OUTSIDE`].
    #[must_use]
    pub fn subdomains<I, S>(mut self, subdomains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SubdomainIndex>,
    {
        self.subdomains.extend(subdomains.into_iter().map(Into::into));
        self
    }

    /// Cell data per tetrahedron, in input order.
    #[must_use]
    pub fn cell_data<I>(mut self, data: I) -> Self
    where
        I: IntoIterator<Item = V>,
    {
        self.cell_data.extend(data.into_iter().map(Some));
        self
    }

    /// Builds the mesh with a default-constructed kernel.
    ///
    /// # Errors
    ///
    /// See [`build_with_kernel`](Self::build_with_kernel).
    pub fn build<K>(self) -> Result<Tds<K, U, V>, MeshBuildError>
    where
        K: Kernel<Scalar = T>,
    {
        self.build_with_kernel(K::default())
    }

    /// Builds the mesh with the given kernel.
    ///
    /// # Errors
    ///
    /// Returns [`MeshBuildError`] when an input vertex is invalid or unused,
    /// a tetrahedron is degenerate or out of range, a triangle is shared by
    /// more than two tetrahedra, the boundary is not a closed surface, or
    /// the tetrahedra fall apart into pieces.
    pub fn build_with_kernel<K>(self, kernel: K) -> Result<Tds<K, U, V>, MeshBuildError>
    where
        K: Kernel<Scalar = T>,
    {
        let (tds, boundary_facets) = self.assemble(kernel)?;
        tds.validate_connectivity().map_err(|err| match err {
            TriangulationValidationError::Disconnected { message } => {
                MeshBuildError::Disconnected { message }
            }
            other => MeshBuildError::Validation(other),
        })?;
        tds.is_valid()?;
        tracing::debug!(
            vertices = tds.number_of_vertices(),
            cells = tds.number_of_cells(),
            boundary_facets,
            "built mesh"
        );
        Ok(tds)
    }

    /// Inserts, orients and links the tetrahedra and closes them with the
    /// infinite fan. Returns the mesh, unvalidated, and the number of
    /// boundary facets.
    pub(crate) fn assemble<K>(self, kernel: K) -> Result<(Tds<K, U, V>, usize), MeshBuildError>
    where
        K: Kernel<Scalar = T>,
    {
        let Self {
            vertices,
            tetrahedra,
            subdomains,
            cell_data,
        } = self;
        for (what, len) in [("subdomains", subdomains.len()), ("cell_data", cell_data.len())] {
            if len > tetrahedra.len() {
                return Err(MeshBuildError::LengthMismatch {
                    what,
                    len,
                    tetrahedra: tetrahedra.len(),
                });
            }
        }

        let mut tds = Tds::with_kernel(kernel);

        let mut keys: Vec<VertexKey> = Vec::with_capacity(vertices.len());
        for (index, mut vertex) in vertices.into_iter().enumerate() {
            let Some(point) = vertex.point() else {
                return Err(MeshBuildError::MissingPoint { index });
            };
            point
                .validate()
                .map_err(|e| MeshBuildError::InvalidVertex {
                    index,
                    source: e.into(),
                })?;
            vertex.incident_cell = None;
            keys.push(tds.insert_vertex(vertex)?);
        }

        let mut cell_data = cell_data.into_iter();
        let mut finite_cells: Vec<CellKey> = Vec::with_capacity(tetrahedra.len());
        for (t, tet) in tetrahedra.iter().enumerate() {
            let oriented = orient(&tds, &keys, t, *tet)?;
            let mut cell = Cell::new(oriented)
                .map_err(|_| MeshBuildError::DegenerateTetrahedron { tetrahedron: t })?;
            cell.set_subdomain(subdomains.get(t).copied().unwrap_or_default());
            cell.data = cell_data.next().flatten();
            finite_cells.push(tds.insert_cell(cell)?);
        }

        if let Some(index) = keys
            .iter()
            .position(|&v| tds.get_vertex(v).is_some_and(|v| v.incident_cell.is_none()))
        {
            return Err(MeshBuildError::UnusedVertex { index });
        }

        let boundary = link_finite_cells(&mut tds, &finite_cells)?;
        close_with_infinite_fan(&mut tds, &boundary)?;
        Ok((tds, boundary.len()))
    }
}

/// Maps a tetrahedron to vertex keys in positive orientation.
fn orient<K, U, V>(
    tds: &Tds<K, U, V>,
    keys: &[VertexKey],
    tetrahedron: usize,
    tet: [usize; 4],
) -> Result<[VertexKey; 4], MeshBuildError>
where
    K: Kernel,
    U: DataType,
    V: DataType,
{
    let mut out = [VertexKey::default(); 4];
    let mut points = [Point::default(); 4];
    for (slot, &index) in tet.iter().enumerate() {
        let key = *keys.get(index).ok_or(MeshBuildError::VertexIndexOutOfRange {
            tetrahedron,
            index,
            len: keys.len(),
        })?;
        out[slot] = key;
        points[slot] = *tds
            .point(key)
            .ok_or(MeshBuildError::MissingPoint { index })?;
    }

    match tds
        .kernel()
        .orientation(&points)
        .map_err(|source| MeshBuildError::Orientation {
            tetrahedron,
            source,
        })? {
        0 => Err(MeshBuildError::DegenerateTetrahedron { tetrahedron }),
        s if s < 0 => {
            out.swap(0, 1);
            Ok(out)
        }
        _ => Ok(out),
    }
}

/// Links finite cells sharing a facet; returns the boundary facets.
fn link_finite_cells<K, U, V>(
    tds: &mut Tds<K, U, V>,
    cells: &[CellKey],
) -> Result<Vec<(CellKey, usize)>, MeshBuildError>
where
    K: Kernel,
    U: DataType,
    V: DataType,
{
    let mut facets: FastHashMap<FacetVertexKeys, SmallBuffer<(usize, usize), 2>> =
        fast_hash_map_with_capacity(cells.len() * 4);
    for (t, &ck) in cells.iter().enumerate() {
        let Some(cell) = tds.get_cell(ck) else {
            continue;
        };
        for i in 0..4 {
            facets.entry(cell.facet_key(i)).or_default().push((t, i));
        }
    }

    let mut boundary = Vec::new();
    for sharing in facets.values() {
        match sharing.as_slice() {
            [(t, i)] => boundary.push((cells[*t], *i)),
            [(t1, i1), (t2, i2)] => tds.set_adjacency(cells[*t1], *i1, cells[*t2], *i2)?,
            _ => {
                return Err(MeshBuildError::NonManifoldFacet {
                    tetrahedron: sharing[0].0,
                    count: sharing.len(),
                });
            }
        }
    }
    // Deterministic fan construction regardless of hash order.
    boundary.sort_unstable();
    Ok(boundary)
}

/// Adds one infinite cell per boundary facet and links them to each other.
fn close_with_infinite_fan<K, U, V>(
    tds: &mut Tds<K, U, V>,
    boundary: &[(CellKey, usize)],
) -> Result<(), MeshBuildError>
where
    K: Kernel,
    U: DataType,
    V: DataType,
{
    let infinite = tds.infinite_vertex();
    let mut fan: Vec<CellKey> = Vec::with_capacity(boundary.len());
    for &(ck, i) in boundary {
        let Some(cell) = tds.get_cell(ck) else {
            return Err(TdsMutationError::CellNotFound { key: ck }.into());
        };
        // Same facet, opposite orientation: the infinite vertex takes slot i
        // and two facet vertices trade places.
        let mut vertices = *cell.vertices();
        vertices[i] = infinite;
        let (a, b) = match i {
            0 => (1, 2),
            1 => (0, 2),
            _ => (0, 1),
        };
        vertices.swap(a, b);

        let mut outside = Cell::unwired(SubdomainIndex::OUTSIDE, None, None);
        outside.set_vertices(vertices);
        let inf_cell = tds.insert_cell(outside)?;
        tds.set_adjacency(ck, i, inf_cell, i)?;
        fan.push(inf_cell);
    }

    let mut ring: FastHashMap<FacetVertexKeys, SmallBuffer<(CellKey, usize), 2>> =
        fast_hash_map_with_capacity(fan.len() * 3);
    for &ck in &fan {
        let Some(cell) = tds.get_cell(ck) else {
            continue;
        };
        for i in 0..4 {
            if cell.vertex(i) != infinite {
                ring.entry(cell.facet_key(i)).or_default().push((ck, i));
            }
        }
    }
    for (facet, sharing) in &ring {
        let [(c1, i1), (c2, i2)] = sharing.as_slice() else {
            return Err(MeshBuildError::NonManifoldBoundary {
                message: format!(
                    "boundary edge {:?}-{:?} is used by {} boundary triangles",
                    facet[0],
                    facet[1],
                    sharing.len()
                ),
            });
        };
        tds.set_adjacency(*c1, *i1, *c2, *i2)?;
    }
    Ok(())
}
