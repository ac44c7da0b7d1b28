//! Structured tetrahedral meshes for tests and benchmarks.
//!
//! Each unit cube of an axis-aligned grid is cut into six tetrahedra along
//! its main diagonal (Kuhn subdivision). All cubes use the same diagonal
//! direction, so the tetrahedra of neighboring cubes meet on whole triangles
//! and the result is a conforming mesh of the box.

#![forbid(unsafe_code)]

use thiserror::Error;

use super::conversions::safe_usize_to_scalar;
use crate::core::builder::{MeshBuildError, MeshBuilder};
use crate::core::cell::SubdomainIndex;
use crate::core::traits::data_type::DataType;
use crate::core::triangulation_data_structure::Tds;
use crate::geometry::kernel::Kernel;
use crate::geometry::traits::coordinate::{CoordinateConversionError, CoordinateScalar};

/// Axis orders of the six tetrahedra of a Kuhn cube.
const KUHN_PATHS: [[usize; 3]; 6] = [
    [0, 1, 2],
    [0, 2, 1],
    [1, 0, 2],
    [1, 2, 0],
    [2, 0, 1],
    [2, 1, 0],
];

/// Errors raised while generating a grid mesh.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GridGenerationError {
    /// A grid coordinate is not representable in the scalar type.
    #[error("Grid coordinate not representable: {0}")]
    Coordinate(#[from] CoordinateConversionError),
    /// The generated complex could not be closed into a mesh.
    #[error(transparent)]
    Build(#[from] MeshBuildError),
}

/// Points and tetrahedra of a Kuhn-subdivided box grid.
#[derive(Clone, Debug, PartialEq)]
pub struct GridComplex<T> {
    /// Grid points, x fastest.
    pub points: Vec<[T; 3]>,
    /// Tetrahedra as indices into `points`.
    pub tetrahedra: Vec<[usize; 4]>,
    /// Index of the cube each tetrahedron was cut from.
    pub cubes: Vec<[usize; 3]>,
}

/// Generates the points and tetrahedra of a grid with `cells_per_axis`
/// cubes of edge `spacing`, with its lower corner at the origin.
///
/// # Errors
///
/// Returns [`GridGenerationError::Coordinate`] if a grid index cannot be
/// represented exactly in `T`.
///
/// # Examples
///
/// ```
/// use tetra_remesh::geometry::util::triangulation_generation::grid_complex;
///
/// let grid = grid_complex::<f64>([2, 1, 1], 0.5).unwrap();
/// assert_eq!(grid.points.len(), 12);
/// assert_eq!(grid.tetrahedra.len(), 12);
/// assert_eq!(grid.points[11], [1.0, 0.5, 0.5]);
/// ```
pub fn grid_complex<T>(
    cells_per_axis: [usize; 3],
    spacing: T,
) -> Result<GridComplex<T>, GridGenerationError>
where
    T: CoordinateScalar,
{
    let [nx, ny, nz] = cells_per_axis;
    let index = |i: usize, j: usize, k: usize| i + (nx + 1) * (j + (ny + 1) * k);

    let mut points = Vec::with_capacity((nx + 1) * (ny + 1) * (nz + 1));
    for k in 0..=nz {
        for j in 0..=ny {
            for i in 0..=nx {
                points.push([
                    safe_usize_to_scalar::<T>(i)? * spacing,
                    safe_usize_to_scalar::<T>(j)? * spacing,
                    safe_usize_to_scalar::<T>(k)? * spacing,
                ]);
            }
        }
    }

    let cube_count = nx * ny * nz;
    let mut tetrahedra = Vec::with_capacity(cube_count * KUHN_PATHS.len());
    let mut cubes = Vec::with_capacity(cube_count * KUHN_PATHS.len());
    for k in 0..nz {
        for j in 0..ny {
            for i in 0..nx {
                for path in KUHN_PATHS {
                    let mut corner = [i, j, k];
                    let mut tet = [index(i, j, k); 4];
                    for (slot, axis) in path.into_iter().enumerate() {
                        corner[axis] += 1;
                        tet[slot + 1] = index(corner[0], corner[1], corner[2]);
                    }
                    tetrahedra.push(tet);
                    cubes.push([i, j, k]);
                }
            }
        }
    }

    Ok(GridComplex {
        points,
        tetrahedra,
        cubes,
    })
}

/// Builds a closed mesh of a Kuhn-subdivided grid, all in subdomain 1.
///
/// # Errors
///
/// See [`generate_grid_triangulation_with_subdomains`].
///
/// # Examples
///
/// ```
/// use tetra_remesh::core::triangulation_data_structure::Tds;
/// use tetra_remesh::geometry::kernel::FastKernel;
/// use tetra_remesh::geometry::util::triangulation_generation::generate_grid_triangulation;
///
/// let tds: Tds<FastKernel<f64>> = generate_grid_triangulation([2, 2, 2], 1.0).unwrap();
/// assert_eq!(tds.number_of_finite_vertices(), 27);
/// assert_eq!(tds.number_of_finite_cells(), 48);
/// assert!(tds.is_valid().is_ok());
/// ```
pub fn generate_grid_triangulation<K, U, V>(
    cells_per_axis: [usize; 3],
    spacing: K::Scalar,
) -> Result<Tds<K, U, V>, GridGenerationError>
where
    K: Kernel,
    U: DataType,
    V: DataType,
{
    generate_grid_triangulation_with_subdomains(cells_per_axis, spacing, |_| SubdomainIndex(1))
}

/// Builds a closed mesh of a Kuhn-subdivided grid, assigning each
/// tetrahedron the subdomain `subdomain_of(cube)` of the cube it lies in.
///
/// # Errors
///
/// Returns [`GridGenerationError::Coordinate`] for unrepresentable grid
/// coordinates and [`GridGenerationError::Build`] if the complex cannot be
/// closed (for example a non-positive `spacing`, which flattens every cell).
pub fn generate_grid_triangulation_with_subdomains<K, U, V, F>(
    cells_per_axis: [usize; 3],
    spacing: K::Scalar,
    subdomain_of: F,
) -> Result<Tds<K, U, V>, GridGenerationError>
where
    K: Kernel,
    U: DataType,
    V: DataType,
    F: Fn([usize; 3]) -> SubdomainIndex,
{
    let grid = grid_complex(cells_per_axis, spacing)?;
    let subdomains: Vec<SubdomainIndex> = grid.cubes.iter().map(|&c| subdomain_of(c)).collect();
    let tds = MeshBuilder::new()
        .points(grid.points)
        .tetrahedra(grid.tetrahedra)
        .subdomains(subdomains)
        .build()?;
    tracing::debug!(
        cells_per_axis = ?cells_per_axis,
        vertices = tds.number_of_vertices(),
        cells = tds.number_of_cells(),
        "generated grid mesh"
    );
    Ok(tds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::kernel::FastKernel;
    use crate::geometry::traits::coordinate::Coordinate;

    #[test]
    fn kuhn_cube_has_six_tets_on_the_main_diagonal() {
        let grid = grid_complex::<f64>([1, 1, 1], 1.0).unwrap();
        assert_eq!(grid.tetrahedra.len(), 6);
        for tet in &grid.tetrahedra {
            assert_eq!(tet[0], 0);
            assert_eq!(tet[3], 7);
        }
    }

    #[test]
    fn grid_mesh_counts() {
        let tds: Tds<FastKernel<f64>> = generate_grid_triangulation([3, 2, 1], 0.25).unwrap();
        assert_eq!(tds.number_of_finite_vertices(), 4 * 3 * 2);
        assert_eq!(tds.number_of_finite_cells(), 36);
        // One infinite cell per boundary triangle: 2 per boundary square.
        let boundary_squares = 2 * (3 * 2 + 3 + 2);
        assert_eq!(
            tds.number_of_cells() - tds.number_of_finite_cells(),
            2 * boundary_squares
        );
        assert!(tds.is_valid().is_ok());

        let max_x = tds
            .finite_vertices()
            .filter_map(|(_, v)| v.point().map(Coordinate::to_array))
            .map(|p| p[0])
            .fold(0.0_f64, f64::max);
        approx::assert_relative_eq!(max_x, 0.75);
    }

    #[test]
    fn subdomains_follow_cubes() {
        let tds: Tds<FastKernel<f64>> =
            generate_grid_triangulation_with_subdomains([2, 1, 1], 1.0, |[i, _, _]| {
                SubdomainIndex(i32::from(i == 0) + 1)
            })
            .unwrap();
        let in_first = tds
            .finite_cells()
            .filter(|(_, c)| c.subdomain() == SubdomainIndex(2))
            .count();
        assert_eq!(in_first, 6);
    }

    #[test]
    fn zero_spacing_is_rejected() {
        let result: Result<Tds<FastKernel<f64>>, _> = generate_grid_triangulation([1, 1, 1], 0.0);
        assert!(matches!(
            result,
            Err(GridGenerationError::Build(MeshBuildError::DegenerateTetrahedron { .. }))
        ));
    }
}
