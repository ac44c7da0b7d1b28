//! Geometric kernels and conversions between them.
//!
//! The mesh layer is purely combinatorial. Everything that needs numbers
//! (orienting a tetrahedron when a mesh is built, placing the vertex created
//! by an edge split, moving a point into another scalar type) goes through a
//! [`Kernel`].

use core::marker::PhantomData;

use crate::geometry::point::Point;
use crate::geometry::traits::coordinate::{
    Coordinate, CoordinateConversionError, CoordinateScalar,
};
use crate::geometry::util::conversions::{safe_cast_coords, safe_coords_to_f64};

/// Geometric kernel over 3D points.
///
/// A kernel fixes the scalar type of the points a mesh stores and supplies
/// the few constructions the combinatorial algorithms need.
///
/// # Examples
///
/// ```
/// use tetra_remesh::geometry::kernel::{FastKernel, Kernel};
/// use tetra_remesh::geometry::point::Point;
/// use tetra_remesh::geometry::traits::coordinate::Coordinate;
///
/// let kernel = FastKernel::<f64>::new();
/// let tet = [
///     Point::new([0.0, 0.0, 0.0]),
///     Point::new([1.0, 0.0, 0.0]),
///     Point::new([0.0, 1.0, 0.0]),
///     Point::new([0.0, 0.0, 1.0]),
/// ];
/// assert_eq!(kernel.orientation(&tet).unwrap(), 1);
///
/// let m = kernel.midpoint(&tet[0], &tet[1]);
/// assert_eq!(m.to_array(), [0.5, 0.0, 0.0]);
/// ```
pub trait Kernel: Clone + Default + core::fmt::Debug + Send + Sync + 'static {
    /// Scalar type of the kernel's coordinates.
    type Scalar: CoordinateScalar;

    /// Sign of the signed volume of the tetrahedron `points[0..4]`.
    ///
    /// Returns `1` for positive orientation (`points[3]` lies on the side of
    /// the plane through the first three points that the right-hand normal
    /// points to), `-1` for negative and `0` for coplanar points.
    ///
    /// # Errors
    ///
    /// Returns `CoordinateConversionError` if a coordinate is not finite.
    fn orientation(
        &self,
        points: &[Point<Self::Scalar, 3>; 4],
    ) -> Result<i32, CoordinateConversionError>;

    /// Midpoint of the segment `pq`.
    fn midpoint(
        &self,
        p: &Point<Self::Scalar, 3>,
        q: &Point<Self::Scalar, 3>,
    ) -> Point<Self::Scalar, 3>;
}

/// Plain floating-point kernel.
///
/// Orientation is evaluated in `f64` with a tolerance relative to the
/// product of the edge lengths at `points[0]`; nearly flat tetrahedra
/// report `0`.
#[derive(Clone, Copy, Default, Debug)]
pub struct FastKernel<T: CoordinateScalar> {
    _phantom: PhantomData<T>,
}

impl<T: CoordinateScalar> FastKernel<T> {
    /// Creates a fast kernel.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<T> Kernel for FastKernel<T>
where
    T: CoordinateScalar,
{
    type Scalar = T;

    fn orientation(
        &self,
        points: &[Point<T, 3>; 4],
    ) -> Result<i32, CoordinateConversionError> {
        let a = safe_coords_to_f64(points[0].to_array())?;
        let mut rows = [[0.0_f64; 3]; 3];
        let mut bound = 1.0_f64;
        for (row, point) in rows.iter_mut().zip(&points[1..]) {
            let p = safe_coords_to_f64(point.to_array())?;
            for k in 0..3 {
                row[k] = p[k] - a[k];
            }
            bound *= row[0].hypot(row[1]).hypot(row[2]);
        }

        let det = rows[0][0].mul_add(
            rows[1][1].mul_add(rows[2][2], -(rows[1][2] * rows[2][1])),
            rows[0][1].mul_add(
                rows[1][2].mul_add(rows[2][0], -(rows[1][0] * rows[2][2])),
                rows[0][2] * rows[1][0].mul_add(rows[2][1], -(rows[1][1] * rows[2][0])),
            ),
        );

        // Hadamard bound: |det| <= product of the row lengths.
        let tolerance = 1e-12 * bound;
        Ok(if det > tolerance {
            1
        } else if det < -tolerance {
            -1
        } else {
            0
        })
    }

    fn midpoint(&self, p: &Point<T, 3>, q: &Point<T, 3>) -> Point<T, 3> {
        let half = T::one() / (T::one() + T::one());
        let (p, q) = (p.to_array(), q.to_array());
        Point::new([
            (p[0] + q[0]) * half,
            (p[1] + q[1]) * half,
            (p[2] + q[2]) * half,
        ])
    }
}

/// Converts points from the coordinate representation of kernel `Ks` into
/// that of kernel `Kt`.
///
/// Every coordinate goes through a checked cast: values that are not finite,
/// or that overflow the target scalar, are rejected instead of saturating.
///
/// ```
/// use tetra_remesh::geometry::kernel::{CartesianConverter, FastKernel};
/// use tetra_remesh::geometry::point::Point;
/// use tetra_remesh::geometry::traits::coordinate::Coordinate;
///
/// let to_f32 = CartesianConverter::<FastKernel<f64>, FastKernel<f32>>::new();
/// let p = to_f32.convert(&Point::new([0.5, 1.0, -2.0])).unwrap();
/// assert_eq!(p.to_array(), [0.5f32, 1.0, -2.0]);
///
/// assert!(to_f32.convert(&Point::new([1.0e300, 0.0, 0.0])).is_err());
/// ```
#[derive(Debug)]
pub struct CartesianConverter<Ks, Kt> {
    _kernels: PhantomData<fn(Ks) -> Kt>,
}

impl<Ks, Kt> CartesianConverter<Ks, Kt>
where
    Ks: Kernel,
    Kt: Kernel,
{
    /// Creates a converter.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _kernels: PhantomData,
        }
    }

    /// Converts a single point.
    ///
    /// # Errors
    ///
    /// Returns `CoordinateConversionError` naming the first coordinate that
    /// cannot be represented in `Kt::Scalar`.
    pub fn convert(
        &self,
        point: &Point<Ks::Scalar, 3>,
    ) -> Result<Point<Kt::Scalar, 3>, CoordinateConversionError> {
        let coords = safe_cast_coords::<Ks::Scalar, Kt::Scalar, 3>(point.to_array())?;
        Ok(Point::new(coords))
    }
}

impl<Ks, Kt> Clone for CartesianConverter<Ks, Kt> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<Ks, Kt> Copy for CartesianConverter<Ks, Kt> {}

impl<Ks, Kt> Default for CartesianConverter<Ks, Kt> {
    fn default() -> Self {
        Self {
            _kernels: PhantomData,
        }
    }
}
