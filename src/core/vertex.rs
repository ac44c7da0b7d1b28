//! Vertices of a tetrahedral mesh.
//!
//! A [`Vertex`] carries an optional 3D point, an identity stamp, the
//! dimension of the input feature it was classified onto, a hint to one
//! incident cell and optional user data. The point is `None` only for the
//! infinite vertex of a [`Tds`](crate::core::Tds).
//!
//! ```rust
//! use tetra_remesh::core::vertex::{FeatureDimension, Vertex};
//! use tetra_remesh::vertex;
//!
//! let v: Vertex<f64, ()> = vertex!([1.0, 2.0, 3.0]);
//! assert!(!v.is_infinite());
//! assert_eq!(v.dimension(), FeatureDimension::Unset);
//!
//! let tagged: Vertex<f64, u32> = vertex!([0.0, 0.0, 0.0], 7_u32);
//! assert_eq!(tagged.data, Some(7));
//! ```

#![forbid(unsafe_code)]

use super::{
    traits::DataType,
    triangulation_data_structure::CellKey,
    util::{UNSET_STAMP, UuidValidationError, make_uuid, validate_uuid},
};
use crate::geometry::{
    point::Point,
    traits::coordinate::{Coordinate, CoordinateScalar, CoordinateValidationError},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors from [`Vertex::is_valid`].
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum VertexValidationError {
    /// The point has a NaN or infinite coordinate.
    #[error("Invalid point: {source}")]
    InvalidPoint {
        /// Underlying coordinate error.
        #[from]
        source: CoordinateValidationError,
    },
    /// The identity stamp is unset or malformed.
    #[error("Invalid UUID: {source}")]
    InvalidUuid {
        /// Underlying UUID error.
        #[from]
        source: UuidValidationError,
    },
}

// =============================================================================
// FEATURE DIMENSION
// =============================================================================

/// Topological dimension of the input feature a vertex lies on.
///
/// Remeshing passes use it to keep vertices on corners, sharp curves and
/// surface patches from drifting into the volume.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FeatureDimension {
    /// Not classified yet.
    #[default]
    Unset,
    /// Isolated corner (dimension 0).
    Corner,
    /// Sharp curve (dimension 1).
    Curve,
    /// Surface patch (dimension 2).
    Surface,
    /// Volume interior (dimension 3).
    Volume,
}

impl FeatureDimension {
    /// Maps an integer dimension to a feature dimension; anything outside
    /// `0..=3` is `Unset`.
    ///
    /// ```
    /// use tetra_remesh::core::vertex::FeatureDimension;
    ///
    /// assert_eq!(FeatureDimension::from_index(2), FeatureDimension::Surface);
    /// assert_eq!(FeatureDimension::from_index(-1), FeatureDimension::Unset);
    /// assert_eq!(FeatureDimension::Curve.index(), 1);
    /// ```
    #[must_use]
    pub const fn from_index(index: i32) -> Self {
        match index {
            0 => Self::Corner,
            1 => Self::Curve,
            2 => Self::Surface,
            3 => Self::Volume,
            _ => Self::Unset,
        }
    }

    /// Integer dimension, `-1` when unset.
    #[must_use]
    pub const fn index(self) -> i32 {
        match self {
            Self::Unset => -1,
            Self::Corner => 0,
            Self::Curve => 1,
            Self::Surface => 2,
            Self::Volume => 3,
        }
    }
}

// =============================================================================
// CONVENIENCE MACROS
// =============================================================================

/// Builds a finite [`Vertex`] from a coordinate array and optional data.
///
/// # Panics
///
/// Panics if a coordinate cannot be represented in the target scalar type.
///
/// ```rust
/// use tetra_remesh::core::vertex::Vertex;
/// use tetra_remesh::vertex;
///
/// let v: Vertex<f32, ()> = vertex!([0.5, 1.5, 2.5]);
/// let w: Vertex<f64, i32> = vertex!([0.0, 1.0, 2.0], 42);
/// assert_eq!(w.data, Some(42));
/// # let _ = v;
/// ```
#[macro_export]
macro_rules! vertex {
    ($coords:expr) => {
        $crate::core::vertex::VertexBuilder::<_, ()>::default()
            .point($crate::geometry::point::Point::try_from($coords)
                .expect("Failed to convert coordinates to Point: invalid or out-of-range values"))
            .build()
            .expect("Failed to build vertex: invalid coordinates or builder configuration")
    };

    ($coords:expr, $data:expr) => {
        $crate::core::vertex::VertexBuilder::default()
            .point($crate::geometry::point::Point::try_from($coords)
                .expect("Failed to convert coordinates to Point: invalid or out-of-range values"))
            .data($data)
            .build()
            .expect("Failed to build vertex with data: invalid coordinates, data, or builder configuration")
    };
}

pub use crate::vertex;

// =============================================================================
// VERTEX
// =============================================================================

/// A mesh vertex.
///
/// # Generic Parameters
///
/// * `T` - coordinate scalar of the owning mesh's kernel
/// * `U` - user data type (use `()` for none)
///
/// Equality compares the point, the feature dimension and the data; the
/// identity stamp and the incident-cell hint are mesh-local and ignored.
#[derive(Builder, Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(bound(
    serialize = "T: CoordinateScalar, U: DataType",
    deserialize = "T: CoordinateScalar, U: DataType"
))]
pub struct Vertex<T, U>
where
    T: CoordinateScalar,
    U: DataType,
{
    /// Position; `None` only for the infinite vertex.
    #[builder(setter(strip_option), default)]
    point: Option<Point<T, 3>>,
    /// Identity stamp.
    #[builder(setter(skip), default = "make_uuid()")]
    uuid: Uuid,
    /// Feature dimension.
    #[builder(default)]
    #[serde(default)]
    dimension: FeatureDimension,
    /// One cell containing this vertex. Maintained by the owning `Tds`.
    #[builder(setter(skip), default = "None")]
    #[serde(skip)]
    pub incident_cell: Option<CellKey>,
    /// Optional user data.
    #[builder(setter(into, strip_option), default)]
    #[serde(default)]
    pub data: Option<U>,
}

impl<T, U> Vertex<T, U>
where
    T: CoordinateScalar,
    U: DataType,
{
    /// The empty sentinel: no point, unset stamp, unset dimension, no data.
    ///
    /// This is what the infinite vertex of a freshly created or cleared mesh
    /// looks like.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            point: None,
            uuid: UNSET_STAMP,
            dimension: FeatureDimension::Unset,
            incident_cell: None,
            data: None,
        }
    }

    /// Builds a vertex that has not been adopted by any mesh yet.
    ///
    /// The stamp is unset; the mesh assigns one on insertion.
    #[must_use]
    pub const fn unstamped(
        point: Option<Point<T, 3>>,
        dimension: FeatureDimension,
        data: Option<U>,
    ) -> Self {
        Self {
            point,
            uuid: UNSET_STAMP,
            dimension,
            incident_cell: None,
            data,
        }
    }

    /// Position of the vertex, `None` for the infinite vertex.
    #[inline]
    #[must_use]
    pub const fn point(&self) -> Option<&Point<T, 3>> {
        self.point.as_ref()
    }

    /// Replaces the position.
    #[inline]
    pub fn set_point(&mut self, point: Option<Point<T, 3>>) {
        self.point = point;
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

    /// Feature dimension.
    #[inline]
    #[must_use]
    pub const fn dimension(&self) -> FeatureDimension {
        self.dimension
    }

    /// Sets the feature dimension.
    #[inline]
    pub fn set_dimension(&mut self, dimension: FeatureDimension) {
        self.dimension = dimension;
    }

    /// `true` when the vertex has no point.
    #[inline]
    #[must_use]
    pub const fn is_infinite(&self) -> bool {
        self.point.is_none()
    }

    /// Checks the point coordinates and the identity stamp.
    ///
    /// # Errors
    ///
    /// Returns [`VertexValidationError`] if a coordinate is not finite or the
    /// stamp is unset or not a v4 UUID.
    pub fn is_valid(&self) -> Result<(), VertexValidationError> {
        if let Some(point) = &self.point {
            point.validate()?;
        }
        validate_uuid(&self.uuid)?;
        Ok(())
    }
}

impl<T, U> Default for Vertex<T, U>
where
    T: CoordinateScalar,
    U: DataType,
{
    fn default() -> Self {
        Self::empty()
    }
}

impl<T, U> PartialEq for Vertex<T, U>
where
    T: CoordinateScalar,
    U: DataType,
{
    fn eq(&self, other: &Self) -> bool {
        self.point == other.point && self.dimension == other.dimension && self.data == other.data
    }
}

impl<T, U> Eq for Vertex<T, U>
where
    T: CoordinateScalar,
    U: DataType,
{
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_macro_assigns_fresh_stamp() {
        let v: Vertex<f64, ()> = vertex!([1.0, 2.0, 3.0]);
        assert!(v.is_valid().is_ok());
        assert_eq!(v.point().map(Coordinate::to_array), Some([1.0, 2.0, 3.0]));
        assert!(v.incident_cell.is_none());
    }

    #[test]
    fn empty_vertex_is_infinite_and_unstamped() {
        let v: Vertex<f64, ()> = Vertex::empty();
        assert!(v.is_infinite());
        assert!(v.uuid().is_nil());
        assert!(matches!(
            v.is_valid(),
            Err(VertexValidationError::InvalidUuid { .. })
        ));
    }

    #[test]
    fn builder_sets_dimension_and_data() {
        let v: Vertex<f32, u8> = VertexBuilder::default()
            .point(Point::new([0.0, 1.0, 0.0]))
            .dimension(FeatureDimension::Surface)
            .data(3_u8)
            .build()
            .unwrap();
        assert_eq!(v.dimension().index(), 2);
        assert_eq!(v.data, Some(3));
    }

    #[test]
    fn equality_ignores_identity() {
        let a: Vertex<f64, ()> = vertex!([0.0, 0.0, 1.0]);
        let mut b = a;
        b.clear_uuid();
        assert_eq!(a, b);
        b.set_dimension(FeatureDimension::Volume);
        assert_ne!(a, b);
    }

    #[test]
    fn invalid_point_is_reported() {
        let v: Vertex<f64, ()> =
            Vertex::unstamped(Some(Point::new([f64::NAN, 0.0, 0.0])), FeatureDimension::Unset, None);
        assert!(matches!(
            v.is_valid(),
            Err(VertexValidationError::InvalidPoint { .. })
        ));
    }

    #[test]
    fn feature_dimension_index_roundtrip() {
        for i in -1..=3 {
            assert_eq!(FeatureDimension::from_index(i).index(), i);
        }
        assert_eq!(FeatureDimension::from_index(9), FeatureDimension::Unset);
    }

    #[test]
    fn vertex_serde_skips_incident_cell() {
        let v: Vertex<f64, i32> = vertex!([1.0, 0.0, 0.0], 5);
        let json = serde_json::to_string(&v).unwrap();
        assert!(!json.contains("incident_cell"));
        let back: Vertex<f64, i32> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
        assert_eq!(back.uuid(), v.uuid());
    }
}
