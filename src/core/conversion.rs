//! Per-element conversion between two mesh representations.
//!
//! A clone from `Tds<Ks, Us, Vs>` into `Tds<Kt, Ut, Vt>` needs one
//! [`VertexConverter`] and one [`CellConverter`], bundled as a
//! [`ConversionPolicy`]. Converters never touch combinatorics: vertex keys,
//! neighbor slots and incident-cell hints are wired by the clone engine.
//! They always reset the identity stamp, because stamps are mesh-local.
//!
//! Two policies are provided:
//!
//! | Policy | Point | Dimension | Vertex data | Subdomain | Cell data | `input_cell` |
//! |---|---|---|---|---|---|---|
//! | [`FreshConversion`] | converted | forced to `Volume` | dropped | copied | dropped | `None` |
//! | [`PreservingConversion`] | converted | copied | `Ut::from` | copied | `Vt::from` | source key |
//!
//! # Examples
//!
//! ```rust
//! use tetra_remesh::core::conversion::{FreshConversion, VertexConverter as _};
//! use tetra_remesh::core::triangulation_data_structure::VertexKey;
//! use tetra_remesh::core::vertex::{FeatureDimension, Vertex};
//! use tetra_remesh::geometry::kernel::FastKernel;
//! use tetra_remesh::vertex;
//!
//! let policy = FreshConversion::<FastKernel<f64>, FastKernel<f32>>::fresh();
//! let source: Vertex<f64, u32> = vertex!([1.0, 2.0, 3.0], 9_u32);
//!
//! let target: Vertex<f32, ()> = policy.vertex.create(VertexKey::default(), &source).unwrap();
//! assert_eq!(target.dimension(), FeatureDimension::Volume);
//! assert!(target.uuid().is_nil());
//! ```

use std::fmt;

use thiserror::Error;

use crate::core::cell::Cell;
use crate::core::traits::DataType;
use crate::core::triangulation_data_structure::{CellKey, VertexKey};
use crate::core::vertex::{FeatureDimension, Vertex};
use crate::geometry::kernel::{CartesianConverter, Kernel};
use crate::geometry::point::Point;
use crate::geometry::traits::coordinate::CoordinateConversionError;

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Source element a conversion failure refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ElementRef {
    /// A source vertex.
    Vertex(VertexKey),
    /// A source cell.
    Cell(CellKey),
}

impl fmt::Display for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vertex(key) => write!(f, "vertex {key:?}"),
            Self::Cell(key) => write!(f, "cell {key:?}"),
        }
    }
}

/// A converter could not produce a target element.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ConversionError {
    /// A coordinate is not representable in the target kernel.
    #[error("Cannot convert the point of {element}: {source}")]
    Coordinate {
        /// The failing source element.
        element: ElementRef,
        /// Underlying coordinate error.
        source: CoordinateConversionError,
    },
}

impl ConversionError {
    /// The source element the failure refers to.
    #[must_use]
    pub const fn element(&self) -> ElementRef {
        match self {
            Self::Coordinate { element, .. } => *element,
        }
    }
}

// =============================================================================
// CONVERTER TRAITS
// =============================================================================

/// Produces a target vertex from a source vertex.
///
/// `create` and `update` must agree: applying `update` to any target yields
/// the same payload `create` would, and applying it twice is the same as
/// applying it once.
pub trait VertexConverter<Ks, Us, Kt, Ut>
where
    Ks: Kernel,
    Us: DataType,
    Kt: Kernel,
    Ut: DataType,
{
    /// Builds an unstamped target vertex.
    ///
    /// # Errors
    ///
    /// Returns [`ConversionError`] if the point cannot be converted.
    fn create(
        &self,
        key: VertexKey,
        source: &Vertex<Ks::Scalar, Us>,
    ) -> Result<Vertex<Kt::Scalar, Ut>, ConversionError>;

    /// Overwrites the payload of `target` from `source` and resets its stamp.
    ///
    /// The incident-cell hint is left alone.
    ///
    /// # Errors
    ///
    /// Returns [`ConversionError`] if the point cannot be converted; `target`
    /// is unchanged in that case.
    fn update(
        &self,
        key: VertexKey,
        source: &Vertex<Ks::Scalar, Us>,
        target: &mut Vertex<Kt::Scalar, Ut>,
    ) -> Result<(), ConversionError>;
}

/// Produces a target cell payload from a source cell.
///
/// Vertex and neighbor slots of the result are unwired; the clone engine
/// fills them.
pub trait CellConverter<Vs, Vt>
where
    Vs: DataType,
    Vt: DataType,
{
    /// Builds an unstamped, unwired target cell.
    ///
    /// # Errors
    ///
    /// Returns [`ConversionError`] if the payload cannot be converted.
    fn create(&self, key: CellKey, source: &Cell<Vs>) -> Result<Cell<Vt>, ConversionError>;

    /// Overwrites the payload of `target` from `source` and resets its stamp.
    ///
    /// Vertex and neighbor slots are left alone.
    ///
    /// # Errors
    ///
    /// Returns [`ConversionError`] if the payload cannot be converted.
    fn update(
        &self,
        key: CellKey,
        source: &Cell<Vs>,
        target: &mut Cell<Vt>,
    ) -> Result<(), ConversionError>;
}

// =============================================================================
// POLICY
// =============================================================================

/// A vertex converter paired with a cell converter.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConversionPolicy<VC, CC> {
    /// Converts vertices.
    pub vertex: VC,
    /// Converts cells.
    pub cell: CC,
}

impl<VC, CC> ConversionPolicy<VC, CC> {
    /// Pairs two converters.
    pub const fn new(vertex: VC, cell: CC) -> Self {
        Self { vertex, cell }
    }
}

/// Drops user data and classifies every vertex as volume.
pub type FreshConversion<Ks, Kt> =
    ConversionPolicy<FreshVertexConverter<Ks, Kt>, FreshCellConverter>;

/// Carries dimension and user data, and records the source cell.
pub type PreservingConversion<Ks, Kt> =
    ConversionPolicy<PreservingVertexConverter<Ks, Kt>, PreservingCellConverter>;

impl<Ks, Kt> FreshConversion<Ks, Kt>
where
    Ks: Kernel,
    Kt: Kernel,
{
    /// The fresh policy.
    #[must_use]
    pub const fn fresh() -> Self {
        Self::new(FreshVertexConverter::new(), FreshCellConverter)
    }
}

impl<Ks, Kt> PreservingConversion<Ks, Kt>
where
    Ks: Kernel,
    Kt: Kernel,
{
    /// The preserving policy.
    #[must_use]
    pub const fn preserving() -> Self {
        Self::new(PreservingVertexConverter::new(), PreservingCellConverter)
    }
}

fn convert_point<Ks, Kt>(
    converter: &CartesianConverter<Ks, Kt>,
    key: VertexKey,
    point: Option<&Point<Ks::Scalar, 3>>,
) -> Result<Option<Point<Kt::Scalar, 3>>, ConversionError>
where
    Ks: Kernel,
    Kt: Kernel,
{
    point
        .map(|p| converter.convert(p))
        .transpose()
        .map_err(|source| ConversionError::Coordinate {
            element: ElementRef::Vertex(key),
            source,
        })
}

// =============================================================================
// FRESH CONVERTERS
// =============================================================================

/// Vertex half of [`FreshConversion`].
#[derive(Debug)]
pub struct FreshVertexConverter<Ks, Kt> {
    points: CartesianConverter<Ks, Kt>,
}

impl<Ks, Kt> FreshVertexConverter<Ks, Kt>
where
    Ks: Kernel,
    Kt: Kernel,
{
    /// Creates the converter.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            points: CartesianConverter::new(),
        }
    }
}

impl<Ks, Kt> Clone for FreshVertexConverter<Ks, Kt> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<Ks, Kt> Copy for FreshVertexConverter<Ks, Kt> {}

impl<Ks, Kt> Default for FreshVertexConverter<Ks, Kt> {
    fn default() -> Self {
        Self {
            points: CartesianConverter::default(),
        }
    }
}

impl<Ks, Us, Kt, Ut> VertexConverter<Ks, Us, Kt, Ut> for FreshVertexConverter<Ks, Kt>
where
    Ks: Kernel,
    Us: DataType,
    Kt: Kernel,
    Ut: DataType,
{
    fn create(
        &self,
        key: VertexKey,
        source: &Vertex<Ks::Scalar, Us>,
    ) -> Result<Vertex<Kt::Scalar, Ut>, ConversionError> {
        let point = convert_point(&self.points, key, source.point())?;
        Ok(Vertex::unstamped(point, FeatureDimension::Volume, None))
    }

    fn update(
        &self,
        key: VertexKey,
        source: &Vertex<Ks::Scalar, Us>,
        target: &mut Vertex<Kt::Scalar, Ut>,
    ) -> Result<(), ConversionError> {
        let point = convert_point(&self.points, key, source.point())?;
        target.set_point(point);
        target.set_dimension(FeatureDimension::Volume);
        target.data = None;
        target.clear_uuid();
        Ok(())
    }
}

/// Cell half of [`FreshConversion`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FreshCellConverter;

impl<Vs, Vt> CellConverter<Vs, Vt> for FreshCellConverter
where
    Vs: DataType,
    Vt: DataType,
{
    fn create(&self, _key: CellKey, source: &Cell<Vs>) -> Result<Cell<Vt>, ConversionError> {
        Ok(Cell::unwired(source.subdomain(), None, None))
    }

    fn update(
        &self,
        _key: CellKey,
        source: &Cell<Vs>,
        target: &mut Cell<Vt>,
    ) -> Result<(), ConversionError> {
        target.set_subdomain(source.subdomain());
        target.data = None;
        target.set_input_cell(None);
        target.clear_uuid();
        Ok(())
    }
}

// =============================================================================
// PRESERVING CONVERTERS
// =============================================================================

/// Vertex half of [`PreservingConversion`].
#[derive(Debug)]
pub struct PreservingVertexConverter<Ks, Kt> {
    points: CartesianConverter<Ks, Kt>,
}

impl<Ks, Kt> PreservingVertexConverter<Ks, Kt>
where
    Ks: Kernel,
    Kt: Kernel,
{
    /// Creates the converter.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            points: CartesianConverter::new(),
        }
    }
}

impl<Ks, Kt> Clone for PreservingVertexConverter<Ks, Kt> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<Ks, Kt> Copy for PreservingVertexConverter<Ks, Kt> {}

impl<Ks, Kt> Default for PreservingVertexConverter<Ks, Kt> {
    fn default() -> Self {
        Self {
            points: CartesianConverter::default(),
        }
    }
}

impl<Ks, Us, Kt, Ut> VertexConverter<Ks, Us, Kt, Ut> for PreservingVertexConverter<Ks, Kt>
where
    Ks: Kernel,
    Us: DataType,
    Kt: Kernel,
    Ut: DataType + From<Us>,
{
    fn create(
        &self,
        key: VertexKey,
        source: &Vertex<Ks::Scalar, Us>,
    ) -> Result<Vertex<Kt::Scalar, Ut>, ConversionError> {
        let point = convert_point(&self.points, key, source.point())?;
        Ok(Vertex::unstamped(
            point,
            source.dimension(),
            source.data.map(Ut::from),
        ))
    }

    fn update(
        &self,
        key: VertexKey,
        source: &Vertex<Ks::Scalar, Us>,
        target: &mut Vertex<Kt::Scalar, Ut>,
    ) -> Result<(), ConversionError> {
        let point = convert_point(&self.points, key, source.point())?;
        target.set_point(point);
        target.set_dimension(source.dimension());
        target.data = source.data.map(Ut::from);
        target.clear_uuid();
        Ok(())
    }
}

/// Cell half of [`PreservingConversion`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PreservingCellConverter;

impl<Vs, Vt> CellConverter<Vs, Vt> for PreservingCellConverter
where
    Vs: DataType,
    Vt: DataType + From<Vs>,
{
    fn create(&self, key: CellKey, source: &Cell<Vs>) -> Result<Cell<Vt>, ConversionError> {
        Ok(Cell::unwired(
            source.subdomain(),
            source.data.map(Vt::from),
            Some(key),
        ))
    }

    fn update(
        &self,
        key: CellKey,
        source: &Cell<Vs>,
        target: &mut Cell<Vt>,
    ) -> Result<(), ConversionError> {
        target.set_subdomain(source.subdomain());
        target.data = source.data.map(Vt::from);
        target.set_input_cell(Some(key));
        target.clear_uuid();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cell::SubdomainIndex;
    use crate::geometry::kernel::FastKernel;
    use crate::geometry::traits::coordinate::Coordinate;
    use crate::vertex;
    use slotmap::KeyData;

    type F64 = FastKernel<f64>;
    type F32 = FastKernel<f32>;

    fn cell_key(n: u64) -> CellKey {
        CellKey::from(KeyData::from_ffi(n))
    }

    #[test]
    fn fresh_vertex_drops_data_and_forces_volume() {
        let conv = FreshVertexConverter::<F64, F32>::new();
        let mut source: Vertex<f64, i32> = vertex!([0.25, 0.5, 1.0], 7);
        source.set_dimension(FeatureDimension::Curve);

        let target: Vertex<f32, i32> = conv.create(VertexKey::default(), &source).unwrap();
        assert_eq!(target.point().map(Coordinate::to_array), Some([0.25, 0.5, 1.0]));
        assert_eq!(target.dimension(), FeatureDimension::Volume);
        assert_eq!(target.data, None);
        assert!(target.uuid().is_nil());
    }

    #[test]
    fn preserving_vertex_carries_dimension_and_widened_data() {
        let conv = PreservingVertexConverter::<F32, F64>::new();
        let mut source: Vertex<f32, u8> = vertex!([1.0, 2.0, 3.0], 200_u8);
        source.set_dimension(FeatureDimension::Corner);

        let target: Vertex<f64, u32> = conv.create(VertexKey::default(), &source).unwrap();
        assert_eq!(target.dimension(), FeatureDimension::Corner);
        assert_eq!(target.data, Some(200_u32));
    }

    #[test]
    fn update_is_idempotent_and_matches_create() {
        let conv = PreservingVertexConverter::<F64, F64>::new();
        let source: Vertex<f64, u16> = vertex!([4.0, 5.0, 6.0], 3_u16);
        let created: Vertex<f64, u16> = conv.create(VertexKey::default(), &source).unwrap();

        let mut target: Vertex<f64, u16> =
            Vertex::unstamped(Some(Point::new([0.0; 3])), FeatureDimension::Unset, None);
        conv.update(VertexKey::default(), &source, &mut target).unwrap();
        let once = target;
        conv.update(VertexKey::default(), &source, &mut target).unwrap();
        assert_eq!(target, once);
        assert_eq!(target, created);
        assert_eq!(target.uuid(), once.uuid());
    }

    #[test]
    fn infinite_vertex_converts_to_pointless_vertex() {
        let conv = FreshVertexConverter::<F64, F32>::new();
        let source: Vertex<f64, ()> = Vertex::empty();
        let target: Vertex<f32, ()> = conv.create(VertexKey::default(), &source).unwrap();
        assert!(target.is_infinite());
    }

    #[test]
    fn unrepresentable_point_names_the_vertex() {
        let conv = FreshVertexConverter::<F64, F32>::new();
        let key = VertexKey::from(KeyData::from_ffi(5));
        let source: Vertex<f64, ()> = vertex!([1.0e300, 0.0, 0.0]);
        let mut target: Vertex<f32, ()> = vertex!([1.0, 1.0, 1.0]);
        let before = target;

        let err = conv.update(key, &source, &mut target).unwrap_err();
        assert_eq!(err.element(), ElementRef::Vertex(key));
        assert_eq!(target, before);
    }

    #[test]
    fn cell_converters_copy_subdomain() {
        let mut source = Cell::<u8>::unwired(SubdomainIndex(3), Some(9), None);
        source.set_uuid(crate::core::util::make_uuid());

        let fresh: Cell<u8> = FreshCellConverter.create(cell_key(1), &source).unwrap();
        assert_eq!(fresh.subdomain(), SubdomainIndex(3));
        assert_eq!(fresh.data, None);
        assert_eq!(fresh.input_cell(), None);
        assert!(fresh.uuid().is_nil());

        let kept: Cell<u32> = PreservingCellConverter.create(cell_key(1), &source).unwrap();
        assert_eq!(kept.data, Some(9));
        assert_eq!(kept.input_cell(), Some(cell_key(1)));

        let mut target = kept.clone();
        PreservingCellConverter.update(cell_key(1), &source, &mut target).unwrap();
        PreservingCellConverter.update(cell_key(1), &source, &mut target).unwrap();
        assert_eq!(target.subdomain(), kept.subdomain());
        assert_eq!(target.data, kept.data);
        assert_eq!(target.input_cell(), kept.input_cell());
    }
}
