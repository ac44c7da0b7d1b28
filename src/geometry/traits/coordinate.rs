//! Scalar and coordinate traits shared by every kernel.
//!
//! A mesh stores its points under one scalar type (`f32`, `f64`, ...). The
//! traits here collect what the rest of the crate needs from that scalar:
//! floating-point arithmetic, a finiteness check, NaN-aware equality and a
//! hash that treats equal bit patterns consistently. The
//! [`Coordinate`] trait is the read side of a point's coordinate storage.
//!
//! ```rust
//! use tetra_remesh::geometry::point::Point;
//! use tetra_remesh::geometry::traits::coordinate::Coordinate;
//!
//! let p: Point<f64, 3> = Coordinate::new([1.0, 2.0, 3.0]);
//! assert_eq!(p.to_array(), [1.0, 2.0, 3.0]);
//! assert!(p.validate().is_ok());
//!
//! let bad: Point<f64, 3> = Coordinate::new([f64::NAN, 0.0, 0.0]);
//! assert!(bad.validate().is_err());
//! ```

use num_traits::Float;
use ordered_float::OrderedFloat;
use serde::{Serialize, de::DeserializeOwned};
use std::{
    fmt::Debug,
    hash::{Hash, Hasher},
};

/// Errors raised when a coordinate cannot be carried from one scalar type to another.
#[derive(Clone, Debug, thiserror::Error, PartialEq, Eq)]
pub enum CoordinateConversionError {
    /// The value is finite in the source type but has no representation in the target type.
    #[error(
        "Failed to convert coordinate at index {coordinate_index} from {from_type} to {to_type}: {coordinate_value}"
    )]
    ConversionFailed {
        /// Index of the coordinate that failed to convert.
        coordinate_index: usize,
        /// The offending value, formatted with `Debug`.
        coordinate_value: String,
        /// Source type name.
        from_type: &'static str,
        /// Target type name.
        to_type: &'static str,
    },
    /// The value is NaN or infinite.
    #[error(
        "Non-finite value (NaN or infinity) at coordinate index {coordinate_index}: {coordinate_value}"
    )]
    NonFiniteValue {
        /// Index of the coordinate that holds the non-finite value.
        coordinate_index: usize,
        /// The offending value, formatted with `Debug`.
        coordinate_value: String,
    },
}

/// Errors raised by [`Coordinate::validate`].
#[derive(Clone, Debug, thiserror::Error, PartialEq, Eq)]
pub enum CoordinateValidationError {
    /// A coordinate value is NaN or infinite.
    #[error(
        "Invalid coordinate at index {coordinate_index} in dimension {dimension}: {coordinate_value}"
    )]
    InvalidCoordinate {
        /// Index of the invalid coordinate.
        coordinate_index: usize,
        /// The offending value, formatted with `Debug`.
        coordinate_value: String,
        /// Number of coordinates in the point.
        dimension: usize,
    },
}

/// Default comparison tolerance for `f32`.
pub const DEFAULT_TOLERANCE_F32: f32 = 1e-6;

/// Default comparison tolerance for `f64`.
pub const DEFAULT_TOLERANCE_F64: f64 = 1e-15;

// =============================================================================
// SUPPORTING TRAITS
// =============================================================================

/// Finiteness check usable from generic code.
///
/// ```
/// use tetra_remesh::geometry::traits::coordinate::FiniteCheck;
///
/// assert!(1.5f64.is_finite_generic());
/// assert!(!f32::INFINITY.is_finite_generic());
/// ```
pub trait FiniteCheck {
    /// Returns `true` if the value is neither NaN nor infinite.
    fn is_finite_generic(&self) -> bool;
}

macro_rules! impl_finite_check {
    (float: $($t:ty),*) => {
        $(
            impl FiniteCheck for $t {
                #[inline(always)]
                fn is_finite_generic(&self) -> bool {
                    self.is_finite()
                }
            }
        )*
    };
}

impl_finite_check!(float: f32, f64);

/// Equality that treats NaN as equal to itself.
///
/// ```
/// use tetra_remesh::geometry::traits::coordinate::OrderedEq;
///
/// assert!(f64::NAN.ordered_eq(&f64::NAN));
/// assert!(0.0f64.ordered_eq(&(-0.0f64)));
/// ```
pub trait OrderedEq {
    /// Compares two values with `OrderedFloat` semantics.
    fn ordered_eq(&self, other: &Self) -> bool;
}

macro_rules! impl_ordered_eq {
    (float: $($t:ty),*) => {
        $(
            impl OrderedEq for $t {
                #[inline(always)]
                fn ordered_eq(&self, other: &Self) -> bool {
                    OrderedFloat(*self) == OrderedFloat(*other)
                }
            }
        )*
    };
}

impl_ordered_eq!(float: f32, f64);

/// Hashing for floating-point scalars, consistent with [`OrderedEq`].
pub trait HashCoordinate {
    /// Feeds the scalar into `state`.
    fn hash_scalar<H: Hasher>(&self, state: &mut H);
}

macro_rules! impl_hash_coordinate {
    (float: $($t:ty),*) => {
        $(
            impl HashCoordinate for $t {
                #[inline(always)]
                fn hash_scalar<H: Hasher>(&self, state: &mut H) {
                    OrderedFloat(*self).hash(state);
                }
            }
        )*
    };
}

impl_hash_coordinate!(float: f32, f64);

/// Everything a kernel scalar must provide.
///
/// ```rust
/// use tetra_remesh::geometry::traits::coordinate::CoordinateScalar;
///
/// fn close<T: CoordinateScalar>(a: T, b: T) -> bool {
///     (a - b).abs() <= T::default_tolerance()
/// }
/// assert!(close(1.0f32, 1.0f32));
/// ```
pub trait CoordinateScalar:
    Float
    + OrderedEq
    + HashCoordinate
    + FiniteCheck
    + Default
    + Debug
    + Send
    + Sync
    + Serialize
    + DeserializeOwned
    + 'static
{
    /// Comparison tolerance appropriate for the precision of the type.
    fn default_tolerance() -> Self;

    /// Number of significant bits in the mantissa, including the implicit one.
    fn mantissa_digits() -> u32;
}

impl CoordinateScalar for f32 {
    fn default_tolerance() -> Self {
        DEFAULT_TOLERANCE_F32
    }

    fn mantissa_digits() -> u32 {
        Self::MANTISSA_DIGITS
    }
}

impl CoordinateScalar for f64 {
    fn default_tolerance() -> Self {
        DEFAULT_TOLERANCE_F64
    }

    fn mantissa_digits() -> u32 {
        Self::MANTISSA_DIGITS
    }
}

/// Read access to fixed-size coordinate storage.
pub trait Coordinate<T, const D: usize>
where
    T: CoordinateScalar,
    Self: Copy + Default + Debug + PartialEq + Eq + Hash + Sized,
{
    /// Creates a coordinate from an array.
    fn new(coords: [T; D]) -> Self;

    /// Returns the coordinates as an owned array.
    fn to_array(&self) -> [T; D];

    /// Returns the coordinate at `index`, if any.
    fn get(&self, index: usize) -> Option<T>;

    /// Number of coordinates.
    #[must_use]
    fn dim(&self) -> usize {
        D
    }

    /// Checks that every coordinate is finite.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinateValidationError::InvalidCoordinate`] for the first
    /// NaN or infinite value.
    fn validate(&self) -> Result<(), CoordinateValidationError> {
        for (coordinate_index, value) in self.to_array().iter().enumerate() {
            if !value.is_finite_generic() {
                return Err(CoordinateValidationError::InvalidCoordinate {
                    coordinate_index,
                    coordinate_value: format!("{value:?}"),
                    dimension: D,
                });
            }
        }
        Ok(())
    }

    /// NaN-aware comparison of all coordinates.
    fn ordered_equals(&self, other: &Self) -> bool {
        self.to_array()
            .iter()
            .zip(other.to_array().iter())
            .all(|(a, b)| a.ordered_eq(b))
    }

    /// Hashes all coordinates consistently with [`Coordinate::ordered_equals`].
    fn hash_coordinate<H: Hasher>(&self, state: &mut H) {
        for value in &self.to_array() {
            value.hash_scalar(state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of<T: HashCoordinate>(value: T) -> u64 {
        let mut hasher = DefaultHasher::new();
        value.hash_scalar(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn nan_is_ordered_equal_and_hashes_consistently() {
        assert!(f64::NAN.ordered_eq(&f64::NAN));
        assert_eq!(hash_of(f64::NAN), hash_of(f64::NAN));
        assert!(!1.0f32.ordered_eq(&2.0f32));
    }

    #[test]
    fn tolerances_follow_precision() {
        assert!(f32::default_tolerance() > 0.0);
        assert!(f64::default_tolerance() < f64::from(f32::default_tolerance()));
        assert_eq!(<f32 as CoordinateScalar>::mantissa_digits(), 24);
        assert_eq!(<f64 as CoordinateScalar>::mantissa_digits(), 53);
    }

    #[test]
    fn conversion_error_messages_name_the_coordinate() {
        let err = CoordinateConversionError::NonFiniteValue {
            coordinate_index: 2,
            coordinate_value: "inf".to_string(),
        };
        assert!(err.to_string().contains("index 2"));
    }
}
