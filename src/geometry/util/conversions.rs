//! Checked numeric conversions between coordinate scalar types.
//!
//! `num_traits` float-to-float casts never fail; an `f64` that is too large
//! for `f32` comes back as infinity. Every function here therefore re-checks
//! finiteness after the cast and reports the offending coordinate.

use num_traits::cast;

use crate::geometry::traits::coordinate::{CoordinateConversionError, CoordinateScalar};

/// Converts one scalar from `S` to `T`, rejecting NaN, infinities and
/// values that overflow the target type.
///
/// # Errors
///
/// Returns `CoordinateConversionError::NonFiniteValue` if the input is not
/// finite, and `CoordinateConversionError::ConversionFailed` if the value has
/// no finite representation in `T`.
///
/// # Examples
///
/// ```
/// use tetra_remesh::geometry::util::conversions::safe_cast_scalar;
///
/// let narrowed: f32 = safe_cast_scalar(2.5f64, 0).unwrap();
/// assert_eq!(narrowed, 2.5f32);
/// assert!(safe_cast_scalar::<f64, f32>(1.0e300, 1).is_err());
/// ```
pub fn safe_cast_scalar<S, T>(value: S, coordinate_index: usize) -> Result<T, CoordinateConversionError>
where
    S: CoordinateScalar,
    T: CoordinateScalar,
{
    if !value.is_finite_generic() {
        return Err(CoordinateConversionError::NonFiniteValue {
            coordinate_index,
            coordinate_value: format!("{value:?}"),
        });
    }

    let converted: Option<T> = cast(value);
    match converted {
        Some(v) if v.is_finite_generic() => Ok(v),
        _ => Err(CoordinateConversionError::ConversionFailed {
            coordinate_index,
            coordinate_value: format!("{value:?}"),
            from_type: std::any::type_name::<S>(),
            to_type: std::any::type_name::<T>(),
        }),
    }
}

/// Converts every coordinate of an array from `S` to `T`.
///
/// # Errors
///
/// Returns the first failure reported by [`safe_cast_scalar`], tagged with
/// the index of the coordinate that failed.
pub fn safe_cast_coords<S, T, const D: usize>(
    coords: [S; D],
) -> Result<[T; D], CoordinateConversionError>
where
    S: CoordinateScalar,
    T: CoordinateScalar,
{
    let mut result = [T::zero(); D];
    for (i, &coord) in coords.iter().enumerate() {
        result[i] = safe_cast_scalar(coord, i)?;
    }
    Ok(result)
}

/// Converts coordinates to `f64`.
///
/// # Errors
///
/// Fails if any coordinate is NaN or infinite.
///
/// ```
/// use tetra_remesh::geometry::util::conversions::safe_coords_to_f64;
///
/// assert_eq!(safe_coords_to_f64([1.0f32, 2.0, 3.0]).unwrap(), [1.0, 2.0, 3.0]);
/// ```
pub fn safe_coords_to_f64<T: CoordinateScalar, const D: usize>(
    coords: [T; D],
) -> Result<[f64; D], CoordinateConversionError> {
    safe_cast_coords(coords)
}

/// Converts `f64` coordinates to `T`.
///
/// # Errors
///
/// Fails if any coordinate is not finite, or overflows `T`.
pub fn safe_coords_from_f64<T: CoordinateScalar, const D: usize>(
    coords: [f64; D],
) -> Result<[T; D], CoordinateConversionError> {
    safe_cast_coords(coords)
}

/// Converts a `usize` (a grid index, a count) to a scalar without losing
/// precision.
///
/// Values above the largest integer exactly representable in `T` are
/// rejected: 2^24 - 1 for `f32`, 2^53 - 1 for `f64`.
///
/// # Errors
///
/// Returns `CoordinateConversionError::ConversionFailed` when the value
/// would be rounded.
///
/// ```
/// use tetra_remesh::geometry::util::conversions::safe_usize_to_scalar;
///
/// let x: f32 = safe_usize_to_scalar(42).unwrap();
/// assert_eq!(x, 42.0);
/// assert!(safe_usize_to_scalar::<f32>(1 << 25).is_err());
/// ```
pub fn safe_usize_to_scalar<T: CoordinateScalar>(
    value: usize,
) -> Result<T, CoordinateConversionError> {
    let max_precise_bits = T::mantissa_digits().min(53);
    let max_precise: u128 = (1u128 << max_precise_bits) - 1;

    let failed = || CoordinateConversionError::ConversionFailed {
        coordinate_index: 0,
        coordinate_value: format!("{value}"),
        from_type: "usize",
        to_type: std::any::type_name::<T>(),
    };

    let wide = u64::try_from(value).map_err(|_| failed())?;
    if u128::from(wide) > max_precise {
        return Err(failed());
    }
    cast(value).ok_or_else(failed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn narrowing_cast_reports_overflow_as_conversion_failure() {
        let err = safe_cast_scalar::<f64, f32>(f64::MAX, 2).unwrap_err();
        assert!(matches!(
            err,
            CoordinateConversionError::ConversionFailed {
                coordinate_index: 2,
                ..
            }
        ));
    }

    #[test]
    fn non_finite_input_is_rejected_before_casting() {
        let err = safe_cast_scalar::<f32, f64>(f32::NAN, 0).unwrap_err();
        assert!(matches!(err, CoordinateConversionError::NonFiniteValue { .. }));
        assert!(safe_coords_to_f64([0.0f64, f64::INFINITY, 1.0]).is_err());
    }

    #[test]
    fn widening_and_narrowing_preserve_representable_values() {
        let wide = safe_coords_to_f64([0.25f32, -8.0, 1.5]).unwrap();
        assert_eq!(wide, [0.25, -8.0, 1.5]);

        let narrow: [f32; 3] = safe_coords_from_f64([0.1, 0.2, 0.3]).unwrap();
        assert_relative_eq!(narrow[0], 0.1f32);
        assert_relative_eq!(narrow[2], 0.3f32);
    }

    #[test]
    fn usize_precision_limits_follow_mantissa() {
        assert_eq!(safe_usize_to_scalar::<f32>((1 << 24) - 1).unwrap(), 16_777_215.0);
        assert!(safe_usize_to_scalar::<f32>(1 << 24).is_err());
        assert!(safe_usize_to_scalar::<f64>(1 << 24).is_ok());
    }
}
