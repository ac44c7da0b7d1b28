//! Identity stamps for mesh elements.
//!
//! Every vertex and cell stored in a [`Tds`](crate::core::Tds) carries a
//! version 4 UUID. The nil UUID is reserved as the "unset" stamp: converters
//! produce elements with it, and the storage replaces it on insertion, so
//! identity never leaks from one mesh into another.

use thiserror::Error;
use uuid::Uuid;

/// Errors from [`validate_uuid`].
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum UuidValidationError {
    /// The stamp was never assigned.
    #[error("UUID is nil (all zeros) which is not allowed")]
    NilUuid,
    /// The stamp is not a random (version 4) UUID.
    #[error("UUID is not version 4: expected version 4, found version {found}")]
    InvalidVersion {
        /// Version number that was found.
        found: usize,
    },
}

/// The stamp an element carries before a mesh adopts it.
pub const UNSET_STAMP: Uuid = Uuid::nil();

/// Checks that a stamp has been assigned and is a version 4 UUID.
///
/// # Errors
///
/// Returns `UuidValidationError::NilUuid` for the unset stamp and
/// `UuidValidationError::InvalidVersion` for any other UUID version.
///
/// ```
/// use tetra_remesh::core::util::{UNSET_STAMP, make_uuid, validate_uuid};
///
/// assert!(validate_uuid(&make_uuid()).is_ok());
/// assert!(validate_uuid(&UNSET_STAMP).is_err());
/// ```
pub const fn validate_uuid(uuid: &Uuid) -> Result<(), UuidValidationError> {
    if uuid.is_nil() {
        return Err(UuidValidationError::NilUuid);
    }

    let version = uuid.get_version_num();
    if version != 4 {
        return Err(UuidValidationError::InvalidVersion { found: version });
    }

    Ok(())
}

/// Generates a fresh version 4 stamp.
#[must_use]
pub fn make_uuid() -> Uuid {
    Uuid::new_v4()
}
