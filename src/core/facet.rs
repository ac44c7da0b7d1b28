//! Handles to the triangular facets of a mesh.
//!
//! A facet is stored implicitly as a `(cell, index)` pair: the facet of
//! `cell` opposite its vertex `index`. Every interior facet has two handles,
//! one from each side; [`Tds::mirror_facet`](crate::core::Tds::mirror_facet)
//! maps one to the other.

use crate::core::triangulation_data_structure::CellKey;
use thiserror::Error;

/// Errors raised when a facet handle does not fit the mesh.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FacetError {
    /// The cell is not in the mesh.
    #[error("Facet refers to missing cell {cell:?}")]
    CellNotFound {
        /// The stale cell key.
        cell: CellKey,
    },
    /// The index is not in `0..4`.
    #[error("Facet index {index} out of range for a tetrahedron")]
    InvalidFacetIndex {
        /// The offending index.
        index: u8,
    },
}

/// The facet of `cell` opposite its vertex `facet_index`.
///
/// ```rust
/// use tetra_remesh::core::facet::FacetHandle;
/// use tetra_remesh::core::triangulation_data_structure::CellKey;
///
/// let facet = FacetHandle::new(CellKey::default(), 2);
/// assert_eq!(facet.facet_index(), 2);
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FacetHandle {
    cell_key: CellKey,
    facet_index: u8,
}

impl FacetHandle {
    /// Creates a handle. The index is not checked until the handle is used.
    #[inline]
    #[must_use]
    pub const fn new(cell_key: CellKey, facet_index: u8) -> Self {
        Self {
            cell_key,
            facet_index,
        }
    }

    /// Cell on this side of the facet.
    #[inline]
    #[must_use]
    pub const fn cell_key(&self) -> CellKey {
        self.cell_key
    }

    /// Index of the vertex of [`Self::cell_key`] opposite the facet.
    #[inline]
    #[must_use]
    pub const fn facet_index(&self) -> u8 {
        self.facet_index
    }

    /// Index as `usize`, checked against the tetrahedron.
    ///
    /// # Errors
    ///
    /// Returns [`FacetError::InvalidFacetIndex`] when the index is not in `0..4`.
    pub const fn checked_index(&self) -> Result<usize, FacetError> {
        if self.facet_index < 4 {
            Ok(self.facet_index as usize)
        } else {
            Err(FacetError::InvalidFacetIndex {
                index: self.facet_index,
            })
        }
    }
}
