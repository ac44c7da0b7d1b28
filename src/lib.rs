//! # tetra-remesh
//!
//! Cloning and local remeshing of 3D tetrahedral meshes closed by an
//! infinite vertex, in the style of [CGAL](https://www.cgal.org)'s
//! triangulation data structures.
//!
//! # Features
//!
//! - A slotmap-backed mesh store ([`Tds`](core::Tds)) with one infinite
//!   vertex and one infinite cell per boundary triangle
//! - Cloning a mesh across kernels and payload types under a conversion
//!   policy ([`clone_tds`](core::algorithms::copy::clone_tds))
//! - Edge splits and 2-3 / 3-2 flips that report every step to a
//!   [`RemeshingVisitor`](core::visitor::RemeshingVisitor)
//! - Generic floating-point coordinates (`f32`, `f64`)
//! - Serialization of points, vertices and cells with [serde](https://serde.rs)
//!
//! # Basic Usage
//!
//! ```rust
//! use tetra_remesh::prelude::*;
//!
//! // Two tetrahedra glued along a triangle.
//! let mesh: Tds<FastKernel<f64>, (), u32> = MeshBuilder::new()
//!     .points([
//!         [0.0, 0.0, 0.0],
//!         [1.0, 0.0, 0.0],
//!         [0.0, 1.0, 0.0],
//!         [0.0, 0.0, 1.0],
//!         [1.0, 1.0, 1.0],
//!     ])
//!     .tetrahedra([[0, 1, 2, 3], [1, 2, 3, 4]])
//!     .cell_data([10, 20])
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(mesh.number_of_vertices(), 6); // five points plus the infinite vertex
//! assert_eq!(mesh.number_of_finite_cells(), 2);
//! assert_eq!(mesh.number_of_cells(), 8); // six boundary triangles
//!
//! // Clone into single precision, carrying cell data.
//! let copy: Tds<FastKernel<f32>, (), u32> =
//!     clone_tds(&mesh, &PreservingConversion::preserving()).unwrap();
//! assert_eq!(copy.number_of_cells(), mesh.number_of_cells());
//! assert!(copy.is_valid().is_ok());
//! ```
//!
//! # Remeshing
//!
//! Mutations take the visitor explicitly:
//!
//! ```rust
//! use tetra_remesh::prelude::*;
//!
//! let mut mesh: Tds<FastKernel<f64>> = generate_grid_triangulation([1, 1, 1], 1.0).unwrap();
//! let mut events = EventRecorder::new();
//!
//! let edge = mesh.finite_edges()[0];
//! let vertex = split_edge(&mut mesh, edge, &mut events).unwrap();
//!
//! assert_eq!(events.events().first(), Some(&VisitorEvent::BeforeSplit(edge)));
//! assert_eq!(events.events().last(), Some(&VisitorEvent::AfterSplit(vertex)));
//! assert!(mesh.is_valid().is_ok());
//! ```
//!
//! # Tracing
//!
//! Operations emit [`tracing`](https://docs.rs/tracing) events at `debug`
//! level. Setting `TETRA_REMESH_CLONE_TRACE` adds one `trace` event per
//! cloned element.

// Forbid unsafe code throughout the entire crate
#![forbid(unsafe_code)]

#[macro_use]
extern crate derive_builder;

/// Mesh storage, mesh elements, cloning and remeshing.
///
/// It includes the [`Tds`](core::Tds) store, the [`Cell`](core::Cell) and
/// [`Vertex`](core::Vertex) elements, conversion policies and the
/// visitor protocol.
pub mod core {
    /// Algorithms over a [`Tds`]: cloning and local mutations.
    pub mod algorithms {
        /// Cloning a mesh under a conversion policy.
        pub mod copy;
        /// Edge split and 2-3 / 3-2 flips.
        pub mod mutation;
    }
    pub mod builder;
    pub mod cell;
    /// Collection types used throughout the crate.
    pub mod collections;
    pub mod conversion;
    pub mod edge;
    pub mod facet;
    pub mod remeshing;
    pub mod triangulation_data_structure;
    pub mod util;
    pub mod vertex;
    pub mod visitor;
    /// Traits for mesh payloads.
    pub mod traits {
        pub mod data_type;
        pub use data_type::*;
    }
    // Re-export the `core` modules.
    pub use builder::*;
    pub use cell::*;
    pub use conversion::*;
    pub use edge::*;
    pub use facet::*;
    pub use remeshing::*;
    pub use traits::*;
    pub use triangulation_data_structure::*;
    pub use util::*;
    pub use vertex::*;
    pub use visitor::*;
    // Note: collections module not re-exported here to avoid namespace pollution
}

/// Geometric types: points, coordinates and the kernel.
///
/// The `Coordinate` trait unifies coordinate operations; `Point` implements
/// it with NaN-aware equality and hashing for `f32` and `f64`.
pub mod geometry {
    /// Orientation and construction predicates.
    pub mod kernel;
    pub mod point;
    /// Geometric utility functions and mesh generators.
    pub mod util;
    /// Coordinate abstractions: `Coordinate`, `CoordinateScalar` and their
    /// validation, comparison and hashing helpers.
    pub mod traits {
        pub mod coordinate;
        pub use coordinate::*;
    }
    pub use kernel::*;
    pub use point::*;
    pub use traits::*;
    pub use util::*;
}

/// A prelude module that re-exports commonly used types and macros.
pub mod prelude {
    pub use crate::core::{
        algorithms::{
            copy::{CloneError, CloneMap, clone_tds, copy_tds_into, sync_payload},
            mutation::{MutationError, flip_2_3, flip_3_2, split_edge, split_edge_at},
        },
        builder::*,
        cell::*,
        conversion::*,
        edge::*,
        facet::*,
        remeshing::*,
        traits::data_type::*,
        triangulation_data_structure::*,
        util::{UNSET_STAMP, UuidValidationError, make_uuid, validate_uuid},
        vertex::*,
        visitor::*,
    };

    pub use crate::core::collections::{
        CellKeyBuffer, FastHashMap, FastHashSet, SmallBuffer, fast_hash_map_with_capacity,
        fast_hash_set_with_capacity,
    };

    pub use crate::geometry::{
        kernel::*, point::*, traits::coordinate::*, util::triangulation_generation::*,
    };

    // Convenience macros
    pub use crate::vertex;
}

/// The function `is_normal` checks that structs implement `auto` traits.
/// Traits are checked at compile time, so this function is only used for
/// testing.
#[must_use]
pub const fn is_normal<T: Sized + Send + Sync + Unpin>() -> bool {
    true
}

// =============================================================================
// TESTS
// =============================================================================
