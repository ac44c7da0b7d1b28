//! Geometric utility functions.

pub mod conversions;
pub mod triangulation_generation;

pub use conversions::*;
pub use triangulation_generation::*;
