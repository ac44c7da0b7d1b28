//! Payload bound for the optional `data` carried by vertices and cells.

use serde::{Serialize, de::DeserializeOwned};
use std::{fmt::Debug, hash::Hash};

/// Bound for user payloads attached to vertices and cells.
///
/// Payloads are `Copy` so that converters and mutation passes can move them
/// between meshes without lifetimes; string-like data should be stored
/// externally and referenced by an integer id.
///
/// ```rust
/// use tetra_remesh::core::DataType;
///
/// fn accepts<T: DataType>(_: T) {}
///
/// accepts(());
/// accepts(7_u32);
/// accepts(Some('a'));
/// ```
pub trait DataType:
    Copy + Eq + Hash + Ord + PartialEq + PartialOrd + Debug + Send + Sync + Serialize + DeserializeOwned
{
}

impl<T> DataType for T where
    T: Copy
        + Eq
        + Hash
        + Ord
        + PartialEq
        + PartialOrd
        + Debug
        + Send
        + Sync
        + Serialize
        + DeserializeOwned
{
}
