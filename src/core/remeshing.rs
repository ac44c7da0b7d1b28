//! A working copy of a mesh for remeshing passes.
//!
//! [`RemeshingTriangulation`] owns a [`Tds`] together with the visitor that
//! every mutation reports to. Typical use:
//!
//! 1. [`build_remeshing_triangulation`] clones an input mesh into the
//!    working copy with the fresh policy, so stale payload cannot leak in;
//! 2. the pass splits and flips through the wrapper, which routes each
//!    mutation through the stored visitor;
//! 3. [`build_from_remeshing_triangulation`] clones the result back out.
//!
//! # Examples
//!
//! ```rust
//! use tetra_remesh::prelude::*;
//!
//! let input: Tds<FastKernel<f64>> = MeshBuilder::new()
//!     .points([[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]])
//!     .tetrahedra([[0, 1, 2, 3]])
//!     .build()
//!     .unwrap();
//!
//! let mut remeshing: RemeshingTriangulation<FastKernel<f64>, (), (), EventRecorder> =
//!     RemeshingTriangulation::new(EventRecorder::new());
//! build_remeshing_triangulation(&input, &mut remeshing).unwrap();
//!
//! let edge = remeshing.tds().finite_edges()[0];
//! remeshing.split_edge(edge).unwrap();
//! assert_eq!(remeshing.visitor().added_cells().len(), 6);
//!
//! let mut output: Tds<FastKernel<f64>> = Tds::new();
//! build_from_remeshing_triangulation(&remeshing, &mut output).unwrap();
//! assert_eq!(output.number_of_finite_cells(), 2);
//! ```

use crate::core::algorithms::copy::{CloneError, CloneMap, copy_tds_into};
use crate::core::algorithms::mutation::{self, MutationError};
use crate::core::collections::CellKeyBuffer;
use crate::core::conversion::FreshConversion;
use crate::core::edge::EdgeKey;
use crate::core::facet::FacetHandle;
use crate::core::traits::DataType;
use crate::core::triangulation_data_structure::{Tds, VertexKey};
use crate::core::visitor::{DefaultRemeshingVisitor, RemeshingVisitor};
use crate::geometry::kernel::Kernel;
use crate::geometry::point::Point;

/// Scheduling regime a remeshing pass runs under.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Concurrency {
    /// One thread owns the mesh for the duration of every operation.
    #[default]
    Sequential,
    /// Independent regions may be mutated concurrently.
    ///
    /// The crate does not lock anything itself. [`Tds`] is `Send + Sync`,
    /// so a caller can hand disjoint working copies to worker threads or
    /// wrap one in its own lock; keeping concurrent edits apart is the
    /// caller's responsibility.
    Parallel,
}

/// Options of a [`RemeshingTriangulation`].
///
/// ```
/// use tetra_remesh::core::remeshing::{Concurrency, RemeshingOptionsBuilder};
///
/// let options = RemeshingOptionsBuilder::default()
///     .validate_after_mutation(true)
///     .build()
///     .unwrap();
/// assert!(options.validate_after_mutation);
/// assert_eq!(options.concurrency, Concurrency::Sequential);
/// ```
#[derive(Builder, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[builder(default)]
pub struct RemeshingOptions {
    /// Scheduling regime.
    pub concurrency: Concurrency,
    /// Run [`Tds::is_valid`] after every mutation and roll the mesh back
    /// when it fails.
    pub validate_after_mutation: bool,
}

/// A mesh plus the visitor its mutations report to.
#[derive(Clone, Debug)]
pub struct RemeshingTriangulation<K, U = (), V = (), R = DefaultRemeshingVisitor>
where
    K: Kernel,
    U: DataType,
    V: DataType,
{
    tds: Tds<K, U, V>,
    visitor: R,
    options: RemeshingOptions,
}

impl<K, U, V, R> Default for RemeshingTriangulation<K, U, V, R>
where
    K: Kernel,
    U: DataType,
    V: DataType,
    R: RemeshingVisitor<K, U, V> + Default,
{
    fn default() -> Self {
        Self::new(R::default())
    }
}

impl<K, U, V, R> RemeshingTriangulation<K, U, V, R>
where
    K: Kernel,
    U: DataType,
    V: DataType,
    R: RemeshingVisitor<K, U, V>,
{
    /// An empty working copy with default options.
    #[must_use]
    pub fn new(visitor: R) -> Self {
        Self::with_options(visitor, RemeshingOptions::default())
    }

    /// An empty working copy.
    #[must_use]
    pub fn with_options(visitor: R, options: RemeshingOptions) -> Self {
        Self {
            tds: Tds::new(),
            visitor,
            options,
        }
    }

    /// Wraps an existing mesh as is.
    #[must_use]
    pub const fn from_tds(tds: Tds<K, U, V>, visitor: R, options: RemeshingOptions) -> Self {
        Self {
            tds,
            visitor,
            options,
        }
    }

    /// The working mesh.
    #[must_use]
    pub const fn tds(&self) -> &Tds<K, U, V> {
        &self.tds
    }

    /// Mutable access to the working mesh.
    ///
    /// Edits made here bypass the visitor.
    pub const fn tds_mut(&mut self) -> &mut Tds<K, U, V> {
        &mut self.tds
    }

    /// The visitor.
    #[must_use]
    pub const fn visitor(&self) -> &R {
        &self.visitor
    }

    /// Mutable access to the visitor.
    pub const fn visitor_mut(&mut self) -> &mut R {
        &mut self.visitor
    }

    /// The options.
    #[must_use]
    pub const fn options(&self) -> &RemeshingOptions {
        &self.options
    }

    /// Replaces the options.
    pub fn set_options(&mut self, options: RemeshingOptions) {
        self.options = options;
    }

    /// Splits the parts back out.
    pub fn into_parts(self) -> (Tds<K, U, V>, R) {
        (self.tds, self.visitor)
    }

    /// See [`mutation::split_edge`].
    ///
    /// # Errors
    ///
    /// Any [`MutationError`] of the mutation, plus
    /// [`MutationError::Validation`] when validation after mutation is on.
    /// In that case the mesh is restored to its state before the call, but
    /// the visitor has already received the `after_*` hooks.
    pub fn split_edge(&mut self, edge: EdgeKey) -> Result<VertexKey, MutationError> {
        self.guarded(|tds, visitor| mutation::split_edge(tds, edge, visitor))
    }

    /// See [`mutation::split_edge_at`].
    ///
    /// # Errors
    ///
    /// As [`Self::split_edge`].
    pub fn split_edge_at(
        &mut self,
        edge: EdgeKey,
        point: Point<K::Scalar, 3>,
    ) -> Result<VertexKey, MutationError> {
        self.guarded(|tds, visitor| mutation::split_edge_at(tds, edge, point, visitor))
    }

    /// See [`mutation::flip_2_3`].
    ///
    /// # Errors
    ///
    /// As [`Self::split_edge`].
    pub fn flip_2_3(&mut self, facet: FacetHandle) -> Result<CellKeyBuffer, MutationError> {
        self.guarded(|tds, visitor| mutation::flip_2_3(tds, facet, visitor))
    }

    /// See [`mutation::flip_3_2`].
    ///
    /// # Errors
    ///
    /// As [`Self::split_edge`].
    pub fn flip_3_2(&mut self, edge: EdgeKey) -> Result<CellKeyBuffer, MutationError> {
        self.guarded(|tds, visitor| mutation::flip_3_2(tds, edge, visitor))
    }

    /// Runs `mutate`; with validation on, restores the pre-mutation mesh
    /// when the result is invalid. The visitor is not rolled back: its
    /// `after_*` hooks have already seen the discarded mutation.
    fn guarded<T>(
        &mut self,
        mutate: impl FnOnce(&mut Tds<K, U, V>, &mut R) -> Result<T, MutationError>,
    ) -> Result<T, MutationError> {
        if !self.options.validate_after_mutation {
            return mutate(&mut self.tds, &mut self.visitor);
        }
        let snapshot = self.tds.clone();
        let out = mutate(&mut self.tds, &mut self.visitor)?;
        if let Err(err) = self.tds.is_valid() {
            tracing::debug!(error = %err, "mutation left the mesh invalid; restored");
            self.tds = snapshot;
            return Err(err.into());
        }
        Ok(out)
    }
}

/// Clears the working copy and clones `source` into it with the fresh
/// policy. The visitor and options are kept.
///
/// # Errors
///
/// See [`copy_tds_into`]; the working copy is empty on error.
pub fn build_remeshing_triangulation<Ks, Us, Vs, K, U, V, R>(
    source: &Tds<Ks, Us, Vs>,
    remeshing: &mut RemeshingTriangulation<K, U, V, R>,
) -> Result<CloneMap, CloneError>
where
    Ks: Kernel,
    Us: DataType,
    Vs: DataType,
    K: Kernel,
    U: DataType,
    V: DataType,
    R: RemeshingVisitor<K, U, V>,
{
    tracing::debug!(
        concurrency = ?remeshing.options.concurrency,
        vertices = source.number_of_vertices(),
        cells = source.number_of_cells(),
        "building remeshing triangulation"
    );
    copy_tds_into(source, &FreshConversion::<Ks, K>::fresh(), &mut remeshing.tds)
}

/// Clones the working copy into `target` with the fresh policy.
///
/// # Errors
///
/// See [`copy_tds_into`]; `target` is empty on error.
pub fn build_from_remeshing_triangulation<K, U, V, R, Kt, Ut, Vt>(
    remeshing: &RemeshingTriangulation<K, U, V, R>,
    target: &mut Tds<Kt, Ut, Vt>,
) -> Result<CloneMap, CloneError>
where
    K: Kernel,
    U: DataType,
    V: DataType,
    R: RemeshingVisitor<K, U, V>,
    Kt: Kernel,
    Ut: DataType,
    Vt: DataType,
{
    copy_tds_into(&remeshing.tds, &FreshConversion::<K, Kt>::fresh(), target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::builder::MeshBuilder;
    use crate::core::cell::SubdomainIndex;
    use crate::core::vertex::FeatureDimension;
    use crate::core::triangulation_data_structure::TriangulationValidationError;
    use crate::core::visitor::{EventRecorder, VisitorEvent};
    use crate::geometry::kernel::FastKernel;
    use crate::geometry::traits::coordinate::Coordinate;

    type Mesh = Tds<FastKernel<f64>, u32, u32>;

    fn input() -> Mesh {
        MeshBuilder::new()
            .points([
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [0.0, 1.0, 0.0],
                [0.0, 0.0, 1.0],
                [1.0, 1.0, 1.0],
            ])
            .tetrahedra([[0, 1, 2, 3], [1, 2, 3, 4]])
            .subdomains([2, 2])
            .cell_data([7, 8])
            .build()
            .unwrap()
    }

    #[test]
    fn options_builder_defaults() {
        let options = RemeshingOptionsBuilder::default()
            .concurrency(Concurrency::Parallel)
            .build()
            .unwrap();
        assert_eq!(options.concurrency, Concurrency::Parallel);
        assert!(!options.validate_after_mutation);
        assert_eq!(RemeshingOptions::default().concurrency, Concurrency::Sequential);
    }

    #[test]
    fn build_uses_fresh_policy() {
        let source = input();
        let mut remeshing: RemeshingTriangulation<FastKernel<f64>, u32, u32> =
            RemeshingTriangulation::default();
        let map = build_remeshing_triangulation(&source, &mut remeshing).unwrap();

        let tds = remeshing.tds();
        assert_eq!(tds.number_of_vertices(), source.number_of_vertices());
        assert_eq!(tds.number_of_cells(), source.number_of_cells());
        assert_eq!(map.number_of_cells(), source.number_of_cells());
        for (_, v) in tds.finite_vertices() {
            assert_eq!(v.dimension(), FeatureDimension::Volume);
            assert!(v.data.is_none());
        }
        for (_, c) in tds.finite_cells() {
            assert_eq!(c.subdomain(), SubdomainIndex(2));
            assert!(c.data.is_none());
            assert!(c.input_cell().is_none());
        }
    }

    #[test]
    fn rebuild_replaces_previous_contents() {
        let source = input();
        let mut remeshing: RemeshingTriangulation<FastKernel<f64>> =
            RemeshingTriangulation::default();
        build_remeshing_triangulation(&source, &mut remeshing).unwrap();
        let edge = remeshing.tds().finite_edges()[0];
        remeshing.split_edge(edge).unwrap();

        build_remeshing_triangulation(&source, &mut remeshing).unwrap();
        assert_eq!(remeshing.tds().number_of_vertices(), 6);
    }

    #[test]
    fn mutations_report_to_stored_visitor_and_validate() {
        let options = RemeshingOptionsBuilder::default()
            .validate_after_mutation(true)
            .build()
            .unwrap();
        let mut remeshing: RemeshingTriangulation<FastKernel<f64>, (), (), EventRecorder> =
            RemeshingTriangulation::with_options(EventRecorder::new(), options);
        build_remeshing_triangulation(&input(), &mut remeshing).unwrap();

        let edge = remeshing.tds().finite_edges()[0];
        let vertex = remeshing.split_edge(edge).unwrap();
        let events = remeshing.visitor_mut().take();
        assert_eq!(events.first(), Some(&VisitorEvent::BeforeSplit(edge)));
        assert_eq!(events.last(), Some(&VisitorEvent::AfterSplit(vertex)));

        let mut output: Tds<FastKernel<f32>> = Tds::new();
        build_from_remeshing_triangulation(&remeshing, &mut output).unwrap();
        assert_eq!(output.number_of_vertices(), remeshing.tds().number_of_vertices());
        assert_eq!(output.number_of_cells(), remeshing.tds().number_of_cells());
        assert!(output.is_valid().is_ok());
    }

    #[test]
    fn failed_validation_restores_the_mesh() {
        let options = RemeshingOptionsBuilder::default()
            .validate_after_mutation(true)
            .build()
            .unwrap();
        let mut remeshing: RemeshingTriangulation<FastKernel<f64>, (), (), EventRecorder> =
            RemeshingTriangulation::with_options(EventRecorder::new(), options);
        build_remeshing_triangulation(&input(), &mut remeshing).unwrap();

        let key_at = |tds: &Tds<FastKernel<f64>>, xyz: [f64; 3]| {
            tds.finite_vertices()
                .find(|(_, v)| v.point().is_some_and(|p| p.to_array() == xyz))
                .map(|(k, _)| k)
                .unwrap()
        };
        let (origin, a, b) = {
            let tds = remeshing.tds();
            (
                key_at(tds, [0.0, 0.0, 0.0]),
                key_at(tds, [1.0, 0.0, 0.0]),
                key_at(tds, [1.0, 1.0, 1.0]),
            )
        };
        // The split around a-b never touches the origin, so its missing
        // hint survives the mutation.
        remeshing.tds_mut().get_vertex_mut(origin).unwrap().incident_cell = None;
        let counts = (
            remeshing.tds().number_of_vertices(),
            remeshing.tds().number_of_cells(),
        );
        let generation = remeshing.tds().generation();

        let err = remeshing.split_edge(EdgeKey::new(a, b)).unwrap_err();
        assert!(matches!(
            err,
            MutationError::Validation(TriangulationValidationError::InconsistentDataStructure { .. })
        ));
        assert_eq!(
            (
                remeshing.tds().number_of_vertices(),
                remeshing.tds().number_of_cells()
            ),
            counts
        );
        assert_eq!(remeshing.tds().generation(), generation);
        assert!(remeshing.tds().has_edge(a, b));
        assert!(matches!(
            remeshing.visitor().events().last(),
            Some(VisitorEvent::AfterSplit(_))
        ));
    }
}
