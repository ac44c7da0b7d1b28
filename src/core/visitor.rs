//! Hooks called by mesh mutations.
//!
//! Mutation algorithms in [`crate::core::algorithms::mutation`] are generic
//! over a [`RemeshingVisitor`] and call it at fixed points:
//!
//! | Hook | When | Mesh state |
//! |---|---|---|
//! | [`before_split`](RemeshingVisitor::before_split) | before an edge split | untouched; the edge exists |
//! | [`after_add_cell`](RemeshingVisitor::after_add_cell) | once per cell a mutation creates | committed |
//! | [`after_split`](RemeshingVisitor::after_split) | after an edge split | committed; the new vertex is wired |
//! | [`before_flip`](RemeshingVisitor::before_flip) | before a flip | untouched |
//! | [`after_flip`](RemeshingVisitor::after_flip) | after a flip | committed |
//!
//! Every hook has a no-op default. Hooks see the mesh through a shared
//! borrow, so they cannot trigger a nested structural edit. The only write
//! access is to the payload (subdomain, data, back-reference) of a new cell
//! in `after_add_cell`.
//!
//! `before_*` hooks may veto a mutation by returning [`VisitorError`]; the
//! mesh is left unchanged. `after_*` hooks cannot fail, since the mutation
//! is already committed.
//!
//! # Examples
//!
//! ```rust
//! use tetra_remesh::prelude::*;
//!
//! #[derive(Default)]
//! struct CountSplits(usize);
//!
//! impl<K: Kernel, U: DataType, V: DataType> RemeshingVisitor<K, U, V> for CountSplits {
//!     fn after_split(&mut self, _tds: &Tds<K, U, V>, _new_vertex: VertexKey) {
//!         self.0 += 1;
//!     }
//! }
//!
//! let mut tds: Tds<FastKernel<f64>> = MeshBuilder::new()
//!     .points([[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]])
//!     .tetrahedra([[0, 1, 2, 3]])
//!     .build()
//!     .unwrap();
//! let edge = tds.finite_edges()[0];
//!
//! let mut counter = CountSplits::default();
//! split_edge(&mut tds, edge, &mut counter).unwrap();
//! assert_eq!(counter.0, 1);
//! ```

use thiserror::Error;

use crate::core::cell::Cell;
use crate::core::edge::EdgeKey;
use crate::core::traits::DataType;
use crate::core::triangulation_data_structure::{CellKey, Tds, VertexKey};
use crate::geometry::kernel::Kernel;

/// A `before_*` hook refused the mutation.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum VisitorError {
    /// The visitor vetoed the mutation.
    #[error("Mutation rejected by visitor: {reason}")]
    Rejected {
        /// Why.
        reason: String,
    },
}

/// Observer of mesh mutations.
pub trait RemeshingVisitor<K, U, V>
where
    K: Kernel,
    U: DataType,
    V: DataType,
{
    /// Called before `edge` is split. Both endpoints are still present.
    ///
    /// # Errors
    ///
    /// Returning an error aborts the split before any change.
    #[inline]
    fn before_split(&mut self, _tds: &Tds<K, U, V>, _edge: EdgeKey) -> Result<(), VisitorError> {
        Ok(())
    }

    /// Called once the split is committed. `new_vertex` is the inserted vertex.
    #[inline]
    fn after_split(&mut self, _tds: &Tds<K, U, V>, _new_vertex: VertexKey) {}

    /// Called once per cell created by a mutation.
    ///
    /// `old_cell` no longer exists in the mesh; `old` is its last state.
    /// `new` may be edited, but only its payload is reachable.
    #[inline]
    fn after_add_cell(
        &mut self,
        _old_cell: CellKey,
        _old: &Cell<V>,
        _new_cell: CellKey,
        _new: &mut Cell<V>,
    ) {
    }

    /// Called before a flip around `cell`.
    ///
    /// # Errors
    ///
    /// Returning an error aborts the flip before any change.
    #[inline]
    fn before_flip(&mut self, _tds: &Tds<K, U, V>, _cell: CellKey) -> Result<(), VisitorError> {
        Ok(())
    }

    /// Called once the flip is committed, with one of the new cells.
    #[inline]
    fn after_flip(&mut self, _tds: &Tds<K, U, V>, _cell: CellKey) {}
}

/// Does nothing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DefaultRemeshingVisitor;

impl<K, U, V> RemeshingVisitor<K, U, V> for DefaultRemeshingVisitor
where
    K: Kernel,
    U: DataType,
    V: DataType,
{
}

/// Logs every hook with `tracing` at `debug` level.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TracingVisitor;

impl<K, U, V> RemeshingVisitor<K, U, V> for TracingVisitor
where
    K: Kernel,
    U: DataType,
    V: DataType,
{
    fn before_split(&mut self, tds: &Tds<K, U, V>, edge: EdgeKey) -> Result<(), VisitorError> {
        tracing::debug!(
            v0 = ?edge.v0(),
            v1 = ?edge.v1(),
            cells = tds.cells_around_edge(edge).len(),
            "before_split"
        );
        Ok(())
    }

    fn after_split(&mut self, tds: &Tds<K, U, V>, new_vertex: VertexKey) {
        tracing::debug!(
            vertex = ?new_vertex,
            vertices = tds.number_of_vertices(),
            cells = tds.number_of_cells(),
            "after_split"
        );
    }

    fn after_add_cell(
        &mut self,
        old_cell: CellKey,
        _old: &Cell<V>,
        new_cell: CellKey,
        new: &mut Cell<V>,
    ) {
        tracing::debug!(old = ?old_cell, new = ?new_cell, subdomain = %new.subdomain(), "after_add_cell");
    }

    fn before_flip(&mut self, _tds: &Tds<K, U, V>, cell: CellKey) -> Result<(), VisitorError> {
        tracing::debug!(cell = ?cell, "before_flip");
        Ok(())
    }

    fn after_flip(&mut self, tds: &Tds<K, U, V>, cell: CellKey) {
        tracing::debug!(cell = ?cell, cells = tds.number_of_cells(), "after_flip");
    }
}

/// One recorded hook call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VisitorEvent {
    /// `before_split(edge)`.
    BeforeSplit(EdgeKey),
    /// `after_split(new_vertex)`.
    AfterSplit(VertexKey),
    /// `after_add_cell(old, new)`.
    AfterAddCell {
        /// The replaced cell.
        old: CellKey,
        /// The created cell.
        new: CellKey,
    },
    /// `before_flip(cell)`.
    BeforeFlip(CellKey),
    /// `after_flip(cell)`.
    AfterFlip(CellKey),
}

/// Records every hook call in order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EventRecorder {
    events: Vec<VisitorEvent>,
}

impl EventRecorder {
    /// Creates an empty recorder.
    #[must_use]
    pub const fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Events so far.
    #[must_use]
    pub fn events(&self) -> &[VisitorEvent] {
        &self.events
    }

    /// Returns the events and starts over.
    pub fn take(&mut self) -> Vec<VisitorEvent> {
        std::mem::take(&mut self.events)
    }

    /// Cells reported by `after_add_cell`, in order.
    #[must_use]
    pub fn added_cells(&self) -> Vec<CellKey> {
        self.events
            .iter()
            .filter_map(|e| match e {
                VisitorEvent::AfterAddCell { new, .. } => Some(*new),
                _ => None,
            })
            .collect()
    }
}

impl<K, U, V> RemeshingVisitor<K, U, V> for EventRecorder
where
    K: Kernel,
    U: DataType,
    V: DataType,
{
    fn before_split(&mut self, _tds: &Tds<K, U, V>, edge: EdgeKey) -> Result<(), VisitorError> {
        self.events.push(VisitorEvent::BeforeSplit(edge));
        Ok(())
    }

    fn after_split(&mut self, _tds: &Tds<K, U, V>, new_vertex: VertexKey) {
        self.events.push(VisitorEvent::AfterSplit(new_vertex));
    }

    fn after_add_cell(
        &mut self,
        old_cell: CellKey,
        _old: &Cell<V>,
        new_cell: CellKey,
        _new: &mut Cell<V>,
    ) {
        self.events.push(VisitorEvent::AfterAddCell {
            old: old_cell,
            new: new_cell,
        });
    }

    fn before_flip(&mut self, _tds: &Tds<K, U, V>, cell: CellKey) -> Result<(), VisitorError> {
        self.events.push(VisitorEvent::BeforeFlip(cell));
        Ok(())
    }

    fn after_flip(&mut self, _tds: &Tds<K, U, V>, cell: CellKey) {
        self.events.push(VisitorEvent::AfterFlip(cell));
    }
}

/// Copies the user data of the replaced cell onto each new cell.
///
/// Mutations carry the subdomain and back-reference over themselves but
/// leave cell data empty, since it often holds per-cell metrics that should
/// be recomputed. Use this visitor when the data is a plain tag instead.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DataPropagator;

impl<K, U, V> RemeshingVisitor<K, U, V> for DataPropagator
where
    K: Kernel,
    U: DataType,
    V: DataType,
{
    fn after_add_cell(
        &mut self,
        _old_cell: CellKey,
        old: &Cell<V>,
        _new_cell: CellKey,
        new: &mut Cell<V>,
    ) {
        new.data = old.data;
    }
}

/// Runs `A` then `B`. A veto from `A` skips `B`.
///
/// A veto from `B` comes after `A` has accepted, so `A` sees a `before_*`
/// with no matching `after_*`. Put visitors that track pending mutations
/// second, or vetoing visitors first.
impl<K, U, V, A, B> RemeshingVisitor<K, U, V> for (A, B)
where
    K: Kernel,
    U: DataType,
    V: DataType,
    A: RemeshingVisitor<K, U, V>,
    B: RemeshingVisitor<K, U, V>,
{
    fn before_split(&mut self, tds: &Tds<K, U, V>, edge: EdgeKey) -> Result<(), VisitorError> {
        self.0.before_split(tds, edge)?;
        self.1.before_split(tds, edge)
    }

    fn after_split(&mut self, tds: &Tds<K, U, V>, new_vertex: VertexKey) {
        self.0.after_split(tds, new_vertex);
        self.1.after_split(tds, new_vertex);
    }

    fn after_add_cell(
        &mut self,
        old_cell: CellKey,
        old: &Cell<V>,
        new_cell: CellKey,
        new: &mut Cell<V>,
    ) {
        self.0.after_add_cell(old_cell, old, new_cell, new);
        self.1.after_add_cell(old_cell, old, new_cell, new);
    }

    fn before_flip(&mut self, tds: &Tds<K, U, V>, cell: CellKey) -> Result<(), VisitorError> {
        self.0.before_flip(tds, cell)?;
        self.1.before_flip(tds, cell)
    }

    fn after_flip(&mut self, tds: &Tds<K, U, V>, cell: CellKey) {
        self.0.after_flip(tds, cell);
        self.1.after_flip(tds, cell);
    }
}

impl<K, U, V, R> RemeshingVisitor<K, U, V> for &mut R
where
    K: Kernel,
    U: DataType,
    V: DataType,
    R: RemeshingVisitor<K, U, V> + ?Sized,
{
    fn before_split(&mut self, tds: &Tds<K, U, V>, edge: EdgeKey) -> Result<(), VisitorError> {
        (**self).before_split(tds, edge)
    }

    fn after_split(&mut self, tds: &Tds<K, U, V>, new_vertex: VertexKey) {
        (**self).after_split(tds, new_vertex);
    }

    fn after_add_cell(
        &mut self,
        old_cell: CellKey,
        old: &Cell<V>,
        new_cell: CellKey,
        new: &mut Cell<V>,
    ) {
        (**self).after_add_cell(old_cell, old, new_cell, new);
    }

    fn before_flip(&mut self, tds: &Tds<K, U, V>, cell: CellKey) -> Result<(), VisitorError> {
        (**self).before_flip(tds, cell)
    }

    fn after_flip(&mut self, tds: &Tds<K, U, V>, cell: CellKey) {
        (**self).after_flip(tds, cell);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cell::SubdomainIndex;
    use crate::geometry::kernel::FastKernel;
    use slotmap::KeyData;

    type TestTds = Tds<FastKernel<f64>, (), u8>;

    fn key(n: u64) -> CellKey {
        CellKey::from(KeyData::from_ffi(n))
    }

    struct Veto;

    impl<K: Kernel, U: DataType, V: DataType> RemeshingVisitor<K, U, V> for Veto {
        fn before_flip(&mut self, _tds: &Tds<K, U, V>, _cell: CellKey) -> Result<(), VisitorError> {
            Err(VisitorError::Rejected {
                reason: "frozen".to_string(),
            })
        }
    }

    #[test]
    fn default_visitor_accepts_everything() {
        let tds = TestTds::new();
        let mut visitor = DefaultRemeshingVisitor;
        assert!(RemeshingVisitor::<_, _, _>::before_flip(&mut visitor, &tds, key(1)).is_ok());
    }

    #[test]
    fn pair_runs_in_order_and_stops_on_veto() {
        let tds = TestTds::new();
        let mut pair = (EventRecorder::new(), EventRecorder::new());
        RemeshingVisitor::<_, _, _>::after_flip(&mut pair, &tds, key(3));
        assert_eq!(pair.0.events(), &[VisitorEvent::AfterFlip(key(3))]);
        assert_eq!(pair.1.events(), pair.0.events());

        let mut vetoing = (Veto, EventRecorder::new());
        assert!(RemeshingVisitor::<_, _, _>::before_flip(&mut vetoing, &tds, key(3)).is_err());
        assert!(vetoing.1.events().is_empty());
    }

    #[test]
    fn first_visitor_keeps_before_hook_when_second_vetoes() {
        let tds = TestTds::new();
        let mut pair = (EventRecorder::new(), Veto);
        assert!(RemeshingVisitor::<_, _, _>::before_flip(&mut pair, &tds, key(4)).is_err());
        assert_eq!(pair.0.events(), &[VisitorEvent::BeforeFlip(key(4))]);
    }

    #[test]
    fn data_propagator_copies_only_data() {
        let old = Cell::<u8>::unwired(SubdomainIndex(2), Some(7), None);
        let mut new = Cell::<u8>::unwired(SubdomainIndex(5), None, None);
        let mut visitor = DataPropagator;
        RemeshingVisitor::<FastKernel<f64>, (), u8>::after_add_cell(
            &mut visitor,
            key(1),
            &old,
            key(2),
            &mut new,
        );
        assert_eq!(new.data, Some(7));
        assert_eq!(new.subdomain(), SubdomainIndex(5));
    }

    #[test]
    fn borrowed_recorder_keeps_events() {
        let tds = TestTds::new();
        let mut recorder = EventRecorder::new();
        {
            let mut borrowed = &mut recorder;
            RemeshingVisitor::<_, _, _>::after_split(&mut borrowed, &tds, VertexKey::default());
        }
        assert_eq!(recorder.take(), vec![VisitorEvent::AfterSplit(VertexKey::default())]);
        assert!(recorder.events().is_empty());
    }
}
