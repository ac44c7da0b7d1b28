//! Property-based tests for cloning and remeshing.
//!
//! Meshes are Kuhn-subdivided grids of random extent and spacing, optionally
//! refined by a few random edge splits before cloning.
//!
//! ## Properties Tested
//!
//! - **Isomorphism** - clone has the same counts and slot-for-slot adjacency
//! - **Infinite vertex** - maps to the target's infinite vertex only
//! - **Validity** - every mutation leaves a valid mesh
//! - **Hook ordering** - `before_split` / `after_split` bracket each split

use proptest::prelude::*;
use tetra_remesh::prelude::*;

type Mesh = Tds<FastKernel<f64>, u8, u8>;

// =============================================================================
// TEST CONFIGURATION
// =============================================================================

fn grid_dims() -> impl Strategy<Value = [usize; 3]> {
    prop::array::uniform3(1usize..=3)
}

fn spacing() -> impl Strategy<Value = f64> {
    (0.01..100.0).prop_filter("must be finite", |x: &f64| x.is_finite())
}

fn refined_mesh(dims: [usize; 3], spacing: f64, picks: &[usize]) -> Mesh {
    let mut tds: Mesh = generate_grid_triangulation(dims, spacing).unwrap();
    for &pick in picks {
        let edges = tds.finite_edges();
        let edge = edges[pick % edges.len()];
        split_edge(&mut tds, edge, &mut DefaultRemeshingVisitor).unwrap();
    }
    tds
}

// =============================================================================
// PROPERTIES
// =============================================================================

proptest! {
    /// Property: cloning preserves counts, slots and the infinite vertex.
    #[test]
    fn prop_clone_is_slot_isomorphic(
        dims in grid_dims(),
        spacing in spacing(),
        picks in prop::collection::vec(any::<usize>(), 0..4),
    ) {
        let source = refined_mesh(dims, spacing, &picks);
        let mut target: Tds<FastKernel<f32>, u8, u8> = Tds::new();
        let map = copy_tds_into(&source, &PreservingConversion::preserving(), &mut target).unwrap();

        prop_assert_eq!(target.number_of_vertices(), source.number_of_vertices());
        prop_assert_eq!(target.number_of_cells(), source.number_of_cells());
        prop_assert_eq!(map.vertex(source.infinite_vertex()), Some(target.infinite_vertex()));
        for (s, t) in map.vertex_pairs() {
            prop_assert_eq!(source.is_infinite_vertex(s), target.is_infinite_vertex(t));
        }
        for (sk, cell) in source.cells() {
            let tk = map.cell(sk).unwrap();
            let mirrored = target.get_cell(tk).unwrap();
            for i in 0..4 {
                prop_assert_eq!(map.vertex(cell.vertex(i)), Some(mirrored.vertex(i)));
                prop_assert_eq!(cell.neighbor(i).and_then(|n| map.cell(n)), mirrored.neighbor(i));
            }
            prop_assert_eq!(mirrored.input_cell(), Some(sk));
        }
        prop_assert!(target.is_valid().is_ok());
    }

    /// Property: random splits keep the mesh valid and are bracketed by hooks.
    #[test]
    fn prop_splits_keep_mesh_valid(
        dims in grid_dims(),
        picks in prop::collection::vec(any::<usize>(), 1..6),
    ) {
        let mut tds: Mesh = generate_grid_triangulation(dims, 1.0).unwrap();
        for pick in picks {
            let edges = tds.finite_edges();
            let edge = edges[pick % edges.len()];
            let ring = tds.cells_around_edge(edge).len();
            let before = (tds.number_of_vertices(), tds.number_of_cells());

            let mut recorder = EventRecorder::new();
            let vertex = split_edge(&mut tds, edge, &mut recorder).unwrap();

            prop_assert_eq!(tds.number_of_vertices(), before.0 + 1);
            prop_assert_eq!(tds.number_of_cells(), before.1 + ring);
            prop_assert_eq!(recorder.events().first(), Some(&VisitorEvent::BeforeSplit(edge)));
            prop_assert_eq!(recorder.events().last(), Some(&VisitorEvent::AfterSplit(vertex)));
            prop_assert_eq!(recorder.added_cells().len(), 2 * ring);
            prop_assert!(tds.is_valid().is_ok());
        }
    }

    /// Property: a 2-3 flip followed by the inverse 3-2 flip restores counts.
    #[test]
    fn prop_flip_pairs_restore_counts(
        dims in grid_dims(),
        pick in any::<usize>(),
    ) {
        let mut tds: Mesh = generate_grid_triangulation(dims, 1.0).unwrap();
        let interior: Vec<FacetHandle> = tds
            .finite_cells()
            .flat_map(|(c, cell)| {
                (0..4u8).filter_map(move |i| {
                    cell.neighbor(usize::from(i)).map(|n| (c, i, n))
                })
            })
            .filter(|&(_, _, n)| !tds.is_infinite_cell(n))
            .map(|(c, i, _)| FacetHandle::new(c, i))
            .collect();
        prop_assume!(!interior.is_empty());
        let facet = interior[pick % interior.len()];
        let counts = (tds.number_of_vertices(), tds.number_of_cells());

        // Refused when the new edge already exists.
        if let Ok(created) = flip_2_3(&mut tds, facet, &mut DefaultRemeshingVisitor) {
            prop_assert!(tds.is_valid().is_ok());
            let cell = tds.get_cell(created[0]).unwrap();
            let (a, b) = {
                let mut shared = cell
                    .vertices()
                    .iter()
                    .copied()
                    .filter(|&v| created.iter().all(|&c| tds.get_cell(c).unwrap().contains_vertex(v)));
                (shared.next().unwrap(), shared.next().unwrap())
            };
            flip_3_2(&mut tds, EdgeKey::new(a, b), &mut DefaultRemeshingVisitor).unwrap();
            prop_assert_eq!((tds.number_of_vertices(), tds.number_of_cells()), counts);
            prop_assert!(tds.is_valid().is_ok());
        }
    }
}
