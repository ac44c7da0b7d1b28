//! Integration tests for cloning meshes across kernels and payload types.
//!
//! Cloned meshes are compared through the returned [`CloneMap`]: every
//! source vertex and cell must map to exactly one target element, and every
//! vertex slot and neighbor slot must map slot for slot. Round trips are
//! compared by a coordinate signature, since keys differ between meshes.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use tetra_remesh::geometry::util::conversions::safe_coords_to_f64;
use tetra_remesh::prelude::*;

type F64Mesh<U = (), V = ()> = Tds<FastKernel<f64>, U, V>;
type F32Mesh<U = (), V = ()> = Tds<FastKernel<f32>, U, V>;

fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Asserts that `map` is an isomorphism from `source` onto `target`.
fn assert_isomorphic<Ks, Us, Vs, Kt, Ut, Vt>(
    source: &Tds<Ks, Us, Vs>,
    target: &Tds<Kt, Ut, Vt>,
    map: &CloneMap,
) where
    Ks: Kernel,
    Us: DataType,
    Vs: DataType,
    Kt: Kernel,
    Ut: DataType,
    Vt: DataType,
{
    assert_eq!(target.number_of_vertices(), source.number_of_vertices());
    assert_eq!(target.number_of_cells(), source.number_of_cells());
    assert_eq!(map.number_of_vertices(), source.number_of_vertices());
    assert_eq!(map.number_of_cells(), source.number_of_cells());
    assert_eq!(
        map.vertex(source.infinite_vertex()),
        Some(target.infinite_vertex())
    );

    let mut seen = FastHashSet::default();
    for (s, t) in map.vertex_pairs() {
        assert!(seen.insert(t), "two source vertices share target {t:?}");
        assert_eq!(
            source.is_infinite_vertex(s),
            target.is_infinite_vertex(t),
            "infinite vertex must map to the infinite vertex"
        );
    }

    for (sk, source_cell) in source.cells() {
        let tk = map.cell(sk).expect("every source cell is mapped");
        let target_cell = target.get_cell(tk).expect("mapped cell exists");
        for i in 0..4 {
            assert_eq!(map.vertex(source_cell.vertex(i)), Some(target_cell.vertex(i)));
            assert_eq!(
                source_cell.neighbor(i).and_then(|n| map.cell(n)),
                target_cell.neighbor(i)
            );
        }
        assert_eq!(target_cell.subdomain(), source_cell.subdomain());
    }
    assert!(target.is_valid().is_ok());
}

/// Cell signatures by rounded coordinates, with the infinite vertex as `None`.
fn signature<K, U, V>(tds: &Tds<K, U, V>) -> BTreeMap<Vec<Option<[i64; 3]>>, usize>
where
    K: Kernel,
    U: DataType,
    V: DataType,
{
    let key = |v: VertexKey| {
        tds.point(v).map(|p| {
            safe_coords_to_f64(p.to_array())
                .expect("finite coordinates")
                .map(|c| (c * 1e6).round() as i64)
        })
    };
    let mut out = BTreeMap::new();
    for (_, cell) in tds.cells() {
        let mut s: Vec<_> = cell.vertices().iter().map(|&v| key(v)).collect();
        s.sort_unstable();
        *out.entry(s).or_insert(0) += 1;
    }
    out
}

fn single_tet() -> F64Mesh<(), u8> {
    MeshBuilder::new()
        .points([
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
        ])
        .tetrahedra([[0, 1, 2, 3]])
        .subdomains([4])
        .cell_data([9])
        .build()
        .expect("single tetrahedron builds")
}

#[test]
fn single_tetrahedron_clone_scenario() {
    init_tracing();
    let source = single_tet();
    assert_eq!(source.number_of_vertices(), 5);

    let mut target: F32Mesh<(), u8> = Tds::new();
    let map = copy_tds_into(&source, &PreservingConversion::preserving(), &mut target).unwrap();

    assert_eq!(target.number_of_vertices(), 5);
    assert_eq!(target.number_of_finite_cells(), 1);
    assert_eq!(target.number_of_cells(), 5);
    assert_isomorphic(&source, &target, &map);

    // The finite cell's vertices are a bijection onto the source's, by coordinates.
    let (_, source_cell) = source.finite_cells().next().unwrap();
    let (_, target_cell) = target.finite_cells().next().unwrap();
    for i in 0..4 {
        let s = source.point(source_cell.vertex(i)).unwrap().to_array();
        let t = target.point(target_cell.vertex(i)).unwrap().to_array();
        for k in 0..3 {
            approx::assert_relative_eq!(f64::from(t[k]), s[k]);
        }
    }
    assert_eq!(target_cell.data, Some(9));
    assert_eq!(target_cell.subdomain(), SubdomainIndex(4));
}

#[test]
fn infinite_vertex_is_reused_with_a_fresh_stamp() {
    let source = single_tet();
    let mut target: F64Mesh<(), u8> = Tds::new();
    let infinite_before = target.infinite_vertex();
    let stamp_before = target.get_vertex(infinite_before).unwrap().uuid();

    let map = copy_tds_into(&source, &FreshConversion::fresh(), &mut target).unwrap();

    assert_eq!(target.infinite_vertex(), infinite_before);
    assert_eq!(map.vertex(source.infinite_vertex()), Some(infinite_before));
    let infinite = target.get_vertex(infinite_before).unwrap();
    assert!(infinite.is_infinite());
    assert!(infinite.point().is_none());
    assert_ne!(infinite.uuid(), UNSET_STAMP);
    assert_ne!(infinite.uuid(), stamp_before);
    assert_ne!(
        infinite.uuid(),
        source.get_vertex(source.infinite_vertex()).unwrap().uuid()
    );
}

#[test]
fn stamps_are_mesh_local() {
    let source: F64Mesh = generate_grid_triangulation([2, 1, 1], 1.0).unwrap();
    let target: F64Mesh = clone_tds(&source, &FreshConversion::fresh()).unwrap();

    for (_, v) in target.vertices() {
        assert!(source.vertex_key_from_uuid(&v.uuid()).is_none());
    }
    for (_, c) in target.cells() {
        assert!(source.cell_key_from_uuid(&c.uuid()).is_none());
    }
}

#[test]
fn grid_clones_are_isomorphic() {
    init_tracing();
    for dims in [[1, 1, 1], [2, 2, 1], [3, 2, 2]] {
        let source: F64Mesh<u16, u16> = generate_grid_triangulation_with_subdomains(dims, 0.5, |c| {
            SubdomainIndex(i32::try_from(c[2]).unwrap_or(0) + 1)
        })
        .unwrap();

        let mut target: F32Mesh<u16, u16> = Tds::new();
        let map = copy_tds_into(&source, &PreservingConversion::preserving(), &mut target).unwrap();
        assert_isomorphic(&source, &target, &map);

        let mut fresh: F64Mesh = Tds::new();
        let map = copy_tds_into(&source, &FreshConversion::fresh(), &mut fresh).unwrap();
        assert_isomorphic(&source, &fresh, &map);
    }
}

#[test]
fn clone_into_replaces_previous_contents() {
    let big: F64Mesh = generate_grid_triangulation([2, 2, 2], 1.0).unwrap();
    let small = single_tet();

    let mut target: F64Mesh<(), u8> = Tds::new();
    copy_tds_into(&big, &FreshConversion::fresh(), &mut target).unwrap();
    let map = copy_tds_into(&small, &PreservingConversion::preserving(), &mut target).unwrap();
    assert_isomorphic(&small, &target, &map);
}

#[test]
fn round_trip_through_single_precision() {
    let source: F64Mesh<(), u32> = generate_grid_triangulation([2, 2, 1], 0.25).unwrap();
    let there: F32Mesh<(), u32> = clone_tds(&source, &PreservingConversion::preserving()).unwrap();
    let back: F64Mesh<(), u32> = clone_tds(&there, &PreservingConversion::preserving()).unwrap();

    assert_eq!(signature(&back), signature(&source));
    assert_eq!(back.number_of_cells(), source.number_of_cells());
    assert!(back.is_valid().is_ok());
}

#[test]
fn clone_after_remeshing_keeps_split_vertices() {
    let mut source: F64Mesh = generate_grid_triangulation([1, 1, 1], 1.0).unwrap();
    let mut visitor = DefaultRemeshingVisitor;
    for _ in 0..4 {
        let edge = source.finite_edges()[0];
        split_edge(&mut source, edge, &mut visitor).unwrap();
    }
    let mut target: F64Mesh = Tds::new();
    let map = copy_tds_into(&source, &FreshConversion::fresh(), &mut target).unwrap();
    assert_isomorphic(&source, &target, &map);
    assert_eq!(signature(&target), signature(&source));
}

#[test]
fn failed_clone_leaves_target_cleared() {
    let mut source = single_tet();
    let (cell, _) = source.finite_cells().next().unwrap();
    source.remove_cell(cell);

    let mut target: F64Mesh<(), u8> = generate_grid_triangulation([1, 1, 1], 1.0).unwrap();
    let err = copy_tds_into(&source, &FreshConversion::fresh(), &mut target).unwrap_err();
    assert!(matches!(err, CloneError::StructuralInconsistency { .. }));
    assert_eq!(target.number_of_vertices(), 1);
    assert_eq!(target.number_of_cells(), 0);
}

#[test]
fn unrepresentable_coordinate_names_the_vertex() {
    let source: F64Mesh = MeshBuilder::new()
        .points([
            [0.0, 0.0, 0.0],
            [1.0e39, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
        ])
        .tetrahedra([[0, 1, 2, 3]])
        .build()
        .unwrap();
    let far = source
        .finite_vertices()
        .find(|(_, v)| v.point().is_some_and(|p| p.to_array()[0] > 1.0))
        .map(|(k, _)| k)
        .unwrap();

    let mut target: F32Mesh = Tds::new();
    let err = copy_tds_into(&source, &FreshConversion::fresh(), &mut target).unwrap_err();
    match err {
        CloneError::Conversion(conversion) => {
            assert_eq!(conversion.element(), ElementRef::Vertex(far));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(target.number_of_cells(), 0);
}

#[test]
fn open_source_is_rejected() {
    let mut source = single_tet();
    let outside = source
        .cell_keys()
        .find(|&c| source.is_infinite_cell(c))
        .unwrap();
    source.remove_cell(outside);
    assert!(source.is_valid().is_err());

    let mut target: F32Mesh<(), u8> = Tds::new();
    let err = copy_tds_into(&source, &PreservingConversion::preserving(), &mut target).unwrap_err();
    assert!(matches!(
        err,
        CloneError::StructuralInconsistency {
            source: TriangulationValidationError::InvalidNeighbors { .. }
        }
    ));
    assert_eq!(target.number_of_cells(), 0);
}
