//! Integration tests for serializing mesh elements with `serde_json`.
//!
//! Elements serialize their payload and identity stamp; the incident-cell
//! hint is runtime-only and is rebuilt by the owning mesh.

use tetra_remesh::prelude::*;

fn preserved_copy() -> (Tds<FastKernel<f64>, i32, u16>, Tds<FastKernel<f64>, i32, u16>) {
    let mut source: Tds<FastKernel<f64>, i32, u16> = MeshBuilder::new()
        .points([
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
        ])
        .tetrahedra([[0, 1, 2, 3]])
        .subdomains([5])
        .cell_data([42])
        .build()
        .unwrap();
    let keys: Vec<VertexKey> = source.finite_vertices().map(|(k, _)| k).collect();
    for (n, key) in keys.into_iter().enumerate() {
        let vertex = source.get_vertex_mut(key).unwrap();
        vertex.data = Some(i32::try_from(n).unwrap());
        vertex.set_dimension(FeatureDimension::Surface);
    }
    let target = clone_tds(&source, &PreservingConversion::preserving()).unwrap();
    (source, target)
}

#[test]
fn vertices_round_trip_through_json() {
    let (_, tds) = preserved_copy();
    for (_, vertex) in tds.vertices() {
        let json = serde_json::to_string(vertex).expect("serialization succeeds");
        assert!(!json.contains("incident_cell"));
        let back: Vertex<f64, i32> = serde_json::from_str(&json).expect("deserialization succeeds");
        assert_eq!(&back, vertex);
        assert_eq!(back.uuid(), vertex.uuid());
        assert_eq!(back.is_infinite(), vertex.is_infinite());
    }
}

#[test]
fn feature_dimension_is_serialized_by_name() {
    let (_, tds) = preserved_copy();
    let (_, vertex) = tds.finite_vertices().next().unwrap();
    let json = serde_json::to_value(vertex).unwrap();
    assert_eq!(json["dimension"], "Surface");
}

#[test]
fn cells_keep_payload_and_back_reference() {
    let (source, tds) = preserved_copy();
    let (_, cell) = tds.finite_cells().next().unwrap();
    let json = serde_json::to_string(cell).unwrap();
    let back: Cell<u16> = serde_json::from_str(&json).unwrap();

    assert_eq!(back.vertices(), cell.vertices());
    assert_eq!(back.neighbors(), cell.neighbors());
    assert_eq!(back.uuid(), cell.uuid());
    assert_eq!(back.subdomain(), SubdomainIndex(5));
    assert_eq!(back.data, Some(42));
    let (source_cell, _) = source.finite_cells().next().unwrap();
    assert_eq!(back.input_cell(), Some(source_cell));
}

#[test]
fn subdomain_index_is_transparent() {
    assert_eq!(serde_json::to_string(&SubdomainIndex(7)).unwrap(), "7");
    let back: SubdomainIndex = serde_json::from_str("-2").unwrap();
    assert_eq!(back, SubdomainIndex(-2));
}

#[test]
fn point_serializes_as_coordinate_array() {
    let p: Point<f32, 3> = Point::new([0.5, -1.0, 2.0]);
    let json = serde_json::to_string(&p).unwrap();
    let back: Point<f32, 3> = serde_json::from_str(&json).unwrap();
    assert_eq!(back, p);
}
