//! BVH over real scenes and custom object lists.

use std::sync::Arc;

use epsilon::backend::HostBackend;
use epsilon::engine::{RenderConfig, Renderer};
use epsilon::geometry::{build_bvh, Bvh, Primitive, Triangle};
use epsilon::kernel::{EngineParams, KernelObject, Query};
use epsilon::objects::{Geometry, Materials, Progress};
use epsilon::scene::{example_box, read_geometry, write_geometry, MemorySource};
use epsilon::util::{Aabb, Vec3};

fn union_of(tris: &[Triangle]) -> Aabb {
    let mut bbox = tris[0].bounding_box();
    for t in &tris[1..] {
        bbox.expand_to_include(&t.bounding_box());
    }
    bbox
}

/// Deterministic pseudo-random triangle soup.
fn soup(count: usize, mut state: u32) -> Vec<Triangle> {
    let mut next = move || {
        state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        (state >> 8) as f32 / (1u32 << 24) as f32 * 20.0 - 10.0
    };
    (0..count)
        .map(|i| {
            let c = Vec3::new(next(), next(), next());
            Triangle::new(c, c + Vec3::new(0.3, 0.0, 0.1), c + Vec3::new(0.0, 0.4, 0.0), i as u32 % 4)
        })
        .collect()
}

fn check_tree(bvh: &Bvh, leaf_size: usize) {
    for (i, node) in bvh.nodes.iter().enumerate() {
        if node.is_leaf() {
            assert!(node.n_prims as usize <= leaf_size.max(1));
            continue;
        }
        let left = &bvh.nodes[i + 1];
        let right = &bvh.nodes[i + node.right_offset as usize];
        assert_eq!(left.start, node.start);
        assert_eq!(left.start + left.n_prims, right.start);
        assert_eq!(right.start + right.n_prims, node.start + node.n_prims);
    }
}

#[test]
fn test_example_box_hierarchy() {
    let mut tris = example_box();
    let union = union_of(&tris);
    let bvh = build_bvh(&mut tris, 2);

    assert!((8..=15).contains(&bvh.node_count), "node count {}", bvh.node_count);
    assert!((4..=8).contains(&bvh.leaf_count), "leaf count {}", bvh.leaf_count);
    assert_eq!(bvh.root().bbox, union);
    check_tree(&bvh, 2);
}

#[test]
fn test_example_box_survives_record_stream() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("geometry");
    write_geometry(std::fs::File::create(&path).unwrap(), &example_box()).unwrap();

    let tris = read_geometry(std::fs::File::open(&path).unwrap()).unwrap();
    assert_eq!(tris.len(), 8);
    assert_eq!(union_of(&tris), union_of(&example_box()));
}

#[test]
fn test_soups_build_valid_trees() {
    for (count, leaf_size) in [(1, 2), (2, 1), (31, 0), (200, 2), (513, 4), (1000, 8)] {
        let mut tris = soup(count, count as u32);
        let bvh = build_bvh(&mut tris, leaf_size);
        assert!(bvh.node_count >= 1 && bvh.leaf_count >= 1);
        assert_eq!(bvh.node_count, 2 * bvh.leaf_count - 1);
        assert_eq!(bvh.root().bbox, union_of(&tris));
        check_tree(&bvh, leaf_size);
    }
}

fn params(leaf_size: usize, backend: Arc<HostBackend>) -> Arc<EngineParams> {
    let mut geometry = Vec::new();
    write_geometry(&mut geometry, &soup(77, 9)).unwrap();
    let scene = MemorySource::new()
        .with("geometry", geometry)
        .with("materials.json", r#"{"atmosphere": 5, "models": {"b": 7, "a": 6}}"#);

    let config = RenderConfig {
        width: 4,
        height: 4,
        passes: 2,
        leaf_size,
        ..Default::default()
    };
    EngineParams::new(config, backend, Box::new(scene), "host").unwrap()
}

#[test]
fn test_triangle_count_ignores_leaf_size() {
    for leaf_size in [0, 1, 2, 16] {
        let backend = Arc::new(HostBackend::new().with_kernel("main", |_, _| {}));
        let params = params(leaf_size, backend);
        let objects: Vec<Box<dyn KernelObject>> = vec![Box::new(Geometry::new(&params).unwrap())];
        let mut renderer = Renderer::with_objects(params, objects).unwrap();
        while !renderer.execute().unwrap() {}
        assert_eq!(
            renderer.query(Query::TriangleCount).and_then(|v| v.as_count()),
            Some(77)
        );
        renderer.finish().unwrap();
    }
}

#[test]
fn test_custom_object_list() {
    let backend = Arc::new(HostBackend::new().with_kernel("main", |_, _| {}));
    let params = params(2, backend.clone());

    let materials = Materials::new(&params).unwrap();
    // Atmosphere first, then models by name: "a" before "b".
    assert_eq!(materials.mapping(), &[5, 6, 7]);

    let objects: Vec<Box<dyn KernelObject>> = vec![
        Box::new(Progress::new(2, std::time::Duration::ZERO)),
        Box::new(materials),
        Box::new(Geometry::new(&params).unwrap()),
    ];
    let renderer = Renderer::with_objects(params, objects).unwrap();

    // Progress binds nothing, so the mapping takes slot 0.
    let labels: Vec<(u32, &str)> = renderer.bindings().iter().map(|b| (b.slot, b.label)).collect();
    assert_eq!(
        labels,
        vec![(0, "mapping"), (1, "triangles"), (2, "nodes"), (3, "scene_info")]
    );
    assert_eq!(backend.live_resources(), 4);

    drop(renderer);
    assert_eq!(backend.live_resources(), 0);
}

#[test]
fn test_geometry_counts() {
    let backend = Arc::new(HostBackend::new().with_kernel("main", |_, _| {}));
    let params = params(2, backend.clone());
    let geometry = Geometry::new(&params).unwrap();
    assert_eq!(geometry.triangle_count(), 77);
    assert_eq!(geometry.node_count(), 2 * geometry.leaf_count() - 1);
    assert_eq!(backend.live_resources(), 3);
}
