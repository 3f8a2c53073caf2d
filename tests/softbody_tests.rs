use approx::assert_relative_eq;
use scene_physics_bridge::physics::optimize_mesh;
use scene_physics_bridge::{
    Figure, ObjectId, ObjectKey, RenderMesh, Scene, Vec3, VertexFormat, VertexSemantic,
    WorldSettings,
};

const DT: f32 = 1.0 / 60.0;

/// Unit quad in the XZ plane as two triangles with unshared corners.
fn quad_soup() -> (Vec<Vec3>, Vec<u32>) {
    let corners = [
        Vec3::new(-0.5, 0.0, -0.5),
        Vec3::new(0.5, 0.0, -0.5),
        Vec3::new(0.5, 0.0, 0.5),
        Vec3::new(-0.5, 0.0, 0.5),
    ];
    let positions = vec![
        corners[0], corners[2], corners[1], corners[0], corners[3], corners[2],
    ];
    (positions, (0..6).collect())
}

fn cloth_scene(position_format: VertexFormat, normal_format: VertexFormat) -> (Scene, ObjectId, ObjectKey) {
    let mut scene = Scene::with_settings(WorldSettings {
        deformable: true,
        ..Default::default()
    });
    let owner = scene.graph.create_object("cloth");
    scene.graph.set_local_position(owner, Vec3::new(0.0, 5.0, 0.0));
    let (positions, indices) = quad_soup();
    let normals = vec![Vec3::Y; positions.len()];
    let mesh = RenderMesh::from_positions(
        "cloth",
        &positions,
        Some(&normals),
        indices,
        position_format,
        normal_format,
    )
    .expect("mesh");
    scene.graph.set_figure(owner, Figure::new(vec![mesh]));
    let key = scene.add_soft_body(owner, 0).expect("soft body");
    (scene, owner, key)
}

#[test]
fn duplicate_corners_collapse_into_shared_nodes() {
    let (positions, indices) = quad_soup();
    let optimized = optimize_mesh(&positions, &indices);
    assert_eq!(optimized.positions.len(), 4);
    assert_eq!(optimized.index_map.len(), 6);
    assert_eq!(optimized.index_map[0], optimized.index_map[3]);
    assert_eq!(optimized.index_map[1], optimized.index_map[5]);
    assert_eq!(optimized.indices.len(), 6);
    for (original, node) in optimized.index_map.iter().enumerate() {
        assert_eq!(optimized.positions[*node], positions[original]);
    }
}

#[test]
fn rigid_only_world_leaves_soft_bodies_unbuilt() {
    let mut scene = Scene::new();
    let owner = scene.graph.create_object("cloth");
    let key = scene.add_soft_body(owner, 0).expect("soft body");
    scene.update(DT);
    assert!(scene.physics.object(key).expect("object").body().is_none());
}

#[test]
fn soft_body_is_built_in_world_space() {
    let (mut scene, _, key) = cloth_scene(VertexFormat::Float32, VertexFormat::Float32);
    scene.physics.set_playing(false);
    scene.update(DT);

    let object = scene.physics.object(key).expect("object");
    assert_eq!(object.soft_body().expect("adapter").index_map().len(), 6);
    let node = scene
        .physics
        .nearest_node_index(key, Vec3::new(0.5, 5.0, 0.5))
        .expect("node");
    assert_relative_eq!(
        scene.physics.node_position(key, node),
        Vec3::new(0.5, 5.0, 0.5),
        epsilon = 1e-5
    );
    assert_eq!(scene.physics.node_position(key, 99), Vec3::splat(f32::MAX));
    assert_eq!(scene.physics.node_normal(key, 99), Vec3::splat(f32::MAX));
}

#[test]
fn simulated_nodes_are_written_back_in_local_space() {
    let (mut scene, owner, key) = cloth_scene(VertexFormat::Float32, VertexFormat::Float32);
    for _ in 0..10 {
        scene.update(DT);
    }
    let owner_y = scene.graph.world_position(owner).expect("owner").y;
    assert!(owner_y < 5.0, "cloth did not fall: {owner_y}");

    let index_map = scene
        .physics
        .object(key)
        .and_then(|object| object.soft_body())
        .map(|adapter| adapter.index_map().to_vec())
        .expect("adapter");
    let local: Vec<Vec3> = {
        let mesh = scene.graph.figure(owner).and_then(|figure| figure.mesh(0)).expect("mesh");
        assert!(mesh.needs_upload());
        (0..mesh.vertex_count())
            .map(|vertex| mesh.read_attribute(vertex, VertexSemantic::Position).expect("position"))
            .collect()
    };
    for (vertex, node) in index_map.iter().enumerate() {
        let world = scene.graph.local_to_global(owner, local[vertex]).expect("owner");
        assert_relative_eq!(world, scene.physics.node_position(key, *node), epsilon = 1e-4);
    }
}

#[test]
fn packed_vertex_formats_are_written_back() {
    let (mut scene, owner, _) = cloth_scene(VertexFormat::HalfFloat, VertexFormat::Short);
    scene.update(DT);
    let mesh = scene.graph.figure(owner).and_then(|figure| figure.mesh(0)).expect("mesh");
    for vertex in 0..mesh.vertex_count() {
        let normal = mesh.read_attribute(vertex, VertexSemantic::Normal).expect("normal");
        assert_relative_eq!(normal.length(), 1.0, epsilon = 1e-3);
        let position = mesh.read_attribute(vertex, VertexSemantic::Position).expect("position");
        assert!(position.abs().max_element() < 1.0, "vertex {vertex} at {position}");
    }
}

#[test]
fn moving_the_owner_moves_every_node() {
    let (mut scene, owner, key) = cloth_scene(VertexFormat::Float32, VertexFormat::Float32);
    scene.physics.set_playing(false);
    scene.update(DT);
    let before = scene.physics.node_position(key, 0);

    scene.graph.translate(owner, Vec3::new(3.0, 0.0, 0.0));
    scene.update(DT);
    assert_relative_eq!(
        scene.physics.node_position(key, 0),
        before + Vec3::new(3.0, 0.0, 0.0),
        epsilon = 1e-4
    );
}

#[test]
fn config_changes_reach_the_live_body() {
    let (mut scene, _, key) = cloth_scene(VertexFormat::Float32, VertexFormat::Float32);
    scene.update(0.0);
    {
        let mut object = scene.physics_object_mut(key).expect("object");
        assert!(object.update_soft_body_config(|config| config.damping = 0.9));
        assert!(!object.update_soft_body_config(|config| config.damping = 0.9));
        assert!(object.set_aero_model(42));
    }
    let object = scene.physics.object(key).expect("object");
    let config = object.soft_body().expect("adapter").config();
    assert_relative_eq!(config.damping, 0.9);
    assert_eq!(config.aero_model.raw(), 6);
}
