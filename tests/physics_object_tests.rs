use approx::assert_relative_eq;
use scene_physics_bridge::backend::{ActivationState, CollisionFlags};
use scene_physics_bridge::config::{
    DEFAULT_GROUP, DEFAULT_MASK, KINEMATIC_GROUP, KINEMATIC_MASK,
};
use scene_physics_bridge::{Collider, ObjectId, ObjectKey, Scene, Vec3, WorldSettings};

fn still_scene() -> Scene {
    let mut scene = Scene::with_settings(WorldSettings {
        gravity: Vec3::ZERO,
        ..Default::default()
    });
    scene.physics.set_playing(false);
    scene
}

fn add_box(scene: &mut Scene, position: Vec3) -> (ObjectId, ObjectKey) {
    let owner = scene.graph.create_object("box");
    scene.graph.set_local_position(owner, position);
    let key = scene
        .add_rigid_body(owner, Collider::Box {
            size: Vec3::splat(0.5),
        })
        .expect("physics object");
    (owner, key)
}

#[test]
fn body_is_built_from_the_owner_pose() {
    let mut scene = still_scene();
    let (_, key) = add_box(&mut scene, Vec3::new(1.0, 2.0, 3.0));
    assert!(scene.physics.object(key).expect("object").body().is_none());

    scene.update(1.0 / 60.0);
    let pose = scene.physics.body_pose(key).expect("body");
    assert_relative_eq!(pose.position, Vec3::new(1.0, 2.0, 3.0), epsilon = 1e-5);
    assert!(scene.physics.object(key).expect("object").is_activated());
}

#[test]
fn setters_only_report_effective_changes() {
    let mut scene = still_scene();
    let (_, key) = add_box(&mut scene, Vec3::ZERO);
    scene.update(0.0);

    let mut object = scene.physics_object_mut(key).expect("object");
    assert!(!object.set_mass(1.0));
    assert!(object.set_mass(4.0));
    assert!(!object.set_mass(4.0));
    assert!(object.set_friction(0.9));
    assert!(!object.set_friction(0.9));

    let body = scene.physics.native_body(key).expect("body");
    assert_relative_eq!(body.as_rigid().expect("rigid").inverse_mass(), 0.25);
    assert_relative_eq!(body.friction, 0.9);
}

#[test]
fn cached_values_are_written_when_the_body_is_built() {
    let mut scene = still_scene();
    let (_, key) = add_box(&mut scene, Vec3::ZERO);
    {
        let mut object = scene.physics_object_mut(key).expect("object");
        object.set_mass(2.0);
        object.set_restitution(0.25);
        object.set_linear_velocity(Vec3::new(0.0, 0.0, 3.0));
    }
    scene.update(0.0);

    let body = scene.physics.native_body(key).expect("body");
    assert_relative_eq!(body.restitution, 0.25);
    let rigid = body.as_rigid().expect("rigid");
    assert_relative_eq!(rigid.inverse_mass(), 0.5);
    assert_relative_eq!(rigid.linear_velocity, Vec3::new(0.0, 0.0, 3.0));
}

#[test]
fn kinematic_round_trip_restores_dynamic_defaults() {
    let mut scene = still_scene();
    let (_, key) = add_box(&mut scene, Vec3::ZERO);
    scene.update(0.0);

    {
        let mut object = scene.physics_object_mut(key).expect("object");
        object.set_linear_velocity(Vec3::X);
        assert!(object.set_is_kinematic(true));
    }
    let object = scene.physics.object(key).expect("object");
    assert_eq!(object.collision_group(), KINEMATIC_GROUP);
    assert_eq!(object.collision_mask(), KINEMATIC_MASK);
    assert_eq!(object.activation_state(), ActivationState::DisableDeactivation);
    let body = scene.physics.native_body(key).expect("body");
    assert!(body.flags.contains(CollisionFlags::KINEMATIC));
    assert_eq!(body.as_rigid().expect("rigid").inverse_mass(), 0.0);
    assert_eq!(body.as_rigid().expect("rigid").linear_velocity, Vec3::ZERO);

    assert!(scene
        .physics_object_mut(key)
        .expect("object")
        .set_is_kinematic(false));
    let object = scene.physics.object(key).expect("object");
    assert_eq!(object.collision_group(), DEFAULT_GROUP);
    assert_eq!(object.collision_mask(), DEFAULT_MASK);
    assert_eq!(object.activation_state(), ActivationState::Active);
    let body = scene.physics.native_body(key).expect("body");
    assert!(!body.flags.contains(CollisionFlags::KINEMATIC));
    assert_relative_eq!(body.as_rigid().expect("rigid").inverse_mass(), 1.0);
}

#[test]
fn large_scale_change_rebuilds_the_body() {
    let mut scene = still_scene();
    let (owner, key) = add_box(&mut scene, Vec3::ZERO);
    scene.update(0.0);
    let first = scene.physics.object(key).expect("object").body();

    scene.graph.set_local_scale(owner, Vec3::splat(1.05));
    scene.update(0.0);
    assert_eq!(scene.physics.object(key).expect("object").body(), first);

    scene.graph.set_local_scale(owner, Vec3::splat(2.0));
    scene.update(0.0);
    let object = scene.physics.object(key).expect("object");
    assert_ne!(object.body(), first);
    assert_relative_eq!(object.previous_scale(), Vec3::splat(2.0));
    let shape = object.shape().expect("shape");
    assert_relative_eq!(shape.local_scaling(), Vec3::splat(2.0));
}

#[test]
fn disabled_objects_leave_the_world() {
    let mut scene = still_scene();
    let (_, key) = add_box(&mut scene, Vec3::ZERO);
    scene.update(0.0);
    let handle = scene.physics.object(key).and_then(|o| o.body()).expect("body");

    assert!(scene.physics_object_mut(key).expect("object").set_enabled(false));
    assert!(!scene.physics.backend().expect("world").is_in_world(handle));
    assert!(!scene.physics.object(key).expect("object").is_activated());

    assert!(scene.physics_object_mut(key).expect("object").set_enabled(true));
    assert!(scene.physics.backend().expect("world").is_in_world(handle));
}

#[test]
fn offset_is_applied_on_push_and_removed_on_pull() {
    let mut scene = Scene::new();
    let (owner, key) = add_box(&mut scene, Vec3::new(0.0, 10.0, 0.0));
    scene
        .physics_object_mut(key)
        .expect("object")
        .set_position_offset(Vec3::new(0.0, 1.0, 0.0));
    scene.update(0.0);
    let pose = scene.physics.body_pose(key).expect("body");
    assert_relative_eq!(pose.position.y, 11.0, epsilon = 1e-5);

    scene.update(1.0 / 60.0);
    let body_y = scene.physics.body_pose(key).expect("body").position.y;
    let owner_y = scene.graph.world_position(owner).expect("owner").y;
    assert!(body_y < 11.0);
    assert_relative_eq!(body_y - owner_y, 1.0, epsilon = 1e-4);
}

#[test]
fn kinematic_bodies_follow_the_scene() {
    let mut scene = Scene::new();
    let (owner, key) = add_box(&mut scene, Vec3::ZERO);
    scene
        .physics_object_mut(key)
        .expect("object")
        .set_is_kinematic(true);
    for step in 1..=10 {
        scene.graph.set_local_position(owner, Vec3::new(step as f32, 0.0, 0.0));
        scene.update(1.0 / 60.0);
        let pose = scene.physics.body_pose(key).expect("body");
        assert_relative_eq!(pose.position.x, step as f32, epsilon = 1e-5);
        assert_relative_eq!(
            scene.graph.world_position(owner).expect("owner").y,
            0.0
        );
    }
}

#[test]
fn collider_change_rebuilds_with_the_new_shape() {
    let mut scene = still_scene();
    let (_, key) = add_box(&mut scene, Vec3::ZERO);
    scene.update(0.0);
    assert!(scene
        .physics_object_mut(key)
        .expect("object")
        .set_sphere_radius(2.0));
    let object = scene.physics.object(key).expect("object");
    assert_eq!(object.collider(), &Collider::Sphere { radius: 2.0 });
    let aabb = scene.physics.aabb(key).expect("aabb");
    assert!(aabb.max.x >= 2.0);
}

#[test]
fn forces_wake_and_move_dynamic_bodies() {
    let mut scene = Scene::with_settings(WorldSettings {
        gravity: Vec3::ZERO,
        ..Default::default()
    });
    let (_, key) = add_box(&mut scene, Vec3::ZERO);
    scene.update(0.0);
    assert!(scene
        .physics_object_mut(key)
        .expect("object")
        .apply_impulse(Vec3::new(2.0, 0.0, 0.0), None));
    scene.update(1.0 / 60.0);
    let velocity = scene.physics.linear_velocity(key).expect("velocity");
    assert_relative_eq!(velocity.x, 2.0, epsilon = 1e-3);
}
