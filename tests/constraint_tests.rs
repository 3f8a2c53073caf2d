use scene_physics_bridge::backend::{Joint, JointHandle};
use scene_physics_bridge::physics::{ConstraintParams, Dof6SpringParams, HingeParams, SpringParams};
use scene_physics_bridge::{Collider, ConstraintKey, ObjectId, ObjectKey, Scene, Vec3};

fn add_sphere(scene: &mut Scene, name: &str, position: Vec3) -> (ObjectId, ObjectKey) {
    let owner = scene.graph.create_object(name);
    scene.graph.set_local_position(owner, position);
    let key = scene
        .add_rigid_body(owner, Collider::Sphere { radius: 0.5 })
        .expect("physics object");
    (owner, key)
}

fn joint_bodies(scene: &Scene, constraint: ConstraintKey) -> Option<(u64, Option<u64>)> {
    let handle = scene.physics.constraint(constraint)?.joint()?;
    let joint = scene.physics.backend()?.joint(handle)?;
    Some((joint.body_a.to_bits(), joint.body_b.map(|body| body.to_bits())))
}

fn body_bits(scene: &Scene, key: ObjectKey) -> Option<u64> {
    scene
        .physics
        .object(key)?
        .body()
        .map(|handle| handle.to_bits())
}

#[test]
fn world_anchored_fixed_joint_holds_against_gravity() {
    let mut scene = Scene::new();
    let (owner, key) = add_sphere(&mut scene, "hanging", Vec3::new(0.0, 5.0, 0.0));
    scene
        .physics_object_mut(key)
        .expect("object")
        .add_constraint(ConstraintParams::Fixed)
        .expect("constraint");
    for _ in 0..60 {
        scene.update(1.0 / 60.0);
    }
    let height = scene.graph.world_position(owner).expect("owner").y;
    assert!((height - 5.0).abs() < 0.25, "body drifted to {height}");
}

#[test]
fn free_body_falls_without_the_joint() {
    let mut scene = Scene::new();
    let (owner, _) = add_sphere(&mut scene, "free", Vec3::new(0.0, 5.0, 0.0));
    for _ in 0..60 {
        scene.update(1.0 / 60.0);
    }
    let height = scene.graph.world_position(owner).expect("owner").y;
    assert!(height < 2.0, "body stayed at {height}");
}

#[test]
fn tiny_breaking_threshold_breaks_the_joint() {
    let mut scene = Scene::new();
    let (_, key) = add_sphere(&mut scene, "fragile", Vec3::new(0.0, 5.0, 0.0));
    let constraint = scene
        .physics_object_mut(key)
        .expect("object")
        .add_constraint(ConstraintParams::Fixed)
        .expect("constraint");
    scene.update(0.0);
    assert!(scene
        .physics
        .constraint_mut(constraint)
        .expect("constraint")
        .set_breaking_impulse_threshold(1e-4));
    assert!(!scene.physics.is_constraint_broken(constraint));
    scene.update(1.0 / 60.0);
    assert!(scene.physics.is_constraint_broken(constraint));
}

#[test]
fn joint_follows_a_rebuilt_body() {
    let mut scene = Scene::new();
    let (_, a) = add_sphere(&mut scene, "a", Vec3::ZERO);
    let (_, b) = add_sphere(&mut scene, "b", Vec3::new(2.0, 0.0, 0.0));
    let constraint = scene
        .physics_object_mut(a)
        .expect("object")
        .add_constraint(ConstraintParams::Hinge(HingeParams::default()))
        .expect("constraint");
    scene
        .physics
        .constraint_mut(constraint)
        .expect("constraint")
        .set_other(Some(b));
    scene.update(0.0);
    assert_eq!(
        joint_bodies(&scene, constraint),
        Some((body_bits(&scene, a).expect("a"), body_bits(&scene, b)))
    );

    let before = body_bits(&scene, b);
    scene
        .physics_object_mut(b)
        .expect("object")
        .set_sphere_radius(1.0);
    assert_ne!(body_bits(&scene, b), before);
    assert_eq!(
        joint_bodies(&scene, constraint),
        Some((body_bits(&scene, a).expect("a"), body_bits(&scene, b)))
    );
    let joint = scene
        .physics
        .constraint(constraint)
        .and_then(|constraint| constraint.joint())
        .expect("joint");
    assert!(scene
        .physics
        .backend()
        .expect("world")
        .is_joint_in_world(joint));
}

#[test]
fn removing_the_other_object_anchors_to_the_world() {
    let mut scene = Scene::new();
    let (_, a) = add_sphere(&mut scene, "a", Vec3::ZERO);
    let (b_owner, b) = add_sphere(&mut scene, "b", Vec3::new(2.0, 0.0, 0.0));
    let constraint = scene
        .physics_object_mut(a)
        .expect("object")
        .add_constraint(ConstraintParams::Spring(SpringParams::default()))
        .expect("constraint");
    scene
        .physics
        .constraint_mut(constraint)
        .expect("constraint")
        .set_other(Some(b));
    scene.update(0.0);

    assert!(scene.destroy_object(b_owner));
    let found = scene.physics.constraint(constraint).expect("constraint");
    assert_eq!(found.other(), None);
    assert_eq!(
        joint_bodies(&scene, constraint),
        Some((body_bits(&scene, a).expect("a"), None))
    );
}

#[test]
fn disabling_unregisters_without_destroying() {
    let mut scene = Scene::new();
    let (_, key) = add_sphere(&mut scene, "a", Vec3::ZERO);
    let constraint = scene
        .physics_object_mut(key)
        .expect("object")
        .add_constraint(ConstraintParams::Fixed)
        .expect("constraint");
    scene.update(0.0);
    let joint = scene
        .physics
        .constraint(constraint)
        .and_then(|constraint| constraint.joint())
        .expect("joint");

    assert!(scene
        .physics
        .constraint_mut(constraint)
        .expect("constraint")
        .set_enabled(false));
    let world = scene.physics.backend().expect("world");
    assert!(world.joint(joint).is_some());
    assert!(!world.is_joint_in_world(joint));

    assert!(scene
        .physics
        .constraint_mut(constraint)
        .expect("constraint")
        .set_enabled(true));
    assert!(scene
        .physics
        .backend()
        .expect("world")
        .is_joint_in_world(joint));
}

#[test]
fn disabled_body_takes_its_joints_out_of_the_world() {
    let mut scene = Scene::new();
    let (_, key) = add_sphere(&mut scene, "a", Vec3::ZERO);
    let constraint = scene
        .physics_object_mut(key)
        .expect("object")
        .add_constraint(ConstraintParams::Fixed)
        .expect("constraint");
    scene.update(0.0);
    let joint = scene
        .physics
        .constraint(constraint)
        .and_then(|constraint| constraint.joint())
        .expect("joint");

    scene.physics_object_mut(key).expect("object").set_enabled(false);
    assert!(!scene.physics.backend().expect("world").is_joint_in_world(joint));
    scene.physics_object_mut(key).expect("object").set_enabled(true);
    assert!(scene.physics.backend().expect("world").is_joint_in_world(joint));
}

#[test]
fn objects_only_remove_their_own_constraints() {
    let mut scene = Scene::new();
    let (_, a) = add_sphere(&mut scene, "a", Vec3::ZERO);
    let (_, b) = add_sphere(&mut scene, "b", Vec3::X);
    let owned_by_a = scene
        .physics_object_mut(a)
        .expect("object")
        .add_constraint(ConstraintParams::Fixed)
        .expect("constraint");
    scene
        .physics_object_mut(b)
        .expect("object")
        .add_constraint(ConstraintParams::Fixed)
        .expect("constraint");

    assert!(!scene
        .physics_object_mut(b)
        .expect("object")
        .remove_constraint(owned_by_a));
    assert_eq!(scene.physics.constraint_count(), 2);
    assert_eq!(
        scene
            .physics_object_mut(b)
            .expect("object")
            .remove_all_constraints(),
        1
    );
    assert_eq!(scene.physics.constraint_count(), 1);
    assert!(scene.physics.constraint(owned_by_a).is_some());
}

#[test]
fn param_edits_rebuild_only_on_change() {
    let mut scene = Scene::new();
    let (_, key) = add_sphere(&mut scene, "a", Vec3::ZERO);
    let constraint = scene
        .physics_object_mut(key)
        .expect("object")
        .add_constraint(ConstraintParams::Spring(SpringParams::default()))
        .expect("constraint");
    scene.update(0.0);

    let mut editing = scene.physics.constraint_mut(constraint).expect("constraint");
    assert!(!editing.set_params(ConstraintParams::Spring(SpringParams::default())));
    assert!(editing.update_params(|params| {
        if let ConstraintParams::Spring(spring) = params {
            spring.stiffness.x = 40.0;
        }
    }));
    let handle = scene
        .physics
        .constraint(constraint)
        .and_then(|constraint| constraint.joint())
        .expect("joint");
    let joint = scene.physics.backend().and_then(|world| world.joint(handle)).expect("joint");
    assert_eq!(joint.axes[0].stiffness, 40.0);
    assert!(joint.axes[0].spring_enabled);
}

fn live_joint(scene: &Scene, constraint: ConstraintKey) -> Joint {
    let handle = live_joint_handle(scene, constraint);
    scene
        .physics
        .backend()
        .and_then(|world| world.joint(handle))
        .cloned()
        .expect("joint")
}

#[test]
fn default_six_dof_spring_leaves_every_axis_free() {
    let mut scene = Scene::new();
    let (_, key) = add_sphere(&mut scene, "a", Vec3::ZERO);
    let constraint = scene
        .physics_object_mut(key)
        .expect("object")
        .add_constraint(ConstraintParams::Dof6Spring(Dof6SpringParams::default()))
        .expect("constraint");
    scene.update(0.0);

    let joint = live_joint(&scene, constraint);
    assert!(joint.axes.iter().all(|axis| axis.is_free()));
}

#[test]
fn repeated_limit_edits_keep_the_last_values() {
    let mut scene = Scene::new();
    let (_, key) = add_sphere(&mut scene, "a", Vec3::ZERO);
    let constraint = scene
        .physics_object_mut(key)
        .expect("object")
        .add_constraint(ConstraintParams::Dof6Spring(Dof6SpringParams {
            linear_lower_limit: Vec3::splat(-1.0),
            ..Default::default()
        }))
        .expect("constraint");
    scene.update(0.0);

    for upper in [1.0, 2.0, 3.0] {
        assert!(scene
            .physics
            .constraint_mut(constraint)
            .expect("constraint")
            .update_params(|params| {
                if let ConstraintParams::Dof6Spring(dof) = params {
                    dof.linear_upper_limit = Vec3::splat(upper);
                    dof.angular_upper_limit = Vec3::splat(upper * 0.1);
                }
            }));
    }

    let joint = live_joint(&scene, constraint);
    for axis in &joint.axes[..3] {
        assert_eq!(axis.lower, -1.0);
        assert_eq!(axis.upper, 3.0);
    }
    for axis in &joint.axes[3..] {
        assert_eq!(axis.lower, 1.0);
        assert!((axis.upper - 0.3).abs() < 1e-6);
    }
    assert!(scene
        .physics
        .backend()
        .expect("world")
        .is_joint_in_world(live_joint_handle(&scene, constraint)));
}

fn live_joint_handle(scene: &Scene, constraint: ConstraintKey) -> JointHandle {
    scene
        .physics
        .constraint(constraint)
        .and_then(|constraint| constraint.joint())
        .expect("joint")
}
