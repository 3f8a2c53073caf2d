use approx::assert_relative_eq;
use scene_physics_bridge::physics::{ConstraintParams, HingeParams};
use scene_physics_bridge::{
    Collider, ObjectId, ObjectKey, Scene, SceneDocument, Vec3, WorldSettings,
};
use uuid::Uuid;

struct Rig {
    scene: Scene,
    base: ObjectId,
    arm: ObjectId,
}

/// A kinematic base with a child arm hinged to it.
fn hinged_rig() -> Rig {
    let mut scene = Scene::with_settings(WorldSettings {
        solver_iterations: 20,
        deformable: true,
        ..Default::default()
    });
    let base = scene.graph.create_object("base");
    scene.graph.set_local_position(base, Vec3::new(1.0, 0.0, 0.0));
    let arm = scene.graph.create_object("arm");
    scene.graph.set_local_position(arm, Vec3::new(0.0, 2.0, 0.0));
    assert!(scene.graph.set_parent(arm, base));

    let base_key = scene
        .add_rigid_body(base, Collider::Box {
            size: Vec3::splat(0.5),
        })
        .expect("base");
    scene
        .physics_object_mut(base_key)
        .expect("base")
        .set_is_kinematic(true);
    let arm_key = scene
        .add_rigid_body(arm, Collider::Sphere { radius: 0.5 })
        .expect("arm");
    let constraint = {
        let mut object = scene.physics_object_mut(arm_key).expect("arm");
        object.set_mass(3.0);
        object.set_friction(0.2);
        object
            .add_constraint(ConstraintParams::Hinge(HingeParams {
                lower_limit: -0.5,
                ..Default::default()
            }))
            .expect("constraint")
    };
    scene
        .physics
        .constraint_mut(constraint)
        .expect("constraint")
        .set_other(Some(base_key));
    Rig { scene, base, arm }
}

fn physics_key(scene: &Scene, uuid: Uuid) -> ObjectKey {
    let owner = scene.graph.find_by_uuid(&uuid).expect("object");
    scene.physics_object_of(owner).expect("physics object")
}

#[test]
fn json_round_trip_restores_hierarchy_and_physics() {
    let rig = hinged_rig();
    let base_uuid = rig.scene.graph.get(rig.base).expect("base").uuid();
    let arm_uuid = rig.scene.graph.get(rig.arm).expect("arm").uuid();

    let json = serde_json::to_string(&SceneDocument::capture(&rig.scene)).expect("serialize");
    let document: SceneDocument = serde_json::from_str(&json).expect("deserialize");
    let mut scene = document.load().expect("load");

    let arm = scene.graph.find_by_uuid(&arm_uuid).expect("arm");
    let base = scene.graph.find_by_uuid(&base_uuid).expect("base");
    assert_eq!(scene.graph.parent(arm), Some(base));
    assert_eq!(scene.graph.get(arm).expect("arm").name, "arm");
    assert_relative_eq!(
        scene.graph.transform(arm).expect("arm").local_position(),
        Vec3::new(0.0, 2.0, 0.0)
    );
    assert_relative_eq!(
        scene.graph.world_position(arm).expect("arm"),
        Vec3::new(1.0, 2.0, 0.0),
        epsilon = 1e-5
    );
    assert_eq!(scene.physics.settings().solver_iterations, 20);
    assert!(scene.physics.settings().deformable);

    let arm_key = physics_key(&scene, arm_uuid);
    let base_key = physics_key(&scene, base_uuid);
    let arm_object = scene.physics.object(arm_key).expect("arm");
    assert_relative_eq!(arm_object.mass(), 3.0);
    assert_relative_eq!(arm_object.friction(), 0.2);
    assert_eq!(arm_object.collider(), &Collider::Sphere { radius: 0.5 });
    assert!(scene.physics.object(base_key).expect("base").is_kinematic());

    let constraint_key = arm_object.constraints()[0];
    let constraint = scene.physics.constraint(constraint_key).expect("constraint");
    assert_eq!(constraint.other(), Some(base_key));
    assert_eq!(
        constraint.params(),
        &ConstraintParams::Hinge(HingeParams {
            lower_limit: -0.5,
            ..Default::default()
        })
    );

    scene.update(0.0);
    assert!(scene
        .physics
        .constraint(constraint_key)
        .and_then(|constraint| constraint.joint())
        .is_some());
}

#[test]
fn documents_use_the_persisted_key_names() {
    let rig = hinged_rig();
    let base_uuid = rig.scene.graph.get(rig.base).expect("base").uuid();
    let value = serde_json::to_value(SceneDocument::capture(&rig.scene)).expect("serialize");

    assert_eq!(value["physicsWorld"]["numIter"], 20);
    assert_eq!(value["physicsWorld"]["deform"], true);
    let arm = value["objects"]
        .as_array()
        .expect("objects")
        .iter()
        .find(|object| object["name"] == "arm")
        .expect("arm");
    assert_eq!(arm["parent"], base_uuid.to_string());
    assert_eq!(arm["physics"]["collider"]["type"], "sphere");
    let constraint = &arm["physics"]["consts"][0];
    assert_eq!(constraint[0], 1);
    assert_eq!(constraint[1]["other"], base_uuid.to_string());
    assert_eq!(constraint[1]["low"], -0.5);
}

#[test]
fn unknown_constraint_target_anchors_to_the_world() {
    let rig = hinged_rig();
    let arm_uuid = rig.scene.graph.get(rig.arm).expect("arm").uuid();
    let mut document = SceneDocument::capture(&rig.scene);
    for object in &mut document.objects {
        if let Some(physics) = object.physics.as_mut() {
            for constraint in &mut physics.consts {
                constraint.settings.other = Some(Uuid::new_v4());
            }
        }
    }

    let mut scene = document.load().expect("load");
    let arm_key = physics_key(&scene, arm_uuid);
    let constraint_key = scene.physics.object(arm_key).expect("arm").constraints()[0];
    assert_eq!(
        scene.physics.constraint(constraint_key).expect("constraint").other(),
        None
    );

    scene.update(0.0);
    let handle = scene
        .physics
        .constraint(constraint_key)
        .and_then(|constraint| constraint.joint())
        .expect("joint");
    let joint = scene
        .physics
        .backend()
        .and_then(|world| world.joint(handle))
        .expect("joint");
    assert_eq!(joint.body_b, None);
}

#[test]
fn missing_world_keys_fall_back_to_defaults() {
    let settings: WorldSettings =
        serde_json::from_str(r#"{"deform": true, "numIter": 4}"#).expect("settings");
    let defaults = WorldSettings::default();
    assert!(settings.deformable);
    assert_eq!(settings.solver_iterations, 4);
    assert_eq!(settings.fixed_time_step, defaults.fixed_time_step);
    assert_eq!(settings.max_sub_steps, defaults.max_sub_steps);
    assert_eq!(settings.gravity, defaults.gravity);
}

#[test]
fn sparse_documents_load() {
    let uuid = Uuid::new_v4();
    let json = format!(
        r#"{{"objects": [{{"uuid": "{uuid}", "physics": {{"mass": 2.0, "collider": {{"type": "sphere", "radius": 0.25}}}}}}]}}"#
    );
    let document: SceneDocument = serde_json::from_str(&json).expect("document");
    let scene = document.load().expect("load");
    let key = physics_key(&scene, uuid);
    let object = scene.physics.object(key).expect("object");
    assert_relative_eq!(object.mass(), 2.0);
    assert_eq!(object.collider(), &Collider::Sphere { radius: 0.25 });
    assert!(object.constraints().is_empty());
}
