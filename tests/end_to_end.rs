use approx::assert_relative_eq;
use scene_physics_bridge::{
    Collider, ContactChannel, ContactPhase, ObjectId, ObjectKey, Scene, Vec3, WorldSettings,
};

const DT: f32 = 1.0 / 60.0;

fn ground(scene: &mut Scene) -> ObjectKey {
    let owner = scene.graph.create_object("ground");
    let key = scene
        .add_rigid_body(owner, Collider::Box {
            size: Vec3::new(10.0, 0.5, 10.0),
        })
        .expect("ground");
    scene
        .physics_object_mut(key)
        .expect("ground")
        .set_is_kinematic(true);
    key
}

fn sphere(scene: &mut Scene, parent: Option<ObjectId>, position: Vec3) -> (ObjectId, ObjectKey) {
    let owner = scene.graph.create_object("sphere");
    if let Some(parent) = parent {
        assert!(scene.graph.set_parent(owner, parent));
    }
    scene.graph.set_local_position(owner, position);
    let key = scene
        .add_rigid_body(owner, Collider::Sphere { radius: 0.5 })
        .expect("sphere");
    scene
        .physics_object_mut(key)
        .expect("sphere")
        .set_restitution(0.0);
    (owner, key)
}

#[test]
fn one_frame_runs_the_configured_sub_steps() {
    let mut scene = Scene::new();
    ground(&mut scene);
    assert_eq!(scene.update(DT), 4);
    assert_eq!(scene.update(0.0), 0);
}

#[test]
fn free_fall_follows_gravity_before_contact() {
    let gravity = -9.81;
    let mut scene = Scene::with_settings(WorldSettings {
        fixed_time_step: DT,
        max_sub_steps: 1,
        gravity: Vec3::new(0.0, gravity, 0.0),
        ..Default::default()
    });
    let (owner, ball) = sphere(&mut scene, None, Vec3::new(0.0, 10.0, 0.0));
    {
        let mut object = scene.physics_object_mut(ball).expect("sphere");
        object.set_mass(1.0);
        object.set_restitution(0.5);
    }

    let mut steps = 0;
    for _ in 0..60 {
        steps += scene.update(DT);
    }
    assert_eq!(steps, 60);

    let elapsed = steps as f32 * DT;
    let velocity = scene.physics.linear_velocity(ball).expect("velocity");
    assert_relative_eq!(velocity.y, gravity * elapsed, epsilon = 1e-2);
    assert_relative_eq!(velocity.x, 0.0, epsilon = 1e-5);

    let position = scene.graph.world_position(owner).expect("sphere");
    assert!(position.y < 10.0);
    assert!(position.y > 10.0 + gravity * elapsed * elapsed);
}

#[test]
fn falling_sphere_settles_on_the_ground() {
    let mut scene = Scene::new();
    let floor = ground(&mut scene);
    let (owner, ball) = sphere(&mut scene, None, Vec3::new(0.0, 3.0, 0.0));

    let mut events = Vec::new();
    for _ in 0..180 {
        scene.update(DT);
        events.extend(scene.physics.drain_events());
    }

    let position = scene.graph.world_position(owner).expect("sphere");
    assert_relative_eq!(position.y, 1.0, epsilon = 0.1);
    assert_relative_eq!(position.x, 0.0, epsilon = 1e-3);
    assert!(scene.physics.linear_velocity(ball).expect("velocity").length() < 0.2);

    let starts: Vec<_> = events
        .iter()
        .filter(|event| event.object == ball && event.phase == ContactPhase::Start)
        .collect();
    assert!(!starts.is_empty());
    assert_eq!(starts[0].other, floor);
    assert_eq!(starts[0].channel, ContactChannel::Collision);
}

#[test]
fn simulated_child_keeps_its_parent_space() {
    let mut scene = Scene::new();
    ground(&mut scene);
    let rig = scene.graph.create_object("rig");
    scene.graph.set_local_position(rig, Vec3::new(2.0, 0.5, 0.0));
    let (owner, _) = sphere(&mut scene, Some(rig), Vec3::new(0.0, 2.5, 0.0));

    for _ in 0..180 {
        scene.update(DT);
    }

    assert_eq!(scene.graph.parent(owner), Some(rig));
    let local = scene.graph.transform(owner).expect("sphere").local_position();
    assert_relative_eq!(local.x, 0.0, epsilon = 1e-3);
    assert_relative_eq!(local.y, 0.5, epsilon = 0.1);
    let world = scene.graph.world_position(owner).expect("sphere");
    assert_relative_eq!(world.x, 2.0, epsilon = 1e-3);
    assert_relative_eq!(world.y, 1.0, epsilon = 0.1);
}
