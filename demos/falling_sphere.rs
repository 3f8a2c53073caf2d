use scene_physics_bridge::*;

fn main() {
    let mut scene = Scene::new();

    let ground = scene.graph.create_object("ground");
    if let Some(key) = scene.add_rigid_body(ground, Collider::Box {
        size: Vec3::new(10.0, 0.5, 10.0),
    }) {
        if let Some(mut object) = scene.physics_object_mut(key) {
            object.set_is_kinematic(true);
        }
    }

    let ball = scene.graph.create_object("ball");
    scene.graph.set_local_position(ball, Vec3::new(0.0, 4.0, 0.0));
    if let Some(key) = scene.add_rigid_body(ball, Collider::Sphere { radius: 0.5 }) {
        if let Some(mut object) = scene.physics_object_mut(key) {
            object.set_restitution(0.3);
        }
    }

    for frame in 0..120 {
        scene.update(1.0 / 60.0);
        for event in scene.physics.drain_events() {
            if event.phase != ContactPhase::Stay {
                println!("frame {frame}: {:?} on {:?}", event.phase, event.object);
            }
        }
        if frame % 20 == 0 {
            println!(
                "frame {frame}: ball at {:?}",
                scene.graph.world_position(ball)
            );
        }
    }
}
