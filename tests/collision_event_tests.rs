use std::cell::RefCell;
use std::rc::Rc;

use scene_physics_bridge::{
    Collider, ContactChannel, ContactEvent, ContactPhase, ObjectId, ObjectKey, Scene, Vec3,
    WorldSettings,
};

const DT: f32 = 1.0 / 60.0;

fn add_body(scene: &mut Scene, collider: Collider, position: Vec3) -> (ObjectId, ObjectKey) {
    let owner = scene.graph.create_object("body");
    scene.graph.set_local_position(owner, position);
    let key = scene.add_rigid_body(owner, collider).expect("physics object");
    (owner, key)
}

fn ground(scene: &mut Scene) -> ObjectKey {
    let (_, key) = add_body(
        scene,
        Collider::Box {
            size: Vec3::new(5.0, 0.5, 5.0),
        },
        Vec3::ZERO,
    );
    scene
        .physics_object_mut(key)
        .expect("ground")
        .set_is_kinematic(true);
    key
}

fn resting_box(scene: &mut Scene) -> (ObjectId, ObjectKey) {
    let (owner, key) = add_body(
        scene,
        Collider::Box {
            size: Vec3::splat(0.5),
        },
        Vec3::new(0.0, 0.98, 0.0),
    );
    scene
        .physics_object_mut(key)
        .expect("box")
        .set_restitution(0.0);
    (owner, key)
}

fn phases_for(events: &[ContactEvent], object: ObjectKey) -> Vec<ContactPhase> {
    events
        .iter()
        .filter(|event| event.object == object)
        .map(|event| event.phase)
        .collect()
}

#[test]
fn first_contact_starts_and_stays_in_the_same_frame() {
    let mut scene = Scene::new();
    let floor = ground(&mut scene);
    let (_, cube) = resting_box(&mut scene);

    scene.update(DT);
    let events = scene.physics.drain_events();
    assert_eq!(
        phases_for(&events, cube),
        vec![ContactPhase::Start, ContactPhase::Stay]
    );
    assert_eq!(
        phases_for(&events, floor),
        vec![ContactPhase::Start, ContactPhase::Stay]
    );
    assert!(events
        .iter()
        .all(|event| event.channel == ContactChannel::Collision));
    let from_cube = events
        .iter()
        .find(|event| event.object == cube)
        .expect("event");
    assert_eq!(from_cube.other, floor);
}

#[test]
fn ongoing_contact_reports_one_stay_per_frame() {
    let mut scene = Scene::new();
    ground(&mut scene);
    let (_, cube) = resting_box(&mut scene);
    scene.update(DT);
    scene.physics.drain_events();

    for _ in 0..10 {
        scene.update(DT);
        let events = scene.physics.drain_events();
        assert_eq!(phases_for(&events, cube), vec![ContactPhase::Stay]);
    }
}

#[test]
fn separation_stops_the_pair_once() {
    let mut scene = Scene::new();
    let floor = ground(&mut scene);
    let (owner, cube) = resting_box(&mut scene);
    scene.update(DT);
    scene.physics.drain_events();

    scene.graph.set_world_position(owner, Vec3::new(0.0, 50.0, 0.0));
    scene.update(DT);
    let events = scene.physics.drain_events();
    assert_eq!(phases_for(&events, cube), vec![ContactPhase::Stop]);
    assert_eq!(phases_for(&events, floor), vec![ContactPhase::Stop]);

    scene.update(DT);
    assert!(scene.physics.drain_events().is_empty());
}

#[test]
fn triggers_only_notify_themselves() {
    let mut scene = Scene::with_settings(WorldSettings {
        gravity: Vec3::ZERO,
        ..Default::default()
    });
    let (_, zone) = add_body(
        &mut scene,
        Collider::Box {
            size: Vec3::splat(2.0),
        },
        Vec3::ZERO,
    );
    {
        let mut zone_object = scene.physics_object_mut(zone).expect("zone");
        zone_object.set_is_kinematic(true);
        zone_object.set_is_trigger(true);
    }
    let start = Vec3::new(0.3, 0.2, 0.1);
    let (owner, ball) = add_body(&mut scene, Collider::Sphere { radius: 0.5 }, start);

    scene.update(DT);
    let events = scene.physics.drain_events();
    assert!(!events.is_empty());
    assert!(events.iter().all(|event| event.object == zone
        && event.other == ball
        && event.channel == ContactChannel::Trigger));
    assert!(phases_for(&events, ball).is_empty());

    // no contact response: the ball is not pushed out of the zone
    scene.update(DT);
    let position = scene.graph.world_position(owner).expect("ball");
    assert!(position.distance(start) < 1e-3);
}

#[test]
fn trigger_pairs_are_ignored() {
    let mut scene = Scene::with_settings(WorldSettings {
        gravity: Vec3::ZERO,
        ..Default::default()
    });
    for offset in [Vec3::ZERO, Vec3::new(0.5, 0.0, 0.0)] {
        let (_, key) = add_body(&mut scene, Collider::Sphere { radius: 0.5 }, offset);
        scene
            .physics_object_mut(key)
            .expect("trigger")
            .set_is_trigger(true);
    }
    for _ in 0..3 {
        scene.update(DT);
    }
    assert!(scene.physics.drain_events().is_empty());
}

#[test]
fn listeners_see_every_queued_event() {
    let mut scene = Scene::new();
    ground(&mut scene);
    resting_box(&mut scene);
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    scene
        .physics
        .add_contact_listener(Box::new(move |event: &ContactEvent| {
            sink.borrow_mut().push(*event)
        }));

    scene.update(DT);
    scene.update(DT);
    let drained = scene.physics.drain_events();
    assert_eq!(*seen.borrow(), drained);
    assert!(!drained.is_empty());
}

#[test]
fn removed_objects_drop_their_pairs_silently() {
    let mut scene = Scene::new();
    let floor = ground(&mut scene);
    let (owner, _) = resting_box(&mut scene);
    scene.update(DT);
    scene.physics.drain_events();

    assert!(scene.destroy_object(owner));
    scene.update(DT);
    let events = scene.physics.drain_events();
    assert!(phases_for(&events, floor).is_empty());
}

#[test]
fn nothing_is_reported_while_paused() {
    let mut scene = Scene::new();
    ground(&mut scene);
    resting_box(&mut scene);
    scene.physics.set_playing(false);
    for _ in 0..5 {
        assert_eq!(scene.update(DT), 0);
    }
    assert!(scene.physics.drain_events().is_empty());
}
