//! Physics world manager.
//!
//! Owns the backend, every physics object and constraint, and the collision pair table. Each
//! frame it pushes scene transforms into the bodies, steps the simulation, turns raw contact
//! reports into start/stay/stop events and pulls the simulated poses back into the scene.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use glam::Vec3;
use log::debug;
use parking_lot::Mutex;

use crate::backend::basic::BasicWorld;
use crate::backend::{
    BodyHandle, CollisionFilter, ContactPoint, DebugDraw, PhysicsBackend, RayHit,
};
use crate::config::{WorldSettings, FRAME_BUDGET_MS};
use crate::physics::collider::Collider;
use crate::physics::constraint::Constraint;
use crate::physics::events::{
    CollisionTable, ContactChannel, ContactEvent, ContactPhase, PairTouch,
};
use crate::physics::object::{ObjectKey, PhysicsObject};
use crate::physics::rigidbody::PhysicsObjectMut;
use crate::scene::{ObjectId, SceneGraph};
use crate::utils::allocator::Arena;
use crate::utils::logging::{warn_if_frame_budget_exceeded, ScopedTimer};

/// Builds the backend for the given settings.
pub type BackendFactory = Box<dyn Fn(&WorldSettings) -> Box<dyn PhysicsBackend>>;

pub type ContactListener = Box<dyn FnMut(&ContactEvent)>;

/// Colored line produced by the backend's debug drawing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DebugLine {
    pub from: Vec3,
    pub to: Vec3,
    pub color: Vec3,
}

struct LineCollector<'a> {
    lines: &'a mut Vec<DebugLine>,
}

impl DebugDraw for LineCollector<'_> {
    fn draw_line(&mut self, from: Vec3, to: Vec3, color: Vec3) {
        self.lines.push(DebugLine { from, to, color });
    }
}

/// Closest-hit or all-hits ray query result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RaycastHit {
    pub object: ObjectKey,
    pub owner: ObjectId,
    pub point: Vec3,
    pub normal: Vec3,
    /// Fraction of the segment length.
    pub fraction: f32,
}

/// Contact query result, expressed for the queried object as `a`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactResult {
    pub object_a: ObjectKey,
    pub owner_a: ObjectId,
    pub object_b: ObjectKey,
    pub owner_b: ObjectId,
    pub local_point_a: Vec3,
    pub local_point_b: Vec3,
    pub world_point_a: Vec3,
    pub world_point_b: Vec3,
    pub normal_on_b: Vec3,
    /// Negative while penetrating.
    pub distance: f32,
}

pub struct PhysicsManager {
    pub(crate) settings: WorldSettings,
    pub(crate) world: Option<Box<dyn PhysicsBackend>>,
    factory: BackendFactory,
    pub(crate) objects: Arena<PhysicsObject>,
    /// Objects in registration order; transforms are pulled in this order.
    pub(crate) registration: Vec<ObjectKey>,
    by_owner: HashMap<ObjectId, ObjectKey>,
    pub(crate) constraints: Arena<Constraint>,
    pub(crate) collisions: CollisionTable,
    events: VecDeque<ContactEvent>,
    listeners: Vec<ContactListener>,
    playing: bool,
    debug_lines: Arc<Mutex<Vec<DebugLine>>>,
}

impl fmt::Debug for PhysicsManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhysicsManager")
            .field("settings", &self.settings)
            .field("backend", &self.world.as_ref().map(|world| world.name()))
            .field("objects", &self.objects.len())
            .field("constraints", &self.constraints.len())
            .field("pairs", &self.collisions.len())
            .field("playing", &self.playing)
            .finish()
    }
}

impl Default for PhysicsManager {
    fn default() -> Self {
        Self::new(WorldSettings::default())
    }
}

impl PhysicsManager {
    /// Uses the in-crate [`BasicWorld`] backend.
    pub fn new(settings: WorldSettings) -> Self {
        Self::with_factory(
            settings,
            Box::new(|settings: &WorldSettings| {
                Box::new(BasicWorld::new(settings.deformable)) as Box<dyn PhysicsBackend>
            }),
        )
    }

    pub fn with_factory(settings: WorldSettings, factory: BackendFactory) -> Self {
        Self {
            settings,
            world: None,
            factory,
            objects: Arena::new(),
            registration: Vec::new(),
            by_owner: HashMap::new(),
            constraints: Arena::new(),
            collisions: CollisionTable::new(),
            events: VecDeque::new(),
            listeners: Vec::new(),
            playing: true,
            debug_lines: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn settings(&self) -> &WorldSettings {
        &self.settings
    }

    pub fn backend(&self) -> Option<&dyn PhysicsBackend> {
        self.world.as_deref()
    }

    pub fn is_initialized(&self) -> bool {
        self.world.is_some()
    }

    pub fn set_gravity(&mut self, gravity: Vec3) {
        self.settings.gravity = gravity;
        if let Some(world) = self.world.as_deref_mut() {
            world.set_gravity(gravity);
        }
    }

    /// Takes effect on the next initialization.
    pub fn set_deformable(&mut self, deformable: bool) {
        self.settings.deformable = deformable;
    }

    pub fn set_num_iterations(&mut self, iterations: u32) {
        self.settings.solver_iterations = iterations;
        if let Some(world) = self.world.as_deref_mut() {
            world.set_solver_iterations(iterations);
        }
    }

    pub fn set_fixed_time_step(&mut self, step: f32) {
        self.settings.fixed_time_step = step;
    }

    pub fn set_max_sub_steps(&mut self, steps: u32) {
        self.settings.max_sub_steps = steps;
    }

    pub fn set_time_ratio(&mut self, ratio: f32) {
        self.settings.time_ratio = ratio;
    }

    pub fn set_show_debug(&mut self, show: bool) {
        self.settings.show_debug = show;
        if !show {
            self.debug_lines.lock().clear();
        }
    }

    /// Replaces the settings; gravity and iterations apply immediately.
    pub fn apply_settings(&mut self, settings: WorldSettings) {
        let (gravity, iterations, show) = (
            settings.gravity,
            settings.solver_iterations,
            settings.show_debug,
        );
        self.settings = settings;
        self.set_gravity(gravity);
        self.set_num_iterations(iterations);
        self.set_show_debug(show);
    }

    /// While not playing (editor mode) transforms are still pushed but nothing is stepped.
    pub fn set_playing(&mut self, playing: bool) {
        self.playing = playing;
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Line buffer refreshed every update while debug drawing is on.
    pub fn debug_lines(&self) -> Arc<Mutex<Vec<DebugLine>>> {
        Arc::clone(&self.debug_lines)
    }

    pub fn add_contact_listener(&mut self, listener: ContactListener) {
        self.listeners.push(listener);
    }

    /// Removes and returns every event queued since the last call.
    pub fn drain_events(&mut self) -> Vec<ContactEvent> {
        self.events.drain(..).collect()
    }

    pub fn object_of(&self, owner: ObjectId) -> Option<ObjectKey> {
        self.by_owner.get(&owner).copied()
    }

    /// Registered objects in registration order.
    pub fn object_keys(&self) -> &[ObjectKey] {
        &self.registration
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn object_mut<'a>(
        &'a mut self,
        graph: &'a mut SceneGraph,
        key: ObjectKey,
    ) -> Option<PhysicsObjectMut<'a>> {
        if !self.objects.contains(key) {
            return None;
        }
        Some(PhysicsObjectMut::new(self, graph, key))
    }

    pub fn add_rigid_body(
        &mut self,
        graph: &mut SceneGraph,
        owner: ObjectId,
        collider: Collider,
    ) -> Option<ObjectKey> {
        self.insert_object(graph, PhysicsObject::new(owner, collider))
    }

    pub fn add_soft_body(
        &mut self,
        graph: &mut SceneGraph,
        owner: ObjectId,
        mesh_index: usize,
    ) -> Option<ObjectKey> {
        self.insert_object(graph, PhysicsObject::soft(owner, mesh_index))
    }

    /// Registers an object; its body is built right away when the world is live.
    /// A scene object carries at most one physics object.
    pub fn insert_object(
        &mut self,
        graph: &mut SceneGraph,
        object: PhysicsObject,
    ) -> Option<ObjectKey> {
        let owner = object.owner;
        if !graph.contains(owner) || self.by_owner.contains_key(&owner) {
            return None;
        }
        let key = self.objects.insert(object);
        self.registration.push(key);
        self.by_owner.insert(owner, key);
        if self.world.is_some() {
            self.create_body(graph, key);
        }
        Some(key)
    }

    /// Unregisters an object. Its own constraints are removed; constraints of other objects
    /// that pointed at it fall back to the world anchor.
    pub fn remove_object(&mut self, key: ObjectKey) -> bool {
        if !self.objects.contains(key) {
            return false;
        }
        self.deactivate_body(key);
        self.collisions.remove_object(key);

        let owned = self
            .objects
            .get(key)
            .map(|object| object.constraints.clone())
            .unwrap_or_default();
        for constraint in owned {
            self.remove_constraint(constraint);
        }
        let referencing: Vec<_> = self
            .constraints
            .iter()
            .filter(|(_, constraint)| constraint.other == Some(key))
            .map(|(constraint_key, _)| constraint_key)
            .collect();
        for constraint_key in &referencing {
            self.destroy_joint(*constraint_key);
            if let Some(constraint) = self.constraints.get_mut(*constraint_key) {
                constraint.other = None;
                constraint.settings.other = None;
            }
        }

        self.destroy_body(key);
        for constraint_key in referencing {
            self.create_joint(constraint_key);
        }

        self.registration.retain(|registered| *registered != key);
        if let Some(object) = self.objects.remove(key) {
            self.by_owner.remove(&object.owner);
        }
        true
    }

    /// Builds a fresh backend and recreates every registered body and joint.
    pub fn initialize(&mut self, graph: &mut SceneGraph) {
        self.clear();
        let mut world = (self.factory)(&self.settings);
        world.set_gravity(self.settings.gravity);
        world.set_solver_iterations(self.settings.solver_iterations);
        debug!(
            "initialized physics world '{}' with {} objects",
            world.name(),
            self.registration.len()
        );
        self.world = Some(world);

        for key in self.registration.clone() {
            if let Some(object) = self.objects.get_mut(key) {
                object.dirty = true;
            }
            self.create_body(graph, key);
        }
        let constraints: Vec<_> = self.constraints.handles();
        for key in constraints {
            self.create_joint(key);
        }
    }

    /// Drops the backend with every body and joint. Registered objects keep their state and
    /// are rebuilt by the next initialization.
    pub fn clear(&mut self) {
        let constraints: Vec<_> = self.constraints.handles();
        for key in constraints {
            self.destroy_joint(key);
        }
        for key in self.registration.clone() {
            self.destroy_body(key);
        }
        self.collisions.clear();
        if let Some(mut world) = self.world.take() {
            world.clear();
            debug!("cleared physics world '{}'", world.name());
        }
        self.debug_lines.lock().clear();
    }

    /// Per-frame entry point. Returns the number of sub-steps taken.
    pub fn on_physic_update(&mut self, graph: &mut SceneGraph, dt: f32) -> u32 {
        let timer = ScopedTimer::new("physics update");
        if self.world.is_none() {
            self.initialize(graph);
        }
        if self.has_pending_links() {
            self.link_constraints(graph);
        }

        self.collisions.reset();
        for key in self.registration.clone() {
            self.push_transform(graph, key);
        }

        let mut steps = 0;
        if self.playing {
            let mut touched = Vec::new();
            if let Some(world) = self.world.as_deref_mut() {
                let settings = &self.settings;
                steps = world.step_simulation(
                    dt * settings.time_ratio,
                    settings.max_sub_steps,
                    settings.fixed_time_step,
                    &mut |contact: &ContactPoint| {
                        touched.push((contact.user_data_a, contact.user_data_b))
                    },
                );
            }
            if steps > 0 {
                self.reconcile_contacts(&touched);
                for key in self.registration.clone() {
                    self.pull_transform(graph, key);
                }
            }
        }

        if self.settings.show_debug {
            self.draw_debug();
        }
        if self.settings.deformable && steps > 0 {
            if let Some(world) = self.world.as_deref_mut() {
                world.garbage_collect();
            }
        }
        warn_if_frame_budget_exceeded(timer.elapsed(), FRAME_BUDGET_MS);
        steps
    }

    /// Turns the pairs reported during a step into start/stay events, then ends every pair
    /// that was not reported.
    fn reconcile_contacts(&mut self, touched: &[(u64, u64)]) {
        let _timer = ScopedTimer::new("contact reconciliation");
        for &(a, b) in touched {
            let (a, b) = (ObjectKey::from_bits(a), ObjectKey::from_bits(b));
            let (Some(object_a), Some(object_b)) = (self.objects.get(a), self.objects.get(b))
            else {
                continue;
            };
            if object_a.trigger && object_b.trigger {
                continue;
            }
            match self.collisions.touch(a, b) {
                PairTouch::New => {
                    self.emit_pair(a, b, ContactPhase::Start);
                    self.emit_pair(a, b, ContactPhase::Stay);
                }
                PairTouch::Refreshed => self.emit_pair(a, b, ContactPhase::Stay),
                PairTouch::Repeated => {}
            }
        }
        for (a, b) in self.collisions.take_stale() {
            self.emit_pair(a, b, ContactPhase::Stop);
        }
    }

    /// Solid pairs notify both sides on the collision channel; a trigger pair only notifies
    /// the trigger on the trigger channel.
    fn emit_pair(&mut self, a: ObjectKey, b: ObjectKey, phase: ContactPhase) {
        let (Some(object_a), Some(object_b)) = (self.objects.get(a), self.objects.get(b)) else {
            return;
        };
        let event = |object: ObjectKey, other: ObjectKey, channel, owner, other_owner| {
            ContactEvent {
                phase,
                channel,
                object,
                other,
                owner,
                other_owner,
            }
        };
        let (owner_a, owner_b) = (object_a.owner, object_b.owner);
        let mut pending = Vec::with_capacity(2);
        match (object_a.trigger, object_b.trigger) {
            (false, false) => {
                pending.push(event(a, b, ContactChannel::Collision, owner_a, owner_b));
                pending.push(event(b, a, ContactChannel::Collision, owner_b, owner_a));
            }
            (true, false) => pending.push(event(a, b, ContactChannel::Trigger, owner_a, owner_b)),
            (false, true) => pending.push(event(b, a, ContactChannel::Trigger, owner_b, owner_a)),
            (true, true) => {}
        }
        for event in pending {
            self.dispatch(event);
        }
    }

    fn dispatch(&mut self, event: ContactEvent) {
        for listener in &mut self.listeners {
            listener(&event);
        }
        self.events.push_back(event);
    }

    fn draw_debug(&mut self) {
        let Some(world) = self.world.as_deref() else {
            return;
        };
        let mut lines = self.debug_lines.lock();
        lines.clear();
        world.debug_draw(&mut LineCollector { lines: &mut *lines });
    }

    fn object_for(&self, user_data: u64) -> Option<(ObjectKey, ObjectId)> {
        let key = ObjectKey::from_bits(user_data);
        self.objects.get(key).map(|object| (key, object.owner))
    }

    fn ray_hit(&self, hit: &RayHit) -> Option<RaycastHit> {
        let (object, owner) = self.object_for(hit.user_data)?;
        Some(RaycastHit {
            object,
            owner,
            point: hit.point,
            normal: hit.normal,
            fraction: hit.fraction,
        })
    }

    fn contact_result(&self, contact: &ContactPoint) -> Option<ContactResult> {
        let (object_a, owner_a) = self.object_for(contact.user_data_a)?;
        let (object_b, owner_b) = self.object_for(contact.user_data_b)?;
        Some(ContactResult {
            object_a,
            owner_a,
            object_b,
            owner_b,
            local_point_a: contact.local_point_a,
            local_point_b: contact.local_point_b,
            world_point_a: contact.position_world_on_a,
            world_point_b: contact.position_world_on_b,
            normal_on_b: contact.normal_world_on_b,
            distance: contact.distance,
        })
    }

    fn hits(&self, from: Vec3, to: Vec3, group: i32, mask: i32) -> Vec<RayHit> {
        self.world
            .as_deref()
            .map(|world| world.ray_test(from, to, CollisionFilter::new(group, mask)))
            .unwrap_or_default()
    }

    pub fn ray_test_closest(
        &self,
        from: Vec3,
        to: Vec3,
        group: i32,
        mask: i32,
    ) -> Option<RaycastHit> {
        self.hits(from, to, group, mask)
            .iter()
            .find_map(|hit| self.ray_hit(hit))
    }

    /// Every hit along the segment, nearest first. Empty when nothing is hit.
    pub fn ray_test_all(&self, from: Vec3, to: Vec3, group: i32, mask: i32) -> Vec<RaycastHit> {
        self.hits(from, to, group, mask)
            .iter()
            .filter_map(|hit| self.ray_hit(hit))
            .collect()
    }

    fn body_handle(&self, key: ObjectKey) -> Option<BodyHandle> {
        self.objects.get(key)?.body
    }

    /// Everything currently touching `key`, seen from `key`.
    pub fn contact_test(&self, key: ObjectKey) -> Vec<ContactResult> {
        let (Some(world), Some(body)) = (self.world.as_deref(), self.body_handle(key)) else {
            return Vec::new();
        };
        let mut contacts = Vec::new();
        world.contact_test(body, &mut |contact: &ContactPoint| {
            let contact = if contact.body_a == body {
                *contact
            } else {
                contact.swapped()
            };
            contacts.push(contact);
        });
        contacts
            .iter()
            .filter_map(|contact| self.contact_result(contact))
            .collect()
    }

    pub fn contact_pair_test(&self, a: ObjectKey, b: ObjectKey) -> Vec<ContactResult> {
        let (Some(world), Some(body_a), Some(body_b)) = (
            self.world.as_deref(),
            self.body_handle(a),
            self.body_handle(b),
        ) else {
            return Vec::new();
        };
        let mut contacts = Vec::new();
        world.contact_pair_test(body_a, body_b, &mut |contact: &ContactPoint| {
            let contact = if contact.body_a == body_a {
                *contact
            } else {
                contact.swapped()
            };
            contacts.push(contact);
        });
        contacts
            .iter()
            .filter_map(|contact| self.contact_result(contact))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_apply_to_live_world() {
        let mut graph = SceneGraph::new();
        let mut manager = PhysicsManager::default();
        manager.initialize(&mut graph);
        manager.set_gravity(Vec3::new(0.0, -1.0, 0.0));
        assert_eq!(
            manager.backend().map(|world| world.gravity()),
            Some(Vec3::new(0.0, -1.0, 0.0))
        );
        manager.set_deformable(true);
        assert!(!manager.backend().is_some_and(|world| world.is_deformable()));
        manager.initialize(&mut graph);
        assert!(manager.backend().is_some_and(|world| world.is_deformable()));
    }

    #[test]
    fn one_physics_object_per_scene_object() {
        let mut graph = SceneGraph::new();
        let owner = graph.create_object("box");
        let mut manager = PhysicsManager::default();
        assert!(manager
            .add_rigid_body(&mut graph, owner, Collider::default())
            .is_some());
        assert!(manager
            .add_rigid_body(&mut graph, owner, Collider::default())
            .is_none());
    }

    #[test]
    fn clear_keeps_objects_for_the_next_initialization() {
        let mut graph = SceneGraph::new();
        let owner = graph.create_object("box");
        let mut manager = PhysicsManager::default();
        manager.initialize(&mut graph);
        let key = manager
            .add_rigid_body(&mut graph, owner, Collider::default())
            .expect("object");
        assert!(manager.object(key).is_some_and(|object| object.body().is_some()));

        manager.clear();
        assert!(!manager.is_initialized());
        assert!(manager.object(key).is_some_and(|object| object.body().is_none()));

        manager.on_physic_update(&mut graph, 0.0);
        assert!(manager.is_initialized());
        assert!(manager.object(key).is_some_and(PhysicsObject::is_activated));
    }
}
