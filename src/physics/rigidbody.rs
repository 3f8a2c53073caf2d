use std::sync::Arc;

use glam::Vec3;
use log::{debug, warn};

use crate::backend::body::{ActivationState, BodyKind, CollisionObject, RigidBody};
use crate::backend::Pose;
use crate::config::SCALE_REBUILD_THRESHOLD_SQUARED;
use crate::physics::collider::Collider;
use crate::physics::constraint::{ConstraintKey, ConstraintParams};
use crate::physics::manager::PhysicsManager;
use crate::physics::object::{ObjectKey, PhysicsObject};
use crate::scene::SceneGraph;
use crate::utils::math::Aabb;

/// Mutable view of a physics object together with the scene it lives in.
///
/// Setters compare against the cached value and only touch the native body on an effective
/// change. Without a live body they update the cache, which is written when the body is built.
pub struct PhysicsObjectMut<'a> {
    pub(crate) manager: &'a mut PhysicsManager,
    pub(crate) graph: &'a mut SceneGraph,
    pub(crate) key: ObjectKey,
}

impl<'a> PhysicsObjectMut<'a> {
    pub(crate) fn new(
        manager: &'a mut PhysicsManager,
        graph: &'a mut SceneGraph,
        key: ObjectKey,
    ) -> Self {
        Self {
            manager,
            graph,
            key,
        }
    }

    pub fn key(&self) -> ObjectKey {
        self.key
    }

    pub fn object(&self) -> Option<&PhysicsObject> {
        self.manager.objects.get(self.key)
    }

    /// The cached record and its native body, if one is live.
    pub(crate) fn parts(&mut self) -> Option<(&mut PhysicsObject, Option<&mut CollisionObject>)> {
        let manager = &mut *self.manager;
        let object = manager.objects.get_mut(self.key)?;
        let body = match (object.body, manager.world.as_deref_mut()) {
            (Some(handle), Some(world)) => world.body_mut(handle),
            _ => None,
        };
        Some((object, body))
    }

    fn rebuild(&mut self) -> bool {
        let has_body = self.object().is_some_and(|object| object.body.is_some());
        has_body && self.manager.create_body(self.graph, self.key)
    }

    pub fn set_mass(&mut self, mass: f32) -> bool {
        let Some((object, body)) = self.parts() else {
            return false;
        };
        if !object.mass.assign(mass.max(0.0), object.dirty) {
            return false;
        }
        if let Some(body) = body {
            object.write_mass(body);
        }
        true
    }

    pub fn set_friction(&mut self, friction: f32) -> bool {
        let Some((object, body)) = self.parts() else {
            return false;
        };
        if !object.friction.assign(friction, object.dirty) {
            return false;
        }
        if let Some(body) = body {
            body.friction = friction;
        }
        true
    }

    pub fn set_restitution(&mut self, restitution: f32) -> bool {
        let Some((object, body)) = self.parts() else {
            return false;
        };
        if !object.restitution.assign(restitution, object.dirty) {
            return false;
        }
        if let Some(body) = body {
            body.restitution = restitution;
        }
        true
    }

    pub fn set_linear_velocity(&mut self, velocity: Vec3) -> bool {
        let Some((object, body)) = self.parts() else {
            return false;
        };
        if !object.linear_velocity.assign(velocity, object.dirty) {
            return false;
        }
        if let Some(body) = body {
            object.write_velocities(body);
            body.activate(false);
        }
        true
    }

    pub fn set_angular_velocity(&mut self, velocity: Vec3) -> bool {
        let Some((object, body)) = self.parts() else {
            return false;
        };
        if !object.angular_velocity.assign(velocity, object.dirty) {
            return false;
        }
        if let Some(body) = body {
            object.write_velocities(body);
            body.activate(false);
        }
        true
    }

    pub fn set_linear_factor(&mut self, factor: Vec3) -> bool {
        let Some((object, body)) = self.parts() else {
            return false;
        };
        if !object.linear_factor.assign(factor, object.dirty) {
            return false;
        }
        if let Some(body) = body {
            object.write_factors(body);
        }
        true
    }

    pub fn set_angular_factor(&mut self, factor: Vec3) -> bool {
        let Some((object, body)) = self.parts() else {
            return false;
        };
        if !object.angular_factor.assign(factor, object.dirty) {
            return false;
        }
        if let Some(body) = body {
            object.write_factors(body);
        }
        true
    }

    pub fn set_margin(&mut self, margin: f32) -> bool {
        let margin = margin.max(0.0);
        let Some((object, body)) = self.parts() else {
            return false;
        };
        if !object.margin.assign(margin, object.dirty) {
            return false;
        }
        if let Some(shape) = object.shape.as_mut() {
            Arc::make_mut(shape).set_margin(margin);
            if let Some(body) = body {
                if let Some(rigid) = body.as_rigid_mut() {
                    rigid.shape = shape.clone();
                }
                object.write_mass(body);
            }
        }
        true
    }

    pub fn set_sleeping_thresholds(&mut self, linear: f32, angular: f32) -> bool {
        let Some((object, body)) = self.parts() else {
            return false;
        };
        let force = object.dirty;
        let linear_changed = object.linear_sleeping_threshold.assign(linear, force);
        let angular_changed = object.angular_sleeping_threshold.assign(angular, force);
        if !(linear_changed || angular_changed) {
            return false;
        }
        if let Some(body) = body {
            object.write_sleeping_thresholds(body);
        }
        true
    }

    pub fn set_activation_state(&mut self, state: ActivationState) -> bool {
        let Some((object, body)) = self.parts() else {
            return false;
        };
        if !object.activation_state.assign(state, object.dirty) {
            return false;
        }
        if let Some(body) = body {
            body.force_activation_state(state);
        }
        true
    }

    /// Rebuilds the body: kinematic objects get zero mass, their own filter pair and never
    /// sleep; dynamic objects get the defaults back.
    pub fn set_is_kinematic(&mut self, kinematic: bool) -> bool {
        let Some(object) = self.manager.objects.get_mut(self.key) else {
            return false;
        };
        if object.kinematic == kinematic {
            return false;
        }
        object.kinematic = kinematic;
        object.apply_kinematic_policy();
        self.rebuild();
        true
    }

    pub fn set_is_trigger(&mut self, trigger: bool) -> bool {
        let Some((object, body)) = self.parts() else {
            return false;
        };
        if object.trigger == trigger {
            return false;
        }
        object.trigger = trigger;
        if let Some(body) = body {
            object.write_flags(body);
        }
        true
    }

    pub fn set_ccd(&mut self, ccd: bool) -> bool {
        let Some((object, body)) = self.parts() else {
            return false;
        };
        if object.ccd == ccd {
            return false;
        }
        object.ccd = ccd;
        if let Some(body) = body {
            object.write_ccd(body);
        }
        true
    }

    /// Adds the body to or removes it from the world.
    pub fn set_enabled(&mut self, enabled: bool) -> bool {
        let Some(object) = self.manager.objects.get_mut(self.key) else {
            return false;
        };
        if object.enabled == enabled {
            return false;
        }
        object.enabled = enabled;
        if enabled {
            self.manager.activate_body(self.key);
        } else {
            self.manager.deactivate_body(self.key);
        }
        true
    }

    pub fn set_collision_group(&mut self, group: i32) -> bool {
        let Some(object) = self.manager.objects.get_mut(self.key) else {
            return false;
        };
        if object.group == group {
            return false;
        }
        object.group = group;
        self.manager.refresh_filter(self.key);
        true
    }

    pub fn set_collision_mask(&mut self, mask: i32) -> bool {
        let Some(object) = self.manager.objects.get_mut(self.key) else {
            return false;
        };
        if object.mask == mask {
            return false;
        }
        object.mask = mask;
        self.manager.refresh_filter(self.key);
        true
    }

    /// Scales the live shape, or the soft body about its center of mass.
    pub fn set_local_scale(&mut self, scale: Vec3) -> bool {
        let Some((object, body)) = self.parts() else {
            return false;
        };
        if object.previous_scale == scale && !object.dirty {
            return false;
        }
        let previous = object.previous_scale;
        object.previous_scale = scale;
        let Some(body) = body else {
            return true;
        };
        if let Some(soft) = body.as_soft_mut() {
            let ratio = Vec3::select(
                previous.abs().cmpgt(Vec3::splat(f32::EPSILON)),
                scale / previous,
                Vec3::ONE,
            );
            soft.scale(ratio);
            return true;
        }
        if let (Some(shape), Some(rigid)) = (object.shape.as_mut(), body.as_rigid_mut()) {
            Arc::make_mut(shape).set_local_scaling(scale);
            rigid.shape = shape.clone();
        }
        object.write_mass(body);
        true
    }

    /// Offset from the transform origin to the body origin, in scaled local space.
    pub fn set_position_offset(&mut self, offset: Vec3) -> bool {
        let Some(object) = self.manager.objects.get_mut(self.key) else {
            return false;
        };
        if object.position_offset == offset {
            return false;
        }
        object.position_offset = offset;
        self.manager.push_transform(self.graph, self.key);
        true
    }

    /// Replaces the collider and rebuilds shape and body.
    pub fn set_collider(&mut self, collider: Collider) -> bool {
        let Some(object) = self.manager.objects.get_mut(self.key) else {
            return false;
        };
        if object.is_soft() || object.collider == collider {
            return false;
        }
        object.collider = collider;
        self.rebuild();
        true
    }

    pub fn set_box_size(&mut self, half_extents: Vec3) -> bool {
        self.set_collider(Collider::Box { size: half_extents })
    }

    pub fn set_sphere_radius(&mut self, radius: f32) -> bool {
        self.set_collider(Collider::Sphere { radius })
    }

    pub fn set_capsule(&mut self, radius: f32, height: f32) -> bool {
        self.set_collider(Collider::Capsule { radius, height })
    }

    pub fn set_mesh_collider(&mut self, mesh_index: usize, convex: bool) -> bool {
        self.set_collider(Collider::Mesh { mesh_index, convex })
    }

    /// `position` is relative to the center of mass; soft bodies apply it at the nearest node.
    pub fn apply_force(&mut self, force: Vec3, position: Option<Vec3>) -> bool {
        let Some((_, Some(body))) = self.parts() else {
            return false;
        };
        match (&mut body.body, position) {
            (BodyKind::Rigid(rigid), Some(position)) => rigid.apply_force(force, position),
            (BodyKind::Rigid(rigid), None) => rigid.apply_central_force(force),
            (BodyKind::Soft(soft), Some(position)) => {
                let target = soft.center_of_mass() + position;
                if let Some(node) = soft.nearest_node(target) {
                    soft.add_force_at_node(force, node);
                }
            }
            (BodyKind::Soft(soft), None) => soft.add_force(force),
        }
        body.activate(false);
        true
    }

    pub fn apply_impulse(&mut self, impulse: Vec3, position: Option<Vec3>) -> bool {
        let Some((_, Some(body))) = self.parts() else {
            return false;
        };
        match &mut body.body {
            BodyKind::Rigid(rigid) => match position {
                Some(position) => rigid.apply_impulse(impulse, position),
                None => rigid.apply_central_impulse(impulse),
            },
            BodyKind::Soft(soft) => {
                let mass = soft.total_mass();
                if mass > 0.0 {
                    soft.add_velocity(impulse / mass);
                }
            }
        }
        body.activate(false);
        true
    }

    pub fn apply_torque(&mut self, torque: Vec3) -> bool {
        let Some((_, Some(body))) = self.parts() else {
            return false;
        };
        let Some(rigid) = body.as_rigid_mut() else {
            return false;
        };
        rigid.apply_torque(torque);
        body.activate(false);
        true
    }

    pub fn clear_forces(&mut self) -> bool {
        let Some((_, Some(body))) = self.parts() else {
            return false;
        };
        match &mut body.body {
            BodyKind::Rigid(rigid) => rigid.clear_forces(),
            BodyKind::Soft(soft) => soft.clear_forces(),
        }
        true
    }

    pub fn add_constraint(&mut self, params: ConstraintParams) -> Option<ConstraintKey> {
        self.manager.add_constraint(self.key, params)
    }

    /// Only removes constraints owned by this object.
    pub fn remove_constraint(&mut self, constraint: ConstraintKey) -> bool {
        let owned = self
            .manager
            .constraints
            .get(constraint)
            .is_some_and(|found| found.owner == self.key);
        owned && self.manager.remove_constraint(constraint)
    }

    pub fn remove_all_constraints(&mut self) -> usize {
        let owned = self
            .object()
            .map(|object| object.constraints.clone())
            .unwrap_or_default();
        owned
            .into_iter()
            .filter(|constraint| self.manager.remove_constraint(*constraint))
            .count()
    }

    pub fn aabb(&self) -> Option<Aabb> {
        self.manager.aabb(self.key)
    }

    pub fn is_activated(&self) -> bool {
        self.object().is_some_and(PhysicsObject::is_activated)
    }

    pub fn linear_velocity(&self) -> Option<Vec3> {
        self.manager.linear_velocity(self.key)
    }

    pub fn angular_velocity(&self) -> Option<Vec3> {
        self.manager.angular_velocity(self.key)
    }
}

impl PhysicsManager {
    pub fn object(&self, key: ObjectKey) -> Option<&PhysicsObject> {
        self.objects.get(key)
    }

    /// Live native body of an object.
    pub fn native_body(&self, key: ObjectKey) -> Option<&CollisionObject> {
        let handle = self.objects.get(key)?.body?;
        self.world.as_deref()?.body(handle)
    }

    pub fn body_pose(&self, key: ObjectKey) -> Option<Pose> {
        self.native_body(key).map(CollisionObject::pose)
    }

    pub fn linear_velocity(&self, key: ObjectKey) -> Option<Vec3> {
        let body = self.native_body(key)?;
        Some(match &body.body {
            BodyKind::Rigid(rigid) => rigid.linear_velocity,
            BodyKind::Soft(soft) => {
                let mass = soft.total_mass();
                if mass <= 0.0 {
                    Vec3::ZERO
                } else {
                    soft.nodes
                        .iter()
                        .filter(|node| node.inverse_mass > 0.0)
                        .map(|node| node.velocity / node.inverse_mass)
                        .sum::<Vec3>()
                        / mass
                }
            }
        })
    }

    pub fn angular_velocity(&self, key: ObjectKey) -> Option<Vec3> {
        self.native_body(key)?
            .as_rigid()
            .map(|rigid| rigid.angular_velocity)
    }

    pub fn aabb(&self, key: ObjectKey) -> Option<Aabb> {
        self.native_body(key).map(CollisionObject::aabb)
    }

    /// Builds (or rebuilds) the native body from the cached state and the owner's transform.
    pub(crate) fn create_body(&mut self, graph: &mut SceneGraph, key: ObjectKey) -> bool {
        if self.world.is_none() {
            return false;
        }
        let Some(is_soft) = self.objects.get(key).map(PhysicsObject::is_soft) else {
            return false;
        };
        self.destroy_body(key);
        if let Some(object) = self.objects.get_mut(key) {
            object.dirty = true;
        }

        let created = if is_soft {
            self.create_soft_body(graph, key)
        } else {
            self.create_rigid_body(graph, key)
        };

        let Some(object) = self.objects.get_mut(key) else {
            return false;
        };
        object.dirty = false;
        if !created {
            return false;
        }
        if object.enabled {
            self.activate_body(key);
        }
        self.recreate_joints_of(key);
        true
    }

    fn create_rigid_body(&mut self, graph: &mut SceneGraph, key: ObjectKey) -> bool {
        let Some(object) = self.objects.get(key) else {
            return false;
        };
        let owner = object.owner;
        let (Some(position), Some(rotation), Some(scale)) = (
            graph.world_position(owner),
            graph.world_rotation(owner),
            graph.world_scale(owner),
        ) else {
            return false;
        };
        let Some(mut shape) = object.collider.build_shape(graph.figure(owner), object.kinematic)
        else {
            warn!("no collision shape for {:?}, body not created", object.collider);
            return false;
        };
        shape.set_margin(object.margin.get());
        shape.set_local_scaling(scale);
        let shape = Arc::new(shape);

        let pose = Pose::new(position + object.world_offset(rotation, scale), rotation);
        let mut native = CollisionObject::rigid(RigidBody::new(
            shape.clone(),
            object.effective_mass(),
            pose,
        ));
        native.user_data = key.to_bits();
        object.write_all(&mut native);

        let Some(world) = self.world.as_deref_mut() else {
            return false;
        };
        let handle = world.create_body(native);
        debug!("created rigid body {:?} for object {:?}", handle, key);
        let Some(object) = self.objects.get_mut(key) else {
            return false;
        };
        object.shape = Some(shape);
        object.body = handle;
        object.previous_scale = scale;
        handle.is_some()
    }

    pub(crate) fn destroy_body(&mut self, key: ObjectKey) -> bool {
        self.deactivate_body(key);
        self.destroy_joints_of(key);
        let Some(object) = self.objects.get_mut(key) else {
            return false;
        };
        object.shape = None;
        let Some(handle) = object.body.take() else {
            return false;
        };
        if let Some(world) = self.world.as_deref_mut() {
            world.destroy_body(handle);
        }
        true
    }

    /// Adds the body to the world with the object's filter and re-registers its joints.
    pub(crate) fn activate_body(&mut self, key: ObjectKey) -> bool {
        let Some(object) = self.objects.get_mut(key) else {
            return false;
        };
        let (Some(handle), Some(world)) = (object.body, self.world.as_deref_mut()) else {
            return false;
        };
        if object.activated || !world.add_body(handle, object.filter()) {
            return false;
        }
        object.activated = true;
        for constraint in self.constraints_involving(key) {
            self.register_joint(constraint);
        }
        true
    }

    pub(crate) fn deactivate_body(&mut self, key: ObjectKey) -> bool {
        let Some(object) = self.objects.get_mut(key) else {
            return false;
        };
        if !object.activated {
            return false;
        }
        object.activated = false;
        let Some(handle) = object.body else {
            return false;
        };
        if let Some(world) = self.world.as_deref_mut() {
            world.remove_body(handle);
        }
        for constraint in self.constraints_involving(key) {
            self.unregister_joint(constraint);
        }
        true
    }

    /// Re-adds an active body so a new group or mask takes effect.
    pub(crate) fn refresh_filter(&mut self, key: ObjectKey) -> bool {
        let Some(object) = self.objects.get(key) else {
            return false;
        };
        let (Some(handle), Some(world)) = (object.body, self.world.as_deref_mut()) else {
            return false;
        };
        if !object.activated {
            return false;
        }
        world.remove_body(handle);
        world.add_body(handle, object.filter())
    }

    /// Scene to physics: writes the owner's world pose into the body. A scale change beyond
    /// the rebuild threshold recreates the body instead.
    pub(crate) fn push_transform(&mut self, graph: &mut SceneGraph, key: ObjectKey) {
        let Some(object) = self.objects.get(key) else {
            return;
        };
        let Some(handle) = object.body else {
            return;
        };
        let owner = object.owner;
        let (Some(position), Some(rotation), Some(scale)) = (
            graph.world_position(owner),
            graph.world_rotation(owner),
            graph.world_scale(owner),
        ) else {
            return;
        };

        if (scale - object.previous_scale).length_squared() >= SCALE_REBUILD_THRESHOLD_SQUARED {
            debug!("scale of {:?} changed to {scale}, rebuilding body", key);
            if let Some(object) = self.objects.get_mut(key) {
                object.previous_scale = scale;
            }
            self.create_body(graph, key);
            return;
        }

        if object.is_soft() {
            self.push_soft_transform(key, Pose::new(position, rotation));
            return;
        }

        let pose = Pose::new(position + object.world_offset(rotation, scale), rotation);
        let Some(body) = self
            .world
            .as_deref_mut()
            .and_then(|world| world.body_mut(handle))
        else {
            return;
        };
        let Some(rigid) = body.as_rigid_mut() else {
            return;
        };
        if !rigid.pose.approx_eq(&pose, 1e-5) {
            rigid.pose = pose;
            body.activate(false);
        }
    }

    /// Physics to scene: writes the body pose, minus the offset, into the owner's transform.
    /// Kinematic objects are driven by the scene and are skipped.
    pub(crate) fn pull_transform(&mut self, graph: &mut SceneGraph, key: ObjectKey) {
        let Some(object) = self.objects.get(key) else {
            return;
        };
        if object.kinematic {
            return;
        }
        if object.is_soft() {
            self.pull_soft_transform(graph, key);
            return;
        }
        let Some(pose) = object
            .body
            .and_then(|handle| self.world.as_deref()?.body(handle))
            .map(CollisionObject::pose)
        else {
            return;
        };
        let offset = object.world_offset(pose.rotation, object.previous_scale);
        graph.set_world_pose(object.owner, pose.position - offset, pose.rotation);
    }
}
