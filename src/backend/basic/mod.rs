//! In-crate rigid and soft body world.
//!
//! One sub-step integrates velocities, detects and reports contacts, solves joints and contacts
//! with sequential impulses, integrates positions, steps soft bodies against the rigid bodies and
//! finally updates sleeping state.

pub mod integrator;
pub mod narrowphase;
pub mod queries;
pub mod soft;
pub mod solver;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use glam::Vec3;

use crate::backend::body::{ActivationState, BodyKind, CollisionFlags, CollisionObject};
use crate::backend::joint::Joint;
use crate::backend::shape::CollisionShape;
use crate::backend::{
    BodyHandle, CollisionFilter, ContactPoint, DebugDraw, JointHandle, PhysicsBackend, Pose, RayHit,
};
use crate::config::{DEACTIVATION_TIME, DEFAULT_SOLVER_ITERATIONS};
use crate::utils::allocator::Arena;
use crate::utils::logging::ScopedTimer;

use integrator::Integrator;
use narrowphase::{Contact, NarrowPhase};
use queries::{Raycast, RaycastQuery};
use soft::{RigidProxy, SoftContact, SoftSolver};
use solver::{ConstraintSolver, SolverBody, SolverContact, SolverJoint};

/// Tolerance for accumulated time before a fixed step is taken.
const STEP_EPSILON: f32 = 1e-4;

pub struct BasicWorld {
    deformable: bool,
    gravity: Vec3,
    solver: ConstraintSolver,
    bodies: Arena<CollisionObject>,
    in_world: BTreeMap<BodyHandle, CollisionFilter>,
    joints: Arena<Joint>,
    /// Joints in the world, with their "disable collisions between linked bodies" flag.
    joints_in_world: BTreeMap<JointHandle, bool>,
    local_time: f32,
}

impl BasicWorld {
    pub fn new(deformable: bool) -> Self {
        Self {
            deformable,
            gravity: Vec3::from(crate::config::DEFAULT_GRAVITY),
            solver: ConstraintSolver::new(DEFAULT_SOLVER_ITERATIONS),
            bodies: Arena::new(),
            in_world: BTreeMap::new(),
            joints: Arena::new(),
            joints_in_world: BTreeMap::new(),
            local_time: 0.0,
        }
    }

    fn filter(&self, body: BodyHandle) -> Option<CollisionFilter> {
        self.in_world.get(&body).copied()
    }

    fn linked_without_collision(&self, a: BodyHandle, b: BodyHandle) -> bool {
        self.joints_in_world
            .iter()
            .filter(|(_, disable)| **disable)
            .filter_map(|(handle, _)| self.joints.get(*handle))
            .any(|joint| match joint.bodies() {
                (x, Some(y)) => (x == a && y == b) || (x == b && y == a),
                (_, None) => false,
            })
    }

    fn should_collide(&self, a: BodyHandle, b: BodyHandle) -> bool {
        let (Some(object_a), Some(object_b)) = (self.bodies.get(a), self.bodies.get(b)) else {
            return false;
        };
        let (Some(filter_a), Some(filter_b)) = (self.filter(a), self.filter(b)) else {
            return false;
        };
        if object_a.is_static_or_kinematic() && object_b.is_static_or_kinematic() {
            return false;
        }
        if !object_a.is_active() && !object_b.is_active() {
            return false;
        }
        filter_a.accepts(&filter_b) && !self.linked_without_collision(a, b)
    }

    fn wants_callback(&self, a: BodyHandle, b: BodyHandle) -> bool {
        [a, b].iter().any(|handle| {
            self.bodies
                .get(*handle)
                .is_some_and(|object| object.flags.contains(CollisionFlags::CUSTOM_MATERIAL_CALLBACK))
        })
    }

    fn rigid_contact(&self, a: BodyHandle, b: BodyHandle) -> Option<Contact> {
        let body_a = self.bodies.get(a)?.as_rigid()?;
        let body_b = self.bodies.get(b)?.as_rigid()?;
        if !body_a.shape.aabb(&body_a.pose).intersects(&body_b.shape.aabb(&body_b.pose)) {
            return None;
        }
        NarrowPhase::collide(a, &body_a.shape, &body_a.pose, b, &body_b.shape, &body_b.pose)
    }

    fn contact_point(&self, contact: &Contact) -> ContactPoint {
        let pose_a = self.bodies.get(contact.body_a).map(|o| o.pose()).unwrap_or_default();
        let pose_b = self.bodies.get(contact.body_b).map(|o| o.pose()).unwrap_or_default();
        let on_a = contact.point_on_a();
        let on_b = contact.point_on_b();
        ContactPoint {
            body_a: contact.body_a,
            body_b: contact.body_b,
            user_data_a: self.user_data(contact.body_a),
            user_data_b: self.user_data(contact.body_b),
            position_world_on_a: on_a,
            position_world_on_b: on_b,
            local_point_a: pose_a.inverse_transform_point(on_a),
            local_point_b: pose_b.inverse_transform_point(on_b),
            normal_world_on_b: -contact.normal,
            distance: -contact.depth,
        }
    }

    fn soft_contact_point(&self, soft: BodyHandle, contact: &SoftContact) -> ContactPoint {
        let node = self
            .bodies
            .get(soft)
            .and_then(|object| object.as_soft())
            .and_then(|body| body.nodes.get(contact.node))
            .map(|node| node.position)
            .unwrap_or(contact.point);
        let soft_pose = self.bodies.get(soft).map(|o| o.pose()).unwrap_or_default();
        let rigid_pose = self.bodies.get(contact.rigid).map(|o| o.pose()).unwrap_or_default();
        ContactPoint {
            body_a: soft,
            body_b: contact.rigid,
            user_data_a: self.user_data(soft),
            user_data_b: self.user_data(contact.rigid),
            position_world_on_a: node,
            position_world_on_b: contact.point,
            local_point_a: soft_pose.inverse_transform_point(node),
            local_point_b: rigid_pose.inverse_transform_point(contact.point),
            normal_world_on_b: contact.normal,
            distance: -contact.depth,
        }
    }

    fn user_data(&self, body: BodyHandle) -> u64 {
        self.bodies.get(body).map(|object| object.user_data).unwrap_or_default()
    }

    fn rigid_proxies(&self) -> Vec<(BodyHandle, Arc<CollisionShape>, Pose, f32, bool)> {
        self.in_world
            .keys()
            .filter_map(|handle| {
                let object = self.bodies.get(*handle)?;
                let body = object.as_rigid()?;
                object.has_contact_response().then(|| {
                    (*handle, body.shape.clone(), body.pose, object.friction, object.is_kinematic())
                })
            })
            .collect()
    }

    fn single_step(&mut self, dt: f32, on_contact: &mut dyn FnMut(&ContactPoint)) {
        let _timer = ScopedTimer::new("BasicWorld::single_step");
        let handles: Vec<BodyHandle> = self.in_world.keys().copied().collect();

        for handle in &handles {
            let Some(object) = self.bodies.get_mut(*handle) else {
                continue;
            };
            if object.is_static_or_kinematic() || !object.is_active() {
                continue;
            }
            if let Some(body) = object.as_rigid_mut() {
                Integrator::integrate_velocity(body, self.gravity, dt);
            }
        }

        let contacts = self.detect_rigid_contacts(&handles, on_contact);
        self.solve_rigid(&handles, contacts, dt);
        self.step_soft_bodies(&handles, dt, on_contact);
        self.update_deactivation(&handles, dt);
    }

    fn detect_rigid_contacts(
        &mut self,
        handles: &[BodyHandle],
        on_contact: &mut dyn FnMut(&ContactPoint),
    ) -> Vec<Contact> {
        let mut solvable = Vec::new();
        for (i, a) in handles.iter().enumerate() {
            for b in &handles[i + 1..] {
                if !self.should_collide(*a, *b) {
                    continue;
                }
                let Some(contact) = self.rigid_contact(*a, *b) else {
                    continue;
                };
                if contact.depth < -f32::EPSILON {
                    continue;
                }
                self.wake_pair(*a, *b);
                if self.wants_callback(*a, *b) {
                    on_contact(&self.contact_point(&contact));
                }
                let responds = [*a, *b].iter().all(|handle| {
                    self.bodies
                        .get(*handle)
                        .is_some_and(CollisionObject::has_contact_response)
                });
                if responds {
                    solvable.push(contact);
                }
            }
        }
        solvable
    }

    /// A sleeping body touched by an awake dynamic body wakes up.
    fn wake_pair(&mut self, a: BodyHandle, b: BodyHandle) {
        if let Some((object_a, object_b)) = self.bodies.get2_mut(a, b) {
            let awake_dynamic = |object: &CollisionObject| object.is_active() && !object.is_static_or_kinematic();
            if !object_a.is_active() && awake_dynamic(object_b) {
                object_a.activate(false);
            }
            if !object_b.is_active() && awake_dynamic(object_a) {
                object_b.activate(false);
            }
        }
    }

    fn solve_rigid(&mut self, handles: &[BodyHandle], contacts: Vec<Contact>, dt: f32) {
        let mut indices = HashMap::with_capacity(handles.len());
        let mut solver_bodies = vec![SolverBody::FIXED];
        for handle in handles {
            if let Some(object) = self.bodies.get(*handle) {
                if object.as_rigid().is_some() {
                    indices.insert(*handle, solver_bodies.len());
                    solver_bodies.push(SolverBody::from_object(object));
                }
            }
        }
        let index_of = |handle: BodyHandle| indices.get(&handle).copied().unwrap_or(0);

        let mut solver_contacts: Vec<SolverContact> = contacts
            .into_iter()
            .map(|contact| {
                let (friction, restitution) = match (
                    self.bodies.get(contact.body_a),
                    self.bodies.get(contact.body_b),
                ) {
                    (Some(a), Some(b)) => (a.friction * b.friction, a.restitution * b.restitution),
                    _ => (0.0, 0.0),
                };
                SolverContact {
                    index_a: index_of(contact.body_a),
                    index_b: index_of(contact.body_b),
                    contact,
                    restitution,
                    friction,
                }
            })
            .collect();

        let joint_handles: Vec<JointHandle> = self.joints_in_world.keys().copied().collect();
        let mut solver_joints: Vec<SolverJoint> = joint_handles
            .iter()
            .filter_map(|handle| self.joints.get(*handle))
            .map(|joint| SolverJoint {
                index_a: index_of(joint.body_a),
                index_b: joint.body_b.map(index_of).unwrap_or(0),
                joint: joint.clone(),
                applied_impulse: 0.0,
            })
            .collect();

        self.solver.apply_springs(&mut solver_bodies, &solver_joints, dt);
        self.solver
            .solve(&mut solver_bodies, &mut solver_joints, &mut solver_contacts, dt);

        for (handle, solved) in joint_handles.iter().zip(&solver_joints) {
            if let Some(joint) = self.joints.get_mut(*handle) {
                joint.enabled = solved.joint.enabled;
            }
        }

        for (handle, index) in &indices {
            let Some(body) = self.bodies.get_mut(*handle).and_then(|o| o.as_rigid_mut()) else {
                continue;
            };
            let solved = &mut solver_bodies[*index];
            if solved.is_static() {
                continue;
            }
            body.linear_velocity = solved.linear_velocity;
            body.angular_velocity = solved.angular_velocity;
            Integrator::integrate_position(body, dt);
            solved.pose = body.pose;
        }

        self.solver.correct_positions(&mut solver_bodies, &solver_contacts);
        for (handle, index) in &indices {
            let solved = &solver_bodies[*index];
            if solved.is_static() {
                continue;
            }
            if let Some(body) = self.bodies.get_mut(*handle).and_then(|o| o.as_rigid_mut()) {
                body.pose.position = solved.pose.position;
            }
        }
    }

    fn step_soft_bodies(
        &mut self,
        handles: &[BodyHandle],
        dt: f32,
        on_contact: &mut dyn FnMut(&ContactPoint),
    ) {
        if !self.deformable {
            return;
        }
        let rigid = self.rigid_proxies();
        for handle in handles {
            let Some(filter) = self.filter(*handle) else {
                continue;
            };
            let proxies: Vec<RigidProxy<'_>> = rigid
                .iter()
                .filter(|(other, ..)| self.filter(*other).is_some_and(|f| f.accepts(&filter)))
                .map(|(other, shape, pose, friction, kinematic)| RigidProxy {
                    handle: *other,
                    shape: shape.as_ref(),
                    pose: *pose,
                    friction: *friction,
                    kinematic: *kinematic,
                })
                .collect();
            let gravity = self.gravity;
            let Some(object) = self.bodies.get_mut(*handle) else {
                continue;
            };
            if !object.is_active() {
                continue;
            }
            let Some(body) = object.as_soft_mut() else {
                continue;
            };
            let contacts = SoftSolver::step(body, gravity, dt, &proxies);
            for contact in contacts {
                if self.wants_callback(*handle, contact.rigid) {
                    on_contact(&self.soft_contact_point(*handle, &contact));
                }
            }
        }
    }

    fn update_deactivation(&mut self, handles: &[BodyHandle], dt: f32) {
        for handle in handles {
            let Some(object) = self.bodies.get_mut(*handle) else {
                continue;
            };
            if object.is_static_or_kinematic()
                || matches!(
                    object.activation_state,
                    ActivationState::DisableDeactivation | ActivationState::DisableSimulation
                )
            {
                continue;
            }
            let resting = match &object.body {
                BodyKind::Rigid(body) => {
                    body.linear_velocity.length() < body.linear_sleeping_threshold
                        && body.angular_velocity.length() < body.angular_sleeping_threshold
                }
                BodyKind::Soft(body) => body
                    .nodes
                    .iter()
                    .all(|node| node.velocity.length() < body.config.sleeping_threshold),
            };
            if !resting {
                object.deactivation_time = 0.0;
                continue;
            }
            object.deactivation_time += dt;
            if object.is_active() && object.deactivation_time > DEACTIVATION_TIME {
                object.activation_state = ActivationState::IslandSleeping;
                match &mut object.body {
                    BodyKind::Rigid(body) => {
                        body.linear_velocity = Vec3::ZERO;
                        body.angular_velocity = Vec3::ZERO;
                    }
                    BodyKind::Soft(body) => body.set_velocity(Vec3::ZERO),
                }
            }
        }
    }

    fn pair_contacts(&self, a: BodyHandle, b: BodyHandle) -> Option<ContactPoint> {
        let object_a = self.bodies.get(a)?;
        let object_b = self.bodies.get(b)?;
        match (&object_a.body, &object_b.body) {
            (BodyKind::Rigid(_), BodyKind::Rigid(_)) => self
                .rigid_contact(a, b)
                .filter(|contact| contact.depth >= 0.0)
                .map(|contact| self.contact_point(&contact)),
            (BodyKind::Soft(soft), BodyKind::Rigid(rigid)) => {
                let proxy = RigidProxy {
                    handle: b,
                    shape: rigid.shape.as_ref(),
                    pose: rigid.pose,
                    friction: object_b.friction,
                    kinematic: object_b.is_kinematic(),
                };
                SoftSolver::detect(soft, &proxy).map(|contact| self.soft_contact_point(a, &contact))
            }
            (BodyKind::Rigid(_), BodyKind::Soft(_)) => {
                self.pair_contacts(b, a).map(|contact| contact.swapped())
            }
            (BodyKind::Soft(_), BodyKind::Soft(_)) => None,
        }
    }

    fn draw_box(drawer: &mut dyn DebugDraw, min: Vec3, max: Vec3, color: Vec3) {
        let corner = |i: usize| {
            Vec3::new(
                if i & 1 == 0 { min.x } else { max.x },
                if i & 2 == 0 { min.y } else { max.y },
                if i & 4 == 0 { min.z } else { max.z },
            )
        };
        for i in 0..8 {
            for bit in [1, 2, 4] {
                if i & bit == 0 {
                    drawer.draw_line(corner(i), corner(i | bit), color);
                }
            }
        }
    }
}

impl PhysicsBackend for BasicWorld {
    fn name(&self) -> &'static str {
        if self.deformable {
            "basic-soft-rigid"
        } else {
            "basic-rigid"
        }
    }

    fn is_deformable(&self) -> bool {
        self.deformable
    }

    fn gravity(&self) -> Vec3 {
        self.gravity
    }

    fn set_gravity(&mut self, gravity: Vec3) {
        self.gravity = gravity;
    }

    fn set_solver_iterations(&mut self, iterations: u32) {
        self.solver = ConstraintSolver::new(iterations);
    }

    fn create_body(&mut self, object: CollisionObject) -> Option<BodyHandle> {
        if matches!(object.body, BodyKind::Soft(_)) && !self.deformable {
            log::warn!("soft body refused by a rigid-only world");
            return None;
        }
        Some(self.bodies.insert(object))
    }

    fn destroy_body(&mut self, body: BodyHandle) -> Option<CollisionObject> {
        self.in_world.remove(&body);
        self.bodies.remove(body)
    }

    fn add_body(&mut self, body: BodyHandle, filter: CollisionFilter) -> bool {
        if !self.bodies.contains(body) {
            return false;
        }
        self.in_world.insert(body, filter);
        true
    }

    fn remove_body(&mut self, body: BodyHandle) -> bool {
        self.in_world.remove(&body).is_some()
    }

    fn is_in_world(&self, body: BodyHandle) -> bool {
        self.in_world.contains_key(&body)
    }

    fn body(&self, body: BodyHandle) -> Option<&CollisionObject> {
        self.bodies.get(body)
    }

    fn body_mut(&mut self, body: BodyHandle) -> Option<&mut CollisionObject> {
        self.bodies.get_mut(body)
    }

    fn body_count(&self) -> usize {
        self.bodies.len()
    }

    fn create_joint(&mut self, joint: Joint) -> Option<JointHandle> {
        if !self.bodies.contains(joint.body_a)
            || joint.body_b.is_some_and(|body| !self.bodies.contains(body))
        {
            return None;
        }
        Some(self.joints.insert(joint))
    }

    fn destroy_joint(&mut self, joint: JointHandle) -> Option<Joint> {
        self.joints_in_world.remove(&joint);
        self.joints.remove(joint)
    }

    fn add_joint(&mut self, joint: JointHandle, disable_collisions_between_linked: bool) -> bool {
        if !self.joints.contains(joint) {
            return false;
        }
        self.joints_in_world
            .insert(joint, disable_collisions_between_linked);
        true
    }

    fn remove_joint(&mut self, joint: JointHandle) -> bool {
        self.joints_in_world.remove(&joint).is_some()
    }

    fn is_joint_in_world(&self, joint: JointHandle) -> bool {
        self.joints_in_world.contains_key(&joint)
    }

    fn joint(&self, joint: JointHandle) -> Option<&Joint> {
        self.joints.get(joint)
    }

    fn joint_mut(&mut self, joint: JointHandle) -> Option<&mut Joint> {
        self.joints.get_mut(joint)
    }

    fn set_joint_equilibrium_point(&mut self, joint: JointHandle, axis: usize) -> bool {
        if axis >= 6 {
            return false;
        }
        let Some(current) = self.joints.get(joint) else {
            return false;
        };
        let Some(pose_a) = self.bodies.get(current.body_a).map(CollisionObject::pose) else {
            return false;
        };
        let pose_b = current
            .body_b
            .and_then(|body| self.bodies.get(body))
            .map(CollisionObject::pose);
        let (linear, angular) = current.relative_offsets(&pose_a, pose_b.as_ref());
        let value = if axis < 3 { linear[axis] } else { angular[axis - 3] };
        if let Some(joint) = self.joints.get_mut(joint) {
            joint.axes[axis].equilibrium_point = value;
        }
        true
    }

    fn step_simulation(
        &mut self,
        dt: f32,
        max_sub_steps: u32,
        fixed_step: f32,
        on_contact: &mut dyn FnMut(&ContactPoint),
    ) -> u32 {
        let (steps, step_size) = if max_sub_steps == 0 || fixed_step <= 0.0 {
            self.local_time = 0.0;
            (u32::from(dt > 0.0), dt)
        } else {
            self.local_time += dt.max(0.0);
            let available = (self.local_time / fixed_step + STEP_EPSILON).floor().max(0.0) as u32;
            self.local_time = (self.local_time - available as f32 * fixed_step).max(0.0);
            if available > max_sub_steps {
                log::trace!(
                    "dropping {} sub-steps over the limit of {}",
                    available - max_sub_steps,
                    max_sub_steps
                );
            }
            (available.min(max_sub_steps), fixed_step)
        };

        for _ in 0..steps {
            self.single_step(step_size, on_contact);
        }

        for (_, object) in self.bodies.iter_mut() {
            match &mut object.body {
                BodyKind::Rigid(body) => body.clear_forces(),
                BodyKind::Soft(body) => body.clear_forces(),
            }
        }
        steps
    }

    fn ray_test(&self, from: Vec3, to: Vec3, filter: CollisionFilter) -> Vec<RayHit> {
        let Some(query) = RaycastQuery::segment(from, to) else {
            return Vec::new();
        };
        let mut hits: Vec<RayHit> = self
            .in_world
            .iter()
            .filter(|(_, body_filter)| body_filter.accepts(&filter))
            .filter_map(|(handle, _)| {
                let object = self.bodies.get(*handle)?;
                let (distance, point, normal) = Raycast::cast_object(&query, object)?;
                Some(RayHit {
                    body: *handle,
                    user_data: object.user_data,
                    point,
                    normal,
                    fraction: distance / query.max_distance,
                })
            })
            .collect();
        hits.sort_by(|a, b| a.fraction.total_cmp(&b.fraction));
        hits
    }

    fn contact_test(&self, body: BodyHandle, on_contact: &mut dyn FnMut(&ContactPoint)) {
        let Some(filter) = self.filter(body) else {
            return;
        };
        for (other, other_filter) in &self.in_world {
            if *other == body || !filter.accepts(other_filter) {
                continue;
            }
            if let Some(contact) = self.pair_contacts(body, *other) {
                on_contact(&contact);
            }
        }
    }

    fn contact_pair_test(
        &self,
        body_a: BodyHandle,
        body_b: BodyHandle,
        on_contact: &mut dyn FnMut(&ContactPoint),
    ) {
        if body_a == body_b {
            return;
        }
        if let Some(contact) = self.pair_contacts(body_a, body_b) {
            on_contact(&contact);
        }
    }

    fn debug_draw(&self, drawer: &mut dyn DebugDraw) {
        for handle in self.in_world.keys() {
            let Some(object) = self.bodies.get(*handle) else {
                continue;
            };
            let color = if object.is_static_or_kinematic() {
                Vec3::new(0.5, 0.5, 0.5)
            } else {
                match object.activation_state {
                    ActivationState::Active => Vec3::ONE,
                    ActivationState::IslandSleeping => Vec3::new(0.0, 1.0, 0.0),
                    ActivationState::WantsDeactivation => Vec3::new(0.0, 1.0, 1.0),
                    ActivationState::DisableDeactivation => Vec3::new(1.0, 0.0, 0.0),
                    ActivationState::DisableSimulation => Vec3::new(1.0, 1.0, 0.0),
                }
            };
            let bounds = object.aabb();
            Self::draw_box(drawer, bounds.min, bounds.max, color);

            if let Some(soft) = object.as_soft() {
                for link in soft.links.iter().filter(|link| !link.bending) {
                    let [a, b] = link.nodes;
                    drawer.draw_line(soft.nodes[a].position, soft.nodes[b].position, color);
                }
            }
        }

        for handle in self.joints_in_world.keys() {
            let Some(joint) = self.joints.get(*handle) else {
                continue;
            };
            let Some(pose_a) = self.bodies.get(joint.body_a).map(CollisionObject::pose) else {
                continue;
            };
            let pose_b = joint
                .body_b
                .and_then(|body| self.bodies.get(body))
                .map(CollisionObject::pose);
            let (frame_a, frame_b) = joint.world_frames(&pose_a, pose_b.as_ref());
            for frame in [frame_a, frame_b] {
                for axis in Vec3::AXES {
                    let tip = frame.transform_point(axis * 0.25);
                    drawer.draw_line(frame.position, tip, axis);
                }
            }
        }
    }

    fn garbage_collect(&mut self) {
        for (_, object) in self.bodies.iter_mut() {
            if let Some(soft) = object.as_soft_mut() {
                soft.shrink_scratch();
            }
        }
    }

    fn clear(&mut self) {
        log::debug!(
            "clearing world with {} bodies and {} joints",
            self.bodies.len(),
            self.joints.len()
        );
        self.joints_in_world.clear();
        self.joints.clear();
        self.in_world.clear();
        self.bodies.clear();
        self.local_time = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::body::RigidBody;
    use approx::assert_relative_eq;

    fn add_rigid(world: &mut BasicWorld, shape: CollisionShape, mass: f32, position: Vec3) -> BodyHandle {
        let mut object = CollisionObject::rigid(RigidBody::new(
            Arc::new(shape),
            mass,
            Pose::from_translation(position),
        ));
        if mass == 0.0 {
            object.flags |= CollisionFlags::STATIC;
        }
        object.flags |= CollisionFlags::CUSTOM_MATERIAL_CALLBACK;
        let handle = world.create_body(object).expect("body");
        world.add_body(handle, CollisionFilter::ALL);
        handle
    }

    #[test]
    fn sub_steps_follow_accumulated_time() {
        let mut world = BasicWorld::new(false);
        let mut ignore = |_: &ContactPoint| {};
        assert_eq!(world.step_simulation(1.0 / 120.0, 4, 1.0 / 60.0, &mut ignore), 0);
        assert_eq!(world.step_simulation(1.0 / 120.0, 4, 1.0 / 60.0, &mut ignore), 1);
        assert_eq!(world.step_simulation(1.0, 4, 1.0 / 60.0, &mut ignore), 4);
        assert_eq!(world.step_simulation(0.5, 0, 1.0 / 60.0, &mut ignore), 1);
    }

    #[test]
    fn rigid_only_world_refuses_soft_bodies() {
        let mut world = BasicWorld::new(false);
        let soft = crate::backend::SoftBody::from_tri_mesh(&[Vec3::ZERO, Vec3::X, Vec3::Z], &[0, 1, 2]);
        assert!(world.create_body(CollisionObject::soft(soft)).is_none());
    }

    #[test]
    fn resting_box_reports_contacts_and_stays_put() {
        let mut world = BasicWorld::new(false);
        add_rigid(&mut world, CollisionShape::cuboid(Vec3::new(5.0, 0.5, 5.0)), 0.0, Vec3::ZERO);
        let cube = add_rigid(&mut world, CollisionShape::cuboid(Vec3::splat(0.5)), 1.0, Vec3::new(0.0, 1.0, 0.0));
        let mut reported = 0;
        for _ in 0..120 {
            world.step_simulation(1.0 / 60.0, 1, 1.0 / 60.0, &mut |_| reported += 1);
        }
        assert!(reported > 0);
        let height = world.body(cube).expect("cube").pose().position.y;
        assert!((height - 1.0).abs() < 0.1, "cube settled at {height}");
    }

    #[test]
    fn ray_hits_are_sorted_by_distance() {
        let mut world = BasicWorld::new(false);
        let far = add_rigid(&mut world, CollisionShape::sphere(1.0), 0.0, Vec3::new(0.0, 0.0, 10.0));
        let near = add_rigid(&mut world, CollisionShape::sphere(1.0), 0.0, Vec3::new(0.0, 0.0, 5.0));
        let hits = world.ray_test(Vec3::ZERO, Vec3::new(0.0, 0.0, 20.0), CollisionFilter::ALL);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].body, near);
        assert_eq!(hits[1].body, far);
        assert_relative_eq!(hits[0].fraction, 0.2, epsilon = 1e-4);
    }

    #[test]
    fn equilibrium_point_captures_current_offset() {
        let mut world = BasicWorld::new(false);
        let body = add_rigid(&mut world, CollisionShape::sphere(0.5), 1.0, Vec3::new(0.0, 2.0, 0.0));
        let joint = Joint::generic_spring(body, None, Pose::IDENTITY, Pose::IDENTITY);
        let handle = world.create_joint(joint).expect("joint");
        assert!(world.set_joint_equilibrium_point(handle, 1));
        assert_relative_eq!(world.joint(handle).expect("joint").axes[1].equilibrium_point, -2.0, epsilon = 1e-5);
    }

    #[test]
    fn clear_empties_everything() {
        let mut world = BasicWorld::new(true);
        let body = add_rigid(&mut world, CollisionShape::sphere(0.5), 1.0, Vec3::ZERO);
        world.clear();
        assert_eq!(world.body_count(), 0);
        assert!(!world.is_in_world(body));
    }
}
