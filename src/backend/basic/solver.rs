use glam::{Mat3, Vec3};

use crate::backend::basic::narrowphase::Contact;
use crate::backend::body::CollisionObject;
use crate::backend::joint::{Joint, JointAxis};
use crate::backend::Pose;

/// Velocity-level copy of a rigid body used while iterating constraints.
#[derive(Debug, Clone, Copy)]
pub struct SolverBody {
    pub pose: Pose,
    pub inverse_mass: f32,
    pub inverse_inertia: Mat3,
    pub linear_factor: Vec3,
    pub angular_factor: Vec3,
    pub linear_velocity: Vec3,
    pub angular_velocity: Vec3,
}

impl SolverBody {
    /// Immovable body standing in for the world anchor.
    pub const FIXED: SolverBody = SolverBody {
        pose: Pose::IDENTITY,
        inverse_mass: 0.0,
        inverse_inertia: Mat3::ZERO,
        linear_factor: Vec3::ZERO,
        angular_factor: Vec3::ZERO,
        linear_velocity: Vec3::ZERO,
        angular_velocity: Vec3::ZERO,
    };

    /// Static, kinematic, sleeping and soft bodies get zero inverse mass.
    pub fn from_object(object: &CollisionObject) -> Self {
        let Some(body) = object.as_rigid() else {
            return Self::FIXED;
        };
        let movable = !object.is_static_or_kinematic() && object.is_active();
        Self {
            pose: body.pose,
            inverse_mass: if movable { body.inverse_mass() } else { 0.0 },
            inverse_inertia: if movable {
                body.inverse_inertia_world()
            } else {
                Mat3::ZERO
            },
            linear_factor: body.linear_factor,
            angular_factor: body.angular_factor,
            linear_velocity: body.linear_velocity,
            angular_velocity: body.angular_velocity,
        }
    }

    pub fn is_static(&self) -> bool {
        self.inverse_mass == 0.0
    }

    pub fn velocity_at(&self, relative_position: Vec3) -> Vec3 {
        self.linear_velocity + self.angular_velocity.cross(relative_position)
    }

    pub fn apply_impulse(&mut self, impulse: Vec3, relative_position: Vec3) {
        if self.is_static() {
            return;
        }
        self.linear_velocity += impulse * self.linear_factor * self.inverse_mass;
        self.apply_angular_impulse(relative_position.cross(impulse * self.linear_factor));
    }

    pub fn apply_angular_impulse(&mut self, impulse: Vec3) {
        self.angular_velocity += (self.inverse_inertia * impulse) * self.angular_factor;
    }

    /// Inverse effective mass along `direction` applied at `relative_position`.
    fn linear_response(&self, direction: Vec3, relative_position: Vec3) -> f32 {
        let angular = (self.inverse_inertia * relative_position.cross(direction)).cross(relative_position);
        self.inverse_mass + direction.dot(angular)
    }

    fn angular_response(&self, axis: Vec3) -> f32 {
        axis.dot(self.inverse_inertia * axis)
    }
}

/// Contact prepared for the solver with combined material values.
#[derive(Debug, Clone, Copy)]
pub struct SolverContact {
    pub contact: Contact,
    pub index_a: usize,
    pub index_b: usize,
    pub restitution: f32,
    pub friction: f32,
}

/// Joint prepared for the solver.
#[derive(Debug, Clone)]
pub struct SolverJoint {
    pub joint: Joint,
    pub index_a: usize,
    pub index_b: usize,
    pub applied_impulse: f32,
}

fn pair_mut(bodies: &mut [SolverBody], a: usize, b: usize) -> Option<(&mut SolverBody, &mut SolverBody)> {
    if a == b || a >= bodies.len() || b >= bodies.len() {
        return None;
    }
    if a < b {
        let (head, tail) = bodies.split_at_mut(b);
        Some((&mut head[a], &mut tail[0]))
    } else {
        let (head, tail) = bodies.split_at_mut(a);
        Some((&mut tail[0], &mut head[b]))
    }
}

/// Sequential impulse solver for contacts and six-axis joints.
#[derive(Debug, Clone)]
pub struct ConstraintSolver {
    pub iterations: u32,
    pub bias_factor: f32,
    pub slop: f32,
}

impl ConstraintSolver {
    pub fn new(iterations: u32) -> Self {
        Self {
            iterations: iterations.max(1),
            bias_factor: crate::config::POSITION_CORRECTION_PERCENT,
            slop: crate::config::POSITION_CORRECTION_SLOP,
        }
    }

    /// Spring forces are applied once per step, before the iterative pass.
    pub fn apply_springs(&self, bodies: &mut [SolverBody], joints: &[SolverJoint], dt: f32) {
        for joint in joints.iter().filter(|joint| joint.joint.enabled) {
            let Some((body_a, body_b)) = pair_mut(bodies, joint.index_a, joint.index_b) else {
                continue;
            };
            let (world_a, world_b) = joint.joint.world_frames(&body_a.pose, Some(&body_b.pose));
            let (linear, angular) = joint.joint.relative_offsets(&body_a.pose, Some(&body_b.pose));
            let r_a = world_a.position - body_a.pose.position;
            let r_b = world_b.position - body_b.pose.position;

            for (i, axis) in joint.joint.axes.iter().enumerate() {
                if !axis.spring_enabled {
                    continue;
                }
                let direction = world_a.rotation * Vec3::AXES[i % 3];
                if i < 3 {
                    let relative = (body_b.velocity_at(r_b) - body_a.velocity_at(r_a)).dot(direction);
                    let force = -axis.stiffness * (linear[i] - axis.equilibrium_point) - axis.damping * relative;
                    let impulse = direction * force * dt;
                    body_a.apply_impulse(-impulse, r_a);
                    body_b.apply_impulse(impulse, r_b);
                } else {
                    let relative = (body_b.angular_velocity - body_a.angular_velocity).dot(direction);
                    let torque =
                        -axis.stiffness * (angular[i - 3] - axis.equilibrium_point) - axis.damping * relative;
                    let impulse = direction * torque * dt;
                    body_a.apply_angular_impulse(-impulse);
                    body_b.apply_angular_impulse(impulse);
                }
            }
        }
    }

    pub fn solve(
        &self,
        bodies: &mut [SolverBody],
        joints: &mut [SolverJoint],
        contacts: &mut [SolverContact],
        dt: f32,
    ) {
        for joint in joints.iter_mut() {
            joint.applied_impulse = 0.0;
        }
        for _ in 0..self.iterations {
            for joint in joints.iter_mut().filter(|joint| joint.joint.enabled) {
                if let Some((body_a, body_b)) = pair_mut(bodies, joint.index_a, joint.index_b) {
                    let impulse = self.resolve_joint(body_a, body_b, &joint.joint, dt);
                    joint.applied_impulse += impulse;
                }
            }
            for contact in contacts.iter_mut() {
                if let Some((body_a, body_b)) = pair_mut(bodies, contact.index_a, contact.index_b) {
                    self.resolve_contact(body_a, body_b, contact, dt);
                }
            }
        }
        for joint in joints.iter_mut() {
            if joint.joint.enabled && joint.applied_impulse > joint.joint.breaking_impulse_threshold {
                log::debug!(
                    "joint broke with impulse {:.3} over threshold {:.3}",
                    joint.applied_impulse,
                    joint.joint.breaking_impulse_threshold
                );
                joint.joint.enabled = false;
            }
        }
    }

    /// Returns the magnitude of impulse applied this iteration.
    fn resolve_joint(&self, body_a: &mut SolverBody, body_b: &mut SolverBody, joint: &Joint, dt: f32) -> f32 {
        if body_a.is_static() && body_b.is_static() {
            return 0.0;
        }
        let (world_a, world_b) = joint.world_frames(&body_a.pose, Some(&body_b.pose));
        let (linear, angular) = joint.relative_offsets(&body_a.pose, Some(&body_b.pose));
        let r_a = world_a.position - body_a.pose.position;
        let r_b = world_b.position - body_b.pose.position;
        let mut total = 0.0;

        for (i, axis) in joint.linear_axes().iter().enumerate() {
            let direction = world_a.rotation * Vec3::AXES[i];
            let k = body_a.linear_response(direction, r_a) + body_b.linear_response(direction, r_b);
            if k <= f32::EPSILON {
                continue;
            }
            let relative = (body_b.velocity_at(r_b) - body_a.velocity_at(r_a)).dot(direction);
            let Some(lambda) = self.axis_impulse(axis, linear[i], relative, k, dt) else {
                continue;
            };
            let impulse = direction * lambda;
            body_a.apply_impulse(-impulse, r_a);
            body_b.apply_impulse(impulse, r_b);
            total += lambda.abs();
        }

        for (i, axis) in joint.angular_axes().iter().enumerate() {
            let direction = world_a.rotation * Vec3::AXES[i];
            let k = body_a.angular_response(direction) + body_b.angular_response(direction);
            if k <= f32::EPSILON {
                continue;
            }
            let relative = (body_b.angular_velocity - body_a.angular_velocity).dot(direction);
            let Some(lambda) = self.axis_impulse(axis, angular[i], relative, k, dt) else {
                continue;
            };
            body_a.apply_angular_impulse(-direction * lambda);
            body_b.apply_angular_impulse(direction * lambda);
            total += lambda.abs();
        }
        total
    }

    /// Impulse along one axis from its limit, motor and servo settings.
    fn axis_impulse(&self, axis: &JointAxis, position: f32, relative: f32, k: f32, dt: f32) -> Option<f32> {
        if axis.is_locked() {
            let error = position - axis.lower;
            return Some(-(relative + self.bias_factor * error / dt) / k);
        }
        if !axis.is_free() {
            if position < axis.lower {
                let error = position - axis.lower;
                let lambda = -(relative * (1.0 + axis.bounce) + self.bias_factor * error / dt) / k;
                return Some(lambda.max(0.0));
            }
            if position > axis.upper {
                let error = position - axis.upper;
                let lambda = -(relative * (1.0 + axis.bounce) + self.bias_factor * error / dt) / k;
                return Some(lambda.min(0.0));
            }
        }
        if axis.motor_enabled {
            let target = if axis.servo_enabled {
                let speed = axis.target_velocity.abs();
                ((axis.servo_target - position) / dt).clamp(-speed, speed)
            } else {
                axis.target_velocity
            };
            let limit = axis.max_motor_force * dt;
            return Some(((target - relative) / k).clamp(-limit, limit));
        }
        None
    }

    fn resolve_contact(&self, body_a: &mut SolverBody, body_b: &mut SolverBody, contact: &mut SolverContact, dt: f32) {
        if body_a.is_static() && body_b.is_static() {
            return;
        }
        let normal = contact.contact.normal;
        let point = contact.contact.point;
        let r_a = point - body_a.pose.position;
        let r_b = point - body_b.pose.position;
        let relative_velocity = body_b.velocity_at(r_b) - body_a.velocity_at(r_a);
        let velocity_along_normal = relative_velocity.dot(normal);
        if velocity_along_normal >= 0.0 {
            return;
        }

        let k = body_a.linear_response(normal, r_a) + body_b.linear_response(normal, r_b) + 1e-6;
        let bias = self.bias_factor * (contact.contact.depth - self.slop).max(0.0) / dt;
        let impulse_magnitude = -(velocity_along_normal * (1.0 + contact.restitution) - bias) / k;

        let accumulated = (contact.contact.accumulated_normal_impulse + impulse_magnitude).max(0.0);
        let delta = accumulated - contact.contact.accumulated_normal_impulse;
        contact.contact.accumulated_normal_impulse = accumulated;

        let impulse = normal * delta;
        body_a.apply_impulse(-impulse, r_a);
        body_b.apply_impulse(impulse, r_b);

        // Coulomb friction bounded by the accumulated normal impulse.
        let relative_velocity = body_b.velocity_at(r_b) - body_a.velocity_at(r_a);
        let tangent_velocity = relative_velocity - normal * relative_velocity.dot(normal);
        let speed = tangent_velocity.length();
        if speed <= 1e-6 {
            return;
        }
        let tangent = tangent_velocity / speed;
        let k_t = body_a.linear_response(tangent, r_a) + body_b.linear_response(tangent, r_b) + 1e-6;
        let friction_impulse = (speed / k_t).min(contact.friction * accumulated);
        let impulse = -tangent * friction_impulse;
        body_a.apply_impulse(-impulse, r_a);
        body_b.apply_impulse(impulse, r_b);
    }

    /// Pushes penetrating bodies apart directly, split by inverse mass.
    pub fn correct_positions(&self, bodies: &mut [SolverBody], contacts: &[SolverContact]) {
        for contact in contacts {
            let Some((body_a, body_b)) = pair_mut(bodies, contact.index_a, contact.index_b) else {
                continue;
            };
            let total_inverse_mass = body_a.inverse_mass + body_b.inverse_mass;
            if total_inverse_mass <= 1e-6 {
                continue;
            }
            let correction = (contact.contact.depth - self.slop).max(0.0) * self.bias_factor;
            let impulse = contact.contact.normal * (correction / total_inverse_mass);
            body_a.pose.position -= impulse * body_a.inverse_mass * body_a.linear_factor;
            body_b.pose.position += impulse * body_b.inverse_mass * body_b.linear_factor;
        }
    }
}
