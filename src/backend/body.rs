use std::sync::Arc;

use bitflags::bitflags;
use glam::{Mat3, Vec3};
use serde::{Deserialize, Serialize};

use crate::backend::shape::CollisionShape;
use crate::backend::soft::SoftBody;
use crate::backend::Pose;
use crate::config::{DEFAULT_ANGULAR_SLEEPING_THRESHOLD, DEFAULT_LINEAR_SLEEPING_THRESHOLD};
use crate::utils::math::Aabb;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct CollisionFlags: u32 {
        const STATIC = 1;
        const KINEMATIC = 1 << 1;
        /// Contacts are detected and reported but never resolved.
        const NO_CONTACT_RESPONSE = 1 << 2;
        /// Contacts involving this body are reported to the step callback.
        const CUSTOM_MATERIAL_CALLBACK = 1 << 3;
    }
}

/// Sleep state of a collision object. Raw values are 1..=5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ActivationState {
    Active = 1,
    IslandSleeping = 2,
    WantsDeactivation = 3,
    DisableDeactivation = 4,
    DisableSimulation = 5,
}

impl ActivationState {
    /// Clamps out-of-range values into 1..=5.
    pub fn from_raw(value: i32) -> Self {
        match value.clamp(1, 5) {
            1 => ActivationState::Active,
            2 => ActivationState::IslandSleeping,
            3 => ActivationState::WantsDeactivation,
            4 => ActivationState::DisableDeactivation,
            _ => ActivationState::DisableSimulation,
        }
    }

    pub fn raw(self) -> i32 {
        self as i32
    }
}

#[derive(Debug, Clone)]
pub struct RigidBody {
    pub shape: Arc<CollisionShape>,
    pub pose: Pose,
    pub linear_velocity: Vec3,
    pub angular_velocity: Vec3,
    pub total_force: Vec3,
    pub total_torque: Vec3,
    pub linear_factor: Vec3,
    pub angular_factor: Vec3,
    pub linear_damping: f32,
    pub angular_damping: f32,
    pub linear_sleeping_threshold: f32,
    pub angular_sleeping_threshold: f32,
    mass: f32,
    inverse_mass: f32,
    local_inertia: Vec3,
    inverse_inertia_local: Vec3,
}

impl RigidBody {
    pub fn new(shape: Arc<CollisionShape>, mass: f32, pose: Pose) -> Self {
        let inertia = shape.calculate_local_inertia(mass);
        let mut body = Self {
            shape,
            pose,
            linear_velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            total_force: Vec3::ZERO,
            total_torque: Vec3::ZERO,
            linear_factor: Vec3::ONE,
            angular_factor: Vec3::ONE,
            linear_damping: 0.0,
            angular_damping: 0.0,
            linear_sleeping_threshold: DEFAULT_LINEAR_SLEEPING_THRESHOLD,
            angular_sleeping_threshold: DEFAULT_ANGULAR_SLEEPING_THRESHOLD,
            mass: 0.0,
            inverse_mass: 0.0,
            local_inertia: Vec3::ZERO,
            inverse_inertia_local: Vec3::ZERO,
        };
        body.set_mass_props(mass, inertia);
        body
    }

    /// A zero mass makes the body immovable.
    pub fn set_mass_props(&mut self, mass: f32, local_inertia: Vec3) {
        self.mass = mass.max(0.0);
        self.inverse_mass = if self.mass <= f32::EPSILON {
            0.0
        } else {
            1.0 / self.mass
        };
        self.local_inertia = local_inertia;
        self.inverse_inertia_local = Vec3::select(
            local_inertia.cmpgt(Vec3::splat(f32::EPSILON)),
            local_inertia.recip(),
            Vec3::ZERO,
        );
    }

    pub fn mass(&self) -> f32 {
        self.mass
    }

    pub fn inverse_mass(&self) -> f32 {
        self.inverse_mass
    }

    pub fn local_inertia(&self) -> Vec3 {
        self.local_inertia
    }

    pub fn inverse_inertia_world(&self) -> Mat3 {
        let rotation = Mat3::from_quat(self.pose.rotation);
        rotation * Mat3::from_diagonal(self.inverse_inertia_local) * rotation.transpose()
    }

    pub fn velocity_at(&self, relative_position: Vec3) -> Vec3 {
        self.linear_velocity + self.angular_velocity.cross(relative_position)
    }

    pub fn apply_central_force(&mut self, force: Vec3) {
        self.total_force += force * self.linear_factor;
    }

    pub fn apply_torque(&mut self, torque: Vec3) {
        self.total_torque += torque * self.angular_factor;
    }

    /// `relative_position` is measured from the center of mass in world orientation.
    pub fn apply_force(&mut self, force: Vec3, relative_position: Vec3) {
        self.apply_central_force(force);
        self.apply_torque(relative_position.cross(force * self.linear_factor));
    }

    pub fn apply_central_impulse(&mut self, impulse: Vec3) {
        self.linear_velocity += impulse * self.linear_factor * self.inverse_mass;
    }

    pub fn apply_torque_impulse(&mut self, torque: Vec3) {
        self.angular_velocity += self.inverse_inertia_world() * torque * self.angular_factor;
    }

    pub fn apply_impulse(&mut self, impulse: Vec3, relative_position: Vec3) {
        if self.inverse_mass == 0.0 {
            return;
        }
        self.apply_central_impulse(impulse);
        self.apply_torque_impulse(relative_position.cross(impulse * self.linear_factor));
    }

    pub fn clear_forces(&mut self) {
        self.total_force = Vec3::ZERO;
        self.total_torque = Vec3::ZERO;
    }
}

#[derive(Debug, Clone)]
pub enum BodyKind {
    Rigid(RigidBody),
    Soft(SoftBody),
}

/// A body as stored by the backend: common collision state plus the rigid or soft payload.
#[derive(Debug, Clone)]
pub struct CollisionObject {
    /// Opaque back reference to the owning bridge object.
    pub user_data: u64,
    pub flags: CollisionFlags,
    pub friction: f32,
    pub restitution: f32,
    pub activation_state: ActivationState,
    pub deactivation_time: f32,
    pub ccd_motion_threshold: f32,
    pub ccd_swept_sphere_radius: f32,
    pub body: BodyKind,
}

impl CollisionObject {
    pub fn rigid(body: RigidBody) -> Self {
        Self::with_body(BodyKind::Rigid(body))
    }

    pub fn soft(body: SoftBody) -> Self {
        Self::with_body(BodyKind::Soft(body))
    }

    fn with_body(body: BodyKind) -> Self {
        Self {
            user_data: 0,
            flags: CollisionFlags::empty(),
            friction: 0.5,
            restitution: 0.0,
            activation_state: ActivationState::Active,
            deactivation_time: 0.0,
            ccd_motion_threshold: f32::MAX,
            ccd_swept_sphere_radius: 0.0,
            body,
        }
    }

    pub fn as_rigid(&self) -> Option<&RigidBody> {
        match &self.body {
            BodyKind::Rigid(body) => Some(body),
            BodyKind::Soft(_) => None,
        }
    }

    pub fn as_rigid_mut(&mut self) -> Option<&mut RigidBody> {
        match &mut self.body {
            BodyKind::Rigid(body) => Some(body),
            BodyKind::Soft(_) => None,
        }
    }

    pub fn as_soft(&self) -> Option<&SoftBody> {
        match &self.body {
            BodyKind::Soft(body) => Some(body),
            BodyKind::Rigid(_) => None,
        }
    }

    pub fn as_soft_mut(&mut self) -> Option<&mut SoftBody> {
        match &mut self.body {
            BodyKind::Soft(body) => Some(body),
            BodyKind::Rigid(_) => None,
        }
    }

    pub fn pose(&self) -> Pose {
        match &self.body {
            BodyKind::Rigid(body) => body.pose,
            BodyKind::Soft(body) => body.pose,
        }
    }

    pub fn aabb(&self) -> Aabb {
        match &self.body {
            BodyKind::Rigid(body) => body.shape.aabb(&body.pose),
            BodyKind::Soft(body) => body.aabb(),
        }
    }

    pub fn is_static_or_kinematic(&self) -> bool {
        if self
            .flags
            .intersects(CollisionFlags::STATIC | CollisionFlags::KINEMATIC)
        {
            return true;
        }
        self.as_rigid()
            .is_some_and(|body| body.inverse_mass() == 0.0)
    }

    pub fn is_kinematic(&self) -> bool {
        self.flags.contains(CollisionFlags::KINEMATIC)
    }

    pub fn has_contact_response(&self) -> bool {
        !self.flags.contains(CollisionFlags::NO_CONTACT_RESPONSE)
    }

    pub fn is_active(&self) -> bool {
        !matches!(
            self.activation_state,
            ActivationState::IslandSleeping | ActivationState::DisableSimulation
        )
    }

    /// Wakes the body unless deactivation was switched off; `force` always wakes.
    pub fn activate(&mut self, force: bool) {
        let locked = matches!(
            self.activation_state,
            ActivationState::DisableDeactivation | ActivationState::DisableSimulation
        );
        if force || !locked {
            if !locked {
                self.activation_state = ActivationState::Active;
            }
            self.deactivation_time = 0.0;
        }
    }

    /// Does not override the two "disable" states.
    pub fn set_activation_state(&mut self, state: ActivationState) {
        if !matches!(
            self.activation_state,
            ActivationState::DisableDeactivation | ActivationState::DisableSimulation
        ) {
            self.activation_state = state;
        }
    }

    pub fn force_activation_state(&mut self, state: ActivationState) {
        self.activation_state = state;
    }

    pub fn ccd_enabled(&self) -> bool {
        self.ccd_motion_threshold < f32::MAX
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sphere_body(mass: f32) -> RigidBody {
        RigidBody::new(Arc::new(CollisionShape::sphere(1.0)), mass, Pose::IDENTITY)
    }

    #[test]
    fn activation_state_is_clamped() {
        assert_eq!(ActivationState::from_raw(0), ActivationState::Active);
        assert_eq!(ActivationState::from_raw(9), ActivationState::DisableSimulation);
        assert_eq!(ActivationState::from_raw(4).raw(), 4);
    }

    #[test]
    fn zero_mass_ignores_impulses() {
        let mut body = sphere_body(0.0);
        body.apply_impulse(Vec3::X, Vec3::Y);
        assert_eq!(body.linear_velocity, Vec3::ZERO);
    }

    #[test]
    fn linear_factor_masks_impulse() {
        let mut body = sphere_body(2.0);
        body.linear_factor = Vec3::new(1.0, 0.0, 1.0);
        body.apply_central_impulse(Vec3::new(2.0, 2.0, 0.0));
        assert_relative_eq!(body.linear_velocity.x, 1.0);
        assert_eq!(body.linear_velocity.y, 0.0);
    }

    #[test]
    fn disabled_deactivation_survives_plain_state_changes() {
        let mut object = CollisionObject::rigid(sphere_body(1.0));
        object.force_activation_state(ActivationState::DisableDeactivation);
        object.set_activation_state(ActivationState::IslandSleeping);
        assert_eq!(object.activation_state, ActivationState::DisableDeactivation);
    }
}
