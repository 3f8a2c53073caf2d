//! Native physics solver seam.
//!
//! The bridge only talks to the simulation through [`PhysicsBackend`]. Bodies and joints are
//! plain value types handed to the backend, which owns them and returns stable handles.
//! [`basic::BasicWorld`] is the in-crate implementation.

pub mod basic;
pub mod body;
pub mod joint;
pub mod shape;
pub mod soft;

use std::ops::Mul;

use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::utils::allocator::Handle;

pub use body::{ActivationState, BodyKind, CollisionFlags, CollisionObject, RigidBody};
pub use joint::{Joint, JointAxis, JointKind};
pub use shape::{CollisionShape, ShapeKind};
pub use soft::{AeroModel, SoftBody, SoftBodyConfig, SoftFace, SoftLink, SoftNode};

pub type BodyHandle = Handle<CollisionObject>;
pub type JointHandle = Handle<Joint>;

/// Rigid placement without scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Pose {
    pub const IDENTITY: Pose = Pose {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
    };

    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }

    pub fn from_translation(position: Vec3) -> Self {
        Self::new(position, Quat::IDENTITY)
    }

    pub fn inverse(&self) -> Self {
        let rotation = self.rotation.inverse();
        Self {
            position: rotation * -self.position,
            rotation,
        }
    }

    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.position + self.rotation * point
    }

    pub fn inverse_transform_point(&self, point: Vec3) -> Vec3 {
        self.rotation.inverse() * (point - self.position)
    }

    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.rotation, self.position)
    }

    pub fn approx_eq(&self, other: &Pose, epsilon: f32) -> bool {
        self.position.abs_diff_eq(other.position, epsilon)
            && self.rotation.abs_diff_eq(other.rotation, epsilon)
    }
}

impl Mul for Pose {
    type Output = Pose;

    fn mul(self, rhs: Pose) -> Pose {
        Pose {
            position: self.transform_point(rhs.position),
            rotation: (self.rotation * rhs.rotation).normalize(),
        }
    }
}

/// Group/mask pair deciding which bodies may touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CollisionFilter {
    pub group: i32,
    pub mask: i32,
}

impl Default for CollisionFilter {
    fn default() -> Self {
        Self::ALL
    }
}

impl CollisionFilter {
    pub const ALL: CollisionFilter = CollisionFilter { group: -1, mask: -1 };

    pub fn new(group: i32, mask: i32) -> Self {
        Self { group, mask }
    }

    pub fn accepts(&self, other: &CollisionFilter) -> bool {
        (self.group & other.mask) != 0 && (other.group & self.mask) != 0
    }
}

/// One contact point reported by a step or a contact query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactPoint {
    pub body_a: BodyHandle,
    pub body_b: BodyHandle,
    pub user_data_a: u64,
    pub user_data_b: u64,
    pub position_world_on_a: Vec3,
    pub position_world_on_b: Vec3,
    pub local_point_a: Vec3,
    pub local_point_b: Vec3,
    pub normal_world_on_b: Vec3,
    /// Negative while penetrating.
    pub distance: f32,
}

impl ContactPoint {
    /// Same contact seen from the other body.
    pub fn swapped(&self) -> Self {
        Self {
            body_a: self.body_b,
            body_b: self.body_a,
            user_data_a: self.user_data_b,
            user_data_b: self.user_data_a,
            position_world_on_a: self.position_world_on_b,
            position_world_on_b: self.position_world_on_a,
            local_point_a: self.local_point_b,
            local_point_b: self.local_point_a,
            normal_world_on_b: -self.normal_world_on_b,
            distance: self.distance,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub body: BodyHandle,
    pub user_data: u64,
    pub point: Vec3,
    pub normal: Vec3,
    /// Hit distance as a fraction of the ray length.
    pub fraction: f32,
}

/// Line sink for the backend's debug rendering.
pub trait DebugDraw {
    fn draw_line(&mut self, from: Vec3, to: Vec3, color: Vec3);
}

/// Operations the bridge needs from a rigid and soft body solver.
pub trait PhysicsBackend {
    fn name(&self) -> &'static str;

    /// `true` for the soft-body capable world variant.
    fn is_deformable(&self) -> bool;

    fn gravity(&self) -> Vec3;
    fn set_gravity(&mut self, gravity: Vec3);
    fn set_solver_iterations(&mut self, iterations: u32);

    /// Takes ownership of a body. Soft bodies are refused by a rigid-only world.
    fn create_body(&mut self, object: CollisionObject) -> Option<BodyHandle>;
    fn destroy_body(&mut self, body: BodyHandle) -> Option<CollisionObject>;
    fn add_body(&mut self, body: BodyHandle, filter: CollisionFilter) -> bool;
    fn remove_body(&mut self, body: BodyHandle) -> bool;
    fn is_in_world(&self, body: BodyHandle) -> bool;
    fn body(&self, body: BodyHandle) -> Option<&CollisionObject>;
    fn body_mut(&mut self, body: BodyHandle) -> Option<&mut CollisionObject>;
    fn body_count(&self) -> usize;

    fn create_joint(&mut self, joint: Joint) -> Option<JointHandle>;
    fn destroy_joint(&mut self, joint: JointHandle) -> Option<Joint>;
    fn add_joint(&mut self, joint: JointHandle, disable_collisions_between_linked: bool) -> bool;
    fn remove_joint(&mut self, joint: JointHandle) -> bool;
    fn is_joint_in_world(&self, joint: JointHandle) -> bool;
    fn joint(&self, joint: JointHandle) -> Option<&Joint>;
    fn joint_mut(&mut self, joint: JointHandle) -> Option<&mut Joint>;
    /// Uses the current offset along `axis` (0..6) as the spring rest position.
    fn set_joint_equilibrium_point(&mut self, joint: JointHandle, axis: usize) -> bool;

    /// Advances by `dt` using at most `max_sub_steps` steps of `fixed_step`.
    /// Returns the number of sub-steps taken.
    fn step_simulation(
        &mut self,
        dt: f32,
        max_sub_steps: u32,
        fixed_step: f32,
        on_contact: &mut dyn FnMut(&ContactPoint),
    ) -> u32;

    /// Every hit along the segment, nearest first.
    fn ray_test(&self, from: Vec3, to: Vec3, filter: CollisionFilter) -> Vec<RayHit>;
    fn contact_test(&self, body: BodyHandle, on_contact: &mut dyn FnMut(&ContactPoint));
    fn contact_pair_test(
        &self,
        body_a: BodyHandle,
        body_b: BodyHandle,
        on_contact: &mut dyn FnMut(&ContactPoint),
    );

    fn debug_draw(&self, drawer: &mut dyn DebugDraw);

    /// Releases soft-body scratch memory. Only meaningful for the deformable variant.
    fn garbage_collect(&mut self);

    /// Removes and destroys every body and joint.
    fn clear(&mut self);
}
