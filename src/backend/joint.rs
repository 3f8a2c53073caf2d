use std::f32::consts::PI;

use glam::{Mat3, Quat, Vec3};

use crate::backend::{BodyHandle, Pose};

/// Limits, spring, motor and servo settings of one degree of freedom.
///
/// `lower == upper` locks the axis, `lower < upper` limits it, `lower > upper` frees it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointAxis {
    pub lower: f32,
    pub upper: f32,
    pub target_velocity: f32,
    pub bounce: f32,
    pub spring_enabled: bool,
    pub stiffness: f32,
    pub damping: f32,
    pub equilibrium_point: f32,
    pub motor_enabled: bool,
    pub max_motor_force: f32,
    pub servo_enabled: bool,
    pub servo_target: f32,
}

impl Default for JointAxis {
    fn default() -> Self {
        Self {
            lower: 0.0,
            upper: 0.0,
            target_velocity: 0.0,
            bounce: 0.0,
            spring_enabled: false,
            stiffness: 0.0,
            damping: 0.0,
            equilibrium_point: 0.0,
            motor_enabled: false,
            max_motor_force: 0.0,
            servo_enabled: false,
            servo_target: 0.0,
        }
    }
}

impl JointAxis {
    pub fn is_locked(&self) -> bool {
        self.lower == self.upper
    }

    pub fn is_free(&self) -> bool {
        self.lower > self.upper
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum JointKind {
    Fixed,
    /// Suspension along `axis1` (frame Z), steering and rolling around `axis2` (frame X).
    Hinge2 {
        anchor: Vec3,
        axis1: Vec3,
        axis2: Vec3,
    },
    Generic6DofSpring,
}

/// A constraint between a body and another body, or between a body and the world.
///
/// Axes 0..3 are linear (frame X, Y, Z), axes 3..6 angular.
#[derive(Debug, Clone, PartialEq)]
pub struct Joint {
    pub body_a: BodyHandle,
    pub body_b: Option<BodyHandle>,
    /// Attachment frame in A's local space.
    pub frame_a: Pose,
    /// Attachment frame in B's local space, or in world space without B.
    pub frame_b: Pose,
    pub kind: JointKind,
    pub axes: [JointAxis; 6],
    pub breaking_impulse_threshold: f32,
    pub enabled: bool,
}

impl Joint {
    fn with_kind(
        kind: JointKind,
        body_a: BodyHandle,
        body_b: Option<BodyHandle>,
        frame_a: Pose,
        frame_b: Pose,
    ) -> Self {
        Self {
            body_a,
            body_b,
            frame_a,
            frame_b,
            kind,
            axes: [JointAxis::default(); 6],
            breaking_impulse_threshold: f32::MAX,
            enabled: true,
        }
    }

    /// Every axis locked.
    pub fn fixed(
        body_a: BodyHandle,
        body_b: Option<BodyHandle>,
        frame_a: Pose,
        frame_b: Pose,
    ) -> Self {
        Self::with_kind(JointKind::Fixed, body_a, body_b, frame_a, frame_b)
    }

    /// Six configurable axes, all locked until limits are set.
    pub fn generic_spring(
        body_a: BodyHandle,
        body_b: Option<BodyHandle>,
        frame_a: Pose,
        frame_b: Pose,
    ) -> Self {
        Self::with_kind(JointKind::Generic6DofSpring, body_a, body_b, frame_a, frame_b)
    }

    /// Two-axis hinge anchored at a world point, given the current world poses of both sides.
    pub fn hinge2(
        body_a: BodyHandle,
        pose_a: Pose,
        body_b: Option<(BodyHandle, Pose)>,
        anchor: Vec3,
        axis1: Vec3,
        axis2: Vec3,
    ) -> Self {
        let z = axis1.try_normalize().unwrap_or(Vec3::Y);
        let mut x = axis2.try_normalize().unwrap_or(Vec3::X);
        if x.cross(z).length_squared() < 1e-6 {
            x = z.any_orthonormal_vector();
        }
        let y = z.cross(x).normalize();
        let x = y.cross(z);
        let world_frame = Pose::new(anchor, Quat::from_mat3(&Mat3::from_cols(x, y, z)));

        let frame_a = pose_a.inverse() * world_frame;
        let frame_b = match body_b {
            Some((_, pose_b)) => pose_b.inverse() * world_frame,
            None => world_frame,
        };
        let mut joint = Self::with_kind(
            JointKind::Hinge2 { anchor, axis1, axis2 },
            body_a,
            body_b.map(|(handle, _)| handle),
            frame_a,
            frame_b,
        );

        joint.set_linear_lower_limit(Vec3::new(0.0, 0.0, -1.0));
        joint.set_linear_upper_limit(Vec3::new(0.0, 0.0, 1.0));
        joint.set_angular_lower_limit(Vec3::new(1.0, 0.0, -PI * 0.25));
        joint.set_angular_upper_limit(Vec3::new(-1.0, 0.0, PI * 0.25));
        joint.axes[2].spring_enabled = true;
        joint.axes[2].stiffness = PI * PI * 4.0;
        joint.axes[2].damping = 0.01;
        joint
    }

    pub fn bodies(&self) -> (BodyHandle, Option<BodyHandle>) {
        (self.body_a, self.body_b)
    }

    pub fn linear_axes(&self) -> &[JointAxis] {
        &self.axes[..3]
    }

    pub fn angular_axes(&self) -> &[JointAxis] {
        &self.axes[3..]
    }

    fn gather(&self, angular: bool, read: impl Fn(&JointAxis) -> f32) -> Vec3 {
        let base = if angular { 3 } else { 0 };
        Vec3::new(
            read(&self.axes[base]),
            read(&self.axes[base + 1]),
            read(&self.axes[base + 2]),
        )
    }

    fn scatter(&mut self, angular: bool, values: Vec3, write: impl Fn(&mut JointAxis, f32)) {
        let base = if angular { 3 } else { 0 };
        for i in 0..3 {
            write(&mut self.axes[base + i], values[i]);
        }
    }

    pub fn linear_lower_limit(&self) -> Vec3 {
        self.gather(false, |axis| axis.lower)
    }

    pub fn linear_upper_limit(&self) -> Vec3 {
        self.gather(false, |axis| axis.upper)
    }

    pub fn angular_lower_limit(&self) -> Vec3 {
        self.gather(true, |axis| axis.lower)
    }

    pub fn angular_upper_limit(&self) -> Vec3 {
        self.gather(true, |axis| axis.upper)
    }

    pub fn set_linear_lower_limit(&mut self, value: Vec3) {
        self.scatter(false, value, |axis, v| axis.lower = v);
    }

    pub fn set_linear_upper_limit(&mut self, value: Vec3) {
        self.scatter(false, value, |axis, v| axis.upper = v);
    }

    pub fn set_angular_lower_limit(&mut self, value: Vec3) {
        self.scatter(true, value, |axis, v| axis.lower = v);
    }

    pub fn set_angular_upper_limit(&mut self, value: Vec3) {
        self.scatter(true, value, |axis, v| axis.upper = v);
    }

    pub fn set_target_velocity(&mut self, angular: bool, value: Vec3) {
        self.scatter(angular, value, |axis, v| axis.target_velocity = v);
    }

    pub fn set_bounce(&mut self, angular: bool, value: Vec3) {
        self.scatter(angular, value, |axis, v| axis.bounce = v);
    }

    pub fn set_stiffness(&mut self, angular: bool, value: Vec3) {
        self.scatter(angular, value, |axis, v| axis.stiffness = v);
    }

    pub fn set_damping(&mut self, angular: bool, value: Vec3) {
        self.scatter(angular, value, |axis, v| axis.damping = v);
    }

    pub fn set_max_motor_force(&mut self, angular: bool, value: Vec3) {
        self.scatter(angular, value, |axis, v| axis.max_motor_force = v);
    }

    pub fn set_servo_target(&mut self, angular: bool, value: Vec3) {
        self.scatter(angular, value, |axis, v| axis.servo_target = v);
    }

    pub fn enable_spring(&mut self, index: usize, enabled: bool) {
        if let Some(axis) = self.axes.get_mut(index) {
            axis.spring_enabled = enabled;
        }
    }

    pub fn enable_motor(&mut self, index: usize, enabled: bool) {
        if let Some(axis) = self.axes.get_mut(index) {
            axis.motor_enabled = enabled;
        }
    }

    pub fn set_servo(&mut self, index: usize, enabled: bool) {
        if let Some(axis) = self.axes.get_mut(index) {
            axis.servo_enabled = enabled;
        }
    }

    /// Frame placements in world space for the given body poses.
    pub fn world_frames(&self, pose_a: &Pose, pose_b: Option<&Pose>) -> (Pose, Pose) {
        let world_a = *pose_a * self.frame_a;
        let world_b = match pose_b {
            Some(pose) => *pose * self.frame_b,
            None => self.frame_b,
        };
        (world_a, world_b)
    }

    /// Offset of B's frame relative to A's frame: translation along frame A's axes, then
    /// small-angle rotation vector.
    pub fn relative_offsets(&self, pose_a: &Pose, pose_b: Option<&Pose>) -> (Vec3, Vec3) {
        let (world_a, world_b) = self.world_frames(pose_a, pose_b);
        let linear = world_a.rotation.inverse() * (world_b.position - world_a.position);
        let relative = (world_a.rotation.inverse() * world_b.rotation).normalize();
        let relative = if relative.w < 0.0 { -relative } else { relative };
        let (axis, angle) = relative.to_axis_angle();
        (linear, axis * angle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_vectors_round_trip_through_axes() {
        let mut joint = Joint::generic_spring(BodyHandle::new(0, 0), None, Pose::IDENTITY, Pose::IDENTITY);
        joint.set_linear_lower_limit(Vec3::new(-1.0, -2.0, -3.0));
        joint.set_angular_upper_limit(Vec3::new(0.1, 0.2, 0.3));
        assert_eq!(joint.linear_lower_limit(), Vec3::new(-1.0, -2.0, -3.0));
        assert_eq!(joint.axes[5].upper, 0.3);
        assert!(joint.axes[0].lower < joint.axes[0].upper);
    }

    #[test]
    fn hinge_frames_meet_at_anchor() {
        let pose_a = Pose::from_translation(Vec3::new(0.0, 2.0, 0.0));
        let joint = Joint::hinge2(
            BodyHandle::new(0, 0),
            pose_a,
            None,
            Vec3::new(1.0, 2.0, 0.0),
            Vec3::Y,
            Vec3::X,
        );
        let (linear, angular) = joint.relative_offsets(&pose_a, None);
        assert!(linear.length() < 1e-5);
        assert!(angular.length() < 1e-5);
    }
}
