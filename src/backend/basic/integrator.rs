use glam::Vec3;

use crate::backend::body::RigidBody;
use crate::utils::math::angular_velocity_to_quat;

/// Semi-implicit Euler stepping of rigid bodies.
#[derive(Debug, Clone, Copy)]
pub struct Integrator;

impl Integrator {
    pub fn integrate_velocity(body: &mut RigidBody, gravity: Vec3, dt: f32) {
        if body.inverse_mass() == 0.0 {
            return;
        }
        let acceleration = gravity + body.total_force * body.inverse_mass();
        body.linear_velocity += acceleration * body.linear_factor * dt;
        let angular_acceleration = body.inverse_inertia_world() * body.total_torque;
        body.angular_velocity += angular_acceleration * body.angular_factor * dt;

        body.linear_velocity *= (1.0 - body.linear_damping * dt).max(0.0);
        body.angular_velocity *= (1.0 - body.angular_damping * dt).max(0.0);
    }

    /// Kinematic bodies are placed by their owner, never integrated.
    pub fn integrate_position(body: &mut RigidBody, dt: f32) {
        if body.inverse_mass() == 0.0 {
            return;
        }
        body.pose.position += body.linear_velocity * dt;
        let delta = angular_velocity_to_quat(body.angular_velocity, dt);
        body.pose.rotation = (delta * body.pose.rotation).normalize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::shape::CollisionShape;
    use crate::backend::Pose;
    use approx::assert_relative_eq;
    use std::sync::Arc;

    #[test]
    fn gravity_accumulates_velocity() {
        let mut body = RigidBody::new(Arc::new(CollisionShape::sphere(0.5)), 1.0, Pose::IDENTITY);
        for _ in 0..60 {
            Integrator::integrate_velocity(&mut body, Vec3::new(0.0, -9.81, 0.0), 1.0 / 60.0);
            Integrator::integrate_position(&mut body, 1.0 / 60.0);
        }
        assert_relative_eq!(body.linear_velocity.y, -9.81, epsilon = 1e-3);
        assert!(body.pose.position.y < -4.0);
    }

    #[test]
    fn locked_axis_ignores_gravity() {
        let mut body = RigidBody::new(Arc::new(CollisionShape::sphere(0.5)), 1.0, Pose::IDENTITY);
        body.linear_factor = Vec3::new(1.0, 0.0, 1.0);
        Integrator::integrate_velocity(&mut body, Vec3::new(0.0, -9.81, 0.0), 0.1);
        assert_eq!(body.linear_velocity, Vec3::ZERO);
    }
}
