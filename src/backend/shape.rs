use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

use crate::backend::Pose;
use crate::config::DEFAULT_COLLISION_MARGIN;
use crate::utils::math::Aabb;

/// Geometry of a collision shape in its unscaled local frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ShapeKind {
    Sphere { radius: f32 },
    Box { half_extents: Vec3 },
    /// Y-aligned; `height` is the length of the cylindrical part.
    Capsule { radius: f32, height: f32 },
    ConvexHull { points: Vec<Vec3> },
    /// Concave triangle soup, only usable on static or kinematic bodies.
    TriangleMesh { vertices: Vec<Vec3>, indices: Vec<u32> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollisionShape {
    kind: ShapeKind,
    local_scaling: Vec3,
    margin: f32,
}

impl CollisionShape {
    pub fn new(kind: ShapeKind) -> Self {
        Self {
            kind,
            local_scaling: Vec3::ONE,
            margin: DEFAULT_COLLISION_MARGIN,
        }
    }

    pub fn sphere(radius: f32) -> Self {
        Self::new(ShapeKind::Sphere { radius })
    }

    pub fn cuboid(half_extents: Vec3) -> Self {
        Self::new(ShapeKind::Box { half_extents })
    }

    pub fn kind(&self) -> &ShapeKind {
        &self.kind
    }

    pub fn local_scaling(&self) -> Vec3 {
        self.local_scaling
    }

    /// Spheres only scale uniformly, by the largest axis.
    pub fn set_local_scaling(&mut self, scaling: Vec3) {
        let scaling = scaling.abs();
        self.local_scaling = match self.kind {
            ShapeKind::Sphere { .. } => Vec3::splat(scaling.max_element()),
            _ => scaling,
        };
    }

    pub fn margin(&self) -> f32 {
        self.margin
    }

    pub fn set_margin(&mut self, margin: f32) {
        self.margin = margin.max(0.0);
    }

    pub fn is_concave(&self) -> bool {
        matches!(self.kind, ShapeKind::TriangleMesh { .. })
    }

    /// Diagonal of the local inertia tensor for `mass`.
    pub fn calculate_local_inertia(&self, mass: f32) -> Vec3 {
        let s = self.local_scaling;
        match &self.kind {
            ShapeKind::Sphere { radius } => {
                let r = radius * s.x;
                Vec3::splat(0.4 * mass * r * r)
            }
            ShapeKind::Box { half_extents } => box_inertia(*half_extents * s, mass),
            ShapeKind::Capsule { radius, height } => {
                let r = radius * s.x.max(s.z);
                let h = height * s.y;
                let cylinder_mass = mass * 0.6;
                let sphere_mass = (mass - cylinder_mass) / 2.0;
                let lateral = (1.0 / 12.0) * cylinder_mass * (3.0 * r * r + h * h);
                Vec3::new(lateral, 0.5 * cylinder_mass * r * r, lateral)
                    + Vec3::splat(0.4 * sphere_mass * r * r)
            }
            ShapeKind::ConvexHull { .. } => box_inertia(self.local_aabb().half_extents(), mass),
            ShapeKind::TriangleMesh { .. } => Vec3::ZERO,
        }
    }

    /// Farthest point of the scaled shape along `direction`, in the shape's local frame.
    pub fn local_support(&self, direction: Vec3) -> Vec3 {
        let s = self.local_scaling;
        match &self.kind {
            ShapeKind::Sphere { radius } => direction.normalize_or_zero() * (radius * s.x),
            ShapeKind::Box { half_extents } => {
                let he = *half_extents * s;
                Vec3::new(
                    if direction.x >= 0.0 { he.x } else { -he.x },
                    if direction.y >= 0.0 { he.y } else { -he.y },
                    if direction.z >= 0.0 { he.z } else { -he.z },
                )
            }
            ShapeKind::Capsule { radius, height } => {
                let cap = Vec3::Y * 0.5 * height * s.y;
                let radial = radius * s.x.max(s.z);
                let dir = direction.normalize_or_zero();
                if dir.y >= 0.0 {
                    cap + dir * radial
                } else {
                    -cap + dir * radial
                }
            }
            ShapeKind::ConvexHull { points } => farthest(points, s, direction),
            ShapeKind::TriangleMesh { vertices, .. } => farthest(vertices, s, direction),
        }
    }

    /// Support point in world space for a shape placed at `pose`.
    pub fn support(&self, pose: &Pose, direction: Vec3) -> Vec3 {
        let local_dir = pose.rotation.inverse() * direction;
        pose.transform_point(self.local_support(local_dir))
    }

    pub fn local_aabb(&self) -> Aabb {
        let s = self.local_scaling;
        match &self.kind {
            ShapeKind::Sphere { radius } => {
                Aabb::from_center_half_extents(Vec3::ZERO, Vec3::splat(radius * s.x))
            }
            ShapeKind::Box { half_extents } => {
                Aabb::from_center_half_extents(Vec3::ZERO, *half_extents * s)
            }
            ShapeKind::Capsule { radius, height } => {
                let radial = radius * s.x.max(s.z);
                Aabb::from_center_half_extents(
                    Vec3::ZERO,
                    Vec3::new(radial, 0.5 * height * s.y + radial, radial),
                )
            }
            ShapeKind::ConvexHull { points } => {
                Aabb::from_points(points.iter().map(|p| *p * s)).unwrap_or_default()
            }
            ShapeKind::TriangleMesh { vertices, .. } => {
                Aabb::from_points(vertices.iter().map(|p| *p * s)).unwrap_or_default()
            }
        }
    }

    /// World bounds including the collision margin.
    pub fn aabb(&self, pose: &Pose) -> Aabb {
        self.local_aabb()
            .transformed(&pose.to_matrix())
            .expanded(self.margin)
    }

    /// Scaled triangles in world space. Empty for primitive shapes.
    pub fn world_triangles(&self, pose: &Pose) -> Vec<[Vec3; 3]> {
        let ShapeKind::TriangleMesh { vertices, indices } = &self.kind else {
            return Vec::new();
        };
        let matrix = pose.to_matrix() * Mat4::from_scale(self.local_scaling);
        indices
            .chunks_exact(3)
            .filter_map(|tri| {
                let a = vertices.get(tri[0] as usize)?;
                let b = vertices.get(tri[1] as usize)?;
                let c = vertices.get(tri[2] as usize)?;
                Some([
                    matrix.transform_point3(*a),
                    matrix.transform_point3(*b),
                    matrix.transform_point3(*c),
                ])
            })
            .collect()
    }
}

fn box_inertia(half_extents: Vec3, mass: f32) -> Vec3 {
    let l = half_extents * 2.0;
    let factor = mass / 12.0;
    Vec3::new(
        factor * (l.y * l.y + l.z * l.z),
        factor * (l.x * l.x + l.z * l.z),
        factor * (l.x * l.x + l.y * l.y),
    )
}

fn farthest(points: &[Vec3], scaling: Vec3, direction: Vec3) -> Vec3 {
    let mut best = Vec3::ZERO;
    let mut best_dot = f32::MIN;
    for point in points {
        let scaled = *point * scaling;
        let dot = scaled.dot(direction);
        if dot > best_dot {
            best_dot = dot;
            best = scaled;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn sphere_scaling_is_uniform() {
        let mut shape = CollisionShape::sphere(1.0);
        shape.set_local_scaling(Vec3::new(1.0, -3.0, 2.0));
        assert_eq!(shape.local_scaling(), Vec3::splat(3.0));
        assert_relative_eq!(shape.local_aabb().max.x, 3.0);
    }

    #[test]
    fn box_inertia_uses_scaled_extents() {
        let mut shape = CollisionShape::cuboid(Vec3::splat(0.5));
        let unit = shape.calculate_local_inertia(12.0);
        assert_relative_eq!(unit.x, 2.0);
        shape.set_local_scaling(Vec3::splat(2.0));
        assert_relative_eq!(shape.calculate_local_inertia(12.0).x, 8.0);
    }

    #[test]
    fn mesh_is_concave_and_massless_inertia() {
        let shape = CollisionShape::new(ShapeKind::TriangleMesh {
            vertices: vec![Vec3::ZERO, Vec3::X, Vec3::Y],
            indices: vec![0, 1, 2],
        });
        assert!(shape.is_concave());
        assert_eq!(shape.calculate_local_inertia(3.0), Vec3::ZERO);
        assert_eq!(shape.world_triangles(&Pose::IDENTITY).len(), 1);
    }
}
