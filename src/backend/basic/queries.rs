use glam::Vec3;

use crate::backend::body::{BodyKind, CollisionObject};
use crate::backend::shape::ShapeKind;
use crate::backend::Pose;

/// Ray in world space with a finite length.
#[derive(Debug, Clone, Copy)]
pub struct RaycastQuery {
    pub origin: Vec3,
    pub direction: Vec3,
    pub max_distance: f32,
}

impl RaycastQuery {
    pub fn segment(from: Vec3, to: Vec3) -> Option<Self> {
        let delta = to - from;
        let length = delta.length();
        if length <= f32::EPSILON {
            return None;
        }
        Some(Self {
            origin: from,
            direction: delta / length,
            max_distance: length,
        })
    }

    fn in_local(&self, pose: &Pose) -> Self {
        Self {
            origin: pose.inverse_transform_point(self.origin),
            direction: pose.rotation.inverse() * self.direction,
            max_distance: self.max_distance,
        }
    }

    fn at(&self, distance: f32) -> Vec3 {
        self.origin + self.direction * distance
    }
}

pub struct Raycast;

impl Raycast {
    /// Nearest hit of the ray on one collision object: `(distance, point, normal)`.
    pub fn cast_object(query: &RaycastQuery, object: &CollisionObject) -> Option<(f32, Vec3, Vec3)> {
        match &object.body {
            BodyKind::Rigid(body) => {
                let pose = body.pose;
                let local = query.in_local(&pose);
                let s = body.shape.local_scaling();
                let hit = match body.shape.kind() {
                    ShapeKind::Sphere { radius } => Self::ray_sphere(&local, Vec3::ZERO, radius * s.x)
                        .map(|(t, point)| (t, point, point.normalize_or_zero())),
                    ShapeKind::Box { half_extents } => {
                        Self::ray_aabb(&local, Vec3::ZERO, *half_extents * s)
                    }
                    ShapeKind::Capsule { radius, height } => {
                        Self::ray_capsule(&local, radius * s.x.max(s.z), 0.5 * height * s.y)
                    }
                    ShapeKind::ConvexHull { .. } => {
                        let bounds = body.shape.local_aabb();
                        Self::ray_aabb(&local, bounds.center(), bounds.half_extents())
                    }
                    ShapeKind::TriangleMesh { .. } => {
                        return Self::ray_triangles(query, &body.shape.world_triangles(&pose));
                    }
                }?;
                let (t, point, normal) = hit;
                Some((t, pose.transform_point(point), pose.rotation * normal))
            }
            BodyKind::Soft(body) => {
                let triangles: Vec<[Vec3; 3]> = body
                    .faces
                    .iter()
                    .map(|face| face.nodes.map(|i| body.nodes[i].position))
                    .collect();
                Self::ray_triangles(query, &triangles)
            }
        }
    }

    fn ray_sphere(query: &RaycastQuery, center: Vec3, radius: f32) -> Option<(f32, Vec3)> {
        let oc = query.origin - center;
        let b = oc.dot(query.direction);
        let c = oc.length_squared() - radius * radius;
        let discriminant = b * b - c;
        if discriminant < 0.0 {
            return None;
        }
        let t = -b - discriminant.sqrt();
        if t < 0.0 || t > query.max_distance {
            return None;
        }
        Some((t, query.at(t) - center))
    }

    fn ray_aabb(query: &RaycastQuery, center: Vec3, half_extents: Vec3) -> Option<(f32, Vec3, Vec3)> {
        let mut t_min = 0.0;
        let mut t_max = query.max_distance;
        let mut normal = Vec3::ZERO;

        for i in 0..3 {
            let origin = query.origin[i];
            let dir = query.direction[i];
            let min = center[i] - half_extents[i];
            let max = center[i] + half_extents[i];

            if dir.abs() < 1e-6 {
                if origin < min || origin > max {
                    return None;
                }
            } else {
                let inv_dir = 1.0 / dir;
                let mut t1 = (min - origin) * inv_dir;
                let mut t2 = (max - origin) * inv_dir;
                let mut axis_normal = Vec3::ZERO;
                axis_normal[i] = -dir.signum();

                if t1 > t2 {
                    std::mem::swap(&mut t1, &mut t2);
                }
                if t1 > t_min {
                    t_min = t1;
                    normal = axis_normal;
                }
                t_max = f32::min(t_max, t2);
                if t_min > t_max {
                    return None;
                }
            }
        }

        if normal == Vec3::ZERO {
            // origin starts inside the box
            return None;
        }
        Some((t_min, query.at(t_min), normal))
    }

    /// Y-aligned capsule centred at the origin.
    fn ray_capsule(query: &RaycastQuery, radius: f32, half_height: f32) -> Option<(f32, Vec3, Vec3)> {
        let mut best: Option<(f32, Vec3, Vec3)> = None;
        let mut keep = |candidate: (f32, Vec3, Vec3)| {
            if best.is_none_or(|current| candidate.0 < current.0) {
                best = Some(candidate);
            }
        };

        // cylinder wall
        let o = Vec3::new(query.origin.x, 0.0, query.origin.z);
        let d = Vec3::new(query.direction.x, 0.0, query.direction.z);
        let a = d.length_squared();
        if a > 1e-9 {
            let b = o.dot(d);
            let c = o.length_squared() - radius * radius;
            let discriminant = b * b - a * c;
            if discriminant >= 0.0 {
                let t = (-b - discriminant.sqrt()) / a;
                let point = query.at(t);
                if t >= 0.0 && t <= query.max_distance && point.y.abs() <= half_height {
                    keep((t, point, Vec3::new(point.x, 0.0, point.z).normalize_or_zero()));
                }
            }
        }

        for cap in [Vec3::Y * half_height, Vec3::NEG_Y * half_height] {
            if let Some((t, offset)) = Self::ray_sphere(query, cap, radius) {
                keep((t, query.at(t), offset.normalize_or_zero()));
            }
        }
        best
    }

    /// Möller–Trumbore against each triangle, nearest first.
    fn ray_triangles(query: &RaycastQuery, triangles: &[[Vec3; 3]]) -> Option<(f32, Vec3, Vec3)> {
        triangles
            .iter()
            .filter_map(|[a, b, c]| {
                let e1 = *b - *a;
                let e2 = *c - *a;
                let p = query.direction.cross(e2);
                let det = e1.dot(p);
                if det.abs() < 1e-9 {
                    return None;
                }
                let inv_det = 1.0 / det;
                let s = query.origin - *a;
                let u = s.dot(p) * inv_det;
                if !(0.0..=1.0).contains(&u) {
                    return None;
                }
                let q = s.cross(e1);
                let v = query.direction.dot(q) * inv_det;
                if v < 0.0 || u + v > 1.0 {
                    return None;
                }
                let t = e2.dot(q) * inv_det;
                if t < 0.0 || t > query.max_distance {
                    return None;
                }
                let mut normal = e1.cross(e2).normalize_or_zero();
                if normal.dot(query.direction) > 0.0 {
                    normal = -normal;
                }
                Some((t, query.at(t), normal))
            })
            .min_by(|x, y| x.0.total_cmp(&y.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::body::RigidBody;
    use crate::backend::shape::CollisionShape;
    use approx::assert_relative_eq;
    use glam::Quat;
    use std::sync::Arc;

    fn object(shape: CollisionShape, pose: Pose) -> CollisionObject {
        CollisionObject::rigid(RigidBody::new(Arc::new(shape), 1.0, pose))
    }

    #[test]
    fn ray_hits_sphere_front_face() {
        let sphere = object(CollisionShape::sphere(1.0), Pose::from_translation(Vec3::new(0.0, 0.0, 5.0)));
        let query = RaycastQuery::segment(Vec3::ZERO, Vec3::new(0.0, 0.0, 10.0)).expect("ray");
        let (t, point, normal) = Raycast::cast_object(&query, &sphere).expect("hit");
        assert_relative_eq!(t, 4.0, epsilon = 1e-4);
        assert_relative_eq!(point.z, 4.0, epsilon = 1e-4);
        assert_relative_eq!(normal.z, -1.0, epsilon = 1e-4);
    }

    #[test]
    fn ray_hits_rotated_box() {
        let pose = Pose::new(Vec3::new(5.0, 0.0, 0.0), Quat::from_rotation_y(std::f32::consts::FRAC_PI_2));
        let cube = object(CollisionShape::cuboid(Vec3::new(0.5, 1.0, 2.0)), pose);
        let query = RaycastQuery::segment(Vec3::ZERO, Vec3::new(10.0, 0.0, 0.0)).expect("ray");
        let (t, _, normal) = Raycast::cast_object(&query, &cube).expect("hit");
        assert_relative_eq!(t, 3.0, epsilon = 1e-4);
        assert_relative_eq!(normal.x, -1.0, epsilon = 1e-4);
    }

    #[test]
    fn ray_hits_capsule_wall() {
        let capsule = object(
            CollisionShape::new(ShapeKind::Capsule { radius: 0.5, height: 2.0 }),
            Pose::from_translation(Vec3::new(3.0, 0.0, 0.0)),
        );
        let query = RaycastQuery::segment(Vec3::new(0.0, 0.5, 0.0), Vec3::new(6.0, 0.5, 0.0)).expect("ray");
        let (t, _, normal) = Raycast::cast_object(&query, &capsule).expect("hit");
        assert_relative_eq!(t, 2.5, epsilon = 1e-4);
        assert_relative_eq!(normal.x, -1.0, epsilon = 1e-4);
    }

    #[test]
    fn short_ray_misses() {
        let sphere = object(CollisionShape::sphere(1.0), Pose::from_translation(Vec3::new(0.0, 0.0, 5.0)));
        let query = RaycastQuery::segment(Vec3::ZERO, Vec3::new(0.0, 0.0, 3.0)).expect("ray");
        assert!(Raycast::cast_object(&query, &sphere).is_none());
    }
}
