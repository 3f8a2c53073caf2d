use glam::Vec3;

use crate::backend::shape::{CollisionShape, ShapeKind};
use crate::backend::{BodyHandle, Pose};

/// Contact between two convex features. `normal` points from A toward B and `depth` is the
/// penetration of the bare shapes (negative while still separated by less than the margins).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contact {
    pub body_a: BodyHandle,
    pub body_b: BodyHandle,
    pub point: Vec3,
    pub normal: Vec3,
    pub depth: f32,
    pub accumulated_normal_impulse: f32,
}

impl Contact {
    pub fn point_on_a(&self) -> Vec3 {
        self.point + self.normal * (self.depth * 0.5)
    }

    pub fn point_on_b(&self) -> Vec3 {
        self.point - self.normal * (self.depth * 0.5)
    }
}

/// Anything GJK can query for its farthest point along a direction.
pub trait SupportMap {
    fn support(&self, direction: Vec3) -> Vec3;
    fn center(&self) -> Vec3;
}

/// A convex shape at a pose, inflated by its margin.
pub struct PlacedShape<'a> {
    pub shape: &'a CollisionShape,
    pub pose: Pose,
}

impl SupportMap for PlacedShape<'_> {
    fn support(&self, direction: Vec3) -> Vec3 {
        self.shape.support(&self.pose, direction)
            + direction.normalize_or_zero() * self.shape.margin()
    }

    fn center(&self) -> Vec3 {
        self.pose.position
    }
}

pub struct Triangle(pub [Vec3; 3]);

impl SupportMap for Triangle {
    fn support(&self, direction: Vec3) -> Vec3 {
        let mut best = self.0[0];
        for vertex in &self.0[1..] {
            if vertex.dot(direction) > best.dot(direction) {
                best = *vertex;
            }
        }
        best
    }

    fn center(&self) -> Vec3 {
        (self.0[0] + self.0[1] + self.0[2]) / 3.0
    }
}

/// Gilbert-Johnson-Keerthi (GJK) intersection test with EPA penetration depth.
pub struct GjkAlgorithm;

impl GjkAlgorithm {
    const MAX_ITERATIONS: usize = 32;
    const EPSILON: f32 = 1e-6;

    /// Returns `(contact point, normal A to B, depth)` of the overlapping support maps.
    pub fn intersect(a: &dyn SupportMap, b: &dyn SupportMap) -> Option<(Vec3, Vec3, f32)> {
        let mut simplex: Vec<Vec3> = Vec::new();
        let mut direction = b.center() - a.center();
        if direction.length_squared() < Self::EPSILON {
            direction = Vec3::X;
        }

        for _ in 0..Self::MAX_ITERATIONS {
            let point = a.support(direction) - b.support(-direction);
            if point.dot(direction) < 0.0 {
                return None;
            }

            simplex.push(point);
            if Self::contains_origin(&mut simplex, &mut direction) {
                let (depth, mut normal) = EpaAlgorithm::compute_penetration(&simplex, a, b);

                let relative = b.center() - a.center();
                if normal.dot(relative) < 0.0 {
                    normal = -normal;
                }
                // touching cases can leave EPA with a sideways normal
                let center_dist_sq = relative.length_squared();
                if center_dist_sq > Self::EPSILON {
                    let center_dir = relative / center_dist_sq.sqrt();
                    if normal.dot(center_dir) < 0.5 && depth < 0.01 {
                        normal = center_dir;
                    }
                }

                let point = a.support(normal) - normal * depth * 0.5;
                return Some((point, normal, depth));
            }
        }
        None
    }

    fn contains_origin(simplex: &mut Vec<Vec3>, direction: &mut Vec3) -> bool {
        match simplex.len() {
            1 => {
                *direction = -simplex[0];
                false
            }
            2 => {
                let a = simplex[1];
                let b = simplex[0];
                let ab = b - a;
                let ao = -a;

                let dir = ab.cross(ao).cross(ab);
                if dir.length_squared() < Self::EPSILON {
                    // origin on AB
                    let axis = if ab.x.abs() < 0.1 { Vec3::X } else { Vec3::Y };
                    *direction = ab.cross(axis);
                } else {
                    *direction = dir;
                }
                false
            }
            3 => {
                let a = simplex[2];
                let b = simplex[1];
                let c = simplex[0];
                let ab = b - a;
                let ac = c - a;
                let ao = -a;
                let abc = ab.cross(ac);

                if abc.cross(ac).dot(ao) > 0.0 {
                    simplex.remove(1);
                    *direction = ac.cross(ao).cross(ac);
                } else if ab.cross(abc).dot(ao) > 0.0 {
                    simplex.remove(0);
                    *direction = ab.cross(ao).cross(ab);
                } else if abc.length_squared() < Self::EPSILON {
                    *direction = Vec3::Y;
                } else if abc.dot(ao) > 0.0 {
                    *direction = abc;
                } else {
                    *direction = -abc;
                }
                false
            }
            4 => {
                let a = simplex[3];
                let b = simplex[2];
                let c = simplex[1];
                let d = simplex[0];
                let ab = b - a;
                let ac = c - a;
                let ad = d - a;
                let ao = -a;
                let abc = ab.cross(ac);
                let acd = ac.cross(ad);
                let adb = ad.cross(ab);

                if abc.dot(ao) > 0.0 {
                    simplex.remove(0);
                    *direction = abc;
                    false
                } else if acd.dot(ao) > 0.0 {
                    simplex.remove(2);
                    *direction = acd;
                    false
                } else if adb.dot(ao) > 0.0 {
                    simplex.remove(1);
                    *direction = adb;
                    false
                } else {
                    true
                }
            }
            _ => false,
        }
    }
}

/// Expanding Polytope Algorithm for penetration depth calculation.
struct EpaAlgorithm;

impl EpaAlgorithm {
    const MAX_ITERATIONS: usize = 32;
    const EPSILON: f32 = 1e-6;

    fn fallback(a: &dyn SupportMap, b: &dyn SupportMap, depth: f32) -> (f32, Vec3) {
        let normal = (b.center() - a.center()).normalize_or_zero();
        (depth, if normal == Vec3::ZERO { Vec3::X } else { normal })
    }

    fn compute_penetration(
        simplex: &[Vec3],
        a: &dyn SupportMap,
        b: &dyn SupportMap,
    ) -> (f32, Vec3) {
        if simplex.len() < 4 {
            let depth = simplex
                .iter()
                .map(|p| p.length())
                .min_by(f32::total_cmp)
                .unwrap_or(0.01);
            return Self::fallback(a, b, depth);
        }

        let mut polytope = vec![simplex[0], simplex[1], simplex[2], simplex[3]];
        let mut faces = Self::build_initial_faces(&polytope);

        for _ in 0..Self::MAX_ITERATIONS {
            let (min_dist, normal) = Self::find_closest_face(&polytope, &faces);
            if min_dist >= f32::MAX * 0.5 {
                return Self::fallback(a, b, 0.01);
            }
            if min_dist < Self::EPSILON {
                return (Self::EPSILON, normal);
            }

            let support = a.support(normal) - b.support(-normal);
            if support.dot(normal) - min_dist < Self::EPSILON {
                return (min_dist, normal);
            }
            Self::expand_polytope(&mut polytope, &mut faces, support);
        }

        let (min_dist, normal) = Self::find_closest_face(&polytope, &faces);
        if min_dist >= f32::MAX * 0.5 {
            Self::fallback(a, b, 0.01)
        } else {
            (min_dist, normal)
        }
    }

    fn build_initial_faces(polytope: &[Vec3]) -> Vec<(usize, usize, usize)> {
        let mut faces = vec![(0, 1, 2), (0, 2, 3), (0, 3, 1), (1, 3, 2)];
        // normals point away from the origin
        for face in &mut faces {
            let ab = polytope[face.1] - polytope[face.0];
            let ac = polytope[face.2] - polytope[face.0];
            if polytope[face.0].dot(ab.cross(ac)) < 0.0 {
                std::mem::swap(&mut face.1, &mut face.2);
            }
        }
        faces
    }

    fn find_closest_face(polytope: &[Vec3], faces: &[(usize, usize, usize)]) -> (f32, Vec3) {
        let mut min_dist = f32::MAX;
        let mut min_normal = Vec3::ZERO;
        for &(a, b, c) in faces {
            let normal = (polytope[b] - polytope[a])
                .cross(polytope[c] - polytope[a])
                .normalize_or_zero();
            if normal == Vec3::ZERO {
                continue;
            }
            let dist = polytope[a].dot(normal);
            if dist < min_dist {
                min_dist = dist;
                min_normal = normal;
            }
        }
        (min_dist, min_normal)
    }

    fn expand_polytope(
        polytope: &mut Vec<Vec3>,
        faces: &mut Vec<(usize, usize, usize)>,
        support: Vec3,
    ) {
        let new_index = polytope.len();
        polytope.push(support);

        let mut edges = Vec::new();
        let mut i = 0;
        while i < faces.len() {
            let (a, b, c) = faces[i];
            let normal = (polytope[b] - polytope[a])
                .cross(polytope[c] - polytope[a])
                .normalize_or_zero();
            if normal.dot(support - polytope[a]) > 0.0 {
                edges.extend([(a, b), (b, c), (c, a)]);
                faces.swap_remove(i);
            } else {
                i += 1;
            }
        }

        let mut boundary: Vec<(usize, usize)> = Vec::new();
        for (u, v) in edges {
            if let Some(position) = boundary.iter().position(|edge| *edge == (v, u)) {
                boundary.remove(position);
            } else {
                boundary.push((u, v));
            }
        }
        faces.extend(boundary.into_iter().map(|(u, v)| (u, v, new_index)));
    }
}

/// Separating axis test for oriented boxes.
pub struct SatAlgorithm;

impl SatAlgorithm {
    /// Returns `(contact point, normal A to B, depth)`.
    pub fn intersect_boxes(
        half_extents_a: Vec3,
        pose_a: &Pose,
        half_extents_b: Vec3,
        pose_b: &Pose,
    ) -> Option<(Vec3, Vec3, f32)> {
        let relative = pose_b.position - pose_a.position;
        let axes_a = [
            pose_a.rotation * Vec3::X,
            pose_a.rotation * Vec3::Y,
            pose_a.rotation * Vec3::Z,
        ];
        let axes_b = [
            pose_b.rotation * Vec3::X,
            pose_b.rotation * Vec3::Y,
            pose_b.rotation * Vec3::Z,
        ];

        let mut test_axes = Vec::with_capacity(15);
        test_axes.extend_from_slice(&axes_a);
        test_axes.extend_from_slice(&axes_b);
        for axis_a in &axes_a {
            for axis_b in &axes_b {
                let axis = axis_a.cross(*axis_b);
                if axis.length_squared() > 1e-6 {
                    test_axes.push(axis.normalize());
                }
            }
        }

        let project = |axes: &[Vec3; 3], he: Vec3, axis: Vec3| {
            axes[0].dot(axis).abs() * he.x
                + axes[1].dot(axis).abs() * he.y
                + axes[2].dot(axis).abs() * he.z
        };

        let mut min_overlap = f32::MAX;
        let mut min_axis = Vec3::ZERO;
        for axis in test_axes {
            let projection = relative.dot(axis);
            let overlap = project(&axes_a, half_extents_a, axis)
                + project(&axes_b, half_extents_b, axis)
                - projection.abs();
            if overlap <= 0.0 {
                return None;
            }
            if overlap < min_overlap {
                min_overlap = overlap;
                min_axis = if projection < 0.0 { -axis } else { axis };
            }
        }

        let normal = min_axis.normalize_or_zero();
        let reach = project(&axes_a, half_extents_a, normal);
        let point = pose_a.position + normal * (reach - min_overlap * 0.5);
        Some((point, normal, min_overlap))
    }
}

/// Dispatches shape pairs to the matching algorithm.
pub struct NarrowPhase;

impl NarrowPhase {
    pub fn collide(
        body_a: BodyHandle,
        shape_a: &CollisionShape,
        pose_a: &Pose,
        body_b: BodyHandle,
        shape_b: &CollisionShape,
        pose_b: &Pose,
    ) -> Option<Contact> {
        let margins = shape_a.margin() + shape_b.margin();
        let make = |(point, normal, inflated_depth): (Vec3, Vec3, f32)| Contact {
            body_a,
            body_b,
            point,
            normal,
            depth: inflated_depth - margins,
            accumulated_normal_impulse: 0.0,
        };

        match (shape_a.kind(), shape_b.kind()) {
            (ShapeKind::TriangleMesh { .. }, ShapeKind::TriangleMesh { .. }) => None,
            (ShapeKind::TriangleMesh { .. }, _) => {
                let convex = PlacedShape {
                    shape: shape_b,
                    pose: *pose_b,
                };
                Self::mesh_versus_convex(shape_a, pose_a, &convex).map(|(p, n, d)| {
                    make((p, -n, d + shape_a.margin()))
                })
            }
            (_, ShapeKind::TriangleMesh { .. }) => {
                let convex = PlacedShape {
                    shape: shape_a,
                    pose: *pose_a,
                };
                Self::mesh_versus_convex(shape_b, pose_b, &convex)
                    .map(|(p, n, d)| make((p, n, d + shape_b.margin())))
            }
            (
                ShapeKind::Box { half_extents: he_a },
                ShapeKind::Box { half_extents: he_b },
            ) => SatAlgorithm::intersect_boxes(
                *he_a * shape_a.local_scaling() + Vec3::splat(shape_a.margin()),
                pose_a,
                *he_b * shape_b.local_scaling() + Vec3::splat(shape_b.margin()),
                pose_b,
            )
            .map(make),
            _ => GjkAlgorithm::intersect(
                &PlacedShape {
                    shape: shape_a,
                    pose: *pose_a,
                },
                &PlacedShape {
                    shape: shape_b,
                    pose: *pose_b,
                },
            )
            .map(make),
        }
    }

    /// Deepest triangle contact; the normal points from the convex toward the mesh.
    fn mesh_versus_convex(
        mesh: &CollisionShape,
        mesh_pose: &Pose,
        convex: &PlacedShape<'_>,
    ) -> Option<(Vec3, Vec3, f32)> {
        let bounds = convex.shape.aabb(&convex.pose);
        mesh.world_triangles(mesh_pose)
            .into_iter()
            .filter(|triangle| {
                crate::utils::math::Aabb::from_points(triangle.iter().copied())
                    .is_some_and(|aabb| aabb.intersects(&bounds))
            })
            .filter_map(|triangle| match convex.shape.kind() {
                ShapeKind::Sphere { radius } => sphere_triangle(
                    convex.pose.position,
                    radius * convex.shape.local_scaling().x + convex.shape.margin(),
                    &triangle,
                ),
                _ => GjkAlgorithm::intersect(convex, &Triangle(triangle)),
            })
            .max_by(|a, b| a.2.total_cmp(&b.2))
    }
}

/// Exact sphere against triangle test; the normal points from the sphere to the triangle.
fn sphere_triangle(center: Vec3, radius: f32, triangle: &[Vec3; 3]) -> Option<(Vec3, Vec3, f32)> {
    let closest = closest_point_on_triangle(center, triangle);
    let offset = closest - center;
    let distance = offset.length();
    if distance >= radius {
        return None;
    }
    let normal = if distance > 1e-6 {
        offset / distance
    } else {
        let face = (triangle[1] - triangle[0])
            .cross(triangle[2] - triangle[0])
            .normalize_or_zero();
        if face == Vec3::ZERO {
            Vec3::NEG_Y
        } else {
            -face
        }
    };
    let depth = radius - distance;
    Some((center + normal * (radius - depth * 0.5), normal, depth))
}

/// Closest point on a triangle (Voronoi region walk).
pub fn closest_point_on_triangle(point: Vec3, triangle: &[Vec3; 3]) -> Vec3 {
    let [a, b, c] = *triangle;
    let ab = b - a;
    let ac = c - a;
    let ap = point - a;
    let d1 = ab.dot(ap);
    let d2 = ac.dot(ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return a;
    }

    let bp = point - b;
    let d3 = ab.dot(bp);
    let d4 = ac.dot(bp);
    if d3 >= 0.0 && d4 <= d3 {
        return b;
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        return a + ab * (d1 / (d1 - d3));
    }

    let cp = point - c;
    let d5 = ab.dot(cp);
    let d6 = ac.dot(cp);
    if d6 >= 0.0 && d5 <= d6 {
        return c;
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        return a + ac * (d2 / (d2 - d6));
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        return b + (c - b) * ((d4 - d3) / ((d4 - d3) + (d5 - d6)));
    }

    let denom = 1.0 / (va + vb + vc);
    a + ab * (vb * denom) + ac * (vc * denom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Quat;

    fn collide_spheres(distance: f32) -> Option<Contact> {
        let mut sphere = CollisionShape::sphere(1.0);
        sphere.set_margin(0.0);
        NarrowPhase::collide(
            BodyHandle::new(0, 0),
            &sphere,
            &Pose::IDENTITY,
            BodyHandle::new(1, 0),
            &sphere,
            &Pose::from_translation(Vec3::new(distance, 0.0, 0.0)),
        )
    }

    #[test]
    fn epa_computes_depth_for_overlapping_spheres() {
        let contact = collide_spheres(1.5).expect("overlapping spheres should collide");
        assert!(
            contact.depth > 0.4 && contact.depth < 0.6,
            "depth was {}",
            contact.depth
        );
        assert!(contact.normal.x > 0.9, "normal was {:?}", contact.normal);
    }

    #[test]
    fn separated_spheres_do_not_collide() {
        assert!(collide_spheres(3.0).is_none());
    }

    #[test]
    fn margins_report_near_contacts_with_negative_depth() {
        let sphere = CollisionShape::sphere(1.0);
        let contact = NarrowPhase::collide(
            BodyHandle::new(0, 0),
            &sphere,
            &Pose::IDENTITY,
            BodyHandle::new(1, 0),
            &sphere,
            &Pose::from_translation(Vec3::new(2.02, 0.0, 0.0)),
        )
        .expect("within margins");
        assert!(contact.depth < 0.0, "depth was {}", contact.depth);
    }

    #[test]
    fn sat_computes_overlap_for_rotated_boxes() {
        let rotated = Pose::new(Vec3::ZERO, Quat::from_rotation_z(45.0f32.to_radians()));
        let (_, normal, depth) = SatAlgorithm::intersect_boxes(
            Vec3::ONE,
            &rotated,
            Vec3::ONE,
            &Pose::from_translation(Vec3::new(2.1, 0.0, 0.0)),
        )
        .expect("rotated boxes should collide");
        assert!(depth > 0.0, "depth was {depth}");
        assert!(normal.x.abs() > 0.9);
    }

    #[test]
    fn sphere_rests_on_triangle_mesh() {
        let ground = CollisionShape::new(ShapeKind::TriangleMesh {
            vertices: vec![
                Vec3::new(-5.0, 0.0, -5.0),
                Vec3::new(5.0, 0.0, -5.0),
                Vec3::new(0.0, 0.0, 5.0),
            ],
            indices: vec![0, 2, 1],
        });
        let ball = CollisionShape::sphere(0.5);
        let contact = NarrowPhase::collide(
            BodyHandle::new(0, 0),
            &ball,
            &Pose::from_translation(Vec3::new(0.0, 0.45, 0.0)),
            BodyHandle::new(1, 0),
            &ground,
            &Pose::IDENTITY,
        )
        .expect("sphere dips into the ground");
        assert!(contact.normal.y < -0.9, "normal was {:?}", contact.normal);
        assert!(contact.depth > 0.0);
    }
}
