use glam::Vec3;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::backend::basic::narrowphase::closest_point_on_triangle;
use crate::backend::shape::{CollisionShape, ShapeKind};
use crate::backend::soft::{AeroModel, SoftBody, SoftNode};
use crate::backend::{BodyHandle, Pose};

/// Rigid body snapshot the soft-body pass collides against.
#[derive(Debug, Clone)]
pub struct RigidProxy<'a> {
    pub handle: BodyHandle,
    pub shape: &'a CollisionShape,
    pub pose: Pose,
    pub friction: f32,
    pub kinematic: bool,
}

/// Deepest node contact against one rigid proxy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SoftContact {
    pub rigid: BodyHandle,
    pub node: usize,
    /// Point on the rigid surface.
    pub point: Vec3,
    /// Points from the rigid body toward the node.
    pub normal: Vec3,
    pub depth: f32,
}

/// Position-based soft body integrator.
pub struct SoftSolver;

impl SoftSolver {
    pub fn step(
        body: &mut SoftBody,
        gravity: Vec3,
        dt: f32,
        rigid: &[RigidProxy<'_>],
    ) -> Vec<SoftContact> {
        if dt <= 0.0 || body.nodes.is_empty() {
            return Vec::new();
        }
        Self::predict(body, gravity, dt);
        for _ in 0..body.config.position_iterations.max(1) {
            Self::solve_links(body);
        }
        Self::match_pose(body);
        Self::conserve_volume(body);
        let contacts = Self::collide(body, rigid);

        for node in &mut body.nodes {
            node.velocity = (node.position - node.previous_position) / dt;
            node.force = Vec3::ZERO;
        }
        body.update_normals();
        contacts
    }

    fn predict(body: &mut SoftBody, gravity: Vec3, dt: f32) {
        let config = body.config;
        let acceleration = gravity * config.gravity_factor;
        let damping = (1.0 - config.damping * dt).max(0.0);
        let wind = config.wind_velocity;
        let aero = config.aero_model;
        let pressure = config.pressure;

        let advance = |node: &mut SoftNode| {
            node.previous_position = node.position;
            if node.inverse_mass <= 0.0 {
                node.velocity = Vec3::ZERO;
                return;
            }
            let mut force = node.force;
            if pressure != 0.0 {
                force += node.normal * pressure;
            }
            if wind != Vec3::ZERO {
                let relative = wind - node.velocity;
                let along = relative.dot(node.normal);
                force += match aero {
                    AeroModel::VertexPoint => relative,
                    AeroModel::VertexOneSided => node.normal * along.max(0.0),
                    _ => node.normal * along,
                };
            }
            node.velocity += (acceleration + force * node.inverse_mass) * dt;
            node.velocity *= damping;
            node.position += node.velocity * dt * config.velocity_factor;
        };

        #[cfg(feature = "parallel")]
        body.nodes.par_iter_mut().for_each(advance);
        #[cfg(not(feature = "parallel"))]
        body.nodes.iter_mut().for_each(advance);
    }

    fn solve_links(body: &mut SoftBody) {
        let scale = body.config.rest_length_scale;
        for link in &body.links {
            let [a, b] = link.nodes;
            let (wa, wb) = (body.nodes[a].inverse_mass, body.nodes[b].inverse_mass);
            let total = wa + wb;
            if total <= 0.0 {
                continue;
            }
            let delta = body.nodes[b].position - body.nodes[a].position;
            let length = delta.length();
            if length <= 1e-9 {
                continue;
            }
            let error = (length - link.rest_length * scale) / length;
            let correction = delta * error * link.stiffness;
            body.nodes[a].position += correction * (wa / total);
            body.nodes[b].position -= correction * (wb / total);
        }
    }

    fn match_pose(body: &mut SoftBody) {
        let stiffness = body.config.pose_matching.clamp(0.0, 1.0);
        if stiffness <= 0.0 || body.rest_offsets().len() != body.nodes.len() {
            return;
        }
        let rotation = body.estimate_rotation();
        let center = body.center_of_mass();
        let mut targets = std::mem::take(body.scratch_mut());
        targets.clear();
        targets.extend(body.rest_offsets().iter().map(|offset| center + rotation * *offset));
        for (node, target) in body.nodes.iter_mut().zip(&targets) {
            if node.inverse_mass > 0.0 {
                node.position += (*target - node.position) * stiffness;
            }
        }
        *body.scratch_mut() = targets;
    }

    /// Moves nodes along their normals to recover the rest volume of closed meshes.
    fn conserve_volume(body: &mut SoftBody) {
        let stiffness = body.config.volume_conservation;
        let rest = body.rest_volume();
        if stiffness <= 0.0 || rest.abs() <= 1e-9 {
            return;
        }
        body.update_normals();
        let area: f32 = body
            .faces
            .iter()
            .map(|face| {
                let [a, b, c] = face.nodes;
                let pa = body.nodes[a].position;
                (body.nodes[b].position - pa).cross(body.nodes[c].position - pa).length() * 0.5
            })
            .sum();
        if area <= 1e-9 {
            return;
        }
        let push = (rest - body.volume()) / area * stiffness.min(1.0);
        for node in &mut body.nodes {
            if node.inverse_mass > 0.0 {
                node.position += node.normal * push;
            }
        }
    }

    fn collide(body: &mut SoftBody, rigid: &[RigidProxy<'_>]) -> Vec<SoftContact> {
        let config = body.config;
        let bounds = body.aabb();
        let mut contacts = Vec::new();

        for proxy in rigid {
            if !proxy.shape.aabb(&proxy.pose).intersects(&bounds) {
                continue;
            }
            let hardness = if proxy.kinematic {
                config.kinetic_contact_hardness
            } else {
                config.rigid_contact_hardness
            }
            .clamp(0.0, 1.0);
            let friction = (config.dynamic_friction * proxy.friction).clamp(0.0, 1.0);
            let mut deepest: Option<SoftContact> = None;

            for (index, node) in body.nodes.iter_mut().enumerate() {
                if node.inverse_mass <= 0.0 {
                    continue;
                }
                let Some((point, normal, depth)) = Self::penetration(proxy, node.position) else {
                    continue;
                };
                node.position += normal * depth * hardness;
                let moved = node.position - node.previous_position;
                let tangential = moved - normal * moved.dot(normal);
                node.position -= tangential * friction;

                if deepest.is_none_or(|current| depth > current.depth) {
                    deepest = Some(SoftContact {
                        rigid: proxy.handle,
                        node: index,
                        point,
                        normal,
                        depth,
                    });
                }
            }
            contacts.extend(deepest);
        }
        contacts
    }

    /// Deepest node penetration without moving any node.
    pub fn detect(body: &SoftBody, proxy: &RigidProxy<'_>) -> Option<SoftContact> {
        body.nodes
            .iter()
            .enumerate()
            .filter_map(|(index, node)| {
                Self::penetration(proxy, node.position).map(|(point, normal, depth)| SoftContact {
                    rigid: proxy.handle,
                    node: index,
                    point,
                    normal,
                    depth,
                })
            })
            .max_by(|a, b| a.depth.total_cmp(&b.depth))
    }

    /// Surface point, outward normal and depth of a point inside a rigid shape.
    fn penetration(proxy: &RigidProxy<'_>, point: Vec3) -> Option<(Vec3, Vec3, f32)> {
        let shape = proxy.shape;
        let scaling = shape.local_scaling();
        let margin = shape.margin();
        let local = proxy.pose.inverse_transform_point(point);
        let to_world = |surface: Vec3, normal: Vec3, depth: f32| {
            Some((
                proxy.pose.transform_point(surface),
                proxy.pose.rotation * normal,
                depth,
            ))
        };

        match shape.kind() {
            ShapeKind::Sphere { radius } => {
                let radius = radius * scaling.x + margin;
                let distance = local.length();
                if distance >= radius {
                    return None;
                }
                let normal = if distance > 1e-6 { local / distance } else { Vec3::Y };
                to_world(normal * radius, normal, radius - distance)
            }
            ShapeKind::Capsule { radius, height } => {
                let radius = radius * scaling.x.max(scaling.z) + margin;
                let half = 0.5 * height * scaling.y;
                let axis_point = Vec3::new(0.0, local.y.clamp(-half, half), 0.0);
                let offset = local - axis_point;
                let distance = offset.length();
                if distance >= radius {
                    return None;
                }
                let normal = if distance > 1e-6 { offset / distance } else { Vec3::X };
                to_world(axis_point + normal * radius, normal, radius - distance)
            }
            ShapeKind::Box { half_extents } => {
                let extents = *half_extents * scaling + Vec3::splat(margin);
                Self::inside_box(local, Vec3::ZERO, extents)
                    .and_then(|(surface, normal, depth)| to_world(surface, normal, depth))
            }
            ShapeKind::ConvexHull { .. } => {
                let bounds = shape.local_aabb();
                Self::inside_box(local, bounds.center(), bounds.half_extents() + Vec3::splat(margin))
                    .and_then(|(surface, normal, depth)| to_world(surface, normal, depth))
            }
            ShapeKind::TriangleMesh { .. } => {
                let (surface, distance, normal) = shape
                    .world_triangles(&proxy.pose)
                    .iter()
                    .map(|triangle| {
                        let closest = closest_point_on_triangle(point, triangle);
                        let face = (triangle[1] - triangle[0])
                            .cross(triangle[2] - triangle[0])
                            .normalize_or_zero();
                        (closest, closest.distance(point), face)
                    })
                    .min_by(|a, b| a.1.total_cmp(&b.1))?;
                if distance >= margin.max(1e-4) {
                    return None;
                }
                let side = if (point - surface).dot(normal) >= 0.0 { normal } else { -normal };
                Some((surface, side, margin - distance))
            }
        }
    }

    fn inside_box(local: Vec3, center: Vec3, extents: Vec3) -> Option<(Vec3, Vec3, f32)> {
        let offset = local - center;
        let gaps = extents - offset.abs();
        if gaps.min_element() <= 0.0 {
            return None;
        }
        let axis = if gaps.x <= gaps.y && gaps.x <= gaps.z {
            0
        } else if gaps.y <= gaps.z {
            1
        } else {
            2
        };
        let mut normal = Vec3::ZERO;
        normal[axis] = if offset[axis] >= 0.0 { 1.0 } else { -1.0 };
        let mut surface = local;
        surface[axis] = center[axis] + normal[axis] * extents[axis];
        Some((surface, normal, gaps[axis]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn cloth() -> SoftBody {
        let mut body = SoftBody::from_tri_mesh(
            &[
                Vec3::new(-0.5, 1.0, -0.5),
                Vec3::new(0.5, 1.0, -0.5),
                Vec3::new(0.5, 1.0, 0.5),
                Vec3::new(-0.5, 1.0, 0.5),
            ],
            &[0, 2, 1, 0, 3, 2],
        );
        body.set_total_mass(1.0);
        body
    }

    #[test]
    fn nodes_fall_under_gravity() {
        let mut body = cloth();
        SoftSolver::step(&mut body, Vec3::new(0.0, -10.0, 0.0), 0.1, &[]);
        for node in &body.nodes {
            assert!(node.position.y < 1.0);
            assert!(node.velocity.y < 0.0);
        }
    }

    #[test]
    fn links_keep_rest_length() {
        let mut body = cloth();
        body.config.position_iterations = 4;
        body.nodes[0].position.x -= 0.2;
        SoftSolver::step(&mut body, Vec3::ZERO, 1.0 / 60.0, &[]);
        let link = body.links[0];
        let [a, b] = link.nodes;
        let length = body.nodes[a].position.distance(body.nodes[b].position);
        assert!((length - link.rest_length).abs() < 0.1);
    }

    #[test]
    fn nodes_are_pushed_out_of_a_box() {
        let mut body = cloth();
        let ground = CollisionShape::cuboid(Vec3::new(5.0, 0.5, 5.0));
        let proxy = RigidProxy {
            handle: BodyHandle::new(0, 0),
            shape: &ground,
            pose: Pose::from_translation(Vec3::new(0.0, 0.6, 0.0)),
            friction: 0.5,
            kinematic: false,
        };
        let contacts = SoftSolver::step(&mut body, Vec3::ZERO, 1.0 / 60.0, &[proxy]);
        assert_eq!(contacts.len(), 1);
        assert_relative_eq!(contacts[0].normal.y, 1.0, epsilon = 1e-4);
        for node in &body.nodes {
            assert!(node.position.y >= 1.1 + ground.margin() - 1e-3);
        }
    }
}
