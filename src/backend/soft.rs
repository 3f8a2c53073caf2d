//! Mass-spring soft body built from a triangle mesh.

use std::collections::{BTreeSet, HashSet};

use glam::{Mat3, Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::backend::Pose;
use crate::utils::math::Aabb;

/// Aerodynamic model. Raw values are 0..=6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum AeroModel {
    VertexPoint = 0,
    VertexTwoSided = 1,
    VertexTwoSidedLiftDrag = 2,
    VertexOneSided = 3,
    FaceTwoSided = 4,
    FaceTwoSidedLiftDrag = 5,
    FaceOneSided = 6,
}

impl AeroModel {
    /// Clamps out-of-range values into 0..=6.
    pub fn from_raw(value: i32) -> Self {
        match value.clamp(0, 6) {
            0 => AeroModel::VertexPoint,
            1 => AeroModel::VertexTwoSided,
            2 => AeroModel::VertexTwoSidedLiftDrag,
            3 => AeroModel::VertexOneSided,
            4 => AeroModel::FaceTwoSided,
            5 => AeroModel::FaceTwoSidedLiftDrag,
            _ => AeroModel::FaceOneSided,
        }
    }

    pub fn raw(self) -> i32 {
        self as i32
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SoftBodyConfig {
    pub damping: f32,
    pub pressure: f32,
    pub volume_conservation: f32,
    pub dynamic_friction: f32,
    pub pose_matching: f32,
    pub repulsion_stiffness: f32,
    pub sleeping_threshold: f32,
    pub rest_length_scale: f32,
    pub gravity_factor: f32,
    pub velocity_factor: f32,
    pub rigid_contact_hardness: f32,
    pub kinetic_contact_hardness: f32,
    pub soft_contact_hardness: f32,
    pub anchor_hardness: f32,
    pub position_iterations: u32,
    pub aero_model: AeroModel,
    pub wind_velocity: Vec3,
    pub self_collision: bool,
    pub soft_soft_collision: bool,
}

impl Default for SoftBodyConfig {
    fn default() -> Self {
        Self {
            damping: 0.4,
            pressure: 0.0,
            volume_conservation: 0.0,
            dynamic_friction: 0.2,
            pose_matching: 0.0,
            repulsion_stiffness: 0.5,
            sleeping_threshold: 0.04,
            rest_length_scale: 1.0,
            gravity_factor: 1.0,
            velocity_factor: 1.0,
            rigid_contact_hardness: 1.0,
            kinetic_contact_hardness: 0.1,
            soft_contact_hardness: 1.0,
            anchor_hardness: 1.0,
            position_iterations: 1,
            aero_model: AeroModel::VertexTwoSided,
            wind_velocity: Vec3::ZERO,
            self_collision: false,
            soft_soft_collision: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SoftNode {
    pub position: Vec3,
    pub previous_position: Vec3,
    pub velocity: Vec3,
    pub force: Vec3,
    pub normal: Vec3,
    pub inverse_mass: f32,
}

impl SoftNode {
    fn new(position: Vec3) -> Self {
        Self {
            position,
            previous_position: position,
            velocity: Vec3::ZERO,
            force: Vec3::ZERO,
            normal: Vec3::ZERO,
            inverse_mass: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SoftLink {
    pub nodes: [usize; 2],
    pub rest_length: f32,
    pub stiffness: f32,
    pub bending: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SoftFace {
    pub nodes: [usize; 3],
    pub normal: Vec3,
}

#[derive(Debug, Clone)]
pub struct SoftBody {
    pub nodes: Vec<SoftNode>,
    pub links: Vec<SoftLink>,
    pub faces: Vec<SoftFace>,
    pub config: SoftBodyConfig,
    /// Rigid frame the body was last placed at.
    pub pose: Pose,
    /// Node offsets from the center of mass, in the frame of `pose`.
    rest_offsets: Vec<Vec3>,
    rest_volume: f32,
    scratch: Vec<Vec3>,
}

impl SoftBody {
    /// Builds nodes, edge links and faces. Out-of-range triangles are skipped.
    pub fn from_tri_mesh(positions: &[Vec3], indices: &[u32]) -> Self {
        let nodes: Vec<SoftNode> = positions.iter().copied().map(SoftNode::new).collect();
        let mut edges = BTreeSet::new();
        let mut faces = Vec::new();

        for triangle in indices.chunks_exact(3) {
            let [a, b, c] = [
                triangle[0] as usize,
                triangle[1] as usize,
                triangle[2] as usize,
            ];
            if a.max(b).max(c) >= nodes.len() || a == b || b == c || a == c {
                continue;
            }
            for (i, j) in [(a, b), (b, c), (c, a)] {
                edges.insert((i.min(j), i.max(j)));
            }
            faces.push(SoftFace {
                nodes: [a, b, c],
                normal: Vec3::ZERO,
            });
        }

        let links = edges
            .into_iter()
            .map(|(a, b)| SoftLink {
                nodes: [a, b],
                rest_length: nodes[a].position.distance(nodes[b].position),
                stiffness: 1.0,
                bending: false,
            })
            .collect();

        let mut body = Self {
            nodes,
            links,
            faces,
            config: SoftBodyConfig::default(),
            pose: Pose::IDENTITY,
            rest_offsets: Vec::new(),
            rest_volume: 0.0,
            scratch: Vec::new(),
        };
        body.update_normals();
        body.capture_rest_shape();
        body
    }

    /// Links every pair of nodes `distance` edges apart that is not linked yet.
    /// Returns the number of links added.
    pub fn generate_bending_constraints(&mut self, distance: u32) -> usize {
        if distance < 2 || self.nodes.is_empty() {
            return 0;
        }
        let count = self.nodes.len();
        let mut adjacency = vec![BTreeSet::new(); count];
        let mut linked = HashSet::new();
        for link in &self.links {
            let [a, b] = link.nodes;
            adjacency[a].insert(b);
            adjacency[b].insert(a);
            linked.insert((a.min(b), a.max(b)));
        }

        let mut added = 0;
        for start in 0..count {
            let mut frontier = BTreeSet::from([start]);
            let mut visited = BTreeSet::from([start]);
            for _ in 0..distance {
                let mut next = BTreeSet::new();
                for node in &frontier {
                    for neighbour in &adjacency[*node] {
                        if visited.insert(*neighbour) {
                            next.insert(*neighbour);
                        }
                    }
                }
                frontier = next;
            }
            for end in frontier {
                let key = (start.min(end), start.max(end));
                if linked.insert(key) {
                    self.links.push(SoftLink {
                        nodes: [key.0, key.1],
                        rest_length: self.nodes[key.0]
                            .position
                            .distance(self.nodes[key.1].position),
                        stiffness: 1.0,
                        bending: true,
                    });
                    added += 1;
                }
            }
        }
        added
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn total_mass(&self) -> f32 {
        self.nodes
            .iter()
            .filter(|node| node.inverse_mass > 0.0)
            .map(|node| 1.0 / node.inverse_mass)
            .sum()
    }

    /// Spreads `mass` evenly over the nodes.
    pub fn set_total_mass(&mut self, mass: f32) {
        if self.nodes.is_empty() || mass <= 0.0 {
            return;
        }
        let inverse_mass = self.nodes.len() as f32 / mass;
        for node in &mut self.nodes {
            node.inverse_mass = inverse_mass;
        }
    }

    pub fn center_of_mass(&self) -> Vec3 {
        if self.nodes.is_empty() {
            return self.pose.position;
        }
        let (sum, weight) = self.nodes.iter().fold((Vec3::ZERO, 0.0), |(sum, w), node| {
            let mass = if node.inverse_mass > 0.0 {
                1.0 / node.inverse_mass
            } else {
                1.0
            };
            (sum + node.position * mass, w + mass)
        });
        sum / weight
    }

    /// Best-fit rotation of the current shape against the rest shape.
    pub fn estimate_rotation(&self) -> Quat {
        if self.nodes.len() < 3 || self.rest_offsets.len() != self.nodes.len() {
            return self.pose.rotation;
        }
        let center = self.center_of_mass();
        let mut covariance = Mat3::ZERO;
        for (node, rest) in self.nodes.iter().zip(&self.rest_offsets) {
            let p = node.position - center;
            covariance += Mat3::from_cols(p * rest.x, p * rest.y, p * rest.z);
        }

        let mut rotation = self.pose.rotation;
        for _ in 0..20 {
            let r = Mat3::from_quat(rotation);
            let numerator = r.x_axis.cross(covariance.x_axis)
                + r.y_axis.cross(covariance.y_axis)
                + r.z_axis.cross(covariance.z_axis);
            let denominator = (r.x_axis.dot(covariance.x_axis)
                + r.y_axis.dot(covariance.y_axis)
                + r.z_axis.dot(covariance.z_axis))
            .abs()
                + 1e-9;
            let omega = numerator / denominator;
            let angle = omega.length();
            if angle < 1e-9 {
                break;
            }
            rotation = (Quat::from_axis_angle(omega / angle, angle) * rotation).normalize();
        }
        rotation
    }

    /// Applies a rigid or affine transform to every node.
    pub fn transform(&mut self, matrix: &Mat4) {
        let normal_matrix = Mat3::from_mat4(*matrix).inverse().transpose();
        for node in &mut self.nodes {
            node.position = matrix.transform_point3(node.position);
            node.previous_position = matrix.transform_point3(node.previous_position);
            node.velocity = matrix.transform_vector3(node.velocity);
            node.normal = (normal_matrix * node.normal).normalize_or_zero();
        }
    }

    /// Scales node positions about the center of mass and rescales rest lengths.
    pub fn scale(&mut self, factor: Vec3) {
        let center = self.center_of_mass();
        let in_frame = self.pose.rotation;
        let to_frame = in_frame.inverse();
        for node in &mut self.nodes {
            node.position = center + in_frame * (to_frame * (node.position - center) * factor);
            node.previous_position =
                center + in_frame * (to_frame * (node.previous_position - center) * factor);
        }
        for offset in &mut self.rest_offsets {
            *offset *= factor;
        }
        for link in &mut self.links {
            let [a, b] = link.nodes;
            link.rest_length = self.nodes[a].position.distance(self.nodes[b].position);
        }
        self.rest_volume = self.volume();
        self.update_normals();
    }

    pub fn set_velocity(&mut self, velocity: Vec3) {
        for node in &mut self.nodes {
            node.velocity = velocity;
        }
    }

    pub fn add_velocity(&mut self, velocity: Vec3) {
        for node in &mut self.nodes {
            node.velocity += velocity;
        }
    }

    /// Spreads `force` evenly over the nodes.
    pub fn add_force(&mut self, force: Vec3) {
        if self.nodes.is_empty() {
            return;
        }
        let share = force / self.nodes.len() as f32;
        for node in &mut self.nodes {
            node.force += share;
        }
    }

    pub fn add_force_at_node(&mut self, force: Vec3, node: usize) {
        if let Some(node) = self.nodes.get_mut(node) {
            node.force += force;
        }
    }

    pub fn clear_forces(&mut self) {
        for node in &mut self.nodes {
            node.force = Vec3::ZERO;
        }
    }

    /// Face normals, then per-node normals accumulated from adjacent faces.
    pub fn update_normals(&mut self) {
        for node in &mut self.nodes {
            node.normal = Vec3::ZERO;
        }
        for face in &mut self.faces {
            let [a, b, c] = face.nodes;
            let pa = self.nodes[a].position;
            let normal = (self.nodes[b].position - pa).cross(self.nodes[c].position - pa);
            face.normal = normal.normalize_or_zero();
            for index in face.nodes {
                self.nodes[index].normal += normal;
            }
        }
        for node in &mut self.nodes {
            node.normal = node.normal.normalize_or_zero();
        }
    }

    /// Signed volume enclosed by the faces (zero for open meshes is not guaranteed).
    pub fn volume(&self) -> f32 {
        self.faces
            .iter()
            .map(|face| {
                let [a, b, c] = face.nodes;
                self.nodes[a]
                    .position
                    .dot(self.nodes[b].position.cross(self.nodes[c].position))
                    / 6.0
            })
            .sum()
    }

    pub fn rest_volume(&self) -> f32 {
        self.rest_volume
    }

    pub fn rest_offsets(&self) -> &[Vec3] {
        &self.rest_offsets
    }

    /// Records the current shape as the rest shape of `pose`.
    pub fn capture_rest_shape(&mut self) {
        let center = self.center_of_mass();
        let to_frame = self.pose.rotation.inverse();
        self.rest_offsets = self
            .nodes
            .iter()
            .map(|node| to_frame * (node.position - center))
            .collect();
        self.rest_volume = self.volume();
    }

    pub fn aabb(&self) -> Aabb {
        Aabb::from_points(self.nodes.iter().map(|node| node.position))
            .unwrap_or_else(|| Aabb::from_center_half_extents(self.pose.position, Vec3::ZERO))
    }

    pub fn nearest_node(&self, point: Vec3) -> Option<usize> {
        self.nodes
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                a.position
                    .distance_squared(point)
                    .total_cmp(&b.position.distance_squared(point))
            })
            .map(|(index, _)| index)
    }

    pub(crate) fn scratch_mut(&mut self) -> &mut Vec<Vec3> {
        &mut self.scratch
    }

    /// Drops scratch buffers grown during stepping.
    pub fn shrink_scratch(&mut self) {
        self.scratch.clear();
        self.scratch.shrink_to_fit();
    }
}
