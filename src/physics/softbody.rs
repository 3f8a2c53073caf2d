//! Soft bodies built from a render sub-mesh.
//!
//! Duplicate vertices (split for UVs or normals) become a single simulation node; the index
//! map remembers which node drives each original vertex so simulated positions and normals
//! can be written back into the vertex buffer after every step.

use std::collections::HashMap;

use glam::{Mat3, Vec3};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::backend::soft::{AeroModel, SoftBody, SoftBodyConfig};
use crate::backend::{CollisionObject, Pose};
use crate::config::SOFT_BODY_BENDING_DISTANCE;
use crate::mesh::VertexSemantic;
use crate::physics::collider::Collider;
use crate::physics::manager::PhysicsManager;
use crate::physics::object::ObjectKey;
use crate::physics::property::Shadowed;
use crate::physics::rigidbody::PhysicsObjectMut;
use crate::scene::SceneGraph;
use crate::utils::logging::ScopedTimer;

/// Mesh with coincident vertices merged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OptimizedMesh {
    pub positions: Vec<Vec3>,
    pub indices: Vec<u32>,
    /// Node index of every original vertex.
    pub index_map: Vec<usize>,
}

/// Merges vertices with exactly equal coordinates, keeping the first occurrence.
/// Triangles referencing vertices out of range are dropped.
pub fn optimize_mesh(positions: &[Vec3], indices: &[u32]) -> OptimizedMesh {
    let mut seen: HashMap<[u32; 3], usize> = HashMap::with_capacity(positions.len());
    let mut optimized = OptimizedMesh {
        index_map: Vec::with_capacity(positions.len()),
        ..Default::default()
    };
    for position in positions {
        // Adding zero folds -0.0 into 0.0.
        let key = (*position + Vec3::ZERO).to_array().map(f32::to_bits);
        let node = *seen.entry(key).or_insert_with(|| {
            optimized.positions.push(*position);
            optimized.positions.len() - 1
        });
        optimized.index_map.push(node);
    }
    for triangle in indices.chunks_exact(3) {
        let mapped: Option<Vec<u32>> = triangle
            .iter()
            .map(|index| {
                optimized
                    .index_map
                    .get(*index as usize)
                    .map(|node| *node as u32)
            })
            .collect();
        if let Some(mapped) = mapped {
            optimized.indices.extend(mapped);
        }
    }
    optimized
}

/// Soft-body side of a physics object.
#[derive(Debug, Clone, PartialEq)]
pub struct SoftBodyAdapter {
    pub(crate) mesh_index: usize,
    pub(crate) config: Shadowed<SoftBodyConfig>,
    pub(crate) index_map: Vec<usize>,
}

impl SoftBodyAdapter {
    pub fn new(mesh_index: usize) -> Self {
        Self {
            mesh_index,
            config: Shadowed::new(SoftBodyConfig::default()),
            index_map: Vec::new(),
        }
    }

    pub fn mesh_index(&self) -> usize {
        self.mesh_index
    }

    pub fn config(&self) -> SoftBodyConfig {
        self.config.get()
    }

    pub fn index_map(&self) -> &[usize] {
        &self.index_map
    }

    pub fn to_state(&self) -> SoftBodyState {
        let config = self.config.get();
        SoftBodyState {
            mesh_index: self.mesh_index,
            damping: config.damping,
            pressure: config.pressure,
            volume_conservation: config.volume_conservation,
            dynamic_friction: config.dynamic_friction,
            pose_matching: config.pose_matching,
            repulsion_stiffness: config.repulsion_stiffness,
            sleeping_threshold: config.sleeping_threshold,
            rest_length_scale: config.rest_length_scale,
            gravity_factor: config.gravity_factor,
            velocity_factor: config.velocity_factor,
            position_iterations: config.position_iterations,
            aero_model: config.aero_model.raw(),
            self_collision: config.self_collision,
            soft_soft_collision: config.soft_soft_collision,
            wind_velocity: config.wind_velocity,
            rigid_contact_hardness: config.rigid_contact_hardness,
            kinetic_contact_hardness: config.kinetic_contact_hardness,
            soft_contact_hardness: config.soft_contact_hardness,
            anchor_hardness: config.anchor_hardness,
        }
    }

    pub fn from_state(state: &SoftBodyState) -> Self {
        let config = SoftBodyConfig {
            damping: state.damping,
            pressure: state.pressure,
            volume_conservation: state.volume_conservation,
            dynamic_friction: state.dynamic_friction,
            pose_matching: state.pose_matching,
            repulsion_stiffness: state.repulsion_stiffness,
            sleeping_threshold: state.sleeping_threshold,
            rest_length_scale: state.rest_length_scale,
            gravity_factor: state.gravity_factor,
            velocity_factor: state.velocity_factor,
            rigid_contact_hardness: state.rigid_contact_hardness,
            kinetic_contact_hardness: state.kinetic_contact_hardness,
            soft_contact_hardness: state.soft_contact_hardness,
            anchor_hardness: state.anchor_hardness,
            position_iterations: state.position_iterations.max(1),
            aero_model: clamped_aero_model(state.aero_model),
            wind_velocity: state.wind_velocity,
            self_collision: state.self_collision,
            soft_soft_collision: state.soft_soft_collision,
        };
        Self {
            mesh_index: state.mesh_index,
            config: Shadowed::new(config),
            index_map: Vec::new(),
        }
    }
}

fn clamped_aero_model(raw: i32) -> AeroModel {
    let model = AeroModel::from_raw(raw);
    if model.raw() != raw {
        warn!("aero model {raw} out of range, using {model:?}");
    }
    model
}

/// Persisted soft-body coefficients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoftBodyState {
    #[serde(rename = "meshIdx")]
    pub mesh_index: usize,
    #[serde(rename = "dampCoeff")]
    pub damping: f32,
    #[serde(rename = "presCoeff")]
    pub pressure: f32,
    #[serde(rename = "volCoeff")]
    pub volume_conservation: f32,
    #[serde(rename = "friCoeff")]
    pub dynamic_friction: f32,
    #[serde(rename = "poseCoeff")]
    pub pose_matching: f32,
    #[serde(rename = "repStiff")]
    pub repulsion_stiffness: f32,
    #[serde(rename = "sleepThr")]
    pub sleeping_threshold: f32,
    #[serde(rename = "restLS")]
    pub rest_length_scale: f32,
    #[serde(rename = "graF")]
    pub gravity_factor: f32,
    #[serde(rename = "velF")]
    pub velocity_factor: f32,
    #[serde(rename = "pItrNum")]
    pub position_iterations: u32,
    #[serde(rename = "aero")]
    pub aero_model: i32,
    #[serde(rename = "isSelfCol")]
    pub self_collision: bool,
    #[serde(rename = "isSoftCol")]
    pub soft_soft_collision: bool,
    #[serde(rename = "windVel")]
    pub wind_velocity: Vec3,
    #[serde(rename = "rch")]
    pub rigid_contact_hardness: f32,
    #[serde(rename = "kch")]
    pub kinetic_contact_hardness: f32,
    #[serde(rename = "sch")]
    pub soft_contact_hardness: f32,
    #[serde(rename = "ahr")]
    pub anchor_hardness: f32,
}

impl Default for SoftBodyState {
    fn default() -> Self {
        SoftBodyAdapter::new(0).to_state()
    }
}

impl<'a> PhysicsObjectMut<'a> {
    /// Replaces every soft-body coefficient. No-op for rigid objects.
    pub fn set_soft_body_config(&mut self, config: SoftBodyConfig) -> bool {
        let Some((object, body)) = self.parts() else {
            return false;
        };
        let force = object.dirty;
        let Some(adapter) = object.soft.as_mut() else {
            return false;
        };
        if !adapter.config.assign(config, force) {
            return false;
        }
        if let Some(soft) = body.and_then(CollisionObject::as_soft_mut) {
            soft.config = config;
        }
        true
    }

    pub fn update_soft_body_config(&mut self, update: impl FnOnce(&mut SoftBodyConfig)) -> bool {
        let Some(mut config) = self
            .object()
            .and_then(|object| object.soft.as_ref())
            .map(SoftBodyAdapter::config)
        else {
            return false;
        };
        update(&mut config);
        self.set_soft_body_config(config)
    }

    /// Raw values outside 0..=6 are clamped with a warning.
    pub fn set_aero_model(&mut self, raw: i32) -> bool {
        let model = clamped_aero_model(raw);
        self.update_soft_body_config(|config| config.aero_model = model)
    }

    /// Switches to another sub-mesh and rebuilds the body.
    pub fn set_mesh_index(&mut self, mesh_index: usize) -> bool {
        let Some(object) = self.manager.objects.get_mut(self.key) else {
            return false;
        };
        let Some(adapter) = object.soft.as_mut() else {
            return false;
        };
        if adapter.mesh_index == mesh_index {
            return false;
        }
        adapter.mesh_index = mesh_index;
        object.collider = Collider::Mesh {
            mesh_index,
            convex: false,
        };
        if object.body.is_some() {
            self.manager.create_body(self.graph, self.key);
        }
        true
    }
}

impl PhysicsManager {
    pub(crate) fn soft_body(&self, key: ObjectKey) -> Option<&SoftBody> {
        self.native_body(key)?.as_soft()
    }

    /// Index of the node closest to `position`.
    pub fn nearest_node_index(&self, key: ObjectKey, position: Vec3) -> Option<usize> {
        self.soft_body(key)?.nearest_node(position)
    }

    /// `Vec3::splat(f32::MAX)` when the node does not exist.
    pub fn node_position(&self, key: ObjectKey, node: usize) -> Vec3 {
        self.soft_body(key)
            .and_then(|soft| soft.nodes.get(node))
            .map_or(Vec3::splat(f32::MAX), |node| node.position)
    }

    /// `Vec3::splat(f32::MAX)` when the node does not exist.
    pub fn node_normal(&self, key: ObjectKey, node: usize) -> Vec3 {
        self.soft_body(key)
            .and_then(|soft| soft.nodes.get(node))
            .map_or(Vec3::splat(f32::MAX), |node| node.normal)
    }

    /// Builds the soft body from the owner's sub-mesh in world space. A rigid-only world
    /// cannot host it.
    pub(crate) fn create_soft_body(&mut self, graph: &mut SceneGraph, key: ObjectKey) -> bool {
        if !self
            .world
            .as_deref()
            .is_some_and(|world| world.is_deformable())
        {
            warn!("soft body {key:?} needs a deformable world, body not created");
            return false;
        }
        let Some(object) = self.objects.get(key) else {
            return false;
        };
        let Some(adapter) = object.soft.as_ref() else {
            return false;
        };
        let owner = object.owner;
        let (Some(world_matrix), Some(position), Some(rotation), Some(scale)) = (
            graph.world_matrix(owner),
            graph.world_position(owner),
            graph.world_rotation(owner),
            graph.world_scale(owner),
        ) else {
            return false;
        };

        let mesh_index = adapter.mesh_index;
        let (positions, indices) = graph
            .figure(owner)
            .and_then(|figure| {
                let positions = figure.read_positions(mesh_index, Some(&world_matrix))?;
                let indices = figure.mesh(mesh_index)?.indices().to_vec();
                Some((positions, indices))
            })
            .unwrap_or_default();
        if positions.is_empty() {
            warn!("soft body {key:?} has no mesh {mesh_index}, creating an empty body");
        }

        let optimized = optimize_mesh(&positions, &indices);
        let mut soft = SoftBody::from_tri_mesh(&optimized.positions, &optimized.indices);
        soft.generate_bending_constraints(SOFT_BODY_BENDING_DISTANCE);
        soft.config = adapter.config.get();
        soft.pose = Pose::new(position, rotation);
        soft.capture_rest_shape();

        let mut native = CollisionObject::soft(soft);
        native.user_data = key.to_bits();
        object.write_all(&mut native);

        let Some(world) = self.world.as_deref_mut() else {
            return false;
        };
        let handle = world.create_body(native);
        let Some(object) = self.objects.get_mut(key) else {
            return false;
        };
        object.body = handle;
        object.shape = None;
        object.previous_scale = scale;
        if let Some(adapter) = object.soft.as_mut() {
            adapter.index_map = optimized.index_map;
        }
        handle.is_some()
    }

    /// Moves every node rigidly from the last known pose to `pose`.
    pub(crate) fn push_soft_transform(&mut self, key: ObjectKey, pose: Pose) {
        let Some(handle) = self.objects.get(key).and_then(|object| object.body) else {
            return;
        };
        let Some(body) = self
            .world
            .as_deref_mut()
            .and_then(|world| world.body_mut(handle))
        else {
            return;
        };
        let Some(soft) = body.as_soft_mut() else {
            return;
        };
        if soft.pose.approx_eq(&pose, 1e-5) {
            return;
        }
        let delta = pose * soft.pose.inverse();
        soft.transform(&delta.to_matrix());
        soft.pose = pose;
        body.activate(false);
    }

    /// Writes the body frame into the owner's transform, then every node position and normal
    /// into the render mesh, in the owner's local space.
    pub(crate) fn pull_soft_transform(&mut self, graph: &mut SceneGraph, key: ObjectKey) {
        let _timer = ScopedTimer::new("soft body write-back");
        let Some(object) = self.objects.get(key) else {
            return;
        };
        let (Some(adapter), Some(handle)) = (object.soft.as_ref(), object.body) else {
            return;
        };
        let Some(soft) = self
            .world
            .as_deref_mut()
            .and_then(|world| world.body_mut(handle))
            .and_then(CollisionObject::as_soft_mut)
        else {
            return;
        };
        if soft.nodes.is_empty() {
            return;
        }
        let pose = Pose::new(soft.center_of_mass(), soft.estimate_rotation());
        soft.pose = pose;
        let soft = &*soft;

        graph.set_world_pose(object.owner, pose.position, pose.rotation);
        let Some(world_matrix) = graph.world_matrix(object.owner) else {
            return;
        };
        let to_local = world_matrix.inverse();
        let normal_to_local = Mat3::from_mat4(world_matrix).transpose();

        let Some(mesh) = graph
            .figure_mut(object.owner)
            .and_then(|figure| figure.mesh_mut(adapter.mesh_index))
        else {
            return;
        };
        for (vertex, node) in adapter.index_map.iter().enumerate() {
            let Some(node) = soft.nodes.get(*node) else {
                continue;
            };
            mesh.write_attribute(
                vertex,
                VertexSemantic::Position,
                to_local.transform_point3(node.position),
            );
            mesh.write_attribute(
                vertex,
                VertexSemantic::Normal,
                (normal_to_local * node.normal).normalize_or_zero(),
            );
        }
        mesh.mark_for_upload();
    }
}
