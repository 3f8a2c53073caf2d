//! Persisted scenes.
//!
//! A [`SceneDocument`] lists every object with its local transform, optional renderable and
//! physics state. Loading happens in two phases: objects, parents and components are built
//! first, then constraint references to other objects are resolved by uuid and the affected
//! constraints are rebuilt.

use std::collections::HashSet;

use glam::{Quat, Vec3};
use log::debug;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::WorldSettings;
use crate::error::SceneError;
use crate::mesh::Figure;
use crate::physics::{PhysicsManager, PhysicsObject, PhysicsObjectState};
use crate::scene::transform::TransformLocks;
use crate::scene::{ObjectId, Scene, SceneGraph};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformDocument {
    pub pos: Vec3,
    pub rot: Quat,
    pub scale: Vec3,
    pub locks: TransformLocks,
}

impl Default for TransformDocument {
    fn default() -> Self {
        Self {
            pos: Vec3::ZERO,
            rot: Quat::IDENTITY,
            scale: Vec3::ONE,
            locks: TransformLocks::empty(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectDocument {
    pub uuid: Uuid,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<Uuid>,
    #[serde(default)]
    pub transform: TransformDocument,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub figure: Option<Figure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub physics: Option<PhysicsObjectState>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneDocument {
    #[serde(rename = "physicsWorld")]
    pub settings: WorldSettings,
    pub objects: Vec<ObjectDocument>,
}

impl SceneDocument {
    /// Captures the scene's local transforms, renderables, physics objects and constraints.
    pub fn capture(scene: &Scene) -> Self {
        let graph = &scene.graph;
        let objects = graph
            .ids()
            .into_iter()
            .filter_map(|id| Self::capture_object(graph, &scene.physics, id))
            .collect();
        Self {
            settings: scene.physics.settings().clone(),
            objects,
        }
    }

    fn capture_object(
        graph: &SceneGraph,
        physics: &PhysicsManager,
        id: ObjectId,
    ) -> Option<ObjectDocument> {
        let object = graph.get(id)?;
        let node = object.transform();
        let parent = node
            .parent()
            .and_then(|parent| graph.get(parent))
            .map(|parent| parent.uuid());
        let state = physics.object_of(id).and_then(|key| {
            let physics_object = physics.object(key)?;
            let constraints = physics_object
                .constraints()
                .iter()
                .filter_map(|constraint| physics.constraint_document(graph, *constraint))
                .collect();
            Some(physics_object.to_state(constraints))
        });
        Some(ObjectDocument {
            uuid: object.uuid(),
            name: object.name.clone(),
            parent,
            transform: TransformDocument {
                pos: node.local_position(),
                rot: node.local_rotation(),
                scale: node.local_scale(),
                locks: node.locks(),
            },
            figure: object.figure().cloned(),
            physics: state,
        })
    }

    /// Builds a new scene. The physics world is created lazily by the first update.
    pub fn load(&self) -> Result<Scene, SceneError> {
        let mut seen = HashSet::with_capacity(self.objects.len());
        for object in &self.objects {
            if !seen.insert(object.uuid) {
                return Err(SceneError::DuplicateUuid(object.uuid.to_string()));
            }
        }

        let mut scene = Scene::with_settings(self.settings.clone());
        let mut ids = Vec::with_capacity(self.objects.len());
        for object in &self.objects {
            let id = scene
                .graph
                .create_object_with_uuid(object.uuid, object.name.clone())
                .ok_or_else(|| SceneError::DuplicateUuid(object.uuid.to_string()))?;
            if let Some(node) = scene.graph.transform_mut(id) {
                node.set_local_position(object.transform.pos);
                node.set_local_rotation(object.transform.rot);
                node.set_local_scale(object.transform.scale);
                node.set_locks(object.transform.locks);
            }
            if let Some(figure) = &object.figure {
                scene.graph.set_figure(id, figure.clone());
            }
            ids.push(id);
        }

        for (object, id) in self.objects.iter().zip(&ids) {
            let Some(parent_uuid) = object.parent else {
                continue;
            };
            let parent = scene.graph.find_by_uuid(&parent_uuid).ok_or_else(|| {
                SceneError::UnknownParent {
                    child: object.uuid.to_string(),
                    parent: parent_uuid.to_string(),
                }
            })?;
            if !scene.graph.set_parent(*id, parent) {
                return Err(SceneError::ParentCycle {
                    child: object.uuid.to_string(),
                    parent: parent_uuid.to_string(),
                });
            }
        }

        for (object, id) in self.objects.iter().zip(&ids) {
            let Some(state) = &object.physics else {
                continue;
            };
            let Some(key) = scene
                .physics
                .insert_object(&mut scene.graph, PhysicsObject::from_state(*id, state))
            else {
                continue;
            };
            for constraint in &state.consts {
                scene.physics.restore_constraint(key, constraint);
            }
        }

        let linked = scene.physics.link_constraints(&scene.graph);
        debug!(
            "loaded scene with {} objects, {} constraint links resolved",
            ids.len(),
            linked
        );
        Ok(scene)
    }
}
