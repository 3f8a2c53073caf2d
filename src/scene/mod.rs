//! Scene objects, their transform hierarchy and the façade tying them to the physics world.

pub mod document;
pub mod graph;
pub mod transform;

pub use document::{ObjectDocument, SceneDocument, TransformDocument};
pub use graph::{ObjectId, SceneGraph, SceneObject};
pub use transform::{TransformLocks, TransformMessage, TransformNode, TransformObserver};

use crate::config::WorldSettings;
use crate::physics::{Collider, ObjectKey, PhysicsManager, PhysicsObjectMut};

/// A scene graph together with the physics world simulating it.
#[derive(Default)]
pub struct Scene {
    pub graph: SceneGraph,
    pub physics: PhysicsManager,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: WorldSettings) -> Self {
        Self::with_physics(PhysicsManager::new(settings))
    }

    /// Uses a manager built with a custom backend factory.
    pub fn with_physics(physics: PhysicsManager) -> Self {
        Self {
            graph: SceneGraph::new(),
            physics,
        }
    }

    /// Resolves every transform, then runs one physics update. Returns the sub-steps taken.
    pub fn update(&mut self, dt: f32) -> u32 {
        self.graph.update();
        self.physics.on_physic_update(&mut self.graph, dt)
    }

    pub fn add_rigid_body(&mut self, owner: ObjectId, collider: Collider) -> Option<ObjectKey> {
        self.physics.add_rigid_body(&mut self.graph, owner, collider)
    }

    pub fn add_soft_body(&mut self, owner: ObjectId, mesh_index: usize) -> Option<ObjectKey> {
        self.physics.add_soft_body(&mut self.graph, owner, mesh_index)
    }

    pub fn physics_object_of(&self, owner: ObjectId) -> Option<ObjectKey> {
        self.physics.object_of(owner)
    }

    pub fn physics_object_mut(&mut self, key: ObjectKey) -> Option<PhysicsObjectMut<'_>> {
        self.physics.object_mut(&mut self.graph, key)
    }

    /// Removes the object's physics component first, then the object itself.
    pub fn destroy_object(&mut self, id: ObjectId) -> bool {
        if let Some(key) = self.physics.object_of(id) {
            self.physics.remove_object(key);
        }
        self.graph.destroy_object(id)
    }

    /// Drops the world. It is rebuilt lazily by the next update.
    pub fn clear_physics(&mut self) {
        self.physics.clear();
    }
}
