//! Scene objects, their hierarchy and the lazy world-transform resolution.

use std::collections::HashMap;

use glam::{Mat4, Quat, Vec3};
use log::debug;
use uuid::Uuid;

use crate::mesh::Figure;
use crate::scene::transform::{
    TransformLocks, TransformMessage, TransformNode, TransformObserver,
};
use crate::utils::allocator::{Arena, Handle};
use crate::utils::math::{compose, decompose, Aabb};

pub type ObjectId = Handle<SceneObject>;

/// A node of the scene: identity, transform and an optional renderable.
#[derive(Debug, Clone)]
pub struct SceneObject {
    uuid: Uuid,
    pub name: String,
    transform: TransformNode,
    figure: Option<Figure>,
}

impl SceneObject {
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn transform(&self) -> &TransformNode {
        &self.transform
    }

    pub fn transform_mut(&mut self) -> &mut TransformNode {
        &mut self.transform
    }

    pub fn figure(&self) -> Option<&Figure> {
        self.figure.as_ref()
    }

    pub fn figure_mut(&mut self) -> Option<&mut Figure> {
        self.figure.as_mut()
    }
}

#[derive(Default)]
pub struct SceneGraph {
    objects: Arena<SceneObject>,
    by_uuid: HashMap<Uuid, ObjectId>,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_object(&mut self, name: impl Into<String>) -> ObjectId {
        let mut uuid = Uuid::new_v4();
        while self.by_uuid.contains_key(&uuid) {
            uuid = Uuid::new_v4();
        }
        self.insert_object(uuid, name.into())
    }

    /// Creates an object with a known identity. Returns `None` if the uuid is taken.
    pub fn create_object_with_uuid(
        &mut self,
        uuid: Uuid,
        name: impl Into<String>,
    ) -> Option<ObjectId> {
        if self.by_uuid.contains_key(&uuid) {
            return None;
        }
        Some(self.insert_object(uuid, name.into()))
    }

    fn insert_object(&mut self, uuid: Uuid, name: String) -> ObjectId {
        let id = self.objects.insert_with(|id| SceneObject {
            uuid,
            name,
            transform: TransformNode::new(id),
            figure: None,
        });
        self.by_uuid.insert(uuid, id);
        id
    }

    pub fn get(&self, id: ObjectId) -> Option<&SceneObject> {
        self.objects.get(id)
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut SceneObject> {
        self.objects.get_mut(id)
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects.contains(id)
    }

    pub fn find_by_uuid(&self, uuid: &Uuid) -> Option<ObjectId> {
        self.by_uuid.get(uuid).copied()
    }

    pub fn find_by_name(&self, name: &str) -> Option<ObjectId> {
        self.objects
            .iter()
            .find(|(_, object)| object.name == name)
            .map(|(id, _)| id)
    }

    pub fn ids(&self) -> Vec<ObjectId> {
        self.objects.handles()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn transform(&self, id: ObjectId) -> Option<&TransformNode> {
        self.objects.get(id).map(|object| &object.transform)
    }

    pub fn transform_mut(&mut self, id: ObjectId) -> Option<&mut TransformNode> {
        self.objects.get_mut(id).map(|object| &mut object.transform)
    }

    pub fn figure(&self, id: ObjectId) -> Option<&Figure> {
        self.objects.get(id)?.figure.as_ref()
    }

    pub fn figure_mut(&mut self, id: ObjectId) -> Option<&mut Figure> {
        self.objects.get_mut(id)?.figure.as_mut()
    }

    /// Attaches a renderable and refreshes the cached bounding box from it.
    pub fn set_figure(&mut self, id: ObjectId, figure: Figure) -> bool {
        let Some(object) = self.objects.get_mut(id) else {
            return false;
        };
        if let Some(aabb) = figure.local_aabb() {
            object.transform.set_local_aabb(aabb);
        }
        object.figure = Some(figure);
        true
    }

    pub fn parent(&self, id: ObjectId) -> Option<ObjectId> {
        self.transform(id)?.parent()
    }

    pub fn children(&self, id: ObjectId) -> Vec<ObjectId> {
        self.transform(id)
            .map(|transform| transform.observers().collect())
            .unwrap_or_default()
    }

    pub fn root_of(&self, id: ObjectId) -> Option<ObjectId> {
        let mut current = id;
        if !self.contains(current) {
            return None;
        }
        while let Some(parent) = self.parent(current) {
            current = parent;
        }
        Some(current)
    }

    /// Makes `child` observe `parent`. Self-parenting and cycles are rejected.
    pub fn set_parent(&mut self, child: ObjectId, parent: ObjectId) -> bool {
        if child == parent || !self.contains(child) || !self.contains(parent) {
            return false;
        }
        if self.is_ancestor(child, parent) {
            return false;
        }
        if self.parent(child) == Some(parent) {
            return true;
        }

        self.remove_parent(child);
        if let Some(parent_node) = self.transform_mut(parent) {
            parent_node.add_observer(child);
        }
        if let Some(child_node) = self.transform_mut(child) {
            child_node.attach(parent);
        }
        true
    }

    /// Detaches `child`; its local values are kept, so it jumps to them as a root.
    pub fn remove_parent(&mut self, child: ObjectId) -> bool {
        let Some(parent) = self.parent(child) else {
            return false;
        };
        if let Some(parent_node) = self.transform_mut(parent) {
            parent_node.remove_observer(child);
        }
        if let Some(child_node) = self.transform_mut(child) {
            child_node.detach();
        }
        true
    }

    /// Detaches `child` and re-expresses its local values so its world pose is unchanged.
    pub fn remove_parent_keep_world(&mut self, child: ObjectId) -> bool {
        if !self.resolve(child) {
            return false;
        }
        let Some(world) = self.transform(child).map(TransformNode::cached_world_matrix) else {
            return false;
        };
        if !self.remove_parent(child) {
            return false;
        }
        let (position, rotation, scale) = decompose(&world);
        if let Some(node) = self.transform_mut(child) {
            node.overwrite_local(position, rotation, scale);
        }
        true
    }

    /// `true` if `ancestor` is found walking up from `id`.
    pub fn is_ancestor(&self, ancestor: ObjectId, id: ObjectId) -> bool {
        let mut cursor = Some(id);
        let mut guard = self.objects.len() + 1;
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            guard -= 1;
            if guard == 0 {
                break;
            }
            cursor = self.parent(current);
        }
        false
    }

    /// `true` if reading `id`'s world values would recompute anything along its chain.
    pub fn is_stale(&self, id: ObjectId) -> bool {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let Some(node) = self.transform(current) else {
                return false;
            };
            if node.is_local_dirty() || node.is_world_dirty() {
                return true;
            }
            cursor = node.parent();
        }
        false
    }

    /// Brings `id` and its ancestors up to date, top-down.
    pub fn resolve(&mut self, id: ObjectId) -> bool {
        if !self.contains(id) {
            return false;
        }
        let mut chain = vec![id];
        while let Some(parent) = chain.last().and_then(|last| self.parent(*last)) {
            if chain.len() > self.objects.len() {
                break;
            }
            chain.push(parent);
        }
        for node in chain.into_iter().rev() {
            self.resolve_node(node);
        }
        true
    }

    fn resolve_node(&mut self, id: ObjectId) {
        let parent_world = self
            .parent(id)
            .and_then(|parent| self.transform(parent))
            .map(TransformNode::cached_world_matrix);

        let Some(node) = self.transform_mut(id) else {
            return;
        };
        node.recompute_local();
        if !node.recompute_world(parent_world.as_ref()) {
            return;
        }
        let observers: Vec<ObjectId> = node.observers().collect();
        for observer in observers {
            if let Some(observer) = self.transform_mut(observer) {
                observer.on_notified(TransformMessage::Changed);
            }
        }
    }

    fn resolved(&mut self, id: ObjectId) -> Option<&TransformNode> {
        if !self.resolve(id) {
            return None;
        }
        self.transform(id)
    }

    /// Resolves every node. Called once per frame before physics.
    pub fn update(&mut self) {
        for id in self.objects.handles() {
            self.resolve(id);
        }
    }

    pub fn world_position(&mut self, id: ObjectId) -> Option<Vec3> {
        self.resolved(id).map(TransformNode::cached_world_position)
    }

    pub fn world_rotation(&mut self, id: ObjectId) -> Option<Quat> {
        self.resolved(id).map(TransformNode::cached_world_rotation)
    }

    pub fn world_scale(&mut self, id: ObjectId) -> Option<Vec3> {
        self.resolved(id).map(TransformNode::cached_world_scale)
    }

    pub fn world_matrix(&mut self, id: ObjectId) -> Option<Mat4> {
        self.resolved(id).map(TransformNode::cached_world_matrix)
    }

    pub fn world_aabb(&mut self, id: ObjectId) -> Option<Aabb> {
        self.resolved(id).map(TransformNode::cached_world_aabb)
    }

    pub fn world_right(&mut self, id: ObjectId) -> Option<Vec3> {
        self.world_rotation(id).map(|rotation| rotation * Vec3::X)
    }

    pub fn world_up(&mut self, id: ObjectId) -> Option<Vec3> {
        self.world_rotation(id).map(|rotation| rotation * Vec3::Y)
    }

    /// Forward is +Z in the local frame.
    pub fn world_forward(&mut self, id: ObjectId) -> Option<Vec3> {
        self.world_rotation(id).map(|rotation| rotation * Vec3::Z)
    }

    pub fn set_local_position(&mut self, id: ObjectId, position: Vec3) -> bool {
        self.transform_mut(id)
            .is_some_and(|node| node.set_local_position(position))
    }

    pub fn set_local_rotation(&mut self, id: ObjectId, rotation: Quat) -> bool {
        self.transform_mut(id)
            .is_some_and(|node| node.set_local_rotation(rotation))
    }

    pub fn set_local_scale(&mut self, id: ObjectId, scale: Vec3) -> bool {
        self.transform_mut(id)
            .is_some_and(|node| node.set_local_scale(scale))
    }

    pub fn set_world_position(&mut self, id: ObjectId, position: Vec3) -> bool {
        if self.is_locked(id, TransformLocks::MOVE) {
            return false;
        }
        self.rewrite_world(id, |p, r, s| (p != position).then_some((position, r, s)))
    }

    pub fn set_world_rotation(&mut self, id: ObjectId, rotation: Quat) -> bool {
        if self.is_locked(id, TransformLocks::ROTATE) {
            return false;
        }
        self.rewrite_world(id, |p, r, s| (r != rotation).then_some((p, rotation, s)))
    }

    pub fn set_world_scale(&mut self, id: ObjectId, scale: Vec3) -> bool {
        if self.is_locked(id, TransformLocks::SCALE) {
            return false;
        }
        self.rewrite_world(id, |p, r, s| (s != scale).then_some((p, r, scale)))
    }

    /// Position and rotation in one rewrite; each part still honours its lock.
    pub fn set_world_pose(&mut self, id: ObjectId, position: Vec3, rotation: Quat) -> bool {
        let keep_position = self.is_locked(id, TransformLocks::MOVE);
        let keep_rotation = self.is_locked(id, TransformLocks::ROTATE);
        self.rewrite_world(id, |p, r, s| {
            let position = if keep_position { p } else { position };
            let rotation = if keep_rotation { r } else { rotation };
            (p != position || r != rotation).then_some((position, rotation, s))
        })
    }

    /// Moves by `delta` in world space.
    pub fn translate(&mut self, id: ObjectId, delta: Vec3) -> bool {
        match self.world_position(id) {
            Some(position) => self.set_world_position(id, position + delta),
            None => false,
        }
    }

    /// Applies `rotation` in world space.
    pub fn rotate(&mut self, id: ObjectId, rotation: Quat) -> bool {
        match self.world_rotation(id) {
            Some(current) => self.set_world_rotation(id, (rotation * current).normalize()),
            None => false,
        }
    }

    /// Moves by `delta` expressed in the object's own axes.
    pub fn local_translate(&mut self, id: ObjectId, delta: Vec3) -> bool {
        let Some(node) = self.transform(id) else {
            return false;
        };
        let position = node.local_position() + node.local_rotation() * delta;
        self.set_local_position(id, position)
    }

    pub fn local_rotate(&mut self, id: ObjectId, rotation: Quat) -> bool {
        let Some(node) = self.transform(id) else {
            return false;
        };
        let rotation = (node.local_rotation() * rotation).normalize();
        self.set_local_rotation(id, rotation)
    }

    pub fn local_to_global(&mut self, id: ObjectId, point: Vec3) -> Option<Vec3> {
        self.world_matrix(id)
            .map(|matrix| matrix.transform_point3(point))
    }

    pub fn global_to_local(&mut self, id: ObjectId, point: Vec3) -> Option<Vec3> {
        self.world_matrix(id)
            .map(|matrix| matrix.inverse().transform_point3(point))
    }

    pub fn set_local_aabb(&mut self, id: ObjectId, aabb: Aabb) -> bool {
        if !self.resolve(id) {
            return false;
        }
        self.transform_mut(id)
            .map(|node| node.set_local_aabb(aabb))
            .is_some()
    }

    fn is_locked(&self, id: ObjectId, lock: TransformLocks) -> bool {
        self.transform(id)
            .map(|node| node.locks().contains(lock))
            .unwrap_or(true)
    }

    /// Re-expresses a new world pose as local values: local = parent.world⁻¹ × world.
    fn rewrite_world(
        &mut self,
        id: ObjectId,
        edit: impl FnOnce(Vec3, Quat, Vec3) -> Option<(Vec3, Quat, Vec3)>,
    ) -> bool {
        if !self.resolve(id) {
            return false;
        }
        let Some(node) = self.transform(id) else {
            return false;
        };
        let Some((position, rotation, scale)) = edit(
            node.cached_world_position(),
            node.cached_world_rotation(),
            node.cached_world_scale(),
        ) else {
            return false;
        };

        let world = compose(position, rotation, scale);
        let local = match node.parent().and_then(|parent| self.transform(parent)) {
            Some(parent) => parent.cached_world_matrix().inverse() * world,
            None => world,
        };
        let (local_position, local_rotation, local_scale) = decompose(&local);
        if let Some(node) = self.transform_mut(id) {
            node.overwrite_local(local_position, local_rotation, local_scale);
        }
        true
    }

    /// Destroys an object. Its children keep their world pose and become roots.
    pub fn destroy_object(&mut self, id: ObjectId) -> bool {
        if !self.resolve(id) {
            return false;
        }
        let children = self.children(id);
        for child in &children {
            self.resolve(*child);
            if let Some(node) = self.transform_mut(*child) {
                node.on_notified(TransformMessage::Destroyed);
            }
        }
        self.remove_parent(id);

        let Some(object) = self.objects.remove(id) else {
            return false;
        };
        self.by_uuid.remove(&object.uuid);
        debug!(
            "destroyed scene object {} ({} children detached)",
            object.name,
            children.len()
        );
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn child_follows_parent() {
        let mut graph = SceneGraph::new();
        let parent = graph.create_object("parent");
        let child = graph.create_object("child");
        assert!(graph.set_parent(child, parent));
        graph.set_local_position(parent, Vec3::new(0.0, 5.0, 0.0));
        graph.set_local_position(child, Vec3::X);
        let world = graph.world_position(child).expect("child");
        assert_relative_eq!(world.y, 5.0);
        assert_relative_eq!(world.x, 1.0);
    }

    #[test]
    fn cycles_are_rejected() {
        let mut graph = SceneGraph::new();
        let a = graph.create_object("a");
        let b = graph.create_object("b");
        assert!(graph.set_parent(b, a));
        assert!(!graph.set_parent(a, b));
        assert!(!graph.set_parent(a, a));
    }

    #[test]
    fn world_setter_rewrites_local_under_parent() {
        let mut graph = SceneGraph::new();
        let parent = graph.create_object("parent");
        let child = graph.create_object("child");
        graph.set_parent(child, parent);
        graph.set_local_scale(parent, Vec3::splat(2.0));
        graph.set_local_position(parent, Vec3::new(1.0, 0.0, 0.0));
        assert!(graph.set_world_position(child, Vec3::new(5.0, 0.0, 0.0)));
        let local = graph.transform(child).expect("child").local_position();
        assert_relative_eq!(local.x, 2.0, epsilon = 1e-5);
        let world = graph.world_position(child).expect("child");
        assert_relative_eq!(world.x, 5.0, epsilon = 1e-5);
    }

    #[test]
    fn uuid_lookup_follows_destruction() {
        let mut graph = SceneGraph::new();
        let id = graph.create_object("a");
        let uuid = graph.get(id).expect("a").uuid();
        assert_eq!(graph.find_by_uuid(&uuid), Some(id));
        assert!(graph.destroy_object(id));
        assert_eq!(graph.find_by_uuid(&uuid), None);
    }
}
