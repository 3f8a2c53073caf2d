//! Per-object spatial state with lazily recomputed world matrices.

use std::collections::BTreeSet;

use bitflags::bitflags;
use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::scene::graph::ObjectId;
use crate::utils::math::{compose, decompose, Aabb};

bitflags! {
    /// Components of a transform that refuse to change while locked.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct TransformLocks: u8 {
        const MOVE = 1;
        const ROTATE = 1 << 1;
        const SCALE = 1 << 2;
    }
}

/// Message delivered from a transform to the transforms observing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformMessage {
    /// The subject's world matrix changed.
    Changed,
    /// The subject is being destroyed.
    Destroyed,
}

/// Receiver side of the parent to child notification.
pub trait TransformObserver {
    fn on_notified(&mut self, message: TransformMessage);
}

#[derive(Debug, Clone)]
pub struct TransformNode {
    owner: ObjectId,
    local_position: Vec3,
    local_rotation: Quat,
    local_scale: Vec3,
    local_matrix: Mat4,
    world_position: Vec3,
    world_rotation: Quat,
    world_scale: Vec3,
    world_matrix: Mat4,
    local_dirty: bool,
    world_dirty: bool,
    parent: Option<ObjectId>,
    observers: BTreeSet<ObjectId>,
    locks: TransformLocks,
    local_aabb: Aabb,
    world_aabb: Aabb,
    revision: u64,
}

impl TransformNode {
    pub fn new(owner: ObjectId) -> Self {
        Self {
            owner,
            local_position: Vec3::ZERO,
            local_rotation: Quat::IDENTITY,
            local_scale: Vec3::ONE,
            local_matrix: Mat4::IDENTITY,
            world_position: Vec3::ZERO,
            world_rotation: Quat::IDENTITY,
            world_scale: Vec3::ONE,
            world_matrix: Mat4::IDENTITY,
            local_dirty: true,
            world_dirty: true,
            parent: None,
            observers: BTreeSet::new(),
            locks: TransformLocks::empty(),
            local_aabb: Aabb::default(),
            world_aabb: Aabb::default(),
            revision: 0,
        }
    }

    pub fn owner(&self) -> ObjectId {
        self.owner
    }

    pub fn local_position(&self) -> Vec3 {
        self.local_position
    }

    pub fn local_rotation(&self) -> Quat {
        self.local_rotation
    }

    pub fn local_scale(&self) -> Vec3 {
        self.local_scale
    }

    /// Returns `true` when the value was stored.
    pub fn set_local_position(&mut self, position: Vec3) -> bool {
        if self.locks.contains(TransformLocks::MOVE) || self.local_position == position {
            return false;
        }
        self.local_position = position;
        self.local_dirty = true;
        true
    }

    pub fn set_local_rotation(&mut self, rotation: Quat) -> bool {
        if self.locks.contains(TransformLocks::ROTATE) || self.local_rotation == rotation {
            return false;
        }
        self.local_rotation = rotation;
        self.local_dirty = true;
        true
    }

    pub fn set_local_scale(&mut self, scale: Vec3) -> bool {
        if self.locks.contains(TransformLocks::SCALE) || self.local_scale == scale {
            return false;
        }
        self.local_scale = scale;
        self.local_dirty = true;
        true
    }

    pub fn locks(&self) -> TransformLocks {
        self.locks
    }

    pub fn set_locks(&mut self, locks: TransformLocks) {
        self.locks = locks;
    }

    pub fn parent(&self) -> Option<ObjectId> {
        self.parent
    }

    pub fn observers(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.observers.iter().copied()
    }

    /// Registers `observer`; a transform never observes itself.
    pub fn add_observer(&mut self, observer: ObjectId) -> bool {
        if observer == self.owner {
            return false;
        }
        self.observers.insert(observer)
    }

    pub fn remove_observer(&mut self, observer: ObjectId) -> bool {
        self.observers.remove(&observer)
    }

    pub fn is_local_dirty(&self) -> bool {
        self.local_dirty
    }

    pub fn is_world_dirty(&self) -> bool {
        self.world_dirty
    }

    /// Number of world recomputations performed so far.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn local_matrix(&self) -> Mat4 {
        self.local_matrix
    }

    /// World values as of the last resolve. `SceneGraph` getters resolve first.
    pub fn cached_world_position(&self) -> Vec3 {
        self.world_position
    }

    pub fn cached_world_rotation(&self) -> Quat {
        self.world_rotation
    }

    pub fn cached_world_scale(&self) -> Vec3 {
        self.world_scale
    }

    pub fn cached_world_matrix(&self) -> Mat4 {
        self.world_matrix
    }

    pub fn local_aabb(&self) -> Aabb {
        self.local_aabb
    }

    pub fn cached_world_aabb(&self) -> Aabb {
        self.world_aabb
    }

    pub fn set_local_aabb(&mut self, aabb: Aabb) {
        self.local_aabb = aabb;
        self.world_aabb = aabb.transformed(&self.world_matrix);
    }

    pub(crate) fn attach(&mut self, parent: ObjectId) {
        self.parent = Some(parent);
        self.world_dirty = true;
    }

    pub(crate) fn detach(&mut self) {
        self.parent = None;
        self.world_dirty = true;
    }

    /// Stores a full local pose, ignoring locks. Used when world values are re-expressed.
    pub(crate) fn overwrite_local(&mut self, position: Vec3, rotation: Quat, scale: Vec3) {
        self.local_position = position;
        self.local_rotation = rotation;
        self.local_scale = scale;
        self.local_dirty = true;
    }

    pub(crate) fn recompute_local(&mut self) {
        if !self.local_dirty {
            return;
        }
        self.local_matrix = compose(self.local_position, self.local_rotation, self.local_scale);
        self.local_dirty = false;
        self.world_dirty = true;
    }

    /// Recomputes the world cache from the parent's world matrix. Returns `true` when it ran.
    pub(crate) fn recompute_world(&mut self, parent_world: Option<&Mat4>) -> bool {
        if !self.world_dirty {
            return false;
        }
        self.world_matrix = match parent_world {
            Some(parent) => *parent * self.local_matrix,
            None => self.local_matrix,
        };
        let (position, rotation, scale) = decompose(&self.world_matrix);
        self.world_position = position;
        self.world_rotation = rotation;
        self.world_scale = scale;
        self.world_aabb = self.local_aabb.transformed(&self.world_matrix);
        self.world_dirty = false;
        self.revision += 1;
        true
    }
}

impl TransformObserver for TransformNode {
    fn on_notified(&mut self, message: TransformMessage) {
        match message {
            TransformMessage::Changed => self.world_dirty = true,
            TransformMessage::Destroyed => {
                self.local_position = self.world_position;
                self.local_rotation = self.world_rotation;
                self.local_scale = self.world_scale;
                self.parent = None;
                self.local_dirty = true;
                self.world_dirty = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node() -> TransformNode {
        TransformNode::new(ObjectId::new(0, 0))
    }

    #[test]
    fn equal_values_do_not_dirty() {
        let mut transform = node();
        transform.recompute_local();
        transform.recompute_world(None);
        assert!(!transform.set_local_position(Vec3::ZERO));
        assert!(!transform.is_local_dirty());
        assert!(transform.set_local_position(Vec3::X));
        assert!(transform.is_local_dirty());
    }

    #[test]
    fn locks_reject_changes() {
        let mut transform = node();
        transform.set_locks(TransformLocks::MOVE | TransformLocks::SCALE);
        assert!(!transform.set_local_position(Vec3::X));
        assert!(!transform.set_local_scale(Vec3::splat(2.0)));
        assert!(transform.set_local_rotation(Quat::from_rotation_x(1.0)));
    }

    #[test]
    fn cannot_observe_itself() {
        let mut transform = node();
        assert!(!transform.add_observer(transform.owner()));
        assert!(transform.add_observer(ObjectId::new(1, 0)));
    }

    #[test]
    fn destroyed_message_freezes_world_pose() {
        let mut transform = node();
        transform.attach(ObjectId::new(4, 0));
        transform.set_local_position(Vec3::X);
        transform.recompute_local();
        transform.recompute_world(Some(&Mat4::from_translation(Vec3::Y)));
        transform.on_notified(TransformMessage::Destroyed);
        assert_eq!(transform.parent(), None);
        assert_eq!(transform.local_position(), Vec3::new(1.0, 1.0, 0.0));
        assert!(transform.is_local_dirty() && transform.is_world_dirty());
    }
}
