//! Scene Physics Bridge – transform hierarchy kept in sync with a physics world.
//!
//! Scene objects carry a lazily resolved transform hierarchy. Physics objects attach rigid or
//! soft bodies to them; once per frame the [`PhysicsManager`] pushes the scene transforms into
//! the backend, steps the simulation, reports contact start/stay/stop events and writes the
//! simulated poses (and deformed soft-body meshes) back into the scene.

pub mod backend;
pub mod config;
pub mod error;
pub mod mesh;
pub mod physics;
pub mod scene;
pub mod utils;

pub use glam::{Mat3, Mat4, Quat, Vec3};

pub use backend::{basic::BasicWorld, PhysicsBackend, Pose};
pub use config::WorldSettings;
pub use error::SceneError;
pub use mesh::{Figure, RenderMesh, VertexAttribute, VertexFormat, VertexSemantic};
pub use physics::{
    Collider, ConstraintKey, ConstraintParams, ContactChannel, ContactEvent, ContactPhase,
    ObjectKey, PhysicsManager, PhysicsObject, PhysicsObjectMut, RaycastHit,
};
pub use scene::{ObjectId, Scene, SceneDocument, SceneGraph, TransformLocks};
pub use utils::allocator::{Arena, Handle};
