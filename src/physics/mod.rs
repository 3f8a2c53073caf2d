//! Bridge between scene objects and the physics backend.
//!
//! A [`PhysicsObject`] attaches a rigid or soft body to a scene object. The [`PhysicsManager`]
//! owns every object, constraint and the backend world, and keeps the scene transforms and the
//! simulated poses in sync once per frame.

pub mod collider;
pub mod constraint;
pub mod events;
pub mod manager;
pub mod object;
pub mod property;
pub mod rigidbody;
pub mod softbody;

pub use collider::Collider;
pub use constraint::{
    Constraint, ConstraintDocument, ConstraintKey, ConstraintMut, ConstraintParams,
    ConstraintSettings, Dof6SpringParams, HingeParams, SliderParams, SpringParams,
};
pub use events::{CollisionTable, ContactChannel, ContactEvent, ContactPhase};
pub use manager::{BackendFactory, ContactResult, DebugLine, PhysicsManager, RaycastHit};
pub use object::{ObjectKey, PhysicsObject, PhysicsObjectState};
pub use property::Shadowed;
pub use rigidbody::PhysicsObjectMut;
pub use softbody::{optimize_mesh, OptimizedMesh, SoftBodyAdapter, SoftBodyState};
