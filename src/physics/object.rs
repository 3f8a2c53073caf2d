use std::sync::Arc;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::backend::body::{ActivationState, BodyKind, CollisionFlags, CollisionObject};
use crate::backend::shape::CollisionShape;
use crate::backend::{BodyHandle, CollisionFilter};
use crate::config::{
    CCD_MOTION_THRESHOLD, CCD_SWEPT_SPHERE_RADIUS, DEFAULT_ANGULAR_SLEEPING_THRESHOLD,
    DEFAULT_COLLISION_MARGIN, DEFAULT_GROUP, DEFAULT_LINEAR_SLEEPING_THRESHOLD, DEFAULT_MASK,
    KINEMATIC_GROUP, KINEMATIC_MASK, MIN_DYNAMIC_MASS,
};
use crate::physics::collider::Collider;
use crate::physics::constraint::{ConstraintDocument, ConstraintKey};
use crate::physics::property::Shadowed;
use crate::physics::softbody::{SoftBodyAdapter, SoftBodyState};
use crate::scene::ObjectId;
use crate::utils::allocator::Handle;

pub type ObjectKey = Handle<PhysicsObject>;

/// Scene-side record of a simulated body.
///
/// Every cached property mirrors a value of the native body. While `dirty` is set (during a
/// build) every property is written regardless of equality.
#[derive(Debug, Clone)]
pub struct PhysicsObject {
    pub(crate) owner: ObjectId,
    pub(crate) collider: Collider,
    pub(crate) shape: Option<Arc<CollisionShape>>,
    pub(crate) body: Option<BodyHandle>,
    pub(crate) soft: Option<SoftBodyAdapter>,

    pub(crate) mass: Shadowed<f32>,
    pub(crate) restitution: Shadowed<f32>,
    pub(crate) friction: Shadowed<f32>,
    pub(crate) linear_velocity: Shadowed<Vec3>,
    pub(crate) angular_velocity: Shadowed<Vec3>,
    pub(crate) linear_factor: Shadowed<Vec3>,
    pub(crate) angular_factor: Shadowed<Vec3>,
    pub(crate) margin: Shadowed<f32>,
    pub(crate) linear_sleeping_threshold: Shadowed<f32>,
    pub(crate) angular_sleeping_threshold: Shadowed<f32>,
    pub(crate) activation_state: Shadowed<ActivationState>,
    pub(crate) group: i32,
    pub(crate) mask: i32,

    pub(crate) kinematic: bool,
    pub(crate) trigger: bool,
    pub(crate) ccd: bool,
    pub(crate) enabled: bool,
    /// Body currently added to the world.
    pub(crate) activated: bool,
    pub(crate) dirty: bool,

    pub(crate) previous_scale: Vec3,
    pub(crate) position_offset: Vec3,
    pub(crate) constraints: Vec<ConstraintKey>,
}

impl PhysicsObject {
    pub fn new(owner: ObjectId, collider: Collider) -> Self {
        Self {
            owner,
            collider,
            shape: None,
            body: None,
            soft: None,
            mass: Shadowed::new(1.0),
            restitution: Shadowed::new(1.0),
            friction: Shadowed::new(0.5),
            linear_velocity: Shadowed::new(Vec3::ZERO),
            angular_velocity: Shadowed::new(Vec3::ZERO),
            linear_factor: Shadowed::new(Vec3::ONE),
            angular_factor: Shadowed::new(Vec3::ONE),
            margin: Shadowed::new(DEFAULT_COLLISION_MARGIN),
            linear_sleeping_threshold: Shadowed::new(DEFAULT_LINEAR_SLEEPING_THRESHOLD),
            angular_sleeping_threshold: Shadowed::new(DEFAULT_ANGULAR_SLEEPING_THRESHOLD),
            activation_state: Shadowed::new(ActivationState::Active),
            group: DEFAULT_GROUP,
            mask: DEFAULT_MASK,
            kinematic: false,
            trigger: false,
            ccd: false,
            enabled: true,
            activated: false,
            dirty: true,
            previous_scale: Vec3::ONE,
            position_offset: Vec3::ZERO,
            constraints: Vec::new(),
        }
    }

    pub fn soft(owner: ObjectId, mesh_index: usize) -> Self {
        let mut object = Self::new(
            owner,
            Collider::Mesh {
                mesh_index,
                convex: false,
            },
        );
        object.soft = Some(SoftBodyAdapter::new(mesh_index));
        object
    }

    pub fn owner(&self) -> ObjectId {
        self.owner
    }

    pub fn collider(&self) -> &Collider {
        &self.collider
    }

    pub fn body(&self) -> Option<BodyHandle> {
        self.body
    }

    pub fn shape(&self) -> Option<&CollisionShape> {
        self.shape.as_deref()
    }

    pub fn soft_body(&self) -> Option<&SoftBodyAdapter> {
        self.soft.as_ref()
    }

    pub fn is_soft(&self) -> bool {
        self.soft.is_some()
    }

    pub fn mass(&self) -> f32 {
        self.mass.get()
    }

    /// Mass handed to the solver: zero for kinematic objects.
    pub fn effective_mass(&self) -> f32 {
        if self.kinematic {
            0.0
        } else {
            self.mass.get().max(MIN_DYNAMIC_MASS)
        }
    }

    pub fn restitution(&self) -> f32 {
        self.restitution.get()
    }

    pub fn friction(&self) -> f32 {
        self.friction.get()
    }

    pub fn linear_factor(&self) -> Vec3 {
        self.linear_factor.get()
    }

    pub fn angular_factor(&self) -> Vec3 {
        self.angular_factor.get()
    }

    pub fn margin(&self) -> f32 {
        self.margin.get()
    }

    pub fn linear_sleeping_threshold(&self) -> f32 {
        self.linear_sleeping_threshold.get()
    }

    pub fn angular_sleeping_threshold(&self) -> f32 {
        self.angular_sleeping_threshold.get()
    }

    pub fn activation_state(&self) -> ActivationState {
        self.activation_state.get()
    }

    pub fn collision_group(&self) -> i32 {
        self.group
    }

    pub fn collision_mask(&self) -> i32 {
        self.mask
    }

    pub fn filter(&self) -> CollisionFilter {
        CollisionFilter::new(self.group, self.mask)
    }

    pub fn is_kinematic(&self) -> bool {
        self.kinematic
    }

    pub fn is_trigger(&self) -> bool {
        self.trigger
    }

    pub fn is_ccd(&self) -> bool {
        self.ccd
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_activated(&self) -> bool {
        self.activated
    }

    pub fn previous_scale(&self) -> Vec3 {
        self.previous_scale
    }

    pub fn position_offset(&self) -> Vec3 {
        self.position_offset
    }

    pub fn constraints(&self) -> &[ConstraintKey] {
        &self.constraints
    }

    /// Offset from the transform origin to the body origin, in world space.
    pub(crate) fn world_offset(&self, rotation: glam::Quat, scale: Vec3) -> Vec3 {
        rotation * (self.position_offset * scale)
    }

    /// Kinematic objects get their own filter pair, no velocities and never sleep.
    pub(crate) fn apply_kinematic_policy(&mut self) {
        if self.kinematic {
            self.group = KINEMATIC_GROUP;
            self.mask = KINEMATIC_MASK;
            self.linear_velocity.assign(Vec3::ZERO, true);
            self.angular_velocity.assign(Vec3::ZERO, true);
            self.activation_state
                .assign(ActivationState::DisableDeactivation, true);
        } else {
            self.group = DEFAULT_GROUP;
            self.mask = DEFAULT_MASK;
            self.activation_state.assign(ActivationState::Active, true);
        }
    }

    pub(crate) fn write_mass(&self, object: &mut CollisionObject) {
        let mass = self.effective_mass();
        match &mut object.body {
            BodyKind::Rigid(body) => {
                let inertia = if self.kinematic {
                    Vec3::ZERO
                } else {
                    body.shape.calculate_local_inertia(mass)
                };
                body.set_mass_props(mass, inertia);
            }
            BodyKind::Soft(body) => body.set_total_mass(mass),
        }
    }

    pub(crate) fn write_velocities(&self, object: &mut CollisionObject) {
        let linear = self.linear_velocity.get();
        let angular = self.angular_velocity.get();
        match &mut object.body {
            BodyKind::Rigid(body) => {
                body.linear_velocity = linear;
                body.angular_velocity = angular;
            }
            BodyKind::Soft(body) => body.set_velocity(linear),
        }
    }

    pub(crate) fn write_factors(&self, object: &mut CollisionObject) {
        if let Some(body) = object.as_rigid_mut() {
            body.linear_factor = self.linear_factor.get();
            body.angular_factor = self.angular_factor.get();
        }
    }

    pub(crate) fn write_sleeping_thresholds(&self, object: &mut CollisionObject) {
        if let Some(body) = object.as_rigid_mut() {
            body.linear_sleeping_threshold = self.linear_sleeping_threshold.get();
            body.angular_sleeping_threshold = self.angular_sleeping_threshold.get();
        }
    }

    pub(crate) fn write_flags(&self, object: &mut CollisionObject) {
        object.flags.set(CollisionFlags::KINEMATIC, self.kinematic);
        object
            .flags
            .set(CollisionFlags::NO_CONTACT_RESPONSE, self.trigger);
        object.flags.insert(CollisionFlags::CUSTOM_MATERIAL_CALLBACK);
    }

    pub(crate) fn write_ccd(&self, object: &mut CollisionObject) {
        if self.ccd {
            object.ccd_motion_threshold = CCD_MOTION_THRESHOLD;
            object.ccd_swept_sphere_radius = CCD_SWEPT_SPHERE_RADIUS;
        } else {
            object.ccd_motion_threshold = f32::MAX;
            object.ccd_swept_sphere_radius = 0.0;
        }
    }

    /// Writes every cached property to a freshly built body.
    pub(crate) fn write_all(&self, object: &mut CollisionObject) {
        self.write_flags(object);
        self.write_mass(object);
        object.friction = self.friction.get();
        object.restitution = self.restitution.get();
        self.write_velocities(object);
        self.write_factors(object);
        self.write_ccd(object);
        self.write_sleeping_thresholds(object);
        object.force_activation_state(self.activation_state.get());
    }

    pub fn to_state(&self, constraints: Vec<ConstraintDocument>) -> PhysicsObjectState {
        PhysicsObjectState {
            mass: self.mass.get(),
            restitution: self.restitution.get(),
            friction: self.friction.get(),
            linear_velocity: self.linear_velocity.get(),
            angular_velocity: self.angular_velocity.get(),
            linear_factor: self.linear_factor.get(),
            angular_factor: self.angular_factor.get(),
            is_kinematic: self.kinematic,
            is_trigger: self.trigger,
            is_enabled: self.enabled,
            scale: self.previous_scale,
            group: self.group,
            mask: self.mask,
            ccd: self.ccd,
            margin: self.margin.get(),
            linear_sleeping_threshold: self.linear_sleeping_threshold.get(),
            angular_sleeping_threshold: self.angular_sleeping_threshold.get(),
            activation_state: self.activation_state.get().raw(),
            offset: self.position_offset,
            collider: self.collider.clone(),
            soft_body: self.soft.as_ref().map(SoftBodyAdapter::to_state),
            consts: constraints,
        }
    }

    /// Rebuilds the record from persisted state. Constraints are restored separately.
    pub fn from_state(owner: ObjectId, state: &PhysicsObjectState) -> Self {
        let mut object = Self::new(owner, state.collider.clone());
        object.soft = state.soft_body.as_ref().map(SoftBodyAdapter::from_state);
        object.mass = Shadowed::new(state.mass.max(0.0));
        object.restitution = Shadowed::new(state.restitution);
        object.friction = Shadowed::new(state.friction);
        object.linear_velocity = Shadowed::new(state.linear_velocity);
        object.angular_velocity = Shadowed::new(state.angular_velocity);
        object.linear_factor = Shadowed::new(state.linear_factor);
        object.angular_factor = Shadowed::new(state.angular_factor);
        object.margin = Shadowed::new(state.margin.max(0.0));
        object.linear_sleeping_threshold = Shadowed::new(state.linear_sleeping_threshold);
        object.angular_sleeping_threshold = Shadowed::new(state.angular_sleeping_threshold);
        object.activation_state = Shadowed::new(ActivationState::from_raw(state.activation_state));
        object.kinematic = state.is_kinematic;
        object.trigger = state.is_trigger;
        object.ccd = state.ccd;
        object.enabled = state.is_enabled;
        object.previous_scale = state.scale;
        object.position_offset = state.offset;
        object.group = state.group;
        object.mask = state.mask;
        if object.kinematic {
            object.apply_kinematic_policy();
        }
        object
    }
}

/// Persisted form of a physics object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PhysicsObjectState {
    pub mass: f32,
    pub restitution: f32,
    pub friction: f32,
    pub linear_velocity: Vec3,
    pub angular_velocity: Vec3,
    pub linear_factor: Vec3,
    pub angular_factor: Vec3,
    pub is_kinematic: bool,
    pub is_trigger: bool,
    pub is_enabled: bool,
    pub scale: Vec3,
    pub group: i32,
    pub mask: i32,
    pub ccd: bool,
    pub margin: f32,
    pub linear_sleeping_threshold: f32,
    pub angular_sleeping_threshold: f32,
    #[serde(rename = "activeState")]
    pub activation_state: i32,
    pub offset: Vec3,
    pub collider: Collider,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub soft_body: Option<SoftBodyState>,
    pub consts: Vec<ConstraintDocument>,
}

impl Default for PhysicsObjectState {
    fn default() -> Self {
        PhysicsObject::new(ObjectId::new(0, 0), Collider::default()).to_state(Vec::new())
    }
}
