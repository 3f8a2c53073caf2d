//! Constraints linking a physics object to another object or to the world.
//!
//! A [`Constraint`] only stores parameters. The native joint is built from them by the
//! [`PhysicsManager`] and rebuilt from scratch whenever a parameter changes.

use std::f32::consts::PI;
use std::fmt;

use glam::Vec3;
use log::{debug, warn};
use serde::de::{self, SeqAccess, Visitor};
use serde::ser::SerializeTuple;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::backend::{BodyHandle, CollisionObject, Joint, JointHandle, PhysicsBackend, Pose};
use crate::physics::manager::PhysicsManager;
use crate::physics::object::ObjectKey;
use crate::scene::SceneGraph;
use crate::utils::allocator::Handle;

pub type ConstraintKey = Handle<Constraint>;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HingeParams {
    /// Anchor point in the owner's local space.
    pub anchor: Vec3,
    /// Steering axis in the owner's local space.
    pub axis: Vec3,
    /// Rolling axis in the owner's local space.
    #[serde(rename = "axis2")]
    pub other_axis: Vec3,
    /// Angular limits around `axis`.
    #[serde(rename = "low")]
    pub lower_limit: f32,
    #[serde(rename = "up")]
    pub upper_limit: f32,
}

impl Default for HingeParams {
    fn default() -> Self {
        Self {
            anchor: Vec3::ZERO,
            axis: Vec3::Y,
            other_axis: Vec3::X,
            lower_limit: -PI,
            upper_limit: PI,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SliderParams {
    #[serde(rename = "low")]
    pub lower_limit: Vec3,
    #[serde(rename = "up")]
    pub upper_limit: Vec3,
}

/// Linear springs. The default limits leave every linear axis free.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpringParams {
    #[serde(rename = "low")]
    pub lower_limit: Vec3,
    #[serde(rename = "up")]
    pub upper_limit: Vec3,
    #[serde(rename = "enable")]
    pub enabled: [bool; 3],
    #[serde(rename = "stiff")]
    pub stiffness: Vec3,
    #[serde(rename = "damp")]
    pub damping: Vec3,
}

impl Default for SpringParams {
    fn default() -> Self {
        Self {
            lower_limit: Vec3::ONE,
            upper_limit: Vec3::ZERO,
            enabled: [true, false, false],
            stiffness: Vec3::new(10.0, 0.0, 0.0),
            damping: Vec3::new(0.5, 0.0, 0.0),
        }
    }
}

/// Every degree of freedom configurable. Also the common form the other generic variants are
/// lowered to before a joint is built.
///
/// Defaults leave all six axes free (lower limit above upper limit).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Dof6SpringParams {
    #[serde(rename = "lLow")]
    pub linear_lower_limit: Vec3,
    #[serde(rename = "lUp")]
    pub linear_upper_limit: Vec3,
    #[serde(rename = "lVel")]
    pub linear_velocity: Vec3,
    #[serde(rename = "aLow")]
    pub angular_lower_limit: Vec3,
    #[serde(rename = "aUp")]
    pub angular_upper_limit: Vec3,
    #[serde(rename = "aVel")]
    pub angular_velocity: Vec3,
    #[serde(rename = "lBounce")]
    pub linear_bounce: Vec3,
    #[serde(rename = "aBounce")]
    pub angular_bounce: Vec3,
    #[serde(rename = "lSpring")]
    pub linear_spring: [bool; 3],
    #[serde(rename = "lStiff")]
    pub linear_stiffness: Vec3,
    #[serde(rename = "lDamp")]
    pub linear_damping: Vec3,
    #[serde(rename = "aSpring")]
    pub angular_spring: [bool; 3],
    #[serde(rename = "aStiff")]
    pub angular_stiffness: Vec3,
    #[serde(rename = "aDamp")]
    pub angular_damping: Vec3,
    #[serde(rename = "lMotor")]
    pub linear_motor: [bool; 3],
    #[serde(rename = "lMForce")]
    pub linear_max_motor_force: Vec3,
    #[serde(rename = "lServo")]
    pub linear_servo: [bool; 3],
    #[serde(rename = "lSTarget")]
    pub linear_servo_target: Vec3,
    #[serde(rename = "aMotor")]
    pub angular_motor: [bool; 3],
    #[serde(rename = "aMForce")]
    pub angular_max_motor_force: Vec3,
    #[serde(rename = "aServo")]
    pub angular_servo: [bool; 3],
    #[serde(rename = "aSTarget")]
    pub angular_servo_target: Vec3,
}

impl Default for Dof6SpringParams {
    fn default() -> Self {
        Self {
            linear_lower_limit: Vec3::ONE,
            linear_upper_limit: Vec3::ZERO,
            linear_velocity: Vec3::ZERO,
            angular_lower_limit: Vec3::ONE,
            angular_upper_limit: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            linear_bounce: Vec3::ZERO,
            angular_bounce: Vec3::ZERO,
            linear_spring: [false; 3],
            linear_stiffness: Vec3::ZERO,
            linear_damping: Vec3::ZERO,
            angular_spring: [false; 3],
            angular_stiffness: Vec3::ZERO,
            angular_damping: Vec3::ZERO,
            linear_motor: [false; 3],
            linear_max_motor_force: Vec3::ZERO,
            linear_servo: [false; 3],
            linear_servo_target: Vec3::ZERO,
            angular_motor: [false; 3],
            angular_max_motor_force: Vec3::ZERO,
            angular_servo: [false; 3],
            angular_servo_target: Vec3::ZERO,
        }
    }
}

fn six([a, b, c]: [bool; 3], [d, e, f]: [bool; 3]) -> [bool; 6] {
    [a, b, c, d, e, f]
}

impl Dof6SpringParams {
    /// Limits, target velocities and bounce. Applied before the joint is created.
    fn apply_limits(&self, joint: &mut Joint) {
        joint.set_linear_lower_limit(self.linear_lower_limit);
        joint.set_linear_upper_limit(self.linear_upper_limit);
        joint.set_angular_lower_limit(self.angular_lower_limit);
        joint.set_angular_upper_limit(self.angular_upper_limit);
        joint.set_target_velocity(false, self.linear_velocity);
        joint.set_target_velocity(true, self.angular_velocity);
        joint.set_bounce(false, self.linear_bounce);
        joint.set_bounce(true, self.angular_bounce);
    }

    /// Springs, motors and servos. Spring rest positions are captured from the live joint, so
    /// this runs after creation.
    fn apply_drives(&self, world: &mut dyn PhysicsBackend, handle: JointHandle) {
        let springs = six(self.linear_spring, self.angular_spring);
        if let Some(joint) = world.joint_mut(handle) {
            for (axis, enabled) in springs.into_iter().enumerate() {
                joint.enable_spring(axis, enabled);
                if !enabled {
                    joint.axes[axis].equilibrium_point = 0.0;
                }
            }
        }
        for (axis, _) in springs.into_iter().enumerate().filter(|(_, enabled)| *enabled) {
            world.set_joint_equilibrium_point(handle, axis);
        }

        let Some(joint) = world.joint_mut(handle) else {
            return;
        };
        joint.set_stiffness(false, self.linear_stiffness);
        joint.set_stiffness(true, self.angular_stiffness);
        joint.set_damping(false, self.linear_damping);
        joint.set_damping(true, self.angular_damping);

        for (axis, enabled) in six(self.linear_motor, self.angular_motor)
            .into_iter()
            .enumerate()
        {
            joint.enable_motor(axis, enabled);
        }
        joint.set_max_motor_force(false, self.linear_max_motor_force);
        joint.set_max_motor_force(true, self.angular_max_motor_force);

        for (axis, enabled) in six(self.linear_servo, self.angular_servo)
            .into_iter()
            .enumerate()
        {
            joint.set_servo(axis, enabled);
        }
        joint.set_servo_target(false, self.linear_servo_target);
        joint.set_servo_target(true, self.angular_servo_target);
    }
}

/// Closed set of constraint kinds with their parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstraintParams {
    Fixed,
    Hinge(HingeParams),
    Slider(SliderParams),
    Spring(SpringParams),
    Dof6Spring(Dof6SpringParams),
}

impl ConstraintParams {
    /// Persisted type id.
    pub fn type_id(&self) -> u8 {
        match self {
            ConstraintParams::Fixed => 0,
            ConstraintParams::Hinge(_) => 1,
            ConstraintParams::Slider(_) => 2,
            ConstraintParams::Spring(_) => 3,
            ConstraintParams::Dof6Spring(_) => 4,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ConstraintParams::Fixed => "fixed",
            ConstraintParams::Hinge(_) => "hinge",
            ConstraintParams::Slider(_) => "slider",
            ConstraintParams::Spring(_) => "spring",
            ConstraintParams::Dof6Spring(_) => "dof6-spring",
        }
    }

    /// The variant expressed as six generic axes. Fixed and hinge joints have their own kinds.
    fn generic_axes(&self) -> Option<Dof6SpringParams> {
        match self {
            ConstraintParams::Fixed | ConstraintParams::Hinge(_) => None,
            ConstraintParams::Slider(slider) => Some(Dof6SpringParams {
                linear_lower_limit: slider.lower_limit,
                linear_upper_limit: slider.upper_limit,
                angular_lower_limit: Vec3::ZERO,
                ..Default::default()
            }),
            ConstraintParams::Spring(spring) => Some(Dof6SpringParams {
                linear_lower_limit: spring.lower_limit,
                linear_upper_limit: spring.upper_limit,
                linear_spring: spring.enabled,
                linear_stiffness: spring.stiffness,
                linear_damping: spring.damping,
                angular_lower_limit: Vec3::ZERO,
                ..Default::default()
            }),
            ConstraintParams::Dof6Spring(dof) => Some(*dof),
        }
    }

    /// Builds the joint with both attachment frames matching the current placement.
    fn build_joint(
        &self,
        body_a: BodyHandle,
        pose_a: Pose,
        other: Option<(BodyHandle, Pose)>,
    ) -> Joint {
        let body_b = other.map(|(body, _)| body);
        let frame_b = match other {
            Some((_, pose_b)) => pose_b.inverse() * pose_a,
            None => pose_a,
        };
        match self {
            ConstraintParams::Fixed => Joint::fixed(body_a, body_b, Pose::IDENTITY, frame_b),
            ConstraintParams::Hinge(hinge) => {
                let mut joint = Joint::hinge2(
                    body_a,
                    pose_a,
                    other,
                    pose_a.transform_point(hinge.anchor),
                    pose_a.rotation * hinge.axis,
                    pose_a.rotation * hinge.other_axis,
                );
                joint.axes[5].lower = hinge.lower_limit;
                joint.axes[5].upper = hinge.upper_limit;
                joint
            }
            _ => {
                let mut joint = Joint::generic_spring(body_a, body_b, Pose::IDENTITY, frame_b);
                if let Some(axes) = self.generic_axes() {
                    axes.apply_limits(&mut joint);
                }
                joint
            }
        }
    }
}

/// Settings shared by every constraint kind.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConstraintSettings {
    #[serde(rename = "colBody")]
    pub collide_connected: bool,
    #[serde(rename = "breakImp")]
    pub breaking_impulse_threshold: f32,
    /// Uuid of the scene object owning the other body. `None` anchors to the world.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub other: Option<Uuid>,
    pub enabled: bool,
}

impl Default for ConstraintSettings {
    fn default() -> Self {
        Self {
            collide_connected: true,
            breaking_impulse_threshold: f32::MAX,
            other: None,
            enabled: true,
        }
    }
}

/// Persisted constraint, encoded as `[typeId, payload]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintDocument {
    pub params: ConstraintParams,
    pub settings: ConstraintSettings,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct NoParams {}

#[derive(Serialize)]
struct Payload<'a, P> {
    #[serde(flatten)]
    params: &'a P,
    #[serde(flatten)]
    settings: &'a ConstraintSettings,
}

#[derive(Deserialize)]
struct OwnedPayload<P> {
    #[serde(flatten)]
    params: P,
    #[serde(flatten)]
    settings: ConstraintSettings,
}

impl Serialize for ConstraintDocument {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let settings = &self.settings;
        let mut pair = serializer.serialize_tuple(2)?;
        pair.serialize_element(&self.params.type_id())?;
        match &self.params {
            ConstraintParams::Fixed => pair.serialize_element(&Payload {
                params: &NoParams {},
                settings,
            })?,
            ConstraintParams::Hinge(params) => pair.serialize_element(&Payload { params, settings })?,
            ConstraintParams::Slider(params) => pair.serialize_element(&Payload { params, settings })?,
            ConstraintParams::Spring(params) => pair.serialize_element(&Payload { params, settings })?,
            ConstraintParams::Dof6Spring(params) => {
                pair.serialize_element(&Payload { params, settings })?
            }
        }
        pair.end()
    }
}

struct DocumentVisitor;

fn payload<'de, A, P>(seq: &mut A) -> Result<OwnedPayload<P>, A::Error>
where
    A: SeqAccess<'de>,
    P: Deserialize<'de>,
{
    seq.next_element()?
        .ok_or_else(|| de::Error::invalid_length(1, &"a [typeId, payload] pair"))
}

impl<'de> Visitor<'de> for DocumentVisitor {
    type Value = ConstraintDocument;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a [typeId, payload] constraint pair")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let type_id: u8 = seq
            .next_element()?
            .ok_or_else(|| de::Error::invalid_length(0, &self))?;
        let (params, settings) = match type_id {
            0 => {
                let wire: OwnedPayload<NoParams> = payload(&mut seq)?;
                (ConstraintParams::Fixed, wire.settings)
            }
            1 => {
                let wire = payload(&mut seq)?;
                (ConstraintParams::Hinge(wire.params), wire.settings)
            }
            2 => {
                let wire = payload(&mut seq)?;
                (ConstraintParams::Slider(wire.params), wire.settings)
            }
            3 => {
                let wire = payload(&mut seq)?;
                (ConstraintParams::Spring(wire.params), wire.settings)
            }
            4 => {
                let wire = payload(&mut seq)?;
                (ConstraintParams::Dof6Spring(wire.params), wire.settings)
            }
            other => {
                return Err(de::Error::invalid_value(
                    de::Unexpected::Unsigned(u64::from(other)),
                    &"a constraint type id in 0..=4",
                ))
            }
        };
        Ok(ConstraintDocument { params, settings })
    }
}

impl<'de> Deserialize<'de> for ConstraintDocument {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_tuple(2, DocumentVisitor)
    }
}

/// A constraint owned by a physics object.
#[derive(Debug, Clone)]
pub struct Constraint {
    pub(crate) owner: ObjectKey,
    pub(crate) other: Option<ObjectKey>,
    pub(crate) params: ConstraintParams,
    pub(crate) settings: ConstraintSettings,
    pub(crate) joint: Option<JointHandle>,
    /// `settings.other` waits for the link pass.
    pub(crate) pending_link: bool,
}

impl Constraint {
    pub(crate) fn new(owner: ObjectKey, params: ConstraintParams) -> Self {
        Self {
            owner,
            other: None,
            params,
            settings: ConstraintSettings::default(),
            joint: None,
            pending_link: false,
        }
    }

    pub fn owner(&self) -> ObjectKey {
        self.owner
    }

    pub fn other(&self) -> Option<ObjectKey> {
        self.other
    }

    pub fn params(&self) -> &ConstraintParams {
        &self.params
    }

    pub fn settings(&self) -> &ConstraintSettings {
        &self.settings
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    pub fn is_collide_connected(&self) -> bool {
        self.settings.collide_connected
    }

    pub fn breaking_impulse_threshold(&self) -> f32 {
        self.settings.breaking_impulse_threshold
    }

    pub fn joint(&self) -> Option<JointHandle> {
        self.joint
    }

    pub fn is_active(&self) -> bool {
        self.joint.is_some()
    }

    pub fn involves(&self, object: ObjectKey) -> bool {
        self.owner == object || self.other == Some(object)
    }
}

/// Mutable view of a constraint. Every effective change rebuilds the joint.
pub struct ConstraintMut<'a> {
    manager: &'a mut PhysicsManager,
    key: ConstraintKey,
}

impl<'a> ConstraintMut<'a> {
    pub(crate) fn new(manager: &'a mut PhysicsManager, key: ConstraintKey) -> Self {
        Self { manager, key }
    }

    pub fn key(&self) -> ConstraintKey {
        self.key
    }

    fn get(&self) -> Option<&Constraint> {
        self.manager.constraints.get(self.key)
    }

    fn edit(&mut self, apply: impl FnOnce(&mut Constraint) -> bool) -> bool {
        let changed = self
            .manager
            .constraints
            .get_mut(self.key)
            .is_some_and(apply);
        if changed {
            self.manager.recreate_joint(self.key);
        }
        changed
    }

    pub fn params(&self) -> Option<&ConstraintParams> {
        self.get().map(Constraint::params)
    }

    pub fn set_params(&mut self, params: ConstraintParams) -> bool {
        self.edit(|constraint| {
            if constraint.params == params {
                return false;
            }
            constraint.params = params;
            true
        })
    }

    /// Edits the parameters in place; the joint is rebuilt only if they changed.
    pub fn update_params(&mut self, update: impl FnOnce(&mut ConstraintParams)) -> bool {
        self.edit(|constraint| {
            let before = constraint.params.clone();
            update(&mut constraint.params);
            constraint.params != before
        })
    }

    pub fn set_breaking_impulse_threshold(&mut self, threshold: f32) -> bool {
        self.edit(|constraint| {
            if constraint.settings.breaking_impulse_threshold == threshold {
                return false;
            }
            constraint.settings.breaking_impulse_threshold = threshold;
            true
        })
    }

    /// Links to another object immediately. `None` anchors the constraint to the world.
    pub fn set_other(&mut self, other: Option<ObjectKey>) -> bool {
        let other = other.filter(|key| self.manager.objects.contains(*key));
        self.edit(|constraint| {
            if constraint.other == other && !constraint.pending_link {
                return false;
            }
            constraint.other = other;
            constraint.settings.other = None;
            constraint.pending_link = false;
            true
        })
    }

    /// Records the other object's scene uuid; resolved by the next link pass.
    pub fn set_other_uuid(&mut self, uuid: Option<Uuid>) {
        if let Some(constraint) = self.manager.constraints.get_mut(self.key) {
            constraint.settings.other = uuid;
            constraint.pending_link = true;
        }
    }

    /// Adds the joint to or removes it from the world without rebuilding it.
    pub fn set_enabled(&mut self, enabled: bool) -> bool {
        let Some(constraint) = self.manager.constraints.get_mut(self.key) else {
            return false;
        };
        if constraint.settings.enabled == enabled {
            return false;
        }
        constraint.settings.enabled = enabled;
        if enabled {
            self.manager.register_joint(self.key);
        } else {
            self.manager.unregister_joint(self.key);
        }
        true
    }

    /// Re-registers the joint so the collision override takes effect.
    pub fn set_collide_connected(&mut self, collide: bool) -> bool {
        let Some(constraint) = self.manager.constraints.get_mut(self.key) else {
            return false;
        };
        if constraint.settings.collide_connected == collide {
            return false;
        }
        constraint.settings.collide_connected = collide;
        self.manager.unregister_joint(self.key);
        self.manager.register_joint(self.key);
        true
    }

    /// `true` once the solver broke the joint.
    pub fn is_broken(&self) -> bool {
        self.manager.is_constraint_broken(self.key)
    }
}

impl PhysicsManager {
    pub fn constraint(&self, key: ConstraintKey) -> Option<&Constraint> {
        self.constraints.get(key)
    }

    pub fn constraint_mut(&mut self, key: ConstraintKey) -> Option<ConstraintMut<'_>> {
        if !self.constraints.contains(key) {
            return None;
        }
        Some(ConstraintMut::new(self, key))
    }

    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }

    /// Attaches a new constraint to `owner` and builds its joint if the world is live.
    pub fn add_constraint(
        &mut self,
        owner: ObjectKey,
        params: ConstraintParams,
    ) -> Option<ConstraintKey> {
        self.insert_constraint(owner, Constraint::new(owner, params))
    }

    pub(crate) fn insert_constraint(
        &mut self,
        owner: ObjectKey,
        constraint: Constraint,
    ) -> Option<ConstraintKey> {
        if !self.objects.contains(owner) {
            return None;
        }
        let key = self.constraints.insert(constraint);
        if let Some(object) = self.objects.get_mut(owner) {
            object.constraints.push(key);
        }
        self.create_joint(key);
        Some(key)
    }

    pub(crate) fn restore_constraint(
        &mut self,
        owner: ObjectKey,
        document: &ConstraintDocument,
    ) -> Option<ConstraintKey> {
        let mut constraint = Constraint::new(owner, document.params.clone());
        constraint.settings = document.settings;
        constraint.pending_link = document.settings.other.is_some();
        self.insert_constraint(owner, constraint)
    }

    pub fn remove_constraint(&mut self, key: ConstraintKey) -> bool {
        self.destroy_joint(key);
        let Some(constraint) = self.constraints.remove(key) else {
            return false;
        };
        if let Some(object) = self.objects.get_mut(constraint.owner) {
            object.constraints.retain(|owned| *owned != key);
        }
        true
    }

    /// Persisted form. A linked other object is written as its owner's uuid.
    pub fn constraint_document(
        &self,
        graph: &SceneGraph,
        key: ConstraintKey,
    ) -> Option<ConstraintDocument> {
        let constraint = self.constraints.get(key)?;
        let mut settings = constraint.settings;
        if let Some(other) = constraint.other {
            settings.other = self
                .objects
                .get(other)
                .and_then(|object| graph.get(object.owner))
                .map(|scene_object| scene_object.uuid());
        }
        Some(ConstraintDocument {
            params: constraint.params.clone(),
            settings,
        })
    }

    /// Resolves pending `other` uuids against the scene and rebuilds those constraints.
    /// Unresolved references fall back to the world anchor.
    pub fn link_constraints(&mut self, graph: &SceneGraph) -> usize {
        let pending: Vec<ConstraintKey> = self
            .constraints
            .iter()
            .filter(|(_, constraint)| constraint.pending_link)
            .map(|(key, _)| key)
            .collect();
        for key in &pending {
            let Some(constraint) = self.constraints.get(*key) else {
                continue;
            };
            let other = constraint.settings.other.and_then(|uuid| {
                let resolved = graph
                    .find_by_uuid(&uuid)
                    .and_then(|owner| self.object_of(owner));
                if resolved.is_none() {
                    warn!("constraint references unknown object {uuid}, anchoring to world");
                }
                resolved
            });
            if let Some(constraint) = self.constraints.get_mut(*key) {
                constraint.other = other;
                constraint.pending_link = false;
            }
            self.recreate_joint(*key);
        }
        pending.len()
    }

    pub(crate) fn has_pending_links(&self) -> bool {
        self.constraints
            .iter()
            .any(|(_, constraint)| constraint.pending_link)
    }

    pub(crate) fn constraints_involving(&self, object: ObjectKey) -> Vec<ConstraintKey> {
        self.constraints
            .iter()
            .filter(|(_, constraint)| constraint.involves(object))
            .map(|(key, _)| key)
            .collect()
    }

    pub(crate) fn recreate_joints_of(&mut self, object: ObjectKey) {
        for key in self.constraints_involving(object) {
            self.recreate_joint(key);
        }
    }

    pub(crate) fn destroy_joints_of(&mut self, object: ObjectKey) {
        for key in self.constraints_involving(object) {
            self.destroy_joint(key);
        }
    }

    pub(crate) fn recreate_joint(&mut self, key: ConstraintKey) -> bool {
        self.destroy_joint(key);
        self.create_joint(key)
    }

    /// Builds the joint: limits, creation, drives, threshold, then world registration.
    pub(crate) fn create_joint(&mut self, key: ConstraintKey) -> bool {
        self.destroy_joint(key);
        let Some(world) = self.world.as_deref_mut() else {
            return false;
        };
        let Some(constraint) = self.constraints.get(key) else {
            return false;
        };
        let Some(body_a) = self
            .objects
            .get(constraint.owner)
            .filter(|object| !object.is_soft())
            .and_then(|object| object.body)
        else {
            return false;
        };
        let Some(pose_a) = world.body(body_a).map(CollisionObject::pose) else {
            return false;
        };
        let other = constraint
            .other
            .and_then(|other| self.objects.get(other))
            .filter(|object| !object.is_soft())
            .and_then(|object| object.body)
            .and_then(|body| world.body(body).map(|native| (body, native.pose())));

        let joint = constraint.params.build_joint(body_a, pose_a, other);
        let Some(handle) = world.create_joint(joint) else {
            return false;
        };
        if let Some(axes) = constraint.params.generic_axes() {
            axes.apply_drives(world, handle);
        }
        if let Some(joint) = world.joint_mut(handle) {
            joint.breaking_impulse_threshold = constraint.settings.breaking_impulse_threshold;
        }

        let in_world = world.is_in_world(body_a)
            && other.is_none_or(|(body, _)| world.is_in_world(body));
        if constraint.settings.enabled && in_world {
            world.add_joint(handle, !constraint.settings.collide_connected);
        }
        debug!("created {} joint {:?}", constraint.params.name(), handle);

        if let Some(constraint) = self.constraints.get_mut(key) {
            constraint.joint = Some(handle);
        }
        true
    }

    pub(crate) fn destroy_joint(&mut self, key: ConstraintKey) -> bool {
        let Some(handle) = self
            .constraints
            .get_mut(key)
            .and_then(|constraint| constraint.joint.take())
        else {
            return false;
        };
        if let Some(world) = self.world.as_deref_mut() {
            world.remove_joint(handle);
            world.destroy_joint(handle);
        }
        true
    }

    pub(crate) fn register_joint(&mut self, key: ConstraintKey) -> bool {
        let Some(constraint) = self.constraints.get(key) else {
            return false;
        };
        let (Some(handle), Some(world)) = (constraint.joint, self.world.as_deref_mut()) else {
            return false;
        };
        let in_world = world.joint(handle).is_some_and(|joint| {
            world.is_in_world(joint.body_a)
                && joint.body_b.is_none_or(|body| world.is_in_world(body))
        });
        constraint.settings.enabled
            && in_world
            && world.add_joint(handle, !constraint.settings.collide_connected)
    }

    pub(crate) fn unregister_joint(&mut self, key: ConstraintKey) -> bool {
        let handle = self.constraints.get(key).and_then(|constraint| constraint.joint);
        match (handle, self.world.as_deref_mut()) {
            (Some(handle), Some(world)) => world.remove_joint(handle),
            _ => false,
        }
    }

    pub fn is_constraint_broken(&self, key: ConstraintKey) -> bool {
        let handle = self.constraints.get(key).and_then(|constraint| constraint.joint);
        match (handle, self.world.as_deref()) {
            (Some(handle), Some(world)) => world.joint(handle).is_some_and(|joint| !joint.enabled),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documents_are_type_tagged_pairs() {
        let document = ConstraintDocument {
            params: ConstraintParams::Hinge(HingeParams {
                lower_limit: -0.5,
                ..Default::default()
            }),
            settings: ConstraintSettings {
                collide_connected: false,
                ..Default::default()
            },
        };
        let json = serde_json::to_value(&document).expect("serialize");
        assert_eq!(json[0], 1);
        assert_eq!(json[1]["low"], -0.5);
        assert_eq!(json[1]["axis"], serde_json::json!([0.0, 1.0, 0.0]));
        assert_eq!(json[1]["colBody"], false);
        assert!(json[1].get("other").is_none());

        let back: ConstraintDocument = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, document);
    }

    #[test]
    fn missing_payload_keys_use_variant_defaults() {
        let document: ConstraintDocument =
            serde_json::from_str(r#"[3, {"breakImp": 25.0}]"#).expect("deserialize");
        assert_eq!(document.params, ConstraintParams::Spring(SpringParams::default()));
        assert_eq!(document.settings.breaking_impulse_threshold, 25.0);
        assert!(document.settings.enabled);
    }

    #[test]
    fn unknown_type_id_is_rejected() {
        let result: Result<ConstraintDocument, _> = serde_json::from_str("[9, {}]");
        assert!(result.is_err());
    }

    #[test]
    fn spring_lowers_to_free_linear_axes() {
        let axes = ConstraintParams::Spring(SpringParams::default())
            .generic_axes()
            .expect("generic");
        let mut joint = Joint::generic_spring(
            BodyHandle::new(0, 0),
            None,
            Pose::IDENTITY,
            Pose::IDENTITY,
        );
        axes.apply_limits(&mut joint);
        assert!(joint.axes[..3].iter().all(|axis| axis.is_free()));
        assert!(joint.axes[3..].iter().all(|axis| axis.is_locked()));
        assert_eq!(axes.linear_spring, [true, false, false]);
    }
}
