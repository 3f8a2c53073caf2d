//! Global configuration constants and the per-scene physics world settings.

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Default gravity vector applied in the physics world (Y-up).
pub const DEFAULT_GRAVITY: [f32; 3] = [0.0, -9.81, 0.0];

/// Default fixed solver step (in seconds).
pub const DEFAULT_FIXED_TIME_STEP: f32 = 1.0 / 240.0;

/// Maximum number of fixed sub-steps taken for a single frame.
pub const DEFAULT_MAX_SUB_STEPS: u32 = 4;

/// Number of constraint solver iterations performed per sub-step.
pub const DEFAULT_SOLVER_ITERATIONS: u32 = 10;

/// Multiplier applied to the frame delta before stepping.
pub const DEFAULT_TIME_RATIO: f32 = 1.0;

/// Squared scale change that forces a physics body rebuild.
pub const SCALE_REBUILD_THRESHOLD_SQUARED: f32 = 0.01;

/// Smallest mass handed to the solver for a dynamic body.
pub const MIN_DYNAMIC_MASS: f32 = 1e-7;

/// Default collision margin of generated shapes.
pub const DEFAULT_COLLISION_MARGIN: f32 = 0.025;

/// Default collision group and mask for dynamic bodies.
pub const DEFAULT_GROUP: i32 = 1;
pub const DEFAULT_MASK: i32 = -1;

/// Collision group and mask forced on kinematic bodies.
pub const KINEMATIC_GROUP: i32 = 2;
pub const KINEMATIC_MASK: i32 = 3;

pub const DEFAULT_LINEAR_SLEEPING_THRESHOLD: f32 = 0.8;
pub const DEFAULT_ANGULAR_SLEEPING_THRESHOLD: f32 = 1.0;

/// Seconds a body has to stay below its sleeping thresholds before it is deactivated.
pub const DEACTIVATION_TIME: f32 = 2.0;

/// Continuous collision detection parameters applied while CCD is enabled.
pub const CCD_MOTION_THRESHOLD: f32 = 0.001;
pub const CCD_SWEPT_SPHERE_RADIUS: f32 = 0.5;

/// Positional correction tuning for the contact solver.
pub const POSITION_CORRECTION_PERCENT: f32 = 0.2;
pub const POSITION_CORRECTION_SLOP: f32 = 0.01;

/// Distance used when bending constraints are generated for soft bodies.
pub const SOFT_BODY_BENDING_DISTANCE: u32 = 2;

/// Frame budget used for the physics update warning.
pub const FRAME_BUDGET_MS: f32 = 16.0;

/// Per-scene configuration of the physics world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldSettings {
    /// Selects the soft-body capable world variant. Takes effect on the next initialization.
    #[serde(rename = "deform")]
    pub deformable: bool,
    #[serde(rename = "numIter")]
    pub solver_iterations: u32,
    #[serde(rename = "timeStep")]
    pub fixed_time_step: f32,
    #[serde(rename = "maxSupStep")]
    pub max_sub_steps: u32,
    #[serde(rename = "timeRatio")]
    pub time_ratio: f32,
    pub gravity: Vec3,
    #[serde(rename = "debug")]
    pub show_debug: bool,
}

impl Default for WorldSettings {
    fn default() -> Self {
        Self {
            deformable: false,
            solver_iterations: DEFAULT_SOLVER_ITERATIONS,
            fixed_time_step: DEFAULT_FIXED_TIME_STEP,
            max_sub_steps: DEFAULT_MAX_SUB_STEPS,
            time_ratio: DEFAULT_TIME_RATIO,
            gravity: Vec3::from_array(DEFAULT_GRAVITY),
            show_debug: false,
        }
    }
}
