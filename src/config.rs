//! Tuning constants and the per-world configuration for the Particle Accelerator engine.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::error::{PhysicsError, PhysicsResult};

/// Default gravity vector applied in the physics world (Y-up).
pub const DEFAULT_GRAVITY: [f32; 2] = [0.0, -10.0];

/// Default integration timestep (in seconds).
pub const DEFAULT_TIME_STEP: f32 = 1.0 / 60.0;

/// Number of velocity passes performed by the sequential impulse solver.
pub const DEFAULT_VELOCITY_ITERATIONS: u32 = 8;

/// Number of position correction passes performed after integration.
pub const DEFAULT_POSITION_ITERATIONS: u32 = 3;

/// Collision and constraint tolerance in meters.
pub const LINEAR_SLOP: f32 = 0.005;

/// Angular tolerance in radians.
pub const ANGULAR_SLOP: f32 = 2.0 / 180.0 * std::f32::consts::PI;

/// Polygon skin used by the narrow-phase.
pub const POLYGON_RADIUS: f32 = 2.0 * LINEAR_SLOP;

/// Manifold points closer than this are kept even while separated.
pub const SPECULATIVE_DISTANCE: f32 = 4.0 * LINEAR_SLOP;

/// Padding added around tight bounds before a proxy enters the tree.
pub const AABB_MARGIN: f32 = 0.1;

/// Scale applied to a proxy's displacement when its fat bounds are predicted.
pub const AABB_MULTIPLIER: f32 = 4.0;

/// Largest vertex count a convex polygon may carry.
pub const MAX_POLYGON_VERTICES: usize = 8;

/// Largest position correction applied by one NGS iteration.
pub const MAX_LINEAR_CORRECTION: f32 = 0.2;

/// Largest angular correction applied by one joint position iteration.
pub const MAX_ANGULAR_CORRECTION: f32 = 8.0 / 180.0 * std::f32::consts::PI;

/// Baumgarte factor for position correction.
pub const BAUMGARTE: f32 = 0.2;

/// Largest rotation allowed within one step.
pub const MAX_ROTATION: f32 = 0.5 * std::f32::consts::PI;

/// Upper bound on the 2x2 contact block condition number.
pub const MAX_CONDITION_NUMBER: f32 = 1000.0;

/// Default linear speed below which a body is considered at rest.
pub const DEFAULT_SLEEP_THRESHOLD: f32 = 0.01;

/// Default angular speed below which a body is considered at rest.
pub const DEFAULT_ANGULAR_SLEEP_THRESHOLD: f32 = 2.0 / 180.0 * std::f32::consts::PI;

/// Seconds a body must remain at rest before its island sleeps.
pub const DEFAULT_SLEEP_TIME: f32 = 0.5;

/// Approach speed below which contacts become perfectly inelastic.
pub const DEFAULT_RESTITUTION_THRESHOLD: f32 = 1.0;

/// Default linear speed clamp in meters per second.
pub const DEFAULT_MAX_LINEAR_SPEED: f32 = 400.0;

/// Default cap on live broad-phase proxies.
pub const DEFAULT_MAX_PROXIES: usize = 1 << 16;

/// Default cap on live contacts.
pub const DEFAULT_MAX_CONTACTS: usize = 1 << 16;

/// Default cap on fixed sub-steps run by one `step` call.
pub const DEFAULT_MAX_SUBSTEPS: u32 = 8;

/// Default frame budget used to warn about slow steps.
pub const DEFAULT_FRAME_BUDGET_MS: f32 = 16.0;

/// Runtime knobs for a [`crate::PhysicsWorld`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    pub gravity: Vec2,
    pub time_step: f32,
    pub velocity_iterations: u32,
    pub position_iterations: u32,
    pub sleep_threshold: f32,
    pub angular_sleep_threshold: f32,
    pub sleep_time: f32,
    pub enable_sleep: bool,
    pub enable_warm_starting: bool,
    pub enable_continuous: bool,
    pub restitution_threshold: f32,
    pub max_linear_speed: f32,
    pub max_proxies: usize,
    pub max_contacts: usize,
    pub frame_budget_ms: f32,
    /// Fixed steps one `step(dt)` call may run; whole steps past it are dropped.
    pub max_substeps: u32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            gravity: Vec2::from_array(DEFAULT_GRAVITY),
            time_step: DEFAULT_TIME_STEP,
            velocity_iterations: DEFAULT_VELOCITY_ITERATIONS,
            position_iterations: DEFAULT_POSITION_ITERATIONS,
            sleep_threshold: DEFAULT_SLEEP_THRESHOLD,
            angular_sleep_threshold: DEFAULT_ANGULAR_SLEEP_THRESHOLD,
            sleep_time: DEFAULT_SLEEP_TIME,
            enable_sleep: true,
            enable_warm_starting: true,
            enable_continuous: true,
            restitution_threshold: DEFAULT_RESTITUTION_THRESHOLD,
            max_linear_speed: DEFAULT_MAX_LINEAR_SPEED,
            max_proxies: DEFAULT_MAX_PROXIES,
            max_contacts: DEFAULT_MAX_CONTACTS,
            frame_budget_ms: DEFAULT_FRAME_BUDGET_MS,
            max_substeps: DEFAULT_MAX_SUBSTEPS,
        }
    }
}

impl WorldConfig {
    pub fn with_gravity(mut self, gravity: Vec2) -> Self {
        self.gravity = gravity;
        self
    }

    pub fn with_time_step(mut self, time_step: f32) -> Self {
        self.time_step = time_step;
        self
    }

    pub fn with_iterations(mut self, velocity: u32, position: u32) -> Self {
        self.velocity_iterations = velocity;
        self.position_iterations = position;
        self
    }

    pub fn with_sleep(mut self, enabled: bool) -> Self {
        self.enable_sleep = enabled;
        self
    }

    pub fn with_continuous(mut self, enabled: bool) -> Self {
        self.enable_continuous = enabled;
        self
    }

    pub fn with_max_substeps(mut self, max_substeps: u32) -> Self {
        self.max_substeps = max_substeps;
        self
    }

    /// Rejects configurations the stepper cannot run with.
    pub fn validate(&self) -> PhysicsResult<()> {
        if !self.gravity.is_finite() {
            return Err(PhysicsError::InvalidConfig("gravity must be finite".into()));
        }
        if !(self.time_step.is_finite() && self.time_step > 0.0) {
            return Err(PhysicsError::InvalidConfig(format!(
                "time step must be positive, got {}",
                self.time_step
            )));
        }
        if self.velocity_iterations == 0 {
            return Err(PhysicsError::InvalidConfig(
                "at least one velocity iteration is required".into(),
            ));
        }
        let non_negative = [
            ("sleep_threshold", self.sleep_threshold),
            ("angular_sleep_threshold", self.angular_sleep_threshold),
            ("sleep_time", self.sleep_time),
            ("restitution_threshold", self.restitution_threshold),
        ];
        for (name, value) in non_negative {
            if !(value.is_finite() && value >= 0.0) {
                return Err(PhysicsError::InvalidConfig(format!(
                    "{name} must be finite and non-negative, got {value}"
                )));
            }
        }
        if !(self.max_linear_speed.is_finite() && self.max_linear_speed > 0.0) {
            return Err(PhysicsError::InvalidConfig(
                "max_linear_speed must be positive".into(),
            ));
        }
        if self.max_substeps == 0 {
            return Err(PhysicsError::InvalidConfig(
                "max_substeps must be at least one".into(),
            ));
        }
        if self.max_proxies == 0 || self.max_contacts == 0 {
            return Err(PhysicsError::InvalidConfig(
                "proxy and contact caps must be non-zero".into(),
            ));
        }
        Ok(())
    }
}
