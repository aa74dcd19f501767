use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::{
    config::LINEAR_SLOP,
    error::{PhysicsError, PhysicsResult},
    utils::allocator::EntityId,
};

use super::rigidbody::RigidBody;

/// Upper length used for distance joints without a meaningful max.
pub const HUGE_LENGTH: f32 = 100_000.0;

/// Joint description: two bodies plus the kind-specific parameters.
///
/// Anchors are expressed in each body's local frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointDef {
    pub body_a: EntityId,
    pub body_b: EntityId,
    /// Whether shapes of the two bodies still collide with each other.
    pub collide_connected: bool,
    pub kind: JointKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JointKind {
    Distance(DistanceJointDef),
    Revolute(RevoluteJointDef),
    Prismatic(PrismaticJointDef),
    Weld(WeldJointDef),
}

impl JointKind {
    pub fn name(&self) -> &'static str {
        match self {
            JointKind::Distance(_) => "distance",
            JointKind::Revolute(_) => "revolute",
            JointKind::Prismatic(_) => "prismatic",
            JointKind::Weld(_) => "weld",
        }
    }

    pub fn local_anchors(&self) -> (Vec2, Vec2) {
        match self {
            JointKind::Distance(def) => (def.local_anchor_a, def.local_anchor_b),
            JointKind::Revolute(def) => (def.local_anchor_a, def.local_anchor_b),
            JointKind::Prismatic(def) => (def.local_anchor_a, def.local_anchor_b),
            JointKind::Weld(def) => (def.local_anchor_a, def.local_anchor_b),
        }
    }
}

/// Keeps two anchor points at a distance, optionally as a soft spring and
/// within a `[min_length, max_length]` range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistanceJointDef {
    pub local_anchor_a: Vec2,
    pub local_anchor_b: Vec2,
    pub length: f32,
    pub min_length: f32,
    pub max_length: f32,
    /// Linear stiffness in N/m. Zero makes the joint rigid.
    pub stiffness: f32,
    /// Linear damping in N*s/m.
    pub damping: f32,
}

impl DistanceJointDef {
    pub fn new(local_anchor_a: Vec2, local_anchor_b: Vec2, length: f32) -> Self {
        Self {
            local_anchor_a,
            local_anchor_b,
            length,
            min_length: length,
            max_length: length,
            stiffness: 0.0,
            damping: 0.0,
        }
    }

    /// Rest length taken from the current distance between world anchors.
    pub fn from_world_anchors(body_a: &RigidBody, body_b: &RigidBody, anchor_a: Vec2, anchor_b: Vec2) -> Self {
        Self::new(
            body_a.local_point(anchor_a),
            body_b.local_point(anchor_b),
            anchor_a.distance(anchor_b),
        )
    }

    pub fn with_limits(mut self, min_length: f32, max_length: f32) -> Self {
        self.min_length = min_length;
        self.max_length = max_length;
        self
    }

    /// Turns the joint into a spring. A rigid range is opened up so the
    /// spring can stretch; call [`Self::with_limits`] afterwards to bound it.
    pub fn with_spring(mut self, stiffness: f32, damping: f32) -> Self {
        self.stiffness = stiffness;
        self.damping = damping;
        if stiffness > 0.0 && self.min_length == self.max_length {
            self.min_length = 0.0;
            self.max_length = HUGE_LENGTH;
        }
        self
    }
}

/// Pins two bodies at a shared point, with optional angle limits and motor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevoluteJointDef {
    pub local_anchor_a: Vec2,
    pub local_anchor_b: Vec2,
    /// `angle_b - angle_a` at which the joint angle reads zero.
    pub reference_angle: f32,
    pub enable_limit: bool,
    pub lower_angle: f32,
    pub upper_angle: f32,
    pub enable_motor: bool,
    pub motor_speed: f32,
    pub max_motor_torque: f32,
}

impl RevoluteJointDef {
    pub fn new(local_anchor_a: Vec2, local_anchor_b: Vec2) -> Self {
        Self {
            local_anchor_a,
            local_anchor_b,
            reference_angle: 0.0,
            enable_limit: false,
            lower_angle: 0.0,
            upper_angle: 0.0,
            enable_motor: false,
            motor_speed: 0.0,
            max_motor_torque: 0.0,
        }
    }

    pub fn from_world_anchor(body_a: &RigidBody, body_b: &RigidBody, anchor: Vec2) -> Self {
        Self {
            reference_angle: body_b.angle() - body_a.angle(),
            ..Self::new(body_a.local_point(anchor), body_b.local_point(anchor))
        }
    }

    pub fn with_limits(mut self, lower_angle: f32, upper_angle: f32) -> Self {
        self.enable_limit = true;
        self.lower_angle = lower_angle;
        self.upper_angle = upper_angle;
        self
    }

    pub fn with_motor(mut self, speed: f32, max_torque: f32) -> Self {
        self.enable_motor = true;
        self.motor_speed = speed;
        self.max_motor_torque = max_torque;
        self
    }
}

/// Lets body B slide along an axis fixed in body A, without relative rotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrismaticJointDef {
    pub local_anchor_a: Vec2,
    pub local_anchor_b: Vec2,
    /// Unit slide axis in body A's frame.
    pub local_axis_a: Vec2,
    pub reference_angle: f32,
    pub enable_limit: bool,
    pub lower_translation: f32,
    pub upper_translation: f32,
    pub enable_motor: bool,
    pub motor_speed: f32,
    pub max_motor_force: f32,
}

impl PrismaticJointDef {
    pub fn new(local_anchor_a: Vec2, local_anchor_b: Vec2, local_axis_a: Vec2) -> Self {
        Self {
            local_anchor_a,
            local_anchor_b,
            local_axis_a: local_axis_a.normalize_or_zero(),
            reference_angle: 0.0,
            enable_limit: false,
            lower_translation: 0.0,
            upper_translation: 0.0,
            enable_motor: false,
            motor_speed: 0.0,
            max_motor_force: 0.0,
        }
    }

    pub fn from_world_anchor(body_a: &RigidBody, body_b: &RigidBody, anchor: Vec2, axis: Vec2) -> Self {
        let local_axis = body_a.transform().rotation.inv_rotate(axis);
        Self {
            reference_angle: body_b.angle() - body_a.angle(),
            ..Self::new(body_a.local_point(anchor), body_b.local_point(anchor), local_axis)
        }
    }

    pub fn with_limits(mut self, lower: f32, upper: f32) -> Self {
        self.enable_limit = true;
        self.lower_translation = lower;
        self.upper_translation = upper;
        self
    }

    pub fn with_motor(mut self, speed: f32, max_force: f32) -> Self {
        self.enable_motor = true;
        self.motor_speed = speed;
        self.max_motor_force = max_force;
        self
    }
}

/// Glues two bodies together at an anchor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeldJointDef {
    pub local_anchor_a: Vec2,
    pub local_anchor_b: Vec2,
    pub reference_angle: f32,
}

impl WeldJointDef {
    pub fn from_world_anchor(body_a: &RigidBody, body_b: &RigidBody, anchor: Vec2) -> Self {
        Self {
            local_anchor_a: body_a.local_point(anchor),
            local_anchor_b: body_b.local_point(anchor),
            reference_angle: body_b.angle() - body_a.angle(),
        }
    }
}

impl JointDef {
    pub fn new(body_a: EntityId, body_b: EntityId, kind: JointKind) -> Self {
        Self {
            body_a,
            body_b,
            collide_connected: false,
            kind,
        }
    }

    pub fn distance(body_a: EntityId, body_b: EntityId, def: DistanceJointDef) -> Self {
        Self::new(body_a, body_b, JointKind::Distance(def))
    }

    pub fn revolute(body_a: EntityId, body_b: EntityId, def: RevoluteJointDef) -> Self {
        Self::new(body_a, body_b, JointKind::Revolute(def))
    }

    pub fn prismatic(body_a: EntityId, body_b: EntityId, def: PrismaticJointDef) -> Self {
        Self::new(body_a, body_b, JointKind::Prismatic(def))
    }

    pub fn weld(body_a: EntityId, body_b: EntityId, def: WeldJointDef) -> Self {
        Self::new(body_a, body_b, JointKind::Weld(def))
    }

    pub fn collide_connected(mut self, collide: bool) -> Self {
        self.collide_connected = collide;
        self
    }

    /// Rejects malformed anchors, ranges and motor settings.
    pub fn validate(&self) -> PhysicsResult<()> {
        if self.body_a == self.body_b {
            return Err(invalid("a joint must connect two different bodies"));
        }
        let (anchor_a, anchor_b) = self.kind.local_anchors();
        if !anchor_a.is_finite() || !anchor_b.is_finite() {
            return Err(invalid("joint anchors must be finite"));
        }

        match &self.kind {
            JointKind::Distance(def) => {
                check_non_negative("length", def.length)?;
                check_non_negative("min length", def.min_length)?;
                check_non_negative("max length", def.max_length)?;
                check_non_negative("stiffness", def.stiffness)?;
                check_non_negative("damping", def.damping)?;
                if def.min_length > def.max_length {
                    return Err(invalid("distance joint min length exceeds max length"));
                }
                if def.stiffness == 0.0 && def.length < LINEAR_SLOP && def.max_length < LINEAR_SLOP {
                    return Err(invalid("rigid distance joint needs a length above the linear slop"));
                }
            }
            JointKind::Revolute(def) => {
                check_finite("reference angle", def.reference_angle)?;
                check_finite("motor speed", def.motor_speed)?;
                check_non_negative("max motor torque", def.max_motor_torque)?;
                if def.enable_limit && !(def.lower_angle <= def.upper_angle) {
                    return Err(invalid("revolute joint lower angle exceeds upper angle"));
                }
            }
            JointKind::Prismatic(def) => {
                check_finite("reference angle", def.reference_angle)?;
                check_finite("motor speed", def.motor_speed)?;
                check_non_negative("max motor force", def.max_motor_force)?;
                if !def.local_axis_a.is_finite() || def.local_axis_a.length_squared() < 0.5 {
                    return Err(invalid("prismatic joint axis must be a unit vector"));
                }
                if def.enable_limit && !(def.lower_translation <= def.upper_translation) {
                    return Err(invalid("prismatic joint lower translation exceeds upper translation"));
                }
            }
            JointKind::Weld(def) => {
                check_finite("reference angle", def.reference_angle)?;
            }
        }
        Ok(())
    }
}

fn invalid(message: &str) -> PhysicsError {
    PhysicsError::InvalidJoint(message.to_string())
}

fn check_finite(name: &str, value: f32) -> PhysicsResult<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(PhysicsError::InvalidJoint(format!("{name} must be finite, got {value}")))
    }
}

fn check_non_negative(name: &str, value: f32) -> PhysicsResult<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(PhysicsError::InvalidJoint(format!(
            "{name} must be finite and non-negative, got {value}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rigidbody::RigidBodyBuilder;

    fn ids() -> (EntityId, EntityId) {
        (EntityId::new(0, 0), EntityId::new(1, 0))
    }

    #[test]
    fn world_anchor_is_converted_to_local_frames() {
        let a = RigidBodyBuilder::fixed().translation(Vec2::new(0.0, 5.0)).build();
        let b = RigidBodyBuilder::dynamic()
            .translation(Vec2::new(2.0, 5.0))
            .rotation(std::f32::consts::FRAC_PI_2)
            .build();
        let def = RevoluteJointDef::from_world_anchor(&a, &b, Vec2::new(1.0, 5.0));
        assert!((def.local_anchor_a - Vec2::new(1.0, 0.0)).length() < 1e-6);
        assert!((b.world_point(def.local_anchor_b) - Vec2::new(1.0, 5.0)).length() < 1e-5);
        assert!((def.reference_angle - std::f32::consts::FRAC_PI_2).abs() < 1e-6);
    }

    #[test]
    fn same_body_is_rejected() {
        let (a, _) = ids();
        let def = JointDef::weld(
            a,
            a,
            WeldJointDef {
                local_anchor_a: Vec2::ZERO,
                local_anchor_b: Vec2::ZERO,
                reference_angle: 0.0,
            },
        );
        assert!(matches!(def.validate(), Err(PhysicsError::InvalidJoint(_))));
    }

    #[test]
    fn inverted_limits_are_rejected() {
        let (a, b) = ids();
        let revolute = JointDef::revolute(
            a,
            b,
            RevoluteJointDef::new(Vec2::ZERO, Vec2::ZERO).with_limits(1.0, -1.0),
        );
        assert!(revolute.validate().is_err());

        let distance = JointDef::distance(
            a,
            b,
            DistanceJointDef::new(Vec2::ZERO, Vec2::ZERO, 1.0).with_limits(2.0, 0.5),
        );
        assert!(distance.validate().is_err());
    }

    #[test]
    fn non_finite_anchor_is_rejected() {
        let (a, b) = ids();
        let def = JointDef::distance(
            a,
            b,
            DistanceJointDef::new(Vec2::new(f32::NAN, 0.0), Vec2::ZERO, 1.0),
        );
        assert!(def.validate().is_err());
    }

    #[test]
    fn zero_prismatic_axis_is_rejected() {
        let (a, b) = ids();
        let def = JointDef::prismatic(a, b, PrismaticJointDef::new(Vec2::ZERO, Vec2::ZERO, Vec2::ZERO));
        assert!(def.validate().is_err());
        let ok = JointDef::prismatic(a, b, PrismaticJointDef::new(Vec2::ZERO, Vec2::ZERO, Vec2::X));
        assert!(ok.validate().is_ok());
    }
}
