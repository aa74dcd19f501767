use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::error::{PhysicsError, PhysicsResult};

/// Rotation stored as cosine/sine pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rot {
    pub c: f32,
    pub s: f32,
}

impl Default for Rot {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Rot {
    pub const IDENTITY: Rot = Rot { c: 1.0, s: 0.0 };

    pub fn from_angle(angle: f32) -> Self {
        let (s, c) = angle.sin_cos();
        Self { c, s }
    }

    pub fn angle(&self) -> f32 {
        self.s.atan2(self.c)
    }

    /// Local x axis expressed in world space.
    pub fn x_axis(&self) -> Vec2 {
        Vec2::new(self.c, self.s)
    }

    pub fn rotate(&self, v: Vec2) -> Vec2 {
        Vec2::new(self.c * v.x - self.s * v.y, self.s * v.x + self.c * v.y)
    }

    pub fn inv_rotate(&self, v: Vec2) -> Vec2 {
        Vec2::new(self.c * v.x + self.s * v.y, -self.s * v.x + self.c * v.y)
    }

    /// `self * other`
    pub fn mul(&self, other: Rot) -> Rot {
        Rot {
            c: self.c * other.c - self.s * other.s,
            s: self.s * other.c + self.c * other.s,
        }
    }

    /// `transpose(self) * other`
    pub fn mul_t(&self, other: Rot) -> Rot {
        Rot {
            c: self.c * other.c + self.s * other.s,
            s: self.c * other.s - self.s * other.c,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.c.is_finite() && self.s.is_finite()
    }
}

/// Rigid transform: translation plus rotation.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec2,
    pub rotation: Rot,
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        position: Vec2::ZERO,
        rotation: Rot::IDENTITY,
    };

    pub fn new(position: Vec2, angle: f32) -> Self {
        Self {
            position,
            rotation: Rot::from_angle(angle),
        }
    }

    pub fn angle(&self) -> f32 {
        self.rotation.angle()
    }

    pub fn transform_point(&self, local: Vec2) -> Vec2 {
        self.rotation.rotate(local) + self.position
    }

    pub fn inv_transform_point(&self, world: Vec2) -> Vec2 {
        self.rotation.inv_rotate(world - self.position)
    }

    /// Composition `self * other`.
    pub fn combine(&self, other: &Transform) -> Transform {
        Transform {
            position: self.rotation.rotate(other.position) + self.position,
            rotation: self.rotation.mul(other.rotation),
        }
    }

    /// `inverse(self) * other`: expresses `other` in the frame of `self`.
    pub fn inv_combine(&self, other: &Transform) -> Transform {
        Transform {
            position: self.rotation.inv_rotate(other.position - self.position),
            rotation: self.rotation.mul_t(other.rotation),
        }
    }
}

/// Linear and angular velocity of a rigid body.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Velocity {
    pub linear: Vec2,
    pub angular: f32,
}

impl Velocity {
    pub fn new(linear: Vec2, angular: f32) -> Self {
        Self { linear, angular }
    }

    pub fn is_finite(&self) -> bool {
        self.linear.is_finite() && self.angular.is_finite()
    }
}

/// Center-of-mass motion over one step, used for continuous collision.
///
/// `c0`/`a0` hold the pose at the start of the step, `c`/`a` at the end.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Sweep {
    pub local_center: Vec2,
    pub c0: Vec2,
    pub c: Vec2,
    pub a0: f32,
    pub a: f32,
}

impl Sweep {
    /// Body-origin transform at fraction `beta` of the step.
    pub fn transform_at(&self, beta: f32) -> Transform {
        let center = (1.0 - beta) * self.c0 + beta * self.c;
        let angle = (1.0 - beta) * self.a0 + beta * self.a;
        let rotation = Rot::from_angle(angle);
        Transform {
            position: center - rotation.rotate(self.local_center),
            rotation,
        }
    }

    /// Sweep that stays at the end pose for the whole step.
    pub fn stationary(&self) -> Sweep {
        Sweep {
            c0: self.c,
            a0: self.a,
            ..*self
        }
    }
}

/// Mass, center of mass (body-local) and rotational inertia about that center.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MassProperties {
    pub mass: f32,
    pub center: Vec2,
    pub inertia: f32,
}

/// Material coefficients that affect interactions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Material {
    pub density: f32,
    pub friction: f32,
    pub restitution: f32,
    /// How this material mixes its coefficients with another material.
    pub mixing: MaterialMixing,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            density: 1.0,
            friction: 0.6,
            restitution: 0.0,
            mixing: MaterialMixing::default(),
        }
    }
}

impl Material {
    pub fn rubber() -> Self {
        Self {
            density: 1.4,
            friction: 1.0,
            restitution: 0.8,
            mixing: MaterialMixing::default(),
        }
    }

    pub fn steel() -> Self {
        Self {
            density: 7.8,
            friction: 0.45,
            restitution: 0.4,
            mixing: MaterialMixing::default(),
        }
    }

    pub fn ice() -> Self {
        Self {
            density: 0.9,
            friction: 0.03,
            restitution: 0.05,
            mixing: MaterialMixing::default(),
        }
    }

    pub fn validate(&self) -> PhysicsResult<()> {
        if !(self.density.is_finite() && self.density >= 0.0) {
            return Err(PhysicsError::InvalidMaterial(format!(
                "density must be finite and non-negative, got {}",
                self.density
            )));
        }
        if !(self.friction.is_finite() && self.friction >= 0.0) {
            return Err(PhysicsError::InvalidMaterial(format!(
                "friction must be finite and non-negative, got {}",
                self.friction
            )));
        }
        if !(self.restitution.is_finite() && self.restitution >= 0.0) {
            return Err(PhysicsError::InvalidMaterial(format!(
                "restitution must be finite and non-negative, got {}",
                self.restitution
            )));
        }
        Ok(())
    }

    pub fn combine_with(&self, other: &Self) -> MaterialPairProperties {
        let friction_mode = self.mixing.friction.resolve(other.mixing.friction);
        let restitution_mode = self.mixing.restitution.resolve(other.mixing.restitution);
        MaterialPairProperties {
            friction: friction_mode.combine(self.friction, other.friction),
            restitution: restitution_mode.combine(self.restitution, other.restitution),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MaterialMixing {
    pub friction: MixingMode,
    pub restitution: MixingMode,
}

impl Default for MaterialMixing {
    fn default() -> Self {
        Self {
            friction: MixingMode::GeometricMean,
            restitution: MixingMode::Max,
        }
    }
}

impl MaterialMixing {
    pub fn with_friction(mut self, mode: MixingMode) -> Self {
        self.friction = mode;
        self
    }

    pub fn with_restitution(mut self, mode: MixingMode) -> Self {
        self.restitution = mode;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum MixingMode {
    Average,
    Min,
    Max,
    #[default]
    GeometricMean,
}

impl MixingMode {
    fn combine(self, a: f32, b: f32) -> f32 {
        match self {
            MixingMode::Average => 0.5 * (a + b),
            MixingMode::Min => a.min(b),
            MixingMode::Max => a.max(b),
            MixingMode::GeometricMean => (a * b).sqrt(),
        }
    }

    /// Both sides must agree; otherwise the stronger rule wins in a fixed order.
    fn resolve(self, other: MixingMode) -> MixingMode {
        if self == other {
            return self;
        }
        let rank = |mode: MixingMode| match mode {
            MixingMode::Average => 0,
            MixingMode::GeometricMean => 1,
            MixingMode::Min => 2,
            MixingMode::Max => 3,
        };
        if rank(self) >= rank(other) {
            self
        } else {
            other
        }
    }
}

/// Coefficients shared by a contacting pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MaterialPairProperties {
    pub friction: f32,
    pub restitution: f32,
}

impl Default for MaterialPairProperties {
    fn default() -> Self {
        Material::default().combine_with(&Material::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn mixing_modes_combine_expected_values() {
        assert_relative_eq!(MixingMode::Average.combine(0.6, 0.2), 0.4, epsilon = 1e-6);
        assert_relative_eq!(MixingMode::Min.combine(0.6, 0.2), 0.2);
        assert_relative_eq!(MixingMode::Max.combine(0.6, 0.2), 0.6);
        assert_relative_eq!(
            MixingMode::GeometricMean.combine(0.6, 0.2),
            (0.6_f32 * 0.2).sqrt(),
            epsilon = 1e-6
        );
    }

    #[test]
    fn pair_combination_is_symmetric() {
        let rubber = Material::rubber();
        let ice = Material::ice();
        let ab = rubber.combine_with(&ice);
        let ba = ice.combine_with(&rubber);
        assert_eq!(ab, ba);
        assert_relative_eq!(ab.restitution, 0.8);
    }

    #[test]
    fn transform_round_trips_points() {
        let xf = Transform::new(Vec2::new(1.0, -2.0), 0.7);
        let p = Vec2::new(0.3, 4.0);
        let back = xf.inv_transform_point(xf.transform_point(p));
        assert!((back - p).length() < 1e-5);

        let other = Transform::new(Vec2::new(-3.0, 0.5), -1.2);
        let relative = xf.inv_combine(&other);
        let composed = xf.combine(&relative);
        assert!((composed.position - other.position).length() < 1e-5);
        assert_relative_eq!(composed.angle(), other.angle(), epsilon = 1e-5);
    }

    #[test]
    fn sweep_interpolates_about_center_of_mass() {
        let sweep = Sweep {
            local_center: Vec2::new(1.0, 0.0),
            c0: Vec2::ZERO,
            c: Vec2::new(10.0, 0.0),
            a0: 0.0,
            a: std::f32::consts::PI,
        };
        let mid = sweep.transform_at(0.5);
        // Origin sits one unit from the center, rotated by a quarter turn.
        assert!((mid.position - Vec2::new(5.0, -1.0)).length() < 1e-5);
        let end = sweep.stationary().transform_at(0.0);
        assert!((end.position - Vec2::new(11.0, 0.0)).length() < 1e-4);
    }

    #[test]
    fn negative_friction_is_rejected() {
        let material = Material {
            friction: -0.1,
            ..Material::default()
        };
        assert!(material.validate().is_err());
    }
}
