use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::{
    error::{PhysicsError, PhysicsResult},
    utils::{allocator::EntityId, math::cross},
};

use super::{
    collider::Collider,
    types::{MassProperties, Rot, Sweep, Transform, Velocity},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum BodyType {
    /// Infinite mass, never moves.
    Static,
    /// Infinite mass, moved by its velocity only.
    Kinematic,
    #[default]
    Dynamic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SleepState {
    #[default]
    Awake,
    Sleeping,
}

/// Core rigid body description storing kinematic state and properties.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RigidBody {
    pub id: EntityId,
    pub(crate) body_type: BodyType,
    /// Pose of the body origin.
    pub(crate) transform: Transform,
    pub(crate) sweep: Sweep,
    pub(crate) velocity: Velocity,
    pub(crate) force: Vec2,
    pub(crate) torque: f32,
    pub(crate) mass: f32,
    pub(crate) inv_mass: f32,
    /// Rotational inertia about the center of mass.
    pub(crate) inertia: f32,
    pub(crate) inv_inertia: f32,
    pub linear_damping: f32,
    pub angular_damping: f32,
    pub gravity_scale: f32,
    pub is_bullet: bool,
    pub(crate) fixed_rotation: bool,
    pub(crate) allow_sleep: bool,
    pub(crate) sleep_state: SleepState,
    pub(crate) sleep_time: f32,
    pub(crate) colliders: Vec<EntityId>,
    pub(crate) joints: Vec<EntityId>,
    /// Smallest and largest distance from the center of mass to the surface.
    pub(crate) min_extent: f32,
    pub(crate) max_extent: f32,
}

impl Default for RigidBody {
    fn default() -> Self {
        RigidBodyBuilder::new(BodyType::Dynamic).build()
    }
}

impl RigidBody {
    pub fn builder(body_type: BodyType) -> RigidBodyBuilder {
        RigidBodyBuilder::new(body_type)
    }

    pub fn body_type(&self) -> BodyType {
        self.body_type
    }

    pub fn is_static(&self) -> bool {
        self.body_type == BodyType::Static
    }

    pub fn is_kinematic(&self) -> bool {
        self.body_type == BodyType::Kinematic
    }

    pub fn is_dynamic(&self) -> bool {
        self.body_type == BodyType::Dynamic
    }

    pub fn transform(&self) -> Transform {
        self.transform
    }

    pub fn position(&self) -> Vec2 {
        self.transform.position
    }

    pub fn angle(&self) -> f32 {
        self.sweep.a
    }

    /// World-space center of mass.
    pub fn world_center(&self) -> Vec2 {
        self.sweep.c
    }

    pub fn local_center(&self) -> Vec2 {
        self.sweep.local_center
    }

    pub fn velocity(&self) -> Velocity {
        self.velocity
    }

    pub fn linear_velocity(&self) -> Vec2 {
        self.velocity.linear
    }

    pub fn angular_velocity(&self) -> f32 {
        self.velocity.angular
    }

    /// Velocity of a world point rigidly attached to the body.
    pub fn velocity_at_point(&self, point: Vec2) -> Vec2 {
        let r = point - self.sweep.c;
        self.velocity.linear + Vec2::new(-self.velocity.angular * r.y, self.velocity.angular * r.x)
    }

    pub fn mass(&self) -> f32 {
        self.mass
    }

    pub fn inverse_mass(&self) -> f32 {
        self.inv_mass
    }

    pub fn inertia(&self) -> f32 {
        self.inertia
    }

    pub fn inverse_inertia(&self) -> f32 {
        self.inv_inertia
    }

    pub fn sleep_state(&self) -> SleepState {
        self.sleep_state
    }

    pub fn is_awake(&self) -> bool {
        self.sleep_state == SleepState::Awake
    }

    pub fn sleep_time(&self) -> f32 {
        self.sleep_time
    }

    pub fn allows_sleep(&self) -> bool {
        self.allow_sleep
    }

    pub fn has_fixed_rotation(&self) -> bool {
        self.fixed_rotation
    }

    pub fn colliders(&self) -> &[EntityId] {
        &self.colliders
    }

    pub fn joints(&self) -> &[EntityId] {
        &self.joints
    }

    pub fn force(&self) -> Vec2 {
        self.force
    }

    pub fn torque(&self) -> f32 {
        self.torque
    }

    pub fn world_point(&self, local: Vec2) -> Vec2 {
        self.transform.transform_point(local)
    }

    pub fn local_point(&self, world: Vec2) -> Vec2 {
        self.transform.inv_transform_point(world)
    }

    pub fn world_vector(&self, local: Vec2) -> Vec2 {
        self.transform.rotation.rotate(local)
    }

    pub fn validate(&self) -> PhysicsResult<()> {
        if !self.transform.position.is_finite() || !self.sweep.a.is_finite() {
            return Err(PhysicsError::InvalidBody("transform must be finite".into()));
        }
        if !self.velocity.is_finite() {
            return Err(PhysicsError::InvalidBody("velocity must be finite".into()));
        }
        for (name, value) in [
            ("linear damping", self.linear_damping),
            ("angular damping", self.angular_damping),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(PhysicsError::InvalidBody(format!(
                    "{name} must be finite and non-negative, got {value}"
                )));
            }
        }
        if !self.gravity_scale.is_finite() {
            return Err(PhysicsError::InvalidBody("gravity scale must be finite".into()));
        }
        Ok(())
    }

    pub(crate) fn set_awake(&mut self, awake: bool) {
        if awake {
            self.sleep_state = SleepState::Awake;
            self.sleep_time = 0.0;
        } else {
            self.sleep_state = SleepState::Sleeping;
            self.sleep_time = 0.0;
            self.velocity = Velocity::default();
            self.force = Vec2::ZERO;
            self.torque = 0.0;
        }
    }

    pub fn apply_force(&mut self, force: Vec2, point: Vec2) {
        if !self.is_dynamic() {
            return;
        }
        self.force += force;
        self.torque += cross(point - self.sweep.c, force);
    }

    pub fn apply_force_to_center(&mut self, force: Vec2) {
        if self.is_dynamic() {
            self.force += force;
        }
    }

    pub fn apply_torque(&mut self, torque: f32) {
        if self.is_dynamic() {
            self.torque += torque;
        }
    }

    pub(crate) fn apply_linear_impulse(&mut self, impulse: Vec2, point: Vec2) {
        if !self.is_dynamic() {
            return;
        }
        self.velocity.linear += self.inv_mass * impulse;
        self.velocity.angular += self.inv_inertia * cross(point - self.sweep.c, impulse);
    }

    pub(crate) fn apply_angular_impulse(&mut self, impulse: f32) {
        if self.is_dynamic() {
            self.velocity.angular += self.inv_inertia * impulse;
        }
    }

    pub(crate) fn clear_forces(&mut self) {
        self.force = Vec2::ZERO;
        self.torque = 0.0;
    }

    /// Moves the body origin, resetting the sweep to the new pose.
    pub(crate) fn set_transform(&mut self, position: Vec2, angle: f32) {
        self.transform = Transform::new(position, angle);
        let center = self.transform.transform_point(self.sweep.local_center);
        self.sweep.c0 = center;
        self.sweep.c = center;
        self.sweep.a0 = angle;
        self.sweep.a = angle;
    }

    /// Rebuilds the origin transform from the end of the sweep.
    pub(crate) fn synchronize_transform(&mut self) {
        let rotation = Rot::from_angle(self.sweep.a);
        self.transform = Transform {
            position: self.sweep.c - rotation.rotate(self.sweep.local_center),
            rotation,
        };
    }

    /// Recomputes mass, center of mass and inertia from attached colliders.
    ///
    /// A dynamic body without colliders gets unit mass. A dynamic body whose
    /// colliders sum to no mass is rejected.
    pub(crate) fn update_mass<'a, I>(&mut self, colliders: I) -> PhysicsResult<()>
    where
        I: IntoIterator<Item = &'a Collider>,
    {
        let colliders: Vec<&Collider> = colliders.into_iter().collect();
        let props = self.compute_mass(&colliders)?;
        self.set_mass_properties(props);
        self.update_extents(&colliders);
        Ok(())
    }

    fn compute_mass(&self, colliders: &[&Collider]) -> PhysicsResult<MassProperties> {
        if !self.is_dynamic() {
            return Ok(MassProperties::default());
        }
        if colliders.is_empty() {
            return Ok(MassProperties {
                mass: 1.0,
                center: Vec2::ZERO,
                inertia: 0.0,
            });
        }

        let mut mass = 0.0;
        let mut moment = Vec2::ZERO;
        let mut origin_inertia = 0.0;
        for collider in colliders {
            let props = collider.mass_properties();
            mass += props.mass;
            moment += props.mass * props.center;
            origin_inertia += props.inertia + props.mass * props.center.length_squared();
        }
        if !(mass > 0.0 && mass.is_finite()) {
            return Err(PhysicsError::ZeroMass(self.id));
        }
        let center = moment / mass;
        Ok(MassProperties {
            mass,
            center,
            inertia: (origin_inertia - mass * center.length_squared()).max(0.0),
        })
    }

    fn set_mass_properties(&mut self, props: MassProperties) {
        self.mass = props.mass;
        self.inv_mass = if props.mass > 0.0 { 1.0 / props.mass } else { 0.0 };
        if props.inertia > 0.0 && !self.fixed_rotation {
            self.inertia = props.inertia;
            self.inv_inertia = 1.0 / props.inertia;
        } else {
            self.inertia = 0.0;
            self.inv_inertia = 0.0;
        }

        // Keep the origin fixed while the center of mass moves.
        let old_center = self.sweep.c;
        self.sweep.local_center = props.center;
        let center = self.transform.transform_point(props.center);
        self.sweep.c0 = center;
        self.sweep.c = center;
        let w = self.velocity.angular;
        let r = center - old_center;
        self.velocity.linear += Vec2::new(-w * r.y, w * r.x);
    }

    fn update_extents(&mut self, colliders: &[&Collider]) {
        let center = self.sweep.local_center;
        let mut min_extent = f32::MAX;
        let mut max_extent: f32 = 0.0;
        for collider in colliders {
            min_extent = min_extent.min(collider.shape.min_extent());
            max_extent = max_extent.max(collider.shape.proxy().max_extent(center));
        }
        self.min_extent = if colliders.is_empty() { 0.0 } else { min_extent };
        self.max_extent = max_extent;
    }
}

/// Builder for [`RigidBody`] definitions.
#[derive(Debug, Clone)]
pub struct RigidBodyBuilder {
    body_type: BodyType,
    position: Vec2,
    angle: f32,
    velocity: Velocity,
    linear_damping: f32,
    angular_damping: f32,
    gravity_scale: f32,
    is_bullet: bool,
    fixed_rotation: bool,
    allow_sleep: bool,
    awake: bool,
}

impl RigidBodyBuilder {
    pub fn new(body_type: BodyType) -> Self {
        Self {
            body_type,
            position: Vec2::ZERO,
            angle: 0.0,
            velocity: Velocity::default(),
            linear_damping: 0.0,
            angular_damping: 0.0,
            gravity_scale: 1.0,
            is_bullet: false,
            fixed_rotation: false,
            allow_sleep: true,
            awake: true,
        }
    }

    pub fn dynamic() -> Self {
        Self::new(BodyType::Dynamic)
    }

    pub fn fixed() -> Self {
        Self::new(BodyType::Static)
    }

    pub fn kinematic() -> Self {
        Self::new(BodyType::Kinematic)
    }

    pub fn translation(mut self, position: Vec2) -> Self {
        self.position = position;
        self
    }

    pub fn rotation(mut self, angle: f32) -> Self {
        self.angle = angle;
        self
    }

    pub fn linear_velocity(mut self, velocity: Vec2) -> Self {
        self.velocity.linear = velocity;
        self
    }

    pub fn angular_velocity(mut self, velocity: f32) -> Self {
        self.velocity.angular = velocity;
        self
    }

    pub fn linear_damping(mut self, damping: f32) -> Self {
        self.linear_damping = damping;
        self
    }

    pub fn angular_damping(mut self, damping: f32) -> Self {
        self.angular_damping = damping;
        self
    }

    pub fn gravity_scale(mut self, scale: f32) -> Self {
        self.gravity_scale = scale;
        self
    }

    pub fn bullet(mut self, bullet: bool) -> Self {
        self.is_bullet = bullet;
        self
    }

    pub fn fixed_rotation(mut self, fixed: bool) -> Self {
        self.fixed_rotation = fixed;
        self
    }

    pub fn can_sleep(mut self, allow: bool) -> Self {
        self.allow_sleep = allow;
        self
    }

    /// Starts the body asleep when `false`.
    pub fn awake(mut self, awake: bool) -> Self {
        self.awake = awake;
        self
    }

    pub fn build(self) -> RigidBody {
        let transform = Transform::new(self.position, self.angle);
        let velocity = if self.body_type == BodyType::Static {
            Velocity::default()
        } else {
            self.velocity
        };
        let mut body = RigidBody {
            id: EntityId::NULL,
            body_type: self.body_type,
            transform,
            sweep: Sweep {
                local_center: Vec2::ZERO,
                c0: self.position,
                c: self.position,
                a0: self.angle,
                a: self.angle,
            },
            velocity,
            force: Vec2::ZERO,
            torque: 0.0,
            mass: 0.0,
            inv_mass: 0.0,
            inertia: 0.0,
            inv_inertia: 0.0,
            linear_damping: self.linear_damping,
            angular_damping: self.angular_damping,
            gravity_scale: self.gravity_scale,
            is_bullet: self.is_bullet,
            fixed_rotation: self.fixed_rotation,
            allow_sleep: self.allow_sleep,
            sleep_state: SleepState::Awake,
            sleep_time: 0.0,
            colliders: Vec::new(),
            joints: Vec::new(),
            min_extent: 0.0,
            max_extent: 0.0,
        };
        if body.is_dynamic() {
            body.set_mass_properties(MassProperties {
                mass: 1.0,
                center: Vec2::ZERO,
                inertia: 0.0,
            });
        }
        if !self.awake && body.body_type != BodyType::Static {
            body.set_awake(false);
        }
        body
    }
}
