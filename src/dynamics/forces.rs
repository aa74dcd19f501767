use glam::Vec2;

use crate::core::rigidbody::RigidBody;
use crate::utils::allocator::{Arena, EntityId};

/// Trait describing an external force generator applied to rigid bodies.
///
/// Generators run at the start of every step on awake dynamic bodies, before
/// gravity and damping are integrated.
pub trait ForceGenerator: Send + Sync {
    fn apply(&self, body: &mut RigidBody, dt: f32);
}

/// Extra uniform acceleration, on top of the world gravity.
pub struct GravityForce {
    pub gravity: Vec2,
}

impl GravityForce {
    pub fn new(gravity: Vec2) -> Self {
        Self { gravity }
    }
}

impl ForceGenerator for GravityForce {
    fn apply(&self, body: &mut RigidBody, _dt: f32) {
        let force = self.gravity * body.mass() * body.gravity_scale;
        body.apply_force_to_center(force);
    }
}

/// Quadratic drag resisting the direction of motion.
pub struct DragForce {
    pub drag_coefficient: f32,
}

impl ForceGenerator for DragForce {
    fn apply(&self, body: &mut RigidBody, _dt: f32) {
        let velocity = body.linear_velocity();
        let speed = velocity.length();
        if speed < 1e-6 {
            return;
        }

        let drag = -velocity / speed * speed * speed * self.drag_coefficient;
        body.apply_force_to_center(drag);
    }
}

/// Hookean spring pulling a body's center of mass toward a fixed point.
pub struct SpringForce {
    pub anchor: Vec2,
    pub rest_length: f32,
    pub spring_constant: f32,
    pub damping: f32,
}

impl ForceGenerator for SpringForce {
    fn apply(&self, body: &mut RigidBody, _dt: f32) {
        let displacement = body.world_center() - self.anchor;
        let distance = displacement.length();
        if distance < 1e-6 {
            return;
        }

        let extension = distance - self.rest_length;
        let spring_force = -self.spring_constant * extension * (displacement / distance);
        let damping_force = -self.damping * body.linear_velocity();

        body.apply_force_to_center(spring_force + damping_force);
    }
}

/// Collection of forces that can be applied each frame.
#[derive(Default)]
pub struct ForceRegistry {
    forces: Vec<Box<dyn ForceGenerator>>,
}

impl ForceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_force<F: ForceGenerator + 'static>(&mut self, force: F) {
        self.forces.push(Box::new(force));
    }

    pub fn len(&self) -> usize {
        self.forces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forces.is_empty()
    }

    pub fn clear(&mut self) {
        self.forces.clear();
    }

    pub fn apply_all(&self, bodies: &mut Arena<RigidBody>, dt: f32) {
        if self.forces.is_empty() {
            return;
        }
        for (_, body) in bodies.iter_mut() {
            if !body.is_dynamic() || !body.is_awake() {
                continue;
            }
            for force in &self.forces {
                force.apply(body, dt);
            }
        }
    }

    pub fn apply_force_to(&self, bodies: &mut Arena<RigidBody>, id: EntityId, dt: f32) {
        if let Some(body) = bodies.get_mut(id) {
            for force in &self.forces {
                force.apply(body, dt);
            }
        }
    }
}

impl std::fmt::Debug for ForceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForceRegistry")
            .field("forces", &self.forces.len())
            .finish()
    }
}
