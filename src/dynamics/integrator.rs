use glam::Vec2;

use crate::{
    config::MAX_ROTATION,
    core::rigidbody::RigidBody,
    dynamics::solver::SolverBody,
    utils::allocator::Arena,
};

/// Integrator responsible for stepping rigid bodies forward in time.
///
/// Velocities are integrated on the world bodies before collision; positions
/// are integrated on island-local solver copies after the velocity solve.
#[derive(Debug, Clone)]
pub struct Integrator {
    pub gravity: Vec2,
    pub max_linear_speed: f32,
}

impl Integrator {
    pub fn new(gravity: Vec2, max_linear_speed: f32) -> Self {
        Self {
            gravity,
            max_linear_speed,
        }
    }

    /// Applies gravity, accumulated forces and damping, then clears forces.
    pub fn integrate_velocity(&self, body: &mut RigidBody, dt: f32) {
        if !body.is_dynamic() || !body.is_awake() {
            body.clear_forces();
            return;
        }

        let mut v = body.velocity.linear
            + dt * (body.gravity_scale * self.gravity + body.inv_mass * body.force);
        let mut w = body.velocity.angular + dt * body.inv_inertia * body.torque;

        // Pade approximation of exp(-c h), stable for large damping.
        v *= 1.0 / (1.0 + dt * body.linear_damping);
        w *= 1.0 / (1.0 + dt * body.angular_damping);

        body.velocity.linear = v;
        body.velocity.angular = w;
        body.clear_forces();
    }

    /// Advances a solver body, clamping per-step translation and rotation.
    pub fn integrate_position(&self, body: &mut SolverBody, dt: f32) {
        if body.inv_mass == 0.0 {
            return;
        }

        let translation = dt * body.v;
        let max_translation = self.max_linear_speed * dt;
        if translation.length_squared() > max_translation * max_translation {
            body.v *= max_translation / translation.length();
        }

        let rotation = dt * body.w;
        if rotation * rotation > MAX_ROTATION * MAX_ROTATION {
            body.w *= MAX_ROTATION / rotation.abs();
        }

        body.c += dt * body.v;
        body.a += dt * body.w;
    }

    /// Moves a kinematic body by its prescribed velocity.
    pub fn integrate_kinematic(&self, body: &mut RigidBody, dt: f32) {
        if !body.is_kinematic() {
            return;
        }
        body.sweep.c += dt * body.velocity.linear;
        body.sweep.a += dt * body.velocity.angular;
        body.synchronize_transform();
    }

    /// Velocity pass over every body. Returns the number of bodies integrated.
    pub fn step_velocities(&self, bodies: &mut Arena<RigidBody>, dt: f32) -> usize {
        let mut integrated = 0;
        for (_, body) in bodies.iter_mut() {
            body.sweep.c0 = body.sweep.c;
            body.sweep.a0 = body.sweep.a;
            if body.is_dynamic() && body.is_awake() {
                integrated += 1;
            }
            self.integrate_velocity(body, dt);
        }
        integrated
    }
}
