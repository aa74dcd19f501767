use crate::{
    collision::contact::ContactManager,
    config::WorldConfig,
    core::rigidbody::RigidBody,
    dynamics::{
        forces::ForceRegistry, integrator::Integrator, island::IslandManager, joints::Joint,
        parallel::IslandJob, solver::PGSSolver,
    },
    utils::allocator::{Arena, EntityId},
};

/// Solver settings, joints, force generators and the island graph.
#[derive(Debug)]
pub struct DynamicsManager {
    pub solver: PGSSolver,
    pub integrator: Integrator,
    pub islands: IslandManager,
    pub joints: Arena<Joint>,
    pub force_registry: ForceRegistry,
}

impl DynamicsManager {
    pub fn new(config: &WorldConfig) -> Self {
        let mut manager = Self {
            solver: PGSSolver::new(),
            integrator: Integrator::new(config.gravity, config.max_linear_speed),
            islands: IslandManager::new(),
            joints: Arena::new(),
            force_registry: ForceRegistry::new(),
        };
        manager.apply_config(config);
        manager
    }

    pub fn apply_config(&mut self, config: &WorldConfig) {
        self.solver.velocity_iterations = config.velocity_iterations;
        self.solver.position_iterations = config.position_iterations;
        self.solver.warm_starting = config.enable_warm_starting;
        self.solver.restitution_threshold = config.restitution_threshold;
        self.integrator.gravity = config.gravity;
        self.integrator.max_linear_speed = config.max_linear_speed;
    }

    /// Runs force generators, then integrates velocities of awake dynamic
    /// bodies and moves kinematic ones' sweeps forward.
    pub fn integrate_forces(&self, bodies: &mut Arena<RigidBody>, dt: f32) -> usize {
        self.force_registry.apply_all(bodies, dt);
        self.integrator.step_velocities(bodies, dt)
    }

    pub fn integrate_kinematic(&self, bodies: &mut Arena<RigidBody>, dt: f32) {
        for (_, body) in bodies.iter_mut() {
            self.integrator.integrate_kinematic(body, dt);
        }
    }

    /// Rebuilds islands and snapshots each into a solver job.
    pub fn build_jobs(&mut self, bodies: &mut Arena<RigidBody>, contacts: &ContactManager) -> Vec<IslandJob> {
        self.islands
            .build_islands(bodies, contacts.iter().map(|(_, c)| c), self.joints.values());
        self.islands
            .islands()
            .iter()
            .filter_map(|island| IslandJob::build(island, bodies, contacts, &self.joints))
            .collect()
    }
}

/// Whether a joint between the two bodies turns their collision off.
pub(crate) fn joint_blocks_collision(
    bodies: &Arena<RigidBody>,
    joints: &Arena<Joint>,
    body_a: EntityId,
    body_b: EntityId,
) -> bool {
    let Some(body) = bodies.get(body_a) else {
        return false;
    };
    body.joints.iter().any(|id| {
        joints
            .get(*id)
            .is_some_and(|joint| !joint.collide_connected() && joint.connects(body_a, body_b))
    })
}

#[cfg(test)]
mod tests {
    use glam::Vec2;

    use super::*;
    use crate::core::{
        joint::{JointDef, RevoluteJointDef},
        rigidbody::RigidBodyBuilder,
    };

    #[test]
    fn config_reaches_solver_and_integrator() {
        let config = WorldConfig::default()
            .with_iterations(4, 2)
            .with_gravity(Vec2::new(0.0, -3.0));
        let manager = DynamicsManager::new(&config);
        assert_eq!(manager.solver.velocity_iterations, 4);
        assert_eq!(manager.solver.position_iterations, 2);
        assert_eq!(manager.integrator.gravity, Vec2::new(0.0, -3.0));
    }

    #[test]
    fn joint_filters_unless_collide_connected() {
        let mut bodies = Arena::new();
        let a = bodies.insert(RigidBodyBuilder::dynamic().build());
        let b = bodies.insert(RigidBodyBuilder::dynamic().build());
        let mut joints = Arena::new();
        let def = JointDef::revolute(a, b, RevoluteJointDef::new(Vec2::ZERO, Vec2::ZERO));
        let id = joints.insert(Joint::new(EntityId::NULL, def));
        if let Some(joint) = joints.get_mut(id) {
            joint.id = id;
        }
        if let Some(body) = bodies.get_mut(a) {
            body.joints.push(id);
        }
        assert!(joint_blocks_collision(&bodies, &joints, a, b));

        if let Some(joint) = joints.get_mut(id) {
            *joint = Joint::new(id, joint.def().clone().collide_connected(true));
        }
        assert!(!joint_blocks_collision(&bodies, &joints, a, b));
    }
}
