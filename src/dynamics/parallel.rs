//! Island jobs: self-contained copies of one island's bodies and
//! constraints, solved in phases and written back in island order.

use std::collections::HashMap;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::{
    collision::contact::ContactManager,
    core::rigidbody::RigidBody,
    dynamics::{
        integrator::Integrator,
        island::Island,
        joints::Joint,
        solver::{ContactConstraint, PGSSolver, SolverBody},
    },
    utils::{
        allocator::{Arena, EntityId},
        profiling::SolverStepMetrics,
    },
};

/// One island's solver state.
///
/// The first `ids.len()` entries of `bodies` are the island's dynamic
/// members; any static or kinematic body a constraint touches follows as a
/// read-only copy with zero inverse mass.
#[derive(Debug, Clone)]
pub struct IslandJob {
    pub ids: Vec<EntityId>,
    pub bodies: Vec<SolverBody>,
    id_map: HashMap<EntityId, usize>,
    pub contacts: Vec<ContactConstraint>,
    pub joints: Vec<(usize, usize, Joint)>,
    pub metrics: SolverStepMetrics,
}

impl IslandJob {
    pub fn build(
        island: &Island,
        bodies: &Arena<RigidBody>,
        contacts: &ContactManager,
        joints: &Arena<Joint>,
    ) -> Option<Self> {
        if island.bodies.is_empty() {
            return None;
        }

        let mut job = Self {
            ids: Vec::with_capacity(island.bodies.len()),
            bodies: Vec::with_capacity(island.bodies.len()),
            id_map: HashMap::with_capacity(island.bodies.len()),
            contacts: Vec::with_capacity(island.contacts.len()),
            joints: Vec::with_capacity(island.joints.len()),
            metrics: SolverStepMetrics::default(),
        };

        for body_id in &island.bodies {
            if let Some(body) = bodies.get(*body_id) {
                job.id_map.insert(*body_id, job.bodies.len());
                job.ids.push(*body_id);
                job.bodies.push(SolverBody::from_body(body));
            }
        }
        if job.ids.is_empty() {
            return None;
        }

        for joint_id in &island.joints {
            let Some(joint) = joints.get(*joint_id) else {
                continue;
            };
            let (body_a, body_b) = joint.bodies();
            let (Some(index_a), Some(index_b)) = (job.index_of(body_a, bodies), job.index_of(body_b, bodies))
            else {
                continue;
            };
            job.joints.push((index_a, index_b, joint.clone()));
        }

        for contact_id in &island.contacts {
            let Some(contact) = contacts.get(*contact_id) else {
                continue;
            };
            let (Some(index_a), Some(index_b)) =
                (job.index_of(contact.body_a, bodies), job.index_of(contact.body_b, bodies))
            else {
                continue;
            };
            job.contacts.push(ContactConstraint::new(contact, index_a, index_b));
        }

        job.metrics.islands_solved = 1;
        job.metrics.bodies_solved = job.ids.len();
        job.metrics.joints_solved = job.joints.len();
        Some(job)
    }

    fn index_of(&mut self, id: EntityId, bodies: &Arena<RigidBody>) -> Option<usize> {
        if let Some(index) = self.id_map.get(&id) {
            return Some(*index);
        }
        let body = bodies.get(id)?;
        let index = self.bodies.len();
        self.bodies.push(SolverBody::from_body(body));
        self.id_map.insert(id, index);
        Some(index)
    }

    /// Prepare, warm start, velocity iterations and the restitution pass.
    pub fn solve_velocities(&mut self, solver: &PGSSolver, h: f32) {
        let inv_h = if h > 0.0 { 1.0 / h } else { 0.0 };

        for (index_a, index_b, joint) in &mut self.joints {
            joint.prepare(*index_a, *index_b, &self.bodies, h, solver.warm_starting);
        }
        solver.prepare_contacts(&mut self.contacts, &self.bodies, inv_h, &mut self.metrics);

        for (_, _, joint) in &self.joints {
            joint.warm_start(&mut self.bodies);
        }
        solver.warm_start(&self.contacts, &mut self.bodies);

        for _ in 0..solver.velocity_iterations {
            for (_, _, joint) in &mut self.joints {
                joint.solve_velocity(&mut self.bodies);
            }
            solver.solve_velocity(&mut self.contacts, &mut self.bodies);
        }
        solver.apply_restitution(&mut self.contacts, &mut self.bodies);
        self.metrics.velocity_iterations += solver.velocity_iterations as usize;
    }

    /// Advances members, then moves the kinematic copies along their set
    /// velocity so the position pass sees them at their end-of-step pose.
    pub fn integrate_positions(&mut self, integrator: &Integrator, h: f32) {
        let members = self.ids.len();
        let (dynamic, fixed) = self.bodies.split_at_mut(members);
        for body in dynamic {
            integrator.integrate_position(body, h);
        }
        for body in fixed {
            body.c += h * body.v;
            body.a += h * body.w;
        }
    }

    /// NGS passes, stopping early once every joint and contact is within slop.
    pub fn solve_positions(&mut self, solver: &PGSSolver) {
        for _ in 0..solver.position_iterations {
            let mut joints_ok = true;
            for (_, _, joint) in &mut self.joints {
                joints_ok &= joint.solve_position(&mut self.bodies);
            }
            let min_separation = solver.solve_position(&self.contacts, &mut self.bodies);
            self.metrics.position_iterations += 1;
            if joints_ok && solver.positions_converged(min_separation) {
                break;
            }
        }
        solver.record(&self.contacts, &mut self.metrics);
    }

    /// Copies member state, contact impulses and joint impulses back.
    pub fn write_back(
        &self,
        bodies: &mut Arena<RigidBody>,
        contacts: &mut ContactManager,
        joints: &mut Arena<Joint>,
    ) {
        for (id, state) in self.ids.iter().zip(&self.bodies) {
            let Some(body) = bodies.get_mut(*id) else {
                continue;
            };
            body.sweep.c = state.c;
            body.sweep.a = state.a;
            body.velocity.linear = state.v;
            body.velocity.angular = state.w;
            body.synchronize_transform();
        }
        for constraint in &self.contacts {
            if let Some(contact) = contacts.get_mut(constraint.contact_id) {
                constraint.store_impulses(contact);
            }
        }
        for (_, _, joint) in &self.joints {
            if let Some(slot) = joints.get_mut(joint.id) {
                *slot = joint.clone();
            }
        }
    }
}

/// Runs one solver phase over every job, on the rayon pool when enabled.
///
/// Jobs share no state, so the result does not depend on the schedule.
pub fn run_phase<F>(jobs: &mut [IslandJob], parallel: bool, phase: F)
where
    F: Fn(&mut IslandJob) + Send + Sync,
{
    #[cfg(feature = "parallel")]
    if parallel {
        jobs.par_iter_mut().for_each(|job| phase(job));
        return;
    }
    #[cfg(not(feature = "parallel"))]
    let _ = parallel;

    for job in jobs.iter_mut() {
        phase(job);
    }
}

/// Sums per-island metrics in island order.
pub fn merge_metrics(jobs: &[IslandJob]) -> SolverStepMetrics {
    jobs.iter().fold(SolverStepMetrics::default(), |mut total, job| {
        total.merge(&job.metrics);
        total
    })
}

#[cfg(test)]
mod tests {
    use glam::Vec2;

    use super::*;
    use crate::core::{
        joint::{DistanceJointDef, JointDef},
        rigidbody::RigidBodyBuilder,
    };

    const H: f32 = 1.0 / 60.0;

    struct Pendulums {
        bodies: Arena<RigidBody>,
        joints: Arena<Joint>,
        islands: Vec<Island>,
    }

    fn pendulums(count: usize) -> Pendulums {
        let mut bodies = Arena::new();
        let mut joints = Arena::new();
        let mut islands = Vec::new();
        let ground = bodies.insert(RigidBodyBuilder::fixed().build());
        for i in 0..count {
            let x = i as f32 * 3.0;
            let bob = bodies.insert(
                RigidBodyBuilder::dynamic()
                    .translation(Vec2::new(x + 1.0, 0.0))
                    .linear_velocity(Vec2::new(0.0, -3.0))
                    .build(),
            );
            if let Some(body) = bodies.get_mut(bob) {
                body.id = bob;
            }
            let def = JointDef::distance(
                ground,
                bob,
                DistanceJointDef::new(Vec2::new(x, 0.0), Vec2::ZERO, 1.0),
            );
            let id = joints.insert(Joint::new(EntityId::NULL, def));
            if let Some(joint) = joints.get_mut(id) {
                joint.id = id;
            }
            islands.push(Island {
                bodies: vec![bob],
                contacts: Vec::new(),
                joints: vec![id],
                is_awake: true,
                can_sleep: true,
            });
        }
        Pendulums {
            bodies,
            joints,
            islands,
        }
    }

    fn run(scene: &mut Pendulums, parallel: bool, steps: usize) -> SolverStepMetrics {
        let solver = PGSSolver::new();
        let integrator = Integrator::new(Vec2::new(0.0, -10.0), 400.0);
        let mut contacts = ContactManager::new(16);
        let mut metrics = SolverStepMetrics::default();
        for _ in 0..steps {
            integrator.step_velocities(&mut scene.bodies, H);
            let mut jobs: Vec<IslandJob> = scene
                .islands
                .iter()
                .filter_map(|island| IslandJob::build(island, &scene.bodies, &contacts, &scene.joints))
                .collect();
            run_phase(&mut jobs, parallel, |job| job.solve_velocities(&solver, H));
            run_phase(&mut jobs, parallel, |job| job.integrate_positions(&integrator, H));
            run_phase(&mut jobs, parallel, |job| job.solve_positions(&solver));
            for job in &jobs {
                job.write_back(&mut scene.bodies, &mut contacts, &mut scene.joints);
            }
            metrics.merge(&merge_metrics(&jobs));
        }
        metrics
    }

    #[test]
    fn pendulum_bob_stays_on_its_circle() {
        let mut scene = pendulums(1);
        run(&mut scene, false, 120);
        let bob = scene.islands[0].bodies[0];
        let center = scene.bodies.get(bob).map(|b| b.world_center()).unwrap_or_default();
        assert!((center.length() - 1.0).abs() < 0.01, "radius {}", center.length());
        assert!(center.y.abs() > 0.1);
    }

    #[test]
    fn parallel_and_sequential_runs_match() {
        let mut sequential = pendulums(8);
        let mut parallel = pendulums(8);
        run(&mut sequential, false, 30);
        run(&mut parallel, true, 30);
        for island in &sequential.islands {
            let id = island.bodies[0];
            let a = sequential.bodies.get(id).map(|b| (b.world_center(), b.angle()));
            let b = parallel.bodies.get(id).map(|b| (b.world_center(), b.angle()));
            assert_eq!(a, b);
        }
    }

    #[test]
    fn metrics_are_merged_across_islands() {
        let mut scene = pendulums(3);
        let metrics = run(&mut scene, true, 1);
        assert_eq!(metrics.islands_solved, 3);
        assert_eq!(metrics.joints_solved, 3);
        assert_eq!(metrics.bodies_solved, 3);
    }

    #[test]
    fn kinematic_copies_move_with_their_velocity() {
        let mut bodies = Arena::new();
        let platform = bodies.insert(
            RigidBodyBuilder::kinematic()
                .linear_velocity(Vec2::new(0.0, -3.0))
                .angular_velocity(0.5)
                .build(),
        );
        let rider = bodies.insert(RigidBodyBuilder::dynamic().translation(Vec2::new(0.0, 1.0)).build());
        for id in [platform, rider] {
            if let Some(body) = bodies.get_mut(id) {
                body.id = id;
            }
        }
        let mut joints = Arena::new();
        let def = JointDef::distance(platform, rider, DistanceJointDef::new(Vec2::ZERO, Vec2::ZERO, 1.0));
        let joint = joints.insert(Joint::new(EntityId::NULL, def));
        if let Some(j) = joints.get_mut(joint) {
            j.id = joint;
        }
        let island = Island {
            bodies: vec![rider],
            contacts: Vec::new(),
            joints: vec![joint],
            is_awake: true,
            can_sleep: true,
        };
        let contacts = ContactManager::new(4);
        let mut job = IslandJob::build(&island, &bodies, &contacts, &joints).expect("job");
        assert_eq!(job.bodies.len(), 2);

        job.integrate_positions(&Integrator::new(Vec2::ZERO, 400.0), H);
        let copy = job.bodies[1];
        assert!((copy.c.y + 3.0 * H).abs() < 1e-6);
        assert!((copy.a - 0.5 * H).abs() < 1e-6);

        job.write_back(&mut bodies, &mut ContactManager::new(4), &mut joints);
        assert_eq!(bodies.get(platform).map(|b| b.position()), Some(Vec2::ZERO));
    }

    #[test]
    fn fixed_bodies_are_not_written_back() {
        let mut scene = pendulums(1);
        run(&mut scene, false, 10);
        let ground = scene.bodies.iter().find(|(_, b)| b.is_static()).map(|(_, b)| b.position());
        assert_eq!(ground, Some(Vec2::ZERO));
    }
}
