//! The simulation world: entity ownership, the per-step stage machine,
//! continuous collision and host-facing queries.

pub mod collision_manager;
pub mod dynamics_manager;

use glam::Vec2;
use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};

use crate::{
    collision::{
        aabb::Aabb,
        contact::{Contact, ContactEvent},
        queries::{Raycast, RaycastHit, RaycastQuery},
    },
    config::WorldConfig,
    core::{
        collider::Collider,
        joint::JointDef,
        rigidbody::{BodyType, RigidBody, RigidBodyBuilder},
    },
    dynamics::{
        forces::ForceRegistry,
        joints::Joint,
        parallel::{merge_metrics, run_phase},
    },
    error::{PhysicsError, PhysicsResult},
    utils::{
        allocator::{Arena, EntityId},
        logging::{warn_if_frame_budget_exceeded, ScopedTimer},
        profiling::StepProfile,
    },
};

pub use collision_manager::CollisionManager;
pub use dynamics_manager::DynamicsManager;
use dynamics_manager::joint_blocks_collision;

/// Where the world is inside [`PhysicsWorld::step_fixed`].
///
/// Stages run in declaration order and wrap from `Commit` back to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum StepStage {
    #[default]
    Idle,
    IntegrateForces,
    BroadPhaseUpdate,
    NarrowPhase,
    IslandBuild,
    SolveVelocities,
    IntegratePositions,
    SolvePositions,
    ContinuousCollision,
    Commit,
}

impl StepStage {
    pub fn next(self) -> StepStage {
        match self {
            StepStage::Idle => StepStage::IntegrateForces,
            StepStage::IntegrateForces => StepStage::BroadPhaseUpdate,
            StepStage::BroadPhaseUpdate => StepStage::NarrowPhase,
            StepStage::NarrowPhase => StepStage::IslandBuild,
            StepStage::IslandBuild => StepStage::SolveVelocities,
            StepStage::SolveVelocities => StepStage::IntegratePositions,
            StepStage::IntegratePositions => StepStage::SolvePositions,
            StepStage::SolvePositions => StepStage::ContinuousCollision,
            StepStage::ContinuousCollision => StepStage::Commit,
            StepStage::Commit => StepStage::Idle,
        }
    }

    pub fn can_advance_to(self, stage: StepStage) -> bool {
        self.next() == stage
    }
}

/// Central simulation container orchestrating all subsystems.
#[derive(Debug)]
pub struct PhysicsWorld {
    bodies: Arena<RigidBody>,
    colliders: Arena<Collider>,
    collision: CollisionManager,
    dynamics: DynamicsManager,
    config: WorldConfig,
    time_accumulated: f32,
    stage: StepStage,
    profile: StepProfile,
    parallel_enabled: bool,
    /// Events already reported by the last frame; dropped when the next
    /// frame starts.
    published_events: usize,
    step_count: u64,
}

impl PhysicsWorld {
    pub fn new(config: WorldConfig) -> PhysicsResult<Self> {
        config.validate()?;
        Ok(Self {
            bodies: Arena::new(),
            colliders: Arena::new(),
            collision: CollisionManager::new(&config),
            dynamics: DynamicsManager::new(&config),
            config,
            time_accumulated: 0.0,
            stage: StepStage::Idle,
            profile: StepProfile::default(),
            parallel_enabled: cfg!(feature = "parallel"),
            published_events: 0,
            step_count: 0,
        })
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Replaces the configuration. Existing contacts and proxies are kept
    /// even if they now exceed the new caps.
    pub fn set_config(&mut self, config: WorldConfig) -> PhysicsResult<()> {
        config.validate()?;
        self.collision.apply_config(&config);
        self.dynamics.apply_config(&config);
        self.config = config;
        Ok(())
    }

    pub fn gravity(&self) -> Vec2 {
        self.config.gravity
    }

    pub fn set_gravity(&mut self, gravity: Vec2) -> PhysicsResult<()> {
        let config = WorldConfig {
            gravity,
            ..self.config
        };
        self.set_config(config)
    }

    pub fn set_parallel_enabled(&mut self, enabled: bool) {
        self.parallel_enabled = enabled;
    }

    pub fn parallel_enabled(&self) -> bool {
        self.parallel_enabled
    }

    pub fn force_registry(&self) -> &ForceRegistry {
        &self.dynamics.force_registry
    }

    pub fn force_registry_mut(&mut self) -> &mut ForceRegistry {
        &mut self.dynamics.force_registry
    }

    pub fn stage(&self) -> StepStage {
        self.stage
    }

    /// Timings and counts from the most recent step.
    pub fn profile(&self) -> &StepProfile {
        &self.profile
    }

    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    // ---------------------------------------------------------------------
    // Bodies

    /// Inserts a body. Any collider or joint handles it carries are dropped.
    pub fn create_body(&mut self, mut body: RigidBody) -> PhysicsResult<EntityId> {
        body.validate()?;
        body.colliders.clear();
        body.joints.clear();
        body.clear_forces();
        let id = self.bodies.next_id();
        body.id = id;
        body.update_mass(std::iter::empty())?;
        let inserted = self.bodies.insert(body);
        debug_assert_eq!(inserted, id);
        trace!("created body {id:?}");
        Ok(id)
    }

    pub fn build_body(&mut self, builder: RigidBodyBuilder) -> PhysicsResult<EntityId> {
        self.create_body(builder.build())
    }

    /// Removes a body with its colliders, contacts and joints, waking
    /// everything that was connected to it.
    pub fn destroy_body(&mut self, id: EntityId) -> PhysicsResult<()> {
        let body = self.bodies.get(id).ok_or(PhysicsError::UnknownBody(id))?;
        let joints = body.joints.clone();
        let colliders = body.colliders.clone();

        for joint_id in joints {
            self.destroy_joint(joint_id)?;
        }
        let mut touched = Vec::new();
        for collider_id in colliders {
            if let Some(mut collider) = self.colliders.remove(collider_id) {
                touched.extend(self.collision.remove_collider(&mut collider));
            }
        }
        self.bodies.remove(id);
        for other in touched {
            if other != id {
                self.wake(other);
            }
        }
        trace!("destroyed body {id:?}");
        Ok(())
    }

    pub fn body(&self, id: EntityId) -> Option<&RigidBody> {
        self.bodies.get(id)
    }

    pub fn bodies(&self) -> impl Iterator<Item = (EntityId, &RigidBody)> + '_ {
        self.bodies.iter()
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Teleports a body. Its contacts are re-evaluated on the next step.
    pub fn set_transform(&mut self, id: EntityId, position: Vec2, angle: f32) -> PhysicsResult<()> {
        if !position.is_finite() || !angle.is_finite() {
            return Err(PhysicsError::InvalidBody("transform must be finite".into()));
        }
        let body = self.bodies.get_mut(id).ok_or(PhysicsError::UnknownBody(id))?;
        body.set_transform(position, angle);
        if !body.is_static() {
            body.set_awake(true);
        }
        self.collision.refit_body(body, &mut self.colliders);
        Ok(())
    }

    pub fn set_linear_velocity(&mut self, id: EntityId, velocity: Vec2) -> PhysicsResult<()> {
        if !velocity.is_finite() {
            return Err(PhysicsError::InvalidBody("velocity must be finite".into()));
        }
        let body = self.bodies.get_mut(id).ok_or(PhysicsError::UnknownBody(id))?;
        if body.is_static() {
            return Ok(());
        }
        if velocity.length_squared() > 0.0 {
            body.set_awake(true);
        }
        body.velocity.linear = velocity;
        Ok(())
    }

    pub fn set_angular_velocity(&mut self, id: EntityId, velocity: f32) -> PhysicsResult<()> {
        if !velocity.is_finite() {
            return Err(PhysicsError::InvalidBody("velocity must be finite".into()));
        }
        let body = self.bodies.get_mut(id).ok_or(PhysicsError::UnknownBody(id))?;
        if body.is_static() || body.fixed_rotation {
            return Ok(());
        }
        if velocity != 0.0 {
            body.set_awake(true);
        }
        body.velocity.angular = velocity;
        Ok(())
    }

    pub fn wake_body(&mut self, id: EntityId) -> PhysicsResult<()> {
        if !self.bodies.contains(id) {
            return Err(PhysicsError::UnknownBody(id));
        }
        self.wake(id);
        Ok(())
    }

    fn wake(&mut self, id: EntityId) {
        if let Some(body) = self.bodies.get_mut(id) {
            if !body.is_static() && !body.is_awake() {
                body.set_awake(true);
            }
        }
    }

    // ---------------------------------------------------------------------
    // Forces

    fn awake_body_mut(&mut self, id: EntityId) -> PhysicsResult<&mut RigidBody> {
        let body = self.bodies.get_mut(id).ok_or(PhysicsError::UnknownBody(id))?;
        if body.is_dynamic() && !body.is_awake() {
            body.set_awake(true);
        }
        Ok(body)
    }

    /// Applies a force at a world point until the end of the next step.
    pub fn apply_force(&mut self, id: EntityId, force: Vec2, point: Vec2) -> PhysicsResult<()> {
        self.awake_body_mut(id)?.apply_force(force, point);
        Ok(())
    }

    pub fn apply_force_to_center(&mut self, id: EntityId, force: Vec2) -> PhysicsResult<()> {
        self.awake_body_mut(id)?.apply_force_to_center(force);
        Ok(())
    }

    pub fn apply_torque(&mut self, id: EntityId, torque: f32) -> PhysicsResult<()> {
        self.awake_body_mut(id)?.apply_torque(torque);
        Ok(())
    }

    pub fn apply_linear_impulse(&mut self, id: EntityId, impulse: Vec2, point: Vec2) -> PhysicsResult<()> {
        self.awake_body_mut(id)?.apply_linear_impulse(impulse, point);
        Ok(())
    }

    pub fn apply_angular_impulse(&mut self, id: EntityId, impulse: f32) -> PhysicsResult<()> {
        self.awake_body_mut(id)?.apply_angular_impulse(impulse);
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Colliders

    /// Attaches a collider to a body and adds it to the broad-phase.
    ///
    /// Nothing is inserted if validation, the mass update or the proxy cap
    /// fails.
    pub fn create_collider(&mut self, body_id: EntityId, mut collider: Collider) -> PhysicsResult<EntityId> {
        collider.validate()?;
        let body = self
            .bodies
            .get(body_id)
            .ok_or(PhysicsError::UnknownBody(body_id))?;

        let id = self.colliders.next_id();
        collider.id = id;
        collider.body_id = body_id;
        collider.proxy = None;

        let mut updated = body.clone();
        updated.update_mass(
            body.colliders
                .iter()
                .filter_map(|existing| self.colliders.get(*existing))
                .chain(std::iter::once(&collider)),
        )?;
        updated.colliders.push(id);

        self.collision.insert_collider(&mut collider, &updated)?;
        let inserted = self.colliders.insert(collider);
        debug_assert_eq!(inserted, id);

        if updated.is_dynamic() {
            updated.set_awake(true);
        }
        if let Some(slot) = self.bodies.get_mut(body_id) {
            *slot = updated;
        }
        trace!("created collider {id:?} on body {body_id:?}");
        Ok(id)
    }

    /// Detaches a collider, ending its contacts and recomputing the
    /// owner's mass.
    pub fn destroy_collider(&mut self, id: EntityId) -> PhysicsResult<()> {
        let mut collider = self
            .colliders
            .remove(id)
            .ok_or(PhysicsError::UnknownCollider(id))?;
        let touched = self.collision.remove_collider(&mut collider);

        if let Some(body) = self.bodies.get_mut(collider.body_id) {
            body.colliders.retain(|c| *c != id);
            let remaining: Vec<&Collider> = body
                .colliders
                .iter()
                .filter_map(|c| self.colliders.get(*c))
                .collect();
            if let Err(err) = body.update_mass(remaining) {
                warn!("body {:?} keeps its previous mass after losing collider {id:?}: {err}", collider.body_id);
            }
        }
        self.wake(collider.body_id);
        for other in touched {
            self.wake(other);
        }
        Ok(())
    }

    pub fn collider(&self, id: EntityId) -> Option<&Collider> {
        self.colliders.get(id)
    }

    pub fn colliders(&self) -> impl Iterator<Item = (EntityId, &Collider)> + '_ {
        self.colliders.iter()
    }

    pub fn collider_count(&self) -> usize {
        self.colliders.len()
    }

    // ---------------------------------------------------------------------
    // Joints

    pub fn create_joint(&mut self, def: JointDef) -> PhysicsResult<EntityId> {
        def.validate()?;
        for body in [def.body_a, def.body_b] {
            if !self.bodies.contains(body) {
                return Err(PhysicsError::UnknownBody(body));
            }
        }

        let (body_a, body_b) = (def.body_a, def.body_b);
        let collide_connected = def.collide_connected;
        let id = self.dynamics.joints.insert(Joint::new(EntityId::NULL, def));
        if let Some(joint) = self.dynamics.joints.get_mut(id) {
            joint.id = id;
        }
        for body_id in [body_a, body_b] {
            if let Some(body) = self.bodies.get_mut(body_id) {
                body.joints.push(id);
            }
            self.wake(body_id);
        }
        if !collide_connected {
            self.collision
                .contacts
                .remove_between(body_a, body_b, &mut self.collision.events);
        }
        trace!("created joint {id:?} between {body_a:?} and {body_b:?}");
        Ok(id)
    }

    pub fn destroy_joint(&mut self, id: EntityId) -> PhysicsResult<()> {
        let joint = self
            .dynamics
            .joints
            .remove(id)
            .ok_or(PhysicsError::UnknownJoint(id))?;
        let (body_a, body_b) = joint.bodies();
        for body_id in [body_a, body_b] {
            if let Some(body) = self.bodies.get_mut(body_id) {
                body.joints.retain(|j| *j != id);
                if !joint.collide_connected() {
                    self.collision.touch_body(body, &self.colliders);
                }
            }
            self.wake(body_id);
        }
        Ok(())
    }

    pub fn joint(&self, id: EntityId) -> Option<&Joint> {
        self.dynamics.joints.get(id)
    }

    pub fn joints(&self) -> impl Iterator<Item = (EntityId, &Joint)> + '_ {
        self.dynamics.joints.iter()
    }

    pub fn joint_count(&self) -> usize {
        self.dynamics.joints.len()
    }

    /// Force the joint applied to body B during the last step.
    pub fn joint_reaction_force(&self, id: EntityId) -> PhysicsResult<Vec2> {
        self.joint(id)
            .map(Joint::reaction_force)
            .ok_or(PhysicsError::UnknownJoint(id))
    }

    pub fn joint_reaction_torque(&self, id: EntityId) -> PhysicsResult<f32> {
        self.joint(id)
            .map(Joint::reaction_torque)
            .ok_or(PhysicsError::UnknownJoint(id))
    }

    // ---------------------------------------------------------------------
    // Contacts and queries

    /// Contact events produced since the last frame started, in emission
    /// order.
    pub fn contact_events(&self) -> &[ContactEvent] {
        &self.collision.events
    }

    pub fn contacts(&self) -> impl Iterator<Item = &Contact> + '_ {
        self.collision.contacts.iter().map(|(_, contact)| contact)
    }

    pub fn contact_count(&self) -> usize {
        self.collision.contacts.len()
    }

    pub fn collision(&self) -> &CollisionManager {
        &self.collision
    }

    pub fn island_count(&self) -> usize {
        self.dynamics.islands.island_count()
    }

    pub fn raycast(&self, query: &RaycastQuery) -> Vec<RaycastHit> {
        Raycast::cast(query, &self.collision.broad_phase, &self.colliders, &self.bodies)
    }

    pub fn raycast_closest(&self, query: &RaycastQuery) -> Option<RaycastHit> {
        Raycast::cast_closest(query, &self.collision.broad_phase, &self.colliders, &self.bodies)
    }

    pub fn query_aabb(&self, aabb: &Aabb) -> Vec<EntityId> {
        Raycast::query_aabb(aabb, &self.collision.broad_phase, &self.colliders)
    }

    // ---------------------------------------------------------------------
    // Stepping

    /// Advances the simulation using a fixed timestep accumulator.
    ///
    /// Returns the number of fixed steps taken.
    pub fn step(&mut self, dt: f32) -> usize {
        if !(dt.is_finite() && dt >= 0.0) {
            warn!("ignoring step with invalid dt {dt}");
            return 0;
        }
        self.begin_frame();
        self.time_accumulated += dt;

        let h = self.config.time_step;
        let max_steps = self.config.max_substeps as usize;
        let mut steps = 0;
        while self.time_accumulated >= h && steps < max_steps {
            self.time_accumulated -= h;
            self.run_step(h);
            steps += 1;
        }
        if self.time_accumulated >= h {
            let dropped = (self.time_accumulated / h).floor();
            warn!("dropping {dropped} fixed steps after running {steps} in one call");
            self.time_accumulated %= h;
        }
        self.published_events = self.collision.events.len();
        steps
    }

    /// Runs exactly one step of `config.time_step`.
    pub fn step_fixed(&mut self) {
        self.begin_frame();
        self.run_step(self.config.time_step);
        self.published_events = self.collision.events.len();
    }

    fn begin_frame(&mut self) {
        let published = self.published_events.min(self.collision.events.len());
        self.collision.events.drain(..published);
        self.published_events = 0;
    }

    fn advance(&mut self, stage: StepStage) {
        debug_assert!(
            self.stage.can_advance_to(stage),
            "step stage {stage:?} cannot follow {:?}",
            self.stage
        );
        trace!("stage {stage:?}");
        self.stage = stage;
    }

    fn run_step(&mut self, h: f32) {
        let total = ScopedTimer::new("world::step");
        self.profile.reset();

        self.advance(StepStage::IntegrateForces);
        let timer = ScopedTimer::new("integrate_forces");
        self.dynamics.integrate_forces(&mut self.bodies, h);
        self.profile.integrate_forces = timer.finish();

        self.advance(StepStage::BroadPhaseUpdate);
        let timer = ScopedTimer::new("broad_phase");
        self.collision
            .find_new_contacts(&self.colliders, &self.bodies, &self.dynamics.joints);
        self.profile.broad_phase = timer.finish();

        self.advance(StepStage::NarrowPhase);
        let timer = ScopedTimer::new("narrow_phase");
        let mut wake = Vec::new();
        let update = self.collision.collide(&self.colliders, &self.bodies, &mut wake);
        for id in wake {
            self.wake(id);
        }
        self.profile.narrow_phase = timer.finish();

        self.advance(StepStage::IslandBuild);
        let timer = ScopedTimer::new("island_build");
        let mut jobs = self
            .dynamics
            .build_jobs(&mut self.bodies, &self.collision.contacts);
        self.profile.island_build = timer.finish();

        let solve_timer = ScopedTimer::new("solve");
        let parallel = self.parallel_enabled;
        let solver = self.dynamics.solver.clone();
        let integrator = self.dynamics.integrator.clone();

        self.advance(StepStage::SolveVelocities);
        run_phase(&mut jobs, parallel, |job| job.solve_velocities(&solver, h));

        self.advance(StepStage::IntegratePositions);
        run_phase(&mut jobs, parallel, |job| job.integrate_positions(&integrator, h));
        self.dynamics.integrate_kinematic(&mut self.bodies, h);

        self.advance(StepStage::SolvePositions);
        run_phase(&mut jobs, parallel, |job| job.solve_positions(&solver));
        for job in &jobs {
            job.write_back(&mut self.bodies, &mut self.collision.contacts, &mut self.dynamics.joints);
        }
        self.profile.solver = merge_metrics(&jobs);
        self.profile.solve = solve_timer.finish();

        self.advance(StepStage::ContinuousCollision);
        let timer = ScopedTimer::new("continuous");
        self.profile.toi_events = self.solve_continuous(h);
        self.profile.continuous = timer.finish();

        self.advance(StepStage::Commit);
        self.collision.synchronize(&self.bodies, &mut self.colliders, h);
        let slept = self
            .dynamics
            .islands
            .update_sleeping(&mut self.bodies, &self.config, h);
        self.step_count += 1;
        self.advance(StepStage::Idle);

        self.profile.body_count = self.bodies.len();
        self.profile.awake_body_count = self
            .bodies
            .values()
            .filter(|body| body.is_dynamic() && body.is_awake())
            .count();
        self.profile.proxy_count = self.collision.broad_phase.proxy_count();
        self.profile.contact_count = self.collision.contacts.len();
        self.profile.touching_contact_count = update.touching;
        self.profile.island_count = self.dynamics.islands.island_count();
        self.profile.total = total.finish();

        if slept > 0 {
            debug!("{slept} islands fell asleep");
        }
        if self.profile.solver.skipped_rows > 0 {
            debug!("skipped {} degenerate rows", self.profile.solver.skipped_rows);
        }
        debug!("step {}: {}", self.step_count, self.profile.summary());
        warn_if_frame_budget_exceeded(self.profile.total, self.config.frame_budget_ms);
    }

    /// Pulls fast bodies back to their first time of impact.
    ///
    /// Fast bodies sweep against static and kinematic colliders. Bullets
    /// also sweep against other non-bullet dynamic bodies held at their end
    /// pose. Contacts for the impact are created on the next step.
    fn solve_continuous(&mut self, h: f32) -> usize {
        let ccd = self.collision.ccd;
        if !ccd.enabled {
            return 0;
        }

        let candidates: Vec<EntityId> = self
            .bodies
            .iter()
            .filter(|(_, body)| {
                body.is_dynamic()
                    && body.is_awake()
                    && (body.is_bullet
                        || ccd.is_fast(
                            body.min_extent,
                            body.max_extent,
                            body.velocity.linear,
                            body.velocity.angular,
                            h,
                        ))
            })
            .map(|(id, _)| id)
            .collect();

        let mut hits = 0;
        for id in candidates {
            let Some(body) = self.bodies.get(id) else {
                continue;
            };
            let mut min_fraction = 1.0_f32;

            for collider_id in &body.colliders {
                let Some(collider) = self.colliders.get(*collider_id) else {
                    continue;
                };
                if collider.is_sensor {
                    continue;
                }
                let proxy = collider.shape.proxy();
                let swept = CollisionManager::swept_aabb(collider, body);

                self.collision.broad_phase.query(&swept, |_, other_id| {
                    let Some(other) = self.colliders.get(other_id) else {
                        return true;
                    };
                    if other.body_id == id
                        || other.is_sensor
                        || !collider.collision_filter.should_collide(&other.collision_filter)
                    {
                        return true;
                    }
                    let Some(other_body) = self.bodies.get(other.body_id) else {
                        return true;
                    };
                    let target = match other_body.body_type() {
                        BodyType::Static => other_body.sweep.stationary(),
                        BodyType::Kinematic => other_body.sweep,
                        BodyType::Dynamic => {
                            if !body.is_bullet || other_body.is_bullet {
                                return true;
                            }
                            other_body.sweep.stationary()
                        }
                    };
                    if joint_blocks_collision(&self.bodies, &self.dynamics.joints, id, other.body_id) {
                        return true;
                    }
                    if let Some(fraction) =
                        ccd.sweep_pair((&proxy, &body.sweep), (&other.shape.proxy(), &target), min_fraction)
                    {
                        min_fraction = fraction;
                    }
                    true
                });
            }

            if min_fraction < 1.0 {
                if let Some(body) = self.bodies.get_mut(id) {
                    let sweep = body.sweep;
                    body.sweep.c = sweep.c0.lerp(sweep.c, min_fraction);
                    body.sweep.a = sweep.a0 + min_fraction * (sweep.a - sweep.a0);
                    body.synchronize_transform();
                    trace!("body {id:?} clamped to time of impact {min_fraction:.4}");
                }
                hits += 1;
            }
        }
        hits
    }
}
