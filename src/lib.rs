//! Particle Accelerator 2D – a deterministic rigid-body physics engine for Rust.
//!
//! The crate is organised leaf first: shapes and bodies in [`core`],
//! broad-phase, manifolds and continuous collision in [`collision`],
//! islands, joints and the impulse solver in [`dynamics`], and the
//! step-by-step orchestration in [`world`].

pub mod collision;
pub mod config;
pub mod core;
pub mod dynamics;
pub mod error;
pub mod utils;
pub mod world;

pub use glam::Vec2;

pub use collision::{
    aabb::Aabb,
    broadphase::{BroadPhase, ProxyId},
    contact::{Contact, ContactEvent, ContactEventKind},
    manifold::{FeatureId, Manifold, ManifoldPoint},
    queries::{Raycast, RaycastHit, RaycastQuery},
    shapes::{Capsule, Circle, Polygon, Segment},
};
pub use config::WorldConfig;
pub use crate::core::{
    collider::{Collider, ColliderBuilder, ColliderShape, CollisionFilter},
    joint::{DistanceJointDef, JointDef, JointKind, PrismaticJointDef, RevoluteJointDef, WeldJointDef},
    rigidbody::{BodyType, RigidBody, RigidBodyBuilder, SleepState},
    types::{MassProperties, Material, Transform, Velocity},
};
pub use dynamics::{
    forces::{DragForce, ForceGenerator, ForceRegistry, GravityForce, SpringForce},
    joints::Joint,
};
pub use error::{PhysicsError, PhysicsResult};
pub use utils::{
    allocator::{Arena, EntityId},
    profiling::{SolverStepMetrics, StepProfile},
};
pub use world::{PhysicsWorld, StepStage};

/// High-level convenience wrapper that owns a [`PhysicsWorld`].
#[derive(Debug)]
pub struct PhysicsEngine {
    world: PhysicsWorld,
}

impl PhysicsEngine {
    /// Creates an engine with default settings and the provided fixed timestep.
    pub fn new(timestep: f32) -> PhysicsResult<Self> {
        Self::with_config(WorldConfig::default().with_time_step(timestep))
    }

    pub fn with_config(config: WorldConfig) -> PhysicsResult<Self> {
        Ok(Self {
            world: PhysicsWorld::new(config)?,
        })
    }

    /// Adds a rigid body to the world and returns its generated [`EntityId`].
    pub fn add_body(&mut self, body: RigidBody) -> PhysicsResult<EntityId> {
        self.world.create_body(body)
    }

    /// Attaches a collider to an existing body and returns its [`EntityId`].
    pub fn add_collider(&mut self, body: EntityId, collider: Collider) -> PhysicsResult<EntityId> {
        self.world.create_collider(body, collider)
    }

    pub fn add_joint(&mut self, def: JointDef) -> PhysicsResult<EntityId> {
        self.world.create_joint(def)
    }

    /// Advances the simulation by the provided delta time.
    pub fn step(&mut self, dt: f32) -> usize {
        self.world.step(dt)
    }

    /// Enables or disables solving islands on the rayon pool.
    pub fn set_parallel_enabled(&mut self, enabled: bool) {
        self.world.set_parallel_enabled(enabled);
    }

    pub fn parallel_enabled(&self) -> bool {
        self.world.parallel_enabled()
    }

    /// Immutable access to a rigid body by id.
    pub fn get_body(&self, id: EntityId) -> Option<&RigidBody> {
        self.world.body(id)
    }

    pub fn world(&self) -> &PhysicsWorld {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut PhysicsWorld {
        &mut self.world
    }
}
