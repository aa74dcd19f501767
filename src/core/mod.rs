//! Core types describing physics entities, components, and shared data.

pub mod types;
pub mod rigidbody;
pub mod collider;
pub mod joint;

pub use types::{MassProperties, Material, MaterialMixing, MixingMode, Rot, Sweep, Transform, Velocity};
pub use rigidbody::{BodyType, RigidBody, RigidBodyBuilder, SleepState};
pub use collider::{Collider, ColliderBuilder, ColliderShape, CollisionFilter};
pub use joint::{
    DistanceJointDef, JointDef, JointKind, PrismaticJointDef, RevoluteJointDef, WeldJointDef,
};
