//! Error taxonomy for world construction and resource limits.

use crate::utils::allocator::EntityId;

/// Errors surfaced synchronously by creation and configuration calls.
///
/// In-step numerical trouble never shows up here: the stepper skips or clamps
/// degenerate rows and always produces a usable frame.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PhysicsError {
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),
    #[error("invalid material: {0}")]
    InvalidMaterial(String),
    #[error("invalid body definition: {0}")]
    InvalidBody(String),
    #[error("dynamic body {0:?} has zero or negative mass")]
    ZeroMass(EntityId),
    #[error("invalid joint: {0}")]
    InvalidJoint(String),
    #[error("invalid world configuration: {0}")]
    InvalidConfig(String),
    #[error("unknown body {0:?}")]
    UnknownBody(EntityId),
    #[error("unknown collider {0:?}")]
    UnknownCollider(EntityId),
    #[error("unknown joint {0:?}")]
    UnknownJoint(EntityId),
    #[error("{resource} capacity of {limit} exceeded")]
    CapacityExceeded { resource: &'static str, limit: usize },
}

pub type PhysicsResult<T> = Result<T, PhysicsError>;
