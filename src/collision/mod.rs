//! Collision detection modules: broad-phase, narrow-phase, contact manifolds, queries, CCD.

pub mod aabb;
pub mod shapes;
pub mod broadphase;
pub mod distance;
pub mod clipping;
pub mod manifold;
pub mod narrowphase;
pub mod contact;
pub mod queries;
pub mod ccd;

pub use aabb::Aabb;
pub use broadphase::{BroadPhase, DynamicTree, ProxyId};
pub use ccd::{time_of_impact, CCDDetector, ToiInput, ToiOutput, ToiState};
pub use contact::{Contact, ContactEvent, ContactEventKind, ContactManager};
pub use distance::{distance, DistanceOutput, ShapeProxy};
pub use manifold::{Feature, FeatureId, Manifold, ManifoldPoint};
pub use narrowphase::NarrowPhase;
pub use queries::{Raycast, RaycastHit, RaycastQuery};
pub use shapes::{Capsule, Circle, Polygon, RayCastInput, RayCastOutput, Segment};
