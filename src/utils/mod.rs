//! Utility helpers: generational arenas, planar math, logging and profiling.

pub mod allocator;
pub mod logging;
pub mod math;
pub mod profiling;

pub use allocator::{Arena, EntityId};
pub use math::*;
pub use profiling::{SolverStepMetrics, StepProfile};
