//! Simulation dynamics modules: integration, forces, joints, constraint solvers, and islands.

pub mod forces;
pub mod integrator;
pub mod island;
pub mod joints;
pub mod parallel;
pub mod solver;

pub use forces::{DragForce, ForceGenerator, ForceRegistry, GravityForce, SpringForce};
pub use integrator::Integrator;
pub use island::{Island, IslandManager};
pub use joints::Joint;
pub use parallel::IslandJob;
pub use solver::{ContactConstraint, PGSSolver, SolverBody};
pub use crate::utils::profiling::SolverStepMetrics;
