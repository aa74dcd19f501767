use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Work counters gathered by the island solver during one step.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolverStepMetrics {
    pub islands_solved: usize,
    pub bodies_solved: usize,
    pub contacts_solved: usize,
    pub joints_solved: usize,
    pub velocity_iterations: usize,
    pub position_iterations: usize,
    pub skipped_rows: usize,
    pub normal_impulse_sum: f32,
    pub tangent_impulse_sum: f32,
}

impl SolverStepMetrics {
    pub fn merge(&mut self, other: &Self) {
        self.islands_solved += other.islands_solved;
        self.bodies_solved += other.bodies_solved;
        self.contacts_solved += other.contacts_solved;
        self.joints_solved += other.joints_solved;
        self.velocity_iterations += other.velocity_iterations;
        self.position_iterations += other.position_iterations;
        self.skipped_rows += other.skipped_rows;
        self.normal_impulse_sum += other.normal_impulse_sum;
        self.tangent_impulse_sum += other.tangent_impulse_sum;
    }
}

/// Per-stage timings and counts for the most recent step.
#[derive(Debug, Default, Clone, Copy)]
pub struct StepProfile {
    pub integrate_forces: Duration,
    pub broad_phase: Duration,
    pub narrow_phase: Duration,
    pub island_build: Duration,
    pub solve: Duration,
    pub continuous: Duration,
    pub total: Duration,

    pub body_count: usize,
    pub awake_body_count: usize,
    pub proxy_count: usize,
    pub contact_count: usize,
    pub touching_contact_count: usize,
    pub island_count: usize,
    pub toi_events: usize,
    pub solver: SolverStepMetrics,
}

impl StepProfile {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// One-line summary suitable for `log::debug!`.
    pub fn summary(&self) -> String {
        format!(
            "bodies {} (awake {}), contacts {} (touching {}), islands {}, toi {}, total {:.3} ms",
            self.body_count,
            self.awake_body_count,
            self.contact_count,
            self.touching_contact_count,
            self.island_count,
            self.toi_events,
            self.total.as_secs_f32() * 1000.0
        )
    }
}
