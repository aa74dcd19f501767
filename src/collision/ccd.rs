//! Time of impact by conservative advancement, plus the fast-body test used
//! by the continuous collision stage.

use glam::Vec2;
use log::trace;
use serde::{Deserialize, Serialize};

use crate::{
    collision::distance::{distance, ShapeProxy},
    config::LINEAR_SLOP,
    core::types::Sweep,
};

/// Advancement steps before giving up on a pair.
pub const TOI_MAX_ITERATIONS: usize = 30;

#[derive(Debug, Clone, Copy)]
pub struct ToiInput {
    pub proxy_a: ShapeProxy,
    pub proxy_b: ShapeProxy,
    pub sweep_a: Sweep,
    pub sweep_b: Sweep,
    /// Upper end of the searched interval, in `[0, 1]`.
    pub max_fraction: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToiState {
    /// Shapes reach the target separation at `fraction`.
    Hit,
    /// No impact inside the interval.
    Separated,
    /// Already within the target separation at the start of the interval.
    Overlapped,
    /// Iteration budget exhausted; `fraction` is still a safe pose.
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToiOutput {
    pub state: ToiState,
    pub fraction: f32,
}

/// Conservative advancement on the core shapes.
///
/// Each iteration measures the core distance at the current fraction and
/// advances by the largest step that cannot close more than the remaining gap,
/// using the separating direction at that fraction as the bound's axis. The
/// reported pose keeps the shapes roughly `3 * LINEAR_SLOP` inside their
/// rounded skins so the following step produces a speculative contact.
pub fn time_of_impact(input: &ToiInput) -> ToiOutput {
    let ToiInput {
        proxy_a,
        proxy_b,
        sweep_a,
        sweep_b,
        max_fraction,
    } = *input;

    let total_radius = proxy_a.radius + proxy_b.radius;
    let target = (total_radius - 3.0 * LINEAR_SLOP).max(LINEAR_SLOP);
    let tolerance = 0.25 * LINEAR_SLOP;

    let core_a = ShapeProxy::new(proxy_a.points(), 0.0);
    let core_b = ShapeProxy::new(proxy_b.points(), 0.0);
    let extent_a = core_a.max_extent(sweep_a.local_center);
    let extent_b = core_b.max_extent(sweep_b.local_center);

    let relative_motion = (sweep_b.c - sweep_b.c0) - (sweep_a.c - sweep_a.c0);
    let angular_bound =
        (sweep_a.a - sweep_a.a0).abs() * extent_a + (sweep_b.a - sweep_b.a0).abs() * extent_b;

    let mut t = 0.0;
    for iteration in 0..TOI_MAX_ITERATIONS {
        let xf_a = sweep_a.transform_at(t);
        let xf_b = sweep_b.transform_at(t);
        let output = distance(&core_a, &xf_a, &core_b, &xf_b, false);

        if output.distance < target + tolerance {
            let state = if iteration == 0 {
                ToiState::Overlapped
            } else {
                ToiState::Hit
            };
            return ToiOutput { state, fraction: t };
        }

        let normal = (output.point_b - output.point_a) / output.distance;
        let closing = -relative_motion.dot(normal) + angular_bound;
        if closing <= f32::EPSILON {
            return separated(max_fraction);
        }

        t += (output.distance - target) / closing;
        if t >= max_fraction {
            return separated(max_fraction);
        }
    }

    trace!("time of impact gave up at fraction {t}");
    ToiOutput {
        state: ToiState::Failed,
        fraction: t,
    }
}

fn separated(max_fraction: f32) -> ToiOutput {
    ToiOutput {
        state: ToiState::Separated,
        fraction: max_fraction,
    }
}

/// Decides which bodies need a swept test after position integration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CCDDetector {
    pub enabled: bool,
    /// Fraction of a body's smallest extent it may travel before it is
    /// considered fast.
    pub safety_factor: f32,
}

impl Default for CCDDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl CCDDetector {
    pub fn new() -> Self {
        Self {
            enabled: true,
            safety_factor: 0.5,
        }
    }

    /// Whether a body with the given extents and velocity can skip over thin
    /// geometry within one step of length `dt`.
    pub fn is_fast(
        &self,
        min_extent: f32,
        max_extent: f32,
        linear_velocity: Vec2,
        angular_velocity: f32,
        dt: f32,
    ) -> bool {
        if !self.enabled {
            return false;
        }
        let travel = linear_velocity.length() * dt + angular_velocity.abs() * dt * max_extent;
        min_extent * self.safety_factor < travel
    }

    /// Fraction along `moving` at which it first reaches `target`, if that
    /// happens strictly inside the step.
    pub fn sweep_pair(
        &self,
        moving: (&ShapeProxy, &Sweep),
        target: (&ShapeProxy, &Sweep),
        max_fraction: f32,
    ) -> Option<f32> {
        let output = time_of_impact(&ToiInput {
            proxy_a: *moving.0,
            proxy_b: *target.0,
            sweep_a: *moving.1,
            sweep_b: *target.1,
            max_fraction,
        });
        match output.state {
            ToiState::Hit if output.fraction > 0.0 && output.fraction < max_fraction => {
                Some(output.fraction)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::shapes::Polygon;

    fn linear_sweep(from: Vec2, to: Vec2) -> Sweep {
        Sweep {
            local_center: Vec2::ZERO,
            c0: from,
            c: to,
            a0: 0.0,
            a: 0.0,
        }
    }

    fn wall() -> (ShapeProxy, Sweep) {
        let wall = Polygon::make_box(0.05, 5.0);
        let proxy = ShapeProxy::new(wall.vertices(), wall.radius());
        (proxy, linear_sweep(Vec2::ZERO, Vec2::ZERO))
    }

    #[test]
    fn fast_ball_hits_thin_wall() {
        let (wall_proxy, wall_sweep) = wall();
        let ball = ShapeProxy::new(&[Vec2::ZERO], 0.1);
        let output = time_of_impact(&ToiInput {
            proxy_a: ball,
            proxy_b: wall_proxy,
            sweep_a: linear_sweep(Vec2::new(-10.0, 0.0), Vec2::new(10.0, 0.0)),
            sweep_b: wall_sweep,
            max_fraction: 1.0,
        });
        assert_eq!(output.state, ToiState::Hit);
        // Center ends near x = -0.05 - 0.1 + 3 slop.
        let x = -10.0 + 20.0 * output.fraction;
        assert!(x < -0.05, "ball center crossed into wall at {x}");
        assert!(x > -0.2, "impact reported far too early at {x}");
    }

    #[test]
    fn parallel_motion_is_separated() {
        let (wall_proxy, wall_sweep) = wall();
        let ball = ShapeProxy::new(&[Vec2::ZERO], 0.1);
        let output = time_of_impact(&ToiInput {
            proxy_a: ball,
            proxy_b: wall_proxy,
            sweep_a: linear_sweep(Vec2::new(-2.0, -3.0), Vec2::new(-2.0, 3.0)),
            sweep_b: wall_sweep,
            max_fraction: 1.0,
        });
        assert_eq!(output.state, ToiState::Separated);
        assert_eq!(output.fraction, 1.0);
    }

    #[test]
    fn resting_contact_reports_overlap() {
        let (wall_proxy, wall_sweep) = wall();
        let ball = ShapeProxy::new(&[Vec2::ZERO], 0.1);
        let output = time_of_impact(&ToiInput {
            proxy_a: ball,
            proxy_b: wall_proxy,
            sweep_a: linear_sweep(Vec2::new(-0.13, 0.0), Vec2::new(0.5, 0.0)),
            sweep_b: wall_sweep,
            max_fraction: 1.0,
        });
        assert_eq!(output.state, ToiState::Overlapped);
        assert_eq!(output.fraction, 0.0);
        let detector = CCDDetector::new();
        assert!(detector
            .sweep_pair(
                (&ball, &linear_sweep(Vec2::new(-0.13, 0.0), Vec2::new(0.5, 0.0))),
                (&wall_proxy, &wall_sweep),
                1.0,
            )
            .is_none());
    }

    #[test]
    fn fast_test_uses_smallest_extent() {
        let detector = CCDDetector::new();
        let dt = 1.0 / 60.0;
        assert!(!detector.is_fast(0.5, 0.5, Vec2::new(10.0, 0.0), 0.0, dt));
        assert!(detector.is_fast(0.05, 0.05, Vec2::new(10.0, 0.0), 0.0, dt));
        let disabled = CCDDetector {
            enabled: false,
            ..CCDDetector::new()
        };
        assert!(!disabled.is_fast(0.05, 0.05, Vec2::new(100.0, 0.0), 0.0, dt));
    }
}
