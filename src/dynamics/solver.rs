//! Sequential impulse contact solver with NGS position correction.
//!
//! Constraints index into a dense island-local slice of [`SolverBody`]
//! values. Fixed bodies referenced by an island appear in that slice with
//! zero inverse mass and are never written back.

use glam::{Mat2, Vec2};
use log::debug;

use crate::{
    collision::contact::Contact,
    config::{
        BAUMGARTE, DEFAULT_POSITION_ITERATIONS, DEFAULT_RESTITUTION_THRESHOLD,
        DEFAULT_VELOCITY_ITERATIONS, LINEAR_SLOP, MAX_CONDITION_NUMBER, MAX_LINEAR_CORRECTION,
    },
    core::{rigidbody::RigidBody, types::Rot},
    utils::{
        allocator::EntityId,
        math::{cross, cross_sv, inverse22, right_perp, safe_recip},
        profiling::SolverStepMetrics,
    },
};

/// Island-local copy of the body state the solver reads and writes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverBody {
    pub id: EntityId,
    /// Center of mass position.
    pub c: Vec2,
    pub a: f32,
    pub v: Vec2,
    pub w: f32,
    pub inv_mass: f32,
    pub inv_inertia: f32,
    pub local_center: Vec2,
}

impl SolverBody {
    /// Copies a body. Static and kinematic bodies get zero inverse mass.
    pub fn from_body(body: &RigidBody) -> Self {
        let dynamic = body.is_dynamic();
        Self {
            id: body.id,
            c: body.sweep.c,
            a: body.sweep.a,
            v: body.velocity.linear,
            w: body.velocity.angular,
            inv_mass: if dynamic { body.inv_mass } else { 0.0 },
            inv_inertia: if dynamic { body.inv_inertia } else { 0.0 },
            local_center: body.sweep.local_center,
        }
    }

    pub fn rotation(&self) -> Rot {
        Rot::from_angle(self.a)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ContactConstraintPoint {
    /// Body-frame anchors relative to each center of mass.
    pub local_anchor_a: Vec2,
    pub local_anchor_b: Vec2,
    /// World-oriented anchors at the start of the step.
    pub anchor_a: Vec2,
    pub anchor_b: Vec2,
    /// Separation minus the anchor gap along the normal at prepare time.
    pub adjusted_separation: f32,
    pub normal_impulse: f32,
    pub tangent_impulse: f32,
    pub max_normal_impulse: f32,
    pub normal_mass: f32,
    pub tangent_mass: f32,
    pub velocity_bias: f32,
    pub relative_velocity: f32,
}

/// Solver rows for one touching contact.
#[derive(Debug, Clone)]
pub struct ContactConstraint {
    pub contact_id: EntityId,
    pub index_a: usize,
    pub index_b: usize,
    pub normal: Vec2,
    pub friction: f32,
    pub restitution: f32,
    pub points: [ContactConstraintPoint; 2],
    pub point_count: usize,
    k: Mat2,
    normal_mass: Mat2,
    block: bool,
}

impl ContactConstraint {
    pub fn new(contact: &Contact, index_a: usize, index_b: usize) -> Self {
        let manifold = &contact.manifold;
        let mut points = [ContactConstraintPoint::default(); 2];
        for (target, source) in points.iter_mut().zip(manifold.points()) {
            target.local_anchor_a = source.local_anchor_a;
            target.local_anchor_b = source.local_anchor_b;
            target.adjusted_separation = source.separation;
            target.normal_impulse = source.normal_impulse;
            target.tangent_impulse = source.tangent_impulse;
        }
        Self {
            contact_id: contact.id,
            index_a,
            index_b,
            normal: manifold.normal,
            friction: contact.friction,
            restitution: contact.restitution,
            points,
            point_count: manifold.point_count,
            k: Mat2::ZERO,
            normal_mass: Mat2::ZERO,
            block: false,
        }
    }

    pub fn points(&self) -> &[ContactConstraintPoint] {
        &self.points[..self.point_count]
    }

    /// Copies accumulated impulses back into the persistent contact.
    pub fn store_impulses(&self, contact: &mut Contact) {
        for (target, source) in contact.manifold.points_mut().iter_mut().zip(self.points.iter()) {
            target.normal_impulse = source.normal_impulse;
            target.tangent_impulse = source.tangent_impulse;
            target.max_normal_impulse = source.max_normal_impulse;
            target.relative_velocity = source.relative_velocity;
        }
    }
}

/// Projected Gauss-Seidel (sequential impulse) solver settings.
#[derive(Debug, Clone)]
pub struct PGSSolver {
    pub velocity_iterations: u32,
    pub position_iterations: u32,
    pub bias_factor: f32,
    pub slop: f32,
    pub warm_starting: bool,
    pub restitution_threshold: f32,
}

impl Default for PGSSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl PGSSolver {
    pub fn new() -> Self {
        Self {
            velocity_iterations: DEFAULT_VELOCITY_ITERATIONS,
            position_iterations: DEFAULT_POSITION_ITERATIONS,
            bias_factor: BAUMGARTE,
            slop: LINEAR_SLOP,
            warm_starting: true,
            restitution_threshold: DEFAULT_RESTITUTION_THRESHOLD,
        }
    }

    /// Computes anchors, effective masses and velocity biases.
    ///
    /// Rows whose effective mass is degenerate get zero mass and are skipped
    /// by every later pass; the count is added to `metrics.skipped_rows`.
    pub fn prepare_contacts(
        &self,
        constraints: &mut [ContactConstraint],
        bodies: &[SolverBody],
        inv_h: f32,
        metrics: &mut SolverStepMetrics,
    ) {
        for constraint in constraints.iter_mut() {
            let body_a = &bodies[constraint.index_a];
            let body_b = &bodies[constraint.index_b];
            let (m_a, i_a) = (body_a.inv_mass, body_a.inv_inertia);
            let (m_b, i_b) = (body_b.inv_mass, body_b.inv_inertia);
            let (q_a, q_b) = (body_a.rotation(), body_b.rotation());
            let normal = constraint.normal;
            let tangent = right_perp(normal);

            for point in constraint.points[..constraint.point_count].iter_mut() {
                point.local_anchor_a -= body_a.local_center;
                point.local_anchor_b -= body_b.local_center;
                let r_a = q_a.rotate(point.local_anchor_a);
                let r_b = q_b.rotate(point.local_anchor_b);
                point.anchor_a = r_a;
                point.anchor_b = r_b;

                let gap = (body_b.c + r_b) - (body_a.c + r_a);
                let separation = point.adjusted_separation;
                point.adjusted_separation = separation - gap.dot(normal);

                let rn_a = cross(r_a, normal);
                let rn_b = cross(r_b, normal);
                let k_normal = m_a + m_b + i_a * rn_a * rn_a + i_b * rn_b * rn_b;
                point.normal_mass = safe_recip(k_normal);

                let rt_a = cross(r_a, tangent);
                let rt_b = cross(r_b, tangent);
                let k_tangent = m_a + m_b + i_a * rt_a * rt_a + i_b * rt_b * rt_b;
                point.tangent_mass = safe_recip(k_tangent);

                if point.normal_mass == 0.0 {
                    metrics.skipped_rows += 1;
                    point.normal_impulse = 0.0;
                }
                if point.tangent_mass == 0.0 {
                    metrics.skipped_rows += 1;
                    point.tangent_impulse = 0.0;
                }
                if !self.warm_starting {
                    point.normal_impulse = 0.0;
                    point.tangent_impulse = 0.0;
                }
                point.max_normal_impulse = 0.0;

                let dv = body_b.v + cross_sv(body_b.w, r_b) - body_a.v - cross_sv(body_a.w, r_a);
                point.relative_velocity = normal.dot(dv);

                // Speculative points allow approach up to the gap.
                point.velocity_bias = if separation > 0.0 {
                    -separation * inv_h
                } else {
                    0.0
                };
            }

            constraint.block = false;
            if constraint.point_count == 2 {
                let p1 = &constraint.points[0];
                let p2 = &constraint.points[1];
                let rn1_a = cross(p1.anchor_a, normal);
                let rn1_b = cross(p1.anchor_b, normal);
                let rn2_a = cross(p2.anchor_a, normal);
                let rn2_b = cross(p2.anchor_b, normal);

                let k11 = m_a + m_b + i_a * rn1_a * rn1_a + i_b * rn1_b * rn1_b;
                let k22 = m_a + m_b + i_a * rn2_a * rn2_a + i_b * rn2_b * rn2_b;
                let k12 = m_a + m_b + i_a * rn1_a * rn2_a + i_b * rn1_b * rn2_b;

                if k11 * k11 < MAX_CONDITION_NUMBER * (k11 * k22 - k12 * k12)
                    && p1.normal_mass > 0.0
                    && p2.normal_mass > 0.0
                {
                    constraint.k = Mat2::from_cols(Vec2::new(k11, k12), Vec2::new(k12, k22));
                    constraint.normal_mass = inverse22(constraint.k);
                    constraint.block = constraint.normal_mass.is_finite();
                }
                // Otherwise the points are redundant; keep one.
                if !constraint.block && k11 * k11 >= MAX_CONDITION_NUMBER * (k11 * k22 - k12 * k12) {
                    constraint.point_count = 1;
                    constraint.points[1].normal_impulse = 0.0;
                    constraint.points[1].tangent_impulse = 0.0;
                }
            }
        }
    }

    pub fn warm_start(&self, constraints: &[ContactConstraint], bodies: &mut [SolverBody]) {
        if !self.warm_starting {
            return;
        }
        for constraint in constraints {
            let normal = constraint.normal;
            let tangent = right_perp(normal);
            let (mut v_a, mut w_a, m_a, i_a) = velocity_state(&bodies[constraint.index_a]);
            let (mut v_b, mut w_b, m_b, i_b) = velocity_state(&bodies[constraint.index_b]);

            for point in constraint.points() {
                let impulse = point.normal_impulse * normal + point.tangent_impulse * tangent;
                w_a -= i_a * cross(point.anchor_a, impulse);
                v_a -= m_a * impulse;
                w_b += i_b * cross(point.anchor_b, impulse);
                v_b += m_b * impulse;
            }

            write_velocity(&mut bodies[constraint.index_a], v_a, w_a);
            write_velocity(&mut bodies[constraint.index_b], v_b, w_b);
        }
    }

    /// One velocity iteration over every contact: friction rows, then normal rows.
    pub fn solve_velocity(&self, constraints: &mut [ContactConstraint], bodies: &mut [SolverBody]) {
        for constraint in constraints.iter_mut() {
            let normal = constraint.normal;
            let tangent = right_perp(normal);
            let friction = constraint.friction;
            let (mut v_a, mut w_a, m_a, i_a) = velocity_state(&bodies[constraint.index_a]);
            let (mut v_b, mut w_b, m_b, i_b) = velocity_state(&bodies[constraint.index_b]);

            for point in constraint.points[..constraint.point_count].iter_mut() {
                if point.tangent_mass == 0.0 {
                    continue;
                }
                let dv = v_b + cross_sv(w_b, point.anchor_b) - v_a - cross_sv(w_a, point.anchor_a);
                let vt = dv.dot(tangent);
                let lambda = -point.tangent_mass * vt;
                if !lambda.is_finite() {
                    continue;
                }
                let max_friction = friction * point.normal_impulse;
                let new_impulse = (point.tangent_impulse + lambda).clamp(-max_friction, max_friction);
                let lambda = new_impulse - point.tangent_impulse;
                point.tangent_impulse = new_impulse;

                let impulse = lambda * tangent;
                v_a -= m_a * impulse;
                w_a -= i_a * cross(point.anchor_a, impulse);
                v_b += m_b * impulse;
                w_b += i_b * cross(point.anchor_b, impulse);
            }

            if constraint.block {
                solve_block(constraint, &mut v_a, &mut w_a, &mut v_b, &mut w_b, (m_a, i_a, m_b, i_b));
            } else {
                for point in constraint.points[..constraint.point_count].iter_mut() {
                    if point.normal_mass == 0.0 {
                        continue;
                    }
                    let dv = v_b + cross_sv(w_b, point.anchor_b) - v_a - cross_sv(w_a, point.anchor_a);
                    let vn = dv.dot(normal);
                    let lambda = -point.normal_mass * (vn - point.velocity_bias);
                    if !lambda.is_finite() {
                        continue;
                    }
                    let new_impulse = (point.normal_impulse + lambda).max(0.0);
                    let lambda = new_impulse - point.normal_impulse;
                    point.normal_impulse = new_impulse;
                    point.max_normal_impulse = point.max_normal_impulse.max(new_impulse);

                    let impulse = lambda * normal;
                    v_a -= m_a * impulse;
                    w_a -= i_a * cross(point.anchor_a, impulse);
                    v_b += m_b * impulse;
                    w_b += i_b * cross(point.anchor_b, impulse);
                }
            }

            write_velocity(&mut bodies[constraint.index_a], v_a, w_a);
            write_velocity(&mut bodies[constraint.index_b], v_b, w_b);
        }
    }

    /// Bounce pass run after the velocity iterations.
    ///
    /// Only points that approached faster than the threshold before the
    /// solve and actually carried load are given a restitution target.
    pub fn apply_restitution(&self, constraints: &mut [ContactConstraint], bodies: &mut [SolverBody]) {
        let threshold = self.restitution_threshold;
        for constraint in constraints.iter_mut() {
            if constraint.restitution == 0.0 {
                continue;
            }
            let normal = constraint.normal;
            let restitution = constraint.restitution;
            let (mut v_a, mut w_a, m_a, i_a) = velocity_state(&bodies[constraint.index_a]);
            let (mut v_b, mut w_b, m_b, i_b) = velocity_state(&bodies[constraint.index_b]);

            for point in constraint.points[..constraint.point_count].iter_mut() {
                if point.relative_velocity > -threshold
                    || point.max_normal_impulse == 0.0
                    || point.normal_mass == 0.0
                {
                    continue;
                }
                let dv = v_b + cross_sv(w_b, point.anchor_b) - v_a - cross_sv(w_a, point.anchor_a);
                let vn = dv.dot(normal);
                let lambda = -point.normal_mass * (vn + restitution * point.relative_velocity);
                if !lambda.is_finite() {
                    continue;
                }
                let new_impulse = (point.normal_impulse + lambda).max(0.0);
                let lambda = new_impulse - point.normal_impulse;
                point.normal_impulse = new_impulse;
                point.max_normal_impulse = point.max_normal_impulse.max(new_impulse);

                let impulse = lambda * normal;
                v_a -= m_a * impulse;
                w_a -= i_a * cross(point.anchor_a, impulse);
                v_b += m_b * impulse;
                w_b += i_b * cross(point.anchor_b, impulse);
            }

            write_velocity(&mut bodies[constraint.index_a], v_a, w_a);
            write_velocity(&mut bodies[constraint.index_b], v_b, w_b);
        }
    }

    /// One NGS pass. Returns the smallest separation seen before correction.
    pub fn solve_position(&self, constraints: &[ContactConstraint], bodies: &mut [SolverBody]) -> f32 {
        let mut min_separation = 0.0_f32;
        for constraint in constraints {
            let normal = constraint.normal;
            let (mut c_a, mut a_a) = (bodies[constraint.index_a].c, bodies[constraint.index_a].a);
            let (mut c_b, mut a_b) = (bodies[constraint.index_b].c, bodies[constraint.index_b].a);
            let (m_a, i_a) = (bodies[constraint.index_a].inv_mass, bodies[constraint.index_a].inv_inertia);
            let (m_b, i_b) = (bodies[constraint.index_b].inv_mass, bodies[constraint.index_b].inv_inertia);

            for point in constraint.points() {
                let r_a = Rot::from_angle(a_a).rotate(point.local_anchor_a);
                let r_b = Rot::from_angle(a_b).rotate(point.local_anchor_b);
                let gap = (c_b + r_b) - (c_a + r_a);
                let separation = gap.dot(normal) + point.adjusted_separation;
                min_separation = min_separation.min(separation);

                let correction =
                    (self.bias_factor * (separation + self.slop)).clamp(-MAX_LINEAR_CORRECTION, 0.0);
                let rn_a = cross(r_a, normal);
                let rn_b = cross(r_b, normal);
                let k = m_a + m_b + i_a * rn_a * rn_a + i_b * rn_b * rn_b;
                let impulse = if k > f32::EPSILON { -correction / k } else { 0.0 };
                if !impulse.is_finite() {
                    continue;
                }

                let p = impulse * normal;
                c_a -= m_a * p;
                a_a -= i_a * cross(r_a, p);
                c_b += m_b * p;
                a_b += i_b * cross(r_b, p);
            }

            bodies[constraint.index_a].c = c_a;
            bodies[constraint.index_a].a = a_a;
            bodies[constraint.index_b].c = c_b;
            bodies[constraint.index_b].a = a_b;
        }
        min_separation
    }

    /// Adds impulse totals for the step profile.
    pub fn record(&self, constraints: &[ContactConstraint], metrics: &mut SolverStepMetrics) {
        metrics.contacts_solved += constraints.len();
        for constraint in constraints {
            for point in constraint.points() {
                metrics.normal_impulse_sum += point.normal_impulse.abs();
                metrics.tangent_impulse_sum += point.tangent_impulse.abs();
            }
        }
    }

    /// Whether a position pass left every contact within tolerance.
    pub fn positions_converged(&self, min_separation: f32) -> bool {
        // The pass stops pushing at -slop, so allow a little more.
        min_separation >= -3.0 * self.slop
    }
}

fn velocity_state(body: &SolverBody) -> (Vec2, f32, f32, f32) {
    (body.v, body.w, body.inv_mass, body.inv_inertia)
}

fn write_velocity(body: &mut SolverBody, v: Vec2, w: f32) {
    if body.inv_mass == 0.0 && body.inv_inertia == 0.0 {
        return;
    }
    body.v = v;
    body.w = w;
}

/// Two-point normal block solve by total enumeration of the LCP cases.
fn solve_block(
    constraint: &mut ContactConstraint,
    v_a: &mut Vec2,
    w_a: &mut f32,
    v_b: &mut Vec2,
    w_b: &mut f32,
    (m_a, i_a, m_b, i_b): (f32, f32, f32, f32),
) {
    let normal = constraint.normal;
    let (cp1, cp2) = (constraint.points[0], constraint.points[1]);
    let accumulated = Vec2::new(cp1.normal_impulse, cp2.normal_impulse);

    let dv1 = *v_b + cross_sv(*w_b, cp1.anchor_b) - *v_a - cross_sv(*w_a, cp1.anchor_a);
    let dv2 = *v_b + cross_sv(*w_b, cp2.anchor_b) - *v_a - cross_sv(*w_a, cp2.anchor_a);
    let vn1 = dv1.dot(normal);
    let vn2 = dv2.dot(normal);

    let mut b = Vec2::new(vn1 - cp1.velocity_bias, vn2 - cp2.velocity_bias);
    b -= constraint.k * accumulated;
    let k = constraint.k;

    let candidate = {
        // Both points active.
        let x = -(constraint.normal_mass * b);
        if x.x >= 0.0 && x.y >= 0.0 {
            Some(x)
        } else {
            // Only the first point active.
            let x1 = -cp1.normal_mass * b.x;
            let vn2 = k.x_axis.y * x1 + b.y;
            if x1 >= 0.0 && vn2 >= 0.0 {
                Some(Vec2::new(x1, 0.0))
            } else {
                // Only the second point active.
                let x2 = -cp2.normal_mass * b.y;
                let vn1 = k.y_axis.x * x2 + b.x;
                if x2 >= 0.0 && vn1 >= 0.0 {
                    Some(Vec2::new(0.0, x2))
                } else if b.x >= 0.0 && b.y >= 0.0 {
                    Some(Vec2::ZERO)
                } else {
                    None
                }
            }
        }
    };

    // No valid case: the accumulated impulses stay as they are this iteration.
    let Some(x) = candidate else {
        debug!("contact block solve found no valid case");
        return;
    };
    if !x.is_finite() {
        return;
    }

    let d = x - accumulated;
    let p1 = d.x * normal;
    let p2 = d.y * normal;
    *v_a -= m_a * (p1 + p2);
    *w_a -= i_a * (cross(cp1.anchor_a, p1) + cross(cp2.anchor_a, p2));
    *v_b += m_b * (p1 + p2);
    *w_b += i_b * (cross(cp1.anchor_b, p1) + cross(cp2.anchor_b, p2));

    constraint.points[0].normal_impulse = x.x;
    constraint.points[1].normal_impulse = x.y;
    constraint.points[0].max_normal_impulse = constraint.points[0].max_normal_impulse.max(x.x);
    constraint.points[1].max_normal_impulse = constraint.points[1].max_normal_impulse.max(x.y);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::manifold::{Feature, FeatureId, Manifold, ManifoldPoint};

    fn body(c: Vec2, v: Vec2, inv_mass: f32, inv_inertia: f32) -> SolverBody {
        SolverBody {
            id: EntityId::NULL,
            c,
            a: 0.0,
            v,
            w: 0.0,
            inv_mass,
            inv_inertia,
            local_center: Vec2::ZERO,
        }
    }

    /// Unit box resting on the ground plane y = 0 with two corner points.
    fn resting_contact(separation: f32) -> Contact {
        let mut manifold = Manifold {
            normal: Vec2::Y,
            point_count: 2,
            ..Manifold::default()
        };
        for (i, x) in [-0.5_f32, 0.5].into_iter().enumerate() {
            manifold.points[i] = ManifoldPoint {
                point: Vec2::new(x, 0.0),
                local_anchor_a: Vec2::new(x, 0.0),
                local_anchor_b: Vec2::new(x, -0.5),
                separation,
                id: FeatureId::new(Feature::Face(2), Feature::Vertex(i as u8)),
                ..ManifoldPoint::default()
            };
        }
        Contact {
            id: EntityId::NULL,
            collider_a: EntityId::NULL,
            collider_b: EntityId::NULL,
            body_a: EntityId::NULL,
            body_b: EntityId::NULL,
            manifold,
            friction: 0.6,
            restitution: 0.0,
            touching: true,
            is_sensor: false,
            enable_events: false,
        }
    }

    fn run_velocity(solver: &PGSSolver, constraints: &mut [ContactConstraint], bodies: &mut [SolverBody]) {
        let mut metrics = SolverStepMetrics::default();
        solver.prepare_contacts(constraints, bodies, 60.0, &mut metrics);
        solver.warm_start(constraints, bodies);
        for _ in 0..solver.velocity_iterations {
            solver.solve_velocity(constraints, bodies);
        }
        solver.apply_restitution(constraints, bodies);
    }

    #[test]
    fn falling_box_is_stopped_without_bounce() {
        let solver = PGSSolver::new();
        let mut bodies = vec![
            body(Vec2::ZERO, Vec2::ZERO, 0.0, 0.0),
            body(Vec2::new(0.0, 0.5), Vec2::new(0.0, -2.0), 1.0, 6.0),
        ];
        let mut constraints = vec![ContactConstraint::new(&resting_contact(0.0), 0, 1)];
        run_velocity(&solver, &mut constraints, &mut bodies);

        assert!(bodies[1].v.y.abs() < 1e-3, "vy = {}", bodies[1].v.y);
        assert!(bodies[1].w.abs() < 1e-3);
        assert_eq!(bodies[0].v, Vec2::ZERO);
        let total: f32 = constraints[0].points().iter().map(|p| p.normal_impulse).sum();
        assert!((total - 2.0).abs() < 1e-3);
    }

    #[test]
    fn speculative_gap_allows_partial_approach() {
        let solver = PGSSolver::new();
        let gap = 0.01;
        let mut bodies = vec![
            body(Vec2::ZERO, Vec2::ZERO, 0.0, 0.0),
            body(Vec2::new(0.0, 0.5 + gap), Vec2::new(0.0, -2.0), 1.0, 6.0),
        ];
        let mut constraints = vec![ContactConstraint::new(&resting_contact(gap), 0, 1)];
        run_velocity(&solver, &mut constraints, &mut bodies);
        // Closing exactly the gap over one step at 60 Hz.
        assert!((bodies[1].v.y + gap * 60.0).abs() < 1e-3, "vy = {}", bodies[1].v.y);
    }

    #[test]
    fn restitution_reflects_fast_approach() {
        let solver = PGSSolver::new();
        let mut contact = resting_contact(0.0);
        contact.restitution = 0.5;
        let mut bodies = vec![
            body(Vec2::ZERO, Vec2::ZERO, 0.0, 0.0),
            body(Vec2::new(0.0, 0.5), Vec2::new(0.0, -4.0), 1.0, 0.0),
        ];
        let mut constraints = vec![ContactConstraint::new(&contact, 0, 1)];
        run_velocity(&solver, &mut constraints, &mut bodies);
        assert!((bodies[1].v.y - 2.0).abs() < 1e-3, "vy = {}", bodies[1].v.y);
    }

    #[test]
    fn slow_approach_does_not_bounce() {
        let solver = PGSSolver::new();
        let mut contact = resting_contact(0.0);
        contact.restitution = 1.0;
        let mut bodies = vec![
            body(Vec2::ZERO, Vec2::ZERO, 0.0, 0.0),
            body(Vec2::new(0.0, 0.5), Vec2::new(0.0, -0.5), 1.0, 6.0),
        ];
        let mut constraints = vec![ContactConstraint::new(&contact, 0, 1)];
        run_velocity(&solver, &mut constraints, &mut bodies);
        assert!(bodies[1].v.y.abs() < 1e-3);
    }

    #[test]
    fn friction_is_bounded_by_normal_impulse() {
        let solver = PGSSolver::new();
        let mut bodies = vec![
            body(Vec2::ZERO, Vec2::ZERO, 0.0, 0.0),
            body(Vec2::new(0.0, 0.5), Vec2::new(5.0, -1.0), 1.0, 0.0),
        ];
        let mut constraints = vec![ContactConstraint::new(&resting_contact(0.0), 0, 1)];
        run_velocity(&solver, &mut constraints, &mut bodies);
        for point in constraints[0].points() {
            assert!(point.tangent_impulse.abs() <= 0.6 * point.normal_impulse + 1e-5);
        }
        // Normal impulse 1 lets friction remove at most 0.6 m/s.
        assert!((bodies[1].v.x - 4.4).abs() < 1e-3, "vx = {}", bodies[1].v.x);
    }

    #[test]
    fn degenerate_rows_are_skipped() {
        let solver = PGSSolver::new();
        let mut bodies = vec![
            body(Vec2::ZERO, Vec2::ZERO, 0.0, 0.0),
            body(Vec2::new(0.0, 0.5), Vec2::new(0.0, -1.0), 0.0, 0.0),
        ];
        let mut constraints = vec![ContactConstraint::new(&resting_contact(0.0), 0, 1)];
        let mut metrics = SolverStepMetrics::default();
        solver.prepare_contacts(&mut constraints, &bodies, 60.0, &mut metrics);
        assert!(metrics.skipped_rows >= 2);
        solver.solve_velocity(&mut constraints, &mut bodies);
        assert!(bodies[1].v.is_finite());
        assert_eq!(bodies[1].v, Vec2::new(0.0, -1.0));
    }

    #[test]
    fn position_pass_reduces_penetration() {
        let solver = PGSSolver::new();
        let mut bodies = vec![
            body(Vec2::ZERO, Vec2::ZERO, 0.0, 0.0),
            body(Vec2::new(0.0, 0.45), Vec2::ZERO, 1.0, 6.0),
        ];
        let mut constraints = vec![ContactConstraint::new(&resting_contact(-0.05), 0, 1)];
        let mut metrics = SolverStepMetrics::default();
        solver.prepare_contacts(&mut constraints, &bodies, 60.0, &mut metrics);
        let first = solver.solve_position(&constraints, &mut bodies);
        assert!((first + 0.05).abs() < 1e-5);
        let mut last = first;
        for _ in 0..20 {
            last = solver.solve_position(&constraints, &mut bodies);
        }
        assert!(last > first);
        assert!(solver.positions_converged(last));
        assert_eq!(bodies[0].c, Vec2::ZERO);
    }
}
