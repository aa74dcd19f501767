//! Runtime joint state and the velocity/position rows for each joint kind.

use glam::{Mat2, Mat3, Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::{
    config::{ANGULAR_SLOP, LINEAR_SLOP, MAX_ANGULAR_CORRECTION, MAX_LINEAR_CORRECTION},
    core::types::Rot,
    core::joint::{
        DistanceJointDef, JointDef, JointKind, PrismaticJointDef, RevoluteJointDef, WeldJointDef,
    },
    dynamics::solver::SolverBody,
    utils::{
        allocator::EntityId,
        math::{cross, cross_sv, left_perp, safe_recip, solve22, solve33},
    },
};

/// Per-step values computed in `prepare` and reused by every iteration.
#[derive(Debug, Clone, Copy, Default)]
struct JointScratch {
    index_a: usize,
    index_b: usize,
    m_a: f32,
    m_b: f32,
    i_a: f32,
    i_b: f32,
    /// Anchors relative to each center of mass, body frame.
    local_a: Vec2,
    local_b: Vec2,
    r_a: Vec2,
    r_b: Vec2,
    h: f32,
    inv_h: f32,
    // distance
    u: Vec2,
    current_length: f32,
    mass: f32,
    soft_mass: f32,
    gamma: f32,
    bias: f32,
    // revolute / prismatic / weld
    k: Mat2,
    k3: Mat3,
    axial_mass: f32,
    angle: f32,
    axis: Vec2,
    perp: Vec2,
    a1: f32,
    a2: f32,
    s1: f32,
    s2: f32,
    translation: f32,
}

/// A joint living in the world: its definition plus accumulated impulses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Joint {
    pub id: EntityId,
    def: JointDef,
    linear_impulse: Vec2,
    angular_impulse: f32,
    axial_impulse: f32,
    motor_impulse: f32,
    lower_impulse: f32,
    upper_impulse: f32,
    inv_h: f32,
    #[serde(skip)]
    scratch: JointScratch,
}

impl Joint {
    pub fn new(id: EntityId, def: JointDef) -> Self {
        Self {
            id,
            def,
            linear_impulse: Vec2::ZERO,
            angular_impulse: 0.0,
            axial_impulse: 0.0,
            motor_impulse: 0.0,
            lower_impulse: 0.0,
            upper_impulse: 0.0,
            inv_h: 0.0,
            scratch: JointScratch::default(),
        }
    }

    pub fn def(&self) -> &JointDef {
        &self.def
    }

    pub fn bodies(&self) -> (EntityId, EntityId) {
        (self.def.body_a, self.def.body_b)
    }

    pub fn collide_connected(&self) -> bool {
        self.def.collide_connected
    }

    pub fn connects(&self, body_a: EntityId, body_b: EntityId) -> bool {
        (self.def.body_a == body_a && self.def.body_b == body_b)
            || (self.def.body_a == body_b && self.def.body_b == body_a)
    }

    /// Force applied on body B during the last step, in newtons.
    pub fn reaction_force(&self) -> Vec2 {
        let s = &self.scratch;
        let impulse = match &self.def.kind {
            JointKind::Distance(_) => {
                (self.axial_impulse + self.lower_impulse - self.upper_impulse) * s.u
            }
            JointKind::Revolute(_) | JointKind::Weld(_) => self.linear_impulse,
            JointKind::Prismatic(_) => {
                let axial = self.motor_impulse + self.lower_impulse - self.upper_impulse;
                self.linear_impulse.x * s.perp + axial * s.axis
            }
        };
        impulse * self.inv_h
    }

    /// Torque applied on body B during the last step.
    pub fn reaction_torque(&self) -> f32 {
        let impulse = match &self.def.kind {
            JointKind::Distance(_) => 0.0,
            JointKind::Revolute(_) => self.motor_impulse + self.lower_impulse - self.upper_impulse,
            JointKind::Prismatic(_) => self.linear_impulse.y,
            JointKind::Weld(_) => self.angular_impulse,
        };
        impulse * self.inv_h
    }

    /// Drops accumulated impulses, used when a connected body is moved by hand.
    pub fn reset_impulses(&mut self) {
        self.linear_impulse = Vec2::ZERO;
        self.angular_impulse = 0.0;
        self.axial_impulse = 0.0;
        self.motor_impulse = 0.0;
        self.lower_impulse = 0.0;
        self.upper_impulse = 0.0;
    }

    pub fn prepare(
        &mut self,
        index_a: usize,
        index_b: usize,
        bodies: &[SolverBody],
        h: f32,
        warm_starting: bool,
    ) {
        let body_a = &bodies[index_a];
        let body_b = &bodies[index_b];
        let (anchor_a, anchor_b) = self.def.kind.local_anchors();

        let mut s = JointScratch {
            index_a,
            index_b,
            m_a: body_a.inv_mass,
            m_b: body_b.inv_mass,
            i_a: body_a.inv_inertia,
            i_b: body_b.inv_inertia,
            local_a: anchor_a - body_a.local_center,
            local_b: anchor_b - body_b.local_center,
            h,
            inv_h: safe_recip(h),
            ..JointScratch::default()
        };
        s.r_a = body_a.rotation().rotate(s.local_a);
        s.r_b = body_b.rotation().rotate(s.local_b);
        self.inv_h = s.inv_h;

        if !warm_starting {
            self.reset_impulses();
        }

        let (m_a, m_b, i_a, i_b) = (s.m_a, s.m_b, s.i_a, s.i_b);
        let (r_a, r_b) = (s.r_a, s.r_b);
        match &self.def.kind {
            JointKind::Distance(def) => {
                s.u = body_b.c + r_b - body_a.c - r_a;
                s.current_length = s.u.length();
                if s.current_length > LINEAR_SLOP {
                    s.u /= s.current_length;
                } else {
                    s.u = Vec2::ZERO;
                    self.lower_impulse = 0.0;
                    self.upper_impulse = 0.0;
                }
                let cr_a = cross(r_a, s.u);
                let cr_b = cross(r_b, s.u);
                let mut inv_mass = m_a + i_a * cr_a * cr_a + m_b + i_b * cr_b * cr_b;
                s.mass = safe_recip(inv_mass);
                s.soft_mass = s.mass;
                if def.min_length < def.max_length && def.stiffness > 0.0 {
                    let c = s.current_length - def.length;
                    s.gamma = safe_recip(h * (def.damping + h * def.stiffness));
                    s.bias = c * h * def.stiffness * s.gamma;
                    inv_mass += s.gamma;
                    s.soft_mass = safe_recip(inv_mass);
                } else if def.min_length < def.max_length {
                    self.axial_impulse = 0.0;
                }
            }
            JointKind::Revolute(def) => {
                s.k = point_mass(m_a, m_b, i_a, i_b, r_a, r_b);
                s.axial_mass = safe_recip(i_a + i_b);
                s.angle = body_b.a - body_a.a - def.reference_angle;
                let fixed_rotation = i_a + i_b == 0.0;
                if !def.enable_limit || fixed_rotation {
                    self.lower_impulse = 0.0;
                    self.upper_impulse = 0.0;
                }
                if !def.enable_motor || fixed_rotation {
                    self.motor_impulse = 0.0;
                }
            }
            JointKind::Prismatic(def) => {
                let q_a = body_a.rotation();
                let d = (body_b.c - body_a.c) + r_b - r_a;
                s.axis = q_a.rotate(def.local_axis_a);
                s.perp = left_perp(s.axis);
                s.a1 = cross(d + r_a, s.axis);
                s.a2 = cross(r_b, s.axis);
                s.s1 = cross(d + r_a, s.perp);
                s.s2 = cross(r_b, s.perp);
                s.axial_mass = safe_recip(m_a + m_b + i_a * s.a1 * s.a1 + i_b * s.a2 * s.a2);

                let k11 = m_a + m_b + i_a * s.s1 * s.s1 + i_b * s.s2 * s.s2;
                let k12 = i_a * s.s1 + i_b * s.s2;
                let mut k22 = i_a + i_b;
                if k22 == 0.0 {
                    k22 = 1.0;
                }
                s.k = Mat2::from_cols(Vec2::new(k11, k12), Vec2::new(k12, k22));

                if def.enable_limit {
                    s.translation = s.axis.dot(d);
                } else {
                    self.lower_impulse = 0.0;
                    self.upper_impulse = 0.0;
                }
                if !def.enable_motor {
                    self.motor_impulse = 0.0;
                }
            }
            JointKind::Weld(_) => {
                s.k3 = weld_mass(m_a, m_b, i_a, i_b, r_a, r_b);
                s.k = point_mass(m_a, m_b, i_a, i_b, r_a, r_b);
            }
        }
        self.scratch = s;
    }

    pub fn warm_start(&self, bodies: &mut [SolverBody]) {
        let s = &self.scratch;
        let (mut v_a, mut w_a) = (bodies[s.index_a].v, bodies[s.index_a].w);
        let (mut v_b, mut w_b) = (bodies[s.index_b].v, bodies[s.index_b].w);

        match &self.def.kind {
            JointKind::Distance(_) => {
                let p = (self.axial_impulse + self.lower_impulse - self.upper_impulse) * s.u;
                v_a -= s.m_a * p;
                w_a -= s.i_a * cross(s.r_a, p);
                v_b += s.m_b * p;
                w_b += s.i_b * cross(s.r_b, p);
            }
            JointKind::Revolute(_) => {
                let axial = self.motor_impulse + self.lower_impulse - self.upper_impulse;
                let p = self.linear_impulse;
                v_a -= s.m_a * p;
                w_a -= s.i_a * (cross(s.r_a, p) + axial);
                v_b += s.m_b * p;
                w_b += s.i_b * (cross(s.r_b, p) + axial);
            }
            JointKind::Prismatic(_) => {
                let axial = self.motor_impulse + self.lower_impulse - self.upper_impulse;
                let p = self.linear_impulse.x * s.perp + axial * s.axis;
                let l_a = self.linear_impulse.x * s.s1 + self.linear_impulse.y + axial * s.a1;
                let l_b = self.linear_impulse.x * s.s2 + self.linear_impulse.y + axial * s.a2;
                v_a -= s.m_a * p;
                w_a -= s.i_a * l_a;
                v_b += s.m_b * p;
                w_b += s.i_b * l_b;
            }
            JointKind::Weld(_) => {
                let p = self.linear_impulse;
                v_a -= s.m_a * p;
                w_a -= s.i_a * (cross(s.r_a, p) + self.angular_impulse);
                v_b += s.m_b * p;
                w_b += s.i_b * (cross(s.r_b, p) + self.angular_impulse);
            }
        }

        store_velocity(bodies, s.index_a, v_a, w_a);
        store_velocity(bodies, s.index_b, v_b, w_b);
    }

    pub fn solve_velocity(&mut self, bodies: &mut [SolverBody]) {
        let s = self.scratch;
        let mut state = VelocityState {
            v_a: bodies[s.index_a].v,
            w_a: bodies[s.index_a].w,
            v_b: bodies[s.index_b].v,
            w_b: bodies[s.index_b].w,
        };

        match self.def.kind.clone() {
            JointKind::Distance(def) => self.solve_distance(&def, &s, &mut state),
            JointKind::Revolute(def) => self.solve_revolute(&def, &s, &mut state),
            JointKind::Prismatic(def) => self.solve_prismatic(&def, &s, &mut state),
            JointKind::Weld(_) => self.solve_weld(&s, &mut state),
        }

        if state.is_finite() {
            store_velocity(bodies, s.index_a, state.v_a, state.w_a);
            store_velocity(bodies, s.index_b, state.v_b, state.w_b);
        }
    }

    /// One position iteration. Returns true once the joint error is within slop.
    pub fn solve_position(&mut self, bodies: &mut [SolverBody]) -> bool {
        let s = self.scratch;
        let mut pose = PositionState {
            c_a: bodies[s.index_a].c,
            a_a: bodies[s.index_a].a,
            c_b: bodies[s.index_b].c,
            a_b: bodies[s.index_b].a,
        };

        let done = match &self.def.kind {
            JointKind::Distance(def) => distance_position(def, &s, &mut pose),
            JointKind::Revolute(def) => revolute_position(def, &s, &mut pose),
            JointKind::Prismatic(def) => prismatic_position(def, &s, &mut pose),
            JointKind::Weld(def) => weld_position(def, &s, &mut pose),
        };

        if pose.is_finite() {
            bodies[s.index_a].c = pose.c_a;
            bodies[s.index_a].a = pose.a_a;
            bodies[s.index_b].c = pose.c_b;
            bodies[s.index_b].a = pose.a_b;
        }
        done
    }

    fn solve_distance(&mut self, def: &DistanceJointDef, s: &JointScratch, st: &mut VelocityState) {
        if def.min_length < def.max_length {
            if def.stiffness > 0.0 {
                let cdot = s.u.dot(st.point_velocity(s));
                let impulse = -s.soft_mass * (cdot + s.bias + s.gamma * self.axial_impulse);
                self.axial_impulse += impulse;
                st.apply_linear(s, impulse * s.u);
            }

            let c = s.current_length - def.min_length;
            let bias = c.max(0.0) * s.inv_h;
            let cdot = s.u.dot(st.point_velocity(s));
            let impulse = -s.mass * (cdot + bias);
            let new_impulse = (self.lower_impulse + impulse).max(0.0);
            let impulse = new_impulse - self.lower_impulse;
            self.lower_impulse = new_impulse;
            st.apply_linear(s, impulse * s.u);

            let c = def.max_length - s.current_length;
            let bias = c.max(0.0) * s.inv_h;
            let cdot = -s.u.dot(st.point_velocity(s));
            let impulse = -s.mass * (cdot + bias);
            let new_impulse = (self.upper_impulse + impulse).max(0.0);
            let impulse = new_impulse - self.upper_impulse;
            self.upper_impulse = new_impulse;
            st.apply_linear(s, -impulse * s.u);
        } else {
            let cdot = s.u.dot(st.point_velocity(s));
            let impulse = -s.mass * cdot;
            self.axial_impulse += impulse;
            st.apply_linear(s, impulse * s.u);
        }
    }

    fn solve_revolute(&mut self, def: &RevoluteJointDef, s: &JointScratch, st: &mut VelocityState) {
        let fixed_rotation = s.i_a + s.i_b == 0.0;

        if def.enable_motor && !fixed_rotation {
            let cdot = st.w_b - st.w_a - def.motor_speed;
            let impulse = -s.axial_mass * cdot;
            let old = self.motor_impulse;
            let max_impulse = s.h * def.max_motor_torque;
            self.motor_impulse = (old + impulse).clamp(-max_impulse, max_impulse);
            st.apply_angular(s, self.motor_impulse - old);
        }

        if def.enable_limit && !fixed_rotation {
            let c = s.angle - def.lower_angle;
            let bias = c.max(0.0) * s.inv_h;
            let cdot = st.w_b - st.w_a;
            let impulse = -s.axial_mass * (cdot + bias);
            let new_impulse = (self.lower_impulse + impulse).max(0.0);
            let impulse = new_impulse - self.lower_impulse;
            self.lower_impulse = new_impulse;
            st.apply_angular(s, impulse);

            let c = def.upper_angle - s.angle;
            let bias = c.max(0.0) * s.inv_h;
            let cdot = st.w_a - st.w_b;
            let impulse = -s.axial_mass * (cdot + bias);
            let new_impulse = (self.upper_impulse + impulse).max(0.0);
            let impulse = new_impulse - self.upper_impulse;
            self.upper_impulse = new_impulse;
            st.apply_angular(s, -impulse);
        }

        let cdot = st.point_velocity(s);
        let impulse = solve22(s.k, -cdot);
        self.linear_impulse += impulse;
        st.apply_linear(s, impulse);
    }

    fn solve_prismatic(&mut self, def: &PrismaticJointDef, s: &JointScratch, st: &mut VelocityState) {
        let axial_cdot = |st: &VelocityState| s.axis.dot(st.v_b - st.v_a) + s.a2 * st.w_b - s.a1 * st.w_a;

        if def.enable_motor {
            let cdot = axial_cdot(st);
            let impulse = s.axial_mass * (def.motor_speed - cdot);
            let old = self.motor_impulse;
            let max_impulse = s.h * def.max_motor_force;
            self.motor_impulse = (old + impulse).clamp(-max_impulse, max_impulse);
            st.apply_axial(s, self.motor_impulse - old);
        }

        if def.enable_limit {
            let c = s.translation - def.lower_translation;
            let bias = c.max(0.0) * s.inv_h;
            let impulse = -s.axial_mass * (axial_cdot(st) + bias);
            let new_impulse = (self.lower_impulse + impulse).max(0.0);
            let impulse = new_impulse - self.lower_impulse;
            self.lower_impulse = new_impulse;
            st.apply_axial(s, impulse);

            let c = def.upper_translation - s.translation;
            let bias = c.max(0.0) * s.inv_h;
            let impulse = -s.axial_mass * (-axial_cdot(st) + bias);
            let new_impulse = (self.upper_impulse + impulse).max(0.0);
            let impulse = new_impulse - self.upper_impulse;
            self.upper_impulse = new_impulse;
            st.apply_axial(s, -impulse);
        }

        let cdot = Vec2::new(
            s.perp.dot(st.v_b - st.v_a) + s.s2 * st.w_b - s.s1 * st.w_a,
            st.w_b - st.w_a,
        );
        let df = solve22(s.k, -cdot);
        self.linear_impulse += df;

        let p = df.x * s.perp;
        st.v_a -= s.m_a * p;
        st.w_a -= s.i_a * (df.x * s.s1 + df.y);
        st.v_b += s.m_b * p;
        st.w_b += s.i_b * (df.x * s.s2 + df.y);
    }

    fn solve_weld(&mut self, s: &JointScratch, st: &mut VelocityState) {
        let cdot1 = st.point_velocity(s);
        let cdot2 = st.w_b - st.w_a;

        let impulse = if s.i_a + s.i_b > 0.0 {
            solve33(s.k3, -Vec3::new(cdot1.x, cdot1.y, cdot2))
        } else {
            solve22(s.k, -cdot1).extend(0.0)
        };
        let p = impulse.truncate();
        self.linear_impulse += p;
        self.angular_impulse += impulse.z;

        st.v_a -= s.m_a * p;
        st.w_a -= s.i_a * (cross(s.r_a, p) + impulse.z);
        st.v_b += s.m_b * p;
        st.w_b += s.i_b * (cross(s.r_b, p) + impulse.z);
    }
}

struct VelocityState {
    v_a: Vec2,
    w_a: f32,
    v_b: Vec2,
    w_b: f32,
}

impl VelocityState {
    /// Velocity of anchor B relative to anchor A.
    fn point_velocity(&self, s: &JointScratch) -> Vec2 {
        self.v_b + cross_sv(self.w_b, s.r_b) - self.v_a - cross_sv(self.w_a, s.r_a)
    }

    fn apply_linear(&mut self, s: &JointScratch, p: Vec2) {
        self.v_a -= s.m_a * p;
        self.w_a -= s.i_a * cross(s.r_a, p);
        self.v_b += s.m_b * p;
        self.w_b += s.i_b * cross(s.r_b, p);
    }

    fn apply_angular(&mut self, s: &JointScratch, impulse: f32) {
        self.w_a -= s.i_a * impulse;
        self.w_b += s.i_b * impulse;
    }

    fn apply_axial(&mut self, s: &JointScratch, impulse: f32) {
        let p = impulse * s.axis;
        self.v_a -= s.m_a * p;
        self.w_a -= s.i_a * impulse * s.a1;
        self.v_b += s.m_b * p;
        self.w_b += s.i_b * impulse * s.a2;
    }

    fn is_finite(&self) -> bool {
        self.v_a.is_finite() && self.w_a.is_finite() && self.v_b.is_finite() && self.w_b.is_finite()
    }
}

struct PositionState {
    c_a: Vec2,
    a_a: f32,
    c_b: Vec2,
    a_b: f32,
}

impl PositionState {
    fn anchors(&self, s: &JointScratch) -> (Vec2, Vec2) {
        (
            Rot::from_angle(self.a_a).rotate(s.local_a),
            Rot::from_angle(self.a_b).rotate(s.local_b),
        )
    }

    fn is_finite(&self) -> bool {
        self.c_a.is_finite() && self.a_a.is_finite() && self.c_b.is_finite() && self.a_b.is_finite()
    }
}

fn distance_position(def: &DistanceJointDef, s: &JointScratch, pose: &mut PositionState) -> bool {
    let (r_a, r_b) = pose.anchors(s);
    let mut u = pose.c_b + r_b - pose.c_a - r_a;
    let length = u.length();
    u = u.normalize_or_zero();

    let c = if def.min_length == def.max_length || length < def.min_length {
        length - def.min_length
    } else if def.max_length < length {
        length - def.max_length
    } else {
        return true;
    };
    let c = c.clamp(-MAX_LINEAR_CORRECTION, MAX_LINEAR_CORRECTION);

    let cr_a = cross(r_a, u);
    let cr_b = cross(r_b, u);
    let mass = safe_recip(s.m_a + s.i_a * cr_a * cr_a + s.m_b + s.i_b * cr_b * cr_b);
    let p = -mass * c * u;

    pose.c_a -= s.m_a * p;
    pose.a_a -= s.i_a * cross(r_a, p);
    pose.c_b += s.m_b * p;
    pose.a_b += s.i_b * cross(r_b, p);

    c.abs() < LINEAR_SLOP
}

fn revolute_position(def: &RevoluteJointDef, s: &JointScratch, pose: &mut PositionState) -> bool {
    let mut angular_error = 0.0_f32;
    let fixed_rotation = s.i_a + s.i_b == 0.0;

    if def.enable_limit && !fixed_rotation {
        let angle = pose.a_b - pose.a_a - def.reference_angle;
        let c = if (def.upper_angle - def.lower_angle).abs() < 2.0 * ANGULAR_SLOP {
            (angle - def.lower_angle).clamp(-MAX_ANGULAR_CORRECTION, MAX_ANGULAR_CORRECTION)
        } else if angle <= def.lower_angle {
            (angle - def.lower_angle + ANGULAR_SLOP).clamp(-MAX_ANGULAR_CORRECTION, 0.0)
        } else if angle >= def.upper_angle {
            (angle - def.upper_angle - ANGULAR_SLOP).clamp(0.0, MAX_ANGULAR_CORRECTION)
        } else {
            0.0
        };
        let impulse = -s.axial_mass * c;
        pose.a_a -= s.i_a * impulse;
        pose.a_b += s.i_b * impulse;
        angular_error = c.abs();
    }

    let (r_a, r_b) = pose.anchors(s);
    let c = pose.c_b + r_b - pose.c_a - r_a;
    let position_error = c.length();
    let k = point_mass(s.m_a, s.m_b, s.i_a, s.i_b, r_a, r_b);
    let impulse = -solve22(k, c);

    pose.c_a -= s.m_a * impulse;
    pose.a_a -= s.i_a * cross(r_a, impulse);
    pose.c_b += s.m_b * impulse;
    pose.a_b += s.i_b * cross(r_b, impulse);

    position_error <= LINEAR_SLOP && angular_error <= ANGULAR_SLOP
}

fn prismatic_position(def: &PrismaticJointDef, s: &JointScratch, pose: &mut PositionState) -> bool {
    let (m_a, m_b, i_a, i_b) = (s.m_a, s.m_b, s.i_a, s.i_b);
    let (r_a, r_b) = pose.anchors(s);
    let d = pose.c_b + r_b - pose.c_a - r_a;

    let axis = Rot::from_angle(pose.a_a).rotate(def.local_axis_a);
    let a1 = cross(d + r_a, axis);
    let a2 = cross(r_b, axis);
    let perp = left_perp(axis);
    let s1 = cross(d + r_a, perp);
    let s2 = cross(r_b, perp);

    let c1 = Vec2::new(perp.dot(d), pose.a_b - pose.a_a - def.reference_angle);
    let mut linear_error = c1.x.abs();
    let angular_error = c1.y.abs();

    let mut active = false;
    let mut c2 = 0.0;
    if def.enable_limit {
        let translation = axis.dot(d);
        if (def.upper_translation - def.lower_translation).abs() < 2.0 * LINEAR_SLOP {
            c2 = translation - def.lower_translation;
            linear_error = linear_error.max(c2.abs());
            active = true;
        } else if translation <= def.lower_translation {
            c2 = (translation - def.lower_translation).min(0.0);
            linear_error = linear_error.max(def.lower_translation - translation);
            active = true;
        } else if translation >= def.upper_translation {
            c2 = (translation - def.upper_translation).max(0.0);
            linear_error = linear_error.max(translation - def.upper_translation);
            active = true;
        }
    }

    let k11 = m_a + m_b + i_a * s1 * s1 + i_b * s2 * s2;
    let k12 = i_a * s1 + i_b * s2;
    let mut k22 = i_a + i_b;
    if k22 == 0.0 {
        k22 = 1.0;
    }

    let impulse = if active {
        let k13 = i_a * s1 * a1 + i_b * s2 * a2;
        let k23 = i_a * a1 + i_b * a2;
        let k33 = m_a + m_b + i_a * a1 * a1 + i_b * a2 * a2;
        let k = Mat3::from_cols(
            Vec3::new(k11, k12, k13),
            Vec3::new(k12, k22, k23),
            Vec3::new(k13, k23, k33),
        );
        solve33(k, -Vec3::new(c1.x, c1.y, c2))
    } else {
        let k = Mat2::from_cols(Vec2::new(k11, k12), Vec2::new(k12, k22));
        solve22(k, -c1).extend(0.0)
    };

    let p = impulse.x * perp + impulse.z * axis;
    let l_a = impulse.x * s1 + impulse.y + impulse.z * a1;
    let l_b = impulse.x * s2 + impulse.y + impulse.z * a2;

    pose.c_a -= m_a * p;
    pose.a_a -= i_a * l_a;
    pose.c_b += m_b * p;
    pose.a_b += i_b * l_b;

    linear_error <= LINEAR_SLOP && angular_error <= ANGULAR_SLOP
}

fn weld_position(def: &WeldJointDef, s: &JointScratch, pose: &mut PositionState) -> bool {
    let (r_a, r_b) = pose.anchors(s);
    let c1 = pose.c_b + r_b - pose.c_a - r_a;
    let c2 = pose.a_b - pose.a_a - def.reference_angle;
    let position_error = c1.length();
    let angular_error = c2.abs();

    let impulse = if s.i_a + s.i_b > 0.0 {
        let k = weld_mass(s.m_a, s.m_b, s.i_a, s.i_b, r_a, r_b);
        -solve33(k, c1.extend(c2))
    } else {
        let k = point_mass(s.m_a, s.m_b, s.i_a, s.i_b, r_a, r_b);
        (-solve22(k, c1)).extend(0.0)
    };
    let p = impulse.truncate();

    pose.c_a -= s.m_a * p;
    pose.a_a -= s.i_a * (cross(r_a, p) + impulse.z);
    pose.c_b += s.m_b * p;
    pose.a_b += s.i_b * (cross(r_b, p) + impulse.z);

    position_error <= LINEAR_SLOP && angular_error <= ANGULAR_SLOP
}

/// Effective mass matrix of a point-to-point constraint.
fn point_mass(m_a: f32, m_b: f32, i_a: f32, i_b: f32, r_a: Vec2, r_b: Vec2) -> Mat2 {
    let k11 = m_a + m_b + r_a.y * r_a.y * i_a + r_b.y * r_b.y * i_b;
    let k12 = -r_a.y * r_a.x * i_a - r_b.y * r_b.x * i_b;
    let k22 = m_a + m_b + r_a.x * r_a.x * i_a + r_b.x * r_b.x * i_b;
    Mat2::from_cols(Vec2::new(k11, k12), Vec2::new(k12, k22))
}

/// Point plus angle effective mass used by the weld joint.
fn weld_mass(m_a: f32, m_b: f32, i_a: f32, i_b: f32, r_a: Vec2, r_b: Vec2) -> Mat3 {
    let k = point_mass(m_a, m_b, i_a, i_b, r_a, r_b);
    let k13 = -r_a.y * i_a - r_b.y * i_b;
    let k23 = r_a.x * i_a + r_b.x * i_b;
    Mat3::from_cols(
        Vec3::new(k.x_axis.x, k.x_axis.y, k13),
        Vec3::new(k.y_axis.x, k.y_axis.y, k23),
        Vec3::new(k13, k23, i_a + i_b),
    )
}

fn store_velocity(bodies: &mut [SolverBody], index: usize, v: Vec2, w: f32) {
    let body = &mut bodies[index];
    if body.inv_mass == 0.0 && body.inv_inertia == 0.0 {
        return;
    }
    body.v = v;
    body.w = w;
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const H: f32 = 1.0 / 60.0;

    fn ground() -> SolverBody {
        SolverBody {
            id: EntityId::from_index(0),
            c: Vec2::ZERO,
            a: 0.0,
            v: Vec2::ZERO,
            w: 0.0,
            inv_mass: 0.0,
            inv_inertia: 0.0,
            local_center: Vec2::ZERO,
        }
    }

    fn ball(c: Vec2, v: Vec2, w: f32) -> SolverBody {
        SolverBody {
            id: EntityId::from_index(1),
            c,
            a: 0.0,
            v,
            w,
            inv_mass: 1.0,
            inv_inertia: 6.0,
            local_center: Vec2::ZERO,
        }
    }

    fn joint(kind: JointKind) -> Joint {
        Joint::new(
            EntityId::from_index(0),
            JointDef::new(EntityId::from_index(0), EntityId::from_index(1), kind),
        )
    }

    fn solve(joint: &mut Joint, bodies: &mut [SolverBody], iterations: usize) {
        joint.prepare(0, 1, bodies, H, true);
        joint.warm_start(bodies);
        for _ in 0..iterations {
            joint.solve_velocity(bodies);
        }
    }

    #[test]
    fn revolute_pin_removes_anchor_velocity() {
        let mut bodies = [ground(), ball(Vec2::new(1.0, 0.0), Vec2::new(1.0, 0.5), 0.3)];
        let mut joint = joint(JointKind::Revolute(RevoluteJointDef::new(
            Vec2::ZERO,
            Vec2::new(-1.0, 0.0),
        )));
        solve(&mut joint, &mut bodies, 1);

        let b = &bodies[1];
        let anchor_velocity = b.v + cross_sv(b.w, Vec2::new(-1.0, 0.0));
        assert!(anchor_velocity.length() < 1e-5, "{anchor_velocity:?}");
        assert_eq!(bodies[0].v, Vec2::ZERO);
        assert!(joint.reaction_force().length() > 0.0);
    }

    #[test]
    fn rigid_distance_stops_separation() {
        let mut bodies = [ground(), ball(Vec2::new(1.0, 0.0), Vec2::new(2.0, 0.0), 0.0)];
        let mut joint = joint(JointKind::Distance(DistanceJointDef::new(Vec2::ZERO, Vec2::ZERO, 1.0)));
        solve(&mut joint, &mut bodies, 1);
        assert_relative_eq!(bodies[1].v.x, 0.0, epsilon = 1e-5);
        assert_relative_eq!(joint.reaction_force().x, -2.0 / H, epsilon = 1e-2);
    }

    #[test]
    fn rope_range_is_slack_inside_limits() {
        let mut bodies = [ground(), ball(Vec2::new(1.0, 0.0), Vec2::new(2.0, 0.0), 0.0)];
        let mut joint = joint(JointKind::Distance(
            DistanceJointDef::new(Vec2::ZERO, Vec2::ZERO, 1.0).with_limits(0.0, 2.0),
        ));
        solve(&mut joint, &mut bodies, 4);
        assert_relative_eq!(bodies[1].v.x, 2.0, epsilon = 1e-5);
    }

    #[test]
    fn spring_pulls_stretched_body_back() {
        let mut bodies = [ground(), ball(Vec2::new(2.0, 0.0), Vec2::ZERO, 0.0)];
        let mut joint = joint(JointKind::Distance(
            DistanceJointDef::new(Vec2::ZERO, Vec2::ZERO, 1.0).with_spring(50.0, 1.0),
        ));
        solve(&mut joint, &mut bodies, 4);
        assert!(bodies[1].v.x < 0.0);
    }

    #[test]
    fn revolute_motor_reaches_speed() {
        let mut bodies = [ground(), ball(Vec2::ZERO, Vec2::ZERO, 0.0)];
        let mut joint = joint(JointKind::Revolute(
            RevoluteJointDef::new(Vec2::ZERO, Vec2::ZERO).with_motor(1.0, 1000.0),
        ));
        solve(&mut joint, &mut bodies, 2);
        assert_relative_eq!(bodies[1].w, 1.0, epsilon = 1e-5);
        assert!(joint.reaction_torque() > 0.0);
    }

    #[test]
    fn weak_motor_is_torque_limited() {
        let mut bodies = [ground(), ball(Vec2::ZERO, Vec2::ZERO, 0.0)];
        let mut joint = joint(JointKind::Revolute(
            RevoluteJointDef::new(Vec2::ZERO, Vec2::ZERO).with_motor(10.0, 1.0),
        ));
        solve(&mut joint, &mut bodies, 8);
        // One step of 1 N*m on inverse inertia 6.
        assert_relative_eq!(bodies[1].w, 6.0 * H, epsilon = 1e-5);
    }

    #[test]
    fn revolute_upper_limit_blocks_rotation() {
        let mut bodies = [ground(), ball(Vec2::ZERO, Vec2::ZERO, 5.0)];
        let mut joint = joint(JointKind::Revolute(
            RevoluteJointDef::new(Vec2::ZERO, Vec2::ZERO).with_limits(-1.0, 0.0),
        ));
        solve(&mut joint, &mut bodies, 4);
        assert!(bodies[1].w.abs() < 1e-5);
    }

    #[test]
    fn prismatic_allows_motion_along_axis_only() {
        let mut bodies = [ground(), ball(Vec2::ZERO, Vec2::new(1.0, 1.0), 2.0)];
        let mut joint = joint(JointKind::Prismatic(PrismaticJointDef::new(
            Vec2::ZERO,
            Vec2::ZERO,
            Vec2::X,
        )));
        solve(&mut joint, &mut bodies, 1);
        assert_relative_eq!(bodies[1].v.x, 1.0, epsilon = 1e-5);
        assert_relative_eq!(bodies[1].v.y, 0.0, epsilon = 1e-5);
        assert_relative_eq!(bodies[1].w, 0.0, epsilon = 1e-5);
    }

    #[test]
    fn prismatic_limit_stops_slider() {
        let mut bodies = [ground(), ball(Vec2::ZERO, Vec2::new(1.0, 0.0), 0.0)];
        let mut joint = joint(JointKind::Prismatic(
            PrismaticJointDef::new(Vec2::ZERO, Vec2::ZERO, Vec2::X).with_limits(-1.0, 0.0),
        ));
        solve(&mut joint, &mut bodies, 4);
        assert!(bodies[1].v.x.abs() < 1e-4);
    }

    #[test]
    fn weld_freezes_relative_motion() {
        let mut bodies = [ground(), ball(Vec2::new(0.5, 0.0), Vec2::new(1.0, -1.0), 2.0)];
        let mut joint = joint(JointKind::Weld(WeldJointDef {
            local_anchor_a: Vec2::new(0.5, 0.0),
            local_anchor_b: Vec2::ZERO,
            reference_angle: 0.0,
        }));
        solve(&mut joint, &mut bodies, 1);
        assert!(bodies[1].v.length() < 1e-4);
        assert!(bodies[1].w.abs() < 1e-4);
    }

    #[test]
    fn position_pass_closes_revolute_gap() {
        let mut bodies = [ground(), ball(Vec2::new(1.1, 0.05), Vec2::ZERO, 0.0)];
        let mut joint = joint(JointKind::Revolute(RevoluteJointDef::new(
            Vec2::ZERO,
            Vec2::new(-1.0, 0.0),
        )));
        joint.prepare(0, 1, &bodies, H, true);
        let mut done = false;
        for _ in 0..10 {
            done = joint.solve_position(&mut bodies);
            if done {
                break;
            }
        }
        assert!(done);
        assert_eq!(bodies[0].c, Vec2::ZERO);
    }

    #[test]
    fn disabled_warm_start_clears_impulses() {
        let mut bodies = [ground(), ball(Vec2::new(1.0, 0.0), Vec2::new(2.0, 0.0), 0.0)];
        let mut joint = joint(JointKind::Distance(DistanceJointDef::new(Vec2::ZERO, Vec2::ZERO, 1.0)));
        solve(&mut joint, &mut bodies, 1);
        joint.prepare(0, 1, &bodies, H, false);
        assert_eq!(joint.reaction_force(), Vec2::ZERO);
    }
}
