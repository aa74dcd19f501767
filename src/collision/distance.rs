//! GJK closest points between convex proxies and segment-segment distance.

use glam::Vec2;

use crate::{
    config::MAX_POLYGON_VERTICES,
    core::types::Transform,
    utils::math::{cross, cross_sv, cross_vs},
};

/// Upper bound on GJK iterations; 2D simplices converge well before this.
pub const GJK_MAX_ITERATIONS: usize = 20;

/// Point cloud plus rounding radius, the form GJK consumes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapeProxy {
    points: [Vec2; MAX_POLYGON_VERTICES],
    count: usize,
    pub radius: f32,
}

impl ShapeProxy {
    pub fn new(points: &[Vec2], radius: f32) -> Self {
        let count = points.len().min(MAX_POLYGON_VERTICES);
        let mut storage = [Vec2::ZERO; MAX_POLYGON_VERTICES];
        storage[..count].copy_from_slice(&points[..count]);
        Self {
            points: storage,
            count,
            radius,
        }
    }

    pub fn points(&self) -> &[Vec2] {
        &self.points[..self.count]
    }

    pub fn vertex(&self, index: usize) -> Vec2 {
        self.points[index]
    }

    /// Index of the point furthest along `direction`.
    pub fn support(&self, direction: Vec2) -> usize {
        let mut best = 0;
        let mut best_value = self.points[0].dot(direction);
        for (i, point) in self.points().iter().enumerate().skip(1) {
            let value = point.dot(direction);
            if value > best_value {
                best = i;
                best_value = value;
            }
        }
        best
    }

    /// Largest distance from `center` to any point, including the radius.
    pub fn max_extent(&self, center: Vec2) -> f32 {
        self.points()
            .iter()
            .map(|p| p.distance(center))
            .fold(0.0, f32::max)
            + self.radius
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceOutput {
    pub point_a: Vec2,
    pub point_b: Vec2,
    pub distance: f32,
    pub iterations: usize,
}

#[derive(Debug, Clone, Copy, Default)]
struct SimplexVertex {
    w_a: Vec2,
    w_b: Vec2,
    w: Vec2,
    a: f32,
    index_a: usize,
    index_b: usize,
}

#[derive(Debug, Clone, Copy, Default)]
struct Simplex {
    v: [SimplexVertex; 3],
    count: usize,
}

impl Simplex {
    fn search_direction(&self) -> Vec2 {
        match self.count {
            1 => -self.v[0].w,
            _ => {
                let e12 = self.v[1].w - self.v[0].w;
                if cross(e12, -self.v[0].w) > 0.0 {
                    cross_sv(1.0, e12)
                } else {
                    cross_vs(e12, 1.0)
                }
            }
        }
    }

    fn witness_points(&self) -> (Vec2, Vec2) {
        let [v1, v2, v3] = self.v;
        match self.count {
            1 => (v1.w_a, v1.w_b),
            2 => (
                v1.a * v1.w_a + v2.a * v2.w_a,
                v1.a * v1.w_b + v2.a * v2.w_b,
            ),
            _ => {
                let p = v1.a * v1.w_a + v2.a * v2.w_a + v3.a * v3.w_a;
                (p, p)
            }
        }
    }

    fn solve2(&mut self) {
        let w1 = self.v[0].w;
        let w2 = self.v[1].w;
        let e12 = w2 - w1;

        let d12_2 = -w1.dot(e12);
        if d12_2 <= 0.0 {
            self.v[0].a = 1.0;
            self.count = 1;
            return;
        }
        let d12_1 = w2.dot(e12);
        if d12_1 <= 0.0 {
            self.v[1].a = 1.0;
            self.count = 1;
            self.v[0] = self.v[1];
            return;
        }

        let inv = 1.0 / (d12_1 + d12_2);
        self.v[0].a = d12_1 * inv;
        self.v[1].a = d12_2 * inv;
        self.count = 2;
    }

    fn solve3(&mut self) {
        let w1 = self.v[0].w;
        let w2 = self.v[1].w;
        let w3 = self.v[2].w;

        let e12 = w2 - w1;
        let d12_1 = w2.dot(e12);
        let d12_2 = -w1.dot(e12);

        let e13 = w3 - w1;
        let d13_1 = w3.dot(e13);
        let d13_2 = -w1.dot(e13);

        let e23 = w3 - w2;
        let d23_1 = w3.dot(e23);
        let d23_2 = -w2.dot(e23);

        let n123 = cross(e12, e13);
        let d123_1 = n123 * cross(w2, w3);
        let d123_2 = n123 * cross(w3, w1);
        let d123_3 = n123 * cross(w1, w2);

        if d12_2 <= 0.0 && d13_2 <= 0.0 {
            self.v[0].a = 1.0;
            self.count = 1;
            return;
        }

        if d12_1 > 0.0 && d12_2 > 0.0 && d123_3 <= 0.0 {
            let inv = 1.0 / (d12_1 + d12_2);
            self.v[0].a = d12_1 * inv;
            self.v[1].a = d12_2 * inv;
            self.count = 2;
            return;
        }

        if d13_1 > 0.0 && d13_2 > 0.0 && d123_2 <= 0.0 {
            let inv = 1.0 / (d13_1 + d13_2);
            self.v[0].a = d13_1 * inv;
            self.v[2].a = d13_2 * inv;
            self.count = 2;
            self.v[1] = self.v[2];
            return;
        }

        if d12_1 <= 0.0 && d23_2 <= 0.0 {
            self.v[1].a = 1.0;
            self.count = 1;
            self.v[0] = self.v[1];
            return;
        }

        if d13_1 <= 0.0 && d23_1 <= 0.0 {
            self.v[2].a = 1.0;
            self.count = 1;
            self.v[0] = self.v[2];
            return;
        }

        if d23_1 > 0.0 && d23_2 > 0.0 && d123_1 <= 0.0 {
            let inv = 1.0 / (d23_1 + d23_2);
            self.v[1].a = d23_1 * inv;
            self.v[2].a = d23_2 * inv;
            self.count = 2;
            self.v[0] = self.v[2];
            return;
        }

        let inv = 1.0 / (d123_1 + d123_2 + d123_3);
        self.v[0].a = d123_1 * inv;
        self.v[1].a = d123_2 * inv;
        self.v[2].a = d123_3 * inv;
        self.count = 3;
    }
}

/// Closest points between two proxies placed by `xf_a` and `xf_b`.
///
/// With `use_radii` the rounding radii are applied to the result; overlapping
/// rounded shapes report a shared midpoint and zero distance.
pub fn distance(
    proxy_a: &ShapeProxy,
    xf_a: &Transform,
    proxy_b: &ShapeProxy,
    xf_b: &Transform,
    use_radii: bool,
) -> DistanceOutput {
    let mut simplex = Simplex::default();
    let w_a = xf_a.transform_point(proxy_a.vertex(0));
    let w_b = xf_b.transform_point(proxy_b.vertex(0));
    simplex.v[0] = SimplexVertex {
        w_a,
        w_b,
        w: w_b - w_a,
        a: 1.0,
        index_a: 0,
        index_b: 0,
    };
    simplex.count = 1;

    let mut saved_a = [0usize; 3];
    let mut saved_b = [0usize; 3];
    let mut iterations = 0;

    while iterations < GJK_MAX_ITERATIONS {
        let saved_count = simplex.count;
        for i in 0..saved_count {
            saved_a[i] = simplex.v[i].index_a;
            saved_b[i] = simplex.v[i].index_b;
        }

        match simplex.count {
            2 => simplex.solve2(),
            3 => simplex.solve3(),
            _ => {}
        }

        // Origin enclosed: shapes overlap.
        if simplex.count == 3 {
            break;
        }

        let d = simplex.search_direction();
        if d.length_squared() < f32::EPSILON * f32::EPSILON {
            break;
        }

        let index_a = proxy_a.support(xf_a.rotation.inv_rotate(-d));
        let index_b = proxy_b.support(xf_b.rotation.inv_rotate(d));
        let w_a = xf_a.transform_point(proxy_a.vertex(index_a));
        let w_b = xf_b.transform_point(proxy_b.vertex(index_b));
        iterations += 1;

        let duplicate = (0..saved_count).any(|i| index_a == saved_a[i] && index_b == saved_b[i]);
        if duplicate {
            break;
        }

        simplex.v[simplex.count] = SimplexVertex {
            w_a,
            w_b,
            w: w_b - w_a,
            a: 0.0,
            index_a,
            index_b,
        };
        simplex.count += 1;
    }

    let (mut point_a, mut point_b) = simplex.witness_points();
    let mut distance = point_a.distance(point_b);

    if use_radii {
        let r_a = proxy_a.radius;
        let r_b = proxy_b.radius;
        if distance > r_a + r_b && distance > f32::EPSILON {
            let normal = (point_b - point_a) / distance;
            distance -= r_a + r_b;
            point_a += r_a * normal;
            point_b -= r_b * normal;
        } else {
            let p = 0.5 * (point_a + point_b);
            point_a = p;
            point_b = p;
            distance = 0.0;
        }
    }

    DistanceOutput {
        point_a,
        point_b,
        distance,
        iterations,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentDistance {
    pub closest1: Vec2,
    pub closest2: Vec2,
    pub fraction1: f32,
    pub fraction2: f32,
    pub distance_squared: f32,
}

/// Closest points between segments `p1-q1` and `p2-q2`.
pub fn segment_distance(p1: Vec2, q1: Vec2, p2: Vec2, q2: Vec2) -> SegmentDistance {
    let d1 = q1 - p1;
    let d2 = q2 - p2;
    let r = p1 - p2;
    let dd1 = d1.length_squared();
    let dd2 = d2.length_squared();
    let rd1 = r.dot(d1);
    let rd2 = r.dot(d2);
    let eps2 = f32::EPSILON * f32::EPSILON;

    let (fraction1, fraction2) = if dd1 < eps2 || dd2 < eps2 {
        if dd1 >= eps2 {
            ((-rd1 / dd1).clamp(0.0, 1.0), 0.0)
        } else if dd2 >= eps2 {
            (0.0, (rd2 / dd2).clamp(0.0, 1.0))
        } else {
            (0.0, 0.0)
        }
    } else {
        let d12 = d1.dot(d2);
        let denominator = dd1 * dd2 - d12 * d12;
        let f1 = if denominator != 0.0 {
            ((d12 * rd2 - rd1 * dd2) / denominator).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let f2 = (d12 * f1 + rd2) / dd2;
        if f2 < 0.0 {
            ((-rd1 / dd1).clamp(0.0, 1.0), 0.0)
        } else if f2 > 1.0 {
            (((d12 - rd1) / dd1).clamp(0.0, 1.0), 1.0)
        } else {
            (f1, f2)
        }
    };

    let closest1 = p1 + fraction1 * d1;
    let closest2 = p2 + fraction2 * d2;
    SegmentDistance {
        closest1,
        closest2,
        fraction1,
        fraction2,
        distance_squared: closest1.distance_squared(closest2),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn square(half: f32) -> ShapeProxy {
        ShapeProxy::new(
            &[
                Vec2::new(-half, -half),
                Vec2::new(half, -half),
                Vec2::new(half, half),
                Vec2::new(-half, half),
            ],
            0.0,
        )
    }

    #[test]
    fn separated_boxes_report_gap() {
        let a = square(0.5);
        let b = square(0.5);
        let xf_a = Transform::IDENTITY;
        let xf_b = Transform::new(Vec2::new(3.0, 0.25), 0.0);
        let out = distance(&a, &xf_a, &b, &xf_b, false);
        assert_relative_eq!(out.distance, 2.0, epsilon = 1e-5);
        assert!(out.iterations <= GJK_MAX_ITERATIONS);
    }

    #[test]
    fn overlapping_shapes_report_zero() {
        let a = square(1.0);
        let b = square(1.0);
        let out = distance(
            &a,
            &Transform::IDENTITY,
            &b,
            &Transform::new(Vec2::new(0.5, 0.5), 0.3),
            false,
        );
        assert!(out.distance < 1e-5);
    }

    #[test]
    fn radii_shrink_distance() {
        let a = ShapeProxy::new(&[Vec2::ZERO], 0.5);
        let b = ShapeProxy::new(&[Vec2::ZERO], 0.25);
        let out = distance(
            &a,
            &Transform::IDENTITY,
            &b,
            &Transform::new(Vec2::new(2.0, 0.0), 0.0),
            true,
        );
        assert_relative_eq!(out.distance, 1.25, epsilon = 1e-5);
        assert_relative_eq!(out.point_a.x, 0.5, epsilon = 1e-5);
        assert_relative_eq!(out.point_b.x, 1.75, epsilon = 1e-5);
    }

    #[test]
    fn crossing_segments_touch() {
        let result = segment_distance(
            Vec2::new(-1.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(0.0, -1.0),
            Vec2::new(0.0, 1.0),
        );
        assert!(result.distance_squared < 1e-10);
        assert_relative_eq!(result.fraction1, 0.5, epsilon = 1e-5);
    }

    #[test]
    fn parallel_segments_measure_offset() {
        let result = segment_distance(
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(0.0, 2.0),
            Vec2::new(1.0, 2.0),
        );
        assert_relative_eq!(result.distance_squared, 4.0, epsilon = 1e-5);
    }
}
