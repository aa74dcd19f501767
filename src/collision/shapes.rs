//! Convex primitives with mass, bounds, support, and ray queries.
//!
//! Geometry is expressed in the owning body's frame, so offsets live in the
//! shape itself rather than in a separate collider transform.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::{
    collision::aabb::Aabb,
    config::{LINEAR_SLOP, MAX_POLYGON_VERTICES},
    core::types::{MassProperties, Transform},
    error::{PhysicsError, PhysicsResult},
    utils::math::{cross, right_perp},
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Circle {
    pub center: Vec2,
    pub radius: f32,
}

/// Two semicircles joined by a rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Capsule {
    pub center1: Vec2,
    pub center2: Vec2,
    pub radius: f32,
}

/// Two-sided line segment with no area and no mass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub point1: Vec2,
    pub point2: Vec2,
}

/// Solid convex polygon, counter-clockwise, optionally rounded by `radius`.
///
/// Capsules and segments are viewed as two-vertex polygons by the narrow-phase.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    pub(crate) vertices: [Vec2; MAX_POLYGON_VERTICES],
    pub(crate) normals: [Vec2; MAX_POLYGON_VERTICES],
    pub(crate) count: usize,
    pub(crate) centroid: Vec2,
    pub(crate) radius: f32,
}

/// Ray or segment cast input in the shape's frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RayCastInput {
    pub origin: Vec2,
    pub translation: Vec2,
    pub max_fraction: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RayCastOutput {
    pub point: Vec2,
    pub normal: Vec2,
    pub fraction: f32,
}

impl Circle {
    pub fn new(center: Vec2, radius: f32) -> Self {
        Self { center, radius }
    }

    pub fn validate(&self) -> PhysicsResult<()> {
        if !self.center.is_finite() || !(self.radius.is_finite() && self.radius > 0.0) {
            return Err(PhysicsError::InvalidGeometry(format!(
                "circle radius must be positive and finite, got {}",
                self.radius
            )));
        }
        Ok(())
    }

    pub fn mass(&self, density: f32) -> MassProperties {
        let rr = self.radius * self.radius;
        let mass = density * std::f32::consts::PI * rr;
        MassProperties {
            mass,
            center: self.center,
            inertia: mass * 0.5 * rr,
        }
    }

    pub fn aabb(&self, xf: &Transform) -> Aabb {
        let p = xf.transform_point(self.center);
        Aabb::from_center(p, Vec2::splat(self.radius))
    }

    pub fn ray_cast(&self, input: &RayCastInput) -> Option<RayCastOutput> {
        let s = input.origin - self.center;
        let length = input.translation.length();
        if length < f32::EPSILON {
            return None;
        }
        let d = input.translation / length;

        // Closest approach of the infinite line to the center.
        let t = -s.dot(d);
        let c = s + t * d;
        let cc = c.length_squared();
        let rr = self.radius * self.radius;
        if cc > rr {
            return None;
        }

        let fraction = t - (rr - cc).sqrt();
        if fraction < 0.0 || fraction > input.max_fraction * length {
            return None;
        }

        let hit = s + fraction * d;
        Some(RayCastOutput {
            point: self.center + hit,
            normal: hit.normalize_or_zero(),
            fraction: fraction / length,
        })
    }
}

impl Capsule {
    pub fn new(center1: Vec2, center2: Vec2, radius: f32) -> Self {
        Self {
            center1,
            center2,
            radius,
        }
    }

    pub fn validate(&self) -> PhysicsResult<()> {
        if !(self.center1.is_finite() && self.center2.is_finite()) {
            return Err(PhysicsError::InvalidGeometry("capsule centers must be finite".into()));
        }
        if !(self.radius.is_finite() && self.radius > 0.0) {
            return Err(PhysicsError::InvalidGeometry(format!(
                "capsule radius must be positive, got {}",
                self.radius
            )));
        }
        if self.center1.distance_squared(self.center2) <= LINEAR_SLOP * LINEAR_SLOP {
            return Err(PhysicsError::InvalidGeometry(
                "capsule centers are too close, use a circle".into(),
            ));
        }
        Ok(())
    }

    pub fn mass(&self, density: f32) -> MassProperties {
        let radius = self.radius;
        let rr = radius * radius;
        let length = (self.center2 - self.center1).length();
        let ll = length * length;

        let circle_mass = density * std::f32::consts::PI * rr;
        let box_mass = density * (2.0 * radius * length);
        let mass = circle_mass + box_mass;

        // Semicircle centroid offset from the flat side.
        let lc = 4.0 * radius / (3.0 * std::f32::consts::PI);
        let h = 0.5 * length;
        let circle_inertia = circle_mass * (0.5 * rr + h * h + 2.0 * h * lc);
        let box_inertia = box_mass * (4.0 * rr + ll) / 12.0;

        MassProperties {
            mass,
            center: self.center1.lerp(self.center2, 0.5),
            inertia: circle_inertia + box_inertia,
        }
    }

    pub fn aabb(&self, xf: &Transform) -> Aabb {
        let v1 = xf.transform_point(self.center1);
        let v2 = xf.transform_point(self.center2);
        let r = Vec2::splat(self.radius);
        Aabb::new(v1.min(v2) - r, v1.max(v2) + r)
    }

    pub fn ray_cast(&self, input: &RayCastInput) -> Option<RayCastOutput> {
        let axis = (self.center2 - self.center1).normalize_or_zero();
        let offset = right_perp(axis) * self.radius;

        let caps = [
            Circle::new(self.center1, self.radius).ray_cast(input),
            Circle::new(self.center2, self.radius).ray_cast(input),
        ];
        let sides = [
            Segment::new(self.center1 + offset, self.center2 + offset).ray_cast(input),
            Segment::new(self.center1 - offset, self.center2 - offset).ray_cast(input),
        ];

        caps.into_iter()
            .chain(sides)
            .flatten()
            .min_by(|a, b| a.fraction.total_cmp(&b.fraction))
    }

    pub fn to_polygon(&self) -> Polygon {
        Polygon::two_point(self.center1, self.center2, self.radius)
    }
}

impl Segment {
    pub fn new(point1: Vec2, point2: Vec2) -> Self {
        Self { point1, point2 }
    }

    pub fn validate(&self) -> PhysicsResult<()> {
        if !(self.point1.is_finite() && self.point2.is_finite()) {
            return Err(PhysicsError::InvalidGeometry("segment points must be finite".into()));
        }
        if self.point1.distance_squared(self.point2) <= LINEAR_SLOP * LINEAR_SLOP {
            return Err(PhysicsError::InvalidGeometry("segment is too short".into()));
        }
        Ok(())
    }

    pub fn aabb(&self, xf: &Transform) -> Aabb {
        let v1 = xf.transform_point(self.point1);
        let v2 = xf.transform_point(self.point2);
        Aabb::new(v1.min(v2), v1.max(v2))
    }

    pub fn ray_cast(&self, input: &RayCastInput) -> Option<RayCastOutput> {
        let p1 = input.origin;
        let d = input.translation;
        let e = self.point2 - self.point1;
        let normal = right_perp(e).normalize_or_zero();

        let numerator = normal.dot(self.point1 - p1);
        let denominator = normal.dot(d);
        if denominator == 0.0 {
            return None;
        }

        let t = numerator / denominator;
        if t < 0.0 || t > input.max_fraction {
            return None;
        }

        let q = p1 + t * d;
        let ee = e.length_squared();
        if ee == 0.0 {
            return None;
        }
        let s = (q - self.point1).dot(e) / ee;
        if !(0.0..=1.0).contains(&s) {
            return None;
        }

        Some(RayCastOutput {
            point: q,
            normal: if numerator > 0.0 { -normal } else { normal },
            fraction: t,
        })
    }

    pub fn to_polygon(&self) -> Polygon {
        Polygon::two_point(self.point1, self.point2, 0.0)
    }
}

impl Polygon {
    /// Builds a polygon from convex points in either winding.
    ///
    /// Points must already form a strictly convex loop; hull construction is
    /// left to authoring tools.
    pub fn new(points: &[Vec2], radius: f32) -> PhysicsResult<Self> {
        let count = points.len();
        if !(3..=MAX_POLYGON_VERTICES).contains(&count) {
            return Err(PhysicsError::InvalidGeometry(format!(
                "polygon needs 3..={MAX_POLYGON_VERTICES} vertices, got {count}"
            )));
        }
        if points.iter().any(|p| !p.is_finite()) || !(radius.is_finite() && radius >= 0.0) {
            return Err(PhysicsError::InvalidGeometry(
                "polygon data must be finite with non-negative radius".into(),
            ));
        }

        let mut vertices = [Vec2::ZERO; MAX_POLYGON_VERTICES];
        vertices[..count].copy_from_slice(points);
        let signed_area: f32 = (0..count)
            .map(|i| cross(vertices[i], vertices[(i + 1) % count]))
            .sum::<f32>()
            * 0.5;
        if signed_area < 0.0 {
            vertices[..count].reverse();
        }

        let mut normals = [Vec2::ZERO; MAX_POLYGON_VERTICES];
        for i in 0..count {
            let edge = vertices[(i + 1) % count] - vertices[i];
            if edge.length_squared() <= LINEAR_SLOP * LINEAR_SLOP {
                return Err(PhysicsError::InvalidGeometry(format!(
                    "polygon edge {i} is shorter than the linear slop"
                )));
            }
            normals[i] = right_perp(edge).normalize();
        }

        let polygon = Self {
            vertices,
            normals,
            count,
            centroid: compute_centroid(&vertices[..count]),
            radius,
        };
        polygon.validate()?;
        Ok(polygon)
    }

    /// Axis-aligned box centered on the body origin.
    pub fn make_box(half_width: f32, half_height: f32) -> Self {
        Self::make_offset_box(half_width, half_height, Vec2::ZERO, 0.0)
    }

    /// Box with its own center and rotation in the body frame.
    pub fn make_offset_box(half_width: f32, half_height: f32, center: Vec2, angle: f32) -> Self {
        let xf = Transform::new(center, angle);
        let corners = [
            Vec2::new(-half_width, -half_height),
            Vec2::new(half_width, -half_height),
            Vec2::new(half_width, half_height),
            Vec2::new(-half_width, half_height),
        ];
        let local_normals = [Vec2::NEG_Y, Vec2::X, Vec2::Y, Vec2::NEG_X];

        let mut vertices = [Vec2::ZERO; MAX_POLYGON_VERTICES];
        let mut normals = [Vec2::ZERO; MAX_POLYGON_VERTICES];
        for i in 0..4 {
            vertices[i] = xf.transform_point(corners[i]);
            normals[i] = xf.rotation.rotate(local_normals[i]);
        }

        Self {
            vertices,
            normals,
            count: 4,
            centroid: center,
            radius: 0.0,
        }
    }

    /// Box whose corners are rounded by `radius`.
    pub fn make_rounded_box(half_width: f32, half_height: f32, radius: f32) -> Self {
        let mut polygon = Self::make_box(half_width, half_height);
        polygon.radius = radius;
        polygon
    }

    pub(crate) fn two_point(p1: Vec2, p2: Vec2, radius: f32) -> Self {
        let mut vertices = [Vec2::ZERO; MAX_POLYGON_VERTICES];
        let mut normals = [Vec2::ZERO; MAX_POLYGON_VERTICES];
        vertices[0] = p1;
        vertices[1] = p2;
        let normal = right_perp(p2 - p1).normalize_or_zero();
        normals[0] = normal;
        normals[1] = -normal;
        Self {
            vertices,
            normals,
            count: 2,
            centroid: p1.lerp(p2, 0.5),
            radius,
        }
    }

    pub fn vertices(&self) -> &[Vec2] {
        &self.vertices[..self.count]
    }

    pub fn normals(&self) -> &[Vec2] {
        &self.normals[..self.count]
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    pub fn centroid(&self) -> Vec2 {
        self.centroid
    }

    /// Checks winding, convexity, unit normals and non-degenerate area.
    pub fn validate(&self) -> PhysicsResult<()> {
        let count = self.count;
        if !(3..=MAX_POLYGON_VERTICES).contains(&count) {
            return Err(PhysicsError::InvalidGeometry(format!(
                "polygon vertex count {count} out of range"
            )));
        }
        if !(self.radius.is_finite() && self.radius >= 0.0) {
            return Err(PhysicsError::InvalidGeometry("polygon radius must be non-negative".into()));
        }
        let vertices = self.vertices();
        if vertices.iter().any(|v| !v.is_finite()) {
            return Err(PhysicsError::InvalidGeometry("polygon vertices must be finite".into()));
        }

        let area = 0.5 * (0..count)
            .map(|i| cross(vertices[i], vertices[(i + 1) % count]))
            .sum::<f32>();
        if area <= LINEAR_SLOP * LINEAR_SLOP {
            return Err(PhysicsError::InvalidGeometry(format!(
                "polygon area {area} is degenerate or wound clockwise"
            )));
        }

        for i in 0..count {
            let normal = self.normals[i];
            if (normal.length() - 1.0).abs() > 1e-3 {
                return Err(PhysicsError::InvalidGeometry(format!("normal {i} is not unit length")));
            }
            let e1 = vertices[(i + 1) % count] - vertices[i];
            let e2 = vertices[(i + 2) % count] - vertices[(i + 1) % count];
            if cross(e1.normalize_or_zero(), e2.normalize_or_zero()) <= 1e-4 {
                return Err(PhysicsError::InvalidGeometry(format!(
                    "polygon is not strictly convex at vertex {}",
                    (i + 1) % count
                )));
            }
        }
        Ok(())
    }

    pub fn mass(&self, density: f32) -> MassProperties {
        let count = self.count;
        let mut vertices = [Vec2::ZERO; MAX_POLYGON_VERTICES];
        vertices[..count].copy_from_slice(self.vertices());

        // Push vertices out along the corner bisector to approximate rounding.
        if self.radius > 0.0 {
            let sqrt2 = std::f32::consts::SQRT_2;
            for (i, vertex) in vertices.iter_mut().enumerate().take(count) {
                let prev = if i == 0 { count - 1 } else { i - 1 };
                let mid = (self.normals[prev] + self.normals[i]).normalize_or_zero();
                *vertex += sqrt2 * self.radius * mid;
            }
        }

        let origin = vertices[0];
        let inv3 = 1.0 / 3.0;
        let mut center = Vec2::ZERO;
        let mut area = 0.0;
        let mut inertia = 0.0;

        for i in 1..count - 1 {
            let e1 = vertices[i] - origin;
            let e2 = vertices[i + 1] - origin;
            let d = cross(e1, e2);
            let triangle_area = 0.5 * d;
            area += triangle_area;
            center += triangle_area * inv3 * (e1 + e2);

            let int_x2 = e1.x * e1.x + e2.x * e1.x + e2.x * e2.x;
            let int_y2 = e1.y * e1.y + e2.y * e1.y + e2.y * e2.y;
            inertia += (0.25 * inv3 * d) * (int_x2 + int_y2);
        }

        if area <= f32::EPSILON {
            return MassProperties {
                mass: 0.0,
                center: self.centroid,
                inertia: 0.0,
            };
        }

        let mass = density * area;
        center /= area;
        MassProperties {
            mass,
            center: origin + center,
            // Shift from the fan origin to the center of mass.
            inertia: density * inertia - mass * center.length_squared(),
        }
    }

    pub fn aabb(&self, xf: &Transform) -> Aabb {
        let first = xf.transform_point(self.vertices[0]);
        let (min, max) = self.vertices()[1..]
            .iter()
            .map(|v| xf.transform_point(*v))
            .fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v)));
        let r = Vec2::splat(self.radius);
        Aabb::new(min - r, max + r)
    }

    /// Cast against the polygon with its faces pushed out by the rounding radius.
    pub fn ray_cast(&self, input: &RayCastInput) -> Option<RayCastOutput> {
        let p1 = input.origin;
        let d = input.translation;
        let mut lower = 0.0_f32;
        let mut upper = input.max_fraction;
        let mut index = None;

        for i in 0..self.count {
            let numerator = self.normals[i].dot(self.vertices[i] - p1) + self.radius;
            let denominator = self.normals[i].dot(d);

            if denominator == 0.0 {
                if numerator < 0.0 {
                    return None;
                }
            } else if denominator < 0.0 && numerator < lower * denominator {
                lower = numerator / denominator;
                index = Some(i);
            } else if denominator > 0.0 && numerator < upper * denominator {
                upper = numerator / denominator;
            }

            if upper < lower {
                return None;
            }
        }

        index.map(|i| RayCastOutput {
            point: p1 + lower * d,
            normal: self.normals[i],
            fraction: lower,
        })
    }

    /// Copy of this polygon expressed through `xf`.
    pub fn transformed(&self, xf: &Transform) -> Polygon {
        let mut out = *self;
        for i in 0..self.count {
            out.vertices[i] = xf.transform_point(self.vertices[i]);
            out.normals[i] = xf.rotation.rotate(self.normals[i]);
        }
        out.centroid = xf.transform_point(self.centroid);
        out
    }
}

fn compute_centroid(vertices: &[Vec2]) -> Vec2 {
    let origin = vertices[0];
    let inv3 = 1.0 / 3.0;
    let mut center = Vec2::ZERO;
    let mut area = 0.0;
    for i in 1..vertices.len() - 1 {
        let e1 = vertices[i] - origin;
        let e2 = vertices[i + 1] - origin;
        let a = 0.5 * cross(e1, e2);
        center += a * inv3 * (e1 + e2);
        area += a;
    }
    if area.abs() <= f32::EPSILON {
        return origin;
    }
    origin + center / area
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn box_mass_matches_closed_form() {
        let polygon = Polygon::make_box(1.0, 0.5);
        let mass = polygon.mass(2.0);
        assert_relative_eq!(mass.mass, 4.0, epsilon = 1e-5);
        assert!(mass.center.length() < 1e-5);
        // m (w^2 + h^2) / 12
        assert_relative_eq!(mass.inertia, 4.0 * (4.0 + 1.0) / 12.0, epsilon = 1e-4);
    }

    #[test]
    fn offset_box_moves_center_of_mass() {
        let polygon = Polygon::make_offset_box(0.5, 0.5, Vec2::new(2.0, 1.0), 0.3);
        let mass = polygon.mass(1.0);
        assert!((mass.center - Vec2::new(2.0, 1.0)).length() < 1e-4);
        assert_relative_eq!(mass.inertia, 1.0 * 2.0 / 12.0, epsilon = 1e-4);
    }

    #[test]
    fn clockwise_input_is_reordered() {
        let points = [
            Vec2::new(0.0, 0.0),
            Vec2::new(0.0, 1.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(1.0, 0.0),
        ];
        let polygon = Polygon::new(&points, 0.0).unwrap();
        assert!(polygon.validate().is_ok());
        assert!((polygon.centroid() - Vec2::splat(0.5)).length() < 1e-5);
    }

    #[test]
    fn collinear_points_are_rejected() {
        let points = [Vec2::ZERO, Vec2::new(1.0, 0.0), Vec2::new(2.0, 0.0)];
        assert!(Polygon::new(&points, 0.0).is_err());
    }

    #[test]
    fn non_convex_points_are_rejected() {
        let points = [
            Vec2::new(0.0, 0.0),
            Vec2::new(2.0, 0.0),
            Vec2::new(1.0, 0.3),
            Vec2::new(2.0, 2.0),
            Vec2::new(0.0, 2.0),
        ];
        assert!(Polygon::new(&points, 0.0).is_err());
    }

    #[test]
    fn zero_extent_box_fails_validation() {
        assert!(Polygon::make_box(1.0, 0.0).validate().is_err());
    }

    #[test]
    fn capsule_mass_reduces_to_disk_plus_rectangle() {
        let capsule = Capsule::new(Vec2::new(-1.0, 0.0), Vec2::new(1.0, 0.0), 0.5);
        let mass = capsule.mass(1.0);
        let expected = std::f32::consts::PI * 0.25 + 2.0;
        assert_relative_eq!(mass.mass, expected, epsilon = 1e-5);
        assert!(mass.inertia > 0.0);
    }

    #[test]
    fn ray_hits_circle_front_face() {
        let circle = Circle::new(Vec2::new(5.0, 0.0), 1.0);
        let input = RayCastInput {
            origin: Vec2::ZERO,
            translation: Vec2::new(10.0, 0.0),
            max_fraction: 1.0,
        };
        let hit = circle.ray_cast(&input).unwrap();
        assert_relative_eq!(hit.fraction, 0.4, epsilon = 1e-5);
        assert!((hit.normal - Vec2::NEG_X).length() < 1e-5);
    }

    #[test]
    fn ray_hits_box_face() {
        let polygon = Polygon::make_box(1.0, 1.0);
        let input = RayCastInput {
            origin: Vec2::new(-5.0, 0.2),
            translation: Vec2::new(10.0, 0.0),
            max_fraction: 1.0,
        };
        let hit = polygon.ray_cast(&input).unwrap();
        assert_relative_eq!(hit.point.x, -1.0, epsilon = 1e-5);
        assert!((hit.normal - Vec2::NEG_X).length() < 1e-5);
    }

    #[test]
    fn ray_hits_capsule_side() {
        let capsule = Capsule::new(Vec2::new(-1.0, 0.0), Vec2::new(1.0, 0.0), 0.5);
        let input = RayCastInput {
            origin: Vec2::new(0.0, 5.0),
            translation: Vec2::new(0.0, -10.0),
            max_fraction: 1.0,
        };
        let hit = capsule.ray_cast(&input).unwrap();
        assert_relative_eq!(hit.point.y, 0.5, epsilon = 1e-4);
        assert!((hit.normal - Vec2::Y).length() < 1e-4);
    }
}
