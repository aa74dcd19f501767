//! Contact manifolds between convex primitives.
//!
//! Every routine works in the frame of shape A and reports at most two points.
//! Points are kept while their separation is below [`SPECULATIVE_DISTANCE`]
//! so the solver can stop approaching bodies before they overlap.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::{
    collision::{
        clipping::{clip_segment_to_plane, ClipPlane, ClipVertex},
        distance::segment_distance,
        shapes::{Circle, Polygon},
    },
    config::{LINEAR_SLOP, SPECULATIVE_DISTANCE},
    core::types::Transform,
    utils::math::left_perp,
};

/// Topological feature of one shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Feature {
    Vertex(u8),
    Face(u8),
}

/// Which features of shape A and shape B produced a manifold point.
///
/// Stable while the same vertex/face pair stays in contact, which is what
/// lets accumulated impulses carry over between steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FeatureId {
    pub a: Feature,
    pub b: Feature,
}

impl FeatureId {
    pub fn new(a: Feature, b: Feature) -> Self {
        Self { a, b }
    }

    pub fn flipped(self) -> Self {
        Self {
            a: self.b,
            b: self.a,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ManifoldPoint {
    /// World position midway between the two surfaces.
    pub point: Vec2,
    /// Contact location in body A's frame.
    pub local_anchor_a: Vec2,
    /// Contact location in body B's frame.
    pub local_anchor_b: Vec2,
    /// Negative when overlapping.
    pub separation: f32,
    pub id: FeatureId,
    pub normal_impulse: f32,
    pub tangent_impulse: f32,
    /// Largest normal impulse applied during the last solve.
    pub max_normal_impulse: f32,
    /// Relative normal velocity captured before the solve, used by restitution.
    pub relative_velocity: f32,
    /// Matched a point from the previous step.
    pub persisted: bool,
}

impl ManifoldPoint {
    fn new(point: Vec2, local_anchor_a: Vec2, local_anchor_b: Vec2, separation: f32, id: FeatureId) -> Self {
        Self {
            point,
            local_anchor_a,
            local_anchor_b,
            separation,
            id,
            normal_impulse: 0.0,
            tangent_impulse: 0.0,
            max_normal_impulse: 0.0,
            relative_velocity: 0.0,
            persisted: false,
        }
    }
}

impl Default for ManifoldPoint {
    fn default() -> Self {
        Self::new(
            Vec2::ZERO,
            Vec2::ZERO,
            Vec2::ZERO,
            0.0,
            FeatureId::new(Feature::Vertex(0), Feature::Vertex(0)),
        )
    }
}

/// Up to two contact points sharing a world-space normal pointing from A to B.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Manifold {
    pub normal: Vec2,
    pub points: [ManifoldPoint; 2],
    pub point_count: usize,
}

impl Manifold {
    pub fn points(&self) -> &[ManifoldPoint] {
        &self.points[..self.point_count]
    }

    pub fn points_mut(&mut self) -> &mut [ManifoldPoint] {
        &mut self.points[..self.point_count]
    }

    pub fn is_empty(&self) -> bool {
        self.point_count == 0
    }

    /// Deepest (most negative) separation, or `f32::MAX` without points.
    pub fn min_separation(&self) -> f32 {
        self.points()
            .iter()
            .map(|p| p.separation)
            .fold(f32::MAX, f32::min)
    }

    /// Swaps the roles of A and B.
    pub fn flipped(mut self) -> Self {
        self.normal = -self.normal;
        for point in self.points_mut() {
            std::mem::swap(&mut point.local_anchor_a, &mut point.local_anchor_b);
            point.id = point.id.flipped();
        }
        self
    }

    fn push(&mut self, point: ManifoldPoint) {
        if self.point_count < 2 {
            self.points[self.point_count] = point;
            self.point_count += 1;
        }
    }
}

/// Local-frame contact candidate, turned into a [`ManifoldPoint`] by [`finish`].
struct LocalPoint {
    point: Vec2,
    separation: f32,
    id: FeatureId,
}

fn finish(local_normal: Vec2, points: &[LocalPoint], xf_a: &Transform, xf_b: &Transform) -> Manifold {
    let mut manifold = Manifold {
        normal: xf_a.rotation.rotate(local_normal),
        ..Manifold::default()
    };
    for candidate in points {
        if candidate.separation > SPECULATIVE_DISTANCE {
            continue;
        }
        let world = xf_a.transform_point(candidate.point);
        manifold.push(ManifoldPoint::new(
            world,
            candidate.point,
            xf_b.inv_transform_point(world),
            candidate.separation,
            candidate.id,
        ));
    }
    manifold
}

fn next_index(index: usize, count: usize) -> usize {
    if index + 1 < count {
        index + 1
    } else {
        0
    }
}

/// Circle against circle. Coincident centers push apart along A's x axis.
pub fn collide_circles(circle_a: &Circle, xf_a: &Transform, circle_b: &Circle, xf_b: &Transform) -> Manifold {
    let xf = xf_a.inv_combine(xf_b);
    let p_a = circle_a.center;
    let p_b = xf.transform_point(circle_b.center);

    let offset = p_b - p_a;
    let distance = offset.length();
    let normal = if distance > f32::EPSILON {
        offset / distance
    } else {
        Vec2::X
    };

    let separation = distance - circle_a.radius - circle_b.radius;
    if separation > SPECULATIVE_DISTANCE {
        return Manifold::default();
    }

    let c_a = p_a + circle_a.radius * normal;
    let c_b = p_b - circle_b.radius * normal;
    let id = FeatureId::new(Feature::Vertex(0), Feature::Vertex(0));
    finish(
        normal,
        &[LocalPoint {
            point: c_a.lerp(c_b, 0.5),
            separation,
            id,
        }],
        xf_a,
        xf_b,
    )
}

/// Rounded polygon (including capsules and segments) against a circle.
pub fn collide_polygon_circle(polygon_a: &Polygon, xf_a: &Transform, circle_b: &Circle, xf_b: &Transform) -> Manifold {
    let xf = xf_a.inv_combine(xf_b);
    let c = xf.transform_point(circle_b.center);
    let radius_a = polygon_a.radius();
    let radius_b = circle_b.radius;
    let radius = radius_a + radius_b;

    let vertices = polygon_a.vertices();
    let normals = polygon_a.normals();
    let count = polygon_a.count();

    // Face of least penetration.
    let mut normal_index = 0;
    let mut separation = f32::MIN;
    for i in 0..count {
        let s = normals[i].dot(c - vertices[i]);
        if s > separation {
            separation = s;
            normal_index = i;
        }
    }

    if separation - radius > SPECULATIVE_DISTANCE {
        return Manifold::default();
    }

    let i1 = normal_index;
    let i2 = next_index(i1, count);
    let v1 = vertices[i1];
    let v2 = vertices[i2];

    let u1 = (c - v1).dot(v2 - v1);
    let u2 = (c - v2).dot(v1 - v2);

    let vertex_region = if u1 < 0.0 && separation > f32::EPSILON {
        Some((v1, i1))
    } else if u2 < 0.0 && separation > f32::EPSILON {
        Some((v2, i2))
    } else {
        None
    };

    let circle_feature = Feature::Vertex(0);
    let (normal, candidate) = match vertex_region {
        Some((vertex, index)) => {
            let offset = c - vertex;
            let distance = offset.length();
            if distance <= f32::EPSILON {
                return Manifold::default();
            }
            let normal = offset / distance;
            let c_a = vertex + radius_a * normal;
            let c_b = c - radius_b * normal;
            (
                normal,
                LocalPoint {
                    point: c_a.lerp(c_b, 0.5),
                    separation: (c_b - c_a).dot(normal),
                    id: FeatureId::new(Feature::Vertex(index as u8), circle_feature),
                },
            )
        }
        None => {
            let normal = normals[normal_index];
            let c_a = c - ((c - v1).dot(normal) - radius_a) * normal;
            let c_b = c - radius_b * normal;
            (
                normal,
                LocalPoint {
                    point: c_a.lerp(c_b, 0.5),
                    separation: (c_b - c_a).dot(normal),
                    id: FeatureId::new(Feature::Face(normal_index as u8), circle_feature),
                },
            )
        }
    };

    finish(normal, &[candidate], xf_a, xf_b)
}

/// Largest separation of `poly2` along the face normals of `poly1`.
fn find_max_separation(poly1: &Polygon, poly2: &Polygon) -> (usize, f32) {
    let mut best_index = 0;
    let mut max_separation = f32::MIN;
    for (i, (n, v1)) in poly1.normals().iter().zip(poly1.vertices()).enumerate() {
        let si = poly2
            .vertices()
            .iter()
            .map(|v2| n.dot(*v2 - *v1))
            .fold(f32::MAX, f32::min);
        if si > max_separation {
            max_separation = si;
            best_index = i;
        }
    }
    (best_index, max_separation)
}

/// Edge of `polygon` most anti-parallel to `direction`.
fn find_incident_edge(polygon: &Polygon, direction: Vec2) -> usize {
    let mut index = 0;
    let mut min_dot = f32::MAX;
    for (i, normal) in polygon.normals().iter().enumerate() {
        let dot = direction.dot(*normal);
        if dot < min_dot {
            min_dot = dot;
            index = i;
        }
    }
    index
}

/// Polygon against polygon via SAT and reference-face clipping.
///
/// Reference-face tie-break: B only becomes the reference when its separation
/// beats A's by `0.1 * LINEAR_SLOP`, otherwise A. The bias keeps the choice
/// from flickering between frames for nearly parallel faces.
pub fn collide_polygons(polygon_a: &Polygon, xf_a: &Transform, polygon_b: &Polygon, xf_b: &Transform) -> Manifold {
    let xf = xf_a.inv_combine(xf_b);
    let local_a = *polygon_a;
    let local_b = polygon_b.transformed(&xf);

    let (edge_a, separation_a) = find_max_separation(&local_a, &local_b);
    let (edge_b, separation_b) = find_max_separation(&local_b, &local_a);

    let radius = local_a.radius() + local_b.radius();
    if separation_a > SPECULATIVE_DISTANCE + radius || separation_b > SPECULATIVE_DISTANCE + radius {
        return Manifold::default();
    }

    let (flip, edge_a, edge_b) = if separation_b > separation_a + 0.1 * LINEAR_SLOP {
        let incident = find_incident_edge(&local_a, local_b.normals()[edge_b]);
        (true, incident, edge_b)
    } else {
        let incident = find_incident_edge(&local_b, local_a.normals()[edge_a]);
        (false, edge_a, incident)
    };

    // Separated rounded shapes can touch vertex to vertex, where no face
    // normal is a good contact normal.
    let separation = separation_a.max(separation_b);
    if separation > 0.1 * LINEAR_SLOP {
        let i11 = edge_a;
        let i12 = next_index(edge_a, local_a.count());
        let i21 = edge_b;
        let i22 = next_index(edge_b, local_b.count());
        let v11 = local_a.vertices()[i11];
        let v12 = local_a.vertices()[i12];
        let v21 = local_b.vertices()[i21];
        let v22 = local_b.vertices()[i22];

        let result = segment_distance(v11, v12, v21, v22);
        let corner = match (result.fraction1, result.fraction2) {
            (f1, f2) if f1 == 0.0 && f2 == 0.0 => Some((v11, i11, v21, i21)),
            (f1, f2) if f1 == 0.0 && f2 == 1.0 => Some((v11, i11, v22, i22)),
            (f1, f2) if f1 == 1.0 && f2 == 0.0 => Some((v12, i12, v21, i21)),
            (f1, f2) if f1 == 1.0 && f2 == 1.0 => Some((v12, i12, v22, i22)),
            _ => None,
        };

        if let Some((v_a, index_a, v_b, index_b)) = corner {
            let distance = result.distance_squared.sqrt();
            if distance > SPECULATIVE_DISTANCE + radius || distance <= f32::EPSILON {
                return Manifold::default();
            }
            let normal = (v_b - v_a) / distance;
            let c_a = v_a + local_a.radius() * normal;
            let c_b = v_b - local_b.radius() * normal;
            return finish(
                normal,
                &[LocalPoint {
                    point: c_a.lerp(c_b, 0.5),
                    separation: distance - radius,
                    id: FeatureId::new(Feature::Vertex(index_a as u8), Feature::Vertex(index_b as u8)),
                }],
                xf_a,
                xf_b,
            );
        }
    }

    clip_polygons(&local_a, &local_b, edge_a, edge_b, flip, xf_a, xf_b)
}

/// Clips the incident edge against the reference face's side planes.
fn clip_polygons(
    poly_a: &Polygon,
    poly_b: &Polygon,
    edge_a: usize,
    edge_b: usize,
    flip: bool,
    xf_a: &Transform,
    xf_b: &Transform,
) -> Manifold {
    let (poly1, poly2, i11, i21) = if flip {
        (poly_b, poly_a, edge_b, edge_a)
    } else {
        (poly_a, poly_b, edge_a, edge_b)
    };
    let i12 = next_index(i11, poly1.count());
    let i22 = next_index(i21, poly2.count());

    let normal = poly1.normals()[i11];
    let v11 = poly1.vertices()[i11];
    let v12 = poly1.vertices()[i12];
    let v21 = poly2.vertices()[i21];
    let v22 = poly2.vertices()[i22];
    let r1 = poly1.radius();
    let r2 = poly2.radius();
    let radius = r1 + r2;

    let face = Feature::Face(i11 as u8);
    let incident = [
        ClipVertex {
            v: v21,
            id: FeatureId::new(face, Feature::Vertex(i21 as u8)),
        },
        ClipVertex {
            v: v22,
            id: FeatureId::new(face, Feature::Vertex(i22 as u8)),
        },
    ];

    let tangent = left_perp(normal);
    let incident_face = Feature::Face(i21 as u8);
    let (clip1, count1) = clip_segment_to_plane(
        &incident,
        ClipPlane::through(v11, -tangent),
        FeatureId::new(Feature::Vertex(i11 as u8), incident_face),
    );

    let clipped = if count1 == 2 {
        let (clip2, count2) = clip_segment_to_plane(
            &clip1,
            ClipPlane::through(v12, tangent),
            FeatureId::new(Feature::Vertex(i12 as u8), incident_face),
        );
        (count2 == 2).then_some(clip2)
    } else {
        None
    };

    // Ambiguous clip (parallel or sliver edges): keep the deepest incident vertex.
    let clipped: Vec<ClipVertex> = match clipped {
        Some(points) => points.to_vec(),
        None => {
            let deepest = incident
                .iter()
                .min_by(|a, b| normal.dot(a.v - v11).total_cmp(&normal.dot(b.v - v11)))
                .copied();
            deepest.into_iter().collect()
        }
    };

    let points: Vec<LocalPoint> = clipped
        .iter()
        .map(|cv| {
            let s = normal.dot(cv.v - v11);
            LocalPoint {
                point: cv.v + 0.5 * (r1 - r2 - s) * normal,
                separation: s - radius,
                id: if flip { cv.id.flipped() } else { cv.id },
            }
        })
        .collect();

    let local_normal = if flip { -normal } else { normal };
    finish(local_normal, &points, xf_a, xf_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::shapes::Capsule;
    use approx::assert_relative_eq;

    #[test]
    fn overlapping_circles_produce_one_point() {
        let a = Circle::new(Vec2::ZERO, 1.0);
        let b = Circle::new(Vec2::ZERO, 1.0);
        let manifold = collide_circles(
            &a,
            &Transform::IDENTITY,
            &b,
            &Transform::new(Vec2::new(1.5, 0.0), 0.0),
        );
        assert_eq!(manifold.point_count, 1);
        assert!((manifold.normal - Vec2::X).length() < 1e-6);
        assert_relative_eq!(manifold.points[0].separation, -0.5, epsilon = 1e-6);
        assert_relative_eq!(manifold.points[0].point.x, 0.75, epsilon = 1e-6);
    }

    #[test]
    fn coincident_circles_fall_back_to_x_axis() {
        let a = Circle::new(Vec2::ZERO, 0.5);
        let manifold = collide_circles(&a, &Transform::IDENTITY, &a, &Transform::IDENTITY);
        assert_eq!(manifold.point_count, 1);
        assert_eq!(manifold.normal, Vec2::X);
        assert!(manifold.points[0].separation.is_finite());
    }

    #[test]
    fn distant_circles_produce_nothing() {
        let a = Circle::new(Vec2::ZERO, 0.5);
        let manifold = collide_circles(
            &a,
            &Transform::IDENTITY,
            &a,
            &Transform::new(Vec2::new(2.0, 0.0), 0.0),
        );
        assert!(manifold.is_empty());
    }

    #[test]
    fn circle_resting_on_box_face() {
        let ground = Polygon::make_box(5.0, 0.5);
        let ball = Circle::new(Vec2::ZERO, 0.5);
        let manifold = collide_polygon_circle(
            &ground,
            &Transform::IDENTITY,
            &ball,
            &Transform::new(Vec2::new(1.0, 0.99), 0.0),
        );
        assert_eq!(manifold.point_count, 1);
        assert!((manifold.normal - Vec2::Y).length() < 1e-6);
        assert_relative_eq!(manifold.points[0].separation, -0.01, epsilon = 1e-5);
        assert!(matches!(manifold.points[0].id.a, Feature::Face(2)));
    }

    #[test]
    fn circle_near_box_corner_uses_vertex_region() {
        let block = Polygon::make_box(0.5, 0.5);
        let ball = Circle::new(Vec2::ZERO, 0.5);
        let manifold = collide_polygon_circle(
            &block,
            &Transform::IDENTITY,
            &ball,
            &Transform::new(Vec2::new(0.8, 0.8), 0.0),
        );
        assert_eq!(manifold.point_count, 1);
        let expected = Vec2::new(1.0, 1.0).normalize();
        assert!((manifold.normal - expected).length() < 1e-5);
        assert!(matches!(manifold.points[0].id.a, Feature::Vertex(_)));
    }

    #[test]
    fn stacked_boxes_produce_two_points() {
        let lower = Polygon::make_box(1.0, 0.5);
        let upper = Polygon::make_box(0.5, 0.5);
        let manifold = collide_polygons(
            &lower,
            &Transform::IDENTITY,
            &upper,
            &Transform::new(Vec2::new(0.2, 0.98), 0.0),
        );
        assert_eq!(manifold.point_count, 2);
        assert!((manifold.normal - Vec2::Y).length() < 1e-5);
        for point in manifold.points() {
            assert_relative_eq!(point.separation, -0.02, epsilon = 1e-4);
        }
        assert_ne!(manifold.points[0].id, manifold.points[1].id);
    }

    #[test]
    fn feature_ids_survive_small_motion() {
        let lower = Polygon::make_box(1.0, 0.5);
        let upper = Polygon::make_box(0.5, 0.5);
        let first = collide_polygons(
            &lower,
            &Transform::IDENTITY,
            &upper,
            &Transform::new(Vec2::new(0.2, 0.98), 0.0),
        );
        let second = collide_polygons(
            &lower,
            &Transform::IDENTITY,
            &upper,
            &Transform::new(Vec2::new(0.21, 0.985), 0.01),
        );
        let mut ids_first: Vec<_> = first.points().iter().map(|p| p.id).collect();
        let mut ids_second: Vec<_> = second.points().iter().map(|p| p.id).collect();
        ids_first.sort();
        ids_second.sort();
        assert_eq!(ids_first, ids_second);
    }

    #[test]
    fn overhanging_box_is_clipped_to_reference_face() {
        let lower = Polygon::make_box(0.5, 0.5);
        let upper = Polygon::make_box(0.5, 0.5);
        let manifold = collide_polygons(
            &lower,
            &Transform::IDENTITY,
            &upper,
            &Transform::new(Vec2::new(0.7, 0.99), 0.0),
        );
        assert_eq!(manifold.point_count, 2);
        for point in manifold.points() {
            assert!(point.point.x >= 0.2 - 1e-4 && point.point.x <= 0.5 + 1e-4);
        }
    }

    #[test]
    fn separated_boxes_within_margin_are_speculative() {
        let lower = Polygon::make_box(1.0, 0.5);
        let upper = Polygon::make_box(0.5, 0.5);
        let manifold = collide_polygons(
            &lower,
            &Transform::IDENTITY,
            &upper,
            &Transform::new(Vec2::new(0.0, 1.0 + 0.5 * SPECULATIVE_DISTANCE), 0.0),
        );
        assert_eq!(manifold.point_count, 2);
        assert!(manifold.points().iter().all(|p| p.separation > 0.0));

        let far = collide_polygons(
            &lower,
            &Transform::IDENTITY,
            &upper,
            &Transform::new(Vec2::new(0.0, 1.5), 0.0),
        );
        assert!(far.is_empty());
    }

    #[test]
    fn capsule_on_box_contacts_along_flat_side() {
        let ground = Polygon::make_box(5.0, 0.5);
        let capsule = Capsule::new(Vec2::new(-0.5, 0.0), Vec2::new(0.5, 0.0), 0.25).to_polygon();
        let manifold = collide_polygons(
            &ground,
            &Transform::IDENTITY,
            &capsule,
            &Transform::new(Vec2::new(0.0, 0.74), 0.0),
        );
        assert_eq!(manifold.point_count, 2);
        assert!((manifold.normal - Vec2::Y).length() < 1e-5);
        for point in manifold.points() {
            assert_relative_eq!(point.separation, -0.01, epsilon = 1e-4);
        }
    }

    #[test]
    fn rounded_corners_meet_vertex_to_vertex() {
        let a = Polygon::make_rounded_box(0.5, 0.5, 0.1);
        let b = Polygon::make_rounded_box(0.5, 0.5, 0.1);
        // Diagonal placement so the nearest features are two corners.
        let manifold = collide_polygons(
            &a,
            &Transform::IDENTITY,
            &b,
            &Transform::new(Vec2::new(1.14, 1.14), 0.0),
        );
        assert_eq!(manifold.point_count, 1);
        let expected = Vec2::new(1.0, 1.0).normalize();
        assert!((manifold.normal - expected).length() < 1e-4);
        assert!(matches!(manifold.points[0].id.a, Feature::Vertex(_)));
    }

    #[test]
    fn flipped_manifold_swaps_roles() {
        let a = Circle::new(Vec2::ZERO, 1.0);
        let manifold = collide_circles(
            &a,
            &Transform::IDENTITY,
            &a,
            &Transform::new(Vec2::new(1.5, 0.0), 0.0),
        );
        let flipped = manifold.flipped();
        assert_eq!(flipped.normal, -manifold.normal);
        assert_eq!(flipped.points[0].local_anchor_a, manifold.points[0].local_anchor_b);
    }
}
