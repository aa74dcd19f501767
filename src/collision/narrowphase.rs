use crate::{
    collision::manifold::{collide_circles, collide_polygon_circle, collide_polygons, Manifold},
    core::{collider::ColliderShape, types::Transform},
};

/// Shape-pair dispatcher for manifold generation.
pub struct NarrowPhase;

impl NarrowPhase {
    /// Builds the manifold for `shape_a` at `xf_a` against `shape_b` at `xf_b`.
    ///
    /// The normal always points from A to B regardless of which primitive
    /// routine handled the pair.
    pub fn collide(
        shape_a: &ColliderShape,
        xf_a: &Transform,
        shape_b: &ColliderShape,
        xf_b: &Transform,
    ) -> Manifold {
        match (shape_a, shape_b) {
            (ColliderShape::Circle(a), ColliderShape::Circle(b)) => collide_circles(a, xf_a, b, xf_b),
            (ColliderShape::Circle(_), _) => Self::collide(shape_b, xf_b, shape_a, xf_a).flipped(),
            (_, ColliderShape::Circle(b)) => match shape_a.as_polygon() {
                Some(polygon) => collide_polygon_circle(&polygon, xf_a, b, xf_b),
                None => Manifold::default(),
            },
            _ => match (shape_a.as_polygon(), shape_b.as_polygon()) {
                (Some(a), Some(b)) => collide_polygons(&a, xf_a, &b, xf_b),
                _ => Manifold::default(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::shapes::{Capsule, Circle, Polygon, Segment};
    use glam::Vec2;

    fn circle(radius: f32) -> ColliderShape {
        ColliderShape::Circle(Circle::new(Vec2::ZERO, radius))
    }

    #[test]
    fn circle_first_pair_is_flipped_back() {
        let ball = circle(0.5);
        let block = ColliderShape::Polygon(Polygon::make_box(0.5, 0.5));
        let manifold = NarrowPhase::collide(
            &ball,
            &Transform::new(Vec2::new(0.0, 0.95), 0.0),
            &block,
            &Transform::IDENTITY,
        );
        assert_eq!(manifold.point_count, 1);
        // From the ball (above) toward the block (below).
        assert!((manifold.normal - Vec2::NEG_Y).length() < 1e-5);
        let depth = manifold.points[0].separation;
        assert!(depth < 0.0 && depth > -0.1, "depth was {}", depth);
    }

    #[test]
    fn capsule_against_segment_touches() {
        let ground = ColliderShape::Segment(Segment::new(Vec2::new(-5.0, 0.0), Vec2::new(5.0, 0.0)));
        let capsule = ColliderShape::Capsule(Capsule::new(
            Vec2::new(-0.5, 0.0),
            Vec2::new(0.5, 0.0),
            0.25,
        ));
        let manifold = NarrowPhase::collide(
            &ground,
            &Transform::IDENTITY,
            &capsule,
            &Transform::new(Vec2::new(0.0, 0.24), 0.0),
        );
        assert_eq!(manifold.point_count, 2);
        for point in manifold.points() {
            assert!((point.separation + 0.01).abs() < 1e-4);
        }
    }

    #[test]
    fn thin_box_does_not_crash() {
        let sliver = ColliderShape::Polygon(Polygon::make_box(2.0, 0.001));
        let block = ColliderShape::Polygon(Polygon::make_box(0.5, 0.5));
        let manifold = NarrowPhase::collide(
            &sliver,
            &Transform::IDENTITY,
            &block,
            &Transform::new(Vec2::new(0.3, 0.2), 0.7),
        );
        assert!(manifold.point_count <= 2);
        for point in manifold.points() {
            assert!(point.separation.is_finite());
            assert!(point.point.is_finite());
        }
    }
}
