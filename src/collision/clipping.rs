//! Sutherland–Hodgman clipping of an incident edge against reference side planes.

use glam::Vec2;

use crate::collision::manifold::FeatureId;

/// Edge endpoint carrying the feature pair that produced it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipVertex {
    pub v: Vec2,
    pub id: FeatureId,
}

/// Half-plane `dot(normal, p) <= offset`.
#[derive(Debug, Clone, Copy)]
pub struct ClipPlane {
    pub normal: Vec2,
    pub offset: f32,
}

impl ClipPlane {
    /// Plane through `point` keeping the side opposite `normal`.
    pub fn through(point: Vec2, normal: Vec2) -> Self {
        Self {
            normal,
            offset: normal.dot(point),
        }
    }

    fn signed_distance(&self, point: Vec2) -> f32 {
        self.normal.dot(point) - self.offset
    }
}

/// Clips a two-point segment against `plane`.
///
/// Returns the surviving points. A point created at the crossing takes
/// `crossing_id`, so the feature pair tracks which side plane cut it.
pub fn clip_segment_to_plane(
    input: &[ClipVertex; 2],
    plane: ClipPlane,
    crossing_id: FeatureId,
) -> ([ClipVertex; 2], usize) {
    let mut output = *input;
    let mut count = 0;

    let d0 = plane.signed_distance(input[0].v);
    let d1 = plane.signed_distance(input[1].v);

    if d0 <= 0.0 {
        output[count] = input[0];
        count += 1;
    }
    if d1 <= 0.0 {
        output[count] = input[1];
        count += 1;
    }

    // Endpoints on opposite sides: keep the crossing point.
    if d0 * d1 < 0.0 && count < 2 {
        let t = d0 / (d0 - d1);
        output[count] = ClipVertex {
            v: input[0].v + t * (input[1].v - input[0].v),
            id: crossing_id,
        };
        count += 1;
    }

    (output, count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::manifold::Feature;

    fn id(a: u8, b: u8) -> FeatureId {
        FeatureId::new(Feature::Face(a), Feature::Vertex(b))
    }

    #[test]
    fn segment_crossing_plane_is_cut() {
        let input = [
            ClipVertex {
                v: Vec2::new(-1.0, 0.0),
                id: id(0, 0),
            },
            ClipVertex {
                v: Vec2::new(1.0, 0.0),
                id: id(0, 1),
            },
        ];
        let plane = ClipPlane::through(Vec2::new(0.5, 0.0), Vec2::X);
        let crossing = FeatureId::new(Feature::Vertex(1), Feature::Face(0));
        let (out, count) = clip_segment_to_plane(&input, plane, crossing);
        assert_eq!(count, 2);
        assert_eq!(out[0].id, id(0, 0));
        assert!((out[1].v.x - 0.5).abs() < 1e-6);
        assert_eq!(out[1].id, crossing);
    }

    #[test]
    fn segment_outside_plane_is_dropped() {
        let input = [
            ClipVertex {
                v: Vec2::new(2.0, 0.0),
                id: id(0, 0),
            },
            ClipVertex {
                v: Vec2::new(3.0, 0.0),
                id: id(0, 1),
            },
        ];
        let plane = ClipPlane::through(Vec2::ZERO, Vec2::X);
        let (_, count) = clip_segment_to_plane(&input, plane, id(1, 1));
        assert_eq!(count, 0);
    }
}
