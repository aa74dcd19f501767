use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec2,
    pub max: Vec2,
}

impl Aabb {
    pub fn new(min: Vec2, max: Vec2) -> Self {
        Self { min, max }
    }

    pub fn from_center(center: Vec2, half_extents: Vec2) -> Self {
        Self {
            min: center - half_extents,
            max: center + half_extents,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.max.cmpge(self.min).all()
    }

    pub fn center(&self) -> Vec2 {
        0.5 * (self.min + self.max)
    }

    pub fn extents(&self) -> Vec2 {
        0.5 * (self.max - self.min)
    }

    /// Perimeter, the 2D surface-area heuristic cost.
    pub fn perimeter(&self) -> f32 {
        let d = self.max - self.min;
        2.0 * (d.x + d.y)
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn expanded(&self, margin: f32) -> Aabb {
        let m = Vec2::splat(margin);
        Aabb {
            min: self.min - m,
            max: self.max + m,
        }
    }

    pub fn contains(&self, other: &Aabb) -> bool {
        self.min.cmple(other.min).all() && other.max.cmple(self.max).all()
    }

    pub fn contains_point(&self, point: Vec2) -> bool {
        self.min.cmple(point).all() && point.cmple(self.max).all()
    }

    pub fn overlaps(&self, other: &Aabb) -> bool {
        !(other.min.x > self.max.x
            || other.min.y > self.max.y
            || self.min.x > other.max.x
            || self.min.y > other.max.y)
    }

    /// Slab test against the segment `p1 + t (p2 - p1)`, returning the entry fraction.
    pub fn ray_fraction(&self, p1: Vec2, p2: Vec2) -> Option<f32> {
        let d = p2 - p1;
        let mut t_min = 0.0_f32;
        let mut t_max = 1.0_f32;

        for axis in 0..2 {
            let (origin, dir, lo, hi) = (p1[axis], d[axis], self.min[axis], self.max[axis]);
            if dir.abs() < f32::EPSILON {
                if origin < lo || origin > hi {
                    return None;
                }
                continue;
            }
            let inv = 1.0 / dir;
            let mut t1 = (lo - origin) * inv;
            let mut t2 = (hi - origin) * inv;
            if t1 > t2 {
                std::mem::swap(&mut t1, &mut t2);
            }
            t_min = t_min.max(t1);
            t_max = t_max.min(t2);
            if t_min > t_max {
                return None;
            }
        }
        Some(t_min)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlap_and_containment() {
        let a = Aabb::new(Vec2::ZERO, Vec2::ONE);
        let b = Aabb::new(Vec2::splat(0.5), Vec2::splat(2.0));
        let c = Aabb::new(Vec2::splat(3.0), Vec2::splat(4.0));
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
        assert!(a.union(&b).contains(&a));
        assert!(a.expanded(0.1).contains(&a));
        assert!((a.perimeter() - 4.0).abs() < 1e-6);
    }

    #[test]
    fn slab_test_reports_entry() {
        let aabb = Aabb::new(Vec2::new(1.0, -1.0), Vec2::new(2.0, 1.0));
        let t = aabb.ray_fraction(Vec2::ZERO, Vec2::new(4.0, 0.0)).unwrap();
        assert!((t - 0.25).abs() < 1e-6);
        assert!(aabb.ray_fraction(Vec2::ZERO, Vec2::new(0.0, 4.0)).is_none());
    }
}
