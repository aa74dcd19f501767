use std::cmp::Ordering;

use glam::Vec2;

use crate::{
    collision::{aabb::Aabb, broadphase::BroadPhase, shapes::RayCastInput},
    core::{collider::Collider, rigidbody::RigidBody},
    utils::allocator::{Arena, EntityId},
};

/// Result of a ray cast against colliders.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RaycastHit {
    pub body_id: EntityId,
    pub collider_id: EntityId,
    pub point: Vec2,
    pub normal: Vec2,
    pub distance: f32,
    /// Hit position as a fraction of `max_distance`.
    pub fraction: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RaycastQuery {
    pub origin: Vec2,
    pub direction: Vec2,
    pub max_distance: f32,
    /// Layer bits a collider must share to be reported.
    pub mask: u32,
    pub include_sensors: bool,
}

impl RaycastQuery {
    pub fn new(origin: Vec2, direction: Vec2, max_distance: f32) -> Self {
        Self {
            origin,
            direction: direction.normalize_or_zero(),
            max_distance,
            mask: u32::MAX,
            include_sensors: false,
        }
    }

    pub fn with_mask(mut self, mask: u32) -> Self {
        self.mask = mask;
        self
    }

    pub fn with_sensors(mut self, include: bool) -> Self {
        self.include_sensors = include;
        self
    }

    fn translation(&self) -> Vec2 {
        self.direction * self.max_distance
    }

    fn is_degenerate(&self) -> bool {
        !(self.origin.is_finite()
            && self.direction.is_finite()
            && self.max_distance.is_finite())
            || self.direction == Vec2::ZERO
            || self.max_distance <= 0.0
    }

    fn accepts(&self, collider: &Collider) -> bool {
        (collider.collision_filter.layer & self.mask) != 0
            && (self.include_sensors || !collider.is_sensor)
    }
}

pub struct Raycast;

impl Raycast {
    /// Every collider the ray crosses, nearest first.
    pub fn cast(
        query: &RaycastQuery,
        broad_phase: &BroadPhase,
        colliders: &Arena<Collider>,
        bodies: &Arena<RigidBody>,
    ) -> Vec<RaycastHit> {
        let mut hits = Vec::new();
        if query.is_degenerate() {
            return hits;
        }
        broad_phase.ray_cast(query.origin, query.translation(), 1.0, |_, collider_id, max| {
            if let Some(hit) = Self::test_collider(query, collider_id, max, colliders, bodies) {
                hits.push(hit);
            }
            max
        });
        hits.sort_by(|a, b| {
            a.fraction
                .partial_cmp(&b.fraction)
                .unwrap_or(Ordering::Equal)
                .then(a.collider_id.cmp(&b.collider_id))
        });
        hits
    }

    /// Nearest collider along the ray, clipping the tree walk as hits arrive.
    pub fn cast_closest(
        query: &RaycastQuery,
        broad_phase: &BroadPhase,
        colliders: &Arena<Collider>,
        bodies: &Arena<RigidBody>,
    ) -> Option<RaycastHit> {
        if query.is_degenerate() {
            return None;
        }
        let mut best: Option<RaycastHit> = None;
        broad_phase.ray_cast(query.origin, query.translation(), 1.0, |_, collider_id, max| {
            match Self::test_collider(query, collider_id, max, colliders, bodies) {
                Some(hit) => {
                    let closer = best.map_or(true, |current| {
                        hit.fraction < current.fraction
                            || (hit.fraction == current.fraction
                                && hit.collider_id < current.collider_id)
                    });
                    if closer {
                        best = Some(hit);
                    }
                    hit.fraction.max(f32::EPSILON)
                }
                None => max,
            }
        });
        best
    }

    /// Colliders whose tight bounds overlap `aabb`, in id order.
    pub fn query_aabb(aabb: &Aabb, broad_phase: &BroadPhase, colliders: &Arena<Collider>) -> Vec<EntityId> {
        let mut found = Vec::new();
        broad_phase.query(aabb, |_, collider_id| {
            if colliders
                .get(collider_id)
                .is_some_and(|collider| collider.aabb().overlaps(aabb))
            {
                found.push(collider_id);
            }
            true
        });
        found.sort_unstable();
        found
    }

    fn test_collider(
        query: &RaycastQuery,
        collider_id: EntityId,
        max_fraction: f32,
        colliders: &Arena<Collider>,
        bodies: &Arena<RigidBody>,
    ) -> Option<RaycastHit> {
        let collider = colliders.get(collider_id)?;
        if !query.accepts(collider) {
            return None;
        }
        let body = bodies.get(collider.body_id)?;
        let xf = body.transform;

        let input = RayCastInput {
            origin: xf.inv_transform_point(query.origin),
            translation: xf.rotation.inv_rotate(query.translation()),
            max_fraction,
        };
        let output = collider.shape.ray_cast(&input)?;
        Some(RaycastHit {
            body_id: collider.body_id,
            collider_id,
            point: xf.transform_point(output.point),
            normal: xf.rotation.rotate(output.normal),
            distance: output.fraction * query.max_distance,
            fraction: output.fraction,
        })
    }
}
