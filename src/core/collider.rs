use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::types::{MassProperties, Material, Transform};
use crate::{
    collision::{
        aabb::Aabb,
        broadphase::ProxyId,
        distance::ShapeProxy,
        shapes::{Capsule, Circle, Polygon, RayCastInput, RayCastOutput, Segment},
    },
    error::{PhysicsError, PhysicsResult},
    utils::allocator::EntityId,
};

/// Enumeration of supported collider geometries, in body-local coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ColliderShape {
    Circle(Circle),
    Capsule(Capsule),
    Segment(Segment),
    Polygon(Polygon),
}

impl ColliderShape {
    pub fn validate(&self) -> PhysicsResult<()> {
        match self {
            ColliderShape::Circle(circle) => circle.validate(),
            ColliderShape::Capsule(capsule) => capsule.validate(),
            ColliderShape::Segment(segment) => segment.validate(),
            ColliderShape::Polygon(polygon) => polygon.validate(),
        }
    }

    pub fn mass_properties(&self, density: f32) -> MassProperties {
        match self {
            ColliderShape::Circle(circle) => circle.mass(density),
            ColliderShape::Capsule(capsule) => capsule.mass(density),
            ColliderShape::Segment(segment) => MassProperties {
                mass: 0.0,
                center: segment.point1.lerp(segment.point2, 0.5),
                inertia: 0.0,
            },
            ColliderShape::Polygon(polygon) => polygon.mass(density),
        }
    }

    pub fn compute_aabb(&self, xf: &Transform) -> Aabb {
        match self {
            ColliderShape::Circle(circle) => circle.aabb(xf),
            ColliderShape::Capsule(capsule) => capsule.aabb(xf),
            ColliderShape::Segment(segment) => segment.aabb(xf),
            ColliderShape::Polygon(polygon) => polygon.aabb(xf),
        }
    }

    /// Ray cast in the body frame.
    pub fn ray_cast(&self, input: &RayCastInput) -> Option<RayCastOutput> {
        match self {
            ColliderShape::Circle(circle) => circle.ray_cast(input),
            ColliderShape::Capsule(capsule) => capsule.ray_cast(input),
            ColliderShape::Segment(segment) => segment.ray_cast(input),
            ColliderShape::Polygon(polygon) => polygon.ray_cast(input),
        }
    }

    pub fn proxy(&self) -> ShapeProxy {
        match self {
            ColliderShape::Circle(circle) => ShapeProxy::new(&[circle.center], circle.radius),
            ColliderShape::Capsule(capsule) => {
                ShapeProxy::new(&[capsule.center1, capsule.center2], capsule.radius)
            }
            ColliderShape::Segment(segment) => {
                ShapeProxy::new(&[segment.point1, segment.point2], 0.0)
            }
            ColliderShape::Polygon(polygon) => {
                ShapeProxy::new(polygon.vertices(), polygon.radius())
            }
        }
    }

    /// Rounded-polygon view used by the polygon manifold routines.
    pub fn as_polygon(&self) -> Option<Polygon> {
        match self {
            ColliderShape::Circle(_) => None,
            ColliderShape::Capsule(capsule) => Some(capsule.to_polygon()),
            ColliderShape::Segment(segment) => Some(segment.to_polygon()),
            ColliderShape::Polygon(polygon) => Some(*polygon),
        }
    }

    pub fn centroid(&self) -> Vec2 {
        match self {
            ColliderShape::Circle(circle) => circle.center,
            ColliderShape::Capsule(capsule) => capsule.center1.lerp(capsule.center2, 0.5),
            ColliderShape::Segment(segment) => segment.point1.lerp(segment.point2, 0.5),
            ColliderShape::Polygon(polygon) => polygon.centroid(),
        }
    }

    /// Smallest distance from the centroid to the surface, used to decide
    /// whether a body moves fast enough to need continuous collision.
    pub fn min_extent(&self) -> f32 {
        match self {
            ColliderShape::Circle(circle) => circle.radius,
            ColliderShape::Capsule(capsule) => capsule.radius,
            ColliderShape::Segment(_) => 0.0,
            ColliderShape::Polygon(polygon) => {
                let centroid = polygon.centroid();
                polygon
                    .vertices()
                    .iter()
                    .zip(polygon.normals())
                    .map(|(v, n)| n.dot(*v - centroid))
                    .fold(f32::MAX, f32::min)
                    + polygon.radius()
            }
        }
    }

    /// Ordering used to pick which shape plays the `A` role in a contact.
    pub(crate) fn rank(&self) -> u8 {
        match self {
            ColliderShape::Circle(_) => 0,
            ColliderShape::Capsule(_) => 1,
            ColliderShape::Segment(_) => 2,
            ColliderShape::Polygon(_) => 3,
        }
    }
}

/// Category/mask filtering with an optional group override.
///
/// Shapes sharing a non-zero group always collide when the group is positive
/// and never collide when it is negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollisionFilter {
    pub layer: u32,
    pub mask: u32,
    pub group: i32,
}

impl Default for CollisionFilter {
    fn default() -> Self {
        Self {
            layer: 1,
            mask: u32::MAX,
            group: 0,
        }
    }
}

impl CollisionFilter {
    pub fn should_collide(&self, other: &CollisionFilter) -> bool {
        if self.group == other.group && self.group != 0 {
            return self.group > 0;
        }
        (self.mask & other.layer) != 0 && (other.mask & self.layer) != 0
    }
}

/// Collider attached to exactly one rigid body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collider {
    pub id: EntityId,
    pub body_id: EntityId,
    pub shape: ColliderShape,
    pub material: Material,
    pub collision_filter: CollisionFilter,
    pub is_sensor: bool,
    /// Emit begin/end events for this collider's contacts.
    pub enable_contact_events: bool,
    #[serde(skip)]
    pub(crate) proxy: Option<ProxyId>,
    #[serde(skip)]
    pub(crate) aabb: Aabb,
}

impl Default for Collider {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Collider {
    pub fn builder() -> ColliderBuilder {
        ColliderBuilder::new()
    }

    pub fn validate(&self) -> PhysicsResult<()> {
        self.shape.validate()?;
        self.material.validate()?;
        if self.is_sensor && matches!(self.shape, ColliderShape::Segment(_)) {
            return Err(PhysicsError::InvalidGeometry(
                "segments cannot be sensors".into(),
            ));
        }
        Ok(())
    }

    pub fn mass_properties(&self) -> MassProperties {
        self.shape.mass_properties(self.material.density)
    }

    /// Tight bounds computed during the last broad-phase update.
    pub fn aabb(&self) -> Aabb {
        self.aabb
    }

    pub fn proxy_id(&self) -> Option<ProxyId> {
        self.proxy
    }
}

pub struct ColliderBuilder {
    shape: ColliderShape,
    material: Material,
    filter: CollisionFilter,
    is_sensor: bool,
    enable_contact_events: bool,
}

impl Default for ColliderBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ColliderBuilder {
    pub fn new() -> Self {
        Self {
            shape: ColliderShape::Circle(Circle::new(Vec2::ZERO, 0.5)),
            material: Material::default(),
            filter: CollisionFilter::default(),
            is_sensor: false,
            enable_contact_events: true,
        }
    }

    pub fn circle(mut self, radius: f32) -> Self {
        self.shape = ColliderShape::Circle(Circle::new(Vec2::ZERO, radius));
        self
    }

    pub fn cuboid(mut self, half_extents: Vec2) -> Self {
        self.shape = ColliderShape::Polygon(Polygon::make_box(half_extents.x, half_extents.y));
        self
    }

    pub fn capsule(mut self, center1: Vec2, center2: Vec2, radius: f32) -> Self {
        self.shape = ColliderShape::Capsule(Capsule::new(center1, center2, radius));
        self
    }

    pub fn segment(mut self, point1: Vec2, point2: Vec2) -> Self {
        self.shape = ColliderShape::Segment(Segment::new(point1, point2));
        self
    }

    pub fn polygon(mut self, polygon: Polygon) -> Self {
        self.shape = ColliderShape::Polygon(polygon);
        self
    }

    pub fn shape(mut self, shape: ColliderShape) -> Self {
        self.shape = shape;
        self
    }

    pub fn material(mut self, material: Material) -> Self {
        self.material = material;
        self
    }

    pub fn density(mut self, density: f32) -> Self {
        self.material.density = density;
        self
    }

    pub fn friction(mut self, friction: f32) -> Self {
        self.material.friction = friction;
        self
    }

    pub fn restitution(mut self, restitution: f32) -> Self {
        self.material.restitution = restitution;
        self
    }

    pub fn sensor(mut self, is_sensor: bool) -> Self {
        self.is_sensor = is_sensor;
        self
    }

    pub fn contact_events(mut self, enabled: bool) -> Self {
        self.enable_contact_events = enabled;
        self
    }

    pub fn filter(mut self, layer: u32, mask: u32) -> Self {
        self.filter.layer = layer;
        self.filter.mask = mask;
        self
    }

    pub fn group(mut self, group: i32) -> Self {
        self.filter.group = group;
        self
    }

    pub fn build(self) -> Collider {
        Collider {
            id: EntityId::default(),
            body_id: EntityId::default(),
            shape: self.shape,
            material: self.material,
            collision_filter: self.filter,
            is_sensor: self.is_sensor,
            enable_contact_events: self.enable_contact_events,
            proxy: None,
            aabb: Aabb::default(),
        }
    }
}
