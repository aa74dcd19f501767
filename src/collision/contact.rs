//! Persistent contacts between collider pairs and the events they produce.

use std::collections::HashMap;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::{
    collision::{
        broadphase::BroadPhase,
        distance::distance,
        manifold::Manifold,
        narrowphase::NarrowPhase,
    },
    core::{collider::Collider, rigidbody::RigidBody},
    utils::allocator::{Arena, EntityId},
};

/// Contact record for one pair of colliders whose fat bounds overlap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub id: EntityId,
    pub collider_a: EntityId,
    pub collider_b: EntityId,
    pub body_a: EntityId,
    pub body_b: EntityId,
    pub manifold: Manifold,
    pub friction: f32,
    pub restitution: f32,
    /// At least one manifold point, or overlap for sensors.
    pub touching: bool,
    pub is_sensor: bool,
    pub enable_events: bool,
}

impl Contact {
    /// Whether the solver should build constraint rows for this contact.
    pub fn is_solid(&self) -> bool {
        self.touching && !self.is_sensor
    }

    pub fn other_body(&self, body: EntityId) -> EntityId {
        if body == self.body_a {
            self.body_b
        } else {
            self.body_a
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContactEventKind {
    Begin,
    Persist,
    End,
}

/// Touch state change reported after a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactEvent {
    pub kind: ContactEventKind,
    pub collider_a: EntityId,
    pub collider_b: EntityId,
    pub body_a: EntityId,
    pub body_b: EntityId,
    pub manifold: Manifold,
    pub is_sensor: bool,
}

impl ContactEvent {
    fn from_contact(kind: ContactEventKind, contact: &Contact) -> Self {
        Self {
            kind,
            collider_a: contact.collider_a,
            collider_b: contact.collider_b,
            body_a: contact.body_a,
            body_b: contact.body_b,
            manifold: contact.manifold,
            is_sensor: contact.is_sensor,
        }
    }
}

/// Counts from one narrow-phase update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContactUpdate {
    pub updated: usize,
    pub destroyed: usize,
    pub touching: usize,
}

/// Owns every live contact and the pair index used to avoid duplicates.
#[derive(Debug, Clone)]
pub struct ContactManager {
    contacts: Arena<Contact>,
    pair_index: HashMap<(EntityId, EntityId), EntityId>,
    max_contacts: usize,
}

impl ContactManager {
    pub fn new(max_contacts: usize) -> Self {
        Self {
            contacts: Arena::new(),
            pair_index: HashMap::new(),
            max_contacts,
        }
    }

    pub fn set_max_contacts(&mut self, max_contacts: usize) {
        self.max_contacts = max_contacts;
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    pub fn get(&self, id: EntityId) -> Option<&Contact> {
        self.contacts.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: EntityId) -> Option<&mut Contact> {
        self.contacts.get_mut(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &Contact)> + '_ {
        self.contacts.iter()
    }

    /// Contact between two colliders, in either order.
    pub fn find(&self, collider_a: EntityId, collider_b: EntityId) -> Option<&Contact> {
        self.pair_index
            .get(&pair_key(collider_a, collider_b))
            .and_then(|id| self.contacts.get(*id))
    }

    pub fn touching_count(&self) -> usize {
        self.contacts.values().filter(|c| c.touching).count()
    }

    /// Creates contacts for new broad-phase pairs.
    ///
    /// `joint_blocks` reports whether a joint between two bodies disables
    /// collision between them. Returns the number of contacts refused
    /// because the cap was reached.
    pub fn add_pairs<F>(
        &mut self,
        pairs: &[(EntityId, EntityId)],
        colliders: &Arena<Collider>,
        bodies: &Arena<RigidBody>,
        joint_blocks: F,
    ) -> usize
    where
        F: Fn(EntityId, EntityId) -> bool,
    {
        let mut refused = 0;
        for &(first, second) in pairs {
            let key = pair_key(first, second);
            if self.pair_index.contains_key(&key) {
                continue;
            }
            let (Some(collider_first), Some(collider_second)) = (colliders.get(first), colliders.get(second)) else {
                continue;
            };
            if collider_first.body_id == collider_second.body_id {
                continue;
            }
            if !collider_first
                .collision_filter
                .should_collide(&collider_second.collision_filter)
            {
                continue;
            }
            let (Some(body_first), Some(body_second)) =
                (bodies.get(collider_first.body_id), bodies.get(collider_second.body_id))
            else {
                continue;
            };
            if !body_first.is_dynamic() && !body_second.is_dynamic() {
                continue;
            }
            if joint_blocks(collider_first.body_id, collider_second.body_id) {
                continue;
            }
            if self.contacts.len() >= self.max_contacts {
                refused += 1;
                continue;
            }

            // The higher-ranked shape plays A so polygon routines see it first.
            let (collider_a, collider_b) = if collider_first.shape.rank() >= collider_second.shape.rank() {
                (collider_first, collider_second)
            } else {
                (collider_second, collider_first)
            };
            let mixed = collider_a.material.combine_with(&collider_b.material);
            let is_sensor = collider_a.is_sensor || collider_b.is_sensor;
            let id = self.contacts.insert(Contact {
                id: EntityId::NULL,
                collider_a: collider_a.id,
                collider_b: collider_b.id,
                body_a: collider_a.body_id,
                body_b: collider_b.body_id,
                manifold: Manifold::default(),
                friction: mixed.friction,
                restitution: mixed.restitution,
                touching: false,
                is_sensor,
                enable_events: is_sensor
                    || collider_a.enable_contact_events
                    || collider_b.enable_contact_events,
            });
            if let Some(contact) = self.contacts.get_mut(id) {
                contact.id = id;
            }
            self.pair_index.insert(key, id);
        }
        if refused > 0 {
            warn!(
                "contact cap of {} reached, refused {} new contacts",
                self.max_contacts, refused
            );
        }
        refused
    }

    /// Recomputes manifolds, carries impulses across matching feature ids,
    /// destroys contacts whose fat bounds separated and emits touch events.
    ///
    /// Bodies that must wake because an awake body started touching them are
    /// appended to `wake`.
    pub fn update(
        &mut self,
        colliders: &Arena<Collider>,
        bodies: &Arena<RigidBody>,
        broad_phase: &BroadPhase,
        events: &mut Vec<ContactEvent>,
        wake: &mut Vec<EntityId>,
    ) -> ContactUpdate {
        let mut stats = ContactUpdate::default();
        let mut doomed = Vec::new();

        for (id, contact) in self.contacts.iter_mut() {
            let (Some(collider_a), Some(collider_b)) =
                (colliders.get(contact.collider_a), colliders.get(contact.collider_b))
            else {
                doomed.push(id);
                continue;
            };
            let (Some(body_a), Some(body_b)) = (bodies.get(contact.body_a), bodies.get(contact.body_b)) else {
                doomed.push(id);
                continue;
            };

            let active_a = body_a.is_awake() && !body_a.is_static();
            let active_b = body_b.is_awake() && !body_b.is_static();
            if !active_a && !active_b {
                if contact.touching {
                    stats.touching += 1;
                }
                continue;
            }

            let overlapping = match (collider_a.proxy, collider_b.proxy) {
                (Some(proxy_a), Some(proxy_b)) => broad_phase.test_overlap(proxy_a, proxy_b),
                _ => false,
            };
            if !overlapping {
                doomed.push(id);
                continue;
            }

            let was_touching = contact.touching;
            let xf_a = body_a.transform;
            let xf_b = body_b.transform;
            if contact.is_sensor {
                let output = distance(
                    &collider_a.shape.proxy(),
                    &xf_a,
                    &collider_b.shape.proxy(),
                    &xf_b,
                    true,
                );
                contact.touching = output.distance < 10.0 * f32::EPSILON;
                contact.manifold = Manifold::default();
            } else {
                let old = contact.manifold;
                let mut manifold = NarrowPhase::collide(&collider_a.shape, &xf_a, &collider_b.shape, &xf_b);
                for point in manifold.points_mut() {
                    if let Some(previous) = old.points().iter().find(|p| p.id == point.id) {
                        point.normal_impulse = previous.normal_impulse;
                        point.tangent_impulse = previous.tangent_impulse;
                        point.persisted = true;
                    }
                }
                contact.touching = manifold.point_count > 0;
                contact.manifold = manifold;
            }
            stats.updated += 1;

            if contact.touching {
                stats.touching += 1;
                if !was_touching && !contact.is_sensor {
                    if !body_a.is_awake() && body_a.is_dynamic() {
                        wake.push(contact.body_a);
                    }
                    if !body_b.is_awake() && body_b.is_dynamic() {
                        wake.push(contact.body_b);
                    }
                }
            }

            if contact.enable_events {
                let kind = match (was_touching, contact.touching) {
                    (false, true) => Some(ContactEventKind::Begin),
                    (true, true) => Some(ContactEventKind::Persist),
                    (true, false) => Some(ContactEventKind::End),
                    (false, false) => None,
                };
                if let Some(kind) = kind {
                    events.push(ContactEvent::from_contact(kind, contact));
                }
            }
        }

        stats.destroyed = doomed.len();
        for id in doomed {
            self.destroy(id, events);
        }
        if stats.destroyed > 0 {
            debug!("destroyed {} separated contacts", stats.destroyed);
        }
        stats
    }

    /// Removes every contact involving `collider`, reporting touch ends.
    pub fn remove_collider(&mut self, collider: EntityId, events: &mut Vec<ContactEvent>) -> Vec<EntityId> {
        let doomed: Vec<EntityId> = self
            .contacts
            .iter()
            .filter(|(_, c)| c.collider_a == collider || c.collider_b == collider)
            .map(|(id, _)| id)
            .collect();
        let mut touched_bodies = Vec::new();
        for id in doomed {
            if let Some(contact) = self.contacts.get(id) {
                if contact.touching {
                    touched_bodies.push(contact.body_a);
                    touched_bodies.push(contact.body_b);
                }
            }
            self.destroy(id, events);
        }
        touched_bodies
    }

    /// Removes contacts between two bodies, used when a joint starts
    /// filtering them.
    pub fn remove_between(&mut self, body_a: EntityId, body_b: EntityId, events: &mut Vec<ContactEvent>) {
        let doomed: Vec<EntityId> = self
            .contacts
            .iter()
            .filter(|(_, c)| {
                (c.body_a == body_a && c.body_b == body_b) || (c.body_a == body_b && c.body_b == body_a)
            })
            .map(|(id, _)| id)
            .collect();
        for id in doomed {
            self.destroy(id, events);
        }
    }

    fn destroy(&mut self, id: EntityId, events: &mut Vec<ContactEvent>) {
        if let Some(contact) = self.contacts.remove(id) {
            self.pair_index
                .remove(&pair_key(contact.collider_a, contact.collider_b));
            if contact.touching && contact.enable_events {
                events.push(ContactEvent::from_contact(ContactEventKind::End, &contact));
            }
        }
    }
}

fn pair_key(a: EntityId, b: EntityId) -> (EntityId, EntityId) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{collider::ColliderBuilder, rigidbody::RigidBodyBuilder};
    use glam::Vec2;

    struct Scene {
        bodies: Arena<RigidBody>,
        colliders: Arena<Collider>,
        broad_phase: BroadPhase,
    }

    impl Scene {
        fn new() -> Self {
            Self {
                bodies: Arena::new(),
                colliders: Arena::new(),
                broad_phase: BroadPhase::new(64),
            }
        }

        fn add(&mut self, body: RigidBody, collider: ColliderBuilder) -> (EntityId, EntityId) {
            let body_id = self.bodies.insert(body);
            let mut collider = collider.build();
            collider.body_id = body_id;
            let collider_id = self.colliders.insert(collider);
            let body = self.bodies.get_mut(body_id).unwrap();
            body.id = body_id;
            body.colliders.push(collider_id);
            let xf = body.transform;
            let stored = self.colliders.get_mut(collider_id).unwrap();
            stored.id = collider_id;
            stored.aabb = stored.shape.compute_aabb(&xf);
            stored.proxy = Some(self.broad_phase.insert(collider_id, stored.aabb).unwrap());
            (body_id, collider_id)
        }

        fn moved_to(&mut self, body_id: EntityId, collider_id: EntityId, position: Vec2) {
            let body = self.bodies.get_mut(body_id).unwrap();
            let old = body.position();
            body.set_transform(position, 0.0);
            let xf = body.transform;
            let collider = self.colliders.get_mut(collider_id).unwrap();
            collider.aabb = collider.shape.compute_aabb(&xf);
            let proxy = collider.proxy.unwrap();
            let aabb = collider.aabb;
            self.broad_phase.move_proxy(proxy, aabb, position - old);
        }
    }

    #[test]
    fn contact_begins_persists_and_ends() {
        let mut scene = Scene::new();
        let mut manager = ContactManager::new(16);
        scene.add(
            RigidBodyBuilder::fixed().build(),
            ColliderBuilder::new().cuboid(Vec2::new(5.0, 0.5)),
        );
        let (ball, ball_collider) = scene.add(
            RigidBodyBuilder::dynamic().translation(Vec2::new(0.0, 0.99)).build(),
            ColliderBuilder::new().circle(0.5),
        );

        let mut events = Vec::new();
        let mut wake = Vec::new();
        let pairs = scene.broad_phase.update_pairs();
        assert_eq!(manager.add_pairs(&pairs, &scene.colliders, &scene.bodies, |_, _| false), 0);
        assert_eq!(manager.len(), 1);

        manager.update(&scene.colliders, &scene.bodies, &scene.broad_phase, &mut events, &mut wake);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ContactEventKind::Begin);
        // Polygon ranks above circle so it plays A.
        assert_eq!(events[0].body_b, ball);

        events.clear();
        manager.update(&scene.colliders, &scene.bodies, &scene.broad_phase, &mut events, &mut wake);
        assert_eq!(events[0].kind, ContactEventKind::Persist);
        assert!(manager.iter().all(|(_, c)| c.manifold.points()[0].persisted));

        events.clear();
        scene.moved_to(ball, ball_collider, Vec2::new(0.0, 10.0));
        let stats = manager.update(&scene.colliders, &scene.bodies, &scene.broad_phase, &mut events, &mut wake);
        assert_eq!(stats.destroyed, 1);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ContactEventKind::End);
        assert!(manager.is_empty());
    }

    #[test]
    fn impulses_follow_matching_feature_ids() {
        let mut scene = Scene::new();
        let mut manager = ContactManager::new(16);
        scene.add(
            RigidBodyBuilder::fixed().build(),
            ColliderBuilder::new().cuboid(Vec2::new(5.0, 0.5)),
        );
        scene.add(
            RigidBodyBuilder::dynamic().translation(Vec2::new(0.0, 0.99)).build(),
            ColliderBuilder::new().cuboid(Vec2::splat(0.5)),
        );
        let pairs = scene.broad_phase.update_pairs();
        manager.add_pairs(&pairs, &scene.colliders, &scene.bodies, |_, _| false);
        let mut events = Vec::new();
        let mut wake = Vec::new();
        manager.update(&scene.colliders, &scene.bodies, &scene.broad_phase, &mut events, &mut wake);

        let id = manager.iter().next().map(|(id, _)| id).unwrap();
        for (i, point) in manager.get_mut(id).unwrap().manifold.points_mut().iter_mut().enumerate() {
            point.normal_impulse = 1.0 + i as f32;
        }
        let before: Vec<_> = manager.get(id).unwrap().manifold.points().iter().map(|p| (p.id, p.normal_impulse)).collect();

        manager.update(&scene.colliders, &scene.bodies, &scene.broad_phase, &mut events, &mut wake);
        let after: Vec<_> = manager.get(id).unwrap().manifold.points().iter().map(|p| (p.id, p.normal_impulse)).collect();
        assert_eq!(before.len(), 2);
        for (feature, impulse) in before {
            assert!(after.contains(&(feature, impulse)));
        }
    }

    #[test]
    fn cap_refuses_new_contacts() {
        let mut scene = Scene::new();
        let mut manager = ContactManager::new(1);
        scene.add(
            RigidBodyBuilder::fixed().build(),
            ColliderBuilder::new().cuboid(Vec2::new(5.0, 0.5)),
        );
        for x in [-2.0, 2.0] {
            scene.add(
                RigidBodyBuilder::dynamic().translation(Vec2::new(x, 1.0)).build(),
                ColliderBuilder::new().circle(0.5),
            );
        }
        let pairs = scene.broad_phase.update_pairs();
        let refused = manager.add_pairs(&pairs, &scene.colliders, &scene.bodies, |_, _| false);
        assert_eq!(refused, 1);
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn static_pairs_and_filtered_pairs_are_skipped() {
        let mut scene = Scene::new();
        let mut manager = ContactManager::new(16);
        scene.add(
            RigidBodyBuilder::fixed().build(),
            ColliderBuilder::new().cuboid(Vec2::new(5.0, 0.5)),
        );
        scene.add(
            RigidBodyBuilder::fixed().translation(Vec2::new(0.0, 0.5)).build(),
            ColliderBuilder::new().circle(0.5),
        );
        scene.add(
            RigidBodyBuilder::dynamic().translation(Vec2::new(0.5, 0.5)).build(),
            ColliderBuilder::new().circle(0.5).group(-1),
        );
        scene.add(
            RigidBodyBuilder::dynamic().translation(Vec2::new(-0.5, 0.5)).build(),
            ColliderBuilder::new().circle(0.5).group(-1),
        );
        let pairs = scene.broad_phase.update_pairs();
        manager.add_pairs(&pairs, &scene.colliders, &scene.bodies, |_, _| false);
        // Each dynamic ball touches the ground and the static ball, not each other.
        assert_eq!(manager.len(), 4);
    }
}
