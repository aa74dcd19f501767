use glam::Vec2;
use log::trace;

use crate::{
    collision::{
        aabb::Aabb,
        broadphase::BroadPhase,
        ccd::CCDDetector,
        contact::{ContactEvent, ContactManager, ContactUpdate},
    },
    config::WorldConfig,
    core::{collider::Collider, rigidbody::RigidBody},
    dynamics::joints::Joint,
    utils::allocator::{Arena, EntityId},
    world::dynamics_manager::joint_blocks_collision,
};

/// Broad-phase tree, persistent contacts, swept tests and the events the
/// current step has produced.
#[derive(Debug)]
pub struct CollisionManager {
    pub broad_phase: BroadPhase,
    pub contacts: ContactManager,
    pub ccd: CCDDetector,
    pub events: Vec<ContactEvent>,
}

impl CollisionManager {
    pub fn new(config: &WorldConfig) -> Self {
        let mut ccd = CCDDetector::new();
        ccd.enabled = config.enable_continuous;
        Self {
            broad_phase: BroadPhase::new(config.max_proxies),
            contacts: ContactManager::new(config.max_contacts),
            ccd,
            events: Vec::new(),
        }
    }

    pub fn apply_config(&mut self, config: &WorldConfig) {
        self.broad_phase.set_max_proxies(config.max_proxies);
        self.contacts.set_max_contacts(config.max_contacts);
        self.ccd.enabled = config.enable_continuous;
    }

    /// Refits the proxies of every awake, non-static body.
    ///
    /// Fat bounds are stretched along the predicted displacement for the
    /// coming step. Returns how many proxies left their fat bounds.
    pub fn synchronize(&mut self, bodies: &Arena<RigidBody>, colliders: &mut Arena<Collider>, dt: f32) -> usize {
        let mut moved = 0;
        for (_, collider) in colliders.iter_mut() {
            let Some(body) = bodies.get(collider.body_id) else {
                continue;
            };
            if body.is_static() || !body.is_awake() {
                continue;
            }
            collider.aabb = collider.shape.compute_aabb(&body.transform);
            if let Some(proxy) = collider.proxy {
                let displacement = body.velocity.linear * dt;
                if self.broad_phase.move_proxy(proxy, collider.aabb, displacement) {
                    moved += 1;
                }
            }
        }
        moved
    }

    /// Refits one body's proxies after a teleport and forces a pair query.
    pub fn refit_body(&mut self, body: &RigidBody, colliders: &mut Arena<Collider>) {
        for collider_id in &body.colliders {
            let Some(collider) = colliders.get_mut(*collider_id) else {
                continue;
            };
            collider.aabb = collider.shape.compute_aabb(&body.transform);
            if let Some(proxy) = collider.proxy {
                if !self.broad_phase.move_proxy(proxy, collider.aabb, Vec2::ZERO) {
                    self.broad_phase.touch_proxy(proxy);
                }
            }
        }
    }

    /// Queues a body's proxies for re-pairing, used when a joint that
    /// filtered collision goes away.
    pub fn touch_body(&mut self, body: &RigidBody, colliders: &Arena<Collider>) {
        for collider_id in &body.colliders {
            if let Some(proxy) = colliders.get(*collider_id).and_then(|c| c.proxy) {
                self.broad_phase.touch_proxy(proxy);
            }
        }
    }

    /// Pulls new pairs out of the move buffer and creates contacts for them.
    pub fn find_new_contacts(
        &mut self,
        colliders: &Arena<Collider>,
        bodies: &Arena<RigidBody>,
        joints: &Arena<Joint>,
    ) -> usize {
        let pairs = self.broad_phase.update_pairs();
        let before = self.contacts.len();
        self.contacts.add_pairs(&pairs, colliders, bodies, |a, b| {
            joint_blocks_collision(bodies, joints, a, b)
        });
        let created = self.contacts.len() - before;
        trace!("{} candidate pairs, {} new contacts", pairs.len(), created);
        created
    }

    /// Updates every contact's manifold and touch state.
    pub fn collide(
        &mut self,
        colliders: &Arena<Collider>,
        bodies: &Arena<RigidBody>,
        wake: &mut Vec<EntityId>,
    ) -> ContactUpdate {
        self.contacts
            .update(colliders, bodies, &self.broad_phase, &mut self.events, wake)
    }

    /// Inserts a proxy for a collider that is not yet in the tree.
    pub fn insert_collider(&mut self, collider: &mut Collider, body: &RigidBody) -> crate::error::PhysicsResult<()> {
        let aabb = collider.shape.compute_aabb(&body.transform);
        let proxy = self.broad_phase.insert(collider.id, aabb)?;
        collider.aabb = aabb;
        collider.proxy = Some(proxy);
        Ok(())
    }

    /// Drops a collider's proxy and contacts. Returns the bodies it was
    /// touching.
    pub fn remove_collider(&mut self, collider: &mut Collider) -> Vec<EntityId> {
        if let Some(proxy) = collider.proxy.take() {
            self.broad_phase.remove(proxy);
        }
        self.contacts.remove_collider(collider.id, &mut self.events)
    }

    /// Swept bounds of a collider over its body's sweep.
    pub fn swept_aabb(collider: &Collider, body: &RigidBody) -> Aabb {
        let start = collider.shape.compute_aabb(&body.sweep.transform_at(0.0));
        let end = collider.shape.compute_aabb(&body.sweep.transform_at(1.0));
        start.union(&end)
    }
}
