use std::collections::{HashMap, HashSet};

use log::trace;

use crate::{
    collision::contact::Contact,
    config::WorldConfig,
    core::rigidbody::RigidBody,
    dynamics::joints::Joint,
    utils::allocator::{Arena, EntityId},
};

/// Represents a connected set of bodies/contacts that can be solved independently.
///
/// Only dynamic bodies are members; static and kinematic bodies reached
/// through a contact or joint are referenced by the constraints but never
/// join or bridge islands.
#[derive(Debug, Clone, Default)]
pub struct Island {
    pub bodies: Vec<EntityId>,
    pub contacts: Vec<EntityId>,
    pub joints: Vec<EntityId>,
    pub is_awake: bool,
    /// Cleared when a member touches a moving kinematic body.
    pub can_sleep: bool,
}

#[derive(Debug, Clone, Copy)]
enum Edge {
    Contact(EntityId, EntityId),
    Joint(EntityId, EntityId),
}

/// Builds islands each step and manages sleeping state.
#[derive(Debug, Default)]
pub struct IslandManager {
    islands: Vec<Island>,
    adjacency: HashMap<EntityId, Vec<Edge>>,
}

impl IslandManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flood fills from every awake dynamic body in arena order.
    ///
    /// Sleeping bodies reached through a touching contact or joint are woken
    /// and join the island.
    pub fn build_islands<'a, C, J>(&mut self, bodies: &mut Arena<RigidBody>, contacts: C, joints: J)
    where
        C: IntoIterator<Item = &'a Contact>,
        J: IntoIterator<Item = &'a Joint>,
    {
        self.islands.clear();
        self.adjacency.clear();

        for contact in contacts {
            if !contact.is_solid() {
                continue;
            }
            self.adjacency
                .entry(contact.body_a)
                .or_default()
                .push(Edge::Contact(contact.id, contact.body_b));
            self.adjacency
                .entry(contact.body_b)
                .or_default()
                .push(Edge::Contact(contact.id, contact.body_a));
        }

        for joint in joints {
            let (body_a, body_b) = joint.bodies();
            self.adjacency
                .entry(body_a)
                .or_default()
                .push(Edge::Joint(joint.id, body_b));
            self.adjacency
                .entry(body_b)
                .or_default()
                .push(Edge::Joint(joint.id, body_a));
        }

        let seeds: Vec<EntityId> = bodies
            .iter()
            .filter(|(_, body)| body.is_dynamic() && body.is_awake())
            .map(|(id, _)| id)
            .collect();

        let mut visited = HashSet::new();
        let mut seen_contacts = HashSet::new();
        let mut seen_joints = HashSet::new();
        for seed in seeds {
            if !visited.insert(seed) {
                continue;
            }
            let mut island = Island {
                is_awake: true,
                can_sleep: true,
                ..Island::default()
            };
            let mut stack = vec![seed];

            while let Some(node) = stack.pop() {
                if let Some(body) = bodies.get_mut(node) {
                    if !body.is_awake() {
                        body.set_awake(true);
                    }
                }
                island.bodies.push(node);

                let Some(edges) = self.adjacency.get(&node) else {
                    continue;
                };
                for edge in edges {
                    let other = match *edge {
                        Edge::Contact(id, other) => {
                            if !seen_contacts.insert(id) {
                                continue;
                            }
                            island.contacts.push(id);
                            other
                        }
                        Edge::Joint(id, other) => {
                            if !seen_joints.insert(id) {
                                continue;
                            }
                            island.joints.push(id);
                            other
                        }
                    };
                    let Some(other_body) = bodies.get(other) else {
                        continue;
                    };
                    if other_body.is_kinematic() && is_moving(other_body) {
                        island.can_sleep = false;
                    }
                    if other_body.is_dynamic() && visited.insert(other) {
                        stack.push(other);
                    }
                }
            }

            trace!(
                "island {}: {} bodies, {} contacts, {} joints",
                self.islands.len(),
                island.bodies.len(),
                island.contacts.len(),
                island.joints.len()
            );
            self.islands.push(island);
        }
    }

    /// Accumulates rest time and puts islands to sleep.
    ///
    /// Returns the number of islands that fell asleep.
    pub fn update_sleeping(&mut self, bodies: &mut Arena<RigidBody>, config: &WorldConfig, dt: f32) -> usize {
        let linear_tolerance = config.sleep_threshold * config.sleep_threshold;
        let angular_tolerance = config.angular_sleep_threshold * config.angular_sleep_threshold;
        let mut slept = 0;

        for island in &mut self.islands {
            let mut min_sleep_time = f32::MAX;
            for body_id in &island.bodies {
                let Some(body) = bodies.get_mut(*body_id) else {
                    continue;
                };
                let resting = body.allow_sleep
                    && body.velocity.linear.length_squared() <= linear_tolerance
                    && body.velocity.angular * body.velocity.angular <= angular_tolerance;
                if resting {
                    body.sleep_time += dt;
                } else {
                    body.sleep_time = 0.0;
                }
                min_sleep_time = min_sleep_time.min(body.sleep_time);
            }

            if !config.enable_sleep || !island.can_sleep || min_sleep_time < config.sleep_time {
                continue;
            }
            for body_id in &island.bodies {
                if let Some(body) = bodies.get_mut(*body_id) {
                    body.set_awake(false);
                }
            }
            island.is_awake = false;
            slept += 1;
        }
        slept
    }

    pub fn islands(&self) -> &[Island] {
        &self.islands
    }

    pub fn island_count(&self) -> usize {
        self.islands.len()
    }
}

fn is_moving(body: &RigidBody) -> bool {
    body.velocity.linear != glam::Vec2::ZERO || body.velocity.angular != 0.0
}
