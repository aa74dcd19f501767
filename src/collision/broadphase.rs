//! Dynamic AABB tree broad-phase.
//!
//! Leaves hold fattened bounds so a collider only touches the tree when its
//! tight bounds escape. Nodes live in a flat pool addressed by index; freed
//! slots are recycled through a free list.

use glam::Vec2;

use crate::{
    collision::aabb::Aabb,
    config::{AABB_MARGIN, AABB_MULTIPLIER},
    error::{PhysicsError, PhysicsResult},
    utils::allocator::EntityId,
};

const NULL_NODE: u32 = u32::MAX;

/// Handle to a leaf of the dynamic tree; stable for the leaf's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProxyId(u32);

impl ProxyId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone)]
struct TreeNode {
    aabb: Aabb,
    parent: u32,
    child1: u32,
    child2: u32,
    /// Leaf = 0, free = -1.
    height: i32,
    user_data: EntityId,
    moved: bool,
}

impl TreeNode {
    fn free() -> Self {
        Self {
            aabb: Aabb::default(),
            parent: NULL_NODE,
            child1: NULL_NODE,
            child2: NULL_NODE,
            height: -1,
            user_data: EntityId::NULL,
            moved: false,
        }
    }

    fn is_leaf(&self) -> bool {
        self.child1 == NULL_NODE
    }
}

/// Balanced bounding-volume tree over fattened AABBs.
#[derive(Debug, Clone)]
pub struct DynamicTree {
    nodes: Vec<TreeNode>,
    free_list: Vec<u32>,
    root: u32,
    proxy_count: usize,
}

impl Default for DynamicTree {
    fn default() -> Self {
        Self::new()
    }
}

impl DynamicTree {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            free_list: Vec::new(),
            root: NULL_NODE,
            proxy_count: 0,
        }
    }

    pub fn proxy_count(&self) -> usize {
        self.proxy_count
    }

    pub fn height(&self) -> i32 {
        if self.root == NULL_NODE {
            0
        } else {
            self.nodes[self.root as usize].height
        }
    }

    pub fn fat_aabb(&self, proxy: ProxyId) -> Aabb {
        self.nodes[proxy.index()].aabb
    }

    pub fn user_data(&self, proxy: ProxyId) -> EntityId {
        self.nodes[proxy.index()].user_data
    }

    /// Inserts a leaf whose fat bounds are `aabb` grown by the margin.
    pub fn create_proxy(&mut self, aabb: Aabb, user_data: EntityId) -> ProxyId {
        let leaf = self.allocate_node();
        {
            let node = &mut self.nodes[leaf as usize];
            node.aabb = aabb.expanded(AABB_MARGIN);
            node.user_data = user_data;
            node.height = 0;
            node.moved = true;
        }
        self.insert_leaf(leaf);
        self.proxy_count += 1;
        ProxyId(leaf)
    }

    pub fn destroy_proxy(&mut self, proxy: ProxyId) {
        debug_assert!(self.nodes[proxy.index()].is_leaf());
        self.remove_leaf(proxy.0);
        self.free_node(proxy.0);
        self.proxy_count -= 1;
    }

    /// Re-fits a leaf when its tight bounds leave the fat bounds.
    ///
    /// Returns whether the tree changed. The new fat bounds are stretched
    /// along `displacement` to anticipate further motion.
    pub fn move_proxy(&mut self, proxy: ProxyId, aabb: Aabb, displacement: Vec2) -> bool {
        let leaf = proxy.0;
        let fat = self.nodes[leaf as usize].aabb;
        if fat.contains(&aabb) {
            // Shrink bounds that have grown far larger than needed.
            let huge = aabb.expanded(4.0 * AABB_MARGIN);
            if huge.contains(&fat) {
                return false;
            }
        }

        self.remove_leaf(leaf);

        let mut fat = aabb.expanded(AABB_MARGIN);
        let d = AABB_MULTIPLIER * displacement;
        if d.x < 0.0 {
            fat.min.x += d.x;
        } else {
            fat.max.x += d.x;
        }
        if d.y < 0.0 {
            fat.min.y += d.y;
        } else {
            fat.max.y += d.y;
        }
        self.nodes[leaf as usize].aabb = fat;

        self.insert_leaf(leaf);
        self.nodes[leaf as usize].moved = true;
        true
    }

    pub fn was_moved(&self, proxy: ProxyId) -> bool {
        self.nodes[proxy.index()].moved
    }

    pub fn clear_moved(&mut self, proxy: ProxyId) {
        self.nodes[proxy.index()].moved = false;
    }

    /// Visits every leaf whose fat bounds overlap `aabb`; return `false` to stop.
    pub fn query<F>(&self, aabb: &Aabb, mut callback: F)
    where
        F: FnMut(ProxyId, EntityId) -> bool,
    {
        if self.root == NULL_NODE {
            return;
        }

        let mut stack = Vec::with_capacity(64);
        stack.push(self.root);
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index as usize];
            if !node.aabb.overlaps(aabb) {
                continue;
            }
            if node.is_leaf() {
                if !callback(ProxyId(index), node.user_data) {
                    return;
                }
            } else {
                stack.push(node.child1);
                stack.push(node.child2);
            }
        }
    }

    /// Walks leaves whose bounds the segment `origin + t * translation`,
    /// `t ∈ [0, max_fraction]` crosses.
    ///
    /// The callback returns the new clipping fraction: `0` stops the walk,
    /// the current value keeps it unchanged.
    pub fn ray_cast<F>(&self, origin: Vec2, translation: Vec2, max_fraction: f32, mut callback: F)
    where
        F: FnMut(ProxyId, EntityId, f32) -> f32,
    {
        if self.root == NULL_NODE {
            return;
        }

        let mut max_fraction = max_fraction;
        let mut stack = Vec::with_capacity(64);
        stack.push(self.root);
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index as usize];
            let end = origin + max_fraction * translation;
            if node.aabb.ray_fraction(origin, end).is_none() {
                continue;
            }
            if node.is_leaf() {
                let value = callback(ProxyId(index), node.user_data, max_fraction);
                if value <= 0.0 {
                    return;
                }
                max_fraction = value.min(max_fraction);
            } else {
                stack.push(node.child1);
                stack.push(node.child2);
            }
        }
    }

    /// Verifies parent links, heights and enclosing bounds.
    pub fn validate(&self) -> bool {
        if self.root == NULL_NODE {
            return self.proxy_count == 0;
        }
        if self.nodes[self.root as usize].parent != NULL_NODE {
            return false;
        }
        let mut leaves = 0;
        let ok = self.validate_node(self.root, &mut leaves);
        ok && leaves == self.proxy_count
    }

    fn validate_node(&self, index: u32, leaves: &mut usize) -> bool {
        let node = &self.nodes[index as usize];
        if node.is_leaf() {
            *leaves += 1;
            return node.height == 0 && node.child2 == NULL_NODE;
        }
        let (c1, c2) = (node.child1, node.child2);
        let child1 = &self.nodes[c1 as usize];
        let child2 = &self.nodes[c2 as usize];
        if child1.parent != index || child2.parent != index {
            return false;
        }
        if node.height != 1 + child1.height.max(child2.height) {
            return false;
        }
        if !node.aabb.contains(&child1.aabb) || !node.aabb.contains(&child2.aabb) {
            return false;
        }
        self.validate_node(c1, leaves) && self.validate_node(c2, leaves)
    }

    fn allocate_node(&mut self) -> u32 {
        if let Some(index) = self.free_list.pop() {
            self.nodes[index as usize] = TreeNode::free();
            return index;
        }
        self.nodes.push(TreeNode::free());
        (self.nodes.len() - 1) as u32
    }

    fn free_node(&mut self, index: u32) {
        self.nodes[index as usize] = TreeNode::free();
        self.free_list.push(index);
    }

    fn insert_leaf(&mut self, leaf: u32) {
        if self.root == NULL_NODE {
            self.root = leaf;
            self.nodes[leaf as usize].parent = NULL_NODE;
            return;
        }

        // Descend by perimeter cost. Equal child costs go to child1.
        let leaf_aabb = self.nodes[leaf as usize].aabb;
        let mut index = self.root;
        while !self.nodes[index as usize].is_leaf() {
            let node = &self.nodes[index as usize];
            let (child1, child2) = (node.child1, node.child2);

            let area = node.aabb.perimeter();
            let combined_area = node.aabb.union(&leaf_aabb).perimeter();
            let cost = 2.0 * combined_area;
            let inheritance_cost = 2.0 * (combined_area - area);

            let cost1 = self.descend_cost(child1, &leaf_aabb, inheritance_cost);
            let cost2 = self.descend_cost(child2, &leaf_aabb, inheritance_cost);

            if cost < cost1 && cost < cost2 {
                break;
            }
            index = if cost1 <= cost2 { child1 } else { child2 };
        }

        let sibling = index;
        let old_parent = self.nodes[sibling as usize].parent;
        let new_parent = self.allocate_node();
        {
            let sibling_node = &self.nodes[sibling as usize];
            let aabb = leaf_aabb.union(&sibling_node.aabb);
            let height = sibling_node.height + 1;
            let node = &mut self.nodes[new_parent as usize];
            node.parent = old_parent;
            node.aabb = aabb;
            node.height = height;
            node.child1 = sibling;
            node.child2 = leaf;
        }
        self.nodes[sibling as usize].parent = new_parent;
        self.nodes[leaf as usize].parent = new_parent;

        if old_parent == NULL_NODE {
            self.root = new_parent;
        } else if self.nodes[old_parent as usize].child1 == sibling {
            self.nodes[old_parent as usize].child1 = new_parent;
        } else {
            self.nodes[old_parent as usize].child2 = new_parent;
        }

        self.refit_upwards(self.nodes[leaf as usize].parent);
    }

    fn descend_cost(&self, child: u32, leaf_aabb: &Aabb, inheritance_cost: f32) -> f32 {
        let node = &self.nodes[child as usize];
        let combined = leaf_aabb.union(&node.aabb);
        if node.is_leaf() {
            combined.perimeter() + inheritance_cost
        } else {
            combined.perimeter() - node.aabb.perimeter() + inheritance_cost
        }
    }

    fn remove_leaf(&mut self, leaf: u32) {
        if leaf == self.root {
            self.root = NULL_NODE;
            return;
        }

        let parent = self.nodes[leaf as usize].parent;
        let grand_parent = self.nodes[parent as usize].parent;
        let sibling = if self.nodes[parent as usize].child1 == leaf {
            self.nodes[parent as usize].child2
        } else {
            self.nodes[parent as usize].child1
        };

        if grand_parent == NULL_NODE {
            self.root = sibling;
            self.nodes[sibling as usize].parent = NULL_NODE;
            self.free_node(parent);
            return;
        }

        if self.nodes[grand_parent as usize].child1 == parent {
            self.nodes[grand_parent as usize].child1 = sibling;
        } else {
            self.nodes[grand_parent as usize].child2 = sibling;
        }
        self.nodes[sibling as usize].parent = grand_parent;
        self.free_node(parent);

        self.refit_upwards(grand_parent);
    }

    fn refit_upwards(&mut self, start: u32) {
        let mut index = start;
        while index != NULL_NODE {
            index = self.balance(index);

            let (child1, child2) = {
                let node = &self.nodes[index as usize];
                (node.child1, node.child2)
            };
            let height = 1 + self.nodes[child1 as usize]
                .height
                .max(self.nodes[child2 as usize].height);
            let aabb = self.nodes[child1 as usize]
                .aabb
                .union(&self.nodes[child2 as usize].aabb);
            let node = &mut self.nodes[index as usize];
            node.height = height;
            node.aabb = aabb;

            index = node.parent;
        }
    }

    /// Rotates the taller grandchild up when `a` is out of balance.
    fn balance(&mut self, a: u32) -> u32 {
        let node_a = &self.nodes[a as usize];
        if node_a.is_leaf() || node_a.height < 2 {
            return a;
        }

        let b = node_a.child1;
        let c = node_a.child2;
        let balance = self.nodes[c as usize].height - self.nodes[b as usize].height;

        if balance > 1 {
            self.rotate_up(a, c, b, false)
        } else if balance < -1 {
            self.rotate_up(a, b, c, true)
        } else {
            a
        }
    }

    /// Promotes `up` (a child of `a`) into `a`'s place; `other` is `a`'s
    /// remaining child. `up_was_child1` tells which slot `up` occupied.
    fn rotate_up(&mut self, a: u32, up: u32, other: u32, up_was_child1: bool) -> u32 {
        let f = self.nodes[up as usize].child1;
        let g = self.nodes[up as usize].child2;

        let a_parent = self.nodes[a as usize].parent;
        self.nodes[up as usize].child1 = a;
        self.nodes[up as usize].parent = a_parent;
        self.nodes[a as usize].parent = up;

        if a_parent == NULL_NODE {
            self.root = up;
        } else if self.nodes[a_parent as usize].child1 == a {
            self.nodes[a_parent as usize].child1 = up;
        } else {
            self.nodes[a_parent as usize].child2 = up;
        }

        // The taller grandchild stays with `up`; the shorter one moves to `a`.
        let (keep, give) = if self.nodes[f as usize].height > self.nodes[g as usize].height {
            (f, g)
        } else {
            (g, f)
        };
        self.nodes[up as usize].child2 = keep;
        if up_was_child1 {
            self.nodes[a as usize].child1 = give;
        } else {
            self.nodes[a as usize].child2 = give;
        }
        self.nodes[give as usize].parent = a;

        let a_aabb = self.nodes[other as usize]
            .aabb
            .union(&self.nodes[give as usize].aabb);
        let a_height = 1 + self.nodes[other as usize]
            .height
            .max(self.nodes[give as usize].height);
        self.nodes[a as usize].aabb = a_aabb;
        self.nodes[a as usize].height = a_height;

        let up_aabb = a_aabb.union(&self.nodes[keep as usize].aabb);
        let up_height = 1 + a_height.max(self.nodes[keep as usize].height);
        self.nodes[up as usize].aabb = up_aabb;
        self.nodes[up as usize].height = up_height;

        up
    }
}

/// Broad-phase front end: the tree plus a buffer of proxies that moved.
#[derive(Debug, Clone)]
pub struct BroadPhase {
    tree: DynamicTree,
    move_buffer: Vec<ProxyId>,
    max_proxies: usize,
}

impl BroadPhase {
    pub fn new(max_proxies: usize) -> Self {
        Self {
            tree: DynamicTree::new(),
            move_buffer: Vec::new(),
            max_proxies,
        }
    }

    pub fn tree(&self) -> &DynamicTree {
        &self.tree
    }

    pub fn proxy_count(&self) -> usize {
        self.tree.proxy_count()
    }

    pub fn set_max_proxies(&mut self, max_proxies: usize) {
        self.max_proxies = max_proxies;
    }

    /// Adds a proxy, refusing it once the proxy cap is reached.
    pub fn insert(&mut self, collider: EntityId, aabb: Aabb) -> PhysicsResult<ProxyId> {
        if self.tree.proxy_count() >= self.max_proxies {
            return Err(PhysicsError::CapacityExceeded {
                resource: "broad-phase proxies",
                limit: self.max_proxies,
            });
        }
        if !aabb.is_valid() {
            return Err(PhysicsError::InvalidGeometry(
                "collider bounds are not finite".into(),
            ));
        }
        let proxy = self.tree.create_proxy(aabb, collider);
        self.move_buffer.push(proxy);
        Ok(proxy)
    }

    pub fn remove(&mut self, proxy: ProxyId) {
        self.move_buffer.retain(|queued| *queued != proxy);
        self.tree.destroy_proxy(proxy);
    }

    /// Returns whether the tree had to be updated.
    pub fn move_proxy(&mut self, proxy: ProxyId, aabb: Aabb, displacement: Vec2) -> bool {
        let changed = self.tree.move_proxy(proxy, aabb, displacement);
        if changed {
            self.move_buffer.push(proxy);
        }
        changed
    }

    /// Queues a proxy for pairing without changing its bounds.
    pub fn touch_proxy(&mut self, proxy: ProxyId) {
        self.move_buffer.push(proxy);
    }

    pub fn test_overlap(&self, a: ProxyId, b: ProxyId) -> bool {
        self.tree.fat_aabb(a).overlaps(&self.tree.fat_aabb(b))
    }

    pub fn fat_aabb(&self, proxy: ProxyId) -> Aabb {
        self.tree.fat_aabb(proxy)
    }

    /// Collects new candidate pairs for every moved proxy.
    ///
    /// Pairs hold collider ids ordered `(low, high)`, sorted and deduplicated.
    pub fn update_pairs(&mut self) -> Vec<(EntityId, EntityId)> {
        let mut pairs = Vec::new();
        let tree = &self.tree;

        for &query_proxy in &self.move_buffer {
            let fat = tree.fat_aabb(query_proxy);
            let query_user = tree.user_data(query_proxy);
            tree.query(&fat, |proxy, user| {
                if proxy == query_proxy {
                    return true;
                }
                // Both moved: only the higher query proxy reports the pair.
                if tree.was_moved(proxy) && proxy > query_proxy {
                    return true;
                }
                pairs.push(if query_user < user {
                    (query_user, user)
                } else {
                    (user, query_user)
                });
                true
            });
        }

        for proxy in self.move_buffer.drain(..) {
            self.tree.clear_moved(proxy);
        }

        pairs.sort_unstable();
        pairs.dedup();
        pairs
    }

    pub fn query<F>(&self, aabb: &Aabb, callback: F)
    where
        F: FnMut(ProxyId, EntityId) -> bool,
    {
        self.tree.query(aabb, callback);
    }

    pub fn ray_cast<F>(&self, origin: Vec2, translation: Vec2, max_fraction: f32, callback: F)
    where
        F: FnMut(ProxyId, EntityId, f32) -> f32,
    {
        self.tree.ray_cast(origin, translation, max_fraction, callback);
    }
}
