use serde::{Deserialize, Serialize};

/// Dense handle with generation tracking so stale references never alias a reused slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct EntityId {
    index: u32,
    generation: u32,
}

impl EntityId {
    pub const NULL: EntityId = EntityId {
        index: u32::MAX,
        generation: 0,
    };

    pub fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub fn from_index(index: u32) -> Self {
        Self::new(index, 0)
    }

    pub fn index(&self) -> usize {
        self.index as usize
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn is_null(&self) -> bool {
        self.index == u32::MAX
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::NULL
    }
}

/// Generational arena handing out stable [`EntityId`]s.
///
/// Iteration always walks slots in index order, which keeps every pass of the
/// stepper deterministic for a given creation history.
#[derive(Debug, Clone)]
pub struct Arena<T> {
    slots: Vec<Option<T>>,
    generations: Vec<u32>,
    free_list: Vec<u32>,
    len: usize,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            generations: Vec::new(),
            free_list: Vec::new(),
            len: 0,
        }
    }

    pub fn insert(&mut self, item: T) -> EntityId {
        self.len += 1;
        if let Some(index) = self.free_list.pop() {
            let slot = index as usize;
            self.slots[slot] = Some(item);
            return EntityId::new(index, self.generations[slot]);
        }

        let index = self.slots.len() as u32;
        self.slots.push(Some(item));
        self.generations.push(0);
        EntityId::new(index, 0)
    }

    /// Id the next [`Arena::insert`] will return.
    pub fn next_id(&self) -> EntityId {
        match self.free_list.last() {
            Some(&index) => EntityId::new(index, self.generations[index as usize]),
            None => EntityId::new(self.slots.len() as u32, 0),
        }
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: EntityId) -> Option<&T> {
        if !self.is_current(id) {
            return None;
        }
        self.slots.get(id.index()).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut T> {
        if !self.is_current(id) {
            return None;
        }
        self.slots.get_mut(id.index()).and_then(Option::as_mut)
    }

    /// Borrows two distinct live entries mutably, in argument order.
    pub fn get2_mut(&mut self, id_a: EntityId, id_b: EntityId) -> Option<(&mut T, &mut T)> {
        if id_a.index() == id_b.index() || !self.is_current(id_a) || !self.is_current(id_b) {
            return None;
        }

        let (low, high) = if id_a.index() < id_b.index() {
            (id_a.index(), id_b.index())
        } else {
            (id_b.index(), id_a.index())
        };
        let (left, right) = self.slots.split_at_mut(high);
        let low_item = left[low].as_mut()?;
        let high_item = right[0].as_mut()?;

        if id_a.index() < id_b.index() {
            Some((low_item, high_item))
        } else {
            Some((high_item, low_item))
        }
    }

    pub fn remove(&mut self, id: EntityId) -> Option<T> {
        if !self.is_current(id) {
            return None;
        }
        let item = self.slots[id.index()].take()?;
        self.generations[id.index()] = self.generations[id.index()].wrapping_add(1);
        self.free_list.push(id.index);
        self.len -= 1;
        Some(item)
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &T)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(move |(index, slot)| {
                slot.as_ref()
                    .map(|item| (EntityId::new(index as u32, self.generations[index]), item))
            })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (EntityId, &mut T)> + '_ {
        let generations = &self.generations;
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(move |(index, slot)| {
                slot.as_mut()
                    .map(|item| (EntityId::new(index as u32, generations[index]), item))
            })
    }

    pub fn values(&self) -> impl Iterator<Item = &T> + '_ {
        self.slots.iter().filter_map(Option::as_ref)
    }

    pub fn ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.iter().map(|(id, _)| id)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn is_current(&self, id: EntityId) -> bool {
        self.generations
            .get(id.index())
            .is_some_and(|generation| *generation == id.generation())
    }
}
