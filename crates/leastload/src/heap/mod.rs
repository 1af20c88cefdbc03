//! Indexed binary min-heap.
//!
//! [`IndexedHeap`] stores `(id, key)` entries in a contiguous array and keeps a
//! second table mapping each `id` to its current slot. Every swap performed by
//! sift-up or sift-down updates both swapped entries in that table, which is
//! what lets [`IndexedHeap::remove_at`] pull an arbitrary entry out of the
//! middle of the heap in `O(log n)`.
//!
//! Ids are small dense integers (indices into an arena owned by the caller),
//! so the position table is a plain `Vec` rather than a map.


use crate::error::{Error, Result};

/// Largest id an [`IndexedHeap`] accepts. Bounds the position table.
pub const MAX_ID: usize = (1 << 20) - 1;

/// Slot index of an entry inside an [`IndexedHeap`].
pub type Position = usize;

/// A single heap entry: an arena index and the key it is ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry<K> {
    pub id: usize,
    pub key: K,
}

/// A binary min-heap over [`Entry`] values with position tracking.
///
/// Ties between equal keys are broken by whatever the swap sequence produces;
/// no insertion-order stability is promised.
#[derive(Debug, Clone)]
pub struct IndexedHeap<K> {
    slots: Vec<Entry<K>>,
    positions: Vec<Option<Position>>,
}

impl<K> Default for IndexedHeap<K> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            positions: Vec::new(),
        }
    }
}

impl<K: Ord> IndexedHeap<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty heap sized for ids in `0..capacity`.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            positions: vec![None; capacity],
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Returns the minimum entry without removing it.
    pub fn peek(&self) -> Option<&Entry<K>> {
        self.slots.first()
    }

    /// Returns the slot currently holding `id`, if it is in the heap.
    pub fn position(&self, id: usize) -> Option<Position> {
        self.positions.get(id).copied().flatten()
    }

    pub fn contains(&self, id: usize) -> bool {
        self.position(id).is_some()
    }

    /// Iterates over the entries in slot order (not sorted order).
    pub fn iter(&self) -> impl Iterator<Item = &Entry<K>> {
        self.slots.iter()
    }

    /// Adds `id` with `key` and restores heap order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvariantViolation`] if `id` is already in the heap or
    /// exceeds [`MAX_ID`].
    pub fn insert(&mut self, id: usize, key: K) -> Result<()> {
        if id > MAX_ID {
            return Err(Error::invariant(format!("entry {id} exceeds the maximum id {MAX_ID}")));
        }
        if self.contains(id) {
            return Err(Error::invariant(format!("entry {id} is already in the heap")));
        }

        if id >= self.positions.len() {
            self.positions.resize(id + 1, None);
        }

        let pos = self.slots.len();
        self.slots.push(Entry { id, key });
        self.positions[id] = Some(pos);
        self.sift_up(pos);
        Ok(())
    }

    /// Removes and returns the entry with the smallest key.
    pub fn least(&mut self) -> Option<Entry<K>> {
        self.remove_at(0)
    }

    /// Removes the entry at slot `pos` and restores heap order among the
    /// remaining entries. Returns `None` if `pos` is out of range.
    pub fn remove_at(&mut self, pos: Position) -> Option<Entry<K>> {
        let last = self.slots.len().checked_sub(1)?;
        if pos > last {
            return None;
        }

        if pos != last {
            self.swap(pos, last);
        }

        let entry = self.slots.pop()?;
        self.positions[entry.id] = None;

        // The entry moved into `pos` came from the bottom of the heap, so it
        // may belong either above or below its new slot.
        if pos < self.slots.len() && !self.sift_down(pos) {
            self.sift_up(pos);
        }

        Some(entry)
    }

    /// Checks the heap property and that every recorded position points at
    /// the slot actually holding that id.
    pub fn is_valid(&self) -> bool {
        let ordered = self
            .slots
            .iter()
            .enumerate()
            .skip(1)
            .all(|(pos, entry)| self.slots[(pos - 1) / 2].key <= entry.key);

        let tracked = self
            .slots
            .iter()
            .enumerate()
            .all(|(pos, entry)| self.position(entry.id) == Some(pos));

        let recorded = self.positions.iter().filter(|p| p.is_some()).count();

        ordered && tracked && recorded == self.slots.len()
    }

    fn swap(&mut self, a: Position, b: Position) {
        self.slots.swap(a, b);
        self.positions[self.slots[a].id] = Some(a);
        self.positions[self.slots[b].id] = Some(b);
    }

    fn sift_up(&mut self, mut pos: Position) {
        while pos > 0 {
            let parent = (pos - 1) / 2;
            if self.slots[pos].key >= self.slots[parent].key {
                break;
            }
            self.swap(pos, parent);
            pos = parent;
        }
    }

    /// Returns `true` if the entry at `start` moved down.
    fn sift_down(&mut self, start: Position) -> bool {
        let len = self.slots.len();
        let mut pos = start;

        loop {
            let left = 2 * pos + 1;
            if left >= len {
                break;
            }

            let right = left + 1;
            let child = if right < len && self.slots[right].key < self.slots[left].key {
                right
            } else {
                left
            };

            if self.slots[child].key >= self.slots[pos].key {
                break;
            }

            self.swap(pos, child);
            pos = child;
        }

        pos > start
    }
}
