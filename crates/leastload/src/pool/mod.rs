//! Load-ordered worker pool.
//!
//! [`WorkerPool`] owns an arena of members, each carrying a load counter and a
//! caller-provided payload (the dispatcher stores the worker's queue sender
//! there). Ordering lives in an [`IndexedHeap`] keyed by load, with members
//! referenced by their [`WorkerId`] (the arena index). A member's identity,
//! queue and counter never move; only its heap slot changes.
//!
//! Load counters may only change while the member is detached from the heap
//! (between [`WorkerPool::least`]/[`WorkerPool::remove_at`] and
//! [`WorkerPool::insert`]), so the key stored in the heap always matches the
//! member's load once it is re-attached.

mod stats;
#[cfg(test)]
mod tests;

pub use stats::PoolStats;

use crate::error::{Error, Result};
use crate::heap::{IndexedHeap, Position};

/// Stable identity of a worker: its index in the pool arena.
pub type WorkerId = usize;

#[derive(Debug)]
struct Member<T> {
    load: usize,
    inner: T,
}

/// A fixed set of workers kept in least-loaded-first order.
#[derive(Debug)]
pub struct WorkerPool<T> {
    members: Vec<Member<T>>,
    heap: IndexedHeap<usize>,
}

impl<T> WorkerPool<T> {
    /// Builds a pool from `workers`, all starting at load zero. The n-th item
    /// becomes worker `n`.
    pub fn new(workers: impl IntoIterator<Item = T>) -> Self {
        let members: Vec<Member<T>> = workers
            .into_iter()
            .map(|inner| Member { load: 0, inner })
            .collect();

        let mut heap = IndexedHeap::with_capacity(members.len());
        for id in 0..members.len() {
            // Fresh ids cannot collide.
            let _ = heap.insert(id, 0);
        }

        Self { members, heap }
    }

    /// Number of workers in the pool, attached or not.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Detaches and returns the worker with the smallest load.
    ///
    /// # Errors
    ///
    /// An empty heap here means every worker is detached, which only happens
    /// if a previous event failed to re-attach one.
    pub fn least(&mut self) -> Result<WorkerId> {
        self.heap
            .least()
            .map(|entry| entry.id)
            .ok_or_else(|| Error::invariant("no worker available in the pool"))
    }

    /// Detaches the worker at heap slot `pos`.
    pub fn remove_at(&mut self, pos: Position) -> Result<WorkerId> {
        self.heap
            .remove_at(pos)
            .map(|entry| entry.id)
            .ok_or_else(|| Error::invariant(format!("no worker at heap position {pos}")))
    }

    /// Re-attaches `worker` using its current load as the key.
    pub fn insert(&mut self, worker: WorkerId) -> Result<()> {
        let load = self.member(worker)?.load;
        self.heap.insert(worker, load)
    }

    /// Heap slot of `worker`, or `None` while it is detached.
    pub fn position(&self, worker: WorkerId) -> Option<Position> {
        self.heap.position(worker)
    }

    /// Id of the least loaded attached worker, without detaching it.
    pub fn peek_least(&self) -> Option<WorkerId> {
        self.heap.peek().map(|entry| entry.id)
    }

    pub fn load(&self, worker: WorkerId) -> Option<usize> {
        self.members.get(worker).map(|m| m.load)
    }

    pub fn get(&self, worker: WorkerId) -> Option<&T> {
        self.members.get(worker).map(|m| &m.inner)
    }

    /// Sum of all load counters.
    pub fn total_load(&self) -> usize {
        self.members.iter().map(|m| m.load).sum()
    }

    pub(crate) fn increment_load(&mut self, worker: WorkerId) -> Result<usize> {
        self.ensure_detached(worker)?;
        let member = self.member_mut(worker)?;
        member.load += 1;
        Ok(member.load)
    }

    pub(crate) fn decrement_load(&mut self, worker: WorkerId) -> Result<usize> {
        self.ensure_detached(worker)?;
        let member = self.member_mut(worker)?;
        member.load = member
            .load
            .checked_sub(1)
            .ok_or_else(|| Error::invariant(format!("worker {worker} load would go negative")))?;
        Ok(member.load)
    }

    /// Snapshot of every worker's load with mean and variance.
    pub fn stats(&self) -> PoolStats {
        PoolStats::from_loads(self.members.iter().map(|m| m.load).collect())
    }

    /// Heap is valid, every worker is attached, and each heap key equals the
    /// worker's load. Holds between dispatcher events.
    pub fn is_consistent(&self) -> bool {
        self.heap.is_valid()
            && self.heap.len() == self.members.len()
            && self
                .heap
                .iter()
                .all(|entry| self.load(entry.id) == Some(entry.key))
    }

    fn ensure_detached(&self, worker: WorkerId) -> Result<()> {
        match self.heap.position(worker) {
            Some(pos) => Err(Error::invariant(format!(
                "worker {worker} load changed while attached at heap position {pos}"
            ))),
            None => Ok(()),
        }
    }

    fn member(&self, worker: WorkerId) -> Result<&Member<T>> {
        self.members
            .get(worker)
            .ok_or_else(|| Error::invariant(format!("unknown worker {worker}")))
    }

    fn member_mut(&mut self, worker: WorkerId) -> Result<&mut Member<T>> {
        self.members
            .get_mut(worker)
            .ok_or_else(|| Error::invariant(format!("unknown worker {worker}")))
    }
}
