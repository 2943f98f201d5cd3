use std::cmp::Ordering;
use std::marker::PhantomData;

use crate::tree::store::{Key, Store};

/// Heap order for an [`IndexedHeap`].
///
/// Implementations compare two nodes and give the heap access to the slot
/// the node reserves for this heap kind. A node participates in at most
/// one heap per kind, so the slot doubles as a membership test.
pub(crate) trait HeapOrder {
    fn cmp(store: &Store, a: Key, b: Key) -> Ordering;
    fn slot(store: &Store, key: Key) -> Option<usize>;
    fn set_slot(store: &mut Store, key: Key, slot: Option<usize>);
}

/// A position-tracking binary min-heap over nodes in a [`Store`].
///
/// Every sift writes the node's new position back into its slot, which
/// keeps [`remove`](IndexedHeap::remove) and
/// [`re_prioritize`](IndexedHeap::re_prioritize) at O(log n). The heap
/// never contains the same node twice.
#[derive(Debug)]
pub(crate) struct IndexedHeap<O> {
    entries: Vec<Key>,
    _order: PhantomData<O>,
}

impl<O> Default for IndexedHeap<O> {
    fn default() -> Self {
        IndexedHeap {
            entries: Vec::new(),
            _order: PhantomData,
        }
    }
}

impl<O: HeapOrder> IndexedHeap<O> {
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// The minimum node, without removing it.
    pub(crate) fn peek(&self) -> Option<Key> {
        self.entries.first().copied()
    }

    pub(crate) fn push(&mut self, store: &mut Store, key: Key) {
        debug_assert!(O::slot(store, key).is_none(), "node already queued");

        let at = self.entries.len();
        self.entries.push(key);
        O::set_slot(store, key, Some(at));
        self.sift_up(store, at);
    }

    /// Remove and return the minimum node.
    pub(crate) fn pop(&mut self, store: &mut Store) -> Option<Key> {
        if self.entries.is_empty() {
            return None;
        }

        let min = self.entries.swap_remove(0);
        O::set_slot(store, min, None);

        if !self.entries.is_empty() {
            O::set_slot(store, self.entries[0], Some(0));
            self.sift_down(store, 0);
        }

        Some(min)
    }

    /// Remove `key` wherever it sits, returning whether it was present.
    pub(crate) fn remove(&mut self, store: &mut Store, key: Key) -> bool {
        let Some(at) = O::slot(store, key) else {
            return false;
        };
        debug_assert_eq!(self.entries.get(at).copied(), Some(key));

        O::set_slot(store, key, None);
        self.entries.swap_remove(at);

        if at < self.entries.len() {
            O::set_slot(store, self.entries[at], Some(at));
            self.update(store, at);
        }

        true
    }

    /// Restore heap order after `key`'s priority changed in place.
    ///
    /// No-op when the node is not in this heap.
    pub(crate) fn re_prioritize(&mut self, store: &mut Store, key: Key) {
        if let Some(at) = O::slot(store, key) {
            debug_assert_eq!(self.entries.get(at).copied(), Some(key));
            self.update(store, at);
        }
    }

    fn update(&mut self, store: &mut Store, at: usize) {
        let at = self.sift_up(store, at);
        self.sift_down(store, at);
    }

    fn sift_up(&mut self, store: &mut Store, mut at: usize) -> usize {
        while at > 0 {
            let parent = (at - 1) / 2;
            if O::cmp(store, self.entries[at], self.entries[parent]) != Ordering::Less {
                break;
            }
            self.swap(store, at, parent);
            at = parent;
        }
        at
    }

    fn sift_down(&mut self, store: &mut Store, mut at: usize) {
        loop {
            let left = 2 * at + 1;
            if left >= self.entries.len() {
                break;
            }

            let right = left + 1;
            let mut smallest = left;
            if right < self.entries.len()
                && O::cmp(store, self.entries[right], self.entries[left]) == Ordering::Less
            {
                smallest = right;
            }

            if O::cmp(store, self.entries[smallest], self.entries[at]) != Ordering::Less {
                break;
            }
            self.swap(store, at, smallest);
            at = smallest;
        }
    }

    fn swap(&mut self, store: &mut Store, a: usize, b: usize) {
        self.entries.swap(a, b);
        O::set_slot(store, self.entries[a], Some(a));
        O::set_slot(store, self.entries[b], Some(b));
    }

    #[cfg(test)]
    pub(crate) fn assert_consistent(&self, store: &Store) {
        for (at, &key) in self.entries.iter().enumerate() {
            assert_eq!(O::slot(store, key), Some(at), "stale slot index");
            if at > 0 {
                let parent = (at - 1) / 2;
                assert_ne!(
                    O::cmp(store, key, self.entries[parent]),
                    Ordering::Less,
                    "heap order violated",
                );
            }
        }
    }
}
