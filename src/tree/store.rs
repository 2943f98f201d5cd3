use std::hash::BuildHasherDefault;
use std::mem;
use std::ops;

use fnv::FnvHasher;
use indexmap::IndexMap;
use slab::Slab;
use smallvec::SmallVec;

use crate::stream_id::StreamId;
use crate::tree::node::Node;

/// Exclusive re-parents move every sibling at once; eight slots keep the
/// common fan-out off the heap.
const DEFAULT_EVENT_STACK_SIZE: usize = 8;

/// References a node in the [`Store`] arena.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub(crate) struct Key(usize);

/// Records that `node` was moved away from `old_parent`.
///
/// Mutations only collect these; the distributor replays them afterwards
/// to re-seat nodes in queues and the retention heap.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ParentChanged {
    pub(crate) node: Key,
    pub(crate) old_parent: Option<Key>,
}

pub(crate) type Events = SmallVec<[ParentChanged; DEFAULT_EVENT_STACK_SIZE]>;

/// Arena of priority nodes, indexed by [`Key`] and by stream id.
///
/// All tree mutations go through the store so that parent links, depths,
/// queue memberships, and active-subtree counts move together.
#[derive(Debug, Default)]
pub(crate) struct Store {
    slab: Slab<Node>,
    ids: IndexMap<StreamId, usize, BuildHasherDefault<FnvHasher>>,
}

impl Store {
    pub(crate) fn new() -> Store {
        Store::default()
    }

    pub(crate) fn insert(&mut self, node: Node) -> Key {
        let stream_id = node.stream_id;
        let key = Key(self.slab.insert(node));
        let prev = self.ids.insert(stream_id, key.0);
        debug_assert!(prev.is_none(), "duplicate node for {:?}", stream_id);
        key
    }

    pub(crate) fn get(&self, stream_id: StreamId) -> Option<Key> {
        self.ids.get(&stream_id).copied().map(Key)
    }

    /// Drop a node that is no longer linked anywhere.
    pub(crate) fn release(&mut self, key: Key) {
        debug_assert!(self[key].parent.is_none());
        debug_assert!(self[key].children.is_empty());
        debug_assert!(self[key].pseudo_time_slot.is_none());
        debug_assert!(self[key].eviction_slot.is_none());

        let stream_id = self[key].stream_id;
        self.ids.swap_remove(&stream_id);
        self.slab.remove(key.0);
    }

    #[cfg(test)]
    pub(crate) fn keys(&self) -> impl Iterator<Item = Key> + '_ {
        self.slab.iter().map(|(at, _)| Key(at))
    }

    // ===== tree mutations =====

    /// Walk up the parent links looking for `ancestor`.
    pub(crate) fn is_descendant_of(&self, key: Key, ancestor: Key) -> bool {
        let mut next = self[key].parent;
        while let Some(current) = next {
            if current == ancestor {
                return true;
            }
            next = self[current].parent;
        }
        false
    }

    /// Detach `key` from its current parent, fixing queue membership and
    /// ancestor active counts, then hang it under `new_parent`.
    fn set_parent(&mut self, key: Key, new_parent: Option<Key>) {
        let active_count = self[key].active_count_for_tree;
        if active_count > 0 {
            if let Some(old_parent) = self[key].parent {
                self.remove_pseudo_time_queue(old_parent, key);
                self.active_count_change_for_tree(old_parent, -i64::from(active_count));
            }
        }

        // Only the re-linked node is restamped; descendants keep the
        // depth they were stamped with when they were last linked.
        let depth = match new_parent {
            Some(parent) => self[parent].depth + 1,
            None => usize::MAX,
        };
        self[key].parent = new_parent;
        self[key].depth = depth;
    }

    /// Make `child` a dependent of `parent`, exclusively if requested.
    ///
    /// Appends one event per node whose parent changes; re-seating into
    /// the new parent's queue happens when the events are replayed.
    pub(crate) fn take_child(
        &mut self,
        parent: Key,
        child: Key,
        exclusive: bool,
        events: &mut Events,
    ) {
        let old_parent = self[child].parent;
        if old_parent != Some(parent) {
            events.push(ParentChanged {
                node: child,
                old_parent,
            });
            self.set_parent(child, Some(parent));

            let child_id = self[child].stream_id;
            if let Some(old_parent) = old_parent {
                self[old_parent].children.swap_remove(&child_id);
            }
            let prev = self[parent].children.insert(child_id, child);
            debug_assert!(prev.is_none());
        }

        if exclusive && self[parent].children.len() > 1 {
            // The child adopts all of its new siblings.
            let siblings: SmallVec<[Key; DEFAULT_EVENT_STACK_SIZE]> = self[parent]
                .children
                .values()
                .filter(|&&sibling| sibling != child)
                .copied()
                .collect();
            for sibling in siblings {
                self.take_child(child, sibling, false, events);
            }
        }
    }

    /// Unlink `child` from `parent`, lifting grandchildren into `parent`.
    ///
    /// The child is left detached; the caller releases it after replaying
    /// the events.
    pub(crate) fn remove_child(&mut self, parent: Key, child: Key, events: &mut Events) {
        let child_id = self[child].stream_id;
        if self[parent].children.swap_remove(&child_id).is_none() {
            return;
        }

        events.push(ParentChanged {
            node: child,
            old_parent: Some(parent),
        });
        self.set_parent(child, None);

        let grandchildren: SmallVec<[Key; DEFAULT_EVENT_STACK_SIZE]> =
            self[child].children.values().copied().collect();
        for grandchild in grandchildren {
            self.take_child(parent, grandchild, false, events);
        }
        debug_assert!(self[child].children.is_empty());
    }

    // ===== pseudo-time queue maintenance =====

    /// Enqueue `child` with a deadline inherited from the parent's clock.
    pub(crate) fn offer_and_initialize_pseudo_time(&mut self, parent: Key, child: Key) {
        self[child].pseudo_time_to_write = self[parent].pseudo_time;
        self.offer_pseudo_time_queue(parent, child);
    }

    pub(crate) fn offer_pseudo_time_queue(&mut self, parent: Key, child: Key) {
        let mut queue = mem::take(&mut self[parent].pseudo_time_queue);
        queue.push(self, child);
        self[parent].pseudo_time_queue = queue;

        let weight = u64::from(self[child].weight);
        self[parent].total_queued_weights += weight;
    }

    pub(crate) fn poll_pseudo_time_queue(&mut self, parent: Key) -> Option<Key> {
        let mut queue = mem::take(&mut self[parent].pseudo_time_queue);
        let polled = queue.pop(self);
        self[parent].pseudo_time_queue = queue;

        if let Some(child) = polled {
            let weight = u64::from(self[child].weight);
            self[parent].total_queued_weights -= weight;
        }
        polled
    }

    pub(crate) fn remove_pseudo_time_queue(&mut self, parent: Key, child: Key) -> bool {
        let mut queue = mem::take(&mut self[parent].pseudo_time_queue);
        let removed = queue.remove(self, child);
        self[parent].pseudo_time_queue = queue;

        if removed {
            let weight = u64::from(self[child].weight);
            self[parent].total_queued_weights -= weight;
        }
        removed
    }

    pub(crate) fn peek_pseudo_time_queue(&self, parent: Key) -> Option<Key> {
        self[parent].pseudo_time_queue.peek()
    }

    /// Apply an active-subtree count change at `key` and propagate it up
    /// the ancestor chain, fixing queue membership along the way.
    ///
    /// A subtree becoming runnable is enqueued unless it is the node the
    /// scheduler is currently servicing; that node is re-seated when the
    /// distribution walk unwinds.
    pub(crate) fn active_count_change_for_tree(&mut self, key: Key, delta: i64) {
        let mut current = key;
        loop {
            let count = {
                let node = &mut self[current];
                let updated = i64::from(node.active_count_for_tree) + delta;
                debug_assert!(updated >= 0, "active count underflow");
                node.active_count_for_tree = updated.max(0) as u32;
                node.active_count_for_tree
            };

            let Some(parent) = self[current].parent else {
                break;
            };

            if count == 0 {
                self.remove_pseudo_time_queue(parent, current);
            } else if i64::from(count) == delta && !self[current].is_distributing() {
                self.offer_and_initialize_pseudo_time(parent, current);
            }

            current = parent;
        }
    }
}

impl ops::Index<Key> for Store {
    type Output = Node;

    fn index(&self, key: Key) -> &Node {
        &self.slab[key.0]
    }
}

impl ops::IndexMut<Key> for Store {
    fn index_mut(&mut self, key: Key) -> &mut Node {
        &mut self.slab[key.0]
    }
}
