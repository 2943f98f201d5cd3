use std::cmp::Ordering;

use smallvec::SmallVec;

use crate::distributor::{ByteDistributor, PendingUpdates, StreamState, StreamWriter};
use crate::error::Error;
use crate::stream_id::StreamId;
use crate::tree::heap::{HeapOrder, IndexedHeap};
use crate::tree::node::{EvictionOrder, Node, MAX_WEIGHT, MIN_WEIGHT};
use crate::tree::store::{Events, Key, Store};

/// How many closed or not-yet-created streams keep their place in the
/// dependency tree by default.
const DEFAULT_MAX_STATE_ONLY_SIZE: usize = 5;

/// Default minimum allocation per scheduling step.
const DEFAULT_ALLOCATION_QUANTUM: usize = 1024;

/// Dependency chains deeper than this spill the walk stack to the heap.
const DEFAULT_WALK_STACK_SIZE: usize = 8;

/// One level of the distribution walk: `child` was popped from `node`'s
/// queue, whose weight sum was `total_queued_weights` at the time.
struct Frame {
    node: Key,
    child: Key,
    total_queued_weights: u64,
}

type WalkStack = SmallVec<[Frame; DEFAULT_WALK_STACK_SIZE]>;

/// A byte distributor that allocates bandwidth in proportion to stream
/// weights while honoring the RFC 7540 dependency tree.
///
/// Scheduling follows the weighted fair queueing discipline: every node
/// keeps a queue of its runnable children ordered by a virtual deadline,
/// and each pass services the child whose deadline is smallest, advancing
/// the deadline by `written * total_weight / weight`. Over time each
/// subtree receives bytes in proportion to its weight among its siblings.
///
/// Priority information for streams that are closed, or that a PRIORITY
/// frame named before they were created, is retained in a bounded
/// state-only set so the tree shape survives stream churn.
///
/// All methods must be called from the single executor that owns the
/// connection; nothing here is thread-safe.
#[derive(Debug)]
pub struct WeightedFairQueue {
    store: Store,
    root: Key,
    state_only_queue: IndexedHeap<EvictionOrder>,
    max_state_only_size: usize,
    allocation_quantum: usize,
}

impl Default for WeightedFairQueue {
    fn default() -> Self {
        WeightedFairQueue::new()
    }
}

impl WeightedFairQueue {
    /// A distributor retaining up to five state-only streams.
    pub fn new() -> WeightedFairQueue {
        WeightedFairQueue::with_max_state_only_size(DEFAULT_MAX_STATE_ONLY_SIZE)
    }

    /// A distributor retaining up to `max_state_only_size` state-only
    /// streams. Zero disables retention entirely: unknown ids in PRIORITY
    /// frames are ignored and removed streams are dropped immediately.
    pub fn with_max_state_only_size(max_state_only_size: usize) -> WeightedFairQueue {
        let mut store = Store::new();
        let root = store.insert(Node::root());
        WeightedFairQueue {
            store,
            root,
            state_only_queue: IndexedHeap::default(),
            max_state_only_size,
            allocation_quantum: DEFAULT_ALLOCATION_QUANTUM,
        }
    }

    /// The minimum number of bytes offered per scheduling step.
    pub fn allocation_quantum(&self) -> usize {
        self.allocation_quantum
    }

    /// Set the allocation quantum. Larger values amortize scheduling
    /// overhead at the cost of fairness granularity.
    pub fn set_allocation_quantum(&mut self, allocation_quantum: usize) -> Result<(), Error> {
        if allocation_quantum == 0 {
            return Err(Error::invalid_argument("allocation quantum must be positive"));
        }
        self.allocation_quantum = allocation_quantum;
        Ok(())
    }

    /// Returns true if `child_id` depends directly on `parent_id` with the
    /// given weight.
    pub fn is_child(&self, child_id: StreamId, parent_id: StreamId, weight: u16) -> bool {
        match (self.store.get(child_id), self.store.get(parent_id)) {
            (Some(child), Some(parent)) => {
                self.store[child].parent == Some(parent) && self.store[child].weight == weight
            }
            _ => false,
        }
    }

    /// The number of direct dependents of `stream_id`.
    pub fn num_children(&self, stream_id: StreamId) -> usize {
        self.store
            .get(stream_id)
            .map_or(0, |key| self.store[key].children.len())
    }

    /// Returns true if any priority state is held for `stream_id`.
    pub fn contains(&self, stream_id: StreamId) -> bool {
        self.store.get(stream_id).is_some()
    }

    // ===== state-only retention =====

    fn new_state_only(&mut self, stream_id: StreamId) -> Key {
        let key = self.store.insert(Node::new(stream_id));
        self.state_only_queue.push(&mut self.store, key);
        key
    }

    /// Evict until the retention set is back within bounds.
    fn trim_state_only(&mut self) {
        while self.state_only_queue.len() > self.max_state_only_size {
            let Some(evicted) = self.state_only_queue.pop(&mut self.store) else {
                break;
            };
            tracing::debug!(
                "evicting state-only stream; stream_id={:?}",
                self.store[evicted].stream_id
            );
            self.drop_from_tree(evicted);
        }
    }

    /// Unlink `key` from the tree (lifting its children) and release it.
    fn drop_from_tree(&mut self, key: Key) {
        if let Some(parent) = self.store[key].parent {
            let mut events = Events::new();
            self.store.remove_child(parent, key, &mut events);
            self.notify_parent_changed(&events);
        }
        self.store.release(key);
    }

    // ===== tree bookkeeping =====

    /// Replay parent-changed events: refresh retention ordering and seat
    /// re-parented active subtrees in their new parent's queue.
    fn notify_parent_changed(&mut self, events: &Events) {
        for event in events {
            // Depth feeds the eviction order.
            self.state_only_queue.re_prioritize(&mut self.store, event.node);

            let Some(parent) = self.store[event.node].parent else {
                continue;
            };
            let active_count = self.store[event.node].active_count_for_tree;
            if active_count > 0 {
                self.store.offer_and_initialize_pseudo_time(parent, event.node);
                self.store
                    .active_count_change_for_tree(parent, i64::from(active_count));
            }
        }
    }

    fn set_streamable(&mut self, key: Key, streamable_bytes: usize, is_active: bool) {
        if self.store[key].is_active() != is_active {
            self.store
                .active_count_change_for_tree(key, if is_active { 1 } else { -1 });
            self.store[key].flags.set_active(is_active);
        }
        self.store[key].streamable_bytes = streamable_bytes;
    }

    // ===== distribution =====

    /// Walk down from `node` along minimum-deadline children to a single
    /// active stream, write to it, then unwind, advancing clocks and
    /// re-seating every node on the path.
    fn distribute_to_children(
        &mut self,
        max_bytes: usize,
        writer: &mut dyn StreamWriter,
        node: Key,
    ) -> Result<usize, Error> {
        let mut frames = WalkStack::new();
        let mut current = node;
        let mut budget = max_bytes;

        let sent = loop {
            let total_queued_weights = self.store[current].total_queued_weights;
            let child = match self.store.poll_pseudo_time_queue(current) {
                Some(child) => child,
                // An active subtree always has a queued child: the node
                // being serviced is re-queued before the walk unwinds.
                None => unreachable!("active subtree with no queued children"),
            };
            let next = self.store.peek_pseudo_time_queue(current);
            self.store[child].flags.set_distributing(true);

            let quota = match next {
                None => budget,
                Some(next) => {
                    let deadline = self.store[child].pseudo_time_to_write;
                    let gap = self.store[next]
                        .pseudo_time_to_write
                        .wrapping_sub(deadline);
                    debug_assert!(gap as i64 >= 0, "queue polled out of deadline order");
                    // The bytes that bring this child's deadline level
                    // with the runner-up under proportional service, plus
                    // a quantum to amortize per-write overhead.
                    let catch_up = (gap
                        .saturating_mul(u64::from(self.store[child].weight))
                        / total_queued_weights)
                        .saturating_add(self.allocation_quantum as u64);
                    (budget as u64).min(catch_up) as usize
                }
            };

            frames.push(Frame {
                node: current,
                child,
                total_queued_weights,
            });

            if self.store[child].is_active() {
                let n = quota.min(self.store[child].streamable_bytes);
                let stream_id = self.store[child].stream_id;
                tracing::trace!("writing; stream_id={:?} len={}", stream_id, n);

                let mut pending = PendingUpdates::default();
                if let Err(source) = writer.write(stream_id, n, &mut pending) {
                    // Re-seat everything on the path before bailing so
                    // the tree is still schedulable after the failure.
                    self.unwind(&mut frames, 0, false);
                    return Err(Error::writer(source));
                }
                for update in pending.drain() {
                    self.update_streamable_bytes(
                        update.stream_id,
                        update.streamable_bytes,
                        update.has_frame,
                        update.window_size,
                    );
                }

                if n == 0 && quota != 0 {
                    // The stream could not use a non-zero slot; take it
                    // out of rotation so it stops blocking siblings.
                    let streamable_bytes = self.store[child].streamable_bytes;
                    self.set_streamable(child, streamable_bytes, false);
                }
                break n;
            }

            current = child;
            budget = quota;
        };

        self.unwind(&mut frames, sent, true);
        Ok(sent)
    }

    /// Pop the walk stack innermost-first. On the normal path each level
    /// advances its clock and the serviced child's deadline; on both paths
    /// the child is re-queued if its subtree is still runnable.
    fn unwind(&mut self, frames: &mut WalkStack, sent: usize, advance: bool) {
        while let Some(frame) = frames.pop() {
            let Frame {
                node,
                child,
                total_queued_weights,
            } = frame;

            if advance {
                let pseudo_time = self.store[node].pseudo_time.wrapping_add(sent as u64);
                self.store[node].pseudo_time = pseudo_time;

                // A deadline still ahead of the parent's clock means an
                // earlier quota was not fully consumed; fall back to the
                // clock before charging for this round.
                let deadline = self.store[child].pseudo_time_to_write;
                let base = if (deadline.wrapping_sub(pseudo_time) as i64) < 0 {
                    deadline
                } else {
                    pseudo_time
                };
                let weight = u64::from(self.store[child].weight);
                self.store[child].pseudo_time_to_write =
                    base.wrapping_add((sent as u64).saturating_mul(total_queued_weights) / weight);
            }

            self.store[child].flags.set_distributing(false);
            if self.store[child].active_count_for_tree > 0 {
                self.store.offer_pseudo_time_queue(node, child);
            }
        }
    }
}

impl ByteDistributor for WeightedFairQueue {
    fn update_streamable_bytes(
        &mut self,
        stream_id: StreamId,
        streamable_bytes: usize,
        has_frame: bool,
        window_size: i32,
    ) {
        let key = self
            .store
            .get(stream_id)
            .filter(|&key| self.store[key].flags.is_attached());
        let Some(key) = key.filter(|_| !stream_id.is_zero()) else {
            tracing::debug!(
                "ignoring streamable bytes for unknown or closed stream; stream_id={:?}",
                stream_id
            );
            return;
        };
        let is_active = has_frame && window_size >= 0;
        self.set_streamable(key, streamable_bytes, is_active);
    }

    fn update_dependency_tree(
        &mut self,
        child_id: StreamId,
        parent_id: StreamId,
        weight: u16,
        exclusive: bool,
    ) {
        debug_assert!(!child_id.is_zero(), "the connection cannot be re-prioritized");
        if child_id.is_zero() || child_id == parent_id {
            tracing::debug!(
                "ignoring self or connection dependency; stream_id={:?}",
                child_id
            );
            return;
        }
        debug_assert!((MIN_WEIGHT..=MAX_WEIGHT).contains(&weight));
        let weight = weight.clamp(MIN_WEIGHT, MAX_WEIGHT);

        tracing::trace!(
            "updating dependency tree; child={:?} parent={:?} weight={} exclusive={}",
            child_id,
            parent_id,
            weight,
            exclusive
        );

        let child = match self.store.get(child_id) {
            Some(key) => key,
            None if self.max_state_only_size == 0 => return,
            None => self.new_state_only(child_id),
        };
        let parent = match self.store.get(parent_id) {
            Some(key) => key,
            None if self.max_state_only_size == 0 => return,
            None => {
                let key = self.new_state_only(parent_id);
                // Only the node just created changes parents here.
                let mut events = Events::new();
                self.store.take_child(self.root, key, false, &mut events);
                self.notify_parent_changed(&events);
                key
            }
        };

        // An enqueued child keeps its weight counted in the parent's sum,
        // so a weight change must be reflected there as well.
        if self.store[child].active_count_for_tree > 0 {
            if let Some(current_parent) = self.store[child].parent {
                let old_weight = u64::from(self.store[child].weight);
                let total = &mut self.store[current_parent].total_queued_weights;
                *total = *total + u64::from(weight) - old_weight;
            }
        }
        self.store[child].weight = weight;

        if self.store[child].parent != Some(parent)
            || (exclusive && self.store[parent].children.len() != 1)
        {
            let mut events = Events::new();
            if self.store.is_descendant_of(parent, child) {
                // Adopting an ancestor would close a cycle; lift the
                // prospective parent up beside the child first.
                if let Some(current_parent) = self.store[child].parent {
                    self.store
                        .take_child(current_parent, parent, false, &mut events);
                }
            }
            self.store.take_child(parent, child, exclusive, &mut events);
            self.notify_parent_changed(&events);
        }

        // Attaching synthetic nodes may have pushed retention over its
        // bound; trim eagerly while eviction order is fresh.
        self.trim_state_only();
    }

    fn distribute(
        &mut self,
        mut max_bytes: usize,
        writer: &mut dyn StreamWriter,
    ) -> Result<bool, Error> {
        if self.store[self.root].active_count_for_tree == 0 {
            return Ok(false);
        }

        loop {
            let old_active = self.store[self.root].active_count_for_tree;
            let sent = self.distribute_to_children(max_bytes, writer, self.root)?;
            max_bytes -= sent;

            // Stop once nothing is runnable, or the budget is gone and
            // this pass did not change what is runnable. A pass always
            // either consumes bytes or deactivates a stream, so this
            // terminates.
            let active = self.store[self.root].active_count_for_tree;
            if active == 0 || (max_bytes == 0 && active == old_active) {
                break;
            }
        }

        Ok(self.store[self.root].active_count_for_tree != 0)
    }

    fn stream_added(&mut self, stream_id: StreamId, state: StreamState) {
        if stream_id.is_zero() {
            tracing::warn!("ignoring stream added for the connection stream");
            return;
        }
        let key = match self.store.get(stream_id) {
            Some(key) => {
                // A PRIORITY frame got here first; promote the retained
                // placeholder to a live stream.
                let was_retained = self.state_only_queue.remove(&mut self.store, key);
                debug_assert!(was_retained, "stream added twice: {:?}", stream_id);
                key
            }
            None => {
                let key = self.store.insert(Node::new(stream_id));
                let mut events = Events::new();
                self.store.take_child(self.root, key, false, &mut events);
                self.notify_parent_changed(&events);
                key
            }
        };

        self.store[key].flags.set_attached(true);
        if state.is_reserved() {
            self.store[key].flags.set_reserved_or_activated();
        }
    }

    fn stream_active(&mut self, stream_id: StreamId) {
        if stream_id.is_zero() {
            return;
        }
        if let Some(key) = self.store.get(stream_id) {
            self.store[key].flags.set_reserved_or_activated();
        }
    }

    fn stream_closed(&mut self, stream_id: StreamId) {
        let Some(key) = self.store.get(stream_id).filter(|_| !stream_id.is_zero()) else {
            return;
        };
        self.set_streamable(key, 0, false);
        self.store[key].flags.set_attached(false);
    }

    fn stream_removed(&mut self, stream_id: StreamId) {
        let Some(key) = self.store.get(stream_id).filter(|_| !stream_id.is_zero()) else {
            return;
        };
        debug_assert!(!self.store[key].is_active(), "stream removed while active");
        self.store[key].flags.set_attached(false);

        if self.max_state_only_size == 0 {
            self.drop_from_tree(key);
            return;
        }
        if self.store[key].eviction_slot.is_some() {
            debug_assert!(false, "stream removed twice: {:?}", stream_id);
            return;
        }

        if self.state_only_queue.len() == self.max_state_only_size {
            match self.state_only_queue.peek() {
                Some(head) if EvictionOrder::cmp(&self.store, head, key) == Ordering::Less => {
                    // The current head retains worse than the departing
                    // stream; evict it to make room.
                    self.state_only_queue.pop(&mut self.store);
                    self.drop_from_tree(head);
                }
                _ => {
                    // The departing stream would be first out anyway.
                    self.drop_from_tree(key);
                    return;
                }
            }
        }

        self.state_only_queue.push(&mut self.store, key);
    }
}
