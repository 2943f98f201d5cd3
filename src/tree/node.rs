use std::cmp::Ordering;
use std::fmt;
use std::hash::BuildHasherDefault;

use fnv::FnvHasher;
use indexmap::IndexMap;

use crate::stream_id::StreamId;
use crate::tree::heap::{HeapOrder, IndexedHeap};
use crate::tree::store::{Key, Store};

/// The default weight assigned to a stream that never carried a PRIORITY
/// frame ([Section 5.3.5]).
///
/// [Section 5.3.5]: <https://tools.ietf.org/html/rfc7540#section-5.3.5>
pub(crate) const DEFAULT_WEIGHT: u16 = 16;

pub(crate) const MIN_WEIGHT: u16 = 1;
pub(crate) const MAX_WEIGHT: u16 = 256;

/// Stream ids are small integers; FNV beats SipHash for them and the map
/// keeps insertion order, which is the only child ordering the scheduler
/// is allowed to observe.
pub(crate) type ChildMap = IndexMap<StreamId, Key, BuildHasherDefault<FnvHasher>>;

const ACTIVE: u8 = 0x1;
const DISTRIBUTING: u8 = 0x2;
const RESERVED_OR_ACTIVATED: u8 = 0x4;
const ATTACHED: u8 = 0x8;

#[derive(Copy, Clone, Default, Eq, PartialEq)]
pub(crate) struct NodeFlags(u8);

impl NodeFlags {
    /// True iff the stream has a pending frame and a non-negative window.
    pub(crate) fn is_active(self) -> bool {
        self.0 & ACTIVE == ACTIVE
    }

    /// True while the scheduler is inside this node's write call.
    pub(crate) fn is_distributing(self) -> bool {
        self.0 & DISTRIBUTING == DISTRIBUTING
    }

    /// Sticky: set once the stream reaches RESERVED or an active state.
    pub(crate) fn is_reserved_or_activated(self) -> bool {
        self.0 & RESERVED_OR_ACTIVATED == RESERVED_OR_ACTIVATED
    }

    /// True while a live stream object is linked to this node.
    pub(crate) fn is_attached(self) -> bool {
        self.0 & ATTACHED == ATTACHED
    }

    pub(crate) fn set_active(&mut self, on: bool) {
        self.set(ACTIVE, on);
    }

    pub(crate) fn set_distributing(&mut self, on: bool) {
        self.set(DISTRIBUTING, on);
    }

    pub(crate) fn set_reserved_or_activated(&mut self) {
        self.set(RESERVED_OR_ACTIVATED, true);
    }

    pub(crate) fn set_attached(&mut self, on: bool) {
        self.set(ATTACHED, on);
    }

    fn set(&mut self, mask: u8, on: bool) {
        if on {
            self.0 |= mask;
        } else {
            self.0 &= !mask;
        }
    }
}

impl fmt::Debug for NodeFlags {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut f = fmt.debug_struct("NodeFlags");
        f.field("active", &self.is_active());
        f.field("distributing", &self.is_distributing());
        f.field("reserved_or_activated", &self.is_reserved_or_activated());
        f.field("attached", &self.is_attached());
        f.finish()
    }
}

/// Per-stream priority state.
///
/// One node exists per stream id the distributor has observed, within the
/// limits of state-only retention. Nodes live in the [`Store`] arena and
/// refer to each other by [`Key`].
#[derive(Debug)]
pub(crate) struct Node {
    pub(crate) stream_id: StreamId,
    pub(crate) parent: Option<Key>,
    pub(crate) children: ChildMap,
    pub(crate) weight: u16,
    pub(crate) streamable_bytes: usize,
    pub(crate) flags: NodeFlags,

    /// Distance from the connection root; `usize::MAX` while detached.
    pub(crate) depth: usize,

    /// Number of active nodes in this subtree, including this node.
    pub(crate) active_count_for_tree: u32,

    /// Virtual clock advanced as this node's subtree is serviced; stamps
    /// the deadline of children entering the queue.
    pub(crate) pseudo_time: u64,

    /// This node's deadline within its parent's queue.
    pub(crate) pseudo_time_to_write: u64,

    /// Sum of the weights of the children currently queued.
    pub(crate) total_queued_weights: u64,

    /// Children with active subtrees, ordered by deadline.
    pub(crate) pseudo_time_queue: IndexedHeap<PseudoTimeOrder>,

    /// Position in the parent's `pseudo_time_queue`.
    pub(crate) pseudo_time_slot: Option<usize>,

    /// Position in the distributor's state-only eviction heap.
    pub(crate) eviction_slot: Option<usize>,
}

impl Node {
    pub(crate) fn new(stream_id: StreamId) -> Node {
        Node {
            stream_id,
            parent: None,
            children: ChildMap::default(),
            weight: DEFAULT_WEIGHT,
            streamable_bytes: 0,
            flags: NodeFlags::default(),
            depth: usize::MAX,
            active_count_for_tree: 0,
            pseudo_time: 0,
            pseudo_time_to_write: 0,
            total_queued_weights: 0,
            pseudo_time_queue: IndexedHeap::default(),
            pseudo_time_slot: None,
            eviction_slot: None,
        }
    }

    /// The connection root: depth zero, permanently attached.
    pub(crate) fn root() -> Node {
        let mut node = Node::new(StreamId::ZERO);
        node.depth = 0;
        node.flags.set_attached(true);
        node
    }

    pub(crate) fn is_active(&self) -> bool {
        self.flags.is_active()
    }

    pub(crate) fn is_distributing(&self) -> bool {
        self.flags.is_distributing()
    }
}

/// Orders a parent's queue by deadline.
///
/// Deadlines are compared by signed wrapping difference so monotonically
/// growing counters tolerate arbitrary connection lifetimes.
#[derive(Debug)]
pub(crate) enum PseudoTimeOrder {}

impl HeapOrder for PseudoTimeOrder {
    fn cmp(store: &Store, a: Key, b: Key) -> Ordering {
        let a = store[a].pseudo_time_to_write;
        let b = store[b].pseudo_time_to_write;
        (a.wrapping_sub(b) as i64).cmp(&0)
    }

    fn slot(store: &Store, key: Key) -> Option<usize> {
        store[key].pseudo_time_slot
    }

    fn set_slot(store: &mut Store, key: Key, slot: Option<usize>) {
        store[key].pseudo_time_slot = slot;
    }
}

/// Orders the state-only retention heap; the minimum is evicted first.
///
/// Priority-only placeholders are kept in preference to streams that made
/// it to reserved or active, shallower nodes in preference to deeper ones,
/// and larger ids in preference to smaller.
#[derive(Debug)]
pub(crate) enum EvictionOrder {}

impl HeapOrder for EvictionOrder {
    fn cmp(store: &Store, a: Key, b: Key) -> Ordering {
        let a = &store[a];
        let b = &store[b];
        b.flags
            .is_reserved_or_activated()
            .cmp(&a.flags.is_reserved_or_activated())
            .then_with(|| b.depth.cmp(&a.depth))
            .then_with(|| a.stream_id.cmp(&b.stream_id))
    }

    fn slot(store: &Store, key: Key) -> Option<usize> {
        store[key].eviction_slot
    }

    fn set_slot(store: &mut Store, key: Key, slot: Option<usize>) {
        store[key].eviction_slot = slot;
    }
}
