use std::collections::VecDeque;
use std::hash::BuildHasherDefault;

use fnv::FnvHasher;
use indexmap::IndexMap;

use crate::distributor::{ByteDistributor, PendingUpdates, StreamState, StreamWriter};
use crate::error::Error;
use crate::stream_id::StreamId;

const DEFAULT_MIN_ALLOCATION_CHUNK: usize = 1024;

#[derive(Debug, Default)]
struct Entry {
    streamable_bytes: usize,
    /// True while the stream id sits in the FIFO.
    enqueued: bool,
    /// A SETTINGS shrink pushed the window negative; skip until the codec
    /// reports it recovered.
    window_negative: bool,
    /// Re-entry guard: readiness updates reported during this stream's
    /// own write must not re-enqueue it.
    writing: bool,
}

/// A byte distributor that shares the budget evenly across all streams
/// with a pending frame, ignoring priority information entirely.
///
/// Cheaper and simpler than [`WeightedFairQueue`](crate::WeightedFairQueue):
/// streams are served FIFO, each receiving the larger of the configured
/// minimum chunk and an even split of the budget. PRIORITY frames are
/// accepted and discarded.
#[derive(Debug)]
pub struct UniformQueue {
    entries: IndexMap<StreamId, Entry, BuildHasherDefault<FnvHasher>>,
    queue: VecDeque<StreamId>,
    min_allocation_chunk: usize,
    total_streamable_bytes: u64,
}

impl Default for UniformQueue {
    fn default() -> Self {
        UniformQueue::new()
    }
}

impl UniformQueue {
    pub fn new() -> UniformQueue {
        UniformQueue {
            entries: IndexMap::default(),
            queue: VecDeque::new(),
            min_allocation_chunk: DEFAULT_MIN_ALLOCATION_CHUNK,
            total_streamable_bytes: 0,
        }
    }

    /// Set the minimum number of bytes offered to each stream per pass.
    ///
    /// Raising it improves goodput when many small streams are queued, at
    /// the cost of evenness within a single pass.
    pub fn set_min_allocation_chunk(&mut self, chunk: usize) -> Result<(), Error> {
        if chunk == 0 {
            return Err(Error::invalid_argument("allocation chunk must be positive"));
        }
        self.min_allocation_chunk = chunk;
        Ok(())
    }
}

impl ByteDistributor for UniformQueue {
    fn update_streamable_bytes(
        &mut self,
        stream_id: StreamId,
        streamable_bytes: usize,
        has_frame: bool,
        window_size: i32,
    ) {
        debug_assert!(has_frame || streamable_bytes == 0);

        let entry = self.entries.entry(stream_id).or_default();
        let old = entry.streamable_bytes;
        entry.streamable_bytes = streamable_bytes;
        entry.window_negative = window_size < 0;

        // A zero window still queues the stream (an empty or header-only
        // frame may be pending) unless its own write triggered the update.
        let eligible = has_frame && (window_size > 0 || (window_size == 0 && !entry.writing));
        let newly_queued = eligible && !entry.enqueued;
        if newly_queued {
            entry.enqueued = true;
        }

        self.total_streamable_bytes =
            self.total_streamable_bytes - old as u64 + streamable_bytes as u64;
        if newly_queued {
            self.queue.push_back(stream_id);
        }
    }

    fn update_dependency_tree(
        &mut self,
        child_id: StreamId,
        _parent_id: StreamId,
        _weight: u16,
        _exclusive: bool,
    ) {
        // This distributor intentionally ignores the dependency tree.
        tracing::trace!("ignoring priority; stream_id={:?}", child_id);
    }

    fn distribute(
        &mut self,
        mut max_bytes: usize,
        writer: &mut dyn StreamWriter,
    ) -> Result<bool, Error> {
        let queued = self.queue.len();
        if queued == 0 {
            return Ok(self.total_streamable_bytes > 0);
        }

        // Split the budget evenly, but never below the configured floor.
        let chunk = self.min_allocation_chunk.max(max_bytes / queued);

        while let Some(stream_id) = self.queue.pop_front() {
            let (window_negative, streamable_bytes) = {
                let Some(entry) = self.entries.get_mut(&stream_id) else {
                    // The stream went away while queued.
                    continue;
                };
                entry.enqueued = false;
                (entry.window_negative, entry.streamable_bytes)
            };

            if window_negative {
                continue;
            }
            if max_bytes == 0 && streamable_bytes > 0 {
                // Budget exhausted; the head keeps its place for the next
                // pass rather than losing its turn.
                if let Some(entry) = self.entries.get_mut(&stream_id) {
                    entry.enqueued = true;
                }
                self.queue.push_front(stream_id);
                break;
            }

            let n = chunk.min(max_bytes).min(streamable_bytes);
            max_bytes -= n;

            tracing::trace!("writing; stream_id={:?} len={}", stream_id, n);
            if let Some(entry) = self.entries.get_mut(&stream_id) {
                entry.writing = true;
            }
            let mut pending = PendingUpdates::default();
            let result = writer.write(stream_id, n, &mut pending);
            if result.is_ok() {
                // Folded in while `writing` is still set: a zero-window
                // update must not hand the stream another turn.
                for update in pending.drain() {
                    self.update_streamable_bytes(
                        update.stream_id,
                        update.streamable_bytes,
                        update.has_frame,
                        update.window_size,
                    );
                }
            }
            if let Some(entry) = self.entries.get_mut(&stream_id) {
                entry.writing = false;
            }
            if let Err(source) = result {
                return Err(Error::writer(source));
            }
        }

        Ok(self.total_streamable_bytes > 0)
    }

    fn stream_added(&mut self, stream_id: StreamId, _state: StreamState) {
        self.entries.entry(stream_id).or_default();
    }

    fn stream_closed(&mut self, stream_id: StreamId) {
        if let Some(entry) = self.entries.get_mut(&stream_id) {
            let old = entry.streamable_bytes;
            entry.streamable_bytes = 0;
            self.total_streamable_bytes -= old as u64;
        }
    }

    fn stream_removed(&mut self, stream_id: StreamId) {
        if let Some(entry) = self.entries.swap_remove(&stream_id) {
            self.total_streamable_bytes -= entry.streamable_bytes as u64;
            // Any id left in the FIFO is skipped when popped.
        }
    }
}
