use std::error;

use smallvec::SmallVec;

use crate::error::Error;
use crate::stream_id::StreamId;

/// Most writes change at most the written stream plus the connection
/// window, so two slots cover the common case without allocating.
const DEFAULT_UPDATE_STACK_SIZE: usize = 2;

/// The HTTP/2 stream states, as described in [Section 5.1] of RFC 7540.
///
/// [Section 5.1]: <https://tools.ietf.org/html/rfc7540#section-5.1>
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum StreamState {
    Idle,
    ReservedLocal,
    ReservedRemote,
    Open,
    HalfClosedLocal,
    HalfClosedRemote,
    Closed,
}

impl StreamState {
    /// Returns true for the two reserved states.
    pub fn is_reserved(&self) -> bool {
        matches!(self, StreamState::ReservedLocal | StreamState::ReservedRemote)
    }
}

/// Derives the streamable byte count from a reported readiness context.
///
/// A stream with no pending frame, or whose flow-control window went
/// negative after a SETTINGS shrink, has nothing streamable; otherwise the
/// pending bytes are limited by the window.
pub fn streamable_bytes(pending_bytes: usize, has_frame: bool, window_size: i32) -> usize {
    if !has_frame || window_size < 0 {
        return 0;
    }
    pending_bytes.min(window_size as usize)
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Update {
    pub(crate) stream_id: StreamId,
    pub(crate) streamable_bytes: usize,
    pub(crate) has_frame: bool,
    pub(crate) window_size: i32,
}

/// Readiness changes reported by a [`StreamWriter`] while its write is in
/// flight.
///
/// Writing a frame consumes flow-control window and may drain a stream's
/// send queue, so a write usually changes the very state the distributor
/// is scheduling on. The writer queues those changes here and the
/// distributor folds them in as soon as the write returns, before the
/// serviced node is re-queued.
#[derive(Debug, Default)]
pub struct PendingUpdates {
    updates: SmallVec<[Update; DEFAULT_UPDATE_STACK_SIZE]>,
}

impl PendingUpdates {
    /// Queue a streamable-bytes change for `stream_id`.
    ///
    /// The arguments mirror
    /// [`ByteDistributor::update_streamable_bytes`].
    pub fn push(
        &mut self,
        stream_id: StreamId,
        streamable_bytes: usize,
        has_frame: bool,
        window_size: i32,
    ) {
        self.updates.push(Update {
            stream_id,
            streamable_bytes,
            has_frame,
            window_size,
        });
    }

    /// Returns true if no updates are queued.
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    pub(crate) fn drain(&mut self) -> smallvec::Drain<'_, [Update; DEFAULT_UPDATE_STACK_SIZE]> {
        self.updates.drain(..)
    }
}

/// The write callback invoked by [`ByteDistributor::distribute`].
pub trait StreamWriter {
    /// Write `len` bytes of `stream_id`'s pending data.
    ///
    /// The implementation should consume exactly `len` bytes and emit at
    /// least one frame; when `len == 0` that frame may be empty. Readiness
    /// changes caused by the write belong in `pending`.
    ///
    /// An error aborts the distribution pass and is surfaced as a
    /// connection-level `INTERNAL_ERROR`.
    fn write(
        &mut self,
        stream_id: StreamId,
        len: usize,
        pending: &mut PendingUpdates,
    ) -> Result<(), Box<dyn error::Error + Send + Sync>>;
}

impl<F> StreamWriter for F
where
    F: FnMut(
        StreamId,
        usize,
        &mut PendingUpdates,
    ) -> Result<(), Box<dyn error::Error + Send + Sync>>,
{
    fn write(
        &mut self,
        stream_id: StreamId,
        len: usize,
        pending: &mut PendingUpdates,
    ) -> Result<(), Box<dyn error::Error + Send + Sync>> {
        (self)(stream_id, len, pending)
    }
}

/// Decides how many bytes each stream may write on a flush opportunity.
///
/// The codec reports per-stream write readiness through
/// [`update_streamable_bytes`], applies PRIORITY frames through
/// [`update_dependency_tree`], forwards stream lifecycle transitions, and
/// drains a byte budget with [`distribute`].
///
/// [`update_streamable_bytes`]: ByteDistributor::update_streamable_bytes
/// [`update_dependency_tree`]: ByteDistributor::update_dependency_tree
/// [`distribute`]: ByteDistributor::distribute
pub trait ByteDistributor {
    /// Fold in a per-stream write-readiness update.
    ///
    /// `streamable_bytes` is the derived count (see
    /// [`streamable_bytes`](crate::streamable_bytes)); `has_frame` and
    /// `window_size` decide whether the stream is eligible to receive
    /// bytes at all.
    fn update_streamable_bytes(
        &mut self,
        stream_id: StreamId,
        streamable_bytes: usize,
        has_frame: bool,
        window_size: i32,
    );

    /// Apply a PRIORITY frame: `child_id` depends on `parent_id` with the
    /// given `weight` in `[1, 256]`, exclusively if `exclusive`.
    fn update_dependency_tree(
        &mut self,
        child_id: StreamId,
        parent_id: StreamId,
        weight: u16,
        exclusive: bool,
    );

    /// Emit writes totalling up to `max_bytes`.
    ///
    /// Returns whether any stream is still eligible to write afterwards.
    /// With a zero budget and at least one eligible stream, a single
    /// zero-length write is still emitted so the codec can flush an empty
    /// frame.
    fn distribute(
        &mut self,
        max_bytes: usize,
        writer: &mut dyn StreamWriter,
    ) -> Result<bool, Error>;

    /// A stream object was created for `stream_id`.
    fn stream_added(&mut self, stream_id: StreamId, state: StreamState) {
        let _ = (stream_id, state);
    }

    /// The stream transitioned to an active state.
    fn stream_active(&mut self, stream_id: StreamId) {
        let _ = stream_id;
    }

    /// The stream was closed; it can no longer receive bytes.
    fn stream_closed(&mut self, stream_id: StreamId) {
        let _ = stream_id;
    }

    /// The stream object was removed from the connection.
    fn stream_removed(&mut self, stream_id: StreamId) {
        let _ = stream_id;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn streamable_bytes_limits_by_window() {
        assert_eq!(streamable_bytes(1000, true, 300), 300);
        assert_eq!(streamable_bytes(100, true, 300), 100);
        assert_eq!(streamable_bytes(100, true, 0), 0);
    }

    #[test]
    fn streamable_bytes_inactive_contexts() {
        assert_eq!(streamable_bytes(1000, false, 300), 0);
        assert_eq!(streamable_bytes(1000, true, -1), 0);
    }
}
