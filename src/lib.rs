//! HTTP/2 stream priority tree and weighted fair queueing byte
//! distributor.
//!
//! An HTTP/2 connection multiplexes many logical streams over one socket.
//! On every flush opportunity something has to decide how the writable
//! byte budget is split across the streams that have data pending. This
//! crate provides that decision, factored out of the surrounding codec:
//!
//! - [`WeightedFairQueue`] maintains the RFC 7540 [Section 5.3] priority
//!   dependency tree (re-parenting, exclusive dependencies, bounded
//!   retention of closed or not-yet-created streams) and allocates bytes
//!   with a weighted-fair-queueing walk over it, so that each stream's
//!   share of bandwidth converges to its weight among its siblings.
//! - [`UniformQueue`] is the simple alternative: even FIFO chunks,
//!   priorities ignored.
//!
//! Both implement [`ByteDistributor`], the interface the codec drives.
//! The codec reports per-stream readiness with
//! [`update_streamable_bytes`][ByteDistributor::update_streamable_bytes],
//! applies PRIORITY frames with
//! [`update_dependency_tree`][ByteDistributor::update_dependency_tree],
//! forwards stream lifecycle transitions, and drains a budget with
//! [`distribute`][ByteDistributor::distribute], supplying a
//! [`StreamWriter`] that performs the actual frame writes.
//!
//! Frame parsing, flow-control accounting, and socket I/O live in the
//! codec; this crate only ever sees derived byte counts. Everything here
//! is synchronous and single-threaded: all calls must come from the one
//! executor that owns the connection.
//!
//! [Section 5.3]: <https://tools.ietf.org/html/rfc7540#section-5.3>

#![deny(missing_debug_implementations)]
#![warn(rust_2018_idioms)]

mod distributor;
mod error;
mod stream_id;
mod tree;
mod uniform;
mod wfq;

pub use crate::distributor::{
    streamable_bytes, ByteDistributor, PendingUpdates, StreamState, StreamWriter,
};
pub use crate::error::{Error, Reason};
pub use crate::stream_id::StreamId;
pub use crate::uniform::UniformQueue;
pub use crate::wfq::WeightedFairQueue;
