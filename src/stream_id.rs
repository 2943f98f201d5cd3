use std::fmt;

/// A stream identifier, as described in [Section 5.1.1] of RFC 7540.
///
/// Stream identifiers are 31-bit unsigned integers; `0` identifies the
/// connection itself and is the root of the priority dependency tree.
///
/// [Section 5.1.1]: <https://tools.ietf.org/html/rfc7540#section-5.1.1>
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct StreamId(u32);

/// The most significant bit of a four-byte stream field is reserved on the
/// wire and never part of the identifier.
const STREAM_ID_MASK: u32 = 1 << 31;

impl StreamId {
    /// The stream identifier of the connection itself.
    pub const ZERO: StreamId = StreamId(0);

    /// The maximum value that can be represented as a 31-bit identifier.
    pub const MAX: StreamId = StreamId(u32::MAX >> 1);

    /// Returns the identifier of the connection stream.
    pub fn zero() -> StreamId {
        StreamId::ZERO
    }

    /// Returns true if this identifies the connection stream.
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl From<u32> for StreamId {
    fn from(src: u32) -> Self {
        debug_assert_eq!(
            src & STREAM_ID_MASK,
            0,
            "invalid stream ID -- MSB is set"
        );
        StreamId(src & !STREAM_ID_MASK)
    }
}

impl From<StreamId> for u32 {
    fn from(src: StreamId) -> Self {
        src.0
    }
}

impl PartialEq<u32> for StreamId {
    fn eq(&self, other: &u32) -> bool {
        self.0 == *other
    }
}

impl fmt::Debug for StreamId {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_tuple("StreamId").field(&self.0).finish()
    }
}
