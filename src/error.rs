use std::{error, fmt};

/// HTTP/2 error codes, as described in [Section 7] of RFC 7540.
///
/// Only the subset that byte distribution can raise or observe is named
/// here; unknown codes round-trip through the inner `u32`.
///
/// [Section 7]: <https://tools.ietf.org/html/rfc7540#section-7>
#[derive(Clone, Copy, Eq, PartialEq, Hash)]
pub struct Reason(u32);

impl Reason {
    /// The associated condition is not a result of an error.
    pub const NO_ERROR: Reason = Reason(0);
    /// The endpoint detected an unspecific protocol error.
    pub const PROTOCOL_ERROR: Reason = Reason(1);
    /// The endpoint encountered an unexpected internal error.
    pub const INTERNAL_ERROR: Reason = Reason(2);
    /// The endpoint detected that its peer violated the flow-control
    /// protocol.
    pub const FLOW_CONTROL_ERROR: Reason = Reason(3);

    /// Get a string description of the error code.
    pub fn description(&self) -> &str {
        match self.0 {
            0 => "not a result of an error",
            1 => "unspecific protocol error detected",
            2 => "unexpected internal error encountered",
            3 => "flow-control protocol violated",
            _ => "unknown reason",
        }
    }
}

impl From<u32> for Reason {
    fn from(src: u32) -> Reason {
        Reason(src)
    }
}

impl From<Reason> for u32 {
    fn from(src: Reason) -> u32 {
        src.0
    }
}

impl fmt::Debug for Reason {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self.0 {
            0 => "NO_ERROR",
            1 => "PROTOCOL_ERROR",
            2 => "INTERNAL_ERROR",
            3 => "FLOW_CONTROL_ERROR",
            _ => return fmt.debug_tuple("Reason").field(&self.0).finish(),
        };
        fmt.write_str(name)
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(self.description())
    }
}

/// Errors raised by a byte distributor.
///
/// A configuration error leaves the distributor unchanged. A writer error
/// is a connection-level failure: the caller is expected to tear the
/// connection down with the carried [`Reason`].
#[derive(Debug)]
pub struct Error {
    kind: Kind,
}

#[derive(Debug)]
enum Kind {
    /// A configuration value was out of range.
    InvalidArgument(&'static str),

    /// The writer callback failed while a write was in flight.
    Writer {
        reason: Reason,
        source: Box<dyn error::Error + Send + Sync>,
    },
}

impl Error {
    pub(crate) fn invalid_argument(msg: &'static str) -> Error {
        Error {
            kind: Kind::InvalidArgument(msg),
        }
    }

    pub(crate) fn writer(source: Box<dyn error::Error + Send + Sync>) -> Error {
        Error {
            kind: Kind::Writer {
                reason: Reason::INTERNAL_ERROR,
                source,
            },
        }
    }

    /// The HTTP/2 error code to surface at the connection level, if this
    /// error maps to one.
    pub fn reason(&self) -> Option<Reason> {
        match self.kind {
            Kind::InvalidArgument(_) => None,
            Kind::Writer { reason, .. } => Some(reason),
        }
    }

    /// Returns true if the error originated in the writer callback.
    pub fn is_writer(&self) -> bool {
        matches!(self.kind, Kind::Writer { .. })
    }
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            Kind::InvalidArgument(msg) => write!(fmt, "invalid argument: {}", msg),
            Kind::Writer { reason, source } => {
                write!(fmt, "connection error ({:?}): {}", reason, source)
            }
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.kind {
            Kind::InvalidArgument(_) => None,
            Kind::Writer { source, .. } => Some(&**source),
        }
    }
}
