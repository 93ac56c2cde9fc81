/// Which fixed-capacity listener table an operation targeted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerKind {
    Query,
    Type,
    Generic,
}

impl std::fmt::Display for ListenerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerKind::Query => write!(f, "query"),
            ListenerKind::Type => write!(f, "type listener"),
            ListenerKind::Generic => write!(f, "generic listener"),
        }
    }
}

/// Errors that can occur in port and registry operations.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// Byte-link error.
    #[error("link error: {0}")]
    Link(#[from] liftlink_link::LinkError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] liftlink_frame::FrameError),

    /// A fixed listener/query slot table is full.
    ///
    /// Capacity is set at initialization and never grows; the caller must
    /// handle this, prior registrations are left untouched.
    #[error("{kind} capacity exceeded ({capacity} slots)")]
    CapacityExceeded {
        kind: ListenerKind,
        capacity: usize,
    },

    /// An application payload field exceeds its wire limit.
    #[error("{field} too long ({len} bytes, max {max})")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    /// An application payload is too short to decode.
    #[error("malformed {what} payload ({len} bytes, need {need})")]
    MalformedPayload {
        what: &'static str,
        len: usize,
        need: usize,
    },

    /// The port's receive loop has been shut down.
    #[error("port shut down")]
    Shutdown,
}

pub type Result<T> = std::result::Result<T, PeerError>;
