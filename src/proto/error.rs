use std::io;

use thiserror::Error;

/// Result type alias for shardwire operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`].
///
/// Retry policies match on this rather than on individual variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed frame. The connection is no longer usable.
    Protocol,
    /// Well-formed error reply surfaced as an error by the caller's choice.
    Server,
    /// Transport-level failure (refused, reset, closed).
    Connection,
    /// A read or write did not complete in time.
    Timeout,
    /// No route for a key or slot, empty ring, sentinel exhaustion.
    Topology,
    /// Cluster redirection (MOVED/ASK) or cluster unavailability.
    Redirect,
    /// Invalid slot range, ring weight, address and the like.
    Configuration,
    /// Aborted by an external cancellation signal.
    Cancelled,
}

/// Errors that can occur while encoding, decoding or routing requests.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// An IO error occurred.
    #[error("IO error: {source}")]
    Io {
        /// The underlying IO error.
        #[from]
        source: io::Error,
    },

    /// The connection was closed or could not be established.
    #[error("connection error [{endpoint}]: {message}")]
    Connection {
        /// Description of the remote endpoint.
        endpoint: String,
        /// Description of the failure.
        message: String,
    },

    /// A read or write timed out.
    #[error("operation timed out [{endpoint}]")]
    Timeout {
        /// Description of the remote endpoint.
        endpoint: String,
    },

    /// A malformed frame was received.
    #[error("protocol error [{endpoint}]: {message} (payload: {payload:?})")]
    Protocol {
        /// Description of the error.
        message: String,
        /// The offending raw payload.
        payload: String,
        /// Description of the remote endpoint.
        endpoint: String,
    },

    /// The server returned an error.
    #[error("server error: {message}")]
    Server {
        /// Error message from server.
        message: String,
    },

    /// Invalid argument provided.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of invalid argument.
        message: String,
    },

    /// No node owns the requested slot.
    #[error("no route for slot {slot}")]
    NoRoute {
        /// The unassigned slot.
        slot: u16,
    },

    /// The hash ring has no nodes.
    #[error("hash ring is empty")]
    EmptyRing,

    /// The sentinels do not know the requested service.
    #[error("no master found for service '{service}'")]
    MasterNotFound {
        /// Service name.
        service: String,
    },

    /// Every candidate sentinel failed.
    #[error("no sentinel reachable for service '{service}'")]
    SentinelsExhausted {
        /// Service name.
        service: String,
    },

    /// Cluster: key moved to another node (permanent redirect).
    ///
    /// The slot has been migrated to a different node. The slot map should
    /// be updated and the command retried on the new node.
    #[error("MOVED to slot {slot} at {address}")]
    Moved {
        /// The slot number (0-16383).
        slot: u16,
        /// The address of the node owning this slot (e.g., "127.0.0.1:7001").
        address: String,
    },

    /// Cluster: temporary redirect during migration (ASK redirect).
    ///
    /// The target node must receive ASKING before the retried command.
    /// The slot map is not updated.
    #[error("ASK to slot {slot} at {address}")]
    Ask {
        /// The slot number (0-16383).
        slot: u16,
        /// The address of the node temporarily handling this slot.
        address: String,
    },

    /// Cluster is down or unavailable.
    #[error("CLUSTERDOWN cluster is down")]
    ClusterDown,

    /// Multi-key operation with keys in different slots.
    #[error("CROSSSLOT keys in multi-key operation map to different slots")]
    CrossSlot,

    /// The operation was cancelled.
    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    /// Returns the taxonomy bucket of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Io { .. } | Error::Connection { .. } => ErrorKind::Connection,
            Error::Timeout { .. } => ErrorKind::Timeout,
            Error::Protocol { .. } => ErrorKind::Protocol,
            Error::Server { .. } => ErrorKind::Server,
            Error::InvalidArgument { .. } => ErrorKind::Configuration,
            Error::NoRoute { .. }
            | Error::EmptyRing
            | Error::MasterNotFound { .. }
            | Error::SentinelsExhausted { .. } => ErrorKind::Topology,
            Error::Moved { .. } | Error::Ask { .. } | Error::ClusterDown | Error::CrossSlot => {
                ErrorKind::Redirect
            }
            Error::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Builds a protocol error for a raw payload read from `endpoint`.
    pub(crate) fn protocol(
        message: impl Into<String>,
        payload: &[u8],
        endpoint: impl Into<String>,
    ) -> Self {
        Error::Protocol {
            message: message.into(),
            payload: String::from_utf8_lossy(payload).into_owned(),
            endpoint: endpoint.into(),
        }
    }

    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        Error::InvalidArgument {
            message: message.into(),
        }
    }
}
