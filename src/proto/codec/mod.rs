//! RESP codec.
//!
//! [`Encoder`] serializes commands and frames. [`Decoder`] pulls frames out
//! of a [`Transport`](crate::core::transport::Transport), either whole or as
//! a [`FrameStream`] for large aggregates.

mod decoder;
mod encoder;
mod stream;

pub use decoder::{Decoded, Decoder};
pub use encoder::Encoder;
pub use stream::{AggregateKind, FrameStream};

/// Protocol revision spoken on a connection.
///
/// RESP3 is a strict superset of RESP2: it only adds frame types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProtocolVersion {
    /// `+ - : $ *` only.
    #[default]
    Resp2,
    /// Adds null, double, boolean, blob error, verbatim string, big number,
    /// map, set and push.
    Resp3,
}
