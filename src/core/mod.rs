//! # Core
//!
//! Connection handling shared by every routing mode.
//!
//! ## Modules
//!
//! - [`transport`] - The byte-stream abstraction the codec reads from
//! - [`connection`] - Tokio stream transport with timeouts
//! - [`builder`] - Connection configuration and the TCP connector
//! - [`command`] - Command type and the builders used internally
//! - [`node`] - Node addresses
//! - [`pool`] - One exclusively locked connection per node

pub use crate::proto::error::{Error, Result};

use crate::core::command::Cmd;
use crate::core::transport::Transport;
use crate::proto::codec::{Decoder, Encoder};
use crate::proto::frame::Frame;

/// Connection configuration.
pub mod builder;
/// Command construction helpers.
pub mod command;
/// Low-level connection management.
pub mod connection;
/// Node addresses.
pub mod node;
/// Per-node connection pool.
pub mod pool;
#[cfg(test)]
pub(crate) mod testing;
/// Transport abstraction.
pub mod transport;

/// Sends one command and reads its reply.
///
/// Error replies come back as [`Frame::Error`]; use
/// [`Frame::into_result`] to surface them as errors. A protocol error
/// leaves the connection mid-frame, so the transport is disconnected
/// before the error is returned.
///
/// # Example
///
/// ```
/// use shardwire::core::request;
/// use shardwire::core::transport::MemoryTransport;
/// use shardwire::proto::codec::Decoder;
/// use shardwire::{Cmd, Frame};
///
/// # #[tokio::main]
/// # async fn main() -> shardwire::Result<()> {
/// let mut transport = MemoryTransport::new(b"+PONG\r\n");
/// let reply = request(&mut transport, &Decoder::new(), &Cmd::new("PING")).await?;
/// assert_eq!(reply, Frame::SimpleString("PONG".into()));
/// assert_eq!(transport.written(), b"*1\r\n$4\r\nPING\r\n");
/// # Ok(())
/// # }
/// ```
pub async fn request<T>(transport: &mut T, decoder: &Decoder, cmd: &Cmd) -> Result<Frame>
where
    T: Transport + ?Sized,
{
    let mut encoder = Encoder::with_protocol(decoder.protocol());
    encoder.encode_command(cmd);
    transport.write_bytes(&encoder.take()).await?;
    decoder.decode(transport).await
}
