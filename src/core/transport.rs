use async_trait::async_trait;
use bytes::{Bytes, BytesMut};

use crate::core::node::NodeAddr;
use crate::proto::codec::Decoder;
use crate::proto::error::{Error, Result};

/// A sequential, single-owner byte stream to one server.
///
/// Implementations hand out exactly what the codec asks for and never read
/// ahead on their own. After [`disconnect`](Transport::disconnect) every
/// operation fails with a connection error.
#[async_trait]
pub trait Transport: Send {
    /// Writes the whole buffer.
    async fn write_bytes(&mut self, buf: &[u8]) -> Result<()>;

    /// Reads one CRLF-terminated line and returns it without the CRLF.
    async fn read_line(&mut self) -> Result<Bytes>;

    /// Reads exactly `len` bytes.
    async fn read_bytes(&mut self, len: usize) -> Result<Bytes>;

    /// Drops the underlying stream.
    fn disconnect(&mut self);

    /// Returns false once the transport has been disconnected.
    fn is_connected(&self) -> bool;

    /// Human-readable description of the remote end, used in errors.
    fn endpoint(&self) -> String;
}

/// Opens transports to nodes.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connects to `node`.
    async fn connect(&self, node: &NodeAddr) -> Result<Box<dyn Transport>>;

    /// Decoder matching the protocol spoken on the transports this
    /// connector opens.
    fn decoder(&self) -> Decoder {
        Decoder::new()
    }
}

/// A [`Transport`] over an in-memory buffer.
///
/// Reads consume the preloaded input; writes are collected and can be
/// inspected with [`written`](MemoryTransport::written). Useful for decoding
/// replies that are already buffered and for scripting replies in tests.
#[derive(Debug)]
pub struct MemoryTransport {
    input: BytesMut,
    written: BytesMut,
    connected: bool,
    endpoint: String,
}

impl MemoryTransport {
    /// Creates a transport whose reads return `input`.
    pub fn new(input: impl AsRef<[u8]>) -> Self {
        Self {
            input: BytesMut::from(input.as_ref()),
            written: BytesMut::new(),
            connected: true,
            endpoint: "memory".to_string(),
        }
    }

    /// Sets the endpoint description reported in errors.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Appends more input.
    pub fn push(&mut self, data: impl AsRef<[u8]>) {
        self.input.extend_from_slice(data.as_ref());
    }

    /// Bytes written so far.
    pub fn written(&self) -> &[u8] {
        &self.written
    }

    /// Number of input bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.input.len()
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.connected {
            Ok(())
        } else {
            Err(Error::Connection {
                endpoint: self.endpoint.clone(),
                message: "disconnected".to_string(),
            })
        }
    }

    fn eof(&self) -> Error {
        Error::Connection {
            endpoint: self.endpoint.clone(),
            message: "unexpected end of input".to_string(),
        }
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn write_bytes(&mut self, buf: &[u8]) -> Result<()> {
        self.ensure_connected()?;
        self.written.extend_from_slice(buf);
        Ok(())
    }

    async fn read_line(&mut self) -> Result<Bytes> {
        self.ensure_connected()?;
        let pos = match self.input.iter().position(|&b| b == b'\n') {
            Some(pos) => pos,
            None => return Err(self.eof()),
        };
        let mut line = self.input.split_to(pos + 1).freeze();
        if pos == 0 || line[pos - 1] != b'\r' {
            return Err(Error::protocol(
                "line not terminated by CRLF",
                &line,
                self.endpoint.clone(),
            ));
        }
        line.truncate(pos - 1);
        Ok(line)
    }

    async fn read_bytes(&mut self, len: usize) -> Result<Bytes> {
        self.ensure_connected()?;
        if self.input.len() < len {
            return Err(self.eof());
        }
        Ok(self.input.split_to(len).freeze())
    }

    fn disconnect(&mut self) {
        self.connected = false;
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn endpoint(&self) -> String {
        self.endpoint.clone()
    }
}
