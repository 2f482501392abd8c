use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::debug;

use crate::core::command;
use crate::core::connection::{Connection, DEFAULT_MAX_LINE_LENGTH};
use crate::core::node::NodeAddr;
use crate::core::request;
use crate::core::transport::{Connector, Transport};
use crate::proto::codec::{Decoder, ProtocolVersion};
use crate::proto::error::{Error, Result};
use crate::proto::frame::Frame;

const DEFAULT_PORT: u16 = 6379;
const DEFAULT_MAX_FRAME_SIZE: usize = 512 * 1024 * 1024;

/// Builder for configuring and opening a [`Connection`].
///
/// # Example
///
/// ```no_run
/// use shardwire::core::builder::ConnectionBuilder;
/// use std::time::Duration;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let conn = ConnectionBuilder::new()
///     .address("redis://localhost:6379")
///     .connect_timeout(Duration::from_secs(1))
///     .read_timeout(Some(Duration::from_secs(2)))
///     .connect()
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ConnectionBuilder {
    address: Option<String>,
    connect_timeout: Option<Duration>,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
    protocol: ProtocolVersion,
    max_frame_size: usize,
}

impl Default for ConnectionBuilder {
    fn default() -> Self {
        Self {
            address: None,
            connect_timeout: None,
            read_timeout: None,
            write_timeout: None,
            protocol: ProtocolVersion::Resp2,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl ConnectionBuilder {
    /// Creates a new [`ConnectionBuilder`] instance.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the server address.
    ///
    /// # Arguments
    ///
    /// * `address` - `redis://host:port` or plain `host:port`
    #[inline]
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Sets the connection timeout.
    ///
    /// # Arguments
    ///
    /// * `timeout` - Maximum time to wait for connection establishment
    #[inline]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Sets the read timeout for replies.
    ///
    /// # Arguments
    ///
    /// * `timeout` - Maximum time to wait for a response. `None` means no timeout.
    #[inline]
    pub fn read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Sets the write timeout for requests.
    ///
    /// # Arguments
    ///
    /// * `timeout` - Maximum time to wait for writes. `None` means no timeout.
    #[inline]
    pub fn write_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Selects the protocol revision. RESP3 connections send `HELLO 3`
    /// right after connecting.
    #[inline]
    pub fn protocol(mut self, protocol: ProtocolVersion) -> Self {
        self.protocol = protocol;
        self
    }

    /// Caps declared bulk and aggregate lengths accepted by the decoder.
    #[inline]
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    /// Returns a decoder configured for connections made by this builder.
    pub fn decoder(&self) -> Decoder {
        Decoder::with_protocol(self.protocol).with_max_frame_size(self.max_frame_size)
    }

    /// Resolves the configured address.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the address is missing or
    /// malformed.
    pub fn node(&self) -> Result<NodeAddr> {
        let address = self
            .address
            .as_deref()
            .ok_or_else(|| Error::invalid_argument("address is required"))?;
        parse_address(address)
    }

    /// Connects to the configured address.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if address is not set.
    /// Returns [`Error::Io`] or [`Error::Timeout`] if connecting fails.
    pub async fn connect(&self) -> Result<Connection<TcpStream>> {
        let node = self.node()?;
        self.connect_to(&node).await
    }

    /// Connects to `node` using this builder's settings.
    pub async fn connect_to(&self, node: &NodeAddr) -> Result<Connection<TcpStream>> {
        let address = node.address();
        let connect = TcpStream::connect(address.as_str());
        let stream = match self.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, connect)
                .await
                .map_err(|_| Error::Timeout {
                    endpoint: address.clone(),
                })??,
            None => connect.await?,
        };
        stream.set_nodelay(true)?;
        debug!(endpoint = %address, "connected");

        let mut conn = Connection::new(stream, address)
            .with_timeouts(self.read_timeout, self.write_timeout)
            .with_max_line_length(self.max_frame_size.min(DEFAULT_MAX_LINE_LENGTH));
        if self.protocol == ProtocolVersion::Resp3 {
            let reply = request(&mut conn, &self.decoder(), &command::hello(3)).await?;
            if let Frame::Error(err) = reply {
                conn.disconnect();
                return Err(Error::Server {
                    message: err.message().to_string(),
                });
            }
        }
        Ok(conn)
    }

    /// Wraps this builder into a [`Connector`] for pools and discovery.
    pub fn into_connector(self) -> TcpConnector {
        TcpConnector { builder: self }
    }
}

fn parse_address(address: &str) -> Result<NodeAddr> {
    if !address.contains("://") {
        return NodeAddr::parse(address);
    }

    let parsed_url =
        url::Url::parse(address).map_err(|_| Error::invalid_argument("invalid address format"))?;
    let scheme = parsed_url.scheme();
    if scheme != "redis" {
        return Err(Error::invalid_argument(
            "invalid scheme, expected redis://",
        ));
    }
    let host = match parsed_url.host() {
        Some(url::Host::Ipv6(ip)) => ip.to_string(),
        Some(host) => host.to_string(),
        None => return Err(Error::invalid_argument("missing host in address")),
    };
    Ok(NodeAddr::new(host, parsed_url.port().unwrap_or(DEFAULT_PORT)))
}

/// [`Connector`] opening TCP connections with a [`ConnectionBuilder`]'s
/// settings. The builder's own address is ignored.
#[derive(Debug, Clone, Default)]
pub struct TcpConnector {
    builder: ConnectionBuilder,
}

impl TcpConnector {
    /// Creates a connector with default settings.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, node: &NodeAddr) -> Result<Box<dyn Transport>> {
        let conn = self.builder.connect_to(node).await?;
        Ok(Box::new(conn))
    }

    fn decoder(&self) -> Decoder {
        self.builder.decoder()
    }
}
