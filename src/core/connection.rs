use std::fmt;
use std::future::Future;
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::core::transport::Transport;
use crate::proto::error::{Error, Result};

/// Longest line accepted by default, CRLF excluded.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 64 * 1024;

/// A connection to a server over any tokio stream.
///
/// Reads are buffered but only ever consumed as far as the decoder asks.
/// Any IO failure or timeout drops the stream, since the position inside
/// the current reply is lost. Lines longer than the configured maximum are
/// a protocol error.
///
/// # Example
///
/// ```no_run
/// use shardwire::core::connection::Connection;
/// use shardwire::core::transport::Transport;
/// use shardwire::proto::codec::Decoder;
/// use tokio::net::TcpStream;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let stream = TcpStream::connect("127.0.0.1:6379").await?;
/// let mut conn = Connection::new(stream, "127.0.0.1:6379");
/// conn.write_bytes(b"*1\r\n$4\r\nPING\r\n").await?;
/// let reply = Decoder::new().decode(&mut conn).await?;
/// println!("{:?}", reply);
/// # Ok(())
/// # }
/// ```
pub struct Connection<S> {
    stream: Option<BufReader<S>>,
    endpoint: String,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
    max_line_length: usize,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Creates a new connection with the given stream.
    ///
    /// Initializes a connection with no timeouts configured.
    ///
    /// # Arguments
    ///
    /// * `stream` - The underlying async stream (TCP, TLS, etc.)
    /// * `endpoint` - Description of the remote end used in errors
    pub fn new(stream: S, endpoint: impl Into<String>) -> Self {
        Self {
            stream: Some(BufReader::new(stream)),
            endpoint: endpoint.into(),
            read_timeout: None,
            write_timeout: None,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }

    /// Configures read and write timeouts for this connection.
    ///
    /// # Arguments
    ///
    /// * `read_timeout` - Optional duration for read operations
    /// * `write_timeout` - Optional duration for write operations
    ///
    /// # Returns
    ///
    /// Self for method chaining
    pub fn with_timeouts(
        mut self,
        read_timeout: Option<Duration>,
        write_timeout: Option<Duration>,
    ) -> Self {
        self.read_timeout = read_timeout;
        self.write_timeout = write_timeout;
        self
    }

    /// Caps the length of header, status and error lines.
    pub fn with_max_line_length(mut self, max_line_length: usize) -> Self {
        self.max_line_length = max_line_length;
        self
    }

    fn closed(&self) -> Error {
        closed(&self.endpoint)
    }
}

fn closed(endpoint: &str) -> Error {
    Error::Connection {
        endpoint: endpoint.to_string(),
        message: "connection closed".to_string(),
    }
}

async fn with_timeout<T, F>(limit: Option<Duration>, endpoint: &str, fut: F) -> Result<T>
where
    F: Future<Output = io::Result<T>>,
{
    match limit {
        Some(limit) => match tokio::time::timeout(limit, fut).await {
            Ok(res) => res.map_err(Error::from),
            Err(_) => Err(Error::Timeout {
                endpoint: endpoint.to_string(),
            }),
        },
        None => fut.await.map_err(Error::from),
    }
}

#[async_trait]
impl<S> Transport for Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn write_bytes(&mut self, buf: &[u8]) -> Result<()> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| closed(&self.endpoint))?;
        let result = with_timeout(self.write_timeout, &self.endpoint, async {
            stream.write_all(buf).await?;
            stream.flush().await
        })
        .await;
        if result.is_err() {
            self.disconnect();
        }
        result
    }

    async fn read_line(&mut self) -> Result<Bytes> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| closed(&self.endpoint))?;
        let limit = self.max_line_length.saturating_add(2);
        let result = with_timeout(self.read_timeout, &self.endpoint, async {
            let mut line = Vec::new();
            stream.take(limit as u64).read_until(b'\n', &mut line).await?;
            Ok(line)
        })
        .await;
        let line = match result {
            Ok(line) => line,
            Err(err) => {
                self.disconnect();
                return Err(err);
            }
        };

        if !line.ends_with(b"\n") {
            let err = if line.len() >= limit {
                Error::protocol(
                    format!("line exceeds {} bytes", self.max_line_length),
                    &line[..line.len().min(64)],
                    self.endpoint.clone(),
                )
            } else {
                self.closed()
            };
            self.disconnect();
            return Err(err);
        }
        if !line.ends_with(b"\r\n") {
            let err = Error::protocol("line not terminated by CRLF", &line, self.endpoint.clone());
            self.disconnect();
            return Err(err);
        }
        let mut line = Bytes::from(line);
        line.truncate(line.len() - 2);
        Ok(line)
    }

    async fn read_bytes(&mut self, len: usize) -> Result<Bytes> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| closed(&self.endpoint))?;
        let result = with_timeout(self.read_timeout, &self.endpoint, async {
            let mut buf = vec![0u8; len];
            stream.read_exact(&mut buf).await?;
            Ok(buf)
        })
        .await;
        match result {
            Ok(buf) => Ok(Bytes::from(buf)),
            Err(err) => {
                self.disconnect();
                Err(err)
            }
        }
    }

    fn disconnect(&mut self) {
        self.stream = None;
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn endpoint(&self) -> String {
        self.endpoint.clone()
    }
}

impl<S> fmt::Debug for Connection<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("endpoint", &self.endpoint)
            .field("connected", &self.stream.is_some())
            .field("read_timeout", &self.read_timeout)
            .field("write_timeout", &self.write_timeout)
            .field("max_line_length", &self.max_line_length)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::codec::{Decoder, Encoder};
    use crate::proto::error::ErrorKind;
    use crate::proto::frame::Frame;
    use crate::Cmd;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_connection_ping_pong() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut conn = Connection::new(stream, "client");
            let frame = Decoder::new().decode(&mut conn).await.unwrap();
            assert_eq!(frame, Cmd::new("PING").into_frame());
            let mut encoder = Encoder::new();
            encoder.encode(&Frame::SimpleString(Bytes::from("PONG")));
            conn.write_bytes(&encoder.take()).await.unwrap();
        };

        let client = async {
            let stream = tokio::net::TcpStream::connect(addr).await.unwrap();
            let mut conn = Connection::new(stream, addr.to_string());
            conn.write_bytes(&Cmd::new("PING").to_bytes()).await.unwrap();
            let frame = Decoder::new().decode(&mut conn).await.unwrap();
            assert_eq!(frame, Frame::SimpleString(Bytes::from("PONG")));
        };

        tokio::join!(server, client);
    }

    #[tokio::test]
    async fn test_read_timeout_disconnects() {
        let (client, _server) = tokio::io::duplex(64);
        let mut conn =
            Connection::new(client, "duplex").with_timeouts(Some(Duration::from_millis(20)), None);
        let err = conn.read_line().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(!conn.is_connected());
        assert_eq!(conn.read_line().await.unwrap_err().kind(), ErrorKind::Connection);
    }

    #[tokio::test]
    async fn test_eof_is_connection_error() {
        let (client, server) = tokio::io::duplex(64);
        drop(server);
        let mut conn = Connection::new(client, "duplex");
        let err = conn.read_line().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connection);
    }

    #[tokio::test]
    async fn test_partial_reads_are_reassembled() {
        let (client, mut server) = tokio::io::duplex(64);
        let mut conn = Connection::new(client, "duplex");
        let writer = tokio::spawn(async move {
            for chunk in [&b"*2\r\n$3\r"[..], b"\nfoo\r\n:4", b"2\r\n"] {
                server.write_all(chunk).await.unwrap();
                tokio::task::yield_now().await;
            }
            server
        });
        let frame = Decoder::new().decode(&mut conn).await.unwrap();
        assert_eq!(
            frame,
            Frame::Array(vec![Frame::BulkString(Bytes::from("foo")), Frame::Integer(42)])
        );
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_line_without_lf_is_bounded() {
        let (client, mut server) = tokio::io::duplex(256);
        let mut conn = Connection::new(client, "duplex").with_max_line_length(16);
        server.write_all(&[b'+'; 64]).await.unwrap();

        let err = conn.read_line().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert!(!conn.is_connected());
    }

    #[tokio::test]
    async fn test_line_at_limit_is_accepted() {
        let (client, mut server) = tokio::io::duplex(256);
        let mut conn = Connection::new(client, "duplex").with_max_line_length(4);
        server.write_all(b"+OK!\r\n+TOOLONG\r\n").await.unwrap();

        assert_eq!(conn.read_line().await.unwrap(), Bytes::from("+OK!"));
        assert_eq!(conn.read_line().await.unwrap_err().kind(), ErrorKind::Protocol);
    }
}
