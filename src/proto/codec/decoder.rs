use bytes::Bytes;
use futures::future::{BoxFuture, FutureExt};
use tracing::warn;

use crate::core::transport::{MemoryTransport, Transport};
use crate::proto::codec::stream::{AggregateKind, FrameStream};
use crate::proto::codec::ProtocolVersion;
use crate::proto::error::{Error, ErrorKind, Result};
use crate::proto::frame::{Frame, ServerError};

const DEFAULT_MAX_FRAME_SIZE: usize = 512 * 1024 * 1024; // 512 MB default

/// Status replies handed out as static bytes instead of slices of the
/// read buffer.
const INTERNED_STATUSES: [&[u8]; 3] = [b"OK", b"QUEUED", b"PONG"];

/// Length of the `xxx:` prefix of a verbatim string.
const VERBATIM_PREFIX_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    SimpleString,
    Error,
    Integer,
    BulkString,
    Array,
    Null,
    Double,
    Boolean,
    BlobError,
    VerbatimString,
    BigNumber,
    Map,
    Set,
    Push,
}

impl Tag {
    fn from_byte(byte: u8, protocol: ProtocolVersion) -> Option<Self> {
        let tag = match byte {
            b'+' => Tag::SimpleString,
            b'-' => Tag::Error,
            b':' => Tag::Integer,
            b'$' => Tag::BulkString,
            b'*' => Tag::Array,
            _ if protocol == ProtocolVersion::Resp2 => return None,
            b'_' => Tag::Null,
            b',' => Tag::Double,
            b'#' => Tag::Boolean,
            b'!' => Tag::BlobError,
            b'=' => Tag::VerbatimString,
            b'(' => Tag::BigNumber,
            b'%' => Tag::Map,
            b'~' => Tag::Set,
            b'>' => Tag::Push,
            _ => return None,
        };
        Some(tag)
    }
}

/// Result of [`Decoder::decode_streaming`].
pub enum Decoded<'a, T: Transport + ?Sized> {
    /// The reply was not a streamable aggregate and was read whole.
    Frame(Frame),
    /// The reply is an array, map or set whose elements are read on demand.
    Stream(FrameStream<'a, T>),
}

/// A RESP decoder that reads [`Frame`]s from a [`Transport`].
///
/// Each call reads exactly one reply, blocking the calling task until the
/// transport has delivered enough bytes. Bulk payloads are bounded by their
/// declared length, never by delimiter scanning, so they may contain CR/LF.
///
/// Any malformed frame disconnects the transport before the error is
/// returned; the stream position is unknown afterwards.
///
/// # Example
///
/// ```
/// use shardwire::proto::codec::Decoder;
/// use shardwire::proto::frame::Frame;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> shardwire::Result<()> {
/// let frame = Decoder::new().decode_bytes(b":1000\r\n").await?;
/// assert_eq!(frame, Frame::Integer(1000));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Decoder {
    protocol: ProtocolVersion,
    max_frame_size: usize,
}

impl Decoder {
    /// Creates a RESP2 decoder.
    pub fn new() -> Self {
        Self::with_protocol(ProtocolVersion::Resp2)
    }

    /// Creates a decoder for the given protocol revision.
    pub fn with_protocol(protocol: ProtocolVersion) -> Self {
        Self {
            protocol,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Sets the maximum declared size of a single bulk payload.
    ///
    /// # Arguments
    ///
    /// * `max_frame_size` - Maximum size in bytes for a single frame
    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    /// The protocol revision this decoder accepts.
    pub fn protocol(&self) -> ProtocolVersion {
        self.protocol
    }

    /// Reads one complete reply.
    pub async fn decode<T>(&self, transport: &mut T) -> Result<Frame>
    where
        T: Transport + ?Sized,
    {
        let result = self.decode_frame(transport).await;
        if let Err(err) = &result {
            abandon(transport, err);
        }
        result
    }

    /// Decodes one reply from an in-memory buffer.
    pub async fn decode_bytes(&self, data: &[u8]) -> Result<Frame> {
        let mut transport = MemoryTransport::new(data);
        self.decode(&mut transport).await
    }

    /// Reads one reply, returning arrays, maps and sets as a lazy stream.
    ///
    /// The stream borrows the transport exclusively until it is drained,
    /// closed or dropped. Dropping it early disconnects the transport.
    pub async fn decode_streaming<'a, T>(&self, transport: &'a mut T) -> Result<Decoded<'a, T>>
    where
        T: Transport + ?Sized,
    {
        match self.start_stream(transport).await {
            Ok(Start::Whole(frame)) => Ok(Decoded::Frame(frame)),
            Ok(Start::Aggregate(kind, len)) => Ok(Decoded::Stream(FrameStream::new(
                *self, transport, kind, len,
            ))),
            Err(err) => {
                abandon(transport, &err);
                Err(err)
            }
        }
    }

    async fn start_stream<T>(&self, transport: &mut T) -> Result<Start>
    where
        T: Transport + ?Sized,
    {
        let (tag, payload) = self.read_header(transport).await?;
        let kind = match tag {
            Tag::Array => AggregateKind::Array,
            Tag::Set => AggregateKind::Set,
            Tag::Map => AggregateKind::Map,
            _ => {
                return self
                    .decode_body(tag, payload, transport)
                    .await
                    .map(Start::Whole)
            }
        };
        match self.parse_length(&payload, transport)? {
            None => Ok(Start::Whole(Frame::Null)),
            Some(len) => {
                self.check_aggregate_len(len, &payload, transport)?;
                // Map keys and values are yielded as separate elements.
                let len = if kind == AggregateKind::Map { len * 2 } else { len };
                Ok(Start::Aggregate(kind, len))
            }
        }
    }

    pub(crate) fn decode_frame<'a, T>(&'a self, transport: &'a mut T) -> BoxFuture<'a, Result<Frame>>
    where
        T: Transport + ?Sized,
    {
        async move {
            let (tag, payload) = self.read_header(transport).await?;
            self.decode_body(tag, payload, transport).await
        }
        .boxed()
    }

    async fn read_header<T>(&self, transport: &mut T) -> Result<(Tag, Bytes)>
    where
        T: Transport + ?Sized,
    {
        let line = transport.read_line().await?;
        let first = match line.first() {
            Some(b) => *b,
            None => {
                return Err(Error::protocol(
                    "empty frame header",
                    &line,
                    transport.endpoint(),
                ))
            }
        };
        let tag = Tag::from_byte(first, self.protocol).ok_or_else(|| {
            Error::protocol(
                format!("unknown frame type: {}", first as char),
                &line,
                transport.endpoint(),
            )
        })?;
        Ok((tag, line.slice(1..)))
    }

    async fn decode_body<T>(&self, tag: Tag, payload: Bytes, transport: &mut T) -> Result<Frame>
    where
        T: Transport + ?Sized,
    {
        match tag {
            Tag::SimpleString => Ok(Frame::SimpleString(intern_status(payload))),
            Tag::Error => Ok(Frame::Error(ServerError::new(
                String::from_utf8_lossy(&payload).into_owned(),
            ))),
            Tag::Integer => {
                let value = parse_text::<i64>(&payload)
                    .ok_or_else(|| Error::protocol("invalid integer", &payload, transport.endpoint()))?;
                Ok(Frame::Integer(value))
            }
            Tag::BulkString => {
                let len = self.parse_length(&payload, transport)?;
                match len {
                    None => Ok(Frame::Null),
                    Some(len) => Ok(Frame::BulkString(read_blob(transport, len).await?)),
                }
            }
            Tag::BlobError => {
                let len = self.required_length(&payload, transport)?;
                let data = read_blob(transport, len).await?;
                Ok(Frame::Error(ServerError::blob(
                    String::from_utf8_lossy(&data).into_owned(),
                )))
            }
            Tag::VerbatimString => {
                let len = self.required_length(&payload, transport)?;
                let data = read_blob(transport, len).await?;
                if data.len() < VERBATIM_PREFIX_LEN || data[VERBATIM_PREFIX_LEN - 1] != b':' {
                    return Err(Error::protocol(
                        "verbatim string without format prefix",
                        &data,
                        transport.endpoint(),
                    ));
                }
                Ok(Frame::VerbatimString {
                    format: data.slice(..VERBATIM_PREFIX_LEN - 1),
                    data: data.slice(VERBATIM_PREFIX_LEN..),
                })
            }
            Tag::Array | Tag::Set | Tag::Push => {
                let len = match self.parse_length(&payload, transport)? {
                    None => return Ok(Frame::Null),
                    Some(len) => len,
                };
                self.check_aggregate_len(len, &payload, transport)?;
                let mut items = Vec::with_capacity(len.min(1024));
                for _ in 0..len {
                    items.push(self.decode_frame(transport).await?);
                }
                Ok(match tag {
                    Tag::Set => Frame::Set(items),
                    Tag::Push => Frame::Push(items),
                    _ => Frame::Array(items),
                })
            }
            Tag::Map => {
                let len = match self.parse_length(&payload, transport)? {
                    None => return Ok(Frame::Null),
                    Some(len) => len,
                };
                self.check_aggregate_len(len, &payload, transport)?;
                let mut pairs = Vec::with_capacity(len.min(1024));
                for _ in 0..len {
                    let key = self.decode_frame(transport).await?;
                    let value = self.decode_frame(transport).await?;
                    pairs.push((key, value));
                }
                Ok(Frame::Map(pairs))
            }
            Tag::Null => Ok(Frame::Null),
            Tag::Double => {
                let value = match payload.as_ref() {
                    b"inf" => f64::INFINITY,
                    b"-inf" => f64::NEG_INFINITY,
                    _ => parse_text::<f64>(&payload).ok_or_else(|| {
                        Error::protocol("invalid double", &payload, transport.endpoint())
                    })?,
                };
                Ok(Frame::Double(value))
            }
            Tag::Boolean => Ok(Frame::Boolean(payload.as_ref() == b"t")),
            Tag::BigNumber => {
                let digits = payload.strip_prefix(b"-").unwrap_or(&payload[..]);
                if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
                    return Err(Error::protocol(
                        "invalid big number",
                        &payload,
                        transport.endpoint(),
                    ));
                }
                Ok(Frame::BigNumber(
                    String::from_utf8_lossy(&payload).into_owned(),
                ))
            }
        }
    }

    /// Parses a declared length. `-1` means null.
    ///
    /// The payload must be the canonical decimal form of the value, so
    /// `+5`, `05` or ` 5` are rejected rather than coerced.
    fn parse_length<T>(&self, payload: &Bytes, transport: &T) -> Result<Option<usize>>
    where
        T: Transport + ?Sized,
    {
        let invalid = || Error::protocol("invalid length prefix", payload, transport.endpoint());
        let len = parse_text::<i64>(payload).ok_or_else(invalid)?;
        if len.to_string().as_bytes() != payload.as_ref() {
            return Err(invalid());
        }
        match len {
            -1 => Ok(None),
            n if n < 0 => Err(invalid()),
            n if n as u64 > self.max_frame_size as u64 => Err(Error::protocol(
                "declared length exceeds maximum frame size",
                payload,
                transport.endpoint(),
            )),
            n => Ok(Some(n as usize)),
        }
    }

    fn required_length<T>(&self, payload: &Bytes, transport: &T) -> Result<usize>
    where
        T: Transport + ?Sized,
    {
        self.parse_length(payload, transport)?.ok_or_else(|| {
            Error::protocol("null length not allowed here", payload, transport.endpoint())
        })
    }

    fn check_aggregate_len<T>(&self, len: usize, payload: &Bytes, transport: &T) -> Result<()>
    where
        T: Transport + ?Sized,
    {
        // Assume minimum 16 bytes per item
        if len > self.max_frame_size / 16 {
            return Err(Error::protocol(
                "aggregate length exceeds reasonable maximum",
                payload,
                transport.endpoint(),
            ));
        }
        Ok(())
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

enum Start {
    Whole(Frame),
    Aggregate(AggregateKind, usize),
}

/// Drops the connection after a failed read; its framing is lost.
pub(crate) fn abandon<T>(transport: &mut T, err: &Error)
where
    T: Transport + ?Sized,
{
    if err.kind() == ErrorKind::Protocol && transport.is_connected() {
        warn!(endpoint = %transport.endpoint(), error = %err, "disconnecting after protocol error");
    }
    transport.disconnect();
}

async fn read_blob<T>(transport: &mut T, len: usize) -> Result<Bytes>
where
    T: Transport + ?Sized,
{
    let mut data = transport.read_bytes(len + 2).await?;
    if &data[len..] != b"\r\n" {
        return Err(Error::protocol(
            "bulk payload not terminated by CRLF",
            &data[len..],
            transport.endpoint(),
        ));
    }
    data.truncate(len);
    Ok(data)
}

fn intern_status(payload: Bytes) -> Bytes {
    INTERNED_STATUSES
        .iter()
        .find(|status| payload.as_ref() == **status)
        .map(|status| Bytes::from_static(*status))
        .unwrap_or(payload)
}

fn parse_text<N: std::str::FromStr>(payload: &[u8]) -> Option<N> {
    std::str::from_utf8(payload).ok()?.parse().ok()
}
