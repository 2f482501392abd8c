use bytes::{BufMut, BytesMut};

use crate::core::command::Cmd;
use crate::proto::codec::ProtocolVersion;
use crate::proto::frame::Frame;

/// A RESP encoder that converts commands and [`Frame`] types to bytes.
///
/// The encoder accumulates data in an internal buffer and can be used
/// to encode multiple frames sequentially.
///
/// # Example
///
/// ```
/// use shardwire::proto::codec::Encoder;
/// use shardwire::Cmd;
///
/// let mut encoder = Encoder::new();
/// encoder.encode_command(&Cmd::new("GET").arg("key"));
/// assert_eq!(encoder.take().as_ref(), b"*2\r\n$3\r\nGET\r\n$3\r\nkey\r\n");
/// ```
#[derive(Debug)]
pub struct Encoder {
    buf: BytesMut,
    protocol: ProtocolVersion,
}

impl Encoder {
    /// Creates a new RESP2 encoder with an empty buffer.
    pub fn new() -> Self {
        Self::with_protocol(ProtocolVersion::Resp2)
    }

    /// Creates an encoder for the given protocol revision.
    ///
    /// The revision only decides how [`Frame::Null`] is written; every
    /// other variant has a single wire form.
    pub fn with_protocol(protocol: ProtocolVersion) -> Self {
        Self {
            buf: BytesMut::new(),
            protocol,
        }
    }

    /// Encodes a command as an array of bulk strings.
    ///
    /// Lengths are byte counts, so arguments may contain any bytes,
    /// including CR and LF.
    pub fn encode_command(&mut self, cmd: &Cmd) {
        self.put_header(b'*', cmd.len());
        self.put_blob(b'$', cmd.name());
        for arg in cmd.args() {
            self.put_blob(b'$', arg);
        }
    }

    /// Encodes a frame into the internal buffer.
    ///
    /// # Arguments
    ///
    /// * `frame` - The frame to encode
    pub fn encode(&mut self, frame: &Frame) {
        match frame {
            Frame::SimpleString(s) => self.put_line(b'+', s),
            Frame::Error(e) if e.is_blob() => self.put_blob(b'!', e.message().as_bytes()),
            Frame::Error(e) => self.put_line(b'-', e.message().as_bytes()),
            Frame::Integer(n) => self.put_line(b':', n.to_string().as_bytes()),
            Frame::BulkString(data) => self.put_blob(b'$', data),
            Frame::Array(items) => self.put_aggregate(b'*', items),
            Frame::Null => match self.protocol {
                ProtocolVersion::Resp2 => self.buf.extend_from_slice(b"$-1\r\n"),
                ProtocolVersion::Resp3 => self.buf.extend_from_slice(b"_\r\n"),
            },
            Frame::Double(d) => {
                let text = if d.is_infinite() && d.is_sign_positive() {
                    "inf".to_string()
                } else if d.is_infinite() {
                    "-inf".to_string()
                } else {
                    d.to_string()
                };
                self.put_line(b',', text.as_bytes());
            }
            Frame::Boolean(b) => self.put_line(b'#', if *b { b"t" } else { b"f" }),
            Frame::BigNumber(digits) => self.put_line(b'(', digits.as_bytes()),
            Frame::Map(pairs) => {
                self.put_header(b'%', pairs.len());
                for (key, value) in pairs {
                    self.encode(key);
                    self.encode(value);
                }
            }
            Frame::Set(items) => self.put_aggregate(b'~', items),
            Frame::Push(items) => self.put_aggregate(b'>', items),
            Frame::VerbatimString { format, data } => {
                self.put_header(b'=', format.len() + 1 + data.len());
                self.buf.extend_from_slice(format);
                self.buf.put_u8(b':');
                self.buf.extend_from_slice(data);
                self.buf.extend_from_slice(b"\r\n");
            }
        }
    }

    /// Takes the encoded data from the buffer, leaving it empty.
    ///
    /// # Returns
    ///
    /// The accumulated bytes
    pub fn take(&mut self) -> BytesMut {
        std::mem::take(&mut self.buf)
    }

    fn put_header(&mut self, tag: u8, len: usize) {
        self.buf.put_u8(tag);
        self.buf.extend_from_slice(len.to_string().as_bytes());
        self.buf.extend_from_slice(b"\r\n");
    }

    fn put_line(&mut self, tag: u8, data: &[u8]) {
        self.buf.put_u8(tag);
        self.buf.extend_from_slice(data);
        self.buf.extend_from_slice(b"\r\n");
    }

    fn put_blob(&mut self, tag: u8, data: &[u8]) {
        self.put_header(tag, data.len());
        self.buf.extend_from_slice(data);
        self.buf.extend_from_slice(b"\r\n");
    }

    fn put_aggregate(&mut self, tag: u8, items: &[Frame]) {
        self.put_header(tag, items.len());
        for item in items {
            self.encode(item);
        }
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}
