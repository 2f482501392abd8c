use bytes::Bytes;

use crate::proto::error::{Error, Result};

/// An error reply as sent by the server (`-` or `!`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerError {
    message: String,
    blob: bool,
}

impl ServerError {
    /// Creates an error reply from its full text, e.g. `ERR bad thing`.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            blob: false,
        }
    }

    /// Creates a blob error reply (`!` in RESP3).
    pub fn blob(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            blob: true,
        }
    }

    /// Full error text including the error type prefix.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The error type, i.e. the first whitespace-delimited token
    /// (`ERR`, `WRONGTYPE`, `MOVED`, ...).
    pub fn kind(&self) -> &str {
        self.message.split_whitespace().next().unwrap_or("")
    }

    /// Returns true if this error was received as a blob error.
    pub fn is_blob(&self) -> bool {
        self.blob
    }
}

/// A RESP (Redis Serialization Protocol) frame.
///
/// RESP2 replies only ever produce `SimpleString`, `Error`, `Integer`,
/// `BulkString`, `Array` and `Null`. The remaining variants are RESP3 only.
///
/// A declared length of `-1` on a bulk string or array always decodes to
/// [`Frame::Null`], never to an empty value.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Simple string / status (+OK).
    SimpleString(Bytes),
    /// Error (-ERR) or blob error (!).
    Error(ServerError),
    /// Integer (:1000).
    Integer(i64),
    /// Bulk string ($6\r\nfoobar).
    BulkString(Bytes),
    /// Array (*2\r\n...).
    Array(Vec<Frame>),
    /// Null ($-1, *-1 or _).
    Null,
    /// Double (,3.14).
    Double(f64),
    /// Boolean (#t).
    Boolean(bool),
    /// Big number, kept as its decimal text ((3492890328409238509324850943850943825024385).
    BigNumber(String),
    /// Map (%2\r\n...), pairs in wire order.
    Map(Vec<(Frame, Frame)>),
    /// Set (~2\r\n...).
    Set(Vec<Frame>),
    /// Out-of-band push (>2\r\n...).
    Push(Vec<Frame>),
    /// Verbatim string (=15\r\ntxt:Some string).
    VerbatimString {
        /// Three byte format tag, e.g. `txt` or `mkd`.
        format: Bytes,
        /// The text without the format prefix.
        data: Bytes,
    },
}

impl Frame {
    /// Returns the payload of a string-like frame.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Frame::SimpleString(b) | Frame::BulkString(b) => Some(b),
            Frame::VerbatimString { data, .. } => Some(data),
            _ => None,
        }
    }

    /// Returns the value of an integer frame.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Frame::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Consumes an array-like frame (array, set or push) into its elements.
    pub fn into_array(self) -> Option<Vec<Frame>> {
        match self {
            Frame::Array(a) | Frame::Set(a) | Frame::Push(a) => Some(a),
            _ => None,
        }
    }

    /// Returns true if this frame is Null.
    pub fn is_null(&self) -> bool {
        matches!(self, Frame::Null)
    }

    /// Returns the error type token if this frame is an error reply.
    pub fn error_kind(&self) -> Option<&str> {
        match self {
            Frame::Error(e) => Some(e.kind()),
            _ => None,
        }
    }

    /// Converts an error reply into [`Error::Server`], passing any other
    /// frame through.
    pub fn into_result(self) -> Result<Frame> {
        match self {
            Frame::Error(e) => Err(Error::Server { message: e.message }),
            frame => Ok(frame),
        }
    }

    /// Narrows a big number to `i128` when it fits, without precision loss.
    pub fn big_number_as_i128(&self) -> Option<i128> {
        match self {
            Frame::BigNumber(digits) => digits.parse().ok(),
            _ => None,
        }
    }
}
