use bytes::Bytes;

use crate::proto::codec::Encoder;
use crate::proto::frame::Frame;

/// A command ready to be sent to the server.
///
/// A command is a verb plus an ordered list of binary-safe arguments.
/// Arguments are never assumed to be UTF-8.
///
/// # Example
///
/// ```
/// use shardwire::Cmd;
///
/// let cmd = Cmd::new("SET").arg("key").arg(&b"\x00\r\n"[..]);
/// assert_eq!(cmd.len(), 3);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cmd {
    name: Bytes,
    args: Vec<Bytes>,
}

impl Cmd {
    /// Creates a new command with the given name.
    ///
    /// # Arguments
    ///
    /// * `name` - The command name (e.g., "GET", "SET", "DEL")
    #[inline]
    pub fn new(name: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// Appends an argument to the command.
    ///
    /// # Arguments
    ///
    /// * `arg` - The argument value
    #[inline]
    pub fn arg<T: Into<Bytes>>(mut self, arg: T) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends every argument yielded by `args`.
    #[inline]
    pub fn args_from<I, T>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Bytes>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// The command verb.
    #[inline]
    pub fn name(&self) -> &Bytes {
        &self.name
    }

    /// The arguments following the verb.
    #[inline]
    pub fn args(&self) -> &[Bytes] {
        &self.args
    }

    /// Number of wire elements: the verb plus its arguments.
    #[inline]
    pub fn len(&self) -> usize {
        self.args.len() + 1
    }

    /// Always false; a command has at least its verb.
    #[inline]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Serializes the command into its request form.
    pub fn to_bytes(&self) -> Bytes {
        let mut encoder = Encoder::new();
        encoder.encode_command(self);
        encoder.take().freeze()
    }

    /// Converts the command to a RESP Array frame.
    #[inline]
    pub fn into_frame(self) -> Frame {
        Frame::Array(
            std::iter::once(self.name)
                .chain(self.args)
                .map(Frame::BulkString)
                .collect(),
        )
    }
}

/// Creates a PING command.
#[inline]
pub fn ping() -> Cmd {
    Cmd::new("PING")
}

/// Creates a HELLO command negotiating protocol revision `protover`.
#[inline]
pub fn hello(protover: u8) -> Cmd {
    Cmd::new("HELLO").arg(protover.to_string())
}

/// Creates a CLUSTER SLOTS command.
///
/// The reply maps slot ranges to their master and replica nodes.
#[inline]
pub fn cluster_slots() -> Cmd {
    Cmd::new("CLUSTER").arg("SLOTS")
}

/// Creates an ASKING command.
///
/// Sent before retrying a command that received an ASK redirect. It only
/// affects the immediately following command.
#[inline]
pub fn asking() -> Cmd {
    Cmd::new("ASKING")
}

/// Creates a SENTINEL get-master-addr-by-name command.
#[inline]
pub fn sentinel_master_addr(service: impl Into<Bytes>) -> Cmd {
    Cmd::new("SENTINEL")
        .arg("get-master-addr-by-name")
        .arg(service)
}

/// Creates a SENTINEL slaves command listing the replicas of `service`.
#[inline]
pub fn sentinel_replicas(service: impl Into<Bytes>) -> Cmd {
    Cmd::new("SENTINEL").arg("slaves").arg(service)
}

/// Creates a SENTINEL sentinels command listing the peers monitoring `service`.
#[inline]
pub fn sentinel_sentinels(service: impl Into<Bytes>) -> Cmd {
    Cmd::new("SENTINEL").arg("sentinels").arg(service)
}
