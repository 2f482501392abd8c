//! Scripted connector for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;

use crate::core::node::NodeAddr;
use crate::core::transport::{Connector, MemoryTransport, Transport};
use crate::core::{Error, Result};
use crate::proto::codec::{Decoder, ProtocolVersion};

/// Hands out [`MemoryTransport`]s preloaded with scripted replies.
///
/// Each `connect` to a node consumes that node's next script; a node with
/// no script left refuses the connection. Bytes written by the client are
/// recorded per node across connections.
#[derive(Default)]
pub(crate) struct ScriptedConnector {
    scripts: Mutex<HashMap<NodeAddr, VecDeque<Vec<u8>>>>,
    connects: Mutex<HashMap<NodeAddr, usize>>,
    written: Arc<Mutex<HashMap<NodeAddr, Vec<u8>>>>,
    resp3: bool,
}

impl ScriptedConnector {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// A connector whose replies are decoded as RESP3.
    pub(crate) fn resp3() -> Self {
        Self {
            resp3: true,
            ..Self::default()
        }
    }

    /// Queues the input of the next connection to `node`.
    pub(crate) fn script(&self, node: NodeAddr, replies: &[u8]) {
        self.scripts
            .lock()
            .unwrap()
            .entry(node)
            .or_default()
            .push_back(replies.to_vec());
    }

    pub(crate) fn connects(&self, node: &NodeAddr) -> usize {
        self.connects.lock().unwrap().get(node).copied().unwrap_or(0)
    }

    /// Everything the client wrote to `node`.
    pub(crate) fn written(&self, node: &NodeAddr) -> Vec<u8> {
        self.written
            .lock()
            .unwrap()
            .get(node)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, node: &NodeAddr) -> Result<Box<dyn Transport>> {
        *self.connects.lock().unwrap().entry(node.clone()).or_default() += 1;
        let script = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(node)
            .and_then(VecDeque::pop_front);
        match script {
            Some(input) => Ok(Box::new(Recording {
                inner: MemoryTransport::new(input).with_endpoint(node.address()),
                node: node.clone(),
                log: self.written.clone(),
            })),
            None => Err(Error::Connection {
                endpoint: node.address(),
                message: "connection refused".to_string(),
            }),
        }
    }

    fn decoder(&self) -> Decoder {
        if self.resp3 {
            Decoder::with_protocol(ProtocolVersion::Resp3)
        } else {
            Decoder::new()
        }
    }
}

struct Recording {
    inner: MemoryTransport,
    node: NodeAddr,
    log: Arc<Mutex<HashMap<NodeAddr, Vec<u8>>>>,
}

#[async_trait]
impl Transport for Recording {
    async fn write_bytes(&mut self, buf: &[u8]) -> Result<()> {
        self.inner.write_bytes(buf).await?;
        self.log
            .lock()
            .unwrap()
            .entry(self.node.clone())
            .or_default()
            .extend_from_slice(buf);
        Ok(())
    }

    async fn read_line(&mut self) -> Result<Bytes> {
        self.inner.read_line().await
    }

    async fn read_bytes(&mut self, len: usize) -> Result<Bytes> {
        self.inner.read_bytes(len).await
    }

    fn disconnect(&mut self) {
        self.inner.disconnect()
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    fn endpoint(&self) -> String {
        self.inner.endpoint()
    }
}
