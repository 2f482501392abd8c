//! Per-node connection pool.
//!
//! Each node gets one connection, opened lazily through a [`Connector`] and
//! locked exclusively for the duration of a request/reply exchange.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::core::command::Cmd;
use crate::core::node::NodeAddr;
use crate::core::request;
use crate::core::transport::{Connector, Transport};
use crate::core::Result;
use crate::proto::codec::Decoder;
use crate::proto::error::ErrorKind;
use crate::proto::frame::Frame;

/// A pooled connection. Holding the lock grants exclusive use.
pub type SharedTransport = Arc<Mutex<Box<dyn Transport>>>;

/// Connections to a set of nodes, keyed by address.
pub struct ConnectionPool {
    connector: Arc<dyn Connector>,
    decoder: Decoder,
    connections: RwLock<HashMap<NodeAddr, SharedTransport>>,
}

impl ConnectionPool {
    /// Creates an empty pool opening connections with `connector`.
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        let decoder = connector.decoder();
        Self {
            connector,
            decoder,
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Connector used for new connections.
    pub fn connector(&self) -> &Arc<dyn Connector> {
        &self.connector
    }

    /// Returns the connection to `node`, connecting if there is none or the
    /// pooled one was disconnected.
    pub async fn get(&self, node: &NodeAddr) -> Result<SharedTransport> {
        if let Some(conn) = self.connections.read().await.get(node) {
            // A connection in use is alive as far as we can tell.
            let alive = match conn.try_lock() {
                Ok(guard) => guard.is_connected(),
                Err(_) => true,
            };
            if alive {
                return Ok(conn.clone());
            }
        }

        let transport = self.connector.connect(node).await?;
        debug!(node = %node, "pooled new connection");
        let conn: SharedTransport = Arc::new(Mutex::new(transport));
        let mut conns = self.connections.write().await;
        let entry = conns.entry(node.clone()).or_insert_with(|| conn.clone());
        // Another task may have reconnected meanwhile; keep whichever is live.
        if !Arc::ptr_eq(entry, &conn) {
            let keep_existing = match entry.try_lock() {
                Ok(guard) => guard.is_connected(),
                Err(_) => true,
            };
            if !keep_existing {
                *entry = conn;
            }
        }
        Ok(entry.clone())
    }

    /// Sends `cmd` to `node` and reads the reply.
    ///
    /// Connection-level failures evict the node's connection so the next
    /// call reconnects.
    pub async fn request(&self, node: &NodeAddr, cmd: &Cmd) -> Result<Frame> {
        let mut replies = self.request_many(node, std::slice::from_ref(cmd)).await?;
        Ok(replies.pop().unwrap_or(Frame::Null))
    }

    /// Sends `cmds` back to back on one connection, holding it for the
    /// whole exchange, and returns one reply per command.
    pub async fn request_many(&self, node: &NodeAddr, cmds: &[Cmd]) -> Result<Vec<Frame>> {
        let conn = self.get(node).await?;
        let result = {
            let mut transport = conn.lock().await;
            let mut replies = Vec::with_capacity(cmds.len());
            let mut failure = None;
            for cmd in cmds {
                match request(&mut **transport, &self.decoder, cmd).await {
                    Ok(reply) => replies.push(reply),
                    Err(err) => {
                        failure = Some(err);
                        break;
                    }
                }
            }
            match failure {
                Some(err) => Err(err),
                None => Ok(replies),
            }
        };
        if let Err(err) = &result {
            if matches!(
                err.kind(),
                ErrorKind::Connection | ErrorKind::Timeout | ErrorKind::Protocol
            ) {
                warn!(node = %node, error = %err, "request failed, evicting connection");
                self.evict(node).await;
            }
        }
        result
    }

    /// Drops the connection to `node`.
    pub async fn evict(&self, node: &NodeAddr) {
        if let Some(conn) = self.connections.write().await.remove(node) {
            if let Ok(mut guard) = conn.try_lock() {
                guard.disconnect();
            }
        }
    }

    /// Drops connections to nodes not in `keep`.
    pub async fn retain(&self, keep: &[NodeAddr]) {
        self.connections
            .write()
            .await
            .retain(|node, _| keep.contains(node));
    }

    /// Nodes with a pooled connection.
    pub async fn nodes(&self) -> Vec<NodeAddr> {
        self.connections.read().await.keys().cloned().collect()
    }

    /// Number of pooled connections.
    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    /// True when no connection is pooled.
    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("decoder", &self.decoder)
            .finish_non_exhaustive()
    }
}
