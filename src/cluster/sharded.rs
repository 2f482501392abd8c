//! Client-side sharding over independent servers.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;

use crate::cluster::ring::ConsistentHashRing;
use crate::core::command::Cmd;
use crate::core::node::NodeAddr;
use crate::core::pool::ConnectionPool;
use crate::core::transport::Connector;
use crate::core::Result;
use crate::proto::frame::Frame;
use crate::retry::RetryPolicy;

/// Spreads keys over standalone servers with a [`ConsistentHashRing`].
///
/// Unlike [`ClusterRouter`](crate::cluster::ClusterRouter) the servers know
/// nothing about each other; placement is decided by the client alone.
pub struct ShardedCluster {
    ring: RwLock<ConsistentHashRing>,
    pool: ConnectionPool,
    retry: RetryPolicy,
}

impl ShardedCluster {
    /// Creates a cluster with an empty ring.
    pub fn new(connector: Arc<dyn Connector>, retry: RetryPolicy) -> Self {
        Self::with_ring(ConsistentHashRing::new(), connector, retry)
    }

    /// Creates a cluster over an existing ring.
    pub fn with_ring(
        ring: ConsistentHashRing,
        connector: Arc<dyn Connector>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            ring: RwLock::new(ring),
            pool: ConnectionPool::new(connector),
            retry,
        }
    }

    /// Adds `node` with `weight`, or reweights it.
    pub async fn add_node(&self, node: NodeAddr, weight: u32) -> Result<()> {
        let mut ring = self.ring.write().await;
        ring.add_node(node.clone(), weight)?;
        info!(node = %node, weight, nodes = ring.len(), "ring node added");
        Ok(())
    }

    /// Removes `node` and closes its connection. Returns false if absent.
    pub async fn remove_node(&self, node: &NodeAddr) -> bool {
        let removed = self.ring.write().await.remove_node(node);
        if removed {
            self.pool.evict(node).await;
            info!(node = %node, "ring node removed");
        }
        removed
    }

    /// Node responsible for `key`.
    pub async fn node_for(&self, key: impl AsRef<[u8]>) -> Result<NodeAddr> {
        self.ring.read().await.get(key).cloned()
    }

    /// Snapshot of the ring.
    pub async fn ring(&self) -> ConsistentHashRing {
        self.ring.read().await.clone()
    }

    /// Sends `cmd` to the node owning `key`.
    ///
    /// The owner is looked up again on every attempt, so a retry after
    /// [`remove_node`](ShardedCluster::remove_node) lands on the new owner.
    pub async fn execute(&self, key: impl AsRef<[u8]>, cmd: &Cmd) -> Result<Frame> {
        let key = key.as_ref();
        self.retry
            .call_with_retry(|| async move {
                let node = self.node_for(key).await?;
                self.pool.request(&node, cmd).await
            })
            .await
    }
}

impl std::fmt::Debug for ShardedCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardedCluster")
            .field("pool", &self.pool)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::ScriptedConnector;
    use crate::proto::error::Error;
    use crate::retry::Backoff;
    use bytes::Bytes;

    fn node(port: u16) -> NodeAddr {
        NodeAddr::new("127.0.0.1", port)
    }

    #[tokio::test]
    async fn test_empty_ring() {
        let cluster = ShardedCluster::new(Arc::new(ScriptedConnector::new()), RetryPolicy::never());
        let err = cluster
            .execute("k", &Cmd::new("GET").arg("k"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::EmptyRing));
    }

    #[tokio::test]
    async fn test_routes_to_ring_owner() {
        let connector = Arc::new(ScriptedConnector::new());
        connector.script(node(6379), b"$5\r\nfirst\r\n");
        connector.script(node(6380), b"$6\r\nsecond\r\n");

        let cluster = ShardedCluster::new(connector.clone(), RetryPolicy::never());
        cluster.add_node(node(6379), 1).await.unwrap();
        cluster.add_node(node(6380), 1).await.unwrap();

        let owner = cluster.node_for("user:7").await.unwrap();
        let reply = cluster
            .execute("user:7", &Cmd::new("GET").arg("user:7"))
            .await
            .unwrap();
        let expected = if owner == node(6379) { "first" } else { "second" };
        assert_eq!(reply, Frame::BulkString(Bytes::from(expected)));
        assert_eq!(connector.connects(&owner), 1);
    }

    #[tokio::test]
    async fn test_zero_weight_rejected() {
        let cluster = ShardedCluster::new(Arc::new(ScriptedConnector::new()), RetryPolicy::never());
        assert!(cluster.add_node(node(6379), 0).await.is_err());
        assert!(cluster.ring().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_owner_is_retried() {
        let connector = Arc::new(ScriptedConnector::new());
        let cluster =
            ShardedCluster::new(connector.clone(), RetryPolicy::new(Backoff::none(), 2));
        cluster.add_node(node(6379), 1).await.unwrap();

        let err = cluster
            .execute("k", &Cmd::new("GET").arg("k"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Connection { .. }));
        assert_eq!(connector.connects(&node(6379)), 3);
    }

    #[tokio::test]
    async fn test_removed_node_keys_move_to_survivor() {
        let connector = Arc::new(ScriptedConnector::new());
        let cluster = ShardedCluster::new(connector.clone(), RetryPolicy::never());
        cluster.add_node(node(6379), 1).await.unwrap();
        cluster.add_node(node(6380), 1).await.unwrap();

        let owner = cluster.node_for("k").await.unwrap();
        let other = if owner == node(6379) { node(6380) } else { node(6379) };
        connector.script(other.clone(), b"+OK\r\n");

        assert!(cluster.remove_node(&owner).await);
        assert!(!cluster.remove_node(&owner).await);
        assert_eq!(cluster.node_for("k").await.unwrap(), other);

        let reply = cluster
            .execute("k", &Cmd::new("SET").arg("k").arg("v"))
            .await
            .unwrap();
        assert_eq!(reply, Frame::SimpleString(Bytes::from("OK")));
        assert_eq!(connector.connects(&owner), 0);
    }
}
