//! Sentinel-backed replication with automatic rediscovery.

use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::command::Cmd;
use crate::core::node::NodeAddr;
use crate::core::pool::ConnectionPool;
use crate::core::transport::Connector;
use crate::core::{Error, Result};
use crate::proto::error::ErrorKind;
use crate::proto::frame::Frame;
use crate::replication::replica_set::{ReplicaSet, ReplicationState};
use crate::replication::sentinel::{SentinelConfig, SentinelDiscovery};
use crate::retry::RetryPolicy;

struct Topology {
    set: ReplicaSet,
    state: ReplicationState,
}

/// Routes requests to the active node of a sentinel-monitored replica set.
///
/// The set is discovered on first use and rediscovered whenever it has
/// been marked stale, which happens automatically after a connection
/// failure. A failed rediscovery keeps the previous set, and requests keep
/// going to its active node until a sentinel answers again.
///
/// # Example
///
/// ```no_run
/// use shardwire::{Cmd, NodeAddr, RetryPolicy, SentinelConfig, SentinelReplication, TcpConnector};
/// use std::sync::Arc;
///
/// # async fn example() -> shardwire::Result<()> {
/// let config = SentinelConfig::new("mymaster", vec![NodeAddr::new("127.0.0.1", 26379)]);
/// let replication =
///     SentinelReplication::new(config, Arc::new(TcpConnector::new()), RetryPolicy::default());
///
/// replication.execute(&Cmd::new("SET").arg("k").arg("v")).await?;
/// # Ok(())
/// # }
/// ```
pub struct SentinelReplication {
    service: String,
    discovery: Mutex<SentinelDiscovery>,
    topology: RwLock<Topology>,
    pool: ConnectionPool,
    retry: RetryPolicy,
}

impl SentinelReplication {
    /// Creates an unresolved replication over `config`'s sentinels.
    pub fn new(
        config: SentinelConfig,
        connector: Arc<dyn Connector>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            service: config.service.clone(),
            discovery: Mutex::new(SentinelDiscovery::new(config, connector.clone())),
            topology: RwLock::new(Topology {
                set: ReplicaSet::empty(),
                state: ReplicationState::Unresolved,
            }),
            pool: ConnectionPool::new(connector),
            retry,
        }
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> ReplicationState {
        self.topology.read().await.state
    }

    /// Snapshot of the replica set.
    pub async fn replica_set(&self) -> ReplicaSet {
        self.topology.read().await.set.clone()
    }

    /// Rediscovers the set unless it is resolved.
    pub async fn check(&self) -> Result<()> {
        self.check_until(&CancellationToken::new()).await
    }

    /// Like [`check`](SentinelReplication::check), abandoning discovery
    /// between sentinel attempts once `cancel` fires.
    pub async fn check_until(&self, cancel: &CancellationToken) -> Result<()> {
        if self.state().await == ReplicationState::Resolved {
            return Ok(());
        }
        let mut discovery = self.discovery.lock().await;
        // Someone else may have finished discovery while we waited.
        if self.state().await == ReplicationState::Resolved {
            return Ok(());
        }
        self.discover(&mut discovery, cancel).await
    }

    /// Runs discovery now, whatever the state.
    pub async fn refresh(&self) -> Result<()> {
        let mut discovery = self.discovery.lock().await;
        self.discover(&mut discovery, &CancellationToken::new()).await
    }

    async fn discover(
        &self,
        discovery: &mut SentinelDiscovery,
        cancel: &CancellationToken,
    ) -> Result<()> {
        match discovery.discover_until(cancel).await {
            Ok(set) => {
                let members: Vec<NodeAddr> = set.members().cloned().collect();
                let mut topology = self.topology.write().await;
                if topology.set.master() != set.master() {
                    info!(
                        from = ?topology.set.master().map(NodeAddr::address),
                        to = ?set.master().map(NodeAddr::address),
                        "master changed"
                    );
                }
                *topology = Topology {
                    set,
                    state: ReplicationState::Resolved,
                };
                drop(topology);
                self.pool.retain(&members).await;
                Ok(())
            }
            Err(err) => {
                let mut topology = self.topology.write().await;
                if topology.state == ReplicationState::Resolved {
                    topology.state = ReplicationState::Stale;
                }
                warn!(error = %err, "replica set discovery failed");
                Err(err)
            }
        }
    }

    /// Marks the set for rediscovery before the next request.
    pub async fn mark_stale(&self) {
        let mut topology = self.topology.write().await;
        if topology.state == ReplicationState::Resolved {
            debug!("replica set marked stale");
            topology.state = ReplicationState::Stale;
        }
    }

    /// Rediscovers like [`check`](SentinelReplication::check), except that a
    /// stale set with an active node stays routable when discovery fails
    /// with a topology or connection error.
    async fn ensure_routable(&self) -> Result<()> {
        let err = match self.check().await {
            Ok(()) => return Ok(()),
            Err(err) => err,
        };
        if !matches!(
            err.kind(),
            ErrorKind::Topology | ErrorKind::Connection | ErrorKind::Timeout | ErrorKind::Protocol
        ) {
            return Err(err);
        }
        let topology = self.topology.read().await;
        match (topology.state, topology.set.current()) {
            (ReplicationState::Stale, Some(node)) => {
                warn!(
                    node = %node,
                    error = %err,
                    "rediscovery failed, routing to last known node"
                );
                Ok(())
            }
            _ => Err(err),
        }
    }

    /// The node requests are routed to, discovering first if needed.
    ///
    /// When rediscovery of a stale set fails the last active node is
    /// returned; the error surfaces only if no set was ever resolved.
    pub async fn current(&self) -> Result<NodeAddr> {
        self.ensure_routable().await?;
        let topology = self.topology.read().await;
        topology
            .set
            .current()
            .cloned()
            .ok_or_else(|| Error::MasterNotFound {
                service: self.service.clone(),
            })
    }

    /// Makes `node` the active node without touching the topology.
    pub async fn switch_to(&self, node: &NodeAddr) -> Result<()> {
        self.ensure_routable().await?;
        self.topology.write().await.set.switch_to(node)?;
        info!(node = %node, "switched active node");
        Ok(())
    }

    /// Makes the master the active node.
    pub async fn switch_to_master(&self) -> Result<()> {
        self.ensure_routable().await?;
        self.topology.write().await.set.switch_to_master()
    }

    /// Makes a random replica the active node (the master if there is
    /// none) and returns it.
    pub async fn switch_to_replica(&self) -> Result<NodeAddr> {
        self.ensure_routable().await?;
        let mut topology = self.topology.write().await;
        let node = topology
            .set
            .switch_to_replica(&mut rand::thread_rng())?
            .clone();
        debug!(node = %node, "switched to replica");
        Ok(node)
    }

    /// Sends `cmd` to the active node.
    ///
    /// A connection failure marks the set stale, so the next attempt
    /// rediscovers it; attempts are governed by the configured
    /// [`RetryPolicy`].
    pub async fn execute(&self, cmd: &Cmd) -> Result<Frame> {
        self.retry
            .call_with_retry(|| async {
                let node = self.current().await?;
                match self.pool.request(&node, cmd).await {
                    Err(err)
                        if matches!(err.kind(), ErrorKind::Connection | ErrorKind::Timeout) =>
                    {
                        warn!(node = %node, error = %err, "active node failed");
                        self.mark_stale().await;
                        Err(err)
                    }
                    result => result,
                }
            })
            .await
    }

    /// The connection pool.
    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }
}

impl std::fmt::Debug for SentinelReplication {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SentinelReplication")
            .field("service", &self.service)
            .field("pool", &self.pool)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}
