//! Slot-routed cluster client.
//!
//! Routes each command to the owner of its key's slot, follows `MOVED` and
//! `ASK` redirects, and re-reads the slot map from the cluster when it has
//! no route or a node stops answering.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::cluster::errors::classify;
use crate::cluster::slot::key_slot;
use crate::cluster::slotmap::SlotMap;
use crate::core::command::{self, Cmd};
use crate::core::node::NodeAddr;
use crate::core::pool::ConnectionPool;
use crate::core::transport::Connector;
use crate::core::{Error, Result};
use crate::proto::error::ErrorKind;
use crate::proto::frame::Frame;
use crate::retry::RetryPolicy;

const DEFAULT_MAX_REDIRECTS: usize = 5;

/// Cluster routing settings.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct ClusterConfig {
    /// Redirects followed for one command before giving up.
    pub max_redirects: usize,
    /// Retry applied around each routed command.
    pub retry: RetryPolicy,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            max_redirects: DEFAULT_MAX_REDIRECTS,
            retry: RetryPolicy::default(),
        }
    }
}

impl ClusterConfig {
    /// Sets the redirect limit.
    pub fn max_redirects(mut self, max_redirects: usize) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    /// Sets the retry policy.
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Client-side router for a slot-sharded cluster.
///
/// # Example
///
/// ```no_run
/// use shardwire::{ClusterConfig, ClusterRouter, Cmd, TcpConnector};
/// use std::sync::Arc;
///
/// # async fn example() -> shardwire::Result<()> {
/// let seeds = ClusterRouter::parse_seeds("127.0.0.1:7000,127.0.0.1:7001")?;
/// let router =
///     ClusterRouter::connect(seeds, Arc::new(TcpConnector::new()), ClusterConfig::default())
///         .await?;
///
/// let reply = router.execute("user:1", &Cmd::new("GET").arg("user:1")).await?;
/// # Ok(())
/// # }
/// ```
pub struct ClusterRouter {
    seeds: Vec<NodeAddr>,
    slots: RwLock<SlotMap>,
    pool: ConnectionPool,
    config: ClusterConfig,
}

impl ClusterRouter {
    /// Creates a router with an empty slot map. The first routed command
    /// loads the map.
    pub fn new(seeds: Vec<NodeAddr>, connector: Arc<dyn Connector>, config: ClusterConfig) -> Self {
        Self {
            seeds,
            slots: RwLock::new(SlotMap::new()),
            pool: ConnectionPool::new(connector),
            config,
        }
    }

    /// Creates a router and loads the slot map.
    pub async fn connect(
        seeds: Vec<NodeAddr>,
        connector: Arc<dyn Connector>,
        config: ClusterConfig,
    ) -> Result<Self> {
        let router = Self::new(seeds, connector, config);
        router.refresh_slots().await?;
        Ok(router)
    }

    /// Parses a comma-separated list of seed addresses.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if no address is given or one
    /// does not parse.
    pub fn parse_seeds(addresses: &str) -> Result<Vec<NodeAddr>> {
        let seeds = addresses
            .split(',')
            .map(str::trim)
            .filter(|addr| !addr.is_empty())
            .map(NodeAddr::parse)
            .collect::<Result<Vec<_>>>()?;
        if seeds.is_empty() {
            return Err(Error::invalid_argument("no valid addresses provided"));
        }
        Ok(seeds)
    }

    /// Reloads the slot map with `CLUSTER SLOTS`.
    ///
    /// Seed nodes are asked first, then every node of the current map. The
    /// new map replaces the old one in a single step; on failure the old
    /// map stays in place.
    pub async fn refresh_slots(&self) -> Result<()> {
        let mut candidates = self.seeds.clone();
        for node in self.slots.read().await.nodes() {
            if !candidates.contains(&node) {
                candidates.push(node);
            }
        }

        let mut last_err = Error::invalid_argument("no seed nodes configured");
        for node in &candidates {
            match self.fetch_slots(node).await {
                Ok(map) => {
                    let nodes = map.nodes();
                    info!(
                        source = %node,
                        ranges = map.ranges().len(),
                        nodes = nodes.len(),
                        "slot map refreshed"
                    );
                    *self.slots.write().await = map;
                    self.pool.retain(&nodes).await;
                    return Ok(());
                }
                Err(err) => {
                    warn!(node = %node, error = %err, "failed to load slot map");
                    last_err = err;
                }
            }
        }
        Err(last_err)
    }

    async fn fetch_slots(&self, node: &NodeAddr) -> Result<SlotMap> {
        let reply = self
            .pool
            .request(node, &command::cluster_slots())
            .await?
            .into_result()?;
        SlotMap::from_cluster_slots(&reply, &node.address())
    }

    /// Snapshot of the current slot map.
    pub async fn slot_map(&self) -> SlotMap {
        self.slots.read().await.clone()
    }

    /// Owner of `key` according to the current map.
    pub async fn node_for(&self, key: impl AsRef<[u8]>) -> Result<NodeAddr> {
        self.slots.read().await.node_for(key).cloned()
    }

    /// The connection pool.
    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Sends `cmd` to the owner of `key`'s slot and returns the reply.
    ///
    /// `MOVED` updates the slot's owner and resends; `ASK` resends once to
    /// the named node preceded by `ASKING`, leaving the map untouched.
    /// Both count against `max_redirects`. Error replies without routing
    /// meaning are returned as [`Frame::Error`]. A connection failure
    /// reloads the slot map before the configured [`RetryPolicy`] retries,
    /// so a failed-over slot reaches its new owner.
    pub async fn execute(&self, key: impl AsRef<[u8]>, cmd: &Cmd) -> Result<Frame> {
        let slot = key_slot(key);
        self.config
            .retry
            .call_with_retry(|| self.execute_once(slot, cmd))
            .await
    }

    async fn execute_once(&self, slot: u16, cmd: &Cmd) -> Result<Frame> {
        let mut target = self.route(slot).await?;
        let mut asking = false;
        let mut redirects = 0;

        loop {
            let reply = match self.send(&target, cmd, asking).await {
                Ok(reply) => reply,
                Err(err) => {
                    if matches!(err.kind(), ErrorKind::Connection | ErrorKind::Timeout) {
                        self.reroute(&target, &err).await;
                    }
                    return Err(err);
                }
            };

            let redirect = match &reply {
                Frame::Error(err) => classify(err),
                _ => return Ok(reply),
            };
            if !matches!(redirect, Error::Moved { .. } | Error::Ask { .. }) {
                return match redirect {
                    Error::Server { .. } => Ok(reply),
                    other => Err(other),
                };
            }

            if redirects >= self.config.max_redirects {
                warn!(slot, redirects, "too many redirects");
                return Err(redirect);
            }
            redirects += 1;

            match redirect {
                Error::Moved { slot: moved, address } => {
                    let node = redirect_target(&address, &target)?;
                    info!(slot = moved, node = %node, "slot moved");
                    self.slots.write().await.set_slot(moved, node.clone())?;
                    target = node;
                    asking = false;
                }
                Error::Ask { slot: asked, address } => {
                    let node = redirect_target(&address, &target)?;
                    debug!(slot = asked, node = %node, "ask redirect");
                    target = node;
                    asking = true;
                }
                other => return Err(other),
            }
        }
    }

    /// Sends `cmd` to `target`, preceded by `ASKING` when following an
    /// `ASK` redirect.
    async fn send(&self, target: &NodeAddr, cmd: &Cmd, asking: bool) -> Result<Frame> {
        if !asking {
            return self.pool.request(target, cmd).await;
        }
        let mut replies = self
            .pool
            .request_many(target, &[command::asking(), cmd.clone()])
            .await?;
        let reply = replies.pop().unwrap_or(Frame::Null);
        if let Some(Frame::Error(err)) = replies.pop() {
            return Err(classify(&err));
        }
        Ok(reply)
    }

    /// Drops `node`'s connection and reloads the map after it failed at
    /// the connection level. A failed-over master never answers `MOVED`,
    /// so only the cluster's current view can route its slots again.
    async fn reroute(&self, node: &NodeAddr, err: &Error) {
        warn!(node = %node, error = %err, "node unreachable, refreshing slot map");
        self.pool.evict(node).await;
        if let Err(refresh) = self.refresh_slots().await {
            warn!(error = %refresh, "slot map refresh after node failure failed");
        }
    }

    /// Owner of `slot`, reloading the map once if it has no route.
    async fn route(&self, slot: u16) -> Result<NodeAddr> {
        if let Some(node) = self.slots.read().await.lookup(slot) {
            return Ok(node.clone());
        }
        debug!(slot, "no route, refreshing slot map");
        self.refresh_slots().await?;
        self.slots
            .read()
            .await
            .lookup(slot)
            .cloned()
            .ok_or(Error::NoRoute { slot })
    }
}

/// Parses a redirect address. Servers that do not know their own host
/// send `:<port>`; the host of the node that answered is used then.
fn redirect_target(address: &str, from: &NodeAddr) -> Result<NodeAddr> {
    match address.strip_prefix(':') {
        Some(port) => {
            let port = port.parse().map_err(|_| {
                Error::invalid_argument(format!("invalid redirect port: {}", address))
            })?;
            Ok(NodeAddr::new(from.host(), port))
        }
        None => NodeAddr::parse(address),
    }
}

impl std::fmt::Debug for ClusterRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterRouter")
            .field("seeds", &self.seeds)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
