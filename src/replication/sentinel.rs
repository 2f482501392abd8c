//! Master and replica discovery through sentinels.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::command::{self, Cmd};
use crate::core::node::NodeAddr;
use crate::core::request;
use crate::core::transport::{Connector, Transport};
use crate::core::{Error, Result};
use crate::proto::codec::Decoder;
use crate::proto::error::ErrorKind;
use crate::proto::frame::Frame;
use crate::replication::replica_set::ReplicaSet;

/// Flags marking a replica as unusable.
const DOWN_FLAGS: &[&str] = &["s_down", "o_down", "disconnected"];

/// Sentinel discovery settings.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct SentinelConfig {
    /// Candidate sentinels, tried in order.
    pub sentinels: Vec<NodeAddr>,
    /// Name of the monitored master.
    pub service: String,
    /// Learn further sentinels from `SENTINEL sentinels` after each discovery.
    pub update_sentinels: bool,
    /// Time allowed for one sentinel to answer, connect included.
    pub timeout: Option<Duration>,
}

impl SentinelConfig {
    /// Creates a configuration for `service`.
    pub fn new(service: impl Into<String>, sentinels: Vec<NodeAddr>) -> Self {
        Self {
            sentinels,
            service: service.into(),
            update_sentinels: false,
            timeout: Some(Duration::from_millis(100)),
        }
    }

    /// Enables learning new sentinels.
    pub fn update_sentinels(mut self, enabled: bool) -> Self {
        self.update_sentinels = enabled;
        self
    }

    /// Sets the per-sentinel timeout. `None` waits indefinitely.
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Resolves the current master and healthy replicas of a service.
///
/// Candidates are consumed front to back. The sentinel that answered last
/// is kept, with its connection, for the next discovery; a sentinel that
/// fails at the connection level is dropped for good and the next one is
/// tried. Once every candidate has failed discovery returns
/// [`Error::SentinelsExhausted`].
pub struct SentinelDiscovery {
    probe: Probe,
    timeout: Option<Duration>,
    candidates: VecDeque<NodeAddr>,
    sentinel: Option<Sentinel>,
}

/// What is asked of each sentinel.
struct Probe {
    connector: Arc<dyn Connector>,
    decoder: Decoder,
    service: String,
    update_sentinels: bool,
}

struct Sentinel {
    node: NodeAddr,
    transport: Option<Box<dyn Transport>>,
}

impl SentinelDiscovery {
    /// Creates a discovery over the configured sentinels.
    pub fn new(config: SentinelConfig, connector: Arc<dyn Connector>) -> Self {
        let decoder = connector.decoder();
        Self {
            probe: Probe {
                connector,
                decoder,
                service: config.service,
                update_sentinels: config.update_sentinels,
            },
            timeout: config.timeout,
            candidates: config.sentinels.into(),
            sentinel: None,
        }
    }

    /// The monitored service.
    pub fn service(&self) -> &str {
        &self.probe.service
    }

    /// Sentinels not yet dropped: the active one first, then the queue.
    pub fn sentinels(&self) -> Vec<NodeAddr> {
        self.sentinel
            .iter()
            .map(|s| s.node.clone())
            .chain(self.candidates.iter().cloned())
            .collect()
    }

    /// Adds a sentinel at the back of the queue unless already known.
    pub fn add_sentinel(&mut self, node: NodeAddr) -> bool {
        if self.sentinels().contains(&node) {
            return false;
        }
        self.candidates.push_back(node);
        true
    }

    /// Runs one discovery.
    pub async fn discover(&mut self) -> Result<ReplicaSet> {
        self.discover_until(&CancellationToken::new()).await
    }

    /// Runs one discovery, giving up with [`Error::Cancelled`] between
    /// sentinel attempts once `cancel` fires.
    pub async fn discover_until(&mut self, cancel: &CancellationToken) -> Result<ReplicaSet> {
        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let mut sentinel = match self.sentinel.take().or_else(|| {
                self.candidates.pop_front().map(|node| Sentinel {
                    node,
                    transport: None,
                })
            }) {
                Some(sentinel) => sentinel,
                None => {
                    return Err(Error::SentinelsExhausted {
                        service: self.probe.service.clone(),
                    })
                }
            };

            let node = sentinel.node.clone();
            let query = self.probe.query(&mut sentinel);
            let result = match self.timeout {
                Some(limit) => match tokio::time::timeout(limit, query).await {
                    Ok(result) => result,
                    Err(_) => Err(Error::Timeout {
                        endpoint: node.address(),
                    }),
                },
                None => query.await,
            };

            match result {
                Ok((set, peers)) => {
                    info!(
                        sentinel = %node,
                        service = %self.probe.service,
                        master = ?set.master().map(NodeAddr::address),
                        replicas = set.replicas().len(),
                        "replica set discovered"
                    );
                    self.sentinel = Some(sentinel);
                    for peer in peers {
                        if self.add_sentinel(peer.clone()) {
                            debug!(sentinel = %peer, "learned sentinel");
                        }
                    }
                    return Ok(set);
                }
                Err(err) if is_sentinel_failure(&err) => {
                    warn!(
                        sentinel = %node,
                        error = %err,
                        remaining = self.candidates.len(),
                        "sentinel unreachable, dropping it"
                    );
                }
                Err(err) => {
                    // The sentinel answered; keep it.
                    self.sentinel = Some(sentinel);
                    return Err(err);
                }
            }
        }
    }
}

impl Probe {
    /// Asks `sentinel` for the master, the replicas and, when enabled, its
    /// peers.
    async fn query(&self, sentinel: &mut Sentinel) -> Result<(ReplicaSet, Vec<NodeAddr>)> {
        let transport = match sentinel.transport.take() {
            Some(transport) if transport.is_connected() => transport,
            _ => self.connector.connect(&sentinel.node).await?,
        };
        let transport = sentinel.transport.insert(transport);
        let endpoint = transport.endpoint();

        let reply = self
            .send(transport, command::sentinel_master_addr(self.service.clone()))
            .await?;
        if reply.is_null() {
            return Err(Error::MasterNotFound {
                service: self.service.clone(),
            });
        }
        let master = parse_master_addr(reply, &endpoint)?.with_alias("master");

        let reply = self
            .send(transport, command::sentinel_replicas(self.service.clone()))
            .await?;
        let replicas = parse_replicas(reply, &endpoint)?;

        let mut peers = Vec::new();
        if self.update_sentinels {
            let reply = self
                .send(transport, command::sentinel_sentinels(self.service.clone()))
                .await?;
            peers = parse_instances(reply, &endpoint)?
                .into_iter()
                .map(|fields| fields.address(&endpoint))
                .collect::<Result<_>>()?;
        }

        Ok((ReplicaSet::new(master, replicas), peers))
    }

    async fn send(&self, transport: &mut Box<dyn Transport>, cmd: Cmd) -> Result<Frame> {
        request(&mut **transport, &self.decoder, &cmd)
            .await?
            .into_result()
    }
}

impl std::fmt::Debug for SentinelDiscovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SentinelDiscovery")
            .field("service", &self.probe.service)
            .field("sentinels", &self.sentinels())
            .field("update_sentinels", &self.probe.update_sentinels)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Failures that disqualify the sentinel rather than the request.
fn is_sentinel_failure(err: &Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::Connection | ErrorKind::Timeout | ErrorKind::Protocol
    )
}

fn malformed(what: &str, frame: &Frame, endpoint: &str) -> Error {
    Error::protocol(
        format!("malformed {} reply", what),
        format!("{:?}", frame).as_bytes(),
        endpoint,
    )
}

fn text(frame: &Frame) -> Option<String> {
    match frame {
        Frame::Integer(i) => Some(i.to_string()),
        other => other
            .as_bytes()
            .map(|b| String::from_utf8_lossy(b).into_owned()),
    }
}

/// `[host, port]` from `get-master-addr-by-name`.
fn parse_master_addr(reply: Frame, endpoint: &str) -> Result<NodeAddr> {
    let parsed = match &reply {
        Frame::Array(items) if items.len() == 2 => text(&items[0])
            .zip(text(&items[1]))
            .and_then(|(host, port)| Some(NodeAddr::new(host, port.parse().ok()?))),
        _ => None,
    };
    parsed.ok_or_else(|| malformed("master address", &reply, endpoint))
}

/// Healthy replicas from `SENTINEL slaves`.
fn parse_replicas(reply: Frame, endpoint: &str) -> Result<Vec<NodeAddr>> {
    let mut replicas = Vec::new();
    for fields in parse_instances(reply, endpoint)? {
        if fields.is_down() {
            debug!(replica = ?fields.get("name"), "skipping replica flagged down");
            continue;
        }
        replicas.push(fields.address(endpoint)?.with_alias("replica"));
    }
    Ok(replicas)
}

/// Instance descriptions: RESP2 flat `[k, v, k, v, ...]` arrays or RESP3 maps.
fn parse_instances(reply: Frame, endpoint: &str) -> Result<Vec<Fields>> {
    let entries = match reply {
        Frame::Array(entries) | Frame::Set(entries) => entries,
        other => return Err(malformed("instance list", &other, endpoint)),
    };
    entries
        .into_iter()
        .map(|entry| Fields::from_frame(entry, endpoint))
        .collect()
}

struct Fields(Vec<(String, String)>);

impl Fields {
    fn from_frame(entry: Frame, endpoint: &str) -> Result<Self> {
        let pairs = match &entry {
            Frame::Array(items) if items.len() % 2 == 0 => items
                .chunks_exact(2)
                .map(|pair| text(&pair[0]).zip(text(&pair[1])))
                .collect::<Option<Vec<_>>>(),
            Frame::Map(pairs) => pairs
                .iter()
                .map(|(k, v)| text(k).zip(text(v)))
                .collect::<Option<Vec<_>>>(),
            _ => None,
        };
        pairs
            .map(Fields)
            .ok_or_else(|| malformed("instance", &entry, endpoint))
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn is_down(&self) -> bool {
        self.get("flags").map_or(false, |flags| {
            flags
                .split(',')
                .any(|flag| DOWN_FLAGS.contains(&flag) || flag.ends_with("_down"))
        })
    }

    fn address(&self, endpoint: &str) -> Result<NodeAddr> {
        let host = self.get("ip");
        let port = self.get("port").and_then(|p| p.parse::<u16>().ok());
        match (host, port) {
            (Some(host), Some(port)) => Ok(NodeAddr::new(host, port)),
            _ => Err(Error::protocol(
                "instance without ip/port",
                format!("{:?}", self.0).as_bytes(),
                endpoint,
            )),
        }
    }
}
