use rand::seq::SliceRandom;
use rand::Rng;

use crate::core::node::NodeAddr;
use crate::core::{Error, Result};

/// Lifecycle of a discovered [`ReplicaSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicationState {
    /// No discovery has succeeded yet.
    Unresolved,
    /// The set reflects the last successful discovery.
    Resolved,
    /// A failure was observed; the set is kept but must be rediscovered
    /// before the next routed request.
    Stale,
}

/// One master and its replicas, with the node requests currently go to.
///
/// A set is built whole by discovery and replaced whole on the next one;
/// only the active node changes in between.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReplicaSet {
    master: Option<NodeAddr>,
    replicas: Vec<NodeAddr>,
    current: Option<NodeAddr>,
}

impl ReplicaSet {
    /// Creates a set whose active node is the master.
    pub fn new(master: NodeAddr, replicas: Vec<NodeAddr>) -> Self {
        Self {
            current: Some(master.clone()),
            master: Some(master),
            replicas,
        }
    }

    /// A set with no members.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The master, if known.
    pub fn master(&self) -> Option<&NodeAddr> {
        self.master.as_ref()
    }

    /// Replicas in discovery order.
    pub fn replicas(&self) -> &[NodeAddr] {
        &self.replicas
    }

    /// The active node.
    pub fn current(&self) -> Option<&NodeAddr> {
        self.current.as_ref()
    }

    /// Master followed by replicas.
    pub fn members(&self) -> impl Iterator<Item = &NodeAddr> + '_ {
        self.master.iter().chain(self.replicas.iter())
    }

    /// True if `node` is the master or a replica.
    pub fn contains(&self, node: &NodeAddr) -> bool {
        self.members().any(|member| member == node)
    }

    /// True when the set has no master.
    pub fn is_empty(&self) -> bool {
        self.master.is_none()
    }

    /// Makes `node` the active node.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `node` is not a member.
    pub fn switch_to(&mut self, node: &NodeAddr) -> Result<()> {
        let member = self
            .members()
            .find(|member| *member == node)
            .cloned()
            .ok_or_else(|| {
                Error::invalid_argument(format!("{} is not a member of the replica set", node))
            })?;
        self.current = Some(member);
        Ok(())
    }

    /// Makes the master the active node.
    pub fn switch_to_master(&mut self) -> Result<()> {
        match self.master.clone() {
            Some(master) => {
                self.current = Some(master);
                Ok(())
            }
            None => Err(Error::invalid_argument("replica set has no master")),
        }
    }

    /// Makes a randomly chosen replica the active node, or the master when
    /// there are no replicas. Returns the new active node.
    pub fn switch_to_replica<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<&NodeAddr> {
        let next = match self.replicas.choose(rng) {
            Some(replica) => replica.clone(),
            None => self
                .master
                .clone()
                .ok_or_else(|| Error::invalid_argument("replica set has no master"))?,
        };
        Ok(&*self.current.insert(next))
    }
}
