//! Weighted consistent-hash ring for client-side sharding.

use std::collections::BTreeMap;

use crate::cluster::hash::{ring_points, HashGenerator, Md5Hash};
use crate::core::node::NodeAddr;
use crate::core::{Error, Result};

/// Virtual-node multiplier per node before weighting.
pub const DEFAULT_BASE_REPLICAS: usize = 160;

/// Each MD5 digest yields this many ring positions.
const POINTS_PER_DIGEST: usize = 4;

/// Circular map of 32-bit hash positions to nodes.
///
/// Every node owns `floor(weight / total_weight * node_count *
/// base_replicas / 4)` virtual nodes, each contributing four positions.
/// Since the share depends on the totals, the whole ring is rebuilt on
/// every membership change.
///
/// # Example
///
/// ```
/// use shardwire::{ConsistentHashRing, NodeAddr};
///
/// let mut ring = ConsistentHashRing::new();
/// ring.add_node(NodeAddr::new("10.0.0.1", 6379), 1).unwrap();
/// ring.add_node(NodeAddr::new("10.0.0.2", 6379), 2).unwrap();
///
/// let node = ring.get("user:42").unwrap();
/// assert_eq!(ring.get("user:42").unwrap(), node);
/// ```
#[derive(Debug, Clone)]
pub struct ConsistentHashRing {
    nodes: Vec<(NodeAddr, u32)>,
    positions: BTreeMap<u32, NodeAddr>,
    base_replicas: usize,
}

impl ConsistentHashRing {
    /// Creates an empty ring with the default 160 base replicas.
    pub fn new() -> Self {
        Self::with_base_replicas(DEFAULT_BASE_REPLICAS)
    }

    /// Creates an empty ring with a custom base replica count.
    pub fn with_base_replicas(base_replicas: usize) -> Self {
        Self {
            nodes: Vec::new(),
            positions: BTreeMap::new(),
            base_replicas,
        }
    }

    /// Adds `node` with the given weight, or updates its weight if present.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `weight` is zero.
    pub fn add_node(&mut self, node: NodeAddr, weight: u32) -> Result<()> {
        if weight == 0 {
            return Err(Error::invalid_argument(format!(
                "ring weight for {} must be positive",
                node
            )));
        }
        match self.nodes.iter_mut().find(|(n, _)| *n == node) {
            Some(entry) => entry.1 = weight,
            None => self.nodes.push((node, weight)),
        }
        self.rebuild();
        Ok(())
    }

    /// Removes `node` and all its positions. Returns false if it was absent.
    pub fn remove_node(&mut self, node: &NodeAddr) -> bool {
        let before = self.nodes.len();
        self.nodes.retain(|(n, _)| n != node);
        if self.nodes.len() == before {
            return false;
        }
        self.rebuild();
        true
    }

    /// Node responsible for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyRing`] if no node was added.
    pub fn get(&self, key: impl AsRef<[u8]>) -> Result<&NodeAddr> {
        self.get_by_hash(Md5Hash.hash(key.as_ref()))
    }

    /// Node at the first position at or after `hash`, wrapping around to
    /// the lowest position.
    pub fn get_by_hash(&self, hash: u32) -> Result<&NodeAddr> {
        self.positions
            .range(hash..)
            .next()
            .or_else(|| self.positions.iter().next())
            .map(|(_, node)| node)
            .ok_or(Error::EmptyRing)
    }

    /// Ring positions in ascending order.
    pub fn positions(&self) -> impl Iterator<Item = (u32, &NodeAddr)> + '_ {
        self.positions.iter().map(|(pos, node)| (*pos, node))
    }

    /// Member nodes with their weights, in insertion order.
    pub fn nodes(&self) -> &[(NodeAddr, u32)] {
        &self.nodes
    }

    /// Number of member nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when the ring has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn rebuild(&mut self) {
        self.positions.clear();
        let total_weight: u64 = self.nodes.iter().map(|(_, w)| u64::from(*w)).sum();
        let node_count = self.nodes.len() as u64;

        for (node, weight) in &self.nodes {
            let replicas = (u64::from(*weight) * node_count * self.base_replicas as u64
                / (total_weight * POINTS_PER_DIGEST as u64)) as usize;
            let name = node.address();
            for index in 0..replicas {
                for point in ring_points(&name, index) {
                    // First writer keeps a colliding position.
                    self.positions.entry(point).or_insert_with(|| node.clone());
                }
            }
        }
    }
}

impl Default for ConsistentHashRing {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::error::ErrorKind;
    use std::collections::HashMap;

    fn node(port: u16) -> NodeAddr {
        NodeAddr::new("127.0.0.1", port)
    }

    #[test]
    fn test_single_node_owns_every_key() {
        let mut ring = ConsistentHashRing::new();
        ring.add_node(node(6379), 1).unwrap();
        assert_eq!(ring.positions().count(), 160);
        for key in ["a", "foo", "user:1", ""] {
            assert_eq!(ring.get(key).unwrap(), &node(6379));
        }
    }

    #[test]
    fn test_remove_last_node_empties_ring() {
        let mut ring = ConsistentHashRing::new();
        ring.add_node(node(6379), 1).unwrap();
        assert!(ring.remove_node(&node(6379)));
        assert!(matches!(ring.get("foo"), Err(Error::EmptyRing)));
        assert_eq!(ring.get("foo").unwrap_err().kind(), ErrorKind::Topology);
        assert!(!ring.remove_node(&node(6379)));
    }

    #[test]
    fn test_empty_ring_errors() {
        let ring = ConsistentHashRing::new();
        assert!(matches!(ring.get_by_hash(0), Err(Error::EmptyRing)));
    }

    #[test]
    fn test_wraps_past_highest_position() {
        let mut ring = ConsistentHashRing::new();
        ring.add_node(node(7000), 1).unwrap();
        ring.add_node(node(7001), 1).unwrap();

        let (lowest, lowest_node) = ring.positions().next().unwrap();
        let (highest, _) = ring.positions().last().unwrap();
        assert!(highest < u32::MAX, "test needs room above the last position");

        assert_eq!(ring.get_by_hash(highest + 1).unwrap(), lowest_node);
        assert_eq!(ring.get_by_hash(u32::MAX).unwrap(), lowest_node);
        assert_eq!(ring.get_by_hash(lowest).unwrap(), lowest_node);
    }

    #[test]
    fn test_lookup_picks_smallest_position_at_or_above_hash() {
        let mut ring = ConsistentHashRing::new();
        ring.add_node(node(7000), 1).unwrap();
        ring.add_node(node(7001), 1).unwrap();

        let points: Vec<(u32, NodeAddr)> =
            ring.positions().map(|(p, n)| (p, n.clone())).collect();
        for window in points.windows(2) {
            let (prev, _) = &window[0];
            let (next, owner) = &window[1];
            if next - prev > 1 {
                assert_eq!(ring.get_by_hash(prev + 1).unwrap(), owner);
            }
            assert_eq!(ring.get_by_hash(*next).unwrap(), owner);
        }
    }

    #[test]
    fn test_weights_scale_virtual_nodes() {
        let mut ring = ConsistentHashRing::new();
        ring.add_node(node(7000), 1).unwrap();
        ring.add_node(node(7001), 3).unwrap();

        let mut counts: HashMap<u16, usize> = HashMap::new();
        for (_, n) in ring.positions() {
            *counts.entry(n.port()).or_default() += 1;
        }
        // floor(1/4 * 2 * 160 / 4) = 20 and floor(3/4 * 2 * 160 / 4) = 60 digests.
        assert_eq!(counts[&7000], 80);
        assert_eq!(counts[&7001], 240);
    }

    #[test]
    fn test_keys_spread_across_nodes() {
        let mut ring = ConsistentHashRing::new();
        for port in 7000..7003 {
            ring.add_node(node(port), 1).unwrap();
        }
        let mut seen: HashMap<u16, usize> = HashMap::new();
        for i in 0..3000 {
            *seen.entry(ring.get(format!("key:{}", i)).unwrap().port()).or_default() += 1;
        }
        assert_eq!(seen.len(), 3);
        assert!(seen.values().all(|c| *c > 500), "{:?}", seen);
    }

    #[test]
    fn test_zero_weight_rejected() {
        let mut ring = ConsistentHashRing::new();
        let err = ring.add_node(node(7000), 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(ring.is_empty());
    }

    #[test]
    fn test_removal_only_moves_keys_of_removed_node() {
        let mut ring = ConsistentHashRing::new();
        for port in 7000..7004 {
            ring.add_node(node(port), 1).unwrap();
        }
        let before: Vec<NodeAddr> = (0..500)
            .map(|i| ring.get(format!("k{}", i)).unwrap().clone())
            .collect();

        ring.remove_node(&node(7003));
        // Equal weights keep the per-node share unchanged after a rebuild with
        // one node fewer, so surviving positions are identical.
        for (i, owner) in before.iter().enumerate() {
            if owner != &node(7003) {
                assert_eq!(ring.get(format!("k{}", i)).unwrap(), owner);
            }
        }
    }
}
