//! Compact slot → node map.
//!
//! Ownership is stored as sorted, non-overlapping inclusive ranges, so a
//! fully assigned cluster of N shards costs N entries rather than 16384.
//! Gaps are allowed and mean "no route".

use crate::cluster::slot::{key_slot, MAX_SLOT};
use crate::core::node::NodeAddr;
use crate::core::{Error, Result};
use crate::proto::frame::Frame;

/// An inclusive range of slots owned by one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotRange {
    /// Start of the slot range (inclusive)
    pub start: u16,
    /// End of the slot range (inclusive)
    pub end: u16,
    /// Node serving this slot range
    pub node: NodeAddr,
}

impl SlotRange {
    /// Returns true if the given slot is within this range.
    pub fn contains(&self, slot: u16) -> bool {
        slot >= self.start && slot <= self.end
    }

    /// Returns the number of slots in this range.
    pub fn len(&self) -> usize {
        usize::from(self.end - self.start) + 1
    }

    /// Always false; a stored range holds at least one slot.
    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Slot ownership table for a cluster.
///
/// # Example
///
/// ```
/// use shardwire::{NodeAddr, SlotMap};
///
/// let a = NodeAddr::new("10.0.0.1", 7000);
/// let b = NodeAddr::new("10.0.0.2", 7000);
/// let mut map = SlotMap::new();
/// map.set_range(0, 4000, a.clone()).unwrap();
/// map.set_range(4001, 8000, b.clone()).unwrap();
///
/// assert_eq!(map.lookup(4000), Some(&a));
/// assert_eq!(map.lookup(4001), Some(&b));
/// assert_eq!(map.lookup(8001), None);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotMap {
    ranges: Vec<SlotRange>,
}

impl SlotMap {
    /// Creates an empty map; every slot is unrouted.
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns the inclusive range `[start, end]` to `node`.
    ///
    /// Ranges previously overlapping it are truncated or split. Adjacent
    /// ranges owned by the same node are merged.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] unless `start <= end <= 16383`.
    pub fn set_range(&mut self, start: u16, end: u16, node: NodeAddr) -> Result<()> {
        check_range(start, end)?;
        self.carve(start, end);
        let at = self.ranges.partition_point(|r| r.start < start);
        self.ranges.insert(at, SlotRange { start, end, node });
        self.merge_around(at);
        Ok(())
    }

    /// Assigns a single slot.
    pub fn set_slot(&mut self, slot: u16, node: NodeAddr) -> Result<()> {
        self.set_range(slot, slot, node)
    }

    /// Unassigns `[start, end]`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] unless `start <= end <= 16383`.
    pub fn remove_range(&mut self, start: u16, end: u16) -> Result<()> {
        check_range(start, end)?;
        self.carve(start, end);
        Ok(())
    }

    /// Owner of `slot`, if assigned.
    pub fn lookup(&self, slot: u16) -> Option<&NodeAddr> {
        let idx = self.ranges.partition_point(|r| r.start <= slot);
        if idx == 0 {
            return None;
        }
        let range = &self.ranges[idx - 1];
        range.contains(slot).then_some(&range.node)
    }

    /// Owner of the slot `key` hashes to.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoRoute`] if the slot is unassigned.
    pub fn node_for(&self, key: impl AsRef<[u8]>) -> Result<&NodeAddr> {
        let slot = key_slot(key);
        self.lookup(slot).ok_or(Error::NoRoute { slot })
    }

    /// Stored ranges in slot order.
    pub fn ranges(&self) -> &[SlotRange] {
        &self.ranges
    }

    /// Distinct owners in order of first appearance.
    pub fn nodes(&self) -> Vec<NodeAddr> {
        let mut nodes: Vec<NodeAddr> = Vec::new();
        for range in &self.ranges {
            if !nodes.contains(&range.node) {
                nodes.push(range.node.clone());
            }
        }
        nodes
    }

    /// True when every slot from 0 to 16383 is assigned.
    pub fn is_fully_covered(&self) -> bool {
        let mut next = 0u32;
        for range in &self.ranges {
            if u32::from(range.start) != next {
                return false;
            }
            next = u32::from(range.end) + 1;
        }
        next == u32::from(MAX_SLOT) + 1
    }

    /// Number of assigned slots.
    pub fn assigned_slots(&self) -> usize {
        self.ranges.iter().map(SlotRange::len).sum()
    }

    /// True when no slot is assigned.
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Builds a map from a `CLUSTER SLOTS` reply.
    ///
    /// Each entry is `[start, end, [host, port, id?, ...], replicas...]`;
    /// only the master (third element) is recorded. The node id, when
    /// present, becomes the address alias.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the reply does not have that shape.
    /// `endpoint` names the node the reply came from.
    pub fn from_cluster_slots(frame: &Frame, endpoint: &str) -> Result<Self> {
        let malformed = |what: &str| {
            Error::protocol(
                format!("malformed CLUSTER SLOTS reply: {}", what),
                format!("{:?}", frame).as_bytes(),
                endpoint,
            )
        };

        let entries = match frame {
            Frame::Array(entries) => entries,
            _ => return Err(malformed("expected an array")),
        };

        let mut map = Self::new();
        for entry in entries {
            let fields = match entry {
                Frame::Array(fields) if fields.len() >= 3 => fields,
                _ => return Err(malformed("slot entry must hold start, end and master")),
            };
            let start = slot_field(&fields[0]).ok_or_else(|| malformed("invalid start slot"))?;
            let end = slot_field(&fields[1]).ok_or_else(|| malformed("invalid end slot"))?;
            let node = parse_node(&fields[2]).ok_or_else(|| malformed("invalid master node"))?;
            map.set_range(start, end, node)
                .map_err(|_| malformed("invalid slot range"))?;
        }
        Ok(map)
    }

    /// Removes coverage of `[start, end]` from existing ranges.
    fn carve(&mut self, start: u16, end: u16) {
        let mut kept = Vec::with_capacity(self.ranges.len() + 1);
        for range in self.ranges.drain(..) {
            if range.end < start || range.start > end {
                kept.push(range);
                continue;
            }
            if range.start < start {
                kept.push(SlotRange {
                    start: range.start,
                    end: start - 1,
                    node: range.node.clone(),
                });
            }
            if range.end > end {
                kept.push(SlotRange {
                    start: end + 1,
                    end: range.end,
                    node: range.node,
                });
            }
        }
        self.ranges = kept;
    }

    fn merge_around(&mut self, at: usize) {
        if at + 1 < self.ranges.len() && self.adjacent_same_owner(at) {
            let next = self.ranges.remove(at + 1);
            self.ranges[at].end = next.end;
        }
        if at > 0 && self.adjacent_same_owner(at - 1) {
            let current = self.ranges.remove(at);
            self.ranges[at - 1].end = current.end;
        }
    }

    fn adjacent_same_owner(&self, i: usize) -> bool {
        let (left, right) = (&self.ranges[i], &self.ranges[i + 1]);
        u32::from(left.end) + 1 == u32::from(right.start) && left.node == right.node
    }
}

fn check_range(start: u16, end: u16) -> Result<()> {
    if start > end || end > MAX_SLOT {
        return Err(Error::invalid_argument(format!(
            "invalid slot range {}..={} (expected start <= end <= {})",
            start, end, MAX_SLOT
        )));
    }
    Ok(())
}

fn slot_field(frame: &Frame) -> Option<u16> {
    frame
        .as_int()
        .and_then(|n| u16::try_from(n).ok())
        .filter(|slot| *slot <= MAX_SLOT)
}

fn parse_node(frame: &Frame) -> Option<NodeAddr> {
    let fields = match frame {
        Frame::Array(fields) if fields.len() >= 2 => fields,
        _ => return None,
    };
    let host = text(&fields[0])?;
    let port = fields[1].as_int().and_then(|n| u16::try_from(n).ok())?;
    let node = NodeAddr::new(host, port);
    match fields.get(2).and_then(text) {
        Some(id) if !id.is_empty() => Some(node.with_alias(id)),
        _ => Some(node),
    }
}

fn text(frame: &Frame) -> Option<String> {
    frame
        .as_bytes()
        .map(|b| String::from_utf8_lossy(b).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::error::ErrorKind;
    use bytes::Bytes;

    fn node(name: &str) -> NodeAddr {
        NodeAddr::new(name, 7000)
    }

    fn bulk(s: &str) -> Frame {
        Frame::BulkString(Bytes::from(s.to_string()))
    }

    #[test]
    fn test_adjacent_ranges_lookup() {
        let mut map = SlotMap::new();
        map.set_range(0, 4000, node("A")).unwrap();
        map.set_range(4001, 8000, node("B")).unwrap();

        assert_eq!(map.lookup(0), Some(&node("A")));
        assert_eq!(map.lookup(4000), Some(&node("A")));
        assert_eq!(map.lookup(4001), Some(&node("B")));
        assert_eq!(map.lookup(8000), Some(&node("B")));
        assert_eq!(map.lookup(8001), None);
        assert_eq!(map.lookup(MAX_SLOT), None);
    }

    #[test]
    fn test_overlap_truncates_previous_owner() {
        let mut map = SlotMap::new();
        map.set_range(0, 100, node("A")).unwrap();
        map.set_range(50, 150, node("B")).unwrap();

        assert_eq!(map.lookup(25), Some(&node("A")));
        assert_eq!(map.lookup(49), Some(&node("A")));
        assert_eq!(map.lookup(75), Some(&node("B")));
        assert_eq!(map.lookup(150), Some(&node("B")));
        assert_eq!(map.lookup(151), None);
        assert_eq!(map.ranges().len(), 2);
    }

    #[test]
    fn test_inner_overwrite_splits_range() {
        let mut map = SlotMap::new();
        map.set_range(0, 1000, node("A")).unwrap();
        map.set_slot(500, node("B")).unwrap();

        assert_eq!(map.lookup(499), Some(&node("A")));
        assert_eq!(map.lookup(500), Some(&node("B")));
        assert_eq!(map.lookup(501), Some(&node("A")));
        assert_eq!(
            map.ranges()
                .iter()
                .map(|r| (r.start, r.end))
                .collect::<Vec<_>>(),
            vec![(0, 499), (500, 500), (501, 1000)]
        );
    }

    #[test]
    fn test_overwrite_spanning_several_ranges() {
        let mut map = SlotMap::new();
        map.set_range(0, 10, node("A")).unwrap();
        map.set_range(11, 20, node("B")).unwrap();
        map.set_range(21, 30, node("C")).unwrap();
        map.set_range(5, 25, node("D")).unwrap();

        assert_eq!(
            map.ranges()
                .iter()
                .map(|r| (r.start, r.end, r.node.host().to_string()))
                .collect::<Vec<_>>(),
            vec![
                (0, 4, "A".to_string()),
                (5, 25, "D".to_string()),
                (26, 30, "C".to_string())
            ]
        );
    }

    #[test]
    fn test_same_owner_ranges_merge() {
        let mut map = SlotMap::new();
        map.set_range(0, 99, node("A")).unwrap();
        map.set_range(200, 299, node("A")).unwrap();
        map.set_range(100, 199, node("A")).unwrap();
        assert_eq!(map.ranges().len(), 1);
        assert_eq!(map.assigned_slots(), 300);
    }

    #[test]
    fn test_invalid_ranges_rejected() {
        let mut map = SlotMap::new();
        let err = map.set_range(10, 5, node("A")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(map.set_range(0, 16384, node("A")).is_err());
        assert!(map.remove_range(3, 2).is_err());
        assert!(map.is_empty());
    }

    #[test]
    fn test_remove_range_leaves_gap() {
        let mut map = SlotMap::new();
        map.set_range(0, MAX_SLOT, node("A")).unwrap();
        assert!(map.is_fully_covered());

        map.remove_range(100, 199).unwrap();
        assert!(!map.is_fully_covered());
        assert_eq!(map.lookup(150), None);
        assert_eq!(map.lookup(99), Some(&node("A")));
        assert_eq!(map.lookup(200), Some(&node("A")));
    }

    #[test]
    fn test_full_coverage_across_nodes() {
        let mut map = SlotMap::new();
        map.set_range(0, 5460, node("A")).unwrap();
        map.set_range(5461, 10922, node("B")).unwrap();
        assert!(!map.is_fully_covered());
        map.set_range(10923, MAX_SLOT, node("C")).unwrap();
        assert!(map.is_fully_covered());
        assert_eq!(map.nodes(), vec![node("A"), node("B"), node("C")]);
    }

    #[test]
    fn test_node_for_uses_key_slot() {
        let mut map = SlotMap::new();
        map.set_range(12000, 12999, node("A")).unwrap();
        assert_eq!(map.node_for("foo").unwrap(), &node("A"));
        match map.node_for("key:000") {
            Err(Error::NoRoute { slot }) => assert_eq!(slot, 9207),
            other => panic!("expected NoRoute, got {:?}", other),
        }
    }

    #[test]
    fn test_from_cluster_slots() {
        let reply = Frame::Array(vec![
            Frame::Array(vec![
                Frame::Integer(0),
                Frame::Integer(5460),
                Frame::Array(vec![bulk("127.0.0.1"), Frame::Integer(7000), bulk("abc")]),
                Frame::Array(vec![bulk("127.0.0.1"), Frame::Integer(7003), bulk("def")]),
            ]),
            Frame::Array(vec![
                Frame::Integer(5461),
                Frame::Integer(MAX_SLOT as i64),
                Frame::Array(vec![bulk("127.0.0.1"), Frame::Integer(7001)]),
            ]),
        ]);

        let map = SlotMap::from_cluster_slots(&reply, "127.0.0.1:7000").unwrap();
        assert!(map.is_fully_covered());
        let master = map.lookup(100).unwrap();
        assert_eq!(master, &NodeAddr::new("127.0.0.1", 7000));
        assert_eq!(master.alias(), Some("abc"));
        assert_eq!(map.lookup(6000), Some(&NodeAddr::new("127.0.0.1", 7001)));
    }

    #[test]
    fn test_from_cluster_slots_rejects_garbage() {
        let err = SlotMap::from_cluster_slots(&Frame::Integer(1), "seed").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);

        let reply = Frame::Array(vec![Frame::Array(vec![
            Frame::Integer(0),
            Frame::Integer(99999),
            Frame::Array(vec![bulk("h"), Frame::Integer(1)]),
        ])]);
        assert!(SlotMap::from_cluster_slots(&reply, "seed").is_err());
    }
}
