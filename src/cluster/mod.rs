//! # Cluster
//!
//! Key placement across several servers, either server-side (slot-sharded
//! cluster) or client-side (consistent-hash ring).
//!
//! ## Modules
//!
//! - [`slot`] - CRC16 key slots and hash tags
//! - [`hash`] - Pluggable key hashing
//! - [`slotmap`] - Slot range → node table built from `CLUSTER SLOTS`
//! - [`ring`] - Weighted consistent-hash ring
//! - [`router`] - Slot router following `MOVED`/`ASK` redirects
//! - [`sharded`] - Ring-backed client over standalone servers
//!
//! ## Example
//!
//! ```no_run
//! # async fn example() -> shardwire::Result<()> {
//! use shardwire::{ClusterConfig, ClusterRouter, Cmd, TcpConnector};
//! use std::sync::Arc;
//!
//! let seeds = ClusterRouter::parse_seeds("127.0.0.1:7000,127.0.0.1:7001")?;
//! let router =
//!     ClusterRouter::connect(seeds, Arc::new(TcpConnector::new()), ClusterConfig::default())
//!         .await?;
//!
//! // Keys sharing a hash tag land on the same node.
//! router.execute("{user:1}:name", &Cmd::new("SET").arg("{user:1}:name").arg("ada")).await?;
//! # Ok(())
//! # }
//! ```

mod errors;
pub mod hash;
pub mod ring;
pub mod router;
pub mod sharded;
pub mod slot;
pub mod slotmap;

pub use hash::{Crc16Hash, HashGenerator, Md5Hash};
pub use ring::ConsistentHashRing;
pub use router::{ClusterConfig, ClusterRouter};
pub use sharded::ShardedCluster;
pub use slot::key_slot;
pub use slotmap::{SlotMap, SlotRange};
