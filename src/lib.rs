//! # Shardwire
//!
//! RESP codec and routing engine for key-value server clusters: a
//! binary-safe codec for RESP2 and RESP3, slot-map and consistent-hash
//! sharding, sentinel-based master discovery with failover, and retry with
//! bounded backoff.
//!
//! ## Features
//!
//! - `cluster` - Slot-map and hash-ring routing (default)
//!
//! ## Example
//!
//! ```no_run
//! use shardwire::{Cmd, ConnectionBuilder};
//! use shardwire::core::request;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let builder = ConnectionBuilder::new().address("redis://localhost:6379");
//!     let mut conn = builder.connect().await?;
//!     let reply = request(&mut conn, &builder.decoder(), &Cmd::new("PING")).await?;
//!     println!("{:?}", reply);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

pub mod core;
pub mod proto;
pub mod replication;
pub mod retry;

#[cfg(feature = "cluster")]
pub mod cluster;

pub use crate::core::builder::{ConnectionBuilder, TcpConnector};
pub use crate::core::command::Cmd;
pub use crate::core::node::NodeAddr;
pub use crate::core::{Error, Result};
pub use crate::proto::error::ErrorKind;
pub use crate::proto::frame::{Frame, ServerError};
pub use crate::replication::{
    ReplicaSet, ReplicationState, SentinelConfig, SentinelDiscovery, SentinelReplication,
};
pub use crate::retry::{Backoff, RetryPolicy};

#[cfg(feature = "cluster")]
pub use crate::cluster::{
    key_slot, ClusterConfig, ClusterRouter, ConsistentHashRing, ShardedCluster, SlotMap,
};
