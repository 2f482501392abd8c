//! # Replication
//!
//! Master/replica topologies resolved through sentinels.
//!
//! ## Modules
//!
//! - [`replica_set`] - Master, replicas and the active node
//! - [`sentinel`] - Discovery across a queue of candidate sentinels
//! - [`failover`] - Request routing with rediscovery after failures

pub mod failover;
pub mod replica_set;
pub mod sentinel;

pub use failover::SentinelReplication;
pub use replica_set::{ReplicaSet, ReplicationState};
pub use sentinel::{SentinelConfig, SentinelDiscovery};
