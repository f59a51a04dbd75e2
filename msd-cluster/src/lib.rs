//! Concrete `ClusterPort` implementations: a `chitchat`-backed gossip
//! cluster for real deployments, and an in-memory mock for single-node runs
//! and tests.

pub mod gossip;
pub mod mock;

pub use gossip::{GossipCluster, GossipConfig};
pub use mock::MockCluster;
pub use msd_core::cluster::ClusterEvent;
