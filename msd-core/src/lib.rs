//! Domain model, TTL cache, wire codec, and repository for a micro-service
//! discovery registry: apps register themselves and their service
//! dependencies, and the repository derives a per-consumer router table
//! backed by an order-independent checksum so consumers can cheaply detect
//! when their routes have changed.

pub mod checksum;
pub mod cluster;
pub mod codec;
mod error;
pub mod model;
pub mod repo;
pub mod ttl;

pub use cluster::{ClusterError, ClusterEvent, ClusterEventStream, ClusterPort, QueryResponse};
pub use error::Error;
pub use repo::Repository;
pub use ttl::{Cache, DEFAULT_EXPIRATION};
