//! The abstract interface over the gossip bus (spec §4, design note §9):
//! broadcast a user-event, respond to a query, expose the local node name.
//! The repository is generic over this trait so that tests can drive it
//! with an in-memory mock instead of a real gossip transport; concrete
//! implementations (a real gossip-backed cluster, the mock) live in the
//! `msd-cluster` crate, which depends on this one for the shared types.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use tokio::sync::mpsc;

use crate::model::InnerAppService;

/// Errors broadcasting to, or querying, the cluster. Per spec §7 these are
/// always logged and swallowed by the repository — the local mutation that
/// triggered the broadcast is never rolled back.
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    #[error("broadcast failed: {0}")]
    Broadcast(String),
}

/// One of the five inbound cases the event handler dispatches on (spec
/// §4.4): a member failure or graceful leave, an `rs`/`us` user event
/// (distinguished by `name`), or a `qr` query. The catch-all "log and drop"
/// case needed no variant of its own — it's just the handler's wildcard
/// match arm.
#[derive(Debug, Clone)]
pub enum ClusterEvent {
    MemberFailed(Vec<String>),
    MemberLeave(Vec<String>),
    UserEvent { name: String, payload: Vec<u8> },
    Query { name: String, payload: Vec<u8> },
}

/// One node's answer to a `query_rpc_addr` fan-out.
#[derive(Debug, Clone)]
pub struct QueryResponse {
    pub node: String,
    pub rpc_addr: String,
}

pub type ClusterEventStream = Pin<Box<dyn Stream<Item = ClusterEvent> + Send>>;

#[async_trait]
pub trait ClusterPort: Send + Sync {
    /// This node's gossip-layer name.
    fn local_node(&self) -> &str;

    /// Broadcasts an `rs` (register service) event cluster-wide.
    async fn broadcast_register(&self, inner: InnerAppService) -> Result<(), ClusterError>;

    /// Broadcasts a `us` (unregister service) event cluster-wide.
    async fn broadcast_unregister(&self, addr: String) -> Result<(), ClusterError>;

    /// Queries each named node for its local registration-API address,
    /// streaming one `QueryResponse` per reply; the channel closes once
    /// every node has answered or timed out. Used by cluster bootstrap
    /// sync (spec §4.6) to find a peer to sync from.
    async fn query_rpc_addr(&self, nodes: &[String]) -> mpsc::Receiver<QueryResponse>;

    /// A live stream of cluster events this node observes: membership
    /// changes and user events from any peer (spec §4.4).
    fn events(&self) -> ClusterEventStream;
}
