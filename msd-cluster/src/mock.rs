//! An in-memory `ClusterPort` that never actually talks to anything,
//! mirroring `discoverd/cluster/cluster_mock.go`: useful for a single-node
//! deployment, or for tests that want the repository's logic without a real
//! gossip transport. Tests can inject synthetic events via `push_event`
//! to exercise the event handler without chitchat.

use async_trait::async_trait;
use futures::stream;
use msd_core::cluster::{ClusterError, ClusterEvent, ClusterEventStream, ClusterPort, QueryResponse};
use msd_core::model::InnerAppService;
use parking_lot::Mutex;
use tokio::sync::mpsc;

pub struct MockCluster {
    node: String,
    injected: Mutex<Vec<ClusterEvent>>,
    query_responses: Mutex<Vec<QueryResponse>>,
}

impl MockCluster {
    pub fn new(node: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            injected: Mutex::new(Vec::new()),
            query_responses: Mutex::new(Vec::new()),
        }
    }

    /// Queues an event to be yielded the next time `events()` is drained.
    pub fn push_event(&self, event: ClusterEvent) {
        self.injected.lock().push(event);
    }

    /// Queues a response to be delivered, in order, over the channel
    /// returned by the next `query_rpc_addr` call.
    pub fn push_query_response(&self, response: QueryResponse) {
        self.query_responses.lock().push(response);
    }
}

#[async_trait]
impl ClusterPort for MockCluster {
    fn local_node(&self) -> &str {
        &self.node
    }

    async fn broadcast_register(&self, _inner: InnerAppService) -> Result<(), ClusterError> {
        Ok(())
    }

    async fn broadcast_unregister(&self, _addr: String) -> Result<(), ClusterError> {
        Ok(())
    }

    async fn query_rpc_addr(&self, _nodes: &[String]) -> mpsc::Receiver<QueryResponse> {
        let queued = std::mem::take(&mut *self.query_responses.lock());
        let (tx, rx) = mpsc::channel(queued.len().max(1));
        for response in queued {
            let _ = tx.send(response).await;
        }
        rx
    }

    fn events(&self) -> ClusterEventStream {
        let drained = std::mem::take(&mut *self.injected.lock());
        Box::pin(stream::iter(drained))
    }
}
