//! Cluster bootstrap sync (spec §4.6), grounded in `command/sync.go`:
//! query a set of named peers for their registration-API address, try
//! each responder in arrival order until one's router table can be
//! fetched, and bulk-replace ours with it. Used once at startup when
//! `-join`/seed nodes are configured, so a restarting agent doesn't serve
//! an empty routing table while gossip reconverges.

use std::sync::Arc;
use std::time::Duration;

use msd_core::cluster::ClusterPort;
use msd_core::model::Router;
use msd_core::Repository;
use tracing::{info, instrument, warn};

#[instrument(skip(repo, cluster, http))]
pub async fn sync_from(
    repo: &Arc<Repository>,
    cluster: &Arc<dyn ClusterPort>,
    http: &reqwest::Client,
    nodes: &[String],
) -> Option<String> {
    let mut responses = cluster.query_rpc_addr(nodes).await;

    loop {
        let response = tokio::time::timeout(Duration::from_secs(10), responses.recv())
            .await
            .ok()
            .flatten()?;

        let url = format!("http://{}/msd/routers", response.rpc_addr);
        let routers: Vec<Router> = match http.get(&url).send().await {
            Ok(resp) => match resp.json().await {
                Ok(routers) => routers,
                Err(error) => {
                    warn!(%error, node = %response.node, "failed to decode router table from peer, trying next responder");
                    continue;
                }
            },
            Err(error) => {
                warn!(%error, node = %response.node, "failed to fetch router table from peer, trying next responder");
                continue;
            }
        };

        let count = routers.len();
        repo.update_routers(routers);
        info!(node = %response.node, %count, "synced router table from peer");
        return Some(response.rpc_addr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use msd_cluster::MockCluster;
    use msd_core::cluster::QueryResponse;

    async fn unreachable_addr() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        addr.to_string()
    }

    async fn spawn_peer(routers: Vec<Router>) -> (String, drain::Signal) {
        let cluster = Arc::new(MockCluster::new("peer"));
        let repo = Repository::new(Duration::from_secs(60), Duration::ZERO, cluster.clone());
        repo.update_routers(routers);
        let rpc_addr = "127.0.0.1:0".to_string();
        let api = crate::http::RegistrationApi::new(repo, cluster, "peer".to_string(), rpc_addr);

        let (signal, drain) = drain::channel();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        tokio::spawn(crate::server::serve(addr, api, drain));
        tokio::time::sleep(Duration::from_millis(50)).await;
        (addr.to_string(), signal)
    }

    #[tokio::test]
    async fn retries_next_responder_after_a_failed_fetch() {
        let dead_addr = unreachable_addr().await;
        let (live_addr, signal) = spawn_peer(vec![]).await;

        let cluster = Arc::new(MockCluster::new("n1"));
        cluster.push_query_response(QueryResponse {
            node: "dead".to_string(),
            rpc_addr: dead_addr,
        });
        cluster.push_query_response(QueryResponse {
            node: "live".to_string(),
            rpc_addr: live_addr.clone(),
        });
        let cluster: Arc<dyn ClusterPort> = cluster;

        let repo = Repository::new(Duration::from_secs(60), Duration::ZERO, cluster.clone());
        let http = reqwest::Client::new();

        let synced_from = sync_from(&repo, &cluster, &http, &["dead".to_string(), "live".to_string()]).await;
        assert_eq!(synced_from, Some(live_addr));

        signal.drain().await;
    }
}
