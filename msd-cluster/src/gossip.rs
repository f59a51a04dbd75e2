//! Gossip-backed `ClusterPort`, grounded in `discoverd/cluster/cluster.go`
//! (the original's Serf wrapper) but built on `chitchat`, a SWIM-style
//! gossip library, since Serf has no maintained Rust binding. Membership
//! change detection and `rs`/`us` dissemination both ride on chitchat's
//! per-node key/value state; targeted `qr`-style queries have no chitchat
//! primitive, so they're layered on top as direct HTTP fan-out to each
//! node's gossiped registration-API address.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use async_stream::stream;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chitchat::transport::UdpTransport;
use chitchat::{spawn_chitchat, Chitchat, ChitchatConfig, ChitchatHandle, ChitchatId, FailureDetectorConfig};
use parking_lot::Mutex;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tracing::{info, warn};

use msd_core::cluster::{ClusterError, ClusterEvent, ClusterEventStream, ClusterPort, QueryResponse};
use msd_core::codec::{self, Payload};
use msd_core::model::InnerAppService;

const APP_KEY_PREFIX: &str = "app:";
const RPC_ADDR_KEY: &str = "rpc_addr";
const POLL_INTERVAL: Duration = Duration::from_millis(250);

pub struct GossipConfig {
    pub node_id: String,
    pub cluster_id: String,
    pub listen_addr: SocketAddr,
    pub seed_nodes: Vec<String>,
    pub gossip_interval: Duration,
    /// This node's local registration-API address, gossiped under
    /// `rpc_addr` so peers can find it via `query_rpc_addr`.
    pub rpc_addr: SocketAddr,
}

pub struct GossipCluster {
    node_id: String,
    handle: ChitchatHandle,
    http: reqwest::Client,
}

impl GossipCluster {
    pub async fn spawn(config: GossipConfig) -> Result<Self, ClusterError> {
        let chitchat_id = ChitchatId::new(config.node_id.clone(), 0, config.listen_addr);
        let cc_config = ChitchatConfig {
            chitchat_id,
            cluster_id: config.cluster_id,
            gossip_interval: config.gossip_interval,
            listen_addr: config.listen_addr,
            seed_nodes: config.seed_nodes,
            failure_detector_config: FailureDetectorConfig::default(),
            marked_for_deletion_grace_period: Duration::from_secs(60),
            catchup_callback: None,
            extra_liveness_predicate: None,
        };

        let initial_kv = vec![(RPC_ADDR_KEY.to_string(), config.rpc_addr.to_string())];
        let handle = spawn_chitchat(cc_config, initial_kv, &UdpTransport)
            .await
            .map_err(|e| ClusterError::Broadcast(format!("failed to join gossip cluster: {e}")))?;

        info!(node = %config.node_id, addr = %config.listen_addr, "joined gossip cluster");

        Ok(Self {
            node_id: config.node_id,
            handle,
            http: reqwest::Client::new(),
        })
    }

    fn chitchat(&self) -> std::sync::Arc<AsyncMutex<Chitchat>> {
        self.handle.chitchat()
    }
}

#[async_trait]
impl ClusterPort for GossipCluster {
    fn local_node(&self) -> &str {
        &self.node_id
    }

    async fn broadcast_register(&self, inner: InnerAppService) -> Result<(), ClusterError> {
        let bytes = codec::encode(&Payload::Register(inner.clone())).map_err(|e| ClusterError::Broadcast(e.to_string()))?;
        let key = format!("{APP_KEY_PREFIX}{}", inner.node_addr.addr);
        let mut cc = self.chitchat().lock().await;
        cc.self_node_state().set(key, BASE64.encode(bytes));
        Ok(())
    }

    async fn broadcast_unregister(&self, addr: String) -> Result<(), ClusterError> {
        let key = format!("{APP_KEY_PREFIX}{addr}");
        let mut cc = self.chitchat().lock().await;
        cc.self_node_state().delete(&key);
        Ok(())
    }

    async fn query_rpc_addr(&self, nodes: &[String]) -> mpsc::Receiver<QueryResponse> {
        let (tx, rx) = mpsc::channel(nodes.len().max(1));
        let rpc_addrs: Vec<(String, Option<String>)> = {
            let cc = self.chitchat().lock().await;
            cc.node_states()
                .iter()
                .filter(|(id, _)| nodes.contains(&id.node_id))
                .map(|(id, state)| (id.node_id.clone(), state.get(RPC_ADDR_KEY).map(str::to_string)))
                .collect()
        };

        for (node, rpc_addr) in rpc_addrs {
            let Some(rpc_addr) = rpc_addr else { continue };
            let tx = tx.clone();
            let http = self.http.clone();
            tokio::spawn(async move {
                let url = format!("http://{rpc_addr}/msd/node-info");
                match http.get(&url).timeout(Duration::from_secs(5)).send().await {
                    Ok(resp) if resp.status().is_success() => {
                        let _ = tx.send(QueryResponse { node, rpc_addr }).await;
                    }
                    Ok(resp) => warn!(%node, status = %resp.status(), "node-info query returned non-success"),
                    Err(error) => warn!(%node, %error, "node-info query failed"),
                }
            });
        }

        rx
    }

    fn events(&self) -> ClusterEventStream {
        let seen: Mutex<HashMap<String, HashMap<String, String>>> = Mutex::new(HashMap::new());
        let this = self.handle.chitchat();
        let node_id = self.node_id.clone();
        Box::pin(stream! {
            let mut ticker = tokio::time::interval(POLL_INTERVAL);
            loop {
                ticker.tick().await;
                let snapshot: HashMap<String, HashMap<String, String>> = {
                    let cc = this.lock().await;
                    cc.node_states()
                        .iter()
                        .map(|(id, state)| {
                            let kvs = state
                                .key_values()
                                .filter(|(k, _)| k.starts_with(APP_KEY_PREFIX))
                                .map(|(k, v)| (k.to_string(), v.to_string()))
                                .collect();
                            (id.node_id.clone(), kvs)
                        })
                        .collect()
                };

                let mut events = Vec::new();
                {
                    let mut previous = seen.lock();
                    for (node, kvs) in &snapshot {
                        let prior_kvs = previous.get(node);
                        for (key, value) in kvs {
                            if prior_kvs.and_then(|p| p.get(key)) == Some(value) {
                                continue;
                            }
                            match BASE64.decode(value).ok().and_then(|b| codec::decode(&b).ok()) {
                                Some(Payload::Register(inner)) => {
                                    if let Ok(payload) = codec::encode(&Payload::Register(inner)) {
                                        events.push(ClusterEvent::UserEvent { name: "rs".to_string(), payload });
                                    }
                                }
                                Some(Payload::Unregister(addr)) => {
                                    if let Ok(payload) = codec::encode(&Payload::Unregister(addr)) {
                                        events.push(ClusterEvent::UserEvent { name: "us".to_string(), payload });
                                    }
                                }
                                None => warn!(%node, %key, "failed to decode gossip payload"),
                            }
                        }
                        if let Some(prior_kvs) = prior_kvs {
                            for key in prior_kvs.keys() {
                                if !kvs.contains_key(key) {
                                    let addr = key.trim_start_matches(APP_KEY_PREFIX).to_string();
                                    if let Ok(payload) = codec::encode(&Payload::Unregister(addr)) {
                                        events.push(ClusterEvent::UserEvent { name: "us".to_string(), payload });
                                    }
                                }
                            }
                        }
                    }
                    let gone: Vec<String> = previous.keys().filter(|n| !snapshot.contains_key(n.as_str())).cloned().collect();
                    if !gone.is_empty() {
                        events.push(ClusterEvent::MemberLeave(gone));
                    }
                    *previous = snapshot;
                }

                if !events.is_empty() {
                    info!(node = %node_id, count = events.len(), "gossip events observed");
                }
                for event in events {
                    yield event;
                }
            }
        })
    }
}
