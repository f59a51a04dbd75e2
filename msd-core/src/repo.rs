//! The Discovery Repository (spec §4.3): owns the TTL cache of registered
//! micro-apps and the cluster-wide routing table, and performs all derived
//! computations (checksums, per-consumer subtables).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use ahash::AHashMap;
use parking_lot::RwLock;
use tracing::{info, instrument, warn};

use crate::checksum::{combine_checksums, router_checksum};
use crate::cluster::ClusterPort;
use crate::model::{AppStatus, InnerAppService, MicroApp, NodeAddr, Router, RouterTable};
use crate::ttl::{Cache, DEFAULT_EXPIRATION};

/// `apps.Set`'s default TTL when a caller doesn't override it.
pub struct Repository {
    apps: Cache<MicroApp>,
    routers: RwLock<AHashMap<String, Router>>,
    cluster: Arc<dyn ClusterPort>,
}

impl Repository {
    /// Builds a repository whose `apps` cache expires entries after
    /// `app_ttl` and sweeps every `cleanup_interval`. Installs the expiry
    /// callback (spec §4.3/§9) before returning, so there is no window in
    /// which an expiry could fire with no handler attached.
    pub fn new(app_ttl: Duration, cleanup_interval: Duration, cluster: Arc<dyn ClusterPort>) -> Arc<Self> {
        let apps = Cache::new(app_ttl, cleanup_interval);
        let repo = Arc::new(Self {
            apps,
            routers: RwLock::new(AHashMap::new()),
            cluster,
        });

        let callback_repo = repo.clone();
        repo.apps.register_expired_handler(move |expired| {
            let repo = callback_repo.clone();
            tokio::spawn(async move {
                for (addr, _app) in expired {
                    info!(%addr, "expired app");
                    if let Err(error) = repo.cluster.broadcast_unregister(addr).await {
                        warn!(%error, "failed to broadcast unregister for expired app");
                    }
                }
            });
        });

        repo
    }

    /// Registers (or replaces) a micro-app locally, then asks the cluster
    /// port to broadcast its providers cluster-wide. Does not mutate
    /// `routers` directly — the local broadcast loops back through this
    /// node's own event handler.
    #[instrument(skip(self, ma), fields(addr = %ma.addr))]
    pub async fn register(&self, ma: MicroApp) {
        info!("registering app");
        self.apps.set_default(ma.addr.clone(), ma.clone());

        let inner = InnerAppService {
            node_addr: NodeAddr {
                node: self.cluster.local_node().to_string(),
                addr: ma.addr,
            },
            services: ma.providers,
        };
        if let Err(error) = self.cluster.broadcast_register(inner).await {
            warn!(%error, "failed to broadcast registration");
        }
    }

    /// Heartbeat refresh: extends the app's TTL and reports whether it was
    /// still live, plus the router checksum currently visible to it.
    #[instrument(skip(self))]
    pub fn refresh(&self, addr: &str) -> AppStatus {
        let is_live = self.apps.refresh(addr, DEFAULT_EXPIRATION);
        AppStatus {
            is_live,
            router_cs: hex::encode(self.router_checksum_for(addr)),
        }
    }

    /// The per-consumer router subtable for `addr`, or `None` if `addr` is
    /// not a live entry.
    pub fn get_router_table(&self, addr: &str) -> Option<RouterTable> {
        let app = self.apps.get(addr)?;
        let routers = self.routers.read();
        let consumer_routers: Vec<Router> = app
            .consumers
            .iter()
            .filter_map(|service| routers.get(service).cloned())
            .collect();
        let checksum = if consumer_routers.is_empty() {
            String::new()
        } else {
            hex::encode(combine_checksums(consumer_routers.iter().map(|r| &r.checksum)))
        };
        Some(RouterTable {
            routers: consumer_routers,
            checksum,
        })
    }

    fn router_checksum_for(&self, addr: &str) -> [u8; 16] {
        let Some(app) = self.apps.get(addr) else {
            return [0u8; 16];
        };
        let routers = self.routers.read();
        let checksums = app.consumers.iter().filter_map(|s| routers.get(s).map(|r| &r.checksum));
        combine_checksums(checksums)
    }

    /// Bulk-replaces the entire routing table, used by the bootstrap sync
    /// path after fetching a peer's table. Takes the writer lock for the
    /// whole operation (spec §9: the source's equivalent only takes a
    /// reader lock while mutating, which is a bug this spec fixes).
    #[instrument(skip(self, rs))]
    pub fn update_routers(&self, rs: Vec<Router>) {
        info!(count = rs.len(), "replacing router table");
        let mut routers = self.routers.write();
        routers.clear();
        for r in rs {
            routers.insert(r.service.clone(), r);
        }
    }

    /// Adds one NodeAddr to the routers for each service in `services`,
    /// first stripping `addr` from every existing router so a fast
    /// restart under a new service set doesn't leave stale entries behind.
    #[instrument(skip(self, services))]
    pub fn add_router(&self, node: &str, addr: &str, services: &[String]) {
        info!(?services, "adding router");
        let mut routers = self.routers.write();
        Self::remove_addr_locked(&mut routers, addr);

        for service in services {
            let router = routers.entry(service.clone()).or_insert_with(|| Router {
                service: service.clone(),
                addrs: Vec::new(),
                checksum: [0u8; 16],
            });
            if !router.addrs.iter().any(|na| na.addr == addr) {
                router.addrs.push(NodeAddr {
                    node: node.to_string(),
                    addr: addr.to_string(),
                });
                router.checksum = router_checksum(router.addrs.iter().map(|na| na.addr.as_str()));
            }
        }
    }

    /// Strips every occurrence of `addr` from every router; routers left
    /// with zero addrs are deleted. Idempotent (spec §9: safe to run again
    /// on a duplicate, arrive-after-manual-unregister `us` event).
    #[instrument(skip(self))]
    pub fn remove_router(&self, addr: &str) {
        info!("removing router by addr");
        let mut routers = self.routers.write();
        Self::remove_addr_locked(&mut routers, addr);
    }

    /// As `remove_router`, but matching on `NodeAddr.node` — used when a
    /// cluster member fails or leaves, since one node may host many apps.
    #[instrument(skip(self))]
    pub fn remove_router_by_host(&self, node: &str) {
        info!("removing router by host");
        let mut routers = self.routers.write();
        let services: Vec<String> = routers.keys().cloned().collect();
        for service in services {
            let remove_router = {
                let router = routers.get_mut(&service).expect("service key just read");
                router.addrs.retain(|na| na.node != node);
                if router.addrs.is_empty() {
                    true
                } else {
                    router.checksum = router_checksum(router.addrs.iter().map(|na| na.addr.as_str()));
                    false
                }
            };
            if remove_router {
                routers.remove(&service);
            }
        }
    }

    fn remove_addr_locked(routers: &mut AHashMap<String, Router>, addr: &str) {
        let services: Vec<String> = routers.keys().cloned().collect();
        for service in services {
            let remove_router = {
                let router = routers.get_mut(&service).expect("service key just read");
                router.addrs.retain(|na| na.addr != addr);
                if router.addrs.is_empty() {
                    true
                } else {
                    router.checksum = router_checksum(router.addrs.iter().map(|na| na.addr.as_str()));
                    false
                }
            };
            if remove_router {
                routers.remove(&service);
            }
        }
    }

    /// Snapshot of every currently-stored micro-app (may include
    /// expired-but-unswept entries).
    pub fn list_micro_apps(&self) -> Vec<MicroApp> {
        self.apps.items().into_iter().map(|(_, v)| v).collect()
    }

    /// Snapshot of the full router table.
    pub fn list_routers(&self) -> Vec<Router> {
        self.routers.read().values().cloned().collect()
    }
}

/// Owned, hashable copy of a Router's addrs for equality assertions in
/// tests that don't care about field order.
#[allow(dead_code)]
pub(crate) fn addrs_of(r: &Router) -> HashMap<String, String> {
    r.addrs
        .iter()
        .map(|na| (na.addr.clone(), na.node.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{ClusterError, ClusterEventStream, QueryResponse};
    use async_trait::async_trait;
    use futures::stream;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    struct Mock {
        node: String,
        registered: Mutex<Vec<InnerAppService>>,
        unregistered: Mutex<Vec<String>>,
    }

    impl Mock {
        fn new(node: &str) -> Arc<Self> {
            Arc::new(Self {
                node: node.to_string(),
                registered: Mutex::new(Vec::new()),
                unregistered: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ClusterPort for Mock {
        fn local_node(&self) -> &str {
            &self.node
        }

        async fn broadcast_register(&self, inner: InnerAppService) -> Result<(), ClusterError> {
            self.registered.lock().unwrap().push(inner);
            Ok(())
        }

        async fn broadcast_unregister(&self, addr: String) -> Result<(), ClusterError> {
            self.unregistered.lock().unwrap().push(addr);
            Ok(())
        }

        async fn query_rpc_addr(&self, _nodes: &[String]) -> mpsc::Receiver<QueryResponse> {
            let (_tx, rx) = mpsc::channel(1);
            rx
        }

        fn events(&self) -> ClusterEventStream {
            Box::pin(stream::empty())
        }
    }

    fn app(addr: &str, providers: &[&str], consumers: &[&str]) -> MicroApp {
        MicroApp {
            addr: addr.to_string(),
            providers: providers.iter().map(|s| s.to_string()).collect(),
            consumers: consumers.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn register_broadcasts_and_stores() {
        let cluster = Mock::new("n1");
        let repo = Repository::new(Duration::from_secs(60), Duration::ZERO, cluster.clone());
        repo.register(app("http://a:1/rs", &["p.x"], &[])).await;
        assert_eq!(repo.list_micro_apps().len(), 1);
        assert_eq!(cluster.registered.lock().unwrap().len(), 1);
    }

    #[test]
    fn add_router_then_get_router_table() {
        let cluster = Mock::new("n1");
        let repo = Repository::new(Duration::from_secs(60), Duration::ZERO, cluster);
        repo.apps.set_default("http://a:1/rs".to_string(), app("http://a:1/rs", &[], &["p.x", "p.y"]));
        repo.add_router("n1", "http://a:1/rs", &["p.x".to_string(), "p.y".to_string()]);

        let table = repo.get_router_table("http://a:1/rs").unwrap();
        assert_eq!(table.routers.len(), 2);
        assert!(!table.checksum.is_empty());
    }

    #[test]
    fn get_router_table_unknown_addr_is_none() {
        let cluster = Mock::new("n1");
        let repo = Repository::new(Duration::from_secs(60), Duration::ZERO, cluster);
        assert!(repo.get_router_table("http://nope").is_none());
    }

    #[test]
    fn remove_router_strips_addr_from_all_services() {
        let cluster = Mock::new("n1");
        let repo = Repository::new(Duration::from_secs(60), Duration::ZERO, cluster);
        repo.add_router("n1", "http://a:1/rs", &["p.x".to_string(), "p.y".to_string()]);
        repo.remove_router("http://a:1/rs");
        assert!(repo.list_routers().is_empty());
    }

    #[test]
    fn remove_router_by_host_is_noop_for_unknown_host() {
        let cluster = Mock::new("n1");
        let repo = Repository::new(Duration::from_secs(60), Duration::ZERO, cluster);
        repo.add_router("n1", "http://a:1/rs", &["p.x".to_string()]);
        repo.remove_router_by_host("other-host");
        assert_eq!(repo.list_routers().len(), 1);
    }

    #[test]
    fn add_router_is_idempotent() {
        let cluster = Mock::new("n1");
        let repo = Repository::new(Duration::from_secs(60), Duration::ZERO, cluster);
        let services = vec!["p.x".to_string()];
        repo.add_router("n1", "http://a:1/rs", &services);
        repo.add_router("n1", "http://a:1/rs", &services);
        let routers = repo.list_routers();
        assert_eq!(routers.len(), 1);
        assert_eq!(routers[0].addrs.len(), 1);
    }

    #[test]
    fn fast_restart_moves_addr_between_services() {
        let cluster = Mock::new("n1");
        let repo = Repository::new(Duration::from_secs(60), Duration::ZERO, cluster);
        repo.add_router("n1", "A", &["p.x".to_string()]);
        repo.add_router("n1", "A", &["p.y".to_string()]);

        let routers: HashMap<String, Router> =
            repo.list_routers().into_iter().map(|r| (r.service.clone(), r)).collect();
        assert!(!routers.contains_key("p.x"));
        let py = routers.get("p.y").unwrap();
        assert_eq!(py.addrs.len(), 1);
        assert_eq!(py.addrs[0].addr, "A");
    }

    #[test]
    fn checksum_order_independent_across_add_order() {
        let cluster1 = Mock::new("n1");
        let repo1 = Repository::new(Duration::from_secs(60), Duration::ZERO, cluster1);
        repo1.add_router("n1", "a1", &["svc".to_string()]);
        repo1.add_router("n2", "a2", &["svc".to_string()]);
        repo1.add_router("n3", "a3", &["svc".to_string()]);

        let cluster2 = Mock::new("n1");
        let repo2 = Repository::new(Duration::from_secs(60), Duration::ZERO, cluster2);
        repo2.add_router("n3", "a3", &["svc".to_string()]);
        repo2.add_router("n1", "a1", &["svc".to_string()]);
        repo2.add_router("n2", "a2", &["svc".to_string()]);

        let cs1 = repo1.list_routers()[0].checksum;
        let cs2 = repo2.list_routers()[0].checksum;
        assert_eq!(cs1, cs2);
    }

    #[test]
    fn update_routers_bulk_replaces() {
        let cluster = Mock::new("n1");
        let repo = Repository::new(Duration::from_secs(60), Duration::ZERO, cluster);
        repo.add_router("n1", "a1", &["stale".to_string()]);
        repo.update_routers(vec![Router {
            service: "fresh".to_string(),
            addrs: vec![NodeAddr {
                node: "n2".into(),
                addr: "a2".into(),
            }],
            checksum: router_checksum(["a2"]),
        }]);
        let routers = repo.list_routers();
        assert_eq!(routers.len(), 1);
        assert_eq!(routers[0].service, "fresh");
    }

    #[tokio::test]
    async fn expiry_broadcasts_unregister() {
        let cluster = Mock::new("n1");
        let repo = Repository::new(Duration::from_millis(10), Duration::from_millis(5), cluster.clone());
        repo.register(app("http://a:1/rs", &["p.x"], &[])).await;

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(repo.apps.get("http://a:1/rs").is_none());
        assert_eq!(cluster.unregistered.lock().unwrap().as_slice(), ["http://a:1/rs".to_string()]);
    }
}
