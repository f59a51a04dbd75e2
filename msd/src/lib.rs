//! The `msd` agent: wires the discovery repository, the cluster port, the
//! event handler, and the local registration/admin HTTP surfaces into a
//! running process, plus the thin RPC-client subcommands that talk to one.

pub mod admin;
pub mod cli;
pub mod event;
pub mod http;
pub mod rpc_client;
pub mod server;
pub mod sync;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use msd_core::cluster::ClusterPort;
use msd_core::Repository;
use tokio::sync::watch;
use tracing::{info, instrument};

use cli::AgentArgs;

/// Installs the `tracing` subscriber per `-log-level`/`-log-format`,
/// mirroring `policy-controller`'s `kubert::LogFilter`/`LogFormat` split
/// but built directly on `tracing-subscriber` (no `kubert` here).
pub fn init_logging(log_level: &str, format: cli::LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_new(log_level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        cli::LogFormat::Plain => subscriber.init(),
        cli::LogFormat::Json => subscriber.json().init(),
    }
}

/// Runs the full agent process until a shutdown signal arrives.
#[instrument(skip(args))]
pub async fn run_agent(args: AgentArgs) -> Result<()> {
    let node_name = args
        .node_name
        .clone()
        .unwrap_or_else(|| args.gossip_addr.to_string());

    let (signal, drain) = drain::channel();

    let cluster: Arc<dyn ClusterPort> = if args.standalone {
        info!("running in standalone mode, no gossip transport");
        Arc::new(msd_cluster::MockCluster::new(node_name.clone()))
    } else {
        let gossip = msd_cluster::GossipCluster::spawn(msd_cluster::GossipConfig {
            node_id: node_name.clone(),
            cluster_id: args.cluster_id.clone(),
            listen_addr: args.gossip_addr,
            seed_nodes: args.seeds.iter().map(SocketAddr::to_string).collect(),
            gossip_interval: std::time::Duration::from_millis(500),
            rpc_addr: args.bind_addr,
        })
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))?;
        Arc::new(gossip)
    };

    let repo = Repository::new(args.app_ttl, args.cleanup_interval, cluster.clone());

    if !args.sync_nodes.is_empty() {
        let http = reqwest::Client::new();
        match sync::sync_from(&repo, &cluster, &http, &args.sync_nodes).await {
            Some(node) => info!(%node, "bootstrap sync complete"),
            None => info!("bootstrap sync found no peer to sync from"),
        }
    }

    let event_task = tokio::spawn(event::run(repo.clone(), cluster.events()));

    let (ready_tx, ready_rx) = watch::channel(false);
    let admin_task = tokio::spawn(admin::serve(args.admin_addr, ready_rx, drain.clone()));

    let registration_api = http::RegistrationApi::new(
        repo.clone(),
        cluster.clone(),
        node_name.clone(),
        args.bind_addr.to_string(),
    );
    let registration_task = tokio::spawn(server::serve(args.bind_addr, registration_api, drain.clone()));

    let _ = ready_tx.send(true);
    info!(node = %node_name, bind = %args.bind_addr, admin = %args.admin_addr, "msd agent running");

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received, draining");
    let _ = ready_tx.send(false);
    signal.drain().await;
    event_task.abort();

    let _ = admin_task.await;
    let _ = registration_task.await;
    Ok(())
}
