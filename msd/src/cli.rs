//! CLI surface (spec §6), grounded in `policy-controller/src/cli.rs`'s
//! `clap::Parser` style and `command/sync.go`'s shared `-rpc-addr`/
//! `-rpc-auth` flags. `agent` runs the full process; `apps`/`routers`/
//! `sync`/`info` are thin HTTP clients against a (possibly remote)
//! running agent's admin API; everything delegating to the gossip layer
//! proper is a boundary stub, named and typed but out of scope (spec §1).

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[clap(name = "msd", about = "Micro-service discovery agent")]
pub struct Args {
    #[clap(long, default_value = "msd=info,warn", env = "MSD_LOG")]
    pub log_level: String,

    #[clap(long, default_value = "plain", env = "MSD_LOG_FORMAT")]
    pub log_format: LogFormat,

    /// RPC (local registration API) address of the running agent, used by
    /// every subcommand except `agent` itself.
    #[clap(long, default_value = "127.0.0.1:7373", env = "MSD_RPC_ADDR", global = true)]
    pub rpc_addr: SocketAddr,

    /// RPC auth token, carried for parity with the original's shared flag;
    /// unused until an authenticated transport is introduced.
    #[clap(long, default_value = "", env = "MSD_RPC_AUTH", global = true)]
    pub rpc_auth: String,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum LogFormat {
    Plain,
    Json,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Runs the agent: gossip membership, event handler, TTL sweeper, and
    /// the local registration + admin HTTP servers.
    Agent(AgentArgs),
    /// Dumps every registered micro-app as JSON (or one line of text per
    /// entry with `-format text`).
    Apps {
        #[clap(long, default_value = "json")]
        format: DumpFormat,
    },
    /// Dumps the current router table.
    Routers {
        #[clap(long, default_value = "json")]
        format: DumpFormat,
    },
    /// Tells the running agent to sync its router table from one of the
    /// named peers.
    Sync { nodes: Vec<String> },
    /// Prints this node's gossip identity and RPC address.
    Info,
    Join,
    Leave,
    ForceLeave,
    Members,
    Monitor,
    Tags,
    Reachability,
    Rtt,
    Keygen,
    Keys,
    Event,
    Query,
    Version,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum DumpFormat {
    Json,
    Text,
}

#[derive(Debug, Parser)]
pub struct AgentArgs {
    /// Address the local registration API binds to.
    #[clap(long, default_value = "127.0.0.1:7373", env = "MSD_BIND_ADDR")]
    pub bind_addr: SocketAddr,

    /// Address the admin (`/ready`, `/live`) server binds to.
    #[clap(long, default_value = "127.0.0.1:7374", env = "MSD_ADMIN_ADDR")]
    pub admin_addr: SocketAddr,

    /// Address chitchat's gossip UDP socket binds to.
    #[clap(long, default_value = "127.0.0.1:7946", env = "MSD_GOSSIP_ADDR")]
    pub gossip_addr: SocketAddr,

    /// This node's gossip identity. Defaults to the gossip bind address.
    #[clap(long, env = "MSD_NODE_NAME")]
    pub node_name: Option<String>,

    /// Logical cluster name; only nodes sharing it will gossip together.
    #[clap(long, default_value = "msd", env = "MSD_CLUSTER_ID")]
    pub cluster_id: String,

    /// Seed nodes to gossip-join at startup (`host:port`, comma-separated).
    #[clap(long, value_delimiter = ',', env = "MSD_SEEDS")]
    pub seeds: Vec<SocketAddr>,

    /// Peer node names to bootstrap-sync the router table from before
    /// serving (spec §4.6). Runs once at startup.
    #[clap(long, value_delimiter = ',', env = "MSD_SYNC_NODES")]
    pub sync_nodes: Vec<String>,

    /// TTL for a registered micro-app before it's considered expired.
    #[clap(long, default_value = "30s", value_parser = parse_duration, env = "MSD_APP_TTL")]
    pub app_ttl: Duration,

    /// How often the TTL cache sweeps for expired entries.
    #[clap(long, default_value = "10s", value_parser = parse_duration, env = "MSD_CLEANUP_INTERVAL")]
    pub cleanup_interval: Duration,

    /// Run with no real gossip transport — a single-node agent useful for
    /// local development and the integration tests.
    #[clap(long)]
    pub standalone: bool,
}

fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    let Some(digits) = s.strip_suffix('s') else {
        bail!("duration must be given in seconds, e.g. \"30s\"");
    };
    let secs: u64 = digits.parse()?;
    Ok(Duration::from_secs(secs))
}
