//! Thin HTTP clients used by the `apps`/`routers`/`sync`/`info` CLI
//! subcommands (spec §6, "Supplemented features" in SPEC_FULL.md):
//! each issues a request against a running agent's local registration API
//! and prints the decoded JSON, or one line per entry with `-format text`.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use msd_core::model::{MicroApp, Router};

use crate::cli::DumpFormat;

pub async fn apps(rpc_addr: SocketAddr, format: DumpFormat) -> Result<()> {
    let apps: Vec<MicroApp> = reqwest::get(format!("http://{rpc_addr}/msd/apps"))
        .await
        .context("requesting apps")?
        .json()
        .await
        .context("decoding apps response")?;
    match format {
        DumpFormat::Json => println!("{}", serde_json::to_string_pretty(&apps)?),
        DumpFormat::Text => {
            for app in apps {
                println!("{} providers={:?} consumers={:?}", app.addr, app.providers, app.consumers);
            }
        }
    }
    Ok(())
}

pub async fn routers(rpc_addr: SocketAddr, format: DumpFormat) -> Result<()> {
    let routers: Vec<Router> = reqwest::get(format!("http://{rpc_addr}/msd/routers"))
        .await
        .context("requesting routers")?
        .json()
        .await
        .context("decoding routers response")?;
    match format {
        DumpFormat::Json => println!("{}", serde_json::to_string_pretty(&routers)?),
        DumpFormat::Text => {
            for router in routers {
                let addrs: Vec<String> = router.addrs.iter().map(|na| format!("{}@{}", na.addr, na.node)).collect();
                println!("{}: {}", router.service, addrs.join(", "));
            }
        }
    }
    Ok(())
}

/// Tells a running agent at `rpc_addr` to sync its routing table from one
/// of `nodes`; the agent itself performs the gossip query/fetch, this is
/// just the RPC trigger described in `command/sync.go`.
pub async fn sync(rpc_addr: SocketAddr, nodes: &[String]) -> Result<()> {
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("http://{rpc_addr}/msd/sync"))
        .json(&nodes)
        .send()
        .await
        .context("requesting sync")?;
    if resp.status().is_success() {
        println!("sync triggered against {:?}", nodes);
    } else {
        println!("sync request failed: {}", resp.status());
    }
    Ok(())
}

pub async fn info(rpc_addr: SocketAddr) -> Result<()> {
    let body: serde_json::Value = reqwest::get(format!("http://{rpc_addr}/msd/node-info"))
        .await
        .context("requesting node info")?
        .json()
        .await
        .context("decoding node-info response")?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

/// Boundary stub for every subcommand that would delegate straight to the
/// gossip layer (join/leave/members/...) — out of scope per spec §1.
pub fn not_implemented(subcommand: &str) -> ! {
    eprintln!("`{subcommand}` is not implemented in this build (delegates to the gossip layer, out of scope)");
    std::process::exit(1);
}
