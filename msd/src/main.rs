#![forbid(unsafe_code)]

use anyhow::Result;
use clap::Parser;
use msd_agent::cli::{Args, Command};
use msd_agent::{init_logging, rpc_client, run_agent};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level, args.log_format);

    match args.command {
        Command::Agent(agent_args) => run_agent(agent_args).await,
        Command::Apps { format } => rpc_client::apps(args.rpc_addr, format).await,
        Command::Routers { format } => rpc_client::routers(args.rpc_addr, format).await,
        Command::Sync { nodes } => rpc_client::sync(args.rpc_addr, &nodes).await,
        Command::Info => rpc_client::info(args.rpc_addr).await,
        Command::Join => rpc_client::not_implemented("join"),
        Command::Leave => rpc_client::not_implemented("leave"),
        Command::ForceLeave => rpc_client::not_implemented("force-leave"),
        Command::Members => rpc_client::not_implemented("members"),
        Command::Monitor => rpc_client::not_implemented("monitor"),
        Command::Tags => rpc_client::not_implemented("tags"),
        Command::Reachability => rpc_client::not_implemented("reachability"),
        Command::Rtt => rpc_client::not_implemented("rtt"),
        Command::Keygen => rpc_client::not_implemented("keygen"),
        Command::Keys => rpc_client::not_implemented("keys"),
        Command::Event => rpc_client::not_implemented("event"),
        Command::Query => rpc_client::not_implemented("query"),
        Command::Version => {
            println!("msd {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
