//! Event handler (spec §4.4), grounded in
//! `command/agent/discoverd_event_handler.go`: dispatches every cluster
//! event onto the repository. `rs`/`us` user events carry a bincode
//! payload decoded back into a `Payload`; member failures and graceful
//! leaves both remove the departed node's routers, matching the original
//! (which treats `onMemberFaild`/`onMemberLeave` identically); anything
//! else is logged and dropped.

use std::sync::Arc;

use futures::StreamExt;
use msd_core::cluster::ClusterEvent;
use msd_core::codec::{self, Payload};
use msd_core::Repository;
use tracing::{info, instrument, warn};

/// Drains `events` forever, applying each one to `repo`. Intended to be
/// spawned as a background task for the lifetime of the process.
#[instrument(skip_all)]
pub async fn run(repo: Arc<Repository>, mut events: msd_core::cluster::ClusterEventStream) {
    while let Some(event) = events.next().await {
        handle(&repo, event);
    }
}

fn handle(repo: &Repository, event: ClusterEvent) {
    match event {
        ClusterEvent::MemberFailed(members) => {
            info!(?members, "member failed");
            for node in members {
                repo.remove_router_by_host(&node);
            }
        }
        ClusterEvent::MemberLeave(members) => {
            info!(?members, "member left");
            for node in members {
                repo.remove_router_by_host(&node);
            }
        }
        ClusterEvent::UserEvent { name, payload } => match name.as_str() {
            "rs" => match codec::decode(&payload) {
                Ok(Payload::Register(inner)) => {
                    repo.add_router(&inner.node_addr.node, &inner.node_addr.addr, &inner.services);
                }
                Ok(Payload::Unregister(_)) => warn!("rs event carried an unregister payload"),
                Err(error) => warn!(%error, "failed to decode rs event"),
            },
            "us" => match codec::decode(&payload) {
                Ok(Payload::Unregister(addr)) => repo.remove_router(&addr),
                Ok(Payload::Register(_)) => warn!("us event carried a register payload"),
                Err(error) => warn!(%error, "failed to decode us event"),
            },
            other => warn!(name = %other, "unhandled user event"),
        },
        ClusterEvent::Query { name, .. } => {
            info!(%name, "query event observed (answered out-of-band via HTTP, ignored here)");
        }
    }
}
