//! Wire/storage types shared by the repository, the HTTP surface, and the
//! gossip codec. Layout follows the original `discoverd/api/service.go`.

use serde::{Deserialize, Serialize};

/// A registered micro-app: its own address plus the services it provides
/// and consumes. Stored in the TTL cache, keyed by `addr`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MicroApp {
    pub addr: String,
    #[serde(default)]
    pub providers: Vec<String>,
    #[serde(default)]
    pub consumers: Vec<String>,
}

/// A (gossip-node-name, micro-app-address) pair.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeAddr {
    pub node: String,
    pub addr: String,
}

/// All cluster-wide providers of one service name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Router {
    pub service: String,
    pub addrs: Vec<NodeAddr>,
    #[serde(with = "checksum_hex")]
    pub checksum: [u8; 16],
}

/// The subtable of routers visible to one consumer, computed on demand.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterTable {
    pub routers: Vec<Router>,
    pub checksum: String,
}

/// The result of a heartbeat refresh.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppStatus {
    #[serde(rename = "isLive")]
    pub is_live: bool,
    #[serde(rename = "routerCS")]
    pub router_cs: String,
}

/// The payload of an `rs` (register service) gossip event: the registering
/// node/addr pair plus the service names it provides.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InnerAppService {
    #[serde(rename = "nodeaddr")]
    pub node_addr: NodeAddr,
    pub services: Vec<String>,
}

/// A JSON error body for the HTTP surface, matching `api.NewError`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { error: msg.into() }
    }
}

mod checksum_hex {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 16], s: S) -> Result<S::Ok, S::Error> {
        hex::encode(bytes).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 16], D::Error> {
        let s = String::deserialize(d)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("checksum must be 16 bytes"))
    }
}
