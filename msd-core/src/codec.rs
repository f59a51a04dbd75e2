//! Symmetric binary encode/decode for the two gossip event payloads
//! (spec §4.2): registration records and bare addr strings. Encoding is
//! `bincode` over a tagged `Payload` enum, which gives us a single
//! self-describing wire format for both shapes without hand-rolling a
//! length-prefixed scheme.

use serde::{Deserialize, Serialize};

use crate::model::InnerAppService;
use crate::Error;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Payload {
    /// `rs` — register service.
    Register(InnerAppService),
    /// `us` — unregister service; carries just the addr being removed.
    Unregister(String),
}

pub fn encode(payload: &Payload) -> Result<Vec<u8>, Error> {
    bincode::serialize(payload).map_err(|e| Error::Decode(e.to_string()))
}

pub fn decode(bytes: &[u8]) -> Result<Payload, Error> {
    bincode::deserialize(bytes).map_err(|e| Error::Decode(e.to_string()))
}
