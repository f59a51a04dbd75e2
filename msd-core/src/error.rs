use thiserror::Error;

/// Errors produced by `msd-core`. Per spec §7, only `Add`'s key-conflict
/// case and malformed-payload decoding are real failures here; everything
/// else (lock contention, broadcast errors) is handled by the caller
/// logging and moving on rather than by propagating an `Error`.
#[derive(Debug, Error)]
pub enum Error {
    #[error("key already exists: {0}")]
    KeyConflict(String),

    #[error("failed to decode payload: {0}")]
    Decode(String),
}
