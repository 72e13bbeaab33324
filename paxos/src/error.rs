//! # Summary
//!
//! Error taxonomy for the consensus engine. Locally recoverable errors
//! (a single RPC failing) are caught at the RPC boundary and turned into
//! the booleans and `Option`s the wire contracts describe — they never
//! reach here. `Error` is reserved for the embedder-facing API and for
//! plumbing that legitimately needs `?`.

/// Errors that can surface from the embedder-facing API.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Dropped connection, timed-out send/receive, or any other socket
    /// failure. Callers treat the associated RPC as not contacted.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// A truncated frame or unrecognized discriminator byte.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Fatal misconfiguration, detected at construction.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The node has been torn down; no state changes and no new work.
    #[error("shutdown in progress")]
    ShuttingDown,

    /// The contacted node is not (or is no longer) the leader. Callers
    /// should retry, optionally against `leader_hint`.
    #[error("not leader (hint: {leader_hint:?})")]
    NotLeader { leader_hint: Option<usize> },

    /// A request exhausted its retry budget without being applied.
    #[error("request retries exhausted")]
    RetriesExhausted,
}

pub type Result<T> = std::result::Result<T, Error>;
