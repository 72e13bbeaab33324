//! # Summary
//!
//! A Multi-Paxos replication engine: leader election over randomized
//! timeouts, a replicated log driven by the classic prepare/accept/
//! success protocol, and the socket pools that carry it with bounded
//! concurrency and idle-connection reclamation.
//!
//! The crate never installs a logger itself — only binaries embedding it
//! should do that — but every module logs through the `log` facade at
//! the granularity its own doc comments describe.

#[macro_use]
extern crate log;

mod applier;
mod codec;
mod config;
mod engine;
mod error;
mod id;
mod logstore;
mod message;
mod node;
mod pool;
mod terminal;

pub use crate::applier::Applier;
pub use crate::config::Configuration;
pub use crate::error::{Error, Result};
pub use crate::id::ProposalID;
pub use crate::node::Node;
