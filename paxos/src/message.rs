//! # Summary
//!
//! This module defines the wire message types for server-to-server and
//! client-to-server communication: the five RPCs of §4.4 (Vote, Prepare,
//! Accept, Success, Request) plus the log entry payload they carry.
//!
//! Every RPC is a single request/response exchange over one TCP
//! connection, discriminated on the wire by a leading `Tag` byte.

use serde_derive::{Deserialize, Serialize};

use crate::id::ProposalID;

/// Leading discriminator byte for every RPC on the wire.
#[derive(Serialize, Deserialize)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Tag {
    Vote = 0,
    Prepare = 1,
    Accept = 2,
    Success = 3,
    Request = 4,
}

impl Tag {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Tag::Vote),
            1 => Some(Tag::Prepare),
            2 => Some(Tag::Accept),
            3 => Some(Tag::Success),
            4 => Some(Tag::Request),
            _ => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

/// Opaque operation payload plus the origin metadata needed for
/// exactly-once application: `(origin_node_id, request_seq, op_bytes)`.
/// The engine never parses `op`; it is handed to the external `Applier`
/// unchanged.
#[derive(Serialize, Deserialize)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    pub origin: usize,
    pub request_seq: u64,
    pub op: Vec<u8>,
}

// --- Vote -------------------------------------------------------------

#[derive(Serialize, Deserialize)]
#[derive(Copy, Clone, Debug)]
pub struct VoteRequest {
    pub candidate_term: ProposalID,
}

#[derive(Serialize, Deserialize)]
#[derive(Copy, Clone, Debug)]
pub struct VoteResponse {
    pub term: ProposalID,
}

// --- Prepare ------------------------------------------------------------

#[derive(Serialize, Deserialize)]
#[derive(Copy, Clone, Debug)]
pub struct PrepareRequest {
    pub term: ProposalID,
    pub slot: usize,
}

#[derive(Serialize, Deserialize)]
#[derive(Clone, Debug)]
pub struct PrepareResponse {
    /// The replier's own current term, so a prospective leader can detect
    /// a higher-numbered rival the same way Vote/Accept responses do.
    pub term: ProposalID,
    /// Highest-numbered accepted proposal and value for `slot`, if any.
    pub accepted: Option<(ProposalID, Vec<u8>)>,
    /// Next index at which the replier has no accepted value, used by the
    /// leader to decide whether it can skip further Prepares.
    pub next_unaccepted: Option<usize>,
}

// --- Accept ---------------------------------------------------------

#[derive(Serialize, Deserialize)]
#[derive(Clone, Debug)]
pub struct AcceptRequest {
    pub term: ProposalID,
    pub slot: usize,
    pub value: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
#[derive(Copy, Clone, Debug)]
pub struct AcceptResponse {
    /// Highest proposal this acceptor has seen for `slot`.
    pub term: ProposalID,
}

// --- Success ------------------------------------------------------------

#[derive(Serialize, Deserialize)]
#[derive(Clone, Debug)]
pub struct SuccessRequest {
    pub term: ProposalID,
    pub slot: usize,
    pub value: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
#[derive(Copy, Clone, Debug)]
pub struct SuccessResponse {
    pub ack: bool,
}

// --- Request (client op, routed follower -> leader) ----------------------

#[derive(Serialize, Deserialize)]
#[derive(Clone, Debug)]
pub struct ClientRequest {
    pub origin: usize,
    pub request_seq: u64,
    pub op: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
#[derive(Clone, Debug)]
pub struct ClientResponse {
    pub leading: bool,
    pub result: Option<Vec<u8>>,
}
