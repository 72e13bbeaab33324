//! # Summary
//!
//! A minimal chat log built on top of `paxos::Node`: operations are a
//! two-case enum (`Get`/`Put`), encoded to the opaque `op_bytes` the
//! core never looks inside, and applied by `ChatLog`, the crate's
//! `paxos::Applier` implementation.

use serde_derive::{Deserialize, Serialize};

pub mod wire;

#[derive(Serialize, Deserialize, Clone, Debug)]
pub enum Op {
    Get,
    Put(String),
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub enum OpResult {
    Messages(Vec<String>),
    Ack,
}

pub fn encode_op(op: &Op) -> Vec<u8> {
    bincode::serialize(op).expect("chatroom op always encodes")
}

pub fn decode_op(bytes: &[u8]) -> Op {
    bincode::deserialize(bytes).expect("chatroom op always decodes")
}

pub fn encode_result(result: &OpResult) -> Vec<u8> {
    bincode::serialize(result).expect("chatroom result always encodes")
}

pub fn decode_result(bytes: &[u8]) -> OpResult {
    bincode::deserialize(bytes).expect("chatroom result always decodes")
}

/// The replicated data structure: an append-only chat log.
#[derive(Default)]
pub struct ChatLog {
    messages: Vec<String>,
}

impl paxos::Applier for ChatLog {
    fn apply(&mut self, op: &[u8]) -> Vec<u8> {
        let result = match decode_op(op) {
            Op::Get => OpResult::Messages(self.messages.clone()),
            Op::Put(message) => {
                self.messages.push(message);
                OpResult::Ack
            }
        };
        encode_result(&result)
    }
}
