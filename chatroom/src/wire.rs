//! # Summary
//!
//! The client-facing wire format between `chatroom-client` and
//! `chatroom-server`: the same length-prefixed bincode framing the core
//! crate uses internally, duplicated here because the core's codec is
//! not part of its public API (the chat protocol is an embedder
//! concern, not a core one).

use std::io::{Read, Write};
use std::net::TcpStream;

pub fn send<T: serde::Serialize>(stream: &mut TcpStream, value: &T) -> std::io::Result<()> {
    let body = bincode::serialize(value).expect("chatroom message always encodes");
    stream.write_all(&(body.len() as u32).to_be_bytes())?;
    stream.write_all(&body)
}

pub fn receive<T: serde::de::DeserializeOwned>(stream: &mut TcpStream) -> std::io::Result<T> {
    let mut len_bytes = [0u8; 4];
    stream.read_exact(&mut len_bytes)?;
    let len = u32::from_be_bytes(len_bytes) as usize;
    let mut body = vec![0u8; len];
    stream.read_exact(&mut body)?;
    Ok(bincode::deserialize(&body).expect("chatroom message always decodes"))
}
