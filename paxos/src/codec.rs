//! # Summary
//!
//! Length-delimited framing of bincode-encoded RPC values on a blocking
//! TCP stream, plus the single-byte `Tag` framing used at the front of
//! every RPC. Per §4.1, each logical send/receive either transfers a
//! complete frame or is treated by the caller as a dropped RPC — there is
//! no partial-frame recovery.
//!
//! Every value, however deeply nested, is framed the same way: a `u32`
//! length prefix (the size of the bincode-encoded body) followed by the
//! body itself. Fixed-width values like `ProposalID` and variable-length
//! ones like an `Entry`'s opaque `op` bytes are handled identically —
//! bincode already encodes `Vec<u8>` as a length-prefixed slab, so nested
//! variable-length fields fall out for free.

use std::io::{Read, Write};
use std::net::TcpStream;

use crate::error::{Error, Result};
use crate::message::Tag;

const MAX_FRAME_BYTES: u32 = 64 * 1024 * 1024;

/// Write the single discriminator byte that begins every RPC.
pub fn send_tag(stream: &mut TcpStream, tag: Tag) -> Result<()> {
    stream.write_all(&[tag.as_byte()]).map_err(Error::Transport)
}

/// Read the discriminator byte that begins an RPC. Returns
/// `Error::Protocol` for an unrecognized tag, matching §7's taxonomy.
pub fn receive_tag(stream: &mut TcpStream) -> Result<Tag> {
    let mut byte = [0u8; 1];
    stream.read_exact(&mut byte).map_err(Error::Transport)?;
    Tag::from_byte(byte[0]).ok_or_else(|| Error::Protocol(format!("unknown RPC tag {}", byte[0])))
}

/// Frame and send a single value: a `u32` length prefix followed by its
/// bincode encoding. Returns `true` iff the full frame was written.
pub fn send<T: serde::Serialize>(stream: &mut TcpStream, value: &T) -> Result<bool> {
    let body = bincode::serialize(value)
        .map_err(|e| Error::Protocol(format!("failed to encode frame: {}", e)))?;
    if body.len() as u64 > MAX_FRAME_BYTES as u64 {
        return Err(Error::Protocol("frame exceeds maximum size".into()));
    }
    let len = (body.len() as u32).to_be_bytes();
    stream.write_all(&len).map_err(Error::Transport)?;
    stream.write_all(&body).map_err(Error::Transport)?;
    Ok(true)
}

/// Receive a single framed value written by `send`. Returns
/// `Error::Protocol` for a frame whose declared length exceeds the
/// maximum, which closes the connection per §4.1's failure semantics.
pub fn receive<T: serde::de::DeserializeOwned>(stream: &mut TcpStream) -> Result<T> {
    let mut len_bytes = [0u8; 4];
    stream.read_exact(&mut len_bytes).map_err(Error::Transport)?;
    let len = u32::from_be_bytes(len_bytes);
    if len > MAX_FRAME_BYTES {
        return Err(Error::Protocol("frame exceeds maximum size".into()));
    }
    let mut body = vec![0u8; len as usize];
    stream.read_exact(&mut body).map_err(Error::Transport)?;
    bincode::deserialize(&body).map_err(|e| Error::Protocol(format!("failed to decode frame: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    fn loopback_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        (client, server)
    }

    #[test]
    fn round_trips_tag_and_frame() {
        let (mut client, mut server) = loopback_pair();
        send_tag(&mut client, Tag::Accept).unwrap();
        assert_eq!(receive_tag(&mut server).unwrap(), Tag::Accept);

        send(&mut client, &vec![1u8, 2, 3, 4, 5]).unwrap();
        let received: Vec<u8> = receive(&mut server).unwrap();
        assert_eq!(received, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn rejects_unknown_tag() {
        let (mut client, mut server) = loopback_pair();
        client.write_all(&[255u8]).unwrap();
        assert!(receive_tag(&mut server).is_err());
    }
}
