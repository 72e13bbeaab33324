//! # Summary
//!
//! Spawns and owns a `chatroom-server` child process for the test
//! harness. Peer addresses are derived formulaically from a fixed base
//! port rather than passed in explicitly, mirroring the teacher's
//! `INTERNAL_PORT` convention for inter-replica traffic.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::{Child, Command};

/// Base TCP port for inter-node Paxos traffic; replica `i`'s Paxos
/// listen address is `127.0.0.1:{PAXOS_PORT_BASE + i}`.
const PAXOS_PORT_BASE: u16 = 20000;

pub fn peer_addresses(count: usize) -> Vec<SocketAddr> {
    (0..count)
        .map(|id| {
            format!("127.0.0.1:{}", PAXOS_PORT_BASE + id as u16)
                .parse()
                .unwrap()
        })
        .collect()
}

pub struct Server(Child);

impl Server {
    /// Spawns `chatroom-server -i <id> -p <peers> -c <client_port>` for
    /// a cluster of `count` replicas.
    pub fn spawn(path: &PathBuf, id: usize, client_port: u16, count: usize, verbose: u8) -> Self {
        let peers = peer_addresses(count)
            .iter()
            .map(SocketAddr::to_string)
            .collect::<Vec<_>>()
            .join(",");

        let mut command = Command::new(path);
        if verbose > 0 {
            command.arg(format!("-{}", "v".repeat(verbose as usize)));
        }
        command
            .args(&["-i", &id.to_string()])
            .args(&["-p", &peers])
            .args(&["-c", &client_port.to_string()]);

        Server(
            command
                .spawn()
                .expect("[INTERNAL ERROR]: could not spawn server"),
        )
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        let _ = self.0.kill();
    }
}
