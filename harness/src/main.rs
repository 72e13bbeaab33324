//! # Summary
//!
//! A scripted integration driver for the `chatroom` demo: replays a
//! JSON-encoded [`Execution`](command::Execution) of commands against a
//! cluster of spawned `chatroom-server` processes, starting and killing
//! replicas and driving `Get`/`Put` traffic against them over plain
//! blocking sockets.
//!
//! Kept deliberately thin, per the core spec's framing of the build/test
//! harness as an external, non-core collaborator: it is a smoke-test
//! tool, not a fuzzer or a property-based test runner.

use std::collections::HashMap as Map;
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use structopt::StructOpt;

mod command;
mod server;

use crate::command::{Command, Execution};
use crate::server::Server;

#[derive(StructOpt)]
#[structopt(name = "harness")]
struct Opt {
    /// Path to the `chatroom-server` binary under test
    #[structopt(short = "s", long = "server")]
    server: std::path::PathBuf,

    /// JSON file describing the command sequence to replay
    #[structopt(short = "f", long = "file")]
    file: std::path::PathBuf,

    /// Logging verbosity passed through to each spawned replica
    #[structopt(short = "v", long = "verbose", parse(from_occurrences))]
    verbose: u8,
}

fn main() {
    let opt = Opt::from_args();

    let execution: Execution = serde_json::from_reader(
        std::fs::File::open(&opt.file).expect("[INTERNAL ERROR]: could not open test file"),
    )
    .expect("[INTERNAL ERROR]: could not parse test file");

    let mut servers: Map<usize, Server> = Map::default();
    let mut client_ports: Map<usize, u16> = Map::default();
    let mut connections: Map<usize, TcpStream> = Map::default();

    for command in execution.0 {
        println!("executing command {:?}", command);
        match command {
            Command::Start { id, port, count } => {
                let port = port as u16;
                servers.insert(id, Server::spawn(&opt.server, id, port, count, opt.verbose));
                client_ports.insert(id, port);
                // Give the replica a moment to bind before clients connect.
                std::thread::sleep(Duration::from_millis(200));
            }
            Command::Connect { id } => {
                let addr: SocketAddr = format!("127.0.0.1:{}", client_ports[&id]).parse().unwrap();
                match TcpStream::connect(addr) {
                    Ok(stream) => {
                        connections.insert(id, stream);
                    }
                    Err(error) => eprintln!("could not connect to replica {}: {}", id, error),
                }
            }
            Command::Disconnect { id } => {
                connections.remove(&id);
            }
            Command::Get { id } => {
                let stream = match connections.get_mut(&id) {
                    Some(stream) => stream,
                    None => {
                        eprintln!("replica {} is not connected", id);
                        continue;
                    }
                };
                if chatroom::wire::send(stream, &chatroom::Op::Get).is_err() {
                    eprintln!("replica {} connection lost", id);
                    connections.remove(&id);
                    continue;
                }
                match chatroom::wire::receive::<chatroom::OpResult>(stream) {
                    Ok(chatroom::OpResult::Messages(messages)) => {
                        println!("replica {} returned {:?}", id, messages)
                    }
                    Ok(other) => eprintln!("unexpected Get response from {}: {:?}", id, other),
                    Err(error) => eprintln!("replica {} Get failed: {}", id, error),
                }
            }
            Command::Put { id, message } => {
                let stream = match connections.get_mut(&id) {
                    Some(stream) => stream,
                    None => {
                        eprintln!("replica {} is not connected", id);
                        continue;
                    }
                };
                let op = chatroom::Op::Put(message);
                if chatroom::wire::send(stream, &op).is_err() {
                    eprintln!("replica {} connection lost", id);
                    connections.remove(&id);
                    continue;
                }
                if let Err(error) = chatroom::wire::receive::<chatroom::OpResult>(stream) {
                    eprintln!("replica {} Put failed: {}", id, error);
                }
            }
            Command::Crash { id } => {
                servers.remove(&id);
                connections.remove(&id);
            }
            Command::Sleep { ms } => {
                std::thread::sleep(Duration::from_millis(ms));
            }
        }
    }
}
