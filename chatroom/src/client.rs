//! # Summary
//!
//! An interactive REPL client for the chat log demo: connects to one
//! `chatroom-server`'s client-facing port and issues `Op::Get`/`Op::Put`
//! requests over `chatroom::wire`, printing whatever comes back.

use std::io::{self, BufRead, Write};
use std::net::{SocketAddr, TcpStream};

use structopt::StructOpt;

enum Command {
    Connect { port: u16 },
    Disconnect,
    Get,
    Put { message: String },
    Help,
}

fn usage() {
    println!(
        "{}{}{}{}{}{}{}",
        "--------------------------------------------------------------\n",
        "Possible commands:\n",
        "connect <PORT> | c <PORT>  -- connect to server at <PORT>\n",
        "disconnect     | d         -- disconnect from current server\n",
        "get            | g         -- get chat log from current server\n",
        "put <MSG>      | p <MSG>   -- write <MSG> to current server\n",
        "--------------------------------------------------------------",
    );
}

impl std::str::FromStr for Command {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut iter = s.trim().splitn(2, ' ');
        match iter.next() {
            Some("help") | Some("h") => Ok(Command::Help),
            Some("get") | Some("g") => Ok(Command::Get),
            Some("disconnect") | Some("d") => Ok(Command::Disconnect),
            Some("connect") | Some("c") => iter
                .next()
                .ok_or(())
                .and_then(|port| port.parse().map_err(|_| ()))
                .map(|port| Command::Connect { port }),
            Some("put") | Some("p") => iter
                .next()
                .map(|message| Command::Put { message: message.to_string() })
                .ok_or(()),
            _ => Err(()),
        }
    }
}

#[derive(StructOpt)]
#[structopt(name = "chatroom-client")]
struct Opt {}

fn main() {
    let Opt {} = Opt::from_args();

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut connection: Option<TcpStream> = None;

    print!("> ");
    stdout.flush().unwrap();
    for line in stdin.lock().lines().filter_map(|line| line.ok()) {
        match line.parse::<Command>() {
            Ok(Command::Connect { port }) => {
                let addr: SocketAddr = format!("127.0.0.1:{}", port).parse().unwrap();
                match TcpStream::connect(addr) {
                    Ok(stream) => connection = Some(stream),
                    Err(error) => println!("[ERROR]: could not connect to {}: {}", addr, error),
                }
            }
            Ok(Command::Disconnect) => connection = None,
            Ok(Command::Get) => match connection.as_mut() {
                None => println!("[ERROR]: not connected to a server"),
                Some(stream) => {
                    if chatroom::wire::send(stream, &chatroom::Op::Get).is_err() {
                        println!("[ERROR]: connection to server lost");
                        connection = None;
                        continue;
                    }
                    match chatroom::wire::receive::<chatroom::OpResult>(stream) {
                        Ok(chatroom::OpResult::Messages(messages)) => {
                            println!("[RESPONSE]: {:?}", messages)
                        }
                        Ok(_) => println!("[ERROR]: unexpected response to Get"),
                        Err(error) => println!("[ERROR]: {}", error),
                    }
                }
            },
            Ok(Command::Put { message }) => match connection.as_mut() {
                None => println!("[ERROR]: not connected to a server"),
                Some(stream) => {
                    let op = chatroom::Op::Put(message);
                    if chatroom::wire::send(stream, &op).is_err() {
                        println!("[ERROR]: connection to server lost");
                        connection = None;
                        continue;
                    }
                    match chatroom::wire::receive::<chatroom::OpResult>(stream) {
                        Ok(chatroom::OpResult::Ack) => println!("[RESPONSE]: ack"),
                        Ok(_) => println!("[ERROR]: unexpected response to Put"),
                        Err(error) => println!("[ERROR]: {}", error),
                    }
                }
            },
            Ok(Command::Help) => usage(),
            Err(()) => println!("[ERROR]: could not parse command"),
        }
        print!("> ");
        stdout.flush().unwrap();
    }
}
