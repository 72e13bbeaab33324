use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;

use structopt::StructOpt;

#[derive(StructOpt)]
#[structopt(name = "chatroom-server")]
struct Opt {
    /// Unique server ID, indexing into `--peers`
    #[structopt(short = "i", long = "id")]
    id: usize,

    /// Comma-separated peer addresses, indexed by server ID (this
    /// node's own paxos listen address is `peers[id]`)
    #[structopt(short = "p", long = "peers")]
    peers: String,

    /// Port chat clients connect to (distinct from the paxos listen port)
    #[structopt(short = "c", long = "client-port")]
    client_port: u16,

    /// Logging level
    #[structopt(short = "v", long = "verbose", parse(from_occurrences))]
    verbosity: u8,
}

fn init_logging(id: usize, verbosity: u8) {
    let level = match verbosity {
        0 => log::LevelFilter::Off,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "[{}][{}][{}]: {}",
                id,
                record.level(),
                record.target(),
                message
            ))
        })
        .level_for("paxos", level)
        .level_for("chatroom", level)
        .level_for("mio", log::LevelFilter::Off)
        .chain(std::io::stdout())
        .apply()
        .unwrap();
}

fn main() {
    let opt = Opt::from_args();
    init_logging(opt.id, opt.verbosity);

    let peers: Vec<SocketAddr> = opt
        .peers
        .split(',')
        .map(|addr| addr.trim().parse().expect("invalid peer address"))
        .collect();

    let config = paxos::Configuration::new(peers, opt.id).expect("invalid configuration");
    let node = Arc::new(paxos::Node::new(config, Box::new(chatroom::ChatLog::default())).expect("failed to start node"));

    let client_addr: SocketAddr = format!("127.0.0.1:{}", opt.client_port).parse().unwrap();
    let listener = TcpListener::bind(client_addr).expect("failed to bind client port");
    log::info!("chatroom server {} accepting clients on {}", opt.id, client_addr);

    for stream in listener.incoming() {
        let mut stream = match stream {
            Ok(stream) => stream,
            Err(_) => continue,
        };
        let node = node.clone();
        std::thread::spawn(move || loop {
            let op: chatroom::Op = match chatroom::wire::receive(&mut stream) {
                Ok(op) => op,
                Err(_) => return,
            };
            let op_bytes = chatroom::encode_op(&op);
            let result = match node.request(op_bytes) {
                Ok(bytes) => chatroom::decode_result(&bytes),
                Err(error) => {
                    log::warn!("request failed: {}", error);
                    return;
                }
            };
            if chatroom::wire::send(&mut stream, &result).is_err() {
                return;
            }
        });
    }
}
