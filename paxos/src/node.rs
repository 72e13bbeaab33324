//! # Summary
//!
//! The embedder-facing API (§6): `Node::new` wires the Connection Pool,
//! Terminal Pool, Paxos Engine, and Applier together and starts every
//! thread in §5's inventory; `request` submits an operation and blocks
//! until it is applied; `teardown` is an idempotent shutdown that joins
//! every thread and closes every socket.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::applier::{Applier, ApplierThread, ResultTable};
use crate::config::Configuration;
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::message::{ClientResponse, Tag};
use crate::pool::ConnectionPool;
use crate::terminal::TerminalPool;

/// A running replica. Construction starts every background thread
/// listed in §5; `teardown` stops them all.
pub struct Node {
    engine: Arc<Engine>,
    terminal: Mutex<Option<TerminalPool>>,
    pool: Arc<ConnectionPool>,
    election_thread: Mutex<Option<std::thread::JoinHandle<()>>>,
    applier_thread: Mutex<Option<std::thread::JoinHandle<()>>>,
    closing: Arc<Mutex<bool>>,
    self_id: usize,
    request_seq: AtomicU64,
    torn_down: Mutex<bool>,
}

impl Node {
    /// Starts a node: binds its listener, spawns the election/leader
    /// thread and the applier thread, and begins accepting RPCs.
    /// `applier` is moved onto the applier thread and owns the
    /// replicated data structure for the lifetime of the node.
    pub fn new(
        config: Configuration,
        applier: Box<dyn Applier>,
    ) -> Result<Self> {
        let self_id = config.self_id();
        let addr = config.self_address();
        let idle_threshold = config.idle_threshold();
        let culler_interval = config.culler_interval();

        let pool = Arc::new(ConnectionPool::new(idle_threshold, culler_interval));
        let results = Arc::new(ResultTable::default());
        let engine = Arc::new(Engine::new(config, pool.clone(), results.clone()));

        let closing = engine.closing_handle();

        let demux_engine = engine.clone();
        let demux = Arc::new(move |stream: &mut std::net::TcpStream| -> bool {
            Self::demux(&demux_engine, stream)
        });

        let terminal = TerminalPool::new(
            addr,
            64,
            Duration::from_millis(100),
            Duration::from_secs(30),
            demux,
        )
        .map_err(Error::Transport)?;

        let election_engine = engine.clone();
        let election_thread = std::thread::Builder::new()
            .name(format!("paxos-{}-election", self_id))
            .spawn(move || election_engine.run())
            .expect("failed to spawn election thread");

        let applier_driver = ApplierThread::new(
            engine.state_handle(),
            engine.heartbeat_handle(),
            engine.closing_handle(),
            results,
        );
        let applier_thread = std::thread::Builder::new()
            .name(format!("paxos-{}-applier", self_id))
            .spawn(move || applier_driver.run(applier))
            .expect("failed to spawn applier thread");

        info!("node {} listening on {}", self_id, addr);

        Ok(Node {
            engine,
            terminal: Mutex::new(Some(terminal)),
            pool,
            election_thread: Mutex::new(Some(election_thread)),
            applier_thread: Mutex::new(Some(applier_thread)),
            closing,
            self_id,
            request_seq: AtomicU64::new(0),
            torn_down: Mutex::new(false),
        })
    }

    /// Submits `op` as an operation originating from this node, blocking
    /// until it is applied (on this node or the current leader) or the
    /// retry budget is exhausted.
    pub fn request(&self, op: Vec<u8>) -> Result<Vec<u8>> {
        if *self.closing.lock() {
            return Err(Error::ShuttingDown);
        }
        let request_seq = self.request_seq.fetch_add(1, Ordering::SeqCst);
        self.engine.request(self.self_id, request_seq, op)
    }

    pub fn is_leading(&self) -> bool {
        self.engine.is_leading()
    }

    /// Idempotent shutdown: stops the election/leader and applier
    /// threads, closes the terminal pool (draining busy workers first)
    /// and the connection pool, and joins every thread.
    pub fn teardown(&self) {
        let mut torn_down = self.torn_down.lock();
        if *torn_down {
            return;
        }
        *torn_down = true;

        self.engine.close();

        if let Some(terminal) = self.terminal.lock().take() {
            drop(terminal);
        }

        if let Some(handle) = self.election_thread.lock().take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.applier_thread.lock().take() {
            let _ = handle.join();
        }

        self.pool.close();
    }

    fn demux(engine: &Arc<Engine>, stream: &mut std::net::TcpStream) -> bool {
        let tag = match crate::codec::receive_tag(stream) {
            Ok(tag) => tag,
            Err(_) => return false,
        };
        match tag {
            Tag::Vote => Self::handle::<_, _>(stream, |request| engine.handle_vote(request)),
            Tag::Prepare => Self::handle::<_, _>(stream, |request| engine.handle_prepare(request)),
            Tag::Accept => Self::handle::<_, _>(stream, |request| engine.handle_accept(request)),
            Tag::Success => Self::handle::<_, _>(stream, |request| engine.handle_success(request)),
            Tag::Request => Self::handle::<_, ClientResponse>(stream, |request| {
                engine.handle_client_request(request)
            }),
        }
    }

    fn handle<Req, Resp>(stream: &mut std::net::TcpStream, f: impl FnOnce(Req) -> Resp) -> bool
    where
        Req: serde::de::DeserializeOwned,
        Resp: serde::Serialize,
    {
        let request = match crate::codec::receive::<Req>(stream) {
            Ok(request) => request,
            Err(_) => return false,
        };
        let response = f(request);
        crate::codec::send(stream, &response).is_ok()
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        self.teardown();
    }
}
