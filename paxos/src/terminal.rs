//! # Summary
//!
//! This module implements the inbound Terminal Pool (§4.3): a single
//! listener accepting up to `max_concurrent` peers, multiplexing idle
//! readers with a `mio`-based readiness poll (the "select" of the
//! design), and dispatching each readable socket to a worker thread that
//! invokes the engine-provided demultiplexer.
//!
//! Workers own their socket for the duration of one demux invocation;
//! there are never two aliases to the same socket (§9's "shared-cast
//! tricks" note — ownership transfer stands in for that here).

use std::collections::HashMap;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::Arc;
use std::time::{Duration, Instant};

use mio::unix::EventedFd;
use mio::{Events, Poll, PollOpt, Ready, Token};
use parking_lot::{Condvar, Mutex};

/// Demultiplexer supplied by the Paxos Engine: reads one RPC off the
/// socket, handles it, and writes the response. Returns `false` (or the
/// socket errors) to signal the connection should be closed rather than
/// returned to the idle set.
pub type Demux = Arc<dyn Fn(&mut TcpStream) -> bool + Send + Sync>;

const LISTENER_TOKEN: Token = Token(usize::max_value());

struct IdleSocket {
    stream: TcpStream,
    last_used: Instant,
}

struct Shared {
    free: Mutex<HashMap<RawFd, IdleSocket>>,
    recent_tx: crossbeam_channel::Sender<TcpStream>,
    recent_rx: crossbeam_channel::Receiver<TcpStream>,
    busy: Mutex<usize>,
    busy_zero: Condvar,
    closing: Mutex<bool>,
    max_concurrent: usize,
}

/// Accepts inbound connections and hands each active one to a worker
/// invoking the configured demultiplexer.
pub struct TerminalPool {
    shared: Arc<Shared>,
    multiplexer: Option<std::thread::JoinHandle<()>>,
}

impl TerminalPool {
    pub fn new(
        addr: SocketAddr,
        max_concurrent: usize,
        select_interval: Duration,
        idle_threshold: Duration,
        demux: Demux,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(false)?;

        let (recent_tx, recent_rx) = crossbeam_channel::unbounded();
        let shared = Arc::new(Shared {
            free: Mutex::new(HashMap::new()),
            recent_tx,
            recent_rx,
            busy: Mutex::new(0),
            busy_zero: Condvar::new(),
            closing: Mutex::new(false),
            max_concurrent,
        });

        let loop_shared = shared.clone();
        let multiplexer = std::thread::Builder::new()
            .name("paxos-terminal-multiplexer".into())
            .spawn(move || {
                if let Err(error) =
                    Self::run(listener, loop_shared, select_interval, idle_threshold, demux)
                {
                    error!("terminal pool multiplexer exited: {}", error);
                }
            })
            .expect("failed to spawn terminal pool multiplexer thread");

        Ok(TerminalPool {
            shared,
            multiplexer: Some(multiplexer),
        })
    }

    fn run(
        listener: TcpListener,
        shared: Arc<Shared>,
        select_interval: Duration,
        idle_threshold: Duration,
        demux: Demux,
    ) -> std::io::Result<()> {
        let poll = Poll::new()?;
        poll.register(
            &EventedFd(&listener.as_raw_fd()),
            LISTENER_TOKEN,
            Ready::readable(),
            PollOpt::level(),
        )?;

        let mut events = Events::with_capacity(1024);

        loop {
            if *shared.closing.lock() {
                break;
            }

            // Step 2: drop sockets that have sat idle too long.
            {
                let mut free = shared.free.lock();
                let now = Instant::now();
                free.retain(|_, idle| now.duration_since(idle.last_used) < idle_threshold);
            }

            // Step 3: drain worker-returned sockets into the idle set,
            // registering each for readability.
            while let Ok(stream) = shared.recent_rx.try_recv() {
                let fd = stream.as_raw_fd();
                poll.register(&EventedFd(&fd), Token(fd as usize), Ready::readable(), PollOpt::level())?;
                shared.free.lock().insert(
                    fd,
                    IdleSocket {
                        stream,
                        last_used: Instant::now(),
                    },
                );
            }

            // Step 4: select with a bounded timeout.
            poll.poll(&mut events, Some(select_interval))?;

            if Self::busy(&shared) >= shared.max_concurrent {
                continue;
            }

            for event in events.iter() {
                if event.token() == LISTENER_TOKEN {
                    match listener.accept() {
                        Ok((stream, peer)) => {
                            info!("accepted connection from {}", peer);
                            Self::spawn_worker(&shared, stream, demux.clone());
                        }
                        Err(error) => warn!("accept failed: {}", error),
                    }
                } else {
                    let fd = event.token().0 as RawFd;
                    let idle = shared.free.lock().remove(&fd);
                    if let Some(idle) = idle {
                        poll.deregister(&EventedFd(&fd)).ok();
                        Self::spawn_worker(&shared, idle.stream, demux.clone());
                    }
                }
                if Self::busy(&shared) >= shared.max_concurrent {
                    break;
                }
            }
        }

        Ok(())
    }

    fn busy(shared: &Arc<Shared>) -> usize {
        *shared.busy.lock()
    }

    fn spawn_worker(shared: &Arc<Shared>, mut stream: TcpStream, demux: Demux) {
        *shared.busy.lock() += 1;
        let shared = shared.clone();
        std::thread::spawn(move || {
            let ok = demux(&mut stream);
            if ok {
                // Returning may race with teardown; an unbounded channel
                // send never blocks, and close() drains it regardless.
                let _ = shared.recent_tx.send(stream);
            } else {
                let _ = stream.shutdown(std::net::Shutdown::Both);
            }
            let mut busy = shared.busy.lock();
            *busy -= 1;
            if *busy == 0 {
                shared.busy_zero.notify_all();
            }
        });
    }

    /// Idempotent shutdown: waits for busy workers to finish, then closes
    /// every remaining socket (idle and returned-but-unreclaimed).
    pub fn close(&mut self) {
        {
            let mut closing = self.shared.closing.lock();
            if *closing {
                return;
            }
            *closing = true;
        }

        if let Some(handle) = self.multiplexer.take() {
            let _ = handle.join();
        }

        let mut busy = self.shared.busy.lock();
        while *busy > 0 {
            self.shared.busy_zero.wait(&mut busy);
        }
        drop(busy);

        for (_, idle) in self.shared.free.lock().drain() {
            let _ = idle.stream.shutdown(std::net::Shutdown::Both);
        }
        while let Ok(stream) = self.shared.recent_rx.try_recv() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
    }
}

impl Drop for TerminalPool {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};

    fn free_addr() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        addr
    }

    /// A demux that echoes one 1-byte request back, then returns the
    /// connection to the idle set (`true`) so a second request on the
    /// same socket proves reuse rather than a fresh accept.
    fn echo_demux() -> Demux {
        Arc::new(|stream: &mut TcpStream| {
            let mut byte = [0u8; 1];
            if stream.read_exact(&mut byte).is_err() {
                return false;
            }
            stream.write_all(&byte).is_ok()
        })
    }

    #[test]
    fn accepted_connection_is_dispatched_to_demux() {
        let addr = free_addr();
        let mut pool = TerminalPool::new(
            addr,
            4,
            Duration::from_millis(20),
            Duration::from_secs(30),
            echo_demux(),
        )
        .unwrap();

        let mut client = TcpStream::connect(addr).unwrap();
        client.write_all(&[42]).unwrap();
        let mut response = [0u8; 1];
        client.read_exact(&mut response).unwrap();
        assert_eq!(response[0], 42);

        pool.close();
    }

    #[test]
    fn idle_socket_is_reclaimed_and_reused_for_second_request() {
        let addr = free_addr();
        let mut pool = TerminalPool::new(
            addr,
            4,
            Duration::from_millis(20),
            Duration::from_secs(30),
            echo_demux(),
        )
        .unwrap();

        let mut client = TcpStream::connect(addr).unwrap();
        client.write_all(&[1]).unwrap();
        let mut response = [0u8; 1];
        client.read_exact(&mut response).unwrap();
        assert_eq!(response[0], 1);

        // Give the multiplexer a beat to drain the returned socket back
        // into its idle set before issuing a second request on it.
        std::thread::sleep(Duration::from_millis(100));

        client.write_all(&[2]).unwrap();
        client.read_exact(&mut response).unwrap();
        assert_eq!(response[0], 2);

        pool.close();
    }

    #[test]
    fn close_is_idempotent() {
        let addr = free_addr();
        let mut pool = TerminalPool::new(
            addr,
            4,
            Duration::from_millis(20),
            Duration::from_secs(30),
            echo_demux(),
        )
        .unwrap();
        pool.close();
        pool.close();
    }
}
