//! # Summary
//!
//! This module implements the outbound Connection Pool (§4.2): a
//! per-destination LIFO of keep-alive TCP sockets, with a background
//! culler thread that closes connections that have sat idle too long.
//!
//! Sockets are stored per-destination in a deque kept sorted by
//! `last_used` ascending — the culler scans from the front (oldest) and
//! stops at the first entry that isn't expired yet; `perform` reuses the
//! most recently returned socket first (from the back), which is the LIFO
//! behavior §2 describes, and a returned socket is always the newest, so
//! appending at the back preserves the ascending invariant.

use std::collections::{HashMap, VecDeque};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

struct Pooled {
    stream: TcpStream,
    last_used: Instant,
}

struct Shared {
    destinations: Mutex<HashMap<SocketAddr, VecDeque<Pooled>>>,
    closing: Mutex<bool>,
    shutdown: Condvar,
}

/// Recycles outbound TCP connections per destination and bounds their
/// idle lifetime. Safe to share across threads; `perform` is reentrant.
pub struct ConnectionPool {
    shared: Arc<Shared>,
    culler: Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl ConnectionPool {
    pub fn new(idle_threshold: Duration, culler_interval: Duration) -> Self {
        let shared = Arc::new(Shared {
            destinations: Mutex::new(HashMap::new()),
            closing: Mutex::new(false),
            shutdown: Condvar::new(),
        });

        let culler_shared = shared.clone();
        let culler = std::thread::Builder::new()
            .name("paxos-pool-culler".into())
            .spawn(move || Self::cull_loop(culler_shared, idle_threshold, culler_interval))
            .expect("failed to spawn connection-pool culler thread");

        ConnectionPool {
            shared,
            culler: Mutex::new(Some(culler)),
        }
    }

    /// Atomically acquire (or create) a connection to `addr`, invoke `f`
    /// on it, then return it to the pool on `f -> true` or close it on
    /// `f -> false` / connect failure. Returns `f`'s result, or `false` if
    /// no connection could be acquired or the pool is closing.
    pub fn perform<F>(&self, addr: SocketAddr, connect_timeout: Duration, f: F) -> bool
    where
        F: FnOnce(&mut TcpStream) -> bool,
    {
        if *self.shared.closing.lock() {
            return false;
        }

        let mut stream = match self.acquire(addr, connect_timeout) {
            Some(stream) => stream,
            None => return false,
        };

        let ok = f(&mut stream);

        if ok && !*self.shared.closing.lock() {
            self.release(addr, stream);
        } else {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }

        ok
    }

    fn acquire(&self, addr: SocketAddr, connect_timeout: Duration) -> Option<TcpStream> {
        {
            let mut destinations = self.shared.destinations.lock();
            if let Some(queue) = destinations.get_mut(&addr) {
                if let Some(pooled) = queue.pop_back() {
                    trace!("reusing pooled connection to {}", addr);
                    return Some(pooled.stream);
                }
            }
        }
        trace!("dialing new connection to {}", addr);
        TcpStream::connect_timeout(&addr, connect_timeout).ok()
    }

    fn release(&self, addr: SocketAddr, stream: TcpStream) {
        let mut destinations = self.shared.destinations.lock();
        destinations
            .entry(addr)
            .or_insert_with(VecDeque::new)
            .push_back(Pooled {
                stream,
                last_used: Instant::now(),
            });
    }

    fn cull_loop(shared: Arc<Shared>, idle_threshold: Duration, interval: Duration) {
        let mut closing = shared.closing.lock();
        loop {
            let timed_out = shared.shutdown.wait_for(&mut closing, interval).timed_out();
            if *closing {
                break;
            }
            if timed_out {
                Self::cull_once(&shared, idle_threshold);
            }
        }
        // Close every pooled socket before the culler exits.
        let mut destinations = shared.destinations.lock();
        for queue in destinations.values_mut() {
            for pooled in queue.drain(..) {
                let _ = pooled.stream.shutdown(std::net::Shutdown::Both);
            }
        }
    }

    fn cull_once(shared: &Arc<Shared>, idle_threshold: Duration) {
        let mut destinations = shared.destinations.lock();
        let now = Instant::now();
        for queue in destinations.values_mut() {
            while let Some(front) = queue.front() {
                if now.duration_since(front.last_used) >= idle_threshold {
                    let pooled = queue.pop_front().unwrap();
                    let _ = pooled.stream.shutdown(std::net::Shutdown::Both);
                } else {
                    break;
                }
            }
        }
    }

    /// Idempotent shutdown: wakes the culler, which closes every pooled
    /// socket before exiting. Subsequent `perform` calls return `false`.
    /// Takes `&self` so it can be called through a shared `Arc`.
    pub fn close(&self) {
        {
            let mut closing = self.shared.closing.lock();
            if *closing {
                return;
            }
            *closing = true;
        }
        self.shared.shutdown.notify_all();
        if let Some(handle) = self.culler.lock().take() {
            let _ = handle.join();
        }
    }

    #[cfg(test)]
    fn pooled_count(&self, addr: SocketAddr) -> usize {
        self.shared
            .destinations
            .lock()
            .get(&addr)
            .map(VecDeque::len)
            .unwrap_or(0)
    }
}

impl Drop for ConnectionPool {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    fn echo_server() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            for stream in listener.incoming() {
                if stream.is_err() {
                    break;
                }
            }
        });
        addr
    }

    #[test]
    fn perform_pools_socket_for_reuse() {
        let addr = echo_server();
        let pool = ConnectionPool::new(Duration::from_secs(30), Duration::from_secs(5));
        let ok = pool.perform(addr, Duration::from_millis(500), |_| true);
        assert!(ok);
        assert_eq!(pool.pooled_count(addr), 1);
    }

    #[test]
    fn failed_fn_closes_rather_than_pools() {
        let addr = echo_server();
        let pool = ConnectionPool::new(Duration::from_secs(30), Duration::from_secs(5));
        let ok = pool.perform(addr, Duration::from_millis(500), |_| false);
        assert!(!ok);
        assert_eq!(pool.pooled_count(addr), 0);
    }

    #[test]
    fn idle_socket_is_reclaimed() {
        let addr = echo_server();
        let pool = ConnectionPool::new(Duration::from_millis(200), Duration::from_millis(50));
        pool.perform(addr, Duration::from_millis(500), |_| true);
        assert_eq!(pool.pooled_count(addr), 1);
        std::thread::sleep(Duration::from_millis(500));
        assert_eq!(pool.pooled_count(addr), 0);
    }

    #[test]
    fn close_is_idempotent_and_drains_pool() {
        let addr = echo_server();
        let mut pool = ConnectionPool::new(Duration::from_secs(30), Duration::from_secs(5));
        pool.perform(addr, Duration::from_millis(500), |_| true);
        pool.close();
        pool.close();
        assert!(!pool.perform(addr, Duration::from_millis(500), |_| true));
    }
}
