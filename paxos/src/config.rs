//! # Summary
//!
//! This module defines the static cluster configuration a Paxos node is
//! launched with: the ordered list of peer addresses and the node's own
//! index into it. Immutable after construction, per §3 of the design.

use std::net::SocketAddr;
use std::time::Duration;

use crate::error::{Error, Result};

/// Minimum and maximum bound of the randomized election timeout.
pub const ELECTION_TIMEOUT_MIN: Duration = Duration::from_millis(150);
pub const ELECTION_TIMEOUT_MAX: Duration = Duration::from_millis(300);

/// Interval on which a leader refreshes its followers via Success/heartbeat.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_millis(50);

/// Default idle threshold before the connection-pool culler closes a socket.
pub const IDLE_THRESHOLD: Duration = Duration::from_secs(30);

/// Default interval at which the connection-pool culler scans.
pub const CULLER_INTERVAL: Duration = Duration::from_secs(5);

/// Ordered, immutable list of peer addresses, plus this node's index into
/// it. Node `self_id` must satisfy `0 <= self_id < peers.len()`.
#[derive(Clone, Debug)]
pub struct Configuration {
    peers: Vec<SocketAddr>,
    self_id: usize,
    election_timeout: (Duration, Duration),
    heartbeat_interval: Duration,
    idle_threshold: Duration,
    culler_interval: Duration,
}

impl Configuration {
    /// Construct a configuration from the cluster's peer addresses (indexed
    /// by node id) and this node's own id. Fails if `self_id` does not name
    /// a slot in `peers`, or if the cluster is empty.
    pub fn new(peers: Vec<SocketAddr>, self_id: usize) -> Result<Self> {
        if peers.is_empty() {
            return Err(Error::Configuration("configuration has no peers".into()));
        }
        if self_id >= peers.len() {
            return Err(Error::Configuration(format!(
                "self_id {} out of range for {} peers",
                self_id,
                peers.len()
            )));
        }
        Ok(Configuration {
            peers,
            self_id,
            election_timeout: (ELECTION_TIMEOUT_MIN, ELECTION_TIMEOUT_MAX),
            heartbeat_interval: HEARTBEAT_INTERVAL,
            idle_threshold: IDLE_THRESHOLD,
            culler_interval: CULLER_INTERVAL,
        })
    }

    /// Override the randomized election timeout range (must be a strict
    /// subrange with `min < max`, and `max` should stay well under any
    /// configured heartbeat interval to preserve liveness).
    pub fn with_election_timeout_range(mut self, min: Duration, max: Duration) -> Self {
        self.election_timeout = (min, max);
        self
    }

    /// Override the leader's heartbeat/Success broadcast interval.
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Override how long an outbound connection may sit idle in the pool
    /// before the culler closes it.
    pub fn with_idle_threshold(mut self, threshold: Duration) -> Self {
        self.idle_threshold = threshold;
        self
    }

    /// Override how often the connection-pool culler scans for idle sockets.
    pub fn with_culler_interval(mut self, interval: Duration) -> Self {
        self.culler_interval = interval;
        self
    }

    pub fn self_id(&self) -> usize {
        self.self_id
    }

    pub fn count(&self) -> usize {
        self.peers.len()
    }

    pub fn address(&self, id: usize) -> SocketAddr {
        self.peers[id]
    }

    pub fn self_address(&self) -> SocketAddr {
        self.peers[self.self_id]
    }

    /// Strict majority of the configured cluster size.
    pub fn quorum(&self) -> usize {
        self.peers.len() / 2 + 1
    }

    pub fn peer_ids(&self) -> impl Iterator<Item = usize> {
        let self_id = self.self_id;
        (0..self.peers.len()).filter(move |id| *id != self_id)
    }

    pub fn election_timeout_range(&self) -> (Duration, Duration) {
        self.election_timeout
    }

    pub fn heartbeat_interval(&self) -> Duration {
        self.heartbeat_interval
    }

    pub fn idle_threshold(&self) -> Duration {
        self.idle_threshold
    }

    pub fn culler_interval(&self) -> Duration {
        self.culler_interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{}", port).parse().unwrap()
    }

    #[test]
    fn rejects_out_of_range_self_id() {
        let peers = vec![addr(9000), addr(9001)];
        assert!(Configuration::new(peers, 2).is_err());
    }

    #[test]
    fn rejects_empty_cluster() {
        assert!(Configuration::new(vec![], 0).is_err());
    }

    #[test]
    fn quorum_is_strict_majority() {
        let config = Configuration::new(vec![addr(1), addr(2), addr(3)], 0).unwrap();
        assert_eq!(config.quorum(), 2);
        let config = Configuration::new(vec![addr(1), addr(2)], 0).unwrap();
        assert_eq!(config.quorum(), 2);
    }

    #[test]
    fn peer_ids_excludes_self() {
        let config = Configuration::new(vec![addr(1), addr(2), addr(3)], 1).unwrap();
        assert_eq!(config.peer_ids().collect::<Vec<_>>(), vec![0, 2]);
    }
}
