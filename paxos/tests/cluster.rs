//! Integration tests driving real `Node`s over loopback TCP, covering the
//! concrete scenarios from the core design's testable-properties section:
//! a single-node cluster applying a request, a multi-node cluster
//! converging on one leader, and a new leader emerging after the old one
//! is torn down.
//!
//! Each test uses a disjoint port range so the suite can run with the
//! default test-harness concurrency without replicas from different
//! tests colliding on the same address.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use paxos::{Applier, Configuration, Node};

/// A replicated cell holding a single `u32`. `op` is one byte: `0` for
/// get, or `1` followed by a little-endian `u32` for set. The result is
/// always the post-operation value, little-endian encoded.
#[derive(Default)]
struct Cell(u32);

impl Applier for Cell {
    fn apply(&mut self, op: &[u8]) -> Vec<u8> {
        if op.first() == Some(&1) && op.len() == 5 {
            let mut bytes = [0u8; 4];
            bytes.copy_from_slice(&op[1..5]);
            self.0 = u32::from_le_bytes(bytes);
        }
        self.0.to_le_bytes().to_vec()
    }
}

fn get_op() -> Vec<u8> {
    vec![0]
}

fn set_op(value: u32) -> Vec<u8> {
    let mut op = vec![1u8];
    op.extend_from_slice(&value.to_le_bytes());
    op
}

fn decode(result: &[u8]) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(result);
    u32::from_le_bytes(bytes)
}

fn peer_addresses(base_port: u16, count: usize) -> Vec<SocketAddr> {
    (0..count)
        .map(|i| format!("127.0.0.1:{}", base_port + i as u16).parse().unwrap())
        .collect()
}

fn start_cluster(base_port: u16, count: usize) -> Vec<Node> {
    let peers = peer_addresses(base_port, count);
    (0..count)
        .map(|id| {
            let config = Configuration::new(peers.clone(), id).unwrap();
            Node::new(config, Box::new(Cell::default())).expect("node failed to start")
        })
        .collect()
}

fn wait_for_leader(nodes: &[Node], timeout: Duration) -> Option<usize> {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        let leaders: Vec<usize> = nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.is_leading())
            .map(|(id, _)| id)
            .collect();
        if leaders.len() == 1 {
            return Some(leaders[0]);
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    None
}

#[test]
fn single_node_cluster_applies_requests_in_order() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut nodes = start_cluster(32100, 1);

    let result = nodes[0].request(set_op(7)).expect("set should succeed");
    assert_eq!(decode(&result), 7);

    let result = nodes[0].request(get_op()).expect("get should succeed");
    assert_eq!(decode(&result), 7);

    nodes.drain(..).for_each(|node| node.teardown());
}

#[test]
fn three_node_cluster_converges_on_one_leader() {
    let _ = env_logger::builder().is_test(true).try_init();
    let nodes = start_cluster(32200, 3);

    let leader = wait_for_leader(&nodes, Duration::from_secs(2));
    assert!(leader.is_some(), "no leader elected within timeout");

    let result = nodes[leader.unwrap()]
        .request(set_op(42))
        .expect("leader should apply request");
    assert_eq!(decode(&result), 42);

    for node in &nodes {
        node.teardown();
    }
}

#[test]
fn leader_failure_triggers_reelection() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut nodes = start_cluster(32300, 3);

    let first_leader = wait_for_leader(&nodes, Duration::from_secs(2)).expect("initial leader");

    // Tear the leader down; it stops answering RPCs and its followers'
    // heartbeat timers should expire.
    nodes[first_leader].teardown();

    let survivors: Vec<&Node> = nodes
        .iter()
        .enumerate()
        .filter(|(id, _)| *id != first_leader)
        .map(|(_, node)| node)
        .collect();

    let deadline = Instant::now() + Duration::from_secs(2);
    let mut new_leader = None;
    while Instant::now() < deadline {
        let leaders: Vec<&&Node> = survivors.iter().filter(|node| node.is_leading()).collect();
        if leaders.len() == 1 {
            new_leader = Some(());
            break;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    assert!(new_leader.is_some(), "no replacement leader emerged");

    for (id, node) in nodes.into_iter().enumerate() {
        if id != first_leader {
            node.teardown();
        }
    }
}

#[test]
fn two_node_cluster_never_establishes_leadership_with_one_node_crashed() {
    // A 2-node cluster requires both nodes to agree on a leader; with
    // the second replica never started, its address is simply
    // unreachable, so a lone vote can never exceed `count() / 2 == 1`.
    // Mirrors the spec's note that the 2-node configuration tolerates
    // zero failures and is a protocol smoke test, not a safe deployment.
    let _ = env_logger::builder().is_test(true).try_init();
    let peers = peer_addresses(32400, 2);
    let config = Configuration::new(peers, 0).unwrap();
    let node = Node::new(config, Box::new(Cell::default())).expect("node failed to start");

    let deadline = Instant::now() + Duration::from_millis(800);
    while Instant::now() < deadline {
        assert!(!node.is_leading(), "lone node must never win a 2-node quorum");
        std::thread::sleep(Duration::from_millis(20));
    }

    node.teardown();
}
