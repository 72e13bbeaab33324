//! # Summary
//!
//! The Paxos Engine (§4.4): term and leadership state, the replicated
//! log, the election loop, the leader loop, and the five RPC handlers
//! (Vote, Prepare, Accept, Success, Request). This is the largest module
//! in the crate and the one the other components exist to serve.
//!
//! State is guarded by a single engine-wide lock with a heartbeat
//! condition variable bound to it, per §5's shared-resource policy:
//! Connection Pool and Terminal Pool each keep their own locks, and the
//! acquisition order is always engine-lock before pool-lock.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use rand::Rng;

use crate::applier::ResultTable;
use crate::config::Configuration;
use crate::error::{Error, Result};
use crate::id::ProposalID;
use crate::logstore::Log;
use crate::message::{
    AcceptRequest, AcceptResponse, ClientRequest, ClientResponse, Entry, PrepareRequest,
    PrepareResponse, SuccessRequest, SuccessResponse, VoteRequest, VoteResponse,
};
use crate::pool::ConnectionPool;

/// A slot index reserved for heartbeat-only Success RPCs: no log write
/// is associated with it.
const HEARTBEAT_SLOT: usize = usize::max_value();

/// The engine's mutable state: everything guarded by the engine lock.
pub struct EngineState {
    pub term: ProposalID,
    pub leading: bool,
    pub log: Log,
    /// Set only by a genuine "reset my election timer" event (granting a
    /// vote, or observing a current-or-newer-term leader RPC) — never by
    /// a spurious condvar wakeup or an unrelated `notify_all`. Consumed
    /// (and reset to `false`) at the start of each election wait so a
    /// stale flag from a prior round can't suppress the next one.
    pub(crate) heartbeat_seen: bool,
}

/// Runs Multi-Paxos for one node: election, leadership, and the RPC
/// surface peers and followers drive it through.
pub struct Engine {
    self_id: usize,
    config: Configuration,
    state: Arc<Mutex<EngineState>>,
    heartbeat: Arc<Condvar>,
    closing: Arc<Mutex<bool>>,
    pool: Arc<ConnectionPool>,
    results: Arc<ResultTable>,
}

impl Engine {
    pub fn new(config: Configuration, pool: Arc<ConnectionPool>, results: Arc<ResultTable>) -> Self {
        let self_id = config.self_id();
        Engine {
            self_id,
            state: Arc::new(Mutex::new(EngineState {
                term: ProposalID::initial(self_id),
                leading: false,
                log: Log::new(),
                heartbeat_seen: false,
            })),
            heartbeat: Arc::new(Condvar::new()),
            closing: Arc::new(Mutex::new(false)),
            pool,
            config,
            results,
        }
    }

    pub fn state_handle(&self) -> Arc<Mutex<EngineState>> {
        self.state.clone()
    }

    pub fn heartbeat_handle(&self) -> Arc<Condvar> {
        self.heartbeat.clone()
    }

    pub fn closing_handle(&self) -> Arc<Mutex<bool>> {
        self.closing.clone()
    }

    pub fn close(&self) {
        *self.closing.lock() = true;
        self.heartbeat.notify_all();
    }

    pub fn current_term(&self) -> ProposalID {
        self.state.lock().term
    }

    pub fn is_leading(&self) -> bool {
        self.state.lock().leading
    }

    // --- Election / leader loop ----------------------------------------

    /// Runs forever (until `close()`), alternating between waiting out
    /// the election timeout as a follower and, upon winning one, driving
    /// the leader loop. Intended as the body of the engine's sole
    /// election/leader thread.
    pub fn run(&self) {
        loop {
            if *self.closing.lock() {
                return;
            }
            if self.run_election_round() {
                self.run_as_leader();
            }
        }
    }

    /// Waits out one randomized election timeout. Returns `true` if no
    /// heartbeat arrived and this node won the resulting election.
    fn run_election_round(&self) -> bool {
        let (min, max) = self.config.election_timeout_range();
        let timeout = rand::thread_rng().gen_range(min.as_millis() as u64, max.as_millis() as u64 + 1);
        let timeout = Duration::from_millis(timeout);

        let deadline = Instant::now() + timeout;

        let mut state = self.state.lock();
        state.heartbeat_seen = false;
        loop {
            if *self.closing.lock() || state.heartbeat_seen {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            self.heartbeat.wait_for(&mut state, deadline - now);
        }
        if *self.closing.lock() || state.heartbeat_seen {
            return false;
        }

        let candidate_term = state.term.bump(self.self_id);
        state.term = candidate_term;
        debug!("node {} starting election at term {}", self.self_id, candidate_term);
        drop(state);

        let peers: Vec<usize> = self.config.peer_ids().collect();
        let (_, vote_timeout) = self.config.election_timeout_range();
        let (tx, rx) = crossbeam_channel::unbounded();
        for peer in peers.iter().copied() {
            let tx = tx.clone();
            let addr = self.config.address(peer);
            let pool = self.pool.clone();
            std::thread::spawn(move || {
                let outcome = Self::send_vote(&pool, addr, candidate_term, vote_timeout);
                let _ = tx.send(outcome);
            });
        }
        drop(tx);

        let mut votes = 1usize;
        let mut highest_seen = candidate_term;
        for outcome in rx.iter() {
            if let Some(peer_term) = outcome {
                if peer_term < candidate_term {
                    votes += 1;
                } else if peer_term > highest_seen {
                    highest_seen = peer_term;
                }
            }
        }

        let mut state = self.state.lock();
        if state.term != candidate_term {
            // Someone else's RPC already moved us along; abandon this round.
            return false;
        }
        if highest_seen > candidate_term {
            state.term = highest_seen;
            debug!("node {} saw higher term {}, stepping back to follower", self.self_id, highest_seen);
            return false;
        }
        if votes > self.config.count() / 2 {
            drop(state);
            if !self.catch_up_log(candidate_term) {
                debug!("node {} abandoned leadership bid at term {} during catch-up", self.self_id, candidate_term);
                return false;
            }
            let mut state = self.state.lock();
            if state.term != candidate_term {
                return false;
            }
            state.leading = true;
            info!("node {} elected leader at term {}", self.self_id, candidate_term);
            true
        } else {
            false
        }
    }

    /// Before a freshly elected leader accepts any client write, it must
    /// learn whether a previous (possibly crashed) leader left any slot
    /// at or beyond this node's own log frontier with a value accepted
    /// by some acceptor but never confirmed chosen. Per §4.4.2, this
    /// drives one Prepare round per such slot, re-proposing the
    /// highest-numbered accepted value it finds (never a client op)
    /// until it reaches a slot nobody has accepted anything for — the
    /// frontier from which fresh client writes are safe. Returns `false`
    /// if a higher term surfaces along the way, meaning this node should
    /// step back to follower instead of leading.
    fn catch_up_log(&self, term: ProposalID) -> bool {
        let peers: Vec<usize> = self.config.peer_ids().collect();
        loop {
            if *self.closing.lock() {
                return false;
            }
            // `index` is always exactly this node's own log frontier, so it
            // never has a locally accepted value of its own to contribute
            // here — only peers can tell us about one.
            let index = self.state.lock().log.len();

            let (responses, highest_seen_term) = self.send_prepare_round(term, index, &peers);
            if highest_seen_term > term {
                let mut state = self.state.lock();
                if state.term < highest_seen_term {
                    state.term = highest_seen_term;
                    state.leading = false;
                }
                return false;
            }

            // Tally a majority of responders (self included) and find the
            // highest-numbered accepted value among them, if any.
            let mut replies = 1usize; // self always "responds" to its own prepare.
            let mut best: Option<(ProposalID, Vec<u8>)> = None;
            for accepted in responses {
                replies += 1;
                if let Some((proposal, value)) = accepted {
                    if best.as_ref().map_or(true, |(best_proposal, _)| proposal > *best_proposal) {
                        best = Some((proposal, value));
                    }
                }
            }
            if replies < self.config.quorum() {
                // Not enough live peers to safely determine this slot's
                // fate; abandon this leadership bid rather than guess and
                // risk silently clobbering a value some unreachable
                // acceptor already holds. A later election attempt can
                // retry once connectivity recovers.
                return false;
            }

            match best {
                None => return true,
                Some((_, value)) => {
                    {
                        let mut state = self.state.lock();
                        if state.term != term {
                            return false;
                        }
                        state.log.slot_mut(index).accept(term, value.clone());
                    }
                    if !self.accept_majority(term, index, &value, &peers) {
                        return false;
                    }
                    {
                        let mut state = self.state.lock();
                        if state.term != term {
                            return false;
                        }
                        state.log.slot_mut(index).choose(value.clone());
                    }
                    self.broadcast_success_for(term, index, &value, &peers);
                }
            }
        }
    }

    /// Sends Prepare(term, index) to every peer and collects the
    /// responses (in arrival order; timed-out peers are simply absent),
    /// alongside the highest term any responder reported.
    fn send_prepare_round(
        &self,
        term: ProposalID,
        index: usize,
        peers: &[usize],
    ) -> (Vec<Option<(ProposalID, Vec<u8>)>>, ProposalID) {
        let timeout = Duration::from_millis(200);
        let (tx, rx) = crossbeam_channel::unbounded();
        for &peer in peers {
            let tx = tx.clone();
            let addr = self.config.address(peer);
            let pool = self.pool.clone();
            std::thread::spawn(move || {
                let outcome = Self::send_prepare(&pool, addr, term, index, timeout);
                let _ = tx.send(outcome);
            });
        }
        drop(tx);

        let mut accepted = Vec::new();
        let mut highest = term;
        for outcome in rx.iter() {
            if let Some(response) = outcome {
                if response.term > highest {
                    highest = response.term;
                }
                accepted.push(response.accepted);
            }
        }
        (accepted, highest)
    }

    fn send_prepare(
        pool: &ConnectionPool,
        addr: SocketAddr,
        term: ProposalID,
        slot: usize,
        timeout: Duration,
    ) -> Option<PrepareResponse> {
        let mut result = None;
        pool.perform(addr, timeout, |stream| {
            stream.set_read_timeout(Some(timeout)).ok();
            stream.set_write_timeout(Some(timeout)).ok();
            if crate::codec::send_tag(stream, crate::message::Tag::Prepare).is_err() {
                return false;
            }
            if crate::codec::send(stream, &PrepareRequest { term, slot }).is_err() {
                return false;
            }
            match crate::codec::receive::<PrepareResponse>(stream) {
                Ok(response) => {
                    result = Some(response);
                    true
                }
                Err(_) => false,
            }
        });
        result
    }

    fn send_vote(
        pool: &ConnectionPool,
        addr: SocketAddr,
        candidate_term: ProposalID,
        timeout: Duration,
    ) -> Option<ProposalID> {
        let mut result = None;
        pool.perform(addr, timeout, |stream| {
            stream.set_read_timeout(Some(timeout)).ok();
            stream.set_write_timeout(Some(timeout)).ok();
            if crate::codec::send_tag(stream, crate::message::Tag::Vote).is_err() {
                return false;
            }
            if crate::codec::send(stream, &VoteRequest { candidate_term }).is_err() {
                return false;
            }
            match crate::codec::receive::<VoteResponse>(stream) {
                Ok(response) => {
                    result = Some(response.term);
                    true
                }
                Err(_) => false,
            }
        });
        result
    }

    /// Entered with `term.node == self` and `leading` already set. Runs
    /// until a higher term is observed or the engine is closing.
    fn run_as_leader(&self) {
        let leader_term = self.current_term();
        loop {
            if *self.closing.lock() {
                self.state.lock().leading = false;
                return;
            }
            if self.current_term() != leader_term {
                self.state.lock().leading = false;
                return;
            }
            self.leader_round(leader_term);
            std::thread::sleep(self.config.heartbeat_interval());
        }
    }

    /// One round of leader housekeeping. New entries are driven through
    /// Accept/Success in-line by `propose_and_wait`; this round exists to
    /// keep followers' heartbeat timers from firing between requests.
    fn leader_round(&self, term: ProposalID) {
        let peers: Vec<usize> = self.config.peer_ids().collect();
        self.broadcast_heartbeat(term, &peers);
    }

    fn broadcast_heartbeat(&self, term: ProposalID, peers: &[usize]) {
        for &peer in peers {
            let addr = self.config.address(peer);
            let pool = self.pool.clone();
            let timeout = self.config.heartbeat_interval();
            std::thread::spawn(move || {
                pool.perform(addr, timeout, move |stream| {
                    stream.set_read_timeout(Some(timeout)).ok();
                    stream.set_write_timeout(Some(timeout)).ok();
                    if crate::codec::send_tag(stream, crate::message::Tag::Success).is_err() {
                        return false;
                    }
                    let request = SuccessRequest {
                        term,
                        slot: HEARTBEAT_SLOT,
                        value: Vec::new(),
                    };
                    if crate::codec::send(stream, &request).is_err() {
                        return false;
                    }
                    crate::codec::receive::<SuccessResponse>(stream).is_ok()
                });
            });
        }
    }

    // --- Client request path --------------------------------------------

    /// Submits `op` on behalf of `origin`/`request_seq`. If this node is
    /// leading, drives Accept/Success in-line; otherwise forwards a
    /// Request RPC to the believed leader. Blocks until the operation is
    /// applied or the retry budget is exhausted.
    pub fn request(&self, origin: usize, request_seq: u64, op: Vec<u8>) -> Result<Vec<u8>> {
        const MAX_ATTEMPTS: usize = 10;
        for _ in 0..MAX_ATTEMPTS {
            if *self.closing.lock() {
                return Err(Error::ShuttingDown);
            }

            let (am_leader, leader_node) = {
                let state = self.state.lock();
                (state.term.node() == self.self_id && state.leading, state.term.node())
            };

            if am_leader {
                match self.propose_and_wait(origin, request_seq, op.clone()) {
                    Ok(result) => return Ok(result),
                    Err(Error::NotLeader { .. }) => continue,
                    Err(other) => return Err(other),
                }
            } else if leader_node == self.self_id {
                // We know we aren't leading but also think the term is ours:
                // an election is in flight. Back off briefly and retry.
                std::thread::sleep(Duration::from_millis(20));
                continue;
            } else {
                match self.forward_request(leader_node, origin, request_seq, &op) {
                    Some(response) if response.leading => {
                        if let Some(result) = response.result {
                            return Ok(result);
                        }
                        continue;
                    }
                    _ => {
                        std::thread::sleep(Duration::from_millis(20));
                        continue;
                    }
                }
            }
        }
        Err(Error::RetriesExhausted)
    }

    fn forward_request(
        &self,
        leader: usize,
        origin: usize,
        request_seq: u64,
        op: &[u8],
    ) -> Option<ClientResponse> {
        let addr = self.config.address(leader);
        let timeout = Duration::from_secs(2);
        let mut result = None;
        self.pool.perform(addr, timeout, |stream| {
            stream.set_read_timeout(Some(timeout)).ok();
            stream.set_write_timeout(Some(timeout)).ok();
            if crate::codec::send_tag(stream, crate::message::Tag::Request).is_err() {
                return false;
            }
            let request = ClientRequest {
                origin,
                request_seq,
                op: op.to_vec(),
            };
            if crate::codec::send(stream, &request).is_err() {
                return false;
            }
            match crate::codec::receive::<ClientResponse>(stream) {
                Ok(response) => {
                    result = Some(response);
                    true
                }
                Err(_) => false,
            }
        });
        result
    }

    /// Allocates the next log slot for `op`, drives Accept against a
    /// majority, marks it chosen, broadcasts Success, then waits for the
    /// applier to deliver a result. Runs the network phases with the
    /// engine lock released (mirroring the leader loop's release/reacquire
    /// discipline), re-validating leadership each time the lock is
    /// reacquired.
    fn propose_and_wait(&self, origin: usize, request_seq: u64, op: Vec<u8>) -> Result<Vec<u8>> {
        let entry = Entry { origin, request_seq, op };
        let encoded = bincode::serialize(&entry)
            .map_err(|e| Error::Protocol(format!("failed to encode entry: {}", e)))?;

        let (index, term) = {
            let mut state = self.state.lock();
            if !(state.term.node() == self.self_id && state.leading) {
                return Err(Error::NotLeader {
                    leader_hint: Some(state.term.node()),
                });
            }
            let term = state.term;
            let index = state.log.allocate_next_slot();
            state.log.slot_mut(index).accept(term, encoded.clone());
            (index, term)
        };

        let peers: Vec<usize> = self.config.peer_ids().collect();
        if !self.accept_majority(term, index, &encoded, &peers) {
            return Err(Error::NotLeader {
                leader_hint: Some(self.current_term().node()),
            });
        }

        {
            let mut state = self.state.lock();
            if state.term != term {
                return Err(Error::NotLeader {
                    leader_hint: Some(state.term.node()),
                });
            }
            state.log.slot_mut(index).choose(encoded.clone());
        }
        self.heartbeat.notify_all();

        self.broadcast_success_for(term, index, &encoded, &peers);

        self.results
            .wait(origin, request_seq, Duration::from_secs(5))
            .ok_or(Error::RetriesExhausted)
    }

    fn accept_majority(
        &self,
        term: ProposalID,
        index: usize,
        value: &[u8],
        peers: &[usize],
    ) -> bool {
        let (tx, rx) = crossbeam_channel::unbounded();
        for &peer in peers {
            let tx = tx.clone();
            let addr = self.config.address(peer);
            let pool = self.pool.clone();
            let value = value.to_vec();
            let timeout = Duration::from_millis(200);
            std::thread::spawn(move || {
                let acked = Self::send_accept(&pool, addr, term, index, value, timeout);
                let _ = tx.send(acked);
            });
        }
        drop(tx);

        let mut acks = 1usize;
        for acked in rx.iter() {
            if acked {
                acks += 1;
            }
        }
        acks >= self.config.quorum()
    }

    fn send_accept(
        pool: &ConnectionPool,
        addr: SocketAddr,
        term: ProposalID,
        slot: usize,
        value: Vec<u8>,
        timeout: Duration,
    ) -> bool {
        let mut acked = false;
        pool.perform(addr, timeout, |stream| {
            stream.set_read_timeout(Some(timeout)).ok();
            stream.set_write_timeout(Some(timeout)).ok();
            if crate::codec::send_tag(stream, crate::message::Tag::Accept).is_err() {
                return false;
            }
            let request = AcceptRequest { term, slot, value };
            if crate::codec::send(stream, &request).is_err() {
                return false;
            }
            match crate::codec::receive::<AcceptResponse>(stream) {
                Ok(response) => {
                    acked = response.term <= term;
                    true
                }
                Err(_) => false,
            }
        });
        acked
    }

    fn broadcast_success_for(&self, term: ProposalID, index: usize, value: &[u8], peers: &[usize]) {
        for &peer in peers {
            let addr = self.config.address(peer);
            let pool = self.pool.clone();
            let value = value.to_vec();
            let timeout = Duration::from_millis(200);
            std::thread::spawn(move || {
                pool.perform(addr, timeout, move |stream| {
                    stream.set_read_timeout(Some(timeout)).ok();
                    stream.set_write_timeout(Some(timeout)).ok();
                    if crate::codec::send_tag(stream, crate::message::Tag::Success).is_err() {
                        return false;
                    }
                    let request = SuccessRequest {
                        term,
                        slot: index,
                        value,
                    };
                    if crate::codec::send(stream, &request).is_err() {
                        return false;
                    }
                    crate::codec::receive::<SuccessResponse>(stream).is_ok()
                });
            });
        }
    }

    // --- RPC handlers -----------------------------------------------------

    pub fn handle_vote(&self, request: VoteRequest) -> VoteResponse {
        let mut state = self.state.lock();
        let old_term = state.term;
        if old_term < request.candidate_term {
            state.term = request.candidate_term;
            state.leading = false;
            state.heartbeat_seen = true;
            self.heartbeat.notify_all();
            debug!("node {} granting term {} to {}", self.self_id, request.candidate_term, request.candidate_term.node());
        }
        VoteResponse { term: old_term }
    }

    pub fn handle_prepare(&self, request: PrepareRequest) -> PrepareResponse {
        let mut state = self.state.lock();
        self.observe_leader_rpc(&mut state, request.term);
        let accepted = state
            .log
            .get(request.slot)
            .and_then(|slot| slot.accepted())
            .map(|(proposal, value)| (proposal, value.to_vec()));
        let next_unaccepted = state.log.first_unaccepted_from(request.slot);
        PrepareResponse {
            term: state.term,
            accepted,
            next_unaccepted,
        }
    }

    pub fn handle_accept(&self, request: AcceptRequest) -> AcceptResponse {
        let mut state = self.state.lock();
        self.observe_leader_rpc(&mut state, request.term);
        let current = state.term;
        if request.term >= current {
            state.log.slot_mut(request.slot).accept(request.term, request.value);
        }
        AcceptResponse { term: current }
    }

    pub fn handle_success(&self, request: SuccessRequest) -> SuccessResponse {
        let mut state = self.state.lock();
        self.observe_leader_rpc(&mut state, request.term);
        if request.slot != HEARTBEAT_SLOT && request.term >= state.term {
            state.log.slot_mut(request.slot).choose(request.value);
        }
        SuccessResponse { ack: true }
    }

    pub fn handle_client_request(&self, request: ClientRequest) -> ClientResponse {
        let am_leader = {
            let state = self.state.lock();
            state.term.node() == self.self_id && state.leading
        };
        if !am_leader {
            return ClientResponse {
                leading: false,
                result: None,
            };
        }
        match self.propose_and_wait(request.origin, request.request_seq, request.op) {
            Ok(result) => ClientResponse {
                leading: true,
                result: Some(result),
            },
            Err(_) => ClientResponse {
                leading: false,
                result: None,
            },
        }
    }

    /// A leader RPC (Prepare/Accept/Success) resets the follower's
    /// election timer whenever its term is at least as high as ours.
    fn observe_leader_rpc(&self, state: &mut EngineState, rpc_term: ProposalID) {
        if rpc_term > state.term {
            state.term = rpc_term;
            state.leading = false;
        }
        if rpc_term >= state.term {
            state.heartbeat_seen = true;
            self.heartbeat.notify_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    fn cluster_config(id: usize, count: usize) -> Configuration {
        let peers: Vec<SocketAddr> = (0..count)
            .map(|i| format!("127.0.0.1:{}", 31000 + i).parse().unwrap())
            .collect();
        Configuration::new(peers, id).unwrap()
    }

    fn engine(id: usize, count: usize) -> Engine {
        let pool = Arc::new(ConnectionPool::new(Duration::from_secs(30), Duration::from_secs(5)));
        let results = Arc::new(ResultTable::default());
        Engine::new(cluster_config(id, count), pool, results)
    }

    #[test]
    fn vote_grants_strictly_higher_term_and_reports_old() {
        let e = engine(0, 3);
        let candidate = ProposalID { round: 1, node: 1 };
        let response = e.handle_vote(VoteRequest { candidate_term: candidate });
        assert_eq!(response.term, ProposalID::initial(0));
        assert_eq!(e.current_term(), candidate);
    }

    #[test]
    fn vote_does_not_regress_on_lower_or_equal_term() {
        let e = engine(0, 3);
        e.state.lock().term = ProposalID { round: 5, node: 0 };
        let response = e.handle_vote(VoteRequest {
            candidate_term: ProposalID { round: 1, node: 1 },
        });
        assert_eq!(response.term, ProposalID { round: 5, node: 0 });
        assert_eq!(e.current_term(), ProposalID { round: 5, node: 0 });
    }

    #[test]
    fn observe_leader_rpc_steps_down_on_higher_term() {
        let e = engine(0, 3);
        e.state.lock().leading = true;
        let mut state = e.state.lock();
        e.observe_leader_rpc(&mut state, ProposalID { round: 9, node: 1 });
        assert!(!state.leading);
        assert_eq!(state.term, ProposalID { round: 9, node: 1 });
    }

    #[test]
    fn accept_records_value_for_current_term() {
        let e = engine(0, 3);
        let response = e.handle_accept(AcceptRequest {
            term: ProposalID::initial(0),
            slot: 0,
            value: b"v".to_vec(),
        });
        assert_eq!(response.term, ProposalID::initial(0));
        let state = e.state.lock();
        let (_, value) = state.log.get(0).unwrap().accepted().unwrap();
        assert_eq!(value, b"v");
    }

    #[test]
    fn accept_ignores_stale_term() {
        let e = engine(0, 3);
        e.state.lock().term = ProposalID { round: 5, node: 0 };
        e.handle_accept(AcceptRequest {
            term: ProposalID { round: 1, node: 1 },
            slot: 0,
            value: b"v".to_vec(),
        });
        assert!(e.state.lock().log.get(0).is_none());
    }

    #[test]
    fn success_chooses_slot_for_current_term() {
        let e = engine(0, 3);
        e.handle_success(SuccessRequest {
            term: ProposalID::initial(0),
            slot: 2,
            value: b"chosen".to_vec(),
        });
        assert!(e.state.lock().log.get(2).unwrap().is_chosen());
    }

    #[test]
    fn success_on_heartbeat_slot_touches_no_log_entry() {
        let e = engine(0, 3);
        let response = e.handle_success(SuccessRequest {
            term: ProposalID::initial(0),
            slot: HEARTBEAT_SLOT,
            value: Vec::new(),
        });
        assert!(response.ack);
        assert_eq!(e.state.lock().log.len(), 0);
    }

    #[test]
    fn client_request_reports_not_leading_when_not_leader() {
        let e = engine(1, 3);
        let response = e.handle_client_request(ClientRequest {
            origin: 1,
            request_seq: 0,
            op: b"x".to_vec(),
        });
        assert!(!response.leading);
    }

    #[test]
    fn prepare_response_reports_responders_own_term() {
        let e = engine(0, 3);
        e.state.lock().term = ProposalID { round: 5, node: 0 };
        let response = e.handle_prepare(PrepareRequest {
            term: ProposalID { round: 5, node: 0 },
            slot: 0,
        });
        assert_eq!(response.term, ProposalID { round: 5, node: 0 });
        assert!(response.accepted.is_none());
    }

    #[test]
    fn catch_up_log_is_trivially_safe_with_no_peers() {
        // A single-node "cluster" has no one to Prepare against; a fresh
        // leader's own log frontier is by definition virgin, so catch-up
        // must succeed immediately without any network round trip.
        let e = engine(0, 1);
        assert!(e.catch_up_log(ProposalID { round: 1, node: 0 }));
        assert_eq!(e.state.lock().log.len(), 0);
    }
}
