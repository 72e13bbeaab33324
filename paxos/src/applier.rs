//! # Summary
//!
//! This module defines the `Applier` trait library users implement to
//! plug their replicated data structure into the engine, and the applier
//! thread that drives it: a strictly sequential scan of the log applying
//! each chosen-but-unapplied slot in order, with per-origin exactly-once
//! filtering (§4.5).
//!
//! Results are delivered to whichever thread is blocked in `request()`
//! through a shared results table rather than a broadcast channel, since
//! several `request()` calls for distinct origins can be outstanding at
//! once and each must claim only its own answer.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::engine::EngineState;
use crate::logstore::Log;

/// Owns the replicated data structure and applies decoded operations to
/// it in log order. `apply` must be deterministic: every replica that
/// applies the same sequence of `op` bytes reaches the same state.
pub trait Applier: Send {
    fn apply(&mut self, op: &[u8]) -> Vec<u8>;
}

impl<F> Applier for F
where
    F: FnMut(&[u8]) -> Vec<u8> + Send,
{
    fn apply(&mut self, op: &[u8]) -> Vec<u8> {
        self(op)
    }
}

/// Results of applied operations, keyed by `(origin, request_seq)` so a
/// `request()` caller can pick its own answer out of a shared table.
#[derive(Default)]
pub struct ResultTable {
    results: Mutex<HashMap<(usize, u64), Vec<u8>>>,
    ready: Condvar,
}

impl ResultTable {
    pub fn deliver(&self, origin: usize, request_seq: u64, result: Vec<u8>) {
        self.results.lock().insert((origin, request_seq), result);
        self.ready.notify_all();
    }

    /// Blocks until `(origin, request_seq)` has a result or `deadline`
    /// elapses, whichever comes first.
    pub fn wait(&self, origin: usize, request_seq: u64, deadline: Duration) -> Option<Vec<u8>> {
        let mut results = self.results.lock();
        let key = (origin, request_seq);
        if let Some(result) = results.remove(&key) {
            return Some(result);
        }
        let timed_out = self.ready.wait_for(&mut results, deadline).timed_out();
        if timed_out {
            return results.remove(&key);
        }
        results.remove(&key)
    }
}

/// Drives the applier thread. Shares the engine's log and lock; never
/// touches the network.
pub struct ApplierThread {
    engine_lock: Arc<Mutex<EngineState>>,
    engine_cond: Arc<Condvar>,
    closing: Arc<Mutex<bool>>,
    results: Arc<ResultTable>,
}

impl ApplierThread {
    pub fn new(
        engine_lock: Arc<Mutex<EngineState>>,
        engine_cond: Arc<Condvar>,
        closing: Arc<Mutex<bool>>,
        results: Arc<ResultTable>,
    ) -> Self {
        ApplierThread {
            engine_lock,
            engine_cond,
            closing,
            results,
        }
    }

    pub fn run(&self, mut applier: Box<dyn Applier>) {
        let mut next_index = 0usize;
        let mut high_water: HashMap<usize, u64> = HashMap::new();

        loop {
            if *self.closing.lock() {
                return;
            }

            let ready = {
                let mut engine = self.engine_lock.lock();
                loop {
                    if *self.closing.lock() {
                        return;
                    }
                    match Self::next_ready(&engine.log, next_index) {
                        Some(entry) => break entry,
                        None => {
                            self.engine_cond
                                .wait_for(&mut engine, Duration::from_millis(100));
                        }
                    }
                }
            };
            let (accepted_value, origin, request_seq) = ready;

            let is_duplicate = high_water
                .get(&origin)
                .copied()
                .map_or(false, |seq| request_seq <= seq);

            let result = if is_duplicate {
                debug!("applier skipping duplicate origin={} seq={}", origin, request_seq);
                None
            } else {
                let result = applier.apply(&accepted_value);
                high_water.insert(origin, request_seq);
                Some(result)
            };

            {
                let mut engine = self.engine_lock.lock();
                engine.log.slot_mut(next_index).mark_applied();
            }

            if let Some(result) = result {
                self.results.deliver(origin, request_seq, result);
            }

            next_index += 1;
        }
    }

    /// If slot `index` is chosen and not yet applied, decode its entry
    /// and return `(op_bytes, origin, request_seq)`. Never looks past an
    /// unchosen slot.
    fn next_ready(log: &Log, index: usize) -> Option<(Vec<u8>, usize, u64)> {
        let slot = log.get(index)?;
        if !slot.is_chosen() || slot.is_applied() {
            return None;
        }
        let value = slot.chosen_value()?;
        let entry: crate::message::Entry = bincode::deserialize(value).ok()?;
        Some((entry.op, entry.origin, entry.request_seq))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::id::ProposalID;
    use crate::message::Entry;

    fn chosen_entry(origin: usize, request_seq: u64) -> Vec<u8> {
        bincode::serialize(&Entry {
            origin,
            request_seq,
            op: b"op".to_vec(),
        })
        .unwrap()
    }

    #[test]
    fn duplicate_origin_seq_is_applied_once() {
        let mut log = Log::new();
        let encoded = chosen_entry(1, 5);
        log.slot_mut(0).accept(ProposalID::initial(0), encoded.clone());
        log.slot_mut(0).choose(encoded.clone());
        // Same (origin, request_seq) again, as a client retry would replay.
        log.slot_mut(1).accept(ProposalID::initial(0), encoded.clone());
        log.slot_mut(1).choose(encoded);

        let state = Arc::new(Mutex::new(EngineState {
            term: ProposalID::initial(0),
            leading: false,
            log,
            heartbeat_seen: false,
        }));
        let heartbeat = Arc::new(Condvar::new());
        let closing = Arc::new(Mutex::new(false));
        let results = Arc::new(ResultTable::default());

        let driver = ApplierThread::new(state.clone(), heartbeat.clone(), closing.clone(), results);

        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();
        let applier: Box<dyn Applier> = Box::new(move |_op: &[u8]| {
            counted.fetch_add(1, Ordering::SeqCst);
            b"ok".to_vec()
        });

        let handle = std::thread::spawn(move || driver.run(applier));

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        loop {
            let applied = state
                .lock()
                .log
                .get(1)
                .map_or(false, |slot| slot.is_applied());
            if applied {
                break;
            }
            assert!(std::time::Instant::now() < deadline, "applier never caught up");
            std::thread::sleep(Duration::from_millis(10));
        }

        *closing.lock() = true;
        heartbeat.notify_all();
        handle.join().unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
