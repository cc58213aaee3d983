//! The scan loop: keeps every stored assessment fresh.
//!
//! STATES: IDLE (waiting for the next tick) and SCANNING (one cycle).
//!
//! PER CYCLE (fixed, documented, never reordered):
//!   1. Enumerate identifiers once. Failure aborts the cycle only.
//!   2. For each identifier, on the bounded worker pool:
//!        read snapshot -> evaluate -> write assessment.
//!   3. Aggregate per-record outcomes into one CycleReport and log it.
//!
//! RULES:
//!   - Cycles never overlap: the next one starts only after every record
//!     of the current one has finished.
//!   - A failure on one record never affects the others.
//!   - Records added mid-cycle are picked up next cycle.
//!   - On shutdown, in-flight records finish; unstarted ones are skipped.

use crate::{
    clock::ScanClock,
    config::EngineConfig,
    error::{EngineError, EngineResult},
    evaluator,
    report::{CycleOutcome, CycleReport, RecordOutcome},
    shutdown::ShutdownSignal,
    store::RecordStore,
    types::Cycle,
};
use chrono::Local;
use rayon::prelude::*;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use uuid::Uuid;

pub struct ScanLoop<S: RecordStore> {
    pub instance_id: Uuid,
    pub clock: ScanClock,
    store: S,
    pool: rayon::ThreadPool,
    signal: ShutdownSignal,
    subscribers: Vec<Sender<CycleOutcome>>,
}

impl<S: RecordStore> ScanLoop<S> {
    /// Build a loop that owns `store`. The store is released when the loop
    /// is dropped.
    pub fn new(store: S, config: &EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.concurrency)
            .thread_name(|i| format!("risk-worker-{i}"))
            .build()
            .map_err(|e| EngineError::Other(anyhow::anyhow!("worker pool: {e}")))?;
        Ok(Self {
            instance_id: Uuid::new_v4(),
            clock: ScanClock::new(config.tick_interval(), config.tick_policy),
            store,
            pool,
            signal: ShutdownSignal::new(),
            subscribers: Vec::new(),
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// A handle that stops this loop when triggered.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.signal.clone()
    }

    /// Receive every cycle outcome from now on.
    pub fn subscribe(&mut self) -> Receiver<CycleOutcome> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    /// Run exactly one cycle now, ignoring the schedule.
    pub fn run_cycle(&mut self) -> CycleOutcome {
        let cycle = self.clock.advance();
        let started_at = Local::now().naive_local();
        let started = Instant::now();

        let mut ids = match self.store.list_identifiers() {
            Ok(ids) => ids,
            Err(e) => {
                let outcome = CycleOutcome::Aborted {
                    instance_id: self.instance_id,
                    cycle,
                    at: started_at,
                    reason: e.to_string(),
                };
                log::warn!("{outcome}");
                self.publish(&outcome);
                return outcome;
            }
        };
        // At most one in-flight evaluation per identifier.
        ids.sort_unstable();
        ids.dedup();

        let mut report = CycleReport::new(self.instance_id, cycle, started_at);
        report.population = ids.len();

        let store = &self.store;
        let signal = &self.signal;
        let outcomes: Vec<RecordOutcome> = self.pool.install(|| {
            ids.par_iter()
                .map(|id| {
                    if signal.is_triggered() {
                        RecordOutcome::NotStarted
                    } else {
                        process_record(store, id)
                    }
                })
                .collect()
        });
        for outcome in outcomes {
            report.record(outcome);
        }
        report.duration_ms = started.elapsed().as_millis() as u64;

        log::info!("{report}");
        let outcome = CycleOutcome::Completed(report);
        self.publish(&outcome);
        outcome
    }

    /// Run up to `n` cycles on the tick schedule, returning their outcomes.
    /// Stops early if shutdown is requested. Does not wait after the last one.
    pub fn run_cycles(&mut self, n: u64) -> Vec<CycleOutcome> {
        let mut outcomes = Vec::new();
        for i in 0..n {
            if self.signal.is_triggered() {
                break;
            }
            let started = Instant::now();
            outcomes.push(self.run_cycle());
            if i + 1 < n && self.idle_until_next_tick(started) {
                break;
            }
        }
        outcomes
    }

    /// Run until shutdown is requested. Returns the number of cycles run.
    pub fn run(&mut self) -> Cycle {
        log::info!(
            "scan loop {} started: interval {:?}, policy {:?}, workers {}",
            self.instance_id,
            self.clock.interval,
            self.clock.policy,
            self.pool.current_num_threads()
        );
        let first = self.clock.current_cycle;
        while !self.signal.is_triggered() {
            let started = Instant::now();
            self.run_cycle();
            if self.idle_until_next_tick(started) {
                break;
            }
        }
        let ran = self.clock.current_cycle - first;
        log::info!("scan loop {} stopped after {ran} cycles", self.instance_id);
        ran
    }

    /// IDLE state. Returns true if shutdown interrupted the wait.
    fn idle_until_next_tick(&self, scan_started: Instant) -> bool {
        let next = self.clock.next_scan_at(scan_started, Instant::now());
        self.signal.wait_until(next)
    }

    fn publish(&mut self, outcome: &CycleOutcome) {
        self.subscribers.retain(|tx| tx.send(outcome.clone()).is_ok());
    }
}

impl<S: RecordStore + 'static> ScanLoop<S> {
    /// Move the loop onto its own thread.
    pub fn spawn(self) -> EngineResult<ScanLoopHandle> {
        let signal = self.signal.clone();
        let mut scan = self;
        let (done_tx, done_rx) = mpsc::channel();
        let join = thread::Builder::new()
            .name("scan-loop".into())
            .spawn(move || {
                let cycles = scan.run();
                drop(scan);
                let _ = done_tx.send(cycles);
            })
            .map_err(|e| EngineError::Other(anyhow::anyhow!("spawn scan loop: {e}")))?;
        Ok(ScanLoopHandle {
            signal,
            done_rx,
            join,
        })
    }
}

/// Read, evaluate and write back one record.
fn process_record<S: RecordStore>(store: &S, id: &str) -> RecordOutcome {
    let snapshot = match store.read_snapshot(id) {
        Ok(Some(snapshot)) => snapshot,
        Ok(None) => {
            log::debug!("customer {id}: no stored fields, skipped");
            return RecordOutcome::Absent;
        }
        Err(e) => {
            log::warn!("customer {id}: read failed: {e}");
            return RecordOutcome::Failed;
        }
    };

    let assessment = evaluator::evaluate(&snapshot);
    match store.write_assessment(id, &assessment) {
        Ok(true) => RecordOutcome::Assessed {
            level: assessment.risk_level,
            hardship: assessment.hardship_type,
        },
        Ok(false) => {
            log::debug!("customer {id}: removed before write, skipped");
            RecordOutcome::Vanished
        }
        Err(e) => {
            log::warn!("customer {id}: write failed: {e}");
            RecordOutcome::Failed
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// The loop finished its in-flight cycle and released the store.
    Drained { cycles: Cycle },
    /// The loop did not stop in time and was left to finish on its own.
    TimedOut,
    /// The loop thread panicked.
    Panicked,
}

pub struct ScanLoopHandle {
    signal: ShutdownSignal,
    done_rx: Receiver<Cycle>,
    join: JoinHandle<()>,
}

impl ScanLoopHandle {
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.signal.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Request shutdown and wait up to `timeout` for the loop to drain.
    pub fn shutdown(self, timeout: Duration) -> ShutdownOutcome {
        self.signal.trigger();
        match self.done_rx.recv_timeout(timeout) {
            Ok(cycles) => {
                let _ = self.join.join();
                ShutdownOutcome::Drained { cycles }
            }
            Err(RecvTimeoutError::Timeout) => {
                log::warn!("scan loop did not drain within {timeout:?}, abandoning it");
                ShutdownOutcome::TimedOut
            }
            Err(RecvTimeoutError::Disconnected) => {
                let _ = self.join.join();
                log::error!("scan loop thread exited without reporting");
                ShutdownOutcome::Panicked
            }
        }
    }
}
