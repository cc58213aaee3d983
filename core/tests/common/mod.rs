//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use equilibrate_core::{
    error::{EngineError, EngineResult},
    snapshot::CustomerSnapshot,
    store::{MemoryStore, RecordStore},
    types::{CustomerId, FieldMap},
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Mutex;
use std::time::Duration;

/// Remaining failures per id. `usize::MAX` means fail forever.
type FailureBudget = Mutex<HashMap<String, usize>>;

/// A memory store with injectable faults.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    list_failures: AtomicUsize,
    read_failures: FailureBudget,
    write_failures: FailureBudget,
    remove_after_read: Mutex<HashSet<String>>,
    read_delay: Mutex<Option<Duration>>,
    first_read_tx: Mutex<Option<Sender<()>>>,
    pub read_calls: AtomicUsize,
    pub write_calls: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_customers(customers: &[(&str, CustomerSnapshot)]) -> Self {
        let store = Self::new();
        for (id, snapshot) in customers {
            store.inner.put_snapshot(id, snapshot).unwrap();
        }
        store
    }

    /// The next `n` enumerations fail with a transient error.
    pub fn fail_list(&self, n: usize) {
        self.list_failures.store(n, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, id: &str, n: usize) {
        self.read_failures.lock().unwrap().insert(id.to_string(), n);
    }

    pub fn fail_writes(&self, id: &str, n: usize) {
        self.write_failures.lock().unwrap().insert(id.to_string(), n);
    }

    /// Delete the record right after it is read, before the write lands.
    pub fn remove_after_read(&self, id: &str) {
        self.remove_after_read.lock().unwrap().insert(id.to_string());
    }

    pub fn slow_reads(&self, delay: Duration) {
        *self.read_delay.lock().unwrap() = Some(delay);
    }

    /// Notify `tx` once, when the first read starts.
    pub fn notify_first_read(&self, tx: Sender<()>) {
        *self.first_read_tx.lock().unwrap() = Some(tx);
    }

    fn take_failure(budget: &FailureBudget, id: &str) -> bool {
        let mut budget = budget.lock().unwrap();
        match budget.get_mut(id) {
            Some(0) | None => false,
            Some(n) if *n == usize::MAX => true,
            Some(n) => {
                *n -= 1;
                true
            }
        }
    }
}

fn transient(op: &'static str) -> EngineError {
    EngineError::StoreIo {
        op,
        detail: "connection reset".into(),
    }
}

impl RecordStore for FlakyStore {
    fn list_identifiers(&self) -> EngineResult<Vec<CustomerId>> {
        let remaining = self.list_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.list_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(transient("list_identifiers"));
        }
        self.inner.list_identifiers()
    }

    fn read_fields(&self, id: &str) -> EngineResult<Option<FieldMap>> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(tx) = self.first_read_tx.lock().unwrap().take() {
            let _ = tx.send(());
        }
        let delay = *self.read_delay.lock().unwrap();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        if Self::take_failure(&self.read_failures, id) {
            return Err(transient("read_fields"));
        }
        let fields = self.inner.read_fields(id)?;
        if self.remove_after_read.lock().unwrap().contains(id) {
            self.inner.remove_record(id)?;
        }
        Ok(fields)
    }

    fn write_fields(&self, id: &str, fields: &[(String, String)]) -> EngineResult<bool> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.write_failures, id) {
            return Err(transient("write_fields"));
        }
        self.inner.write_fields(id, fields)
    }
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn snapshot(
    salary_count: u64,
    withdrawals: u64,
    essential_spend: f64,
    discretionary_spend: f64,
    txn_count: u64,
) -> CustomerSnapshot {
    CustomerSnapshot {
        salary_count,
        withdrawals,
        essential_spend,
        discretionary_spend,
        txn_count,
        ..Default::default()
    }
}
