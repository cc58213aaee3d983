//! Bounded retry with exponential backoff for transient store failures.
//!
//! Writes carry the full assessment field set, so replaying one after a
//! transient failure is always safe.

use super::RecordStore;
use crate::{
    error::EngineResult,
    types::{CustomerId, FieldMap},
};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first. Always >= 1.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    /// Retry `max_attempts` times without sleeping. Used in tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Delay before the attempt following `failed_attempt` (1-based).
    pub fn backoff_for(&self, failed_attempt: u32) -> Duration {
        let shift = failed_attempt.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(1u32 << shift)
            .min(self.max_backoff)
    }
}

pub struct RetryingStore<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: RecordStore> RetryingStore<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    fn with_retry<T>(
        &self,
        op: &'static str,
        mut call: impl FnMut() -> EngineResult<T>,
    ) -> EngineResult<T> {
        let mut attempt = 1;
        loop {
            match call() {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.policy.max_attempts => {
                    let delay = self.policy.backoff_for(attempt);
                    log::debug!(
                        "{op} failed (attempt {attempt}/{}): {e}; retrying in {delay:?}",
                        self.policy.max_attempts
                    );
                    if !delay.is_zero() {
                        std::thread::sleep(delay);
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl<S: RecordStore> RecordStore for RetryingStore<S> {
    fn list_identifiers(&self) -> EngineResult<Vec<CustomerId>> {
        self.with_retry("list_identifiers", || self.inner.list_identifiers())
    }

    fn read_fields(&self, id: &str) -> EngineResult<Option<FieldMap>> {
        self.with_retry("read_fields", || self.inner.read_fields(id))
    }

    fn write_fields(&self, id: &str, fields: &[(String, String)]) -> EngineResult<bool> {
        self.with_retry("write_fields", || self.inner.write_fields(id, fields))
    }
}
