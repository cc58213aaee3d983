//! Record store adapters.
//!
//! RULE: Only the store module talks to the backing store.
//! The scan loop goes through `RecordStore` and never sees SQL or maps.
//!
//! A record is a flat set of string fields keyed by customer id. Snapshot
//! fields are written by upstream feeders; assessment fields are written by
//! the engine. Writes are additive per field and never drop fields they do
//! not name.

mod memory;
mod retry;
mod sqlite;

pub use memory::MemoryStore;
pub use retry::{RetryPolicy, RetryingStore};
pub use sqlite::SqliteStore;

use crate::{
    assessment::RiskAssessment,
    error::EngineResult,
    snapshot::CustomerSnapshot,
    types::{CustomerId, FieldMap},
};

/// The read/write contract the engine needs from a store.
pub trait RecordStore: Send + Sync {
    /// Every currently known customer id. Order is unspecified.
    fn list_identifiers(&self) -> EngineResult<Vec<CustomerId>>;

    /// All raw fields of one record, or `None` if the record has none.
    fn read_fields(&self, id: &str) -> EngineResult<Option<FieldMap>>;

    /// Upsert the given fields on an existing record.
    ///
    /// Returns `false` without writing if the record no longer exists.
    fn write_fields(&self, id: &str, fields: &[(String, String)]) -> EngineResult<bool>;

    /// Read and parse one snapshot. Parse issues are logged and defaulted.
    fn read_snapshot(&self, id: &str) -> EngineResult<Option<CustomerSnapshot>> {
        let Some(fields) = self.read_fields(id)? else {
            return Ok(None);
        };
        if fields.is_empty() {
            return Ok(None);
        }
        let (snapshot, issues) = CustomerSnapshot::from_fields(&fields);
        for issue in issues {
            log::debug!("customer {id}: {issue}, using default");
        }
        Ok(Some(snapshot))
    }

    /// Replace the assessment fields on a record.
    ///
    /// Returns `false` if the record vanished since it was read.
    fn write_assessment(&self, id: &str, assessment: &RiskAssessment) -> EngineResult<bool> {
        self.write_fields(id, &assessment.to_fields())
    }
}

impl<S: RecordStore + ?Sized> RecordStore for std::sync::Arc<S> {
    fn list_identifiers(&self) -> EngineResult<Vec<CustomerId>> {
        (**self).list_identifiers()
    }

    fn read_fields(&self, id: &str) -> EngineResult<Option<FieldMap>> {
        (**self).read_fields(id)
    }

    fn write_fields(&self, id: &str, fields: &[(String, String)]) -> EngineResult<bool> {
        (**self).write_fields(id, fields)
    }
}
