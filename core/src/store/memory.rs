//! In-process record store. Used by tests and demo runs.

use super::RecordStore;
use crate::{
    error::{EngineError, EngineResult},
    snapshot::CustomerSnapshot,
    types::{CustomerId, FieldMap},
};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<CustomerId, FieldMap>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> EngineResult<MutexGuard<'_, HashMap<CustomerId, FieldMap>>> {
        self.records
            .lock()
            .map_err(|_| EngineError::StoreUnavailable("record map mutex poisoned".into()))
    }

    /// Upsert fields, creating the record if needed.
    pub fn put_fields(&self, id: &str, fields: &[(String, String)]) -> EngineResult<()> {
        let mut records = self.records()?;
        let record = records.entry(id.to_string()).or_default();
        for (field, value) in fields {
            record.insert(field.clone(), value.clone());
        }
        Ok(())
    }

    pub fn put_snapshot(&self, id: &str, snapshot: &CustomerSnapshot) -> EngineResult<()> {
        self.put_fields(id, &snapshot.to_fields())
    }

    pub fn remove_record(&self, id: &str) -> EngineResult<bool> {
        Ok(self.records()?.remove(id).is_some())
    }

    /// A copy of one record's fields, if present.
    pub fn fields(&self, id: &str) -> EngineResult<Option<FieldMap>> {
        Ok(self.records()?.get(id).cloned())
    }

    pub fn len(&self) -> usize {
        self.records().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RecordStore for MemoryStore {
    fn list_identifiers(&self) -> EngineResult<Vec<CustomerId>> {
        Ok(self.records()?.keys().cloned().collect())
    }

    fn read_fields(&self, id: &str) -> EngineResult<Option<FieldMap>> {
        Ok(self.records()?.get(id).filter(|f| !f.is_empty()).cloned())
    }

    fn write_fields(&self, id: &str, fields: &[(String, String)]) -> EngineResult<bool> {
        let mut records = self.records()?;
        let Some(record) = records.get_mut(id) else {
            return Ok(false);
        };
        for (field, value) in fields {
            record.insert(field.clone(), value.clone());
        }
        Ok(true)
    }
}
