//! Shared primitive types used across the engine.

use std::collections::HashMap;

/// One full pass of the scan loop. Cycle 1 is the first scan.
pub type Cycle = u64;

/// A stable, unique customer identifier as held by the store.
pub type CustomerId = String;

/// Raw field/value pairs for one record, exactly as the store holds them.
pub type FieldMap = HashMap<String, String>;

/// Timestamp layout shared with the dashboard and outreach collaborators.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
