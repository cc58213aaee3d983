//! Customer snapshot: the behavioural fields the evaluator reads.
//!
//! RULE: Parsing never fails. A field that is absent, unparsable or
//! negative falls back to its default (or is clamped to zero) and the
//! remaining fields are still read.

use crate::types::FieldMap;
use serde::{Deserialize, Serialize};
use std::num::IntErrorKind;

pub const FIELD_TXN_COUNT: &str = "txn_count";
pub const FIELD_WITHDRAWALS: &str = "withdrawals";
pub const FIELD_SALARY_COUNT: &str = "salary_count";
pub const FIELD_TOTAL_SPEND: &str = "total_spend";
pub const FIELD_ESSENTIAL_SPEND: &str = "essential_spend";
pub const FIELD_DISCRETIONARY_SPEND: &str = "discretionary_spend";
pub const FIELD_LAST_SALARY_TS: &str = "last_salary_ts";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomerSnapshot {
    pub txn_count: u64,
    pub withdrawals: u64,
    pub salary_count: u64,
    pub total_spend: f64,
    pub essential_spend: f64,
    pub discretionary_spend: f64,
    pub last_salary_ts: String,
}

/// A field whose stored text could not be read as its expected type.
/// Recovered locally by substituting the default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldParseError {
    pub field: &'static str,
    pub raw: String,
}

impl std::fmt::Display for FieldParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "field '{}' has unparsable value {:?}", self.field, self.raw)
    }
}

impl CustomerSnapshot {
    /// Build a snapshot from raw store fields.
    ///
    /// Returns the snapshot plus every field that had to fall back to its
    /// default. Unknown fields (including prior assessment fields) are ignored.
    pub fn from_fields(fields: &FieldMap) -> (Self, Vec<FieldParseError>) {
        let mut issues = Vec::new();
        let snapshot = Self {
            txn_count: read_count(fields, FIELD_TXN_COUNT, &mut issues),
            withdrawals: read_count(fields, FIELD_WITHDRAWALS, &mut issues),
            salary_count: read_count(fields, FIELD_SALARY_COUNT, &mut issues),
            total_spend: read_amount(fields, FIELD_TOTAL_SPEND, &mut issues),
            essential_spend: read_amount(fields, FIELD_ESSENTIAL_SPEND, &mut issues),
            discretionary_spend: read_amount(fields, FIELD_DISCRETIONARY_SPEND, &mut issues),
            last_salary_ts: fields
                .get(FIELD_LAST_SALARY_TS)
                .map(|s| s.trim().to_string())
                .unwrap_or_default(),
        };
        (snapshot, issues)
    }

    /// Render as raw store fields. Used by feeders and tests that load data.
    pub fn to_fields(&self) -> Vec<(String, String)> {
        vec![
            (FIELD_TXN_COUNT.into(), self.txn_count.to_string()),
            (FIELD_WITHDRAWALS.into(), self.withdrawals.to_string()),
            (FIELD_SALARY_COUNT.into(), self.salary_count.to_string()),
            (FIELD_TOTAL_SPEND.into(), self.total_spend.to_string()),
            (FIELD_ESSENTIAL_SPEND.into(), self.essential_spend.to_string()),
            (FIELD_DISCRETIONARY_SPEND.into(), self.discretionary_spend.to_string()),
            (FIELD_LAST_SALARY_TS.into(), self.last_salary_ts.clone()),
        ]
    }
}

/// Non-negative integer field. Negative integers clamp to 0 and integers
/// past `u64::MAX` saturate; anything that is not an integer (including
/// "3.5") is a parse failure.
fn read_count(fields: &FieldMap, name: &'static str, issues: &mut Vec<FieldParseError>) -> u64 {
    let Some(raw) = fields.get(name) else { return 0 };
    let text = raw.trim();
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    match digits.parse::<u64>() {
        Ok(_) if negative => 0,
        Ok(v) => v,
        Err(e) if *e.kind() == IntErrorKind::PosOverflow => {
            if negative {
                0
            } else {
                u64::MAX
            }
        }
        Err(_) => {
            issues.push(FieldParseError { field: name, raw: raw.clone() });
            0
        }
    }
}

/// Non-negative decimal field. NaN and infinities count as unparsable.
fn read_amount(fields: &FieldMap, name: &'static str, issues: &mut Vec<FieldParseError>) -> f64 {
    let Some(raw) = fields.get(name) else { return 0.0 };
    match raw.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => v.max(0.0),
        _ => {
            issues.push(FieldParseError { field: name, raw: raw.clone() });
            0.0
        }
    }
}
