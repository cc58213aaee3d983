//! Per-cycle aggregates: the engine's observability output.
//!
//! Every completed cycle yields one `CycleReport`; its `Display` form is the
//! single report line (cycle, time, population, per-tier counts).

use crate::{
    assessment::{HardshipType, RiskLevel},
    types::{Cycle, TIMESTAMP_FORMAT},
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// What happened to one identifier during a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Assessed { level: RiskLevel, hardship: HardshipType },
    /// The store held no fields for the id.
    Absent,
    /// The record disappeared between read and write.
    Vanished,
    /// Read or write failed after retries.
    Failed,
    /// Shutdown was requested before the record was picked up.
    NotStarted,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierCounts {
    pub low: usize,
    pub medium: usize,
    pub high: usize,
    pub critical: usize,
}

impl TierCounts {
    pub fn add(&mut self, level: RiskLevel) {
        match level {
            RiskLevel::Low => self.low += 1,
            RiskLevel::Medium => self.medium += 1,
            RiskLevel::High => self.high += 1,
            RiskLevel::Critical => self.critical += 1,
        }
    }

    pub fn get(&self, level: RiskLevel) -> usize {
        match level {
            RiskLevel::Low => self.low,
            RiskLevel::Medium => self.medium,
            RiskLevel::High => self.high,
            RiskLevel::Critical => self.critical,
        }
    }

    pub fn total(&self) -> usize {
        self.low + self.medium + self.high + self.critical
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardshipCounts {
    pub none: usize,
    pub income_shock: usize,
    pub liquidity_stress: usize,
    pub expense_compression: usize,
}

impl HardshipCounts {
    pub fn add(&mut self, hardship: HardshipType) {
        match hardship {
            HardshipType::None => self.none += 1,
            HardshipType::IncomeShock => self.income_shock += 1,
            HardshipType::LiquidityStress => self.liquidity_stress += 1,
            HardshipType::ExpenseCompression => self.expense_compression += 1,
        }
    }

    pub fn get(&self, hardship: HardshipType) -> usize {
        match hardship {
            HardshipType::None => self.none,
            HardshipType::IncomeShock => self.income_shock,
            HardshipType::LiquidityStress => self.liquidity_stress,
            HardshipType::ExpenseCompression => self.expense_compression,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    pub instance_id: Uuid,
    pub cycle: Cycle,
    pub started_at: NaiveDateTime,
    /// Identifiers enumerated at cycle start.
    pub population: usize,
    pub assessed: usize,
    pub tiers: TierCounts,
    pub hardship: HardshipCounts,
    /// Absent or vanished records. Not errors.
    pub skipped: usize,
    pub failed: usize,
    pub not_started: usize,
    pub duration_ms: u64,
}

impl CycleReport {
    pub fn new(instance_id: Uuid, cycle: Cycle, started_at: NaiveDateTime) -> Self {
        Self {
            instance_id,
            cycle,
            started_at,
            population: 0,
            assessed: 0,
            tiers: TierCounts::default(),
            hardship: HardshipCounts::default(),
            skipped: 0,
            failed: 0,
            not_started: 0,
            duration_ms: 0,
        }
    }

    pub fn record(&mut self, outcome: RecordOutcome) {
        match outcome {
            RecordOutcome::Assessed { level, hardship } => {
                self.assessed += 1;
                self.tiers.add(level);
                self.hardship.add(hardship);
            }
            RecordOutcome::Absent | RecordOutcome::Vanished => self.skipped += 1,
            RecordOutcome::Failed => self.failed += 1,
            RecordOutcome::NotStarted => self.not_started += 1,
        }
    }

    /// True if shutdown cut the cycle short.
    pub fn interrupted(&self) -> bool {
        self.not_started > 0
    }
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] Scan #{} | Customers: {} | CRITICAL: {} | HIGH: {} | MEDIUM: {} | LOW: {} | skipped: {} | failed: {} | {}ms",
            self.started_at.format(TIMESTAMP_FORMAT),
            self.cycle,
            self.population,
            self.tiers.critical,
            self.tiers.high,
            self.tiers.medium,
            self.tiers.low,
            self.skipped,
            self.failed,
            self.duration_ms,
        )?;
        if self.interrupted() {
            write!(f, " | interrupted, {} not started", self.not_started)?;
        }
        Ok(())
    }
}

/// The result of one tick of the scan loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CycleOutcome {
    Completed(CycleReport),
    /// The store could not be enumerated; nothing was evaluated.
    Aborted {
        instance_id: Uuid,
        cycle: Cycle,
        at: NaiveDateTime,
        reason: String,
    },
}

impl CycleOutcome {
    pub fn cycle(&self) -> Cycle {
        match self {
            CycleOutcome::Completed(r) => r.cycle,
            CycleOutcome::Aborted { cycle, .. } => *cycle,
        }
    }

    pub fn report(&self) -> Option<&CycleReport> {
        match self {
            CycleOutcome::Completed(r) => Some(r),
            CycleOutcome::Aborted { .. } => None,
        }
    }
}

impl fmt::Display for CycleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleOutcome::Completed(r) => r.fmt(f),
            CycleOutcome::Aborted { cycle, at, reason, .. } => write!(
                f,
                "[{}] Scan #{cycle} aborted: {reason}",
                at.format(TIMESTAMP_FORMAT)
            ),
        }
    }
}
