//! Equilibrate risk engine core.
//!
//! Periodically re-evaluates every stored customer snapshot, assigns a risk
//! tier, score, hardship type and recommended action, and writes the result
//! back so downstream readers never recompute it.

pub mod assessment;
pub mod clock;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod population;
pub mod report;
pub mod rng;
pub mod scan_loop;
pub mod shutdown;
pub mod snapshot;
pub mod store;
pub mod types;

pub use assessment::{HardshipType, RiskAssessment, RiskLevel};
pub use config::{EngineConfig, TickPolicy};
pub use error::{EngineError, EngineResult};
pub use report::{CycleOutcome, CycleReport};
pub use scan_loop::{ScanLoop, ScanLoopHandle, ShutdownOutcome};
pub use snapshot::CustomerSnapshot;
pub use store::{MemoryStore, RecordStore, RetryPolicy, RetryingStore, SqliteStore};
