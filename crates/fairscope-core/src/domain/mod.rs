//! Domain models for fairscope.
//!
//! Canonical definitions for the pipeline records:
//! - `EvaluationRecord`: one labeled prediction with demographic attributes
//! - `Observation` / `GroupStat`: batch metadata and per-group rates
//! - `FairnessReport` / `Decision` / `ActionRecord`: cycle outputs

pub mod error;
pub mod record;
pub mod report;

pub use error::{FairnessError, Result};
pub use record::{
    ColumnType, EvaluationRecord, GroupCounts, GroupKey, GroupStat, Label, Observation,
};
pub use report::{ActionRecord, Decision, FairnessReport, Severity};
