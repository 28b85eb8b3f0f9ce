//! The single event enum for everything observable about a run.
//!
//! Events are advisory: they stream over a broadcast channel for live
//! observation (CLI progress, dashboards, tests) and may be missed by late
//! subscribers. The persisted [`RunRecord`](crate::types::RunRecord) is
//! authoritative. Every variant carries a monotonic `seq` assigned by the
//! executor for total ordering.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "event_type")]
#[non_exhaustive]
pub enum RunEvent {
    RunStarted {
        seq: u64,
        run_id: String,
        workflow_id: String,
        input: Value,
        timestamp: DateTime<Utc>,
    },
    StepStarted {
        seq: u64,
        run_id: String,
        step: String,
        step_index: usize,
        timestamp: DateTime<Utc>,
    },
    StepCompleted {
        seq: u64,
        run_id: String,
        step: String,
        step_index: usize,
        output: Value,
        timestamp: DateTime<Utc>,
    },
    RunSuspended {
        seq: u64,
        run_id: String,
        step: String,
        payload: Value,
        timestamp: DateTime<Utc>,
    },
    RunResumed {
        seq: u64,
        run_id: String,
        step: String,
        timestamp: DateTime<Utc>,
    },
    RunCompleted {
        seq: u64,
        run_id: String,
        output: Value,
        timestamp: DateTime<Utc>,
    },
    RunBailed {
        seq: u64,
        run_id: String,
        payload: Value,
        timestamp: DateTime<Utc>,
    },
    RunFailed {
        seq: u64,
        run_id: String,
        error: String,
        timestamp: DateTime<Utc>,
    },
    /// Outcome of one scorer over one sampled (input, output) pair.
    ScoreRecorded {
        seq: u64,
        run_id: String,
        step: String,
        scorer: String,
        score: f64,
        rationale: String,
        timestamp: DateTime<Utc>,
    },
    /// Diagnostic event emitted by a step body via `StepCtx::emit`.
    StepEvent {
        seq: u64,
        run_id: String,
        step: String,
        name: String,
        data: Value,
        timestamp: DateTime<Utc>,
    },
}

impl RunEvent {
    /// Returns the sequence number of this event.
    pub fn seq(&self) -> u64 {
        match self {
            Self::RunStarted { seq, .. }
            | Self::StepStarted { seq, .. }
            | Self::StepCompleted { seq, .. }
            | Self::RunSuspended { seq, .. }
            | Self::RunResumed { seq, .. }
            | Self::RunCompleted { seq, .. }
            | Self::RunBailed { seq, .. }
            | Self::RunFailed { seq, .. }
            | Self::ScoreRecorded { seq, .. }
            | Self::StepEvent { seq, .. } => *seq,
        }
    }

    /// Returns the run this event belongs to.
    pub fn run_id(&self) -> &str {
        match self {
            Self::RunStarted { run_id, .. }
            | Self::StepStarted { run_id, .. }
            | Self::StepCompleted { run_id, .. }
            | Self::RunSuspended { run_id, .. }
            | Self::RunResumed { run_id, .. }
            | Self::RunCompleted { run_id, .. }
            | Self::RunBailed { run_id, .. }
            | Self::RunFailed { run_id, .. }
            | Self::ScoreRecorded { run_id, .. }
            | Self::StepEvent { run_id, .. } => run_id,
        }
    }
}
