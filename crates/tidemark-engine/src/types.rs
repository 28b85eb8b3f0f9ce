//! Run identity, records, and handles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::state::RunState;

/// Lifecycle status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum RunStatus {
    Running,
    Suspended,
    Completed,
    Bailed,
    Failed,
}

impl RunStatus {
    /// Terminal states accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Bailed | Self::Failed)
    }
}

/// The payload a suspended run presents to the external caller, plus the
/// step that must be re-entered on resume.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Suspension {
    pub step: String,
    pub payload: Value,
}

/// Durable record of one run: position, state snapshot, status, and the
/// terminal or pending payloads. The executor exclusively owns mutation;
/// external callers only read it through the store or a [`RunHandle`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RunRecord {
    pub run_id: String,
    pub workflow_id: String,
    /// Fingerprint of the definition this run was started against.
    pub fingerprint: String,
    pub status: RunStatus,
    /// Index of the step to execute next (or being awaited while suspended).
    pub step_index: usize,
    /// Input pending for the step at `step_index`. On resume the awaiting
    /// step re-receives exactly this value.
    pub step_input: Value,
    pub state: RunState,
    /// Present while `status` is `Suspended`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suspension: Option<Suspension>,
    /// Final output for `Completed`, terminal payload for `Bailed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Terminal error for `Failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RunRecord {
    /// A fresh record at step 0, status `Running`, empty state.
    pub fn new(workflow_id: &str, fingerprint: &str, step_input: Value) -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4().to_string(),
            workflow_id: workflow_id.to_string(),
            fingerprint: fingerprint.to_string(),
            status: RunStatus::Running,
            step_index: 0,
            step_input,
            state: RunState::new(),
            suspension: None,
            result: None,
            error: None,
            started_at: now,
            updated_at: now,
        }
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub(crate) fn suspend(&mut self, step: &str, payload: Value) {
        self.status = RunStatus::Suspended;
        self.suspension = Some(Suspension {
            step: step.to_string(),
            payload,
        });
        self.touch();
    }

    pub(crate) fn finish_completed(&mut self, output: Value) {
        self.status = RunStatus::Completed;
        self.suspension = None;
        self.result = Some(output);
        self.touch();
    }

    pub(crate) fn finish_bailed(&mut self, payload: Value) {
        self.status = RunStatus::Bailed;
        self.suspension = None;
        self.result = Some(payload);
        self.touch();
    }

    pub(crate) fn finish_failed(&mut self, error: String) {
        self.status = RunStatus::Failed;
        self.suspension = None;
        self.error = Some(error);
        self.touch();
    }
}

/// What `start` and `resume` return: the run's identity and everything the
/// caller may act on — the suspend payload, the final output, or the
/// terminal payload/error.
#[derive(Debug, Clone)]
pub struct RunHandle {
    pub run_id: String,
    pub status: RunStatus,
    pub result: Option<Value>,
    pub suspension: Option<Suspension>,
    pub error: Option<String>,
}

impl RunHandle {
    pub(crate) fn from_record(record: &RunRecord) -> Self {
        Self {
            run_id: record.run_id.clone(),
            status: record.status,
            result: record.result.clone(),
            suspension: record.suspension.clone(),
            error: record.error.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_record_is_running_at_step_zero() {
        let record = RunRecord::new("campaign-workflow", "abc123", json!({}));
        assert_eq!(record.status, RunStatus::Running);
        assert_eq!(record.step_index, 0);
        assert!(record.state.is_empty());
        assert!(!record.run_id.is_empty());
    }

    #[test]
    fn terminal_statuses() {
        assert!(!RunStatus::Running.is_terminal());
        assert!(!RunStatus::Suspended.is_terminal());
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Bailed.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
    }

    #[test]
    fn record_round_trips_through_json() {
        let mut record = RunRecord::new("wf", "fp", json!({"x": 1}));
        record.suspend("select-campaign", json!({"reason": "pick one"}));

        let text = serde_json::to_string(&record).unwrap();
        let back: RunRecord = serde_json::from_str(&text).unwrap();
        assert_eq!(back.status, RunStatus::Suspended);
        assert_eq!(back.suspension.unwrap().step, "select-campaign");
        assert_eq!(back.step_input, json!({"x": 1}));
    }
}
