//! Per-run key/value state shared by every step of one run.
//!
//! Append/overwrite only — there is no removal operation. The state is
//! owned by the executor, snapshotted into the [`RunRecord`](crate::types::RunRecord)
//! after every step, and never shared across runs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Versioned field map for a single run. The version is a monotonic write
/// counter, bumped on every `set`, so a persisted snapshot can be compared
/// against a later one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RunState {
    values: BTreeMap<String, Value>,
    version: u64,
}

impl RunState {
    /// A fresh, empty state. Created when a run starts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a field. Returns `None` when the field was never written.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    /// Write a field, creating or overwriting it. Every write bumps the
    /// version counter.
    pub fn set(&mut self, field: &str, value: Value) {
        self.values.insert(field.to_string(), value);
        self.version += 1;
    }

    /// Number of writes applied over the lifetime of this state.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// All fields, in deterministic key order.
    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }
}
