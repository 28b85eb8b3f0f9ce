//! Plugin trait interfaces for the engine.
//!
//! Every pluggable component is defined as an async trait. Default store
//! implementations live in `defaults/`. Collaborators (data producers,
//! decision units) are injected into the executor at construction time and
//! handed to step bodies by declared name — there is no ambient registry.

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::{ProducerError, RunStoreError, StepError, UnitError};
use crate::shape::Shape;
use crate::step_ctx::StepCtx;
use crate::types::{RunRecord, RunStatus};

// ---------------------------------------------------------------------------
// StepHandler
// ---------------------------------------------------------------------------

/// Static metadata for a step: identity, declared shapes, and the
/// collaborators its body is allowed to look up.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub struct StepMeta {
    /// Unique within one workflow definition.
    pub name: String,
    pub description: String,
    pub input: Shape,
    pub output: Shape,
    /// Present iff the step can suspend and later be resumed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resume: Option<Shape>,
    /// Shape of the payload shown to the caller while suspended.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suspend: Option<Shape>,
    /// Names of the producers/units this step's body may request from its
    /// [`StepCtx`]. Checked against the executor's injected handles before
    /// any run starts.
    pub requires: Vec<String>,
}

/// What a step invocation produced. Errors travel separately as
/// [`StepError`] and fail the run.
#[derive(Debug, Clone)]
pub enum StepOutcome {
    /// Normal output, fed to the next step (or returned as the run result).
    Output(Value),
    /// Pause the run and present the payload to the external caller. The
    /// same step is re-entered when a resume value arrives.
    Suspend(Value),
    /// Terminate the run early with the payload, skipping remaining steps.
    Bail(Value),
}

/// One unit of work in a workflow. The engine calls `execute` with the
/// step's input and a [`StepCtx`] providing run-state access, the resume
/// value (when re-entered), and declared collaborator handles.
///
/// Steps with a resume shape must be re-entrant: a prior invocation may have
/// suspended, and the re-invocation receives the same input plus the resume
/// value — no partial work from the first pass is retained.
#[async_trait]
pub trait StepHandler: Send + Sync {
    /// Static metadata: name, shapes, required collaborators.
    fn meta(&self) -> StepMeta;

    /// Execute the step. Collaborator calls are not retried by the engine —
    /// retry policy, if any, belongs in the step body.
    async fn execute(&self, input: Value, ctx: &StepCtx) -> Result<StepOutcome, StepError>;
}

// ---------------------------------------------------------------------------
// RunRecordStore
// ---------------------------------------------------------------------------

/// Filter criteria for listing runs.
#[derive(Debug, Clone, Default)]
pub struct RunFilter {
    pub workflow_id: Option<String>,
    pub status: Option<RunStatus>,
}

/// Durable storage for run records, keyed by run id.
///
/// `save` must be atomic with respect to concurrent `load`s of the same run
/// id — no caller ever observes a half-written record.
#[async_trait]
pub trait RunRecordStore: Send + Sync {
    async fn load(&self, run_id: &str) -> Result<Option<RunRecord>, RunStoreError>;

    async fn save(&self, record: &RunRecord) -> Result<(), RunStoreError>;

    /// List records matching the filter, in deterministic run-id order.
    async fn list(&self, filter: &RunFilter) -> Result<Vec<RunRecord>, RunStoreError>;
}

// ---------------------------------------------------------------------------
// DataProducer
// ---------------------------------------------------------------------------

/// An analytic data source with a fixed, schema-validated response shape.
///
/// Fields that are unavailable for a query must be absent from the
/// response — never null or garbage.
#[async_trait]
pub trait DataProducer: Send + Sync + std::fmt::Debug {
    /// Logical source name steps use to request this producer.
    fn source(&self) -> &str;

    async fn fetch(&self, query: Value) -> Result<Value, ProducerError>;
}

// ---------------------------------------------------------------------------
// DecisionUnit
// ---------------------------------------------------------------------------

/// Context handed to a decision unit: the instruction text plus any
/// structured data the step wants the unit to consider.
#[derive(Debug, Clone)]
pub struct PromptContext {
    pub prompt: String,
    pub data: Value,
}

impl PromptContext {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            data: Value::Null,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }
}

/// An agent-like collaborator that turns a prompt context into text.
///
/// Treated as a blocking external call returning unstructured text; the
/// step body parses and validates it before producing typed output.
#[async_trait]
pub trait DecisionUnit: Send + Sync {
    /// Name steps use to request this unit.
    fn name(&self) -> &str;

    async fn generate(&self, context: PromptContext) -> Result<String, UnitError>;
}

// ---------------------------------------------------------------------------
// Scorer
// ---------------------------------------------------------------------------

/// A numeric judgment over one (input, output) pair.
#[derive(Debug, Clone)]
pub struct ScoreOutcome {
    /// In `[0.0, 1.0]`.
    pub score: f64,
    pub rationale: String,
}

/// Evaluation harness hook. Purely observational — outcomes are recorded as
/// events and never affect control flow.
pub trait Scorer: Send + Sync {
    fn name(&self) -> &str;

    fn score(&self, input_text: &str, output_text: &str) -> ScoreOutcome;
}
