//! The executor — drives workflow definitions over durable run records.
//!
//! Each run is an independent sequential state machine: steps execute in
//! order, never overlapping, with the run record persisted after every
//! transition. A step may suspend the run (awaiting an external resume),
//! bail it early, or fail it. Distinct runs execute concurrently; the run
//! record store is the only shared mutable resource and access is
//! serialized per run id.

pub(crate) mod run;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex, RwLock};

use crate::defaults::InMemoryRunStore;
use crate::errors::RunStoreError;
use crate::events::RunEvent;
use crate::scoring::ScoreSampler;
use crate::shape::ValidationError;
use crate::traits::{DataProducer, DecisionUnit, RunRecordStore, Scorer};
use crate::types::{RunHandle, RunStatus};
use crate::workflow::WorkflowDef;

/// Capacity of the advisory event channel. Late or slow subscribers may
/// miss events; the run record is authoritative.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors returned to the immediate caller of `start`/`resume`.
///
/// A step body failure is not among them: it terminates the offending run
/// (status `Failed`) and is reported through the returned [`RunHandle`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ExecutorError {
    /// The workflow id is not registered with this executor.
    #[error("workflow not registered: {workflow_id}")]
    WorkflowNotFound { workflow_id: String },
    /// `resume` was called with an unknown run id.
    #[error("run not found: {run_id}")]
    RunNotFound { run_id: String },
    /// `resume` was called on a run that is not currently suspended.
    #[error("run {run_id} is not suspended (status: {status:?})")]
    InvalidState { run_id: String, status: RunStatus },
    /// A step declares a collaborator the executor was not given.
    #[error("step `{step}` requires collaborator `{name}`, which is not registered")]
    CollaboratorNotFound { step: String, name: String },
    /// An input or resume value failed its declared shape.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("run store error: {0}")]
    Store(#[from] RunStoreError),
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Assembles an [`Executor`]: workflow definitions, the run record store,
/// and the collaborator handles step bodies may declare a need for.
pub struct ExecutorBuilder {
    workflows: HashMap<String, Arc<WorkflowDef>>,
    store: Option<Arc<dyn RunRecordStore>>,
    producers: HashMap<String, Arc<dyn DataProducer>>,
    units: HashMap<String, Arc<dyn DecisionUnit>>,
    sampler: ScoreSampler,
}

impl ExecutorBuilder {
    fn new() -> Self {
        Self {
            workflows: HashMap::new(),
            store: None,
            producers: HashMap::new(),
            units: HashMap::new(),
            sampler: ScoreSampler::default(),
        }
    }

    /// Register a workflow definition under its id. A later registration
    /// with the same id silently overrides.
    pub fn workflow(mut self, workflow: WorkflowDef) -> Self {
        self.workflows
            .insert(workflow.id().to_string(), Arc::new(workflow));
        self
    }

    /// Set the run record store. Defaults to [`InMemoryRunStore`].
    pub fn run_store(mut self, store: impl RunRecordStore + 'static) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    /// Register a data producer under its source name.
    pub fn producer(mut self, producer: impl DataProducer + 'static) -> Self {
        let producer: Arc<dyn DataProducer> = Arc::new(producer);
        self.producers
            .insert(producer.source().to_string(), producer);
        self
    }

    /// Register a decision unit under its name.
    pub fn unit(mut self, unit: impl DecisionUnit + 'static) -> Self {
        let unit: Arc<dyn DecisionUnit> = Arc::new(unit);
        self.units.insert(unit.name().to_string(), unit);
        self
    }

    /// Attach a scorer to the evaluation harness.
    pub fn scorer(mut self, scorer: impl Scorer + 'static) -> Self {
        self.sampler = self.sampler.scorer(scorer);
        self
    }

    /// Sampling ratio for the evaluation harness, clamped to `[0.0, 1.0]`.
    /// Defaults to 0 (scoring disabled).
    pub fn score_sampling(mut self, rate: f64) -> Self {
        self.sampler = self.sampler.with_rate(rate);
        self
    }

    pub fn build(self) -> Executor {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Executor {
            workflows: self.workflows,
            store: self
                .store
                .unwrap_or_else(|| Arc::new(InMemoryRunStore::new())),
            producers: Arc::new(self.producers),
            units: Arc::new(self.units),
            sampler: self.sampler,
            event_tx,
            seq: Arc::new(AtomicU64::new(0)),
            run_locks: Mutex::new(HashMap::new()),
            cancelled: RwLock::new(HashSet::new()),
        }
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

/// The assembled engine runtime. Owns the run record store and the
/// collaborator handles; exclusively owns mutation of run records.
pub struct Executor {
    workflows: HashMap<String, Arc<WorkflowDef>>,
    store: Arc<dyn RunRecordStore>,
    pub(crate) producers: Arc<HashMap<String, Arc<dyn DataProducer>>>,
    pub(crate) units: Arc<HashMap<String, Arc<dyn DecisionUnit>>>,
    pub(crate) sampler: ScoreSampler,
    pub(crate) event_tx: broadcast::Sender<RunEvent>,
    pub(crate) seq: Arc<AtomicU64>,
    /// Per-run locks serializing concurrent resume calls.
    run_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    /// Runs flagged for cancellation, consumed at the next advance.
    cancelled: RwLock<HashSet<String>>,
}

impl Executor {
    /// Create a new [`ExecutorBuilder`].
    pub fn builder() -> ExecutorBuilder {
        ExecutorBuilder::new()
    }

    /// Access the run record store (read-only use by callers).
    pub fn run_store(&self) -> &Arc<dyn RunRecordStore> {
        &self.store
    }

    /// Subscribe to the advisory event stream for all runs of this
    /// executor. Late subscribers miss earlier events.
    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.event_tx.subscribe()
    }

    /// Start a run of a registered workflow.
    ///
    /// The input is validated against the workflow's input shape first; on
    /// failure no run record is created. Otherwise the run advances until
    /// it completes, suspends, bails, or fails, persisting the record after
    /// every transition.
    pub async fn start(&self, workflow_id: &str, input: Value) -> Result<RunHandle, ExecutorError> {
        let workflow = self.workflow(workflow_id)?;
        self.check_collaborators(&workflow)?;

        let normalized = workflow.input_shape().validate(&input)?;

        let mut record =
            crate::types::RunRecord::new(workflow.id(), workflow.fingerprint(), normalized.clone());
        tracing::info!(run_id = %record.run_id, workflow_id = %workflow.id(), "run started");
        self.emit(|seq| RunEvent::RunStarted {
            seq,
            run_id: record.run_id.clone(),
            workflow_id: workflow.id().to_string(),
            input: normalized,
            timestamp: chrono::Utc::now(),
        });
        self.store.save(&record).await?;

        run::advance(self, &workflow, &mut record, None).await?;
        Ok(RunHandle::from_record(&record))
    }

    /// Resume a suspended run with the value its awaiting step asked for.
    ///
    /// Fails with [`ExecutorError::RunNotFound`] for an unknown run id and
    /// [`ExecutorError::InvalidState`] when the run is not suspended —
    /// including when a concurrent resume won the race. The resume value is
    /// validated against the awaiting step's resume shape before the run is
    /// touched.
    pub async fn resume(&self, run_id: &str, resume_value: Value) -> Result<RunHandle, ExecutorError> {
        // One resume at a time per run id; the loser re-loads and sees a
        // non-suspended status.
        let lock = self.run_lock(run_id).await;
        let _guard = lock.lock().await;

        let mut record = self
            .store
            .load(run_id)
            .await?
            .ok_or_else(|| ExecutorError::RunNotFound {
                run_id: run_id.to_string(),
            })?;

        if record.status != RunStatus::Suspended {
            return Err(ExecutorError::InvalidState {
                run_id: run_id.to_string(),
                status: record.status,
            });
        }

        let workflow = self.workflow(&record.workflow_id)?;
        let meta = workflow.meta(record.step_index);
        let normalized = match &meta.resume {
            Some(shape) => shape.validate(&resume_value)?,
            None => resume_value,
        };

        record.status = RunStatus::Running;
        record.suspension = None;
        record.touch();
        tracing::info!(run_id = %record.run_id, step = %meta.name, "run resumed");
        self.emit(|seq| RunEvent::RunResumed {
            seq,
            run_id: record.run_id.clone(),
            step: meta.name.clone(),
            timestamp: chrono::Utc::now(),
        });
        self.store.save(&record).await?;

        run::advance(self, &workflow, &mut record, Some(normalized)).await?;
        Ok(RunHandle::from_record(&record))
    }

    /// Flag a run for cancellation. The flag is consumed by the executor's
    /// pre-advance check, so a step already executing runs to completion and
    /// the run then terminates as bailed. A no-op for runs that never
    /// advance again.
    pub async fn cancel(&self, run_id: &str) {
        self.cancelled.write().await.insert(run_id.to_string());
        tracing::debug!(run_id = %run_id, "cancellation requested");
    }

    fn workflow(&self, workflow_id: &str) -> Result<Arc<WorkflowDef>, ExecutorError> {
        self.workflows
            .get(workflow_id)
            .cloned()
            .ok_or_else(|| ExecutorError::WorkflowNotFound {
                workflow_id: workflow_id.to_string(),
            })
    }

    /// Every collaborator a step declares must be registered before any run
    /// of the workflow starts.
    fn check_collaborators(&self, workflow: &WorkflowDef) -> Result<(), ExecutorError> {
        for meta in workflow.metas() {
            for name in &meta.requires {
                if !self.producers.contains_key(name) && !self.units.contains_key(name) {
                    return Err(ExecutorError::CollaboratorNotFound {
                        step: meta.name.clone(),
                        name: name.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    pub(crate) fn emit(&self, make: impl FnOnce(u64) -> RunEvent) {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let _ = self.event_tx.send(make(seq));
    }

    pub(crate) async fn save(&self, record: &crate::types::RunRecord) -> Result<(), ExecutorError> {
        self.store.save(record).await?;
        Ok(())
    }

    /// Collaborator maps narrowed to what the step's meta declared. An
    /// undeclared lookup inside the step body fails even when the executor
    /// holds the handle.
    pub(crate) fn scoped_producers(
        &self,
        meta: &crate::traits::StepMeta,
    ) -> Arc<HashMap<String, Arc<dyn DataProducer>>> {
        let scoped: HashMap<String, Arc<dyn DataProducer>> = meta
            .requires
            .iter()
            .filter_map(|name| {
                self.producers
                    .get(name)
                    .map(|p| (name.clone(), Arc::clone(p)))
            })
            .collect();
        Arc::new(scoped)
    }

    pub(crate) fn scoped_units(
        &self,
        meta: &crate::traits::StepMeta,
    ) -> Arc<HashMap<String, Arc<dyn DecisionUnit>>> {
        let scoped: HashMap<String, Arc<dyn DecisionUnit>> = meta
            .requires
            .iter()
            .filter_map(|name| self.units.get(name).map(|u| (name.clone(), Arc::clone(u))))
            .collect();
        Arc::new(scoped)
    }

    /// Feed one sampled (input, output) pair to every scorer and record the
    /// outcomes as events. Never affects control flow.
    pub(crate) fn record_scores(
        &self,
        record: &crate::types::RunRecord,
        step: &str,
        input: &Value,
        output: &Value,
    ) {
        if !self.sampler.should_sample() {
            return;
        }
        let input_text = input.to_string();
        let output_text = output.to_string();
        for (scorer, outcome) in self.sampler.score_all(&input_text, &output_text) {
            tracing::debug!(
                run_id = %record.run_id,
                step = %step,
                scorer = %scorer,
                score = outcome.score,
                "score recorded"
            );
            self.emit(|seq| RunEvent::ScoreRecorded {
                seq,
                run_id: record.run_id.clone(),
                step: step.to_string(),
                scorer,
                score: outcome.score,
                rationale: outcome.rationale,
                timestamp: chrono::Utc::now(),
            });
        }
    }

    pub(crate) async fn take_cancelled(&self, run_id: &str) -> bool {
        self.cancelled.write().await.remove(run_id)
    }

    pub(crate) async fn clear_cancelled(&self, run_id: &str) {
        self.cancelled.write().await.remove(run_id);
    }

    async fn run_lock(&self, run_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.run_locks.lock().await;
        Arc::clone(
            locks
                .entry(run_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    use crate::errors::StepError;
    use crate::shape::{FieldDef, FieldType, Shape};
    use crate::step_ctx::StepCtx;
    use crate::traits::{RunFilter, ScoreOutcome, Scorer, StepHandler, StepMeta, StepOutcome};

    // -- Mock step handlers -------------------------------------------------

    /// Outputs a fixed value regardless of input.
    struct FixedOutputStep {
        name: &'static str,
        output: Value,
        output_shape: Shape,
    }

    #[async_trait]
    impl StepHandler for FixedOutputStep {
        fn meta(&self) -> StepMeta {
            StepMeta {
                name: self.name.to_string(),
                description: String::new(),
                input: Shape::empty("in"),
                output: self.output_shape.clone(),
                resume: None,
                suspend: None,
                requires: vec![],
            }
        }

        async fn execute(&self, _input: Value, _ctx: &StepCtx) -> Result<StepOutcome, StepError> {
            Ok(StepOutcome::Output(self.output.clone()))
        }
    }

    /// Writes a run-state field, then passes its input through.
    struct WriteStateStep {
        name: &'static str,
        field: &'static str,
        value: Value,
    }

    #[async_trait]
    impl StepHandler for WriteStateStep {
        fn meta(&self) -> StepMeta {
            StepMeta {
                name: self.name.to_string(),
                description: String::new(),
                input: Shape::empty("in"),
                output: Shape::empty("out"),
                resume: None,
                suspend: None,
                requires: vec![],
            }
        }

        async fn execute(&self, input: Value, ctx: &StepCtx) -> Result<StepOutcome, StepError> {
            ctx.state_set(self.field, self.value.clone()).await;
            Ok(StepOutcome::Output(input))
        }
    }

    /// Reads a run-state field and outputs it.
    struct ReadStateStep {
        name: &'static str,
        field: &'static str,
    }

    #[async_trait]
    impl StepHandler for ReadStateStep {
        fn meta(&self) -> StepMeta {
            StepMeta {
                name: self.name.to_string(),
                description: String::new(),
                input: Shape::empty("in"),
                output: Shape::object("out").field("seen", FieldDef::any()),
                resume: None,
                suspend: None,
                requires: vec![],
            }
        }

        async fn execute(&self, _input: Value, ctx: &StepCtx) -> Result<StepOutcome, StepError> {
            let seen = ctx
                .state_get(self.field)
                .await
                .ok_or_else(|| StepError::fatal(format!("state field `{}` missing", self.field)))?;
            Ok(StepOutcome::Output(json!({ "seen": seen })))
        }
    }

    /// Suspends with an options payload until a `{choice: int}` resume
    /// value arrives, then outputs the choice.
    struct ChoiceStep;

    #[async_trait]
    impl StepHandler for ChoiceStep {
        fn meta(&self) -> StepMeta {
            StepMeta {
                name: "choose".to_string(),
                description: "await an external choice".to_string(),
                input: Shape::empty("in"),
                output: Shape::object("out").field("choice", FieldDef::integer()),
                resume: Some(Shape::object("choose_resume").field("choice", FieldDef::integer())),
                suspend: Some(
                    Shape::object("choose_suspend")
                        .field("options", FieldDef::array(FieldType::String)),
                ),
                requires: vec![],
            }
        }

        async fn execute(&self, _input: Value, ctx: &StepCtx) -> Result<StepOutcome, StepError> {
            match ctx.resume_value() {
                None => Ok(StepOutcome::Suspend(json!({"options": ["a", "b", "c"]}))),
                Some(v) => Ok(StepOutcome::Output(json!({"choice": v["choice"]}))),
            }
        }
    }

    /// Bails with a fixed payload.
    struct BailStep;

    #[async_trait]
    impl StepHandler for BailStep {
        fn meta(&self) -> StepMeta {
            StepMeta {
                name: "bail".to_string(),
                description: String::new(),
                input: Shape::empty("in"),
                output: Shape::empty("out"),
                resume: None,
                suspend: None,
                requires: vec![],
            }
        }

        async fn execute(&self, _input: Value, _ctx: &StepCtx) -> Result<StepOutcome, StepError> {
            Ok(StepOutcome::Bail(json!({"reason": "rejected"})))
        }
    }

    /// Always fails.
    struct FailingStep;

    #[async_trait]
    impl StepHandler for FailingStep {
        fn meta(&self) -> StepMeta {
            StepMeta {
                name: "failing".to_string(),
                description: String::new(),
                input: Shape::empty("in"),
                output: Shape::empty("out"),
                resume: None,
                suspend: None,
                requires: vec![],
            }
        }

        async fn execute(&self, _input: Value, _ctx: &StepCtx) -> Result<StepOutcome, StepError> {
            Err(StepError::fatal("permanent failure"))
        }
    }

    /// Sleeps, then passes input through. Used to race cancellation against
    /// an executing step.
    struct SlowStep {
        name: &'static str,
        delay_ms: u64,
    }

    #[async_trait]
    impl StepHandler for SlowStep {
        fn meta(&self) -> StepMeta {
            StepMeta {
                name: self.name.to_string(),
                description: String::new(),
                input: Shape::empty("in"),
                output: Shape::empty("out"),
                resume: None,
                suspend: None,
                requires: vec![],
            }
        }

        async fn execute(&self, input: Value, _ctx: &StepCtx) -> Result<StepOutcome, StepError> {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
            Ok(StepOutcome::Output(input))
        }
    }

    fn x_shape() -> Shape {
        Shape::object("x_out").field("x", FieldDef::integer())
    }

    // -- Scenario A: single step completes ----------------------------------

    #[tokio::test]
    async fn single_step_run_completes() {
        let workflow = WorkflowDef::builder("one-step")
            .output_shape(x_shape())
            .step(FixedOutputStep {
                name: "a",
                output: json!({"x": 1}),
                output_shape: x_shape(),
            })
            .build()
            .unwrap();
        let executor = Executor::builder().workflow(workflow).build();

        let handle = executor.start("one-step", json!({})).await.unwrap();
        assert_eq!(handle.status, RunStatus::Completed);
        assert_eq!(handle.result, Some(json!({"x": 1})));

        let record = executor
            .run_store()
            .load(&handle.run_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.status, RunStatus::Completed);
    }

    // -- Scenario B: suspend then resume ------------------------------------

    #[tokio::test]
    async fn suspend_and_resume_to_completion() {
        let workflow = WorkflowDef::builder("select")
            .output_shape(Shape::object("out").field("choice", FieldDef::integer()))
            .step(FixedOutputStep {
                name: "a",
                output: json!({}),
                output_shape: Shape::empty("a_out"),
            })
            .step(ChoiceStep)
            .build()
            .unwrap();
        let executor = Executor::builder().workflow(workflow).build();

        let handle = executor.start("select", json!({})).await.unwrap();
        assert_eq!(handle.status, RunStatus::Suspended);
        let suspension = handle.suspension.expect("suspend payload");
        assert_eq!(suspension.step, "choose");
        assert_eq!(suspension.payload, json!({"options": ["a", "b", "c"]}));

        let before = executor
            .run_store()
            .load(&handle.run_id)
            .await
            .unwrap()
            .unwrap()
            .step_index;

        let resumed = executor
            .resume(&handle.run_id, json!({"choice": 1}))
            .await
            .unwrap();
        assert_eq!(resumed.status, RunStatus::Completed);
        assert_eq!(resumed.result, Some(json!({"choice": 1})));

        // Monotonic progress: never regresses past the suspension point.
        let after = executor
            .run_store()
            .load(&handle.run_id)
            .await
            .unwrap()
            .unwrap()
            .step_index;
        assert!(after >= before);
    }

    // -- Scenario C: bail ----------------------------------------------------

    #[tokio::test]
    async fn bail_skips_remaining_steps_and_blocks_resume() {
        let workflow = WorkflowDef::builder("bails")
            .step(BailStep)
            .step(FixedOutputStep {
                name: "never-reached",
                output: json!({"x": 1}),
                output_shape: x_shape(),
            })
            .build()
            .unwrap();
        let executor = Executor::builder().workflow(workflow).build();

        let handle = executor.start("bails", json!({})).await.unwrap();
        assert_eq!(handle.status, RunStatus::Bailed);
        assert_eq!(handle.result, Some(json!({"reason": "rejected"})));

        let err = executor
            .resume(&handle.run_id, json!({"choice": 0}))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutorError::InvalidState { .. }));
    }

    // -- Scenario D: invalid input creates no record -------------------------

    #[tokio::test]
    async fn invalid_input_creates_no_record() {
        let workflow = WorkflowDef::builder("validated")
            .input_shape(
                Shape::object("in")
                    .field("date_range", FieldDef::string())
                    .field("budget", FieldDef::number().min(0.0)),
            )
            .step(FixedOutputStep {
                name: "a",
                output: json!({"x": 1}),
                output_shape: x_shape(),
            })
            .build()
            .unwrap();
        let executor = Executor::builder().workflow(workflow).build();

        let err = executor
            .start("validated", json!({"budget": -10}))
            .await
            .unwrap_err();
        match err {
            ExecutorError::Validation(e) => {
                let fields: Vec<&str> = e.violations.iter().map(|v| v.field.as_str()).collect();
                assert!(fields.contains(&"date_range"));
                assert!(fields.contains(&"budget"));
            }
            other => panic!("expected Validation, got: {other}"),
        }

        let runs = executor
            .run_store()
            .list(&RunFilter::default())
            .await
            .unwrap();
        assert!(runs.is_empty(), "no record may exist after failed validation");
    }

    // -- State visibility ----------------------------------------------------

    #[tokio::test]
    async fn state_written_by_step_i_visible_to_step_i_plus_1() {
        let workflow = WorkflowDef::builder("stateful")
            .output_shape(Shape::object("out").field("seen", FieldDef::any()))
            .step(WriteStateStep {
                name: "writer",
                field: "campaign_name",
                value: json!("Spring launch"),
            })
            .step(ReadStateStep {
                name: "reader",
                field: "campaign_name",
            })
            .build()
            .unwrap();
        let executor = Executor::builder().workflow(workflow).build();

        let handle = executor.start("stateful", json!({})).await.unwrap();
        assert_eq!(handle.status, RunStatus::Completed);
        assert_eq!(handle.result, Some(json!({"seen": "Spring launch"})));
    }

    #[tokio::test]
    async fn state_survives_suspension() {
        let workflow = WorkflowDef::builder("stateful-suspend")
            .output_shape(Shape::object("out").field("seen", FieldDef::any()))
            .step(WriteStateStep {
                name: "writer",
                field: "plan",
                value: json!("the plan"),
            })
            .step(ChoiceStep)
            .step(ReadStateStep {
                name: "reader",
                field: "plan",
            })
            .build()
            .unwrap();
        let executor = Executor::builder().workflow(workflow).build();

        let handle = executor.start("stateful-suspend", json!({})).await.unwrap();
        assert_eq!(handle.status, RunStatus::Suspended);

        let resumed = executor
            .resume(&handle.run_id, json!({"choice": 0}))
            .await
            .unwrap();
        assert_eq!(resumed.status, RunStatus::Completed);
        assert_eq!(resumed.result, Some(json!({"seen": "the plan"})));
    }

    // -- Failure -------------------------------------------------------------

    #[tokio::test]
    async fn step_failure_is_terminal_for_the_run_only() {
        let workflow = WorkflowDef::builder("fails")
            .step(FailingStep)
            .build()
            .unwrap();
        let ok_workflow = WorkflowDef::builder("ok")
            .output_shape(x_shape())
            .step(FixedOutputStep {
                name: "a",
                output: json!({"x": 1}),
                output_shape: x_shape(),
            })
            .build()
            .unwrap();
        let executor = Executor::builder()
            .workflow(workflow)
            .workflow(ok_workflow)
            .build();

        let handle = executor.start("fails", json!({})).await.unwrap();
        assert_eq!(handle.status, RunStatus::Failed);
        assert!(handle.error.unwrap().contains("permanent failure"));

        // The engine keeps serving other runs.
        let ok = executor.start("ok", json!({})).await.unwrap();
        assert_eq!(ok.status, RunStatus::Completed);
    }

    #[tokio::test]
    async fn failed_run_cannot_be_resumed() {
        let workflow = WorkflowDef::builder("fails")
            .step(FailingStep)
            .build()
            .unwrap();
        let executor = Executor::builder().workflow(workflow).build();

        let handle = executor.start("fails", json!({})).await.unwrap();
        let err = executor.resume(&handle.run_id, json!({})).await.unwrap_err();
        assert!(matches!(
            err,
            ExecutorError::InvalidState {
                status: RunStatus::Failed,
                ..
            }
        ));
    }

    // -- Resume edge cases ---------------------------------------------------

    #[tokio::test]
    async fn resume_unknown_run_id() {
        let workflow = WorkflowDef::builder("w").step(ChoiceStep).build().unwrap();
        let executor = Executor::builder().workflow(workflow).build();

        let err = executor
            .resume("no-such-run", json!({"choice": 0}))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutorError::RunNotFound { .. }));
    }

    #[tokio::test]
    async fn invalid_resume_value_leaves_run_suspended() {
        let workflow = WorkflowDef::builder("select")
            .output_shape(Shape::object("out").field("choice", FieldDef::integer()))
            .step(ChoiceStep)
            .build()
            .unwrap();
        let executor = Executor::builder().workflow(workflow).build();

        let handle = executor.start("select", json!({})).await.unwrap();
        assert_eq!(handle.status, RunStatus::Suspended);

        let err = executor
            .resume(&handle.run_id, json!({"choice": "not an int"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutorError::Validation(_)));

        // Still suspended; a valid retry succeeds.
        let record = executor
            .run_store()
            .load(&handle.run_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.status, RunStatus::Suspended);

        let resumed = executor
            .resume(&handle.run_id, json!({"choice": 2}))
            .await
            .unwrap();
        assert_eq!(resumed.status, RunStatus::Completed);
    }

    #[tokio::test]
    async fn concurrent_resumes_are_serialized() {
        let workflow = WorkflowDef::builder("select")
            .output_shape(Shape::object("out").field("choice", FieldDef::integer()))
            .step(ChoiceStep)
            .build()
            .unwrap();
        let executor = Arc::new(Executor::builder().workflow(workflow).build());

        let handle = executor.start("select", json!({})).await.unwrap();
        assert_eq!(handle.status, RunStatus::Suspended);

        let (a, b) = tokio::join!(
            executor.resume(&handle.run_id, json!({"choice": 0})),
            executor.resume(&handle.run_id, json!({"choice": 1})),
        );

        let outcomes = [a, b];
        let winners = outcomes.iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1, "exactly one resume may win");
        let loser = outcomes.iter().find(|r| r.is_err()).unwrap();
        assert!(matches!(
            loser.as_ref().unwrap_err(),
            ExecutorError::InvalidState { .. }
        ));
    }

    // -- Cancellation --------------------------------------------------------

    #[tokio::test]
    async fn cancel_between_steps_bails_the_run() {
        let workflow = WorkflowDef::builder("slow")
            .step(SlowStep {
                name: "slow-1",
                delay_ms: 200,
            })
            .step(SlowStep {
                name: "slow-2",
                delay_ms: 0,
            })
            .build()
            .unwrap();
        let executor = Arc::new(Executor::builder().workflow(workflow).build());

        let mut events = executor.subscribe();
        let task = {
            let executor = Arc::clone(&executor);
            tokio::spawn(async move { executor.start("slow", json!({})).await })
        };

        // Wait for the run id, then cancel while slow-1 is still executing.
        let run_id = loop {
            match events.recv().await.unwrap() {
                RunEvent::RunStarted { run_id, .. } => break run_id,
                _ => continue,
            }
        };
        executor.cancel(&run_id).await;

        let handle = task.await.unwrap().unwrap();
        assert_eq!(handle.status, RunStatus::Bailed);
        assert_eq!(handle.result, Some(json!({"reason": "cancelled"})));
    }

    #[tokio::test]
    async fn cancel_after_completion_is_a_noop() {
        let workflow = WorkflowDef::builder("one-step")
            .output_shape(x_shape())
            .step(FixedOutputStep {
                name: "a",
                output: json!({"x": 1}),
                output_shape: x_shape(),
            })
            .build()
            .unwrap();
        let executor = Executor::builder().workflow(workflow).build();

        let handle = executor.start("one-step", json!({})).await.unwrap();
        executor.cancel(&handle.run_id).await;

        let record = executor
            .run_store()
            .load(&handle.run_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.status, RunStatus::Completed);
    }

    // -- Malformed output ----------------------------------------------------

    #[tokio::test]
    async fn malformed_step_output_fails_the_run() {
        let workflow = WorkflowDef::builder("bad-output")
            .output_shape(x_shape())
            .step(FixedOutputStep {
                name: "a",
                output: json!({"x": "not an integer"}),
                output_shape: x_shape(),
            })
            .build()
            .unwrap();
        let executor = Executor::builder().workflow(workflow).build();

        let handle = executor.start("bad-output", json!({})).await.unwrap();
        assert_eq!(handle.status, RunStatus::Failed);
        assert!(handle.error.unwrap().contains("invalid output"));
    }

    // -- Collaborator declarations -------------------------------------------

    #[tokio::test]
    async fn undeclared_collaborator_is_rejected_before_any_record() {
        struct NeedsProducer;

        #[async_trait]
        impl StepHandler for NeedsProducer {
            fn meta(&self) -> StepMeta {
                StepMeta {
                    name: "needs-producer".to_string(),
                    description: String::new(),
                    input: Shape::empty("in"),
                    output: Shape::empty("out"),
                    resume: None,
                    suspend: None,
                    requires: vec!["channel_analytics".to_string()],
                }
            }

            async fn execute(
                &self,
                input: Value,
                _ctx: &StepCtx,
            ) -> Result<StepOutcome, StepError> {
                Ok(StepOutcome::Output(input))
            }
        }

        let workflow = WorkflowDef::builder("w").step(NeedsProducer).build().unwrap();
        let executor = Executor::builder().workflow(workflow).build();

        let err = executor.start("w", json!({})).await.unwrap_err();
        assert!(matches!(err, ExecutorError::CollaboratorNotFound { .. }));
        let runs = executor
            .run_store()
            .list(&RunFilter::default())
            .await
            .unwrap();
        assert!(runs.is_empty());
    }

    // -- Events and scoring --------------------------------------------------

    #[tokio::test]
    async fn events_carry_monotonic_seq() {
        let workflow = WorkflowDef::builder("two-step")
            .step(SlowStep {
                name: "s1",
                delay_ms: 0,
            })
            .step(SlowStep {
                name: "s2",
                delay_ms: 0,
            })
            .build()
            .unwrap();
        let executor = Executor::builder().workflow(workflow).build();

        let mut events = executor.subscribe();
        executor.start("two-step", json!({})).await.unwrap();

        let mut seqs = Vec::new();
        while let Ok(event) = events.try_recv() {
            seqs.push(event.seq());
        }
        assert!(seqs.len() >= 4, "start, steps, completion: got {seqs:?}");
        assert!(seqs.windows(2).all(|w| w[0] < w[1]), "seq not monotonic: {seqs:?}");
    }

    #[tokio::test]
    async fn scorers_record_without_affecting_outcome() {
        struct AlwaysHalf;

        impl Scorer for AlwaysHalf {
            fn name(&self) -> &str {
                "always-half"
            }

            fn score(&self, _input: &str, _output: &str) -> ScoreOutcome {
                ScoreOutcome {
                    score: 0.5,
                    rationale: "fixed".to_string(),
                }
            }
        }

        let workflow = WorkflowDef::builder("scored")
            .output_shape(x_shape())
            .step(FixedOutputStep {
                name: "a",
                output: json!({"x": 1}),
                output_shape: x_shape(),
            })
            .build()
            .unwrap();
        let executor = Executor::builder()
            .workflow(workflow)
            .scorer(AlwaysHalf)
            .score_sampling(1.0)
            .build();

        let mut events = executor.subscribe();
        let handle = executor.start("scored", json!({})).await.unwrap();
        assert_eq!(handle.status, RunStatus::Completed);

        let mut scored = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let RunEvent::ScoreRecorded { scorer, score, .. } = event {
                scored.push((scorer, score));
            }
        }
        assert_eq!(scored, vec![("always-half".to_string(), 0.5)]);
    }
}
