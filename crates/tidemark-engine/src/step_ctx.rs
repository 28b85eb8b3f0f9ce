//! Runtime context given to every step invocation.
//!
//! Step authors interact with the engine exclusively through [`StepCtx`].
//! The executor constructs one per invocation — step code never creates one
//! directly. The context exposes only the collaborators the step's meta
//! declared in `requires`; an undeclared lookup is a fatal step error.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::{broadcast, Mutex};

use crate::errors::StepError;
use crate::events::RunEvent;
use crate::state::RunState;
use crate::traits::{DataProducer, DecisionUnit};

/// The runtime context for one step execution.
pub struct StepCtx {
    run_id: String,
    step_name: String,
    state: Arc<Mutex<RunState>>,
    resume_value: Option<Value>,
    producers: Arc<HashMap<String, Arc<dyn DataProducer>>>,
    units: Arc<HashMap<String, Arc<dyn DecisionUnit>>>,
    event_tx: broadcast::Sender<RunEvent>,
    seq: Arc<AtomicU64>,
}

impl StepCtx {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        run_id: String,
        step_name: String,
        state: Arc<Mutex<RunState>>,
        resume_value: Option<Value>,
        producers: Arc<HashMap<String, Arc<dyn DataProducer>>>,
        units: Arc<HashMap<String, Arc<dyn DecisionUnit>>>,
        event_tx: broadcast::Sender<RunEvent>,
        seq: Arc<AtomicU64>,
    ) -> Self {
        Self {
            run_id,
            step_name,
            state,
            resume_value,
            producers,
            units,
            event_tx,
            seq,
        }
    }

    /// The run this step execution belongs to.
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// The name of the step being executed.
    pub fn step_name(&self) -> &str {
        &self.step_name
    }

    /// Read a field from the run's shared state.
    pub async fn state_get(&self, field: &str) -> Option<Value> {
        self.state.lock().await.get(field).cloned()
    }

    /// Write a field to the run's shared state. Visible to this and every
    /// subsequent step of the run.
    pub async fn state_set(&self, field: &str, value: Value) {
        self.state.lock().await.set(field, value);
    }

    /// The resume value supplied by the external caller, present only when
    /// this invocation re-enters a previously suspended step.
    pub fn resume_value(&self) -> Option<&Value> {
        self.resume_value.as_ref()
    }

    /// Look up a declared data producer by source name. Returns a fatal
    /// error if the step did not declare it (or the executor has none) —
    /// a missing collaborator means the step cannot proceed.
    pub fn producer(&self, source: &str) -> Result<Arc<dyn DataProducer>, StepError> {
        self.producers.get(source).cloned().ok_or_else(|| {
            StepError::fatal(format!(
                "step `{}` requested undeclared producer `{source}`",
                self.step_name
            ))
        })
    }

    /// Look up a declared decision unit by name.
    pub fn unit(&self, name: &str) -> Result<Arc<dyn DecisionUnit>, StepError> {
        self.units.get(name).cloned().ok_or_else(|| {
            StepError::fatal(format!(
                "step `{}` requested undeclared unit `{name}`",
                self.step_name
            ))
        })
    }

    /// Emit a diagnostic event. Advisory — dropped when nobody subscribes.
    pub fn emit(&self, name: &str, data: Value) {
        let _ = self.event_tx.send(RunEvent::StepEvent {
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
            run_id: self.run_id.clone(),
            step: self.step_name.clone(),
            name: name.to_string(),
            data,
            timestamp: Utc::now(),
        });
    }
}

// ---------------------------------------------------------------------------
// Test support — public so downstream crates can use TestStepCtx in their
// step handler tests
// ---------------------------------------------------------------------------

#[cfg(any(test, feature = "test-support"))]
pub mod test_support {
    //! Utilities for building [`StepCtx`] instances in step handler tests.
    //!
    //! ```ignore
    //! let (ctx, inspector) = TestStepCtx::builder()
    //!     .run_id("test-run")
    //!     .step_name("select-campaign")
    //!     .resume_value(json!({"selected_index": 1}))
    //!     .build();
    //!
    //! my_step.execute(input, &ctx).await?;
    //!
    //! assert_eq!(inspector.state_snapshot().await.get("selected_idea"), ..);
    //! ```

    use std::collections::{BTreeMap, HashMap};
    use std::sync::atomic::AtomicU64;
    use std::sync::Arc;

    use serde_json::Value;
    use tokio::sync::{broadcast, Mutex};

    use crate::events::RunEvent;
    use crate::state::RunState;
    use crate::traits::{DataProducer, DecisionUnit};

    use super::StepCtx;

    /// Builder for constructing a [`StepCtx`] in tests.
    pub struct TestStepCtx {
        run_id: String,
        step_name: String,
        resume_value: Option<Value>,
        state: RunState,
        producers: HashMap<String, Arc<dyn DataProducer>>,
        units: HashMap<String, Arc<dyn DecisionUnit>>,
    }

    impl TestStepCtx {
        /// Start building a test `StepCtx`.
        pub fn builder() -> Self {
            Self {
                run_id: "test-run".to_string(),
                step_name: "test-step".to_string(),
                resume_value: None,
                state: RunState::new(),
                producers: HashMap::new(),
                units: HashMap::new(),
            }
        }

        pub fn run_id(mut self, run_id: &str) -> Self {
            self.run_id = run_id.to_string();
            self
        }

        pub fn step_name(mut self, step_name: &str) -> Self {
            self.step_name = step_name.to_string();
            self
        }

        /// Set the resume value the step will observe.
        pub fn resume_value(mut self, value: Value) -> Self {
            self.resume_value = Some(value);
            self
        }

        /// Seed a run-state field.
        pub fn state_field(mut self, field: &str, value: Value) -> Self {
            self.state.set(field, value);
            self
        }

        /// Register a data producer under its source name.
        pub fn producer(mut self, producer: Arc<dyn DataProducer>) -> Self {
            self.producers
                .insert(producer.source().to_string(), producer);
            self
        }

        /// Register a decision unit under its name.
        pub fn unit(mut self, unit: Arc<dyn DecisionUnit>) -> Self {
            self.units.insert(unit.name().to_string(), unit);
            self
        }

        /// Build the `StepCtx` and an inspector for verifying side effects.
        pub fn build(self) -> (StepCtx, TestStepCtxInspector) {
            let (event_tx, event_rx) = broadcast::channel::<RunEvent>(256);
            let state = Arc::new(Mutex::new(self.state));

            let ctx = StepCtx::new(
                self.run_id,
                self.step_name,
                Arc::clone(&state),
                self.resume_value,
                Arc::new(self.producers),
                Arc::new(self.units),
                event_tx,
                Arc::new(AtomicU64::new(0)),
            );

            let inspector = TestStepCtxInspector {
                state,
                event_rx: Mutex::new(event_rx),
            };

            (ctx, inspector)
        }
    }

    /// Inspect side effects produced by a step under test.
    pub struct TestStepCtxInspector {
        state: Arc<Mutex<RunState>>,
        event_rx: Mutex<broadcast::Receiver<RunEvent>>,
    }

    impl TestStepCtxInspector {
        /// Snapshot the current run state.
        pub async fn state_snapshot(&self) -> BTreeMap<String, Value> {
            let guard = self.state.lock().await;
            guard
                .fields()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        }

        /// Drain all events emitted so far.
        pub async fn emitted_events(&self) -> Vec<RunEvent> {
            let mut rx = self.event_rx.lock().await;
            let mut events = Vec::new();
            while let Ok(event) = rx.try_recv() {
                events.push(event);
            }
            events
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use test_support::{TestStepCtx, TestStepCtxInspector};
