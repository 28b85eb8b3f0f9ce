//! Tidemark — durable, resumable step-workflow execution.
//!
//! This crate provides the types, traits, and runtime for running ordered
//! step sequences over shared per-run state, where any step may suspend the
//! run indefinitely awaiting external input, later resume with that input,
//! or bail the run early. Run position and state are persisted after every
//! transition, so a suspended run can be revived across process restarts
//! from the [`RunRecordStore`] alone.
//!
//! The engine is designed to be embedded in other applications and has zero
//! dependencies on web servers, databases, or other application-level
//! concerns.
//!
//! ```rust,ignore
//! let executor = Executor::builder()
//!     .workflow(campaign_workflow()?)
//!     .producer(ChannelAnalyticsProducer)
//!     .unit(CampaignStrategistUnit)
//!     .run_store(FileRunStore::new(data_dir)?)
//!     .build();
//!
//! let handle = executor.start("campaign-workflow", input).await?;
//! if handle.status == RunStatus::Suspended {
//!     // show handle.suspension to the caller, then:
//!     executor.resume(&handle.run_id, json!({"selected_index": 1})).await?;
//! }
//! ```

pub mod defaults;
pub mod errors;
pub mod events;
pub mod executor;
pub mod scoring;
pub mod shape;
pub mod state;
pub mod step_ctx;
pub mod traits;
pub mod types;
pub mod workflow;

// Re-export public types at the crate level.

// defaults
pub use defaults::{FileRunStore, InMemoryRunStore};

// errors
pub use errors::{DefinitionError, ProducerError, RunStoreError, StepError, UnitError};

// events
pub use events::RunEvent;

// executor
pub use executor::{Executor, ExecutorBuilder, ExecutorError};

// scoring
pub use scoring::ScoreSampler;

// shape
pub use shape::{FieldDef, FieldType, Shape, ValidationError, Violation};

// state
pub use state::RunState;

// step_ctx
#[cfg(any(test, feature = "test-support"))]
pub use step_ctx::{TestStepCtx, TestStepCtxInspector};
pub use step_ctx::StepCtx;

// traits
pub use traits::{
    DataProducer, DecisionUnit, PromptContext, RunFilter, RunRecordStore, ScoreOutcome, Scorer,
    StepHandler, StepMeta, StepOutcome,
};

// types
pub use types::{RunHandle, RunRecord, RunStatus, Suspension};

// workflow
pub use workflow::{WorkflowBuilder, WorkflowDef};
