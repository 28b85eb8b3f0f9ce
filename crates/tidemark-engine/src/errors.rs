//! Error types for the engine's trait operations.

use thiserror::Error;

/// Errors raised while constructing a [`WorkflowDef`](crate::workflow::WorkflowDef).
///
/// These are programming errors: a definition that fails to build is never
/// usable at run time.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DefinitionError {
    #[error("workflow `{workflow}` has no steps")]
    Empty { workflow: String },
    #[error("duplicate step name in workflow `{workflow}`: {name}")]
    DuplicateStep { workflow: String, name: String },
    #[error("shape mismatch between `{from}` and `{to}`: {detail}")]
    ShapeMismatch {
        from: String,
        to: String,
        detail: String,
    },
    #[error("invalid pattern on `{shape}.{field}`: {message}")]
    InvalidPattern {
        shape: String,
        field: String,
        message: String,
    },
}

/// Errors from [`RunRecordStore`](crate::traits::RunRecordStore).
#[derive(Debug, Error)]
pub enum RunStoreError {
    #[error("run not found: {run_id}")]
    NotFound { run_id: String },
    #[error("run store error: {message}")]
    Store { message: String },
}

/// Errors returned by a step body. Terminal for the run that raised them.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StepError {
    #[error("{message}")]
    Fatal { message: String },
    #[error(transparent)]
    Producer(#[from] ProducerError),
    #[error(transparent)]
    Unit(#[from] UnitError),
}

impl StepError {
    /// Shorthand for a fatal step error with a message.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal {
            message: message.into(),
        }
    }
}

/// Errors from [`DataProducer`](crate::traits::DataProducer) implementations.
#[derive(Debug, Error)]
pub enum ProducerError {
    #[error("invalid query for source `{source_name}`: {message}")]
    InvalidQuery { source_name: String, message: String },
    #[error("source `{source_name}` unavailable: {message}")]
    Unavailable { source_name: String, message: String },
}

/// Errors from [`DecisionUnit`](crate::traits::DecisionUnit) implementations.
#[derive(Debug, Error)]
pub enum UnitError {
    #[error("decision unit `{unit}` failed: {message}")]
    Generation { unit: String, message: String },
}
