//! Workflow definitions: an ordered list of steps plus the overall
//! input/output shapes.
//!
//! Definitions are purely declarative and immutable once built. `build()`
//! fails fast on duplicate step names or incompatible consecutive shapes —
//! these are programming errors, never runtime errors. Each definition
//! carries a content-addressed fingerprint (SHA-256 of its declared
//! identity and shapes) recorded on every run started against it.

use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::errors::DefinitionError;
use crate::shape::Shape;
use crate::traits::{StepHandler, StepMeta};

/// An immutable, ordered sequence of steps shared by all runs of a
/// workflow.
pub struct WorkflowDef {
    id: String,
    input: Shape,
    output: Shape,
    steps: Vec<Arc<dyn StepHandler>>,
    metas: Vec<StepMeta>,
    fingerprint: String,
}

impl WorkflowDef {
    /// Start building a workflow definition.
    pub fn builder(id: &str) -> WorkflowBuilder {
        WorkflowBuilder {
            id: id.to_string(),
            input: None,
            output: None,
            steps: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn input_shape(&self) -> &Shape {
        &self.input
    }

    pub fn output_shape(&self) -> &Shape {
        &self.output
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub(crate) fn step(&self, index: usize) -> &Arc<dyn StepHandler> {
        &self.steps[index]
    }

    /// Cached metadata for the step at `index`.
    pub fn meta(&self, index: usize) -> &StepMeta {
        &self.metas[index]
    }

    pub fn metas(&self) -> &[StepMeta] {
        &self.metas
    }

    /// Content-addressed fingerprint: lowercase hex SHA-256 of the
    /// definition's canonical JSON (id, shapes, per-step metadata).
    /// Same definition = same fingerprint.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

impl std::fmt::Debug for WorkflowDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowDef")
            .field("id", &self.id)
            .field("steps", &self.metas.iter().map(|m| &m.name).collect::<Vec<_>>())
            .field("fingerprint", &self.fingerprint)
            .finish()
    }
}

/// Builder for [`WorkflowDef`]. Validation happens in [`build`](Self::build).
pub struct WorkflowBuilder {
    id: String,
    input: Option<Shape>,
    output: Option<Shape>,
    steps: Vec<Arc<dyn StepHandler>>,
}

impl WorkflowBuilder {
    /// Declare the workflow's input shape. Defaults to an empty object.
    pub fn input_shape(mut self, shape: Shape) -> Self {
        self.input = Some(shape);
        self
    }

    /// Declare the workflow's output shape. Defaults to an empty object.
    pub fn output_shape(mut self, shape: Shape) -> Self {
        self.output = Some(shape);
        self
    }

    /// Append a step. Order of calls is execution order.
    pub fn step(mut self, handler: impl StepHandler + 'static) -> Self {
        self.steps.push(Arc::new(handler));
        self
    }

    /// Validate and freeze the definition.
    ///
    /// Checks, in order: at least one step; unique step names; every
    /// declared pattern compiles; the input shape feeds the first step;
    /// each step's output feeds the next step's input; the last step's
    /// output satisfies the workflow output shape.
    pub fn build(self) -> Result<WorkflowDef, DefinitionError> {
        if self.steps.is_empty() {
            return Err(DefinitionError::Empty { workflow: self.id });
        }

        let input = self
            .input
            .unwrap_or_else(|| Shape::empty("workflow_input"));
        let output = self
            .output
            .unwrap_or_else(|| Shape::empty("workflow_output"));

        let metas: Vec<StepMeta> = self.steps.iter().map(|s| s.meta()).collect();

        let mut seen = std::collections::HashSet::new();
        for meta in &metas {
            if !seen.insert(meta.name.clone()) {
                return Err(DefinitionError::DuplicateStep {
                    workflow: self.id,
                    name: meta.name.clone(),
                });
            }
        }

        let step_shapes = metas.iter().flat_map(shapes_of);
        for shape in [&input, &output].into_iter().chain(step_shapes) {
            if let Some((field, message)) = shape.check_patterns().into_iter().next() {
                return Err(DefinitionError::InvalidPattern {
                    shape: shape.name.clone(),
                    field,
                    message,
                });
            }
        }

        check_feeds(&self.id, &input, &metas[0].input)?;
        for pair in metas.windows(2) {
            check_feeds(&pair[0].name, &pair[0].output, &pair[1].input)?;
        }
        let last = &metas[metas.len() - 1];
        check_feeds(&last.name, &last.output, &output)?;

        let fingerprint = compute_fingerprint(&self.id, &input, &output, &metas);

        Ok(WorkflowDef {
            id: self.id,
            input,
            output,
            steps: self.steps,
            metas,
            fingerprint,
        })
    }
}

fn shapes_of(meta: &StepMeta) -> Vec<&Shape> {
    let mut shapes = vec![&meta.input, &meta.output];
    if let Some(resume) = &meta.resume {
        shapes.push(resume);
    }
    if let Some(suspend) = &meta.suspend {
        shapes.push(suspend);
    }
    shapes
}

fn check_feeds(from: &str, producer: &Shape, consumer: &Shape) -> Result<(), DefinitionError> {
    consumer
        .accepts_output_of(producer)
        .map_err(|reasons| DefinitionError::ShapeMismatch {
            from: from.to_string(),
            to: consumer.name.clone(),
            detail: reasons.join("; "),
        })
}

/// SHA-256 over canonical JSON. `BTreeMap` inside [`Shape`] guarantees
/// deterministic key order, so identical definitions hash identically.
fn compute_fingerprint(id: &str, input: &Shape, output: &Shape, metas: &[StepMeta]) -> String {
    let doc = serde_json::json!({
        "id": id,
        "input": input,
        "output": output,
        "steps": metas,
    });
    let bytes = serde_json::to_vec(&doc).expect("definition serialization should never fail");
    let hash = Sha256::digest(&bytes);
    format!("{hash:x}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::Value;

    use crate::errors::StepError;
    use crate::shape::FieldDef;
    use crate::step_ctx::StepCtx;
    use crate::traits::StepOutcome;

    struct NamedStep {
        name: &'static str,
        input: Shape,
        output: Shape,
    }

    impl NamedStep {
        fn new(name: &'static str, input: Shape, output: Shape) -> Self {
            Self {
                name,
                input,
                output,
            }
        }
    }

    #[async_trait]
    impl StepHandler for NamedStep {
        fn meta(&self) -> StepMeta {
            StepMeta {
                name: self.name.to_string(),
                description: String::new(),
                input: self.input.clone(),
                output: self.output.clone(),
                resume: None,
                suspend: None,
                requires: vec![],
            }
        }

        async fn execute(&self, input: Value, _ctx: &StepCtx) -> Result<StepOutcome, StepError> {
            Ok(StepOutcome::Output(input))
        }
    }

    fn summary_shape(name: &str) -> Shape {
        Shape::object(name).field("summary", FieldDef::string())
    }

    #[test]
    fn builds_a_compatible_chain() {
        let workflow = WorkflowDef::builder("wf")
            .input_shape(Shape::empty("in"))
            .output_shape(summary_shape("out"))
            .step(NamedStep::new("a", Shape::empty("a_in"), summary_shape("a_out")))
            .step(NamedStep::new("b", summary_shape("b_in"), summary_shape("b_out")))
            .build()
            .unwrap();

        assert_eq!(workflow.len(), 2);
        assert_eq!(workflow.meta(0).name, "a");
        assert!(!workflow.fingerprint().is_empty());
    }

    #[test]
    fn rejects_empty_workflow() {
        let err = WorkflowDef::builder("wf").build().unwrap_err();
        assert!(matches!(err, DefinitionError::Empty { .. }));
    }

    #[test]
    fn rejects_duplicate_step_names() {
        let err = WorkflowDef::builder("wf")
            .step(NamedStep::new("a", Shape::empty("in"), Shape::empty("out")))
            .step(NamedStep::new("a", Shape::empty("in"), Shape::empty("out")))
            .build()
            .unwrap_err();
        assert!(matches!(err, DefinitionError::DuplicateStep { name, .. } if name == "a"));
    }

    #[test]
    fn rejects_shape_mismatch_between_steps() {
        let err = WorkflowDef::builder("wf")
            .step(NamedStep::new("a", Shape::empty("a_in"), Shape::empty("a_out")))
            .step(NamedStep::new("b", summary_shape("b_in"), summary_shape("b_out")))
            .build()
            .unwrap_err();
        match err {
            DefinitionError::ShapeMismatch { from, to, detail } => {
                assert_eq!(from, "a");
                assert_eq!(to, "b_in");
                assert!(detail.contains("summary"));
            }
            other => panic!("expected ShapeMismatch, got: {other}"),
        }
    }

    #[test]
    fn rejects_bad_pattern() {
        let shape = Shape::object("in").field("id", FieldDef::string().pattern("([unclosed"));
        let err = WorkflowDef::builder("wf")
            .input_shape(shape)
            .step(NamedStep::new("a", Shape::empty("a_in"), Shape::empty("a_out")))
            .build()
            .unwrap_err();
        assert!(matches!(err, DefinitionError::InvalidPattern { .. }));
    }

    #[test]
    fn fingerprint_is_stable_and_name_sensitive() {
        let build = |name: &'static str| {
            WorkflowDef::builder("wf")
                .step(NamedStep::new(name, Shape::empty("in"), Shape::empty("out")))
                .build()
                .unwrap()
        };
        assert_eq!(build("a").fingerprint(), build("a").fingerprint());
        assert_ne!(build("a").fingerprint(), build("b").fingerprint());
    }

    #[test]
    fn last_step_must_satisfy_workflow_output() {
        let err = WorkflowDef::builder("wf")
            .output_shape(summary_shape("out"))
            .step(NamedStep::new("a", Shape::empty("a_in"), Shape::empty("a_out")))
            .build()
            .unwrap_err();
        assert!(matches!(err, DefinitionError::ShapeMismatch { .. }));
    }
}
