//! The advance loop — one run's lifecycle from `Running` to a stop point.
//!
//! Exactly one run record update is persisted per advance, keeping the
//! stored history linear and replay-safe. Suspension keeps the step index
//! unchanged so the same step is re-entered on resume.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use crate::events::RunEvent;
use crate::traits::StepOutcome;
use crate::types::{RunRecord, RunStatus};
use crate::workflow::WorkflowDef;

use super::{Executor, ExecutorError};

/// Drive `record` forward until the run completes, suspends, bails, or
/// fails. `resume_value` is consumed by the first step invocation only —
/// subsequent steps of the same advance never see it.
pub(crate) async fn advance(
    executor: &Executor,
    workflow: &WorkflowDef,
    record: &mut RunRecord,
    mut resume_value: Option<Value>,
) -> Result<(), ExecutorError> {
    while record.status == RunStatus::Running {
        // Cancellation is only honored between steps; an executing step
        // always runs to completion.
        if executor.take_cancelled(&record.run_id).await {
            tracing::info!(run_id = %record.run_id, "run cancelled between steps");
            record.finish_bailed(json!({"reason": "cancelled"}));
            executor.emit(|seq| RunEvent::RunBailed {
                seq,
                run_id: record.run_id.clone(),
                payload: json!({"reason": "cancelled"}),
                timestamp: Utc::now(),
            });
            executor.save(record).await?;
            break;
        }

        let step = Arc::clone(workflow.step(record.step_index));
        let meta = workflow.meta(record.step_index).clone();
        let input = record.step_input.clone();

        executor.emit(|seq| RunEvent::StepStarted {
            seq,
            run_id: record.run_id.clone(),
            step: meta.name.clone(),
            step_index: record.step_index,
            timestamp: Utc::now(),
        });
        tracing::debug!(run_id = %record.run_id, step = %meta.name, "executing step");

        // The step mutates a working copy of the state; the record only
        // picks it up once the step has returned (steps are atomic units
        // of work with respect to run state).
        let state = Arc::new(Mutex::new(record.state.clone()));
        let ctx = crate::step_ctx::StepCtx::new(
            record.run_id.clone(),
            meta.name.clone(),
            Arc::clone(&state),
            resume_value.take(),
            executor.scoped_producers(&meta),
            executor.scoped_units(&meta),
            executor.event_tx.clone(),
            Arc::clone(&executor.seq),
        );

        let outcome = step.execute(input.clone(), &ctx).await;
        record.state = state.lock().await.clone();

        match outcome {
            Ok(StepOutcome::Output(output)) => {
                let output = match meta.output.validate(&output) {
                    Ok(normalized) => normalized,
                    Err(e) => {
                        fail(executor, record, format!("step `{}` produced invalid output: {e}", meta.name))
                            .await?;
                        break;
                    }
                };

                executor.record_scores(record, &meta.name, &input, &output);
                executor.emit(|seq| RunEvent::StepCompleted {
                    seq,
                    run_id: record.run_id.clone(),
                    step: meta.name.clone(),
                    step_index: record.step_index,
                    output: output.clone(),
                    timestamp: Utc::now(),
                });

                if record.step_index + 1 == workflow.len() {
                    tracing::info!(run_id = %record.run_id, "run completed");
                    record.finish_completed(output.clone());
                    executor.emit(|seq| RunEvent::RunCompleted {
                        seq,
                        run_id: record.run_id.clone(),
                        output,
                        timestamp: Utc::now(),
                    });
                    executor.save(record).await?;
                    break;
                }

                record.step_index += 1;
                record.step_input = output;
                record.touch();
                executor.save(record).await?;
            }
            Ok(StepOutcome::Suspend(payload)) => {
                let payload = match &meta.suspend {
                    Some(shape) => match shape.validate(&payload) {
                        Ok(normalized) => normalized,
                        Err(e) => {
                            fail(
                                executor,
                                record,
                                format!("step `{}` produced invalid suspend payload: {e}", meta.name),
                            )
                            .await?;
                            break;
                        }
                    },
                    None => payload,
                };

                tracing::info!(run_id = %record.run_id, step = %meta.name, "run suspended");
                record.suspend(&meta.name, payload.clone());
                executor.emit(|seq| RunEvent::RunSuspended {
                    seq,
                    run_id: record.run_id.clone(),
                    step: meta.name.clone(),
                    payload,
                    timestamp: Utc::now(),
                });
                executor.save(record).await?;
                break;
            }
            Ok(StepOutcome::Bail(payload)) => {
                tracing::info!(run_id = %record.run_id, step = %meta.name, "run bailed");
                record.finish_bailed(payload.clone());
                executor.emit(|seq| RunEvent::RunBailed {
                    seq,
                    run_id: record.run_id.clone(),
                    payload,
                    timestamp: Utc::now(),
                });
                executor.save(record).await?;
                break;
            }
            Err(e) => {
                tracing::error!(run_id = %record.run_id, step = %meta.name, error = %e, "step failed");
                fail(executor, record, format!("step `{}` failed: {e}", meta.name)).await?;
                break;
            }
        }
    }

    executor.clear_cancelled(&record.run_id).await;
    Ok(())
}

async fn fail(
    executor: &Executor,
    record: &mut RunRecord,
    error: String,
) -> Result<(), ExecutorError> {
    record.finish_failed(error.clone());
    executor.emit(|seq| RunEvent::RunFailed {
        seq,
        run_id: record.run_id.clone(),
        error,
        timestamp: Utc::now(),
    });
    executor.save(record).await
}
