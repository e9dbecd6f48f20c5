//! Task descriptors for handing a proposed batch to an external evaluator.

use hs_types::{Configuration, HsResult, Objective};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// How many evaluations an executor may run at once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Maximum number of concurrently running evaluations.
    pub max_concurrent: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self { max_concurrent: 4 }
    }
}

/// One configuration to evaluate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationTask {
    pub task_id: Uuid,

    /// Optimizer session this task belongs to.
    pub session_id: Uuid,

    /// Position inside the proposed batch (0-indexed).
    pub slot: usize,

    /// Full configuration, fixed parameters included.
    pub config: Configuration,

    /// Stored configuration file, if the batch was written to disk.
    pub artifact: Option<PathBuf>,

    /// Checkpoint to warm-start from.
    pub warm_start: Option<String>,
}

/// Allocation plan for one batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskAllocation {
    /// Workers to request, never more than there are tasks.
    pub num_workers: usize,

    pub tasks: Vec<EvaluationTask>,

    pub executor: ExecutorConfig,
}

impl TaskAllocation {
    pub fn new(executor: ExecutorConfig, tasks: Vec<EvaluationTask>) -> Self {
        let num_workers = executor.max_concurrent.min(tasks.len());
        Self {
            num_workers,
            tasks,
            executor,
        }
    }
}

/// Result of one evaluation, reported in task order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationOutcome {
    pub objective: Objective,
    pub checkpoint: Option<String>,
}

impl EvaluationOutcome {
    pub fn new(objective: impl Into<Objective>) -> Self {
        Self {
            objective: objective.into(),
            checkpoint: None,
        }
    }

    pub fn with_checkpoint(mut self, checkpoint: impl Into<String>) -> Self {
        self.checkpoint = Some(checkpoint.into());
        self
    }
}

/// Runs a whole batch and reports one outcome per task, in order.
pub trait Executor {
    fn execute(&mut self, allocation: &TaskAllocation) -> HsResult<Vec<EvaluationOutcome>>;
}

/// In-process executor evaluating tasks one after another with a closure.
pub struct FnExecutor<F> {
    evaluate: F,
}

impl<F> FnExecutor<F>
where
    F: FnMut(&EvaluationTask) -> HsResult<EvaluationOutcome>,
{
    pub fn new(evaluate: F) -> Self {
        Self { evaluate }
    }
}

impl<F> Executor for FnExecutor<F>
where
    F: FnMut(&EvaluationTask) -> HsResult<EvaluationOutcome>,
{
    fn execute(&mut self, allocation: &TaskAllocation) -> HsResult<Vec<EvaluationOutcome>> {
        allocation.tasks.iter().map(&mut self.evaluate).collect()
    }
}
