//! # hs-optimizer
//!
//! Hyperparameter search orchestration for HyperSweep.
//!
//! Provides the ask/tell optimizer loop over an append-only evaluation log,
//! duplicate detection, scalar and Pareto ranking, search strategies (random
//! with refinement, grid, coordinate, population-based training and
//! black-box backend delegation), archive save/reload, tabular export and
//! executor task descriptors.

mod config;
mod dedup;
mod executor;
mod log;
mod optimizer;
mod selection;
mod serializer;
mod strategy;

pub use config::{SearchConfig, StrategyConfig};
pub use dedup::{is_duplicate, BatchDeduplicator};
pub use executor::{
    EvaluationOutcome, EvaluationTask, Executor, ExecutorConfig, FnExecutor, TaskAllocation,
};
pub use log::{
    Archive, ArchivedEvaluation, EvalId, EvaluationLog, EvaluationRecord, Table, TableRow,
    ARCHIVE_VERSION,
};
pub use optimizer::{
    DuplicateEvaluation, HyperOptimizer, OptimizerConfig, RecordOutcome, StoredProposal,
};
pub use selection::{best_trace, non_dominated_layers, pareto_front, top_k, ParetoPolicy};
pub use serializer::{ConfigSerializer, JsonConfigSerializer};
pub use strategy::{
    BackendResult, BlackBoxBackend, CoordinateSearch, DelegateKind, DelegateSearch, GridSearch,
    Member, Observation, PbtSettings, PopulationBasedTraining, RandomSearch, Refinement,
    SearchContext, SearchStrategy, DEFAULT_MAX_ATTEMPTS,
};
