//! The ask/tell optimizer loop.

use hs_types::{
    space_error, Configuration, FixedParams, HsError, HsResult, Objective, SearchSpace,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

use crate::dedup::is_duplicate;
use crate::executor::{EvaluationTask, Executor, ExecutorConfig, TaskAllocation};
use crate::log::{Archive, ArchivedEvaluation, EvalId, EvaluationLog, EvaluationRecord, Table};
use crate::selection::{self, ParetoPolicy};
use crate::serializer::ConfigSerializer;
use crate::strategy::{Observation, SearchContext, SearchStrategy};

/// Options for a [`HyperOptimizer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerConfig {
    pub fixed_params: FixedParams,
    pub seed: u64,
    pub pareto_policy: ParetoPolicy,
    /// Archive replayed at construction time.
    pub reload_path: Option<PathBuf>,
    /// Evaluations replayed at construction time, after `reload_path`.
    pub reload_list: Vec<ArchivedEvaluation>,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            fixed_params: FixedParams::default(),
            seed: 42,
            pareto_policy: ParetoPolicy::default(),
            reload_path: None,
            reload_list: Vec::new(),
        }
    }
}

impl OptimizerConfig {
    pub fn with_fixed_params(mut self, fixed_params: FixedParams) -> Self {
        self.fixed_params = fixed_params;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_pareto_policy(mut self, policy: ParetoPolicy) -> Self {
        self.pareto_policy = policy;
        self
    }

    pub fn with_reload_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.reload_path = Some(path.into());
        self
    }

    pub fn with_reload_list(mut self, evaluations: Vec<ArchivedEvaluation>) -> Self {
        self.reload_list = evaluations;
        self
    }
}

/// A configuration `record` dropped because it was already logged.
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateEvaluation {
    pub config: Configuration,
    pub objective: Objective,
}

/// What a `record` call did with its batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordOutcome {
    /// Ids of the accepted records, in batch order.
    pub accepted: Vec<EvalId>,
    pub duplicates: Vec<DuplicateEvaluation>,
}

impl RecordOutcome {
    pub fn has_duplicates(&self) -> bool {
        !self.duplicates.is_empty()
    }

    fn absorb(&mut self, other: RecordOutcome) {
        self.accepted.extend(other.accepted);
        self.duplicates.extend(other.duplicates);
    }
}

/// A proposal written to disk by [`HyperOptimizer::propose_and_store`].
#[derive(Debug, Clone, PartialEq)]
pub struct StoredProposal {
    pub config: Configuration,
    pub path: PathBuf,
}

/// Drives one search session: asks the strategy for proposals, records
/// outcomes into the evaluation log and answers ranking queries.
pub struct HyperOptimizer {
    strategy: Box<dyn SearchStrategy>,
    log: EvaluationLog,
    fixed: FixedParams,
    rng: ChaCha8Rng,
    pareto_policy: ParetoPolicy,
    serializer: Option<Box<dyn ConfigSerializer>>,
    session_id: Uuid,
}

impl HyperOptimizer {
    /// Build an optimizer and replay `reload_path` then `reload_list`
    /// through the regular record path.
    pub fn new(strategy: Box<dyn SearchStrategy>, config: OptimizerConfig) -> HsResult<Self> {
        if let Some(name) = config
            .fixed_params
            .names()
            .find(|name| strategy.space().contains_name(name))
        {
            return Err(space_error!(name, "declared both as fixed and as searched parameter"));
        }

        let mut optimizer = Self {
            strategy,
            log: EvaluationLog::new(),
            fixed: config.fixed_params,
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            pareto_policy: config.pareto_policy,
            serializer: None,
            session_id: Uuid::new_v4(),
        };
        info!(
            "Created optimizer session {} with {} strategy",
            optimizer.session_id,
            optimizer.strategy.name()
        );

        if let Some(path) = &config.reload_path {
            optimizer.load_archive(path)?;
        }
        if !config.reload_list.is_empty() {
            optimizer.replay(config.reload_list)?;
        }
        Ok(optimizer)
    }

    /// Attach the collaborator used by [`propose_and_store`](Self::propose_and_store).
    pub fn with_serializer(mut self, serializer: Box<dyn ConfigSerializer>) -> Self {
        self.serializer = Some(serializer);
        self
    }

    /// Replay a saved archive.
    pub fn load_archive<P: AsRef<Path>>(&mut self, path: P) -> HsResult<RecordOutcome> {
        let path = path.as_ref();
        let archive = Archive::load(path)?;
        let outcome = self.replay(archive.evaluations)?;
        info!(
            "Reloaded {} evaluations from {} ({} total)",
            outcome.accepted.len(),
            path.display(),
            self.log.len()
        );
        Ok(outcome)
    }

    /// Feed prior evaluations through `record`, one batch per run of
    /// records with or without checkpoints.
    pub fn replay(&mut self, evaluations: Vec<ArchivedEvaluation>) -> HsResult<RecordOutcome> {
        let mut configs = Vec::with_capacity(evaluations.len());
        let mut objectives = Vec::with_capacity(evaluations.len());
        let mut checkpoints = Vec::with_capacity(evaluations.len());
        for evaluation in evaluations {
            configs.push(evaluation.config);
            objectives.push(evaluation.objective);
            checkpoints.push(evaluation.checkpoint);
        }
        self.record_with_checkpoints(&configs, &objectives, &checkpoints)
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn log(&self) -> &EvaluationLog {
        &self.log
    }

    /// Number of accepted evaluations.
    pub fn eval_count(&self) -> usize {
        self.log.len()
    }

    pub fn strategy(&self) -> &dyn SearchStrategy {
        self.strategy.as_ref()
    }

    /// The space the strategy currently samples from.
    pub fn space(&self) -> &SearchSpace {
        self.strategy.space()
    }

    pub fn fixed_params(&self) -> &FixedParams {
        &self.fixed
    }

    /// Propose up to `batch_size` configurations with fixed parameters
    /// merged in. Nothing is logged until [`record`](Self::record).
    pub fn propose(&mut self, batch_size: usize) -> HsResult<Vec<Configuration>> {
        let mut ctx = SearchContext {
            log: &self.log,
            rng: &mut self.rng,
            pareto_policy: self.pareto_policy,
        };
        let raw = self.strategy.propose(batch_size, &mut ctx)?;
        info!(
            "Proposed {} of {batch_size} configurations ({} strategy, {} evaluated so far)",
            raw.len(),
            self.strategy.name(),
            self.log.len()
        );
        Ok(raw.into_iter().map(|config| self.fixed.merge(config)).collect())
    }

    /// Propose and store each configuration through the attached
    /// serializer. Without `names` the artifacts are called
    /// `eval_{n}.json`, counting on from the evaluations logged so far.
    pub fn propose_and_store(
        &mut self,
        batch_size: usize,
        names: Option<&[String]>,
    ) -> HsResult<Vec<StoredProposal>> {
        if let Some(names) = names {
            if names.len() != batch_size {
                return Err(HsError::BatchSizeMismatch {
                    expected: batch_size,
                    actual: names.len(),
                });
            }
        }
        if self.serializer.is_none() {
            return Err(HsError::Config("no configuration serializer attached".to_string()));
        }

        let configs = self.propose(batch_size)?;
        let offset = self.log.len();
        let serializer = self
            .serializer
            .as_ref()
            .ok_or_else(|| HsError::Config("no configuration serializer attached".to_string()))?;

        configs
            .into_iter()
            .enumerate()
            .map(|(i, config)| {
                let name = match names {
                    Some(names) => names[i].clone(),
                    None => artifact_name(offset + i),
                };
                let path = serializer.store(&config, &name)?;
                Ok(StoredProposal { config, path })
            })
            .collect()
    }

    /// Record a batch of evaluated configurations.
    pub fn record(
        &mut self,
        configs: &[Configuration],
        objectives: &[Objective],
    ) -> HsResult<RecordOutcome> {
        let checkpoints = vec![None; configs.len()];
        self.record_with_checkpoints(configs, objectives, &checkpoints)
    }

    /// Record a batch together with one optional checkpoint reference per
    /// evaluation.
    ///
    /// The whole batch is validated before the log is touched. Configurations
    /// already in the log (including earlier entries of the same batch) are
    /// dropped and reported in [`RecordOutcome::duplicates`]. The strategy
    /// then sees every entry of the batch, flagged accordingly. If the
    /// strategy rejects the batch, its records are taken back out of the log.
    pub fn record_with_checkpoints(
        &mut self,
        configs: &[Configuration],
        objectives: &[Objective],
        checkpoints: &[Option<String>],
    ) -> HsResult<RecordOutcome> {
        for len in [objectives.len(), checkpoints.len()] {
            if len != configs.len() {
                return Err(HsError::BatchSizeMismatch {
                    expected: configs.len(),
                    actual: len,
                });
            }
        }
        let stripped: Vec<Configuration> = configs.iter().map(|c| self.fixed.strip(c)).collect();
        self.validate_batch(&stripped, objectives)?;

        let logged_before = self.log.len();
        let mut outcome = RecordOutcome::default();
        let mut observations = Vec::with_capacity(configs.len());
        let entries = stripped.into_iter().zip(objectives).zip(checkpoints);
        for ((config, objective), checkpoint) in entries {
            let duplicate = self.log.contains(&config);
            if duplicate {
                warn!("Duplicate configuration not logged: {config:?} (objective {objective})");
                outcome.duplicates.push(DuplicateEvaluation {
                    config: config.clone(),
                    objective: objective.clone(),
                });
            } else {
                let eval_id = self
                    .log
                    .append(config.clone(), objective.clone(), checkpoint.clone())?;
                outcome.accepted.push(eval_id);
            }
            observations.push(Observation {
                config,
                objective: objective.clone(),
                checkpoint: checkpoint.clone(),
                duplicate,
            });
        }

        let mut ctx = SearchContext {
            log: &self.log,
            rng: &mut self.rng,
            pareto_policy: self.pareto_policy,
        };
        if let Err(err) = self.strategy.update(&observations, &mut ctx) {
            warn!(
                "{} strategy rejected the batch, rolling back {} records: {err}",
                self.strategy.name(),
                outcome.accepted.len()
            );
            self.log.truncate(logged_before);
            return Err(err);
        }
        info!(
            "Recorded {} evaluations, dropped {} duplicates ({} total)",
            outcome.accepted.len(),
            outcome.duplicates.len(),
            self.log.len()
        );
        Ok(outcome)
    }

    fn validate_batch(&self, stripped: &[Configuration], objectives: &[Objective]) -> HsResult<()> {
        let space = self.strategy.space();
        for config in stripped {
            let missing = space.names().into_iter().find(|name| !config.contains_key(*name));
            if let Some(missing) = missing {
                return Err(space_error!(missing, "missing from recorded configuration"));
            }
            if let Some(unknown) = config.keys().find(|name| !space.contains_name(name)) {
                return Err(space_error!(unknown, "not part of the search space"));
            }
        }

        let reference = self.log.reference_objective().or(objectives.first());
        if let Some(reference) = reference {
            if let Some(bad) = objectives.iter().find(|o| !o.same_shape(reference)) {
                return Err(HsError::ObjectiveMismatch(format!(
                    "expected an objective shaped like {reference}, got {bad}"
                )));
            }
        }
        self.strategy.validate_objectives(objectives)
    }

    /// Record a batch, then save the archive to `path`.
    pub fn record_and_save<P: AsRef<Path>>(
        &mut self,
        configs: &[Configuration],
        objectives: &[Objective],
        path: P,
    ) -> HsResult<RecordOutcome> {
        let outcome = self.record(configs, objectives)?;
        self.save(path)?;
        Ok(outcome)
    }

    /// Write the evaluation log to a durable archive.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> HsResult<()> {
        self.log.to_archive().save(path)
    }

    /// Whether `config` (fixed parameters allowed) was already logged.
    pub fn is_duplicate(&self, config: &Configuration) -> bool {
        is_duplicate(config, &self.fixed, &self.log)
    }

    /// Best `k` stripped configurations and their objectives.
    pub fn top_k(&self, k: usize) -> HsResult<(Vec<Configuration>, Vec<Objective>)> {
        let records = self.top_records(k)?;
        Ok(records
            .into_iter()
            .map(|record| (record.config.clone(), record.objective.clone()))
            .unzip())
    }

    /// Best `k` records with their ids.
    pub fn top_records(&self, k: usize) -> HsResult<Vec<&EvaluationRecord>> {
        selection::top_k(&self.log, k, self.pareto_policy)
    }

    /// The single best configuration.
    pub fn best(&self) -> HsResult<(Configuration, Objective)> {
        let (mut configs, mut objectives) = self.top_k(1)?;
        match (configs.pop(), objectives.pop()) {
            (Some(config), Some(objective)) => Ok((config, objective)),
            _ => Err(HsError::InsufficientEvaluations {
                requested: 1,
                available: self.log.len(),
            }),
        }
    }

    /// Text lines describing the top `k`, also emitted as log events.
    pub fn ranking_report(&self, k: usize) -> HsResult<Vec<String>> {
        let lines: Vec<String> = self
            .top_records(k)?
            .into_iter()
            .enumerate()
            .map(|(rank, record)| {
                let params: Vec<String> = record
                    .config
                    .iter()
                    .map(|(name, value)| format!("{name}={value}"))
                    .collect();
                format!(
                    "#{} eval {} objective {} | {}",
                    rank + 1,
                    record.eval_id,
                    record.objective,
                    params.join(", ")
                )
            })
            .collect();
        for line in &lines {
            info!("{line}");
        }
        Ok(lines)
    }

    /// Running minimum of the scalar objective in evaluation order.
    pub fn best_trace(&self) -> HsResult<Vec<f64>> {
        selection::best_trace(&self.log)
    }

    pub fn export_tabular(&self) -> Table {
        self.log.export_tabular()
    }

    /// Checkpoint the strategy wants `config` warm-started from.
    pub fn checkpoint_for(&self, config: &Configuration) -> Option<&str> {
        self.strategy.checkpoint_for(&self.fixed.strip(config))
    }

    /// Propose a batch, hand it to `executor` and record the outcomes. With
    /// a serializer attached every task also carries its stored artifact.
    pub fn run_batch(
        &mut self,
        executor: &mut dyn Executor,
        batch_size: usize,
        executor_config: &ExecutorConfig,
    ) -> HsResult<RecordOutcome> {
        let configs = self.propose(batch_size)?;
        let offset = self.log.len();
        let mut tasks = Vec::with_capacity(configs.len());
        for (slot, config) in configs.iter().enumerate() {
            let artifact = match &self.serializer {
                Some(serializer) => Some(serializer.store(config, &artifact_name(offset + slot))?),
                None => None,
            };
            tasks.push(EvaluationTask {
                task_id: Uuid::new_v4(),
                session_id: self.session_id,
                slot,
                config: config.clone(),
                artifact,
                warm_start: self.checkpoint_for(config).map(str::to_string),
            });
        }
        let allocation = TaskAllocation::new(executor_config.clone(), tasks);
        info!(
            "Dispatching {} evaluations on {} workers",
            allocation.tasks.len(),
            allocation.num_workers
        );

        let outcomes = executor.execute(&allocation)?;
        if outcomes.len() != configs.len() {
            return Err(HsError::BatchSizeMismatch {
                expected: configs.len(),
                actual: outcomes.len(),
            });
        }
        let (objectives, checkpoints): (Vec<Objective>, Vec<Option<String>>) = outcomes
            .into_iter()
            .map(|outcome| (outcome.objective, outcome.checkpoint))
            .unzip();
        self.record_with_checkpoints(&configs, &objectives, &checkpoints)
    }

    /// Propose and evaluate batches until `budget` evaluations were
    /// accepted or the strategy is exhausted.
    pub fn run(
        &mut self,
        executor: &mut dyn Executor,
        batch_size: usize,
        budget: usize,
        executor_config: &ExecutorConfig,
    ) -> HsResult<RecordOutcome> {
        let mut total = RecordOutcome::default();
        while total.accepted.len() < budget {
            let size = batch_size.min(budget - total.accepted.len());
            match self.run_batch(executor, size, executor_config) {
                Ok(outcome) => total.absorb(outcome),
                Err(err) if err.is_exhausted() => {
                    info!("{err}");
                    break;
                }
                Err(err) => return Err(err),
            }
        }
        Ok(total)
    }
}

fn artifact_name(index: usize) -> String {
    format!("eval_{index}.json")
}
