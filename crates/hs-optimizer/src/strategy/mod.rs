//! Search strategies behind the common propose/update contract.

mod coordinate;
mod delegate;
mod grid;
mod pbt;
mod random;

pub use coordinate::CoordinateSearch;
pub use delegate::{BackendResult, BlackBoxBackend, DelegateKind, DelegateSearch};
pub use grid::GridSearch;
pub use pbt::{Member, PbtSettings, PopulationBasedTraining};
pub use random::{RandomSearch, Refinement};

use hs_types::{Configuration, HsError, HsResult, Objective, SearchSpace};
use rand_chacha::ChaCha8Rng;
use tracing::warn;

use crate::dedup::BatchDeduplicator;
use crate::log::EvaluationLog;
use crate::selection::ParetoPolicy;

/// Consecutive duplicate draws tolerated before a sampler gives up.
pub const DEFAULT_MAX_ATTEMPTS: usize = 1_000;

/// Read-only view of the optimizer state plus its random source, handed to
/// every strategy call.
pub struct SearchContext<'a> {
    pub log: &'a EvaluationLog,
    pub rng: &'a mut ChaCha8Rng,
    pub pareto_policy: ParetoPolicy,
}

/// One entry of a recorded batch as seen by [`SearchStrategy::update`].
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    /// Configuration with fixed parameters stripped.
    pub config: Configuration,
    pub objective: Objective,
    pub checkpoint: Option<String>,
    /// Dropped by the log as a previously-seen configuration.
    pub duplicate: bool,
}

impl Observation {
    pub fn scalar(&self, strategy: &str) -> HsResult<f64> {
        self.objective.as_scalar().ok_or_else(|| {
            HsError::ObjectiveMismatch(format!("{strategy} requires scalar objectives"))
        })
    }
}

/// Common trait for all search strategies.
pub trait SearchStrategy: Send {
    /// Produce up to `batch_size` raw configurations, unique against the log
    /// and within the batch. Finite strategies may return fewer and fail
    /// with [`HsError::SpaceExhausted`] once nothing is left.
    fn propose(
        &mut self,
        batch_size: usize,
        ctx: &mut SearchContext<'_>,
    ) -> HsResult<Vec<Configuration>>;

    /// Reject objectives this strategy cannot learn from. Runs before the
    /// batch touches the log.
    fn validate_objectives(&self, _objectives: &[Objective]) -> HsResult<()> {
        Ok(())
    }

    /// Called once per recorded batch, after the log was updated. On error
    /// the batch is taken back out of the log.
    fn update(
        &mut self,
        _observations: &[Observation],
        _ctx: &mut SearchContext<'_>,
    ) -> HsResult<()> {
        Ok(())
    }

    /// The space the next proposals are drawn from.
    fn space(&self) -> &SearchSpace;

    /// Human-readable strategy name.
    fn name(&self) -> &str;

    /// Checkpoint a proposal should warm-start from, if any.
    fn checkpoint_for(&self, _config: &Configuration) -> Option<&str> {
        None
    }

    /// Unvisited candidates left, for finite strategies.
    fn remaining(&self) -> Option<usize> {
        None
    }
}

/// Fail with [`HsError::ObjectiveMismatch`] unless every objective is scalar.
pub(crate) fn require_scalar(objectives: &[Objective], strategy: &str) -> HsResult<()> {
    if objectives.iter().any(Objective::is_vector) {
        return Err(HsError::ObjectiveMismatch(format!(
            "{strategy} requires scalar objectives"
        )));
    }
    Ok(())
}

/// Independent random draws until `count` unique configurations are
/// collected or `max_attempts` consecutive duplicates were drawn.
pub(crate) fn sample_unique(
    space: &SearchSpace,
    count: usize,
    dedup: &mut BatchDeduplicator<'_>,
    rng: &mut ChaCha8Rng,
    max_attempts: usize,
    strategy: &str,
) -> HsResult<Vec<Configuration>> {
    let mut batch = Vec::with_capacity(count);
    let mut misses = 0;
    while batch.len() < count {
        let candidate = space.sample(rng);
        if dedup.admit(&candidate) {
            batch.push(candidate);
            misses = 0;
        } else {
            misses += 1;
            if misses >= max_attempts {
                warn!(
                    "{strategy}: gave up after {misses} consecutive duplicate draws \
                     ({} of {count} found)",
                    batch.len()
                );
                return Err(HsError::SpaceExhausted {
                    strategy: strategy.to_string(),
                });
            }
        }
    }
    Ok(batch)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use rand::SeedableRng;

    /// Owns what a [`SearchContext`] borrows.
    pub(crate) struct Harness {
        pub log: EvaluationLog,
        pub rng: ChaCha8Rng,
    }

    impl Harness {
        pub fn new() -> Self {
            Self {
                log: EvaluationLog::new(),
                rng: ChaCha8Rng::seed_from_u64(42),
            }
        }

        pub fn ctx(&mut self) -> SearchContext<'_> {
            SearchContext {
                log: &self.log,
                rng: &mut self.rng,
                pareto_policy: ParetoPolicy::default(),
            }
        }

        /// Log the batch, then hand it to the strategy like the optimizer does.
        pub fn record(
            &mut self,
            strategy: &mut dyn SearchStrategy,
            configs: &[Configuration],
            objectives: &[Objective],
        ) {
            let mut observations = Vec::new();
            for (config, objective) in configs.iter().zip(objectives) {
                let duplicate = self.log.contains(config);
                if !duplicate {
                    self.log
                        .append(config.clone(), objective.clone(), None)
                        .unwrap();
                }
                observations.push(Observation {
                    config: config.clone(),
                    objective: objective.clone(),
                    checkpoint: None,
                    duplicate,
                });
            }
            let mut ctx = self.ctx();
            strategy.update(&observations, &mut ctx).unwrap();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::Harness;
    use super::*;

    #[test]
    fn sample_unique_exhausts_finite_space() {
        let space = SearchSpace::builder()
            .add_categorical("act", ["relu", "tanh"])
            .build()
            .unwrap();
        let mut harness = Harness::new();
        let log = harness.log.clone();
        let mut dedup = BatchDeduplicator::new(&log);

        let two = sample_unique(&space, 2, &mut dedup, &mut harness.rng, 100, "random").unwrap();
        assert_eq!(two.len(), 2);
        assert_ne!(two[0], two[1]);

        let err =
            sample_unique(&space, 1, &mut dedup, &mut harness.rng, 100, "random").unwrap_err();
        assert!(err.is_exhausted());
    }

    #[test]
    fn require_scalar_rejects_vectors() {
        assert!(require_scalar(&[1.0.into(), 2.0.into()], "pbt").is_ok());
        let err = require_scalar(&[1.0.into(), vec![1.0, 2.0].into()], "pbt").unwrap_err();
        assert!(matches!(err, HsError::ObjectiveMismatch(_)));
    }
}
