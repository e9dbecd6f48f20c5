use hs_types::{config_error, Configuration, HsResult, SearchSpace};
use serde::Serialize;
use tracing::info;

use super::{sample_unique, Observation, SearchContext, SearchStrategy, DEFAULT_MAX_ATTEMPTS};
use crate::dedup::BatchDeduplicator;
use crate::selection::{top_k, ParetoPolicy};

/// A space replacement performed by refinement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Refinement {
    /// Logged evaluations at the time the refinement fired.
    pub after_evaluations: usize,
    pub space: SearchSpace,
}

#[derive(Debug, Clone)]
struct RefineSchedule {
    thresholds: Vec<usize>,
    top_k: usize,
    next: usize,
}

/// Independent random sampling, optionally narrowing the space to the
/// bounds of the best configurations once evaluation-count thresholds are
/// reached.
#[derive(Debug, Clone)]
pub struct RandomSearch {
    space: SearchSpace,
    schedule: Option<RefineSchedule>,
    history: Vec<Refinement>,
    max_attempts: usize,
}

impl RandomSearch {
    pub fn new(space: SearchSpace) -> Self {
        Self {
            space,
            schedule: None,
            history: Vec::new(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Refine after each of the ascending `thresholds` using the best
    /// `top_k` (> 1) configurations.
    pub fn with_refinement(mut self, thresholds: Vec<usize>, top_k: usize) -> HsResult<Self> {
        if top_k <= 1 {
            return Err(config_error!("refine_top_k must be > 1, got {top_k}"));
        }
        if thresholds.is_empty() {
            return Err(config_error!("refinement needs at least one threshold"));
        }
        if thresholds.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(config_error!(
                "refinement thresholds must be strictly ascending: {thresholds:?}"
            ));
        }
        if thresholds[0] < top_k {
            return Err(config_error!(
                "first refinement threshold {} is below refine_top_k {top_k}",
                thresholds[0]
            ));
        }
        self.schedule = Some(RefineSchedule {
            thresholds,
            top_k,
            next: 0,
        });
        Ok(self)
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Every space replacement so far, oldest first.
    pub fn refinements(&self) -> &[Refinement] {
        &self.history
    }

    fn refine(&mut self, top_k_count: usize, ctx: &SearchContext<'_>) -> HsResult<()> {
        // a short Pareto front still refines
        let policy = match ctx.pareto_policy {
            ParetoPolicy::Error => ParetoPolicy::PadWithNextLayers,
            policy => policy,
        };
        let top: Vec<Configuration> = top_k(ctx.log, top_k_count, policy)?
            .into_iter()
            .map(|record| record.config.clone())
            .collect();
        let refined = self.space.refined(&top);
        info!(
            "Refined the random search space after {} evaluations: {}",
            ctx.log.len(),
            serde_json::to_string(&refined).unwrap_or_default()
        );
        self.history.push(Refinement {
            after_evaluations: ctx.log.len(),
            space: refined.clone(),
        });
        self.space = refined;
        Ok(())
    }
}

impl SearchStrategy for RandomSearch {
    fn propose(
        &mut self,
        batch_size: usize,
        ctx: &mut SearchContext<'_>,
    ) -> HsResult<Vec<Configuration>> {
        let mut dedup = BatchDeduplicator::new(ctx.log);
        sample_unique(
            &self.space,
            batch_size,
            &mut dedup,
            ctx.rng,
            self.max_attempts,
            self.name(),
        )
    }

    fn update(
        &mut self,
        _observations: &[Observation],
        ctx: &mut SearchContext<'_>,
    ) -> HsResult<()> {
        let Some(schedule) = self.schedule.as_ref() else {
            return Ok(());
        };
        let count = ctx.log.len();
        // thresholds passed in one batch collapse into a single refinement
        let reached = schedule.thresholds[schedule.next..]
            .iter()
            .take_while(|&&threshold| threshold <= count)
            .count();
        if reached == 0 {
            return Ok(());
        }
        let k = schedule.top_k;
        self.refine(k, ctx)?;
        if let Some(schedule) = self.schedule.as_mut() {
            schedule.next += reached;
        }
        Ok(())
    }

    fn space(&self) -> &SearchSpace {
        &self.space
    }

    fn name(&self) -> &str {
        "random"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::EvaluationLog;
    use crate::strategy::test_support::Harness;
    use hs_types::{Objective, ParameterSpec, ParameterValue};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn space() -> SearchSpace {
        SearchSpace::builder()
            .add_real("lrate", 0.0, 1.0)
            .add_integer("layers", 1, 20)
            .add_categorical("act", ["relu", "tanh", "gelu", "silu"])
            .build()
            .unwrap()
    }

    #[test]
    fn proposes_unique_batches() {
        let mut strategy = RandomSearch::new(space());
        let mut harness = Harness::new();
        let batch = strategy.propose(20, &mut harness.ctx()).unwrap();
        assert_eq!(batch.len(), 20);
        for (i, a) in batch.iter().enumerate() {
            assert!(strategy.space().contains(a));
            for b in &batch[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn never_repeats_history() {
        let space = SearchSpace::builder().add_integer("n", 0, 9).build().unwrap();
        let mut strategy = RandomSearch::new(space);
        let mut harness = Harness::new();

        let first = strategy.propose(6, &mut harness.ctx()).unwrap();
        let objectives: Vec<Objective> = (0..6).map(|i| Objective::Scalar(i as f64)).collect();
        harness.record(&mut strategy, &first, &objectives);

        let second = strategy.propose(4, &mut harness.ctx()).unwrap();
        for config in &second {
            assert!(!first.contains(config));
        }
        // all ten values used now
        let err = strategy.propose(1, &mut harness.ctx()).unwrap_err();
        assert!(err.is_exhausted());
    }

    #[test]
    fn refinement_settings_are_validated() {
        assert!(RandomSearch::new(space()).with_refinement(vec![10], 1).is_err());
        assert!(RandomSearch::new(space()).with_refinement(vec![10, 5], 3).is_err());
        assert!(RandomSearch::new(space()).with_refinement(vec![2, 5], 3).is_err());
        assert!(RandomSearch::new(space()).with_refinement(vec![5, 10], 3).is_ok());
    }

    #[test]
    fn refinement_narrows_to_top_k_bounds() {
        let mut strategy = RandomSearch::new(space()).with_refinement(vec![10], 3).unwrap();
        let mut harness = Harness::new();

        let batch = strategy.propose(10, &mut harness.ctx()).unwrap();
        // objective = lrate, so the three smallest learning rates win
        let objectives: Vec<Objective> = batch
            .iter()
            .map(|c| Objective::Scalar(c["lrate"].as_f64().unwrap()))
            .collect();
        harness.record(&mut strategy, &batch, &objectives);
        assert_eq!(strategy.refinements().len(), 1);
        assert_eq!(strategy.refinements()[0].after_evaluations, 10);

        let mut ranked = batch.clone();
        let lrate = |c: &Configuration| c["lrate"].as_f64().unwrap();
        ranked.sort_by(|a, b| lrate(a).total_cmp(&lrate(b)));
        let top = &ranked[..3];
        let values = |name: &str| top.iter().map(|c| c[name].as_f64().unwrap()).collect::<Vec<_>>();
        let min_of = |name: &str| values(name).into_iter().fold(f64::INFINITY, f64::min);
        let max_of = |name: &str| values(name).into_iter().fold(f64::NEG_INFINITY, f64::max);
        let acts: Vec<&ParameterValue> = top.iter().map(|c| &c["act"]).collect();

        let proposals = strategy.propose(50, &mut harness.ctx()).unwrap();
        for config in &proposals {
            for name in ["lrate", "layers"] {
                let v = config[name].as_f64().unwrap();
                assert!(v >= min_of(name) && v <= max_of(name), "{name}={v} escaped refinement");
            }
            assert!(acts.contains(&&config["act"]));
        }
        match strategy.space().get("act") {
            Some(ParameterSpec::Categorical { values }) => assert!(values.len() <= 3),
            other => panic!("unexpected spec: {other:?}"),
        }
    }

    #[test]
    fn thresholds_fire_once_each() {
        let mut strategy = RandomSearch::new(space()).with_refinement(vec![4, 8], 2).unwrap();
        let mut harness = Harness::new();

        for round in 0..4 {
            let batch = strategy.propose(3, &mut harness.ctx()).unwrap();
            let objectives: Vec<Objective> =
                (0..3).map(|i| Objective::Scalar((round * 3 + i) as f64)).collect();
            harness.record(&mut strategy, &batch, &objectives);
        }
        // 3, 6, 9, 12 evaluations: threshold 4 fires at 6, threshold 8 at 9
        let fired: Vec<usize> = strategy
            .refinements()
            .iter()
            .map(|r| r.after_evaluations)
            .collect();
        assert_eq!(fired, vec![6, 9]);
    }

    #[test]
    fn short_pareto_front_still_refines() {
        let space = SearchSpace::builder().add_real("x", 0.0, 10.0).build().unwrap();
        let mut strategy = RandomSearch::new(space).with_refinement(vec![4], 3).unwrap();
        let mut log = EvaluationLog::new();
        for i in 0..4 {
            let mut config = Configuration::new();
            config.insert("x".into(), ParameterValue::Float(i as f64));
            let objective = Objective::Vector(vec![i as f64, i as f64]);
            log.append(config, objective, None).unwrap();
        }
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut ctx = SearchContext {
            log: &log,
            rng: &mut rng,
            pareto_policy: ParetoPolicy::Error,
        };
        strategy.update(&[], &mut ctx).unwrap();

        // front is {x=0}; the next two layers pad it to x in [0, 2]
        assert_eq!(strategy.refinements().len(), 1);
        match strategy.space().get("x") {
            Some(ParameterSpec::Real(real)) => assert_eq!((real.begin, real.end), (0.0, 2.0)),
            other => panic!("unexpected spec: {other:?}"),
        }
    }
}
