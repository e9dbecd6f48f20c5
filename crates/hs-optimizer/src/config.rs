//! File-based description of a search session.

use hs_types::{FixedParams, HsResult, SpaceDefinition};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::optimizer::{HyperOptimizer, OptimizerConfig};
use crate::selection::ParetoPolicy;
use crate::strategy::{
    CoordinateSearch, GridSearch, PbtSettings, PopulationBasedTraining, RandomSearch,
    SearchStrategy,
};

/// Strategy choice and its settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StrategyConfig {
    Random {
        /// Evaluation counts at which the space is refined.
        #[serde(default)]
        refine_after: Vec<usize>,
        #[serde(default = "default_refine_top_k")]
        refine_top_k: usize,
    },
    Grid {
        #[serde(default = "default_real_steps")]
        real_steps: usize,
    },
    Coordinate {
        #[serde(default = "default_real_steps")]
        real_steps: usize,
    },
    Pbt(PbtSettings),
}

fn default_refine_top_k() -> usize {
    5
}

fn default_real_steps() -> usize {
    5
}

fn default_seed() -> u64 {
    42
}

impl Default for StrategyConfig {
    fn default() -> Self {
        StrategyConfig::Random {
            refine_after: Vec::new(),
            refine_top_k: default_refine_top_k(),
        }
    }
}

/// A complete search session as stored in a JSON file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    pub name: String,
    #[serde(default = "default_seed")]
    pub seed: u64,
    pub space: SpaceDefinition,
    #[serde(default)]
    pub fixed_params: FixedParams,
    #[serde(default)]
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub pareto_policy: ParetoPolicy,
}

impl SearchConfig {
    pub fn from_json_str(raw: &str) -> HsResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> HsResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Validate the space and instantiate the configured strategy.
    pub fn build_strategy(&self) -> HsResult<Box<dyn SearchStrategy>> {
        let space = self.space.build()?;
        let strategy: Box<dyn SearchStrategy> = match &self.strategy {
            StrategyConfig::Random {
                refine_after,
                refine_top_k,
            } => {
                let search = RandomSearch::new(space);
                if refine_after.is_empty() {
                    Box::new(search)
                } else {
                    Box::new(search.with_refinement(refine_after.clone(), *refine_top_k)?)
                }
            }
            StrategyConfig::Grid { real_steps } => Box::new(GridSearch::new(space, *real_steps)?),
            StrategyConfig::Coordinate { real_steps } => {
                Box::new(CoordinateSearch::new(space, *real_steps))
            }
            StrategyConfig::Pbt(settings) => {
                Box::new(PopulationBasedTraining::new(space, settings.clone())?)
            }
        };
        Ok(strategy)
    }

    pub fn optimizer_config(&self) -> OptimizerConfig {
        OptimizerConfig::default()
            .with_fixed_params(self.fixed_params.clone())
            .with_seed(self.seed)
            .with_pareto_policy(self.pareto_policy)
    }

    /// Build the optimizer, optionally resuming from an archive.
    pub fn build(&self, reload_path: Option<&Path>) -> HsResult<HyperOptimizer> {
        let mut config = self.optimizer_config();
        if let Some(path) = reload_path {
            config = config.with_reload_path(path);
        }
        HyperOptimizer::new(self.build_strategy()?, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hs_types::{HsError, ParameterValue};

    const CONFIG: &str = r#"{
        "name": "mlp-sweep",
        "space": {
            "real": {"lrate": {"begin": 0.0001, "end": 0.1, "prior": "log-uniform"}},
            "integer": {"layers": {"begin": 1, "end": 5, "prior": "uniform"}},
            "categorical": {"act": ["relu", "tanh"]}
        },
        "fixed_params": {"epochs": 20},
        "strategy": {"type": "random", "refine_after": [10, 20], "refine_top_k": 3}
    }"#;

    #[test]
    fn parses_with_defaults() {
        let config = SearchConfig::from_json_str(CONFIG).unwrap();
        assert_eq!(config.name, "mlp-sweep");
        assert_eq!(config.seed, 42);
        assert_eq!(config.pareto_policy, ParetoPolicy::Truncate);
        assert_eq!(
            config.strategy,
            StrategyConfig::Random {
                refine_after: vec![10, 20],
                refine_top_k: 3
            }
        );
    }

    #[test]
    fn builds_optimizer_with_fixed_params() {
        let config = SearchConfig::from_json_str(CONFIG).unwrap();
        let mut optimizer = config.build(None).unwrap();
        assert_eq!(optimizer.strategy().name(), "random");
        let batch = optimizer.propose(2).unwrap();
        assert!(batch.iter().all(|c| c["epochs"] == ParameterValue::Int(20)));
    }

    #[test]
    fn strategy_variants_parse() {
        let grid: StrategyConfig = serde_json::from_str(r#"{"type": "grid"}"#).unwrap();
        assert_eq!(grid, StrategyConfig::Grid { real_steps: 5 });

        let pbt: StrategyConfig =
            serde_json::from_str(r#"{"type": "pbt", "population_size": 8}"#).unwrap();
        match pbt {
            StrategyConfig::Pbt(settings) => {
                assert_eq!(settings.population_size, 8);
                assert_eq!(settings.truncation, 0.25);
            }
            other => panic!("unexpected strategy: {other:?}"),
        }
    }

    #[test]
    fn invalid_space_is_reported() {
        let raw = r#"{
            "name": "bad",
            "space": {"real": {"lrate": {"begin": 0.1, "end": 0.01}}}
        }"#;
        let config = SearchConfig::from_json_str(raw).unwrap();
        let err = config.build_strategy().err().unwrap();
        assert!(matches!(err, HsError::InvalidSpace { .. }));
    }

    #[test]
    fn invalid_refinement_is_reported() {
        let mut config = SearchConfig::from_json_str(CONFIG).unwrap();
        config.strategy = StrategyConfig::Random {
            refine_after: vec![10],
            refine_top_k: 1,
        };
        assert!(matches!(config.build_strategy(), Err(HsError::Config(_))));
    }
}
