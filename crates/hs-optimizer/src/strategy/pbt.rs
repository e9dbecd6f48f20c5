use hs_types::{
    config_error, config_key, Configuration, HsResult, Objective, ParameterSpec, ParameterValue,
    SearchSpace,
};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

use super::{
    require_scalar, sample_unique, Observation, SearchContext, SearchStrategy, DEFAULT_MAX_ATTEMPTS,
};
use crate::dedup::BatchDeduplicator;

/// Population-based training knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PbtSettings {
    pub population_size: usize,
    /// Fraction of the population counted as top and bottom performers.
    #[serde(default = "default_truncation")]
    pub truncation: f64,
    /// Numeric parameters are multiplied by one of these when exploring.
    #[serde(default = "default_perturb_factors")]
    pub perturb_factors: (f64, f64),
    /// Chance of resampling a parameter instead of perturbing it.
    #[serde(default = "default_resample_probability")]
    pub resample_probability: f64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
}

fn default_truncation() -> f64 {
    0.25
}

fn default_perturb_factors() -> (f64, f64) {
    (0.8, 1.2)
}

fn default_resample_probability() -> f64 {
    0.25
}

fn default_max_attempts() -> usize {
    DEFAULT_MAX_ATTEMPTS
}

impl PbtSettings {
    pub fn new(population_size: usize) -> Self {
        Self {
            population_size,
            truncation: default_truncation(),
            perturb_factors: default_perturb_factors(),
            resample_probability: default_resample_probability(),
            max_attempts: default_max_attempts(),
        }
    }

    pub fn with_truncation(mut self, truncation: f64) -> Self {
        self.truncation = truncation;
        self
    }

    pub fn with_resample_probability(mut self, probability: f64) -> Self {
        self.resample_probability = probability;
        self
    }

    fn validate(&self) -> HsResult<()> {
        if self.population_size < 2 {
            return Err(config_error!(
                "population_size must be at least 2, got {}",
                self.population_size
            ));
        }
        if !(self.truncation > 0.0 && self.truncation <= 0.5) {
            return Err(config_error!("truncation must be in (0, 0.5], got {}", self.truncation));
        }
        if !(0.0..=1.0).contains(&self.resample_probability) {
            return Err(config_error!(
                "resample_probability must be in [0, 1], got {}",
                self.resample_probability
            ));
        }
        Ok(())
    }

    /// Members in the top and bottom quantile, at least one.
    fn quantile(&self) -> usize {
        ((self.population_size as f64 * self.truncation).floor() as usize).max(1)
    }
}

/// One population slot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Member {
    pub config: Configuration,
    pub objective: f64,
    /// Resource handle of the evaluation that produced `objective`.
    pub checkpoint: Option<String>,
}

#[derive(Debug, Clone)]
struct Pending {
    /// Slot the proposal is meant to replace, `None` for fresh members.
    slot: Option<usize>,
    /// Checkpoint the proposal should warm-start from.
    parent_checkpoint: Option<String>,
}

/// Population-based training over a fixed-size population.
///
/// While the population is filling up `propose` returns fresh samples.
/// Afterwards it copies top performers (exploit), mutates the copy
/// (explore) and targets the worst members, which `update` replaces.
/// Proposals still unrecorded when `propose` is called again lose their
/// target slot and warm-start checkpoint.
#[derive(Debug, Clone)]
pub struct PopulationBasedTraining {
    space: SearchSpace,
    settings: PbtSettings,
    members: Vec<Member>,
    pending: HashMap<String, Pending>,
}

impl PopulationBasedTraining {
    pub fn new(space: SearchSpace, settings: PbtSettings) -> HsResult<Self> {
        settings.validate()?;
        Ok(Self {
            space,
            settings,
            members: Vec::new(),
            pending: HashMap::new(),
        })
    }

    pub fn population(&self) -> &[Member] {
        &self.members
    }

    pub fn settings(&self) -> &PbtSettings {
        &self.settings
    }

    /// Slot indices sorted best first.
    fn ranked(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.members.len()).collect();
        order.sort_by(|&a, &b| self.members[a].objective.total_cmp(&self.members[b].objective));
        order
    }

    fn explore(&self, parent: &Configuration, rng: &mut ChaCha8Rng) -> Configuration {
        let (low, high) = self.settings.perturb_factors;
        let mut child = parent.clone();
        for (name, spec) in self.space.parameters() {
            let resample = rng.gen_bool(self.settings.resample_probability);
            let value = match (spec, parent.get(name)) {
                (_, None) => spec.sample(rng),
                (_, Some(_)) if resample => spec.sample(rng),
                (ParameterSpec::Categorical { .. }, Some(current)) => current.clone(),
                (_, Some(current)) => {
                    let factor = if rng.gen_bool(0.5) { low } else { high };
                    perturb(spec, current, factor)
                }
            };
            child.insert(name.to_string(), value);
        }
        child
    }
}

/// Scale a numeric value and clamp it back into its dimension.
fn perturb(spec: &ParameterSpec, value: &ParameterValue, factor: f64) -> ParameterValue {
    match (spec, value.as_f64()) {
        (ParameterSpec::Real(real), Some(v)) => {
            ParameterValue::Float((v * factor).clamp(real.begin, real.end))
        }
        (ParameterSpec::Integer(int), Some(v)) => {
            let scaled = int.snap(v * factor);
            // small integers would otherwise never move
            if scaled == v as i64 {
                let nudged = if factor > 1.0 { v + 1.0 } else { v - 1.0 };
                ParameterValue::Int(int.snap(nudged))
            } else {
                ParameterValue::Int(scaled)
            }
        }
        _ => value.clone(),
    }
}

impl SearchStrategy for PopulationBasedTraining {
    fn propose(
        &mut self,
        batch_size: usize,
        ctx: &mut SearchContext<'_>,
    ) -> HsResult<Vec<Configuration>> {
        self.pending.clear();
        let mut dedup = BatchDeduplicator::new(ctx.log);
        let mut batch = Vec::with_capacity(batch_size);

        let vacant = self.settings.population_size.saturating_sub(self.members.len());
        let fresh = vacant.min(batch_size);
        if fresh > 0 {
            let samples = sample_unique(
                &self.space,
                fresh,
                &mut dedup,
                ctx.rng,
                self.settings.max_attempts,
                self.name(),
            )?;
            for config in samples {
                self.pending.insert(
                    config_key(&config),
                    Pending {
                        slot: None,
                        parent_checkpoint: None,
                    },
                );
                batch.push(config);
            }
        }

        if batch.len() < batch_size && !self.members.is_empty() {
            let ranked = self.ranked();
            let quantile = self.settings.quantile().min(self.members.len());
            let top = &ranked[..quantile];
            let mut targets = ranked.iter().rev().copied();

            let mut misses = 0;
            while batch.len() < batch_size && misses < self.settings.max_attempts {
                let parent = &self.members[top[ctx.rng.gen_range(0..top.len())]];
                let child = self.explore(&parent.config, ctx.rng);
                if !dedup.admit(&child) {
                    misses += 1;
                    continue;
                }
                misses = 0;
                let slot = targets.next();
                debug!("pbt: exploit objective {} into slot {slot:?}", parent.objective);
                self.pending.insert(
                    config_key(&child),
                    Pending {
                        slot,
                        parent_checkpoint: parent.checkpoint.clone(),
                    },
                );
                batch.push(child);
            }
        }

        if batch.len() < batch_size {
            let rest = sample_unique(
                &self.space,
                batch_size - batch.len(),
                &mut dedup,
                ctx.rng,
                self.settings.max_attempts,
                self.name(),
            )?;
            batch.extend(rest);
        }
        Ok(batch)
    }

    fn validate_objectives(&self, objectives: &[Objective]) -> HsResult<()> {
        require_scalar(objectives, self.name())
    }

    fn update(
        &mut self,
        observations: &[Observation],
        _ctx: &mut SearchContext<'_>,
    ) -> HsResult<()> {
        for observation in observations.iter().filter(|o| !o.duplicate) {
            let objective = observation.scalar(self.name())?;
            let pending = self.pending.remove(&config_key(&observation.config));
            let member = Member {
                config: observation.config.clone(),
                objective,
                checkpoint: observation.checkpoint.clone(),
            };

            if self.members.len() < self.settings.population_size {
                self.members.push(member);
                continue;
            }
            let slot = match pending.and_then(|p| p.slot) {
                Some(slot) if slot < self.members.len() => slot,
                _ => match self.ranked().last() {
                    Some(&worst) => worst,
                    None => continue,
                },
            };
            if objective < self.members[slot].objective {
                info!(
                    "pbt: replaced member {slot} ({} -> {objective})",
                    self.members[slot].objective
                );
                self.members[slot] = member;
            }
        }
        Ok(())
    }

    fn space(&self) -> &SearchSpace {
        &self.space
    }

    fn name(&self) -> &str {
        "pbt"
    }

    fn checkpoint_for(&self, config: &Configuration) -> Option<&str> {
        self.pending
            .get(&config_key(config))
            .and_then(|pending| pending.parent_checkpoint.as_deref())
    }
}
