use hs_types::{config_key, Configuration, HsError, HsResult, SearchSpace};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

use super::{Observation, SearchContext, SearchStrategy};
use crate::dedup::BatchDeduplicator;

/// Result type of backend calls; errors are opaque to the optimizer.
pub type BackendResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Ask/tell interface of an external black-box optimizer working on the
/// continuous encoding of a [`SearchSpace`] (see [`SearchSpace::encode`]).
/// Backends size their domain from [`SearchSpace::bounds`].
pub trait BlackBoxBackend: Send {
    /// Request `count` candidate points.
    fn ask(&mut self, count: usize) -> BackendResult<Vec<Vec<f64>>>;

    /// Report objective values for previously asked (or externally
    /// evaluated) points.
    fn tell(&mut self, points: &[Vec<f64>], values: &[Vec<f64>]) -> BackendResult<()>;
}

/// Which family of backend is wrapped; only affects naming and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelegateKind {
    /// Sequential model-based optimization.
    Smbo,
    /// Evolutionary and other population-based solvers.
    Evolutionary,
}

impl DelegateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DelegateKind::Smbo => "smbo",
            DelegateKind::Evolutionary => "evolutionary",
        }
    }
}

/// Forwards proposal and update work to a [`BlackBoxBackend`].
///
/// Only translation happens here: backend points are decoded into
/// configurations, observed configurations are encoded back. Backend
/// failures surface as [`HsError::Backend`]. Backend points are remembered
/// only until the next `propose`; later records are re-encoded.
pub struct DelegateSearch<B> {
    space: SearchSpace,
    backend: B,
    kind: DelegateKind,
    max_rounds: usize,
    asked: HashMap<String, Vec<f64>>,
}

impl<B: BlackBoxBackend> DelegateSearch<B> {
    pub fn new(space: SearchSpace, backend: B, kind: DelegateKind) -> Self {
        Self {
            space,
            backend,
            kind,
            max_rounds: 10,
            asked: HashMap::new(),
        }
    }

    /// Ask rounds spent topping up a batch that lost candidates to
    /// deduplication.
    pub fn with_max_rounds(mut self, rounds: usize) -> Self {
        self.max_rounds = rounds.max(1);
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn kind(&self) -> DelegateKind {
        self.kind
    }
}

fn backend_error(kind: DelegateKind, err: Box<dyn std::error::Error + Send + Sync>) -> HsError {
    HsError::Backend(format!("{} backend: {err}", kind.as_str()))
}

impl<B: BlackBoxBackend> SearchStrategy for DelegateSearch<B> {
    fn propose(
        &mut self,
        batch_size: usize,
        ctx: &mut SearchContext<'_>,
    ) -> HsResult<Vec<Configuration>> {
        self.asked.clear();
        if batch_size == 0 {
            return Ok(Vec::new());
        }
        let mut dedup = BatchDeduplicator::new(ctx.log);
        let mut batch = Vec::with_capacity(batch_size);

        for round in 0..self.max_rounds {
            let needed = batch_size - batch.len();
            let points = self
                .backend
                .ask(needed)
                .map_err(|err| backend_error(self.kind, err))?;
            if points.is_empty() {
                break;
            }
            for point in points {
                let config = self.space.decode(&point)?;
                if dedup.admit(&config) {
                    self.asked.insert(config_key(&config), point);
                    batch.push(config);
                    if batch.len() == batch_size {
                        return Ok(batch);
                    }
                } else {
                    debug!(
                        "{}: round {round} dropped duplicate candidate",
                        self.kind.as_str()
                    );
                }
            }
        }

        if batch.is_empty() {
            return Err(HsError::SpaceExhausted {
                strategy: self.name().to_string(),
            });
        }
        warn!(
            "{}: backend produced {} of {batch_size} unique candidates",
            self.kind.as_str(),
            batch.len()
        );
        Ok(batch)
    }

    fn update(
        &mut self,
        observations: &[Observation],
        _ctx: &mut SearchContext<'_>,
    ) -> HsResult<()> {
        if observations.is_empty() {
            return Ok(());
        }
        let mut keys = Vec::with_capacity(observations.len());
        let mut points = Vec::with_capacity(observations.len());
        let mut values = Vec::with_capacity(observations.len());
        for observation in observations {
            let key = config_key(&observation.config);
            let point = match self.asked.get(&key) {
                Some(point) => point.clone(),
                None => self.space.encode(&observation.config)?,
            };
            keys.push(key);
            points.push(point);
            values.push(observation.objective.values().to_vec());
        }
        self.backend
            .tell(&points, &values)
            .map_err(|err| backend_error(self.kind, err))?;
        for key in keys {
            self.asked.remove(&key);
        }
        Ok(())
    }

    fn space(&self) -> &SearchSpace {
        &self.space
    }

    fn name(&self) -> &str {
        self.kind.as_str()
    }
}
