use hs_types::{
    space_error, Configuration, HsError, HsResult, Objective, ParameterValue, SearchSpace,
};
use tracing::{debug, info};

use super::{require_scalar, Observation, SearchContext, SearchStrategy};
use crate::dedup::BatchDeduplicator;

/// Coordinate-wise local search over a discretized space.
///
/// Holds an incumbent point and varies one coordinate at a time, nearest
/// axis values first. `update` commits the best observed move if it beats
/// the incumbent and then advances to the next coordinate.
#[derive(Debug, Clone)]
pub struct CoordinateSearch {
    space: SearchSpace,
    axes: Vec<(String, Vec<ParameterValue>)>,
    incumbent: Configuration,
    incumbent_objective: Option<f64>,
    cursor: usize,
}

impl CoordinateSearch {
    /// Starts from the middle of every axis.
    pub fn new(space: SearchSpace, real_steps: usize) -> Self {
        let axes: Vec<(String, Vec<ParameterValue>)> = space
            .parameters()
            .map(|(name, spec)| (name.to_string(), spec.grid_values(real_steps)))
            .collect();
        let incumbent = axes
            .iter()
            .map(|(name, values)| (name.clone(), values[values.len() / 2].clone()))
            .collect();
        Self {
            space,
            axes,
            incumbent,
            incumbent_objective: None,
            cursor: 0,
        }
    }

    /// Start from an explicit point, which must lie in the space.
    pub fn with_start(mut self, start: Configuration) -> HsResult<Self> {
        if !self.space.contains(&start) {
            return Err(space_error!("start", "start point {start:?} is outside the space"));
        }
        self.incumbent = start;
        Ok(self)
    }

    pub fn incumbent(&self) -> (&Configuration, Option<f64>) {
        (&self.incumbent, self.incumbent_objective)
    }

    /// Unseen moves along axis `axis`, nearest to the incumbent first.
    fn moves_along(
        &self,
        axis: usize,
        dedup: &mut BatchDeduplicator<'_>,
        limit: usize,
    ) -> Vec<Configuration> {
        let (name, values) = &self.axes[axis];
        let current = self
            .incumbent
            .get(name)
            .and_then(|value| values.iter().position(|v| v == value))
            .unwrap_or(values.len() / 2);

        let mut order: Vec<usize> = (0..values.len()).filter(|&i| i != current).collect();
        order.sort_by_key(|&i| (i.abs_diff(current), i));

        let mut moves = Vec::new();
        for i in order {
            if moves.len() == limit {
                break;
            }
            let mut candidate = self.incumbent.clone();
            candidate.insert(name.clone(), values[i].clone());
            if dedup.admit(&candidate) {
                moves.push(candidate);
            }
        }
        moves
    }
}

impl SearchStrategy for CoordinateSearch {
    fn propose(
        &mut self,
        batch_size: usize,
        ctx: &mut SearchContext<'_>,
    ) -> HsResult<Vec<Configuration>> {
        if batch_size == 0 {
            return Ok(Vec::new());
        }
        let mut dedup = BatchDeduplicator::new(ctx.log);
        if self.incumbent_objective.is_none() && dedup.admit(&self.incumbent) {
            debug!("coordinate: proposing start point");
            let mut batch = vec![self.incumbent.clone()];
            if !self.axes.is_empty() {
                batch.extend(self.moves_along(self.cursor, &mut dedup, batch_size - 1));
            }
            return Ok(batch);
        }

        for _ in 0..self.axes.len() {
            let moves = self.moves_along(self.cursor, &mut dedup, batch_size);
            if !moves.is_empty() {
                debug!("coordinate: {} moves along '{}'", moves.len(), self.axes[self.cursor].0);
                return Ok(moves);
            }
            self.cursor = (self.cursor + 1) % self.axes.len();
        }
        Err(HsError::SpaceExhausted {
            strategy: self.name().to_string(),
        })
    }

    fn validate_objectives(&self, objectives: &[Objective]) -> HsResult<()> {
        require_scalar(objectives, self.name())
    }

    fn update(
        &mut self,
        observations: &[Observation],
        _ctx: &mut SearchContext<'_>,
    ) -> HsResult<()> {
        let mut best: Option<(&Observation, f64)> = None;
        for observation in observations.iter().filter(|o| !o.duplicate) {
            let value = observation.scalar(self.name())?;
            if best.map_or(true, |(_, b)| value < b) {
                best = Some((observation, value));
            }
        }

        if let Some((observation, value)) = best {
            if self.incumbent_objective.map_or(true, |current| value < current) {
                info!(
                    "coordinate: accepted move to objective {value} (was {:?})",
                    self.incumbent_objective
                );
                self.incumbent = observation.config.clone();
                self.incumbent_objective = Some(value);
            }
        }
        if !self.axes.is_empty() {
            self.cursor = (self.cursor + 1) % self.axes.len();
        }
        Ok(())
    }

    fn space(&self) -> &SearchSpace {
        &self.space
    }

    fn name(&self) -> &str {
        "coordinate"
    }
}
