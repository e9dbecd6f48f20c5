use hs_types::{Configuration, HsError, HsResult, ParameterValue, SearchSpace};
use tracing::debug;

use super::{SearchContext, SearchStrategy};
use crate::dedup::BatchDeduplicator;

/// Exhaustive enumeration of the Cartesian product of discretized axes.
///
/// Order is deterministic: the first parameter (by name) varies slowest.
/// Points already in the log are skipped. Once every point was handed out
/// `propose` fails with [`HsError::SpaceExhausted`].
#[derive(Debug, Clone)]
pub struct GridSearch {
    space: SearchSpace,
    axes: Vec<(String, Vec<ParameterValue>)>,
    total: usize,
    cursor: usize,
}

impl GridSearch {
    /// `real_steps` points are used for each continuous dimension.
    pub fn new(space: SearchSpace, real_steps: usize) -> HsResult<Self> {
        let axes: Vec<(String, Vec<ParameterValue>)> = space
            .parameters()
            .map(|(name, spec)| (name.to_string(), spec.grid_values(real_steps)))
            .collect();
        let total = space.grid_size(real_steps).ok_or_else(|| {
            HsError::Config("grid is too large to enumerate".to_string())
        })?;
        Ok(Self {
            space,
            axes,
            total,
            cursor: 0,
        })
    }

    /// Total number of grid points.
    pub fn size(&self) -> usize {
        self.total
    }

    /// Mixed-radix decode of a flat grid index.
    fn point_at(&self, mut index: usize) -> Configuration {
        let mut config = Configuration::new();
        for (name, values) in self.axes.iter().rev() {
            config.insert(name.clone(), values[index % values.len()].clone());
            index /= values.len();
        }
        config
    }
}

impl SearchStrategy for GridSearch {
    fn propose(
        &mut self,
        batch_size: usize,
        ctx: &mut SearchContext<'_>,
    ) -> HsResult<Vec<Configuration>> {
        if batch_size == 0 {
            return Ok(Vec::new());
        }
        let mut dedup = BatchDeduplicator::new(ctx.log);
        let mut batch = Vec::with_capacity(batch_size);
        while batch.len() < batch_size && self.cursor < self.total {
            let point = self.point_at(self.cursor);
            self.cursor += 1;
            if dedup.admit(&point) {
                batch.push(point);
            } else {
                debug!("grid: skipping already evaluated point {}", self.cursor - 1);
            }
        }
        if batch.is_empty() {
            return Err(HsError::SpaceExhausted {
                strategy: self.name().to_string(),
            });
        }
        Ok(batch)
    }

    fn space(&self) -> &SearchSpace {
        &self.space
    }

    fn name(&self) -> &str {
        "grid"
    }

    fn remaining(&self) -> Option<usize> {
        Some(self.total - self.cursor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::test_support::Harness;
    use hs_types::{config_key, Objective};
    use std::collections::HashSet;

    fn two_by_three() -> SearchSpace {
        SearchSpace::builder()
            .add_categorical("act", ["relu", "tanh"])
            .add_integer("layers", 1, 3)
            .build()
            .unwrap()
    }

    #[test]
    fn grid_produces_correct_count() {
        let grid = GridSearch::new(two_by_three(), 5).unwrap();
        assert_eq!(grid.size(), 6);
        assert_eq!(grid.remaining(), Some(6));
    }

    #[test]
    fn grid_exhausts_after_every_point() {
        let mut grid = GridSearch::new(two_by_three(), 5).unwrap();
        let mut harness = Harness::new();
        let mut seen = HashSet::new();

        loop {
            match grid.propose(4, &mut harness.ctx()) {
                Ok(batch) => {
                    for config in &batch {
                        assert!(seen.insert(config_key(config)), "repeated {config:?}");
                    }
                    let objectives: Vec<Objective> = batch.iter().map(|_| 1.0.into()).collect();
                    harness.record(&mut grid, &batch, &objectives);
                }
                Err(err) => {
                    assert!(err.is_exhausted());
                    break;
                }
            }
        }
        assert_eq!(seen.len(), 6);
        assert_eq!(grid.remaining(), Some(0));
        assert!(grid.propose(1, &mut harness.ctx()).unwrap_err().is_exhausted());
    }

    #[test]
    fn grid_cursor_advances_in_fixed_order() {
        let mut grid = GridSearch::new(two_by_three(), 5).unwrap();
        let mut harness = Harness::new();
        let first = grid.propose(3, &mut harness.ctx()).unwrap();
        let layers: Vec<i64> = first.iter().map(|c| c["layers"].as_i64().unwrap()).collect();
        assert_eq!(layers, vec![1, 2, 3]);
        assert!(first.iter().all(|c| c["act"] == ParameterValue::from("relu")));

        let second = grid.propose(10, &mut harness.ctx()).unwrap();
        assert_eq!(second.len(), 3); // only 3 remain
        assert!(second.iter().all(|c| c["act"] == ParameterValue::from("tanh")));
    }

    #[test]
    fn grid_skips_reloaded_points() {
        let mut grid = GridSearch::new(two_by_three(), 5).unwrap();
        let mut harness = Harness::new();
        let mut done = Configuration::new();
        done.insert("act".into(), ParameterValue::from("relu"));
        done.insert("layers".into(), ParameterValue::Int(1));
        harness.record(&mut grid, &[done.clone()], &[0.5.into()]);

        let batch = grid.propose(6, &mut harness.ctx()).unwrap();
        assert_eq!(batch.len(), 5);
        assert!(!batch.contains(&done));
    }

    #[test]
    fn continuous_axes_use_real_steps() {
        let space = SearchSpace::builder().add_real("dropout", 0.0, 0.5).build().unwrap();
        let mut grid = GridSearch::new(space, 3).unwrap();
        let mut harness = Harness::new();
        let batch = grid.propose(10, &mut harness.ctx()).unwrap();
        let values: Vec<f64> = batch.iter().map(|c| c["dropout"].as_f64().unwrap()).collect();
        assert_eq!(values, vec![0.0, 0.25, 0.5]);
    }
}
