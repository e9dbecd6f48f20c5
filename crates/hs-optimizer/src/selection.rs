//! Best-candidate selection: ascending ranking for scalar objectives and
//! Pareto fronts for vector objectives. Lower is always better.

use hs_types::{HsError, HsResult};
use serde::{Deserialize, Serialize};

use crate::log::{EvaluationLog, EvaluationRecord};

/// What `top_k` does when the Pareto front has fewer than `k` members.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParetoPolicy {
    /// Return the whole front, i.e. fewer than `k` records.
    #[default]
    Truncate,
    /// Fill up from the next non-dominated layers, each in insertion order.
    PadWithNextLayers,
    /// Fail with [`HsError::ParetoFrontTooSmall`].
    Error,
}

/// Top-`k` records of the log.
///
/// Scalar logs are sorted by ascending objective with ties going to the
/// earlier evaluation. Vector logs return the Pareto front in insertion
/// order, subject to `policy`.
pub fn top_k(
    log: &EvaluationLog,
    k: usize,
    policy: ParetoPolicy,
) -> HsResult<Vec<&EvaluationRecord>> {
    if k > log.len() {
        return Err(HsError::InsufficientEvaluations {
            requested: k,
            available: log.len(),
        });
    }
    let records = log.records();

    if !log.is_multi_objective() {
        let mut ranked: Vec<&EvaluationRecord> = records.iter().collect();
        // stable sort keeps insertion order among ties
        ranked.sort_by(|a, b| scalar(a).total_cmp(&scalar(b)));
        ranked.truncate(k);
        return Ok(ranked);
    }

    let front = pareto_front(records);
    if front.len() >= k {
        return Ok(front.into_iter().take(k).map(|i| &records[i]).collect());
    }
    match policy {
        ParetoPolicy::Truncate => Ok(front.into_iter().map(|i| &records[i]).collect()),
        ParetoPolicy::Error => Err(HsError::ParetoFrontTooSmall {
            requested: k,
            front_size: front.len(),
        }),
        ParetoPolicy::PadWithNextLayers => Ok(non_dominated_layers(records)
            .into_iter()
            .flatten()
            .take(k)
            .map(|i| &records[i])
            .collect()),
    }
}

fn scalar(record: &EvaluationRecord) -> f64 {
    record.objective.values().first().copied().unwrap_or(f64::INFINITY)
}

/// Indices of the non-dominated records, in insertion order.
pub fn pareto_front(records: &[EvaluationRecord]) -> Vec<usize> {
    let all: Vec<usize> = (0..records.len()).collect();
    front_of(records, &all)
}

/// Successive non-dominated layers: layer 0 is the Pareto front, layer 1
/// the front once layer 0 is removed, and so on.
pub fn non_dominated_layers(records: &[EvaluationRecord]) -> Vec<Vec<usize>> {
    let mut remaining: Vec<usize> = (0..records.len()).collect();
    let mut layers = Vec::new();
    while !remaining.is_empty() {
        let front = front_of(records, &remaining);
        remaining.retain(|i| !front.contains(i));
        layers.push(front);
    }
    layers
}

fn front_of(records: &[EvaluationRecord], candidates: &[usize]) -> Vec<usize> {
    candidates
        .iter()
        .copied()
        .filter(|&i| {
            !candidates
                .iter()
                .any(|&j| j != i && records[j].objective.dominates(&records[i].objective))
        })
        .collect()
}

/// Running minimum of scalar objectives in evaluation order.
pub fn best_trace(log: &EvaluationLog) -> HsResult<Vec<f64>> {
    if log.is_multi_objective() {
        return Err(HsError::ObjectiveMismatch(
            "best-so-far trace needs scalar objectives".to_string(),
        ));
    }
    let mut best = f64::INFINITY;
    Ok(log
        .records()
        .iter()
        .map(|record| {
            best = best.min(scalar(record));
            best
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hs_types::{Configuration, Objective, ParameterValue};

    fn log_with(objectives: Vec<Objective>) -> EvaluationLog {
        let mut log = EvaluationLog::new();
        for (i, objective) in objectives.into_iter().enumerate() {
            let mut c = Configuration::new();
            c.insert("i".into(), ParameterValue::Int(i as i64));
            log.append(c, objective, None).unwrap();
        }
        log
    }

    fn ids(records: &[&EvaluationRecord]) -> Vec<u64> {
        records.iter().map(|r| r.eval_id).collect()
    }

    #[test]
    fn scalar_ranking_breaks_ties_by_insertion() {
        let log = log_with(vec![5.0.into(), 1.0.into(), 3.0.into(), 1.0.into()]);
        let best = top_k(&log, 3, ParetoPolicy::default()).unwrap();
        assert_eq!(ids(&best), vec![1, 3, 2]);

        let best_two = top_k(&log, 2, ParetoPolicy::default()).unwrap();
        assert_eq!(ids(&best_two), vec![1, 3]);
    }

    #[test]
    fn k_larger_than_log_fails() {
        let log = log_with(vec![1.0.into()]);
        let err = top_k(&log, 2, ParetoPolicy::default()).unwrap_err();
        assert!(matches!(
            err,
            HsError::InsufficientEvaluations { requested: 2, available: 1 }
        ));
        assert!(top_k(&log, 0, ParetoPolicy::default()).unwrap().is_empty());
    }

    fn two_objective_log() -> EvaluationLog {
        log_with(vec![
            vec![1.0, 5.0].into(),
            vec![2.0, 3.0].into(),
            vec![3.0, 3.0].into(),
            vec![4.0, 1.0].into(),
        ])
    }

    #[test]
    fn pareto_front_excludes_dominated() {
        let log = two_objective_log();
        assert_eq!(pareto_front(log.records()), vec![0, 1, 3]);

        let best = top_k(&log, 3, ParetoPolicy::default()).unwrap();
        let objectives: Vec<&Objective> = best.iter().map(|r| &r.objective).collect();
        assert_eq!(
            objectives,
            vec![
                &Objective::Vector(vec![1.0, 5.0]),
                &Objective::Vector(vec![2.0, 3.0]),
                &Objective::Vector(vec![4.0, 1.0]),
            ]
        );
    }

    #[test]
    fn short_front_policies() {
        let log = two_objective_log();

        let truncated = top_k(&log, 4, ParetoPolicy::Truncate).unwrap();
        assert_eq!(ids(&truncated), vec![0, 1, 3]);

        let padded = top_k(&log, 4, ParetoPolicy::PadWithNextLayers).unwrap();
        assert_eq!(ids(&padded), vec![0, 1, 3, 2]);

        let err = top_k(&log, 4, ParetoPolicy::Error).unwrap_err();
        assert!(matches!(
            err,
            HsError::ParetoFrontTooSmall { requested: 4, front_size: 3 }
        ));
    }

    #[test]
    fn layers_partition_every_record() {
        let log = two_objective_log();
        let layers = non_dominated_layers(log.records());
        assert_eq!(layers, vec![vec![0, 1, 3], vec![2]]);
    }

    #[test]
    fn best_trace_is_running_minimum() {
        let log = log_with(vec![5.0.into(), 1.0.into(), 3.0.into(), 0.5.into()]);
        assert_eq!(best_trace(&log).unwrap(), vec![5.0, 1.0, 1.0, 0.5]);

        assert!(best_trace(&two_objective_log()).is_err());
    }
}
