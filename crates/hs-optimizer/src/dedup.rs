//! Duplicate detection against evaluation history and within a batch.

use hs_types::{config_key, Configuration, FixedParams};
use std::collections::HashSet;

use crate::log::EvaluationLog;

/// Whether `config` (fixed parameters stripped first) was already accepted.
pub fn is_duplicate(config: &Configuration, fixed: &FixedParams, log: &EvaluationLog) -> bool {
    log.contains(&fixed.strip(config))
}

/// Admits raw candidates that are new both to the log and to the batch
/// being assembled.
#[derive(Debug)]
pub struct BatchDeduplicator<'a> {
    log: &'a EvaluationLog,
    batch: HashSet<String>,
}

impl<'a> BatchDeduplicator<'a> {
    pub fn new(log: &'a EvaluationLog) -> Self {
        Self {
            log,
            batch: HashSet::new(),
        }
    }

    /// Returns `true` and remembers the candidate if it is unique.
    pub fn admit(&mut self, config: &Configuration) -> bool {
        if self.log.contains(config) {
            return false;
        }
        self.batch.insert(config_key(config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hs_types::ParameterValue;

    fn config(x: i64) -> Configuration {
        let mut c = Configuration::new();
        c.insert("x".into(), ParameterValue::Int(x));
        c
    }

    #[test]
    fn fixed_params_do_not_affect_duplicate_check() {
        let mut log = EvaluationLog::new();
        log.append(config(1), 1.0.into(), None).unwrap();

        let fixed = FixedParams::new().with("epochs", 5_i64);
        let proposed = fixed.merge(config(1));
        assert!(is_duplicate(&proposed, &fixed, &log));
        assert!(!is_duplicate(&fixed.merge(config(2)), &fixed, &log));
    }

    #[test]
    fn batch_rejects_history_and_repeats() {
        let mut log = EvaluationLog::new();
        log.append(config(1), 1.0.into(), None).unwrap();

        let mut dedup = BatchDeduplicator::new(&log);
        assert!(!dedup.admit(&config(1)));
        assert!(dedup.admit(&config(2)));
        assert!(!dedup.admit(&config(2)));
        assert!(dedup.admit(&config(3)));
    }
}
