//! Append-only evaluation log, durable archive and tabular export.

use chrono::{DateTime, Utc};
use hs_types::{config_key, Configuration, HsError, HsResult, Objective};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use tracing::info;

/// Sequential evaluation identifier, assigned on acceptance.
pub type EvalId = u64;

/// Current archive schema version.
pub const ARCHIVE_VERSION: u32 = 1;

/// One accepted evaluation. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub eval_id: EvalId,
    /// Configuration with fixed parameters stripped.
    pub config: Configuration,
    pub objective: Objective,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<String>,
}

/// Ordered record of every accepted evaluation plus the set of seen
/// configurations for duplicate lookup.
#[derive(Debug, Clone, Default)]
pub struct EvaluationLog {
    records: Vec<EvaluationRecord>,
    seen: HashSet<String>,
}

impl EvaluationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[EvaluationRecord] {
        &self.records
    }

    pub fn get(&self, eval_id: EvalId) -> Option<&EvaluationRecord> {
        self.records.get(eval_id as usize)
    }

    /// Objective of the first record; every later record must share its shape.
    pub fn reference_objective(&self) -> Option<&Objective> {
        self.records.first().map(|record| &record.objective)
    }

    /// Whether a stripped configuration was already accepted.
    pub fn contains(&self, config: &Configuration) -> bool {
        self.seen.contains(&config_key(config))
    }

    /// Whether the log holds vector objectives.
    pub fn is_multi_objective(&self) -> bool {
        self.reference_objective().is_some_and(Objective::is_vector)
    }

    /// Append a stripped configuration and return its id. The caller is
    /// responsible for deduplication.
    pub fn append(
        &mut self,
        config: Configuration,
        objective: Objective,
        checkpoint: Option<String>,
    ) -> HsResult<EvalId> {
        if let Some(reference) = self.reference_objective() {
            if !reference.same_shape(&objective) {
                return Err(HsError::ObjectiveMismatch(format!(
                    "expected an objective shaped like {reference}, got {objective}"
                )));
            }
        }
        debug_assert!(!self.contains(&config), "append called with a duplicate");

        let eval_id = self.records.len() as EvalId;
        self.seen.insert(config_key(&config));
        self.records.push(EvaluationRecord {
            eval_id,
            config,
            objective,
            checkpoint,
        });
        Ok(eval_id)
    }

    /// Drop every record from `len` on, forgetting their configurations.
    pub(crate) fn truncate(&mut self, len: usize) {
        if len >= self.records.len() {
            return;
        }
        for record in self.records.drain(len..) {
            self.seen.remove(&config_key(&record.config));
        }
    }

    /// Flatten every record into one row.
    pub fn export_tabular(&self) -> Table {
        let param_columns: BTreeSet<&str> = self
            .records
            .iter()
            .flat_map(|record| record.config.keys().map(String::as_str))
            .collect();
        let objective_columns = match self.reference_objective() {
            Some(Objective::Vector(values)) => {
                (0..values.len()).map(|i| format!("objective_{i}")).collect()
            }
            _ => vec!["objective".to_string()],
        };

        let rows = self
            .records
            .iter()
            .map(|record| TableRow {
                eval_id: record.eval_id,
                objective: record.objective.values().to_vec(),
                params: param_columns
                    .iter()
                    .map(|name| record.config.get(*name).map(ToString::to_string))
                    .collect(),
            })
            .collect();

        Table {
            objective_columns,
            param_columns: param_columns.into_iter().map(str::to_string).collect(),
            rows,
        }
    }

    /// Snapshot of the log in archive form.
    pub fn to_archive(&self) -> Archive {
        Archive {
            version: ARCHIVE_VERSION,
            saved_at: Utc::now(),
            evaluations: self
                .records
                .iter()
                .map(|record| ArchivedEvaluation {
                    config: record.config.clone(),
                    objective: record.objective.clone(),
                    checkpoint: record.checkpoint.clone(),
                })
                .collect(),
        }
    }
}

/// One archived evaluation: the replay input for reloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivedEvaluation {
    pub config: Configuration,
    pub objective: Objective,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<String>,
}

impl ArchivedEvaluation {
    pub fn new(config: Configuration, objective: impl Into<Objective>) -> Self {
        Self {
            config,
            objective: objective.into(),
            checkpoint: None,
        }
    }
}

/// Durable archive: ordered evaluations in insertion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Archive {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub evaluations: Vec<ArchivedEvaluation>,
}

impl Archive {
    /// Write the archive as JSON. Writes go to a sibling temp file first and
    /// are renamed into place.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> HsResult<()> {
        let path = path.as_ref();
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp_path = parent.join(format!(
            ".{}.tmp",
            path.file_name().unwrap_or_default().to_string_lossy()
        ));
        let file = std::fs::File::create(&tmp_path)?;
        serde_json::to_writer_pretty(std::io::BufWriter::new(file), self)?;
        std::fs::rename(&tmp_path, path)?;
        info!("Stored {} search iterations in {}", self.evaluations.len(), path.display());
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> HsResult<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)?;
        let archive: Archive = serde_json::from_reader(std::io::BufReader::new(file))?;
        if archive.version > ARCHIVE_VERSION {
            return Err(HsError::Config(format!(
                "archive {} has unsupported version {}",
                path.display(),
                archive.version
            )));
        }
        Ok(archive)
    }
}

/// One flattened record.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    pub eval_id: EvalId,
    pub objective: Vec<f64>,
    /// One cell per entry of [`Table::param_columns`]; `None` when the
    /// record does not carry that parameter.
    pub params: Vec<Option<String>>,
}

/// Tabular projection of the log.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub objective_columns: Vec<String>,
    pub param_columns: Vec<String>,
    pub rows: Vec<TableRow>,
}

impl Table {
    pub fn columns(&self) -> Vec<String> {
        std::iter::once("eval_id".to_string())
            .chain(self.objective_columns.iter().cloned())
            .chain(self.param_columns.iter().cloned())
            .collect()
    }

    pub fn write_csv<W: std::io::Write>(&self, writer: W) -> HsResult<()> {
        let mut csv = csv::Writer::from_writer(writer);
        csv.write_record(self.columns())
            .map_err(|e| HsError::Csv(e.to_string()))?;
        for row in &self.rows {
            let cells = std::iter::once(row.eval_id.to_string())
                .chain(row.objective.iter().map(ToString::to_string))
                .chain(row.params.iter().map(|cell| cell.clone().unwrap_or_default()));
            csv.write_record(cells).map_err(|e| HsError::Csv(e.to_string()))?;
        }
        csv.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hs_types::ParameterValue;

    fn config(x: i64, act: &str) -> Configuration {
        let mut c = Configuration::new();
        c.insert("x".into(), ParameterValue::Int(x));
        c.insert("act".into(), ParameterValue::from(act));
        c
    }

    #[test]
    fn append_assigns_sequential_ids() {
        let mut log = EvaluationLog::new();
        assert_eq!(log.append(config(1, "relu"), 0.5.into(), None).unwrap(), 0);
        assert_eq!(log.append(config(2, "relu"), 0.4.into(), None).unwrap(), 1);
        assert_eq!(log.append(config(3, "tanh"), 0.3.into(), None).unwrap(), 2);
        assert_eq!(log.len(), 3);
        assert!(log.contains(&config(2, "relu")));
        assert!(!log.contains(&config(2, "tanh")));
    }

    #[test]
    fn append_rejects_mixed_objective_shapes() {
        let mut log = EvaluationLog::new();
        log.append(config(1, "relu"), 0.5.into(), None).unwrap();
        let err = log
            .append(config(2, "relu"), vec![0.1, 0.2].into(), None)
            .unwrap_err();
        assert!(matches!(err, HsError::ObjectiveMismatch(_)));
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn truncate_forgets_dropped_configurations() {
        let mut log = EvaluationLog::new();
        log.append(config(1, "relu"), 0.5.into(), None).unwrap();
        log.append(config(2, "relu"), 0.4.into(), None).unwrap();
        log.truncate(1);
        assert_eq!(log.len(), 1);
        assert!(log.contains(&config(1, "relu")));
        assert!(!log.contains(&config(2, "relu")));
        assert_eq!(log.append(config(2, "relu"), 0.4.into(), None).unwrap(), 1);
    }

    #[test]
    fn tabular_export_has_one_row_per_record() {
        let mut log = EvaluationLog::new();
        log.append(config(1, "relu"), 0.5.into(), None).unwrap();
        log.append(config(2, "tanh"), 0.25.into(), None).unwrap();

        let table = log.export_tabular();
        assert_eq!(table.columns(), vec!["eval_id", "objective", "act", "x"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[1].eval_id, 1);
        assert_eq!(table.rows[1].objective, vec![0.25]);
        assert_eq!(
            table.rows[1].params,
            vec![Some("tanh".to_string()), Some("2".to_string())]
        );
    }

    #[test]
    fn csv_export_for_vector_objectives() {
        let mut log = EvaluationLog::new();
        log.append(config(1, "relu"), vec![1.0, 5.0].into(), None).unwrap();

        let mut buf = Vec::new();
        log.export_tabular().write_csv(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("eval_id,objective_0,objective_1,act,x"));
        assert_eq!(lines.next(), Some("0,1,5,relu,1"));
    }

    #[test]
    fn archive_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("search_log.json");

        let mut log = EvaluationLog::new();
        log.append(config(1, "relu"), 0.5.into(), Some("ckpt/0.pt".into()))
            .unwrap();
        log.append(config(2, "tanh"), 0.25.into(), None).unwrap();
        log.to_archive().save(&path).unwrap();

        let archive = Archive::load(&path).unwrap();
        assert_eq!(archive.version, ARCHIVE_VERSION);
        assert_eq!(archive.evaluations.len(), 2);
        assert_eq!(archive.evaluations[0].config, config(1, "relu"));
        assert_eq!(archive.evaluations[0].checkpoint.as_deref(), Some("ckpt/0.pt"));
        assert_eq!(archive.evaluations[1].objective, Objective::Scalar(0.25));
    }

    #[test]
    fn load_missing_archive_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Archive::load(dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, HsError::Io(_)));
    }
}
