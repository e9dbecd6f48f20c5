//! Persisting proposed configurations for external evaluators.

use hs_types::{Configuration, HsResult, ParameterValue};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Writes and reads configuration files by name.
pub trait ConfigSerializer: Send {
    /// Store `config` under `name` and return where it went.
    fn store(&self, config: &Configuration, name: &str) -> HsResult<PathBuf>;

    fn load(&self, name: &str) -> HsResult<Configuration>;
}

/// Pretty-printed JSON files inside one directory.
#[derive(Debug, Clone)]
pub struct JsonConfigSerializer {
    dir: PathBuf,
}

impl JsonConfigSerializer {
    /// Creates `dir` if needed.
    pub fn new<P: AsRef<Path>>(dir: P) -> HsResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ConfigSerializer for JsonConfigSerializer {
    fn store(&self, config: &Configuration, name: &str) -> HsResult<PathBuf> {
        let path = self.dir.join(name);
        let file = std::fs::File::create(&path)?;
        serde_json::to_writer_pretty(std::io::BufWriter::new(file), config)?;
        debug!("Stored configuration in {}", path.display());
        Ok(path)
    }

    fn load(&self, name: &str) -> HsResult<Configuration> {
        let file = std::fs::File::open(self.dir.join(name))?;
        let raw: serde_json::Map<String, serde_json::Value> =
            serde_json::from_reader(std::io::BufReader::new(file))?;
        Ok(raw
            .into_iter()
            .map(|(name, value)| (name, ParameterValue::from_json(value)))
            .collect())
    }
}
