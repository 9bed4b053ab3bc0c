//! Prior-value snapshot kept between runs.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Values of rate metrics from the previous run.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct Snapshot {
    /// Unix seconds when the values were read.
    pub timestamp: i64,
    pub values: BTreeMap<String, f64>,
}

impl Snapshot {
    pub fn new(timestamp: i64) -> Self {
        Self {
            timestamp,
            values: BTreeMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.values.get(key).copied()
    }
}

/// Error type for snapshot persistence.
#[derive(Debug)]
pub enum StateError {
    Io(std::io::Error),
    Parse(serde_json::Error),
}

impl std::fmt::Display for StateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StateError::Io(e) => write!(f, "snapshot I/O error: {}", e),
            StateError::Parse(e) => write!(f, "snapshot parse error: {}", e),
        }
    }
}

impl std::error::Error for StateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StateError::Io(e) => Some(e),
            StateError::Parse(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for StateError {
    fn from(e: std::io::Error) -> Self {
        StateError::Io(e)
    }
}

impl From<serde_json::Error> for StateError {
    fn from(e: serde_json::Error) -> Self {
        StateError::Parse(e)
    }
}

/// Storage for the snapshot between runs.
pub trait SnapshotStore {
    /// Returns `Ok(None)` when nothing has been saved yet.
    fn load(&self) -> Result<Option<Snapshot>, StateError>;

    fn save(&mut self, snapshot: &Snapshot) -> Result<(), StateError>;
}

/// JSON file store. Writes go to a sibling file that is renamed into place.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    path: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Default location for a prefix: `<tmpdir>/mackerel-plugin-<prefix>-table`.
    pub fn default_path(prefix: &str) -> PathBuf {
        std::env::temp_dir().join(format!("mackerel-plugin-{}-table", prefix))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn load(&self) -> Result<Option<Snapshot>, StateError> {
        let data = match std::fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&data)?))
    }

    fn save(&mut self, snapshot: &Snapshot) -> Result<(), StateError> {
        let staging = self.staging_path();
        let mut file = std::fs::File::create(&staging)?;
        serde_json::to_writer(&mut file, snapshot)?;
        file.flush()?;
        drop(file);
        std::fs::rename(&staging, &self.path)?;
        Ok(())
    }
}

/// Store that keeps the snapshot in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySnapshotStore {
    snapshot: Option<Snapshot>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        Self {
            snapshot: Some(snapshot),
        }
    }

    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_ref()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn load(&self) -> Result<Option<Snapshot>, StateError> {
        Ok(self.snapshot.clone())
    }

    fn save(&mut self, snapshot: &Snapshot) -> Result<(), StateError> {
        self.snapshot = Some(snapshot.clone());
        Ok(())
    }
}
