//! Path resolution for persisted state

use std::path::{Path, PathBuf};

/// Environment variable that overrides the data directory
pub const HOME_ENV: &str = "FINAGENT_HOME";

/// Resolves standard paths for cache, memory, logs and feedback
#[derive(Debug, Clone)]
pub struct Paths {
    pub root: PathBuf,
}

impl Paths {
    /// Resolve the data directory from `FINAGENT_HOME`, else the platform data dir
    pub fn new() -> std::io::Result<Self> {
        if let Some(dir) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
            return Ok(Self::at(PathBuf::from(dir)));
        }

        let data = dirs::data_dir().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "data directory not found")
        })?;

        Ok(Self::at(data.join("finagent")))
    }

    /// Use an explicit root (tests, embedding)
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Response cache database
    pub fn cache_db(&self) -> PathBuf {
        self.root.join("cache.db")
    }

    /// Conversation memory database
    pub fn memory_db(&self) -> PathBuf {
        self.root.join("memory.db")
    }

    /// Document chunk index
    pub fn chunks_db(&self) -> PathBuf {
        self.root.join("chunks.db")
    }

    /// Directory holding `queries_YYYYMMDD.jsonl` and metric exports
    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// Directory holding `feedbacks.jsonl` and feedback reports
    pub fn feedback_dir(&self) -> PathBuf {
        self.root.join("feedback")
    }

    /// Optional settings file
    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.json")
    }
}
