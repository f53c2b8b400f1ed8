//! Service configuration, read from TOML
use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// What happens to a document's history when the document is deleted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryRetention {
    /// History outlives the document and stays readable for audits.
    #[default]
    Retain,
    /// History is removed in the same transaction as the document.
    Cascade,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub db_path: PathBuf,
    pub history_retention: HistoryRetention,
    /// fsync after every committed write
    pub flush_on_write: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("document-ledger.db"),
            history_retention: HistoryRetention::default(),
            flush_on_write: false,
        }
    }
}

impl Config {
    pub fn from_toml(contents: &str) -> anyhow::Result<Self> {
        toml::from_str(contents).context("invalid ledger configuration")
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml(&contents)
    }

    pub fn with_db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.db_path = path.into();
        self
    }

    pub fn with_history_retention(mut self, retention: HistoryRetention) -> Self {
        self.history_retention = retention;
        self
    }
}
