//! Configuration for ragctl
//!
//! Values are layered: built-in defaults, then a TOML file, then `RAGCTL_*`
//! environment variables. Command-line flags are applied by the binary last.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::types::RunConfig;

/// Environment variable overriding `history.dir`
pub const ENV_HISTORY_DIR: &str = "RAGCTL_HISTORY_DIR";
/// Environment variable overriding `history.backend`
pub const ENV_HISTORY_BACKEND: &str = "RAGCTL_HISTORY_BACKEND";

/// Run config keys shared by the batch command and the bundled processor
pub mod keys {
    pub const DIRECTORY: &str = "directory";
    pub const PATTERN: &str = "pattern";
    pub const RECURSIVE: &str = "recursive";
    pub const OUTPUT: &str = "output";
    pub const SINGLE_FILE: &str = "single_file";
    pub const STRATEGY: &str = "strategy";
    pub const MAX_TOKENS: &str = "max_tokens";
    pub const OVERLAP: &str = "overlap";
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Run history storage
    pub history: HistoryConfig,
    /// Pre-flight limits applied to discovered files
    pub security: SecurityConfig,
    /// Default chunking parameters
    pub chunking: ChunkingConfig,
}

/// History storage backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryBackend {
    /// One JSON document per run
    #[default]
    Json,
    /// Single SQLite database
    Sqlite,
}

impl FromStr for HistoryBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(HistoryBackend::Json),
            "sqlite" => Ok(HistoryBackend::Sqlite),
            other => Err(Error::config(format!(
                "unknown history backend '{}' (expected json or sqlite)",
                other
            ))),
        }
    }
}

/// Where and how run history is stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// History directory
    pub dir: PathBuf,
    /// Storage backend
    pub backend: HistoryBackend,
}

impl HistoryConfig {
    pub fn new(dir: impl Into<PathBuf>, backend: HistoryBackend) -> Self {
        Self {
            dir: dir.into(),
            backend,
        }
    }

    /// `<data-local-dir>/ragctl/history`, or `./.ragctl/history` when the
    /// platform has no data directory
    pub fn default_dir() -> PathBuf {
        dirs::data_local_dir()
            .map(|dir| dir.join("ragctl").join("history"))
            .unwrap_or_else(|| PathBuf::from(".ragctl").join("history"))
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self::new(Self::default_dir(), HistoryBackend::default())
    }
}

/// Limits checked before any file reaches the orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Largest accepted file in bytes
    pub max_file_size: u64,
    /// Most files accepted in one batch
    pub max_batch_files: usize,
    /// Largest accepted batch in bytes
    pub max_total_size: u64,
    /// Accept symbolic links
    pub allow_symlinks: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_file_size: 100 * 1024 * 1024,         // 100 MiB
            max_batch_files: 10_000,
            max_total_size: 10 * 1024 * 1024 * 1024, // 10 GiB
            allow_symlinks: false,
        }
    }
}

/// Chunking strategy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkStrategy {
    /// Paragraph blocks packed to size, long paragraphs split by sentence
    #[default]
    Semantic,
    /// Sentences packed to size
    Sentence,
    /// Fixed windows of whitespace tokens
    Token,
}

impl ChunkStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkStrategy::Semantic => "semantic",
            ChunkStrategy::Sentence => "sentence",
            ChunkStrategy::Token => "token",
        }
    }
}

impl fmt::Display for ChunkStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChunkStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "semantic" => Ok(ChunkStrategy::Semantic),
            "sentence" => Ok(ChunkStrategy::Sentence),
            "token" => Ok(ChunkStrategy::Token),
            other => Err(Error::config(format!(
                "unknown chunking strategy '{}' (expected semantic, sentence or token)",
                other
            ))),
        }
    }
}

/// Chunking configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Chunking strategy
    pub strategy: ChunkStrategy,
    /// Target chunk size in tokens
    pub max_tokens: usize,
    /// Overlap between consecutive chunks in tokens
    pub overlap: usize,
}

pub const MIN_MAX_TOKENS: usize = 50;
pub const MAX_MAX_TOKENS: usize = 4096;

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            strategy: ChunkStrategy::Semantic,
            max_tokens: 400,
            overlap: 50,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<()> {
        if !(MIN_MAX_TOKENS..=MAX_MAX_TOKENS).contains(&self.max_tokens) {
            return Err(Error::config(format!(
                "max_tokens must be between {} and {} (got {})",
                MIN_MAX_TOKENS, MAX_MAX_TOKENS, self.max_tokens
            )));
        }
        if self.overlap >= self.max_tokens {
            return Err(Error::config(format!(
                "overlap ({}) must be smaller than max_tokens ({})",
                self.overlap, self.max_tokens
            )));
        }
        Ok(())
    }

    /// Write the chunking keys into a run config snapshot
    pub fn write_to(&self, config: &mut RunConfig) {
        config.insert(keys::STRATEGY.into(), Value::from(self.strategy.as_str()));
        config.insert(keys::MAX_TOKENS.into(), Value::from(self.max_tokens));
        config.insert(keys::OVERLAP.into(), Value::from(self.overlap));
    }

    /// Read the chunking keys from a run config snapshot
    ///
    /// Missing keys fall back to `defaults`; present keys of the wrong type
    /// are rejected.
    pub fn from_run_config(config: &RunConfig, defaults: &ChunkingConfig) -> Result<Self> {
        let strategy = match config.get(keys::STRATEGY) {
            None | Some(Value::Null) => defaults.strategy,
            Some(Value::String(s)) => s.parse()?,
            Some(other) => {
                return Err(Error::config(format!("strategy must be a string, got {}", other)))
            }
        };
        let chunking = Self {
            strategy,
            max_tokens: usize_key(config, keys::MAX_TOKENS)?.unwrap_or(defaults.max_tokens),
            overlap: usize_key(config, keys::OVERLAP)?.unwrap_or(defaults.overlap),
        };
        chunking.validate()?;
        Ok(chunking)
    }
}

fn usize_key(config: &RunConfig, key: &str) -> Result<Option<usize>> {
    match config.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| Error::config(format!("{} must be a non-negative integer, got {}", key, value))),
    }
}

impl AppConfig {
    /// `<config-dir>/ragctl/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("ragctl").join("config.toml"))
    }

    /// Parse a TOML document on top of the defaults
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::config(format!("invalid config file: {}", e)))
    }

    /// Read and parse a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("failed to read config file {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Load defaults, the config file and the environment, then validate.
    ///
    /// An explicit `path` must exist; the default path is only read when present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path().filter(|p| p.is_file()) {
                Some(default) => {
                    tracing::debug!("Loading config from {}", default.display());
                    Self::from_file(&default)?
                }
                None => Self::default(),
            },
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `RAGCTL_*` overrides using `lookup` to read variables
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(ENV_HISTORY_DIR).filter(|v| !v.is_empty()) {
            self.history.dir = PathBuf::from(dir);
        }
        if let Some(backend) = lookup(ENV_HISTORY_BACKEND).filter(|v| !v.is_empty()) {
            self.history.backend = backend.parse()?;
        }
        Ok(())
    }

    /// Reject out-of-range values
    pub fn validate(&self) -> Result<()> {
        if self.history.dir.as_os_str().is_empty() {
            return Err(Error::config("history.dir must not be empty"));
        }
        if self.security.max_file_size == 0 {
            return Err(Error::config("security.max_file_size must be positive"));
        }
        if self.security.max_batch_files == 0 {
            return Err(Error::config("security.max_batch_files must be positive"));
        }
        if self.security.max_total_size < self.security.max_file_size {
            return Err(Error::config(
                "security.max_total_size must be at least security.max_file_size",
            ));
        }
        self.chunking.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        config.validate().unwrap();
        assert_eq!(config.history.backend, HistoryBackend::Json);
        assert!(config.history.dir.ends_with("history"));
        assert_eq!(config.security.max_file_size, 100 * 1024 * 1024);
        assert_eq!(config.chunking.max_tokens, 400);
        assert!(!config.security.allow_symlinks);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
            [history]
            backend = "sqlite"

            [chunking]
            max_tokens = 800
            "#,
        )
        .unwrap();
        assert_eq!(config.history.backend, HistoryBackend::Sqlite);
        assert_eq!(config.history.dir, HistoryConfig::default_dir());
        assert_eq!(config.chunking.max_tokens, 800);
        assert_eq!(config.chunking.overlap, 50);
        assert_eq!(config.security, SecurityConfig::default());
    }

    #[test]
    fn test_bad_toml_is_config_error() {
        assert!(matches!(
            AppConfig::from_toml_str("[chunking]\nstrategy = \"paragraph\""),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            (ENV_HISTORY_DIR, "/tmp/ragctl-history"),
            (ENV_HISTORY_BACKEND, "SQLite"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config
            .apply_env(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.history.dir, PathBuf::from("/tmp/ragctl-history"));
        assert_eq!(config.history.backend, HistoryBackend::Sqlite);

        let err = config.apply_env(|key| (key == ENV_HISTORY_BACKEND).then(|| "redis".to_string()));
        assert!(err.is_err());
    }

    #[test]
    fn test_chunking_validation() {
        let mut chunking = ChunkingConfig::default();
        chunking.max_tokens = 10;
        assert!(chunking.validate().is_err());

        chunking.max_tokens = 100;
        chunking.overlap = 100;
        assert!(chunking.validate().is_err());

        chunking.overlap = 20;
        chunking.validate().unwrap();
    }

    #[test]
    fn test_chunking_run_config_roundtrip() {
        let chunking = ChunkingConfig {
            strategy: ChunkStrategy::Token,
            max_tokens: 256,
            overlap: 16,
        };
        let mut run_config = RunConfig::new();
        chunking.write_to(&mut run_config);
        assert_eq!(run_config[keys::STRATEGY], json!("token"));

        let parsed = ChunkingConfig::from_run_config(&run_config, &ChunkingConfig::default()).unwrap();
        assert_eq!(parsed, chunking);
    }

    #[test]
    fn test_chunking_from_run_config_defaults_and_type_errors() {
        let defaults = ChunkingConfig::default();
        let parsed = ChunkingConfig::from_run_config(&RunConfig::new(), &defaults).unwrap();
        assert_eq!(parsed, defaults);

        let mut bad = RunConfig::new();
        bad.insert(keys::MAX_TOKENS.into(), json!("lots"));
        assert!(ChunkingConfig::from_run_config(&bad, &defaults).is_err());

        let mut out_of_range = RunConfig::new();
        out_of_range.insert(keys::MAX_TOKENS.into(), json!(10_000));
        assert!(ChunkingConfig::from_run_config(&out_of_range, &defaults).is_err());
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        assert!(AppConfig::load(Some(&tmp.path().join("nope.toml"))).is_err());
    }
}
