//! Batch runs over a directory

use serde_json::Value;
use std::path::{Path, PathBuf};

use super::executor::{ExecutionOptions, Orchestrator, PlannedFile};
use super::mode::OperatingMode;
use super::operator::Operator;
use crate::config::{keys, SecurityConfig};
use crate::discovery::{
    discover_files, filter_supported_files, validate_directory_exists, validate_files,
    validate_pattern_safe,
};
use crate::error::{Error, Result};
use crate::types::{PipelineRun, RunConfig};

/// A batch over the files of one directory
#[derive(Debug, Clone, PartialEq)]
pub struct BatchRequest {
    pub directory: PathBuf,
    /// Glob matched against file names (or relative paths when it contains `/`)
    pub pattern: String,
    pub recursive: bool,
    pub mode: OperatingMode,
    /// Processor settings; discovery parameters are added to the stored snapshot
    pub config: RunConfig,
    pub save_history: bool,
    pub security: SecurityConfig,
}

impl BatchRequest {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            pattern: "*".to_string(),
            recursive: false,
            mode: OperatingMode::default(),
            config: RunConfig::new(),
            save_history: true,
            security: SecurityConfig::default(),
        }
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = pattern.into();
        self
    }

    pub fn with_recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn with_mode(mut self, mode: OperatingMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_config(mut self, config: RunConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_save_history(mut self, save_history: bool) -> Self {
        self.save_history = save_history;
        self
    }

    pub fn with_security(mut self, security: SecurityConfig) -> Self {
        self.security = security;
        self
    }

    /// Configuration snapshot stored with the run
    pub fn run_config(&self) -> RunConfig {
        let mut config = self.config.clone();
        config.insert(
            keys::DIRECTORY.into(),
            Value::from(self.directory.display().to_string()),
        );
        config.insert(keys::PATTERN.into(), Value::from(self.pattern.clone()));
        config.insert(keys::RECURSIVE.into(), Value::from(self.recursive));
        config
    }
}

/// Files selected for a batch after discovery and pre-flight checks
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchPlan {
    /// Files to process, in processing order
    pub files: Vec<PathBuf>,
    /// Matched files the processor does not handle
    pub unsupported: Vec<PathBuf>,
    /// Combined size of `files` in bytes
    pub total_bytes: u64,
}

impl Orchestrator {
    /// Discover and validate the files of a batch without processing anything
    pub fn plan_batch(&self, request: &BatchRequest) -> Result<BatchPlan> {
        validate_pattern_safe(&request.pattern)?;
        validate_directory_exists(&request.directory)?;

        let discovered = discover_files(&request.directory, &request.pattern, request.recursive)?;
        if discovered.is_empty() {
            return Err(no_files(request));
        }

        let (files, unsupported) =
            filter_supported_files(discovered, |path: &Path| self.processor().supports(path));
        for path in &unsupported {
            tracing::warn!("Unsupported file type, not processing: {}", path.display());
        }
        if files.is_empty() {
            return Err(no_files(request));
        }

        let total_bytes = validate_files(&files, &request.security)?;
        tracing::info!(
            "Planned batch of {} files ({} bytes) from {}",
            files.len(),
            total_bytes,
            request.directory.display()
        );

        Ok(BatchPlan {
            files,
            unsupported,
            total_bytes,
        })
    }

    /// Process a plan produced by [`plan_batch`](Self::plan_batch)
    pub async fn run_plan(
        &self,
        request: &BatchRequest,
        plan: &BatchPlan,
        operator: &mut dyn Operator,
    ) -> Result<PipelineRun> {
        let options = ExecutionOptions::new(request.mode, request.run_config())
            .with_save_history(request.save_history);
        let files = plan.files.iter().map(PlannedFile::new).collect();
        self.execute(files, &options, operator).await
    }

    /// Plan and process a batch
    pub async fn run_batch(&self, request: &BatchRequest, operator: &mut dyn Operator) -> Result<PipelineRun> {
        let plan = self.plan_batch(request)?;
        self.run_plan(request, &plan, operator).await
    }
}

fn no_files(request: &BatchRequest) -> Error {
    Error::NoFilesDiscovered {
        directory: request.directory.clone(),
        pattern: request.pattern.clone(),
    }
}
