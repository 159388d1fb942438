//! Unified configuration, read from `.stagecraft/stagecraft.toml`.
//!
//! Layered: file values, then environment overrides, then built-in
//! defaults. Everything is optional; a project with no config file at all
//! gets the reference pipeline and standard permissions.
//!
//! # Configuration File Format
//!
//! ```toml
//! [project]
//! name = "my-project"
//!
//! [defaults]
//! permission_mode = "standard"
//! max_parallel_workers = 4
//!
//! [gate]
//! criteria_file = "criteria.toml"
//!
//! [pipeline]
//! stages_file = "pipeline.json"
//! ```

use crate::dispatch::task::PermissionMode;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Directory under the project root holding all orchestrator state.
pub const STAGECRAFT_DIR: &str = ".stagecraft";

/// Project-level settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name (optional, defaults to the directory name)
    #[serde(default)]
    pub name: Option<String>,
}

/// Default behavior knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Permission mode granted to dispatched workers
    #[serde(default)]
    pub permission_mode: Option<PermissionMode>,
    /// Ceiling on parallel fan-out width
    #[serde(default = "default_max_parallel_workers")]
    pub max_parallel_workers: usize,
    /// Command spawned per dispatched worker
    #[serde(default = "default_worker_cmd")]
    pub worker_cmd: String,
    /// Ceiling on one worker invocation, in seconds
    #[serde(default = "default_dispatch_timeout_secs")]
    pub dispatch_timeout_secs: u64,
}

fn default_max_parallel_workers() -> usize {
    4
}

fn default_worker_cmd() -> String {
    "worker".to_string()
}

fn default_dispatch_timeout_secs() -> u64 {
    1800
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            permission_mode: None,
            max_parallel_workers: default_max_parallel_workers(),
            worker_cmd: default_worker_cmd(),
            dispatch_timeout_secs: default_dispatch_timeout_secs(),
        }
    }
}

/// Gate evaluator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// Criteria table file, relative to `.stagecraft/`
    #[serde(default = "default_criteria_file")]
    pub criteria_file: String,
}

fn default_criteria_file() -> String {
    "criteria.toml".to_string()
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            criteria_file: default_criteria_file(),
        }
    }
}

/// Pipeline definition settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Stage list file, relative to `.stagecraft/`
    #[serde(default = "default_stages_file")]
    pub stages_file: String,
}

fn default_stages_file() -> String {
    "pipeline.json".to_string()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stages_file: default_stages_file(),
        }
    }
}

/// The unified configuration for one project root.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StagecraftConfig {
    #[serde(skip)]
    root: PathBuf,

    #[serde(default)]
    pub project: ProjectConfig,
    #[serde(default)]
    pub defaults: DefaultsConfig,
    #[serde(default)]
    pub gate: GateConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

impl StagecraftConfig {
    /// Load the configuration for a project root. A missing file yields
    /// defaults; a malformed file is an error.
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(STAGECRAFT_DIR).join("stagecraft.toml");
        let mut config: StagecraftConfig = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config: {}", path.display()))?
        } else {
            StagecraftConfig::default()
        };
        config.root = root.to_path_buf();

        // Environment beats the file
        if let Ok(mode) = std::env::var("STAGECRAFT_PERMISSION_MODE")
            && let Ok(parsed) = mode.parse::<PermissionMode>()
        {
            config.defaults.permission_mode = Some(parsed);
        }

        Ok(config)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Project name, from the file or the root directory name.
    pub fn project_name(&self) -> String {
        self.project.name.clone().unwrap_or_else(|| {
            self.root
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("project")
                .to_string()
        })
    }

    pub fn permission_mode(&self) -> PermissionMode {
        self.defaults
            .permission_mode
            .unwrap_or(PermissionMode::Standard)
    }

    /// Process worker configured per the defaults section.
    pub fn worker(&self) -> crate::dispatch::ProcessWorker {
        crate::dispatch::ProcessWorker::new(&self.defaults.worker_cmd).with_timeout(
            std::time::Duration::from_secs(self.defaults.dispatch_timeout_secs),
        )
    }

    pub fn stagecraft_dir(&self) -> PathBuf {
        self.root.join(STAGECRAFT_DIR)
    }

    /// Directory holding per-project state documents.
    pub fn state_dir(&self) -> PathBuf {
        self.stagecraft_dir().join("projects")
    }

    pub fn criteria_path(&self) -> PathBuf {
        self.stagecraft_dir().join(&self.gate.criteria_file)
    }

    pub fn pipeline_path(&self) -> PathBuf {
        self.stagecraft_dir().join(&self.pipeline.stages_file)
    }

    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(self.state_dir()).context("Failed to create state directory")?;
        std::fs::create_dir_all(self.stagecraft_dir().join("sessions"))
            .context("Failed to create sessions directory")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let config = StagecraftConfig::load(dir.path()).unwrap();
        assert_eq!(config.permission_mode(), PermissionMode::Standard);
        assert_eq!(config.defaults.max_parallel_workers, 4);
        assert_eq!(config.defaults.worker_cmd, "worker");
        assert_eq!(config.defaults.dispatch_timeout_secs, 1800);
        assert!(config.criteria_path().ends_with(".stagecraft/criteria.toml"));
    }

    #[test]
    fn test_file_values_override_defaults() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join(STAGECRAFT_DIR)).unwrap();
        fs::write(
            dir.path().join(STAGECRAFT_DIR).join("stagecraft.toml"),
            r#"
[project]
name = "payments"

[defaults]
permission_mode = "strict"
max_parallel_workers = 2

[gate]
criteria_file = "gates/criteria.toml"
"#,
        )
        .unwrap();

        let config = StagecraftConfig::load(dir.path()).unwrap();
        assert_eq!(config.project_name(), "payments");
        assert_eq!(config.permission_mode(), PermissionMode::Strict);
        assert_eq!(config.defaults.max_parallel_workers, 2);
        assert!(
            config
                .criteria_path()
                .ends_with(".stagecraft/gates/criteria.toml")
        );
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join(STAGECRAFT_DIR)).unwrap();
        fs::write(
            dir.path().join(STAGECRAFT_DIR).join("stagecraft.toml"),
            "defaults = 3",
        )
        .unwrap();
        assert!(StagecraftConfig::load(dir.path()).is_err());
    }

    #[test]
    fn test_project_name_falls_back_to_directory() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("checkout-service");
        fs::create_dir_all(&root).unwrap();
        let config = StagecraftConfig::load(&root).unwrap();
        assert_eq!(config.project_name(), "checkout-service");
    }
}
