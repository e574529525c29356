//! Configuration of a `jobstep run`, loaded from `jobstep.toml`.
//!
//! [`JobStepConfig`] describes the parent job, the nested step and the child
//! command it launches. Missing values fall back to defaults. The
//! `JOBSTEP_STORE` environment variable takes precedence over the file for
//! the repository location.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// How the child job is launched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LauncherMode {
    /// On the calling thread.
    #[default]
    Sync,
    /// As a supervised task on a tokio runtime.
    Task,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobStepConfig {
    /// Name of the parent job that owns the nested step.
    #[serde(default = "default_parent_job")]
    pub parent_job: String,

    /// Name of the nested step.
    #[serde(default = "default_step_name")]
    pub step_name: String,

    /// Execution context keys copied into the child's parameters.
    #[serde(default)]
    pub keys: Vec<String>,

    /// Also hand the parent job's parameters to the child.
    #[serde(default)]
    pub use_all_parent_parameters: bool,

    #[serde(default)]
    pub launcher: LauncherMode,

    /// JSON file holding job executions; in-memory when unset.
    #[serde(default)]
    pub store: Option<PathBuf>,

    #[serde(default)]
    pub child: ChildConfig,
}

/// The child job: an external command.
#[derive(Debug, Clone, Deserialize)]
pub struct ChildConfig {
    #[serde(default = "default_child_name")]
    pub name: String,

    #[serde(default)]
    pub command: Vec<String>,

    #[serde(default = "default_restartable")]
    pub restartable: bool,

    /// Non-zero process exit codes that count as success, with the exit code
    /// reported for them. TOML keys are strings, e.g. `"3" = "COMPLETED_WITH_SKIPS"`.
    #[serde(default)]
    pub exit_codes: BTreeMap<String, String>,
}

fn default_parent_job() -> String {
    "parent".to_string()
}

fn default_step_name() -> String {
    "nested".to_string()
}

fn default_child_name() -> String {
    "child".to_string()
}

fn default_restartable() -> bool {
    true
}

impl Default for ChildConfig {
    fn default() -> Self {
        Self {
            name: default_child_name(),
            command: Vec::new(),
            restartable: default_restartable(),
            exit_codes: BTreeMap::new(),
        }
    }
}

impl Default for JobStepConfig {
    fn default() -> Self {
        Self {
            parent_job: default_parent_job(),
            step_name: default_step_name(),
            keys: Vec::new(),
            use_all_parent_parameters: false,
            launcher: LauncherMode::default(),
            store: None,
            child: ChildConfig::default(),
        }
    }
}

impl ChildConfig {
    /// The exit code map with numeric keys.
    pub fn parsed_exit_codes(&self) -> Result<BTreeMap<i32, String>> {
        self.exit_codes
            .iter()
            .map(|(code, exit)| {
                let code = code
                    .trim()
                    .parse::<i32>()
                    .with_context(|| format!("invalid process exit code '{code}'"))?;
                Ok((code, exit.clone()))
            })
            .collect()
    }
}

impl JobStepConfig {
    /// Load `path`, or defaults if it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            toml::from_str::<JobStepConfig>(&contents)
                .with_context(|| format!("parsing {}", path.display()))?
        } else {
            Self::default()
        };

        if let Ok(store) = std::env::var("JOBSTEP_STORE")
            && !store.is_empty()
        {
            config.store = Some(PathBuf::from(store));
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = JobStepConfig::default();
        assert_eq!(config.parent_job, "parent");
        assert_eq!(config.step_name, "nested");
        assert_eq!(config.child.name, "child");
        assert!(config.child.restartable);
        assert!(config.keys.is_empty());
        assert_eq!(config.launcher, LauncherMode::Sync);
        assert!(!config.use_all_parent_parameters);
    }

    #[test]
    fn deserialize_partial_toml() {
        let toml_str = r#"
            keys = ["input", "chunk(long)"]
            launcher = "task"

            [child]
            name = "import"
            command = ["sh", "-c", "exit 0"]

            [child.exit_codes]
            "3" = "COMPLETED_WITH_SKIPS"
        "#;
        let config: JobStepConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.keys, vec!["input", "chunk(long)"]);
        assert_eq!(config.launcher, LauncherMode::Task);
        assert_eq!(config.child.name, "import");
        assert_eq!(config.child.command.len(), 3);
        assert!(config.child.restartable);
        assert_eq!(config.parent_job, "parent");
        assert_eq!(
            config.child.parsed_exit_codes().unwrap().get(&3).map(String::as_str),
            Some("COMPLETED_WITH_SKIPS")
        );
    }

    #[test]
    fn bad_exit_code_key_is_reported() {
        let mut child = ChildConfig::default();
        child.exit_codes.insert("three".into(), "X".into());
        assert!(child.parsed_exit_codes().is_err());
    }

    #[test]
    fn load_reads_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobstep.toml");
        std::fs::write(&path, "step_name = \"import-step\"\n").unwrap();
        let config = JobStepConfig::load(&path).unwrap();
        assert_eq!(config.step_name, "import-step");
    }

    #[test]
    fn load_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = JobStepConfig::load(&dir.path().join("missing.toml")).unwrap();
        assert_eq!(config.step_name, "nested");
    }
}
