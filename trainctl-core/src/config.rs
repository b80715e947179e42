//! Engine configuration.
//!
//! Settings are layered with `figment`: built-in defaults, then the user
//! config file, then the workspace config file, then `TRAINCTL_*`
//! environment variables.

use crate::diagnostics::DiagnosticsConfig;
use crate::state::LoopConfig;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Policy document used when none is given on the command line.
    pub policy_path: Option<PathBuf>,
    pub diagnostics: DiagnosticsConfig,
    /// Include the full metric snapshot when logging a fired rule.
    pub log_fired_metrics: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            policy_path: None,
            diagnostics: DiagnosticsConfig::default(),
            log_fired_metrics: true,
        }
    }
}

/// User-level configuration file, e.g. `~/.config/trainctl/config.toml`.
pub fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "trainctl", "trainctl")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Workspace-level configuration file.
pub fn workspace_config_path(workspace: &Path) -> PathBuf {
    workspace.join(".trainctl").join("config.toml")
}

/// Load configuration with layered merging.
pub fn load_config(workspace: Option<&Path>) -> Result<EngineConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(EngineConfig::default()));

    if let Some(user_config) = user_config_path() {
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = workspace_config_path(ws);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // TRAINCTL_LOG_FIRED_METRICS, TRAINCTL_DIAGNOSTICS__MAX_RECENT, etc.
    figment = figment.merge(Env::prefixed("TRAINCTL_").split("__"));

    figment.extract().map_err(Box::new)
}

/// Load configuration from an explicit file instead of the user and workspace
/// files. Environment variables still apply on top.
pub fn load_config_file(path: &Path) -> Result<EngineConfig, Box<figment::Error>> {
    Figment::from(Serialized::defaults(EngineConfig::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("TRAINCTL_").split("__"))
        .extract()
        .map_err(Box::new)
}

/// Load a training loop configuration from a YAML (or JSON) file.
///
/// Fields missing from the file keep their defaults.
pub fn load_loop_config(path: &Path) -> Result<LoopConfig, Box<figment::Error>> {
    Figment::from(Serialized::defaults(LoopConfig::default()))
        .merge(Yaml::file(path))
        .extract()
        .map_err(Box::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::IntervalStrategy;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert!(config.policy_path.is_none());
        assert_eq!(config.diagnostics.max_recent, 64);
        assert!(config.diagnostics.log_failures);
        assert!(config.log_fired_metrics);
    }

    #[test]
    fn test_load_config_without_files_uses_defaults() {
        figment::Jail::expect_with(|jail| {
            let config = load_config(Some(jail.directory())).map_err(|e| e.to_string())?;
            assert!(config.policy_path.is_none());
            assert!(config.log_fired_metrics);
            Ok(())
        });
    }

    #[test]
    fn test_load_config_from_workspace() {
        figment::Jail::expect_with(|jail| {
            jail.create_dir(".trainctl")?;
            jail.create_file(
                ".trainctl/config.toml",
                "[diagnostics]\nmax_recent = 8\nlog_failures = false\n",
            )?;

            let config = load_config(Some(jail.directory())).map_err(|e| e.to_string())?;
            assert_eq!(config.diagnostics.max_recent, 8);
            assert!(!config.diagnostics.log_failures);
            Ok(())
        });
    }

    #[test]
    fn test_env_overrides_workspace_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_dir(".trainctl")?;
            jail.create_file(".trainctl/config.toml", "[diagnostics]\nmax_recent = 8\n")?;
            jail.set_env("TRAINCTL_DIAGNOSTICS__MAX_RECENT", "3");

            let config = load_config(Some(jail.directory())).map_err(|e| e.to_string())?;
            assert_eq!(config.diagnostics.max_recent, 3);
            Ok(())
        });
    }

    #[test]
    fn test_load_config_file_explicit() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("engine.toml", "log_fired_metrics = false\npolicy_path = \"p.yaml\"\n")?;
            let config = load_config_file(&jail.directory().join("engine.toml"))
                .map_err(|e| e.to_string())?;
            assert!(!config.log_fired_metrics);
            assert_eq!(config.policy_path, Some(PathBuf::from("p.yaml")));
            assert_eq!(config.diagnostics.max_recent, 64);
            Ok(())
        });
    }

    #[test]
    fn test_load_loop_config_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loop.yaml");
        std::fs::write(&path, "eval_strategy: epoch\nlogging_steps: 10\n").unwrap();

        let config = load_loop_config(&path).unwrap();
        assert_eq!(config.eval_strategy, IntervalStrategy::Epoch);
        assert_eq!(config.logging_steps, 10);
        assert_eq!(config.save_steps, 500);
    }
}
