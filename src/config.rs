//! Configuration loading and management.
//!
//! Handles parsing of `planning.toml` at the storage root. Every field
//! has a default, so a missing file yields a usable configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanningConfig {
    /// Sprint configuration
    #[serde(default)]
    pub sprint: SprintConfig,

    /// Workflow stage configuration
    #[serde(default)]
    pub stages: StageConfig,
}

impl Default for PlanningConfig {
    fn default() -> Self {
        Self {
            sprint: SprintConfig::default(),
            stages: StageConfig::default(),
        }
    }
}

/// Sprint-related configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SprintConfig {
    /// Planned window length for auto-created sprints, in days
    #[serde(default = "default_sprint_length_days")]
    pub length_days: i64,
}

fn default_sprint_length_days() -> i64 {
    14
}

impl Default for SprintConfig {
    fn default() -> Self {
        Self {
            length_days: default_sprint_length_days(),
        }
    }
}

/// Workflow stage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    /// Lowercased tokens that mark a stage name as "in progress"
    ///
    /// The status resolver treats the first stage whose name contains
    /// any of these as the in-progress stage.
    #[serde(default = "default_in_progress_markers")]
    pub in_progress_markers: Vec<String>,

    /// Stage names used when a project is created without an explicit
    /// stage list. The first becomes the default stage, the last the
    /// done stage.
    #[serde(default = "default_stage_names")]
    pub default_names: Vec<String>,
}

fn default_in_progress_markers() -> Vec<String> {
    vec![
        "in progress".to_string(),
        "in-progress".to_string(),
        "in_progress".to_string(),
        "doing".to_string(),
    ]
}

fn default_stage_names() -> Vec<String> {
    vec![
        "Todo".to_string(),
        "In Progress".to_string(),
        "Done".to_string(),
    ]
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            in_progress_markers: default_in_progress_markers(),
            default_names: default_stage_names(),
        }
    }
}

impl PlanningConfig {
    /// Load configuration from a `planning.toml` file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: PlanningConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the storage root, or return defaults
    pub fn load_from_root(root: &Path) -> Self {
        let config_path = root.join(crate::storage::CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path).unwrap_or_default()
        } else {
            Self::default()
        }
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.sprint.length_days <= 0 {
            return Err(Error::InvalidConfig(
                "sprint.length_days must be > 0".to_string(),
            ));
        }

        if self.stages.in_progress_markers.is_empty() {
            return Err(Error::InvalidConfig(
                "stages.in_progress_markers cannot be empty".to_string(),
            ));
        }
        for marker in &self.stages.in_progress_markers {
            if marker.trim().is_empty() {
                return Err(Error::InvalidConfig(
                    "stages.in_progress_markers cannot include empty entries".to_string(),
                ));
            }
        }

        if self.stages.default_names.is_empty() {
            return Err(Error::InvalidConfig(
                "stages.default_names cannot be empty".to_string(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for name in &self.stages.default_names {
            let trimmed = name.trim();
            if trimmed.is_empty() {
                return Err(Error::InvalidConfig(
                    "stages.default_names cannot include empty entries".to_string(),
                ));
            }
            if !seen.insert(trimmed.to_string()) {
                return Err(Error::InvalidConfig(format!(
                    "stages.default_names has duplicate entry '{trimmed}'"
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn defaults_are_expected() {
        let cfg = PlanningConfig::default();
        assert_eq!(cfg.sprint.length_days, 14);
        assert!(cfg
            .stages
            .in_progress_markers
            .contains(&"in progress".to_string()));
        assert_eq!(
            cfg.stages.default_names,
            vec![
                "Todo".to_string(),
                "In Progress".to_string(),
                "Done".to_string()
            ]
        );
    }

    #[test]
    fn load_parses_overrides() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("planning.toml");
        let content = r#"
[sprint]
length_days = 7

[stages]
in_progress_markers = ["doing", "wip"]
default_names = ["Backlog", "Doing", "Shipped"]
"#;
        fs::write(&path, content.trim()).expect("write config");

        let cfg = PlanningConfig::load(&path).expect("load config");
        assert_eq!(cfg.sprint.length_days, 7);
        assert_eq!(
            cfg.stages.in_progress_markers,
            vec!["doing".to_string(), "wip".to_string()]
        );
        assert_eq!(
            cfg.stages.default_names,
            vec![
                "Backlog".to_string(),
                "Doing".to_string(),
                "Shipped".to_string()
            ]
        );
    }

    #[test]
    fn invalid_sprint_length_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("planning.toml");
        fs::write(&path, "[sprint]\nlength_days = 0").expect("write config");

        let err = PlanningConfig::load(&path).expect_err("invalid config");
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn duplicate_stage_names_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("planning.toml");
        fs::write(&path, "[stages]\ndefault_names = [\"Todo\", \"Todo\"]")
            .expect("write config");

        let err = PlanningConfig::load(&path).expect_err("invalid config");
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn load_from_root_defaults_when_missing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = PlanningConfig::load_from_root(dir.path());
        assert_eq!(cfg.sprint.length_days, 14);
    }

    #[test]
    fn save_writes_toml() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.toml");
        let cfg = PlanningConfig::default();
        cfg.save(&path).expect("save config");

        let written = fs::read_to_string(&path).expect("read config");
        assert!(written.contains("length_days = 14"));
    }
}
