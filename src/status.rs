//! Abstract status resolution.
//!
//! Imports and generated plans describe task state with a three-value
//! abstract status; each project defines its own ordered stage list.
//! The resolver maps one onto the other with deliberately approximate
//! name matching so arbitrary stage names keep working:
//!
//! - `Todo` (or no status) -> the default-flagged stage, else the first
//! - `InProgress` -> first stage whose name contains a marker token,
//!   else the second stage, else the default rule
//! - `Done` -> the done-flagged stage, else the last

use serde::{Deserialize, Serialize};

use crate::config::PlanningConfig;
use crate::error::{Error, Result};
use crate::project::WorkflowStage;

/// Externally supplied task state, before stage resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbstractStatus {
    Todo,
    InProgress,
    Done,
}

impl AbstractStatus {
    /// Parse the spellings import payloads use
    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_lowercase().replace(['-', '_'], " ");
        match normalized.as_str() {
            "todo" | "to do" | "open" => Some(Self::Todo),
            "in progress" | "doing" | "started" => Some(Self::InProgress),
            "done" | "closed" | "complete" | "completed" => Some(Self::Done),
            _ => None,
        }
    }
}

/// Maps abstract statuses onto one project's stage list
///
/// Built per request from the project's stages and the configured
/// marker tokens; holds the fallback rules in one place.
#[derive(Debug)]
pub struct StageResolver<'a> {
    stages: &'a [WorkflowStage],
    markers: &'a [String],
}

impl<'a> StageResolver<'a> {
    pub fn new(stages: &'a [WorkflowStage], config: &'a PlanningConfig) -> Self {
        Self {
            stages,
            markers: &config.stages.in_progress_markers,
        }
    }

    /// Resolve an abstract status to a stage id
    pub fn resolve(&self, status: Option<AbstractStatus>) -> Result<String> {
        if self.stages.is_empty() {
            return Err(Error::InvalidState(
                "project has no workflow stages".to_string(),
            ));
        }

        let stage = match status {
            None | Some(AbstractStatus::Todo) => self.default_stage(),
            Some(AbstractStatus::InProgress) => self
                .marker_stage()
                .or_else(|| self.stages.get(1))
                .unwrap_or_else(|| self.default_stage()),
            Some(AbstractStatus::Done) => self
                .stages
                .iter()
                .find(|stage| stage.is_done)
                .or_else(|| self.stages.last())
                .unwrap_or_else(|| self.default_stage()),
        };

        Ok(stage.id.clone())
    }

    fn default_stage(&self) -> &'a WorkflowStage {
        self.stages
            .iter()
            .find(|stage| stage.is_default)
            .unwrap_or(&self.stages[0])
    }

    fn marker_stage(&self) -> Option<&'a WorkflowStage> {
        self.stages.iter().find(|stage| {
            let name = stage.name.to_lowercase();
            self.markers.iter().any(|marker| name.contains(marker.as_str()))
        })
    }
}
