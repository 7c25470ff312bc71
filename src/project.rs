//! Project entities and workflow stages.
//!
//! A project owns the code prefix used by the identifier allocator, the
//! ordered list of workflow stages its tasks move through, and a member
//! list. Projects live in the `projects.json` registry document.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::PlanningConfig;
use crate::error::{Error, Result};
use crate::storage::Storage;

const PROJECTS_SCHEMA_VERSION: &str = "tempo.projects.v1";

/// One step of a project's workflow, ordered by position in the list
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkflowStage {
    pub id: String,
    pub name: String,
    /// Stage new tasks land in when no status is given
    #[serde(default)]
    pub is_default: bool,
    /// Tasks in this stage count as complete
    #[serde(default)]
    pub is_done: bool,
}

impl WorkflowStage {
    pub fn new(name: impl Into<String>, is_default: bool, is_done: bool) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            is_default,
            is_done,
        }
    }
}

/// Build the stage list used when a project is created without one
///
/// The first configured name becomes the default stage, the last the
/// done stage.
pub fn default_stages(config: &PlanningConfig) -> Vec<WorkflowStage> {
    let names = &config.stages.default_names;
    let last = names.len().saturating_sub(1);
    names
        .iter()
        .enumerate()
        .map(|(index, name)| WorkflowStage::new(name.clone(), index == 0, index == last))
        .collect()
}

/// Project record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    /// Uppercase short code, the prefix for generated epic/task codes
    pub code: String,
    /// Ordered workflow stages; never empty
    pub stages: Vec<WorkflowStage>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
}

impl Project {
    /// The stage the status resolver falls back to for new tasks
    pub fn default_stage(&self) -> Option<&WorkflowStage> {
        self.stages
            .iter()
            .find(|stage| stage.is_default)
            .or_else(|| self.stages.first())
    }

    /// Look up a stage by id
    pub fn stage(&self, stage_id: &str) -> Option<&WorkflowStage> {
        self.stages.iter().find(|stage| stage.id == stage_id)
    }

    /// Whether the given stage id marks tasks as complete
    pub fn stage_is_done(&self, stage_id: &str) -> bool {
        self.stage(stage_id).map(|stage| stage.is_done).unwrap_or(false)
    }
}

/// Registry document for all projects
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSet {
    pub schema_version: String,
    pub projects: Vec<Project>,
}

impl ProjectSet {
    pub fn empty() -> Self {
        Self {
            schema_version: PROJECTS_SCHEMA_VERSION.to_string(),
            projects: Vec::new(),
        }
    }

    fn find(&self, project_id: &str) -> Option<&Project> {
        self.projects.iter().find(|project| project.id == project_id)
    }

    fn find_mut(&mut self, project_id: &str) -> Option<&mut Project> {
        self.projects
            .iter_mut()
            .find(|project| project.id == project_id)
    }
}

/// Store for the project registry
#[derive(Debug, Clone)]
pub struct ProjectStore {
    storage: Storage,
    config: PlanningConfig,
}

impl ProjectStore {
    pub fn new(storage: Storage, config: PlanningConfig) -> Self {
        Self { storage, config }
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Create a project
    ///
    /// `stages` defaults to the configured stage set when omitted. The
    /// code is trimmed and uppercased; it must be alphanumeric and
    /// unique across projects.
    pub fn create(
        &self,
        name: &str,
        code: &str,
        stages: Option<Vec<WorkflowStage>>,
        members: Vec<String>,
        actor: &str,
    ) -> Result<Project> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidArgument(
                "project name cannot be empty".to_string(),
            ));
        }
        let code = normalize_code(code)?;
        let stages = stages.unwrap_or_else(|| default_stages(&self.config));
        validate_stages(&stages)?;

        let now = Utc::now();
        let project = Project {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            code,
            stages,
            members,
            created_at: now,
            updated_at: now,
            created_by: Some(actor.to_string()),
            updated_by: Some(actor.to_string()),
        };

        let path = self.storage.projects_file();
        let created = project.clone();
        self.storage
            .update_json(&path, ProjectSet::empty, move |set: &mut ProjectSet| {
                if set.projects.iter().any(|existing| existing.code == project.code) {
                    return Err(Error::InvalidArgument(format!(
                        "project code already in use: {}",
                        project.code
                    )));
                }
                set.projects.push(project);
                Ok(())
            })?;
        self.storage.ensure_project_dir(&created.id)?;

        tracing::debug!(project = %created.id, code = %created.code, "project created");
        Ok(created)
    }

    /// Fetch a project by id
    pub fn get(&self, project_id: &str) -> Result<Project> {
        let set: ProjectSet = self
            .storage
            .read_json_or(&self.storage.projects_file(), ProjectSet::empty)?;
        set.find(project_id)
            .cloned()
            .ok_or_else(|| Error::ProjectNotFound(project_id.to_string()))
    }

    /// List all projects
    pub fn list(&self) -> Result<Vec<Project>> {
        let set: ProjectSet = self
            .storage
            .read_json_or(&self.storage.projects_file(), ProjectSet::empty)?;
        Ok(set.projects)
    }

    /// Replace a project's stage list
    ///
    /// Reassigning tasks that referenced a removed stage is the
    /// caller's concern; this only validates and swaps the list.
    pub fn update_stages(
        &self,
        project_id: &str,
        stages: Vec<WorkflowStage>,
        actor: &str,
    ) -> Result<Project> {
        validate_stages(&stages)?;
        let path = self.storage.projects_file();
        let project_id = project_id.to_string();
        let actor = actor.to_string();
        self.storage
            .update_json(&path, ProjectSet::empty, move |set: &mut ProjectSet| {
                let project = set
                    .find_mut(&project_id)
                    .ok_or_else(|| Error::ProjectNotFound(project_id.clone()))?;
                project.stages = stages;
                project.updated_at = Utc::now();
                project.updated_by = Some(actor);
                Ok(project.clone())
            })
    }

    /// Replace a project's member list
    pub fn update_members(
        &self,
        project_id: &str,
        members: Vec<String>,
        actor: &str,
    ) -> Result<Project> {
        let path = self.storage.projects_file();
        let project_id = project_id.to_string();
        let actor = actor.to_string();
        self.storage
            .update_json(&path, ProjectSet::empty, move |set: &mut ProjectSet| {
                let project = set
                    .find_mut(&project_id)
                    .ok_or_else(|| Error::ProjectNotFound(project_id.clone()))?;
                project.members = members;
                project.updated_at = Utc::now();
                project.updated_by = Some(actor);
                Ok(project.clone())
            })
    }
}

fn normalize_code(code: &str) -> Result<String> {
    let trimmed = code.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidArgument(
            "project code cannot be empty".to_string(),
        ));
    }
    if !trimmed.chars().all(|ch| ch.is_ascii_alphanumeric()) {
        return Err(Error::InvalidArgument(format!(
            "project code must be alphanumeric: {trimmed}"
        )));
    }
    Ok(trimmed.to_ascii_uppercase())
}

fn validate_stages(stages: &[WorkflowStage]) -> Result<()> {
    if stages.is_empty() {
        return Err(Error::InvalidArgument(
            "a project needs at least one workflow stage".to_string(),
        ));
    }

    let mut ids = HashSet::new();
    for stage in stages {
        if stage.name.trim().is_empty() {
            return Err(Error::InvalidArgument(
                "workflow stage name cannot be empty".to_string(),
            ));
        }
        if !ids.insert(stage.id.as_str()) {
            return Err(Error::InvalidArgument(format!(
                "duplicate workflow stage id: {}",
                stage.id
            )));
        }
    }

    let defaults = stages.iter().filter(|stage| stage.is_default).count();
    if defaults > 1 {
        return Err(Error::InvalidArgument(
            "at most one workflow stage may be the default".to_string(),
        ));
    }

    Ok(())
}
