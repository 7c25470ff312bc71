//! Typed task dependencies.
//!
//! Edges are directed: `dependencies_of` answers "what does this task
//! point at", `dependents_of` answers "what points at this task". Both
//! endpoints must be tasks of the same project. Self-loops and exact
//! duplicates are rejected; cycles are not detected, so a task can be
//! made to indirectly block itself, and callers treating `Blocks` as a
//! scheduling constraint need to know that.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::storage::Storage;
use crate::task::TaskSet;

const DEPENDENCIES_SCHEMA_VERSION: &str = "tempo.dependencies.v1";

/// Relationship flavor carried by an edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyKind {
    Blocks,
    RelatesTo,
    Duplicates,
    DuplicatedBy,
}

impl DependencyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DependencyKind::Blocks => "blocks",
            DependencyKind::RelatesTo => "relates_to",
            DependencyKind::Duplicates => "duplicates",
            DependencyKind::DuplicatedBy => "duplicated_by",
        }
    }
}

impl fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One directed, typed edge between two tasks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDependency {
    pub id: String,
    pub from_task_id: String,
    pub to_task_id: String,
    pub kind: DependencyKind,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
}

/// Collection document for a project's dependency edges
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencySet {
    pub schema_version: String,
    pub edges: Vec<TaskDependency>,
}

impl DependencySet {
    pub fn empty() -> Self {
        Self {
            schema_version: DEPENDENCIES_SCHEMA_VERSION.to_string(),
            edges: Vec::new(),
        }
    }
}

/// Store for a project's dependency graph
#[derive(Debug, Clone)]
pub struct DependencyStore {
    storage: Storage,
}

impl DependencyStore {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// Add an edge
    ///
    /// Rejects self-loops and exact `(from, to, kind)` duplicates with
    /// `InvalidEdge`; unknown endpoints are `TaskNotFound`. No cycle
    /// check is performed.
    pub fn add(
        &self,
        project_id: &str,
        from_task_id: &str,
        to_task_id: &str,
        kind: DependencyKind,
        actor: &str,
    ) -> Result<TaskDependency> {
        if from_task_id == to_task_id {
            return Err(Error::InvalidEdge(format!(
                "a task cannot depend on itself: {from_task_id}"
            )));
        }
        self.require_task(project_id, from_task_id)?;
        self.require_task(project_id, to_task_id)?;

        let path = self.storage.dependencies_file(project_id);
        let from = from_task_id.to_string();
        let to = to_task_id.to_string();
        let actor = actor.to_string();
        let edge = self
            .storage
            .update_json(&path, DependencySet::empty, move |set: &mut DependencySet| {
                let duplicate = set.edges.iter().any(|edge| {
                    edge.from_task_id == from && edge.to_task_id == to && edge.kind == kind
                });
                if duplicate {
                    return Err(Error::InvalidEdge(format!(
                        "edge already exists: {from} {kind} {to}"
                    )));
                }

                let edge = TaskDependency {
                    id: Uuid::new_v4().to_string(),
                    from_task_id: from,
                    to_task_id: to,
                    kind,
                    created_at: Utc::now(),
                    created_by: Some(actor),
                };
                set.edges.push(edge.clone());
                Ok(edge)
            })?;

        tracing::debug!(edge = %edge.id, kind = %edge.kind, "dependency added");
        Ok(edge)
    }

    /// Remove an edge by id
    pub fn remove(&self, project_id: &str, edge_id: &str) -> Result<()> {
        let path = self.storage.dependencies_file(project_id);
        let id = edge_id.to_string();
        self.storage
            .update_json(&path, DependencySet::empty, move |set: &mut DependencySet| {
                let before = set.edges.len();
                set.edges.retain(|edge| edge.id != id);
                if set.edges.len() == before {
                    return Err(Error::DependencyNotFound(id.clone()));
                }
                Ok(())
            })
    }

    /// Edges where the task is the source ("this task blocks ...")
    pub fn dependencies_of(&self, project_id: &str, task_id: &str) -> Result<Vec<TaskDependency>> {
        let set = self.load(project_id)?;
        Ok(set
            .edges
            .into_iter()
            .filter(|edge| edge.from_task_id == task_id)
            .collect())
    }

    /// Edges where the task is the target ("... is blocked by this task")
    pub fn dependents_of(&self, project_id: &str, task_id: &str) -> Result<Vec<TaskDependency>> {
        let set = self.load(project_id)?;
        Ok(set
            .edges
            .into_iter()
            .filter(|edge| edge.to_task_id == task_id)
            .collect())
    }

    fn load(&self, project_id: &str) -> Result<DependencySet> {
        self.storage
            .read_json_or(&self.storage.dependencies_file(project_id), DependencySet::empty)
    }

    fn require_task(&self, project_id: &str, task_id: &str) -> Result<()> {
        let set: TaskSet = self
            .storage
            .read_json_or(&self.storage.tasks_file(project_id), TaskSet::empty)?;
        if set.find(task_id).is_some() {
            Ok(())
        } else {
            Err(Error::TaskNotFound(task_id.to_string()))
        }
    }
}
