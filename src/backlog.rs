//! Backlog grouping view.
//!
//! A pure read transform: tasks with no sprint, partitioned by epic,
//! with an "unassigned" group for epic-less tasks emitted last. Tasks
//! order by their stored position (not creation time); groups carry
//! their story-point totals.

use serde::Serialize;

use crate::epic::{Epic, EpicStore};
use crate::error::Result;
use crate::project::Project;
use crate::storage::Storage;
use crate::task::Task;

/// The epic heading of a backlog group
#[derive(Debug, Clone, Serialize)]
pub struct EpicSummary {
    pub id: String,
    pub code: String,
    pub title: String,
    pub color: String,
}

impl From<&Epic> for EpicSummary {
    fn from(epic: &Epic) -> Self {
        Self {
            id: epic.id.clone(),
            code: epic.code.clone(),
            title: epic.title.clone(),
            color: epic.color.clone(),
        }
    }
}

/// One backlog group: an epic (or none) and its unscheduled tasks
#[derive(Debug, Clone, Serialize)]
pub struct BacklogGroup {
    /// `None` marks the unassigned group
    #[serde(skip_serializing_if = "Option::is_none")]
    pub epic: Option<EpicSummary>,
    pub tasks: Vec<Task>,
    pub total_points: u32,
}

/// Group a project's backlog by epic
///
/// This is a partition of the unscheduled tasks: epic groups come
/// first in code order, only when they hold at least one task; the
/// unassigned group is appended when non-empty.
pub fn backlog_groups(storage: &Storage, project: &Project) -> Result<Vec<BacklogGroup>> {
    let epics = EpicStore::new(storage.clone()).list(&project.id)?;
    let tasks: crate::task::TaskSet =
        storage.read_json_or(&storage.tasks_file(&project.id), crate::task::TaskSet::empty)?;

    let mut backlog: Vec<Task> = tasks
        .tasks
        .into_iter()
        .filter(|task| task.sprint_id.is_none())
        .collect();
    backlog.sort_by(|a, b| a.position.cmp(&b.position).then_with(|| a.id.cmp(&b.id)));

    let mut groups: Vec<BacklogGroup> = Vec::with_capacity(epics.len() + 1);
    for epic in &epics {
        let group_tasks: Vec<Task> = backlog
            .iter()
            .filter(|task| task.epic_id.as_deref() == Some(epic.id.as_str()))
            .cloned()
            .collect();
        if group_tasks.is_empty() {
            continue;
        }
        groups.push(BacklogGroup {
            epic: Some(EpicSummary::from(epic)),
            total_points: points(&group_tasks),
            tasks: group_tasks,
        });
    }

    let unassigned: Vec<Task> = backlog
        .into_iter()
        .filter(|task| {
            task.epic_id
                .as_deref()
                .map(|epic_id| !epics.iter().any(|epic| epic.id == epic_id))
                .unwrap_or(true)
        })
        .collect();
    if !unassigned.is_empty() {
        groups.push(BacklogGroup {
            epic: None,
            total_points: points(&unassigned),
            tasks: unassigned,
        });
    }

    Ok(groups)
}

fn points(tasks: &[Task]) -> u32 {
    tasks.iter().filter_map(|task| task.story_points).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlanningConfig;
    use crate::epic::NewEpic;
    use crate::project::ProjectStore;
    use crate::sprint::{NewSprint, SprintStore};
    use crate::task::{NewTask, TaskStore};
    use tempfile::TempDir;

    fn setup() -> (TempDir, Storage, Project, TaskStore, EpicStore) {
        let dir = TempDir::new().expect("tempdir");
        let storage = Storage::new(dir.path());
        let config = PlanningConfig::default();
        let projects = ProjectStore::new(storage.clone(), config.clone());
        let project = projects
            .create("Apollo", "APO", None, Vec::new(), "alice")
            .expect("project");
        let tasks = TaskStore::new(storage.clone(), config);
        let epics = EpicStore::new(storage.clone());
        (dir, storage, project, tasks, epics)
    }

    fn add_task(
        tasks: &TaskStore,
        project: &Project,
        title: &str,
        epic_id: Option<&str>,
        points: Option<u32>,
    ) -> Task {
        let mut new = NewTask::new(title);
        new.epic_id = epic_id.map(|id| id.to_string());
        new.story_points = points;
        tasks.create(project, new, "alice").expect("task")
    }

    #[test]
    fn groups_partition_by_epic_with_unassigned_last() {
        let (_dir, storage, project, tasks, epics) = setup();
        let auth = epics
            .create(&project.id, &project.code, NewEpic::new("Auth"), "alice")
            .expect("epic");

        add_task(&tasks, &project, "Login", Some(&auth.id), Some(3));
        add_task(&tasks, &project, "Logout", Some(&auth.id), Some(2));
        add_task(&tasks, &project, "Loose end", None, Some(1));

        let groups = backlog_groups(&storage, &project).expect("groups");
        assert_eq!(groups.len(), 2);

        let auth_group = &groups[0];
        assert_eq!(auth_group.epic.as_ref().expect("epic").code, "APO-E1");
        assert_eq!(auth_group.tasks.len(), 2);
        assert_eq!(auth_group.total_points, 5);

        let unassigned = &groups[1];
        assert!(unassigned.epic.is_none());
        assert_eq!(unassigned.tasks.len(), 1);
        assert_eq!(unassigned.total_points, 1);
    }

    #[test]
    fn sprint_assigned_tasks_are_excluded() {
        let (_dir, storage, project, tasks, _epics) = setup();
        let kept = add_task(&tasks, &project, "Stays", None, Some(2));
        let moved = add_task(&tasks, &project, "Scheduled", None, Some(5));

        let sprints = SprintStore::new(storage.clone());
        let sprint = sprints
            .create(&project, NewSprint::new("Sprint 1"), "alice")
            .expect("sprint");
        sprints
            .assign_tasks(&project, &sprint.id, &[moved.id], "alice")
            .expect("assign");

        let groups = backlog_groups(&storage, &project).expect("groups");
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].tasks.len(), 1);
        assert_eq!(groups[0].tasks[0].id, kept.id);
        assert_eq!(groups[0].total_points, 2);
    }

    #[test]
    fn group_totals_cover_the_whole_backlog() {
        let (_dir, storage, project, tasks, epics) = setup();
        let epic = epics
            .create(&project.id, &project.code, NewEpic::new("Epic"), "alice")
            .expect("epic");

        add_task(&tasks, &project, "A", Some(&epic.id), Some(3));
        add_task(&tasks, &project, "B", None, Some(5));
        add_task(&tasks, &project, "C", None, None);

        let groups = backlog_groups(&storage, &project).expect("groups");
        let grouped_total: u32 = groups.iter().map(|group| group.total_points).sum();
        let task_total: u32 = tasks
            .list(&project)
            .expect("list")
            .iter()
            .filter(|task| task.sprint_id.is_none())
            .filter_map(|task| task.story_points)
            .sum();
        assert_eq!(grouped_total, task_total);
    }

    #[test]
    fn tasks_order_by_position_within_a_group() {
        let (_dir, storage, project, tasks, _epics) = setup();
        let first = add_task(&tasks, &project, "First", None, None);
        let second = add_task(&tasks, &project, "Second", None, None);

        // Manual reorder: move the later task ahead of the earlier one.
        let patch = crate::task::TaskPatch {
            position: Some(0),
            ..Default::default()
        };
        tasks
            .update(&project, &second.id, patch, "alice")
            .expect("reorder");

        let groups = backlog_groups(&storage, &project).expect("groups");
        assert_eq!(groups[0].tasks[0].id, second.id);
        assert_eq!(groups[0].tasks[1].id, first.id);
    }
}
