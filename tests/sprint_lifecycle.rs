use tempo::error::Error;
use tempo::sprint::{NewSprint, SprintStatus, SprintStore};
use tempo::task::{NewTask, Priority, TaskPatch, TaskStore};
use tempo::triage::{ApplyMode, Plan, PlanTask, Triage};

mod support;

#[test]
fn triage_created_sprint_blocks_manual_starts_until_completed() {
    let fixture = support::PlanningFixture::new();
    let triage = Triage::new(fixture.storage.clone(), fixture.config.clone());
    let sprints = SprintStore::new(fixture.storage.clone());

    let plan = Plan {
        tasks: vec![PlanTask::new("Kickoff work", Priority::Critical)],
        ..Plan::default()
    };
    let report = triage
        .apply(&fixture.project, plan, ApplyMode::New, "alice")
        .expect("apply");
    let active_id = report.sprint.expect("sprint").id;

    let queued = sprints
        .create(&fixture.project, NewSprint::new("Sprint 2"), "alice")
        .expect("create");
    let err = sprints
        .start(&fixture.project, &queued.id, "alice")
        .expect_err("second active sprint");
    assert!(matches!(err, Error::InvalidState(_)));

    sprints
        .complete(&fixture.project, &active_id, "alice")
        .expect("complete");
    let started = sprints
        .start(&fixture.project, &queued.id, "alice")
        .expect("start after completion");
    assert_eq!(started.status, SprintStatus::Active);
}

#[test]
fn completed_points_reflect_done_stage_at_completion_time() {
    let fixture = support::PlanningFixture::new();
    let tasks = TaskStore::new(fixture.storage.clone(), fixture.config.clone());
    let sprints = SprintStore::new(fixture.storage.clone());

    let sprint = sprints
        .create(&fixture.project, NewSprint::new("Sprint 1"), "alice")
        .expect("create");
    sprints
        .start(&fixture.project, &sprint.id, "alice")
        .expect("start");

    let mut ids = Vec::new();
    for (title, points) in [("One", 2), ("Two", 3), ("Three", 8)] {
        let mut new = NewTask::new(title);
        new.story_points = Some(points);
        ids.push(
            tasks
                .create(&fixture.project, new, "alice")
                .expect("task")
                .id,
        );
    }
    let assigned = sprints
        .assign_tasks(&fixture.project, &sprint.id, &ids, "alice")
        .expect("assign");
    assert_eq!(assigned.planned_points, 13);

    // Finish the first two; the third stays open.
    let done = fixture.done_stage();
    for id in &ids[..2] {
        let patch = TaskPatch {
            status_id: Some(done.clone()),
            ..TaskPatch::default()
        };
        tasks
            .update(&fixture.project, id, patch, "alice")
            .expect("finish");
    }

    let completed = sprints
        .complete(&fixture.project, &sprint.id, "alice")
        .expect("complete");
    assert_eq!(completed.status, SprintStatus::Completed);
    assert_eq!(completed.planned_points, 13);
    assert_eq!(completed.completed_points, 5);

    // The unfinished task is not bounced back to the backlog.
    let open = tasks.get(&fixture.project, &ids[2]).expect("open task");
    assert_eq!(open.sprint_id.as_deref(), Some(sprint.id.as_str()));
}

#[test]
fn single_active_rule_is_scoped_per_project() {
    let fixture = support::PlanningFixture::new();
    let sprints = SprintStore::new(fixture.storage.clone());

    let projects = tempo::project::ProjectStore::new(fixture.storage.clone(), fixture.config.clone());
    let other = projects
        .create("Zephyr", "ZEP", None, Vec::new(), "alice")
        .expect("second project");

    let first = sprints
        .create(&fixture.project, NewSprint::new("Sprint 1"), "alice")
        .expect("create");
    sprints
        .start(&fixture.project, &first.id, "alice")
        .expect("start");

    // The other project is free to run its own active sprint.
    let second = sprints
        .create(&other, NewSprint::new("Sprint 1"), "alice")
        .expect("create");
    sprints
        .start(&other, &second.id, "alice")
        .expect("start in other project");
}
