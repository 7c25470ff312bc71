use tempo::deps::{DependencyKind, DependencyStore};
use tempo::error::Error;
use tempo::task::{NewTask, Priority, TaskPatch, TaskStore};
use tempo::timelog::TimeStore;

mod support;

fn day(s: &str) -> chrono::NaiveDate {
    s.parse().expect("date")
}

#[test]
fn a_tasks_audit_trail_follows_its_edits() {
    let fixture = support::PlanningFixture::new();
    let tasks = TaskStore::new(fixture.storage.clone(), fixture.config.clone());

    let task = tasks
        .create(&fixture.project, NewTask::new("Draft parser"), "alice")
        .expect("create");

    let patch = TaskPatch {
        title: Some("Draft the config parser".to_string()),
        priority: Some(Priority::High),
        ..TaskPatch::default()
    };
    tasks
        .update(&fixture.project, &task.id, patch, "alice")
        .expect("first edit");

    let patch = TaskPatch {
        status_id: Some(fixture.stage_named("In Progress")),
        assignee_id: Some(Some("bob".to_string())),
        ..TaskPatch::default()
    };
    tasks
        .update(&fixture.project, &task.id, patch, "bob")
        .expect("second edit");

    let rows = tasks
        .history()
        .for_task(&fixture.project.id, &task.id)
        .expect("history");
    assert_eq!(rows.len(), 4);

    let fields: Vec<&str> = rows.iter().map(|row| row.field.as_str()).collect();
    assert_eq!(fields, vec!["title", "priority", "status_id", "assignee_id"]);
    assert_eq!(rows[0].actor, "alice");
    assert_eq!(rows[2].actor, "bob");
    assert_eq!(rows[1].old.as_deref(), Some("medium"));
    assert_eq!(rows[1].new.as_deref(), Some("high"));
}

#[test]
fn logged_hours_aggregate_and_survive_foreign_delete_attempts() {
    let fixture = support::PlanningFixture::new();
    let tasks = TaskStore::new(fixture.storage.clone(), fixture.config.clone());
    let time = TimeStore::new(fixture.storage.clone());

    let task = tasks
        .create(&fixture.project, NewTask::new("Instrumented"), "alice")
        .expect("create");

    let first = time
        .log(
            &fixture.project.id,
            &task.id,
            "alice",
            3.0,
            Some("spike".to_string()),
            day("2026-08-01"),
        )
        .expect("log");
    time.log(
        &fixture.project.id,
        &task.id,
        "bob",
        1.5,
        None,
        day("2026-08-02"),
    )
    .expect("log");

    assert_eq!(
        time.logged_hours(&fixture.project.id, &task.id)
            .expect("sum"),
        4.5
    );

    let err = time
        .delete(&fixture.project.id, &first.id, "bob")
        .expect_err("not the author");
    assert!(matches!(err, Error::InvalidArgument(_)));

    time.delete(&fixture.project.id, &first.id, "alice")
        .expect("author delete");
    assert_eq!(
        time.logged_hours(&fixture.project.id, &task.id)
            .expect("sum"),
        1.5
    );
}

#[test]
fn deleting_a_task_erases_its_ledgers_and_edges() {
    let fixture = support::PlanningFixture::new();
    let tasks = TaskStore::new(fixture.storage.clone(), fixture.config.clone());
    let time = TimeStore::new(fixture.storage.clone());
    let deps = DependencyStore::new(fixture.storage.clone());

    let doomed = tasks
        .create(&fixture.project, NewTask::new("Doomed"), "alice")
        .expect("create");
    let survivor = tasks
        .create(&fixture.project, NewTask::new("Survivor"), "alice")
        .expect("create");

    let patch = TaskPatch {
        priority: Some(Priority::Critical),
        ..TaskPatch::default()
    };
    tasks
        .update(&fixture.project, &doomed.id, patch, "alice")
        .expect("edit");
    time.log(
        &fixture.project.id,
        &doomed.id,
        "alice",
        2.0,
        None,
        day("2026-08-01"),
    )
    .expect("log");
    deps.add(
        &fixture.project.id,
        &doomed.id,
        &survivor.id,
        DependencyKind::Blocks,
        "alice",
    )
    .expect("edge");

    tasks.delete(&fixture.project, &doomed.id).expect("delete");

    assert!(matches!(
        tasks.get(&fixture.project, &doomed.id),
        Err(Error::TaskNotFound(_))
    ));
    assert!(tasks
        .history()
        .for_task(&fixture.project.id, &doomed.id)
        .expect("history")
        .is_empty());
    assert_eq!(
        time.logged_hours(&fixture.project.id, &doomed.id)
            .expect("sum"),
        0.0
    );
    assert!(deps
        .dependents_of(&fixture.project.id, &survivor.id)
        .expect("edges")
        .is_empty());

    // The other endpoint is untouched.
    tasks
        .get(&fixture.project, &survivor.id)
        .expect("survivor still there");
}
