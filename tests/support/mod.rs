use std::sync::Once;

use tempfile::TempDir;

use tempo::config::PlanningConfig;
use tempo::project::{Project, ProjectStore, WorkflowStage};
use tempo::storage::Storage;

static TRACING: Once = Once::new();

/// Install a test subscriber once; logs show up under RUST_LOG.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// A temp storage root with one project ready to plan against.
pub struct PlanningFixture {
    dir: TempDir,
    pub storage: Storage,
    pub config: PlanningConfig,
    pub project: Project,
}

impl PlanningFixture {
    /// Project with the default Todo / In Progress / Done stages
    pub fn new() -> Self {
        Self::with_stages(None)
    }

    /// Project with an explicit stage list
    pub fn with_stages(stages: Option<Vec<WorkflowStage>>) -> Self {
        init_tracing();
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = Storage::new(dir.path());
        storage.init().expect("init storage");
        let config = PlanningConfig::load_from_root(storage.root());

        let projects = ProjectStore::new(storage.clone(), config.clone());
        let project = projects
            .create("Apollo", "APO", stages, vec!["alice".to_string()], "alice")
            .expect("project");

        Self {
            dir,
            storage,
            config,
            project,
        }
    }

    pub fn root(&self) -> &std::path::Path {
        self.dir.path()
    }

    /// Id of the stage with the given name
    pub fn stage_named(&self, name: &str) -> String {
        self.project
            .stages
            .iter()
            .find(|stage| stage.name == name)
            .unwrap_or_else(|| panic!("no stage named {name}"))
            .id
            .clone()
    }

    /// Id of the first done-flagged stage
    pub fn done_stage(&self) -> String {
        self.project
            .stages
            .iter()
            .find(|stage| stage.is_done)
            .expect("done stage")
            .id
            .clone()
    }
}
