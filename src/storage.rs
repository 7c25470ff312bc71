//! Storage layer for tempo.
//!
//! One directory root holds everything the planning core persists:
//!
//! ```text
//! <root>/
//!   planning.toml              # optional configuration
//!   projects.json              # registry of all projects
//!   projects/<project-id>/
//!     epics.json               # epic collection document
//!     tasks.json               # task collection document
//!     sprints.json             # sprint collection document
//!     dependencies.json        # dependency edge document
//!     time.jsonl               # time-entry ledger
//!     history.jsonl            # task-change ledger
//! ```
//!
//! Collection documents are read and rewritten whole; ledgers are
//! appended line by line. Every write is atomic (temp file + rename)
//! and every mutation holds an exclusive lock on the document's
//! `.lock` sibling, which is what makes check-and-set updates (such as
//! the single-active-sprint rule) safe across processes.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};

use crate::error::Result;
use crate::lock::{self, FileLock, DEFAULT_LOCK_TIMEOUT_MS};

/// Name of the configuration file at the storage root
pub const CONFIG_FILE: &str = "planning.toml";

/// Name of the project registry document
pub const PROJECTS_FILE: &str = "projects.json";

/// Name of the per-project subdirectory tree
pub const PROJECTS_DIR: &str = "projects";

/// Storage manager for planning state
#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    /// Create a storage manager rooted at the given directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    // =========================================================================
    // Path accessors
    // =========================================================================

    /// Path to the storage root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path to the `planning.toml` configuration file
    pub fn config_file(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }

    /// Path to the project registry document
    pub fn projects_file(&self) -> PathBuf {
        self.root.join(PROJECTS_FILE)
    }

    /// Path to a project's data directory
    pub fn project_dir(&self, project_id: &str) -> PathBuf {
        self.root.join(PROJECTS_DIR).join(project_id)
    }

    /// Path to a project's epic collection document
    pub fn epics_file(&self, project_id: &str) -> PathBuf {
        self.project_dir(project_id).join("epics.json")
    }

    /// Path to a project's task collection document
    pub fn tasks_file(&self, project_id: &str) -> PathBuf {
        self.project_dir(project_id).join("tasks.json")
    }

    /// Path to a project's sprint collection document
    pub fn sprints_file(&self, project_id: &str) -> PathBuf {
        self.project_dir(project_id).join("sprints.json")
    }

    /// Path to a project's dependency edge document
    pub fn dependencies_file(&self, project_id: &str) -> PathBuf {
        self.project_dir(project_id).join("dependencies.json")
    }

    /// Path to a project's time-entry ledger (JSONL)
    pub fn time_file(&self, project_id: &str) -> PathBuf {
        self.project_dir(project_id).join("time.jsonl")
    }

    /// Path to a project's task-change ledger (JSONL)
    pub fn history_file(&self, project_id: &str) -> PathBuf {
        self.project_dir(project_id).join("history.jsonl")
    }

    // =========================================================================
    // Directory initialization
    // =========================================================================

    /// Create the storage root
    pub fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        Ok(())
    }

    /// Create a project's data directory
    pub fn ensure_project_dir(&self, project_id: &str) -> Result<()> {
        fs::create_dir_all(self.project_dir(project_id))?;
        Ok(())
    }

    // =========================================================================
    // File I/O helpers (atomic writes for safety)
    // =========================================================================

    /// Write JSON data atomically (write to temp, then rename)
    pub fn write_json<T: Serialize>(&self, path: &Path, data: &T) -> Result<()> {
        let json = serde_json::to_string_pretty(data)?;
        lock::write_atomic(path, json.as_bytes())
    }

    /// Read JSON data from a file
    pub fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<T> {
        let content = fs::read_to_string(path)?;
        let data: T = serde_json::from_str(&content)?;
        Ok(data)
    }

    /// Read a JSON document, or build an empty one when the file is absent
    pub fn read_json_or<T, F>(&self, path: &Path, empty: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: FnOnce() -> T,
    {
        if !path.exists() {
            return Ok(empty());
        }
        self.read_json(path)
    }

    /// Lock, load (or build empty), mutate, and atomically rewrite a document
    ///
    /// The closure's result is returned to the caller; if it errors the
    /// document is left untouched.
    pub fn update_json<T, R, E, F>(&self, path: &Path, empty: E, mutate: F) -> Result<R>
    where
        T: Serialize + DeserializeOwned,
        E: FnOnce() -> T,
        F: FnOnce(&mut T) -> Result<R>,
    {
        let lock_path = document_lock_path(path);
        let _lock = FileLock::acquire(&lock_path, DEFAULT_LOCK_TIMEOUT_MS)?;

        let mut document = self.read_json_or(path, empty)?;
        let result = mutate(&mut document)?;

        let json = serde_json::to_string_pretty(&document)?;
        lock::write_atomic(path, json.as_bytes())?;

        Ok(result)
    }

    /// Append a record to a JSONL ledger under the ledger's lock
    pub fn append_jsonl<T: Serialize>(&self, path: &Path, record: &T) -> Result<()> {
        let lock_path = document_lock_path(path);
        let _lock = FileLock::acquire(&lock_path, DEFAULT_LOCK_TIMEOUT_MS)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string(record)?;
        let mut file = fs::OpenOptions::new().create(true).append(true).open(path)?;

        writeln!(file, "{}", json)?;
        file.sync_all()?;

        Ok(())
    }

    /// Read all records from a JSONL ledger
    pub fn read_jsonl<T: DeserializeOwned>(&self, path: &Path) -> Result<Vec<T>> {
        if !path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut records = Vec::new();

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: T = serde_json::from_str(&line)?;
            records.push(record);
        }

        Ok(records)
    }

    /// Rewrite a JSONL ledger whole, under its lock (used for deletions)
    pub fn write_jsonl<T: Serialize>(&self, path: &Path, records: &[T]) -> Result<()> {
        let lock_path = document_lock_path(path);
        let _lock = FileLock::acquire(&lock_path, DEFAULT_LOCK_TIMEOUT_MS)?;

        let mut buffer = Vec::new();
        for record in records {
            let json = serde_json::to_string(record)?;
            buffer.extend_from_slice(json.as_bytes());
            buffer.push(b'\n');
        }
        lock::write_atomic(path, &buffer)
    }
}

fn document_lock_path(path: &Path) -> PathBuf {
    PathBuf::from(format!("{}.lock", path.display()))
}
