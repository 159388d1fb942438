//! Durable storage for `Project` aggregates.
//!
//! One JSON document per project under a state directory. `save` is
//! all-or-nothing: the aggregate is validated, serialized to a temp file,
//! and renamed into place while an exclusive advisory lock on a sidecar
//! lock file is held. Concurrent saves from different sessions serialize on
//! that lock, so the last writer's state is always internally consistent.

use crate::errors::StateError;
use crate::state::project::Project;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct ProjectStore {
    dir: PathBuf,
}

impl ProjectStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: &Path) -> Result<Self, StateError> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    fn document_path(&self, project_id: &str) -> PathBuf {
        self.dir.join(format!("{project_id}.json"))
    }

    fn lock_path(&self, project_id: &str) -> PathBuf {
        self.dir.join(format!("{project_id}.lock"))
    }

    fn acquire_lock(&self, project_id: &str) -> Result<File, StateError> {
        let lock = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(self.lock_path(project_id))?;
        lock.lock_exclusive()?;
        Ok(lock)
    }

    /// Load a project document.
    pub fn load(&self, project_id: &str) -> Result<Project, StateError> {
        let path = self.document_path(project_id);
        if !path.exists() {
            return Err(StateError::ProjectNotFound {
                id: project_id.to_string(),
                dir: self.dir.clone(),
            });
        }
        let lock = self.acquire_lock(project_id)?;
        let content = fs::read_to_string(&path)?;
        let project = serde_json::from_str(&content)?;
        fs2::FileExt::unlock(&lock)?;
        Ok(project)
    }

    /// Persist a project document atomically.
    ///
    /// Validation runs first: an aggregate whose stage statuses disagree
    /// with their evolution contexts never reaches disk.
    pub fn save(&self, project: &Project) -> Result<(), StateError> {
        project.validate()?;

        let lock = self.acquire_lock(&project.id)?;
        let result = self.write_locked(project);
        fs2::FileExt::unlock(&lock)?;
        result
    }

    fn write_locked(&self, project: &Project) -> Result<(), StateError> {
        let path = self.document_path(&project.id);
        let tmp = self.dir.join(format!("{}.json.tmp", project.id));
        let content = serde_json::to_string_pretty(project)?;
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &path)?;
        debug!(project = %project.id, "project state saved");
        Ok(())
    }

    /// Atomic read-modify-write under one lock acquisition.
    pub fn update<F, T>(&self, project_id: &str, mutate: F) -> Result<T, StateError>
    where
        F: FnOnce(&mut Project) -> Result<T, StateError>,
    {
        let path = self.document_path(project_id);
        let lock = self.acquire_lock(project_id)?;
        let result = (|| {
            if !path.exists() {
                return Err(StateError::ProjectNotFound {
                    id: project_id.to_string(),
                    dir: self.dir.clone(),
                });
            }
            let content = fs::read_to_string(&path)?;
            let mut project: Project = serde_json::from_str(&content)?;
            let value = mutate(&mut project)?;
            project.validate()?;
            self.write_locked(&project)?;
            Ok(value)
        })();
        fs2::FileExt::unlock(&lock)?;
        result
    }

    /// Append an audit record and persist, all under one lock.
    pub fn append_history(
        &self,
        project_id: &str,
        action: &str,
        detail: &str,
    ) -> Result<(), StateError> {
        self.update(project_id, |project| {
            project.record(action, detail);
            Ok(())
        })
    }

    /// List the project ids present in the store.
    pub fn list(&self) -> Result<Vec<String>, StateError> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json")
                && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
            {
                ids.push(stem.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}
