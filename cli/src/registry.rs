//! Named backup tasks persisted as a JSON object.
//!
//! The file maps a task name to its source and destination:
//!
//! ```json
//! {
//!   "photos": {
//!     "source": "/home/me/photos",
//!     "destination": "/mnt/backup/photos"
//!   }
//! }
//! ```
//!
//! A missing or malformed file loads as an empty registry. Every successful
//! mutation is followed by a full rewrite via [`TaskRegistry::save`].

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::Context;
use backup_engine::{BackupTask, VerifyMode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Default registry file, relative to the working directory.
pub const DEFAULT_REGISTRY_FILE: &str = "backups.json";

/// Source and destination of one saved task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskEntry {
    pub source: PathBuf,
    pub destination: PathBuf,
}

impl TaskEntry {
    pub fn to_task(&self, verify_mode: VerifyMode) -> BackupTask {
        BackupTask::new(&self.source, &self.destination, verify_mode)
    }
}

/// Rejected registry mutations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Task name must not be empty")]
    EmptyName,

    #[error("Task '{0}' already exists")]
    AlreadyExists(String),

    #[error("Task '{0}' not found")]
    NotFound(String),

    #[error("New name is the same as the old name '{0}'")]
    SameName(String),
}

/// In-memory view of the registry file.
#[derive(Debug)]
pub struct TaskRegistry {
    path: PathBuf,
    tasks: BTreeMap<String, TaskEntry>,
}

impl TaskRegistry {
    /// An empty registry that will be saved to `path`.
    pub fn empty<P: AsRef<Path>>(path: P) -> Self {
        TaskRegistry {
            path: path.as_ref().to_path_buf(),
            tasks: BTreeMap::new(),
        }
    }

    /// Load the registry at `path`.
    ///
    /// # Errors
    /// Only I/O failures other than a missing file are errors; unparseable
    /// content yields an empty registry.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let data = match fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no registry file yet");
                return Ok(Self::empty(path));
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Could not read task registry {}", path.display()))
            }
        };

        let tasks = match serde_json::from_str(&data) {
            Ok(tasks) => tasks,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "malformed task registry, starting empty");
                BTreeMap::new()
            }
        };

        Ok(TaskRegistry {
            path: path.to_path_buf(),
            tasks,
        })
    }

    /// Rewrite the whole registry file.
    pub fn save(&self) -> anyhow::Result<()> {
        let data = serde_json::to_string_pretty(&self.tasks)
            .context("Could not serialize task registry")?;
        fs::write(&self.path, data)
            .with_context(|| format!("Could not save task registry {}", self.path.display()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, name: &str) -> Option<&TaskEntry> {
        self.tasks.get(name)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TaskEntry)> {
        self.tasks.iter().map(|(name, entry)| (name.as_str(), entry))
    }

    pub fn add(&mut self, name: &str, entry: TaskEntry) -> Result<(), RegistryError> {
        if name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if self.tasks.contains_key(name) {
            return Err(RegistryError::AlreadyExists(name.to_string()));
        }
        self.tasks.insert(name.to_string(), entry);
        Ok(())
    }

    pub fn rename(&mut self, old: &str, new: &str) -> Result<(), RegistryError> {
        if new.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if old == new {
            return Err(RegistryError::SameName(old.to_string()));
        }
        if self.tasks.contains_key(new) {
            return Err(RegistryError::AlreadyExists(new.to_string()));
        }
        let entry = self
            .tasks
            .remove(old)
            .ok_or_else(|| RegistryError::NotFound(old.to_string()))?;
        self.tasks.insert(new.to_string(), entry);
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Result<TaskEntry, RegistryError> {
        self.tasks
            .remove(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(src: &str, dst: &str) -> TaskEntry {
        TaskEntry {
            source: PathBuf::from(src),
            destination: PathBuf::from(dst),
        }
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let registry = TaskRegistry::load(temp_dir.path().join("backups.json")).expect("load");
        assert!(registry.is_empty());
    }

    #[test]
    fn test_malformed_file_loads_empty() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("backups.json");
        fs::write(&path, "{ not json").expect("Failed to write registry");

        let registry = TaskRegistry::load(&path).expect("load");
        assert!(registry.is_empty());
    }

    #[test]
    fn test_save_and_reload() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("backups.json");

        let mut registry = TaskRegistry::load(&path).expect("load");
        registry.add("photos", entry("/p", "/b/p")).expect("add");
        registry.add("docs", entry("/d", "/b/d")).expect("add");
        registry.save().expect("save");

        let reloaded = TaskRegistry::load(&path).expect("reload");
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.get("photos"), Some(&entry("/p", "/b/p")));
        let names: Vec<_> = reloaded.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["docs", "photos"]);
    }

    #[test]
    fn test_saved_format_is_plain_object() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("backups.json");

        let mut registry = TaskRegistry::empty(&path);
        registry.add("t", entry("/s", "/d")).expect("add");
        registry.save().expect("save");

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["t"]["source"], "/s");
        assert_eq!(value["t"]["destination"], "/d");
    }

    #[test]
    fn test_add_rejects_empty_and_duplicate_names() {
        let mut registry = TaskRegistry::empty("unused.json");
        assert_eq!(registry.add("", entry("/s", "/d")), Err(RegistryError::EmptyName));

        registry.add("t", entry("/s", "/d")).expect("add");
        assert_eq!(
            registry.add("t", entry("/x", "/y")),
            Err(RegistryError::AlreadyExists("t".to_string()))
        );
        assert_eq!(registry.get("t"), Some(&entry("/s", "/d")));
    }

    #[test]
    fn test_rename_rules() {
        let mut registry = TaskRegistry::empty("unused.json");
        registry.add("a", entry("/a", "/A")).expect("add");
        registry.add("b", entry("/b", "/B")).expect("add");

        assert_eq!(registry.rename("a", "a"), Err(RegistryError::SameName("a".to_string())));
        assert_eq!(registry.rename("a", ""), Err(RegistryError::EmptyName));
        assert_eq!(
            registry.rename("a", "b"),
            Err(RegistryError::AlreadyExists("b".to_string()))
        );
        assert_eq!(
            registry.rename("zzz", "c"),
            Err(RegistryError::NotFound("zzz".to_string()))
        );

        registry.rename("a", "c").expect("rename");
        assert!(registry.get("a").is_none());
        assert_eq!(registry.get("c"), Some(&entry("/a", "/A")));
    }

    #[test]
    fn test_remove() {
        let mut registry = TaskRegistry::empty("unused.json");
        registry.add("a", entry("/a", "/A")).expect("add");

        assert_eq!(registry.remove("a"), Ok(entry("/a", "/A")));
        assert_eq!(registry.remove("a"), Err(RegistryError::NotFound("a".to_string())));
    }

    #[test]
    fn test_entry_to_task() {
        let task = entry("/s", "/d").to_task(VerifyMode::Deep);
        assert_eq!(task, BackupTask::new("/s", "/d", VerifyMode::Deep));
    }
}
