use std::collections::{BTreeMap, HashMap};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::{dependency_scan, StorageError};
use crate::domain::task::Task;
use crate::locks::FileLock;

/// Explicit load state for a lazily read file.
#[derive(Debug, Clone, Default)]
pub enum Loaded<T> {
    #[default]
    Unloaded,
    Ready(T),
}

impl<T> Loaded<T> {
    pub fn is_loaded(&self) -> bool {
        matches!(self, Loaded::Ready(_))
    }

    fn as_mut(&mut self) -> Option<&mut T> {
        match self {
            Loaded::Ready(value) => Some(value),
            Loaded::Unloaded => None,
        }
    }
}

enum Handle {
    Locked(FileLock),
    Plain(File),
}

impl Handle {
    fn file(&mut self) -> &mut File {
        match self {
            Handle::Locked(lock) => lock.file(),
            Handle::Plain(file) => file,
        }
    }
}

/// One data file and its in-memory cache.
#[derive(Debug, Clone)]
pub struct TaskFile {
    name: &'static str,
    path: PathBuf,
    read_only: bool,
    locking: bool,
    lock_timeout: Duration,
    has_ids: bool,
    auto_dep_scan: bool,
    tasks: Loaded<Vec<Task>>,
    lines: Loaded<Vec<String>>,
    added_tasks: Vec<Task>,
    modified_tasks: Vec<Task>,
    added_lines: Vec<String>,
    id_to_uuid: BTreeMap<u64, String>,
    uuid_to_id: HashMap<String, u64>,
    replaced: bool,
    dirty: bool,
}

impl TaskFile {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            path: PathBuf::new(),
            read_only: false,
            locking: true,
            lock_timeout: crate::locks::DEFAULT_TIMEOUT,
            has_ids: false,
            auto_dep_scan: false,
            tasks: Loaded::Unloaded,
            lines: Loaded::Unloaded,
            added_tasks: Vec::new(),
            modified_tasks: Vec::new(),
            added_lines: Vec::new(),
            id_to_uuid: BTreeMap::new(),
            uuid_to_id: HashMap::new(),
            replaced: false,
            dirty: false,
        }
    }

    /// Issue ids while loading and scan dependencies after each load.
    pub fn with_ids(mut self) -> Self {
        self.has_ids = true;
        self.auto_dep_scan = true;
        self
    }

    /// A missing file is writable; an existing one is read-only when it
    /// cannot be opened for writing.
    pub fn target(&mut self, path: &Path, locking: bool, lock_timeout: Duration) {
        self.path = path.to_path_buf();
        self.locking = locking;
        self.lock_timeout = lock_timeout;
        self.read_only = path.exists() && OpenOptions::new().append(true).open(path).is_err();
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read_only(&self) -> bool {
        self.read_only
    }

    pub fn tasks_loaded(&self) -> bool {
        self.tasks.is_loaded()
    }

    fn io_err(&self, source: std::io::Error) -> StorageError {
        StorageError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn open(&self) -> Result<Handle, StorageError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|err| self.io_err(err))?;
        }
        if self.locking {
            return Ok(Handle::Locked(FileLock::acquire(&self.path, self.lock_timeout)?));
        }
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .map(Handle::Plain)
            .map_err(|err| self.io_err(err))
    }

    fn read_physical(&self) -> Result<Vec<String>, StorageError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let mut content = String::new();
        if self.locking && !self.read_only {
            self.open()?
                .file()
                .read_to_string(&mut content)
                .map_err(|err| self.io_err(err))?;
        } else {
            content = std::fs::read_to_string(&self.path).map_err(|err| self.io_err(err))?;
        }
        Ok(content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Parses every line, issuing ids from `next_id` when this file has them.
    /// The first bad line aborts the load.
    pub fn load_tasks(&mut self, next_id: &mut u64) -> Result<(), StorageError> {
        let lines = self.read_physical()?;
        let mut tasks = Vec::with_capacity(lines.len() + self.added_tasks.len());
        for (index, line) in lines.iter().enumerate() {
            let mut task = Task::parse(line).map_err(|source| StorageError::Parse {
                path: self.path.clone(),
                line: index + 1,
                source,
            })?;
            if self.has_ids {
                self.issue_id(&mut task, next_id);
            }
            tasks.push(task);
        }
        for task in &self.added_tasks {
            if !tasks.iter().any(|known| known.uuid() == task.uuid()) {
                tasks.push(task.clone());
            }
        }
        if self.auto_dep_scan {
            dependency_scan(&mut tasks);
        }
        tracing::debug!(file = self.name, tasks = tasks.len(), "loaded tasks");
        self.tasks = Loaded::Ready(tasks);
        Ok(())
    }

    fn issue_id(&mut self, task: &mut Task, next_id: &mut u64) {
        task.id = *next_id;
        *next_id += 1;
        self.id_to_uuid.insert(task.id, task.uuid().to_string());
        self.uuid_to_id.insert(task.uuid().to_string(), task.id);
    }

    fn ensure_tasks(&mut self, next_id: &mut u64) -> Result<&mut Vec<Task>, StorageError> {
        if !self.tasks.is_loaded() {
            self.load_tasks(next_id)?;
        }
        match &mut self.tasks {
            Loaded::Ready(tasks) => Ok(tasks),
            Loaded::Unloaded => unreachable!("tasks are loaded above"),
        }
    }

    pub fn get_tasks(&mut self, next_id: &mut u64) -> Result<&[Task], StorageError> {
        Ok(self.ensure_tasks(next_id)?.as_slice())
    }

    pub fn get_lines(&mut self) -> Result<&[String], StorageError> {
        if !self.lines.is_loaded() {
            let mut lines = self.read_physical()?;
            lines.extend(self.added_lines.iter().cloned());
            self.lines = Loaded::Ready(lines);
        }
        Ok(match &self.lines {
            Loaded::Ready(lines) => lines.as_slice(),
            Loaded::Unloaded => &[],
        })
    }

    /// Scan starts at `id - 1`, where the task sat when ids were issued.
    pub fn get(&mut self, id: u64, next_id: &mut u64) -> Result<Option<Task>, StorageError> {
        let tasks = self.ensure_tasks(next_id)?;
        let start = (id.saturating_sub(1) as usize).min(tasks.len());
        Ok(tasks[start..]
            .iter()
            .chain(tasks[..start].iter())
            .find(|task| task.id == id)
            .cloned())
    }

    pub fn get_uuid(&mut self, uuid: &str, next_id: &mut u64) -> Result<Option<Task>, StorageError> {
        Ok(self
            .ensure_tasks(next_id)?
            .iter()
            .find(|task| task.uuid() == uuid)
            .cloned())
    }

    pub fn add_task(&mut self, mut task: Task, next_id: &mut u64) -> Result<(), StorageError> {
        self.ensure_tasks(next_id)?;
        if task.status().belongs_in_pending() {
            self.issue_id(&mut task, next_id);
        }
        if let Some(tasks) = self.tasks.as_mut() {
            tasks.push(task.clone());
        }
        self.added_tasks.push(task);
        self.dirty = true;
        Ok(())
    }

    /// Replaces the task with the same uuid, keeping its id. False when the
    /// uuid is not in this file.
    pub fn modify_task(&mut self, task: &Task, next_id: &mut u64) -> Result<bool, StorageError> {
        let tasks = self.ensure_tasks(next_id)?;
        let Some(slot) = tasks.iter_mut().find(|known| known.uuid() == task.uuid()) else {
            return Ok(false);
        };
        let id = slot.id;
        *slot = task.clone();
        slot.id = id;
        let stored = slot.clone();
        self.modified_tasks.retain(|known| known.uuid() != stored.uuid());
        self.modified_tasks.push(stored);
        self.dirty = true;
        Ok(true)
    }

    /// Swaps the whole task list; the next commit rewrites the file.
    pub fn set_tasks(&mut self, tasks: Vec<Task>) {
        self.id_to_uuid.clear();
        self.uuid_to_id.clear();
        for task in tasks.iter().filter(|task| task.id != 0) {
            self.id_to_uuid.insert(task.id, task.uuid().to_string());
            self.uuid_to_id.insert(task.uuid().to_string(), task.id);
        }
        self.tasks = Loaded::Ready(tasks);
        self.replaced = true;
        self.dirty = true;
    }

    pub fn add_line(&mut self, line: String) {
        if let Some(lines) = self.lines.as_mut() {
            lines.push(line.clone());
        }
        self.added_lines.push(line);
        self.dirty = true;
    }

    /// Swaps the raw line list; the next commit rewrites the file.
    pub fn set_lines(&mut self, lines: Vec<String>) {
        self.lines = Loaded::Ready(lines);
        self.added_lines.clear();
        self.replaced = true;
        self.dirty = true;
    }

    pub fn id_of(&self, uuid: &str) -> Option<u64> {
        self.uuid_to_id.get(uuid).copied()
    }

    pub fn uuid_of(&self, id: u64) -> Option<&str> {
        self.id_to_uuid.get(&id).map(String::as_str)
    }

    /// Tasks added or modified since the last commit.
    pub fn changes(&self) -> Vec<Task> {
        self.added_tasks
            .iter()
            .chain(self.modified_tasks.iter())
            .cloned()
            .collect()
    }

    /// Additions alone are appended; anything else rewrites the file from
    /// memory.
    pub fn commit(&mut self) -> Result<(), StorageError> {
        if !self.dirty {
            return Ok(());
        }
        let mut handle = self.open()?;
        let file = handle.file();
        if self.modified_tasks.is_empty() && !self.replaced {
            let mut out = String::new();
            for task in &self.added_tasks {
                out.push_str(&task.compose_f4());
                out.push('\n');
            }
            for line in &self.added_lines {
                out.push_str(line);
                out.push('\n');
            }
            file.seek(SeekFrom::End(0))
                .and_then(|_| file.write_all(out.as_bytes()))
                .map_err(|err| self.io_err(err))?;
            tracing::debug!(file = self.name, "appended");
        } else {
            let out = self.render();
            file.set_len(0)
                .and_then(|_| file.seek(SeekFrom::Start(0)))
                .and_then(|_| file.write_all(out.as_bytes()))
                .map_err(|err| self.io_err(err))?;
            tracing::debug!(file = self.name, "rewritten");
        }
        file.flush().map_err(|err| self.io_err(err))?;
        drop(handle);

        self.added_tasks.clear();
        self.modified_tasks.clear();
        self.added_lines.clear();
        self.replaced = false;
        self.dirty = false;
        Ok(())
    }

    fn render(&self) -> String {
        let mut out = String::new();
        match (&self.tasks, &self.lines) {
            (Loaded::Ready(tasks), _) => {
                for task in tasks {
                    out.push_str(&task.compose_f4());
                    out.push('\n');
                }
                for line in &self.added_lines {
                    out.push_str(line);
                    out.push('\n');
                }
            }
            (Loaded::Unloaded, Loaded::Ready(lines)) => {
                for line in lines {
                    out.push_str(line);
                    out.push('\n');
                }
            }
            (Loaded::Unloaded, Loaded::Unloaded) => {
                for line in &self.added_lines {
                    out.push_str(line);
                    out.push('\n');
                }
            }
        }
        out
    }

    /// Drops cached state so the next access rereads the file.
    pub fn clear(&mut self) {
        let name = self.name;
        let (has_ids, auto_dep_scan) = (self.has_ids, self.auto_dep_scan);
        let (path, locking, timeout) = (self.path.clone(), self.locking, self.lock_timeout);
        *self = TaskFile::new(name);
        self.has_ids = has_ids;
        self.auto_dep_scan = auto_dep_scan;
        self.target(&path, locking, timeout);
    }

    pub fn dump(&self) -> String {
        let count = |loaded: &Loaded<Vec<_>>| match loaded {
            Loaded::Ready(items) => items.len().to_string(),
            Loaded::Unloaded => "-".to_string(),
        };
        let lines = match &self.lines {
            Loaded::Ready(lines) => lines.len().to_string(),
            Loaded::Unloaded => "-".to_string(),
        };
        format!(
            "{:<10} {}{} T{}+{}~{} L{}+{}",
            self.name,
            if self.read_only { "r" } else { "w" },
            if self.dirty { "*" } else { " " },
            count(&self.tasks),
            self.added_tasks.len(),
            self.modified_tasks.len(),
            lines,
            self.added_lines.len()
        )
    }
}
