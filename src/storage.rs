pub mod file;
pub mod undo;

use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::dates;
use crate::domain::columns::ColumnTable;
use crate::domain::status::Status;
use crate::domain::task::{Task, TaskError};
use crate::hooks::{HookError, Hooks, NoHooks};
use crate::locks::{LockError, DEFAULT_TIMEOUT};
use crate::perf::{PerfReport, Timer};
use crate::signals::SignalGuard;

use self::file::TaskFile;
use self::undo::{RevertCase, Transaction};

#[derive(Debug)]
pub enum StorageError {
    Io { path: PathBuf, source: std::io::Error },
    Lock(LockError),
    Parse {
        path: PathBuf,
        line: usize,
        source: TaskError,
    },
    DuplicateUuid(String),
    NothingToUndo,
    UndoMissingUuid,
    Synchronized,
    Hook(HookError),
    Task(TaskError),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Io { path, source } => write!(f, "{}: {}", path.display(), source),
            StorageError::Lock(err) => write!(f, "{}", err),
            StorageError::Parse { path, line, source } => write!(
                f,
                "line {} in {} is not a valid task: {}",
                line,
                path.display(),
                source
            ),
            StorageError::DuplicateUuid(uuid) => write!(
                f,
                "Cannot add task because the uuid '{}' is not unique.",
                uuid
            ),
            StorageError::NothingToUndo => {
                write!(f, "There are no recorded transactions to undo.")
            }
            StorageError::UndoMissingUuid => write!(f, "Cannot locate UUID in task to undo."),
            StorageError::Synchronized => write!(
                f,
                "Cannot undo change because this change was synchronized and cannot be undone."
            ),
            StorageError::Hook(err) => write!(f, "{}", err),
            StorageError::Task(err) => write!(f, "{}", err),
        }
    }
}

impl Error for StorageError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            StorageError::Io { source, .. } => Some(source),
            StorageError::Lock(err) => Some(err),
            StorageError::Parse { source, .. } => Some(source),
            StorageError::Hook(err) => Some(err),
            StorageError::Task(err) => Some(err),
            _ => None,
        }
    }
}

impl From<LockError> for StorageError {
    fn from(value: LockError) -> Self {
        StorageError::Lock(value)
    }
}

impl From<HookError> for StorageError {
    fn from(value: HookError) -> Self {
        StorageError::Hook(value)
    }
}

impl From<TaskError> for StorageError {
    fn from(value: TaskError) -> Self {
        StorageError::Task(value)
    }
}

/// Everything the database needs from the outside, built once per process.
pub struct StorageContext {
    pub location: PathBuf,
    pub locking: bool,
    pub lock_timeout: Duration,
    pub gc: bool,
    pub default_project: String,
    pub columns: ColumnTable,
    pub hooks: Box<dyn Hooks>,
}

impl StorageContext {
    pub fn new(location: &Path) -> Self {
        Self {
            location: location.to_path_buf(),
            locking: true,
            lock_timeout: DEFAULT_TIMEOUT,
            gc: true,
            default_project: String::new(),
            columns: ColumnTable::builtin(),
            hooks: Box::new(NoHooks),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevertOutcome {
    Declined,
    Reverted(Vec<String>),
}

/// The four data files and the pending id counter.
pub struct TaskDb {
    ctx: StorageContext,
    pending: TaskFile,
    completed: TaskFile,
    undo: TaskFile,
    backlog: TaskFile,
    next_id: u64,
    perf: PerfReport,
    messages: Vec<String>,
}

impl TaskDb {
    pub fn open(ctx: StorageContext) -> Self {
        let mut pending = TaskFile::new("pending").with_ids();
        let mut completed = TaskFile::new("completed");
        let mut undo = TaskFile::new("undo");
        let mut backlog = TaskFile::new("backlog");
        for file in [&mut pending, &mut completed, &mut undo, &mut backlog] {
            let path = ctx.location.join(format!("{}.data", file.name()));
            file.target(&path, ctx.locking, ctx.lock_timeout);
        }
        tracing::debug!(location = %ctx.location.display(), "database opened");
        Self {
            ctx,
            pending,
            completed,
            undo,
            backlog,
            next_id: 1,
            perf: PerfReport::default(),
            messages: Vec::new(),
        }
    }

    pub fn location(&self) -> &Path {
        &self.ctx.location
    }

    pub fn columns(&self) -> &ColumnTable {
        &self.ctx.columns
    }

    pub fn read_only(&self) -> bool {
        self.pending.read_only() || self.completed.read_only()
    }

    pub fn perf(&self) -> &PerfReport {
        &self.perf
    }

    pub fn hooks(&mut self) -> &mut dyn Hooks {
        self.ctx.hooks.as_mut()
    }

    /// Hook feedback gathered since the last call.
    pub fn take_messages(&mut self) -> Vec<String> {
        std::mem::take(&mut self.messages)
    }

    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    pub fn pending_tasks(&mut self) -> Result<Vec<Task>, StorageError> {
        let timer = Timer::start();
        let loaded = self.pending.tasks_loaded();
        let tasks = self.pending.get_tasks(&mut self.next_id)?.to_vec();
        if !loaded {
            self.perf.add("load", timer.elapsed_ms());
        }
        Ok(tasks)
    }

    pub fn completed_tasks(&mut self) -> Result<Vec<Task>, StorageError> {
        let timer = Timer::start();
        let loaded = self.completed.tasks_loaded();
        let tasks = self.completed.get_tasks(&mut self.next_id)?.to_vec();
        if !loaded {
            self.perf.add("load", timer.elapsed_ms());
        }
        Ok(tasks)
    }

    pub fn all_tasks(&mut self) -> Result<Vec<Task>, StorageError> {
        let mut tasks = self.pending_tasks()?;
        tasks.extend(self.completed_tasks()?);
        Ok(tasks)
    }

    pub fn get(&mut self, id: u64) -> Result<Option<Task>, StorageError> {
        self.pending_tasks()?;
        self.pending.get(id, &mut self.next_id)
    }

    pub fn get_uuid(&mut self, uuid: &str) -> Result<Option<Task>, StorageError> {
        self.pending_tasks()?;
        if let Some(task) = self.pending.get_uuid(uuid, &mut self.next_id)? {
            return Ok(Some(task));
        }
        self.completed_tasks()?;
        self.completed.get_uuid(uuid, &mut self.next_id)
    }

    pub fn has(&mut self, uuid: &str) -> Result<bool, StorageError> {
        Ok(self.get_uuid(uuid)?.is_some())
    }

    /// Live pending tasks sharing `task`'s parent, excluding `task`.
    pub fn siblings(&mut self, task: &Task) -> Result<Vec<Task>, StorageError> {
        let Some(parent) = task.get("parent").filter(|parent| !parent.is_empty()) else {
            return Ok(Vec::new());
        };
        Ok(self
            .pending_tasks()?
            .into_iter()
            .filter(|other| {
                other.get("parent") == Some(parent)
                    && other.uuid() != task.uuid()
                    && !other.is_terminal()
            })
            .collect())
    }

    /// Live pending tasks whose parent is `task`.
    pub fn children(&mut self, task: &Task) -> Result<Vec<Task>, StorageError> {
        let uuid = task.uuid();
        Ok(self
            .pending_tasks()?
            .into_iter()
            .filter(|other| other.get("parent") == Some(uuid) && !other.is_terminal())
            .collect())
    }

    pub fn uuid_of(&mut self, id: u64) -> Result<Option<String>, StorageError> {
        self.pending_tasks()?;
        Ok(self.pending.uuid_of(id).map(str::to_string))
    }

    pub fn id_of(&mut self, uuid: &str) -> Result<Option<u64>, StorageError> {
        self.pending_tasks()?;
        Ok(self.pending.id_of(uuid))
    }

    /// Validates, rejects a reused uuid and runs the add hook before
    /// recording.
    pub fn add(&mut self, mut task: Task, add_to_backlog: bool) -> Result<(), StorageError> {
        task.validate(true, &self.ctx.default_project, dates::now_epoch())?;
        if self.has(task.uuid())? {
            return Err(StorageError::DuplicateUuid(task.uuid().to_string()));
        }
        let feedback = self.ctx.hooks.on_add(&mut task)?;
        self.messages.extend(feedback);
        self.update(task, add_to_backlog)
    }

    pub fn modify(&mut self, mut task: Task, add_to_backlog: bool) -> Result<(), StorageError> {
        task.validate(false, "", dates::now_epoch())?;
        if let Some(original) = self.get_uuid(task.uuid())? {
            let feedback = self.ctx.hooks.on_modify(&original, &mut task)?;
            self.messages.extend(feedback);
        }
        self.update(task, add_to_backlog)
    }

    /// Routes the task to its file and appends the undo block.
    pub fn update(&mut self, mut task: Task, add_to_backlog: bool) -> Result<(), StorageError> {
        let now = dates::now_epoch();
        task.validate(false, "", now)?;
        let undo_lines = match self.get_uuid(task.uuid())? {
            Some(original) => {
                task.set("modified", now.to_string());
                if !self.pending.modify_task(&task, &mut self.next_id)? {
                    self.completed.modify_task(&task, &mut self.next_id)?;
                }
                undo::record(now, Some(&original), &task)
            }
            None => {
                let file = if task.status().belongs_in_pending() {
                    &mut self.pending
                } else {
                    &mut self.completed
                };
                file.add_task(task.clone(), &mut self.next_id)?;
                undo::record(now, None, &task)
            }
        };
        for line in undo_lines {
            self.undo.add_line(line);
        }
        if add_to_backlog {
            self.backlog
                .add_line(task.compose_json(false, &self.ctx.columns));
        }
        Ok(())
    }

    /// Tasks added or modified in this run, pending file first.
    pub fn changes(&self) -> Vec<Task> {
        let mut changes = self.pending.changes();
        changes.extend(self.completed.changes());
        changes
    }

    /// Writes every dirty file with termination signals held off. All four
    /// files are attempted; the first failure is returned.
    pub fn commit(&mut self) -> Result<Vec<Task>, StorageError> {
        let _guard = SignalGuard::block();
        let timer = Timer::start();
        let changes = self.changes();
        let mut first_err = None;
        for file in [
            &mut self.pending,
            &mut self.completed,
            &mut self.undo,
            &mut self.backlog,
        ] {
            if let Err(err) = file.commit() {
                tracing::warn!(file = file.name(), error = %err, "commit failed");
                first_err.get_or_insert(err);
            }
        }
        self.perf.add("commit", timer.elapsed_ms());
        match first_err {
            Some(err) => Err(err),
            None => Ok(changes),
        }
    }

    /// Moves tasks to the file their status belongs in, wakes waiting tasks
    /// whose wait has passed, and renumbers pending ids when that set changed.
    /// Returns whether anything moved. Nothing is written until `commit`.
    pub fn gc(&mut self) -> Result<bool, StorageError> {
        if !self.ctx.gc || self.read_only() {
            tracing::debug!("gc skipped");
            return Ok(false);
        }
        let timer = Timer::start();
        let load_before = self.perf.get("load");
        let now = dates::now_epoch();

        let mut pending = Vec::new();
        let mut completed = Vec::new();
        let mut pending_changed = false;
        let mut completed_changed = false;

        for mut task in self.pending_tasks()? {
            match task.status() {
                Status::Pending | Status::Recurring => pending.push(task),
                Status::Waiting => {
                    if unwait(&mut task, now) {
                        pending_changed = true;
                    }
                    pending.push(task);
                }
                Status::Completed | Status::Deleted => {
                    task.id = 0;
                    completed.push(task);
                    pending_changed = true;
                    completed_changed = true;
                }
            }
        }
        let mut kept = Vec::new();
        for mut task in self.completed_tasks()? {
            if task.status().belongs_in_pending() {
                unwait(&mut task, now);
                pending.push(task);
                pending_changed = true;
                completed_changed = true;
            } else {
                kept.push(task);
            }
        }
        kept.extend(completed);

        if pending_changed {
            for (index, task) in pending.iter_mut().enumerate() {
                task.id = index as u64 + 1;
            }
            self.next_id = pending.len() as u64 + 1;
            dependency_scan(&mut pending);
            self.pending.set_tasks(pending);
        }
        if completed_changed {
            self.completed.set_tasks(kept);
        }

        let loading = self.perf.get("load") - load_before;
        self.perf.add("gc", (timer.elapsed_ms() - loading).max(0.0));
        tracing::debug!(pending_changed, completed_changed, "gc finished");
        Ok(pending_changed || completed_changed)
    }

    /// Pops the newest undo block and restores the prior state. `confirm`
    /// sees the block with its parsed prior and current versions.
    pub fn revert<F>(&mut self, confirm: F) -> Result<RevertOutcome, StorageError>
    where
        F: FnOnce(&Transaction, Option<&Task>, &Task) -> bool,
    {
        let mut undo_lines = self.undo.get_lines()?.to_vec();
        let tx = undo::pop(&mut undo_lines)?;
        let prior = tx.old_task()?;
        let current = tx.new_task()?;
        if !confirm(&tx, prior.as_ref(), &current) {
            return Ok(RevertOutcome::Declined);
        }

        let mut pending = self.pending_tasks()?;
        let mut completed = self.completed_tasks()?;
        let in_pending = pending.iter().position(|task| task.uuid() == tx.uuid);
        let in_completed = completed.iter().position(|task| task.uuid() == tx.uuid);
        let case = RevertCase::classify(prior.as_ref(), in_pending.is_some(), in_completed.is_some());
        tracing::debug!(uuid = %tx.uuid, ?case, "reverting");

        match (case, prior.clone(), in_pending, in_completed) {
            (Some(RevertCase::AddedPending), _, Some(at), _) => {
                pending.remove(at);
            }
            (Some(RevertCase::ModifiedPending), Some(mut prior), Some(at), _) => {
                prior.id = pending[at].id;
                pending[at] = prior;
            }
            (Some(RevertCase::CompletedToPending), Some(mut prior), Some(at), _) => {
                pending.remove(at);
                prior.id = 0;
                completed.push(prior);
            }
            (Some(RevertCase::PendingToCompleted), Some(mut prior), _, Some(at)) => {
                completed.remove(at);
                prior.id = self.next_id;
                self.next_id += 1;
                pending.push(prior);
            }
            (Some(RevertCase::ModifiedCompleted), Some(prior), _, Some(at)) => {
                completed[at] = prior;
            }
            (Some(RevertCase::AddedCompleted), _, _, Some(at)) => {
                completed.remove(at);
            }
            _ => {}
        }

        let mut backlog = self.backlog.get_lines()?.to_vec();
        let needle = format!("\"uuid\":\"{}\"", tx.uuid);
        let found = backlog
            .iter()
            .rposition(|line| line.contains(&needle))
            .ok_or(StorageError::Synchronized)?;
        match (&prior, case.is_some_and(RevertCase::is_addition)) {
            (Some(prior), false) => backlog.push(prior.compose_json(false, &self.ctx.columns)),
            _ => {
                backlog.remove(found);
            }
        }

        if case.is_some_and(|case| !matches!(case, RevertCase::ModifiedCompleted)) {
            dependency_scan(&mut pending);
        }
        self.undo.set_lines(undo_lines);
        self.pending.set_tasks(pending);
        self.completed.set_tasks(completed);
        self.backlog.set_lines(backlog);
        self.commit()?;
        self.clear();

        let mut messages = Vec::new();
        if let Some(case) = case {
            messages.push(case.message().to_string());
        }
        messages.push("Undo complete.".to_string());
        Ok(RevertOutcome::Reverted(messages))
    }

    /// Drops all cached state; the next access rereads the files.
    pub fn clear(&mut self) {
        for file in [
            &mut self.pending,
            &mut self.completed,
            &mut self.undo,
            &mut self.backlog,
        ] {
            file.clear();
        }
        self.next_id = 1;
    }

    pub fn dump(&self) -> String {
        let mut out = format!("TaskDb {} next_id {}\n", self.ctx.location.display(), self.next_id);
        for file in [&self.pending, &self.completed, &self.undo, &self.backlog] {
            out.push_str("  ");
            out.push_str(&file.dump());
            out.push('\n');
        }
        out
    }
}

/// True when a waiting task was woken.
fn unwait(task: &mut Task, now: i64) -> bool {
    if task.status() != Status::Waiting || !task.get_date("wait").is_some_and(|wait| wait < now) {
        return false;
    }
    task.set_status(Status::Pending);
    task.remove("wait");
    true
}

/// Recomputes `is_blocked` and `is_blocking` from `depends` across the set.
pub fn dependency_scan(tasks: &mut [Task]) {
    let index = tasks
        .iter()
        .enumerate()
        .map(|(at, task)| (task.uuid().to_string(), at))
        .collect::<HashMap<_, _>>();
    let mut edges = Vec::new();
    for (at, task) in tasks.iter().enumerate() {
        if task.is_terminal() {
            continue;
        }
        for dependency in task.dependencies() {
            if let Some(&target) = index.get(&dependency) {
                if !tasks[target].is_terminal() {
                    edges.push((at, target));
                }
            }
        }
    }
    for task in tasks.iter_mut() {
        task.is_blocked = false;
        task.is_blocking = false;
    }
    for (blocked, blocking) in edges {
        tasks[blocked].is_blocked = true;
        tasks[blocking].is_blocking = true;
    }
}
