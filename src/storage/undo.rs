//! Undo log blocks and revert classification.
//!
//! A block is `time <epoch>`, an optional `old <record>`, `new <record>` and
//! the `---` separator.

use super::StorageError;
use crate::domain::task::Task;

pub const SEPARATOR: &str = "---";

/// One popped undo block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub when: Option<i64>,
    pub uuid: String,
    pub old: Option<String>,
    pub new: String,
}

impl Transaction {
    pub fn old_task(&self) -> Result<Option<Task>, StorageError> {
        self.old
            .as_deref()
            .map(Task::parse)
            .transpose()
            .map_err(StorageError::Task)
    }

    pub fn new_task(&self) -> Result<Task, StorageError> {
        Task::parse(&self.new).map_err(StorageError::Task)
    }
}

/// Lines to append for one change.
pub fn record(when: i64, old: Option<&Task>, new: &Task) -> Vec<String> {
    let mut lines = vec![format!("time {}", when)];
    if let Some(old) = old {
        lines.push(format!("old {}", old.compose_f4()));
    }
    lines.push(format!("new {}", new.compose_f4()));
    lines.push(SEPARATOR.to_string());
    lines
}

/// Removes the most recent block from `lines`.
pub fn pop(lines: &mut Vec<String>) -> Result<Transaction, StorageError> {
    if lines.len() < 3 {
        return Err(StorageError::NothingToUndo);
    }
    if lines.last().is_some_and(|line| line.trim() == SEPARATOR) {
        lines.pop();
    }
    let new = lines
        .pop()
        .and_then(|line| line.strip_prefix("new ").map(str::to_string))
        .ok_or(StorageError::NothingToUndo)?;
    let old = match lines.last() {
        Some(line) if line.starts_with("old ") => lines.pop().map(|line| line[4..].to_string()),
        _ => None,
    };
    let when = match lines.last() {
        Some(line) if line.starts_with("time ") => {
            lines.pop().and_then(|line| line[5..].trim().parse().ok())
        }
        _ => None,
    };
    let uuid = extract_uuid(&new).ok_or(StorageError::UndoMissingUuid)?;
    Ok(Transaction {
        when,
        uuid,
        old,
        new,
    })
}

fn extract_uuid(record: &str) -> Option<String> {
    let start = record.find("uuid:\"")? + 6;
    let uuid = record.get(start..start + 36)?;
    uuid.bytes()
        .all(|b| b.is_ascii_hexdigit() || b == b'-')
        .then(|| uuid.to_string())
}

/// Where the current version lives and where the prior one belongs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevertCase {
    /// 0 -> p: erase from pending.
    AddedPending,
    /// p -> p': prior written over current in pending.
    ModifiedPending,
    /// p -> c: prior back into pending, erased from completed.
    PendingToCompleted,
    /// c -> p: prior back into completed, erased from pending.
    CompletedToPending,
    /// c -> c': prior written over current in completed.
    ModifiedCompleted,
    /// 0 -> c: erase from completed.
    AddedCompleted,
}

impl RevertCase {
    /// `None` when the task is in neither file.
    pub fn classify(
        prior: Option<&Task>,
        in_pending: bool,
        in_completed: bool,
    ) -> Option<RevertCase> {
        let prior_pending = prior.map(|task| task.status().belongs_in_pending());
        match (in_pending, in_completed, prior_pending) {
            (true, _, None) => Some(RevertCase::AddedPending),
            (true, _, Some(true)) => Some(RevertCase::ModifiedPending),
            (true, _, Some(false)) => Some(RevertCase::CompletedToPending),
            (false, true, None) => Some(RevertCase::AddedCompleted),
            (false, true, Some(true)) => Some(RevertCase::PendingToCompleted),
            (false, true, Some(false)) => Some(RevertCase::ModifiedCompleted),
            (false, false, _) => None,
        }
    }

    pub fn is_addition(self) -> bool {
        matches!(self, RevertCase::AddedPending | RevertCase::AddedCompleted)
    }

    pub fn message(self) -> &'static str {
        if self.is_addition() {
            "Task removed."
        } else {
            "Modified task reverted."
        }
    }
}
