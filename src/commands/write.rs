use std::path::PathBuf;

use serde_json::Value;
use uuid::Uuid;

use super::{apply_modifications, describe, filtered_tasks, Context};
use crate::app::AppError;
use crate::dates;
use crate::domain::status::Status;
use crate::domain::task::{Task, TaskError};
use crate::storage::RevertOutcome;
use crate::ui::{self, plural};

const UNDO_QUESTION: &str =
    "The undo command is not reversible.  Are you sure you want to revert to the previous state?";
const RECURRENCE_QUESTION: &str =
    "This is a recurring task.  Do you want to delete all pending recurrences of this same task?";

fn new_task() -> Task {
    let mut task = Task::new();
    task.set("uuid", Uuid::new_v4().to_string());
    task
}

pub(super) fn add(ctx: &mut Context<'_>) -> Result<(i32, String), AppError> {
    let mut task = new_task();
    apply_modifications(ctx, &mut task)?;
    let uuid = task.uuid().to_string();
    ctx.db.add(task, true)?;
    let out = match ctx.db.id_of(&uuid)? {
        Some(id) if id != 0 => format!("Created task {}.\n", id),
        _ => "Created task.\n".to_string(),
    };
    Ok((0, out))
}

pub(super) fn log(ctx: &mut Context<'_>) -> Result<(i32, String), AppError> {
    let mut task = new_task();
    apply_modifications(ctx, &mut task)?;
    task.set_status(Status::Completed);
    if !task.has("end") {
        task.set("end", dates::now_epoch().to_string());
    }
    ctx.db.add(task, true)?;
    Ok((0, "Logged task.\n".to_string()))
}

pub(super) fn modify(ctx: &mut Context<'_>) -> Result<(i32, String), AppError> {
    let tasks = filtered_tasks(ctx)?;
    if tasks.is_empty() {
        return Ok((1, "No matches.\n".to_string()));
    }
    let mut out = String::new();
    let mut count = 0;
    for task in tasks {
        let mut changed = task.clone();
        apply_modifications(ctx, &mut changed)?;
        if changed.compose_f4() == task.compose_f4() {
            ctx.feedback
                .footnote(format!("Not modifying {}: nothing changed.", describe(&task)));
            continue;
        }
        out.push_str(&format!("Modifying {}.\n", describe(&changed)));
        ctx.db.modify(changed, true)?;
        count += 1;
    }
    out.push_str(&format!("Modified {}.\n", plural(count, "task")));
    Ok((0, out))
}

pub(super) fn done(ctx: &mut Context<'_>) -> Result<(i32, String), AppError> {
    let tasks = filtered_tasks(ctx)?;
    if tasks.is_empty() {
        return Ok((1, "No matches.\n".to_string()));
    }
    let now = dates::now_epoch();
    let mut out = String::new();
    let mut count = 0;
    for task in tasks {
        if !matches!(task.status(), Status::Pending | Status::Waiting) {
            out.push_str(&format!(
                "Cannot complete {}: it is neither pending nor waiting.\n",
                describe(&task)
            ));
            continue;
        }
        let mut changed = task.clone();
        apply_modifications(ctx, &mut changed)?;
        changed.set_status(Status::Completed);
        changed.set("end", now.to_string());
        changed.remove("start");
        out.push_str(&format!("Completed {}.\n", describe(&changed)));
        ctx.db.modify(changed, true)?;
        count += 1;
    }
    out.push_str(&format!("Completed {}.\n", plural(count, "task")));
    Ok((i32::from(count == 0), out))
}

pub(super) fn delete(ctx: &mut Context<'_>) -> Result<(i32, String), AppError> {
    let tasks = filtered_tasks(ctx)?;
    if tasks.is_empty() {
        return Ok((1, "No matches.\n".to_string()));
    }
    let mut out = String::new();
    let (deletable, skipped): (Vec<_>, Vec<_>) = tasks
        .into_iter()
        .partition(|task| task.status() != Status::Deleted);
    for task in &skipped {
        out.push_str(&format!(
            "Cannot delete {}: it is already deleted.\n",
            describe(task)
        ));
    }
    if deletable.len() > 1
        && ctx.config.get_bool("confirmation")
        && !ctx.prompt.confirm(&format!("Delete {}?", plural(deletable.len(), "task")))
    {
        out.push_str("No tasks deleted.\n");
        return Ok((1, out));
    }

    let now = dates::now_epoch();
    let mut count = 0;
    for task in deletable {
        let mut changed = task;
        apply_modifications(ctx, &mut changed)?;
        mark_deleted(&mut changed, now);
        out.push_str(&format!("Deleted {}.\n", describe(&changed)));
        let (recurrences, parent) = recurrences(ctx, &changed)?;
        ctx.db.modify(changed, true)?;
        count += 1;
        for mut recurrence in recurrences {
            mark_deleted(&mut recurrence, now);
            out.push_str(&format!("Deleted recurring {}.\n", describe(&recurrence)));
            ctx.db.modify(recurrence, true)?;
            count += 1;
        }
        if let Some(mut parent) = parent {
            mark_deleted(&mut parent, now);
            ctx.db.modify(parent, true)?;
        }
    }
    out.push_str(&format!("Deleted {}.\n", plural(count, "task")));
    Ok((i32::from(count == 0), out))
}

fn mark_deleted(task: &mut Task, now: i64) {
    task.set_status(Status::Deleted);
    if !task.has("end") {
        task.set("end", now.to_string());
    }
}

/// Tasks that go with a deleted recurrence: the live siblings and their
/// template when `task` has a parent, else the live children of `task`.
/// `recurrence.confirmation` is `on`, `off` or `prompt`.
fn recurrences(
    ctx: &mut Context<'_>,
    task: &Task,
) -> Result<(Vec<Task>, Option<Task>), AppError> {
    let (relatives, parent) = match task.get("parent").filter(|parent| !parent.is_empty()) {
        Some(parent) => {
            let parent = ctx.db.get_uuid(parent)?.filter(|parent| !parent.is_terminal());
            (ctx.db.siblings(task)?, parent)
        }
        None => (ctx.db.children(task)?, None),
    };
    if relatives.is_empty() && parent.is_none() {
        return Ok((relatives, parent));
    }
    let approved = match ctx.config.get("recurrence.confirmation") {
        "prompt" => ctx.prompt.confirm(RECURRENCE_QUESTION),
        _ => ctx.config.get_bool("recurrence.confirmation"),
    };
    if approved {
        Ok((relatives, parent))
    } else {
        Ok((Vec::new(), None))
    }
}

pub(super) fn undo(ctx: &mut Context<'_>) -> Result<(i32, String), AppError> {
    let style = ctx.config.get("undo.style").to_string();
    let ask = ctx.config.get_bool("confirmation");
    let columns = ctx.columns;
    let prompt = &mut *ctx.prompt;
    let mut shown = String::new();
    let outcome = ctx.db.revert(|tx, prior, current| {
        let diff = ui::render_undo(&style, tx.when, prior, current, columns);
        if !ask {
            shown = diff;
            return true;
        }
        prompt.show(&diff);
        prompt.confirm(UNDO_QUESTION)
    })?;
    match outcome {
        RevertOutcome::Declined => Ok((1, "No changes made.\n".to_string())),
        RevertOutcome::Reverted(messages) => {
            let mut out = shown;
            for message in messages {
                out.push_str(&message);
                out.push('\n');
            }
            Ok((0, out))
        }
    }
}

/// Each word names a file holding a JSON array of tasks or one JSON task
/// per line. Known uuids are modified, the rest added.
pub(super) fn import(ctx: &mut Context<'_>) -> Result<(i32, String), AppError> {
    let files = ctx.classifier.get_words()?;
    if files.is_empty() {
        return Err(AppError::InvalidArgument(
            "You must specify a file to import.".to_string(),
        ));
    }
    let mut out = String::new();
    let mut count = 0;
    for file in files {
        let path = PathBuf::from(&file);
        let text = std::fs::read_to_string(&path).map_err(|source| AppError::Import {
            path: path.clone(),
            source,
        })?;
        out.push_str(&format!("Importing '{}'\n", file));
        for mut task in parse_import(&text, ctx)? {
            if !task.has("uuid") {
                task.set("uuid", Uuid::new_v4().to_string());
            }
            let line = format!("{} {}", task.uuid(), task.description());
            if ctx.db.has(task.uuid())? {
                ctx.db.modify(task, true)?;
                out.push_str(&format!("  mod  {}\n", line));
            } else {
                ctx.db.add(task, true)?;
                out.push_str(&format!("  add  {}\n", line));
            }
            count += 1;
        }
    }
    out.push_str(&format!("Imported {}.\n", plural(count, "task")));
    Ok((0, out))
}

fn parse_import(text: &str, ctx: &Context<'_>) -> Result<Vec<Task>, AppError> {
    let trimmed = text.trim_start();
    if trimmed.starts_with('[') {
        let value: Value = serde_json::from_str(trimmed).map_err(TaskError::Json)?;
        let items = value.as_array().map(Vec::as_slice).unwrap_or_default();
        return items
            .iter()
            .map(|item| Task::from_json(item, ctx.columns).map_err(AppError::from))
            .collect();
    }
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| Task::parse_json(line, ctx.columns).map_err(AppError::from))
        .collect()
}
