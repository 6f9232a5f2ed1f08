use super::{filtered_tasks, Context, COMMANDS};
use crate::app::AppError;
use crate::domain::status::Status;
use crate::ui;

pub(super) fn list(ctx: &mut Context<'_>) -> Result<(i32, String), AppError> {
    let mut tasks = filtered_tasks(ctx)?
        .into_iter()
        .filter(|task| task.status() == Status::Pending)
        .collect::<Vec<_>>();
    tasks.sort_by_key(|task| task.id);
    let limit = ctx.classifier.get_limit().parse::<usize>().unwrap_or(0);
    if limit > 0 {
        tasks.truncate(limit);
    }
    let rc = i32::from(tasks.is_empty());
    Ok((rc, ui::render_list(&tasks, ctx.palette)))
}

pub(super) fn information(ctx: &mut Context<'_>) -> Result<(i32, String), AppError> {
    let tasks = filtered_tasks(ctx)?;
    if tasks.is_empty() {
        return Ok((1, "No matches.\n".to_string()));
    }
    let out = tasks
        .iter()
        .map(|task| ui::render_info(task, ctx.columns, ctx.palette))
        .collect::<Vec<_>>()
        .join("\n");
    Ok((0, out))
}

pub(super) fn count(ctx: &mut Context<'_>) -> Result<(i32, String), AppError> {
    let count = filtered_tasks(ctx)?
        .iter()
        .filter(|task| task.status() != Status::Deleted)
        .count();
    Ok((0, format!("{}\n", count)))
}

pub(super) fn export(ctx: &mut Context<'_>) -> Result<(i32, String), AppError> {
    let tasks = filtered_tasks(ctx)?;
    let mut out = String::from("[\n");
    let lines = tasks
        .iter()
        .map(|task| task.compose_json(true, ctx.columns))
        .collect::<Vec<_>>();
    if !lines.is_empty() {
        out.push_str(&lines.join(",\n"));
        out.push('\n');
    }
    out.push_str("]\n");
    Ok((0, out))
}

pub(super) fn ids(ctx: &mut Context<'_>) -> Result<(i32, String), AppError> {
    let mut ids = filtered_tasks(ctx)?
        .iter()
        .map(|task| task.id)
        .filter(|id| *id != 0)
        .collect::<Vec<_>>();
    ids.sort_unstable();
    Ok((0, lines(ids.iter().map(u64::to_string))))
}

pub(super) fn uuids(ctx: &mut Context<'_>) -> Result<(i32, String), AppError> {
    let tasks = filtered_tasks(ctx)?;
    Ok((0, lines(tasks.iter().map(|task| task.uuid().to_string()))))
}

pub(super) fn commands() -> (i32, String) {
    (0, lines(COMMANDS.iter().map(|command| command.name.to_string())))
}

fn lines(items: impl Iterator<Item = String>) -> String {
    items.map(|item| format!("{}\n", item)).collect()
}
