//! The command table and the shared plumbing every command runs through:
//! filtering, modification requests, and the per-run context.

mod read;
mod write;

#[cfg(test)]
mod tests;

use regex_lite::Regex;

use crate::app::AppError;
use crate::config::Config;
use crate::confirm::Prompt;
use crate::dates;
use crate::domain::columns::{ColumnTable, ColumnType};
use crate::domain::status::Status;
use crate::domain::task::{Task, TaskError};
use crate::feedback::Feedback;
use crate::filter::Filter;
use crate::parser::registry::EntityRegistry;
use crate::parser::{Classifier, Modification, ParseError};
use crate::storage::TaskDb;
use crate::ui::Palette;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandSpec {
    pub name: &'static str,
    pub read_only: bool,
    pub displays_id: bool,
}

const fn spec(name: &'static str, read_only: bool, displays_id: bool) -> CommandSpec {
    CommandSpec {
        name,
        read_only,
        displays_id,
    }
}

pub const COMMANDS: &[CommandSpec] = &[
    spec("_commands", true, false),
    spec("_ids", true, true),
    spec("_uuids", true, true),
    spec("add", false, false),
    spec("count", true, false),
    spec("delete", false, false),
    spec("done", false, false),
    spec("export", true, true),
    spec("import", false, false),
    spec("information", true, true),
    spec("list", true, true),
    spec("log", false, false),
    spec("modify", false, false),
    spec("undo", false, false),
];

/// Write commands that create or restore tasks rather than act on a filter.
const FILTERLESS: &[&str] = &["add", "log", "undo", "import"];

pub fn lookup(name: &str) -> Option<&'static CommandSpec> {
    COMMANDS.iter().find(|command| command.name == name)
}

/// Registers every command under `cmd`, plus `readcmd`/`writecmd`, plus
/// `helper` for the underscore commands.
pub fn register(registry: &mut EntityRegistry) {
    for command in COMMANDS {
        registry.register("cmd", command.name);
        registry.register(
            if command.read_only { "readcmd" } else { "writecmd" },
            command.name,
        );
        if command.name.starts_with('_') {
            registry.register("helper", command.name);
        }
    }
}

/// Everything a command touches during one run.
pub struct Context<'a> {
    pub classifier: &'a mut Classifier,
    pub db: &'a mut TaskDb,
    pub config: &'a Config,
    pub columns: &'a ColumnTable,
    pub feedback: &'a mut Feedback,
    pub palette: &'a Palette,
    pub prompt: &'a mut dyn Prompt,
}

/// Runs one command. Returns the exit status and the text for stdout.
pub fn execute(command: &CommandSpec, ctx: &mut Context<'_>) -> Result<(i32, String), AppError> {
    if !command.read_only
        && !FILTERLESS.contains(&command.name)
        && ctx.classifier.get_filter(false)?.is_empty()
    {
        return Ok((1, "No tasks specified.\n".to_string()));
    }
    tracing::debug!(command = command.name, "executing");
    match command.name {
        "add" => write::add(ctx),
        "log" => write::log(ctx),
        "modify" => write::modify(ctx),
        "done" => write::done(ctx),
        "delete" => write::delete(ctx),
        "undo" => write::undo(ctx),
        "import" => write::import(ctx),
        "list" => read::list(ctx),
        "information" => read::information(ctx),
        "count" => read::count(ctx),
        "export" => read::export(ctx),
        "_ids" => read::ids(ctx),
        "_uuids" => read::uuids(ctx),
        "_commands" => Ok(read::commands()),
        other => Err(AppError::InvalidArgument(format!(
            "Unknown command '{}'.",
            other
        ))),
    }
}

/// Tasks matching the command line filter, saved context included. Only
/// the pending file is read when the filter cannot reach completed tasks.
pub fn filtered_tasks(ctx: &mut Context<'_>) -> Result<Vec<Task>, AppError> {
    let expr = ctx.classifier.get_filter(true)?;
    let filter = Filter::compile(&expr, ctx.columns, ctx.config)?;
    let candidates = if filter.pending_only() {
        ctx.db.pending_tasks()?
    } else {
        ctx.db.all_tasks()?
    };
    let matched = if filter.is_empty() {
        candidates
    } else {
        let mut matched = Vec::new();
        for task in candidates {
            if filter.matches(&task)? {
                matched.push(task);
            }
        }
        matched
    };
    tracing::debug!(filter = %expr, matched = matched.len(), "filtered");
    Ok(matched)
}

/// Applies the command line modification requests to `task`. Plain words
/// replace the description.
pub fn apply_modifications(ctx: &mut Context<'_>, task: &mut Task) -> Result<(), AppError> {
    let mut words = Vec::new();
    for modification in ctx.classifier.get_modifications() {
        match modification {
            Modification::Attribute {
                name,
                value,
                modifiable,
                ..
            } => {
                if !modifiable {
                    return Err(not_modifiable(&name, &value));
                }
                set_attribute(ctx, task, &name, &value)?;
            }
            Modification::AttributeModifier {
                name,
                modifier,
                value,
            } => {
                return Err(not_modifiable(&format!("{}.{}", name, modifier), &value));
            }
            Modification::Tag { add: true, name } => task.add_tag(&name),
            Modification::Tag { add: false, name } => task.remove_tag(&name),
            Modification::Substitution(substitution) => {
                let description = task.description().to_string();
                let replaced = if ctx.config.get_bool("regex") {
                    let regex = Regex::new(&substitution.from).map_err(|err| {
                        AppError::InvalidArgument(format!(
                            "invalid regular expression '{}': {}",
                            substitution.from, err
                        ))
                    })?;
                    let replaced = if substitution.global {
                        regex.replace_all(&description, substitution.to.as_str())
                    } else {
                        regex.replace(&description, substitution.to.as_str())
                    };
                    replaced.into_owned()
                } else if substitution.global {
                    description.replace(&substitution.from, &substitution.to)
                } else {
                    description.replacen(&substitution.from, &substitution.to, 1)
                };
                task.set("description", replaced);
            }
            Modification::Word(word) => words.push(word),
        }
    }
    if !words.is_empty() {
        task.set("description", words.join(" "));
    }
    Ok(())
}

fn not_modifiable(name: &str, value: &str) -> AppError {
    AppError::Parse(ParseError::InvalidModification(format!(
        "The '{}' attribute does not allow a value of '{}'.",
        name, value
    )))
}

fn set_attribute(
    ctx: &mut Context<'_>,
    task: &mut Task,
    name: &str,
    value: &str,
) -> Result<(), AppError> {
    if value.is_empty() {
        task.remove(name);
        return Ok(());
    }
    match name {
        "status" => {
            let status = value
                .parse::<Status>()
                .map_err(|_| TaskError::InvalidStatus(value.to_string()))?;
            task.set_status(status);
            return Ok(());
        }
        "depends" => return set_dependencies(ctx, task, value),
        "tags" => {
            for tag in task.tags() {
                task.remove_tag(&tag);
            }
            for tag in value.split(',').map(str::trim).filter(|tag| !tag.is_empty()) {
                task.add_tag(tag);
            }
            return Ok(());
        }
        _ => {}
    }
    match ctx.columns.kind(name) {
        Some(ColumnType::Date) => {
            let epoch = dates::parse(value).ok_or_else(|| TaskError::InvalidDate {
                name: name.to_string(),
                value: value.to_string(),
            })?;
            task.set(name, epoch.to_string());
        }
        Some(ColumnType::Duration) => {
            if dates::parse_duration(value).is_none() {
                return Err(not_modifiable(name, value));
            }
            task.set(name, value);
        }
        Some(ColumnType::Numeric) => {
            if value.parse::<f64>().is_err() {
                return Err(not_modifiable(name, value));
            }
            task.set(name, value);
        }
        _ => task.set(name, value),
    }
    Ok(())
}

/// `depends:1,-2,<uuid>`: ids resolve to uuids, a leading `-` removes.
fn set_dependencies(ctx: &mut Context<'_>, task: &mut Task, value: &str) -> Result<(), AppError> {
    for item in value.split(',').map(str::trim).filter(|item| !item.is_empty()) {
        let (remove, reference) = match item.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, item),
        };
        let uuid = match reference.parse::<u64>() {
            Ok(id) => ctx.db.uuid_of(id)?.ok_or_else(|| {
                AppError::InvalidArgument(format!("Could not find task {} to depend on.", id))
            })?,
            Err(_) => reference.to_string(),
        };
        if uuid == task.uuid() {
            return Err(AppError::InvalidArgument(
                "A task cannot be dependent on itself.".to_string(),
            ));
        }
        if remove {
            task.remove_dependency(&uuid);
        } else {
            task.add_dependency(&uuid);
        }
    }
    Ok(())
}

/// `task 3 'pay bills'`, or the short uuid for tasks without an id.
pub fn describe(task: &Task) -> String {
    let uuid = task.uuid();
    if task.id != 0 {
        format!("task {} '{}'", task.id, task.description())
    } else {
        format!(
            "task {} '{}'",
            uuid.get(..8).unwrap_or(uuid),
            task.description()
        )
    }
}
