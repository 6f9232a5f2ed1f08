use std::path::{Path, PathBuf};

use uuid::Uuid;

use super::{apply_modifications, describe, execute, filtered_tasks, lookup, Context, COMMANDS};
use crate::app::{parser_context, AppError};
use crate::config::Config;
use crate::confirm::Prompt;
use crate::domain::columns::ColumnTable;
use crate::domain::status::Status;
use crate::domain::task::{Task, TaskError};
use crate::feedback::Feedback;
use crate::parser::Classifier;
use crate::storage::{StorageContext, TaskDb};
use crate::ui::Palette;

const U1: &str = "a360fc44-315c-4366-b70c-ea7e7520b749";
const U2: &str = "b5d2f4a1-7c3e-4f5a-9b8d-1e2f3a4b5c6d";
const U3: &str = "c7e8f9a0-1b2c-4d3e-8f4a-5b6c7d8e9f01";

struct Refuse;

impl Prompt for Refuse {
    fn show(&mut self, _text: &str) {}

    fn confirm(&mut self, _question: &str) -> bool {
        false
    }
}

fn data_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("strand-commands-{}", Uuid::now_v7()));
    std::fs::create_dir_all(&dir).expect("data dir should be created");
    dir
}

fn seeded(dir: &Path, tasks: &[(&str, &str)]) -> TaskDb {
    let mut db = TaskDb::open(StorageContext::new(dir));
    for (uuid, description) in tasks {
        let mut task = Task::new();
        task.set("uuid", *uuid);
        task.set("description", *description);
        task.add_tag("home");
        db.add(task, true).expect("seed task should be added");
    }
    db.commit().expect("seed should commit");
    db
}

fn with_context<T>(db: &mut TaskDb, args: &[&str], f: impl FnOnce(&mut Context<'_>) -> T) -> T {
    with_config(db, Config::default(), args, f)
}

fn with_config<T>(
    db: &mut TaskDb,
    config: Config,
    args: &[&str],
    f: impl FnOnce(&mut Context<'_>) -> T,
) -> T {
    let columns = ColumnTable::from_config(&config);
    let argv = std::iter::once("strand")
        .chain(args.iter().copied())
        .map(str::to_string)
        .collect::<Vec<_>>();
    let mut classifier = Classifier::new(parser_context(&config, &columns), &argv);
    classifier
        .analyze(true, true)
        .expect("analysis should succeed");
    let mut feedback = Feedback::new(&config);
    let palette = Palette::plain();
    let mut prompt = Refuse;
    let mut ctx = Context {
        classifier: &mut classifier,
        db,
        config: &config,
        columns: &columns,
        feedback: &mut feedback,
        palette: &palette,
        prompt: &mut prompt,
    };
    f(&mut ctx)
}

fn modified(db: &mut TaskDb, args: &[&str]) -> Result<Task, AppError> {
    with_context(db, args, |ctx| {
        let mut task = filtered_tasks(ctx)?
            .into_iter()
            .next()
            .expect("filter should match a task");
        apply_modifications(ctx, &mut task)?;
        Ok(task)
    })
}

#[test]
fn command_table_feeds_the_registry() {
    let list = lookup("list").expect("list should be known");
    assert!(list.read_only && list.displays_id);
    let add = lookup("add").expect("add should be known");
    assert!(!add.read_only && !add.displays_id);
    assert!(lookup("calendar").is_none());

    let ctx = parser_context(&Config::default(), &ColumnTable::builtin());
    for command in COMMANDS {
        assert!(ctx.registry.exact_match("cmd", command.name));
        assert_eq!(
            ctx.registry.exact_match("helper", command.name),
            command.name.starts_with('_')
        );
    }
}

#[test]
fn modifications_cover_tags_dates_and_substitution() {
    let dir = data_dir();
    let mut db = seeded(&dir, &[(U1, "pay bills")]);

    let task = modified(
        &mut db,
        &["1", "modify", "due:2024-01-01", "+urgent", "-home", "/bills/invoices/"],
    )
    .expect("modifications should apply");
    assert_eq!(task.get("due"), Some("1704067200"));
    assert_eq!(task.tags(), ["urgent"]);
    assert_eq!(task.description(), "pay invoices");

    let task = modified(&mut db, &["1", "modify", "write", "cheques"])
        .expect("words should apply");
    assert_eq!(task.description(), "write cheques");

    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn empty_values_remove_attributes() {
    let dir = data_dir();
    let mut db = seeded(&dir, &[(U1, "pay bills")]);

    let task = with_context(&mut db, &["1", "modify", "project:", "due:"], |ctx| {
        let mut task = filtered_tasks(ctx)?
            .into_iter()
            .next()
            .expect("filter should match a task");
        task.set("project", "home");
        task.set("due", "1704067200");
        apply_modifications(ctx, &mut task)?;
        Ok::<_, AppError>(task)
    })
    .expect("empty values should apply");
    assert_eq!(task.get("project"), None);
    assert_eq!(task.get("due"), None);

    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn depends_resolves_ids_to_uuids() {
    let dir = data_dir();
    let mut db = seeded(&dir, &[(U1, "first"), (U2, "second")]);

    let task = modified(&mut db, &["2", "modify", "depends:1"]).expect("depends should apply");
    assert_eq!(task.dependencies(), [U1]);

    let err = modified(&mut db, &["2", "modify", "depends:9"]).expect_err("task 9 is unknown");
    assert_eq!(err.to_string(), "Could not find task 9 to depend on.");

    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn unparsable_dates_are_rejected() {
    let dir = data_dir();
    let mut db = seeded(&dir, &[(U1, "first")]);
    let err = modified(&mut db, &["1", "modify", "due:someday"]).expect_err("bad date");
    assert!(matches!(
        err,
        AppError::Task(TaskError::InvalidDate { ref name, .. }) if name == "due"
    ));
    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn write_commands_without_filter_do_nothing() {
    let dir = data_dir();
    let mut db = seeded(&dir, &[(U1, "first")]);
    let outcome = with_context(&mut db, &["done"], |ctx| {
        execute(lookup("done").expect("done should be known"), ctx)
    })
    .expect("done should run");
    assert_eq!(outcome, (1, "No tasks specified.\n".to_string()));
    assert!(db.changes().is_empty());
    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn multiple_deletions_need_confirmation() {
    let dir = data_dir();
    let mut db = seeded(&dir, &[(U1, "first"), (U2, "second")]);
    let (rc, out) = with_context(&mut db, &["1-2", "delete"], |ctx| {
        execute(lookup("delete").expect("delete should be known"), ctx)
    })
    .expect("delete should run");
    assert_eq!(rc, 1);
    assert_eq!(out, "No tasks deleted.\n");
    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn deleting_a_recurrence_takes_its_siblings_and_template() {
    let dir = data_dir();
    let mut db = TaskDb::open(StorageContext::new(&dir));
    let mut template = Task::new();
    template.set("uuid", U1);
    template.set("description", "water plants");
    template.set_status(Status::Recurring);
    db.add(template, true).expect("template should be added");
    for uuid in [U2, U3] {
        let mut instance = Task::new();
        instance.set("uuid", uuid);
        instance.set("description", "water plants");
        instance.set("parent", U1);
        db.add(instance, true).expect("instance should be added");
    }
    db.commit().expect("seed should commit");

    let declined = with_context(&mut db, &["2", "delete"], |ctx| {
        execute(lookup("delete").expect("delete should be known"), ctx)
    })
    .expect("delete should run");
    assert_eq!(declined.1, "Deleted task 2 'water plants'.\nDeleted 1 task.\n");
    db.clear();

    let mut config = Config::default();
    config.set("recurrence.confirmation", "on");
    let (rc, out) = with_config(&mut db, config, &["2", "delete"], |ctx| {
        execute(lookup("delete").expect("delete should be known"), ctx)
    })
    .expect("delete should run");
    assert_eq!(rc, 0);
    assert_eq!(
        out,
        "Deleted task 2 'water plants'.\nDeleted recurring task 3 'water plants'.\nDeleted 2 tasks.\n"
    );
    let deleted = db
        .all_tasks()
        .expect("tasks should load")
        .into_iter()
        .filter(|task| task.status() == Status::Deleted)
        .count();
    assert_eq!(deleted, 3);
    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn tasks_without_ids_are_described_by_short_uuid() {
    let mut task = Task::new();
    task.set("uuid", U1);
    task.set("description", "x");
    assert_eq!(describe(&task), "task a360fc44 'x'");
    task.id = 4;
    assert_eq!(describe(&task), "task 4 'x'");
}
