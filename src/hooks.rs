use std::error::Error;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::domain::columns::ColumnTable;
use crate::domain::task::Task;

#[derive(Debug)]
pub enum HookError {
    /// A script asked to stop the command. Carries its exit code and the
    /// non-JSON lines it printed.
    Aborted { code: i32, messages: Vec<String> },
    Io { path: PathBuf, source: std::io::Error },
    BadOutput { script: PathBuf, reason: String },
}

impl fmt::Display for HookError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookError::Aborted { code, .. } => write!(f, "hook aborted with status {}", code),
            HookError::Io { path, source } => {
                write!(f, "could not run hook {}: {}", path.display(), source)
            }
            HookError::BadOutput { script, reason } => {
                write!(f, "hook {} produced bad output: {}", script.display(), reason)
            }
        }
    }
}

impl Error for HookError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            HookError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Extension points around task changes. Each call returns feedback lines
/// for the user.
pub trait Hooks {
    fn on_launch(&mut self) -> Result<Vec<String>, HookError>;
    fn on_add(&mut self, task: &mut Task) -> Result<Vec<String>, HookError>;
    fn on_modify(&mut self, before: &Task, after: &mut Task) -> Result<Vec<String>, HookError>;
    fn on_exit(&mut self, changes: &[Task]) -> Result<Vec<String>, HookError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl Hooks for NoHooks {
    fn on_launch(&mut self) -> Result<Vec<String>, HookError> {
        Ok(Vec::new())
    }

    fn on_add(&mut self, _task: &mut Task) -> Result<Vec<String>, HookError> {
        Ok(Vec::new())
    }

    fn on_modify(&mut self, _before: &Task, _after: &mut Task) -> Result<Vec<String>, HookError> {
        Ok(Vec::new())
    }

    fn on_exit(&mut self, _changes: &[Task]) -> Result<Vec<String>, HookError> {
        Ok(Vec::new())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Event {
    Launch,
    Add,
    Modify,
    Exit,
}

impl Event {
    fn prefix(self) -> &'static str {
        match self {
            Event::Launch => "on-launch",
            Event::Add => "on-add",
            Event::Modify => "on-modify",
            Event::Exit => "on-exit",
        }
    }
}

/// Runs executables found in a hooks directory.
#[derive(Debug, Clone)]
pub struct ScriptHooks {
    dir: PathBuf,
    columns: ColumnTable,
    scripts: Option<Vec<PathBuf>>,
}

struct ScriptOutput {
    tasks: Vec<String>,
    messages: Vec<String>,
}

impl ScriptHooks {
    pub fn new(dir: &Path, columns: ColumnTable) -> Self {
        Self {
            dir: dir.to_path_buf(),
            columns,
            scripts: None,
        }
    }

    fn scripts(&mut self, event: Event) -> Vec<PathBuf> {
        let dir = &self.dir;
        let all = self.scripts.get_or_insert_with(|| discover(dir));
        all.iter()
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.starts_with(event.prefix()))
            })
            .cloned()
            .collect()
    }

    fn run(&self, script: &Path, input: &str) -> Result<ScriptOutput, HookError> {
        tracing::debug!(hook = %script.display(), "running hook");
        let io_err = |source| HookError::Io {
            path: script.to_path_buf(),
            source,
        };
        let mut child = Command::new(script)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(io_err)?;
        if let Some(mut stdin) = child.stdin.take() {
            // A script that exits without reading closes the pipe early.
            if let Err(err) = stdin.write_all(input.as_bytes()) {
                if err.kind() != std::io::ErrorKind::BrokenPipe {
                    return Err(io_err(err));
                }
            }
        }
        let output = child.wait_with_output().map_err(io_err)?;

        let mut tasks = Vec::new();
        let mut messages = Vec::new();
        for line in String::from_utf8_lossy(&output.stdout).lines() {
            let line = line.trim();
            if line.starts_with('{') {
                tasks.push(line.to_string());
            } else if !line.is_empty() {
                messages.push(line.to_string());
            }
        }
        if !output.status.success() {
            messages.extend(
                String::from_utf8_lossy(&output.stderr)
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .map(str::to_string),
            );
            return Err(HookError::Aborted {
                code: output.status.code().unwrap_or(1),
                messages,
            });
        }
        Ok(ScriptOutput { tasks, messages })
    }

    /// Threads the task through every script for the event; each script's
    /// first JSON line replaces it.
    fn run_chain(
        &mut self,
        event: Event,
        before: Option<&Task>,
        task: &mut Task,
    ) -> Result<Vec<String>, HookError> {
        let mut feedback = Vec::new();
        for script in self.scripts(event) {
            let mut input = String::new();
            if let Some(before) = before {
                input.push_str(&before.compose_json(false, &self.columns));
                input.push('\n');
            }
            input.push_str(&task.compose_json(false, &self.columns));
            input.push('\n');

            let output = self.run(&script, &input)?;
            let bad = |reason: &str| HookError::BadOutput {
                script: script.clone(),
                reason: reason.to_string(),
            };
            let Some(first) = output.tasks.first() else {
                return Err(bad("expected one JSON task"));
            };
            if output.tasks.len() > 1 {
                return Err(bad("expected only one JSON task"));
            }
            let mut replaced = Task::parse_json(first, &self.columns)
                .map_err(|err| bad(&err.to_string()))?;
            if replaced.uuid() != task.uuid() {
                return Err(bad("task uuid changed"));
            }
            replaced.id = task.id;
            *task = replaced;
            feedback.extend(output.messages);
        }
        Ok(feedback)
    }
}

impl Hooks for ScriptHooks {
    fn on_launch(&mut self) -> Result<Vec<String>, HookError> {
        let mut feedback = Vec::new();
        for script in self.scripts(Event::Launch) {
            let output = self.run(&script, "")?;
            if !output.tasks.is_empty() {
                return Err(HookError::BadOutput {
                    script,
                    reason: "on-launch hooks must not emit tasks".to_string(),
                });
            }
            feedback.extend(output.messages);
        }
        Ok(feedback)
    }

    fn on_add(&mut self, task: &mut Task) -> Result<Vec<String>, HookError> {
        self.run_chain(Event::Add, None, task)
    }

    fn on_modify(&mut self, before: &Task, after: &mut Task) -> Result<Vec<String>, HookError> {
        self.run_chain(Event::Modify, Some(before), after)
    }

    fn on_exit(&mut self, changes: &[Task]) -> Result<Vec<String>, HookError> {
        let input = changes
            .iter()
            .map(|task| task.compose_json(false, &self.columns) + "\n")
            .collect::<String>();
        let mut feedback = Vec::new();
        for script in self.scripts(Event::Exit) {
            feedback.extend(self.run(&script, &input)?.messages);
        }
        Ok(feedback)
    }
}

fn discover(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut scripts = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| is_executable(path))
        .collect::<Vec<_>>();
    scripts.sort();
    scripts
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path).is_ok_and(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};

    use uuid::Uuid;

    use super::{HookError, Hooks, NoHooks, ScriptHooks};
    use crate::domain::columns::ColumnTable;
    use crate::domain::task::Task;

    fn hooks_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("strand-hooks-{}", Uuid::now_v7()));
        std::fs::create_dir_all(&dir).expect("hooks dir should be created");
        dir
    }

    fn script(dir: &Path, name: &str, body: &str) {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).expect("script should be written");
        let mut perms = std::fs::metadata(&path).expect("metadata").permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).expect("script should be executable");
    }

    fn task() -> Task {
        let mut task = Task::new();
        task.set("uuid", "a360fc44-315c-4366-b70c-ea7e7520b749");
        task.set("description", "original");
        task.set("status", "pending");
        task
    }

    #[test]
    fn no_hooks_changes_nothing() {
        let mut hooks = NoHooks;
        let mut subject = task();
        assert!(hooks.on_add(&mut subject).expect("no-op").is_empty());
        assert_eq!(subject, task());
    }

    #[test]
    fn on_add_script_replaces_the_task() {
        let dir = hooks_dir();
        script(
            &dir,
            "on-add-rename",
            "read line\necho \"$line\" | sed 's/original/renamed/'\necho 'renamed it'",
        );
        script(&dir, "on-exit-ignored", "exit 0");
        let mut hooks = ScriptHooks::new(&dir, ColumnTable::builtin());
        let mut subject = task();
        let feedback = hooks.on_add(&mut subject).expect("hook should succeed");
        assert_eq!(subject.description(), "renamed");
        assert_eq!(feedback, vec!["renamed it".to_string()]);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn failing_script_aborts_with_its_messages() {
        let dir = hooks_dir();
        script(&dir, "on-modify-veto", "cat >/dev/null\necho 'not today'\nexit 3");
        let mut hooks = ScriptHooks::new(&dir, ColumnTable::builtin());
        let before = task();
        let mut after = task();
        let err = hooks
            .on_modify(&before, &mut after)
            .expect_err("hook should abort");
        match err {
            HookError::Aborted { code, messages } => {
                assert_eq!(code, 3);
                assert_eq!(messages, vec!["not today".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn on_launch_collects_feedback() {
        let dir = hooks_dir();
        script(&dir, "on-launch-hello", "echo hello");
        std::fs::write(dir.join("on-launch-not-executable"), "echo nope").expect("plain file");
        let mut hooks = ScriptHooks::new(&dir, ColumnTable::builtin());
        assert_eq!(
            hooks.on_launch().expect("launch hook should run"),
            vec!["hello".to_string()]
        );
        let _ = std::fs::remove_dir_all(dir);
    }
}
