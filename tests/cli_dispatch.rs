use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde_json::Value;
use uuid::Uuid;

const QUIET_RC: &str = "verbose = \"off\"\nconfirmation = \"off\"\nhooks = \"off\"\n";

fn unique_workspace(prefix: &str, rc: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("{prefix}-{}", Uuid::now_v7()));
    std::fs::create_dir_all(path.join("data")).expect("workspace should be creatable");
    std::fs::write(path.join("strandrc.toml"), rc).expect("rc file should be writable");
    path
}

fn run_strand(root: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_strand"))
        .arg("--rc")
        .arg(root.join("strandrc.toml"))
        .arg("--data")
        .arg(root.join("data"))
        .args(args)
        .env_remove("RUST_LOG")
        .env("NO_COLOR", "1")
        .output()
        .expect("strand command should run")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn assert_success(output: &Output) {
    assert!(
        output.status.success(),
        "expected success but failed.\nstdout:\n{}\nstderr:\n{}",
        stdout(output),
        stderr(output)
    );
}

fn assert_failure(output: &Output, code: i32) {
    assert_eq!(
        output.status.code(),
        Some(code),
        "unexpected status.\nstdout:\n{}\nstderr:\n{}",
        stdout(output),
        stderr(output)
    );
}

#[test]
fn task_lifecycle_through_the_binary() {
    let root = unique_workspace("strand-cli-lifecycle", QUIET_RC);

    let added = run_strand(&root, &["add", "pay", "bills", "due:2024-03-01", "+home"]);
    assert_success(&added);
    assert_eq!(stdout(&added), "Created task 1.\n");
    assert_success(&run_strand(&root, &["add", "call", "mom", "priority:H"]));

    let listed = run_strand(&root, &["list"]);
    assert_success(&listed);
    let text = stdout(&listed);
    assert!(text.contains("2024-03-01 pay bills +home"), "{text}");
    assert!(text.ends_with("2 tasks\n"));

    let modified = run_strand(&root, &["2", "modify", "priority:L"]);
    assert_success(&modified);
    assert!(stdout(&modified).ends_with("Modified 1 task.\n"));

    let done = run_strand(&root, &["1", "done"]);
    assert_success(&done);
    assert!(stdout(&done).starts_with("Completed task 1 'pay bills'."));

    let exported = run_strand(&root, &["export"]);
    assert_success(&exported);
    let tasks: Value = serde_json::from_slice(&exported.stdout).expect("export should emit json");
    let tasks = tasks.as_array().expect("export should be an array");
    assert_eq!(tasks.len(), 2);
    let pending = tasks
        .iter()
        .find(|task| task["status"] == "pending")
        .expect("one task should remain pending");
    assert_eq!(pending["id"], 1);
    assert_eq!(pending["priority"], "L");

    let ids = run_strand(&root, &["_ids"]);
    assert_eq!(stdout(&ids), "1\n");

    let undo = run_strand(&root, &["undo"]);
    assert_success(&undo);
    assert!(stdout(&undo).ends_with("Undo complete.\n"), "{}", stdout(&undo));

    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn soft_and_hard_failures_use_distinct_statuses() {
    let root = unique_workspace("strand-cli-failures", QUIET_RC);
    assert_success(&run_strand(&root, &["add", "first"]));

    let unfiltered = run_strand(&root, &["modify", "renamed"]);
    assert_failure(&unfiltered, 1);
    assert_eq!(stdout(&unfiltered), "No tasks specified.\n");

    let rejected = run_strand(&root, &["1", "modify", "mask:x"]);
    assert_failure(&rejected, 2);
    assert!(stderr(&rejected).contains("The 'mask' attribute does not allow a value of 'x'."));

    let duplicate = run_strand(&root, &["1", "export"]);
    let uuid = serde_json::from_slice::<Value>(&duplicate.stdout).expect("json")[0]["uuid"]
        .as_str()
        .expect("uuid should be a string")
        .to_string();
    let file = root.join("again.json");
    std::fs::write(
        &file,
        format!("{{\"uuid\":\"{}\",\"description\":\"first\",\"status\":\"pending\"}}\n", uuid),
    )
    .expect("import file should be writable");
    let imported = run_strand(&root, &["import", file.to_str().expect("utf8 path")]);
    assert_success(&imported);
    assert!(stdout(&imported).contains(&format!("  mod  {} first", uuid)));

    let nothing = run_strand(&root, &["undo"]);
    assert_success(&nothing);
    let empty = unique_workspace("strand-cli-empty", QUIET_RC);
    let nothing = run_strand(&empty, &["undo"]);
    assert_failure(&nothing, 2);
    assert!(stderr(&nothing).contains("There are no recorded transactions to undo."));

    let _ = std::fs::remove_dir_all(root);
    let _ = std::fs::remove_dir_all(empty);
}

#[test]
fn headers_and_footnotes_follow_verbosity() {
    let root = unique_workspace("strand-cli-verbose", "hooks = \"off\"\n");
    let listed = run_strand(&root, &["rc.gc:off"]);
    assert_failure(&listed, 1);
    let text = stdout(&listed);
    assert!(text.starts_with("[strand list]\n"), "{text}");
    assert!(text.contains("No matches.\n"));
    assert!(text.ends_with("Configuration override rc.gc:off\n"));

    let quiet = run_strand(&root, &["rc.verbose:off", "count"]);
    assert_success(&quiet);
    assert_eq!(stdout(&quiet), "0\n");

    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn imports_json_arrays() {
    let root = unique_workspace("strand-cli-import", QUIET_RC);
    let file = root.join("tasks.json");
    std::fs::write(
        &file,
        r#"[
{"description":"one","status":"pending","entry":"20240101T000000Z","tags":["a"]},
{"description":"two","status":"completed","entry":"20240101T000000Z","end":"20240102T000000Z"}
]"#,
    )
    .expect("import file should be writable");

    let imported = run_strand(&root, &["import", file.to_str().expect("utf8 path")]);
    assert_success(&imported);
    assert!(stdout(&imported).ends_with("Imported 2 tasks.\n"));

    let counted = run_strand(&root, &["count"]);
    assert_eq!(stdout(&counted), "2\n");
    let tagged = run_strand(&root, &["+a", "_uuids"]);
    assert_eq!(stdout(&tagged).lines().count(), 1);

    let _ = std::fs::remove_dir_all(root);
}

#[cfg(unix)]
#[test]
fn aborting_hook_stops_the_command() {
    use std::os::unix::fs::PermissionsExt;

    let root = unique_workspace("strand-cli-hooks", "verbose = \"off\"\n");
    let hooks = root.join("data/hooks");
    std::fs::create_dir_all(&hooks).expect("hooks dir should be creatable");
    let script = hooks.join("on-add-reject");
    std::fs::write(&script, "#!/bin/sh\ncat >/dev/null\necho 'no new work'\nexit 1\n")
        .expect("hook should be writable");
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755))
        .expect("hook should be executable");

    let added = run_strand(&root, &["add", "weekend", "chores"]);
    assert_failure(&added, 4);
    assert!(stderr(&added).contains("no new work"));
    assert!(!stderr(&added).contains("hook aborted"));
    assert!(!root.join("data/pending.data").exists());

    let _ = std::fs::remove_dir_all(root);
}
