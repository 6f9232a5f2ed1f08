use std::io::{self, IsTerminal};

use crate::dates;
use crate::domain::columns::{ColumnTable, ColumnType};
use crate::domain::status::Status;
use crate::domain::task::Task;

/// One row per task: id, project, due date, description and tags.
pub fn render_list(tasks: &[Task], palette: &Palette) -> String {
    if tasks.is_empty() {
        return "No matches.\n".to_string();
    }
    let rows = tasks
        .iter()
        .map(|task| {
            [
                task.id.to_string(),
                task.get("project").unwrap_or("").to_string(),
                task.get_date("due").map(dates::format_display).unwrap_or_default(),
                describe(task),
            ]
        })
        .collect::<Vec<_>>();
    let headers = ["ID", "Project", "Due", "Description"];
    let mut widths = headers.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row.iter()) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    let heading = pad_row(&headers.map(str::to_string), &widths);
    out.push_str(&palette.heading(&heading));
    out.push('\n');
    for (row, task) in rows.iter().zip(tasks) {
        let mut line = format!(
            "{} {}",
            palette.id(&format!("{:>w$}", row[0], w = widths[0])),
            pad_row(&row[1..], &widths[1..])
        );
        let tags = task.tags();
        if !tags.is_empty() {
            line.push(' ');
            line.push_str(&palette.tags(&format!("+{}", tags.join(" +"))));
        }
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out.push_str(&palette.dim(&plural(tasks.len(), "task")));
    out.push('\n');
    out
}

fn pad_row(cells: &[String], widths: &[usize]) -> String {
    cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| format!("{:<w$}", cell, w = *width))
        .collect::<Vec<_>>()
        .join(" ")
        .trim_end()
        .to_string()
}

/// Description plus an annotation count marker.
fn describe(task: &Task) -> String {
    let annotations = task.annotations().len();
    if annotations == 0 {
        task.description().to_string()
    } else {
        format!("{} [{}]", task.description(), annotations)
    }
}

pub fn plural(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("1 {}", noun)
    } else {
        format!("{} {}s", count, noun)
    }
}

/// Every attribute of one task as a two-column table.
pub fn render_info(task: &Task, columns: &ColumnTable, palette: &Palette) -> String {
    let mut rows: Vec<(String, String)> = Vec::new();
    if task.id != 0 {
        rows.push(("ID".to_string(), task.id.to_string()));
    }
    let mut description = task.description().to_string();
    for (entry, text) in task.annotations() {
        description.push_str(&format!("\n  {} {}", dates::format_display(entry), text));
    }
    rows.push(("Description".to_string(), description));
    rows.push(("Status".to_string(), palette.status(task.status())));
    if task.is_blocked {
        rows.push(("Blocked".to_string(), "yes".to_string()));
    }
    if task.is_blocking {
        rows.push(("Blocking".to_string(), "yes".to_string()));
    }
    for (name, value) in task.attributes() {
        if matches!(name, "description" | "status") || name.starts_with("annotation_") {
            continue;
        }
        let label = columns
            .get(name)
            .map(|column| column.label.clone())
            .unwrap_or_else(|| name.to_string());
        rows.push((label, render_value(name, value, columns)));
    }

    let width = rows
        .iter()
        .map(|(label, _)| label.chars().count())
        .max()
        .unwrap_or(0);
    let mut out = String::new();
    out.push_str(&palette.heading(&format!("{:<w$} Value", "Name", w = width)));
    out.push('\n');
    for (label, value) in rows {
        out.push_str(&format!("{:<w$} {}\n", label, value, w = width));
    }
    out
}

fn render_value(name: &str, value: &str, columns: &ColumnTable) -> String {
    match (columns.kind(name), value.parse::<i64>()) {
        (Some(ColumnType::Date), Ok(epoch)) => dates::format_display(epoch),
        _ if name == "tags" || name == "depends" => value.replace(',', " "),
        _ => value.to_string(),
    }
}

/// Shows what an undo would change. `side` is a three-column table, anything
/// else a `-`/`+` listing of the stored records.
pub fn render_undo(
    style: &str,
    when: Option<i64>,
    prior: Option<&Task>,
    current: &Task,
    columns: &ColumnTable,
) -> String {
    let stamp = when.map(dates::format_display).unwrap_or_default();
    if style != "side" {
        let mut out = format!("--- previous state  {}\n+++ current state   {}\n", stamp, stamp);
        if let Some(prior) = prior {
            out.push_str(&format!("- {}\n", prior.compose_f4()));
        }
        out.push_str(&format!("+ {}\n", current.compose_f4()));
        return out;
    }

    let mut names = current
        .attributes()
        .map(|(name, _)| name.to_string())
        .collect::<Vec<_>>();
    if let Some(prior) = prior {
        names.extend(prior.attributes().map(|(name, _)| name.to_string()));
    }
    names.sort();
    names.dedup();

    let mut rows = vec![(
        String::new(),
        "Prior Values".to_string(),
        "Current Values".to_string(),
    )];
    for name in names {
        let before = prior
            .and_then(|task| task.get(&name))
            .map(|value| render_value(&name, value, columns))
            .unwrap_or_default();
        let after = current
            .get(&name)
            .map(|value| render_value(&name, value, columns))
            .unwrap_or_default();
        rows.push((name, before, after));
    }
    let first = rows.iter().map(|row| row.0.chars().count()).max().unwrap_or(0);
    let second = rows.iter().map(|row| row.1.chars().count()).max().unwrap_or(0);

    let mut out = format!("\nThe last modification was made {}\n\n", stamp);
    for (name, before, after) in rows {
        let line = format!(
            "{:<a$}  {:<b$}  {}",
            name,
            before,
            after,
            a = first,
            b = second
        );
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}

pub struct Palette {
    enabled: bool,
}

impl Palette {
    pub fn auto() -> Self {
        let enabled = std::env::var_os("NO_COLOR").is_none() && io::stdout().is_terminal();
        Self { enabled }
    }

    pub fn plain() -> Self {
        Self { enabled: false }
    }

    fn paint(&self, code: &str, text: &str) -> String {
        if self.enabled {
            format!("\x1b[{code}m{text}\x1b[0m")
        } else {
            text.to_string()
        }
    }

    pub fn heading(&self, text: &str) -> String {
        self.paint("4", text)
    }

    pub fn dim(&self, text: &str) -> String {
        self.paint("2", text)
    }

    pub fn id(&self, text: &str) -> String {
        self.paint("1;94", text)
    }

    pub fn status(&self, status: Status) -> String {
        self.paint(status_color_code(status), status.as_str())
    }

    pub fn tags(&self, text: &str) -> String {
        self.paint("90", text)
    }
}

fn status_color_code(status: Status) -> &'static str {
    match status {
        Status::Pending => "37",
        Status::Waiting => "34",
        Status::Recurring => "36",
        Status::Completed => "32",
        Status::Deleted => "31",
    }
}

#[cfg(test)]
mod tests {
    use super::{plural, render_info, render_list, render_undo, Palette};
    use crate::domain::columns::ColumnTable;
    use crate::domain::task::Task;

    fn task(id: u64, description: &str) -> Task {
        let mut task = Task::new();
        task.id = id;
        task.set("uuid", "a360fc44-315c-4366-b70c-ea7e7520b749");
        task.set("description", description);
        task.set("status", "pending");
        task
    }

    #[test]
    fn list_rows_align_and_count() {
        let mut first = task(1, "pay bills");
        first.set("project", "home");
        first.set("due", "1704067200");
        first.add_tag("next");
        let second = task(12, "call mom");
        let out = render_list(&[first, second], &Palette::plain());
        let lines = out.lines().collect::<Vec<_>>();
        assert_eq!(lines[0], "ID Project Due        Description");
        assert_eq!(lines[1], " 1 home    2024-01-01 pay bills +next");
        assert_eq!(lines[2], "12                    call mom");
        assert_eq!(lines[3], "2 tasks");
        assert_eq!(render_list(&[], &Palette::plain()), "No matches.\n");
        assert_eq!(plural(1, "task"), "1 task");
    }

    #[test]
    fn info_shows_labels_and_dates() {
        let mut subject = task(3, "pay bills");
        subject.set("due", "1704067200");
        subject.annotate(1704067200, "called bank");
        subject.is_blocked = true;
        let out = render_info(&subject, &ColumnTable::builtin(), &Palette::plain());
        assert!(out.contains("ID          3"));
        assert!(out.contains("Description pay bills\n  2024-01-01 called bank"));
        assert!(out.contains("Due         2024-01-01"));
        assert!(out.contains("Blocked     yes"));
        assert!(!out.contains("annotation_"));
    }

    #[test]
    fn undo_diff_styles() {
        let mut before = task(0, "x");
        before.set("priority", "H");
        let mut after = task(0, "x");
        after.set("priority", "L");
        let columns = ColumnTable::builtin();
        let side = render_undo("side", Some(1704067200), Some(&before), &after, &columns);
        assert!(side.contains("The last modification was made 2024-01-01"));
        assert!(side
            .lines()
            .any(|line| line.split_whitespace().collect::<Vec<_>>() == ["priority", "H", "L"]));
        let diff = render_undo("diff", None, Some(&before), &after, &columns);
        assert!(diff.contains("- [description:\"x\" priority:\"H\""));
        assert!(diff.contains("+ [description:\"x\" priority:\"L\""));
    }
}
