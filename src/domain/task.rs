use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;

use serde_json::{Map, Value};
use uuid::Uuid;

use super::columns::{ColumnTable, ColumnType};
use super::status::Status;
use crate::dates;

const ANNOTATION_PREFIX: &str = "annotation_";

#[derive(Debug)]
pub enum TaskError {
    Empty,
    Malformed { reason: String },
    MissingDescription,
    InvalidStatus(String),
    InvalidDate { name: String, value: String },
    Json(serde_json::Error),
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskError::Empty => write!(f, "empty record"),
            TaskError::Malformed { reason } => write!(f, "malformed record: {}", reason),
            TaskError::MissingDescription => write!(f, "A task must have a description."),
            TaskError::InvalidStatus(value) => write!(f, "invalid task status '{}'", value),
            TaskError::InvalidDate { name, value } => {
                write!(f, "'{}' is not a valid date in the '{}' attribute.", value, name)
            }
            TaskError::Json(err) => write!(f, "invalid JSON record: {}", err),
        }
    }
}

impl Error for TaskError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            TaskError::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for TaskError {
    fn from(value: serde_json::Error) -> Self {
        TaskError::Json(value)
    }
}

fn malformed(reason: &str) -> TaskError {
    TaskError::Malformed {
        reason: reason.to_string(),
    }
}

/// One task: a flat attribute map plus the ephemeral id and dependency flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Task {
    data: BTreeMap<String, String>,
    pub id: u64,
    pub is_blocked: bool,
    pub is_blocking: bool,
}

impl Task {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.data.get(name).map(String::as_str)
    }

    pub fn has(&self, name: &str) -> bool {
        self.data.get(name).is_some_and(|value| !value.is_empty())
    }

    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.data.insert(name.to_string(), value.into());
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.data.remove(name)
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.data
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn uuid(&self) -> &str {
        self.get("uuid").unwrap_or("")
    }

    pub fn description(&self) -> &str {
        self.get("description").unwrap_or("")
    }

    pub fn get_date(&self, name: &str) -> Option<i64> {
        self.get(name)?.trim().parse().ok()
    }

    /// Missing or unreadable status reads as pending.
    pub fn status(&self) -> Status {
        self.get("status")
            .and_then(|value| value.parse().ok())
            .unwrap_or_default()
    }

    pub fn set_status(&mut self, status: Status) {
        self.set("status", status.as_str());
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    fn list(&self, name: &str) -> Vec<String> {
        self.get(name)
            .unwrap_or("")
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect()
    }

    fn set_list(&mut self, name: &str, items: &[String]) {
        if items.is_empty() {
            self.data.remove(name);
        } else {
            self.set(name, items.join(","));
        }
    }

    pub fn tags(&self) -> Vec<String> {
        self.list("tags")
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags().iter().any(|known| known == tag)
    }

    pub fn add_tag(&mut self, tag: &str) {
        if self.has_tag(tag) {
            return;
        }
        let mut tags = self.tags();
        tags.push(tag.to_string());
        self.set_list("tags", &tags);
    }

    pub fn remove_tag(&mut self, tag: &str) {
        let mut tags = self.tags();
        tags.retain(|known| known != tag);
        self.set_list("tags", &tags);
    }

    pub fn dependencies(&self) -> Vec<String> {
        self.list("depends")
    }

    pub fn add_dependency(&mut self, uuid: &str) {
        let mut depends = self.dependencies();
        if !depends.iter().any(|known| known == uuid) {
            depends.push(uuid.to_string());
            self.set_list("depends", &depends);
        }
    }

    pub fn remove_dependency(&mut self, uuid: &str) {
        let mut depends = self.dependencies();
        depends.retain(|known| known != uuid);
        self.set_list("depends", &depends);
    }

    /// `(entry epoch, text)` pairs in entry order.
    pub fn annotations(&self) -> Vec<(i64, String)> {
        self.data
            .iter()
            .filter_map(|(name, value)| {
                let epoch = name.strip_prefix(ANNOTATION_PREFIX)?.parse().ok()?;
                Some((epoch, value.clone()))
            })
            .collect()
    }

    pub fn annotate(&mut self, epoch: i64, text: &str) {
        let mut epoch = epoch;
        while self.data.contains_key(&format!("{ANNOTATION_PREFIX}{epoch}")) {
            epoch += 1;
        }
        self.set(&format!("{ANNOTATION_PREFIX}{epoch}"), text);
    }

    /// Fills in defaults and checks the record is storable.
    pub fn validate(
        &mut self,
        apply_defaults: bool,
        default_project: &str,
        now: i64,
    ) -> Result<(), TaskError> {
        if !self.has("uuid") {
            self.set("uuid", Uuid::new_v4().to_string());
        }
        if let Some(status) = self.get("status") {
            if status.parse::<Status>().is_err() {
                return Err(TaskError::InvalidStatus(status.to_string()));
            }
        }
        if apply_defaults {
            if !self.has("status") {
                self.set_status(Status::Pending);
            }
            if self.status() == Status::Pending && self.get_date("wait").is_some_and(|wait| wait > now)
            {
                self.set_status(Status::Waiting);
            }
            if !self.has("entry") {
                self.set("entry", now.to_string());
            }
            if !default_project.is_empty() && !self.has("project") {
                self.set("project", default_project);
            }
        }
        if self.description().trim().is_empty() {
            return Err(TaskError::MissingDescription);
        }
        Ok(())
    }

    /// `[name:"value" ...]`, attributes in name order.
    pub fn compose_f4(&self) -> String {
        let fields = self
            .data
            .iter()
            .filter(|(_, value)| !value.is_empty())
            .map(|(name, value)| format!("{}:\"{}\"", name, encode_value(value)))
            .collect::<Vec<_>>();
        format!("[{}]", fields.join(" "))
    }

    /// Parses one stored line; JSON object lines are accepted as well.
    pub fn parse(line: &str) -> Result<Task, TaskError> {
        let line = line.trim();
        if line.is_empty() {
            return Err(TaskError::Empty);
        }
        if line.starts_with('{') {
            return Task::parse_json(line, &ColumnTable::builtin());
        }
        let body = line
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
            .ok_or_else(|| malformed("unterminated record"))?;
        if body.trim().is_empty() {
            return Err(TaskError::Empty);
        }

        let mut task = Task::new();
        let mut rest = body;
        loop {
            rest = rest.trim_start();
            if rest.is_empty() {
                break;
            }
            let colon = rest.find(':').ok_or_else(|| malformed("missing ':'"))?;
            let name = &rest[..colon];
            if name.is_empty() || name.contains(char::is_whitespace) {
                return Err(malformed("bad attribute name"));
            }
            let value = rest[colon + 1..]
                .strip_prefix('"')
                .ok_or_else(|| malformed("missing opening quote"))?;
            let close = closing_quote(value).ok_or_else(|| malformed("unterminated value"))?;
            task.data
                .insert(name.to_string(), decode_value(&value[..close])?);
            rest = &value[close + 1..];
        }
        Ok(task)
    }

    pub fn to_json(&self, include_id: bool, columns: &ColumnTable) -> Value {
        let mut object = Map::new();
        if include_id && self.id != 0 {
            object.insert("id".to_string(), Value::from(self.id));
        }
        let mut annotations = Vec::new();
        for (name, value) in &self.data {
            if let Some(epoch) = name.strip_prefix(ANNOTATION_PREFIX) {
                let entry = epoch
                    .parse()
                    .map(dates::format_iso)
                    .unwrap_or_else(|_| epoch.to_string());
                let mut annotation = Map::new();
                annotation.insert("entry".to_string(), Value::String(entry));
                annotation.insert("description".to_string(), Value::String(value.clone()));
                annotations.push(Value::Object(annotation));
                continue;
            }
            if name == "tags" {
                let tags = self.tags().into_iter().map(Value::String).collect();
                object.insert(name.clone(), Value::Array(tags));
                continue;
            }
            let rendered = match columns.kind(name) {
                Some(ColumnType::Date) => match value.parse::<i64>() {
                    Ok(epoch) => Value::String(dates::format_iso(epoch)),
                    Err(_) => Value::String(value.clone()),
                },
                Some(ColumnType::Numeric) => numeric_value(value),
                _ => Value::String(value.clone()),
            };
            object.insert(name.clone(), rendered);
        }
        if !annotations.is_empty() {
            object.insert("annotations".to_string(), Value::Array(annotations));
        }
        Value::Object(object)
    }

    pub fn compose_json(&self, include_id: bool, columns: &ColumnTable) -> String {
        self.to_json(include_id, columns).to_string()
    }

    pub fn parse_json(text: &str, columns: &ColumnTable) -> Result<Task, TaskError> {
        let value: Value = serde_json::from_str(text)?;
        Task::from_json(&value, columns)
    }

    pub fn from_json(value: &Value, columns: &ColumnTable) -> Result<Task, TaskError> {
        let object = value
            .as_object()
            .ok_or_else(|| malformed("JSON record is not an object"))?;
        let mut task = Task::new();
        for (name, value) in object {
            match name.as_str() {
                "id" | "urgency" => {}
                "annotations" => {
                    for annotation in value.as_array().into_iter().flatten() {
                        let entry = annotation
                            .get("entry")
                            .and_then(Value::as_str)
                            .and_then(dates::parse)
                            .unwrap_or_else(dates::now_epoch);
                        let text = annotation
                            .get("description")
                            .and_then(Value::as_str)
                            .unwrap_or("");
                        task.annotate(entry, text);
                    }
                }
                _ => {
                    let text = json_text(value);
                    let text = match columns.kind(name) {
                        Some(ColumnType::Date) if !text.is_empty() => dates::parse(&text)
                            .or_else(|| text.parse().ok())
                            .map(|epoch: i64| epoch.to_string())
                            .ok_or_else(|| TaskError::InvalidDate {
                                name: name.clone(),
                                value: text.clone(),
                            })?,
                        _ => text,
                    };
                    if !text.is_empty() {
                        task.data.insert(name.clone(), text);
                    }
                }
            }
        }
        Ok(task)
    }
}

fn numeric_value(value: &str) -> Value {
    if let Ok(integer) = value.parse::<i64>() {
        return Value::from(integer);
    }
    value
        .parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(value.to_string()))
}

fn json_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Array(items) => items
            .iter()
            .map(json_text)
            .filter(|item| !item.is_empty())
            .collect::<Vec<_>>()
            .join(","),
        other => other.to_string(),
    }
}

fn encode_value(value: &str) -> String {
    let quoted = Value::String(value.to_string()).to_string();
    quoted[1..quoted.len() - 1]
        .replace('[', "&open;")
        .replace(']', "&close;")
}

fn decode_value(encoded: &str) -> Result<String, TaskError> {
    let json = format!(
        "\"{}\"",
        encoded
            .replace("&open;", "[")
            .replace("&close;", "]")
            .replace("&dquot;", "\\\"")
    );
    Ok(serde_json::from_str(&json)?)
}

/// Index of the first unescaped `"`.
fn closing_quote(text: &str) -> Option<usize> {
    let mut escaped = false;
    for (index, c) in text.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '"' => return Some(index),
            _ => {}
        }
    }
    None
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.compose_f4())
    }
}
