use std::collections::BTreeMap;

use crate::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    String,
    Numeric,
    Date,
    Duration,
}

impl ColumnType {
    pub fn as_str(self) -> &'static str {
        match self {
            ColumnType::String => "string",
            ColumnType::Numeric => "numeric",
            ColumnType::Date => "date",
            ColumnType::Duration => "duration",
        }
    }

    pub fn from_uda_type(value: &str) -> Option<Self> {
        match value.trim() {
            "string" => Some(ColumnType::String),
            "numeric" => Some(ColumnType::Numeric),
            "date" => Some(ColumnType::Date),
            "duration" => Some(ColumnType::Duration),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub kind: ColumnType,
    pub modifiable: bool,
    pub uda: bool,
    pub label: String,
}

const BUILTIN: &[(&str, ColumnType, bool)] = &[
    ("depends", ColumnType::String, true),
    ("description", ColumnType::String, true),
    ("due", ColumnType::Date, true),
    ("end", ColumnType::Date, true),
    ("entry", ColumnType::Date, true),
    ("id", ColumnType::Numeric, false),
    ("imask", ColumnType::Numeric, false),
    ("mask", ColumnType::String, false),
    ("modified", ColumnType::Date, true),
    ("parent", ColumnType::String, false),
    ("priority", ColumnType::String, true),
    ("project", ColumnType::String, true),
    ("recur", ColumnType::Duration, true),
    ("scheduled", ColumnType::Date, true),
    ("start", ColumnType::Date, true),
    ("status", ColumnType::String, true),
    ("tags", ColumnType::String, true),
    ("until", ColumnType::Date, true),
    ("urgency", ColumnType::Numeric, false),
    ("uuid", ColumnType::String, false),
    ("wait", ColumnType::Date, true),
];

/// Known task attributes: the built-in set plus configured UDAs.
#[derive(Debug, Clone)]
pub struct ColumnTable {
    columns: BTreeMap<String, Column>,
}

impl ColumnTable {
    pub fn builtin() -> Self {
        let columns = BUILTIN
            .iter()
            .map(|(name, kind, modifiable)| {
                (
                    name.to_string(),
                    Column {
                        name: name.to_string(),
                        kind: *kind,
                        modifiable: *modifiable,
                        uda: false,
                        label: capitalize(name),
                    },
                )
            })
            .collect();
        Self { columns }
    }

    /// Built-in columns plus every `uda.<name>.type` entry. Unknown UDA types
    /// fall back to string.
    pub fn from_config(config: &Config) -> Self {
        let mut table = Self::builtin();
        for (name, kind) in config.udas() {
            if table.columns.get(&name).is_some_and(|column| !column.uda) {
                tracing::warn!(uda = %name, "UDA shadows a built-in attribute; ignored");
                continue;
            }
            let kind = ColumnType::from_uda_type(&kind).unwrap_or(ColumnType::String);
            tracing::debug!(uda = %name, kind = kind.as_str(), "UDA registered");
            let label = match config.get(&format!("uda.{name}.label")) {
                "" => capitalize(&name),
                label => label.to_string(),
            };
            table.columns.insert(
                name.clone(),
                Column {
                    name,
                    kind,
                    modifiable: true,
                    uda: true,
                    label,
                },
            );
        }
        table
    }

    pub fn get(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    pub fn kind(&self, name: &str) -> Option<ColumnType> {
        self.get(name).map(|column| column.kind)
    }

    pub fn is_modifiable(&self, name: &str) -> bool {
        self.get(name).is_some_and(|column| column.modifiable)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Column> {
        self.columns.values()
    }

    pub fn udas(&self) -> impl Iterator<Item = &Column> {
        self.columns.values().filter(|column| column.uda)
    }
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
