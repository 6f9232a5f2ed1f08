use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;
use std::path::{Path, PathBuf};

const DEFAULTS: &[(&str, &str)] = &[
    ("abbreviation.minimum", "2"),
    ("color", "on"),
    ("confirmation", "on"),
    ("context", ""),
    ("data.location", "~/.strand"),
    ("debug", "off"),
    ("debug.hooks", "0"),
    ("debug.parser", "0"),
    ("default.command", "list"),
    ("default.project", ""),
    ("gc", "on"),
    ("hooks", "on"),
    ("locking", "on"),
    ("recurrence.confirmation", "prompt"),
    ("regex", "on"),
    ("search.case.sensitive", "on"),
    ("undo.style", "side"),
    ("verbose", "on"),
];

pub const DEFAULT_RC_NAME: &str = ".strandrc.toml";

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Toml {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "could not read {}: {}", path.display(), source)
            }
            ConfigError::Toml { path, source } => {
                write!(f, "could not parse {}: {}", path.display(), source)
            }
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Toml { source, .. } => Some(source),
        }
    }
}

/// Flat dotted-key configuration store, seeded with built-in defaults.
#[derive(Debug, Clone)]
pub struct Config {
    values: BTreeMap<String, String>,
    source: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        let values = DEFAULTS
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        Self {
            values,
            source: None,
        }
    }
}

impl Config {
    /// Loads an rc file on top of the defaults. A missing file is not an error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Config::default();
        if !path.exists() {
            return Ok(config);
        }
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        config
            .merge_toml(&text)
            .map_err(|source| ConfigError::Toml {
                path: path.to_path_buf(),
                source,
            })?;
        config.source = Some(path.to_path_buf());
        Ok(config)
    }

    pub fn merge_toml(&mut self, text: &str) -> Result<(), toml::de::Error> {
        let table: toml::Table = text.parse()?;
        for (key, value) in &table {
            flatten(key, value, &mut self.values);
        }
        Ok(())
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn get(&self, key: &str) -> &str {
        self.values.get(key).map(String::as_str).unwrap_or("")
    }

    pub fn set(&mut self, key: &str, value: &str) {
        self.values.insert(key.to_string(), value.to_string());
    }

    pub fn get_bool(&self, key: &str) -> bool {
        is_truthy(self.get(key))
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.get(key).trim().parse().ok()
    }

    /// Entries under `prefix.` with the prefix stripped, e.g. `alias.rm` -> `rm`.
    pub fn with_prefix<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = (&'a str, &'a str)> {
        self.values.iter().filter_map(move |(key, value)| {
            key.strip_prefix(prefix)
                .and_then(|rest| rest.strip_prefix('.'))
                .map(|rest| (rest, value.as_str()))
        })
    }

    /// UDA names with their declared types.
    pub fn udas(&self) -> Vec<(String, String)> {
        self.with_prefix("uda")
            .filter_map(|(rest, value)| {
                rest.strip_suffix(".type")
                    .map(|name| (name.to_string(), value.to_string()))
            })
            .collect()
    }

    pub fn verbose(&self, token: &str) -> bool {
        let setting = self.get("verbose").trim();
        if is_truthy(setting) {
            return true;
        }
        if matches!(setting, "off" | "no" | "n" | "0" | "false" | "nothing" | "") {
            return false;
        }
        setting.split(',').any(|item| item.trim() == token)
    }

    /// Name of the active saved context, if any. TOML cannot hold both `context`
    /// and `[context]`, so `context.active` is accepted from files.
    pub fn active_context(&self) -> Option<&str> {
        [self.get("context"), self.get("context.active")]
            .into_iter()
            .map(str::trim)
            .find(|name| !name.is_empty())
    }

    pub fn data_location(&self) -> PathBuf {
        expand_home(self.get("data.location"))
    }
}

pub fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "on" | "yes" | "y" | "1" | "true" | "t"
    )
}

pub fn expand_home(raw: &str) -> PathBuf {
    match raw.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(raw)),
        None if raw == "~" => dirs::home_dir().unwrap_or_else(|| PathBuf::from(raw)),
        None => PathBuf::from(raw),
    }
}

pub fn default_rc_path() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(DEFAULT_RC_NAME))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_RC_NAME))
}

fn flatten(key: &str, value: &toml::Value, out: &mut BTreeMap<String, String>) {
    match value {
        toml::Value::Table(table) => {
            for (child, nested) in table {
                flatten(&format!("{key}.{child}"), nested, out);
            }
        }
        toml::Value::String(text) => {
            out.insert(key.to_string(), text.clone());
        }
        toml::Value::Boolean(flag) => {
            out.insert(key.to_string(), if *flag { "on" } else { "off" }.to_string());
        }
        toml::Value::Array(items) => {
            let joined = items
                .iter()
                .map(|item| match item {
                    toml::Value::String(text) => text.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join(",");
            out.insert(key.to_string(), joined);
        }
        other => {
            out.insert(key.to_string(), other.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{expand_home, Config};
    use uuid::Uuid;

    #[test]
    fn defaults_cover_the_core_switches() {
        let config = Config::default();
        assert!(config.get_bool("gc"));
        assert!(config.get_bool("locking"));
        assert_eq!(config.get("default.command"), "list");
        assert_eq!(config.get_int("abbreviation.minimum"), Some(2));
        assert_eq!(config.get("missing.key"), "");
        assert_eq!(config.get("recurrence.confirmation"), "prompt");
    }

    #[test]
    fn nested_tables_flatten_into_dotted_keys() {
        let mut config = Config::default();
        config
            .merge_toml(
                r#"
default.command = "next"
confirmation = false

[alias]
rm = "delete"

[uda.estimate]
type = "numeric"

[context]
work = "project:work"
"#,
            )
            .expect("rc text should parse");
        assert_eq!(config.get("default.command"), "next");
        assert_eq!(config.get("confirmation"), "off");
        assert_eq!(config.get("alias.rm"), "delete");
        assert_eq!(
            config.udas(),
            vec![("estimate".to_string(), "numeric".to_string())]
        );
        let contexts = config.with_prefix("context").collect::<Vec<_>>();
        assert_eq!(contexts, vec![("work", "project:work")]);
        assert_eq!(config.active_context(), None);

        config.set("context", "work");
        assert_eq!(config.active_context(), Some("work"));
    }

    #[test]
    fn verbose_accepts_switches_and_token_lists() {
        let mut config = Config::default();
        assert!(config.verbose("footnote"));
        config.set("verbose", "nothing");
        assert!(!config.verbose("footnote"));
        config.set("verbose", "header,footnote");
        assert!(config.verbose("footnote"));
        assert!(!config.verbose("affected"));
    }

    #[test]
    fn load_reports_missing_and_malformed_files() {
        let dir = std::env::temp_dir().join(format!("strand-config-test-{}", Uuid::now_v7()));
        std::fs::create_dir_all(&dir).expect("temp dir should be creatable");

        let missing = Config::load(&dir.join("absent.toml")).expect("missing rc should default");
        assert!(missing.source().is_none());

        let broken = dir.join("broken.toml");
        std::fs::write(&broken, "gc = [").expect("rc should be writable");
        let err = Config::load(&broken).expect_err("malformed rc should fail");
        assert!(err.to_string().contains("could not parse"));

        let good = dir.join("good.toml");
        std::fs::write(&good, "gc = false\n").expect("rc should be writable");
        let loaded = Config::load(&good).expect("rc should load");
        assert!(!loaded.get_bool("gc"));
        assert_eq!(loaded.source(), Some(good.as_path()));

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn home_expansion_leaves_absolute_paths_alone() {
        assert_eq!(expand_home("/tmp/data"), std::path::PathBuf::from("/tmp/data"));
    }
}
