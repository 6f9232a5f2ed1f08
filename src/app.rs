use std::error::Error;
use std::fmt;
use std::io::IsTerminal;
use std::path::PathBuf;

use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::cli::Cli;
use crate::commands::{self, Context};
use crate::config::{default_rc_path, expand_home, Config, ConfigError};
use crate::confirm::Prompt;
use crate::domain::columns::ColumnTable;
use crate::domain::task::TaskError;
use crate::feedback::Feedback;
use crate::filter::FilterError;
use crate::hooks::{HookError, Hooks, NoHooks, ScriptHooks};
use crate::locks::DEFAULT_TIMEOUT;
use crate::parser::desugar::MODIFIERS;
use crate::parser::lexer::{OPERATORS, UNARY_OR_GROUPING};
use crate::parser::registry::{EntityRegistry, DEFAULT_MINIMUM_MATCH};
use crate::parser::{self, Classifier, ParseError, ParserContext};
use crate::storage::{StorageContext, StorageError, TaskDb};
use crate::ui::Palette;

/// Exit status for user input and data errors.
pub const EXIT_ERROR: i32 = 2;
/// Exit status when a hook script stopped the command.
pub const EXIT_HOOK_ABORT: i32 = 4;
/// Exit status for anything that escaped as a panic.
pub const EXIT_UNKNOWN: i32 = 3;

/// One command line run: configuration, the classified arguments and the
/// open database.
pub struct App {
    config: Config,
    columns: ColumnTable,
    classifier: Classifier,
    db: TaskDb,
    feedback: Feedback,
    palette: Palette,
}

impl App {
    /// `binary` becomes the first argument the classifier sees.
    pub fn open(cli: &Cli, binary: &str) -> Result<Self, AppError> {
        let argv = std::iter::once(binary.to_string())
            .chain(cli.args.iter().cloned())
            .collect::<Vec<_>>();

        let mut headers = Vec::new();
        let rc_path = match parser::rc_override(&argv) {
            Some(file) => {
                let path = expand_home(&file);
                headers.push(format!("Using alternate .taskrc file {}", path.display()));
                path
            }
            None => cli.rc.clone().unwrap_or_else(default_rc_path),
        };
        let mut config = Config::load(&rc_path)?;
        let overrides = parser::scan_config_overrides(&argv);
        for (name, value) in &overrides {
            config.set(name, value);
        }
        init_tracing(&config);
        match config.source() {
            Some(source) => tracing::debug!(rc = %source.display(), "configuration loaded"),
            None => tracing::debug!(rc = %rc_path.display(), "no rc file; using defaults"),
        }

        let location = match &cli.data {
            Some(dir) if !overrides.iter().any(|(name, _)| name == "data.location") => {
                expand_home(&dir.to_string_lossy())
            }
            _ => config.data_location(),
        };

        let columns = ColumnTable::from_config(&config);
        let mut feedback = Feedback::new(&config);
        for header in headers {
            feedback.header(header);
        }

        let hooks: Box<dyn Hooks> = if config.get_bool("hooks") {
            Box::new(ScriptHooks::new(&location.join("hooks"), columns.clone()))
        } else {
            Box::new(NoHooks)
        };
        let db = TaskDb::open(StorageContext {
            location,
            locking: config.get_bool("locking"),
            lock_timeout: DEFAULT_TIMEOUT,
            gc: config.get_bool("gc"),
            default_project: config.get("default.project").to_string(),
            columns: columns.clone(),
            hooks,
        });
        let classifier = Classifier::new(parser_context(&config, &columns), &argv);
        let palette = if config.get_bool("color") {
            Palette::auto()
        } else {
            Palette::plain()
        };

        Ok(Self {
            config,
            columns,
            classifier,
            db,
            feedback,
            palette,
        })
    }

    /// Launch hook, analysis, gc for id-displaying commands, the command,
    /// commit and the exit hook. Returns the command's status and output.
    pub fn execute(&mut self, prompt: &mut dyn Prompt) -> Result<(i32, String), AppError> {
        for message in self.db.hooks().on_launch()? {
            self.feedback.footnote(message);
        }

        let analyzed = self.classifier.analyze(true, true);
        if self.classifier.context().debug_level > 0 {
            self.feedback.debug(self.classifier.dump("strand parse"));
        }
        if let Err(err) = analyzed {
            self.record_notes();
            return Err(err.into());
        }
        let name = self.classifier.get_command();
        let command = commands::lookup(&name)
            .ok_or_else(|| AppError::InvalidArgument(format!("Unknown command '{}'.", name)))?;

        if command.displays_id {
            self.db.gc()?;
        }
        let result = commands::execute(
            command,
            &mut Context {
                classifier: &mut self.classifier,
                db: &mut self.db,
                config: &self.config,
                columns: &self.columns,
                feedback: &mut self.feedback,
                palette: &self.palette,
                prompt,
            },
        );
        self.record_notes();
        for message in self.db.take_messages() {
            self.feedback.footnote(message);
        }
        let (rc, output) = result?;

        let changes = self.db.commit()?;
        for message in self.db.hooks().on_exit(&changes)? {
            self.feedback.footnote(message);
        }
        self.db.perf().log();
        Ok((rc, output))
    }

    fn record_notes(&mut self) {
        for note in self.classifier.notes() {
            self.feedback.note(note);
        }
    }

    pub fn feedback(&self) -> &Feedback {
        &self.feedback
    }

    /// Queues the error for stderr. Hook aborts contribute the script's
    /// messages instead of their own text.
    pub fn report(&mut self, err: &AppError) {
        match err.hook_abort() {
            Some(messages) => {
                for message in messages {
                    self.feedback.error(message.clone());
                }
            }
            None => self.feedback.error(err.to_string()),
        }
    }
}

/// Runs the whole program and returns the process exit status.
pub fn run(cli: &Cli, binary: &str, prompt: &mut dyn Prompt) -> i32 {
    let mut app = match App::open(cli, binary) {
        Ok(app) => app,
        Err(err) => {
            eprintln!("{}", err);
            return err.exit_code();
        }
    };
    let (code, output) = match app.execute(prompt) {
        Ok(outcome) => outcome,
        Err(err) => {
            tracing::debug!(error = ?err, "command failed");
            app.report(&err);
            (err.exit_code(), String::new())
        }
    };
    print!("{}", app.feedback().compose(&output));
    eprint!("{}", app.feedback().compose_errors());
    code
}

pub(crate) fn parser_context(config: &Config, columns: &ColumnTable) -> ParserContext {
    let minimum = config
        .get_int("abbreviation.minimum")
        .and_then(|value| usize::try_from(value).ok())
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_MINIMUM_MATCH);
    let mut registry = EntityRegistry::new(minimum);
    commands::register(&mut registry);
    for column in columns.iter() {
        registry.register("attribute", &column.name);
    }
    for column in columns.udas() {
        registry.register("uda", &column.name);
    }
    registry.register("pseudo", "limit");
    for modifier in MODIFIERS {
        registry.register("modifier", modifier);
    }
    for op in OPERATORS {
        registry.register("operator", op);
        if !UNARY_OR_GROUPING.contains(op) {
            registry.register("binary_operator", op);
        }
    }

    let context = config.active_context().map(|name| {
        (
            name.to_string(),
            config.get(&format!("context.{}", name)).to_string(),
        )
    });
    ParserContext {
        registry,
        aliases: config
            .with_prefix("alias")
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect(),
        default_command: config.get("default.command").to_string(),
        context,
        modifiable: columns
            .iter()
            .map(|column| column.name.as_str())
            .filter(|name| columns.is_modifiable(name))
            .map(str::to_string)
            .collect(),
        debug_level: config
            .get_int("debug.parser")
            .unwrap_or(0)
            .clamp(0, u8::MAX as i64) as u8,
    }
}

/// `RUST_LOG` wins; otherwise `debug` when rc.debug is on, else `warn`.
/// A second call keeps the first subscriber.
fn init_tracing(config: &Config) {
    let fallback = if config.get_bool("debug") { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Parse(ParseError),
    Filter(FilterError),
    Task(TaskError),
    Storage(StorageError),
    Hook(HookError),
    Import {
        path: PathBuf,
        source: std::io::Error,
    },
    InvalidArgument(String),
}

impl AppError {
    /// The script's messages when this error is a hook abort.
    pub fn hook_abort(&self) -> Option<&[String]> {
        match self {
            AppError::Hook(HookError::Aborted { messages, .. })
            | AppError::Storage(StorageError::Hook(HookError::Aborted { messages, .. })) => {
                Some(messages.as_slice())
            }
            _ => None,
        }
    }

    pub fn exit_code(&self) -> i32 {
        if self.hook_abort().is_some() {
            EXIT_HOOK_ABORT
        } else {
            EXIT_ERROR
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "{}", err),
            AppError::Parse(err) => write!(f, "{}", err),
            AppError::Filter(err) => write!(f, "{}", err),
            AppError::Task(err) => write!(f, "{}", err),
            AppError::Storage(err) => write!(f, "{}", err),
            AppError::Hook(err) => write!(f, "{}", err),
            AppError::Import { path, source } => {
                write!(f, "Could not read '{}': {}", path.display(), source)
            }
            AppError::InvalidArgument(message) => write!(f, "{}", message),
        }
    }
}

impl Error for AppError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Parse(err) => Some(err),
            AppError::Filter(err) => Some(err),
            AppError::Task(err) => Some(err),
            AppError::Storage(err) => Some(err),
            AppError::Hook(err) => Some(err),
            AppError::Import { source, .. } => Some(source),
            AppError::InvalidArgument(_) => None,
        }
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        AppError::Config(value)
    }
}

impl From<ParseError> for AppError {
    fn from(value: ParseError) -> Self {
        AppError::Parse(value)
    }
}

impl From<FilterError> for AppError {
    fn from(value: FilterError) -> Self {
        AppError::Filter(value)
    }
}

impl From<TaskError> for AppError {
    fn from(value: TaskError) -> Self {
        AppError::Task(value)
    }
}

impl From<StorageError> for AppError {
    fn from(value: StorageError) -> Self {
        AppError::Storage(value)
    }
}

impl From<HookError> for AppError {
    fn from(value: HookError) -> Self {
        AppError::Hook(value)
    }
}
