//! Command-line classifier: turns raw arguments into a tagged node sequence
//! and exposes the filter, command, limit and modification views of it.

pub mod decompose;
pub mod desugar;
pub mod lexer;
pub mod node;
pub mod passes;
pub mod registry;
pub mod syntax;

use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::fmt;

use lexer::Lexer;
use node::{Node, Substitution, Tag};
use registry::EntityRegistry;

const ALIAS_SAFETY_VALVE: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    TrivialInput,
    UnknownModifier(String),
    BadUuidList(String),
    InvalidModification(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::TrivialInput => {
                write!(f, "You must specify a command or a task to modify.")
            }
            ParseError::UnknownModifier(modifier) => {
                write!(f, "Error: unrecognized attribute modifier '{}'.", modifier)
            }
            ParseError::BadUuidList(uuid) => write!(f, "Unrecognized UUID after [{},]", uuid),
            ParseError::InvalidModification(message) => f.write_str(message),
        }
    }
}

impl Error for ParseError {}

/// Everything the classifier needs from the rest of the program, captured
/// once at startup.
#[derive(Debug, Clone, Default)]
pub struct ParserContext {
    pub registry: EntityRegistry,
    pub aliases: BTreeMap<String, String>,
    pub default_command: String,
    /// Active saved context as `(name, filter)`.
    pub context: Option<(String, String)>,
    pub modifiable: BTreeSet<String>,
    pub debug_level: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Note {
    Header(String),
    Footnote(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Modification {
    Attribute {
        name: String,
        value: String,
        uda: bool,
        modifiable: bool,
    },
    AttributeModifier {
        name: String,
        modifier: String,
        value: String,
    },
    Tag {
        add: bool,
        name: String,
    },
    Substitution(Substitution),
    Word(String),
}

#[derive(Debug, Clone)]
pub struct Classifier {
    ctx: ParserContext,
    original: Vec<String>,
    terminated: bool,
    nodes: Vec<Node>,
    notes: Vec<Note>,
    context_applied: bool,
}

impl Classifier {
    /// `args[0]` is the binary name; the rest are ingested one by one.
    pub fn new(ctx: ParserContext, args: &[String]) -> Self {
        let mut classifier = Self {
            ctx,
            original: Vec::new(),
            terminated: false,
            nodes: Vec::new(),
            notes: Vec::new(),
            context_applied: false,
        };
        let mut args = args.iter();
        if let Some(binary) = args.next() {
            classifier.original.push(binary.clone());
        }
        for arg in args {
            classifier.add(arg);
        }
        classifier
    }

    pub fn context(&self) -> &ParserContext {
        &self.ctx
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    /// Raw ingestion of one process argument.
    pub fn add(&mut self, arg: &str) {
        let mut ingested = Vec::new();
        ingest(&self.ctx.registry, arg, &mut self.terminated, &mut ingested);
        self.original.extend(ingested);
    }

    pub fn analyze(&mut self, parse: bool, strict: bool) -> Result<(), ParseError> {
        let mut notes = Vec::new();
        let built = self.build(parse, strict, &mut notes);
        self.notes = notes;
        self.nodes = built?;
        if self.ctx.debug_level >= 2 {
            tracing::info!(target: "strand::parser", "{}", node::dump(&self.nodes, "analysis"));
        }
        Ok(())
    }

    /// Runs the passes. Notes are collected as they happen, so a failing
    /// pass still leaves the earlier ones in `notes`.
    fn build(
        &self,
        parse: bool,
        strict: bool,
        notes: &mut Vec<Note>,
    ) -> Result<Vec<Node>, ParseError> {
        let mut nodes = Vec::with_capacity(self.original.len());
        for (index, raw) in self.original.iter().enumerate() {
            let mut node = Node::tagged(raw.as_str(), &[Tag::Original]);
            if index == 0 {
                node.tag(Tag::Binary);
                node.basename = std::path::Path::new(raw)
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned());
            }
            nodes.push(node);
        }

        let (nodes, exhausted) =
            passes::expand_aliases(nodes, &self.ctx.aliases, ALIAS_SAFETY_VALVE);
        if exhausted {
            tracing::debug!(
                target: "strand::parser",
                "alias expansion stopped after {} iterations",
                ALIAS_SAFETY_VALVE
            );
        }
        self.trace(&nodes, "expand_aliases");

        let nodes = passes::find_overrides(nodes);
        for (name, value) in passes::config_overrides(&nodes) {
            notes.push(Note::Footnote(format!(
                "Configuration override rc.{}:{}",
                name, value
            )));
        }
        self.trace(&nodes, "find_overrides");

        let (nodes, injected) = passes::inject_defaults(nodes, &self.ctx, strict)?;
        notes.extend(injected);
        self.trace(&nodes, "inject_defaults");

        let nodes = passes::categorize(nodes, &self.ctx.registry);
        self.trace(&nodes, "categorize");

        if !parse {
            return Ok(nodes);
        }

        let nodes = desugar::run(nodes, &self.ctx, &|nodes, title| self.trace(nodes, title))?;
        let nodes = decompose::run(nodes, &self.ctx);
        self.trace(&nodes, "decompose");
        Ok(nodes)
    }

    fn trace(&self, nodes: &[Node], title: &str) {
        if self.ctx.debug_level >= 3 {
            tracing::debug!(target: "strand::parser", "{}", node::dump(nodes, title));
        }
    }

    /// Composed filter expression, parenthesized, or empty.
    pub fn get_filter(&mut self, apply_context: bool) -> Result<String, ParseError> {
        if apply_context {
            self.apply_context()?;
        }
        let terms = self
            .nodes
            .iter()
            .filter(|node| node.has(Tag::Filter))
            .map(Node::filter_text)
            .collect::<Vec<_>>();
        if terms.is_empty() {
            return Ok(String::new());
        }
        Ok(format!("( {} )", terms.join(" ")))
    }

    fn apply_context(&mut self) -> Result<(), ParseError> {
        if self.context_applied {
            return Ok(());
        }
        self.context_applied = true;
        let Some((name, filter)) = self.ctx.context.clone() else {
            return Ok(());
        };
        if filter.trim().is_empty() {
            return Ok(());
        }
        let targets_task = self.nodes.iter().any(|node| {
            node.has(Tag::Filter)
                && node.has(Tag::Attribute)
                && !node.has_any(&[Tag::Terminated, Tag::Word])
                && (node.raw == "id" || node.raw == "uuid")
        });
        if targets_task {
            return Ok(());
        }

        let mut terminated = false;
        let mut ingested = Vec::new();
        for lexeme in std::iter::once("(".to_string())
            .chain(Lexer::split(&filter))
            .chain(std::iter::once(")".to_string()))
        {
            ingest(&self.ctx.registry, &lexeme, &mut terminated, &mut ingested);
        }
        let at = self.original.len().min(1);
        self.original.splice(at..at, ingested);
        tracing::debug!(target: "strand::parser", context = %name, "applying context filter");
        self.analyze(true, false)?;
        self.notes
            .push(Note::Footnote(format!("Context '{}' applied.", name)));
        Ok(())
    }

    pub fn get_command(&self) -> String {
        self.nodes
            .iter()
            .find(|node| node.has(Tag::Cmd))
            .and_then(|node| node.canonical.clone())
            .unwrap_or_default()
    }

    pub fn is_write_command(&self) -> bool {
        self.nodes
            .iter()
            .any(|node| node.has(Tag::Cmd) && node.has(Tag::WriteCmd))
    }

    pub fn get_limit(&self) -> String {
        self.nodes
            .iter()
            .find(|node| node.has(Tag::Pseudo) && node.canonical.as_deref() == Some("limit"))
            .and_then(|node| node.value.clone())
            .unwrap_or_else(|| "0".to_string())
    }

    /// Structural re-analysis without desugaring; binary, override, command
    /// and terminator nodes are left out.
    pub fn get_words(&self) -> Result<Vec<String>, ParseError> {
        let nodes = self.build(false, false, &mut Vec::new())?;
        Ok(nodes
            .into_iter()
            .filter(|node| {
                !node.has_any(&[Tag::Binary, Tag::Rc, Tag::Config, Tag::Cmd, Tag::Terminator])
            })
            .map(|node| node.raw)
            .collect())
    }

    pub fn get_modifications(&self) -> Vec<Modification> {
        let write = self.is_write_command();
        self.nodes
            .iter()
            .filter(|node| {
                node.has(Tag::Modification) || (write && node.has(Tag::Terminated))
            })
            .map(modification_of)
            .collect()
    }

    pub fn dump(&self, title: &str) -> String {
        node::dump(&self.nodes, title)
    }
}

fn modification_of(node: &Node) -> Modification {
    if node.has(Tag::Terminated) {
        return Modification::Word(node.raw.clone());
    }
    if let Some(substitution) = &node.substitution {
        return Modification::Substitution(substitution.clone());
    }
    if node.has(Tag::Tag) {
        if let (Some(sign), Some(name)) = (node.sign, &node.name) {
            return Modification::Tag {
                add: sign == '+',
                name: name.clone(),
            };
        }
    }
    match (&node.name, &node.value) {
        (Some(name), Some(value)) => match &node.modifier {
            Some(modifier) => Modification::AttributeModifier {
                name: name.clone(),
                modifier: modifier.clone(),
                value: value.clone(),
            },
            None => Modification::Attribute {
                name: name.clone(),
                value: value.clone(),
                uda: node.has(Tag::Uda),
                modifiable: node.has(Tag::Modifiable),
            },
        },
        _ => Modification::Word(node.raw.clone()),
    }
}

fn ingest(registry: &EntityRegistry, arg: &str, terminated: &mut bool, out: &mut Vec<String>) {
    let raw = arg.trim();
    if raw.is_empty() {
        return;
    }
    if syntax::is_terminator(raw) {
        *terminated = true;
        out.push(raw.to_string());
        return;
    }
    if *terminated || syntax::keeps_intact(registry, raw) {
        out.push(raw.to_string());
        return;
    }
    let lexemes = Lexer::new(raw).collect::<Vec<_>>();
    if syntax::disqualified(registry, &lexemes) {
        out.push(raw.to_string());
    } else {
        out.extend(lexemes.into_iter().map(|(text, _)| text));
    }
}

/// Last `rc:<file>` argument, scanned before anything else is known.
pub fn rc_override(args: &[String]) -> Option<String> {
    let mut found = None;
    for arg in args.iter().skip(1) {
        if syntax::is_terminator(arg) {
            break;
        }
        if syntax::is_rc_override(arg) {
            found = Some(arg[3..].to_string());
        }
    }
    found
}

/// Every `rc.<name>:<value>` argument, in order, before any terminator.
pub fn scan_config_overrides(args: &[String]) -> Vec<(String, String)> {
    args.iter()
        .skip(1)
        .take_while(|arg| !syntax::is_terminator(arg))
        .filter_map(|arg| passes::split_config_override(arg))
        .collect()
}

#[cfg(test)]
mod tests;
