//! Structural passes: alias expansion, override extraction, default command
//! injection and categorization. Each takes and returns the whole sequence.

use std::collections::BTreeMap;

use super::lexer::Lexer;
use super::node::{Node, Tag};
use super::registry::EntityRegistry;
use super::syntax;
use super::{Note, ParseError, ParserContext};

/// Replaces alias names with their lexed values until nothing changes or the
/// valve trips. The flag is true when the valve tripped.
pub fn expand_aliases(
    mut nodes: Vec<Node>,
    aliases: &BTreeMap<String, String>,
    valve: usize,
) -> (Vec<Node>, bool) {
    if aliases.is_empty() {
        return (nodes, false);
    }
    for _ in 0..valve {
        let mut found = false;
        let mut terminated = false;
        let mut expanded = Vec::with_capacity(nodes.len());
        for node in nodes {
            if syntax::is_terminator(&node.raw) {
                terminated = true;
            }
            let alias = if terminated || node.has(Tag::Binary) {
                None
            } else {
                aliases.get(&node.raw)
            };
            match alias {
                Some(value) => {
                    found = true;
                    expanded.extend(
                        Lexer::split(value)
                            .into_iter()
                            .map(|lexeme| Node::tagged(lexeme, &[Tag::Alias, Tag::Lex])),
                    );
                }
                None => expanded.push(node),
            }
        }
        nodes = expanded;
        if !found {
            return (nodes, false);
        }
    }
    (nodes, true)
}

pub fn split_config_override(raw: &str) -> Option<(String, String)> {
    if !syntax::is_config_override(raw) {
        return None;
    }
    let body = &raw[3..];
    let sep = body.find('=').or_else(|| body.find(':'))?;
    Some((body[..sep].to_string(), body[sep + 1..].to_string()))
}

/// Tags `rc:<file>` as RC and `rc.<name>:<value>` as CONFIG, up to `--`.
pub fn find_overrides(mut nodes: Vec<Node>) -> Vec<Node> {
    for node in &mut nodes {
        if syntax::is_terminator(&node.raw) {
            break;
        }
        if syntax::is_rc_override(&node.raw) {
            node.tag(Tag::Rc);
            node.file = Some(node.raw[3..].to_string());
        } else if let Some((name, value)) = split_config_override(&node.raw) {
            node.tag(Tag::Config);
            node.name = Some(name);
            node.value = Some(value);
        }
    }
    nodes
}

pub fn config_overrides(nodes: &[Node]) -> Vec<(String, String)> {
    nodes
        .iter()
        .filter(|node| node.has(Tag::Config))
        .filter_map(|node| Some((node.name.clone()?, node.value.clone()?)))
        .collect()
}

/// Inserts the default command after the binary when neither a command nor
/// an id/uuid selector is present; with only a selector, appends `information`.
pub fn inject_defaults(
    nodes: Vec<Node>,
    ctx: &ParserContext,
    strict: bool,
) -> Result<(Vec<Node>, Vec<Note>), ParseError> {
    let mut found_command = false;
    let mut found_sequence = false;
    for node in &nodes {
        if syntax::is_terminator(&node.raw) {
            break;
        }
        if node.has_any(&[Tag::Binary, Tag::Rc, Tag::Config]) {
            continue;
        }
        let raw = node.raw.as_str();
        if syntax::is_command(&ctx.registry, raw) {
            found_command = true;
        } else if syntax::is_uuid_list(raw)
            || syntax::is_uuid(raw)
            || syntax::is_id_sequence(raw)
            || syntax::is_id(raw)
        {
            found_sequence = true;
        }
    }
    if found_command {
        return Ok((nodes, Vec::new()));
    }

    if found_sequence {
        let mut nodes = nodes;
        nodes.push(Node::tagged("information", &[Tag::Assumed]));
        return Ok((
            nodes,
            vec![Note::Header(
                "No command specified - assuming 'information'.".to_string(),
            )],
        ));
    }

    let command = ctx.default_command.trim();
    if command.is_empty() {
        if strict {
            return Err(ParseError::TrivialInput);
        }
        return Ok((nodes, Vec::new()));
    }

    let binary = nodes
        .iter()
        .find(|node| node.has(Tag::Binary))
        .map(|node| node.basename.clone().unwrap_or_else(|| node.raw.clone()))
        .unwrap_or_default();
    let defaults = Lexer::split(command);
    let mut reconstructed = Vec::with_capacity(nodes.len() + defaults.len());
    for node in nodes {
        let is_binary = node.has(Tag::Binary);
        reconstructed.push(node);
        if is_binary {
            reconstructed.extend(
                defaults
                    .iter()
                    .map(|lexeme| Node::tagged(lexeme.as_str(), &[Tag::Default])),
            );
        }
    }
    Ok((
        reconstructed,
        vec![Note::Header(format!("[{} {}]", binary, command))],
    ))
}

/// Assigns CMD, FILTER, MODIFICATION and terminator tags. Everything before
/// the first command is filter; after a write command, modification.
pub fn categorize(mut nodes: Vec<Node>, registry: &EntityRegistry) -> Vec<Node> {
    let mut found_command = false;
    let mut read_only = false;
    let mut terminated = false;
    for node in &mut nodes {
        if !terminated && syntax::is_terminator(&node.raw) {
            node.tag(Tag::Terminator);
            terminated = true;
            continue;
        }
        if terminated {
            node.tag(Tag::Terminated);
            node.tag(Tag::Word);
            continue;
        }
        if !Lexer::is_one_word(&node.raw) {
            node.tag(Tag::Quoted);
        }
        if node.has_any(&[Tag::Binary, Tag::Rc, Tag::Config]) {
            continue;
        }
        if !found_command {
            if let Some(canonical) = registry.canonicalize("cmd", &node.raw) {
                read_only = !registry.exact_match("writecmd", &canonical);
                node.tag(Tag::Cmd);
                node.tag(if read_only { Tag::ReadCmd } else { Tag::WriteCmd });
                node.canonical = Some(canonical);
                found_command = true;
                continue;
            }
        }
        if found_command && !read_only {
            node.tag(Tag::Modification);
        } else {
            node.tag(Tag::Filter);
        }
    }
    nodes
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::{categorize, expand_aliases, find_overrides, inject_defaults, split_config_override};
    use crate::parser::node::{Node, Tag};
    use crate::parser::registry::EntityRegistry;
    use crate::parser::{Note, ParseError, ParserContext};

    fn nodes(raws: &[&str]) -> Vec<Node> {
        raws.iter()
            .enumerate()
            .map(|(index, raw)| {
                let mut node = Node::tagged(*raw, &[Tag::Original]);
                if index == 0 {
                    node.tag(Tag::Binary);
                }
                node
            })
            .collect()
    }

    fn raws(nodes: &[Node]) -> Vec<&str> {
        nodes.iter().map(|node| node.raw.as_str()).collect()
    }

    fn context(default_command: &str) -> ParserContext {
        let mut registry = EntityRegistry::new(2);
        for cmd in ["list", "add", "information", "modify"] {
            registry.register("cmd", cmd);
        }
        for cmd in ["add", "modify"] {
            registry.register("writecmd", cmd);
        }
        ParserContext {
            registry,
            default_command: default_command.to_string(),
            ..ParserContext::default()
        }
    }

    #[test]
    fn aliases_expand_until_stable() {
        let mut aliases = BTreeMap::new();
        aliases.insert("rm".to_string(), "delete".to_string());
        aliases.insert("ls".to_string(), "list +next".to_string());
        let (expanded, exhausted) = expand_aliases(nodes(&["strand", "ls", "--", "rm"]), &aliases, 10);
        assert!(!exhausted);
        assert_eq!(raws(&expanded), vec!["strand", "list", "+next", "--", "rm"]);
        assert!(expanded[1].has(Tag::Alias) && expanded[1].has(Tag::Lex));
    }

    #[test]
    fn self_referential_alias_trips_the_valve() {
        let mut aliases = BTreeMap::new();
        aliases.insert("loop".to_string(), "loop".to_string());
        let (expanded, exhausted) = expand_aliases(nodes(&["strand", "loop"]), &aliases, 10);
        assert!(exhausted);
        assert_eq!(raws(&expanded), vec!["strand", "loop"]);
    }

    #[test]
    fn overrides_are_tagged_before_the_terminator() {
        let tagged = find_overrides(nodes(&["strand", "rc:/tmp/rc", "rc.gc=off", "--", "rc.x:y"]));
        assert!(tagged[1].has(Tag::Rc));
        assert_eq!(tagged[1].file.as_deref(), Some("/tmp/rc"));
        assert!(tagged[2].has(Tag::Config));
        assert_eq!(tagged[2].name.as_deref(), Some("gc"));
        assert_eq!(tagged[2].value.as_deref(), Some("off"));
        assert!(!tagged[4].has(Tag::Config));
        assert_eq!(
            split_config_override("rc.report.next.filter:status:pending"),
            Some(("report.next.filter".to_string(), "status:pending".to_string()))
        );
    }

    #[test]
    fn default_command_lands_after_the_binary() {
        let (injected, notes) =
            inject_defaults(nodes(&["strand", "+home"]), &context("list limit:5"), true)
                .expect("default injection should succeed");
        assert_eq!(raws(&injected), vec!["strand", "list", "limit:5", "+home"]);
        assert!(injected[1].has(Tag::Default));
        assert_eq!(notes, vec![Note::Header("[strand list limit:5]".to_string())]);
    }

    #[test]
    fn bare_ids_assume_information() {
        let (injected, _) = inject_defaults(nodes(&["strand", "3"]), &context("list"), true)
            .expect("assumed command should succeed");
        assert_eq!(raws(&injected), vec!["strand", "3", "information"]);
        assert!(injected[2].has(Tag::Assumed));
    }

    #[test]
    fn strict_mode_rejects_trivial_input() {
        let err = inject_defaults(nodes(&["strand", "+home"]), &context(""), true)
            .expect_err("missing command should fail in strict mode");
        assert_eq!(err, ParseError::TrivialInput);
        let (kept, _) = inject_defaults(nodes(&["strand", "+home"]), &context(""), false)
            .expect("lenient mode should pass through");
        assert_eq!(raws(&kept), vec!["strand", "+home"]);
    }

    #[test]
    fn categorize_splits_filter_and_modifications() {
        let ctx = context("");
        let tagged = categorize(
            nodes(&["strand", "+home", "mod", "pri:H", "two words", "--", "-x"]),
            &ctx.registry,
        );
        assert!(tagged[1].has(Tag::Filter));
        assert!(tagged[2].has(Tag::Cmd) && tagged[2].has(Tag::WriteCmd));
        assert_eq!(tagged[2].canonical.as_deref(), Some("modify"));
        assert!(tagged[3].has(Tag::Modification));
        assert!(tagged[4].has(Tag::Quoted));
        assert!(tagged[5].has(Tag::Terminator));
        assert!(tagged[6].has(Tag::Terminated) && tagged[6].has(Tag::Word));
        assert!(!tagged[6].has(Tag::Modification));

        let read = categorize(nodes(&["strand", "list", "+home"]), &ctx.registry);
        assert!(read[1].has(Tag::ReadCmd));
        assert!(read[2].has(Tag::Filter));
    }
}
