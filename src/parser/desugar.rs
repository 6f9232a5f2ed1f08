//! Filter desugaring. Every pass only rewrites filter nodes nothing has
//! classified yet, so running the sequence twice changes nothing.

use super::lexer::Lexer;
use super::node::{Node, Sense, Tag};
use super::syntax::{self, quote_literal};
use super::{ParseError, ParserContext};

pub const MODIFIERS: &[&str] = &[
    "before",
    "under",
    "below",
    "after",
    "over",
    "above",
    "none",
    "any",
    "is",
    "equals",
    "isnt",
    "not",
    "has",
    "contains",
    "hasnt",
    "startswith",
    "left",
    "endswith",
    "right",
    "word",
    "noword",
];

const CLASSIFIED: &[Tag] = &[
    Tag::Attribute,
    Tag::AttMod,
    Tag::Op,
    Tag::Literal,
    Tag::Regex,
    Tag::Pseudo,
    Tag::Id,
    Tag::Uuid,
    Tag::Terminated,
];

type Trace<'a> = &'a dyn Fn(&[Node], &str);

pub fn run(nodes: Vec<Node>, ctx: &ParserContext, trace: Trace<'_>) -> Result<Vec<Node>, ParseError> {
    let nodes = find_stray_modifications(nodes);
    trace(&nodes, "find_stray_modifications");
    let nodes = find_ids(nodes);
    let nodes = find_uuids(nodes)?;
    let nodes = insert_id_expr(nodes)?;
    trace(&nodes, "insert_id_expr");
    let nodes = desugar_tags(nodes);
    trace(&nodes, "desugar_tags");
    let nodes = desugar_attributes(nodes, ctx);
    trace(&nodes, "desugar_attributes");
    let nodes = desugar_attribute_modifiers(nodes, ctx)?;
    trace(&nodes, "desugar_attribute_modifiers");
    let nodes = desugar_patterns(nodes);
    trace(&nodes, "desugar_patterns");
    let nodes = find_operators(nodes, ctx);
    let nodes = find_attributes(nodes, ctx);
    trace(&nodes, "find_operators_and_attributes");
    let nodes = desugar_plain_args(nodes);
    trace(&nodes, "desugar_plain_args");
    let nodes = insert_junctions(nodes);
    trace(&nodes, "insert_junctions");
    Ok(nodes)
}

fn is_unclassified(node: &Node) -> bool {
    node.has(Tag::Filter) && !node.has_any(CLASSIFIED)
}

fn filter_node(raw: impl Into<String>, tags: &[Tag]) -> Node {
    let mut node = Node::tagged(raw, tags);
    node.tag(Tag::Filter);
    node
}

fn attribute_node(raw: &str, canonical: &str, tags: &[Tag]) -> Node {
    let mut node = filter_node(raw, tags);
    node.name = Some(canonical.to_string());
    node
}

/// `add` and `log` have no filter phase: whatever landed in the filter is
/// part of the new task.
pub fn find_stray_modifications(mut nodes: Vec<Node>) -> Vec<Node> {
    let creates = nodes.iter().any(|node| {
        node.has(Tag::Cmd) && matches!(node.canonical.as_deref(), Some("add" | "log"))
    });
    if !creates {
        return nodes;
    }
    for node in nodes.iter_mut().filter(|node| is_unclassified(node)) {
        node.untag(Tag::Filter);
        node.tag(Tag::Modification);
    }
    nodes
}

pub fn find_ids(mut nodes: Vec<Node>) -> Vec<Node> {
    for node in nodes.iter_mut().filter(|node| is_unclassified(node)) {
        if syntax::parse_id_sequence(&node.raw).is_some() {
            node.tag(Tag::Id);
        }
    }
    nodes
}

pub fn find_uuids(mut nodes: Vec<Node>) -> Result<Vec<Node>, ParseError> {
    for node in nodes.iter_mut().filter(|node| is_unclassified(node)) {
        if syntax::parse_uuid_list(&node.raw)?.is_some() {
            node.tag(Tag::Uuid);
        }
    }
    Ok(nodes)
}

/// Collapses every ID/UUID selector into one clause at the first selector.
pub fn insert_id_expr(nodes: Vec<Node>) -> Result<Vec<Node>, ParseError> {
    let mut ranges = Vec::new();
    let mut uuids = Vec::new();
    for node in &nodes {
        if !node.has(Tag::Filter) {
            continue;
        }
        if node.has(Tag::Id) {
            ranges.extend(syntax::parse_id_sequence(&node.raw).unwrap_or_default());
        }
        if node.has(Tag::Uuid) {
            uuids.extend(syntax::parse_uuid_list(&node.raw)?.unwrap_or_default());
        }
    }
    if ranges.is_empty() && uuids.is_empty() {
        return Ok(nodes);
    }

    let mut clause = vec![filter_node("(", &[Tag::Op])];
    for (index, (low, high)) in ranges.iter().enumerate() {
        if index > 0 {
            clause.push(filter_node("or", &[Tag::Op]));
        }
        clause.push(filter_node("(", &[Tag::Op]));
        if low == high {
            clause.push(filter_node("id", &[Tag::Attribute]));
            clause.push(filter_node("==", &[Tag::Op]));
            clause.push(filter_node(low.to_string(), &[Tag::Literal, Tag::Number]));
        } else {
            clause.push(filter_node("id", &[Tag::Attribute]));
            clause.push(filter_node(">=", &[Tag::Op]));
            clause.push(filter_node(low.to_string(), &[Tag::Literal, Tag::Number]));
            clause.push(filter_node("and", &[Tag::Op]));
            clause.push(filter_node("id", &[Tag::Attribute]));
            clause.push(filter_node("<=", &[Tag::Op]));
            clause.push(filter_node(high.to_string(), &[Tag::Literal, Tag::Number]));
        }
        clause.push(filter_node(")", &[Tag::Op]));
    }
    if !ranges.is_empty() && !uuids.is_empty() {
        clause.push(filter_node("or", &[Tag::Op]));
    }
    for (index, uuid) in uuids.iter().enumerate() {
        if index > 0 {
            clause.push(filter_node("or", &[Tag::Op]));
        }
        clause.push(filter_node("(", &[Tag::Op]));
        clause.push(filter_node("uuid", &[Tag::Attribute]));
        clause.push(filter_node("=", &[Tag::Op]));
        clause.push(filter_node(quote_literal(uuid), &[Tag::Literal, Tag::String]));
        clause.push(filter_node(")", &[Tag::Op]));
    }
    clause.push(filter_node(")", &[Tag::Op]));

    let mut clause = Some(clause);
    let mut reconstructed = Vec::with_capacity(nodes.len());
    for node in nodes {
        if node.has(Tag::Filter) && node.has_any(&[Tag::Id, Tag::Uuid]) {
            if let Some(clause) = clause.take() {
                reconstructed.extend(clause);
            }
        } else {
            reconstructed.push(node);
        }
    }
    Ok(reconstructed)
}

pub fn desugar_tags(nodes: Vec<Node>) -> Vec<Node> {
    let mut reconstructed = Vec::with_capacity(nodes.len());
    for node in nodes {
        if !is_unclassified(&node) || !syntax::is_tag(&node.raw) {
            reconstructed.push(node);
            continue;
        }
        let op = if node.raw.starts_with('+') {
            "_hastag_"
        } else {
            "_notag_"
        };
        reconstructed.push(filter_node("tags", &[Tag::Attribute]));
        reconstructed.push(filter_node(op, &[Tag::Op]));
        reconstructed.push(filter_node(quote_literal(&node.raw[1..]), &[Tag::Literal]));
    }
    reconstructed
}

/// `name:value` and `name=value`: UDAs and attributes become comparisons,
/// pseudo attributes become a single PSEUDO node outside the filter.
pub fn desugar_attributes(nodes: Vec<Node>, ctx: &ParserContext) -> Vec<Node> {
    let registry = &ctx.registry;
    let mut reconstructed = Vec::with_capacity(nodes.len());
    for node in nodes {
        let split = if is_unclassified(&node) {
            syntax::split_attribute(&node.raw, true)
        } else {
            None
        };
        let Some((name, value)) = split else {
            reconstructed.push(node);
            continue;
        };

        if let Some(canonical) = registry.canonicalize("uda", &name) {
            reconstructed.push(attribute_node(&name, &canonical, &[Tag::Uda, Tag::Attribute]));
            reconstructed.push(filter_node("=", &[Tag::Op]));
            reconstructed.push(filter_node(quote_literal(&value), &[Tag::Literal]));
        } else if let Some(canonical) = registry.canonicalize("pseudo", &name) {
            let mut pseudo = Node::tagged(node.raw.as_str(), &[Tag::Pseudo]);
            pseudo.canonical = Some(canonical);
            pseudo.value = Some(value);
            reconstructed.push(pseudo);
        } else if let Some(canonical) = registry.canonicalize("attribute", &name) {
            let op = if canonical == "status" { "==" } else { "=" };
            reconstructed.push(attribute_node(&name, &canonical, &[Tag::Attribute]));
            reconstructed.push(filter_node(op, &[Tag::Op]));
            reconstructed.push(filter_node(quote_literal(&value), &[Tag::Literal]));
        } else {
            reconstructed.push(node);
        }
    }
    reconstructed
}

/// Operator and right-hand literal for an attribute modifier, plus whether
/// the literal is a regex.
fn modifier_expression(modifier: &str, value: &str) -> Option<(&'static str, String, bool)> {
    let expression = match modifier {
        "before" | "under" | "below" => ("<", quote_literal(value), false),
        "after" | "over" | "above" => (">", quote_literal(value), false),
        "none" => ("==", quote_literal(""), false),
        "any" => ("!=", quote_literal(""), false),
        "is" | "equals" => ("==", quote_literal(value), false),
        "isnt" | "not" => ("!==", quote_literal(value), false),
        "has" | "contains" => ("~", quote_literal(value), false),
        "hasnt" => ("!~", quote_literal(value), false),
        "startswith" | "left" => ("~", quote_literal(&format!("^{}", value)), true),
        "endswith" | "right" => ("~", quote_literal(&format!("{}$", value)), true),
        "word" => ("~", quote_literal(&format!("\\b{}\\b", value)), true),
        "noword" => ("!~", quote_literal(&format!("\\b{}\\b", value)), true),
        _ => return None,
    };
    Some(expression)
}

pub fn desugar_attribute_modifiers(
    nodes: Vec<Node>,
    ctx: &ParserContext,
) -> Result<Vec<Node>, ParseError> {
    let registry = &ctx.registry;
    let mut reconstructed = Vec::with_capacity(nodes.len());
    for node in nodes {
        let form = if is_unclassified(&node) {
            syntax::split_attribute_modifier(&node.raw, true)
        } else {
            None
        };
        let Some(form) = form else {
            reconstructed.push(node);
            continue;
        };
        let canonical = registry
            .canonicalize("attribute", &form.name)
            .or_else(|| registry.canonicalize("uda", &form.name));
        let Some(canonical) = canonical else {
            reconstructed.push(node);
            continue;
        };
        let modifier = registry
            .canonicalize("modifier", &form.modifier)
            .ok_or_else(|| ParseError::UnknownModifier(form.modifier.clone()))?;
        let (op, literal, regex) = modifier_expression(&modifier, &form.value)
            .ok_or_else(|| ParseError::UnknownModifier(form.modifier.clone()))?;

        let mut lhs = attribute_node(&form.name, &canonical, &[Tag::AttMod]);
        lhs.modifier = Some(modifier);
        lhs.sense = Some(if form.negated {
            Sense::Negative
        } else {
            Sense::Positive
        });
        reconstructed.push(lhs);
        reconstructed.push(filter_node(op, &[Tag::Op]));
        let mut rhs = filter_node(literal, &[Tag::Literal]);
        if regex {
            rhs.tag(Tag::Regex);
        }
        reconstructed.push(rhs);
    }
    Ok(reconstructed)
}

/// `/pattern/` with no interior slash.
pub fn desugar_patterns(nodes: Vec<Node>) -> Vec<Node> {
    let mut reconstructed = Vec::with_capacity(nodes.len());
    for node in nodes {
        let pattern = if is_unclassified(&node) && syntax::is_pattern(&node.raw) {
            let inner = &node.raw[1..node.raw.len() - 1];
            (!inner.contains('/')).then(|| inner.to_string())
        } else {
            None
        };
        match pattern {
            Some(pattern) => {
                reconstructed.push(filter_node("description", &[Tag::Attribute]));
                reconstructed.push(filter_node("~", &[Tag::Op]));
                reconstructed.push(filter_node(quote_literal(&pattern), &[Tag::Literal]));
            }
            None => reconstructed.push(node),
        }
    }
    reconstructed
}

pub fn find_operators(mut nodes: Vec<Node>, ctx: &ParserContext) -> Vec<Node> {
    for node in nodes.iter_mut().filter(|node| is_unclassified(node)) {
        if syntax::is_operator(&ctx.registry, &node.raw) {
            node.tag(Tag::Op);
        }
    }
    nodes
}

pub fn find_attributes(mut nodes: Vec<Node>, ctx: &ParserContext) -> Vec<Node> {
    for node in nodes.iter_mut().filter(|node| is_unclassified(node)) {
        if ctx.registry.exact_match("attribute", &node.raw) {
            node.tag(Tag::Attribute);
        }
    }
    nodes
}

/// Remaining bare words become description searches. Any operator right
/// before a word protects it.
pub fn desugar_plain_args(nodes: Vec<Node>) -> Vec<Node> {
    let mut reconstructed = Vec::with_capacity(nodes.len());
    let mut protected = false;
    for node in nodes {
        let next_protected = node.has(Tag::Op);
        if is_unclassified(&node) && !node.has(Tag::Binary) && !protected {
            let pattern = Lexer::dequote(&node.raw).to_string();
            reconstructed.push(filter_node("description", &[Tag::Attribute]));
            reconstructed.push(filter_node("~", &[Tag::Op]));
            reconstructed.push(filter_node(quote_literal(&pattern), &[Tag::Literal]));
        } else {
            reconstructed.push(node);
        }
        protected = next_protected;
    }
    reconstructed
}

/// Juxtaposed filter terms are joined with `and`.
pub fn insert_junctions(nodes: Vec<Node>) -> Vec<Node> {
    let mut reconstructed: Vec<Node> = Vec::with_capacity(nodes.len());
    let mut prev: Option<(bool, bool)> = None;
    for node in nodes {
        if node.has(Tag::Filter) {
            let is_op = node.has(Tag::Op);
            let opens = node.raw == "(";
            if let Some((prev_op, prev_closes)) = prev {
                let junction = (!prev_op && opens)
                    || (!prev_op && !is_op)
                    || (prev_closes && !is_op)
                    || (prev_closes && opens);
                if junction {
                    reconstructed.push(filter_node("and", &[Tag::Op]));
                }
            }
            prev = Some((is_op, node.raw == ")"));
        }
        reconstructed.push(node);
    }
    reconstructed
}
