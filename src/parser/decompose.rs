//! Modification decomposition. Nodes are decorated in place so one node
//! still stands for one requested change.

use std::path::Path;

use super::node::{Node, Sense, Substitution, Tag};
use super::syntax;
use super::ParserContext;

pub fn run(nodes: Vec<Node>, ctx: &ParserContext) -> Vec<Node> {
    let nodes = decompose_attributes(nodes, ctx);
    let nodes = decompose_attribute_modifiers(nodes, ctx);
    let nodes = decompose_tags(nodes);
    decompose_substitutions(nodes)
}

fn is_pending_modification(node: &Node) -> bool {
    node.has(Tag::Modification)
        && node.name.is_none()
        && node.substitution.is_none()
        && !node.has(Tag::Terminated)
}

pub fn decompose_attributes(mut nodes: Vec<Node>, ctx: &ParserContext) -> Vec<Node> {
    for node in nodes.iter_mut().filter(|node| is_pending_modification(node)) {
        let Some((name, value)) = syntax::split_attribute(&node.raw, false) else {
            continue;
        };
        if let Some(canonical) = ctx.registry.canonicalize("uda", &name) {
            node.name = Some(canonical);
            node.value = Some(value);
            node.tag(Tag::Uda);
            node.tag(Tag::Modifiable);
        } else if let Some(canonical) = ctx.registry.canonicalize("attribute", &name) {
            if ctx.modifiable.contains(&canonical) {
                node.tag(Tag::Modifiable);
            }
            node.name = Some(canonical);
            node.value = Some(value);
            node.tag(Tag::Attribute);
        }
    }
    nodes
}

pub fn decompose_attribute_modifiers(mut nodes: Vec<Node>, ctx: &ParserContext) -> Vec<Node> {
    for node in nodes.iter_mut().filter(|node| is_pending_modification(node)) {
        let Some(form) = syntax::split_attribute_modifier(&node.raw, false) else {
            continue;
        };
        let sense = if form.negated {
            Sense::Negative
        } else {
            Sense::Positive
        };
        let value = form.value;
        if let Some(canonical) = ctx.registry.canonicalize("uda", &form.name) {
            node.tag(Tag::Uda);
            node.tag(Tag::Modifiable);
            node.name = Some(canonical);
        } else if let Some(canonical) = ctx.registry.canonicalize("attribute", &form.name) {
            node.tag(Tag::AttMod);
            if ctx.modifiable.contains(&canonical) {
                node.tag(Tag::Modifiable);
            }
            node.name = Some(canonical);
        } else {
            continue;
        }
        node.modifier = Some(form.modifier);
        node.sense = Some(sense);
        node.value = Some(value);
    }
    nodes
}

pub fn decompose_tags(mut nodes: Vec<Node>) -> Vec<Node> {
    for node in nodes.iter_mut().filter(|node| is_pending_modification(node)) {
        if !syntax::is_tag(&node.raw) {
            continue;
        }
        node.sign = node.raw.chars().next();
        node.name = Some(node.raw[1..].to_string());
        node.tag(Tag::Tag);
    }
    nodes
}

/// `/from/to/[g]`, unless the same spelling names an existing path.
pub fn decompose_substitutions(mut nodes: Vec<Node>) -> Vec<Node> {
    for node in nodes.iter_mut().filter(|node| is_pending_modification(node)) {
        if Path::new(&node.raw).exists() {
            continue;
        }
        if let Some((from, to, global)) = syntax::split_substitution(&node.raw) {
            node.substitution = Some(Substitution { from, to, global });
            node.tag(Tag::Substitution);
        }
    }
    nodes
}

#[cfg(test)]
mod tests {
    use super::{decompose_substitutions, decompose_tags};
    use crate::parser::node::{Node, Tag};

    #[test]
    fn tags_record_sign_and_name() {
        let nodes = decompose_tags(vec![
            Node::tagged("+home", &[Tag::Modification]),
            Node::tagged("-work", &[Tag::Modification]),
            Node::tagged("+home", &[Tag::Filter]),
        ]);
        assert_eq!(nodes[0].sign, Some('+'));
        assert_eq!(nodes[0].name.as_deref(), Some("home"));
        assert_eq!(nodes[1].sign, Some('-'));
        assert!(nodes[1].has(Tag::Tag));
        assert!(!nodes[2].has(Tag::Tag));
    }

    #[test]
    fn substitutions_skip_existing_paths() {
        let root = std::path::Path::new("/tmp").join(format!("strand-subst-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&root).expect("temp dir should be created");
        let colliding = format!("{}/", root.display());
        assert!(crate::parser::syntax::split_substitution(&colliding).is_some());
        let nodes = decompose_substitutions(vec![
            Node::tagged("/teh/the/g", &[Tag::Modification]),
            Node::tagged(colliding.as_str(), &[Tag::Modification]),
        ]);
        let substitution = nodes[0].substitution.as_ref().expect("substitution should parse");
        assert_eq!(substitution.from, "teh");
        assert_eq!(substitution.to, "the");
        assert!(substitution.global);
        assert!(nodes[1].substitution.is_none());
        let _ = std::fs::remove_dir_all(&root);
    }
}
