//! Shape predicates for raw arguments, the lexeme disqualification
//! heuristics, and small scanners used by the rewrite passes.

use super::lexer::{self, LexType, Lexer};
use super::registry::EntityRegistry;
use super::ParseError;

pub type Lexeme = (String, LexType);

pub fn is_terminator(raw: &str) -> bool {
    raw == "--"
}

pub fn is_rc_override(raw: &str) -> bool {
    raw.len() > 3 && raw.starts_with("rc:")
}

pub fn is_config_override(raw: &str) -> bool {
    raw.len() > 3 && raw.starts_with("rc.") && raw[3..].contains([':', '='])
}

pub fn is_command(registry: &EntityRegistry, raw: &str) -> bool {
    registry.canonicalize("cmd", raw).is_some()
}

pub fn is_operator(registry: &EntityRegistry, raw: &str) -> bool {
    registry.exact_match("operator", raw)
}

pub fn is_name(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) if Lexer::is_identifier_start(first) => chars.all(Lexer::is_identifier_next),
        _ => false,
    }
}

pub fn is_tag(raw: &str) -> bool {
    raw.len() >= 2
        && (raw.starts_with('+') || raw.starts_with('-'))
        && is_name(&raw[1..])
        && !raw.contains(' ')
}

pub fn is_pattern(raw: &str) -> bool {
    raw.len() > 2 && raw.starts_with('/') && raw.ends_with('/')
}

pub fn is_substitution(raw: &str) -> bool {
    let bytes = raw.as_bytes();
    bytes.len() > 3
        && bytes[0] == b'/'
        && bytes[bytes.len() - 2] == b'/'
        && bytes[bytes.len() - 1] == b'g'
}

pub fn is_uuid(raw: &str) -> bool {
    lexer::is_uuid(raw, true)
}

pub fn is_uuid_list(raw: &str) -> bool {
    raw.contains(',') && raw.split(',').all(is_uuid)
}

pub fn is_id(raw: &str) -> bool {
    Lexer::is_all_digits(raw)
}

pub fn is_id_sequence(raw: &str) -> bool {
    !raw.is_empty()
        && raw.bytes().all(|b| b.is_ascii_digit() || b == b',' || b == b'-')
        && raw.split(',').all(|element| {
            let terms = element.split('-').collect::<Vec<_>>();
            (1..=2).contains(&terms.len()) && terms.iter().all(|term| Lexer::is_all_digits(term))
        })
}

/// `name[.[~]modifier]:value` or `name[.[~]modifier]=value`, where the modifier,
/// when present, must be a known one.
pub fn is_attribute(registry: &EntityRegistry, raw: &str) -> bool {
    let Some(split) = raw.find([':', '=']) else {
        return false;
    };
    let attr = &raw[..split];
    let (name, modifier) = match attr.split_once('.') {
        Some((name, modifier)) if !modifier.is_empty() => (name, Some(modifier)),
        _ => (attr, None),
    };
    if !is_name(name) {
        return false;
    }
    match modifier {
        Some(modifier) => {
            let modifier = modifier.strip_prefix('~').unwrap_or(modifier);
            registry.canonicalize("modifier", modifier).is_some()
        }
        None => true,
    }
}

/// Arguments that are never split into lexemes during ingestion.
pub fn keeps_intact(registry: &EntityRegistry, raw: &str) -> bool {
    is_rc_override(raw)
        || is_config_override(raw)
        || is_command(registry, raw)
        || is_tag(raw)
        || is_uuid_list(raw)
        || is_uuid(raw)
        || is_id_sequence(raw)
        || is_id(raw)
        || is_pattern(raw)
        || is_substitution(raw)
        || is_attribute(registry, raw)
        || is_operator(registry, raw)
}

fn is_sugar(registry: &EntityRegistry, text: &str) -> bool {
    is_tag(text)
        || is_uuid_list(text)
        || is_uuid(text)
        || is_id_sequence(text)
        || is_id(text)
        || is_pattern(text)
        || is_attribute(registry, text)
}

/// True when the lexemes should not replace the argument they came from.
pub fn disqualified(registry: &EntityRegistry, lexemes: &[Lexeme]) -> bool {
    disqualify_insufficient(lexemes)
        || disqualify_no_ops(lexemes)
        || disqualify_only_paren_ops(registry, lexemes)
        || disqualify_first_last_binary(registry, lexemes)
        || disqualify_sugar_free(registry, lexemes)
}

fn disqualify_insufficient(lexemes: &[Lexeme]) -> bool {
    lexemes.len() < 3
}

fn disqualify_no_ops(lexemes: &[Lexeme]) -> bool {
    !lexemes.iter().any(|(_, kind)| *kind == LexType::Op)
}

fn disqualify_only_paren_ops(registry: &EntityRegistry, lexemes: &[Lexeme]) -> bool {
    let mut ops = 0;
    let mut parens = 0;
    let mut sugar = 0;
    for (text, kind) in lexemes {
        if *kind == LexType::Op {
            ops += 1;
            if text == "(" || text == ")" {
                parens += 1;
            }
        } else if is_sugar(registry, text) {
            sugar += 1;
        }
    }
    ops == parens && sugar == 0
}

fn disqualify_first_last_binary(registry: &EntityRegistry, lexemes: &[Lexeme]) -> bool {
    let binary = |lexeme: Option<&Lexeme>| {
        lexeme.is_some_and(|(text, _)| registry.canonicalize("binary_operator", text).is_some())
    };
    binary(lexemes.first()) || binary(lexemes.last())
}

// `sugared` starts true, so this heuristic never fires.
// TODO: decide whether interior sugar should be required and flip the initial value.
fn disqualify_sugar_free(registry: &EntityRegistry, lexemes: &[Lexeme]) -> bool {
    let mut sugared = true;
    if lexemes.len() > 2 {
        for (text, _) in &lexemes[1..lexemes.len() - 1] {
            if is_sugar(registry, text) {
                sugared = true;
                break;
            }
        }
    }
    !sugared
}

/// Parses `n[-m][,...]` into inclusive ranges. Any malformed element or a
/// descending range makes the whole argument something other than ids.
pub fn parse_id_sequence(raw: &str) -> Option<Vec<(u64, u64)>> {
    if !is_id_sequence(raw) {
        return None;
    }
    let mut ranges = Vec::new();
    for element in raw.split(',') {
        let mut terms = element.split('-');
        let low: u64 = terms.next()?.parse().ok()?;
        let high: u64 = match terms.next() {
            Some(term) => term.parse().ok()?,
            None => low,
        };
        if low > high {
            return None;
        }
        ranges.push((low, high));
    }
    Some(ranges)
}

/// Length of the longest uuid-shaped prefix of `text`, when at least 8 long.
fn uuid_prefix(text: &str) -> Option<usize> {
    const DASHES: [usize; 4] = [8, 13, 18, 23];
    let length = text
        .bytes()
        .take(36)
        .enumerate()
        .take_while(|(index, byte)| {
            if DASHES.contains(index) {
                *byte == b'-'
            } else {
                byte.is_ascii_hexdigit()
            }
        })
        .count();
    (length >= 8).then_some(length)
}

/// Comma-joined uuids. `Ok(None)` when the text is not a uuid list at all.
pub fn parse_uuid_list(raw: &str) -> Result<Option<Vec<String>>, ParseError> {
    let Some(first) = uuid_prefix(raw) else {
        return Ok(None);
    };
    let mut uuids = vec![raw[..first].to_string()];
    let mut rest = &raw[first..];
    while let Some(after) = rest.strip_prefix(',') {
        let Some(length) = uuid_prefix(after) else {
            let last = uuids.last().cloned().unwrap_or_default();
            return Err(ParseError::BadUuidList(last));
        };
        uuids.push(after[..length].to_string());
        rest = &after[length..];
    }
    Ok(rest.is_empty().then_some(uuids))
}

/// Leading identifier of `text` (`getName`), possibly containing dots.
pub fn leading_name(text: &str) -> Option<&str> {
    let mut chars = text.char_indices();
    let (_, first) = chars.next()?;
    if !Lexer::is_identifier_start(first) {
        return None;
    }
    let end = chars
        .find(|(_, c)| !Lexer::is_identifier_next(*c))
        .map(|(index, _)| index)
        .unwrap_or(text.len());
    Some(&text[..end])
}

/// Value after the separator: a quoted segment (quotes removed) or the rest.
fn attribute_value(rest: &str) -> String {
    for quote in ['"', '\''] {
        if let Some(body) = rest.strip_prefix(quote) {
            if let Some(close) = body.find(quote) {
                return body[..close].to_string();
            }
        }
    }
    rest.to_string()
}

fn strip_separator(rest: &str, allow_equals: bool) -> Option<&str> {
    rest.strip_prefix(':').or_else(|| {
        if allow_equals {
            rest.strip_prefix('=')
        } else {
            None
        }
    })
}

/// `name:value` (or `name=value` when `allow_equals`).
pub fn split_attribute(raw: &str, allow_equals: bool) -> Option<(String, String)> {
    let name = leading_name(raw)?;
    let rest = strip_separator(&raw[name.len()..], allow_equals)?;
    Some((name.to_string(), attribute_value(rest)))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModifierForm {
    pub name: String,
    pub negated: bool,
    pub modifier: String,
    pub value: String,
}

/// `name.[~]modifier:value` (or `=` when `allow_equals`).
pub fn split_attribute_modifier(raw: &str, allow_equals: bool) -> Option<ModifierForm> {
    let (name, rest) = raw.split_once('.')?;
    if !is_name(name) {
        return None;
    }
    let (negated, rest) = match rest.strip_prefix('~') {
        Some(rest) => (true, rest),
        None => (false, rest),
    };
    let stop = rest.find(|c: char| c == ':' || (allow_equals && c == '='))?;
    let modifier = &rest[..stop];
    if modifier.is_empty() {
        return None;
    }
    let value = strip_separator(&rest[stop..], allow_equals)?;
    Some(ModifierForm {
        name: name.to_string(),
        negated,
        modifier: modifier.to_string(),
        value: attribute_value(value),
    })
}

/// `/from/to/` with an optional trailing `g`.
pub fn split_substitution(raw: &str) -> Option<(String, String, bool)> {
    let body = raw.strip_prefix('/')?;
    let (from, rest) = body.split_once('/')?;
    let (to, tail) = rest.split_once('/')?;
    let global = match tail {
        "" => false,
        "g" => true,
        _ => return None,
    };
    Some((from.to_string(), to.to_string(), global))
}

/// Single-quotes a literal for the filter expression; empty stays `''`.
pub fn quote_literal(value: &str) -> String {
    if value.is_empty() || value == "''" {
        return "''".to_string();
    }
    let bytes = value.as_bytes();
    if bytes.len() >= 2 && bytes[0] == b'\'' && bytes[bytes.len() - 1] == b'\'' {
        return value.to_string();
    }
    format!("'{}'", value.replace('\'', "\\'"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::lexer::Lexer;

    fn registry() -> EntityRegistry {
        let mut registry = EntityRegistry::new(2);
        registry.register("cmd", "list");
        registry.register("modifier", "before");
        registry.register("modifier", "has");
        for op in lexer::OPERATORS {
            registry.register("operator", op);
            if !lexer::UNARY_OR_GROUPING.contains(op) {
                registry.register("binary_operator", op);
            }
        }
        registry
    }

    fn lexemes(text: &str) -> Vec<Lexeme> {
        Lexer::new(text).collect()
    }

    #[test]
    fn override_shapes() {
        assert!(is_rc_override("rc:/tmp/rc"));
        assert!(!is_rc_override("rc:"));
        assert!(is_config_override("rc.gc:off"));
        assert!(is_config_override("rc.gc=off"));
        assert!(!is_config_override("rc.gc"));
        assert!(is_terminator("--"));
    }

    #[test]
    fn id_and_uuid_shapes() {
        assert!(is_id_sequence("1,3,5-10"));
        assert!(!is_id_sequence("1-"));
        assert!(!is_id_sequence("1-2-3"));
        assert_eq!(parse_id_sequence("1,3,5-10"), Some(vec![(1, 1), (3, 3), (5, 10)]));
        assert_eq!(parse_id_sequence("5-3"), None);
        assert!(is_uuid_list("a360fc44,9c4e1a2b"));
        assert!(!is_uuid_list("a360fc44"));
        assert_eq!(
            parse_uuid_list("a360fc44,9c4e1a2b").expect("list should parse"),
            Some(vec!["a360fc44".to_string(), "9c4e1a2b".to_string()])
        );
        assert_eq!(parse_uuid_list("hello").expect("plain word"), None);
        assert_eq!(parse_uuid_list("a360fc44zz").expect("trailing junk"), None);
        let err = parse_uuid_list("a360fc44,").expect_err("dangling comma should fail");
        assert!(err.to_string().contains("a360fc44,"));
    }

    #[test]
    fn sugar_shapes() {
        let registry = registry();
        assert!(is_tag("+home"));
        assert!(!is_tag("+"));
        assert!(!is_tag("+two words"));
        assert!(is_pattern("/abc/"));
        assert!(!is_pattern("//"));
        assert!(is_substitution("/a/b/g"));
        assert!(!is_substitution("/a/b/"));
        assert!(is_attribute(&registry, "project:home"));
        assert!(is_attribute(&registry, "due.before:today"));
        assert!(is_attribute(&registry, "due.bef:today"));
        assert!(!is_attribute(&registry, "due.zzz:today"));
        assert!(!is_attribute(&registry, "two words:x"));
        assert!(keeps_intact(&registry, "li"));
        assert!(keeps_intact(&registry, "and"));
        assert!(!keeps_intact(&registry, "pay the bills"));
    }

    #[test]
    fn disqualification_keeps_descriptions_whole() {
        let registry = registry();
        assert!(disqualified(&registry, &lexemes("pay bills")));
        assert!(disqualified(&registry, &lexemes("pay the bills")));
        assert!(disqualified(&registry, &lexemes("(pay the bills)")));
        assert!(disqualified(&registry, &lexemes("and pay bills")));
        assert!(disqualified(&registry, &lexemes("pay bills or")));
        assert!(!disqualified(&registry, &lexemes("project:home or +work")));
        assert!(!disqualified(&registry, &lexemes("(+home)")));
        assert!(!disqualified(&registry, &lexemes("a < b")));
    }

    #[test]
    fn attribute_scanners_extract_parts() {
        assert_eq!(
            split_attribute("project:home", false),
            Some(("project".to_string(), "home".to_string()))
        );
        assert_eq!(split_attribute("project=home", false), None);
        assert_eq!(
            split_attribute("description:'two words'", false),
            Some(("description".to_string(), "two words".to_string()))
        );
        assert_eq!(
            split_attribute("due:", true),
            Some(("due".to_string(), String::new()))
        );
        assert_eq!(
            split_attribute_modifier("due.~before:2024-01-01", true),
            Some(ModifierForm {
                name: "due".to_string(),
                negated: true,
                modifier: "before".to_string(),
                value: "2024-01-01".to_string(),
            })
        );
        assert_eq!(split_attribute_modifier("due.:x", true), None);
        assert_eq!(
            split_substitution("/a/b/g"),
            Some(("a".to_string(), "b".to_string(), true))
        );
        assert_eq!(split_substitution("/a/b/x"), None);
    }

    #[test]
    fn literals_are_single_quoted_once() {
        assert_eq!(quote_literal(""), "''");
        assert_eq!(quote_literal("home"), "'home'");
        assert_eq!(quote_literal("'home'"), "'home'");
        assert_eq!(quote_literal("it's"), "'it\\'s'");
    }
}
