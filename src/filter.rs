//! Evaluates the infix filter expression built by the classifier against
//! task records.

use std::collections::HashMap;
use std::error::Error;
use std::fmt;

use regex_lite::Regex;

use crate::config::Config;
use crate::dates;
use crate::domain::columns::{ColumnTable, ColumnType};
use crate::domain::task::Task;
use crate::parser::lexer::{LexType, Lexer};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    Malformed(String),
    BadRegex { pattern: String, message: String },
}

impl fmt::Display for FilterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterError::Malformed(message) => write!(f, "Malformed filter: {}", message),
            FilterError::BadRegex { pattern, message } => {
                write!(f, "invalid regular expression '{}': {}", pattern, message)
            }
        }
    }
}

impl Error for FilterError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Assoc {
    Left,
    Right,
}

/// `(precedence, associativity, arity)`.
fn operator(op: &str) -> Option<(u8, Assoc, usize)> {
    Some(match op {
        "^" => (16, Assoc::Right, 2),
        "!" | "_neg_" | "_pos_" => (15, Assoc::Right, 1),
        "_hastag_" | "_notag_" => (14, Assoc::Left, 2),
        "*" | "/" | "%" => (13, Assoc::Left, 2),
        "+" | "-" => (12, Assoc::Left, 2),
        "<" | "<=" | ">" | ">=" => (10, Assoc::Left, 2),
        "=" | "==" | "!=" | "!==" => (9, Assoc::Left, 2),
        "~" | "!~" => (8, Assoc::Left, 2),
        "and" => (5, Assoc::Left, 2),
        "or" => (4, Assoc::Left, 2),
        "xor" => (3, Assoc::Left, 2),
        _ => return None,
    })
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Op(String),
    Column(String, ColumnType),
    Literal(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Str(String),
    Num(f64),
    Date(i64),
    Bool(bool),
}

impl Value {
    fn truthy(&self) -> bool {
        match self {
            Value::Str(text) => !text.is_empty(),
            Value::Num(n) => *n != 0.0,
            Value::Date(_) => true,
            Value::Bool(b) => *b,
        }
    }

    fn is_empty(&self) -> bool {
        matches!(self, Value::Str(text) if text.is_empty())
    }

    fn text(&self) -> String {
        match self {
            Value::Str(text) => text.clone(),
            Value::Num(n) if n.fract() == 0.0 => format!("{}", *n as i64),
            Value::Num(n) => n.to_string(),
            Value::Date(epoch) => epoch.to_string(),
            Value::Bool(b) => b.to_string(),
        }
    }

    fn number(&self) -> Option<f64> {
        match self {
            Value::Num(n) => Some(*n),
            Value::Date(epoch) => Some(*epoch as f64),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Str(text) => text
                .trim()
                .parse()
                .ok()
                .or_else(|| dates::parse_duration(text).map(|secs| secs as f64)),
        }
    }

    fn date(&self) -> Option<i64> {
        match self {
            Value::Date(epoch) => Some(*epoch),
            Value::Num(n) => Some(*n as i64),
            Value::Str(text) => dates::parse(text),
            Value::Bool(_) => None,
        }
    }
}

/// A compiled filter in postfix order.
#[derive(Debug, Clone)]
pub struct Filter {
    rpn: Vec<Token>,
    regexes: HashMap<String, Regex>,
    use_regex: bool,
    case_sensitive: bool,
}

impl Filter {
    pub fn compile(expr: &str, columns: &ColumnTable, config: &Config) -> Result<Self, FilterError> {
        let tokens = tokenize(expr, columns);
        let rpn = to_postfix(tokens)?;
        let mut filter = Filter {
            rpn,
            regexes: HashMap::new(),
            use_regex: config.get_bool("regex"),
            case_sensitive: config.get_bool("search.case.sensitive"),
        };
        filter.check_arity()?;
        if filter.use_regex {
            let patterns = filter
                .rpn
                .windows(2)
                .filter_map(|pair| match pair {
                    [Token::Literal(pattern), Token::Op(op)] if op == "~" || op == "!~" => {
                        Some(pattern.clone())
                    }
                    _ => None,
                })
                .collect::<Vec<_>>();
            for pattern in patterns {
                let regex = filter.build_regex(&pattern)?;
                filter.regexes.insert(pattern, regex);
            }
        }
        tracing::debug!(rpn = ?filter.rpn, "filter compiled");
        Ok(filter)
    }

    pub fn is_empty(&self) -> bool {
        self.rpn.is_empty()
    }

    /// True when only pending tasks can match: ids are referenced and
    /// nothing widens the set.
    pub fn pending_only(&self) -> bool {
        let mut ids = false;
        for token in &self.rpn {
            match token {
                Token::Column(name, _) if name == "id" => ids = true,
                Token::Column(name, _) if name == "uuid" => return false,
                Token::Op(op) if op == "or" || op == "xor" => return false,
                _ => {}
            }
        }
        ids
    }

    pub fn matches(&self, task: &Task) -> Result<bool, FilterError> {
        if self.rpn.is_empty() {
            return Ok(true);
        }
        let mut stack: Vec<Value> = Vec::new();
        for token in &self.rpn {
            match token {
                Token::Literal(text) => stack.push(Value::Str(text.clone())),
                Token::Column(name, kind) => stack.push(resolve(task, name, *kind)),
                Token::Op(op) => {
                    let arity = operator(op).map(|(_, _, arity)| arity).unwrap_or(2);
                    let right = stack.pop().ok_or_else(|| underflow(op))?;
                    let value = if arity == 1 {
                        unary(op, right)
                    } else {
                        let left = stack.pop().ok_or_else(|| underflow(op))?;
                        self.binary(op, left, right)?
                    };
                    stack.push(value);
                }
            }
        }
        match stack.as_slice() {
            [value] => Ok(value.truthy()),
            _ => Err(FilterError::Malformed("unbalanced expression".to_string())),
        }
    }

    fn check_arity(&self) -> Result<(), FilterError> {
        let mut depth = 0usize;
        for token in &self.rpn {
            match token {
                Token::Op(op) => {
                    let arity = operator(op).map(|(_, _, arity)| arity).unwrap_or(2);
                    if depth < arity {
                        return Err(underflow(op));
                    }
                    depth = depth - arity + 1;
                }
                _ => depth += 1,
            }
        }
        if self.rpn.is_empty() || depth == 1 {
            Ok(())
        } else {
            Err(FilterError::Malformed("unbalanced expression".to_string()))
        }
    }

    fn build_regex(&self, pattern: &str) -> Result<Regex, FilterError> {
        let source = if self.case_sensitive {
            pattern.to_string()
        } else {
            format!("(?i){}", pattern)
        };
        Regex::new(&source).map_err(|err| FilterError::BadRegex {
            pattern: pattern.to_string(),
            message: err.to_string(),
        })
    }

    fn fold(&self, text: &str) -> String {
        if self.case_sensitive {
            text.to_string()
        } else {
            text.to_lowercase()
        }
    }

    fn search(&self, haystack: &str, pattern: &str) -> Result<bool, FilterError> {
        if !self.use_regex {
            return Ok(self.fold(haystack).contains(&self.fold(pattern)));
        }
        match self.regexes.get(pattern) {
            Some(regex) => Ok(regex.is_match(haystack)),
            None => Ok(self.build_regex(pattern)?.is_match(haystack)),
        }
    }

    fn binary(&self, op: &str, left: Value, right: Value) -> Result<Value, FilterError> {
        let value = match op {
            "and" => Value::Bool(left.truthy() && right.truthy()),
            "or" => Value::Bool(left.truthy() || right.truthy()),
            "xor" => Value::Bool(left.truthy() != right.truthy()),
            "=" => Value::Bool(self.similar(&left, &right)),
            "!=" => Value::Bool(!self.similar(&left, &right)),
            "==" => Value::Bool(self.identical(&left, &right)),
            "!==" => Value::Bool(!self.identical(&left, &right)),
            "~" => Value::Bool(self.search(&left.text(), &right.text())?),
            "!~" => Value::Bool(!self.search(&left.text(), &right.text())?),
            "_hastag_" => Value::Bool(has_tag(&left, &right)),
            "_notag_" => Value::Bool(!has_tag(&left, &right)),
            "<" | "<=" | ">" | ">=" => Value::Bool(order(op, &left, &right)),
            _ => arithmetic(op, &left, &right),
        };
        Ok(value)
    }

    /// `=`: same day for dates, prefix for text.
    fn similar(&self, left: &Value, right: &Value) -> bool {
        if left.is_empty() || right.is_empty() {
            return left.is_empty() && right.is_empty();
        }
        if matches!(left, Value::Date(_)) || matches!(right, Value::Date(_)) {
            return match (left.date(), right.date()) {
                (Some(a), Some(b)) => dates::same_day(a, b),
                _ => false,
            };
        }
        if matches!(left, Value::Num(_)) || matches!(right, Value::Num(_)) {
            return match (left.number(), right.number()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            };
        }
        self.fold(&left.text()).starts_with(&self.fold(&right.text()))
    }

    fn identical(&self, left: &Value, right: &Value) -> bool {
        if left.is_empty() || right.is_empty() {
            return left.is_empty() && right.is_empty();
        }
        if matches!(left, Value::Date(_)) || matches!(right, Value::Date(_)) {
            return left.date().is_some() && left.date() == right.date();
        }
        if matches!(left, Value::Num(_)) || matches!(right, Value::Num(_)) {
            return left.number().is_some() && left.number() == right.number();
        }
        self.fold(&left.text()) == self.fold(&right.text())
    }
}

fn underflow(op: &str) -> FilterError {
    FilterError::Malformed(format!("missing operand for '{}'", op))
}

fn resolve(task: &Task, name: &str, kind: ColumnType) -> Value {
    if name == "id" {
        return Value::Num(task.id as f64);
    }
    let raw = task.get(name).unwrap_or("");
    if raw.is_empty() {
        return Value::Str(String::new());
    }
    match kind {
        ColumnType::Date => raw
            .parse()
            .map(Value::Date)
            .unwrap_or_else(|_| Value::Str(raw.to_string())),
        ColumnType::Numeric => raw
            .parse()
            .map(Value::Num)
            .unwrap_or_else(|_| Value::Str(raw.to_string())),
        ColumnType::String | ColumnType::Duration => Value::Str(raw.to_string()),
    }
}

fn unary(op: &str, value: Value) -> Value {
    match op {
        "!" => Value::Bool(!value.truthy()),
        "_neg_" => value
            .number()
            .map(|n| Value::Num(-n))
            .unwrap_or(Value::Str(String::new())),
        _ => value,
    }
}

fn has_tag(left: &Value, right: &Value) -> bool {
    let wanted = right.text();
    left.text().split(',').any(|tag| tag.trim() == wanted)
}

fn order(op: &str, left: &Value, right: &Value) -> bool {
    if left.is_empty() || right.is_empty() {
        return false;
    }
    let dated = matches!(left, Value::Date(_)) || matches!(right, Value::Date(_));
    let pair = if dated {
        left.date()
            .zip(right.date())
            .map(|(a, b)| (a as f64, b as f64))
    } else {
        left.number().zip(right.number())
    };
    match pair {
        Some((a, b)) => compare(op, a.partial_cmp(&b)),
        None => compare(op, Some(left.text().cmp(&right.text()))),
    }
}

fn compare(op: &str, ordering: Option<std::cmp::Ordering>) -> bool {
    use std::cmp::Ordering::{Equal, Greater, Less};
    match (op, ordering) {
        ("<", Some(Less)) => true,
        ("<=", Some(Less | Equal)) => true,
        (">", Some(Greater)) => true,
        (">=", Some(Greater | Equal)) => true,
        _ => false,
    }
}

fn arithmetic(op: &str, left: &Value, right: &Value) -> Value {
    let (Some(a), Some(b)) = (left.number(), right.number()) else {
        return Value::Str(String::new());
    };
    let result = match op {
        "+" => a + b,
        "-" => a - b,
        "*" => a * b,
        "/" if b != 0.0 => a / b,
        "%" if b != 0.0 => a % b,
        "^" => a.powf(b),
        _ => return Value::Str(String::new()),
    };
    match (left, op) {
        (Value::Date(_), "+" | "-") => Value::Date(result as i64),
        _ => Value::Num(result),
    }
}

fn unescape(text: &str) -> String {
    text.replace("\\'", "'")
}

fn tokenize(expr: &str, columns: &ColumnTable) -> Vec<Token> {
    let mut tokens = Vec::new();
    for (lexeme, kind) in Lexer::new(expr) {
        let token = match kind {
            LexType::Op => Token::Op(lexeme),
            LexType::String => Token::Literal(unescape(Lexer::dequote(&lexeme))),
            LexType::Identifier | LexType::Word => match columns.kind(&lexeme) {
                Some(column) => Token::Column(lexeme, column),
                None => Token::Literal(lexeme),
            },
            _ => Token::Literal(lexeme),
        };
        tokens.push(token);
    }
    tokens
}

/// Shunting-yard conversion; `-`/`+` with no left operand become unary.
fn to_postfix(tokens: Vec<Token>) -> Result<Vec<Token>, FilterError> {
    let mut output = Vec::new();
    let mut ops: Vec<String> = Vec::new();
    let mut expect_operand = true;
    for token in tokens {
        match token {
            Token::Op(op) if op == "(" => {
                ops.push(op);
                expect_operand = true;
            }
            Token::Op(op) if op == ")" => {
                loop {
                    match ops.pop() {
                        Some(top) if top == "(" => break,
                        Some(top) => output.push(Token::Op(top)),
                        None => {
                            return Err(FilterError::Malformed("mismatched parentheses".to_string()))
                        }
                    }
                }
                expect_operand = false;
            }
            Token::Op(op) => {
                let op = match op.as_str() {
                    "-" if expect_operand => "_neg_".to_string(),
                    "+" if expect_operand => "_pos_".to_string(),
                    _ => op,
                };
                let Some((precedence, assoc, arity)) = operator(&op) else {
                    return Err(FilterError::Malformed(format!("unknown operator '{}'", op)));
                };
                if arity == 2 {
                    while let Some(top) = ops.last() {
                        let Some((top_precedence, _, _)) = operator(top) else {
                            break;
                        };
                        let pops = top_precedence > precedence
                            || (top_precedence == precedence && assoc == Assoc::Left);
                        if !pops {
                            break;
                        }
                        if let Some(top) = ops.pop() {
                            output.push(Token::Op(top));
                        }
                    }
                }
                ops.push(op);
                expect_operand = true;
            }
            operand => {
                output.push(operand);
                expect_operand = false;
            }
        }
    }
    while let Some(top) = ops.pop() {
        if top == "(" {
            return Err(FilterError::Malformed("mismatched parentheses".to_string()));
        }
        output.push(Token::Op(top));
    }
    Ok(output)
}
