use std::fmt;

use crate::dates;

/// Fixed operator set, longest spellings first so prefix matching is greedy.
pub const OPERATORS: &[&str] = &[
    "_hastag_", "_notag_", "_neg_", "_pos_", "!==", "and", "xor", "or", "<=", ">=", "!=", "==",
    "!~", "=", "<", ">", "~", "!", "^", "*", "/", "%", "+", "-", "(", ")",
];

/// Operators that never take a left operand.
pub const UNARY_OR_GROUPING: &[&str] = &["!", "_neg_", "_pos_", "(", ")"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LexType {
    Uuid,
    Number,
    String,
    Date,
    Duration,
    Pair,
    Separator,
    Tag,
    Path,
    Substitution,
    Pattern,
    Op,
    Identifier,
    Word,
}

impl LexType {
    pub fn as_str(self) -> &'static str {
        match self {
            LexType::Uuid => "uuid",
            LexType::Number => "number",
            LexType::String => "string",
            LexType::Date => "date",
            LexType::Duration => "duration",
            LexType::Pair => "pair",
            LexType::Separator => "separator",
            LexType::Tag => "tag",
            LexType::Path => "path",
            LexType::Substitution => "substitution",
            LexType::Pattern => "pattern",
            LexType::Op => "op",
            LexType::Identifier => "identifier",
            LexType::Word => "word",
        }
    }
}

impl fmt::Display for LexType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Splits text into typed lexemes. Iteration stops at the end of input or at
/// the first character sequence no recognizer accepts.
#[derive(Debug, Clone)]
pub struct Lexer {
    chars: Vec<char>,
    cursor: usize,
    ambiguity: bool,
}

impl Lexer {
    pub fn new(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
            cursor: 0,
            ambiguity: false,
        }
    }

    /// When on, bare `YYYYMMDD` digits lex as a date instead of a number.
    pub fn ambiguity(mut self, on: bool) -> Self {
        self.ambiguity = on;
        self
    }

    /// Lexeme texts of `text`, used for alias and default-command values.
    pub fn split(text: &str) -> Vec<String> {
        Lexer::new(text).map(|(lexeme, _)| lexeme).collect()
    }

    pub fn dequote(text: &str) -> &str {
        let bytes = text.as_bytes();
        if bytes.len() >= 2 {
            let first = bytes[0];
            if (first == b'\'' || first == b'"') && bytes[bytes.len() - 1] == first {
                return &text[1..text.len() - 1];
            }
        }
        text
    }

    pub fn is_all_digits(text: &str) -> bool {
        !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit())
    }

    pub fn is_one_word(text: &str) -> bool {
        !text.is_empty() && !text.chars().any(char::is_whitespace)
    }

    pub fn is_identifier_start(c: char) -> bool {
        !c.is_whitespace()
            && !c.is_ascii_digit()
            && !c.is_control()
            && !is_single_char_operator(c)
            && c != ':'
            && c != '\''
            && c != '"'
    }

    pub fn is_identifier_next(c: char) -> bool {
        !c.is_whitespace()
            && !c.is_control()
            && c != ':'
            && c != '='
            && !is_single_char_operator(c)
    }

    fn next_token(&mut self) -> Option<(String, LexType)> {
        while self.cursor < self.chars.len() && self.chars[self.cursor].is_whitespace() {
            self.cursor += 1;
        }
        if self.cursor >= self.chars.len() {
            return None;
        }

        let start = self.cursor;
        let recognizers: [fn(&Lexer, usize) -> Option<(usize, LexType)>; 14] = [
            Lexer::string_at,
            Lexer::date_at,
            Lexer::duration_at,
            Lexer::uuid_at,
            Lexer::number_at,
            Lexer::separator_at,
            Lexer::tag_at,
            Lexer::substitution_at,
            Lexer::pattern_at,
            Lexer::path_at,
            Lexer::operator_at,
            Lexer::pair_at,
            Lexer::identifier_at,
            Lexer::word_at,
        ];
        for recognize in recognizers {
            if let Some((end, kind)) = recognize(self, start) {
                self.cursor = end;
                let text = self.chars[start..end].iter().collect();
                return Some((text, kind));
            }
        }
        None
    }

    fn at(&self, index: usize) -> Option<char> {
        self.chars.get(index).copied()
    }

    fn is_boundary(&self, index: usize) -> bool {
        match self.at(index) {
            None => true,
            Some(c) => c.is_whitespace() || c == '(' || c == ')',
        }
    }

    fn follows_boundary(&self, index: usize) -> bool {
        index == 0 || self.is_boundary(index - 1)
    }

    /// End of the run of non-boundary characters starting at `start`.
    fn run_end(&self, start: usize) -> usize {
        let mut end = start;
        while !self.is_boundary(end) {
            end += 1;
        }
        end
    }

    fn slice(&self, start: usize, end: usize) -> String {
        self.chars[start..end].iter().collect()
    }

    fn string_at(&self, start: usize) -> Option<(usize, LexType)> {
        let quote = self.at(start)?;
        if quote != '\'' && quote != '"' {
            return None;
        }
        let mut index = start + 1;
        while let Some(c) = self.at(index) {
            if c == '\\' {
                index += 2;
                continue;
            }
            if c == quote {
                return Some((index + 1, LexType::String));
            }
            index += 1;
        }
        None
    }

    fn date_at(&self, start: usize) -> Option<(usize, LexType)> {
        if !self.at(start)?.is_ascii_digit() {
            return None;
        }
        let end = self.run_end(start);
        let candidate = self.slice(start, end);
        let is_date = dates::parse_iso(&candidate).is_some()
            || (self.ambiguity && dates::parse_compact_date(&candidate).is_some());
        is_date.then_some((end, LexType::Date))
    }

    fn duration_at(&self, start: usize) -> Option<(usize, LexType)> {
        let end = self.run_end(start);
        let candidate = self.slice(start, end);
        let first = candidate.chars().next()?;
        let numeric = first.is_ascii_digit() && dates::parse_duration(&candidate).is_some();
        (numeric || dates::is_named_period(&candidate)).then_some((end, LexType::Duration))
    }

    fn uuid_at(&self, start: usize) -> Option<(usize, LexType)> {
        let mut end = start;
        while let Some(c) = self.at(end) {
            if c.is_ascii_hexdigit() || c == '-' {
                end += 1;
            } else {
                break;
            }
        }
        let candidate = self.slice(start, end);
        if candidate.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let at_edge = self.is_boundary(end) || self.at(end) == Some(',');
        (at_edge && is_uuid(&candidate, true)).then_some((end, LexType::Uuid))
    }

    fn number_at(&self, start: usize) -> Option<(usize, LexType)> {
        let digits = |mut index: usize| {
            while self.at(index).is_some_and(|c| c.is_ascii_digit()) {
                index += 1;
            }
            index
        };
        let mut end = digits(start);
        if end == start {
            return None;
        }
        if self.at(end) == Some('.') && self.at(end + 1).is_some_and(|c| c.is_ascii_digit()) {
            end = digits(end + 1);
        }
        if matches!(self.at(end), Some('e') | Some('E')) {
            let mut exponent = end + 1;
            if matches!(self.at(exponent), Some('+') | Some('-')) {
                exponent += 1;
            }
            let after = digits(exponent);
            if after > exponent {
                end = after;
            }
        }
        let terminated = self.is_boundary(end) || self.at(end).is_some_and(is_single_char_operator);
        terminated.then_some((end, LexType::Number))
    }

    fn separator_at(&self, start: usize) -> Option<(usize, LexType)> {
        let is_separator = self.at(start) == Some('-')
            && self.at(start + 1) == Some('-')
            && self.is_boundary(start + 2)
            && self.follows_boundary(start);
        is_separator.then_some((start + 2, LexType::Separator))
    }

    fn tag_at(&self, start: usize) -> Option<(usize, LexType)> {
        let sign = self.at(start)?;
        if (sign != '+' && sign != '-') || !self.follows_boundary(start) {
            return None;
        }
        if !self.at(start + 1).is_some_and(Lexer::is_identifier_start) {
            return None;
        }
        let mut end = start + 2;
        while self.at(end).is_some_and(Lexer::is_identifier_next) {
            end += 1;
        }
        self.is_boundary(end).then_some((end, LexType::Tag))
    }

    fn substitution_at(&self, start: usize) -> Option<(usize, LexType)> {
        let from_end = self.slash_segment(start)?;
        if from_end == start + 1 {
            return None;
        }
        let to_end = self.slash_segment(from_end)?;
        let mut end = to_end + 1;
        if self.at(end) == Some('g') {
            end += 1;
        }
        self.is_boundary(end).then_some((end, LexType::Substitution))
    }

    fn pattern_at(&self, start: usize) -> Option<(usize, LexType)> {
        let close = self.slash_segment(start)?;
        (close > start + 1 && self.is_boundary(close + 1)).then_some((close + 1, LexType::Pattern))
    }

    /// Given a `/` at `start`, returns the index of the next unescaped `/`.
    fn slash_segment(&self, start: usize) -> Option<usize> {
        if self.at(start) != Some('/') {
            return None;
        }
        let mut index = start + 1;
        while let Some(c) = self.at(index) {
            match c {
                '\\' => index += 2,
                '/' => return Some(index),
                c if c.is_whitespace() => return None,
                _ => index += 1,
            }
        }
        None
    }

    fn path_at(&self, start: usize) -> Option<(usize, LexType)> {
        let mut end = start;
        while self.at(end).is_some_and(|c| !c.is_whitespace()) {
            end += 1;
        }
        let candidate = self.slice(start, end);
        let rooted = candidate.starts_with('/')
            || candidate.starts_with("./")
            || candidate.starts_with("~/");
        let is_path = rooted && candidate.matches('/').count() >= 2 && !candidate.ends_with('/');
        is_path.then_some((end, LexType::Path))
    }

    fn operator_at(&self, start: usize) -> Option<(usize, LexType)> {
        for op in OPERATORS {
            let len = op.chars().count();
            if start + len > self.chars.len() {
                continue;
            }
            if !self.chars[start..start + len].iter().copied().eq(op.chars()) {
                continue;
            }
            let alphabetic = op.chars().next().is_some_and(|c| c == '_' || c.is_alphabetic());
            if alphabetic && !(self.follows_boundary(start) && self.is_boundary(start + len)) {
                continue;
            }
            return Some((start + len, LexType::Op));
        }
        None
    }

    fn pair_at(&self, start: usize) -> Option<(usize, LexType)> {
        if !self.at(start).is_some_and(Lexer::is_identifier_start) {
            return None;
        }
        let mut index = start + 1;
        while self
            .at(index)
            .is_some_and(|c| Lexer::is_identifier_next(c) || c == '-')
        {
            index += 1;
        }
        match self.at(index) {
            Some(':') => {}
            Some('=') if self.at(index + 1) != Some('=') => {}
            _ => return None,
        }
        let value_start = index + 1;
        if let Some((end, _)) = self.string_at(value_start) {
            return Some((end, LexType::Pair));
        }
        let mut end = value_start;
        while self.at(end).is_some_and(|c| !c.is_whitespace()) {
            end += 1;
        }
        Some((end, LexType::Pair))
    }

    fn identifier_at(&self, start: usize) -> Option<(usize, LexType)> {
        if !self.at(start).is_some_and(Lexer::is_identifier_start) {
            return None;
        }
        let mut end = start + 1;
        loop {
            match self.at(end) {
                Some(c) if Lexer::is_identifier_next(c) => end += 1,
                // Hyphenated words stay whole: "well-known" is one identifier.
                Some('-')
                    if end > start
                        && self.at(end + 1).is_some_and(Lexer::is_identifier_start) =>
                {
                    end += 1
                }
                _ => break,
            }
        }
        Some((end, LexType::Identifier))
    }

    fn word_at(&self, start: usize) -> Option<(usize, LexType)> {
        let c = self.at(start)?;
        if c.is_control() {
            return None;
        }
        let end = self.run_end(start);
        (end > start).then_some((end, LexType::Word))
    }
}

impl Iterator for Lexer {
    type Item = (String, LexType);

    fn next(&mut self) -> Option<Self::Item> {
        self.next_token()
    }
}

pub fn is_single_char_operator(c: char) -> bool {
    matches!(
        c,
        '+' | '-' | '*' | '/' | '(' | ')' | '<' | '>' | '^' | '!' | '%' | '=' | '~'
    )
}

pub fn is_operator(text: &str) -> bool {
    OPERATORS.contains(&text)
}

/// Full 8-4-4-4-12 uuid, or with `partial` any prefix of at least 8 characters.
pub fn is_uuid(text: &str, partial: bool) -> bool {
    const DASHES: [usize; 4] = [8, 13, 18, 23];
    let len = text.len();
    if len > 36 || (len != 36 && !(partial && len >= 8)) {
        return false;
    }
    text.bytes().enumerate().all(|(index, byte)| {
        if DASHES.contains(&index) {
            byte == b'-'
        } else {
            byte.is_ascii_hexdigit()
        }
    })
}

#[cfg(test)]
mod tests {
    use super::{is_uuid, LexType, Lexer};

    fn lex(text: &str) -> Vec<(String, LexType)> {
        Lexer::new(text).collect()
    }

    fn kinds(text: &str) -> Vec<LexType> {
        lex(text).into_iter().map(|(_, kind)| kind).collect()
    }

    #[test]
    fn expression_lexes_into_typed_tokens() {
        let tokens = lex("( due < '2024-01-01' and +home )");
        let texts = tokens.iter().map(|(t, _)| t.as_str()).collect::<Vec<_>>();
        assert_eq!(
            texts,
            vec!["(", "due", "<", "'2024-01-01'", "and", "+home", ")"]
        );
        assert_eq!(
            kinds("( due < '2024-01-01' and +home )"),
            vec![
                LexType::Op,
                LexType::Identifier,
                LexType::Op,
                LexType::String,
                LexType::Op,
                LexType::Tag,
                LexType::Op,
            ]
        );
    }

    #[test]
    fn pairs_patterns_and_substitutions_stay_whole() {
        assert_eq!(kinds("project:home"), vec![LexType::Pair]);
        assert_eq!(kinds("due.before:tomorrow"), vec![LexType::Pair]);
        assert_eq!(kinds("name='two words'"), vec![LexType::Pair]);
        assert_eq!(kinds("/foo/"), vec![LexType::Pattern]);
        assert_eq!(kinds("/foo/bar/g"), vec![LexType::Substitution]);
        assert_eq!(kinds("/usr/local/bin"), vec![LexType::Path]);
        assert_eq!(kinds("--"), vec![LexType::Separator]);
    }

    #[test]
    fn numbers_dates_durations_and_uuids_are_distinguished() {
        assert_eq!(kinds("42 3.5 1e3"), vec![LexType::Number; 3]);
        assert_eq!(kinds("2024-01-01"), vec![LexType::Date]);
        assert_eq!(kinds("3d weekly"), vec![LexType::Duration; 2]);
        assert_eq!(
            kinds("a360fc44-315c-4366-b70c-ea7e7520b749 a360fc44"),
            vec![LexType::Uuid; 2]
        );
    }

    #[test]
    fn ambiguity_decides_compact_digits() {
        assert_eq!(kinds("20240101"), vec![LexType::Number]);
        let ambiguous = Lexer::new("20240101")
            .ambiguity(true)
            .map(|(_, kind)| kind)
            .collect::<Vec<_>>();
        assert_eq!(ambiguous, vec![LexType::Date]);
    }

    #[test]
    fn alphabetic_operators_need_boundaries() {
        assert_eq!(kinds("a and b"), vec![LexType::Identifier, LexType::Op, LexType::Identifier]);
        assert_eq!(kinds("android"), vec![LexType::Identifier]);
        assert_eq!(kinds("well-known"), vec![LexType::Identifier]);
        assert_eq!(
            kinds("a<=b"),
            vec![LexType::Identifier, LexType::Op, LexType::Identifier]
        );
    }

    #[test]
    fn unrecognized_input_ends_the_stream() {
        assert_eq!(lex("ok \u{1} rest").len(), 1);
        assert!(lex("   ").is_empty());
    }

    #[test]
    fn helpers_behave_like_their_names() {
        assert_eq!(Lexer::split("list  project:home +x"), vec!["list", "project:home", "+x"]);
        assert_eq!(Lexer::dequote("'abc'"), "abc");
        assert_eq!(Lexer::dequote("\"abc'"), "\"abc'");
        assert!(Lexer::is_all_digits("123"));
        assert!(!Lexer::is_all_digits("12a"));
        assert!(Lexer::is_one_word("abc"));
        assert!(!Lexer::is_one_word("a b"));
        assert!(is_uuid("a360fc44-315c-4366-b70c-ea7e7520b749", false));
        assert!(!is_uuid("a360fc44", false));
        assert!(is_uuid("a360fc44-31", true));
        assert!(!is_uuid("a360fc4", true));
    }
}
