//! value types declared by `type=` metadata
//!
//! ```
//! use rose_conf::meta_type::{meta_type_checker, MetaType};
//!
//! assert_eq!(meta_type_checker(".true.", "logical"), Ok(()));
//! assert_eq!(
//!     meta_type_checker("yes", "boolean"),
//!     Err("Not true/false: 'yes'".to_string())
//! );
//! // unknown types pass
//! assert_eq!(meta_type_checker("anything", "no-such-type"), Ok(()));
//! assert_eq!(MetaType::Logical.transform(".T."), Some(".true.".to_string()));
//! ```
use crate::util::quote_value;
use regex::Regex;
use std::sync::LazyLock;

pub const BOOLEAN_TRUE: &str = "true";
pub const BOOLEAN_FALSE: &str = "false";
pub const LOGICAL_TRUE: &str = ".true.";
pub const LOGICAL_FALSE: &str = ".false.";
pub const PYTHON_BOOLEAN_TRUE: &str = "True";
pub const PYTHON_BOOLEAN_FALSE: &str = "False";

static RE_CHARACTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\A'(?:[^']|'')*'\z").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetaType {
    Boolean,
    Character,
    Integer,
    Logical,
    PythonBoolean,
    PythonList,
    Quoted,
    Real,
    SpacedList,
}

impl MetaType {
    /// The type named `key`, `None` if there is no such type
    pub fn from_key(key: &str) -> Option<MetaType> {
        Some(match key {
            "boolean" => MetaType::Boolean,
            "character" => MetaType::Character,
            "integer" => MetaType::Integer,
            "logical" => MetaType::Logical,
            "python_boolean" => MetaType::PythonBoolean,
            "python_list" => MetaType::PythonList,
            "quoted" => MetaType::Quoted,
            "real" => MetaType::Real,
            "spaced_list" => MetaType::SpacedList,
            _ => return None,
        })
    }

    pub fn key(&self) -> &'static str {
        match self {
            MetaType::Boolean => "boolean",
            MetaType::Character => "character",
            MetaType::Integer => "integer",
            MetaType::Logical => "logical",
            MetaType::PythonBoolean => "python_boolean",
            MetaType::PythonList => "python_list",
            MetaType::Quoted => "quoted",
            MetaType::Real => "real",
            MetaType::SpacedList => "spaced_list",
        }
    }

    fn warning(&self) -> &'static str {
        match self {
            MetaType::Boolean => "Not true/false",
            MetaType::Character => "Not in a valid single quoted format",
            MetaType::Integer => "Not an integer",
            MetaType::Logical => "Not Fortran true/false",
            MetaType::PythonBoolean => "Not a valid Python boolean format (True/False)",
            MetaType::PythonList => "Not a valid Python list format",
            MetaType::Quoted => "Not in a valid double quoted format",
            MetaType::Real => "Not a real number",
            MetaType::SpacedList => "Not a valid spaced list format",
        }
    }

    /// Check `value`, the error is the report message
    pub fn is_valid(&self, value: &str) -> Result<(), String> {
        let ok = match self {
            MetaType::Boolean => value == BOOLEAN_TRUE || value == BOOLEAN_FALSE,
            MetaType::Character => RE_CHARACTER.is_match(value),
            MetaType::Integer => is_integer(value),
            MetaType::Logical => value == LOGICAL_TRUE || value == LOGICAL_FALSE,
            MetaType::PythonBoolean => value == PYTHON_BOOLEAN_TRUE || value == PYTHON_BOOLEAN_FALSE,
            MetaType::PythonList => is_python_list(value),
            MetaType::Quoted => is_quoted(value),
            MetaType::Real => parse_real(value).is_some(),
            MetaType::SpacedList => true,
        };
        if ok {
            Ok(())
        } else {
            Err(format!("{}: {}", self.warning(), quote_value(value)))
        }
    }

    /// Canonical form of `value`, `None` for types without one
    pub fn transform(&self, value: &str) -> Option<String> {
        let fixed = match self {
            MetaType::Boolean => {
                if value.eq_ignore_ascii_case(BOOLEAN_FALSE) {
                    BOOLEAN_FALSE.to_string()
                } else if value.eq_ignore_ascii_case(BOOLEAN_TRUE) {
                    BOOLEAN_TRUE.to_string()
                } else {
                    value.to_string()
                }
            }
            MetaType::Logical => {
                if value.eq_ignore_ascii_case(".f.") || value.eq_ignore_ascii_case(LOGICAL_FALSE) {
                    LOGICAL_FALSE.to_string()
                } else if value.eq_ignore_ascii_case(".t.") || value.eq_ignore_ascii_case(LOGICAL_TRUE) {
                    LOGICAL_TRUE.to_string()
                } else {
                    value.to_string()
                }
            }
            MetaType::Character => {
                if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') && !value.contains('\'') {
                    format!("'{}'", &value[1..value.len() - 1])
                } else {
                    enclose(value, '\'')
                }
            }
            MetaType::Quoted => {
                let inner = value
                    .strip_prefix('"')
                    .and_then(|rest| rest.strip_suffix('"'))
                    .filter(|inner| !inner.contains('"') && !inner.contains('\\'));
                match inner {
                    Some(_) => value.to_string(),
                    None => enclose(value, '"'),
                }
            }
            _ => return None,
        };
        Some(fixed)
    }
}

impl std::fmt::Display for MetaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// Check `value` against the type named `meta_type`
///
/// Unknown types pass.
pub fn meta_type_checker(value: &str, meta_type: &str) -> Result<(), String> {
    match MetaType::from_key(meta_type) {
        Some(meta_type) => meta_type.is_valid(value),
        None => Ok(()),
    }
}

/// Canonical form of `value` for the type named `meta_type`
pub fn meta_type_transform(value: &str, meta_type: &str) -> Option<String> {
    MetaType::from_key(meta_type)?.transform(value)
}

/// Parse a real number, surrounding whitespace allowed
pub fn parse_real(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok()
}

fn enclose(value: &str, quote: char) -> String {
    let mut out = value.to_string();
    if !out.ends_with(quote) {
        out.push(quote);
    }
    if !out.starts_with(quote) {
        out.insert(0, quote);
    }
    out
}

/// Optional sign, digits with single `_` between them
fn is_integer(value: &str) -> bool {
    let value = value.trim();
    let digits = value
        .strip_prefix(['+', '-'])
        .unwrap_or(value);
    !digits.is_empty()
        && !digits.starts_with('_')
        && !digits.ends_with('_')
        && !digits.contains("__")
        && digits.chars().all(|c| c.is_ascii_digit() || c == '_')
}

/// Every `"` is unescaped at the ends and escaped in between
fn is_quoted(value: &str) -> bool {
    let segs: Vec<&str> = value.split('"').collect();
    if segs.len() < 3 || !segs[0].is_empty() || !segs[segs.len() - 1].is_empty() {
        return false;
    }
    let last = segs.len() - 2;
    segs.iter().enumerate().all(|(i, seg)| {
        let num_end_esc = seg.len() - seg.trim_end_matches('\\').len();
        let odd = num_end_esc % 2 == 1;
        !((i == last && odd) || (0 < i && i < last && !odd))
    })
}

fn is_python_list(value: &str) -> bool {
    let mut parser = LiteralParser {
        chars: value.trim().chars().collect(),
        pos: 0,
    };
    parser.peek() == Some('[') && parser.literal() && parser.at_end()
}

/// Recogniser for python literals: numbers, strings, `True`/`False`/`None`, lists and tuples
struct LiteralParser {
    chars: Vec<char>,
    pos: usize,
}

impl LiteralParser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn at_end(&mut self) -> bool {
        self.skip_ws();
        self.pos == self.chars.len()
    }

    fn literal(&mut self) -> bool {
        self.skip_ws();
        match self.peek() {
            Some('[') => self.sequence(']'),
            Some('(') => self.sequence(')'),
            Some(quote @ ('\'' | '"')) => self.string(quote),
            Some(c) if c.is_ascii_digit() || matches!(c, '+' | '-' | '.') => self.number(),
            Some(c) if c.is_ascii_alphabetic() => {
                let start = self.pos;
                while self.peek().is_some_and(|c| c.is_ascii_alphanumeric() || c == '_') {
                    self.pos += 1;
                }
                let word: String = self.chars[start..self.pos].iter().collect();
                matches!(word.as_str(), "True" | "False" | "None")
            }
            _ => false,
        }
    }

    fn sequence(&mut self, close: char) -> bool {
        self.pos += 1;
        loop {
            self.skip_ws();
            if self.peek() == Some(close) {
                self.pos += 1;
                return true;
            }
            if !self.literal() {
                return false;
            }
            self.skip_ws();
            match self.peek() {
                Some(',') => self.pos += 1,
                Some(c) if c == close => {}
                _ => return false,
            }
        }
    }

    fn string(&mut self, quote: char) -> bool {
        self.pos += 1;
        while let Some(c) = self.peek() {
            self.pos += 1;
            match c {
                '\\' => self.pos += 1,
                c if c == quote => return true,
                _ => {}
            }
        }
        false
    }

    fn number(&mut self) -> bool {
        let start = self.pos;
        while self.peek().is_some_and(|c| {
            c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.' | '_')
        }) {
            self.pos += 1;
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        // `inf` and `nan` are names in python, not literals
        is_integer(&text) || (text.parse::<f64>().is_ok() && !text.contains(['i', 'n', 'I', 'N']))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn valid(value: &str, meta_type: &str) -> bool {
        meta_type_checker(value, meta_type).is_ok()
    }

    #[test]
    fn booleans() {
        assert!(valid("true", "boolean"));
        assert!(!valid("True", "boolean"));
        assert!(valid("True", "python_boolean"));
        assert!(valid(".false.", "logical"));
        assert_eq!(
            meta_type_checker(".T.", "logical"),
            Err("Not Fortran true/false: '.T.'".to_string())
        );
        assert_eq!(meta_type_transform("FALSE", "boolean").as_deref(), Some("false"));
        assert_eq!(meta_type_transform(".F.", "logical").as_deref(), Some(".false."));
    }

    #[test]
    fn numbers() {
        assert!(valid(" -12 ", "integer"));
        assert!(valid("1_000", "integer"));
        assert!(!valid("1.0", "integer"));
        assert!(!valid("1__0", "integer"));
        assert!(valid("1.5e3", "real"));
        assert!(valid("-.5", "real"));
        assert!(!valid("1d3", "real"));
        assert_eq!(
            meta_type_checker("x", "real"),
            Err("Not a real number: 'x'".to_string())
        );
        assert_eq!(meta_type_transform("1", "integer"), None);
    }

    #[test]
    fn character() {
        assert!(valid("'hello'", "character"));
        assert!(valid("'it''s'", "character"));
        assert!(!valid("'it's'", "character"));
        assert!(!valid("hello", "character"));
        assert_eq!(meta_type_transform("\"hi\"", "character").as_deref(), Some("'hi'"));
        assert_eq!(meta_type_transform("hi", "character").as_deref(), Some("'hi'"));
        assert_eq!(meta_type_transform("'hi", "character").as_deref(), Some("'hi'"));
    }

    #[test]
    fn quoted() {
        assert!(valid("\"hello\"", "quoted"));
        assert!(valid(r#""say \"hi\"""#, "quoted"));
        assert!(!valid(r#""say "hi"""#, "quoted"));
        assert!(!valid("hello", "quoted"));
        assert!(!valid(r#""trailing\""#, "quoted"));
        assert_eq!(meta_type_transform("hi", "quoted").as_deref(), Some("\"hi\""));
        assert_eq!(meta_type_transform("\"hi\"", "quoted").as_deref(), Some("\"hi\""));
    }

    #[test]
    fn lists() {
        assert!(valid("[1, 'a', [True, None], (2,)]", "python_list"));
        assert!(valid("[]", "python_list"));
        assert!(!valid("(1, 2)", "python_list"));
        assert!(!valid("[1, 2", "python_list"));
        assert!(!valid("[foo]", "python_list"));
        assert!(valid("a b c", "spaced_list"));
    }
}
