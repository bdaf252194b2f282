//! settings with their metadata and the metadata expression parsers
//!
//! Metadata values are strings. Some of them hold small expressions:
//! - `type=integer, real` a derived type, see [parse_type_expression]
//! - `values=1, 2, 'a,b'` quote aware lists, see [array_split]
//! - `range=:-200, -10:-1, 5:8, 9:` numeric ranges, see [parse_range_expression]
//! - `trigger=namelist:foo=bar: 1, 2; env=BAZ` dependencies, see [parse_trigger_expression]
use crate::config::{ConfigNode, State};
use crate::meta_prop;
use crate::meta_type::{parse_real, BOOLEAN_FALSE, LOGICAL_FALSE};
use indexmap::IndexMap;
use regex::Regex;
use std::sync::LazyLock;

pub const IGNORED_BY_SECTION: &str = "Section ignored";
pub const IGNORED_BY_SYSTEM: &str = "Trigger ignored";
pub const IGNORED_BY_USER: &str = "User ignored";

const RE_REAL: &str = r"[+\-]?\d*\.?\d*(?:[de][+\-]?\d+)?";

static RE_RANGE_NUM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"\A{RE_REAL}\z")).expect("valid regex"));
static RE_RANGE_RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"\A({RE_REAL})\s*:\s*({RE_REAL})\z")).expect("valid regex")
});
static RE_RANGE_SPLIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*,\s*").expect("valid regex"));

/// Raw metadata of one setting id, property name to value
pub type Metadata = IndexMap<String, String>;

/// Metadata with the list valued properties split up
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariableMetadata {
    pub raw: Metadata,
    pub types: Option<Vec<String>>,
    pub element_titles: Option<Vec<String>>,
    pub values: Option<Vec<String>>,
    pub value_titles: Option<Vec<String>>,
    pub value_hints: Option<Vec<String>>,
}

impl From<Metadata> for VariableMetadata {
    fn from(raw: Metadata) -> Self {
        let split = |key: &str, delim: Option<char>| {
            raw.get(key)
                .map(|value| array_split_with(value, delim, true))
        };
        Self {
            types: raw.get(meta_prop::TYPE).map(|value| parse_type_expression(value)),
            element_titles: raw
                .get(meta_prop::ELEMENT_TITLES)
                .map(|value| parse_type_expression(value)),
            values: split(meta_prop::VALUES, Some(',')),
            value_titles: split(meta_prop::VALUE_TITLES, None),
            value_hints: split(meta_prop::VALUE_HINTS, Some(',')),
            raw,
        }
    }
}

impl VariableMetadata {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.raw.get(key).map(String::as_str)
    }
}

/// A setting (option) with its metadata and ignore status
///
/// `ignored_reason`, `error` and `warning` map a cause (or macro name) to a message. The setting is ignored if
/// there is any ignored reason.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Variable {
    pub name: String,
    pub value: String,
    pub old_value: String,
    pub metadata: VariableMetadata,
    pub ignored_reason: IndexMap<String, String>,
    pub error: IndexMap<String, String>,
    pub warning: IndexMap<String, String>,
    pub flags: IndexMap<String, String>,
    pub comments: Vec<String>,
}

impl Variable {
    pub fn new(name: impl Into<String>, value: impl Into<String>, metadata: Metadata) -> Self {
        let value = value.into();
        Self {
            name: name.into(),
            old_value: value.clone(),
            value,
            metadata: metadata.into(),
            ..Default::default()
        }
    }

    /// Build from the option `node` in a section with state `section_state`
    pub fn from_node(name: &str, node: &ConfigNode, section_state: State, metadata: Metadata) -> Self {
        let mut variable = Variable::new(name, node.as_leaf().unwrap_or_default(), metadata);
        variable.comments = node.comments.clone();
        variable.ignored_reason = ignored_reasons(node.state);
        if section_state != State::Normal {
            variable
                .ignored_reason
                .insert(IGNORED_BY_SECTION.to_string(), IGNORED_BY_SECTION.to_string());
        }
        variable
    }

    pub fn is_ignored(&self) -> bool {
        !self.ignored_reason.is_empty()
    }

    pub fn is_modified(&self) -> bool {
        self.value != self.old_value
    }
}

/// A section with its metadata and ignore status
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Section {
    pub name: String,
    pub options: Vec<String>,
    pub metadata: Metadata,
    pub ignored_reason: IndexMap<String, String>,
    pub error: IndexMap<String, String>,
    pub warning: IndexMap<String, String>,
    pub flags: IndexMap<String, String>,
    pub comments: Vec<String>,
}

impl Section {
    pub fn from_node(name: &str, node: &ConfigNode, metadata: Metadata) -> Self {
        Self {
            name: name.to_string(),
            options: node
                .as_map()
                .map(|map| map.keys().cloned().collect())
                .unwrap_or_default(),
            metadata,
            ignored_reason: ignored_reasons(node.state),
            comments: node.comments.clone(),
            ..Default::default()
        }
    }

    pub fn is_ignored(&self) -> bool {
        !self.ignored_reason.is_empty()
    }

    /// Merge `metadata` into the existing metadata
    pub fn process_metadata(&mut self, metadata: Metadata) {
        self.metadata.extend(metadata);
    }
}

fn ignored_reasons(state: State) -> IndexMap<String, String> {
    let reason = match state {
        State::Normal => return IndexMap::new(),
        State::UserIgnored => IGNORED_BY_USER,
        State::TriggerIgnored => IGNORED_BY_SYSTEM,
    };
    IndexMap::from([(reason.to_string(), reason.to_string())])
}

/// Split a value into array elements
///
/// Splits on `,` if there is one, otherwise on spaces. Quoted parts are kept together.
///
/// ```
/// use rose_conf::variable::array_split;
///
/// assert_eq!(array_split("1, 2,3"), vec!["1", "2", "3"]);
/// assert_eq!(array_split("'a,b', 'c'"), vec!["'a,b'", "'c'"]);
/// assert_eq!(array_split("a b"), vec!["a", "b"]);
/// assert_eq!(array_split("single"), vec!["single"]);
/// ```
pub fn array_split(value: &str) -> Vec<String> {
    array_split_with(value, None, false)
}

/// [array_split] on `only_this_delim` if given
///
/// With `remove_esc_char` an escaped delimiter or backslash loses its backslash.
pub fn array_split_with(value: &str, only_this_delim: Option<char>, remove_esc_char: bool) -> Vec<String> {
    let delim = match only_this_delim {
        Some(delim) => delim,
        None if value.contains(',') => ',',
        None => ' ',
    };
    scan_string(value.trim(), delim, remove_esc_char)
        .into_iter()
        .map(|item| item.trim().to_string())
        .collect()
}

pub fn array_join<S: AsRef<str>>(items: &[S]) -> String {
    items.iter().map(AsRef::as_ref).collect::<Vec<_>>().join(",")
}

#[derive(Default)]
struct Quotes {
    double: bool,
    single: bool,
}

impl Quotes {
    fn any(&self) -> bool {
        self.double || self.single
    }

    /// Toggle the state of `quote` unless inside the other kind of quotes
    fn toggle(&mut self, quote: char) {
        match quote {
            '"' if !self.single => self.double = !self.double,
            '\'' if !self.double => self.single = !self.single,
            _ => {}
        }
    }
}

fn scan_string(value: &str, delim: char, remove_esc_char: bool) -> Vec<String> {
    const ESC: char = '\\';

    let chars: Vec<char> = value.chars().collect();
    // a trailing empty quote pair does not open quotes
    let skip: Vec<usize> = if value.ends_with("''") || value.ends_with("\"\"") {
        vec![chars.len() - 2, chars.len()]
    } else {
        vec![]
    };

    let mut items = vec![];
    let mut item = String::new();
    let mut quotes = Quotes::default();
    let mut was_escaped = false;
    let mut is_escaped = false;
    for (i, &letter) in chars.iter().enumerate() {
        if matches!(letter, '"' | '\'') && !skip.contains(&i) && !is_escaped {
            quotes.toggle(letter);
        }
        was_escaped = is_escaped;
        is_escaped = letter == ESC && !is_escaped;

        if remove_esc_char && was_escaped && (letter == delim || letter == ESC) {
            item.pop();
            item.push(letter);
        } else if letter == delim && !quotes.any() && !was_escaped {
            items.push(std::mem::take(&mut item));
        } else {
            item.push(letter);
        }
    }

    let ends_with_delim = chars.last() == Some(&delim) && !quotes.any() && !was_escaped;
    if !item.is_empty() || ends_with_delim {
        items.push(item);
    }
    items
}

/// Default value for a setting with `metadata`
///
/// The first allowed value, else a type specific zero value, else the first value hint.
pub fn get_value_from_metadata(metadata: &Metadata) -> String {
    if let Some(values) = metadata.get(meta_prop::VALUES) {
        return array_split(values).into_iter().next().unwrap_or_default();
    }
    if let Some(meta_type) = metadata.get(meta_prop::TYPE) {
        return match meta_type.as_str() {
            "logical" => LOGICAL_FALSE,
            "boolean" => BOOLEAN_FALSE,
            "integer" | "real" => "0",
            "character" => "''",
            "quoted" => "\"\"",
            _ => "",
        }
        .to_string();
    }
    if let Some(hints) = metadata.get(meta_prop::VALUE_HINTS) {
        return array_split(hints).into_iter().next().unwrap_or_default();
    }
    String::new()
}

/// Element types of a `type=` expression
///
/// A plain type gives one element, a derived type (`integer, real`) several.
pub fn parse_type_expression(expr: &str) -> Vec<String> {
    array_split_with(expr.trim(), Some(','), false)
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid syntax: {0}")]
pub struct RangeSyntaxError(pub String);

#[derive(Debug, Clone, PartialEq)]
enum RangeCheck {
    Equal(f64),
    Between(Option<f64>, Option<f64>),
}

impl RangeCheck {
    fn check(&self, number: f64) -> bool {
        match self {
            RangeCheck::Equal(value) => number == *value,
            RangeCheck::Between(min, max) => {
                max.map_or(true, |max| max >= number) && min.map_or(true, |min| number >= min)
            }
        }
    }
}

/// Numeric limits parsed by [parse_range_expression]
#[derive(Debug, Clone, PartialEq)]
pub struct Range {
    checks: Vec<RangeCheck>,
}

impl Range {
    /// `true` if `number` matches any of the comma separated expressions
    pub fn check(&self, number: f64) -> bool {
        self.checks.iter().any(|check| check.check(number))
    }
}

fn parse_range_number(text: &str, item: &str) -> Result<f64, RangeSyntaxError> {
    parse_real(&text.replace(['d', 'D'], "e")).ok_or_else(|| RangeSyntaxError(item.to_string()))
}

/// Parse numeric limits such as `:-200, -10:-1, 1.2, 2, 5:8, 9:`
///
/// ```
/// use rose_conf::variable::parse_range_expression;
///
/// let range = parse_range_expression(":-200, -10:-1, 1.2, 5:8, 9:").unwrap();
/// assert!(range.check(-300.0));
/// assert!(range.check(1.2));
/// assert!(range.check(100.0));
/// assert!(!range.check(0.0));
/// assert!(parse_range_expression(":").is_err());
/// ```
pub fn parse_range_expression(expr: &str) -> Result<Range, RangeSyntaxError> {
    let mut checks = vec![];
    for item in RE_RANGE_SPLIT.split(expr.trim()) {
        if RE_RANGE_NUM.is_match(item) {
            checks.push(RangeCheck::Equal(parse_range_number(item, item)?));
        } else if let Some(captures) = RE_RANGE_RANGE.captures(item) {
            if item == ":" {
                return Err(RangeSyntaxError(item.to_string()));
            }
            let bound = |i: usize| -> Result<Option<f64>, RangeSyntaxError> {
                match captures.get(i).map(|m| m.as_str()).filter(|s| !s.is_empty()) {
                    Some(text) => parse_range_number(text, item).map(Some),
                    None => Ok(None),
                }
            };
            checks.push(RangeCheck::Between(bound(1)?, bound(2)?));
        } else {
            return Err(RangeSyntaxError(item.to_string()));
        }
    }
    Ok(Range { checks })
}

/// Values a triggered setting is enabled for, `None` for any value
pub type TriggerValues = Option<Vec<String>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TriggerToken {
    Key,
    Value,
    GroupEnd,
}

const TRIGGER_DELIMS: [(&str, TriggerToken); 3] = [
    (": ", TriggerToken::Key),
    (",", TriggerToken::Value),
    (";", TriggerToken::GroupEnd),
];

fn delim_at(chars: &[char], i: usize) -> Option<(&'static str, TriggerToken)> {
    TRIGGER_DELIMS.iter().copied().find(|(delim, _)| {
        let len = delim.chars().count();
        chars.get(i..i + len).is_some_and(|s| s.iter().copied().eq(delim.chars()))
    })
}

fn scan_trigger_string(text: &str) -> Vec<(String, TriggerToken)> {
    const ESC: char = '\\';

    let chars: Vec<char> = text.chars().collect();
    let mut tokens = vec![];
    let mut item = String::new();
    let mut quotes = Quotes::default();
    let mut is_escaped = false;
    let mut i = 0;
    while i < chars.len() {
        let letter = chars[i];
        let mut is_letter_junk = false;
        if matches!(letter, '"' | '\'') && !is_escaped {
            quotes.toggle(letter);
        }
        if !quotes.any() && !is_escaped {
            if let Some((delim, token)) = delim_at(&chars, i) {
                tokens.push((item.trim().to_string(), token));
                item.clear();
                i += delim.chars().count() - 1;
                is_letter_junk = true;
            }
        }
        is_escaped = letter == ESC && !is_escaped;
        // an escape before a delimiter is dropped
        if letter == ESC && is_escaped && !quotes.any() && i + 1 < chars.len() && delim_at(&chars, i + 1).is_some() {
            is_letter_junk = true;
        }
        if !is_letter_junk {
            item.push(letter);
        }
        i += 1;
    }
    if !item.is_empty() {
        tokens.push((item.trim().to_string(), TriggerToken::GroupEnd));
    }
    tokens
}

/// Parse a `trigger=` expression into triggered ids and the values enabling them
///
/// ```
/// use rose_conf::variable::parse_trigger_expression;
///
/// let triggers = parse_trigger_expression("namelist:foo=bar: 1, 2; env=BAZ");
/// assert_eq!(triggers["namelist:foo=bar"], Some(vec!["1".to_string(), "2".to_string()]));
/// assert_eq!(triggers["env=BAZ"], None);
/// ```
pub fn parse_trigger_expression(expr: &str) -> IndexMap<String, TriggerValues> {
    let expr = expr.replace('\n', "");
    let mut trigger_data: IndexMap<String, Vec<String>> = IndexMap::new();
    let mut current_key: Option<String> = None;
    let mut is_in_group = false;
    for (item, token) in scan_trigger_string(&expr) {
        match token {
            TriggerToken::Key => {
                trigger_data.insert(item.clone(), vec![]);
                current_key = Some(item);
                is_in_group = true;
            }
            TriggerToken::GroupEnd => {
                match (&current_key, is_in_group) {
                    (Some(key), true) => trigger_data.entry(key.clone()).or_default().push(item),
                    _ => {
                        trigger_data.insert(item.clone(), vec![]);
                        current_key = Some(item);
                    }
                }
                is_in_group = false;
            }
            TriggerToken::Value if is_in_group => {
                if let Some(key) = &current_key {
                    trigger_data.entry(key.clone()).or_default().push(item);
                }
            }
            TriggerToken::Value => {}
        }
    }
    trigger_data
        .into_iter()
        .map(|(key, values)| (key, (!values.is_empty()).then_some(values)))
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn split() {
        assert_eq!(array_split("a, b, "), vec!["a", "b", ""]);
        assert_eq!(array_split(""), Vec::<String>::new());
        assert_eq!(array_split("\"a, b\", c"), vec!["\"a, b\"", "c"]);
        assert_eq!(array_split("'it''s', x"), vec!["'it''s'", "x"]);
        assert_eq!(array_split("a,''"), vec!["a", "''"]);
        assert_eq!(
            array_split_with(r"a\,b,c", Some(','), true),
            vec!["a,b", "c"]
        );
        assert_eq!(array_join(&["1", "2"]), "1,2");
    }

    #[test]
    fn types() {
        assert_eq!(parse_type_expression("integer"), vec!["integer"]);
        assert_eq!(parse_type_expression(" integer, real "), vec!["integer", "real"]);
    }

    #[test]
    fn default_values() {
        let metadata = |pairs: &[(&str, &str)]| -> Metadata {
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
        };
        assert_eq!(get_value_from_metadata(&metadata(&[("values", "b, a"), ("type", "integer")])), "b");
        assert_eq!(get_value_from_metadata(&metadata(&[("type", "logical")])), ".false.");
        assert_eq!(get_value_from_metadata(&metadata(&[("type", "quoted")])), "\"\"");
        assert_eq!(get_value_from_metadata(&metadata(&[("value-hints", "x,y")])), "x");
        assert_eq!(get_value_from_metadata(&metadata(&[])), "");
    }

    #[test]
    fn ranges() {
        let range = parse_range_expression("1, 3:5").unwrap();
        assert!(range.check(1.0));
        assert!(range.check(4.5));
        assert!(!range.check(2.0));

        let range = parse_range_expression("1e2:1d3").unwrap();
        assert!(range.check(500.0));

        assert_eq!(
            parse_range_expression("1, a:b").unwrap_err().to_string(),
            "Invalid syntax: a:b"
        );
        assert!(parse_range_expression("").is_err());
    }

    #[test]
    fn triggers() {
        let triggers = parse_trigger_expression("a=b: 'x; y', z;\n c=d: 1; e=f");
        assert_eq!(
            triggers,
            IndexMap::from([
                ("a=b".to_string(), Some(vec!["'x; y'".to_string(), "z".to_string()])),
                ("c=d".to_string(), Some(vec!["1".to_string()])),
                ("e=f".to_string(), None),
            ])
        );

        let triggers = parse_trigger_expression(r"a=b: this \; that");
        assert_eq!(triggers["a=b"], Some(vec!["this ; that".to_string()]));
    }

    #[test]
    fn variable_ignored_reasons() {
        let node = ConfigNode {
            state: State::TriggerIgnored,
            ..ConfigNode::leaf("1")
        };
        let variable = Variable::from_node("foo", &node, State::UserIgnored, Metadata::new());
        assert!(variable.is_ignored());
        assert_eq!(
            variable.ignored_reason.keys().collect::<Vec<_>>(),
            vec![IGNORED_BY_SYSTEM, IGNORED_BY_SECTION]
        );

        let mut copy = variable.clone();
        copy.value = "2".into();
        assert!(copy.is_modified());
        assert!(!variable.is_modified());
    }

    #[test]
    fn section_from_node() {
        let node: ConfigNode = "[!namelist:foo]\na=1\nb=2\n".parse().unwrap();
        let mut section = Section::from_node(
            "namelist:foo",
            node.get(&["namelist:foo"], false).unwrap(),
            Metadata::from([("title".to_string(), "Foo".to_string())]),
        );
        assert_eq!(section.options, vec!["a", "b"]);
        assert!(section.is_ignored());

        section.process_metadata(Metadata::from([("duplicate".to_string(), "true".to_string())]));
        assert_eq!(section.metadata.len(), 2);
    }

    #[test]
    fn variable_metadata() {
        let metadata: Metadata = [("type", "integer, real"), ("values", r"1, 2\,3")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let variable = Variable::new("foo", "1", metadata);
        assert_eq!(variable.metadata.types, Some(vec!["integer".into(), "real".into()]));
        assert_eq!(variable.metadata.values, Some(vec!["1".into(), "2,3".into()]));
    }
}
