//! environment variable substitution
//!
//! Handles `$NAME` and `${NAME}` references. A reference preceded by an odd number of backslashes is escaped,
//! an even number is substituted. Either way half of the backslashes remain.
use regex::{Captures, Regex};
use std::sync::LazyLock;

static RE_DEFAULT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?s)\A(?P<head>.*?)(?P<escape>\\*)(?P<symbol>\$(?:\{(?P<bname>[A-Za-z_]\w*)\}|(?P<name>[A-Za-z_]\w*)))(?P<tail>.*)\z",
    )
    .expect("valid regex")
});

static RE_BRACE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?s)\A(?P<head>.*?)(?P<escape>\\*)(?P<symbol>\$\{(?P<bname>[A-Za-z_]\w*)\})(?P<tail>.*)\z",
    )
    .expect("valid regex")
});

/// Which reference syntax to recognise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchMode {
    /// `$NAME` and `${NAME}`
    #[default]
    Default,
    /// `${NAME}` only
    Brace,
}

impl MatchMode {
    fn regex(&self) -> &'static Regex {
        match self {
            MatchMode::Default => &RE_DEFAULT,
            MatchMode::Brace => &RE_BRACE,
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("[UNDEFINED ENVIRONMENT VARIABLE] {0}")]
pub struct UnboundEnvironmentVariableError(pub String);

struct Reference<'t> {
    head: &'t str,
    escape: &'t str,
    symbol: &'t str,
    name: &'t str,
    tail: &'t str,
}

impl<'t> Reference<'t> {
    fn find(text: &'t str, mode: MatchMode) -> Option<Self> {
        let captures: Captures<'t> = mode.regex().captures(text)?;
        let group = |name: &str| captures.name(name).map_or("", |m| m.as_str());
        Some(Reference {
            head: group("head"),
            escape: group("escape"),
            symbol: group("symbol"),
            name: captures
                .name("bname")
                .or_else(|| captures.name("name"))
                .map_or("", |m| m.as_str()),
            tail: group("tail"),
        })
    }

    fn is_escaped(&self) -> bool {
        self.escape.len() % 2 == 1
    }
}

/// Escape every reference in `text`
pub fn env_var_escape(text: &str) -> String {
    env_var_escape_with(text, MatchMode::Default)
}

pub fn env_var_escape_with(text: &str, mode: MatchMode) -> String {
    let mut ret = String::new();
    let mut tail = text;
    while let Some(reference) = Reference::find(tail, mode) {
        ret.push_str(reference.head);
        ret.push_str(&reference.escape.repeat(2));
        ret.push('\\');
        ret.push_str(reference.symbol);
        tail = reference.tail;
    }
    ret.push_str(tail);
    ret
}

/// Substitute references in `text` from the process environment
pub fn env_var_process(
    text: &str,
    unbound: Option<&str>,
) -> Result<String, UnboundEnvironmentVariableError> {
    env_var_process_with(text, unbound, MatchMode::Default, |name| {
        std::env::var(name).ok()
    })
}

/// Substitute references in `text` using `lookup`
///
/// Unknown names are replaced by `unbound` if given, otherwise they are an error.
pub fn env_var_process_with(
    text: &str,
    unbound: Option<&str>,
    mode: MatchMode,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<String, UnboundEnvironmentVariableError> {
    let mut ret = String::new();
    let mut tail = text;
    while let Some(reference) = Reference::find(tail, mode) {
        ret.push_str(reference.head);
        ret.push_str(&reference.escape[..reference.escape.len() / 2]);
        if reference.is_escaped() {
            ret.push_str(reference.symbol);
        } else {
            match (lookup(reference.name), unbound) {
                (Some(value), _) => ret.push_str(&value),
                (None, Some(unbound)) => ret.push_str(unbound),
                (None, None) => {
                    return Err(UnboundEnvironmentVariableError(
                        reference.name.to_string(),
                    ))
                }
            }
        }
        tail = reference.tail;
    }
    ret.push_str(tail);
    Ok(ret)
}

/// `true` if the first reference in `text` is not escaped
pub fn contains_env_var(text: &str, mode: MatchMode) -> bool {
    Reference::find(text, mode).is_some_and(|reference| !reference.is_escaped())
}

/// Expand a leading `~` or `~/` to the home directory
pub fn expand_user(text: &str, home: Option<&str>) -> String {
    let Some(home) = home else {
        return text.to_string();
    };
    match text.strip_prefix('~') {
        Some("") => home.to_string(),
        Some(rest) if rest.starts_with('/') => format!("{home}{rest}"),
        _ => text.to_string(),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn lookup(name: &str) -> Option<String> {
        match name {
            "HOME" => Some("/home/me".to_string()),
            "X" => Some("x".to_string()),
            _ => None,
        }
    }

    fn process(text: &str) -> Result<String, UnboundEnvironmentVariableError> {
        env_var_process_with(text, None, MatchMode::Default, lookup)
    }

    #[test]
    fn substitution() {
        assert_eq!(process("$HOME/bin:${X}y").unwrap(), "/home/me/bin:xy");
        assert_eq!(process("no refs").unwrap(), "no refs");
    }

    #[test]
    fn escapes() {
        assert_eq!(process(r"\$HOME").unwrap(), "$HOME");
        assert_eq!(process(r"\\$HOME").unwrap(), r"\/home/me");
        assert_eq!(process(r"\\\${X}").unwrap(), r"\${X}");
    }

    #[test]
    fn unbound() {
        let err = process("$HOME/$NOPE").unwrap_err();
        assert_eq!(err.to_string(), "[UNDEFINED ENVIRONMENT VARIABLE] NOPE");
        let ok = env_var_process_with("$NOPE", Some(""), MatchMode::Default, lookup).unwrap();
        assert_eq!(ok, "");
    }

    #[test]
    fn brace_mode() {
        let text = env_var_process_with("$X ${X}", None, MatchMode::Brace, lookup).unwrap();
        assert_eq!(text, "$X x");
    }

    #[test]
    fn escape() {
        assert_eq!(env_var_escape("$A ${B} \\$C"), r"\$A \${B} \\\$C");
        assert!(contains_env_var("a $B", MatchMode::Default));
        assert!(!contains_env_var(r"a \$B", MatchMode::Default));
    }

    #[test]
    fn home() {
        assert_eq!(expand_user("~/x", Some("/h")), "/h/x");
        assert_eq!(expand_user("~", Some("/h")), "/h");
        assert_eq!(expand_user("a~", Some("/h")), "a~");
    }
}
