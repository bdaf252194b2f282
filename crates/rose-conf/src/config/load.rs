use super::{ConfigNode, State, Value, CHAR_ASSIGN, CHAR_COMMENT, OPT_CONFIG_DIR};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// File name used for text that did not come from a file
pub const UNKNOWN_NAME: &str = "<???>";

static RE_SECTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<head>\s*\[(?P<state>!?!?))(?P<section>.*)\]\s*$").expect("valid regex")
});

static RE_OPTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<state>!?!?)(?P<option>[^\s=]+)\s*=\s*(?P<value>.*)$").expect("valid regex")
});

static RE_OPT_DEFINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\A(?:\[([^\]]+)\])?([^=]+)?(?:=(.*))?\z").expect("valid regex")
});

const OPT_CONFIG_SETTING_COMMENT: &str = " setting from opt config";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntaxErrorCode {
    BadChar,
    BadSyntax,
}

impl SyntaxErrorCode {
    fn message(&self) -> &'static str {
        match self {
            SyntaxErrorCode::BadChar => "unexpected character or end of value",
            SyntaxErrorCode::BadSyntax => r#"expecting "[SECTION]" or "KEY=VALUE""#,
        }
    }
}

/// Malformed configuration text
///
/// Displays the offending line with a marker under column `col_num` (from 0).
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub struct ConfigSyntaxError {
    pub code: SyntaxErrorCode,
    pub file_name: String,
    pub line_num: usize,
    pub col_num: usize,
    pub line: String,
}

impl std::fmt::Display for ConfigSyntaxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}(line {}): {}\n{}\n{}^",
            self.file_name,
            self.line_num,
            self.code.message(),
            self.line,
            " ".repeat(self.col_num)
        )
    }
}

#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("{}: cannot read file", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Syntax(#[from] ConfigSyntaxError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    Root,
    Section,
    Option,
}

/// Loader for the rose configuration format
#[derive(derive_new::new, Debug, Default, Clone)]
pub struct ConfigLoader {
    /// Add a comment above settings loaded from optional configurations
    #[new(default)]
    pub mark_opt_confs: bool,
}

impl ConfigLoader {
    /// Strip the brackets from an optional-if-missing key: `(key)`
    pub fn can_miss_opt_conf_key(key: &str) -> Option<&str> {
        key.strip_prefix('(')?.strip_suffix(')')
    }

    pub fn load_file(&self, path: &Path, node: &mut ConfigNode) -> Result<(), LoadError> {
        self.load_file_with_comments(path, node, None)
    }

    fn load_file_with_comments(
        &self,
        path: &Path,
        node: &mut ConfigNode,
        default_comments: Option<&[String]>,
    ) -> Result<(), LoadError> {
        let path = std::path::absolute(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!(path=%path.display(), "loading file");

        let text = std::fs::read_to_string(&path).map_err(|source| LoadError::Io {
            path: path.clone(),
            source,
        })?;
        self.load_text(&text, &path.display().to_string(), node, default_comments)?;
        Ok(())
    }

    /// Apply `[SECTION]KEY=VALUE` overrides
    pub fn load_defines<S: AsRef<str>>(
        &self,
        defines: &[S],
        node: &mut ConfigNode,
    ) -> Result<(), ConfigSyntaxError> {
        let mut text = String::new();
        for define in defines {
            let Some(captures) = RE_OPT_DEFINE.captures(define.as_ref()) else {
                continue;
            };
            let section = captures.get(1).map_or("", |m| m.as_str());
            text.push_str(&format!("[{section}]\n"));
            if let Some(key) = captures.get(2) {
                let value = captures.get(3).map_or("", |m| m.as_str());
                text.push_str(&format!("{}={value}\n", key.as_str()));
            }
        }
        self.load_str(&text, UNKNOWN_NAME, node)
    }

    /// Load a main configuration file and its optional configurations
    ///
    /// Optional configuration keys come from the `opts` root setting followed by `more_keys`. The file for key
    /// `KEY` of `dir/rose-app.conf` is `dir/opt/rose-app-KEY.conf`.
    ///
    /// A key written as `(KEY)` may be missing. When `used_keys` is given, missing files for keys from
    /// `more_keys` are skipped as well and the keys of all loaded files are recorded.
    pub fn load_with_opts<S: AsRef<str>, D: AsRef<str>>(
        &self,
        path: &Path,
        node: &mut ConfigNode,
        more_keys: &[S],
        mut used_keys: Option<&mut Vec<String>>,
        defines: Option<&[D]>,
    ) -> Result<(), LoadError> {
        self.load_file(path, node)?;
        if let Some(defines) = defines {
            self.load_defines(defines, node)?;
        }

        let mut opt_conf_keys: Vec<String> = match node.unset(&["opts"]) {
            Some(opts) if !opts.is_ignored() => opts
                .as_leaf()
                .map(|value| value.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
            _ => vec![],
        };
        let more_keys: Vec<&str> = more_keys.iter().map(AsRef::as_ref).collect();
        opt_conf_keys.extend(more_keys.iter().map(|key| key.to_string()));

        if opt_conf_keys.is_empty() {
            return Ok(());
        }

        let source_dir = path.parent().unwrap_or_else(|| Path::new(""));
        let stem = path.file_stem().unwrap_or_default().to_string_lossy();
        let ext = path
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();

        for opt_conf_key in &opt_conf_keys {
            let can_miss = Self::can_miss_opt_conf_key(opt_conf_key);
            let key = can_miss.unwrap_or(opt_conf_key.as_str());
            let opt_path = source_dir
                .join(OPT_CONFIG_DIR)
                .join(format!("{stem}-{key}{ext}"));

            let default_comments = self
                .mark_opt_confs
                .then(|| vec![format!("{OPT_CONFIG_SETTING_COMMENT} \"{key}\" ({})", opt_path.display())]);

            match self.load_file_with_comments(&opt_path, node, default_comments.as_deref()) {
                Ok(()) => {
                    tracing::debug!(key, path=%opt_path.display(), "optional configuration loaded");
                    if let Some(used_keys) = used_keys.as_deref_mut() {
                        if !used_keys.iter().any(|used| used == key) {
                            used_keys.push(key.to_string());
                        }
                    }
                }
                Err(LoadError::Io { .. })
                    if can_miss.is_some()
                        || (used_keys.is_some() && more_keys.contains(&opt_conf_key.as_str())) =>
                {
                    tracing::debug!(key, "optional configuration missing");
                }
                Err(e) => return Err(e),
            }
        }

        if let Some(defines) = defines {
            self.load_defines(defines, node)?;
        }
        Ok(())
    }

    /// Load configuration text into `node`
    pub fn load_str(
        &self,
        text: &str,
        file_name: &str,
        node: &mut ConfigNode,
    ) -> Result<(), ConfigSyntaxError> {
        self.load_text(text, file_name, node, None)
    }

    fn load_text(
        &self,
        text: &str,
        file_name: &str,
        node: &mut ConfigNode,
        default_comments: Option<&[String]>,
    ) -> Result<(), ConfigSyntaxError> {
        let mut keys: Vec<String> = vec![];
        let mut position = Position::Root;
        // None until the first blank line, root comments are collected before that
        let mut comments: Option<Vec<String>> = None;

        for (index, line) in text.lines().enumerate() {
            let line_num = index + 1;
            let syntax_error = |code, col_num| ConfigSyntaxError {
                code,
                file_name: file_name.to_string(),
                line_num,
                col_num,
                line: line.to_string(),
            };

            if line.trim().is_empty() {
                comments = Some(vec![]);
                continue;
            }

            if line.trim_start().starts_with(CHAR_COMMENT) {
                let comment = line.trim()[1..].to_string();
                match comments.as_mut() {
                    None => node.comments.push(comment),
                    Some(comments) => comments.push(comment),
                }
                continue;
            }

            if position == Position::Option && line.starts_with(char::is_whitespace) {
                let continuation = line.trim();
                let continuation = continuation
                    .strip_prefix(CHAR_ASSIGN)
                    .unwrap_or(continuation);
                if let Some(current) = node.get_mut(&keys) {
                    if let Value::Leaf(value) = &mut current.value {
                        value.push('\n');
                        value.push_str(continuation);
                    }
                }
                continue;
            }

            if let Some(captures) = RE_SECTION.captures(line) {
                let head = &captures["head"];
                let section = &captures["section"];
                let state = State::from_prefix(&captures["state"]).unwrap_or_default();

                if let Some(bad_index) = check_section_value(section) {
                    return Err(syntax_error(SyntaxErrorCode::BadChar, head.len() + bad_index));
                }

                if position == Position::Option {
                    keys.pop();
                }
                keys.pop();

                let section = section.trim();
                if section.is_empty() {
                    keys.clear();
                    position = Position::Root;
                } else {
                    keys.push(section.to_string());
                    position = Position::Section;
                }

                let pending = comments.take().unwrap_or_default();
                match node.get_mut(&keys) {
                    Some(section_node) => {
                        section_node.state = state;
                        section_node.comments.extend(pending);
                    }
                    None => {
                        node.set_with(&keys, Value::default(), Some(state), Some(pending));
                    }
                }
                comments = Some(vec![]);
                continue;
            }

            let Some(captures) = RE_OPTION.captures(line) else {
                return Err(syntax_error(SyntaxErrorCode::BadSyntax, 0));
            };
            let state = State::from_prefix(&captures["state"]).unwrap_or_default();

            if position == Position::Option {
                keys.pop();
            }
            keys.push(captures["option"].to_string());
            position = Position::Option;

            let option_comments = comments.take().map(|mut comments| {
                if let Some(default_comments) = default_comments {
                    comments.extend_from_slice(default_comments);
                }
                comments
            });
            node.set_with(
                &keys,
                captures["value"].trim(),
                Some(state),
                option_comments,
            );
            comments = Some(vec![]);
        }

        Ok(())
    }
}

/// Index of a bad character in a section name
///
/// Square brackets are never allowed. Names with a scheme (`namelist:foo`) may carry one `{modifier}` followed
/// by one `(index)`. Names using `${...}` substitution are not checked.
fn check_section_value(section: &str) -> Option<usize> {
    for bracket in ['[', ']'] {
        if let Some(index) = section.find(bracket) {
            return Some(index);
        }
    }

    if section.contains("${") {
        return None;
    }

    let (scheme, path) = section.split_once(':')?;
    if path.is_empty() {
        return None;
    }

    let mut index_of = std::collections::HashMap::new();
    for symbol in ['{', '}', '(', ')'] {
        let mut found = path.match_indices(symbol).map(|(index, _)| index);
        let first = found.next();
        if let Some(second) = found.next() {
            return Some(scheme.len() + second + 1);
        }
        index_of.insert(symbol, first);
    }

    for (open, close) in [('{', '}'), ('(', ')')] {
        match (index_of[&open], index_of[&close]) {
            (None, None) => continue,
            (_, None) => return Some(section.len()),
            (None, Some(close)) => return Some(scheme.len() + close + 1),
            (Some(open), Some(close)) if close < open => return Some(scheme.len() + close + 1),
            _ => {}
        }
    }

    if let Some(paren) = index_of[&'('] {
        if let Some(brace) = index_of[&'{'].filter(|brace| *brace > paren) {
            return Some(scheme.len() + brace + 1);
        }
        if index_of[&'}'].is_some_and(|brace| brace > paren) {
            return Some(scheme.len() + paren + 1);
        }
    }

    None
}
