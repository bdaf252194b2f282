//! configuration node tree
//!
//! A [ConfigNode] is either a leaf holding a string or an ordered map of child nodes. Every node carries a
//! [State] and a list of comments. A document has at most two levels below the root in practice:
//! root options, sections and section options.
//!
//! Key paths are slices of strings. An empty string inside a key path is skipped, which is what lets
//! `["", "title"]` address the root option `title` in the same shape as `["env", "HOME"]`.
//!
//! ```
//! use rose_conf::config::{ConfigNode, State};
//!
//! let mut node = ConfigNode::new();
//! node.set(&["foo", "bar"], "Bar");
//! node.set_with(&["foo", "baz"], "Baz", Some(State::UserIgnored), None);
//!
//! let keys: Vec<_> = node.walk::<&str>(&[], false).map(|(keys, _)| keys).collect();
//! assert_eq!(keys, vec![vec!["foo"], vec!["foo", "baz"], vec!["foo", "bar"]]);
//!
//! assert_eq!(node.get_value(&["foo", "bar"]), Some("Bar"));
//! assert_eq!(node.get_value(&["foo", "baz"]), None);
//! ```
mod dump;
mod load;
mod sort;

pub use dump::ConfigDumper;
pub use load::{ConfigLoader, ConfigSyntaxError, LoadError, SyntaxErrorCode, UNKNOWN_NAME};
pub use sort::{sort_element, sort_settings};

use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::path::Path;

pub const CHAR_ASSIGN: char = '=';
pub const CHAR_COMMENT: char = '#';
pub const OPT_CONFIG_DIR: &str = "opt";

/// Ignore state of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub enum State {
    #[default]
    Normal,
    /// `!`
    UserIgnored,
    /// `!!`
    TriggerIgnored,
}

impl State {
    pub fn prefix(&self) -> &'static str {
        match self {
            State::Normal => "",
            State::UserIgnored => "!",
            State::TriggerIgnored => "!!",
        }
    }

    pub fn from_prefix(prefix: &str) -> Option<State> {
        match prefix {
            "" => Some(State::Normal),
            "!" => Some(State::UserIgnored),
            "!!" => Some(State::TriggerIgnored),
            _ => None,
        }
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.prefix())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Leaf(String),
    Map(IndexMap<String, ConfigNode>),
}

impl Default for Value {
    fn default() -> Self {
        Value::Map(IndexMap::new())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Leaf(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Leaf(value.to_string())
    }
}

impl From<&String> for Value {
    fn from(value: &String) -> Self {
        Value::Leaf(value.clone())
    }
}

impl From<IndexMap<String, ConfigNode>> for Value {
    fn from(value: IndexMap<String, ConfigNode>) -> Self {
        Value::Map(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConfigNode {
    pub value: Value,
    pub state: State,
    pub comments: Vec<String>,
}

impl ConfigNode {
    /// An empty map node
    pub fn new() -> Self {
        Self::default()
    }

    pub fn leaf(value: impl Into<String>) -> Self {
        Self {
            value: Value::Leaf(value.into()),
            ..Default::default()
        }
    }

    pub fn is_ignored(&self) -> bool {
        self.state != State::Normal
    }

    pub fn as_leaf(&self) -> Option<&str> {
        match &self.value {
            Value::Leaf(value) => Some(value),
            Value::Map(_) => None,
        }
    }

    pub fn as_map(&self) -> Option<&IndexMap<String, ConfigNode>> {
        match &self.value {
            Value::Map(map) => Some(map),
            Value::Leaf(_) => None,
        }
    }

    pub fn as_map_mut(&mut self) -> Option<&mut IndexMap<String, ConfigNode>> {
        match &mut self.value {
            Value::Map(map) => Some(map),
            Value::Leaf(_) => None,
        }
    }

    /// `true` for a map without children
    pub fn is_empty(&self) -> bool {
        self.as_map().is_some_and(|map| map.is_empty())
    }

    fn filter(&self, no_ignore: bool) -> Option<&ConfigNode> {
        if no_ignore && self.is_ignored() {
            return None;
        }
        Some(self)
    }

    /// Node at `keys`
    ///
    /// With `no_ignore` any ignored node on the way (including self) yields `None`.
    pub fn get<K: AsRef<str>>(&self, keys: &[K], no_ignore: bool) -> Option<&ConfigNode> {
        if keys.is_empty() {
            return Some(self);
        }

        let mut node = self.filter(no_ignore)?;
        for key in keys.iter().map(AsRef::as_ref).filter(|key| !key.is_empty()) {
            node = node.as_map()?.get(key)?.filter(no_ignore)?;
        }
        Some(node)
    }

    pub fn get_mut<K: AsRef<str>>(&mut self, keys: &[K]) -> Option<&mut ConfigNode> {
        let mut node = self;
        for key in keys.iter().map(AsRef::as_ref).filter(|key| !key.is_empty()) {
            node = node.as_map_mut()?.get_mut(key)?;
        }
        Some(node)
    }

    /// Value of a non-ignored leaf at `keys`
    pub fn get_value<K: AsRef<str>>(&self, keys: &[K]) -> Option<&str> {
        self.get(keys, true).and_then(ConfigNode::as_leaf)
    }

    /// Set the value at `keys`, creating intermediate map nodes as required
    ///
    /// An intermediate leaf is replaced by a map. State and comments of an existing node are preserved.
    pub fn set<K: AsRef<str>>(&mut self, keys: &[K], value: impl Into<Value>) -> &mut Self {
        self.set_with(keys, value, None, None)
    }

    /// Like [ConfigNode::set] but also sets state and comments unless they are `None`
    pub fn set_with<K: AsRef<str>>(
        &mut self,
        keys: &[K],
        value: impl Into<Value>,
        state: Option<State>,
        comments: Option<Vec<String>>,
    ) -> &mut Self {
        if keys.is_empty() {
            return self;
        }

        let mut node = &mut *self;
        for key in keys.iter().map(AsRef::as_ref).filter(|key| !key.is_empty()) {
            if node.as_map().is_none() {
                node.value = Value::default();
            }
            let Value::Map(map) = &mut node.value else {
                unreachable!("value was just replaced by a map");
            };
            node = map.entry(key.to_string()).or_default();
        }

        node.value = value.into();
        if let Some(state) = state {
            node.state = state;
        }
        if let Some(comments) = comments {
            node.comments = comments;
        }
        self
    }

    /// Remove and return the node at `keys`
    pub fn unset<K: AsRef<str>>(&mut self, keys: &[K]) -> Option<ConfigNode> {
        let (last, parents) = keys.split_last()?;
        self.get_mut(parents)?
            .as_map_mut()?
            .shift_remove(last.as_ref())
    }

    /// Depth-first walk below `keys`
    ///
    /// Yields key paths and nodes, the starting node excluded. Root level leaves are yielded with a leading
    /// empty key (`["", "title"]`). Siblings are visited last-inserted first.
    pub fn walk<K: AsRef<str>>(&self, keys: &[K], no_ignore: bool) -> Walk<'_> {
        let start: Vec<String> = keys.iter().map(|key| key.as_ref().to_string()).collect();
        let stack = match self.get(keys, no_ignore) {
            Some(node) => vec![(start.clone(), node)],
            None => vec![],
        };
        Walk {
            start,
            stack,
            no_ignore,
        }
    }

    /// Text representation in the rose configuration format
    pub fn dump(&self) -> String {
        ConfigDumper::default().dump_to_string(self)
    }

    /// Load a configuration file into a new node
    pub fn load(path: &Path) -> Result<ConfigNode, LoadError> {
        let mut node = ConfigNode::new();
        ConfigLoader::default().load_file(path, &mut node)?;
        Ok(node)
    }
}

impl std::fmt::Display for ConfigNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.dump())
    }
}

impl std::str::FromStr for ConfigNode {
    type Err = ConfigSyntaxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut node = ConfigNode::new();
        ConfigLoader::default().load_str(s, UNKNOWN_NAME, &mut node)?;
        Ok(node)
    }
}

pub struct Walk<'a> {
    start: Vec<String>,
    stack: Vec<(Vec<String>, &'a ConfigNode)>,
    no_ignore: bool,
}

impl<'a> Iterator for Walk<'a> {
    type Item = (Vec<String>, &'a ConfigNode);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (node_keys, node) = self.stack.pop()?;
            if let Some(map) = node.as_map() {
                for (key, child) in map {
                    if let Some(child) = child.filter(self.no_ignore) {
                        let mut child_keys = node_keys.clone();
                        child_keys.push(key.clone());
                        self.stack.push((child_keys, child));
                    }
                }
            }

            if node_keys == self.start {
                continue;
            }

            if node_keys.len() == 1 && node.as_leaf().is_some() {
                let mut keys = vec![String::new()];
                keys.extend(node_keys);
                return Some((keys, node));
            }
            return Some((node_keys, node));
        }
    }
}

/// Maps are serialized with the state prefix on their keys (`!key`)
impl Serialize for ConfigNode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match &self.value {
            Value::Leaf(value) => serializer.serialize_str(value),
            Value::Map(map) => {
                let mut ser = serializer.serialize_map(Some(map.len()))?;
                for (key, child) in map {
                    ser.serialize_entry(&format!("{}{key}", child.state), child)?;
                }
                ser.end()
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> ConfigNode {
        let mut node = ConfigNode::new();
        node.set(&["foo", "bar"], "Bar");
        node.set_with(&["foo", "baz"], "Baz", Some(State::UserIgnored), None);
        node
    }

    #[test]
    fn walk_branch() {
        let node = sample();
        let keys: Vec<_> = node.walk(&["foo"], false).map(|(keys, _)| keys).collect();
        assert_eq!(keys, vec![vec!["foo", "baz"], vec!["foo", "bar"]]);
    }

    #[test]
    fn walk_no_ignore() {
        let node = sample();
        let keys: Vec<_> = node.walk::<&str>(&[], true).map(|(keys, _)| keys).collect();
        assert_eq!(keys, vec![vec!["foo"], vec!["foo", "bar"]]);
    }

    #[test]
    fn walk_missing() {
        let node = sample();
        assert_eq!(node.walk(&["elephant"], false).count(), 0);
    }

    #[test]
    fn walk_root_leaf() {
        let mut node = ConfigNode::new();
        node.set(&["title"], "breakfast");
        let keys: Vec<_> = node.walk::<&str>(&[], false).map(|(keys, _)| keys).collect();
        assert_eq!(keys, vec![vec!["", "title"]]);
    }

    #[test]
    fn empty_keys_are_skipped() {
        let mut node = ConfigNode::new();
        node.set(&["", "title"], "breakfast");
        assert_eq!(node.get_value(&["title"]), Some("breakfast"));
        assert_eq!(node.get_value(&["", "title"]), Some("breakfast"));
    }

    #[test]
    fn set_keeps_state_and_comments() {
        let mut node = ConfigNode::new();
        node.set_with(
            &["foo"],
            "one",
            Some(State::TriggerIgnored),
            Some(vec!["info".into()]),
        );
        node.set(&["foo"], "two");

        let foo = node.get(&["foo"], false).unwrap();
        assert_eq!(foo.as_leaf(), Some("two"));
        assert_eq!(foo.state, State::TriggerIgnored);
        assert_eq!(foo.comments, vec!["info"]);
    }

    #[test]
    fn set_replaces_leaf_with_map() {
        let mut node = ConfigNode::new();
        node.set(&["foo"], "Foo");
        node.set(&["foo", "bar"], "Bar");
        assert_eq!(node.get_value(&["foo", "bar"]), Some("Bar"));
    }

    #[test]
    fn unset() {
        let mut node = ConfigNode::new();
        node.set(&["foo"], "Foo");
        assert_eq!(node.unset::<&str>(&[]), None);
        assert_eq!(node.unset(&["bar"]), None);
        assert_eq!(node.unset(&["foo"]), Some(ConfigNode::leaf("Foo")));
        assert!(node.is_empty());
    }

    #[test]
    fn ignored_parent_hides_children() {
        let mut node = ConfigNode::new();
        node.set_with(&["env"], Value::default(), Some(State::UserIgnored), None);
        node.set(&["env", "HOME"], "/home/me");
        assert_eq!(node.get_value(&["env", "HOME"]), None);
        assert!(node.get(&["env", "HOME"], false).is_some());
    }

    #[test]
    fn serialize_json() {
        let node = sample();
        let json = serde_json::to_string(&node).unwrap();
        assert_eq!(json, r#"{"foo":{"bar":"Bar","!baz":"Baz"}}"#);
    }
}
