//! configuration directories with inheritance
//!
//! A configuration directory holds a configuration file (e.g. `rose-app.conf`) and any number of auxiliary
//! files. The file may declare `import=dir1 dir2` to inherit from other directories. Loading resolves the
//! import graph with [crate::c3::mro] and merges the nodes so that the most specific directory wins.
use crate::c3::{mro, MroError};
use crate::config::{ConfigLoader, ConfigNode, LoadError, Value};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

/// A configuration with its inheritance resolved
#[derive(Debug, Default, Clone)]
pub struct ConfigTree {
    /// Merged settings
    pub node: ConfigNode,
    /// Auxiliary file (relative path) to the first directory that has it
    pub files: IndexMap<PathBuf, PathBuf>,
    /// Auxiliary file (relative path) to all directories that have it, in precedence order
    pub file_locs: IndexMap<PathBuf, Vec<PathBuf>>,
    /// Linearised source directories, the requested directory first
    pub conf_dirs: Vec<PathBuf>,
}

impl ConfigTree {
    /// Full path of the auxiliary file `key`
    pub fn get_file_name_of(&self, key: &Path) -> Option<PathBuf> {
        self.files.get(key).map(|dir| dir.join(key))
    }

    /// Full paths of all copies of the auxiliary file `key`
    pub fn get_file_locs_of(&self, key: &Path) -> Vec<PathBuf> {
        self.file_locs
            .get(key)
            .map(|dirs| dirs.iter().map(|dir| dir.join(key)).collect())
            .unwrap_or_default()
    }
}

#[derive(thiserror::Error, Debug)]
pub enum TreeError {
    #[error("IO error")]
    Io(#[from] std::io::Error),
    #[error("cannot walk {}", .0.display())]
    Walk(PathBuf, #[source] walkdir::Error),
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Mro(#[from] MroError),
    #[error("bad optional configuration key(s): {}", .0.join(" "))]
    BadOptKeys(Vec<String>),
}

#[derive(derive_new::new, Debug, Default, Clone)]
pub struct ConfigTreeLoader {
    #[new(default)]
    pub node_loader: ConfigLoader,
}

/// Options for [ConfigTreeLoader::load]
#[derive(Debug, Default, Clone)]
pub struct LoadOptions {
    /// Directories to locate relative configuration directory names
    pub conf_dir_paths: Vec<PathBuf>,
    /// Optional configuration keys
    pub opt_keys: Vec<String>,
    /// Node to extend instead of a fresh one
    pub conf_node: Option<ConfigNode>,
    /// Skip ignored settings
    pub no_ignore: bool,
    /// `[SECTION]KEY=VALUE` overrides of the requested directory
    pub defines: Vec<String>,
}

impl ConfigTreeLoader {
    /// Load the configuration directory `conf_dir` and everything it imports
    pub fn load(
        &self,
        conf_dir: &Path,
        conf_name: &str,
        options: LoadOptions,
    ) -> Result<ConfigTree, TreeError> {
        let LoadOptions {
            conf_dir_paths,
            opt_keys,
            conf_node,
            no_ignore,
            defines,
        } = options;

        let mut search_paths = vec![std::env::current_dir()?];
        search_paths.extend(conf_dir_paths.iter().cloned());
        let conf_dir = search(conf_dir, &search_paths)?;
        tracing::debug!(conf_dir=%conf_dir.display(), "configuration directory");

        let mut used_keys: Vec<String> = vec![];
        let mut nodes: HashMap<PathBuf, ConfigNode> = HashMap::new();
        let mut root = ConfigNode::new();
        self.node_loader.load_with_opts(
            &conf_dir.join(conf_name),
            &mut root,
            &opt_keys,
            Some(&mut used_keys),
            (!defines.is_empty()).then_some(defines.as_slice()),
        )?;
        nodes.insert(conf_dir.clone(), root);

        let target = conf_dir.to_string_lossy().to_string();
        let mut dir_of: HashMap<String, PathBuf> = HashMap::new();
        dir_of.insert(target.clone(), conf_dir.clone());

        let order = mro::<TreeError, _>(&target, |name| {
            let my_conf_dir = dir_of.get(name).cloned().unwrap_or_else(|| PathBuf::from(name));
            let base_dirs = self.get_base_dirs(
                &my_conf_dir,
                conf_name,
                &conf_dir_paths,
                &opt_keys,
                &mut used_keys,
                &mut nodes,
            )?;
            Ok(base_dirs
                .into_iter()
                .map(|dir| {
                    let name = dir.to_string_lossy().to_string();
                    dir_of.insert(name.clone(), dir);
                    name
                })
                .collect())
        })?;

        let bad_keys: Vec<String> = opt_keys
            .iter()
            .filter(|key| !used_keys.contains(key) && ConfigLoader::can_miss_opt_conf_key(key).is_none())
            .cloned()
            .collect();
        if !bad_keys.is_empty() {
            return Err(TreeError::BadOptKeys(bad_keys));
        }

        let mut conf_tree = ConfigTree {
            node: conf_node.unwrap_or_default(),
            conf_dirs: order
                .iter()
                .map(|name| dir_of.get(name).cloned().unwrap_or_else(|| PathBuf::from(name)))
                .collect(),
            ..Default::default()
        };

        for t_conf_dir in &conf_tree.conf_dirs {
            if let Some(node) = nodes.get(t_conf_dir) {
                for (keys, sub_node) in node.walk::<&str>(&[], no_ignore) {
                    if keys == ["", "import"] {
                        continue;
                    }
                    if conf_tree.node.get(&keys, false).is_none() {
                        // sections are filled child by child so that skipped settings stay out
                        let value = match sub_node.as_map() {
                            Some(_) => Value::default(),
                            None => sub_node.value.clone(),
                        };
                        conf_tree.node.set_with(
                            &keys,
                            value,
                            Some(sub_node.state),
                            Some(sub_node.comments.clone()),
                        );
                    }
                }
            }

            for rel_path in auxiliary_files(t_conf_dir, conf_name)? {
                conf_tree
                    .files
                    .entry(rel_path.clone())
                    .or_insert_with(|| t_conf_dir.clone());
                conf_tree
                    .file_locs
                    .entry(rel_path)
                    .or_default()
                    .push(t_conf_dir.clone());
            }
        }

        Ok(conf_tree)
    }

    /// Directories imported by `my_conf_dir`, loading each of them once
    fn get_base_dirs(
        &self,
        my_conf_dir: &Path,
        conf_name: &str,
        conf_dir_paths: &[PathBuf],
        opt_keys: &[String],
        used_keys: &mut Vec<String>,
        nodes: &mut HashMap<PathBuf, ConfigNode>,
    ) -> Result<Vec<PathBuf>, TreeError> {
        let imports: Vec<String> = nodes
            .get(my_conf_dir)
            .and_then(|node| node.get_value(&["import"]))
            .map(split_imports)
            .unwrap_or_default();

        let mut search_paths = vec![my_conf_dir
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default()];
        search_paths.extend(conf_dir_paths.iter().cloned());

        let mut i_conf_dirs = vec![];
        for value in imports {
            let i_conf_dir = search(Path::new(&value), &search_paths)?;
            if !nodes.contains_key(&i_conf_dir) {
                tracing::debug!(import=%i_conf_dir.display(), "loading import");
                let mut node = ConfigNode::new();
                self.node_loader.load_with_opts::<_, &str>(
                    &i_conf_dir.join(conf_name),
                    &mut node,
                    opt_keys,
                    Some(&mut *used_keys),
                    None,
                )?;
                nodes.insert(i_conf_dir.clone(), node);
            }
            i_conf_dirs.push(i_conf_dir);
        }
        Ok(i_conf_dirs)
    }
}

/// Locate a configuration directory
///
/// An absolute path is used as is. Otherwise the first of `conf_dir_paths` containing `conf_dir` wins, falling
/// back to the first path. Missing directories are reported later, when their files are read.
fn search(conf_dir: &Path, conf_dir_paths: &[PathBuf]) -> std::io::Result<PathBuf> {
    if conf_dir.is_absolute() {
        return std::path::absolute(conf_dir).map(normalise);
    }

    for conf_dir_path in conf_dir_paths {
        let dir = conf_dir_path.join(conf_dir);
        if dir.is_dir() {
            return std::path::absolute(dir).map(normalise);
        }
    }

    let first = conf_dir_paths.first().cloned().unwrap_or_default();
    std::path::absolute(first.join(conf_dir)).map(normalise)
}

/// Drop `.` and resolve `..` without touching the file system
///
/// `a/../b` and `b` must be the same node of the import graph.
fn normalise(path: PathBuf) -> PathBuf {
    let mut normal = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normal.pop();
            }
            _ => normal.push(component),
        }
    }
    normal
}

/// Split an `import` value into directory names, the way a POSIX shell splits words
///
/// Quotes group words containing spaces, `\` escapes the next character outside single quotes.
fn split_imports(value: &str) -> Vec<String> {
    let mut words = vec![];
    let mut word: Option<String> = None;
    let mut quote: Option<char> = None;
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some('"'), '\\') | (None, '\\') => {
                if let Some(next) = chars.next() {
                    word.get_or_insert_with(String::new).push(next);
                }
            }
            (Some(_), c) => word.get_or_insert_with(String::new).push(c),
            (None, '\'' | '"') => {
                quote = Some(c);
                word.get_or_insert_with(String::new);
            }
            (None, c) if c.is_whitespace() => words.extend(word.take()),
            (None, c) => word.get_or_insert_with(String::new).push(c),
        }
    }
    words.extend(word);
    words
}

/// Relative paths of all files below `conf_dir`
///
/// Hidden files and directories are skipped, as are files named like the configuration file.
fn auxiliary_files(conf_dir: &Path, conf_name: &str) -> Result<Vec<PathBuf>, TreeError> {
    let mut files = vec![];
    if !conf_dir.is_dir() {
        return Ok(files);
    }

    let walker = walkdir::WalkDir::new(conf_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !entry.file_name().to_string_lossy().starts_with('.'));
    for entry in walker {
        let entry = entry.map_err(|e| TreeError::Walk(conf_dir.to_path_buf(), e))?;
        if !entry.file_type().is_file() {
            continue;
        }
        if entry.file_name() == conf_name {
            continue;
        }
        if let Ok(rel_path) = entry.path().strip_prefix(conf_dir) {
            files.push(rel_path.to_path_buf());
        }
    }
    Ok(files)
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn search_falls_back_to_first_path() {
        let dir = tempfile::tempdir().unwrap();
        let found = search(
            Path::new("missing"),
            &[dir.path().join("a"), dir.path().join("b")],
        )
        .unwrap();
        assert_eq!(found, dir.path().join("a").join("missing"));
    }

    #[test]
    fn search_finds_existing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("b").join("app")).unwrap();
        let found = search(
            Path::new("app"),
            &[dir.path().join("a"), dir.path().join("b")],
        )
        .unwrap();
        assert_eq!(found, dir.path().join("b").join("app"));
    }

    #[test]
    fn search_normalises_dots() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("b").join("app")).unwrap();
        let found = search(Path::new("./x/../app"), &[dir.path().join("b")]).unwrap();
        assert_eq!(found, dir.path().join("b").join("app"));

        let absolute = dir.path().join("b").join(".").join("app").join("..");
        assert_eq!(search(&absolute, &[]).unwrap(), dir.path().join("b"));
    }

    #[test]
    fn imports_split_like_shell_words() {
        assert_eq!(split_imports("  left  right "), vec!["left", "right"]);
        assert_eq!(split_imports("left\tright"), vec!["left", "right"]);
        assert_eq!(
            split_imports("'my app' \"other dir\" plain\\ space"),
            vec!["my app", "other dir", "plain space"]
        );
        assert_eq!(split_imports("a''b ''"), vec!["ab", ""]);
        assert!(split_imports("").is_empty());
    }

    #[test]
    fn auxiliary_files_skip_hidden_and_conf() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("bin")).unwrap();
        std::fs::create_dir_all(root.join(".svn")).unwrap();
        std::fs::write(root.join("rose-app.conf"), "").unwrap();
        std::fs::write(root.join("bin").join("run"), "").unwrap();
        std::fs::write(root.join(".hidden"), "").unwrap();
        std::fs::write(root.join(".svn").join("entries"), "").unwrap();

        let files = auxiliary_files(root, "rose-app.conf").unwrap();
        assert_eq!(files, vec![PathBuf::from("bin/run")]);
    }

    #[test]
    fn missing_import_fails_on_read() {
        let dir = tempfile::tempdir().unwrap();
        let app = dir.path().join("app");
        std::fs::create_dir_all(&app).unwrap();
        std::fs::write(app.join("rose-app.conf"), "import=nowhere\n").unwrap();

        let err = ConfigTreeLoader::new()
            .load(&app, "rose-app.conf", LoadOptions::default())
            .unwrap_err();
        assert!(matches!(err, TreeError::Load(LoadError::Io { .. })));
    }

    #[test]
    fn self_import_is_a_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let app = dir.path().join("app");
        std::fs::create_dir_all(&app).unwrap();
        std::fs::write(app.join("rose-app.conf"), "import=app\n").unwrap();

        let err = ConfigTreeLoader::new()
            .load(&app, "rose-app.conf", LoadOptions::default())
            .unwrap_err();
        assert!(matches!(err, TreeError::Mro(MroError::Cycle { .. })));
    }
}
