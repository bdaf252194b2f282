//! Loading configuration directories with imports, then processing and validating the merged result

use pretty_assertions::assert_eq;
use rose_conf::config_processor::{ConfigProcessorsManager, Origin};
use rose_conf::config_tree::{ConfigTree, ConfigTreeLoader, LoadOptions, TreeError};
use rose_conf::macros::compulsory::WARNING_COMPULSORY_OPT_MISSING;
use rose_conf::macros::{MacroManager, MacroRegistry};
use std::path::{Path, PathBuf};

fn write(path: &Path, text: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, text).unwrap();
}

/// `app` imports `left` and `right`, both of which import `base`
fn diamond(root: &Path) {
    write(&root.join("base/rose-app.conf"), "[env]\nFROM=base\nBASE=1\n");
    write(&root.join("base/file/common.txt"), "base\n");
    write(&root.join("left/rose-app.conf"), "import=base\n\n[env]\nFROM=left\nLEFT=1\n");
    write(&root.join("left/file/common.txt"), "left\n");
    write(&root.join("left/file/left.txt"), "left\n");
    write(&root.join("right/rose-app.conf"), "import=base\n\n[env]\nFROM=right\nRIGHT=1\n");
    write(
        &root.join("app/rose-app.conf"),
        "import=left right\n\n[env]\nAPP=1\n\n[namelist:item(2)]\nx=2\n\n[namelist:item(1)]\nx=1\n",
    );
    write(&root.join("app/opt/rose-app-extra.conf"), "[env]\nEXTRA=1\n");
}

fn load(root: &Path, options: LoadOptions) -> ConfigTree {
    ConfigTreeLoader::new()
        .load(&root.join("app"), "rose-app.conf", options)
        .unwrap()
}

#[test]
fn diamond_imports() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    diamond(root);

    let tree = load(root, LoadOptions::default());
    assert_eq!(
        tree.conf_dirs,
        vec![root.join("app"), root.join("left"), root.join("right"), root.join("base")]
    );
    assert_eq!(
        tree.node.dump(),
        "[env]\nAPP=1\nBASE=1\nFROM=left\nLEFT=1\nRIGHT=1\n\n[namelist:item(1)]\nx=1\n\n[namelist:item(2)]\nx=2\n"
    );

    let common = PathBuf::from("file/common.txt");
    assert_eq!(tree.get_file_name_of(&common), Some(root.join("left/file/common.txt")));
    assert_eq!(
        tree.get_file_locs_of(&common),
        vec![root.join("left/file/common.txt"), root.join("base/file/common.txt")]
    );
    assert_eq!(
        tree.get_file_name_of(Path::new("file/left.txt")),
        Some(root.join("left/file/left.txt"))
    );
}

#[test]
fn optional_keys_and_defines() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    diamond(root);

    let tree = load(
        root,
        LoadOptions {
            opt_keys: vec!["extra".to_string(), "(absent)".to_string()],
            defines: vec!["[env]APP=2".to_string()],
            ..Default::default()
        },
    );
    assert_eq!(tree.node.get_value(&["env", "EXTRA"]), Some("1"));
    assert_eq!(tree.node.get_value(&["env", "APP"]), Some("2"));
    assert_eq!(tree.node.get_value(&["env", "FROM"]), Some("left"));
}

#[test]
fn unused_optional_key_fails() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    diamond(root);

    let err = ConfigTreeLoader::new()
        .load(
            &root.join("app"),
            "rose-app.conf",
            LoadOptions {
                opt_keys: vec!["extra".to_string(), "nope".to_string(), "(absent)".to_string()],
                ..Default::default()
            },
        )
        .unwrap_err();
    assert!(matches!(&err, TreeError::BadOptKeys(keys) if keys == &["nope".to_string()]));
    assert_eq!(err.to_string(), "bad optional configuration key(s): nope");
}

#[test]
fn no_ignore_drops_ignored_settings() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write(&root.join("base/rose-app.conf"), "[env]\nBASE=1\n!OFF=1\n\n[!gone]\nX=1\n");
    write(
        &root.join("app/rose-app.conf"),
        "import=base\n\n[env]\nA=1\n!B=2\n!!C=3\n\n[!!namelist:off]\nx=1\n",
    );

    let tree = load(
        root,
        LoadOptions {
            no_ignore: true,
            ..Default::default()
        },
    );
    assert_eq!(tree.node.dump(), "[env]\nA=1\nBASE=1\n");

    let tree = load(root, LoadOptions::default());
    assert_eq!(tree.node.get_value(&["env", "B"]), Some("2"));
    assert!(tree.node.get(&["gone"], false).is_some_and(|node| node.is_ignored()));
}

#[test]
fn quoted_and_dotted_imports() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write(&root.join("my base/rose-app.conf"), "[env]\nBASE=1\n");
    write(&root.join("other/rose-app.conf"), "[env]\nOTHER=1\n");
    write(&root.join("app/rose-app.conf"), "import='my base' ./x/../other\n");

    let tree = load(root, LoadOptions::default());
    assert_eq!(
        tree.conf_dirs,
        vec![root.join("app"), root.join("my base"), root.join("other")]
    );
    assert_eq!(tree.node.get_value(&["env", "OTHER"]), Some("1"));
}

#[test]
fn process_merged_namelists() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    diamond(root);

    let tree = load(root, LoadOptions::default());
    let processors = ConfigProcessorsManager::default();
    assert_eq!(
        processors
            .process(&tree.node, "namelist:item(:)", Origin::default())
            .unwrap(),
        "&item\nx=1,\n/\n\n&item\nx=2,\n/\n"
    );
    assert_eq!(
        processors.process(&tree.node, "env", Origin::default()).unwrap(),
        "APP=1\nBASE=1\nFROM=left\nLEFT=1\nRIGHT=1\n"
    );
}

#[test]
fn validate_merged_tree() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    diamond(root);
    write(&root.join("meta/rose-meta.conf"), "[env=BASE]\ncompulsory=true\n\n[env=MISSING]\ncompulsory=true\n");

    let tree = load(root, LoadOptions::default());
    let meta = ConfigTreeLoader::new()
        .load(&root.join("meta"), "rose-meta.conf", LoadOptions::default())
        .unwrap();

    let registry = MacroRegistry::with_builtins();
    let mut manager = MacroManager::new(&registry, meta.node);
    let reports = manager.validate("compulsory.CompulsoryChecker", &tree.node).unwrap();
    let infos: Vec<(String, &str)> = reports
        .iter()
        .map(|report| (report.id(), report.info.as_str()))
        .collect();
    assert_eq!(infos, vec![("env=MISSING".to_string(), WARNING_COMPULSORY_OPT_MISSING)]);
}
