//! version upgrade macros
//!
//! Every configuration names its metadata with a root `meta=category/tag` option. The metadata of a category
//! comes with a chain of [UpgradeMacro]s, each moving a configuration from one tag to the next (or back).
//! [MacroUpgradeManager] picks the macros between the current tag and a target tag and applies them in order.
//!
//! Upgrade macros change configurations through [MacroUpgrade], which records a report for every change it
//! makes.
pub mod demo;

use crate::config::{ConfigNode, LoadError, State};
use crate::macros::{get_id_from_section_option, strip_dupl, strip_id, MacroReport};
use crate::meta_prop;
use crate::util::quote_value;
use indexmap::IndexMap;
use std::path::Path;

pub const RESOURCE_DIR: &str = "etc";
pub const RESOURCE_FILE_ADD: &str = "rose-macro-add.conf";
pub const RESOURCE_FILE_REMOVE: &str = "rose-macro-remove.conf";

pub const BEST_VERSION_MARKER: &str = "* ";
pub const CURRENT_VERSION_MARKER: &str = "= ";

const INFO_ADDED_SECT: &str = "Added";
const INFO_REMOVED: &str = "Removed";

#[derive(thiserror::Error, Debug)]
pub enum UpgradeError {
    #[error("{0}: invalid version.")]
    InvalidVersion(String),
    #[error("{0}: already at this version.")]
    SameVersion(String),
    #[error("Error: cannot rename {0} to {1}={2}")]
    RenameSectionToOption(String, String, String),
    #[error("Error: cannot rename {0}={1} to {2}")]
    RenameOptionToSection(String, String, String),
    #[error("Not valid for value change: {0}")]
    NotValidForValueChange(String),
    #[error("{0} to {1}: downgrade is not supported")]
    NoDowngrade(String, String),
    #[error("Error: could not find meta flag")]
    MetaFlagMissing,
    #[error("No versions available.")]
    NoVersions,
    #[error("could not read upgrade resources")]
    Resource(#[from] LoadError),
}

/// Optional arguments of the [MacroUpgrade] primitives
#[derive(Debug, Default, Clone)]
pub struct SettingOptions {
    /// overwrite an existing setting when adding, add a missing one when changing
    pub forced: bool,
    pub state: Option<State>,
    pub comments: Option<Vec<String>>,
    /// report text replacing the default one
    pub info: Option<String>,
}

impl SettingOptions {
    pub fn info(info: impl Into<String>) -> Self {
        Self {
            info: Some(info.into()),
            ..Self::default()
        }
    }
}

fn state_name(state: State) -> &'static str {
    match state {
        State::Normal => "enabled",
        State::UserIgnored => "user-ignored",
        State::TriggerIgnored => "trig-ignored",
    }
}

fn section_option<'k>(keys: &[&'k str]) -> (&'k str, Option<&'k str>) {
    (keys.first().copied().unwrap_or_default(), keys.get(1).copied())
}

fn setting_keys<'k>(section: &'k str, option: Option<&'k str>) -> Vec<&'k str> {
    std::iter::once(section).chain(option).collect()
}

/// Setting-level changes to a configuration, each one recorded as a report
///
/// `keys` name a section (`["namelist:foo"]`) or an option (`["namelist:foo", "bar"]`). Root options are
/// `["", "bar"]`.
#[derive(Debug, Default)]
pub struct MacroUpgrade {
    reports: Vec<MacroReport>,
}

impl MacroUpgrade {
    pub fn reports(&self) -> &[MacroReport] {
        &self.reports
    }

    pub fn into_reports(self) -> Vec<MacroReport> {
        self.reports
    }

    pub fn add_report(&mut self, report: MacroReport) {
        self.reports.push(report);
    }

    /// Setting clashing with `section`/`option`: `foo(1)` or `foo{bar}` for a section `foo`, `foo(1)` for an
    /// option `foo`
    fn find_clash(config: &ConfigNode, section: &str, option: Option<&str>) -> Option<String> {
        for (existing_section, existing_node) in config.as_map().into_iter().flatten() {
            if !existing_section.starts_with(section) {
                continue;
            }
            let existing_base_section = strip_id(existing_section);
            let found = match option {
                None => *existing_section == section || existing_base_section == section,
                Some(_) => *existing_section != section && existing_base_section == section,
            };
            if found {
                return Some(existing_section.clone());
            }
            let (Some(option), true) = (option, *existing_section == section) else {
                continue;
            };
            for existing_option in existing_node.as_map().into_iter().flatten().map(|(key, _)| key) {
                if existing_option == option || strip_dupl(existing_option) == option {
                    return Some(get_id_from_section_option(existing_section, Some(existing_option)));
                }
            }
        }
        None
    }

    /// Add a section or an option, creating its section if required
    ///
    /// Nothing is added if the setting, or a clashing indexed setting, exists already. A clash is reported as
    /// a warning. With `forced`, an existing option with the same id gets the new value instead.
    pub fn add_setting(
        &mut self,
        config: &mut ConfigNode,
        keys: &[&str],
        value: Option<&str>,
        options: &SettingOptions,
    ) -> Result<bool, UpgradeError> {
        let (section, option) = section_option(keys);
        let id = get_id_from_section_option(section, option);
        let value = option.map(|_| value.unwrap_or_default());
        let info = match (&options.info, value) {
            (Some(info), _) => info.clone(),
            (None, None) => INFO_ADDED_SECT.to_string(),
            (None, Some(value)) => format!("Added with value {}", quote_value(value)),
        };

        let (found, clash_id) = match config.get(&setting_keys(section, option), false) {
            Some(_) => (true, None),
            None => match Self::find_clash(config, section, option) {
                Some(clash_id) => (true, Some(clash_id)),
                None => (false, None),
            },
        };
        if found {
            if options.forced && clash_id.as_ref().map_or(true, |clash_id| *clash_id == id) {
                let change = SettingOptions {
                    forced: false,
                    info: Some(info),
                    ..options.clone()
                };
                return self.change_setting_value(config, keys, value.unwrap_or_default(), &change);
            }
            if let Some(clash_id) = clash_id {
                let warning = format!("Warning: cannot add {id}: clash with {clash_id}");
                self.add_report(MacroReport::new(section, option, value, warning).warning());
            }
            return Ok(false);
        }

        if option.is_some() && config.get(&[section], false).is_none() {
            self.add_setting(config, &[section], None, &SettingOptions::default())?;
        }
        let keys = setting_keys(section, option);
        match value {
            Some(value) => config.set_with(&keys, value, options.state, options.comments.clone()),
            None => config.set_with(&keys, IndexMap::new(), options.state, options.comments.clone()),
        };
        tracing::debug!(setting = id, value, "added setting");
        self.add_report(MacroReport::new(section, option, value, info));
        Ok(true)
    }

    /// Change the value of an option
    ///
    /// A missing option is only added with `forced`. Sections have no value to change.
    pub fn change_setting_value(
        &mut self,
        config: &mut ConfigNode,
        keys: &[&str],
        value: &str,
        options: &SettingOptions,
    ) -> Result<bool, UpgradeError> {
        let (section, option) = section_option(keys);
        let Some(node) = config.get_mut(&setting_keys(section, option)) else {
            if options.forced {
                let add = SettingOptions {
                    forced: false,
                    state: None,
                    ..options.clone()
                };
                return self.add_setting(config, keys, Some(value), &add);
            }
            return Ok(false);
        };
        if node.as_leaf() == Some(value) {
            return Ok(false);
        }
        let (Some(option), Some(old_value)) = (option, node.as_leaf()) else {
            return Err(UpgradeError::NotValidForValueChange(get_id_from_section_option(section, option)));
        };
        let info = match &options.info {
            Some(info) => info.clone(),
            None => format!("Value: {} -> {}", quote_value(old_value), quote_value(value)),
        };
        node.value = value.into();
        if let Some(comments) = &options.comments {
            node.comments = comments.clone();
        }
        self.add_report(MacroReport::new(section, Some(option), Some(value), info));
        Ok(true)
    }

    /// Value of an option, `None` if it is missing (or ignored with `no_ignore`)
    pub fn get_setting_value<'c>(&self, config: &'c ConfigNode, keys: &[&str], no_ignore: bool) -> Option<&'c str> {
        let (section, option) = section_option(keys);
        config
            .get(&setting_keys(section, option), no_ignore)
            .and_then(ConfigNode::as_leaf)
    }

    /// Remove a section with all its options, or a single option
    pub fn remove_setting(&mut self, config: &mut ConfigNode, keys: &[&str], info: Option<&str>) -> bool {
        let (section, option) = section_option(keys);
        if option.is_none() {
            if config.get(&[section], false).is_none() {
                return false;
            }
            let options: Vec<String> = config
                .walk(&[section], false)
                .filter_map(|(opt_keys, _)| opt_keys.get(1).cloned())
                .collect();
            for opt in options {
                self.remove_one(config, section, Some(&opt), info);
            }
        }
        self.remove_one(config, section, option, info)
    }

    fn remove_one(&mut self, config: &mut ConfigNode, section: &str, option: Option<&str>, info: Option<&str>) -> bool {
        let Some(node) = config.unset(&setting_keys(section, option)) else {
            return false;
        };
        let value = node.as_leaf().unwrap_or_default();
        tracing::debug!(setting = get_id_from_section_option(section, option), "removed setting");
        self.add_report(MacroReport::new(
            section,
            option,
            Some(value),
            info.unwrap_or(INFO_REMOVED),
        ));
        true
    }

    /// Move a setting to new keys, keeping state and comments
    ///
    /// A renamed section takes its options along and replaces any section of the new name.
    pub fn rename_setting(
        &mut self,
        config: &mut ConfigNode,
        keys: &[&str],
        new_keys: &[&str],
        info: Option<&str>,
    ) -> Result<(), UpgradeError> {
        let (section, option) = section_option(keys);
        let (new_section, new_option) = section_option(new_keys);
        match (option, new_option) {
            (None, Some(new_option)) => {
                return Err(UpgradeError::RenameSectionToOption(
                    section.to_string(),
                    new_section.to_string(),
                    new_option.to_string(),
                ))
            }
            (Some(option), None) => {
                return Err(UpgradeError::RenameOptionToSection(
                    section.to_string(),
                    option.to_string(),
                    new_section.to_string(),
                ))
            }
            _ => {}
        }
        let Some(node) = config.get(&setting_keys(section, option), false).cloned() else {
            return Ok(());
        };
        let info = match (info, option, new_option) {
            (Some(info), _, _) => info.to_string(),
            (None, Some(option), Some(new_option)) => format!("Renamed {section}={option} -> {new_section}={new_option}"),
            _ => format!("Renamed {section} -> {new_section}"),
        };
        let renamed = SettingOptions {
            forced: true,
            state: Some(node.state),
            comments: Some(node.comments.clone()),
            info: Some(info),
        };

        if option.is_none() {
            if config.get(&[new_section], false).is_some() {
                self.remove_setting(config, &[new_section], None);
            }
            self.add_setting(config, &[new_section], None, &renamed)?;
            for (renamed_option, opt_node) in node.as_map().into_iter().flatten() {
                let opt_renamed = SettingOptions {
                    state: Some(opt_node.state),
                    comments: Some(opt_node.comments.clone()),
                    ..renamed.clone()
                };
                self.add_setting(config, &[new_section, renamed_option], opt_node.as_leaf(), &opt_renamed)?;
            }
        } else {
            self.add_setting(config, new_keys, node.as_leaf(), &renamed)?;
        }
        self.remove_setting(config, keys, None);
        Ok(())
    }

    /// Reset a setting to the normal state
    pub fn enable_setting(&mut self, config: &mut ConfigNode, keys: &[&str], info: Option<&str>) -> bool {
        self.set_state(config, keys, State::Normal, info)
    }

    /// Set a setting to an ignored `state`, usually [State::UserIgnored]
    pub fn ignore_setting(&mut self, config: &mut ConfigNode, keys: &[&str], state: State, info: Option<&str>) -> bool {
        self.set_state(config, keys, state, info)
    }

    fn set_state(&mut self, config: &mut ConfigNode, keys: &[&str], state: State, info: Option<&str>) -> bool {
        let (section, option) = section_option(keys);
        let Some(node) = config.get_mut(&setting_keys(section, option)) else {
            return false;
        };
        if node.state == state {
            return false;
        }
        let info = match info {
            Some(info) => info.to_string(),
            None => format!("{} -> {}", state_name(node.state), state_name(state)),
        };
        node.state = state;
        let value = option.and_then(|_| node.as_leaf());
        self.add_report(MacroReport::new(section, option, value, info));
        true
    }

    /// Add every setting of `add_config` and remove every setting of `remove_config`
    ///
    /// Empty sections of `remove_config` remove the whole section, other sections only the options listed.
    /// The two are swapped when downgrading.
    pub fn act_from_configs(
        &mut self,
        config: &mut ConfigNode,
        add_config: &ConfigNode,
        remove_config: &ConfigNode,
        downgrade: bool,
    ) -> Result<(), UpgradeError> {
        let (add_config, remove_config) = match downgrade {
            true => (remove_config, add_config),
            false => (add_config, remove_config),
        };
        for (keys, node) in add_config.walk::<&str>(&[], false) {
            let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
            let added = SettingOptions {
                state: Some(node.state),
                comments: Some(node.comments.clone()),
                ..SettingOptions::default()
            };
            self.add_setting(config, &keys, node.as_leaf(), &added)?;
        }
        for (keys, node) in remove_config.walk::<&str>(&[], false) {
            if keys.len() == 1 && !node.is_empty() {
                continue;
            }
            let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
            self.remove_setting(config, &keys, None);
        }
        Ok(())
    }

    /// [MacroUpgrade::act_from_configs] with `etc/<tag>/rose-macro-add.conf` and `etc/<tag>/rose-macro-remove.conf`
    /// below `resource_dir`
    ///
    /// Missing files count as empty configurations.
    pub fn act_from_files(
        &mut self,
        config: &mut ConfigNode,
        resource_dir: &Path,
        tag: &str,
        downgrade: bool,
    ) -> Result<(), UpgradeError> {
        let tag_dir = resource_dir.join(RESOURCE_DIR).join(tag);
        let load = |name: &str| -> Result<ConfigNode, LoadError> {
            let path = tag_dir.join(name);
            match path.is_file() {
                true => ConfigNode::load(&path),
                false => Ok(ConfigNode::new()),
            }
        };
        let add_config = load(RESOURCE_FILE_ADD)?;
        let remove_config = load(RESOURCE_FILE_REMOVE)?;
        self.act_from_configs(config, &add_config, &remove_config, downgrade)
    }
}

/// One step of a metadata version chain
pub trait UpgradeMacro {
    /// Tag the macro upgrades from
    fn before_tag(&self) -> &str;
    /// Tag the macro upgrades to
    fn after_tag(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    fn upgrade(&self, config: &mut ConfigNode, meta_config: &ConfigNode) -> Result<Vec<MacroReport>, UpgradeError>;

    fn downgrade(&self, _config: &mut ConfigNode, _meta_config: &ConfigNode) -> Result<Vec<MacroReport>, UpgradeError> {
        Err(UpgradeError::NoDowngrade(
            self.before_tag().to_string(),
            self.after_tag().to_string(),
        ))
    }
}

impl std::fmt::Debug for dyn UpgradeMacro {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {}", self.before_tag(), self.after_tag())
    }
}

/// Index of the last macro of the chain that starts at the first macro without a predecessor
fn latest_macro(macros: &[Box<dyn UpgradeMacro>]) -> Option<usize> {
    let is_linked = |tag: &str| macros.iter().any(|m| m.after_tag() == tag);
    let mut current = macros
        .iter()
        .position(|m| !is_linked(m.before_tag()))
        .or_else(|| macros.len().checked_sub(1))?;
    for _ in 0..macros.len() {
        let after_tag = macros[current].after_tag();
        match macros.iter().position(|m| m.before_tag() == after_tag) {
            Some(next) => current = next,
            None => break,
        }
    }
    Some(current)
}

/// Applies the upgrade (or downgrade) macros between the current tag of a configuration and a new tag
#[derive(Debug)]
pub struct MacroUpgradeManager {
    downgrade: bool,
    tag: String,
    /// `meta` value without the tag
    meta_flag_no_tag: String,
    /// tags with their own metadata directory, `None` if unknown
    named_tags: Option<Vec<String>>,
    /// the chain starting at the current tag, in application order
    version_macros: Vec<Box<dyn UpgradeMacro>>,
    new_tag: Option<String>,
}

impl MacroUpgradeManager {
    /// Manager for `app_config` with the macros of its metadata category
    pub fn new(
        app_config: &ConfigNode,
        macros: Vec<Box<dyn UpgradeMacro>>,
        downgrade: bool,
    ) -> Result<Self, UpgradeError> {
        let meta_flag = app_config
            .get_value(&["", meta_prop::CONFIG_OPT_META])
            .ok_or(UpgradeError::MetaFlagMissing)?;
        let (meta_flag_no_tag, tag) = match meta_flag.rsplit_once('/') {
            Some((category, tag)) => (category.to_string(), tag.to_string()),
            None => (meta_flag.to_string(), meta_prop::DEFAULT_VN_DIR.to_string()),
        };
        let mut manager = Self {
            downgrade,
            tag,
            meta_flag_no_tag,
            named_tags: None,
            version_macros: vec![],
            new_tag: None,
        };
        manager.load_version_macros(macros);
        tracing::debug!(
            tag = manager.tag,
            macros = manager.version_macros.len(),
            downgrade,
            "loaded version macros"
        );
        Ok(manager)
    }

    /// Restrict listed tags to those with a metadata directory below `meta_dir`
    pub fn with_named_tags(mut self, meta_dir: &Path) -> std::io::Result<Self> {
        let mut named_tags = vec![];
        for entry in std::fs::read_dir(meta_dir)? {
            let entry = entry?;
            if entry.path().join(meta_prop::META_CONFIG_NAME).exists() {
                named_tags.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        self.named_tags = Some(named_tags);
        Ok(self)
    }

    fn load_version_macros(&mut self, mut macros: Vec<Box<dyn UpgradeMacro>>) {
        let downgrade = self.downgrade;
        let first = match self.tag == meta_prop::DEFAULT_VN_DIR {
            true => latest_macro(&macros),
            false => macros.iter().position(|m| match downgrade {
                true => m.after_tag() == self.tag,
                false => m.before_tag() == self.tag,
            }),
        };
        let Some(first) = first else {
            return;
        };
        self.version_macros.push(macros.remove(first));

        while let Some(last) = self.version_macros.last() {
            let next = macros.iter().position(|m| match downgrade {
                true => m.after_tag() == last.before_tag(),
                false => m.before_tag() == last.after_tag(),
            });
            match next {
                Some(next) => self.version_macros.push(macros.remove(next)),
                None => break,
            }
        }
    }

    /// Current tag of the configuration
    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn is_downgrade(&self) -> bool {
        self.downgrade
    }

    /// Tags reachable from the current tag, in order of application
    pub fn get_tags(&self, only_named: bool) -> Vec<&str> {
        self.version_macros
            .iter()
            .map(|m| match self.downgrade {
                true => m.before_tag(),
                false => m.after_tag(),
            })
            .filter(|tag| match (&self.named_tags, only_named) {
                (Some(named_tags), true) => named_tags.iter().any(|named| named == tag),
                _ => true,
            })
            .collect()
    }

    /// Default tag to move to, the furthest one reachable
    pub fn get_new_tag(&self, only_named: bool) -> Option<&str> {
        self.get_tags(only_named).last().copied()
    }

    /// Choose the tag to move to
    pub fn set_new_tag(&mut self, tag: &str) -> Result<(), UpgradeError> {
        if tag == self.tag {
            return Err(UpgradeError::SameVersion(tag.to_string()));
        }
        if !self.get_tags(false).contains(&tag) {
            return Err(UpgradeError::InvalidVersion(tag.to_string()));
        }
        self.new_tag = Some(tag.to_string());
        Ok(())
    }

    /// Display name, `Upgrade_27.2-28.1`
    pub fn name(&self) -> String {
        let new_tag = self.new_tag.as_deref().unwrap_or_default();
        match self.downgrade {
            true => format!("Downgrade_{}-{new_tag}", self.tag),
            false => format!("Upgrade_{}-{new_tag}", self.tag),
        }
    }

    /// Macros leading from the current tag to the new tag
    pub fn get_macros(&self) -> &[Box<dyn UpgradeMacro>] {
        let Some(new_tag) = &self.new_tag else {
            return &[];
        };
        let (prev_tags, next_tags): (Vec<&str>, Vec<&str>) = self
            .version_macros
            .iter()
            .map(|m| match self.downgrade {
                true => (m.after_tag(), m.before_tag()),
                false => (m.before_tag(), m.after_tag()),
            })
            .unzip();
        let start = prev_tags.iter().position(|tag| *tag == self.tag);
        let end = next_tags.iter().position(|tag| tag == new_tag);
        match (start, end) {
            (Some(start), Some(end)) if start <= end => &self.version_macros[start..=end],
            _ => &[],
        }
    }

    /// Apply the macros to `config` and point its `meta` option at the new tag
    pub fn transform(
        &self,
        config: &mut ConfigNode,
        meta_config: &ConfigNode,
    ) -> Result<Vec<MacroReport>, UpgradeError> {
        let new_tag = self.new_tag.as_deref().ok_or(UpgradeError::NoVersions)?;
        let mut reports = vec![];
        for version_macro in self.get_macros() {
            tracing::info!(
                from = version_macro.before_tag(),
                to = version_macro.after_tag(),
                description = version_macro.description(),
                downgrade = self.downgrade,
                "applying version macro"
            );
            let macro_reports = match self.downgrade {
                true => version_macro.downgrade(config, meta_config)?,
                false => version_macro.upgrade(config, meta_config)?,
            };
            reports.extend(macro_reports);
        }

        let new_value = format!("{}/{new_tag}", self.meta_flag_no_tag);
        config.set(&["", meta_prop::CONFIG_OPT_META], new_value.as_str());
        let info = match self.downgrade {
            true => format!("Downgraded from {} to {new_tag}", self.tag),
            false => format!("Upgraded from {} to {new_tag}", self.tag),
        };
        reports.push(MacroReport::new("", Some(meta_prop::CONFIG_OPT_META), Some(&new_value), info));
        Ok(reports)
    }
}

/// Lines listing the tags a configuration can move to
///
/// `= ` marks the current tag and `* ` the default choice.
pub fn version_listing(manager: &MacroUpgradeManager, only_named: bool) -> Vec<String> {
    let indent = " ".repeat(CURRENT_VERSION_MARKER.len());
    let mut lines: Vec<String> = manager
        .get_tags(only_named)
        .into_iter()
        .map(|tag| format!("{indent}{tag}"))
        .collect();
    let current = format!("{CURRENT_VERSION_MARKER}{}", manager.tag());
    if manager.is_downgrade() {
        lines.reverse();
        if let Some(first) = lines.first_mut() {
            *first = format!("{BEST_VERSION_MARKER}{}", first.trim_start());
        }
        lines.push(current);
    } else {
        if let Some(last) = lines.last_mut() {
            *last = format!("{BEST_VERSION_MARKER}{}", last.trim_start());
        }
        lines.insert(0, current);
    }
    lines
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn infos(upgrade: &MacroUpgrade) -> Vec<(String, Option<&str>, &str)> {
        upgrade
            .reports()
            .iter()
            .map(|report| (report.id(), report.value.as_deref(), report.info.as_str()))
            .collect()
    }

    #[test]
    fn add_and_remove() {
        let mut config: ConfigNode = "[namelist:foo(1)]\na=1\n\n[env]\nX(1)=2\n".parse().unwrap();
        let mut upgrade = MacroUpgrade::default();
        let none = SettingOptions::default();

        assert!(upgrade.add_setting(&mut config, &["namelist:bar", "b"], Some("2"), &none).unwrap());
        assert!(!upgrade.add_setting(&mut config, &["namelist:foo"], None, &none).unwrap());
        assert!(!upgrade.add_setting(&mut config, &["env", "X"], Some("3"), &none).unwrap());
        assert!(!upgrade.add_setting(&mut config, &["namelist:bar", "b"], Some("3"), &none).unwrap());
        assert!(upgrade.remove_setting(&mut config, &["namelist:foo(1)"], None));
        assert!(!upgrade.remove_setting(&mut config, &["namelist:foo(1)"], None));

        assert_eq!(
            infos(&upgrade),
            vec![
                ("namelist:bar".to_string(), None, "Added"),
                ("namelist:bar=b".to_string(), Some("2"), "Added with value '2'"),
                (
                    "namelist:foo".to_string(),
                    None,
                    "Warning: cannot add namelist:foo: clash with namelist:foo(1)"
                ),
                ("env=X".to_string(), Some("3"), "Warning: cannot add env=X: clash with env=X(1)"),
                ("namelist:foo(1)=a".to_string(), Some("1"), "Removed"),
                ("namelist:foo(1)".to_string(), Some(""), "Removed"),
            ]
        );
        assert!(upgrade.reports()[2].is_warning);
        assert_eq!(config.dump(), "[env]\nX(1)=2\n\n[namelist:bar]\nb=2\n");
    }

    #[test]
    fn change_and_rename() {
        let mut config: ConfigNode = "[env]\n#note\n!A=1\nB=2\n".parse().unwrap();
        let mut upgrade = MacroUpgrade::default();

        let forced = SettingOptions {
            forced: true,
            ..SettingOptions::default()
        };
        assert!(upgrade.change_setting_value(&mut config, &["env", "B"], "3", &SettingOptions::default()).unwrap());
        assert!(!upgrade.change_setting_value(&mut config, &["env", "C"], "4", &SettingOptions::default()).unwrap());
        assert!(upgrade.change_setting_value(&mut config, &["env", "C"], "4", &forced).unwrap());
        assert!(upgrade.change_setting_value(&mut config, &["env"], "4", &forced).is_err());
        upgrade.rename_setting(&mut config, &["env", "A"], &["env", "Z"], None).unwrap();
        assert!(upgrade.rename_setting(&mut config, &["env"], &["env", "Z"], None).is_err());

        assert_eq!(
            infos(&upgrade),
            vec![
                ("env=B".to_string(), Some("3"), "Value: '2' -> '3'"),
                ("env=C".to_string(), Some("4"), "Added with value '4'"),
                ("env=Z".to_string(), Some("1"), "Renamed env=A -> env=Z"),
                ("env=A".to_string(), Some("1"), "Removed"),
            ]
        );
        let renamed = config.get(&["env", "Z"], false).unwrap();
        assert_eq!(renamed.state, State::UserIgnored);
        assert_eq!(renamed.comments, vec!["note".to_string()]);
        assert_eq!(upgrade.get_setting_value(&config, &["env", "Z"], false), Some("1"));
        assert_eq!(upgrade.get_setting_value(&config, &["env", "Z"], true), None);
    }

    #[test]
    fn rename_section() {
        let mut config: ConfigNode = "[old]\na=1\nb=2\n\n[new]\nc=3\n".parse().unwrap();
        let mut upgrade = MacroUpgrade::default();
        upgrade.rename_setting(&mut config, &["old"], &["new"], None).unwrap();
        assert_eq!(config.dump(), "[new]\na=1\nb=2\n");
    }

    #[test]
    fn states() {
        let mut config: ConfigNode = "[env]\nA=1\n".parse().unwrap();
        let mut upgrade = MacroUpgrade::default();
        assert!(upgrade.ignore_setting(&mut config, &["env", "A"], State::UserIgnored, None));
        assert!(!upgrade.ignore_setting(&mut config, &["env", "A"], State::UserIgnored, None));
        assert!(upgrade.enable_setting(&mut config, &["env", "A"], None));
        assert!(upgrade.ignore_setting(&mut config, &["env"], State::TriggerIgnored, Some("off")));
        assert_eq!(
            infos(&upgrade),
            vec![
                ("env=A".to_string(), Some("1"), "enabled -> user-ignored"),
                ("env=A".to_string(), Some("1"), "user-ignored -> enabled"),
                ("env".to_string(), None, "off"),
            ]
        );
    }

    #[test]
    fn act_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let tag_dir = dir.path().join(RESOURCE_DIR).join("1.0");
        std::fs::create_dir_all(&tag_dir).unwrap();
        std::fs::write(tag_dir.join(RESOURCE_FILE_ADD), "[env]\nNEW=1\n\n[namelist:added]\n").unwrap();
        std::fs::write(tag_dir.join(RESOURCE_FILE_REMOVE), "[env]\nOLD=\n\n[namelist:gone]\n").unwrap();

        let original: ConfigNode = "[env]\nOLD=0\n\n[namelist:gone]\nx=1\n".parse().unwrap();
        let mut config = original.clone();
        let mut upgrade = MacroUpgrade::default();
        upgrade.act_from_files(&mut config, dir.path(), "1.0", false).unwrap();
        assert_eq!(config.dump(), "[env]\nNEW=1\n\n[namelist:added]\n");

        upgrade.act_from_files(&mut config, dir.path(), "1.0", true).unwrap();
        assert_eq!(config.get_value(&["env", "OLD"]), Some(""));
        assert!(config.get(&["namelist:gone"], false).is_some());
        assert!(config.get(&["namelist:added"], false).is_none());
        assert!(config.get(&["env", "NEW"], false).is_none());
    }
}
