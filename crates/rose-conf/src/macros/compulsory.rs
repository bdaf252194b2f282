//! `compulsory=true` settings
use super::{
    get_id_from_section_option, get_metadata_for_config_id, get_section_option_from_id, strip_dupl, strip_id,
    MacroReport, Transformer, Validator,
};
use crate::config::{ConfigNode, State};
use crate::meta_prop;
use crate::variable::get_value_from_metadata;
use indexmap::IndexMap;

pub const WARNING_COMPULSORY_SECT_MISSING: &str = "Section set as compulsory, but not in configuration.";
pub const WARNING_COMPULSORY_OPT_MISSING: &str = "Variable set as compulsory, but not in configuration.";
pub const WARNING_COMPULSORY_USER_IGNORED: &str = "Compulsory settings should not be user-ignored.";

/// Compulsory settings of one configuration section
#[derive(Debug, Clone, PartialEq)]
struct CompulsorySection {
    is_compulsory: bool,
    /// name used when the section is missing, `foo(1)` for duplicate sections
    reported_section: String,
    options: Vec<String>,
}

/// Reports compulsory sections and options that are missing or user-ignored
///
/// Indexed and modified sections (`foo(1)`, `foo{bar}`) count as the section `foo`.
#[derive(Debug, Default)]
pub struct CompulsoryChecker {
    compulsory_data: Option<IndexMap<String, CompulsorySection>>,
}

fn get_compulsory_data(meta_config: &ConfigNode) -> IndexMap<String, CompulsorySection> {
    let mut compulsory_data: IndexMap<String, CompulsorySection> = IndexMap::new();
    let Some(meta_sections) = meta_config.as_map() else {
        return compulsory_data;
    };
    for (setting_id, sect_node) in meta_sections {
        if sect_node.is_ignored() || sect_node.as_map().is_none() {
            continue;
        }
        if sect_node.get_value(&[meta_prop::COMPULSORY]) != Some(meta_prop::VALUE_TRUE) {
            continue;
        }
        let (config_sect, config_opt) = get_section_option_from_id(setting_id);
        let data = compulsory_data
            .entry(config_sect.to_string())
            .or_insert_with(|| CompulsorySection {
                is_compulsory: false,
                reported_section: config_sect.to_string(),
                options: vec![],
            });
        match config_opt {
            None => data.is_compulsory = true,
            Some(config_opt) => data.options.push(config_opt.to_string()),
        }
        if sect_node.get_value(&[meta_prop::DUPLICATE]) == Some(meta_prop::VALUE_TRUE) {
            data.reported_section = format!("{config_sect}({})", meta_prop::SETTING_INDEX_DEFAULT);
        }
    }
    compulsory_data
}

/// Config sections by their basic names, with and without modifier
fn basic_section_aliases(config: &ConfigNode) -> IndexMap<String, Vec<String>> {
    let mut sections: Vec<&str> = config
        .as_map()
        .into_iter()
        .flatten()
        .filter(|(_, node)| node.as_map().is_some())
        .map(|(key, _)| key.as_str())
        .collect();
    if !sections.contains(&"") {
        sections.push("");
    }

    let mut aliases: IndexMap<String, Vec<String>> = IndexMap::new();
    for section in sections {
        let no_modifier = strip_id(section);
        let keep_modifier = strip_dupl(section);
        aliases.entry(no_modifier.clone()).or_default().push(section.to_string());
        if keep_modifier != no_modifier {
            aliases.entry(keep_modifier).or_default().push(section.to_string());
        }
    }
    aliases
}

fn option_names<'c>(config: &'c ConfigNode, section: &str) -> Vec<&'c str> {
    config
        .get(&[section], false)
        .and_then(ConfigNode::as_map)
        .into_iter()
        .flatten()
        .map(|(key, _)| key.as_str())
        .collect()
}

impl Validator for CompulsoryChecker {
    fn validate(&mut self, config: &ConfigNode, meta_config: &ConfigNode) -> Vec<MacroReport> {
        let mut reports = vec![];
        let compulsory_data = self
            .compulsory_data
            .get_or_insert_with(|| get_compulsory_data(meta_config));
        let aliases = basic_section_aliases(config);

        let mut check_user_ignored_ids = vec![];
        for (basic_section, section_data) in compulsory_data.iter() {
            let present_section_aliases: Vec<&String> = aliases
                .get(basic_section)
                .into_iter()
                .flatten()
                .filter(|alias| config.get(&[alias.as_str()], false).is_some())
                .collect();
            if section_data.is_compulsory {
                check_user_ignored_ids.extend(present_section_aliases.iter().map(|alias| alias.to_string()));
            }

            if present_section_aliases.is_empty() {
                if section_data.is_compulsory {
                    reports.push(MacroReport::new(
                        &section_data.reported_section,
                        None,
                        None,
                        WARNING_COMPULSORY_SECT_MISSING,
                    ));
                }
                continue;
            }

            for alias_section in present_section_aliases {
                for option in &section_data.options {
                    let mut present = false;
                    for alias_option in option_names(config, alias_section) {
                        if alias_option == option.as_str()
                            || (alias_option.starts_with(option.as_str()) && strip_dupl(alias_option) == *option)
                        {
                            check_user_ignored_ids.push(get_id_from_section_option(alias_section, Some(alias_option)));
                            present = true;
                        }
                    }
                    if !present {
                        reports.push(MacroReport::new(
                            alias_section,
                            Some(option.as_str()),
                            None,
                            WARNING_COMPULSORY_OPT_MISSING,
                        ));
                    }
                }
            }
        }

        for setting_id in &check_user_ignored_ids {
            let (section, option) = get_section_option_from_id(setting_id);
            let keys = [section, option.unwrap_or_default()];
            let Some(node) = config.get(&keys, false) else {
                continue;
            };
            if node.state == State::UserIgnored {
                let value = option.and_then(|_| node.as_leaf());
                reports.push(MacroReport::new(section, option, value, WARNING_COMPULSORY_USER_IGNORED));
            }
        }
        reports
    }
}

/// Adds compulsory sections and options that are missing
///
/// New options get their default value from metadata. User-ignored compulsory settings are left alone.
#[derive(Debug, Default)]
pub struct CompulsoryChanger;

/// Missing settings reported by `checker`, options ordered after sections
fn missing_settings(
    checker: &mut CompulsoryChecker,
    config: &ConfigNode,
    meta_config: &ConfigNode,
) -> Vec<(String, Option<String>)> {
    let mut missing_sect_opts: Vec<(String, Option<String>)> = checker
        .validate(config, meta_config)
        .into_iter()
        .filter(|report| report.info != WARNING_COMPULSORY_USER_IGNORED)
        .map(|report| (report.section, report.option))
        .collect();
    missing_sect_opts.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
    missing_sect_opts
}

impl Transformer for CompulsoryChanger {
    fn transform(&mut self, config: &mut ConfigNode, meta_config: &ConfigNode) -> Vec<MacroReport> {
        let mut reports = vec![];
        let mut checker = CompulsoryChecker::default();

        for (sect, opt) in missing_settings(&mut checker, config, meta_config) {
            if opt.is_none() && !sect.is_empty() {
                config.set(&[sect.as_str()], IndexMap::new());
                reports.push(MacroReport::new(&sect, None, None, "Added compulsory section"));
            }
        }

        for (sect, opt) in missing_settings(&mut checker, config, meta_config) {
            let Some(opt) = opt else {
                continue;
            };
            let var_id = get_id_from_section_option(&sect, Some(&opt));
            let value = get_value_from_metadata(&get_metadata_for_config_id(&var_id, meta_config));
            tracing::debug!(setting = var_id, value, "adding compulsory option");
            config.set(&[sect.as_str(), opt.as_str()], value.as_str());
            reports.push(MacroReport::new(&sect, Some(opt.as_str()), Some(value.as_str()), "Added compulsory option"));
        }
        reports
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    const META: &str = r#"
[env]
compulsory=true

[env=FOO]
compulsory=true

[namelist:dup]
compulsory=true
duplicate=true

[namelist:dup=x]
compulsory=true
type=integer

[namelist:opt=y]
compulsory=true
values=a, b
"#;

    fn summary(reports: &[MacroReport]) -> Vec<(String, &str)> {
        reports.iter().map(|report| (report.id(), report.info.as_str())).collect()
    }

    #[test]
    fn missing_and_ignored() {
        let config: ConfigNode = "[!env]\nBAR=1\n\n[namelist:dup(2)]\n!x=3\n\n[namelist:opt{mod}]\nz=1\n"
            .parse()
            .unwrap();
        let meta: ConfigNode = META.parse().unwrap();

        let reports = CompulsoryChecker::default().validate(&config, &meta);
        assert_eq!(
            summary(&reports),
            vec![
                ("env=FOO".to_string(), WARNING_COMPULSORY_OPT_MISSING),
                ("namelist:opt{mod}=y".to_string(), WARNING_COMPULSORY_OPT_MISSING),
                ("env".to_string(), WARNING_COMPULSORY_USER_IGNORED),
                ("namelist:dup(2)=x".to_string(), WARNING_COMPULSORY_USER_IGNORED),
            ]
        );
        assert_eq!(reports[3].value.as_deref(), Some("3"));
    }

    #[test]
    fn missing_sections() {
        let meta: ConfigNode = META.parse().unwrap();
        let reports = CompulsoryChecker::default().validate(&ConfigNode::new(), &meta);
        assert_eq!(
            summary(&reports),
            vec![
                ("env".to_string(), WARNING_COMPULSORY_SECT_MISSING),
                ("namelist:dup(1)".to_string(), WARNING_COMPULSORY_SECT_MISSING),
            ]
        );
    }

    #[test]
    fn changer_adds_missing_settings() {
        let mut config: ConfigNode = "[namelist:opt]\n".parse().unwrap();
        let meta: ConfigNode = META.parse().unwrap();

        let reports = CompulsoryChanger.transform(&mut config, &meta);
        assert_eq!(
            summary(&reports),
            vec![
                ("env".to_string(), "Added compulsory section"),
                ("namelist:dup(1)".to_string(), "Added compulsory section"),
                ("env=FOO".to_string(), "Added compulsory option"),
                ("namelist:dup(1)=x".to_string(), "Added compulsory option"),
                ("namelist:opt=y".to_string(), "Added compulsory option"),
            ]
        );
        assert_eq!(config.get_value(&["namelist:dup(1)", "x"]), Some("0"));
        assert_eq!(config.get_value(&["namelist:opt", "y"]), Some("a"));
        assert_eq!(config.get_value(&["env", "FOO"]), Some(""));

        assert_eq!(CompulsoryChanger.transform(&mut config, &meta), vec![]);
    }
}
