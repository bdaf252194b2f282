//! indexed sections against `duplicate=true` metadata
use super::{get_metadata_for_config_id, strip_dupl, strip_id, MacroReport, Validator};
use crate::config::{sort_settings, ConfigNode};
use crate::meta_prop;
use crate::variable::Metadata;
use std::collections::HashSet;

pub const WARNING_DUPL_SECT_NO_NUM: &str = "incorrect \"duplicate=true\" metadata";

/// Reports sections whose index does not match their `duplicate` metadata
///
/// `[namelist:foo]` with `duplicate=true` is reported, as is `[namelist:foo(1)]` without it. The second case
/// is only reported once per section and only if there is some metadata for the section.
#[derive(Debug, Default)]
pub struct DuplicateChecker;

/// `true` if there is metadata for `basic_section` or any of its options
fn has_metadata(metadata: &Metadata, basic_section: &str, meta_config: &ConfigNode) -> bool {
    if metadata.keys().any(|key| key != "id") {
        return true;
    }
    let option_prefix = format!("{basic_section}{}", meta_prop::CONFIG_DELIMITER);
    meta_config.as_map().into_iter().flatten().any(|(meta_section, meta_node)| {
        !meta_node.is_ignored()
            && meta_node.as_map().is_some()
            && (meta_section == basic_section || meta_section.starts_with(&option_prefix))
    })
}

impl Validator for DuplicateChecker {
    fn validate(&mut self, config: &ConfigNode, meta_config: &ConfigNode) -> Vec<MacroReport> {
        let mut reports = vec![];
        let mut sect_error_no_dupl = HashSet::new();

        let mut sect_keys: Vec<&String> = config.as_map().into_iter().flatten().map(|(key, _)| key).collect();
        sect_keys.sort_by(|a, b| sort_settings(a, b));
        for section in sect_keys {
            if config.get(&[section], false).and_then(ConfigNode::as_map).is_none() {
                continue;
            }
            let metadata = get_metadata_for_config_id(section, meta_config);
            let is_duplicate = metadata.get(meta_prop::DUPLICATE).map(String::as_str) == Some(meta_prop::VALUE_TRUE);
            let mut basic_section = strip_id(section);
            if is_duplicate {
                if basic_section == *section {
                    reports.push(MacroReport::new(section, None, None, WARNING_DUPL_SECT_NO_NUM));
                }
            } else if *section != basic_section && sect_error_no_dupl.insert(basic_section.clone()) {
                let no_index_section = strip_dupl(section);
                if no_index_section != *section {
                    basic_section = no_index_section;
                }
                if has_metadata(&metadata, &basic_section, meta_config) {
                    let warning = format!("{basic_section} requires \"duplicate=true\" metadata");
                    reports.push(MacroReport::new(section, None, None, warning));
                }
            }
        }
        reports
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn duplicate_metadata() {
        let config: ConfigNode =
            "root=1\n\n[namelist:dup]\n\n[namelist:dup(1)]\n\n[namelist:single(1)]\n\n[namelist:single(2)]\n\n[namelist:opts(1)]\n\n[namelist:unknown(1)]\n"
                .parse()
                .unwrap();
        let meta: ConfigNode = "[namelist:dup]\nduplicate=true\n\n[namelist:single]\ntitle=Single\n\n[namelist:opts=a]\ntype=integer\n"
            .parse()
            .unwrap();

        let reports = DuplicateChecker.validate(&config, &meta);
        let infos: Vec<(&str, &str)> = reports
            .iter()
            .map(|report| (report.section.as_str(), report.info.as_str()))
            .collect();
        assert_eq!(
            infos,
            vec![
                ("namelist:dup", WARNING_DUPL_SECT_NO_NUM),
                ("namelist:opts(1)", "namelist:opts requires \"duplicate=true\" metadata"),
                ("namelist:single(1)", "namelist:single requires \"duplicate=true\" metadata"),
            ]
        );
    }
}
