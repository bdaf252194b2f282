//! value checks against `type`, `values`, `length`, `pattern` and `range` metadata
use super::rule::{RuleError, RuleEvaluator};
use super::{get_id_from_section_option, get_metadata_for_config_id, MacroReport, Transformer, Validator};
use crate::config::ConfigNode;
use crate::env::{contains_env_var, MatchMode};
use crate::meta_prop;
use crate::meta_type::{meta_type_checker, meta_type_transform, parse_real};
use crate::util::quote_list;
use crate::variable::{array_join, array_split, parse_range_expression, Range, VariableMetadata};
use regex::{Regex, RegexBuilder};
use std::collections::{HashMap, HashSet};

const META_PROPS: [&str; 5] = [
    meta_prop::LENGTH,
    meta_prop::PATTERN,
    meta_prop::RANGE,
    meta_prop::TYPE,
    meta_prop::VALUES,
];

/// A value together with the metadata properties that decide whether it is valid
type GoodnessId = (String, Vec<(String, String)>);

/// Reports values that do not match their metadata
///
/// Results are cached by value and metadata, so repeated values are checked once.
#[derive(Debug, Default)]
pub struct ValueChecker {
    bad_value_meta_map: HashMap<GoodnessId, String>,
    good_value_meta_map: HashSet<GoodnessId>,
    pattern_comp_map: HashMap<String, Option<Regex>>,
    range_func_map: HashMap<String, Result<Range, String>>,
}

impl Validator for ValueChecker {
    fn validate(&mut self, config: &ConfigNode, meta_config: &ConfigNode) -> Vec<MacroReport> {
        let mut reports = vec![];
        for (keys, node) in config.walk::<&str>(&[], true) {
            let Some(value) = node.as_leaf() else {
                continue;
            };
            if contains_env_var(value, MatchMode::Default) {
                continue;
            }
            let var_id = get_id_from_section_option(&keys[0], Some(&keys[1]));
            self.validate_id(&var_id, &keys[0], &keys[1], value, meta_config, &mut reports);
        }
        reports
    }
}

/// Element count from `length` metadata, `None` for `length=:`
fn num_elements(length: Option<&str>) -> Option<usize> {
    match length {
        None => Some(1),
        Some(":") => None,
        Some(length) => Some(length.trim().parse().unwrap_or(1)),
    }
}

impl ValueChecker {
    fn validate_id(
        &mut self,
        var_id: &str,
        sect: &str,
        key: &str,
        value: &str,
        meta_config: &ConfigNode,
        reports: &mut Vec<MacroReport>,
    ) {
        let metadata = get_metadata_for_config_id(var_id, meta_config);
        let mut saved_metadata: Vec<(String, String)> = metadata
            .iter()
            .filter(|(prop, _)| META_PROPS.contains(&prop.as_str()))
            .map(|(prop, value)| (prop.clone(), value.clone()))
            .collect();
        saved_metadata.sort();
        let goodness_id = (value.to_string(), saved_metadata);
        if self.good_value_meta_map.contains(&goodness_id) {
            return;
        }
        if let Some(text) = self.bad_value_meta_map.get(&goodness_id) {
            reports.push(MacroReport::new(sect, Some(key), Some(value), text.clone()));
            return;
        }

        let reports_before = reports.len();
        let bad = |text: String, reports: &mut Vec<MacroReport>, bad_map: &mut HashMap<GoodnessId, String>| {
            bad_map.insert(goodness_id.clone(), text.clone());
            reports.push(MacroReport::new(sect, Some(key), Some(value), text));
        };

        let metadata = VariableMetadata::from(metadata);
        let types = match &metadata.types {
            Some(types) if !types.is_empty() => types.clone(),
            _ => vec![String::new()],
        };

        let mut val_list = vec![value.to_string()];
        let mut num_elements = num_elements(metadata.get(meta_prop::LENGTH));
        if num_elements != Some(1) {
            val_list = array_split(value);
            if let Some(max_elements) = num_elements {
                let max_len = max_elements * types.len();
                if val_list.len() > max_len {
                    let text = format!("Array longer than max length: {} instead of {max_len}", val_list.len());
                    return bad(text, reports, &mut self.bad_value_meta_map);
                } else if val_list.len() % types.len() != 0 {
                    let text = format!("Derived type has an invalid length: {}", val_list.len());
                    return bad(text, reports, &mut self.bad_value_meta_map);
                }
            }
            num_elements = Some(val_list.len());
        }
        let skip_nulls =
            metadata.get(meta_prop::COMPULSORY) != Some(meta_prop::VALUE_TRUE) && num_elements != Some(1);

        if let Some(meta_values) = &metadata.values {
            for val in &val_list {
                if (skip_nulls && val.is_empty()) || meta_values.contains(val) {
                    continue;
                }
                let text = match meta_values.as_slice() {
                    [fixed] => format!("Value {val} should be {fixed}"),
                    _ => format!("Value {val} not in allowed values {}", quote_list(meta_values)),
                };
                bad(text, reports, &mut self.bad_value_meta_map);
                break;
            }
        } else if let Some(meta_types) = &metadata.types {
            if num_elements == Some(1) && meta_types.len() == 1 {
                for val in &val_list {
                    if let Err(text) = meta_type_checker(val, &meta_types[0]) {
                        bad(text, reports, &mut self.bad_value_meta_map);
                    }
                }
            } else {
                if meta_types.len() > 1 {
                    val_list = array_split(value);
                }
                let array_length = num_elements.unwrap_or(val_list.len());
                let type_list = meta_types.iter().cycle().take(meta_types.len() * array_length);
                for (type_name, val) in type_list.zip(&val_list) {
                    if skip_nulls && val.is_empty() {
                        continue;
                    }
                    if let Err(text) = meta_type_checker(val, type_name) {
                        bad(text, reports, &mut self.bad_value_meta_map);
                        break;
                    }
                }
            }
        }

        if let Some(pattern) = metadata.get(meta_prop::PATTERN) {
            let compiled = self.pattern_comp_map.entry(pattern.to_string()).or_insert_with(|| {
                RegexBuilder::new(pattern)
                    .ignore_whitespace(true)
                    .build()
                    .inspect_err(|error| tracing::warn!(%error, pattern, "invalid pattern"))
                    .ok()
            });
            if let Some(compiled) = compiled {
                if !compiled.is_match(value) {
                    let text = format!("Value {value} does not contain the pattern: {pattern}");
                    return bad(text, reports, &mut self.bad_value_meta_map);
                }
            }
        }

        if let Some(range_pat) = metadata.get(meta_prop::RANGE) {
            let text = self.check_range(range_pat, var_id, sect, key, &val_list, &types, skip_nulls, reports);
            if let Some(text) = text {
                return bad(text, reports, &mut self.bad_value_meta_map);
            }
        }

        if reports.len() == reports_before {
            self.good_value_meta_map.insert(goodness_id);
        }
    }

    /// Check numeric values against a range expression, the error is the report message
    ///
    /// Elements of derived types are only checked when their type is numeric.
    #[allow(clippy::too_many_arguments)]
    fn check_range(
        &mut self,
        range_pat: &str,
        var_id: &str,
        sect: &str,
        key: &str,
        val_list: &[String],
        types: &[String],
        skip_nulls: bool,
        reports: &mut Vec<MacroReport>,
    ) -> Option<String> {
        let is_range_complex = range_pat.contains("this");
        let check_func = if is_range_complex {
            None
        } else {
            let check_func = self
                .range_func_map
                .entry(range_pat.to_string())
                .or_insert_with(|| parse_range_expression(range_pat).map_err(|error| error.to_string()));
            match check_func {
                Ok(check_func) => Some(check_func.clone()),
                Err(text) => return Some(text.clone()),
            }
        };

        for (i, val) in val_list.iter().enumerate() {
            if skip_nulls && val.is_empty() {
                continue;
            }
            if types.len() > 1 && !["integer", "real"].contains(&types[i % types.len()].as_str()) {
                continue;
            }
            if let Err(text) = meta_type_checker(val, "real") {
                reports.push(MacroReport::new(sect, Some(key), Some(val.as_str()), text));
                return Some(format!("Value {val} is not in the range criteria: {range_pat}"));
            }

            let check_ok = match &check_func {
                Some(check_func) => parse_real(val).is_some_and(|number| check_func.check(number)),
                None => {
                    let mut tiny_config = ConfigNode::new();
                    tiny_config.set(&[sect, key], val.as_str());
                    match RuleEvaluator.evaluate_rule(range_pat, var_id, &tiny_config, &ConfigNode::new()) {
                        Ok(check_ok) => check_ok,
                        Err(RuleError::Value(_)) => true,
                        Err(error) => return Some(error.to_string()),
                    }
                }
            };
            if !check_ok {
                return Some(format!("Value {val} is not in the range criteria: {range_pat}"));
            }
        }
        None
    }
}

const FIXABLE_TYPES: [&str; 4] = ["boolean", "character", "logical", "quoted"];

/// Fixes values of simple types into their canonical form, `.T.` → `.true.`
#[derive(Debug, Default)]
pub struct TypeFixer;

impl Transformer for TypeFixer {
    fn transform(&mut self, config: &mut ConfigNode, meta_config: &ConfigNode) -> Vec<MacroReport> {
        let mut reports = vec![];
        let type_err_list = ValueChecker::default().validate(config, meta_config);
        for item in type_err_list {
            let Some(opt) = item.option.as_deref() else {
                continue;
            };
            let var_id = get_id_from_section_option(&item.section, Some(opt));
            let metadata = get_metadata_for_config_id(&var_id, meta_config);
            let Some(old_value) = config
                .get(&[item.section.as_str(), opt], false)
                .and_then(ConfigNode::as_leaf)
            else {
                continue;
            };

            let Some(m_type) = metadata
                .get(meta_prop::TYPE)
                .map(String::as_str)
                .filter(|m_type| FIXABLE_TYPES.contains(m_type))
            else {
                continue;
            };
            let fix = |value: &str| meta_type_transform(value, m_type).unwrap_or_else(|| value.to_string());
            let is_array = metadata
                .get(meta_prop::LENGTH)
                .is_some_and(|length| length == ":" || (!length.is_empty() && length.chars().all(|c| c.is_ascii_digit())));
            let value = if is_array {
                let val_list: Vec<String> = array_split(old_value).iter().map(|val| fix(val)).collect();
                array_join(&val_list)
            } else {
                fix(old_value)
            };

            if value != old_value {
                let info = format!("{old_value} -> {value}");
                tracing::debug!(setting = var_id, info, "fixed type");
                config.set(&[item.section.as_str(), opt], value.as_str());
                reports.push(MacroReport::new(&item.section, Some(opt), Some(value.as_str()), info));
            }
        }
        reports
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    const META: &str = r#"
[namelist:nl=int]
type=integer

[namelist:nl=choice]
values=a, b

[namelist:nl=fixed]
values=on

[namelist:nl=pat]
pattern=^ab \d+$

[namelist:nl=ranged]
type=real
range=0:10

[namelist:nl=relative]
range=this > 5

[namelist:nl=array]
type=integer
length=2

[namelist:nl=derived]
type=integer, logical
length=:

[namelist:nl=flag]
type=logical

[namelist:nl=flags]
type=logical
length=:

[namelist:nl=ranges]
type=integer
length=:
range=0:10
"#;

    fn check(config: &str) -> Vec<(String, String)> {
        let config: ConfigNode = config.parse().unwrap();
        let meta: ConfigNode = META.parse().unwrap();
        ValueChecker::default()
            .validate(&config, &meta)
            .into_iter()
            .map(|report| (report.option.unwrap_or_default(), report.info))
            .collect()
    }

    #[test]
    fn valid_values() {
        let config = "[namelist:nl]\nint=3\nchoice=b\nfixed=on\npat=ab12\nranged=2.5\nrelative=7\narray=1,2\nderived=1,.true.,2,.false.\nflag=.false.\nunknown=x\nenv=$HOME\n";
        assert_eq!(check(config), vec![]);
    }

    #[test]
    fn invalid_values() {
        let s = |a: &str, b: &str| (a.to_string(), b.to_string());
        assert_eq!(check("[namelist:nl]\nint=3.5\n"), vec![s("int", "Not an integer: '3.5'")]);
        assert_eq!(
            check("[namelist:nl]\nchoice=c\n"),
            vec![s("choice", "Value c not in allowed values ['a', 'b']")]
        );
        assert_eq!(check("[namelist:nl]\nfixed=off\n"), vec![s("fixed", "Value off should be on")]);
        assert_eq!(
            check("[namelist:nl]\npat=xy1\n"),
            vec![s("pat", r"Value xy1 does not contain the pattern: ^ab \d+$")]
        );
        assert_eq!(
            check("[namelist:nl]\nranged=11\n"),
            vec![s("ranged", "Value 11 is not in the range criteria: 0:10")]
        );
        assert_eq!(
            check("[namelist:nl]\nranges=1,12,3\n"),
            vec![s("ranges", "Value 12 is not in the range criteria: 0:10")]
        );
        assert_eq!(
            check("[namelist:nl]\nrelative=1\n"),
            vec![s("relative", "Value 1 is not in the range criteria: this > 5")]
        );
        assert_eq!(
            check("[namelist:nl]\narray=1,2,3\n"),
            vec![s("array", "Array longer than max length: 3 instead of 2")]
        );
        assert_eq!(
            check("[namelist:nl]\nderived=1,.true.,2\n"),
            vec![s("derived", "Derived type has an invalid length: 3")]
        );
        assert_eq!(
            check("[namelist:nl]\nderived=1,.true.,x,.false.\n"),
            vec![s("derived", "Not an integer: 'x'")]
        );
    }

    #[test]
    fn cached_results() {
        let config: ConfigNode = "[namelist:nl]\nint=x\n\n[namelist:nl(2)]\nint=x\n".parse().unwrap();
        let meta: ConfigNode = META.parse().unwrap();
        let mut checker = ValueChecker::default();
        let reports = checker.validate(&config, &meta);
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].info, reports[1].info);
        assert_eq!(checker.bad_value_meta_map.len(), 1);
        assert_eq!(checker.validate(&config, &meta), reports);
    }

    #[test]
    fn type_fixer() {
        let mut config: ConfigNode = "[namelist:nl]\nflag=.T.\nflags=.t.,.F.\n!int=1\n".parse().unwrap();
        let meta: ConfigNode = META.parse().unwrap();

        let reports = TypeFixer.transform(&mut config, &meta);
        let infos: Vec<&str> = reports.iter().map(|report| report.info.as_str()).collect();
        assert_eq!(infos, vec![".t.,.F. -> .true.,.false.", ".T. -> .true."]);
        assert_eq!(config.get_value(&["namelist:nl", "flag"]), Some(".true."));
        assert!(TypeFixer.transform(&mut config, &meta).is_empty());
    }
}
