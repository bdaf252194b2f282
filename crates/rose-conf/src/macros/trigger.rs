//! `trigger` metadata: settings that switch other settings on and off
use super::rule::{RuleError, RuleEvaluator, RE_EXPR_IS_THIS_RULE};
use super::{get_id_from_section_option, get_section_option_from_id, strip_id, MacroReport, Transformer, Validator};
use crate::config::{ConfigNode, State};
use crate::env::{contains_env_var, MatchMode};
use crate::meta_prop;
use crate::util::{quote_list, quote_value};
use crate::variable::{parse_trigger_expression, TriggerValues};
use indexmap::{IndexMap, IndexSet};
use std::collections::{HashMap, HashSet, VecDeque};

const ERROR_BAD_EXPR: &str = "Invalid trigger expression";
const ERROR_CYCLIC: &str = "Cyclic dependency detected";
const ERROR_MISSING_METADATA: &str = "No metadata entry found";
const ERROR_DUPL_TRIG: &str = "Badly defined trigger";
const HELP_IGNORED_PARENT: &str = "from state of parent";
const HELP_IGNORED_VALUE: &str = "from parent value";

/// Rule results kept before the cache is cleared
const MAX_RULE_CHECKS: usize = 10_000;
/// Stack iterations after which a trigger family is treated as cyclic
const MAX_STACK_STEPS: usize = 100_000;

fn state_name(state: State) -> &'static str {
    match state {
        State::Normal => "enabled     ",
        State::TriggerIgnored => "trig-ignored",
        State::UserIgnored => "user-ignored",
    }
}

/// Keeps trigger-ignored states consistent with `trigger` metadata
///
/// As a transformer it enables or trigger-ignores every setting involved in a trigger. As a validator it
/// reports badly defined triggers first, then every setting whose state the transform would change.
#[derive(Debug, Default)]
pub struct TriggerMacro {
    /// results of `this` rules by rule and value
    rule_checks: HashMap<(String, String), bool>,
}

/// Trigger relationships of one metadata configuration and their evaluation against a configuration
struct Triggers<'m> {
    meta_config: &'m ConfigNode,
    /// triggered ids and their enabling values, by trigger id
    family_lookup: IndexMap<String, IndexMap<String, TriggerValues>>,
    involved_ids: HashSet<String>,
    /// ids of the parents that enable a setting
    enabled: IndexMap<String, Vec<String>>,
    /// reasons a setting is ignored, by parent id
    ignored: IndexMap<String, IndexMap<String, String>>,
    rule_checks: &'m mut HashMap<(String, String), bool>,
}

/// Sections of `config`, including the root section `""`
fn config_sections(config: &ConfigNode) -> Vec<String> {
    let mut sections: Vec<String> = config
        .as_map()
        .into_iter()
        .flatten()
        .filter(|(_, node)| node.as_map().is_some())
        .map(|(key, _)| key.clone())
        .collect();
    sections.push(String::new());
    sections
}

/// Indexed sections by their name without index
fn duplicate_sections(sections: &[String]) -> IndexMap<String, Vec<String>> {
    let mut dupl_map: IndexMap<String, Vec<String>> = IndexMap::new();
    for section in sections {
        if let Some((base, _)) = section.split_once('(') {
            dupl_map.entry(base.to_string()).or_default().push(section.clone());
        }
    }
    dupl_map
}

fn node_for_id<'c>(config: &'c ConfigNode, setting_id: &str) -> Option<&'c ConfigNode> {
    let (section, option) = get_section_option_from_id(setting_id);
    config.get(&[section, option.unwrap_or_default()], false)
}

fn option_value(config: &ConfigNode, setting_id: &str) -> Option<String> {
    let (_, option) = get_section_option_from_id(setting_id);
    option?;
    node_for_id(config, setting_id)?.as_leaf().map(str::to_string)
}

fn option_names(config: &ConfigNode, section: &str) -> Vec<String> {
    config
        .get(&[section], false)
        .and_then(ConfigNode::as_map)
        .into_iter()
        .flatten()
        .map(|(key, _)| key.clone())
        .collect()
}

/// `true` if the last two occurrences of `child_id` in `id_list` close a repeating sequence
fn is_repeated_sequence(id_list: &[String], child_id: &str) -> bool {
    let reversed: Vec<&String> = id_list.iter().rev().collect();
    let Some(first) = reversed.iter().position(|id| *id == child_id) else {
        return false;
    };
    if first == 0 {
        return true;
    }
    let Some(second) = reversed[first + 1..]
        .iter()
        .position(|id| *id == child_id)
        .map(|pos| pos + first + 1)
    else {
        return false;
    };
    reversed[..first] == reversed[first + 1..second]
}

impl<'m> Triggers<'m> {
    fn new(meta_config: &'m ConfigNode, rule_checks: &'m mut HashMap<(String, String), bool>) -> Self {
        let mut family_lookup = IndexMap::new();
        for (setting_id, sect_node) in meta_config.as_map().into_iter().flatten() {
            if sect_node.is_ignored() || sect_node.as_map().is_none() {
                continue;
            }
            if let Some(expr) = sect_node.get_value(&[meta_prop::TRIGGER]) {
                family_lookup.insert(setting_id.clone(), parse_trigger_expression(expr));
            }
        }
        let involved_ids = family_lookup
            .iter()
            .flat_map(|(trigger_id, family)| std::iter::once(trigger_id).chain(family.keys()))
            .cloned()
            .collect();
        tracing::trace!(triggers = family_lookup.len(), "read trigger metadata");
        Triggers {
            meta_config,
            family_lookup,
            involved_ids,
            enabled: IndexMap::new(),
            ignored: IndexMap::new(),
            rule_checks,
        }
    }

    fn is_id_duplicate(&self, setting_id: &str) -> bool {
        let section = strip_id(get_section_option_from_id(setting_id).0);
        self.meta_config
            .get(&[section.as_str(), meta_prop::DUPLICATE], false)
            .and_then(ConfigNode::as_leaf)
            == Some(meta_prop::VALUE_TRUE)
    }

    /// Metadata id of `setting_id`, without the index of duplicate sections
    fn stripped_id(&self, setting_id: &str) -> String {
        if !self.is_id_duplicate(setting_id) {
            return setting_id.to_string();
        }
        let (section, option) = get_section_option_from_id(setting_id);
        get_id_from_section_option(&strip_id(section), option)
    }

    fn is_trigger(&self, setting_id: &str) -> bool {
        self.family_lookup.contains_key(&self.stripped_id(setting_id))
    }

    /// Ids of `setting_id` in every indexed copy of its duplicate section
    fn id_duplicates(&self, setting_id: &str, dupl_map: &IndexMap<String, Vec<String>>) -> Vec<String> {
        if !self.is_id_duplicate(setting_id) {
            return vec![];
        }
        let (section, option) = get_section_option_from_id(setting_id);
        dupl_map
            .get(section)
            .into_iter()
            .flatten()
            .map(|dupl_section| get_id_from_section_option(dupl_section, option))
            .collect()
    }

    /// Settings triggered by `setting_id` in `config`
    ///
    /// An indexed setting only triggers settings of its own section.
    fn family(&self, setting_id: &str, dupl_map: &IndexMap<String, Vec<String>>) -> IndexMap<String, TriggerValues> {
        if self.is_id_duplicate(setting_id) {
            let (section, option) = get_section_option_from_id(setting_id);
            let base_section = strip_id(section);
            let trigger_id = get_id_from_section_option(&base_section, option);
            return self
                .family_lookup
                .get(&trigger_id)
                .into_iter()
                .flatten()
                .map(|(child_id, vals)| {
                    let (child_section, child_option) = get_section_option_from_id(child_id);
                    let child_id = match strip_id(child_section) == base_section {
                        true => get_id_from_section_option(section, child_option),
                        false => child_id.clone(),
                    };
                    (child_id, vals.clone())
                })
                .collect();
        }

        let mut family = IndexMap::new();
        for (child_id, vals) in self.family_lookup.get(setting_id).into_iter().flatten() {
            let alt_ids = self.id_duplicates(child_id, dupl_map);
            if alt_ids.is_empty() {
                family.insert(child_id.clone(), vals.clone());
            }
            for alt_id in alt_ids {
                family.insert(alt_id, vals.clone());
            }
        }
        family
    }

    /// Trigger and triggered ids, parents ranked before their children
    fn ranked_ids(&self) -> Vec<String> {
        let max_rank = self.involved_ids.len();
        let mut ranks: IndexMap<String, usize> = IndexMap::new();
        let mut stack: VecDeque<(String, usize)> = VecDeque::new();
        for trigger_id in self.family_lookup.keys() {
            ranks.insert(trigger_id.clone(), 0);
            stack.push_back((trigger_id.clone(), 0));
        }
        while let Some((parent_id, rank)) = stack.pop_front() {
            let Some(family) = self.family_lookup.get(&parent_id) else {
                continue;
            };
            for child_id in family.keys() {
                let child_rank = rank + 1;
                let previous = ranks.get(child_id).copied();
                if previous.is_some_and(|previous| previous >= child_rank) {
                    continue;
                }
                ranks.insert(child_id.clone(), child_rank);
                if child_rank <= max_rank {
                    stack.push_back((child_id.clone(), child_rank));
                }
            }
        }
        let mut ranked: Vec<(usize, String)> = ranks.into_iter().map(|(id, rank)| (rank, id)).collect();
        ranked.sort();
        ranked.into_iter().map(|(_, id)| id).collect()
    }

    fn enable(&mut self, child_id: &str, parent_id: &str) {
        let parents = self.enabled.entry(child_id.to_string()).or_default();
        if !parents.iter().any(|id| id == parent_id) {
            parents.push(parent_id.to_string());
        }
        if let Some(reasons) = self.ignored.get_mut(child_id) {
            reasons.shift_remove(parent_id);
            if reasons.is_empty() {
                self.ignored.shift_remove(child_id);
            }
        }
    }

    fn ignore(&mut self, child_id: &str, parent_id: &str, help_text: String) {
        self.ignored
            .entry(child_id.to_string())
            .or_default()
            .insert(parent_id.to_string(), help_text);
        if let Some(parents) = self.enabled.get_mut(child_id) {
            parents.retain(|id| id != parent_id);
        }
    }

    /// Evaluate a `this` rule with `value` as the only setting
    fn evaluate_rule(&mut self, rule: &str, setting_id: &str, value: &str) -> Result<bool, RuleError> {
        let key = (rule.to_string(), value.to_string());
        if let Some(result) = self.rule_checks.get(&key) {
            return Ok(*result);
        }
        let (section, option) = get_section_option_from_id(setting_id);
        let mut tiny_config = ConfigNode::new();
        tiny_config.set(&[section, option.unwrap_or_default()], value);
        let result = RuleEvaluator.evaluate_rule(rule, setting_id, &tiny_config, &ConfigNode::new())?;
        if self.rule_checks.len() > MAX_RULE_CHECKS {
            self.rule_checks.clear();
        }
        self.rule_checks.insert(key, result);
        Ok(result)
    }

    /// `true` if `value` of `setting_id` is one of `vals` or passes one of its `this` rules
    ///
    /// Values containing environment variables are always accepted.
    fn values_ok(&mut self, value: &str, setting_id: &str, vals: &[String]) -> bool {
        for string in vals {
            if RE_EXPR_IS_THIS_RULE.is_match(string) {
                match self.evaluate_rule(string, setting_id, value) {
                    Ok(true) => return true,
                    Ok(false) => {}
                    Err(error) => tracing::debug!(rule = string, %error, "trigger rule failed"),
                }
            } else if string == value {
                return true;
            }
        }
        contains_env_var(value, MatchMode::Default)
    }

    /// Propagate the state of `var_id` to everything it triggers, directly or not
    fn update(&mut self, var_id: &str, config: &ConfigNode) {
        let sections = config_sections(config);
        let dupl_map = duplicate_sections(&sections);
        let alt_ids = self.id_duplicates(var_id, &dupl_map);
        let start_ids = match alt_ids.is_empty() {
            true => vec![var_id.to_string()],
            false => alt_ids,
        };
        let is_triggered = self.family_lookup.values().any(|family| family.contains_key(var_id));

        let mut id_stack: VecDeque<(String, bool)> = VecDeque::new();
        for start_id in start_ids {
            let mut is_ignored = !(self.enabled.contains_key(&start_id) && !self.ignored.contains_key(&start_id));
            if !is_triggered {
                is_ignored = false;
            }
            let (section, option) = get_section_option_from_id(&start_id);
            if self.ignored.contains_key(section) && option.is_some() {
                is_ignored = true;
            }
            is_ignored |= node_for_id(config, &start_id).is_none();
            id_stack.push_back((start_id, is_ignored));
        }

        let mut steps = 0;
        while let Some((front_id, has_ignored_parent)) = id_stack.front().cloned() {
            steps += 1;
            if steps > MAX_STACK_STEPS {
                tracing::warn!(setting = var_id, "trigger update did not settle, giving up");
                return;
            }

            let mut alt_ids = self.id_duplicates(&front_id, &dupl_map);
            let this_id = match alt_ids.is_empty() {
                true => front_id,
                false => alt_ids.remove(0),
            };
            for alt_id in alt_ids {
                id_stack.insert(1, (alt_id, has_ignored_parent));
            }
            if sections.contains(&this_id) {
                for option in option_names(config, &this_id) {
                    let option_id = get_id_from_section_option(&this_id, Some(&option));
                    if self.family_lookup.contains_key(&option_id) {
                        id_stack.insert(1, (option_id, has_ignored_parent));
                    }
                }
            }
            if !self.is_trigger(&this_id) {
                id_stack.pop_front();
                continue;
            }

            let value = match has_ignored_parent {
                true => None,
                false => match get_section_option_from_id(&this_id).1 {
                    None => node_for_id(config, &this_id).map(|_| "True".to_string()),
                    Some(_) => option_value(config, &this_id),
                },
            };
            for (child_id, vals) in self.family(&this_id, &dupl_map) {
                let help_text = match (&value, &vals) {
                    (None, _) => Some(format!("{HELP_IGNORED_PARENT}: {this_id}")),
                    (Some(_), None) => None,
                    (Some(value), Some(vals)) if !self.values_ok(value, &this_id, vals) => {
                        let repr_value = format!("value {value}");
                        Some(match vals.as_slice() {
                            [only] => format!("{HELP_IGNORED_VALUE}: {this_id} is not {} ({repr_value})", quote_value(only)),
                            _ => format!(
                                "{HELP_IGNORED_VALUE}: {this_id} with {repr_value} is not in the allowed values: {}",
                                quote_list(vals)
                            ),
                        })
                    }
                    (Some(_), Some(_)) => None,
                };
                let child_is_ignored = help_text.is_some();
                match help_text {
                    Some(help_text) => self.ignore(&child_id, &this_id, help_text),
                    None => self.enable(&child_id, &this_id),
                }
                id_stack.insert(1, (child_id, child_is_ignored));
            }
            id_stack.pop_front();
        }
    }

    /// Set trigger states throughout `config`, reporting every change
    fn transform(&mut self, config: &mut ConfigNode) -> Vec<MacroReport> {
        self.enabled.clear();
        self.ignored.clear();

        let mut id_list = vec![];
        let mut prev_ignored: IndexMap<String, State> = IndexMap::new();
        for (keys, node) in config.walk::<&str>(&[], false) {
            let var_id = match keys.as_slice() {
                [section] => section.clone(),
                [section, option, ..] => get_id_from_section_option(section, Some(option)),
                [] => continue,
            };
            if node.is_ignored() {
                prev_ignored.insert(var_id.clone(), node.state);
            }
            id_list.push(var_id);
        }

        for var_id in self.ranked_ids() {
            self.update(&var_id, config);
        }

        let mut reports = vec![];
        for var_id in id_list {
            let (section, option) = get_section_option_from_id(&var_id);
            let Some(node) = config.get_mut(&[section, option.unwrap_or_default()]) else {
                continue;
            };
            let prev_state = prev_ignored.get(&var_id).copied();
            let change = if self.ignored.contains_key(&var_id) {
                node.state = State::TriggerIgnored;
                prev_state.is_none().then_some((State::Normal, State::TriggerIgnored))
            } else if prev_state == Some(State::TriggerIgnored) {
                node.state = State::Normal;
                Some((State::TriggerIgnored, State::Normal))
            } else if prev_state == Some(State::UserIgnored) && self.involved_ids.contains(&var_id) {
                node.state = State::Normal;
                Some((State::UserIgnored, State::Normal))
            } else {
                None
            };
            if let Some((old, new)) = change {
                let value = option.and_then(|_| node.as_leaf());
                let info = format!("{} -> {}", state_name(old), state_name(new));
                tracing::debug!(setting = var_id, info, "changed trigger state");
                reports.push(MacroReport::new(section, option, value, info));
            }
        }
        reports
    }

    fn error_report(config: &ConfigNode, setting_id: &str, info: String) -> Vec<MacroReport> {
        let (section, option) = get_section_option_from_id(setting_id);
        let value = option_value(config, setting_id);
        vec![MacroReport::new(section, option, value.as_deref(), info)]
    }

    /// Report triggers that are cyclic, badly formed or refer to settings without metadata
    fn validate_dependencies(&mut self, config: &ConfigNode) -> Vec<MacroReport> {
        let sections: IndexSet<String> = config_sections(config).into_iter().filter(|s| !s.is_empty()).collect();
        let dupl_map = duplicate_sections(&sections.iter().cloned().collect::<Vec<_>>());
        let meta_config = self.meta_config;
        let meta_settings: HashSet<&String> = meta_config
            .as_map()
            .into_iter()
            .flatten()
            .filter(|(_, node)| !node.is_ignored())
            .map(|(key, _)| key)
            .collect();

        let mut allowed_repetitions: HashMap<String, usize> = HashMap::new();
        for (trigger_id, family) in &self.family_lookup {
            allowed_repetitions.entry(trigger_id.clone()).or_default();
            for child_id in family.keys() {
                *allowed_repetitions.entry(child_id.clone()).or_default() += 1;
            }
        }

        let mut trigger_ids: Vec<String> = self.family_lookup.keys().cloned().collect();
        trigger_ids.sort();
        for start_id in trigger_ids {
            let family = self.family(&start_id, &dupl_map);
            let mut triggered_ids: Vec<String> = family.keys().cloned().collect();
            triggered_ids.sort();

            if self.is_id_duplicate(&start_id) {
                let start_section = get_section_option_from_id(&start_id).0;
                let is_outside = triggered_ids
                    .iter()
                    .any(|id| get_section_option_from_id(id).0 != start_section);
                if is_outside {
                    let info = format!("{ERROR_DUPL_TRIG} - {start_section} is 'duplicate'");
                    return Self::error_report(config, &start_id, info);
                }
            }

            for string in family.values().flatten().flatten() {
                if !RE_EXPR_IS_THIS_RULE.is_match(string) {
                    continue;
                }
                match self.evaluate_rule(string, &start_id, "") {
                    Ok(_) | Err(RuleError::Value(_)) => {}
                    Err(_) => return Self::error_report(config, &start_id, format!("{ERROR_BAD_EXPR}: {string}")),
                }
            }

            let mut stack: VecDeque<(String, Vec<String>)> = VecDeque::from([(start_id.clone(), triggered_ids)]);
            let mut id_list: Vec<String> = vec![];
            while let Some((var_id, mut child_ids)) = stack.front().cloned() {
                if id_list.len() > MAX_STACK_STEPS {
                    return Self::error_report(config, &start_id, format!("{ERROR_CYCLIC}: {start_id} to {var_id}"));
                }
                if !meta_settings.contains(&self.stripped_id(&var_id)) {
                    return Self::error_report(config, &var_id, ERROR_MISSING_METADATA.to_string());
                }
                id_list.push(var_id.clone());
                child_ids.sort();
                if sections.contains(&var_id) {
                    for option in option_names(config, &var_id) {
                        let option_id = get_id_from_section_option(&var_id, Some(&option));
                        if self.is_trigger(&option_id) {
                            child_ids.push(option_id);
                        }
                    }
                }
                for child_id in child_ids {
                    if !meta_settings.contains(&self.stripped_id(&child_id)) {
                        return Self::error_report(config, &child_id, ERROR_MISSING_METADATA.to_string());
                    }
                    if let Some(grandchildren) = self.family_lookup.get(&child_id) {
                        let mut grandchildren: Vec<String> = grandchildren.keys().cloned().collect();
                        grandchildren.sort();
                        stack.insert(1, (child_id.clone(), grandchildren));
                        let count = id_list.iter().filter(|id| **id == child_id).count();
                        let allowed = allowed_repetitions.get(&child_id).copied().unwrap_or_default();
                        if count + 1 > allowed && count >= 2 && is_repeated_sequence(&id_list, &child_id) {
                            let info = format!("{ERROR_CYCLIC}: {child_id} to {var_id}");
                            return Self::error_report(config, &var_id, info);
                        }
                    }
                }
                stack.pop_front();
            }
        }
        vec![]
    }
}

impl Transformer for TriggerMacro {
    fn transform(&mut self, config: &mut ConfigNode, meta_config: &ConfigNode) -> Vec<MacroReport> {
        Triggers::new(meta_config, &mut self.rule_checks).transform(config)
    }
}

impl Validator for TriggerMacro {
    fn validate(&mut self, config: &ConfigNode, meta_config: &ConfigNode) -> Vec<MacroReport> {
        let reports = Triggers::new(meta_config, &mut self.rule_checks).validate_dependencies(config);
        if !reports.is_empty() {
            return reports;
        }

        let mut trig_config = config.clone();
        let changes = self.transform(&mut trig_config, meta_config);
        changes
            .into_iter()
            .filter_map(|change| {
                let option = change.option.as_deref();
                let node = trig_config.get(&[change.section.as_str(), option.unwrap_or_default()], false)?;
                let value = option.and_then(|_| node.as_leaf());
                let info = format!("State should be {}", state_name(node.state).trim());
                Some(MacroReport::new(&change.section, option, value, info))
            })
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    const META: &str = r#"
[env=A]
trigger=env=B: 1, 2; env=C: this > 5

[env=B]
trigger=env=D

[env=C]

[env=D]
"#;

    fn summary(reports: &[MacroReport]) -> Vec<(String, Option<&str>, &str)> {
        reports
            .iter()
            .map(|report| (report.id(), report.value.as_deref(), report.info.as_str()))
            .collect()
    }

    #[test]
    fn value_triggers() {
        let meta: ConfigNode = META.parse().unwrap();
        let mut config: ConfigNode = "[env]\nA=1\nB=x\nC=3\nD=4\n".parse().unwrap();

        let reports = TriggerMacro::default().transform(&mut config, &meta);
        assert_eq!(
            summary(&reports),
            vec![("env=C".to_string(), Some("3"), "enabled      -> trig-ignored")]
        );
        assert_eq!(config.get(&["env", "C"], false).unwrap().state, State::TriggerIgnored);
        assert_eq!(config.get(&["env", "D"], false).unwrap().state, State::Normal);

        config.set(&["env", "A"], "6");
        let reports = TriggerMacro::default().transform(&mut config, &meta);
        assert_eq!(
            summary(&reports),
            vec![
                ("env=D".to_string(), Some("4"), "enabled      -> trig-ignored"),
                ("env=C".to_string(), Some("3"), "trig-ignored -> enabled     "),
                ("env=B".to_string(), Some("x"), "enabled      -> trig-ignored"),
            ]
        );
    }

    #[test]
    fn ignored_parents() {
        let meta: ConfigNode = META.parse().unwrap();
        let mut config: ConfigNode = "[env]\nA=2\n!B=x\n!D=4\n".parse().unwrap();

        let reports = TriggerMacro::default().transform(&mut config, &meta);
        assert_eq!(
            summary(&reports),
            vec![
                ("env=D".to_string(), Some("4"), "user-ignored -> enabled     "),
                ("env=B".to_string(), Some("x"), "user-ignored -> enabled     "),
            ]
        );

        let mut config: ConfigNode = "[env]\nB=x\nD=4\n".parse().unwrap();
        let reports = TriggerMacro::default().transform(&mut config, &meta);
        assert_eq!(
            summary(&reports),
            vec![
                ("env=D".to_string(), Some("4"), "enabled      -> trig-ignored"),
                ("env=B".to_string(), Some("x"), "enabled      -> trig-ignored"),
            ]
        );
    }

    #[test]
    fn duplicate_sections_trigger_their_own_options() {
        let meta: ConfigNode =
            "[namelist:dup]\nduplicate=true\n\n[namelist:dup=x]\ntrigger=namelist:dup=y: .true.\n\n[namelist:dup=y]\n"
                .parse()
                .unwrap();
        let mut config: ConfigNode = "[namelist:dup(1)]\nx=.true.\ny=1\n\n[namelist:dup(2)]\nx=.false.\ny=2\n"
            .parse()
            .unwrap();

        let reports = TriggerMacro::default().transform(&mut config, &meta);
        assert_eq!(
            summary(&reports),
            vec![("namelist:dup(2)=y".to_string(), Some("2"), "enabled      -> trig-ignored")]
        );
        assert_eq!(
            config.get(&["namelist:dup(1)", "y"], false).unwrap().state,
            State::Normal
        );
    }

    #[test]
    fn validate_states() {
        let meta: ConfigNode = META.parse().unwrap();
        let config: ConfigNode = "[env]\nA=1\nB=x\nC=3\nD=4\n".parse().unwrap();

        let reports = TriggerMacro::default().validate(&config, &meta);
        assert_eq!(
            summary(&reports),
            vec![("env=C".to_string(), Some("3"), "State should be trig-ignored")]
        );

        let config: ConfigNode = "[env]\nA=1\nB=x\n!!C=3\nD=4\n".parse().unwrap();
        assert_eq!(TriggerMacro::default().validate(&config, &meta), vec![]);
    }

    #[test]
    fn bad_dependencies() {
        let config: ConfigNode = "[env]\nA=1\nB=2\n".parse().unwrap();

        let meta: ConfigNode = "[env=A]\ntrigger=env=B\n\n[env=B]\ntrigger=env=A\n".parse().unwrap();
        let reports = TriggerMacro::default().validate(&config, &meta);
        assert_eq!(
            summary(&reports),
            vec![("env=B".to_string(), Some("2"), "Cyclic dependency detected: env=A to env=B")]
        );

        let meta: ConfigNode = "[env=A]\ntrigger=env=Z\n".parse().unwrap();
        let reports = TriggerMacro::default().validate(&config, &meta);
        assert_eq!(summary(&reports), vec![("env=Z".to_string(), None, ERROR_MISSING_METADATA)]);

        let meta: ConfigNode = "[env=A]\ntrigger=env=B: this >\n\n[env=B]\n".parse().unwrap();
        let reports = TriggerMacro::default().validate(&config, &meta);
        assert_eq!(
            summary(&reports),
            vec![("env=A".to_string(), Some("1"), "Invalid trigger expression: this >")]
        );
    }

    #[test]
    fn repeated_sequences() {
        let ids = |ids: &[&str]| ids.iter().map(|id| id.to_string()).collect::<Vec<_>>();
        assert!(is_repeated_sequence(&ids(&["a", "b", "a", "b"]), "a"));
        assert!(is_repeated_sequence(&ids(&["b", "a"]), "a"));
        assert!(!is_repeated_sequence(&ids(&["a", "c", "a", "b"]), "a"));
    }
}
