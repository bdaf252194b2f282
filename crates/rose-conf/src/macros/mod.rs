//! configuration macros
//!
//! A macro checks or changes a configuration against its metadata configuration:
//! - a [Validator] never changes the configuration, it returns a report per problem
//! - a [Transformer] changes the configuration in place, it returns a report per change
//! - a [Reporter] writes free form output
//!
//! Macros are looked up by name in a [MacroRegistry] and run through a [MacroManager], which keeps one instance
//! of every macro it ran. Instances carry caches, so a manager is bound to a single metadata configuration.
//!
//! ```
//! use rose_conf::config::ConfigNode;
//! use rose_conf::macros::{MacroManager, MacroRegistry};
//!
//! let config: ConfigNode = "[env]\nFOO=1\n".parse().unwrap();
//! let meta: ConfigNode = "[env=BAR]\ncompulsory=true\n".parse().unwrap();
//!
//! let registry = MacroRegistry::with_builtins();
//! let mut manager = MacroManager::new(&registry, meta);
//! let reports = manager.validate("compulsory.CompulsoryChecker", &config).unwrap();
//! assert_eq!(reports[0].info, "Variable set as compulsory, but not in configuration.");
//! ```
pub mod compulsory;
pub mod duplicate;
pub mod rule;
pub mod trigger;
pub mod value;

use crate::config::{sort_settings, ConfigNode};
use crate::meta_prop;
use crate::util::or_none;
use crate::variable::Metadata;
use indexmap::IndexMap;
use regex::Regex;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::LazyLock;

static RE_MODIFIER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{.+\}").expect("valid regex"));
static RE_ID_STRIP_DUPL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\([^()]+\)").expect("valid regex"));
static RE_ID_STRIP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:\{.+\})?(?:\([^()]+\))?$").expect("valid regex"));
static RE_ID_SINGLE_ELEMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\((\d+)\)$").expect("valid regex"));

/// One problem found, or one change made, by a macro
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct MacroReport {
    pub section: String,
    pub option: Option<String>,
    pub value: Option<String>,
    pub info: String,
    pub is_warning: bool,
}

impl MacroReport {
    pub fn new(section: impl Into<String>, option: Option<&str>, value: Option<&str>, info: impl Into<String>) -> Self {
        Self {
            section: section.into(),
            option: option.map(str::to_string),
            value: value.map(str::to_string),
            info: info.into(),
            is_warning: false,
        }
    }

    pub fn warning(self) -> Self {
        Self {
            is_warning: true,
            ..self
        }
    }

    pub fn id(&self) -> String {
        get_id_from_section_option(&self.section, self.option.as_deref())
    }
}

/// Checks a configuration without changing it
pub trait Validator {
    fn validate(&mut self, config: &ConfigNode, meta_config: &ConfigNode) -> Vec<MacroReport>;
}

/// Changes a configuration, reporting each change
pub trait Transformer {
    fn transform(&mut self, config: &mut ConfigNode, meta_config: &ConfigNode) -> Vec<MacroReport>;
}

/// Writes information about a configuration
pub trait Reporter {
    fn report(
        &mut self,
        config: &ConfigNode,
        meta_config: &ConfigNode,
        out: &mut dyn std::io::Write,
    ) -> std::io::Result<()>;
}

// blanket impls for closures
impl<F> Validator for F
where
    F: FnMut(&ConfigNode, &ConfigNode) -> Vec<MacroReport>,
{
    fn validate(&mut self, config: &ConfigNode, meta_config: &ConfigNode) -> Vec<MacroReport> {
        self(config, meta_config)
    }
}

impl<F> Transformer for F
where
    F: FnMut(&mut ConfigNode, &ConfigNode) -> Vec<MacroReport>,
{
    fn transform(&mut self, config: &mut ConfigNode, meta_config: &ConfigNode) -> Vec<MacroReport> {
        self(config, meta_config)
    }
}

impl<F> Reporter for F
where
    F: FnMut(&ConfigNode, &ConfigNode, &mut dyn std::io::Write) -> std::io::Result<()>,
{
    fn report(
        &mut self,
        config: &ConfigNode,
        meta_config: &ConfigNode,
        out: &mut dyn std::io::Write,
    ) -> std::io::Result<()> {
        self(config, meta_config, out)
    }
}

/// `namelist:foo=bar` → (`namelist:foo`, `Some("bar")`)
pub fn get_section_option_from_id(var_id: &str) -> (&str, Option<&str>) {
    match var_id.split_once(meta_prop::CONFIG_DELIMITER) {
        Some((section, option)) => (section, Some(option)),
        None => (var_id, None),
    }
}

pub fn get_id_from_section_option(section: &str, option: Option<&str>) -> String {
    match option {
        Some(option) => format!("{section}{}{option}", meta_prop::CONFIG_DELIMITER),
        None => section.to_string(),
    }
}

/// Drop a trailing modifier and index: `namelist:foo{bar}(2)` → `namelist:foo`
pub fn strip_id(id: &str) -> String {
    RE_ID_STRIP.replace(id, "").into_owned()
}

/// Drop all indices: `namelist:foo(2)=bar(1)` → `namelist:foo=bar`
pub fn strip_dupl(id: &str) -> String {
    RE_ID_STRIP_DUPL.replace_all(id, "").into_owned()
}

/// Non-ignored properties of the metadata section `id`
fn metadata_of(meta_config: &ConfigNode, id: &str, metadata: &mut Metadata) -> bool {
    let Some(map) = meta_config.get(&[id], true).and_then(ConfigNode::as_map) else {
        return false;
    };
    for (opt, opt_node) in map {
        if let (false, Some(value)) = (opt_node.is_ignored(), opt_node.as_leaf()) {
            metadata.insert(opt.clone(), value.to_string());
        }
    }
    true
}

/// Metadata properties for a setting id
///
/// Indexed settings (`namelist:foo(2)`, `foo=bar(3)`) share the metadata of their base id, modified settings
/// (`namelist:foo{mod}`) add their own metadata on top of the unmodified id. The result always contains `id`.
///
/// ```
/// use rose_conf::config::ConfigNode;
/// use rose_conf::macros::get_metadata_for_config_id;
///
/// let meta: ConfigNode = "[foo=bar]\nvalues=1,2,3\ntitle=Bar\n".parse().unwrap();
/// let metadata = get_metadata_for_config_id("foo=bar(2)", &meta);
/// assert_eq!(metadata["values"], "1,2,3");
/// assert_eq!(metadata["title"], "Bar (2)");
/// assert_eq!(metadata["id"], "foo=bar(2)");
/// ```
pub fn get_metadata_for_config_id(setting_id: &str, meta_config: &ConfigNode) -> Metadata {
    let mut metadata = Metadata::new();
    let option = get_section_option_from_id(setting_id).1;
    let search_option = option.map(strip_dupl);
    let search_id = strip_dupl(setting_id);
    let no_modifier_id = RE_MODIFIER.replace_all(&search_id, "").into_owned();

    if no_modifier_id != search_id && metadata_of(meta_config, &no_modifier_id, &mut metadata) {
        if option.is_none() {
            if let Some(title) = metadata.get_mut(meta_prop::TITLE) {
                let modifier = search_id.replace(&no_modifier_id, "");
                title.push(' ');
                title.push_str(&modifier);
            }
        }
        // foo{bar}(1) cannot inherit duplicate from foo
        if setting_id != search_id {
            metadata.shift_remove(meta_prop::DUPLICATE);
        }
    }
    metadata_of(meta_config, &search_id, &mut metadata);

    match (option, &search_option) {
        (None, _) if search_id != setting_id => {
            metadata.shift_remove(meta_prop::TITLE);
        }
        (Some(option), Some(search_option)) if option != search_option => {
            if let Some(title) = metadata.get_mut(meta_prop::TITLE) {
                title.push(' ');
                title.push_str(&option.replace(search_option.as_str(), ""));
            }
            // a single element of an array, not a slice
            if RE_ID_SINGLE_ELEMENT.is_match(option) {
                metadata.shift_remove(meta_prop::LENGTH);
            }
        }
        _ => {}
    }
    metadata.insert("id".to_string(), setting_id.to_string());
    metadata
}

/// Order of reports within the output of one macro: by setting id, then value
pub fn sort_reports(reports: &mut [MacroReport]) {
    reports.sort_by(|a, b| {
        let (id_a, id_b) = (a.id(), b.id());
        if id_a == id_b {
            a.value.cmp(&b.value)
        } else {
            sort_settings(&id_a, &id_b)
        }
    });
}

/// Order of reports for display: by section, then option
pub fn report_sort(a: &MacroReport, b: &MacroReport) -> Ordering {
    if a.section != b.section {
        return sort_settings(&a.section, &b.section);
    }
    match (&a.option, &b.option) {
        (Some(opt_a), Some(opt_b)) => sort_settings(opt_a, opt_b),
        (opt_a, opt_b) => or_none(opt_a.as_deref()).cmp(or_none(opt_b.as_deref())),
    }
}

/// How a macro is run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum MacroMethod {
    Validate,
    Transform,
    Report,
}

impl MacroMethod {
    /// `[V] name`
    pub fn macro_id(&self, name: &str) -> String {
        let letter = match self {
            MacroMethod::Validate => 'V',
            MacroMethod::Transform => 'T',
            MacroMethod::Report => 'R',
        };
        format!("[{letter}] {name}")
    }
}

/// Render the reports of one macro
///
/// ```text
/// [V] value.ValueChecker: issues: 1
///     env=FOO=x
///         Not an integer: 'x'
/// ```
pub fn get_reports_as_text(reports: &[MacroReport], macro_id: &str, is_from_transform: bool) -> String {
    let (warnings, issues): (Vec<&MacroReport>, Vec<&MacroReport>) =
        reports.iter().partition(|report| report.is_warning);

    let mut text = if is_from_transform {
        format!("{macro_id}: changes: {}\n", issues.len())
    } else {
        format!("{macro_id}: issues: {}\n", issues.len())
    };
    let entry = |report: &MacroReport| {
        format!(
            "    {}={}={}\n        {}\n",
            report.section,
            or_none(report.option.as_deref()),
            or_none(report.value.as_deref()),
            report.info
        )
    };
    text.extend(issues.iter().map(|report| entry(report)));
    if !warnings.is_empty() {
        text.push_str(&format!("{macro_id}: warnings: {}\n", warnings.len()));
        text.extend(warnings.iter().map(|report| entry(report)));
    }
    text
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("Error: could not find macro {0}")]
pub struct MacroNotFoundError(pub String);

/// Runs several validators as one, reports sorted per validator
pub struct MacroValidatorCollection(pub Vec<Box<dyn Validator>>);

impl Validator for MacroValidatorCollection {
    fn validate(&mut self, config: &ConfigNode, meta_config: &ConfigNode) -> Vec<MacroReport> {
        let mut reports = vec![];
        for macro_inst in &mut self.0 {
            let mut macro_reports = macro_inst.validate(config, meta_config);
            sort_reports(&mut macro_reports);
            reports.extend(macro_reports);
        }
        reports
    }
}

/// Runs several transformers in turn, reports sorted per transformer
pub struct MacroTransformerCollection(pub Vec<Box<dyn Transformer>>);

impl Transformer for MacroTransformerCollection {
    fn transform(&mut self, config: &mut ConfigNode, meta_config: &ConfigNode) -> Vec<MacroReport> {
        let mut reports = vec![];
        for macro_inst in &mut self.0 {
            let mut macro_reports = macro_inst.transform(config, meta_config);
            sort_reports(&mut macro_reports);
            reports.extend(macro_reports);
        }
        reports
    }
}

/// Built-in checks: compulsory, duplicate, rule, trigger and value
pub fn default_validators() -> MacroValidatorCollection {
    MacroValidatorCollection(vec![
        Box::new(compulsory::CompulsoryChecker::default()),
        Box::new(duplicate::DuplicateChecker),
        Box::new(rule::FailureRuleChecker),
        Box::new(trigger::TriggerMacro::default()),
        Box::new(value::ValueChecker::default()),
    ])
}

/// Built-in fixers: compulsory, trigger and type
pub fn default_transforms() -> MacroTransformerCollection {
    MacroTransformerCollection(vec![
        Box::new(compulsory::CompulsoryChanger::default()),
        Box::new(trigger::TriggerMacro::default()),
        Box::new(value::TypeFixer::default()),
    ])
}

type Factory<T> = Box<dyn Fn() -> Box<T>>;

/// Macro factories by name
#[derive(Default)]
pub struct MacroRegistry {
    validators: IndexMap<String, Factory<dyn Validator>>,
    transformers: IndexMap<String, Factory<dyn Transformer>>,
    reporters: IndexMap<String, Factory<dyn Reporter>>,
}

impl MacroRegistry {
    /// Registry holding the built-in macros
    pub fn with_builtins() -> Self {
        let mut registry = Self::default();
        registry.register_validator("DefaultValidators", || Box::new(default_validators()));
        registry.register_transformer("DefaultTransforms", || Box::new(default_transforms()));
        registry.register_validator("compulsory.CompulsoryChecker", || {
            Box::new(compulsory::CompulsoryChecker::default())
        });
        registry.register_transformer("compulsory.CompulsoryChanger", || {
            Box::new(compulsory::CompulsoryChanger::default())
        });
        registry.register_validator("duplicate.DuplicateChecker", || {
            Box::new(duplicate::DuplicateChecker)
        });
        registry.register_validator("rule.FailureRuleChecker", || Box::new(rule::FailureRuleChecker));
        registry.register_validator("trigger.TriggerMacro", || Box::new(trigger::TriggerMacro::default()));
        registry.register_transformer("trigger.TriggerMacro", || Box::new(trigger::TriggerMacro::default()));
        registry.register_validator("value.ValueChecker", || Box::new(value::ValueChecker::default()));
        registry.register_transformer("value.TypeFixer", || Box::new(value::TypeFixer::default()));
        registry
    }

    pub fn register_validator(&mut self, name: &str, factory: impl Fn() -> Box<dyn Validator> + 'static) {
        self.validators.insert(name.to_string(), Box::new(factory));
    }

    pub fn register_transformer(&mut self, name: &str, factory: impl Fn() -> Box<dyn Transformer> + 'static) {
        self.transformers.insert(name.to_string(), Box::new(factory));
    }

    pub fn register_reporter(&mut self, name: &str, factory: impl Fn() -> Box<dyn Reporter> + 'static) {
        self.reporters.insert(name.to_string(), Box::new(factory));
    }

    /// Registered names with their methods, in registration order
    pub fn names(&self) -> Vec<(MacroMethod, &str)> {
        let validators = self.validators.keys().map(|name| (MacroMethod::Validate, name.as_str()));
        let transformers = self.transformers.keys().map(|name| (MacroMethod::Transform, name.as_str()));
        let reporters = self.reporters.keys().map(|name| (MacroMethod::Report, name.as_str()));
        validators.chain(transformers).chain(reporters).collect()
    }
}

/// Runs macros by name against one metadata configuration
///
/// Each macro is instantiated on first use and kept for later runs.
pub struct MacroManager<'r> {
    registry: &'r MacroRegistry,
    meta_config: ConfigNode,
    validators: HashMap<String, Box<dyn Validator>>,
    transformers: HashMap<String, Box<dyn Transformer>>,
    reporters: HashMap<String, Box<dyn Reporter>>,
}

/// Instance of `name`, created from `factories` on first use
fn instance<'m, T: ?Sized>(
    instances: &'m mut HashMap<String, Box<T>>,
    factories: &IndexMap<String, Factory<T>>,
    name: &str,
) -> Result<&'m mut Box<T>, MacroNotFoundError> {
    if !instances.contains_key(name) {
        let factory = factories
            .get(name)
            .ok_or_else(|| MacroNotFoundError(name.to_string()))?;
        tracing::debug!(name, "loading macro");
        instances.insert(name.to_string(), factory());
    }
    instances
        .get_mut(name)
        .ok_or_else(|| MacroNotFoundError(name.to_string()))
}

impl<'r> MacroManager<'r> {
    pub fn new(registry: &'r MacroRegistry, meta_config: ConfigNode) -> Self {
        Self {
            registry,
            meta_config,
            validators: HashMap::new(),
            transformers: HashMap::new(),
            reporters: HashMap::new(),
        }
    }

    pub fn meta_config(&self) -> &ConfigNode {
        &self.meta_config
    }

    /// Run the validator `name`, reports in display order
    pub fn validate(&mut self, name: &str, config: &ConfigNode) -> Result<Vec<MacroReport>, MacroNotFoundError> {
        let validator = instance(&mut self.validators, &self.registry.validators, name)?;
        let mut reports = validator.validate(config, &self.meta_config);
        reports.sort_by(report_sort);
        tracing::info!(name, reports = reports.len(), "validated");
        Ok(reports)
    }

    /// Run the transformer `name` on `config`
    pub fn transform(&mut self, name: &str, config: &mut ConfigNode) -> Result<Vec<MacroReport>, MacroNotFoundError> {
        let transformer = instance(&mut self.transformers, &self.registry.transformers, name)?;
        let reports = transformer.transform(config, &self.meta_config);
        tracing::info!(name, changes = reports.len(), "transformed");
        Ok(reports)
    }

    pub fn report(
        &mut self,
        name: &str,
        config: &ConfigNode,
        out: &mut dyn std::io::Write,
    ) -> anyhow::Result<()> {
        let reporter = instance(&mut self.reporters, &self.registry.reporters, name)?;
        reporter.report(config, &self.meta_config, out)?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn ids() {
        assert_eq!(get_section_option_from_id("env=FOO=1"), ("env", Some("FOO=1")));
        assert_eq!(get_section_option_from_id("env"), ("env", None));
        assert_eq!(get_id_from_section_option("env", Some("FOO")), "env=FOO");
        assert_eq!(strip_id("namelist:foo{bar}(2)"), "namelist:foo");
        assert_eq!(strip_id("namelist:foo(2)"), "namelist:foo");
        assert_eq!(strip_dupl("namelist:foo(2)=bar(1)"), "namelist:foo=bar");
    }

    #[test]
    fn metadata_for_config_id() {
        let meta: ConfigNode = "[namelist:foo]\ntitle=Foo\nduplicate=true\n\n[namelist:foo=bar]\nlength=:\ntitle=Bar\n!help=ignored\n\n[namelist:foo{mod}]\ndescription=modified\n"
            .parse()
            .unwrap();

        let metadata = get_metadata_for_config_id("namelist:foo(3)", &meta);
        assert_eq!(
            metadata,
            Metadata::from_iter([
                ("duplicate".to_string(), "true".to_string()),
                ("id".to_string(), "namelist:foo(3)".to_string()),
            ])
        );

        let metadata = get_metadata_for_config_id("namelist:foo=bar(2)", &meta);
        assert_eq!(metadata.get("title").map(String::as_str), Some("Bar (2)"));
        assert_eq!(metadata.get("length"), None);
        assert_eq!(metadata.get("help"), None);

        let metadata = get_metadata_for_config_id("namelist:foo{mod}", &meta);
        assert_eq!(metadata.get("title").map(String::as_str), Some("Foo {mod}"));
        assert_eq!(metadata.get("description").map(String::as_str), Some("modified"));
        assert_eq!(metadata.get("duplicate").map(String::as_str), Some("true"));

        let metadata = get_metadata_for_config_id("namelist:foo{mod}(1)", &meta);
        assert_eq!(metadata.get("duplicate"), None);
    }

    #[test]
    fn reports_as_text() {
        let reports = vec![
            MacroReport::new("env", Some("FOO"), Some("1"), "bad"),
            MacroReport::new("env", None, None, "odd").warning(),
        ];
        assert_eq!(
            get_reports_as_text(&reports, &MacroMethod::Validate.macro_id("x.Y"), false),
            "[V] x.Y: issues: 1\n    env=FOO=1\n        bad\n[V] x.Y: warnings: 1\n    env=None=None\n        odd\n"
        );
        assert_eq!(get_reports_as_text(&[], "[T] x.Z", true), "[T] x.Z: changes: 0\n");
    }

    #[test]
    fn report_order() {
        let mut reports = vec![
            MacroReport::new("namelist:foo(10)", None, None, ""),
            MacroReport::new("namelist:foo(2)", None, Some("2"), ""),
            MacroReport::new("namelist:foo(2)", None, Some("1"), ""),
            MacroReport::new("env", None, None, ""),
        ];
        sort_reports(&mut reports);
        let order: Vec<(String, Option<String>)> = reports.iter().map(|r| (r.id(), r.value.clone())).collect();
        assert_eq!(
            order,
            vec![
                ("env".to_string(), None),
                ("namelist:foo(2)".to_string(), Some("1".to_string())),
                ("namelist:foo(2)".to_string(), Some("2".to_string())),
                ("namelist:foo(10)".to_string(), None),
            ]
        );
    }

    #[test]
    fn manager() {
        let mut registry = MacroRegistry::with_builtins();
        let mut runs = 0;
        registry.register_validator("custom.Counter", move || {
            Box::new(move |config: &ConfigNode, _: &ConfigNode| {
                runs += 1;
                vec![MacroReport::new("", None, None, format!("{runs} {}", config.is_empty()))]
            })
        });
        registry.register_reporter("custom.Dump", || {
            Box::new(|config: &ConfigNode, _: &ConfigNode, out: &mut dyn std::io::Write| {
                write!(out, "{}", config.dump())
            })
        });

        let config = ConfigNode::new();
        let mut manager = MacroManager::new(&registry, ConfigNode::new());
        assert_eq!(manager.validate("custom.Counter", &config).unwrap()[0].info, "1 true");
        assert_eq!(manager.validate("custom.Counter", &config).unwrap()[0].info, "2 true");
        assert_eq!(
            manager.validate("custom.Missing", &config),
            Err(MacroNotFoundError("custom.Missing".to_string()))
        );

        let mut out = vec![];
        manager.report("custom.Dump", &config, &mut out).unwrap();
        assert!(out.is_empty());

        assert!(registry
            .names()
            .contains(&(MacroMethod::Transform, "trigger.TriggerMacro")));
    }
}
