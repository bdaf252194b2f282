//! `namelist:` sections as Fortran namelist groups
use super::{ConfigProcessError, ConfigProcessor, Origin, UnknownContentError};
use crate::config::{sort_settings, ConfigNode};
use crate::env::env_var_process;
use regex::Regex;
use std::sync::LazyLock;

pub const SCHEME: &str = "namelist";
/// Item suffix selecting every indexed section
pub const ALL_INDICES: &str = "(:)";

static RE_GROUP: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\Anamelist:(\w+)").expect("valid regex"));

/// Renders `namelist:foo` as `&foo` ... `/`
///
/// `namelist:foo(:)` renders every `namelist:foo(N)` section in index order. Groups are separated by a blank
/// line. Values have environment variables substituted.
#[derive(Debug, Default)]
pub struct NamelistProcessor;

impl NamelistProcessor {
    fn sections<'c>(config: &'c ConfigNode, item: &str) -> Vec<(&'c str, &'c ConfigNode)> {
        let all = config.as_map().into_iter().flatten();
        let mut sections: Vec<(&str, &ConfigNode)> = match item.strip_suffix(ALL_INDICES) {
            Some(prefix) => {
                let prefix = format!("{prefix}(");
                all.filter(|(name, _)| name.starts_with(&prefix))
                    .map(|(name, node)| (name.as_str(), node))
                    .collect()
            }
            None => all
                .filter(|(name, _)| name.as_str() == item)
                .map(|(name, node)| (name.as_str(), node))
                .collect(),
        };
        sections.retain(|(_, node)| node.as_map().is_some() && !node.is_ignored());
        sections.sort_by(|(a, _), (b, _)| sort_settings(a, b));
        sections
    }

    fn group(section: &str, node: &ConfigNode) -> Result<String, ConfigProcessError> {
        let group = RE_GROUP
            .captures(section)
            .map(|captures| captures[1].to_string())
            .ok_or_else(|| {
                ConfigProcessError::new(vec![section.to_string()], None, UnknownContentError(section.to_string()))
            })?;

        let mut options: Vec<(&String, &str)> = node
            .as_map()
            .into_iter()
            .flatten()
            .filter(|(_, option)| !option.is_ignored())
            .filter_map(|(key, option)| Some((key, option.as_leaf()?)))
            .collect();
        options.sort_by(|(a, _), (b, _)| a.cmp(b));

        let mut ret = format!("&{group}\n");
        for (key, value) in options {
            let value = env_var_process(value, None).map_err(|unbound| {
                ConfigProcessError::new(
                    vec![section.to_string(), key.to_string()],
                    Some(value.to_string()),
                    unbound,
                )
            })?;
            ret.push_str(&format!("{key}={value},\n"));
        }
        ret.push_str("/\n");
        Ok(ret)
    }
}

impl ConfigProcessor for NamelistProcessor {
    fn scheme(&self) -> &str {
        SCHEME
    }

    fn process(&self, config: &ConfigNode, item: &str, origin: Origin<'_>) -> Result<String, ConfigProcessError> {
        let sections = Self::sections(config, item);
        if sections.is_empty() {
            return Err(origin.error(UnknownContentError(item.to_string())));
        }

        let groups = sections
            .into_iter()
            .map(|(section, node)| Self::group(section, node))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(groups.join("\n"))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config_processor::ProcessFailure;
    use pretty_assertions::assert_eq;

    const CONFIG: &str = r#"
[namelist:hello]
name='world'
!shy=1
count=3

[namelist:item(10)]
x=10

[namelist:item(2)]
x=2

[!namelist:item(3)]
x=3

[!!namelist:off(1)]
x=1

[namelist:paths]
root='$ROSE_CONF_TEST_SURELY_UNSET/x'
"#;

    fn config() -> ConfigNode {
        CONFIG.parse().unwrap()
    }

    #[test]
    fn single_group() {
        let text = NamelistProcessor
            .process(&config(), "namelist:hello", Origin::default())
            .unwrap();
        assert_eq!(text, "&hello\ncount=3,\nname='world',\n/\n");
    }

    #[test]
    fn indexed_groups() {
        let text = NamelistProcessor
            .process(&config(), "namelist:item(:)", Origin::default())
            .unwrap();
        assert_eq!(text, "&item\nx=2,\n/\n\n&item\nx=10,\n/\n");
    }

    #[test]
    fn unknown_item() {
        let keys = vec!["file:x.nl".to_string(), "source".to_string()];
        let origin = Origin {
            keys: &keys,
            value: Some("namelist:nope"),
        };
        let err = NamelistProcessor
            .process(&config(), "namelist:nope", origin)
            .unwrap_err();
        assert_eq!(err.to_string(), "file:x.nl=source=namelist:nope: namelist:nope: unknown content");
    }

    #[test]
    fn ignored_sections_are_unknown() {
        let unknown = |item: &str| ProcessFailure::from(UnknownContentError(item.to_string()));

        let err = NamelistProcessor
            .process(&config(), "namelist:item(3)", Origin::default())
            .unwrap_err();
        assert_eq!(err.failure, Some(unknown("namelist:item(3)")));

        let err = NamelistProcessor
            .process(&config(), "namelist:off(:)", Origin::default())
            .unwrap_err();
        assert_eq!(err.failure, Some(unknown("namelist:off(:)")));
    }

    #[test]
    fn unbound_variable() {
        let err = NamelistProcessor
            .process(&config(), "namelist:paths", Origin::default())
            .unwrap_err();
        assert_eq!(err.keys, vec!["namelist:paths", "root"]);
        assert!(matches!(err.failure, Some(ProcessFailure::Unbound(_))));
        assert_eq!(
            err.to_string(),
            "namelist:paths=root: ROSE_CONF_TEST_SURELY_UNSET: unbound variable"
        );
    }
}
