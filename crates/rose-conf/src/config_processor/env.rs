//! the root `[env]` section
use super::{ConfigProcessError, ConfigProcessor, Origin};
use crate::config::ConfigNode;
use crate::env::{env_var_process, expand_user};
use indexmap::IndexMap;

pub const SCHEME: &str = "env";

/// Resolves `[env]` against the process environment without changing it
#[derive(Debug, Default)]
pub struct EnvProcessor;

impl EnvProcessor {
    /// Resolved variables of `[env]`, sorted by name
    ///
    /// A missing or ignored section gives an empty map.
    pub fn environment(&self, config: &ConfigNode) -> Result<IndexMap<String, String>, ConfigProcessError> {
        let home = std::env::var("HOME").ok();
        let mut ret = IndexMap::new();
        let Some(section) = config.get(&[SCHEME], true) else {
            return Ok(ret);
        };

        for (key, node) in section.as_map().into_iter().flatten() {
            if node.is_ignored() {
                continue;
            }
            let Some(value) = node.as_leaf() else {
                continue;
            };
            let processed = env_var_process(value, None).map_err(|unbound| {
                ConfigProcessError::new(
                    vec![SCHEME.to_string(), key.clone()],
                    Some(value.to_string()),
                    unbound,
                )
            })?;
            ret.insert(key.clone(), expand_user(&processed, home.as_deref()));
        }
        ret.sort_keys();
        Ok(ret)
    }
}

impl ConfigProcessor for EnvProcessor {
    fn scheme(&self) -> &str {
        SCHEME
    }

    /// One `NAME=value` line per variable
    fn process(&self, config: &ConfigNode, _item: &str, _origin: Origin<'_>) -> Result<String, ConfigProcessError> {
        Ok(self
            .environment(config)?
            .into_iter()
            .map(|(key, value)| format!("{key}={value}\n"))
            .collect())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn resolve() {
        let config: ConfigNode = "[env]\nZED=last\n!SKIP=1\nFIRST=\\$HOME\nDIR=~/data\n".parse().unwrap();
        let environment = EnvProcessor.environment(&config).unwrap();

        let dir = match std::env::var("HOME") {
            Ok(home) => format!("{home}/data"),
            Err(_) => "~/data".to_string(),
        };
        assert_eq!(
            environment.into_iter().collect::<Vec<_>>(),
            vec![
                ("DIR".to_string(), dir),
                ("FIRST".to_string(), "$HOME".to_string()),
                ("ZED".to_string(), "last".to_string()),
            ]
        );
    }

    #[test]
    fn ignored_section() {
        let config: ConfigNode = "[!env]\nA=1\n".parse().unwrap();
        assert!(EnvProcessor.environment(&config).unwrap().is_empty());
        assert_eq!(EnvProcessor.process(&ConfigNode::new(), "env", Origin::default()).unwrap(), "");
    }

    #[test]
    fn unbound() {
        let config: ConfigNode = "[env]\nA=${ROSE_CONF_TEST_SURELY_UNSET}\n".parse().unwrap();
        let err = EnvProcessor.environment(&config).unwrap_err();
        assert_eq!(err.to_string(), "env=A: ROSE_CONF_TEST_SURELY_UNSET: unbound variable");
    }
}
