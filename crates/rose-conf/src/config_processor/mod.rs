//! config processors
//!
//! A processor turns the part of a merged [ConfigNode] named by an item such as `namelist:foo` into
//! something external. The [ConfigProcessorsManager] picks the processor from the scheme of the item,
//! i.e. the text before the first `:`.
pub mod env;
pub mod namelist;

use crate::config::ConfigNode;
use crate::env::UnboundEnvironmentVariableError;
use indexmap::IndexMap;
use std::fmt::{Display, Formatter};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}: unknown content")]
pub struct UnknownContentError(pub String);

/// What went wrong inside a processor
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessFailure {
    #[error(transparent)]
    UnknownContent(#[from] UnknownContentError),
    #[error(transparent)]
    Unbound(#[from] UnboundEnvironmentVariableError),
}

/// A processor failure attributed to the setting that asked for it
///
/// Renders as `section=key=value: cause`. An unbound variable renders as `section=key: NAME: unbound variable`
/// because the value does not help.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigProcessError {
    pub keys: Vec<String>,
    pub value: Option<String>,
    pub failure: Option<ProcessFailure>,
}

impl ConfigProcessError {
    pub fn new(keys: Vec<String>, value: Option<String>, failure: impl Into<ProcessFailure>) -> Self {
        ConfigProcessError {
            keys,
            value,
            failure: Some(failure.into()),
        }
    }
}

impl Display for ConfigProcessError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let keys = self.keys.join("=");
        if let Some(ProcessFailure::Unbound(UnboundEnvironmentVariableError(name))) = &self.failure {
            return write!(f, "{keys}: {name}: unbound variable");
        }
        f.write_str(&keys)?;
        if let Some(value) = &self.value {
            write!(f, "={value}")?;
        }
        match &self.failure {
            Some(failure) => write!(f, ": {failure}"),
            None => f.write_str(": bad or missing value"),
        }
    }
}

impl std::error::Error for ConfigProcessError {}

/// Where the request to process an item came from
#[derive(Debug, Clone, Copy, Default)]
pub struct Origin<'a> {
    pub keys: &'a [String],
    pub value: Option<&'a str>,
}

impl Origin<'_> {
    fn error(&self, failure: impl Into<ProcessFailure>) -> ConfigProcessError {
        ConfigProcessError::new(self.keys.to_vec(), self.value.map(str::to_string), failure)
    }
}

pub trait ConfigProcessor {
    /// Scheme handled, e.g. `namelist`
    fn scheme(&self) -> &str;

    fn process(&self, config: &ConfigNode, item: &str, origin: Origin<'_>) -> Result<String, ConfigProcessError>;
}

/// Processors by scheme
pub struct ConfigProcessorsManager {
    processors: IndexMap<String, Box<dyn ConfigProcessor>>,
}

impl Default for ConfigProcessorsManager {
    fn default() -> Self {
        let mut manager = ConfigProcessorsManager {
            processors: IndexMap::new(),
        };
        manager.register(Box::new(namelist::NamelistProcessor));
        manager.register(Box::new(env::EnvProcessor));
        manager
    }
}

impl ConfigProcessorsManager {
    /// Add or replace the processor for its scheme
    pub fn register(&mut self, processor: Box<dyn ConfigProcessor>) {
        self.processors.insert(processor.scheme().to_string(), processor);
    }

    pub fn schemes(&self) -> impl Iterator<Item = &str> {
        self.processors.keys().map(String::as_str)
    }

    pub fn process(&self, config: &ConfigNode, item: &str, origin: Origin<'_>) -> Result<String, ConfigProcessError> {
        let scheme = scheme_of(item);
        let Some(processor) = self.processors.get(scheme) else {
            return Err(origin.error(UnknownContentError(scheme.to_string())));
        };
        tracing::debug!(scheme, item, "Processing");
        processor.process(config, item, origin)
    }
}

pub fn scheme_of(item: &str) -> &str {
    item.split_once(':').map_or(item, |(scheme, _)| scheme)
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    struct Shout;

    impl ConfigProcessor for Shout {
        fn scheme(&self) -> &str {
            "shout"
        }

        fn process(&self, config: &ConfigNode, item: &str, origin: Origin<'_>) -> Result<String, ConfigProcessError> {
            let (_, key) = item.split_once(':').unwrap_or((item, ""));
            config
                .get_value(&["", key])
                .map(str::to_uppercase)
                .ok_or_else(|| origin.error(UnknownContentError(item.to_string())))
        }
    }

    #[test]
    fn error_text() {
        let keys = vec!["file:a.nl".to_string(), "source".to_string()];
        let unknown = ConfigProcessError::new(
            keys.clone(),
            Some("namelist:x".to_string()),
            UnknownContentError("namelist:x".to_string()),
        );
        assert_eq!(unknown.to_string(), "file:a.nl=source=namelist:x: namelist:x: unknown content");

        let unbound = ConfigProcessError::new(
            keys.clone(),
            Some("$NOPE".to_string()),
            UnboundEnvironmentVariableError("NOPE".to_string()),
        );
        assert_eq!(unbound.to_string(), "file:a.nl=source: NOPE: unbound variable");

        let bare = ConfigProcessError {
            keys,
            value: None,
            failure: None,
        };
        assert_eq!(bare.to_string(), "file:a.nl=source: bad or missing value");
    }

    #[test]
    fn dispatch_on_scheme() {
        let config: ConfigNode = "greeting=hello\n".parse().unwrap();
        let mut manager = ConfigProcessorsManager::default();
        assert_eq!(manager.schemes().collect::<Vec<_>>(), vec!["namelist", "env"]);

        let err = manager.process(&config, "shout:greeting", Origin::default()).unwrap_err();
        assert_eq!(err.failure, Some(ProcessFailure::from(UnknownContentError("shout".to_string()))));

        manager.register(Box::new(Shout));
        assert_eq!(
            manager.process(&config, "shout:greeting", Origin::default()).unwrap(),
            "HELLO"
        );
    }

    #[test]
    fn scheme() {
        assert_eq!(scheme_of("namelist:foo(1)"), "namelist");
        assert_eq!(scheme_of("env"), "env");
    }
}
