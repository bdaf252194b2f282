//! metadata property names
//!
//! A metadata configuration has one section per setting id (`[namelist:foo=bar]`) holding these properties.

pub const COMPULSORY: &str = "compulsory";
pub const COPY_MODE: &str = "copy-mode";
pub const DESCRIPTION: &str = "description";
pub const DUPLICATE: &str = "duplicate";
pub const ELEMENT_TITLES: &str = "element-titles";
pub const FAIL_IF: &str = "fail-if";
pub const HELP: &str = "help";
pub const LENGTH: &str = "length";
pub const MACRO: &str = "macro";
pub const NS: &str = "ns";
pub const PATTERN: &str = "pattern";
pub const RANGE: &str = "range";
pub const SORT_KEY: &str = "sort-key";
pub const TITLE: &str = "title";
pub const TRIGGER: &str = "trigger";
pub const TYPE: &str = "type";
pub const URL: &str = "url";
pub const VALUE_HINTS: &str = "value-hints";
pub const VALUE_TITLES: &str = "value-titles";
pub const VALUES: &str = "values";
pub const WARN_IF: &str = "warn-if";
pub const WIDGET: &str = "widget";

/// Value of a property that is switched on (`compulsory=true`)
pub const VALUE_TRUE: &str = "true";

/// Root option of a configuration naming its metadata (`meta=category/tag`)
pub const CONFIG_OPT_META: &str = "meta";

/// Metadata version meaning "latest"
pub const DEFAULT_VN_DIR: &str = "HEAD";

/// Default index of a duplicate section (`foo(1)`)
pub const SETTING_INDEX_DEFAULT: &str = "1";

/// Separates section and option in a setting id
pub const CONFIG_DELIMITER: char = '=';

/// File name of a metadata configuration
pub const META_CONFIG_NAME: &str = "rose-meta.conf";
