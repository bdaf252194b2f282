//! # rose-conf - configuration trees, macros and processors
//!
//! ## Introduction for developers
//!
//! Read this to understand how `rose-conf` works internally.
//!
//! ### Configuration terms
//!
//! A configuration file is a list of settings:
//! - an `option` is a `key=value` line, at the root or inside a section
//! - a `section` starts with `[name]` and holds options
//! - a leading `!` marks a setting as ignored by the user, `!!` as ignored by a trigger
//! - `#` lines are comments attached to the following setting
//!
//! ```text
//! # a comment on the root
//! meta=my-app/HEAD
//!
//! [env]
//! # a comment on FOO
//! FOO=1
//! !BAR=ignored
//!
//! [namelist:items(1)]
//! size=2
//! ```
//!
//! A setting is addressed by its id, `section=option` (`env=FOO`), or by its key path (`["env", "FOO"]`).
//! `(1)` is the index of a duplicated section. `{mod}` is a modifier, used by metadata only.
//!
//! ### Loading
//!
//! [config::ConfigNode] is the tree of one file. [config_tree::ConfigTreeLoader] loads a directory and the
//! directories it imports (`import=...`) and merges them in the order computed by [c3::mro].
//!
//! ### Metadata and macros
//!
//! A metadata configuration (`rose-meta.conf`) has one section per setting id describing its type, allowed
//! values, rules and triggers. [macros] check (validate) or fix (transform) a configuration against it.
//! [upgrade] moves a configuration between versions of its metadata.
//!
//! ### Processing
//!
//! [config_processor] turns parts of a configuration into external formats, e.g. Fortran namelists.

pub mod c3;
pub mod config;
pub mod config_processor;
pub mod config_tree;
pub mod env;
pub mod macros;
pub mod meta_prop;
pub mod meta_type;
pub mod upgrade;
pub mod util;
pub mod variable;
