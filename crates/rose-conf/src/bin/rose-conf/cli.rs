//! rose-conf cli interface

use clap::{Parser, Subcommand, ValueEnum};
use std::fmt::Formatter;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Change the work directory
    ///
    /// Can be specified multiple times. Note that all
    /// paths on the way to the final path must exist.
    ///
    /// This is equivalent to running { cd <directory>; rose-conf ... }
    #[clap(short = 'C', long = "directory", global(true))]
    pub directory: Vec<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load a configuration directory with its imports and print the result
    Tree(TreeCommand),

    /// Run validator or transformer macros against metadata
    Macro(MacroCommand),

    /// Render an item such as `namelist:foo` or `namelist:foo(:)`
    Process(ProcessCommand),

    /// List versions of the metadata, or upgrade/downgrade to one
    Upgrade(UpgradeCommand),
}

#[derive(Parser, Debug)]
pub struct TreeCommand {
    #[clap(flatten)]
    pub input: InputArgs,

    #[clap(flatten)]
    pub output: OutputArgs,

    /// Keep ignored settings out of the result
    #[clap(long = "no-ignore")]
    pub no_ignore: bool,

    /// Print where each auxiliary file comes from instead of the settings
    #[clap(long = "files")]
    pub files: bool,
}

#[derive(Parser, Debug)]
pub struct InputArgs {
    /// Configuration directory
    pub conf_dir: PathBuf,

    /// Name of the configuration file in each directory
    #[clap(long = "conf-name", default_value = "rose-app.conf")]
    pub conf_name: String,

    /// Directory to search for imported configuration directories
    ///
    /// Can be specified multiple times.
    #[clap(short = 'p', long = "path")]
    pub paths: Vec<PathBuf>,

    /// Optional configuration key to apply
    #[clap(short = 'O', long = "opt-conf-key")]
    pub opt_conf_keys: Vec<String>,

    /// Override a setting: `[SECTION]KEY=VALUE`
    #[clap(short = 'D', long = "define")]
    pub defines: Vec<String>,
}

#[derive(Parser, Debug)]
pub struct OutputArgs {
    #[arg(short = 'F', long = "output-format", default_value_t)]
    pub format: OutputFormat,
}

#[derive(ValueEnum, Clone, Default, Debug)]
pub enum OutputFormat {
    #[default]
    Conf,
    Json,
    Yaml,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Conf => f.write_str("conf"),
            OutputFormat::Json => f.write_str("json"),
            OutputFormat::Yaml => f.write_str("yaml"),
        }
    }
}

#[derive(Parser, Debug)]
pub struct MacroCommand {
    #[clap(flatten)]
    pub input: InputArgs,

    /// Metadata directory holding rose-meta.conf
    #[clap(short = 'M', long = "meta")]
    pub meta_dir: PathBuf,

    /// Run transformers and print the changed configuration
    #[clap(short = 'T', long = "transform")]
    pub transform: bool,

    /// Macros to run, all built-in checks (or fixers) if none
    pub names: Vec<String>,
}

#[derive(Parser, Debug)]
pub struct ProcessCommand {
    #[clap(flatten)]
    pub input: InputArgs,

    /// Item to render, e.g. `namelist:foo`
    pub item: String,
}

#[derive(Parser, Debug)]
pub struct UpgradeCommand {
    /// Configuration directory holding rose-app.conf
    pub conf_dir: PathBuf,

    /// Move to an earlier version
    #[clap(short = 'd', long = "downgrade")]
    pub downgrade: bool,

    /// List versions without a metadata directory as well
    #[clap(short = 'a', long = "all-versions")]
    pub all_versions: bool,

    /// Directory holding the metadata of each category, `<meta-path>/<category>/<tag>/rose-meta.conf`
    #[clap(short = 'M', long = "meta-path")]
    pub meta_path: Option<PathBuf>,

    /// Version to move to, the versions are listed if not given
    pub tag: Option<String>,
}
