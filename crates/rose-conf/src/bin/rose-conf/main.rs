mod cli;

use anyhow::Context;
use rose_conf::config::ConfigNode;
use rose_conf::config_processor::{ConfigProcessorsManager, Origin};
use rose_conf::config_tree::{ConfigTree, ConfigTreeLoader, LoadOptions};
use rose_conf::macros::{get_reports_as_text, MacroManager, MacroMethod, MacroRegistry, Transformer};
use rose_conf::meta_prop;
use rose_conf::upgrade::{demo, version_listing, MacroUpgradeManager};

fn main() {
    use clap::Parser;
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("ROSE_CONF_LOG"))
        .with_writer(std::io::stderr)
        .init();

    for new_path in cli.directory.iter() {
        match new_path.canonicalize() {
            Err(e) => {
                eprintln!(
                    "Failed to resolve path for -C/--directory {}\n{}",
                    new_path.display(),
                    e
                );
                std::process::exit(1);
            }
            Ok(cwd) => {
                if let Err(err) = std::env::set_current_dir(&cwd) {
                    eprintln!("Failed to set work directory to {}\n{}", cwd.display(), err,);
                    std::process::exit(1);
                }

                tracing::info!(directory=%cwd.display(), "Changed working directory");
            }
        }
    }

    let command_result = match cli.command {
        cli::Command::Tree(tree_cli) => tree(tree_cli),
        cli::Command::Macro(macro_cli) => run_macros(macro_cli),
        cli::Command::Process(process_cli) => process(process_cli),
        cli::Command::Upgrade(upgrade_cli) => upgrade(upgrade_cli),
    };

    if let Err(e) = command_result {
        for error in e.chain() {
            eprintln!("{error}")
        }
        std::process::exit(1);
    }
}

fn load(input: &cli::InputArgs, no_ignore: bool) -> anyhow::Result<ConfigTree> {
    let options = LoadOptions {
        conf_dir_paths: input.paths.clone(),
        opt_keys: input.opt_conf_keys.clone(),
        no_ignore,
        defines: input.defines.clone(),
        ..Default::default()
    };
    ConfigTreeLoader::new()
        .load(&input.conf_dir, &input.conf_name, options)
        .with_context(|| format!("Failed to load {}", input.conf_dir.display()))
}

pub fn tree(cli: cli::TreeCommand) -> anyhow::Result<()> {
    let conf_tree = load(&cli.input, cli.no_ignore)?;

    if cli.files {
        match cli.output.format {
            cli::OutputFormat::Conf => {
                for (rel_path, dirs) in &conf_tree.file_locs {
                    let dirs: Vec<String> = dirs.iter().map(|dir| dir.display().to_string()).collect();
                    println!("{}={}", rel_path.display(), dirs.join(" "));
                }
            }
            cli::OutputFormat::Json => serde_json::to_writer_pretty(std::io::stdout(), &conf_tree.file_locs)?,
            cli::OutputFormat::Yaml => serde_yaml::to_writer(std::io::stdout(), &conf_tree.file_locs)?,
        }
        return Ok(());
    }

    output(&cli.output, &conf_tree.node)
}

fn output(output: &cli::OutputArgs, node: &ConfigNode) -> anyhow::Result<()> {
    match output.format {
        cli::OutputFormat::Conf => print!("{}", node.dump()),
        cli::OutputFormat::Yaml => serde_yaml::to_writer(std::io::stdout(), node)?,
        cli::OutputFormat::Json => serde_json::to_writer_pretty(std::io::stdout(), node)?,
    };

    Ok(())
}

/// Run validators (or transformers) and fail if any of them reports an error
pub fn run_macros(cli: cli::MacroCommand) -> anyhow::Result<()> {
    let mut config = load(&cli.input, false)?.node;
    let meta_config = ConfigTreeLoader::new()
        .load(&cli.meta_dir, meta_prop::META_CONFIG_NAME, LoadOptions::default())
        .with_context(|| format!("Failed to load metadata {}", cli.meta_dir.display()))?
        .node;

    let registry = MacroRegistry::with_builtins();
    let mut manager = MacroManager::new(&registry, meta_config);
    let (method, default_name) = match cli.transform {
        true => (MacroMethod::Transform, "DefaultTransforms"),
        false => (MacroMethod::Validate, "DefaultValidators"),
    };
    let names = match cli.names.is_empty() {
        true => vec![default_name.to_string()],
        false => cli.names,
    };

    let mut issues = 0;
    for name in &names {
        let reports = match method {
            MacroMethod::Transform => manager.transform(name, &mut config)?,
            _ => manager.validate(name, &config)?,
        };
        if reports.is_empty() {
            continue;
        }
        issues += reports.iter().filter(|report| !report.is_warning).count();
        eprint!("{}", get_reports_as_text(&reports, &method.macro_id(name), cli.transform));
    }

    if cli.transform {
        print!("{}", config.dump());
    } else {
        anyhow::ensure!(issues == 0, "{issues} issue(s) found");
    }
    Ok(())
}

pub fn process(cli: cli::ProcessCommand) -> anyhow::Result<()> {
    let conf_tree = load(&cli.input, false)?;
    let text = ConfigProcessorsManager::default().process(&conf_tree.node, &cli.item, Origin::default())?;
    print!("{text}");
    Ok(())
}

/// List the versions the configuration can move to, or move it to `cli.tag`
pub fn upgrade(cli: cli::UpgradeCommand) -> anyhow::Result<()> {
    let conf_path = cli.conf_dir.join("rose-app.conf");
    let mut config = ConfigNode::load(&conf_path)?;

    let meta_flag = config
        .get_value(&["", meta_prop::CONFIG_OPT_META])
        .context("Error: could not find meta flag")?;
    let category = meta_flag.rsplit_once('/').map_or(meta_flag, |(category, _)| category).to_string();
    let macros = demo::builtin_macros(&category)
        .with_context(|| format!("{category}: no upgrade macros available"))?;

    let mut manager = MacroUpgradeManager::new(&config, macros, cli.downgrade)?;
    if let Some(meta_path) = &cli.meta_path {
        manager = manager
            .with_named_tags(&meta_path.join(&category))
            .with_context(|| format!("Failed to list versions in {}", meta_path.display()))?;
    }
    let only_named = !cli.all_versions;

    let Some(tag) = cli.tag else {
        for line in version_listing(&manager, only_named) {
            println!("{line}");
        }
        return Ok(());
    };

    manager.set_new_tag(&tag)?;
    let meta_config = match &cli.meta_path {
        Some(meta_path) => {
            let path = meta_path.join(&category).join(&tag).join(meta_prop::META_CONFIG_NAME);
            match path.is_file() {
                true => ConfigNode::load(&path)?,
                false => ConfigNode::new(),
            }
        }
        None => ConfigNode::new(),
    };

    let mut reports = manager.transform(&mut config, &meta_config)?;
    if meta_config.as_map().is_some_and(|map| !map.is_empty()) {
        let mut trigger = rose_conf::macros::trigger::TriggerMacro::default();
        reports.extend(trigger.transform(&mut config, &meta_config));
    }
    eprint!("{}", get_reports_as_text(&reports, &manager.name(), true));
    print!("{}", config.dump());
    Ok(())
}
