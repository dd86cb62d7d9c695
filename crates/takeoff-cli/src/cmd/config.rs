use crate::output::print_json;
use crate::root::ConfigSource;
use anyhow::{bail, Context};
use clap::Subcommand;
use takeoff_core::config::{TakeoffConfig, WarnLevel};

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Write a config file with every default spelled out
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Show the effective configuration
    Show,

    /// Validate the config for common mistakes
    Validate,
}

pub fn run(source: &ConfigSource, subcmd: ConfigSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ConfigSubcommand::Init { force } => init(source, force, json),
        ConfigSubcommand::Show => show(source, json),
        ConfigSubcommand::Validate => validate(source, json),
    }
}

fn init(source: &ConfigSource, force: bool, json: bool) -> anyhow::Result<()> {
    let target = source.target();
    if target.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", target.display());
    }
    TakeoffConfig::default()
        .save(&target)
        .with_context(|| format!("failed to write {}", target.display()))?;

    if json {
        print_json(&serde_json::json!({ "path": target }))?;
    } else {
        println!("Wrote {}", target.display());
    }
    Ok(())
}

fn show(source: &ConfigSource, json: bool) -> anyhow::Result<()> {
    let config = source.load()?;
    if json {
        print_json(&config)?;
    } else {
        print!("{}", serde_yaml::to_string(&config)?);
    }
    Ok(())
}

fn validate(source: &ConfigSource, json: bool) -> anyhow::Result<()> {
    let config = source.load()?;
    let warnings = config.validate();
    let errors = warnings
        .iter()
        .filter(|w| w.level == WarnLevel::Error)
        .count();

    if json {
        print_json(&serde_json::json!({
            "path": source.path,
            "ok": errors == 0,
            "warnings": warnings,
        }))?;
    } else if warnings.is_empty() {
        println!("Config OK");
    } else {
        for w in &warnings {
            let tag = match w.level {
                WarnLevel::Error => "error",
                WarnLevel::Warning => "warning",
            };
            println!("{tag}: {}", w.message);
        }
    }

    if errors > 0 {
        bail!("config has {errors} error(s)");
    }
    Ok(())
}
