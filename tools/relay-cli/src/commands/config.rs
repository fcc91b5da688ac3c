//! Manage configuration.

use anyhow::{bail, Result};

use super::{ConfigArgs, ConfigCommand};
use crate::config::generate_default_config;
use crate::context::Context;

/// Run the config command.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<bool> {
    match args.command {
        ConfigCommand::Show => show(ctx)?,
        ConfigCommand::Init { force } => init(ctx, force)?,
    }
    Ok(true)
}

fn show(ctx: &Context) -> Result<()> {
    if ctx.output.is_json() {
        ctx.output.json(&ctx.config);
        return Ok(());
    }

    match &ctx.config_path {
        Some(path) => ctx.output.info(&format!("Loaded from {}", path.display())),
        None => ctx.output.info("No config file found, using defaults"),
    }
    println!("{}", toml::to_string_pretty(&ctx.config)?);
    Ok(())
}

fn init(ctx: &Context, force: bool) -> Result<()> {
    let path = ctx.default_config_path();
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }

    std::fs::write(&path, generate_default_config())?;
    ctx.output.success(&format!("Wrote {}", path.display()));
    Ok(())
}
