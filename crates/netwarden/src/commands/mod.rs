//! Command dispatch: routes parsed CLI commands to their handlers.

pub mod config_cmd;
pub mod discover;
pub mod router;
pub mod run;
pub mod scan;

use std::path::PathBuf;

use netwarden_config::Config;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Config file in effect: `--config` / `NETWARDEN_CONFIG`, else the
/// platform default.
pub fn config_file(global: &GlobalOpts) -> PathBuf {
    global
        .config
        .clone()
        .unwrap_or_else(netwarden_config::config_path)
}

/// Load the config file plus environment, then apply CLI overrides.
pub fn load(global: &GlobalOpts) -> Result<Config, CliError> {
    let mut cfg = netwarden_config::load_config_from(&config_file(global))?;
    if let Some(ref interface) = global.interface {
        cfg.engine.interface.clone_from(interface);
    }
    Ok(cfg)
}

/// Dispatch an engine-backed command.
pub async fn dispatch(cmd: Command, cfg: Config, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Run(args) => run::handle(&args, &cfg).await,
        Command::Discover => discover::handle(&cfg, global).await,
        Command::Scan(args) => scan::handle(&args, &cfg, global).await,
        Command::Router(args) => router::handle(&args, &cfg, global).await,
        Command::Config(_) | Command::Completions(_) => unreachable!("handled before dispatch"),
    }
}
