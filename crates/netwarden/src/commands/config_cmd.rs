//! Config subcommand handlers.

use netwarden_config::Config;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::commands::{config_file, load};
use crate::error::CliError;
use crate::output;

pub fn handle(args: &ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match &args.command {
        ConfigCommand::Path => {
            output::print_output(&config_file(global).display().to_string(), global.quiet);
            Ok(())
        }

        ConfigCommand::Init { force } => {
            let path = config_file(global);
            if path.exists() && !*force {
                return Err(CliError::Conflict {
                    resource_type: "config file".into(),
                    identifier: path.display().to_string(),
                    hint: "Pass --force to overwrite it.".into(),
                });
            }
            netwarden_config::save_config_to(&Config::default(), &path)?;
            tracing::info!(path = %path.display(), "config written");
            output::print_output(
                &format!("Wrote default config to {}", path.display()),
                global.quiet,
            );
            Ok(())
        }

        ConfigCommand::Show => {
            let cfg = load(global)?;
            let rendered = toml::to_string_pretty(&cfg.redacted())
                .map_err(netwarden_config::ConfigError::from)?;
            output::print_output(rendered.trim_end(), global.quiet);
            Ok(())
        }
    }
}
