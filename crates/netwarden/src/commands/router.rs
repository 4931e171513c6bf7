//! `netwarden router status`: login check against the configured router.

use netwarden_config::Config;
use netwarden_core::{Engine, RouterStatus};

use crate::cli::{GlobalOpts, RouterArgs, RouterCommand};
use crate::error::CliError;
use crate::output;

fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}

fn detail(status: &RouterStatus) -> String {
    let mut lines = vec![
        format!("Configured:   {}", yes_no(status.configured)),
        format!("Connected:    {}", yes_no(status.connected)),
        format!("Brand:        {}", status.brand.as_deref().unwrap_or("-")),
        format!("Model:        {}", status.model.as_deref().unwrap_or("-")),
        format!("Capabilities: {}", output::join_or_dash(&status.capabilities)),
    ];
    if let Some(ref message) = status.message {
        lines.push(format!("Message:      {message}"));
    }
    lines.join("\n")
}

pub async fn handle(args: &RouterArgs, cfg: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        RouterCommand::Status => {
            let engine_config = netwarden_config::to_engine_config(cfg)?;
            let status = Engine::oneshot(engine_config, |engine| async move {
                Ok(engine.router_status().await)
            })
            .await?;

            let out = output::render_single(&global.output, &status, detail, |s| {
                yes_no(s.connected).to_owned()
            })?;
            output::print_output(&out, global.quiet);

            // A configured router that refused us is a connection failure.
            if status.configured && !status.connected {
                return Err(CliError::Router {
                    message: status
                        .message
                        .unwrap_or_else(|| "router unreachable".into()),
                });
            }
            Ok(())
        }
    }
}
