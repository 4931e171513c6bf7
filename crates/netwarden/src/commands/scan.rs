//! `netwarden scan <address>`: port probe and service heuristics.

use netwarden_config::Config;
use netwarden_core::{Engine, ScanReport};

use crate::cli::{GlobalOpts, ScanArgs};
use crate::error::CliError;
use crate::output;

fn detail(report: &ScanReport) -> String {
    let mut lines = vec![
        format!("Address:  {}", report.ip),
        format!("Open:     {}", output::join_or_dash(&report.open_ports)),
    ];
    if report.vulnerabilities.is_empty() {
        lines.push("Findings: none".into());
    } else {
        lines.push(format!("Findings: {}", report.vulnerabilities.len()));
        lines.extend(report.vulnerabilities.iter().map(|v| format!("  - {v}")));
    }
    lines.join("\n")
}

pub async fn handle(args: &ScanArgs, cfg: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    let engine_config = netwarden_config::to_engine_config(cfg)?;
    let ip = args.address;

    let report = Engine::oneshot(engine_config, |engine| async move {
        Ok(engine.scan_address(ip).await)
    })
    .await?;

    let out = output::render_single(&global.output, &report, detail, |r| {
        r.open_ports
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}
