//! `netwarden discover`: one discovery pass, then the registry as a table.

use std::sync::Arc;

use tabled::Tabled;

use netwarden_config::Config;
use netwarden_core::{Command as CoreCommand, Device, Engine};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "IP")]
    ip: String,
    #[tabled(rename = "MAC")]
    mac: String,
    #[tabled(rename = "Vendor")]
    vendor: String,
    #[tabled(rename = "Class")]
    class: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Ports")]
    ports: String,
}

impl From<&Arc<Device>> for DeviceRow {
    fn from(d: &Arc<Device>) -> Self {
        Self {
            id: d.id.to_string(),
            name: d.name.clone(),
            ip: d.ip.to_string(),
            mac: d.mac.to_string(),
            vendor: d.vendor.clone().unwrap_or_else(|| "-".into()),
            class: d.class.to_string(),
            status: d.status.to_string(),
            ports: output::join_or_dash(&d.open_ports),
        }
    }
}

pub async fn handle(cfg: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    let engine_config = netwarden_config::to_engine_config(cfg)?;

    let devices = Engine::oneshot(engine_config, |engine| async move {
        engine.execute(CoreCommand::DiscoverNow).await?;
        let mut devices: Vec<Arc<Device>> = engine.list_devices().iter().cloned().collect();
        devices.sort_by_key(|d| d.ip);
        Ok(devices)
    })
    .await?;

    let out = output::render_list(
        &global.output,
        &devices,
        |d| DeviceRow::from(d),
        |d| d.ip.to_string(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
