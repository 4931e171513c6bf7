//! `netwarden run`: the long-lived daemon.

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use netwarden_config::Config;
use netwarden_core::Engine;

use crate::cli::RunArgs;
use crate::error::CliError;
use crate::server;

pub async fn handle(args: &RunArgs, cfg: &Config) -> Result<(), CliError> {
    let listen = args.listen.unwrap_or(cfg.server.listen);
    let engine = Engine::new(netwarden_config::to_engine_config(cfg)?)?;

    // Bind before starting so a taken port fails fast with nothing running.
    let listener = server::bind(listen).await?;
    engine.start().await?;

    info!(
        listen = %listener.local_addr()?,
        path = server::OBSERVER_PATH,
        interface = %engine.config().interface,
        backend = ?engine.config().block_backend,
        "netwarden running"
    );

    let cancel = CancellationToken::new();
    let observers = tokio::spawn(server::serve(listener, engine.clone(), cancel.clone()));

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");

    cancel.cancel();
    if let Err(e) = observers.await {
        warn!(error = %e, "observer endpoint task failed");
    }
    engine.shutdown().await;
    info!("netwarden stopped");
    Ok(())
}
