use std::process::ExitCode;
use std::sync::Arc;

use sensortag_bridge::bridge::{report_panics, shutdown_signal, ShutdownReason};
use sensortag_bridge::{Bridge, BridgeConfig, BtleDriver, Result};
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let (fault_tx, fault_rx) = mpsc::unbounded_channel();
    report_panics(fault_tx);

    match run(fault_rx).await {
        Ok(reason) if reason.is_fault() => ExitCode::FAILURE,
        Ok(reason) => {
            info!("Bye ({})", reason);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(faults: mpsc::UnboundedReceiver<String>) -> Result<ShutdownReason> {
    let config = BridgeConfig::default();
    config.validate()?;

    let driver = Arc::new(BtleDriver::new().await?);
    let bridge = Bridge::new(config, driver)?;

    Ok(bridge.run(shutdown_signal(faults)).await)
}
