use anyhow::Result;
use chargeguard::config::Config;
use chargeguard::logging::init_logging;
use chargeguard::supervisor::ChargeSupervisor;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return Err(anyhow::anyhow!("Configuration error: {}", e));
        }
    };

    init_logging(&config.logging).map_err(|e| anyhow::anyhow!("Logging setup failed: {}", e))?;
    info!("Chargeguard {} starting up", env!("APP_VERSION"));

    let mut supervisor = ChargeSupervisor::from_config(&config)
        .map_err(|e| anyhow::anyhow!("Failed to assemble supervisor: {}", e))?;

    match supervisor.run_once().await {
        Ok(summary) => {
            info!(
                "Run complete: charging={}, energy={} kWh, stopped_for_energy={}, battery={:?}",
                summary.charging,
                summary.energy_delivered_kwh,
                summary.stopped_for_energy,
                summary.battery_fraction
            );
            Ok(())
        }
        Err(e) => {
            error!("Run failed: {}", e);
            Err(anyhow::anyhow!("Run error: {}", e))
        }
    }
}
