//! Per-run orchestration
//!
//! One scheduled run: probe the charger once, gate everything on that single
//! snapshot, apply the energy threshold, then (when enabled) the battery
//! gate. "Not charging" is an ordinary early-return outcome, not an error -
//! the process still exits zero in that case.

use crate::auth::AuthorizationFlow;
use crate::config::Config;
use crate::error::Result;
use crate::logging::get_logger;
use crate::notify::Notifier;
use crate::smartcar::{BatteryGate, SmartcarClient};
use crate::token::{SmartcarAuthClient, TOKEN_FILE, TokenManager, TokenStore};
use crate::zappi::{ChargingController, MyEnergiClient};
use std::sync::Arc;

/// What a single run concluded and did
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// Whether the charger was charging when probed
    pub charging: bool,

    /// Session energy at probe time, kWh (0.0 when not charging short-circuits)
    pub energy_delivered_kwh: f64,

    /// Whether the energy threshold triggered a stop this run
    pub stopped_for_energy: bool,

    /// Battery fraction reported by the vehicle, when the gate ran
    pub battery_fraction: Option<f64>,
}

impl RunSummary {
    fn not_charging() -> Self {
        Self {
            charging: false,
            energy_delivered_kwh: 0.0,
            stopped_for_energy: false,
            battery_fraction: None,
        }
    }
}

/// The battery-check path, assembled only when enabled by configuration
pub struct BatteryPath {
    pub token_manager: TokenManager,
    pub gate: BatteryGate,
    /// Configured vehicle; `None` falls back to the first listed vehicle
    pub vehicle_id: Option<String>,
}

/// Ties the probe, decision engine, battery gate and notifier together
pub struct ChargeSupervisor {
    controller: ChargingController,
    notifier: Arc<Notifier>,
    battery: Option<BatteryPath>,
    logger: crate::logging::StructuredLogger,
}

impl ChargeSupervisor {
    pub fn new(
        controller: ChargingController,
        notifier: Arc<Notifier>,
        battery: Option<BatteryPath>,
    ) -> Self {
        Self {
            controller,
            notifier,
            battery,
            logger: get_logger("supervisor"),
        }
    }

    /// Wire up the production clients from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let notifier = Arc::new(Notifier::new(config.discord_webhook_url.clone()));
        let charger = MyEnergiClient::new(
            config.myenergi_serial.clone(),
            config.myenergi_key.clone(),
        )?;
        let controller = ChargingController::new(
            Box::new(charger),
            notifier.clone(),
            config.energy_threshold_kwh,
        );

        let battery = if config.check_battery {
            let auth_client = SmartcarAuthClient::new(
                config.smartcar_client_id.clone(),
                config.smartcar_client_secret.clone(),
                crate::auth::REDIRECT_URI.to_string(),
            )?;
            let flow = AuthorizationFlow::new(config.smartcar_client_id.clone());
            let token_manager = TokenManager::new(
                TokenStore::new(TOKEN_FILE),
                Box::new(auth_client),
                Box::new(flow),
            )?;
            let gate = BatteryGate::new(Box::new(SmartcarClient::new()?), notifier.clone());
            Some(BatteryPath {
                token_manager,
                gate,
                vehicle_id: config.smartcar_vehicle_id.clone(),
            })
        } else {
            None
        };

        Ok(Self::new(controller, notifier, battery))
    }

    /// Execute one supervision run.
    ///
    /// The snapshot is fetched once and reused for both the charging gate
    /// and the energy check - two independent reads of a live counter could
    /// disagree. When the charger is idle, both the energy and battery
    /// paths are skipped entirely.
    pub async fn run_once(&mut self) -> Result<RunSummary> {
        let status = self.controller.fetch_status().await?;

        if !self.controller.is_charging(&status, true).await {
            self.logger.info("Not currently charging");
            self.notifier.send("Not charging").await;
            return Ok(RunSummary::not_charging());
        }

        let stopped_for_energy = self.controller.check_energy_delivered(&status).await?;

        // The battery gate keys off the charging confirmation above, not off
        // the energy outcome: even a just-stopped charge still gets its
        // battery level reported.
        let mut battery_fraction = None;
        if let Some(path) = &mut self.battery {
            let access_token = path.token_manager.get_valid_access_token().await?;
            let vehicle_id = match &path.vehicle_id {
                Some(id) => id.clone(),
                None => path.gate.first_vehicle(&access_token).await?,
            };
            let fraction = path
                .gate
                .check(&vehicle_id, &access_token, &self.controller)
                .await?;
            battery_fraction = Some(fraction);
        } else {
            self.logger
                .info("Battery check disabled; skipping battery level call");
        }

        Ok(RunSummary {
            charging: true,
            energy_delivered_kwh: status.energy_delivered_kwh,
            stopped_for_energy,
            battery_fraction,
        })
    }
}
