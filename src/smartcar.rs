//! Smartcar vehicle telematics integration
//!
//! Bearer-token client for the vehicle API plus the battery gate: when the
//! reported state-of-charge reaches the fixed threshold the charge is
//! stopped regardless of the energy counter. The gate only ever runs after
//! the charging probe confirmed an active charge, and only when enabled by
//! configuration - the vehicle API has a daily quota worth protecting.

use crate::error::{ChargeGuardError, Result};
use crate::logging::get_logger;
use crate::notify::Notifier;
use crate::zappi::ChargingController;
use std::sync::Arc;

/// Smartcar REST API base
pub const SMARTCAR_API_BASE: &str = "https://api.smartcar.com/v2.0";

/// Battery fraction at or above which charging is stopped
pub const BATTERY_THRESHOLD: f64 = 0.8;

/// Timeout for vehicle API calls
const VEHICLE_HTTP_TIMEOUT_SECS: u64 = 30;

/// Extract the vehicle ID list from a `/vehicles` response body.
///
/// An account with no vehicles is an error: there is nothing to query and
/// silently skipping the battery check would defeat its purpose.
fn vehicle_ids(body: &serde_json::Value) -> Result<Vec<String>> {
    let vehicles: Vec<String> = body
        .get("vehicles")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();
    if vehicles.is_empty() {
        return Err(ChargeGuardError::vehicle("No vehicles found in account"));
    }
    Ok(vehicles)
}

/// Vehicle telematics API operations
#[async_trait::async_trait]
pub trait VehicleApi: Send + Sync {
    /// List the vehicle IDs attached to the account
    async fn list_vehicles(&self, access_token: &str) -> Result<Vec<String>>;

    /// Battery state-of-charge as a fraction in 0..1
    async fn battery_percent(&self, vehicle_id: &str, access_token: &str) -> Result<f64>;
}

/// Bearer-token Smartcar API client
pub struct SmartcarClient {
    base_url: String,
    http: reqwest::Client,
    logger: crate::logging::StructuredLogger,
}

impl SmartcarClient {
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(VEHICLE_HTTP_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            base_url: SMARTCAR_API_BASE.to_string(),
            http,
            logger: get_logger("smartcar"),
        })
    }

    async fn get_json(&self, path: &str, access_token: &str) -> Result<serde_json::Value> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| ChargeGuardError::vehicle(format!("Vehicle API request failed: {}", e)))?;

        let status = resp.status();
        self.logger
            .debug(&format!("Vehicle API response: {} for {}", status, path));
        if !status.is_success() {
            return Err(ChargeGuardError::vehicle(format!(
                "Vehicle API returned HTTP {} for {}",
                status, path
            )));
        }
        resp.json::<serde_json::Value>()
            .await
            .map_err(|e| ChargeGuardError::vehicle(format!("Invalid vehicle response: {}", e)))
    }
}

#[async_trait::async_trait]
impl VehicleApi for SmartcarClient {
    async fn list_vehicles(&self, access_token: &str) -> Result<Vec<String>> {
        self.logger.info("Sending request to get vehicle IDs");
        let body = self.get_json("/vehicles", access_token).await?;
        vehicle_ids(&body)
    }

    async fn battery_percent(&self, vehicle_id: &str, access_token: &str) -> Result<f64> {
        self.logger.debug(&format!(
            "Requesting battery info for vehicle {}",
            vehicle_id
        ));
        let body = self
            .get_json(&format!("/vehicles/{}/battery", vehicle_id), access_token)
            .await?;
        body.get("percentRemaining")
            .and_then(serde_json::Value::as_f64)
            .ok_or_else(|| {
                ChargeGuardError::vehicle("Invalid battery response: percentRemaining missing")
            })
    }
}

/// Stops the charge when the vehicle battery is sufficiently full
pub struct BatteryGate {
    api: Box<dyn VehicleApi>,
    notifier: Arc<Notifier>,
    threshold: f64,
    logger: crate::logging::StructuredLogger,
}

impl BatteryGate {
    pub fn new(api: Box<dyn VehicleApi>, notifier: Arc<Notifier>) -> Self {
        Self {
            api,
            notifier,
            threshold: BATTERY_THRESHOLD,
            logger: get_logger("battery"),
        }
    }

    /// Resolve the vehicle to query when none is configured: the first
    /// vehicle listed on the account.
    pub async fn first_vehicle(&self, access_token: &str) -> Result<String> {
        let vehicles = self.api.list_vehicles(access_token).await?;
        vehicles
            .into_iter()
            .next()
            .ok_or_else(|| ChargeGuardError::vehicle("No vehicles found in account"))
    }

    /// Fetch the battery level and stop the charge when it has reached the
    /// threshold. Returns the fraction for reporting.
    pub async fn check(
        &self,
        vehicle_id: &str,
        access_token: &str,
        controller: &ChargingController,
    ) -> Result<f64> {
        let fraction = self.api.battery_percent(vehicle_id, access_token).await?;
        let message = format!("Battery percent remaining: {:.1}%", fraction * 100.0);
        self.logger.info(&message);
        self.notifier.send(&message).await;

        if fraction >= self.threshold {
            controller.stop_charging(true).await?;
        }
        Ok(fraction)
    }
}
