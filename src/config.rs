//! Configuration management for Chargeguard
//!
//! All credentials and switches come from environment variables; the energy
//! threshold can additionally be overridden through a small local JSON file
//! (`battery.json`) so the scheduler can adjust it between runs without
//! touching the environment.

use crate::error::{ChargeGuardError, Result};
use std::path::Path;

/// Default energy threshold when `battery.json` is absent or unreadable
pub const DEFAULT_ENERGY_THRESHOLD_KWH: f64 = 25.0;

/// Default path of the local threshold override file
pub const ENERGY_THRESHOLD_FILE: &str = "battery.json";

/// Main configuration structure
#[derive(Debug, Clone)]
pub struct Config {
    /// Smartcar OAuth client ID
    pub smartcar_client_id: String,

    /// Smartcar OAuth client secret
    pub smartcar_client_secret: String,

    /// Vehicle to query when the battery check is enabled. When unset the
    /// first vehicle listed on the account is used.
    pub smartcar_vehicle_id: Option<String>,

    /// MyEnergi hub/device serial
    pub myenergi_serial: String,

    /// MyEnergi API key (digest auth password)
    pub myenergi_key: String,

    /// Session energy threshold in kWh that triggers a stop
    pub energy_threshold_kwh: f64,

    /// Optional Discord webhook for status notifications
    pub discord_webhook_url: Option<String>,

    /// Whether to query the vehicle battery level. Off by default so the
    /// job does not burn Smartcar API quota unless explicitly enabled.
    pub check_battery: bool,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Directory (or file path whose parent is used) for the rolling log file
    pub file: String,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to console as well
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            file: "chargeguard.log".to_string(),
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            smartcar_client_id: String::new(),
            smartcar_client_secret: String::new(),
            smartcar_vehicle_id: None,
            myenergi_serial: String::new(),
            myenergi_key: String::new(),
            energy_threshold_kwh: DEFAULT_ENERGY_THRESHOLD_KWH,
            discord_webhook_url: None,
            check_battery: false,
            logging: LoggingConfig::default(),
        }
    }
}

/// Load the energy threshold from a JSON file (`{"kwh_needed": 25.0}`).
///
/// Any failure (missing file, invalid JSON, non-numeric value) falls back to
/// [`DEFAULT_ENERGY_THRESHOLD_KWH`]. This is a configuration default, not a
/// payload default: vendor payload parsing never substitutes values.
pub fn load_energy_threshold<P: AsRef<Path>>(path: P) -> f64 {
    let contents = match std::fs::read_to_string(&path) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(
                "Could not read {}, defaulting to {} kWh: {}",
                path.as_ref().display(),
                DEFAULT_ENERGY_THRESHOLD_KWH,
                e
            );
            return DEFAULT_ENERGY_THRESHOLD_KWH;
        }
    };

    match serde_json::from_str::<serde_json::Value>(&contents) {
        Ok(v) => v
            .get("kwh_needed")
            .and_then(serde_json::Value::as_f64)
            .unwrap_or_else(|| {
                tracing::warn!(
                    "No numeric kwh_needed in {}, defaulting to {} kWh",
                    path.as_ref().display(),
                    DEFAULT_ENERGY_THRESHOLD_KWH
                );
                DEFAULT_ENERGY_THRESHOLD_KWH
            }),
        Err(e) => {
            tracing::warn!(
                "Invalid JSON in {}, defaulting to {} kWh: {}",
                path.as_ref().display(),
                DEFAULT_ENERGY_THRESHOLD_KWH,
                e
            );
            DEFAULT_ENERGY_THRESHOLD_KWH
        }
    }
}

impl Config {
    /// Build the configuration from environment variables.
    ///
    /// Required: `SMARTCAR_CLIENT_ID`, `SMARTCAR_CLIENT_SECRET`,
    /// `MYENERGI_SERIAL`, `MYENERGI_KEY`.
    /// Optional: `SMARTCAR_VEHICLE_ID` (first listed vehicle when unset),
    /// `DISCORD_WEBHOOK_URL`, `CHECK_BATTERY` (default false),
    /// `CHARGEGUARD_LOG_LEVEL`, `CHARGEGUARD_LOG_FILE`.
    pub fn from_env() -> Result<Self> {
        let required = |name: &str| -> Result<String> {
            match std::env::var(name) {
                Ok(v) if !v.is_empty() => Ok(v),
                _ => Err(ChargeGuardError::config(format!(
                    "Required environment variable {} not set",
                    name
                ))),
            }
        };

        let mut logging = LoggingConfig::default();
        if let Ok(level) = std::env::var("CHARGEGUARD_LOG_LEVEL")
            && !level.is_empty()
        {
            logging.level = level;
        }
        if let Ok(file) = std::env::var("CHARGEGUARD_LOG_FILE")
            && !file.is_empty()
        {
            logging.file = file;
        }

        let check_battery = std::env::var("CHECK_BATTERY")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let config = Self {
            smartcar_client_id: required("SMARTCAR_CLIENT_ID")?,
            smartcar_client_secret: required("SMARTCAR_CLIENT_SECRET")?,
            smartcar_vehicle_id: std::env::var("SMARTCAR_VEHICLE_ID")
                .ok()
                .filter(|v| !v.is_empty()),
            myenergi_serial: required("MYENERGI_SERIAL")?,
            myenergi_key: required("MYENERGI_KEY")?,
            energy_threshold_kwh: load_energy_threshold(ENERGY_THRESHOLD_FILE),
            discord_webhook_url: std::env::var("DISCORD_WEBHOOK_URL")
                .ok()
                .filter(|v| !v.is_empty()),
            check_battery,
            logging,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.energy_threshold_kwh <= 0.0 {
            return Err(ChargeGuardError::validation(
                "energy_threshold_kwh",
                "Must be positive",
            ));
        }
        if self.myenergi_serial.is_empty() {
            return Err(ChargeGuardError::validation(
                "myenergi_serial",
                "Serial cannot be empty",
            ));
        }
        Ok(())
    }
}
