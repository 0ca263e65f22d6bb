//! MyEnergi Zappi status probing and charging control
//!
//! The status endpoint returns a device array keyed by device type; this
//! module normalizes the first element into a [`ZappiStatus`] snapshot and
//! hosts the charging-decision logic on top of it. Accounts with multiple
//! Zappis are not handled; the first device is used unconditionally.

use crate::error::{ChargeGuardError, Result};
use crate::logging::get_logger;
use crate::notify::Notifier;
use diqwest::WithDigestAuth;
use std::sync::Arc;

/// MyEnergi director-assigned API host
pub const MYENERGI_BASE_URL: &str = "https://s18.myenergi.net";

/// Zappi mode code meaning "stopped/off"
pub const ZAPPI_STOP_MODE: &str = "4";

/// Zappi state code meaning "actively diverting/charging"
pub const ZAPPI_CHARGING_STATUS: &str = "3";

/// Full mode-change argument that stops the charge
pub const ZAPPI_STOP_MODE_STRING: &str = "4-0-0-0000";

/// Timeout for charger API calls
const ZAPPI_HTTP_TIMEOUT_SECS: u64 = 30;

/// Normalized snapshot of the charger's status endpoint.
///
/// Constructed fresh on every probe and never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ZappiStatus {
    /// Vendor mode code (`zmo`); `"4"` = stopped
    pub mode: String,

    /// Vendor charging-activity code (`sta`); `"3"` = diverting/charging
    pub charging_state: String,

    /// Cumulative session energy (`che`), kWh
    pub energy_delivered_kwh: f64,
}

/// Vendor codes arrive as strings or bare numbers depending on firmware
fn code_field(device: &serde_json::Value, key: &str) -> String {
    match device.get(key) {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

impl ZappiStatus {
    /// Parse the vendor payload (`{"zappi": [{...}]}`) into a snapshot.
    ///
    /// A missing device array or an uncoercible `che` field is an explicit
    /// error. Defaulting the energy counter could flip a stop/no-stop
    /// decision, so it is never substituted.
    pub fn from_payload(payload: &serde_json::Value) -> Result<Self> {
        let device = payload
            .get("zappi")
            .and_then(|z| z.as_array())
            .and_then(|arr| arr.first())
            .ok_or_else(|| {
                ChargeGuardError::charger("Invalid zappi response format: no zappi device in payload")
            })?;

        let energy_delivered_kwh = match device.get("che") {
            Some(serde_json::Value::Number(n)) => n.as_f64().ok_or_else(|| {
                ChargeGuardError::charger("Invalid zappi response format: che is not a finite number")
            })?,
            Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().map_err(|e| {
                ChargeGuardError::charger(format!(
                    "Invalid zappi response format: che {:?} is not numeric: {}",
                    s, e
                ))
            })?,
            _ => {
                return Err(ChargeGuardError::charger(
                    "Invalid zappi response format: che field missing",
                ));
            }
        };
        if !energy_delivered_kwh.is_finite() || energy_delivered_kwh < 0.0 {
            return Err(ChargeGuardError::charger(format!(
                "Invalid zappi response format: che {} out of range",
                energy_delivered_kwh
            )));
        }

        Ok(Self {
            mode: code_field(device, "zmo"),
            charging_state: code_field(device, "sta"),
            energy_delivered_kwh,
        })
    }

    /// Human-readable one-line rendering used for log and webhook output.
    /// The energy counter keeps one decimal place, matching the vendor's
    /// own display resolution.
    pub fn status_line(&self) -> String {
        format!(
            "mode={}, status={}, {:.1}",
            self.mode, self.charging_state, self.energy_delivered_kwh
        )
    }

    /// Whether the charger is considered to be charging.
    ///
    /// Only the mode code gates this; the charging-state code is captured
    /// but deliberately not required to equal [`ZAPPI_CHARGING_STATUS`].
    /// That is the shipped product behavior, kept as-is and pinned by tests.
    pub fn is_charging(&self) -> bool {
        self.mode != ZAPPI_STOP_MODE
    }
}

/// Outbound charger API operations
#[async_trait::async_trait]
pub trait ChargerApi: Send + Sync {
    /// Fetch the raw status payload
    async fn status_payload(&self) -> Result<serde_json::Value>;

    /// Issue a mode-change command (e.g. the stop-mode string)
    async fn set_mode(&self, mode: &str) -> Result<()>;
}

/// Digest-authenticated MyEnergi API client
pub struct MyEnergiClient {
    serial: String,
    key: String,
    base_url: String,
    http: reqwest::Client,
    logger: crate::logging::StructuredLogger,
}

impl MyEnergiClient {
    pub fn new(serial: String, key: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(ZAPPI_HTTP_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            serial,
            key,
            base_url: MYENERGI_BASE_URL.to_string(),
            http,
            logger: get_logger("myenergi"),
        })
    }

    /// Authenticated GET against the MyEnergi API
    async fn request(&self, path: &str) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);
        self.http
            .get(&url)
            .send_with_digest_auth(&self.serial, &self.key)
            .await
            .map_err(|e| {
                ChargeGuardError::charger(format!("Failed to communicate with Zappi: {}", e))
            })
    }
}

#[async_trait::async_trait]
impl ChargerApi for MyEnergiClient {
    async fn status_payload(&self) -> Result<serde_json::Value> {
        let path = format!("/cgi-jstatus-Z{}", self.serial);
        let resp = self.request(&path).await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ChargeGuardError::charger(format!(
                "Failed to get charging status: HTTP {}",
                status
            )));
        }
        resp.json::<serde_json::Value>().await.map_err(|e| {
            ChargeGuardError::charger(format!("Failed to get charging status: {}", e))
        })
    }

    async fn set_mode(&self, mode: &str) -> Result<()> {
        let path = format!("/cgi-zappi-mode-Z{}-{}", self.serial, mode);
        let resp = self.request(&path).await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ChargeGuardError::charger(format!(
                "Failed to change charger mode: HTTP {}",
                status
            )));
        }
        let body = resp.text().await.unwrap_or_default();
        self.logger
            .debug(&format!("Mode change acknowledged: {}", body));
        Ok(())
    }
}

/// Charging-decision engine over one status snapshot per run
pub struct ChargingController {
    api: Box<dyn ChargerApi>,
    notifier: Arc<Notifier>,
    energy_threshold_kwh: f64,
    logger: crate::logging::StructuredLogger,
}

impl ChargingController {
    pub fn new(api: Box<dyn ChargerApi>, notifier: Arc<Notifier>, energy_threshold_kwh: f64) -> Self {
        Self {
            api,
            notifier,
            energy_threshold_kwh,
            logger: get_logger("charging"),
        }
    }

    /// Fetch and normalize a fresh status snapshot
    pub async fn fetch_status(&self) -> Result<ZappiStatus> {
        let payload = self.api.status_payload().await?;
        self.logger.debug(&format!("Zappi status: {}", payload));
        ZappiStatus::from_payload(&payload)
    }

    /// Report the charging state, optionally relaying it to the webhook
    pub async fn is_charging(&self, status: &ZappiStatus, notify: bool) -> bool {
        self.logger.info("Checking if charging...");
        let line = status.status_line();
        self.logger.debug(&line);
        if notify {
            self.notifier.send(&line).await;
        }
        status.is_charging()
    }

    /// Whether the session energy has reached the configured threshold
    /// (reaching it exactly triggers a stop)
    pub fn should_stop_for_energy(&self, status: &ZappiStatus) -> bool {
        status.energy_delivered_kwh >= self.energy_threshold_kwh
    }

    /// Issue the stop command.
    ///
    /// With `skip_check` unset this probes first and becomes a logged no-op
    /// when the charger is already stopped. With `skip_check` set exactly
    /// one stop request goes out; stopping an already-stopped charger is
    /// idempotent on the vendor side.
    pub async fn stop_charging(&self, skip_check: bool) -> Result<()> {
        if !skip_check {
            let status = self.fetch_status().await?;
            if !self.is_charging(&status, false).await {
                self.logger.info("Not currently charging, no action needed");
                return Ok(());
            }
        }

        self.logger.info("Stopping charging...");
        self.api.set_mode(ZAPPI_STOP_MODE_STRING).await?;
        self.logger.info("Charging stopped successfully");
        Ok(())
    }

    /// Check the delivered-energy threshold against an existing snapshot and
    /// stop the charge when reached. Returns whether a stop was issued.
    pub async fn check_energy_delivered(&self, status: &ZappiStatus) -> Result<bool> {
        self.logger.info("Checking delivered energy...");
        self.logger.debug(&format!(
            "Delivered energy: {} kWh",
            status.energy_delivered_kwh
        ));

        if !self.should_stop_for_energy(status) {
            return Ok(false);
        }

        let message = format!(
            "Energy delivered {} kWh reached threshold {} kWh. Stopping charge.",
            status.energy_delivered_kwh, self.energy_threshold_kwh
        );
        self.logger.info(&message);
        self.notifier.send(&message).await;
        self.stop_charging(true).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snapshot(mode: &str, sta: &str, che: f64) -> ZappiStatus {
        ZappiStatus {
            mode: mode.to_string(),
            charging_state: sta.to_string(),
            energy_delivered_kwh: che,
        }
    }

    #[test]
    fn parse_payload_with_string_fields() {
        let payload = json!({"zappi": [{"zmo": "3", "sta": "3", "che": "30.0"}]});
        let status = ZappiStatus::from_payload(&payload).unwrap();
        assert_eq!(status.mode, "3");
        assert_eq!(status.charging_state, "3");
        assert!((status.energy_delivered_kwh - 30.0).abs() < f64::EPSILON);
    }

    #[test]
    fn parse_payload_with_numeric_fields() {
        // Some firmware revisions send bare numbers instead of strings
        let payload = json!({"zappi": [{"zmo": 4, "sta": 1, "che": 1.5}]});
        let status = ZappiStatus::from_payload(&payload).unwrap();
        assert_eq!(status.mode, "4");
        assert_eq!(status.charging_state, "1");
        assert!((status.energy_delivered_kwh - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn parse_payload_missing_che_is_an_error() {
        let payload = json!({"zappi": [{"zmo": "3", "sta": "3"}]});
        let err = ZappiStatus::from_payload(&payload).unwrap_err();
        assert!(matches!(err, ChargeGuardError::Charger { .. }));
    }

    #[test]
    fn parse_payload_malformed_che_is_an_error() {
        let payload = json!({"zappi": [{"zmo": "3", "sta": "3", "che": "lots"}]});
        assert!(ZappiStatus::from_payload(&payload).is_err());

        let payload = json!({"zappi": [{"zmo": "3", "sta": "3", "che": "-2.0"}]});
        assert!(ZappiStatus::from_payload(&payload).is_err());
    }

    #[test]
    fn parse_payload_empty_device_array_is_an_error() {
        let payload = json!({"zappi": []});
        assert!(ZappiStatus::from_payload(&payload).is_err());

        let payload = json!({"eddi": [{"che": "1.0"}]});
        assert!(ZappiStatus::from_payload(&payload).is_err());
    }

    #[test]
    fn charging_gate_uses_mode_only() {
        // Stopped mode wins no matter what the state code says
        assert!(!snapshot("4", "3", 10.0).is_charging());
        assert!(!snapshot("4", "1", 1.0).is_charging());

        // Any non-stop mode counts as charging, independent of sta
        assert!(snapshot("3", "3", 10.0).is_charging());
        assert!(snapshot("3", "1", 10.0).is_charging());
        assert!(snapshot("1", "5", 0.0).is_charging());
        assert!(snapshot("", "3", 0.0).is_charging());
    }

    #[test]
    fn status_line_keeps_one_decimal() {
        assert_eq!(snapshot("3", "3", 30.0).status_line(), "mode=3, status=3, 30.0");
        assert_eq!(snapshot("4", "1", 1.25).status_line(), "mode=4, status=1, 1.2");
    }

    #[test]
    fn energy_threshold_boundary() {
        let controller = ChargingController::new(
            Box::new(NullApi),
            Arc::new(Notifier::new(None)),
            25.0,
        );
        assert!(controller.should_stop_for_energy(&snapshot("3", "3", 25.0)));
        assert!(controller.should_stop_for_energy(&snapshot("3", "3", 30.0)));
        assert!(!controller.should_stop_for_energy(&snapshot("3", "3", 24.999)));
    }

    struct NullApi;

    #[async_trait::async_trait]
    impl ChargerApi for NullApi {
        async fn status_payload(&self) -> Result<serde_json::Value> {
            Err(ChargeGuardError::charger("no transport in tests"))
        }

        async fn set_mode(&self, _mode: &str) -> Result<()> {
            Err(ChargeGuardError::charger("no transport in tests"))
        }
    }
}
