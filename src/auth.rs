//! Interactive Smartcar authorization-code flow
//!
//! One-time browser-based OAuth step: bind a one-shot loopback listener,
//! open the authorization URL, wait (bounded) for the redirect carrying the
//! authorization code. The listener is bound before the browser opens so
//! the redirect cannot race the bind and get lost.

use crate::error::{ChargeGuardError, Result};
use crate::logging::get_logger;
use crate::token::AuthCodeSource;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, oneshot};

/// Smartcar authorization endpoint
pub const AUTH_URL: &str = "https://connect.smartcar.com/oauth/authorize";

/// Loopback redirect target registered with the provider
pub const REDIRECT_URI: &str = "http://localhost:8000/callback";

/// Port of the loopback redirect target
pub const CALLBACK_PORT: u16 = 8000;

/// Scopes requested during authorization
pub const SCOPES: &str = "read_vin read_vehicle_info read_location read_engine_oil read_battery \
                          read_charge read_fuel control_security read_odometer read_tires read_charge";

/// How long to wait for the user to complete the browser step
pub const AUTH_TIMEOUT_SECS: u64 = 300;

/// Redirect content forwarded from the callback handler
struct CallbackQuery {
    code: Option<String>,
}

/// Runs the interactive authorization flow and yields the authorization code
pub struct AuthorizationFlow {
    client_id: String,
    port: u16,
    timeout: Duration,
    open_browser: bool,
    logger: crate::logging::StructuredLogger,
}

impl AuthorizationFlow {
    pub fn new(client_id: String) -> Self {
        Self {
            client_id,
            port: CALLBACK_PORT,
            timeout: Duration::from_secs(AUTH_TIMEOUT_SECS),
            open_browser: true,
            logger: get_logger("auth_flow"),
        }
    }

    /// Override the callback port (tests bind throwaway ports)
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Override the redirect wait bound
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Disable the browser launch (tests drive the redirect themselves)
    pub fn without_browser(mut self) -> Self {
        self.open_browser = false;
        self
    }

    /// Build the authorization URL presented to the user
    pub fn authorization_url(&self) -> Result<String> {
        let url = reqwest::Url::parse_with_params(
            AUTH_URL,
            &[
                ("response_type", "code"),
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", REDIRECT_URI),
                ("scope", SCOPES),
                ("mode", "live"),
            ],
        )
        .map_err(|e| ChargeGuardError::token(format!("Invalid authorization URL: {}", e)))?;
        Ok(url.into())
    }

    fn callback_router(tx: Arc<Mutex<Option<oneshot::Sender<CallbackQuery>>>>) -> axum::Router {
        axum::Router::new().route(
            "/callback",
            axum::routing::get({
                move |query: axum::extract::Query<HashMap<String, String>>| {
                    let tx = tx.clone();
                    async move {
                        let code = query.get("code").cloned();
                        let reply = if code.is_some() {
                            (
                                axum::http::StatusCode::OK,
                                "Auth complete. You can close this tab.",
                            )
                        } else {
                            (axum::http::StatusCode::BAD_REQUEST, "Authorization failed.")
                        };
                        if let Some(sender) = tx.lock().await.take() {
                            let _ = sender.send(CallbackQuery { code });
                        }
                        reply
                    }
                }
            }),
        )
    }

    /// Run the flow: listen, present the URL, wait for exactly one redirect.
    ///
    /// Fails with a token error when the redirect never arrives within the
    /// timeout or arrives without a `code` query parameter. The listener
    /// serves a single request; anything after the first is ignored.
    pub async fn obtain_code(&self) -> Result<String> {
        let (tx, rx) = oneshot::channel::<CallbackQuery>();
        let tx = Arc::new(Mutex::new(Some(tx)));
        let app = Self::callback_router(tx);

        let bind_addr = format!("127.0.0.1:{}", self.port);
        let listener = tokio::net::TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| {
                ChargeGuardError::token(format!(
                    "Failed to start callback listener on port {}: {}",
                    self.port, e
                ))
            })?;
        self.logger
            .debug(&format!("Listening on http://{}...", bind_addr));

        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let auth_url = self.authorization_url()?;
        if self.open_browser {
            self.logger.info("Opening browser for authentication...");
            if let Err(e) = open::that(&auth_url) {
                self.logger.error(&format!("Failed to open browser: {}", e));
                self.logger
                    .info(&format!("Please manually visit: {}", auth_url));
            }
        }

        let outcome = tokio::time::timeout(self.timeout, rx).await;
        server.abort();

        match outcome {
            Err(_) => {
                self.logger.error("Authorization timeout");
                Err(ChargeGuardError::token(format!(
                    "Authorization flow timed out after {} seconds",
                    self.timeout.as_secs()
                )))
            }
            Ok(Err(_)) => Err(ChargeGuardError::token(
                "Authorization callback channel closed unexpectedly",
            )),
            Ok(Ok(CallbackQuery { code: Some(code) })) => {
                self.logger.debug("OAuth redirect received");
                Ok(code)
            }
            Ok(Ok(CallbackQuery { code: None })) => Err(ChargeGuardError::token(
                "Failed to receive authorization code",
            )),
        }
    }
}

#[async_trait::async_trait]
impl AuthCodeSource for AuthorizationFlow {
    async fn obtain_code(&self) -> Result<String> {
        AuthorizationFlow::obtain_code(self).await
    }
}
