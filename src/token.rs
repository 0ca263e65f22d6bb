//! Smartcar OAuth token lifecycle management
//!
//! A token record is either absent (no prior authorization) or complete:
//! access token, refresh token and expiry always travel together. The
//! manager recomputes the record's state on every call - valid, expiring
//! (within the refresh buffer) or missing - and performs the refresh or the
//! one-time interactive authorization as needed. Every successful mutation
//! is persisted before the access token is handed to the caller, so a crash
//! right after `get_valid_access_token` never loses tokens.

use crate::error::{ChargeGuardError, Result};
use crate::logging::get_logger;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Smartcar token endpoint
pub const TOKEN_URL: &str = "https://auth.smartcar.com/oauth/token";

/// Default token storage file
pub const TOKEN_FILE: &str = "tokens.json";

/// Refresh this many seconds before the recorded expiry
pub const TOKEN_BUFFER_SECONDS: f64 = 60.0;

/// Timeout for token endpoint calls
pub const TOKEN_HTTP_TIMEOUT_SECS: u64 = 30;

/// Current wall-clock time as epoch seconds
pub fn now_epoch_seconds() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_else(|_| std::time::Duration::from_secs(0))
        .as_secs_f64()
}

/// Token endpoint response body
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    /// Lifetime of the access token in seconds
    pub expires_in: f64,
}

/// Persisted token record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub access_token: String,
    pub refresh_token: String,
    /// Absolute expiry as epoch seconds
    pub expires_at: f64,
}

impl TokenRecord {
    /// Build a record from a token endpoint response received at `now`
    pub fn from_response(resp: TokenResponse, now: f64) -> Self {
        Self {
            access_token: resp.access_token,
            refresh_token: resp.refresh_token,
            expires_at: now + resp.expires_in,
        }
    }

    /// Whether the access token is expired or inside the refresh buffer
    pub fn is_expiring(&self, now: f64) -> bool {
        now >= self.expires_at - TOKEN_BUFFER_SECONDS
    }
}

/// File-based token persistence.
///
/// The file is read whole and rewritten whole; writes go to a temp file in
/// the same directory followed by a rename so a crash mid-write never leaves
/// a partial record behind.
pub struct TokenStore {
    path: PathBuf,
    logger: crate::logging::StructuredLogger,
}

impl TokenStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            logger: get_logger("token_store"),
        }
    }

    /// Load the stored record, if any.
    ///
    /// A missing file means no prior authorization and is not an error; an
    /// unreadable or unparseable file is.
    pub fn load(&self) -> Result<Option<TokenRecord>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&self.path).map_err(|e| {
            ChargeGuardError::token(format!(
                "Failed to load tokens from {}: {}",
                self.path.display(),
                e
            ))
        })?;
        let record: TokenRecord = serde_json::from_str(&contents).map_err(|e| {
            ChargeGuardError::token(format!(
                "Failed to parse tokens from {}: {}",
                self.path.display(),
                e
            ))
        })?;
        self.logger
            .info(&format!("Loaded tokens from {}", self.path.display()));
        Ok(Some(record))
    }

    /// Persist the record atomically (write-to-temp-then-rename)
    pub fn save(&self, record: &TokenRecord) -> Result<()> {
        let contents = serde_json::to_string(record)?;
        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, contents).map_err(|e| {
            ChargeGuardError::token(format!(
                "Failed to write tokens to {}: {}",
                tmp_path.display(),
                e
            ))
        })?;
        std::fs::rename(&tmp_path, &self.path).map_err(|e| {
            ChargeGuardError::token(format!(
                "Failed to move tokens into place at {}: {}",
                self.path.display(),
                e
            ))
        })?;
        self.logger
            .info(&format!("Tokens saved to {}", self.path.display()));
        Ok(())
    }
}

/// OAuth token endpoint operations
#[async_trait::async_trait]
pub trait OAuthApi: Send + Sync {
    /// Exchange an authorization code for an initial token pair
    async fn exchange_code(&self, code: &str) -> Result<TokenResponse>;

    /// Trade a refresh token for a fresh token pair
    async fn refresh_tokens(&self, refresh_token: &str) -> Result<TokenResponse>;
}

/// Source of a one-time authorization code (the interactive browser flow)
#[async_trait::async_trait]
pub trait AuthCodeSource: Send + Sync {
    async fn obtain_code(&self) -> Result<String>;
}

/// Smartcar implementation of the token endpoint
pub struct SmartcarAuthClient {
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    token_url: String,
    http: reqwest::Client,
    logger: crate::logging::StructuredLogger,
}

impl SmartcarAuthClient {
    pub fn new(client_id: String, client_secret: String, redirect_uri: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(TOKEN_HTTP_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client_id,
            client_secret,
            redirect_uri,
            token_url: TOKEN_URL.to_string(),
            http,
            logger: get_logger("smartcar_auth"),
        })
    }

    async fn post_form(&self, form: &[(&str, &str)], what: &str) -> Result<TokenResponse> {
        let resp = self
            .http
            .post(&self.token_url)
            .form(form)
            .send()
            .await
            .map_err(|e| ChargeGuardError::token(format!("Failed to {}: {}", what, e)))?;

        let status = resp.status();
        self.logger
            .debug(&format!("Token endpoint response: {} ({})", status, what));
        if !status.is_success() {
            return Err(ChargeGuardError::token(format!(
                "Token endpoint returned {} during {}",
                status, what
            )));
        }

        resp.json::<TokenResponse>()
            .await
            .map_err(|e| ChargeGuardError::token(format!("Invalid token response: {}", e)))
    }
}

#[async_trait::async_trait]
impl OAuthApi for SmartcarAuthClient {
    async fn exchange_code(&self, code: &str) -> Result<TokenResponse> {
        self.logger.info("Exchanging code for tokens...");
        self.post_form(
            &[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", &self.client_id),
                ("client_secret", &self.client_secret),
                ("redirect_uri", &self.redirect_uri),
            ],
            "code exchange",
        )
        .await
    }

    async fn refresh_tokens(&self, refresh_token: &str) -> Result<TokenResponse> {
        self.logger.info("Refreshing access token...");
        self.post_form(
            &[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", &self.client_id),
                ("client_secret", &self.client_secret),
            ],
            "token refresh",
        )
        .await
    }
}

/// Owns the token record for a run and produces valid bearer tokens on demand
pub struct TokenManager {
    store: TokenStore,
    auth: Box<dyn OAuthApi>,
    code_source: Box<dyn AuthCodeSource>,
    tokens: Option<TokenRecord>,
    logger: crate::logging::StructuredLogger,
}

impl TokenManager {
    /// Create the manager, loading any previously stored record
    pub fn new(
        store: TokenStore,
        auth: Box<dyn OAuthApi>,
        code_source: Box<dyn AuthCodeSource>,
    ) -> Result<Self> {
        let tokens = store.load()?;
        Ok(Self {
            store,
            auth,
            code_source,
            tokens,
            logger: get_logger("token_manager"),
        })
    }

    /// Whether a refresh token is available
    pub fn has_tokens(&self) -> bool {
        self.tokens.is_some()
    }

    /// Return an access token that is valid for at least the buffer window.
    ///
    /// Never returns a token known to be expired: a failed refresh
    /// propagates as an error and leaves the stored record untouched.
    pub async fn get_valid_access_token(&mut self) -> Result<String> {
        let now = now_epoch_seconds();

        match &self.tokens {
            None => {
                self.logger
                    .info("No refresh token found. Starting full OAuth flow...");
                let code = self.code_source.obtain_code().await?;
                let resp = self.auth.exchange_code(&code).await?;
                self.install(TokenRecord::from_response(resp, now_epoch_seconds()))?;
            }
            Some(record) if record.is_expiring(now) => {
                let resp = self.auth.refresh_tokens(&record.refresh_token).await?;
                self.install(TokenRecord::from_response(resp, now_epoch_seconds()))?;
            }
            Some(_) => {}
        }

        match &self.tokens {
            Some(record) => Ok(record.access_token.clone()),
            // Unreachable: install() always sets the record on success
            None => Err(ChargeGuardError::token("No access token available")),
        }
    }

    /// Persist and adopt a freshly minted record
    fn install(&mut self, record: TokenRecord) -> Result<()> {
        self.store.save(&record)?;
        if let Some(dt) = chrono::DateTime::from_timestamp(record.expires_at as i64, 0) {
            self.logger
                .debug(&format!("Access token valid until {}", dt.to_rfc3339()));
        }
        self.tokens = Some(record);
        Ok(())
    }
}
