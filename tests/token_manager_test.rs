use chargeguard::error::{ChargeGuardError, Result};
use chargeguard::token::{
    AuthCodeSource, OAuthApi, TokenManager, TokenRecord, TokenResponse, TokenStore,
    now_epoch_seconds,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

struct FakeOAuth {
    exchanges: Arc<AtomicUsize>,
    refreshes: Arc<AtomicUsize>,
    fail_refresh: bool,
}

impl FakeOAuth {
    fn new() -> (Self, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let exchanges = Arc::new(AtomicUsize::new(0));
        let refreshes = Arc::new(AtomicUsize::new(0));
        (
            Self {
                exchanges: exchanges.clone(),
                refreshes: refreshes.clone(),
                fail_refresh: false,
            },
            exchanges,
            refreshes,
        )
    }

    fn failing_refresh() -> (Self, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let (mut fake, ex, rf) = Self::new();
        fake.fail_refresh = true;
        (fake, ex, rf)
    }
}

#[async_trait::async_trait]
impl OAuthApi for FakeOAuth {
    async fn exchange_code(&self, code: &str) -> Result<TokenResponse> {
        self.exchanges.fetch_add(1, Ordering::SeqCst);
        Ok(TokenResponse {
            access_token: format!("access-for-{}", code),
            refresh_token: "initial-refresh".to_string(),
            expires_in: 7200.0,
        })
    }

    async fn refresh_tokens(&self, _refresh_token: &str) -> Result<TokenResponse> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        if self.fail_refresh {
            return Err(ChargeGuardError::token(
                "Token endpoint returned 401 Unauthorized during token refresh",
            ));
        }
        Ok(TokenResponse {
            access_token: "refreshed-access".to_string(),
            refresh_token: "rotated-refresh".to_string(),
            expires_in: 7200.0,
        })
    }
}

struct StubCodeSource;

#[async_trait::async_trait]
impl AuthCodeSource for StubCodeSource {
    async fn obtain_code(&self) -> Result<String> {
        Ok("stub-code".to_string())
    }
}

struct PanickingCodeSource;

#[async_trait::async_trait]
impl AuthCodeSource for PanickingCodeSource {
    async fn obtain_code(&self) -> Result<String> {
        panic!("authorization flow must not run when tokens exist");
    }
}

fn seeded_store(dir: &tempfile::TempDir, expires_at: f64) -> (TokenStore, std::path::PathBuf) {
    let path = dir.path().join("tokens.json");
    let store = TokenStore::new(&path);
    store
        .save(&TokenRecord {
            access_token: "stored-access".to_string(),
            refresh_token: "stored-refresh".to_string(),
            expires_at,
        })
        .unwrap();
    (TokenStore::new(&path), path)
}

#[tokio::test]
async fn expired_token_triggers_exactly_one_refresh() {
    let dir = tempfile::tempdir().unwrap();
    let (store, path) = seeded_store(&dir, now_epoch_seconds() - 10.0);
    let (fake, exchanges, refreshes) = FakeOAuth::new();

    let mut mgr =
        TokenManager::new(store, Box::new(fake), Box::new(PanickingCodeSource)).unwrap();
    let token = mgr.get_valid_access_token().await.unwrap();

    assert_eq!(token, "refreshed-access");
    assert_eq!(refreshes.load(Ordering::SeqCst), 1);
    assert_eq!(exchanges.load(Ordering::SeqCst), 0);

    // The rotated pair is on disk before the call returned
    let on_disk: TokenRecord =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(on_disk.access_token, "refreshed-access");
    assert_eq!(on_disk.refresh_token, "rotated-refresh");
}

#[tokio::test]
async fn token_inside_buffer_is_refreshed() {
    let dir = tempfile::tempdir().unwrap();
    // 30s of life left is inside the 60s buffer
    let (store, _path) = seeded_store(&dir, now_epoch_seconds() + 30.0);
    let (fake, _exchanges, refreshes) = FakeOAuth::new();

    let mut mgr =
        TokenManager::new(store, Box::new(fake), Box::new(PanickingCodeSource)).unwrap();
    mgr.get_valid_access_token().await.unwrap();
    assert_eq!(refreshes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn valid_token_is_returned_without_refresh() {
    let dir = tempfile::tempdir().unwrap();
    let (store, _path) = seeded_store(&dir, now_epoch_seconds() + 3600.0);
    let (fake, exchanges, refreshes) = FakeOAuth::new();

    let mut mgr =
        TokenManager::new(store, Box::new(fake), Box::new(PanickingCodeSource)).unwrap();
    let token = mgr.get_valid_access_token().await.unwrap();

    assert_eq!(token, "stored-access");
    assert_eq!(refreshes.load(Ordering::SeqCst), 0);
    assert_eq!(exchanges.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn failed_refresh_propagates_and_leaves_file_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let (store, path) = seeded_store(&dir, now_epoch_seconds() - 10.0);
    let before = std::fs::read_to_string(&path).unwrap();
    let (fake, _exchanges, refreshes) = FakeOAuth::failing_refresh();

    let mut mgr =
        TokenManager::new(store, Box::new(fake), Box::new(PanickingCodeSource)).unwrap();
    let err = mgr.get_valid_access_token().await.unwrap_err();

    assert!(matches!(err, ChargeGuardError::Token { .. }));
    assert_eq!(refreshes.load(Ordering::SeqCst), 1);
    // A stale token is never returned, and the stored record is unchanged
    assert_eq!(std::fs::read_to_string(&path).unwrap(), before);
}

#[tokio::test]
async fn missing_tokens_run_the_full_flow_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tokens.json");
    let (fake, exchanges, refreshes) = FakeOAuth::new();

    let mut mgr = TokenManager::new(
        TokenStore::new(&path),
        Box::new(fake),
        Box::new(StubCodeSource),
    )
    .unwrap();
    assert!(!mgr.has_tokens());

    let token = mgr.get_valid_access_token().await.unwrap();
    assert_eq!(token, "access-for-stub-code");
    assert_eq!(exchanges.load(Ordering::SeqCst), 1);
    assert_eq!(refreshes.load(Ordering::SeqCst), 0);
    assert!(mgr.has_tokens());

    // The initial record was persisted before the call returned
    let on_disk: TokenRecord =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(on_disk.refresh_token, "initial-refresh");
}

#[tokio::test]
async fn failed_flow_leaves_no_token_file() {
    struct FailingCodeSource;

    #[async_trait::async_trait]
    impl AuthCodeSource for FailingCodeSource {
        async fn obtain_code(&self) -> Result<String> {
            Err(ChargeGuardError::token(
                "Authorization flow timed out after 300 seconds",
            ))
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tokens.json");
    let (fake, exchanges, _refreshes) = FakeOAuth::new();

    let mut mgr = TokenManager::new(
        TokenStore::new(&path),
        Box::new(fake),
        Box::new(FailingCodeSource),
    )
    .unwrap();
    let err = mgr.get_valid_access_token().await.unwrap_err();

    assert!(matches!(err, ChargeGuardError::Token { .. }));
    assert_eq!(exchanges.load(Ordering::SeqCst), 0);
    assert!(!path.exists());
}
