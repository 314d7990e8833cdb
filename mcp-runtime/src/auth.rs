//! Token storage, the Google OAuth helper, and the expiry-aware token
//! manager.
//!
//! Refreshes for one user key are single-flight: concurrent callers
//! serialize on a per-key mutex and the loser re-reads the store instead
//! of issuing a second upstream refresh.

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::{Arc, Mutex as SyncMutex};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{Duration, Utc};
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use url::Url;

use searchlens_core::auth::Token;

use crate::util;

const GOOGLE_AUTH_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
const SEARCH_CONSOLE_SCOPE: &str = "https://www.googleapis.com/auth/webmasters";

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("no stored credentials for '{0}'")]
    Missing(String),
    #[error("OAuth client is not configured; set SEARCHLENS_OAUTH_CLIENT_ID and SEARCHLENS_OAUTH_CLIENT_SECRET")]
    NotConfigured,
    #[error("token refresh failed: {0}")]
    RefreshFailed(String),
    #[error("authorization code exchange failed: {0}")]
    ExchangeFailed(String),
    #[error("request to OAuth endpoint failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("failed to persist credentials: {0}")]
    Storage(String),
}

/// Keyed token persistence. One entry per caller identity.
pub trait TokenStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Token>;
    fn put(&self, key: &str, token: Token) -> Result<(), AuthError>;
    fn delete(&self, key: &str) -> Result<(), AuthError>;
}

/// JSON file under the user config dir, written 0o600.
pub struct FileTokenStore {
    path: PathBuf,
    // Serializes read-modify-write cycles against the backing file.
    guard: SyncMutex<()>,
}

impl FileTokenStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            guard: SyncMutex::new(()),
        }
    }

    pub fn default_path() -> Self {
        Self::new(util::tokens_path())
    }
}

impl TokenStore for FileTokenStore {
    fn get(&self, key: &str) -> Option<Token> {
        let _guard = self.guard.lock().unwrap_or_else(|e| e.into_inner());
        util::load_tokens(&self.path).remove(key)
    }

    fn put(&self, key: &str, token: Token) -> Result<(), AuthError> {
        let _guard = self.guard.lock().unwrap_or_else(|e| e.into_inner());
        let mut tokens = util::load_tokens(&self.path);
        tokens.insert(key.to_string(), token);
        util::save_tokens(&self.path, &tokens).map_err(|e| AuthError::Storage(e.to_string()))
    }

    fn delete(&self, key: &str) -> Result<(), AuthError> {
        let _guard = self.guard.lock().unwrap_or_else(|e| e.into_inner());
        let mut tokens = util::load_tokens(&self.path);
        tokens.remove(key);
        util::save_tokens(&self.path, &tokens).map_err(|e| AuthError::Storage(e.to_string()))
    }
}

/// In-memory store for tests and ephemeral deployments.
#[derive(Default)]
pub struct MemoryTokenStore {
    tokens: SyncMutex<HashMap<String, Token>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self, key: &str) -> Option<Token> {
        let tokens = self.tokens.lock().unwrap_or_else(|e| e.into_inner());
        tokens.get(key).cloned()
    }

    fn put(&self, key: &str, token: Token) -> Result<(), AuthError> {
        let mut tokens = self.tokens.lock().unwrap_or_else(|e| e.into_inner());
        tokens.insert(key.to_string(), token);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), AuthError> {
        let mut tokens = self.tokens.lock().unwrap_or_else(|e| e.into_inner());
        tokens.remove(key);
        Ok(())
    }
}

pub type RefreshFuture<'a> = Pin<Box<dyn Future<Output = Result<Token, AuthError>> + Send + 'a>>;

/// Exchanges an expired token for a fresh one.
pub trait TokenRefresher: Send + Sync {
    fn refresh<'a>(&'a self, token: &'a Token) -> RefreshFuture<'a>;
}

/// PKCE verifier/challenge pair (S256).
#[derive(Debug, Clone)]
pub struct PkceChallenge {
    pub verifier: String,
    pub challenge: String,
}

impl PkceChallenge {
    pub fn generate() -> Self {
        let verifier: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(64)
            .map(char::from)
            .collect();
        let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
        Self { verifier, challenge }
    }
}

/// Opaque CSRF state for the authorization redirect.
pub fn oauth_state() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

#[derive(Deserialize)]
struct TokenEndpointResponse {
    access_token: String,
    // Google omits refresh_token on refresh responses; the stored one
    // stays valid.
    #[serde(default)]
    refresh_token: Option<String>,
    expires_in: i64,
}

/// Google OAuth client for the Search Console scope.
#[derive(Clone)]
pub struct GoogleOauth {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    auth_endpoint: String,
    token_endpoint: String,
}

impl GoogleOauth {
    pub fn from_env() -> Self {
        Self {
            http: util::client(),
            client_id: std::env::var("SEARCHLENS_OAUTH_CLIENT_ID").unwrap_or_default(),
            client_secret: std::env::var("SEARCHLENS_OAUTH_CLIENT_SECRET").unwrap_or_default(),
            redirect_uri: std::env::var("SEARCHLENS_OAUTH_REDIRECT_URI")
                .unwrap_or_else(|_| "http://localhost:3000/oauth/callback".to_string()),
            auth_endpoint: GOOGLE_AUTH_ENDPOINT.to_string(),
            token_endpoint: GOOGLE_TOKEN_ENDPOINT.to_string(),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty()
    }

    /// Authorization URL for the browser redirect. `access_type=offline`
    /// and `prompt=consent` make Google return a refresh token.
    pub fn build_auth_url(&self, state: &str, pkce: &PkceChallenge) -> Result<String, AuthError> {
        if !self.is_configured() {
            return Err(AuthError::NotConfigured);
        }
        let mut url = Url::parse(&self.auth_endpoint)
            .map_err(|e| AuthError::ExchangeFailed(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", SEARCH_CONSOLE_SCOPE)
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent")
            .append_pair("state", state)
            .append_pair("code_challenge", &pkce.challenge)
            .append_pair("code_challenge_method", "S256");
        Ok(url.to_string())
    }

    pub async fn exchange_code(&self, code: &str, verifier: &str) -> Result<Token, AuthError> {
        if !self.is_configured() {
            return Err(AuthError::NotConfigured);
        }
        let resp = self
            .http
            .post(&self.token_endpoint)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("code_verifier", verifier),
                ("redirect_uri", &self.redirect_uri),
                ("client_id", &self.client_id),
                ("client_secret", &self.client_secret),
            ])
            .send()
            .await?;

        if !resp.status().is_success() {
            let body: serde_json::Value = resp.json().await.unwrap_or_else(|_| json!({}));
            return Err(AuthError::ExchangeFailed(body.to_string()));
        }

        let payload: TokenEndpointResponse = resp.json().await?;
        Ok(Token {
            access_token: payload.access_token,
            refresh_token: payload.refresh_token.unwrap_or_default(),
            expires_at: Utc::now() + Duration::seconds(payload.expires_in),
        })
    }

    async fn refresh_token(&self, token: &Token) -> Result<Token, AuthError> {
        if !self.is_configured() {
            return Err(AuthError::NotConfigured);
        }
        let resp = self
            .http
            .post(&self.token_endpoint)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", &token.refresh_token),
                ("client_id", &self.client_id),
                ("client_secret", &self.client_secret),
            ])
            .send()
            .await?;

        if !resp.status().is_success() {
            let body: serde_json::Value = resp.json().await.unwrap_or_else(|_| json!({}));
            return Err(AuthError::RefreshFailed(body.to_string()));
        }

        let payload: TokenEndpointResponse = resp.json().await?;
        Ok(Token {
            access_token: payload.access_token,
            refresh_token: payload
                .refresh_token
                .unwrap_or_else(|| token.refresh_token.clone()),
            expires_at: Utc::now() + Duration::seconds(payload.expires_in),
        })
    }
}

impl TokenRefresher for GoogleOauth {
    fn refresh<'a>(&'a self, token: &'a Token) -> RefreshFuture<'a> {
        Box::pin(self.refresh_token(token))
    }
}

/// Expiry-aware token access over a store and a refresher.
pub struct TokenManager {
    store: Arc<dyn TokenStore>,
    refresher: Arc<dyn TokenRefresher>,
    refresh_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl TokenManager {
    pub fn new(store: Arc<dyn TokenStore>, refresher: Arc<dyn TokenRefresher>) -> Self {
        Self {
            store,
            refresher,
            refresh_locks: Mutex::new(HashMap::new()),
        }
    }

    async fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.refresh_locks.lock().await;
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// A valid access token for `key`, refreshing if the stored one is
    /// inside the expiry window.
    pub async fn access_token(&self, key: &str) -> Result<String, AuthError> {
        let token = self
            .store
            .get(key)
            .ok_or_else(|| AuthError::Missing(key.to_string()))?;
        if !token.is_expired() {
            return Ok(token.access_token);
        }

        let lock = self.lock_for(key).await;
        let _guard = lock.lock().await;

        // A racing caller may have refreshed while we waited on the lock.
        let current = self
            .store
            .get(key)
            .ok_or_else(|| AuthError::Missing(key.to_string()))?;
        if !current.is_expired() {
            return Ok(current.access_token);
        }

        tracing::info!(event = "token_refresh", user_key = %key, "Refreshing expired access token");
        let refreshed = self.refresher.refresh(&current).await?;
        self.store.put(key, refreshed.clone())?;
        Ok(refreshed.access_token)
    }

    pub fn store_token(&self, key: &str, token: Token) -> Result<(), AuthError> {
        self.store.put(key, token)
    }

    pub fn forget(&self, key: &str) -> Result<(), AuthError> {
        self.store.delete(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingRefresher {
        calls: AtomicUsize,
    }

    impl CountingRefresher {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl TokenRefresher for CountingRefresher {
        fn refresh<'a>(&'a self, token: &'a Token) -> RefreshFuture<'a> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let refresh_token = token.refresh_token.clone();
            Box::pin(async move {
                // Simulate upstream latency so concurrent callers overlap.
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                Ok(Token {
                    access_token: "fresh".to_string(),
                    refresh_token,
                    expires_at: Utc::now() + Duration::hours(1),
                })
            })
        }
    }

    fn expired_token() -> Token {
        Token {
            access_token: "stale".to_string(),
            refresh_token: "rt".to_string(),
            expires_at: Utc::now() - Duration::minutes(1),
        }
    }

    fn manager_with(token: Option<Token>) -> (Arc<TokenManager>, Arc<CountingRefresher>) {
        let store = Arc::new(MemoryTokenStore::new());
        if let Some(token) = token {
            store.put("default", token).unwrap();
        }
        let refresher = Arc::new(CountingRefresher::new());
        (
            Arc::new(TokenManager::new(store, refresher.clone())),
            refresher,
        )
    }

    #[tokio::test]
    async fn fresh_token_is_returned_without_refresh() {
        let fresh = Token {
            access_token: "live".to_string(),
            refresh_token: "rt".to_string(),
            expires_at: Utc::now() + Duration::hours(1),
        };
        let (manager, refresher) = manager_with(Some(fresh));
        assert_eq!(manager.access_token("default").await.unwrap(), "live");
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_credentials_surface_an_error() {
        let (manager, _) = manager_with(None);
        let err = manager.access_token("default").await.unwrap_err();
        assert!(matches!(err, AuthError::Missing(_)));
    }

    #[tokio::test]
    async fn concurrent_callers_share_a_single_refresh() {
        let (manager, refresher) = manager_with(Some(expired_token()));

        let (a, b, c) = tokio::join!(
            manager.access_token("default"),
            manager.access_token("default"),
            manager.access_token("default"),
        );
        assert_eq!(a.unwrap(), "fresh");
        assert_eq!(b.unwrap(), "fresh");
        assert_eq!(c.unwrap(), "fresh");
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn refresh_persists_the_new_token() {
        let (manager, refresher) = manager_with(Some(expired_token()));
        manager.access_token("default").await.unwrap();
        // Second call sees the refreshed token in the store.
        manager.access_token("default").await.unwrap();
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn pkce_challenge_is_base64url_of_sha256() {
        let pkce = PkceChallenge::generate();
        let expected = URL_SAFE_NO_PAD.encode(Sha256::digest(pkce.verifier.as_bytes()));
        assert_eq!(pkce.challenge, expected);
        assert_eq!(pkce.verifier.len(), 64);
    }

    #[test]
    fn auth_url_carries_scope_state_and_challenge() {
        let oauth = GoogleOauth {
            http: util::client(),
            client_id: "cid".to_string(),
            client_secret: "secret".to_string(),
            redirect_uri: "http://localhost:3000/oauth/callback".to_string(),
            auth_endpoint: GOOGLE_AUTH_ENDPOINT.to_string(),
            token_endpoint: GOOGLE_TOKEN_ENDPOINT.to_string(),
        };
        let pkce = PkceChallenge::generate();
        let url = oauth.build_auth_url("st4te", &pkce).unwrap();
        assert!(url.contains("client_id=cid"));
        assert!(url.contains("state=st4te"));
        assert!(url.contains("code_challenge_method=S256"));
        assert!(url.contains("access_type=offline"));
    }

    #[test]
    fn unconfigured_oauth_refuses_to_build_urls() {
        let oauth = GoogleOauth {
            http: util::client(),
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: String::new(),
            auth_endpoint: GOOGLE_AUTH_ENDPOINT.to_string(),
            token_endpoint: GOOGLE_TOKEN_ENDPOINT.to_string(),
        };
        let pkce = PkceChallenge::generate();
        assert!(matches!(
            oauth.build_auth_url("s", &pkce),
            Err(AuthError::NotConfigured)
        ));
    }
}
