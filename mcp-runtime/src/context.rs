//! Per-connection execution context.
//!
//! Built once per connection by the transport layer and passed by
//! reference into every tool invocation, with no ambient mutable state. The
//! token manager is the one collaborator shared across connections.

use std::sync::Arc;
use std::time::Duration;

use searchlens_core::error::codes;

use crate::ToolError;
use crate::auth::{AuthError, TokenManager};
use crate::gsc::SearchConsoleClient;

const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 30;

#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    /// Identity key into the token store.
    pub user_key: String,
    /// Bypasses the store entirely when set.
    pub explicit_token: Option<String>,
    pub tool_timeout: Duration,
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        let tool_timeout = std::env::var("SEARCHLENS_TOOL_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|&secs| secs > 0)
            .unwrap_or(DEFAULT_TOOL_TIMEOUT_SECS);
        Self {
            user_key: std::env::var("SEARCHLENS_USER_KEY")
                .unwrap_or_else(|_| "default".to_string()),
            explicit_token: std::env::var("SEARCHLENS_ACCESS_TOKEN")
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
            tool_timeout: Duration::from_secs(tool_timeout),
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            user_key: "default".to_string(),
            explicit_token: None,
            tool_timeout: Duration::from_secs(DEFAULT_TOOL_TIMEOUT_SECS),
        }
    }
}

pub struct ExecutionContext {
    pub config: RuntimeConfig,
    /// Correlates log lines from one connection's dispatch sequence.
    pub connection_id: String,
    pub gsc: SearchConsoleClient,
    auth: Arc<TokenManager>,
}

impl ExecutionContext {
    pub fn new(config: RuntimeConfig, auth: Arc<TokenManager>) -> Self {
        Self {
            config,
            connection_id: format!("conn-{}", uuid::Uuid::now_v7()),
            gsc: SearchConsoleClient::new(),
            auth,
        }
    }

    pub fn with_gsc(mut self, gsc: SearchConsoleClient) -> Self {
        self.gsc = gsc;
        self
    }

    /// Resolve the bearer token for the upstream call.
    pub async fn access_token(&self) -> Result<String, ToolError> {
        if let Some(token) = &self.config.explicit_token {
            return Ok(token.clone());
        }
        self.auth
            .access_token(&self.config.user_key)
            .await
            .map_err(|e| match e {
                AuthError::Missing(_) | AuthError::NotConfigured => {
                    ToolError::new(codes::AUTH_MISSING, e.to_string()).with_docs_hint(
                        "Complete the OAuth flow at /oauth/start or set SEARCHLENS_ACCESS_TOKEN.",
                    )
                }
                other => ToolError::new(codes::AUTH_REFRESH_FAILED, other.to_string())
                    .with_docs_hint("Re-run the OAuth flow to obtain fresh credentials."),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{GoogleOauth, MemoryTokenStore};

    fn manager() -> Arc<TokenManager> {
        Arc::new(TokenManager::new(
            Arc::new(MemoryTokenStore::new()),
            Arc::new(GoogleOauth::from_env()),
        ))
    }

    #[tokio::test]
    async fn explicit_token_bypasses_the_store() {
        let config = RuntimeConfig {
            explicit_token: Some("static-token".to_string()),
            ..RuntimeConfig::default()
        };
        let ctx = ExecutionContext::new(config, manager());
        assert_eq!(ctx.access_token().await.unwrap(), "static-token");
    }

    #[tokio::test]
    async fn missing_credentials_surface_auth_missing() {
        let ctx = ExecutionContext::new(RuntimeConfig::default(), manager());
        let err = ctx.access_token().await.unwrap_err();
        assert_eq!(err.code, codes::AUTH_MISSING);
        assert!(err.docs_hint.is_some());
    }
}
