//! Browser OAuth flow for connecting the adapter to a Google account.
//!
//! `GET /oauth/start` redirects to Google's consent screen with PKCE;
//! `GET /oauth/callback` exchanges the authorization code and stores the
//! resulting token under the configured user key.

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Redirect, Response};
use axum::{Router, routing::get};
use serde::Deserialize;

use searchlens_mcp_runtime::auth::{GoogleOauth, PkceChallenge, oauth_state};

use crate::error::AppError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/oauth/start", get(oauth_start))
        .route("/oauth/callback", get(oauth_callback))
}

async fn oauth_start(State(state): State<AppState>) -> Result<Response, AppError> {
    let oauth = GoogleOauth::from_env();
    if !oauth.is_configured() {
        return Err(AppError::Validation {
            message: "OAuth client is not configured".to_string(),
            field: None,
            docs_hint: Some(
                "Set SEARCHLENS_OAUTH_CLIENT_ID and SEARCHLENS_OAUTH_CLIENT_SECRET.".to_string(),
            ),
        });
    }

    let csrf_state = oauth_state();
    let pkce = PkceChallenge::generate();
    let url = oauth
        .build_auth_url(&csrf_state, &pkce)
        .map_err(|e| AppError::Internal(e.to_string()))?;

    {
        let mut pending = state
            .pending_authorizations
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        pending.insert(csrf_state.clone(), pkce.verifier);
    }

    tracing::info!(event = "oauth_flow_started", "Redirecting to Google consent screen");
    Ok(Redirect::temporary(&url).into_response())
}

#[derive(Debug, Deserialize)]
struct CallbackParams {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

async fn oauth_callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> Result<Response, AppError> {
    if let Some(error) = params.error {
        return Err(AppError::Unauthorized {
            message: format!("Authorization was denied: {error}"),
        });
    }

    let (code, csrf_state) = match (params.code, params.state) {
        (Some(code), Some(csrf_state)) => (code, csrf_state),
        _ => {
            return Err(AppError::Validation {
                message: "Callback is missing 'code' or 'state'".to_string(),
                field: None,
                docs_hint: None,
            });
        }
    };

    let verifier = {
        let mut pending = state
            .pending_authorizations
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        pending.remove(&csrf_state)
    };
    let Some(verifier) = verifier else {
        return Err(AppError::Unauthorized {
            message: "Unknown or expired authorization state".to_string(),
        });
    };

    let oauth = GoogleOauth::from_env();
    let token = oauth
        .exchange_code(&code, &verifier)
        .await
        .map_err(|e| AppError::Unauthorized {
            message: format!("Code exchange failed: {e}"),
        })?;

    state
        .auth
        .store_token(&state.runtime.user_key, token)
        .map_err(|e| AppError::Internal(e.to_string()))?;

    tracing::info!(
        event = "oauth_flow_completed",
        user_key = %state.runtime.user_key,
        "Stored Search Console credentials"
    );
    Ok((
        axum::http::StatusCode::OK,
        "Authorization complete. searchlens can now reach Search Console; \
         you can close this tab.",
    )
        .into_response())
}
