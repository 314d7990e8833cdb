use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use searchlens_mcp_runtime::auth::TokenManager;
use searchlens_mcp_runtime::context::RuntimeConfig;
use searchlens_mcp_runtime::registry::ToolRegistry;

#[derive(Clone)]
pub struct AppState {
    /// Built once at startup, read-only afterwards.
    pub registry: Arc<ToolRegistry>,
    pub auth: Arc<TokenManager>,
    pub runtime: RuntimeConfig,
    /// PKCE verifiers for in-flight OAuth authorizations, keyed by state.
    pub pending_authorizations: Arc<Mutex<HashMap<String, String>>>,
}
