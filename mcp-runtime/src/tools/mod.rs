//! The Search Console tool surface.
//!
//! Registration order is position-significant: discovery/property tools
//! come first, then analytics, inspection, and sitemap tools. Report
//! tools degrade upstream failures to a readable `Error: ...` text block;
//! mutation tools propagate a `ToolError` to the dispatcher boundary.

use serde_json::{Map, Value};

use searchlens_core::error::codes;

use crate::ToolError;
use crate::gsc::UpstreamError;
use crate::registry::{DuplicateToolError, ToolRegistry};

mod analytics;
mod inspection;
mod properties;
mod sitemaps;

pub fn build_registry() -> Result<ToolRegistry, DuplicateToolError> {
    let mut registry = ToolRegistry::new();
    for descriptor in properties::descriptors() {
        registry.register(descriptor)?;
    }
    for descriptor in analytics::descriptors() {
        registry.register(descriptor)?;
    }
    for descriptor in inspection::descriptors() {
        registry.register(descriptor)?;
    }
    for descriptor in sitemaps::descriptors() {
        registry.register(descriptor)?;
    }
    Ok(registry)
}

// Argument accessors for validated args. The schema gate guarantees
// presence and type; the fallbacks are never observable through the
// dispatcher.

fn str_arg<'a>(args: &'a Map<String, Value>, key: &str) -> &'a str {
    args.get(key).and_then(Value::as_str).unwrap_or_default()
}

fn u64_arg(args: &Map<String, Value>, key: &str, fallback: u64) -> u64 {
    args.get(key).and_then(Value::as_u64).unwrap_or(fallback)
}

fn opt_str_arg<'a>(args: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

fn upstream_tool_error(err: UpstreamError) -> ToolError {
    ToolError::new(codes::UPSTREAM_ERROR, err.to_string())
}
