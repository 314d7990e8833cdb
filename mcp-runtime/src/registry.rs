//! Tool descriptors and the registry that routes `tools/call` to them.
//!
//! The registry is built once at startup and read-only afterwards; it is
//! safely shared across connections. Enumeration order is registration
//! order. Callers may treat position as significant, so the registry
//! never sorts or deduplicates.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::{Map, Value};

use searchlens_core::content::ToolResult;

use crate::ToolError;
use crate::context::ExecutionContext;
use crate::schema::InputSchema;

pub type ToolFuture<'a> = Pin<Box<dyn Future<Output = Result<ToolResult, ToolError>> + Send + 'a>>;

type ExecuteFn =
    Arc<dyn for<'a> Fn(&'a ExecutionContext, Map<String, Value>) -> ToolFuture<'a> + Send + Sync>;

/// Static metadata plus the execute function for one tool. Immutable
/// after construction.
#[derive(Clone)]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub schema: InputSchema,
    execute: ExecuteFn,
}

impl ToolDescriptor {
    pub fn new<F>(
        name: &'static str,
        description: &'static str,
        schema: InputSchema,
        execute: F,
    ) -> Self
    where
        F: for<'a> Fn(&'a ExecutionContext, Map<String, Value>) -> ToolFuture<'a>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name,
            description,
            schema,
            execute: Arc::new(execute),
        }
    }

    /// Invoke the tool with already-validated arguments.
    pub async fn execute(
        &self,
        context: &ExecutionContext,
        args: Map<String, Value>,
    ) -> Result<ToolResult, ToolError> {
        (self.execute)(context, args).await
    }
}

impl std::fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, thiserror::Error)]
#[error("tool '{name}' is already registered")]
pub struct DuplicateToolError {
    pub name: &'static str,
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<ToolDescriptor>,
    index: HashMap<&'static str, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Duplicate names are a construction-time bug.
    pub fn register(&mut self, descriptor: ToolDescriptor) -> Result<(), DuplicateToolError> {
        if self.index.contains_key(descriptor.name) {
            return Err(DuplicateToolError {
                name: descriptor.name,
            });
        }
        self.index.insert(descriptor.name, self.tools.len());
        self.tools.push(descriptor);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<&ToolDescriptor> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    /// Descriptors in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &ToolDescriptor> {
        self.tools.iter()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_tool(name: &'static str) -> ToolDescriptor {
        ToolDescriptor::new(name, "test tool", InputSchema::new(), |_ctx, _args| {
            Box::pin(async { Ok(ToolResult::text("ok")) })
        })
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = ToolRegistry::new();
        registry.register(noop_tool("echo")).unwrap();
        let err = registry.register(noop_tool("echo")).unwrap_err();
        assert_eq!(err.name, "echo");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn enumeration_preserves_registration_order() {
        let mut registry = ToolRegistry::new();
        for name in ["c", "a", "b"] {
            registry.register(noop_tool(name)).unwrap();
        }
        let names: Vec<&str> = registry.iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["c", "a", "b"]);
    }

    #[test]
    fn lookup_finds_registered_tools() {
        let mut registry = ToolRegistry::new();
        registry.register(noop_tool("echo")).unwrap();
        assert!(registry.lookup("echo").is_some());
        assert!(registry.lookup("missing").is_none());
    }
}
