//! Tool Registry and Dispatcher
//!
//! The registry is built once at startup and shared; the dispatcher executes
//! a model turn's tool calls against it, capturing every failure as a
//! [`ToolResult::Error`] instead of raising it.

use futures::future::join_all;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use call_agent_core::{ToolCall, ToolDefinition, ToolErrorKind, ToolInvocation, ToolResult};

use crate::tool::{Tool, ToolArgs, ToolContext};

/// Default timeout for tool execution
pub const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 10;

/// Tool registry
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool, replacing any tool with the same name
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Registered names, sorted
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Definitions for the enabled subset; unregistered names are skipped
    pub fn definitions_for(&self, enabled: &BTreeSet<String>) -> Vec<ToolDefinition> {
        enabled
            .iter()
            .filter_map(|name| match self.tools.get(name) {
                Some(tool) => Some(tool.definition()),
                None => {
                    tracing::warn!(tool = %name, "Enabled tool is not registered");
                    None
                }
            })
            .collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Executes tool calls with timeouts and error capture
#[derive(Clone)]
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    default_timeout: Duration,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>, default_timeout: Duration) -> Self {
        Self {
            registry,
            default_timeout,
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Run one tool. Never fails; errors come back as `ToolResult::Error`.
    pub async fn execute(&self, name: &str, args: &ToolArgs, ctx: &ToolContext) -> ToolResult {
        let Some(tool) = self.registry.get(name) else {
            tracing::warn!(call_id = %ctx.call_id, tool = name, "Unknown tool requested");
            metrics::counter!("call_tool_failures_total", "tool" => name.to_string()).increment(1);
            return ToolResult::error(ToolErrorKind::UnknownTool, format!("Unknown tool: {}", name));
        };

        let timeout = tool
            .timeout_secs()
            .map(Duration::from_secs)
            .unwrap_or(self.default_timeout);
        let start = Instant::now();

        let result = match tokio::time::timeout(timeout, tool.execute(args, ctx)).await {
            Ok(Ok(payload)) => ToolResult::ok(payload),
            Ok(Err(e)) => ToolResult::error(e.kind(), e.to_string()),
            Err(_) => ToolResult::error(
                ToolErrorKind::Timeout,
                format!("Tool '{}' timed out after {}s", name, timeout.as_secs()),
            ),
        };

        let elapsed_ms = start.elapsed().as_millis() as u64;
        metrics::histogram!("call_tool_latency_ms", "tool" => name.to_string())
            .record(elapsed_ms as f64);

        match &result {
            ToolResult::Ok { .. } => {
                tracing::info!(call_id = %ctx.call_id, tool = name, elapsed_ms, "Tool succeeded");
            }
            ToolResult::Error { kind, message } => {
                metrics::counter!("call_tool_failures_total", "tool" => name.to_string())
                    .increment(1);
                tracing::warn!(
                    call_id = %ctx.call_id,
                    tool = name,
                    kind = kind.as_str(),
                    error = %message,
                    elapsed_ms,
                    "Tool failed"
                );
            }
        }

        result
    }

    /// Run all of a model turn's calls concurrently; results keep call order
    pub async fn execute_all(&self, calls: &[ToolCall], ctx: &ToolContext) -> Vec<ToolInvocation> {
        let futures = calls.iter().map(|call| async move {
            ToolInvocation {
                name: call.name.clone(),
                arguments: call.arguments.clone(),
                result: self.execute(&call.name, &call.arguments, ctx).await,
            }
        });
        join_all(futures).await
    }
}
