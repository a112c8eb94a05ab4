use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use skein_core::context::ExecutionContext;
use skein_core::error::{Result, SkeinError};
use skein_core::traits::Tool;
use skein_core::types::{ToolDefinition, ToolResult};

use crate::schema;

/// Registry of available tools.
///
/// Not synchronized: register everything during setup, then share the
/// registry behind an `Arc`.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. A tool with the same name is replaced.
    pub fn register(&mut self, tool: impl Tool) {
        self.register_arc(Arc::new(tool));
    }

    /// Register an already shared tool.
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            debug!(tool = %name, "Replaced existing tool");
        }
    }

    /// Unregister a tool by name.
    pub fn unregister(&mut self, name: &str) -> bool {
        self.tools.remove(name).is_some()
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Result<Arc<dyn Tool>> {
        self.tools
            .get(name)
            .cloned()
            .ok_or_else(|| SkeinError::ToolNotFound(name.to_string()))
    }

    /// Whether every name resolves to a registered tool.
    pub fn has_tools<S: AsRef<str>>(&self, names: &[S]) -> bool {
        names.iter().all(|n| self.tools.contains_key(n.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// All registered tool names, sorted.
    pub fn tool_enum(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Get tool definitions for sending to the LLM, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tool_enum()
            .iter()
            .filter_map(|n| self.tools.get(n))
            .map(|t| to_definition(t.as_ref()))
            .collect()
    }

    /// Definitions for a subset of tools, in the order given.
    ///
    /// An empty subset means every registered tool.
    pub fn definitions_for<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<ToolDefinition>> {
        if names.is_empty() {
            return Ok(self.definitions());
        }
        names
            .iter()
            .map(|n| self.get(n.as_ref()).map(|t| to_definition(t.as_ref())))
            .collect()
    }

    /// Validate input against the tool's schema, then execute it.
    pub async fn execute(
        &self,
        name: &str,
        input: serde_json::Value,
        ctx: ExecutionContext,
    ) -> Result<ToolResult> {
        let tool = self.get(name)?;

        if let Err(issues) = schema::validate(&tool.input_schema(), &input) {
            return Err(SkeinError::ToolValidation(format!(
                "{}: {}",
                name,
                issues.join("; ")
            )));
        }

        match tool.timeout_secs() {
            Some(secs) => {
                let timeout = std::time::Duration::from_secs(secs);
                match tokio::time::timeout(timeout, tool.execute(input, ctx)).await {
                    Ok(result) => result,
                    Err(_) => Err(SkeinError::ToolTimeout {
                        tool: name.to_string(),
                        timeout_secs: secs,
                    }),
                }
            }
            None => tool.execute(input, ctx).await,
        }
    }

    /// Run every tool's teardown hook against a finished context.
    pub async fn destroy_all(&self, ctx: &ExecutionContext) {
        for name in self.tool_enum() {
            if let Some(tool) = self.tools.get(&name) {
                tool.destroy(ctx).await;
            }
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn to_definition(tool: &dyn Tool) -> ToolDefinition {
    ToolDefinition {
        name: tool.name().to_string(),
        description: tool.description().to_string(),
        input_schema: tool.input_schema(),
    }
}
