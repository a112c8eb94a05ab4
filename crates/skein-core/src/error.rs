use thiserror::Error;

#[derive(Debug, Error)]
pub enum SkeinError {
    // LLM errors
    #[error("LLM request failed: {0}")]
    LlmRequest(String),

    #[error("LLM streaming error: {0}")]
    LlmStream(String),

    #[error("LLM response parse error: {0}")]
    LlmParse(String),

    #[error("LLM request timed out after {0}s")]
    LlmTimeout(u64),

    #[error("No LLM provider bound to workflow")]
    NoLlmProvider,

    // Tool errors
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid tool call: {0}")]
    InvalidTool(String),

    #[error("Tool execution failed: {tool}: {message}")]
    ToolExecution { tool: String, message: String },

    #[error("Tool timeout after {timeout_secs}s: {tool}")]
    ToolTimeout { tool: String, timeout_secs: u64 },

    #[error("Tool input validation failed: {0}")]
    ToolValidation(String),

    // Action loop errors
    #[error("Action exceeded max rounds ({0})")]
    MaxRoundsExceeded(usize),

    #[error("Output failed validation: {0}")]
    OutputValidation(String),

    #[error("Action cancelled")]
    Cancelled,

    // Workflow errors
    #[error("Invalid workflow: {0}")]
    WorkflowParse(String),

    #[error("Node '{node}' depends on unknown node '{dependency}'")]
    UnknownDependency { node: String, dependency: String },

    #[error("Node '{node}' reads output of '{source_node}' without declaring it as a dependency")]
    UnlistedDependency { node: String, source_node: String },

    #[error("Dependency cycle involving nodes: {}", .0.join(", "))]
    DependencyCycle(Vec<String>),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Dependency '{dependency}' of node '{node}' did not complete")]
    DependencyFailed { node: String, dependency: String },

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SkeinError {
    /// Validation errors are raised before execution and never retried.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::WorkflowParse(_)
                | Self::UnknownDependency { .. }
                | Self::UnlistedDependency { .. }
                | Self::DependencyCycle(_)
                | Self::ToolNotFound(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SkeinError>;
