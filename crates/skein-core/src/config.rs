use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SkeinError};

/// Shell commands run at workflow lifecycle points.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HooksConfig {
    #[serde(default)]
    pub before_workflow: Vec<String>,
    #[serde(default)]
    pub before_subtask: Vec<String>,
    #[serde(default)]
    pub after_subtask: Vec<String>,
    #[serde(default)]
    pub after_workflow: Vec<String>,
    #[serde(default)]
    pub on_tool_error: Vec<String>,
}

impl HooksConfig {
    pub fn is_empty(&self) -> bool {
        self.before_workflow.is_empty()
            && self.before_subtask.is_empty()
            && self.after_subtask.is_empty()
            && self.after_workflow.is_empty()
            && self.on_tool_error.is_empty()
    }
}

/// Top-level Skein configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub agent: AgentConfig,
    pub model: ModelConfig,
    #[serde(default)]
    pub hooks: Option<HooksConfig>,
}

impl AppConfig {
    /// Configuration with default agent settings for the given model.
    pub fn with_model(model: ModelConfig) -> Self {
        Self {
            agent: AgentConfig::default(),
            model,
            hooks: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Upper bound on Infer+Dispatch rounds per node.
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,
    /// Nodes that may run at once; 1 runs the workflow strictly sequentially.
    #[serde(default = "default_max_parallel_nodes")]
    pub max_parallel_nodes: usize,
    /// Run the tool calls of one round concurrently.
    #[serde(default)]
    pub parallel_tools: bool,
    /// Retries within a round for unparseable or schema-violating model output.
    #[serde(default = "default_max_output_retries")]
    pub max_output_retries: usize,
    /// Images kept in the transcript sent to the model; older ones become placeholders.
    #[serde(default = "default_max_retained_images")]
    pub max_retained_images: usize,
    #[serde(default = "default_max_tool_output_tokens")]
    pub max_tool_output_tokens: usize,
    /// Optional bound on a single LLM call. Unset means no engine-side timeout.
    #[serde(default)]
    pub llm_timeout_secs: Option<u64>,
    #[serde(default)]
    pub compression: CompressionConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            max_parallel_nodes: default_max_parallel_nodes(),
            parallel_tools: false,
            max_output_retries: default_max_output_retries(),
            max_retained_images: default_max_retained_images(),
            max_tool_output_tokens: default_max_tool_output_tokens(),
            llm_timeout_secs: None,
            compression: CompressionConfig::default(),
        }
    }
}

fn default_max_rounds() -> usize { 25 }
fn default_max_parallel_nodes() -> usize { 4 }
fn default_max_output_retries() -> usize { 2 }
fn default_max_retained_images() -> usize { 1 }
fn default_max_tool_output_tokens() -> usize { 4_000 }

/// Which history compressor the action loop applies.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CompressionStrategy {
    #[default]
    None,
    SimpleQa,
    Summary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionConfig {
    #[serde(default)]
    pub strategy: CompressionStrategy,
    /// Estimated transcript size (tokens) above which the compressor runs.
    #[serde(default = "default_trigger_tokens")]
    pub trigger_tokens: usize,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            strategy: CompressionStrategy::None,
            trigger_tokens: default_trigger_tokens(),
        }
    }
}

fn default_trigger_tokens() -> usize { 64_000 }

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    pub model_id: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl ModelConfig {
    pub fn new(provider: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model_id: model_id.into(),
            api_key: None,
            base_url: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

fn default_provider() -> String { "anthropic".to_string() }
fn default_max_tokens() -> u32 { 8192 }
fn default_temperature() -> f32 { 0.0 }

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| SkeinError::ConfigNotFound(path.display().to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse config from TOML text, with env var expansion.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(content);

        let config: Self =
            toml::from_str(&expanded).map_err(|e| SkeinError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.agent.max_rounds == 0 {
            return Err(SkeinError::Config("agent.max_rounds must be at least 1".into()));
        }
        if self.agent.max_parallel_nodes == 0 {
            return Err(SkeinError::Config(
                "agent.max_parallel_nodes must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    // Keep original if env var not set
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}
