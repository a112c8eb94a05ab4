use serde::{Deserialize, Serialize};

use skein_core::config::ModelConfig;

/// One subtask in a workflow DAG.
///
/// A node runs its [`Action`] once all nodes listed in `dependencies` have
/// committed their outputs. Its declared inputs are filled from those outputs
/// and from the workflow's variable store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkflowNode {
    /// Unique identifier for this node.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Ids of nodes that must complete before this one starts. Required in
    /// descriptions, even when empty.
    pub dependencies: Vec<String>,
    pub action: Action,
    #[serde(default)]
    pub input: NodeInput,
    pub output: NodeOutput,
}

impl WorkflowNode {
    /// Create a node with a prompt action named after the node.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            action: Action::prompt(id.clone(), ""),
            output: NodeOutput::new(format!("{}_output", id), ""),
            id,
            name: name.into(),
            description: None,
            dependencies: vec![],
            input: NodeInput::default(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_dependencies(mut self, deps: &[&str]) -> Self {
        self.dependencies = deps.iter().map(|d| d.to_string()).collect();
        self
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.action = action;
        self
    }

    /// Declare an input consumed by this node.
    pub fn with_input(mut self, name: impl Into<String>, description: impl Into<String>) -> Self {
        self.input.items.push(InputItem {
            name: name.into(),
            description: description.into(),
        });
        self
    }

    pub fn with_output(mut self, name: impl Into<String>, description: impl Into<String>) -> Self {
        self.output = NodeOutput::new(name, description);
        self
    }

    pub fn with_output_schema(mut self, schema: serde_json::Value) -> Self {
        self.output.schema = Some(schema);
        self
    }
}

/// Kind of work an action performs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Tool-calling LLM loop driven by a prompt.
    Prompt,
}

/// What a node does when activated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type")]
    pub kind: ActionKind,
    #[serde(default)]
    pub name: String,
    /// Instructions given to the model.
    #[serde(default)]
    pub description: String,
    /// Tool names this action may call (empty = all registered tools).
    #[serde(default)]
    pub tools: Vec<String>,
    /// Round budget; falls back to `agent.max_rounds`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_rounds: Option<usize>,
    #[serde(default, skip_serializing_if = "LlmOverrides::is_empty")]
    pub llm: LlmOverrides,
}

impl Action {
    pub fn prompt(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            kind: ActionKind::Prompt,
            name: name.into(),
            description: description.into(),
            tools: vec![],
            max_rounds: None,
            llm: LlmOverrides::default(),
        }
    }

    pub fn with_tools(mut self, tools: &[&str]) -> Self {
        self.tools = tools.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn with_max_rounds(mut self, rounds: usize) -> Self {
        self.max_rounds = Some(rounds);
        self
    }

    /// Whether the action may call `tool`.
    pub fn allows_tool(&self, tool: &str) -> bool {
        self.tools.is_empty() || self.tools.iter().any(|t| t == tool)
    }
}

/// Per-action LLM parameter overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LlmOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl LlmOverrides {
    pub fn is_empty(&self) -> bool {
        self.model_id.is_none() && self.temperature.is_none() && self.max_tokens.is_none()
    }

    /// Apply the overrides on top of a base model configuration.
    pub fn apply(&self, base: &ModelConfig) -> ModelConfig {
        let mut model = base.clone();
        if let Some(id) = &self.model_id {
            model.model_id = id.clone();
        }
        if let Some(t) = self.temperature {
            model.temperature = t;
        }
        if let Some(m) = self.max_tokens {
            model.max_tokens = m;
        }
        model
    }
}

/// Ordered list of values a node consumes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeInput {
    #[serde(default)]
    pub items: Vec<InputItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputItem {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// What a node produces.
///
/// `value` is filled in once the node completes and is never read from a
/// workflow description.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeOutput {
    pub name: String,
    pub description: String,
    /// Optional JSON schema the final answer must satisfy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<serde_json::Value>,
    #[serde(skip)]
    pub value: Option<serde_json::Value>,
}

impl NodeOutput {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            schema: None,
            value: None,
        }
    }
}

/// An input item paired with the value resolved for it at activation time.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedInput {
    pub name: String,
    pub description: String,
    pub value: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_builder() {
        let node = WorkflowNode::new("n1", "Research")
            .with_description("Collect facts")
            .with_dependencies(&["n0"])
            .with_action(Action::prompt("research", "Look it up").with_tools(&["lookup"]).with_max_rounds(5))
            .with_input("topic", "What to research")
            .with_output("findings", "Key facts");

        assert_eq!(node.id, "n1");
        assert_eq!(node.dependencies, vec!["n0"]);
        assert_eq!(node.action.tools, vec!["lookup"]);
        assert_eq!(node.action.max_rounds, Some(5));
        assert_eq!(node.input.items[0].name, "topic");
        assert_eq!(node.output.name, "findings");
        assert!(node.output.value.is_none());
    }

    #[test]
    fn test_allows_tool() {
        let any = Action::prompt("a", "");
        assert!(any.allows_tool("anything"));
        let limited = Action::prompt("a", "").with_tools(&["x"]);
        assert!(limited.allows_tool("x"));
        assert!(!limited.allows_tool("y"));
    }

    #[test]
    fn test_overrides_apply() {
        let base = ModelConfig::new("mock", "base-model");
        let overrides = LlmOverrides {
            model_id: Some("fast-model".into()),
            temperature: Some(0.7),
            max_tokens: None,
        };
        let model = overrides.apply(&base);
        assert_eq!(model.model_id, "fast-model");
        assert_eq!(model.temperature, 0.7);
        assert_eq!(model.max_tokens, base.max_tokens);
        assert!(LlmOverrides::default().is_empty());
    }

    #[test]
    fn test_deserialize_node() {
        let json = serde_json::json!({
            "id": "write",
            "name": "Write",
            "dependencies": ["research"],
            "action": { "type": "prompt", "name": "write", "description": "Write it", "llm": { "temperature": 0.2 } },
            "input": { "items": [ { "name": "findings" } ] },
            "output": { "name": "article", "description": "The article" }
        });
        let node: WorkflowNode = serde_json::from_value(json).unwrap();
        assert_eq!(node.action.kind, ActionKind::Prompt);
        assert!(node.action.tools.is_empty());
        assert_eq!(node.action.llm.temperature, Some(0.2));
        assert_eq!(node.input.items[0].description, "");
    }

    #[test]
    fn test_unknown_action_type_rejected() {
        let json = serde_json::json!({
            "id": "n", "name": "N", "dependencies": [],
            "action": { "type": "script" },
            "output": { "name": "o", "description": "" }
        });
        assert!(serde_json::from_value::<WorkflowNode>(json).is_err());
    }

    fn minimal_node() -> serde_json::Value {
        serde_json::json!({
            "id": "n", "name": "N", "dependencies": [],
            "action": { "type": "prompt" },
            "output": { "name": "o", "description": "Result" }
        })
    }

    #[test]
    fn test_minimal_node_parses() {
        let node: WorkflowNode = serde_json::from_value(minimal_node()).unwrap();
        assert!(node.dependencies.is_empty());
        assert_eq!(node.output.description, "Result");
    }

    #[test]
    fn test_missing_dependencies_rejected() {
        let mut json = minimal_node();
        json.as_object_mut().unwrap().remove("dependencies");
        assert!(serde_json::from_value::<WorkflowNode>(json).is_err());
    }

    #[test]
    fn test_missing_output_description_rejected() {
        let mut json = minimal_node();
        json["output"].as_object_mut().unwrap().remove("description");
        assert!(serde_json::from_value::<WorkflowNode>(json).is_err());
    }

    #[test]
    fn test_unknown_node_field_rejected() {
        let mut json = minimal_node();
        json["retries"] = serde_json::json!(3);
        assert!(serde_json::from_value::<WorkflowNode>(json).is_err());
    }

    #[test]
    fn test_output_value_not_serialized() {
        let mut node = WorkflowNode::new("n", "N");
        node.output.value = Some(serde_json::json!("done"));
        let json = serde_json::to_value(&node).unwrap();
        assert!(json["output"].get("value").is_none());
    }
}
