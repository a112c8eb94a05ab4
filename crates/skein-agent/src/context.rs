use std::collections::HashMap;

use skein_core::types::{ChatMessage, ToolDefinition};

use crate::workflow::node::{ResolvedInput, WorkflowNode};

/// Assemble a system prompt from sections.
pub struct ContextBuilder {
    parts: Vec<String>,
}

impl ContextBuilder {
    pub fn new() -> Self {
        Self { parts: Vec::new() }
    }

    /// Add a base system prompt.
    pub fn with_base_prompt(mut self, prompt: &str) -> Self {
        self.parts.push(prompt.trim().to_string());
        self
    }

    /// Add a titled section. Empty bodies are skipped.
    pub fn with_section(mut self, title: &str, body: &str) -> Self {
        let body = body.trim();
        if !body.is_empty() {
            self.parts.push(format!("# {}\n\n{}", title, body));
        }
        self
    }

    /// Add the tool inventory.
    pub fn with_tools(mut self, tools: &[ToolDefinition]) -> Self {
        if !tools.is_empty() {
            let mut section = String::from("# Available Tools\n");
            for tool in tools {
                section.push_str(&format!("- **{}**: {}\n", tool.name, tool.description));
            }
            self.parts.push(section.trim_end().to_string());
        }
        self
    }

    /// Build the final system message.
    pub fn build(self) -> ChatMessage {
        ChatMessage::system(self.parts.join("\n\n---\n\n"))
    }
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

const BASE_SYSTEM_PROMPT: &str = r#"You are Skein, an agent that completes one subtask of a larger workflow.

## Guidelines
- Use the available tools to gather information rather than guessing
- Call tools with inputs that match their schema exactly
- If a tool fails, read the error and adjust your next call
- When the subtask is complete, reply with the final result and no tool calls
"#;

/// System prompt for one node activation: task, tool inventory and output contract.
pub fn build_system_prompt(node: &WorkflowNode, tools: &[ToolDefinition]) -> ChatMessage {
    let mut task = format!("Name: {}", node.name);
    if let Some(desc) = &node.description {
        task.push_str(&format!("\nGoal: {}", desc));
    }
    if !node.action.description.is_empty() {
        task.push_str(&format!("\nInstructions: {}", node.action.description));
    }

    let output = &node.output;
    let mut contract = format!("Produce `{}`", output.name);
    if !output.description.is_empty() {
        contract.push_str(&format!(": {}", output.description));
    }
    contract.push_str(".\nYour final message, sent without any tool call, is the output.");
    if let Some(schema) = &output.schema {
        let pretty = serde_json::to_string_pretty(schema).unwrap_or_else(|_| schema.to_string());
        contract.push_str(&format!(
            "\nReply with only a JSON value matching this schema:\n```json\n{}\n```",
            pretty
        ));
    }

    ContextBuilder::new()
        .with_base_prompt(BASE_SYSTEM_PROMPT)
        .with_section("Subtask", &task)
        .with_tools(tools)
        .with_section("Output", &contract)
        .build()
}

/// User prompt for one node activation: resolved inputs, then remaining shared variables.
pub fn build_user_prompt(
    node: &WorkflowNode,
    inputs: &[ResolvedInput],
    variables: &HashMap<String, serde_json::Value>,
) -> ChatMessage {
    let mut prompt = String::new();

    if !inputs.is_empty() {
        prompt.push_str("## Context Data\n\n");
        for input in inputs {
            if input.description.is_empty() {
                prompt.push_str(&format!("**{}**: {}\n", input.name, display(&input.value)));
            } else {
                prompt.push_str(&format!(
                    "**{}** ({}): {}\n",
                    input.name,
                    input.description,
                    display(&input.value)
                ));
            }
        }
        prompt.push_str("\n---\n\n");
    }

    let mut shared: Vec<(&String, &serde_json::Value)> = variables
        .iter()
        .filter(|(k, _)| !inputs.iter().any(|i| &i.name == *k))
        .collect();
    if !shared.is_empty() {
        shared.sort_by(|a, b| a.0.cmp(b.0));
        prompt.push_str("## Shared Variables\n\n");
        for (key, value) in shared {
            prompt.push_str(&format!("**{}**: {}\n", key, display(value)));
        }
        prompt.push_str("\n---\n\n");
    }

    let task: &str = if node.action.description.is_empty() {
        node.description.as_deref().unwrap_or(&node.name)
    } else {
        &node.action.description
    };
    prompt.push_str(task);
    ChatMessage::user(prompt)
}

fn display(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => "(not available)".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::node::Action;

    fn writer() -> WorkflowNode {
        WorkflowNode::new("write", "Writer")
            .with_action(Action::prompt("write", "Write an article."))
            .with_input("topic", "Subject")
            .with_output("article", "The finished article")
    }

    fn input(name: &str, value: serde_json::Value) -> ResolvedInput {
        ResolvedInput {
            name: name.into(),
            description: String::new(),
            value,
        }
    }

    #[test]
    fn test_system_prompt_sections() {
        let tools = vec![ToolDefinition {
            name: "lookup".into(),
            description: "Look things up".into(),
            input_schema: serde_json::json!({"type": "object"}),
        }];
        let text = build_system_prompt(&writer(), &tools).text();
        assert!(text.starts_with("You are Skein"));
        assert!(text.contains("Instructions: Write an article."));
        assert!(text.contains("- **lookup**: Look things up"));
        assert!(text.contains("Produce `article`: The finished article."));
        assert!(!text.contains("```json"));
    }

    #[test]
    fn test_system_prompt_with_schema() {
        let node = writer().with_output_schema(serde_json::json!({"type": "object"}));
        let text = build_system_prompt(&node, &[]).text();
        assert!(text.contains("```json"));
        assert!(!text.contains("Available Tools"));
    }

    #[test]
    fn test_user_prompt_with_inputs() {
        let mut vars = HashMap::new();
        vars.insert("topic".to_string(), serde_json::json!("Rust async"));
        vars.insert("style".to_string(), serde_json::json!("tutorial"));
        let inputs = vec![ResolvedInput {
            name: "topic".into(),
            description: "Subject".into(),
            value: serde_json::json!("Rust async"),
        }];

        let text = build_user_prompt(&writer(), &inputs, &vars).text();
        assert!(text.contains("**topic** (Subject): Rust async"));
        assert!(text.contains("## Shared Variables"));
        assert!(text.contains("**style**: tutorial"));
        assert_eq!(text.matches("Rust async").count(), 1);
        assert!(text.ends_with("Write an article."));
    }

    #[test]
    fn test_user_prompt_no_context() {
        let node = WorkflowNode::new("n1", "Simple").with_action(Action::prompt("n1", "Do something."));
        let text = build_user_prompt(&node, &[], &HashMap::new()).text();
        assert_eq!(text, "Do something.");
    }

    #[test]
    fn test_missing_input_and_json_values() {
        let inputs = vec![
            input("findings", serde_json::Value::Null),
            input("scores", serde_json::json!([1, 2])),
        ];
        let text = build_user_prompt(&writer(), &inputs, &HashMap::new()).text();
        assert!(text.contains("**findings**: (not available)"));
        assert!(text.contains("**scores**: [1,2]"));
    }
}
