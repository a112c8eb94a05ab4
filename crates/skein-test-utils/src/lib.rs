pub mod llm;
pub mod tools;

use std::sync::Arc;

use skein_core::config::{AppConfig, ModelConfig};
use skein_core::context::{ExecutionContext, VariableStore};
use skein_core::types::{ChatMessage, ContentBlock, Role};

pub use llm::{MockLlm, MockTurn};
pub use tools::{EchoTool, FlakyTool, HumanInputTool, ScreenshotTool, SlowTool, StatefulTool};

/// Default configuration pointing at a mock model.
pub fn test_config() -> AppConfig {
    AppConfig::with_model(ModelConfig::new("mock", "mock-model"))
}

/// A standalone execution context backed by a mock LLM.
pub fn test_context() -> ExecutionContext {
    ExecutionContext::new(
        "wf-test",
        "node-test",
        VariableStore::new(),
        Arc::new(MockLlm::always_text("ok")),
        Arc::new(test_config()),
    )
}

/// Assistant message carrying a single tool call.
pub fn assistant_tool_call(id: &str, name: &str, input: serde_json::Value) -> ChatMessage {
    ChatMessage {
        role: Role::Assistant,
        content: vec![ContentBlock::ToolUse {
            id: id.to_string(),
            name: name.to_string(),
            input,
        }],
        timestamp: None,
    }
}

/// User message answering `id` with `content`.
pub fn tool_result_msg(id: &str, content: &str) -> ChatMessage {
    let mut msg = ChatMessage::tool_result(id, content, false);
    msg.timestamp = None;
    msg
}

/// System + task prompt followed by `rounds` tool-call/tool-result exchanges.
///
/// Tool inputs carry `intent`/`reasoning` and results carry an `observation`,
/// so the transcript is fully collapsible by the rule-based compressor.
pub fn transcript(rounds: usize) -> Vec<ChatMessage> {
    let mut messages = vec![
        ChatMessage::system("You are a careful agent."),
        ChatMessage::user("Find the release date of Rust 1.0."),
    ];
    for i in 0..rounds {
        let id = format!("call-{}", i);
        messages.push(assistant_tool_call(
            &id,
            "search",
            serde_json::json!({
                "intent": format!("search step {}", i),
                "reasoning": format!("need more facts ({})", i),
                "query": "rust 1.0 release",
            }),
        ));
        messages.push(tool_result_msg(
            &id,
            &serde_json::json!({ "observation": format!("result {}", i) }).to_string(),
        ));
    }
    messages
}

/// A two-node workflow: `research` feeds `write` through the `findings` output.
pub const TWO_NODE_WORKFLOW: &str = r#"{
  "id": "wf-article",
  "name": "Write an article",
  "description": "Research a topic, then write about it",
  "variables": { "topic": "Rust async" },
  "nodes": [
    {
      "id": "research",
      "name": "Research",
      "description": "Collect facts about the topic",
      "dependencies": [],
      "action": { "type": "prompt", "name": "research", "description": "Use the lookup tool to research the topic", "tools": ["lookup"] },
      "input": { "items": [ { "name": "topic", "description": "What to research" } ] },
      "output": { "name": "findings", "description": "Key facts" }
    },
    {
      "id": "write",
      "name": "Write",
      "dependencies": ["research"],
      "action": { "type": "prompt", "name": "write", "description": "Write a short article", "tools": [] },
      "input": { "items": [ { "name": "findings", "description": "Facts to use" } ] },
      "output": { "name": "article", "description": "The finished article" }
    }
  ]
}"#;
