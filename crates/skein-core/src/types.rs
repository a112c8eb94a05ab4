use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role in a conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Base64-encoded image payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageSource {
    pub media_type: String,
    pub data: String,
}

/// A single content block in a message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },

    #[serde(rename = "image")]
    Image { source: ImageSource },

    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },

    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        content: String,
        is_error: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        image: Option<ImageSource>,
    },

    #[serde(rename = "thinking")]
    Thinking { thinking: String },
}

/// A chat message in the conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: Vec<ContentBlock>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ChatMessage {
    fn from_text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: vec![ContentBlock::Text { text: text.into() }],
            timestamp: Some(Utc::now()),
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::from_text(Role::System, text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::from_text(Role::User, text)
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self::from_text(Role::Assistant, text)
    }

    pub fn tool_result(tool_use_id: impl Into<String>, content: impl Into<String>, is_error: bool) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentBlock::ToolResult {
                tool_use_id: tool_use_id.into(),
                content: content.into(),
                is_error,
                image: None,
            }],
            timestamp: Some(Utc::now()),
        }
    }

    /// Extract all text content from this message.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    /// Extract all tool use blocks from this message.
    pub fn tool_uses(&self) -> Vec<(&str, &str, &serde_json::Value)> {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolUse { id, name, input } => Some((id.as_str(), name.as_str(), input)),
                _ => None,
            })
            .collect()
    }

    /// Tool results carried by this message as `(tool_use_id, content, is_error)`.
    pub fn tool_results(&self) -> Vec<(&str, &str, bool)> {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolResult {
                    tool_use_id,
                    content,
                    is_error,
                    ..
                } => Some((tool_use_id.as_str(), content.as_str(), *is_error)),
                _ => None,
            })
            .collect()
    }

    pub fn has_tool_uses(&self) -> bool {
        self.content
            .iter()
            .any(|b| matches!(b, ContentBlock::ToolUse { .. }))
    }

    pub fn has_tool_results(&self) -> bool {
        self.content
            .iter()
            .any(|b| matches!(b, ContentBlock::ToolResult { .. }))
    }

    /// Number of image payloads, whether standalone or attached to tool results.
    pub fn image_count(&self) -> usize {
        self.content
            .iter()
            .filter(|b| {
                matches!(
                    b,
                    ContentBlock::Image { .. } | ContentBlock::ToolResult { image: Some(_), .. }
                )
            })
            .count()
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
}

/// Stop reason from the LLM.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    StopSequence,
}

/// A streaming delta from the LLM.
#[derive(Debug, Clone)]
pub enum StreamDelta {
    /// A chunk of text content.
    TextDelta(String),

    /// A chunk of thinking/reasoning content.
    ThinkingDelta(String),

    /// Start of a tool use block.
    ToolUseStart {
        index: usize,
        id: String,
        name: String,
    },

    /// A chunk of tool use input JSON.
    ToolInputDelta { index: usize, delta: String },

    /// The response is complete.
    Stop(StopReason),

    /// Usage information.
    Usage {
        input_tokens: u64,
        output_tokens: u64,
    },
}

/// A fully collected model response.
#[derive(Debug, Clone, Default)]
pub struct LlmResponse {
    /// Concatenated text content.
    pub text: String,
    /// Content blocks in the order the model produced them.
    pub content: Vec<ContentBlock>,
    pub tool_calls: Vec<ToolCall>,
    pub stop_reason: Option<StopReason>,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl LlmResponse {
    /// The assistant message to append to the transcript.
    pub fn to_message(&self) -> ChatMessage {
        ChatMessage {
            role: Role::Assistant,
            content: self.content.clone(),
            timestamp: Some(Utc::now()),
        }
    }
}

/// Result of a tool execution.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub content: String,
    pub is_error: bool,
    pub image: Option<ImageSource>,
}

impl ToolResult {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
            image: None,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
            image: None,
        }
    }

    /// Attach a base64 image (e.g. a screenshot) to the result.
    pub fn with_image(mut self, media_type: impl Into<String>, data: impl Into<String>) -> Self {
        self.image = Some(ImageSource {
            media_type: media_type.into(),
            data: data.into(),
        });
        self
    }

    /// Render this result as a transcript block answering `tool_use_id`.
    pub fn into_block(self, tool_use_id: impl Into<String>) -> ContentBlock {
        ContentBlock::ToolResult {
            tool_use_id: tool_use_id.into(),
            content: self.content,
            is_error: self.is_error,
            image: self.image,
        }
    }
}

/// Tool definition for sending to the LLM.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// Lifecycle state of a workflow node.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    /// Never started because a dependency did not complete.
    Skipped,
}

impl NodeStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending | Self::Running)
    }
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// Overall outcome of a workflow run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Completed,
    Failed,
    Cancelled,
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Identity of a subtask, handed to hooks.
#[derive(Debug, Clone)]
pub struct SubtaskInfo {
    pub node_id: String,
    pub name: String,
    pub description: Option<String>,
}

/// What a subtask produced, handed to `after_subtask`.
#[derive(Debug, Clone)]
pub struct SubtaskReport {
    pub node_id: String,
    pub status: NodeStatus,
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
}

/// Event broadcast to all subscribers while a workflow runs.
#[derive(Debug, Clone)]
pub enum WorkflowEvent {
    /// Workflow execution started.
    WorkflowStarted { workflow_id: String },
    /// A node's action loop started.
    NodeStarted { node_id: String },
    /// Text streamed from the LLM.
    TextDelta { node_id: String, text: String },
    /// Tool execution started.
    ToolStart {
        node_id: String,
        name: String,
        input: serde_json::Value,
    },
    /// Tool execution completed.
    ToolEnd {
        node_id: String,
        name: String,
        result: ToolResult,
    },
    /// One Infer+Dispatch round completed.
    RoundComplete { node_id: String, round: usize },
    /// A node reached a terminal state.
    NodeFinished {
        node_id: String,
        status: NodeStatus,
        rounds: usize,
    },
    /// Workflow reached a terminal state.
    WorkflowFinished {
        workflow_id: String,
        status: WorkflowStatus,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_result_block_serialization() {
        let block = ToolResult::success("ok").into_block("call-1");
        let json = serde_json::to_value(&block).unwrap();
        assert_eq!(json["type"], "tool_result");
        assert_eq!(json["tool_use_id"], "call-1");
        assert!(json.get("image").is_none());
    }

    #[test]
    fn test_image_count() {
        let mut msg = ChatMessage::tool_result("c1", "shot", false);
        assert_eq!(msg.image_count(), 0);
        msg.content = vec![
            ToolResult::success("shot").with_image("image/png", "AAAA").into_block("c1"),
            ContentBlock::Image {
                source: ImageSource {
                    media_type: "image/png".into(),
                    data: "BBBB".into(),
                },
            },
        ];
        assert_eq!(msg.image_count(), 2);
    }

    #[test]
    fn test_tool_uses_and_results() {
        let msg = ChatMessage {
            role: Role::Assistant,
            content: vec![
                ContentBlock::Text { text: "checking".into() },
                ContentBlock::ToolUse {
                    id: "c1".into(),
                    name: "lookup".into(),
                    input: serde_json::json!({"q": "x"}),
                },
            ],
            timestamp: None,
        };
        assert!(msg.has_tool_uses());
        assert!(!msg.has_tool_results());
        assert_eq!(msg.tool_uses()[0].1, "lookup");
        assert_eq!(msg.text(), "checking");

        let result = ChatMessage::tool_result("c1", "found", false);
        assert_eq!(result.tool_results(), vec![("c1", "found", false)]);
    }

    #[test]
    fn test_node_status_terminal() {
        assert!(!NodeStatus::Pending.is_terminal());
        assert!(!NodeStatus::Running.is_terminal());
        assert!(NodeStatus::Skipped.is_terminal());
        assert_eq!(NodeStatus::Cancelled.to_string(), "cancelled");
    }
}
