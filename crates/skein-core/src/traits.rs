use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::StreamExt;

use crate::config::ModelConfig;
use crate::context::ExecutionContext;
use crate::error::{Result, SkeinError};
use crate::types::*;

/// LLM client: streaming chat with tool calling.
pub trait LlmClient: Send + Sync + 'static {
    /// Send a chat request and receive a stream of deltas.
    fn chat_stream(
        &self,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
        tools: &[ToolDefinition],
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>>;

    /// Send a chat request and collect the full response.
    fn generate<'a>(
        &'a self,
        config: &'a ModelConfig,
        messages: Vec<ChatMessage>,
        tools: &'a [ToolDefinition],
    ) -> BoxFuture<'a, Result<LlmResponse>> {
        Box::pin(async move {
            let stream = self.chat_stream(config, messages, tools).await?;
            collect_response(stream, |_| {}).await
        })
    }
}

/// Accumulator for streaming tool call deltas.
#[derive(Debug, Default)]
struct ToolCallAccumulator {
    id: String,
    name: String,
    input_json: String,
}

/// Drain a delta stream into an [`LlmResponse`].
///
/// `on_text` sees every text chunk as it arrives. Tool input that is not valid
/// JSON fails with [`SkeinError::LlmParse`]; an empty input is read as `{}`.
pub async fn collect_response(
    mut stream: BoxStream<'_, Result<StreamDelta>>,
    mut on_text: impl FnMut(&str),
) -> Result<LlmResponse> {
    let mut response = LlmResponse::default();
    let mut thinking = String::new();
    let mut accumulators: Vec<ToolCallAccumulator> = Vec::new();

    while let Some(delta) = stream.next().await {
        match delta? {
            StreamDelta::TextDelta(text) => {
                on_text(&text);
                response.text.push_str(&text);
            }
            StreamDelta::ThinkingDelta(text) => thinking.push_str(&text),
            StreamDelta::ToolUseStart { index, id, name } => {
                while accumulators.len() <= index {
                    accumulators.push(ToolCallAccumulator::default());
                }
                accumulators[index].id = id;
                accumulators[index].name = name;
            }
            StreamDelta::ToolInputDelta { index, delta } => {
                if let Some(acc) = accumulators.get_mut(index) {
                    acc.input_json.push_str(&delta);
                }
            }
            StreamDelta::Stop(reason) => response.stop_reason = Some(reason),
            StreamDelta::Usage {
                input_tokens,
                output_tokens,
            } => {
                response.input_tokens += input_tokens;
                response.output_tokens += output_tokens;
            }
        }
    }

    if !thinking.is_empty() {
        response.content.push(ContentBlock::Thinking { thinking });
    }
    if !response.text.is_empty() {
        response.content.push(ContentBlock::Text {
            text: response.text.clone(),
        });
    }

    for acc in accumulators {
        if acc.name.is_empty() {
            return Err(SkeinError::LlmParse(format!(
                "tool call '{}' has no tool name",
                acc.id
            )));
        }
        let input = if acc.input_json.trim().is_empty() {
            serde_json::json!({})
        } else {
            serde_json::from_str(&acc.input_json).map_err(|e| {
                SkeinError::LlmParse(format!("tool call '{}' input is not JSON: {}", acc.name, e))
            })?
        };
        response.content.push(ContentBlock::ToolUse {
            id: acc.id.clone(),
            name: acc.name.clone(),
            input: input.clone(),
        });
        response.tool_calls.push(ToolCall {
            id: acc.id,
            name: acc.name,
            input,
        });
    }

    Ok(response)
}

/// A capability the model can call by name.
pub trait Tool: Send + Sync + 'static {
    /// Tool name (used in LLM tool calls).
    fn name(&self) -> &str;

    /// Human- and model-readable description.
    fn description(&self) -> &str;

    /// JSON Schema for tool input.
    fn input_schema(&self) -> serde_json::Value;

    /// Execute the tool with given input and context.
    fn execute(
        &self,
        input: serde_json::Value,
        ctx: ExecutionContext,
    ) -> BoxFuture<'_, Result<ToolResult>>;

    /// Release tool-private state once the owning context is discarded.
    fn destroy<'a>(&'a self, ctx: &'a ExecutionContext) -> BoxFuture<'a, ()> {
        let _ = ctx;
        Box::pin(async {})
    }

    /// Optional per-call timeout in seconds. `None` lets the call run unbounded.
    fn timeout_secs(&self) -> Option<u64> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream_of(deltas: Vec<StreamDelta>) -> BoxStream<'static, Result<StreamDelta>> {
        futures::stream::iter(deltas.into_iter().map(Ok)).boxed()
    }

    #[tokio::test]
    async fn test_collect_text_only() {
        let stream = stream_of(vec![
            StreamDelta::TextDelta("Hello, ".into()),
            StreamDelta::TextDelta("world".into()),
            StreamDelta::Stop(StopReason::EndTurn),
        ]);
        let mut seen = Vec::new();
        let resp = collect_response(stream, |t| seen.push(t.to_string()))
            .await
            .unwrap();
        assert_eq!(resp.text, "Hello, world");
        assert_eq!(seen.len(), 2);
        assert!(resp.tool_calls.is_empty());
        assert_eq!(resp.stop_reason, Some(StopReason::EndTurn));
    }

    #[tokio::test]
    async fn test_collect_tool_call_chunks() {
        let stream = stream_of(vec![
            StreamDelta::ToolUseStart {
                index: 0,
                id: "c1".into(),
                name: "lookup".into(),
            },
            StreamDelta::ToolInputDelta {
                index: 0,
                delta: r#"{"q":"#.into(),
            },
            StreamDelta::ToolInputDelta {
                index: 0,
                delta: r#""rust"}"#.into(),
            },
            StreamDelta::Usage {
                input_tokens: 10,
                output_tokens: 5,
            },
            StreamDelta::Stop(StopReason::ToolUse),
        ]);
        let resp = collect_response(stream, |_| {}).await.unwrap();
        assert_eq!(resp.tool_calls.len(), 1);
        assert_eq!(resp.tool_calls[0].input, serde_json::json!({"q": "rust"}));
        assert_eq!(resp.input_tokens, 10);
        assert!(resp.to_message().has_tool_uses());
    }

    #[tokio::test]
    async fn test_collect_empty_input_is_object() {
        let stream = stream_of(vec![StreamDelta::ToolUseStart {
            index: 0,
            id: "c1".into(),
            name: "now".into(),
        }]);
        let resp = collect_response(stream, |_| {}).await.unwrap();
        assert_eq!(resp.tool_calls[0].input, serde_json::json!({}));
    }

    #[tokio::test]
    async fn test_collect_malformed_input_is_parse_error() {
        let stream = stream_of(vec![
            StreamDelta::ToolUseStart {
                index: 0,
                id: "c1".into(),
                name: "lookup".into(),
            },
            StreamDelta::ToolInputDelta {
                index: 0,
                delta: "{not json".into(),
            },
        ]);
        let err = collect_response(stream, |_| {}).await.unwrap_err();
        assert!(matches!(err, SkeinError::LlmParse(_)));
    }
}
