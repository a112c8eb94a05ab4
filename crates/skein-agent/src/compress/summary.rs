use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::debug;

use skein_core::config::ModelConfig;
use skein_core::error::Result;
use skein_core::traits::LlmClient;
use skein_core::types::{ChatMessage, ContentBlock};

use super::ContextCompressor;

/// Marks the end of a summarized stretch of history.
pub const HISTORY_ENDS: &str = "[history ends]";

const DEFAULT_THRESHOLD: usize = 5;

const SUMMARY_PROMPT: &str = "Summarize the following agent transcript as a chronological list of steps. \
For every step record what the agent tried, which tool it called with which key arguments, \
and what it observed. Keep identifiers, numbers, URLs, file paths and quoted text verbatim. \
Do not add commentary. Output only the summary.";

/// LLM-backed compressor.
///
/// Transcripts longer than the threshold keep `m[0]`, `m[1]` and the final
/// exchange; everything between is replaced by one assistant message with a
/// chronological summary followed by [`HISTORY_ENDS`].
pub struct SummaryCompress {
    llm: Arc<dyn LlmClient>,
    model: ModelConfig,
    threshold: usize,
}

impl SummaryCompress {
    pub fn new(llm: Arc<dyn LlmClient>, model: ModelConfig) -> Self {
        Self {
            llm,
            model,
            threshold: DEFAULT_THRESHOLD,
        }
    }

    pub fn with_threshold(mut self, threshold: usize) -> Self {
        self.threshold = threshold.max(DEFAULT_THRESHOLD);
        self
    }

    async fn summarize(&self, interior: &[ChatMessage]) -> Result<String> {
        let request = vec![ChatMessage::user(format!(
            "{}\n\n{}",
            SUMMARY_PROMPT,
            render(interior)
        ))];
        let response = self.llm.generate(&self.model, request, &[]).await?;
        Ok(response.text.trim().to_string())
    }
}

impl ContextCompressor for SummaryCompress {
    fn name(&self) -> &str {
        "summary"
    }

    fn compress<'a>(&'a self, messages: &'a [ChatMessage]) -> BoxFuture<'a, Result<Vec<ChatMessage>>> {
        Box::pin(async move {
            if messages.len() <= self.threshold {
                return Ok(messages.to_vec());
            }

            let tail_start = messages.len() - 2;
            let interior = &messages[2..tail_start];
            let summary = self.summarize(interior).await?;
            debug!(
                summarized = interior.len(),
                summary_chars = summary.len(),
                "Summarized transcript interior"
            );

            let mut out = Vec::with_capacity(5);
            out.extend_from_slice(&messages[..2]);
            out.push(ChatMessage::assistant_text(format!(
                "{}\n\n{}",
                summary, HISTORY_ENDS
            )));
            out.extend_from_slice(&messages[tail_start..]);
            Ok(out)
        })
    }
}

fn render(messages: &[ChatMessage]) -> String {
    let mut out = String::new();
    for msg in messages {
        for block in &msg.content {
            let line = match block {
                ContentBlock::Text { text } => format!("{:?}: {}", msg.role, text),
                ContentBlock::ToolUse { name, input, .. } => {
                    format!("{:?} called {} with {}", msg.role, name, input)
                }
                ContentBlock::ToolResult {
                    content, is_error, ..
                } => {
                    let label = if *is_error { "Tool error" } else { "Tool result" };
                    format!("{}: {}", label, content)
                }
                ContentBlock::Image { .. } => format!("{:?}: [image]", msg.role),
                ContentBlock::Thinking { .. } => continue,
            };
            out.push_str(&line);
            out.push('\n');
        }
    }
    out
}
