use futures::future::BoxFuture;
use tracing::warn;

use skein_core::error::Result;
use skein_core::types::{ChatMessage, ContentBlock, Role};

use super::ContextCompressor;

const INTENT_KEYS: &[&str] = &["intent", "task", "goal"];
const DETAILS_KEYS: &[&str] = &["reasoning", "thinking", "details"];
const RESULT_KEYS: &[&str] = &["observation", "result"];
const MAX_FALLBACK_CHARS: usize = 200;

/// Rule-based compressor for tool-calling transcripts.
///
/// Keeps the system prompt, the task prompt and the final exchange verbatim.
/// Earlier tool calls collapse to `<task>..</task><details>..</details>` and
/// earlier tool results to `<result>..</result>`. Anything else in the
/// middle (free text, correction prompts) is dropped.
pub struct SimpleQaCompress;

impl SimpleQaCompress {
    pub fn collapse(messages: &[ChatMessage]) -> Vec<ChatMessage> {
        if messages.len() < 4 {
            return messages.to_vec();
        }

        let tail_start = messages.len() - 2;
        let mut out = Vec::with_capacity(messages.len());
        out.extend_from_slice(&messages[..2]);

        for (idx, msg) in messages[2..tail_start].iter().enumerate() {
            match collapse_message(msg) {
                Some(collapsed) => out.push(collapsed),
                None => warn!(
                    index = idx + 2,
                    role = ?msg.role,
                    "Dropping message with no collapsible shape from compressed history"
                ),
            }
        }

        out.extend_from_slice(&messages[tail_start..]);
        out
    }
}

impl ContextCompressor for SimpleQaCompress {
    fn name(&self) -> &str {
        "simple_qa"
    }

    fn compress<'a>(&'a self, messages: &'a [ChatMessage]) -> BoxFuture<'a, Result<Vec<ChatMessage>>> {
        Box::pin(async move { Ok(Self::collapse(messages)) })
    }
}

fn collapse_message(msg: &ChatMessage) -> Option<ChatMessage> {
    match msg.role {
        Role::Assistant if msg.has_tool_uses() => {
            let text: String = msg
                .tool_uses()
                .into_iter()
                .map(|(_, name, input)| {
                    let task = first_string(input, INTENT_KEYS).unwrap_or_else(|| name.to_string());
                    let details = first_string(input, DETAILS_KEYS)
                        .unwrap_or_else(|| clip(&input.to_string()));
                    format!("<task>{}</task><details>{}</details>", task, details)
                })
                .collect();
            Some(ChatMessage {
                role: Role::Assistant,
                content: vec![ContentBlock::Text { text }],
                timestamp: msg.timestamp,
            })
        }
        Role::User if msg.has_tool_results() => {
            let text: String = msg
                .tool_results()
                .into_iter()
                .map(|(_, content, _)| format!("<result>{}</result>", observation(content)))
                .collect();
            Some(ChatMessage {
                role: Role::User,
                content: vec![ContentBlock::Text { text }],
                timestamp: msg.timestamp,
            })
        }
        _ => None,
    }
}

fn first_string(value: &serde_json::Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match value.get(*k) {
        Some(serde_json::Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(serde_json::Value::Null) | None => None,
        Some(other) => Some(other.to_string()),
    })
}

fn observation(content: &str) -> String {
    serde_json::from_str::<serde_json::Value>(content)
        .ok()
        .and_then(|v| first_string(&v, RESULT_KEYS))
        .unwrap_or_else(|| clip(content))
}

fn clip(text: &str) -> String {
    if text.chars().count() <= MAX_FALLBACK_CHARS {
        return text.to_string();
    }
    let clipped: String = text.chars().take(MAX_FALLBACK_CHARS).collect();
    format!("{}...", clipped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use skein_test_utils::{assistant_tool_call, tool_result_msg, transcript};

    #[test]
    fn test_short_transcripts_untouched() {
        let messages = transcript(0);
        assert_eq!(SimpleQaCompress::collapse(&messages), messages);
        let mut three = transcript(1);
        three.pop();
        assert_eq!(SimpleQaCompress::collapse(&three), three);
    }

    #[test]
    fn test_preserves_head_and_final_exchange() {
        let messages = transcript(4);
        let out = SimpleQaCompress::collapse(&messages);

        assert_eq!(out.len(), messages.len());
        assert_eq!(out[0], messages[0]);
        assert_eq!(out[1], messages[1]);
        assert_eq!(out[out.len() - 2..], messages[messages.len() - 2..]);
    }

    #[test]
    fn test_collapses_calls_and_results() {
        let messages = transcript(3);
        let out = SimpleQaCompress::collapse(&messages);

        assert_eq!(
            out[2].text(),
            "<task>search step 0</task><details>need more facts (0)</details>"
        );
        assert!(!out[2].has_tool_uses());
        assert_eq!(out[3].text(), "<result>result 0</result>");
        assert!(!out[3].has_tool_results());
    }

    #[test]
    fn test_fallbacks_when_fields_missing() {
        let messages = vec![
            ChatMessage::system("sys"),
            ChatMessage::user("task"),
            assistant_tool_call("a", "click", serde_json::json!({"index": 3})),
            tool_result_msg("a", "clicked element 3"),
            assistant_tool_call("b", "done", serde_json::json!({})),
            tool_result_msg("b", "ok"),
        ];
        let out = SimpleQaCompress::collapse(&messages);
        assert_eq!(out[2].text(), "<task>click</task><details>{\"index\":3}</details>");
        assert_eq!(out[3].text(), "<result>clicked element 3</result>");
    }

    // Free-form messages in the middle of the transcript are lost.
    #[test]
    fn test_drops_uncollapsible_messages() {
        let mut messages = transcript(2);
        messages.insert(4, ChatMessage::user("Your last answer was not valid JSON."));
        messages.insert(5, ChatMessage::assistant_text("Let me think again."));

        let out = SimpleQaCompress::collapse(&messages);
        assert_eq!(out.len(), messages.len() - 2);
        assert!(out.iter().all(|m| !m.text().contains("not valid JSON")));
        assert!(out.iter().all(|m| !m.text().contains("think again")));
    }

    #[test]
    fn test_does_not_mutate_input() {
        let messages = transcript(3);
        let before = messages.clone();
        let _ = SimpleQaCompress::collapse(&messages);
        assert_eq!(messages, before);
    }
}
