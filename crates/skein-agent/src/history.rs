use std::sync::OnceLock;

use tiktoken_rs::CoreBPE;
use tracing::warn;

use skein_core::types::{ChatMessage, ContentBlock};

/// Text that replaces an image dropped from the transcript view.
pub const IMAGE_PLACEHOLDER: &str = "[image omitted]";

/// Get or initialize the tokenizer for cl100k_base (works for Claude and GPT-4).
fn tokenizer() -> Option<&'static CoreBPE> {
    static TOKENIZER: OnceLock<Option<CoreBPE>> = OnceLock::new();
    TOKENIZER
        .get_or_init(|| match tiktoken_rs::cl100k_base() {
            Ok(bpe) => Some(bpe),
            Err(e) => {
                warn!(error = %e, "Failed to load cl100k_base tokenizer, estimating by length");
                None
            }
        })
        .as_ref()
}

/// Token count using BPE tokenization (cl100k_base).
///
/// Falls back to a chars/4 estimate when the tokenizer cannot be loaded.
pub fn estimate_tokens(text: &str) -> usize {
    match tokenizer() {
        Some(bpe) => bpe.encode_ordinary(text).len(),
        None => text.chars().count().div_ceil(4),
    }
}

/// Estimate token count for an entire ChatMessage.
/// Serializes content blocks to JSON and adds 4 tokens overhead per message.
pub fn estimate_message_tokens(msg: &ChatMessage) -> usize {
    let content_str = serde_json::to_string(&msg.content).unwrap_or_default();
    estimate_tokens(&content_str) + 4
}

pub fn estimate_transcript_tokens(messages: &[ChatMessage]) -> usize {
    messages.iter().map(estimate_message_tokens).sum()
}

/// Truncate tool output to fit within `max_tokens * 4` characters.
/// Prefers truncating at a newline boundary. Appends `[truncated]` if shortened.
pub fn compact_tool_output(content: &str, max_tokens: usize) -> String {
    let max_chars = max_tokens * 4;
    if content.len() <= max_chars {
        return content.to_string();
    }

    let mut end = max_chars;
    while !content.is_char_boundary(end) {
        end -= 1;
    }
    let truncated = &content[..end];
    if let Some(nl_pos) = truncated.rfind('\n') {
        format!("{}\n[truncated]", &content[..nl_pos])
    } else {
        format!("{}\n[truncated]", truncated)
    }
}

/// Copy of `messages` keeping only the newest `keep` images.
///
/// Older standalone images become a text placeholder; older tool-result
/// images are detached and the result text notes the omission.
pub fn retain_recent_images(messages: &[ChatMessage], keep: usize) -> Vec<ChatMessage> {
    let total: usize = messages.iter().map(ChatMessage::image_count).sum();
    let mut to_drop = total.saturating_sub(keep);
    if to_drop == 0 {
        return messages.to_vec();
    }

    let mut view = messages.to_vec();
    for msg in view.iter_mut() {
        if to_drop == 0 {
            break;
        }
        for block in msg.content.iter_mut() {
            if to_drop == 0 {
                break;
            }
            match block {
                ContentBlock::Image { .. } => {
                    *block = ContentBlock::Text {
                        text: IMAGE_PLACEHOLDER.to_string(),
                    };
                    to_drop -= 1;
                }
                ContentBlock::ToolResult { content, image, .. } if image.is_some() => {
                    *image = None;
                    content.push('\n');
                    content.push_str(IMAGE_PLACEHOLDER);
                    to_drop -= 1;
                }
                _ => {}
            }
        }
    }
    view
}
