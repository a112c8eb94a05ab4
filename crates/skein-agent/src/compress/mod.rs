//! Transcript compression.
//!
//! A compressor turns the durable transcript into a shorter view for the
//! next LLM call. It never mutates its input; the action loop keeps the full
//! log and only sends the compressed copy.

mod simple_qa;
mod summary;

use std::sync::Arc;

use futures::future::BoxFuture;

use skein_core::config::{CompressionStrategy, ModelConfig};
use skein_core::error::Result;
use skein_core::traits::LlmClient;
use skein_core::types::ChatMessage;

pub use simple_qa::SimpleQaCompress;
pub use summary::{SummaryCompress, HISTORY_ENDS};

/// Rewrites a transcript into a shorter, equivalent one.
pub trait ContextCompressor: Send + Sync {
    fn name(&self) -> &str;

    fn compress<'a>(&'a self, messages: &'a [ChatMessage]) -> BoxFuture<'a, Result<Vec<ChatMessage>>>;
}

/// Identity compressor.
pub struct NoCompress;

impl ContextCompressor for NoCompress {
    fn name(&self) -> &str {
        "none"
    }

    fn compress<'a>(&'a self, messages: &'a [ChatMessage]) -> BoxFuture<'a, Result<Vec<ChatMessage>>> {
        Box::pin(async move { Ok(messages.to_vec()) })
    }
}

/// Build the compressor selected by configuration.
///
/// Returns `None` for [`CompressionStrategy::None`]. The summary compressor
/// uses the node's own LLM provider and model.
pub fn for_strategy(
    strategy: CompressionStrategy,
    llm: Arc<dyn LlmClient>,
    model: &ModelConfig,
) -> Option<Arc<dyn ContextCompressor>> {
    match strategy {
        CompressionStrategy::None => None,
        CompressionStrategy::SimpleQa => Some(Arc::new(SimpleQaCompress)),
        CompressionStrategy::Summary => Some(Arc::new(SummaryCompress::new(llm, model.clone()))),
    }
}
