use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::StreamExt;

use skein_core::config::ModelConfig;
use skein_core::error::{Result, SkeinError};
use skein_core::traits::LlmClient;
use skein_core::types::{ChatMessage, StopReason, StreamDelta, ToolDefinition};

/// One scripted model reply.
#[derive(Debug, Clone)]
pub enum MockTurn {
    /// Final answer with no tool calls.
    Text(String),
    /// Optional preamble text plus one or more tool calls `(name, input)`.
    ToolCalls {
        text: Option<String>,
        calls: Vec<(String, serde_json::Value)>,
    },
    /// A tool call whose input is sent verbatim, e.g. broken JSON.
    RawToolInput { name: String, raw: String },
    /// The request fails before streaming starts.
    Error(String),
    /// The request never completes.
    Hang,
}

impl MockTurn {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn tool(name: impl Into<String>, input: serde_json::Value) -> Self {
        Self::ToolCalls {
            text: None,
            calls: vec![(name.into(), input)],
        }
    }
}

type Responder = Box<dyn Fn(&[ChatMessage]) -> MockTurn + Send + Sync>;

/// Scripted LLM client.
///
/// Replies come from a queue of [`MockTurn`]s, or from a responder closure
/// that sees the request transcript. Every request is recorded.
pub struct MockLlm {
    turns: Mutex<VecDeque<MockTurn>>,
    fallback: MockTurn,
    responder: Option<Responder>,
    calls: AtomicUsize,
    next_call_id: AtomicUsize,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
    tools_seen: Mutex<Vec<Vec<String>>>,
}

impl MockLlm {
    /// Replay `turns` in order, then answer "done".
    pub fn new(turns: Vec<MockTurn>) -> Self {
        Self {
            turns: Mutex::new(turns.into()),
            fallback: MockTurn::text("done"),
            responder: None,
            calls: AtomicUsize::new(0),
            next_call_id: AtomicUsize::new(1),
            requests: Mutex::new(Vec::new()),
            tools_seen: Mutex::new(Vec::new()),
        }
    }

    /// Always answer with the same text.
    pub fn always_text(text: impl Into<String>) -> Self {
        let mut llm = Self::new(vec![]);
        llm.fallback = MockTurn::text(text);
        llm
    }

    /// Compute each reply from the request transcript.
    pub fn with_responder(
        responder: impl Fn(&[ChatMessage]) -> MockTurn + Send + Sync + 'static,
    ) -> Self {
        let mut llm = Self::new(vec![]);
        llm.responder = Some(Box::new(responder));
        llm
    }

    /// Number of requests received so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Transcripts of every request, in arrival order.
    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().unwrap().clone()
    }

    /// Tool names offered with every request.
    pub fn tools_seen(&self) -> Vec<Vec<String>> {
        self.tools_seen.lock().unwrap().clone()
    }

    fn next_turn(&self, messages: &[ChatMessage]) -> MockTurn {
        if let Some(responder) = &self.responder {
            return responder(messages);
        }
        self.turns
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }

    fn call_id(&self) -> String {
        format!("call-{}", self.next_call_id.fetch_add(1, Ordering::SeqCst))
    }
}

impl LlmClient for MockLlm {
    fn chat_stream(
        &self,
        _config: &ModelConfig,
        messages: Vec<ChatMessage>,
        tools: &[ToolDefinition],
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let turn = self.next_turn(&messages);
        self.requests.lock().unwrap().push(messages);
        self.tools_seen
            .lock()
            .unwrap()
            .push(tools.iter().map(|t| t.name.clone()).collect());

        let deltas: Vec<StreamDelta> = match turn {
            MockTurn::Error(msg) => {
                return Box::pin(async move { Err(SkeinError::LlmRequest(msg)) });
            }
            MockTurn::Hang => {
                return Box::pin(futures::future::pending());
            }
            MockTurn::Text(text) => vec![
                StreamDelta::TextDelta(text),
                StreamDelta::Usage {
                    input_tokens: 10,
                    output_tokens: 5,
                },
                StreamDelta::Stop(StopReason::EndTurn),
            ],
            MockTurn::ToolCalls { text, calls } => {
                let mut deltas = Vec::new();
                if let Some(text) = text {
                    deltas.push(StreamDelta::TextDelta(text));
                }
                for (index, (name, input)) in calls.into_iter().enumerate() {
                    deltas.push(StreamDelta::ToolUseStart {
                        index,
                        id: self.call_id(),
                        name,
                    });
                    deltas.push(StreamDelta::ToolInputDelta {
                        index,
                        delta: input.to_string(),
                    });
                }
                deltas.push(StreamDelta::Stop(StopReason::ToolUse));
                deltas
            }
            MockTurn::RawToolInput { name, raw } => vec![
                StreamDelta::ToolUseStart {
                    index: 0,
                    id: self.call_id(),
                    name,
                },
                StreamDelta::ToolInputDelta { index: 0, delta: raw },
                StreamDelta::Stop(StopReason::ToolUse),
            ],
        };

        Box::pin(async move {
            let stream: BoxStream<'_, Result<StreamDelta>> =
                futures::stream::iter(deltas.into_iter().map(Ok)).boxed();
            Ok(stream)
        })
    }
}
