use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use skein_core::config::AppConfig;
use skein_core::context::ExecutionContext;
use skein_core::error::{Result, SkeinError};
use skein_core::event::EventBus;
use skein_core::traits::collect_response;
use skein_core::types::*;
use skein_tools::ToolRegistry;

use crate::compress::{self, ContextCompressor};
use crate::context;
use crate::history::{compact_tool_output, estimate_transcript_tokens, retain_recent_images};
use crate::output_validator::{OutputValidator, ValidationResult};
use crate::workflow::node::{ResolvedInput, WorkflowNode};

/// Final answer of one action.
#[derive(Debug, Clone)]
pub struct ActionOutput {
    /// Raw text of the final model message.
    pub text: String,
    /// Value committed to the node output and the variable store.
    pub value: serde_json::Value,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Outcome of one node activation plus its full transcript.
#[derive(Debug)]
pub struct ActionRun {
    pub outcome: Result<ActionOutput>,
    pub reacts: Vec<ChatMessage>,
    pub rounds: usize,
}

const CANCELLED_RESULT: &str = "cancelled before the tool ran";

enum RoundStep {
    Finish(ActionOutput),
    Dispatch(Vec<ToolCall>),
}

#[derive(Default)]
struct LoopState {
    messages: Vec<ChatMessage>,
    rounds: usize,
    input_tokens: u64,
    output_tokens: u64,
}

/// Runs a node's action: a tool-calling loop against the node's LLM.
pub struct ActionRuntime {
    config: Arc<AppConfig>,
    tools: Arc<ToolRegistry>,
    event_bus: Arc<EventBus>,
    compressor: Option<Arc<dyn ContextCompressor>>,
}

impl ActionRuntime {
    pub fn new(config: Arc<AppConfig>, tools: Arc<ToolRegistry>, event_bus: Arc<EventBus>) -> Self {
        Self {
            config,
            tools,
            event_bus,
            compressor: None,
        }
    }

    /// Use `compressor` instead of the one selected by `agent.compression`.
    pub fn with_compressor(mut self, compressor: Arc<dyn ContextCompressor>) -> Self {
        self.compressor = Some(compressor);
        self
    }

    pub fn config(&self) -> &Arc<AppConfig> {
        &self.config
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// Run `node`'s action to completion.
    ///
    /// Tool teardown hooks run and tool-private state is cleared whether the
    /// action succeeds, fails or is cancelled.
    pub async fn run(
        &self,
        node: &WorkflowNode,
        inputs: &[ResolvedInput],
        ctx: &ExecutionContext,
    ) -> ActionRun {
        let start = Instant::now();
        let mut state = LoopState::default();
        let outcome = self.run_rounds(node, inputs, ctx, &mut state).await;

        self.tools.destroy_all(ctx).await;
        ctx.clear_state();

        match &outcome {
            Ok(out) => info!(
                node_id = %ctx.node_id,
                rounds = state.rounds,
                input_tokens = out.input_tokens,
                output_tokens = out.output_tokens,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Action complete"
            ),
            Err(e) => warn!(
                node_id = %ctx.node_id,
                rounds = state.rounds,
                error = %e,
                "Action failed"
            ),
        }

        ActionRun {
            outcome,
            reacts: state.messages,
            rounds: state.rounds,
        }
    }

    async fn run_rounds(
        &self,
        node: &WorkflowNode,
        inputs: &[ResolvedInput],
        ctx: &ExecutionContext,
        state: &mut LoopState,
    ) -> Result<ActionOutput> {
        let tool_defs = self.tools.definitions_for(&node.action.tools)?;
        state
            .messages
            .push(context::build_system_prompt(node, &tool_defs));
        state.messages.push(context::build_user_prompt(
            node,
            inputs,
            &ctx.variables.snapshot(),
        ));

        let compressor = self.compressor.clone().or_else(|| {
            compress::for_strategy(
                self.config.agent.compression.strategy,
                ctx.llm.clone(),
                &ctx.model,
            )
        });
        let validator = OutputValidator::with_schema(node.output.schema.clone());
        let max_rounds = node
            .action
            .max_rounds
            .unwrap_or(self.config.agent.max_rounds);

        for round in 0..max_rounds {
            if ctx.is_cancelled() {
                return Err(SkeinError::Cancelled);
            }
            state.rounds = round + 1;
            debug!(node_id = %ctx.node_id, round, "Starting round");

            let calls = match self
                .infer_round(ctx, state, &tool_defs, compressor.as_deref(), &validator)
                .await?
            {
                RoundStep::Finish(output) => return Ok(output),
                RoundStep::Dispatch(calls) => calls,
            };

            // every tool call gets a result, even when the round is cut short
            let blocks = self.dispatch(node, ctx, &calls).await;
            state.messages.push(ChatMessage {
                role: Role::User,
                content: blocks,
                timestamp: Some(chrono::Utc::now()),
            });
            if ctx.is_cancelled() {
                return Err(SkeinError::Cancelled);
            }

            self.event_bus.publish(WorkflowEvent::RoundComplete {
                node_id: ctx.node_id.clone(),
                round,
            });
        }

        Err(SkeinError::MaxRoundsExceeded(max_rounds))
    }

    /// One Infer step, retrying malformed tool calls and outputs that fail
    /// the output contract up to `agent.max_output_retries` times.
    async fn infer_round(
        &self,
        ctx: &ExecutionContext,
        state: &mut LoopState,
        tool_defs: &[ToolDefinition],
        compressor: Option<&dyn ContextCompressor>,
        validator: &OutputValidator,
    ) -> Result<RoundStep> {
        let max_retries = self.config.agent.max_output_retries;
        let mut attempt = 0;

        loop {
            let view = tokio::select! {
                view = self.prepare_view(ctx, &state.messages, compressor) => view?,
                _ = ctx.cancel.cancelled() => return Err(SkeinError::Cancelled),
            };
            let response = match self.infer(ctx, view, tool_defs).await {
                Ok(response) => response,
                Err(SkeinError::LlmParse(msg)) if attempt < max_retries => {
                    attempt += 1;
                    warn!(node_id = %ctx.node_id, attempt, error = %msg, "Malformed model output, retrying");
                    continue;
                }
                Err(e) => return Err(e),
            };

            state.input_tokens += response.input_tokens;
            state.output_tokens += response.output_tokens;
            state.messages.push(response.to_message());

            if !response.tool_calls.is_empty() {
                return Ok(RoundStep::Dispatch(response.tool_calls));
            }

            match validator.validate(&response.text) {
                ValidationResult::Valid(value) => {
                    return Ok(RoundStep::Finish(ActionOutput {
                        text: response.text,
                        value,
                        input_tokens: state.input_tokens,
                        output_tokens: state.output_tokens,
                    }));
                }
                ValidationResult::Invalid { issues } if attempt < max_retries => {
                    attempt += 1;
                    warn!(
                        node_id = %ctx.node_id,
                        attempt,
                        issues = issues.len(),
                        "Output failed validation, asking for a correction"
                    );
                    state.messages.push(ChatMessage::user(format!(
                        "Your answer does not satisfy the output contract:\n- {}\n\nReply again with a corrected answer.",
                        issues.join("\n- ")
                    )));
                }
                ValidationResult::Invalid { issues } => {
                    return Err(SkeinError::OutputValidation(issues.join("; ")));
                }
            }
        }
    }

    /// Transcript view for the next Infer. The durable log is left untouched.
    async fn prepare_view(
        &self,
        ctx: &ExecutionContext,
        messages: &[ChatMessage],
        compressor: Option<&dyn ContextCompressor>,
    ) -> Result<Vec<ChatMessage>> {
        let view = retain_recent_images(messages, self.config.agent.max_retained_images);
        let Some(compressor) = compressor else {
            return Ok(view);
        };

        let tokens = estimate_transcript_tokens(&view);
        if tokens <= self.config.agent.compression.trigger_tokens {
            return Ok(view);
        }

        let compressed = compressor.compress(&view).await?;
        debug!(
            node_id = %ctx.node_id,
            compressor = compressor.name(),
            before = view.len(),
            after = compressed.len(),
            tokens,
            "Compressed transcript view"
        );
        Ok(compressed)
    }

    /// Call the LLM, streaming text to the event bus.
    ///
    /// Returns `Cancelled` as soon as the node's token fires.
    async fn infer(
        &self,
        ctx: &ExecutionContext,
        view: Vec<ChatMessage>,
        tool_defs: &[ToolDefinition],
    ) -> Result<LlmResponse> {
        let call = async {
            let stream = ctx.llm.chat_stream(&ctx.model, view, tool_defs).await?;
            collect_response(stream, |text| {
                self.event_bus.publish(WorkflowEvent::TextDelta {
                    node_id: ctx.node_id.clone(),
                    text: text.to_string(),
                });
            })
            .await
        };

        let bounded = async {
            match self.config.agent.llm_timeout_secs {
                Some(secs) => tokio::time::timeout(Duration::from_secs(secs), call)
                    .await
                    .map_err(|_| SkeinError::LlmTimeout(secs))?,
                None => call.await,
            }
        };

        tokio::select! {
            result = bounded => result,
            _ = ctx.cancel.cancelled() => Err(SkeinError::Cancelled),
        }
    }

    /// Execute the round's tool calls. Results keep call order.
    ///
    /// Once the node is cancelled the remaining calls are not run; each gets
    /// an error result so every tool use stays paired with a result.
    async fn dispatch(
        &self,
        node: &WorkflowNode,
        ctx: &ExecutionContext,
        calls: &[ToolCall],
    ) -> Vec<ContentBlock> {
        if self.config.agent.parallel_tools && calls.len() > 1 && !ctx.is_cancelled() {
            let futs = calls.iter().map(|call| self.run_tool(node, ctx, call));
            return futures::future::join_all(futs).await;
        }

        let mut blocks = Vec::with_capacity(calls.len());
        for call in calls {
            if ctx.is_cancelled() {
                debug!(node_id = %ctx.node_id, tool = %call.name, "Skipping tool call after cancel");
                blocks.push(ToolResult::error(CANCELLED_RESULT).into_block(call.id.clone()));
                continue;
            }
            blocks.push(self.run_tool(node, ctx, call).await);
        }
        blocks
    }

    /// Run one tool call. Every failure becomes an error tool-result.
    async fn run_tool(&self, node: &WorkflowNode, ctx: &ExecutionContext, call: &ToolCall) -> ContentBlock {
        let mut input = call.input.clone();
        if let Some(hooks) = &ctx.hooks {
            if let Some(replaced) = hooks.before_tool_use(ctx, &call.name, &input).await {
                input = replaced;
            }
        }

        self.event_bus.publish(WorkflowEvent::ToolStart {
            node_id: ctx.node_id.clone(),
            name: call.name.clone(),
            input: input.clone(),
        });

        let start = Instant::now();
        let result = if node.action.allows_tool(&call.name) {
            self.tools.execute(&call.name, input, ctx.clone()).await
        } else {
            Err(SkeinError::InvalidTool(format!(
                "tool '{}' is not available to this action; available tools: {}",
                call.name,
                node.action.tools.join(", ")
            )))
        };

        let mut result = match result {
            Ok(r) => r,
            Err(SkeinError::ToolNotFound(name)) => {
                warn!(node_id = %ctx.node_id, tool = %name, "Model called an unknown tool");
                ToolResult::error(format!(
                    "unknown tool '{}'; available tools: {}",
                    name,
                    self.tools.tool_enum().join(", ")
                ))
            }
            Err(e) => {
                warn!(node_id = %ctx.node_id, tool = %call.name, error = %e, "Tool execution failed");
                ToolResult::error(e.to_string())
            }
        };

        if let Some(hooks) = &ctx.hooks {
            if let Some(replaced) = hooks.after_tool_use(ctx, &call.name, &result).await {
                result = replaced;
            }
        }

        result.content = compact_tool_output(&result.content, self.config.agent.max_tool_output_tokens);
        debug!(
            node_id = %ctx.node_id,
            tool = %call.name,
            is_error = result.is_error,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Tool call finished"
        );

        self.event_bus.publish(WorkflowEvent::ToolEnd {
            node_id: ctx.node_id.clone(),
            name: call.name.clone(),
            result: result.clone(),
        });

        result.into_block(call.id.clone())
    }
}
