use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;

use skein_core::context::ExecutionContext;
use skein_core::error::{Result, SkeinError};
use skein_core::traits::Tool;
use skein_core::types::ToolResult;

/// Returns its `text` input unchanged.
pub struct EchoTool {
    name: String,
    description: String,
}

impl EchoTool {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: "Echo the given text back".to_string(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

impl Tool for EchoTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "text": { "type": "string", "description": "Text to echo" }
            },
            "required": ["text"]
        })
    }

    fn execute(
        &self,
        input: serde_json::Value,
        _ctx: ExecutionContext,
    ) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let text = input["text"].as_str().unwrap_or_default().to_string();
            Ok(ToolResult::success(text))
        })
    }
}

/// Fails its first `failures` calls, then succeeds with `"ok on attempt N"`.
pub struct FlakyTool {
    name: String,
    failures: usize,
    attempts: Arc<AtomicUsize>,
}

impl FlakyTool {
    pub fn new(name: impl Into<String>, failures: usize) -> Self {
        Self {
            name: name.into(),
            failures,
            attempts: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared attempt counter, readable after the tool is moved into a registry.
    pub fn attempts(&self) -> Arc<AtomicUsize> {
        self.attempts.clone()
    }
}

impl Tool for FlakyTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Fails a fixed number of times before succeeding"
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }

    fn execute(
        &self,
        _input: serde_json::Value,
        _ctx: ExecutionContext,
    ) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt <= self.failures {
                Err(SkeinError::ToolExecution {
                    tool: self.name.clone(),
                    message: format!("transient failure on attempt {}", attempt),
                })
            } else {
                Ok(ToolResult::success(format!("ok on attempt {}", attempt)))
            }
        })
    }
}

/// Sleeps before answering; used for timeout and cancellation tests.
pub struct SlowTool {
    name: String,
    delay: Duration,
    timeout: Option<u64>,
    completed: Arc<AtomicUsize>,
}

impl SlowTool {
    pub fn new(name: impl Into<String>, delay: Duration) -> Self {
        Self {
            name: name.into(),
            delay,
            timeout: None,
            completed: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Some(secs);
        self
    }

    /// Number of calls that ran to completion.
    pub fn completed(&self) -> Arc<AtomicUsize> {
        self.completed.clone()
    }
}

impl Tool for SlowTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Waits before answering"
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object" })
    }

    fn execute(
        &self,
        _input: serde_json::Value,
        _ctx: ExecutionContext,
    ) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            tokio::time::sleep(self.delay).await;
            self.completed.fetch_add(1, Ordering::SeqCst);
            Ok(ToolResult::success("finished"))
        })
    }

    fn timeout_secs(&self) -> Option<u64> {
        self.timeout
    }
}

/// Caches a selector map in context state and clears it on destroy.
pub struct StatefulTool {
    name: String,
    destroyed: Arc<AtomicUsize>,
}

impl StatefulTool {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            destroyed: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of times `destroy` ran.
    pub fn destroyed(&self) -> Arc<AtomicUsize> {
        self.destroyed.clone()
    }
}

impl Tool for StatefulTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Remembers element selectors between calls"
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object" })
    }

    fn execute(
        &self,
        _input: serde_json::Value,
        ctx: ExecutionContext,
    ) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            ctx.state_set("selector_map", serde_json::json!({"1": "#submit"}));
            Ok(ToolResult::success("indexed 1 element"))
        })
    }

    fn destroy<'a>(&'a self, ctx: &'a ExecutionContext) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            ctx.state_remove("selector_map");
            self.destroyed.fetch_add(1, Ordering::SeqCst);
        })
    }
}

/// Returns a text observation plus a screenshot.
pub struct ScreenshotTool;

impl Tool for ScreenshotTool {
    fn name(&self) -> &str {
        "screenshot"
    }

    fn description(&self) -> &str {
        "Capture the current page"
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object" })
    }

    fn execute(
        &self,
        _input: serde_json::Value,
        _ctx: ExecutionContext,
    ) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async {
            Ok(ToolResult::success("captured").with_image("image/png", "iVBORw0KGgo="))
        })
    }
}

/// Asks a human through the context's hooks and returns the answer.
///
/// `mode` picks the hook: `text`, `single_choice`, `multiple_choice` or
/// `operate`. Multiple answers are joined with `", "`.
pub struct HumanInputTool;

impl Tool for HumanInputTool {
    fn name(&self) -> &str {
        "ask_human"
    }

    fn description(&self) -> &str {
        "Ask the user a question or hand control to them"
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "question": { "type": "string" },
                "mode": {
                    "type": "string",
                    "enum": ["text", "single_choice", "multiple_choice", "operate"]
                },
                "choices": { "type": "array", "items": { "type": "string" } }
            },
            "required": ["question", "mode"]
        })
    }

    fn execute(
        &self,
        input: serde_json::Value,
        ctx: ExecutionContext,
    ) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let Some(hooks) = ctx.hooks.clone() else {
                return Ok(ToolResult::error("no human is attached to this workflow"));
            };
            let question = input["question"].as_str().unwrap_or_default().to_string();
            let choices: Vec<String> = input["choices"]
                .as_array()
                .map(|a| a.iter().filter_map(|c| c.as_str().map(str::to_string)).collect())
                .unwrap_or_default();

            let answer = match input["mode"].as_str().unwrap_or("text") {
                "single_choice" => {
                    hooks
                        .on_human_input_single_choice(&ctx, &question, &choices)
                        .await
                }
                "multiple_choice" => hooks
                    .on_human_input_multiple_choice(&ctx, &question, &choices)
                    .await
                    .map(|picked| picked.join(", ")),
                "operate" => hooks.on_human_operate(&ctx, &question).await,
                _ => hooks.on_human_input_text(&ctx, &question).await,
            };

            Ok(match answer {
                Some(answer) => ToolResult::success(answer),
                None => ToolResult::error("the human did not answer"),
            })
        })
    }
}
