use futures::future::BoxFuture;
use tracing::{debug, warn};

use crate::config::HooksConfig;
use crate::context::ExecutionContext;
use crate::types::{SubtaskInfo, SubtaskReport, ToolResult, WorkflowStatus};

/// Lifecycle and human-interaction hooks.
///
/// Every method has a no-op default, so implementors override only what they
/// need. Hooks are awaited before the workflow or action loop continues.
pub trait WorkflowHooks: Send + Sync + 'static {
    fn before_workflow<'a>(&'a self, workflow_id: &'a str) -> BoxFuture<'a, ()> {
        let _ = workflow_id;
        Box::pin(async {})
    }

    fn before_subtask<'a>(
        &'a self,
        ctx: &'a ExecutionContext,
        subtask: &'a SubtaskInfo,
    ) -> BoxFuture<'a, ()> {
        let _ = (ctx, subtask);
        Box::pin(async {})
    }

    /// Called before each tool call. Returning `Some` replaces the tool input.
    fn before_tool_use<'a>(
        &'a self,
        ctx: &'a ExecutionContext,
        tool: &'a str,
        input: &'a serde_json::Value,
    ) -> BoxFuture<'a, Option<serde_json::Value>> {
        let _ = (ctx, tool, input);
        Box::pin(async { None })
    }

    /// Called after each tool call. Returning `Some` replaces the result fed to the model.
    fn after_tool_use<'a>(
        &'a self,
        ctx: &'a ExecutionContext,
        tool: &'a str,
        result: &'a ToolResult,
    ) -> BoxFuture<'a, Option<ToolResult>> {
        let _ = (ctx, tool, result);
        Box::pin(async { None })
    }

    fn after_subtask<'a>(
        &'a self,
        ctx: &'a ExecutionContext,
        report: &'a SubtaskReport,
    ) -> BoxFuture<'a, ()> {
        let _ = (ctx, report);
        Box::pin(async {})
    }

    fn after_workflow<'a>(
        &'a self,
        workflow_id: &'a str,
        status: WorkflowStatus,
    ) -> BoxFuture<'a, ()> {
        let _ = (workflow_id, status);
        Box::pin(async {})
    }

    /// Ask a human for free-form text.
    fn on_human_input_text<'a>(
        &'a self,
        ctx: &'a ExecutionContext,
        question: &'a str,
    ) -> BoxFuture<'a, Option<String>> {
        let _ = (ctx, question);
        Box::pin(async { None })
    }

    /// Ask a human to pick one option.
    fn on_human_input_single_choice<'a>(
        &'a self,
        ctx: &'a ExecutionContext,
        question: &'a str,
        choices: &'a [String],
    ) -> BoxFuture<'a, Option<String>> {
        let _ = (ctx, question, choices);
        Box::pin(async { None })
    }

    /// Ask a human to pick any number of options.
    fn on_human_input_multiple_choice<'a>(
        &'a self,
        ctx: &'a ExecutionContext,
        question: &'a str,
        choices: &'a [String],
    ) -> BoxFuture<'a, Option<Vec<String>>> {
        let _ = (ctx, question, choices);
        Box::pin(async { None })
    }

    /// Hand control to a human to perform an operation (e.g. a login), returning their note.
    fn on_human_operate<'a>(
        &'a self,
        ctx: &'a ExecutionContext,
        reason: &'a str,
    ) -> BoxFuture<'a, Option<String>> {
        let _ = (ctx, reason);
        Box::pin(async { None })
    }
}

/// Execute hook commands with environment variables.
/// Fire-and-forget: errors are logged, not propagated.
pub async fn run_hooks(commands: &[String], env_vars: &[(&str, &str)]) {
    for cmd in commands {
        let mut command = tokio::process::Command::new("sh");
        command.args(["-c", cmd]);
        for (key, val) in env_vars {
            command.env(key, val);
        }
        command.stdout(std::process::Stdio::null());
        command.stderr(std::process::Stdio::null());
        match command.status().await {
            Ok(s) if !s.success() => warn!(hook = %cmd, code = s.code(), "Hook exited non-zero"),
            Err(e) => warn!(hook = %cmd, error = %e, "Hook failed to execute"),
            _ => debug!(hook = %cmd, "Hook completed"),
        }
    }
}

/// Hooks backed by shell commands from the `[hooks]` config section.
///
/// Commands see `SKEIN_WORKFLOW_ID`, `SKEIN_NODE_ID`, `SKEIN_STATUS`, and
/// (for tool errors) `SKEIN_TOOL` / `SKEIN_ERROR`.
pub struct CommandHooks {
    config: HooksConfig,
}

impl CommandHooks {
    pub fn new(config: HooksConfig) -> Self {
        Self { config }
    }
}

impl WorkflowHooks for CommandHooks {
    fn before_workflow<'a>(&'a self, workflow_id: &'a str) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            run_hooks(
                &self.config.before_workflow,
                &[("SKEIN_WORKFLOW_ID", workflow_id)],
            )
            .await;
        })
    }

    fn before_subtask<'a>(
        &'a self,
        ctx: &'a ExecutionContext,
        _subtask: &'a SubtaskInfo,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            run_hooks(
                &self.config.before_subtask,
                &[
                    ("SKEIN_WORKFLOW_ID", ctx.workflow_id.as_str()),
                    ("SKEIN_NODE_ID", ctx.node_id.as_str()),
                ],
            )
            .await;
        })
    }

    fn after_tool_use<'a>(
        &'a self,
        ctx: &'a ExecutionContext,
        tool: &'a str,
        result: &'a ToolResult,
    ) -> BoxFuture<'a, Option<ToolResult>> {
        Box::pin(async move {
            if result.is_error {
                run_hooks(
                    &self.config.on_tool_error,
                    &[
                        ("SKEIN_WORKFLOW_ID", ctx.workflow_id.as_str()),
                        ("SKEIN_NODE_ID", ctx.node_id.as_str()),
                        ("SKEIN_TOOL", tool),
                        ("SKEIN_ERROR", result.content.as_str()),
                    ],
                )
                .await;
            }
            None
        })
    }

    fn after_subtask<'a>(
        &'a self,
        ctx: &'a ExecutionContext,
        report: &'a SubtaskReport,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let status = report.status.to_string();
            run_hooks(
                &self.config.after_subtask,
                &[
                    ("SKEIN_WORKFLOW_ID", ctx.workflow_id.as_str()),
                    ("SKEIN_NODE_ID", ctx.node_id.as_str()),
                    ("SKEIN_STATUS", status.as_str()),
                ],
            )
            .await;
        })
    }

    fn after_workflow<'a>(
        &'a self,
        workflow_id: &'a str,
        status: WorkflowStatus,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let status = status.to_string();
            run_hooks(
                &self.config.after_workflow,
                &[
                    ("SKEIN_WORKFLOW_ID", workflow_id),
                    ("SKEIN_STATUS", status.as_str()),
                ],
            )
            .await;
        })
    }
}
