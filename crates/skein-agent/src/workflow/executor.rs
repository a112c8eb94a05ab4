use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use skein_core::context::{ExecutionContext, VariableStore};
use skein_core::error::{Result, SkeinError};
use skein_core::hooks::WorkflowHooks;
use skein_core::traits::LlmClient;
use skein_core::types::{
    ChatMessage, NodeStatus, SubtaskInfo, SubtaskReport, WorkflowEvent, WorkflowStatus,
};

use super::dag;
use super::node::{ResolvedInput, WorkflowNode};
use super::parser::{self, WorkflowDescription};
use crate::action_loop::{ActionRun, ActionRuntime};

/// Result of executing a single node.
#[derive(Debug, Clone)]
pub struct NodeResult {
    /// Which node this is.
    pub node_id: String,
    pub status: NodeStatus,
    /// Committed output value, when the node completed.
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
    /// Full transcript of the node's action loop.
    pub reacts: Vec<ChatMessage>,
    pub rounds: usize,
    /// Execution time in milliseconds.
    pub elapsed_ms: u64,
}

impl NodeResult {
    fn not_run(node_id: &str, status: NodeStatus, error: Option<String>) -> Self {
        Self {
            node_id: node_id.to_string(),
            status,
            output: None,
            error,
            reacts: vec![],
            rounds: 0,
            elapsed_ms: 0,
        }
    }
}

/// Result of executing an entire workflow.
#[derive(Debug, Clone)]
pub struct WorkflowResult {
    pub workflow_id: String,
    pub status: WorkflowStatus,
    /// Per-node results in declaration order.
    pub nodes: Vec<NodeResult>,
    /// Variable store contents after the run.
    pub variables: HashMap<String, serde_json::Value>,
    /// Total execution time in milliseconds.
    pub elapsed_ms: u64,
}

impl WorkflowResult {
    pub fn node(&self, node_id: &str) -> Option<&NodeResult> {
        self.nodes.iter().find(|n| n.node_id == node_id)
    }

    pub fn succeeded(&self) -> bool {
        self.status == WorkflowStatus::Completed
    }
}

/// Cancels a workflow from outside the task that executes it.
///
/// Sets the abort flag so no further node starts, and cancels the token of
/// every node currently running. A cancelled workflow stays cancelled.
#[derive(Clone)]
pub struct CancelHandle {
    aborted: Arc<AtomicBool>,
    root: CancellationToken,
    active: Arc<Mutex<HashMap<String, CancellationToken>>>,
}

impl CancelHandle {
    fn new() -> Self {
        Self {
            aborted: Arc::new(AtomicBool::new(false)),
            root: CancellationToken::new(),
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn cancel(&self) {
        self.aborted.store(true, Ordering::SeqCst);
        for (node_id, token) in self.lock_active().iter() {
            debug!(node_id = %node_id, "Cancelling running node");
            token.cancel();
        }
        self.root.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    /// Number of nodes currently tracked as running.
    pub fn active_nodes(&self) -> usize {
        self.lock_active().len()
    }

    fn track(&self, node_id: &str) -> CancellationToken {
        let token = self.root.child_token();
        self.lock_active().insert(node_id.to_string(), token.clone());
        token
    }

    fn untrack(&self, node_id: &str) {
        self.lock_active().remove(node_id);
    }

    fn lock_active(&self) -> MutexGuard<'_, HashMap<String, CancellationToken>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// A DAG of subtasks sharing one variable store.
pub struct Workflow {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    nodes: Vec<WorkflowNode>,
    variables: VariableStore,
    llm: Option<Arc<dyn LlmClient>>,
    cancel: CancelHandle,
    raw_json: String,
}

/// Everything a node future needs, owned so the workflow stays free to commit.
struct Activation {
    node: WorkflowNode,
    inputs: Vec<ResolvedInput>,
    ctx: ExecutionContext,
}

struct Finished {
    node_id: String,
    ctx: ExecutionContext,
    run: ActionRun,
    elapsed_ms: u64,
}

impl Workflow {
    /// Create an empty workflow.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::from_description(WorkflowDescription {
            id: id.into(),
            name: name.into(),
            description: None,
            variables: HashMap::new(),
            nodes: vec![],
        })
    }

    /// Parse and validate a serialized workflow. Fails closed.
    ///
    /// With `known_tools` (usually `ToolRegistry::tool_enum()`) every tool
    /// named by an action must be registered.
    pub fn from_json(json: &str, known_tools: Option<&[String]>) -> Result<Self> {
        let desc = parser::parse(json, known_tools)?;
        let mut workflow = Self::from_description(desc);
        workflow.raw_json = json.to_string();
        Ok(workflow)
    }

    pub fn from_description(desc: WorkflowDescription) -> Self {
        let raw_json = serde_json::to_string(&desc).unwrap_or_default();
        Self {
            id: desc.id,
            name: desc.name,
            description: desc.description,
            nodes: desc.nodes,
            variables: VariableStore::from_map(desc.variables),
            llm: None,
            cancel: CancelHandle::new(),
            raw_json,
        }
    }

    /// Bind the LLM provider every node uses.
    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn set_llm(&mut self, llm: Arc<dyn LlmClient>) {
        self.llm = Some(llm);
    }

    pub fn nodes(&self) -> &[WorkflowNode] {
        &self.nodes
    }

    pub fn variables(&self) -> &VariableStore {
        &self.variables
    }

    /// The serialized description this workflow was built from.
    pub fn raw_json(&self) -> &str {
        &self.raw_json
    }

    /// Current structure as a description.
    pub fn to_description(&self) -> WorkflowDescription {
        WorkflowDescription {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            variables: self.variables.snapshot(),
            nodes: self.nodes.clone(),
        }
    }

    /// Append a node. Dependency problems surface at the next `validate_dag()`.
    pub fn add_node(&mut self, node: WorkflowNode) -> Result<()> {
        if self.nodes.iter().any(|n| n.id == node.id) {
            return Err(SkeinError::WorkflowParse(format!(
                "duplicate node id '{}'",
                node.id
            )));
        }
        self.nodes.push(node);
        Ok(())
    }

    /// Remove a node. Nodes that depend on it fail the next `validate_dag()`.
    pub fn remove_node(&mut self, node_id: &str) -> Option<WorkflowNode> {
        let idx = self.nodes.iter().position(|n| n.id == node_id)?;
        Some(self.nodes.remove(idx))
    }

    pub fn get_node(&self, node_id: &str) -> Result<&WorkflowNode> {
        self.nodes
            .iter()
            .find(|n| n.id == node_id)
            .ok_or_else(|| SkeinError::NodeNotFound(node_id.to_string()))
    }

    pub fn validate_dag(&self) -> Result<()> {
        dag::validate(&self.nodes)
    }

    /// Deterministic execution order: topological, ties by declaration order.
    pub fn plan(&self) -> Result<Vec<String>> {
        dag::topological_order(&self.nodes)
    }

    /// Handle for cancelling this workflow while `execute` runs elsewhere.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Run every node in dependency order.
    ///
    /// Independent nodes run concurrently, up to `agent.max_parallel_nodes`.
    /// A node whose dependency did not complete is skipped. Validation and a
    /// missing LLM provider fail before any node starts; node failures are
    /// reported in the result.
    pub async fn execute(
        &mut self,
        runtime: &ActionRuntime,
        hooks: Option<Arc<dyn WorkflowHooks>>,
    ) -> Result<WorkflowResult> {
        self.validate_dag()?;
        let llm = self.llm.clone().ok_or(SkeinError::NoLlmProvider)?;
        let order = self.plan()?;
        let start = Instant::now();
        let bus = runtime.event_bus().clone();
        let max_parallel = runtime.config().agent.max_parallel_nodes.max(1);

        info!(
            workflow_id = %self.id,
            nodes = order.len(),
            max_parallel,
            "Starting workflow"
        );
        if let Some(hooks) = &hooks {
            hooks.before_workflow(&self.id).await;
        }
        bus.publish(WorkflowEvent::WorkflowStarted {
            workflow_id: self.id.clone(),
        });

        let mut status: HashMap<String, NodeStatus> = order
            .iter()
            .map(|id| (id.clone(), NodeStatus::Pending))
            .collect();
        let mut results: HashMap<String, NodeResult> = HashMap::new();
        let mut in_flight = FuturesUnordered::new();

        loop {
            if !self.cancel.is_cancelled() {
                for id in &order {
                    if in_flight.len() >= max_parallel {
                        break;
                    }
                    if status.get(id) != Some(&NodeStatus::Pending) {
                        continue;
                    }
                    let node = self.get_node(id)?;

                    let blocked = node.dependencies.iter().find(|d| {
                        matches!(
                            status.get(d.as_str()),
                            Some(NodeStatus::Failed | NodeStatus::Cancelled | NodeStatus::Skipped)
                        )
                    });
                    if let Some(dep) = blocked {
                        let reason = SkeinError::DependencyFailed {
                            node: id.clone(),
                            dependency: dep.clone(),
                        };
                        warn!(node_id = %id, dependency = %dep, "Skipping node");
                        status.insert(id.clone(), NodeStatus::Skipped);
                        results.insert(
                            id.clone(),
                            NodeResult::not_run(id, NodeStatus::Skipped, Some(reason.to_string())),
                        );
                        bus.publish(WorkflowEvent::NodeFinished {
                            node_id: id.clone(),
                            status: NodeStatus::Skipped,
                            rounds: 0,
                        });
                        continue;
                    }

                    let ready = node
                        .dependencies
                        .iter()
                        .all(|d| status.get(d.as_str()) == Some(&NodeStatus::Completed));
                    if !ready {
                        continue;
                    }

                    let activation = self.activate(node, &llm, runtime, hooks.clone());
                    status.insert(id.clone(), NodeStatus::Running);
                    in_flight.push(run_node(runtime, activation));
                }
            }

            let Some(finished) = in_flight.next().await else {
                break;
            };

            let node_id = finished.node_id.clone();
            let ctx = finished.ctx.clone();
            let result = self.commit(finished);
            status.insert(node_id.clone(), result.status);

            if let Some(hooks) = &hooks {
                let report = SubtaskReport {
                    node_id: node_id.clone(),
                    status: result.status,
                    output: result.output.clone(),
                    error: result.error.clone(),
                };
                hooks.after_subtask(&ctx, &report).await;
            }
            bus.publish(WorkflowEvent::NodeFinished {
                node_id: node_id.clone(),
                status: result.status,
                rounds: result.rounds,
            });
            results.insert(node_id, result);
        }

        let aborted = self.cancel.is_cancelled();
        let nodes: Vec<NodeResult> = self
            .nodes
            .iter()
            .map(|n| match results.remove(&n.id) {
                Some(r) => r,
                None => {
                    let (left, reason) = if aborted {
                        (NodeStatus::Cancelled, "workflow cancelled before the node started")
                    } else {
                        (NodeStatus::Skipped, "node never became ready")
                    };
                    NodeResult::not_run(&n.id, left, Some(reason.to_string()))
                }
            })
            .collect();

        let status = if aborted {
            WorkflowStatus::Cancelled
        } else if nodes.iter().all(|n| n.status == NodeStatus::Completed) {
            WorkflowStatus::Completed
        } else {
            WorkflowStatus::Failed
        };

        let elapsed_ms = start.elapsed().as_millis() as u64;
        info!(workflow_id = %self.id, %status, elapsed_ms, "Workflow finished");
        if let Some(hooks) = &hooks {
            hooks.after_workflow(&self.id, status).await;
        }
        bus.publish(WorkflowEvent::WorkflowFinished {
            workflow_id: self.id.clone(),
            status,
        });

        Ok(WorkflowResult {
            workflow_id: self.id.clone(),
            status,
            nodes,
            variables: self.variables.snapshot(),
            elapsed_ms,
        })
    }

    fn activate(
        &self,
        node: &WorkflowNode,
        llm: &Arc<dyn LlmClient>,
        runtime: &ActionRuntime,
        hooks: Option<Arc<dyn WorkflowHooks>>,
    ) -> Activation {
        let config = runtime.config().clone();
        let model = node.action.llm.apply(&config.model);
        let ctx = ExecutionContext::new(
            self.id.clone(),
            node.id.clone(),
            self.variables.clone(),
            llm.clone(),
            config,
        )
        .with_model(model)
        .with_hooks(hooks)
        .with_cancel(self.cancel.track(&node.id));

        Activation {
            node: node.clone(),
            inputs: self.resolve_inputs(node),
            ctx,
        }
    }

    /// Fill declared inputs from dependency outputs first, then variables.
    fn resolve_inputs(&self, node: &WorkflowNode) -> Vec<ResolvedInput> {
        node.input
            .items
            .iter()
            .map(|item| {
                let from_dependency = node
                    .dependencies
                    .iter()
                    .filter_map(|d| self.get_node(d).ok())
                    .find(|dep| dep.output.name == item.name)
                    .and_then(|dep| dep.output.value.clone());

                let value = from_dependency
                    .or_else(|| self.variables.get(&item.name))
                    .unwrap_or_else(|| {
                        warn!(node_id = %node.id, input = %item.name, "Input has no value");
                        serde_json::Value::Null
                    });

                ResolvedInput {
                    name: item.name.clone(),
                    description: item.description.clone(),
                    value,
                }
            })
            .collect()
    }

    /// Record a finished node; completed outputs go to the node and the variable store.
    fn commit(&mut self, finished: Finished) -> NodeResult {
        let Finished {
            node_id,
            ctx: _,
            run,
            elapsed_ms,
        } = finished;
        self.cancel.untrack(&node_id);

        let (status, output, error) = match run.outcome {
            Ok(out) => {
                if let Some(node) = self.nodes.iter_mut().find(|n| n.id == node_id) {
                    node.output.value = Some(out.value.clone());
                    self.variables.set(node.output.name.clone(), out.value.clone());
                }
                (NodeStatus::Completed, Some(out.value), None)
            }
            Err(SkeinError::Cancelled) => {
                (NodeStatus::Cancelled, None, Some(SkeinError::Cancelled.to_string()))
            }
            Err(e) => {
                error!(node_id = %node_id, error = %e, "Node failed");
                (NodeStatus::Failed, None, Some(e.to_string()))
            }
        };

        debug!(node_id = %node_id, %status, elapsed_ms, "Node committed");
        NodeResult {
            node_id,
            status,
            output,
            error,
            reacts: run.reacts,
            rounds: run.rounds,
            elapsed_ms,
        }
    }
}

impl std::fmt::Debug for Workflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workflow")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("nodes", &self.nodes.len())
            .field("has_llm", &self.llm.is_some())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

async fn run_node(
    runtime: &ActionRuntime,
    activation: Activation,
) -> Finished {
    let Activation { node, inputs, ctx } = activation;
    let start = Instant::now();

    if let Some(hooks) = &ctx.hooks {
        let info = SubtaskInfo {
            node_id: node.id.clone(),
            name: node.name.clone(),
            description: node.description.clone(),
        };
        hooks.before_subtask(&ctx, &info).await;
    }
    info!(node_id = %node.id, node_name = %node.name, "Executing workflow node");
    runtime.event_bus().publish(WorkflowEvent::NodeStarted {
        node_id: node.id.clone(),
    });

    let run = runtime.run(&node, &inputs, &ctx).await;

    Finished {
        node_id: node.id,
        ctx,
        run,
        elapsed_ms: start.elapsed().as_millis() as u64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::node::Action;
    use skein_test_utils::TWO_NODE_WORKFLOW;

    #[test]
    fn test_from_json_keeps_raw() {
        let wf = Workflow::from_json(TWO_NODE_WORKFLOW, None).unwrap();
        assert_eq!(wf.raw_json(), TWO_NODE_WORKFLOW);
        assert_eq!(wf.nodes().len(), 2);
        assert_eq!(wf.variables().get_str("topic").as_deref(), Some("Rust async"));
    }

    #[test]
    fn test_raw_json_unaffected_by_mutation() {
        let mut wf = Workflow::from_json(TWO_NODE_WORKFLOW, None).unwrap();
        wf.remove_node("write").unwrap();
        wf.add_node(WorkflowNode::new("extra", "Extra")).unwrap();
        assert_eq!(wf.raw_json(), TWO_NODE_WORKFLOW);
        assert!(wf.to_description().nodes.iter().any(|n| n.id == "extra"));
    }

    #[test]
    fn test_remove_depended_on_node_fails_validation() {
        let mut wf = Workflow::from_json(TWO_NODE_WORKFLOW, None).unwrap();
        assert!(wf.remove_node("research").is_some());
        assert!(matches!(
            wf.validate_dag(),
            Err(SkeinError::UnknownDependency { node, dependency })
                if node == "write" && dependency == "research"
        ));
        assert!(wf.remove_node("research").is_none());
    }

    #[test]
    fn test_add_duplicate_node() {
        let mut wf = Workflow::new("wf", "W");
        wf.add_node(WorkflowNode::new("a", "A")).unwrap();
        assert!(wf.add_node(WorkflowNode::new("a", "again")).is_err());
    }

    #[test]
    fn test_get_node_not_found() {
        let wf = Workflow::new("wf", "W");
        assert!(matches!(wf.get_node("x"), Err(SkeinError::NodeNotFound(_))));
    }

    #[test]
    fn test_plan_order() {
        let mut wf = Workflow::new("wf", "W");
        wf.add_node(WorkflowNode::new("b", "B").with_dependencies(&["a"])).unwrap();
        wf.add_node(WorkflowNode::new("a", "A").with_action(Action::prompt("a", "first"))).unwrap();
        assert_eq!(wf.plan().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_cancel_handle_shared() {
        let wf = Workflow::new("wf", "W");
        let handle = wf.cancel_handle();
        let token = wf.cancel.track("n1");
        assert_eq!(handle.active_nodes(), 1);
        handle.cancel();
        assert!(wf.is_cancelled());
        assert!(token.is_cancelled());
        wf.cancel.untrack("n1");
        assert_eq!(handle.active_nodes(), 0);
    }
}
