//! Workflow engine: a DAG of subtasks executed by the action loop.
//!
//! A workflow is an ordered list of `WorkflowNode`s. Each node names the
//! nodes it depends on; a node starts once every dependency has committed
//! its output. Outputs land on the node and in the shared variable store
//! under the node's output name, where dependents pick them up as inputs.

pub mod dag;
pub mod executor;
pub mod node;
pub mod parser;

pub use executor::{CancelHandle, NodeResult, Workflow, WorkflowResult};
pub use node::{Action, ActionKind, InputItem, LlmOverrides, NodeInput, NodeOutput, ResolvedInput, WorkflowNode};
pub use parser::WorkflowDescription;
