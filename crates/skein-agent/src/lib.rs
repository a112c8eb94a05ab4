pub mod action_loop;
pub mod compress;
pub mod context;
pub mod history;
pub mod output_validator;
pub mod workflow;

pub use action_loop::{ActionOutput, ActionRun, ActionRuntime};
pub use compress::{ContextCompressor, NoCompress, SimpleQaCompress, SummaryCompress};
pub use output_validator::{OutputCleaner, OutputValidator};
pub use workflow::{CancelHandle, NodeResult, Workflow, WorkflowNode, WorkflowResult};
