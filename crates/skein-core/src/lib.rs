pub mod config;
pub mod context;
pub mod error;
pub mod event;
pub mod hooks;
pub mod traits;
pub mod types;

pub use config::AppConfig;
pub use context::{ExecutionContext, VariableStore};
pub use error::{Result, SkeinError};
pub use event::EventBus;
pub use hooks::{CommandHooks, WorkflowHooks};
pub use types::*;
