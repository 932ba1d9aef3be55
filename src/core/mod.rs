//! 核心编排层：共享状态、错误类型、Agent 构建器与主控循环

pub mod builder;
pub mod error;
pub mod orchestrator;
pub mod state;

pub use builder::{AgentBuilder, AgentSettings, BuilderOptions, InitOptions};
pub use error::{AgentError, PlanningError};
pub use orchestrator::{Agent, AgentOutcome, Invocation};
pub use state::{
    ActionResult, AgentPhase, CompletionVerdict, ResultSource, SharedState, StopReason, Task,
    TaskPlan, TaskStatus,
};
