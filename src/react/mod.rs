//! 认知层：TaskPlanner、ActionSubgraph、ReplanController、Enhancer、事件总线与 Prompt 模板

pub mod action;
pub mod enhancer;
pub mod events;
pub mod planner;
pub mod prompts;
pub mod replan;

pub use action::{parse_decision, ActionExecutor, ActionSubgraph, Decision, StepOutcome};
pub use enhancer::{fallback_digest, Enhancer};
pub use events::{AgentEvent, EventBus, EventData, EventKind, EventPayload, Listener};
pub use planner::{parse_task_list, TaskPlanner};
pub use replan::{ReplanController, ReplanReason};
