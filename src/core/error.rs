//! 错误类型
//!
//! PlanningError 致命（终止 invoke）；ProviderError / ToolError 在任务执行期被吸收为失败的 ActionResult，
//! 只有规划期的 ProviderError 会经由 PlanningError 抛给调用方。预算耗尽不是错误。

use thiserror::Error;

use crate::core::AgentPhase;
use crate::llm::ProviderError;

/// 规划 / 重规划失败
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlanningError {
    #[error("objective is empty")]
    EmptyObjective,

    #[error("planner provider call failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("planner returned no usable tasks")]
    EmptyPlan,

    #[error("planner output could not be parsed: {0}")]
    Malformed(String),

    #[error("no budget left to replan into")]
    NoBudget,
}

/// invoke / build 对调用方暴露的错误
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Invalid objective: {0}")]
    InvalidObjective(String),

    #[error("Planning failed: {0}")]
    Planning(#[from] PlanningError),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid phase transition: {from:?} -> {to:?}")]
    InvalidTransition { from: AgentPhase, to: AgentPhase },
}
