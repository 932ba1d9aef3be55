//! react-agent：目标驱动的任务编排引擎
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 共享状态、错误类型、Agent 构建器与主控循环
//! - **llm**: Provider 抽象与实现（Gemini / OpenAI / OpenRouter / Mock）
//! - **observability**: tracing 初始化
//! - **react**: TaskPlanner、ActionSubgraph、ReplanController、Enhancer、事件总线
//! - **tools**: 工具注册表、执行器与内置工具（web_search、web_fetch）

pub mod config;
pub mod core;
pub mod llm;
pub mod observability;
pub mod react;
pub mod tools;

pub use crate::core::{
    Agent, AgentBuilder, AgentError, AgentOutcome, BuilderOptions, InitOptions, Invocation,
    SharedState, StopReason,
};
pub use crate::react::{EventKind, EventPayload};
