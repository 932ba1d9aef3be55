//! ActionSubgraph：对单个任务执行 decide → act → compose 三节点子流程
//!
//! 与编排器共享同一个 `&mut SharedState`：标记 InProgress，结束时追加恰好一条 ActionResult 并计一步。
//! Provider / 工具失败被吸收为失败结果；取消时任务回到 Pending，不追加、不计步。

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::core::{ActionResult, ResultSource, SharedState, Task};
use crate::llm::ModelRoute;
use crate::react::prompts;
use crate::tools::{ToolCall, ToolExecutor};

/// 单步执行结果
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// 已追加结果（成功或失败）
    Completed(ActionResult),
    /// 被取消，状态已回滚
    Cancelled,
    /// 任务不可执行（不存在、非 Pending、已有任务在执行或预算耗尽），状态未改变
    Refused(String),
}

/// decide 节点的输出
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// 直接给出任务结果
    Answer(String),
    /// 需要调用工具
    Call(ToolCall),
}

/// 解析 decide 输出：含有效 JSON 且 tool 非空则为工具调用，否则整段文本即结果
pub fn parse_decision(output: &str) -> Decision {
    let trimmed = output.trim();
    let json_str = if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim())
    } else if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if end <= start {
            return Decision::Answer(trimmed.to_string());
        }
        &trimmed[start..=end]
    } else {
        return Decision::Answer(trimmed.to_string());
    };

    match serde_json::from_str::<ToolCall>(json_str) {
        Ok(call) if !call.tool.trim().is_empty() => Decision::Call(call),
        _ => Decision::Answer(trimmed.to_string()),
    }
}

/// 等待 fut，除非先被取消
async fn until_cancelled<F: Future>(cancel: &CancellationToken, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        out = fut => Some(out),
    }
}

/// 任务执行器：持有模型路由与工具执行器，只读、可在并发 invoke 间共享
#[derive(Clone)]
pub struct ActionExecutor {
    route: ModelRoute,
    tools: ToolExecutor,
}

impl ActionExecutor {
    pub fn new(route: ModelRoute, tools: ToolExecutor) -> Self {
        Self { route, tools }
    }

    /// 绑定到一次 invoke 的目标
    pub fn subgraph<'a>(&'a self, objective: &'a str) -> ActionSubgraph<'a> {
        ActionSubgraph {
            executor: self,
            objective,
        }
    }

    pub fn tools(&self) -> &ToolExecutor {
        &self.tools
    }
}

/// 绑定了目标的子流程
pub struct ActionSubgraph<'a> {
    executor: &'a ActionExecutor,
    objective: &'a str,
}

impl ActionSubgraph<'_> {
    pub async fn execute(
        &self,
        task_index: usize,
        state: &mut SharedState,
        cancel: &CancellationToken,
    ) -> StepOutcome {
        if cancel.is_cancelled() {
            return StepOutcome::Cancelled;
        }
        let Some(task) = state.begin_task(task_index) else {
            let reason = if state.budget_exhausted() {
                "step budget exhausted".to_string()
            } else {
                format!("task {task_index} is not runnable")
            };
            tracing::warn!(task = task_index, %reason, "action refused");
            return StepOutcome::Refused(reason);
        };

        tracing::info!(
            task = task.index,
            step = state.step() + 1,
            max_tasks = state.max_tasks(),
            description = %task.description,
            "executing task"
        );
        let finished = self.run(&task, state.action_results(), cancel).await;
        match finished {
            Some(result) => {
                if !result.success {
                    tracing::warn!(task = task.index, source = %result.source, "task failed: {}", result.content);
                }
                state.finish_task(result.clone());
                StepOutcome::Completed(result)
            }
            None => {
                state.abort_task(task.index);
                tracing::info!(task = task.index, "task cancelled, reverted to pending");
                StepOutcome::Cancelled
            }
        }
    }

    /// 返回 None 表示被取消
    async fn run(
        &self,
        task: &Task,
        previous: &[ActionResult],
        cancel: &CancellationToken,
    ) -> Option<ActionResult> {
        let route = &self.executor.route;
        let tools = &self.executor.tools;
        let provider_source = ResultSource::Provider {
            name: route.provider().to_string(),
            model: route.model().to_string(),
        };

        // decide
        let tools_json = (!tools.registry().is_empty()).then(|| tools.registry().to_schema_json());
        let prompt =
            prompts::decide_prompt(self.objective, &task.description, previous, tools_json.as_deref());
        let decided = match until_cancelled(cancel, route.complete(&prompt)).await? {
            Ok(out) => parse_decision(&out),
            Err(e) => return Some(ActionResult::failed(task, e.to_string(), provider_source)),
        };

        let call = match decided {
            Decision::Answer(text) if text.is_empty() => {
                return Some(ActionResult::failed(
                    task,
                    "provider returned an empty answer",
                    provider_source,
                ));
            }
            Decision::Answer(text) => {
                return Some(ActionResult::succeeded(task, text, provider_source));
            }
            Decision::Call(call) => call,
        };

        // act
        tracing::debug!(task = task.index, tool = %call.tool, "tool selected");
        let tool_source = ResultSource::Tool {
            name: call.tool.clone(),
        };
        let output = match until_cancelled(cancel, tools.execute(&call.tool, call.args.clone())).await? {
            Ok(out) => out,
            Err(e) => return Some(ActionResult::failed(task, e.to_string(), tool_source)),
        };

        // compose
        let prompt = prompts::compose_prompt(self.objective, &task.description, &call.tool, &output);
        match until_cancelled(cancel, route.complete(&prompt)).await? {
            Ok(text) if !text.trim().is_empty() => {
                Some(ActionResult::succeeded(task, text.trim(), tool_source))
            }
            // 整理失败时保留工具原始输出
            Ok(_) | Err(_) => Some(ActionResult::succeeded(task, output, tool_source)),
        }
    }
}
