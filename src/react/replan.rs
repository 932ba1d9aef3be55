//! ReplanController：判断是否需要重规划，并生成新版本计划
//!
//! 触发条件（按优先级）：最近一条结果失败；计划已耗尽但完成判定为未达成；待办任务数超过剩余预算。
//! 重规划只替换前向计划：已结束的任务与全部 ActionResult 保留，步数不回退。

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::{CompletionVerdict, PlanningError, SharedState, Task, TaskPlan, TaskStatus};
use crate::llm::ModelRoute;
use crate::react::planner::parse_task_list;
use crate::react::prompts;

/// 重规划原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplanReason {
    LastActionFailed,
    ObjectiveUnsatisfied,
    InsufficientBudget,
}

impl fmt::Display for ReplanReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReplanReason::LastActionFailed => {
                "The most recent task failed. Work around the failure with different tasks."
            }
            ReplanReason::ObjectiveUnsatisfied => {
                "All planned tasks finished but the objective is not yet met. Add the missing work."
            }
            ReplanReason::InsufficientBudget => {
                "The remaining budget cannot cover the pending tasks. Merge or cut tasks to fit."
            }
        };
        f.write_str(s)
    }
}

#[derive(Debug, Deserialize)]
struct Judgement {
    complete: bool,
    #[serde(default)]
    reason: String,
}

fn parse_judgement(output: &str) -> Option<Judgement> {
    let start = output.find('{')?;
    let end = output.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&output[start..=end]).ok()
}

/// 重规划控制器：只读、可在并发 invoke 间共享
#[derive(Clone)]
pub struct ReplanController {
    route: ModelRoute,
}

impl ReplanController {
    pub fn new(route: ModelRoute) -> Self {
        Self { route }
    }

    /// 是否需要重规划；预算耗尽时无从重规划，返回 None
    pub fn should_replan(&self, state: &SharedState) -> Option<ReplanReason> {
        if state.budget_exhausted() {
            return None;
        }
        if state.last_result().is_some_and(|r| !r.success) {
            return Some(ReplanReason::LastActionFailed);
        }
        let plan = state.plan();
        if plan.is_exhausted() && state.current_verdict().is_some_and(|v| !v.complete) {
            return Some(ReplanReason::ObjectiveUnsatisfied);
        }
        if plan.pending_count() > state.remaining_budget() {
            return Some(ReplanReason::InsufficientBudget);
        }
        None
    }

    /// 计划耗尽时判定目标是否达成，写入 SharedState。判定调用失败或输出无法解析时视为已完成，
    /// 原因中记录失败信息，避免在无法判定的目标上反复循环
    pub async fn assess_completion(
        &self,
        objective: &str,
        output_instruction: &str,
        state: &mut SharedState,
    ) -> CompletionVerdict {
        if let Some(v) = state.current_verdict() {
            return v.clone();
        }
        let prompt = prompts::judge_prompt(objective, output_instruction, state.action_results());
        let (complete, reason) = match self.route.complete(&prompt).await {
            Ok(out) => match parse_judgement(&out) {
                Some(j) => (j.complete, j.reason),
                None => (true, format!("unparseable judgement: {}", out.trim())),
            },
            Err(e) => (true, format!("judge unavailable: {e}")),
        };
        tracing::info!(complete, reason = %reason, "completion verdict");
        state.set_verdict(complete, reason)
    }

    /// 生成并安装下一版本计划
    pub async fn replan(
        &self,
        objective: &str,
        output_instruction: &str,
        state: &mut SharedState,
        reason: ReplanReason,
    ) -> Result<TaskPlan, PlanningError> {
        let remaining = state.remaining_budget();
        if remaining == 0 {
            return Err(PlanningError::NoBudget);
        }
        let prompt = prompts::replan_prompt(
            objective,
            output_instruction,
            state,
            &reason.to_string(),
            remaining,
        );
        let output = self.route.complete(&prompt).await?;
        let mut descriptions = parse_task_list(&output)?;
        descriptions.truncate(remaining);

        let plan = merge_plan(state.plan(), descriptions, state.next_index());
        tracing::info!(
            version = plan.version,
            reason = ?reason,
            pending = plan.pending_count(),
            dropped = plan.dropped.len(),
            "replanned"
        );
        state
            .install_plan(plan.clone())
            .map_err(|e| PlanningError::Malformed(e.to_string()))?;
        Ok(plan)
    }
}

/// 保留已结束任务；描述相同的待办任务沿用原编号，其余待办记入 dropped；新任务从 next_index 起编号
fn merge_plan(current: &TaskPlan, descriptions: Vec<String>, next_index: usize) -> TaskPlan {
    let mut tasks: Vec<Task> = current
        .tasks
        .iter()
        .filter(|t| t.status.is_finished())
        .cloned()
        .collect();

    let mut pending: HashMap<&str, usize> = current
        .pending()
        .map(|t| (t.description.as_str(), t.index))
        .collect();
    let mut next = next_index;
    for description in descriptions {
        let index = match pending.remove(description.as_str()) {
            Some(index) => index,
            None => {
                next += 1;
                next - 1
            }
        };
        tasks.push(Task {
            index,
            description,
            status: TaskStatus::Pending,
        });
    }

    let mut dropped: Vec<usize> = pending.into_values().collect();
    dropped.sort_unstable();
    TaskPlan {
        version: current.version + 1,
        tasks,
        dropped,
    }
}
