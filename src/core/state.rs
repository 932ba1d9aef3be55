//! 共享状态：TaskPlan、ActionResult、步数与预算
//!
//! SharedState 是一次 invoke 内唯一跨组件的可变资源：编排器与 ActionSubgraph 通过 `&mut SharedState`
//! 操作同一实例，借用规则保证任一时刻只有一个写者，不需要锁。
//!
//! # Invariants
//! - `step <= max_tasks`，且只增不减
//! - `action_results` 的顺序即任务完成顺序，只追加
//! - 同一时刻至多一个 Task 处于 InProgress
//! - 任务编号在一次 invoke 的所有计划版本中唯一；重规划后 `plan.version` 严格递增

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::AgentError;

/// 任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Done,
    Failed,
}

impl TaskStatus {
    pub fn is_finished(self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Failed)
    }
}

/// 计划中的一个任务
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub index: usize,
    pub description: String,
    pub status: TaskStatus,
}

/// 有序、带版本的任务列表
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TaskPlan {
    pub version: u32,
    pub tasks: Vec<Task>,
    /// 本版本显式丢弃的上一版本待办任务编号
    #[serde(default)]
    pub dropped: Vec<usize>,
}

impl TaskPlan {
    /// 以连续编号（从 first_index 开始）创建一组 Pending 任务
    pub fn new(version: u32, descriptions: Vec<String>, first_index: usize) -> Self {
        let tasks = descriptions
            .into_iter()
            .enumerate()
            .map(|(i, description)| Task {
                index: first_index + i,
                description,
                status: TaskStatus::Pending,
            })
            .collect();
        Self {
            version,
            tasks,
            dropped: Vec::new(),
        }
    }

    pub fn task(&self, index: usize) -> Option<&Task> {
        self.tasks.iter().find(|t| t.index == index)
    }

    fn task_mut(&mut self, index: usize) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.index == index)
    }

    pub fn pending(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter().filter(|t| t.status == TaskStatus::Pending)
    }

    pub fn pending_count(&self) -> usize {
        self.pending().count()
    }

    pub fn in_progress(&self) -> Option<&Task> {
        self.tasks.iter().find(|t| t.status == TaskStatus::InProgress)
    }

    /// 所有任务都已结束（Done / Failed）
    pub fn is_exhausted(&self) -> bool {
        self.tasks.iter().all(|t| t.status.is_finished())
    }

    pub fn max_index(&self) -> Option<usize> {
        self.tasks
            .iter()
            .map(|t| t.index)
            .chain(self.dropped.iter().copied())
            .max()
    }
}

/// ActionResult 的来源
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResultSource {
    Provider { name: String, model: String },
    Tool { name: String },
    /// 执行器自身（如取消前的失败、参数解析失败）
    Executor,
}

impl fmt::Display for ResultSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultSource::Provider { name, model } => write!(f, "{name}/{model}"),
            ResultSource::Tool { name } => write!(f, "tool:{name}"),
            ResultSource::Executor => f.write_str("executor"),
        }
    }
}

/// 单个任务的执行结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub task_index: usize,
    pub task: String,
    pub content: String,
    pub source: ResultSource,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
}

impl ActionResult {
    pub fn succeeded(task: &Task, content: impl Into<String>, source: ResultSource) -> Self {
        Self::build(task, content.into(), source, true)
    }

    pub fn failed(task: &Task, reason: impl Into<String>, source: ResultSource) -> Self {
        Self::build(task, reason.into(), source, false)
    }

    fn build(task: &Task, content: String, source: ResultSource, success: bool) -> Self {
        Self {
            task_index: task.index,
            task: task.description.clone(),
            content,
            source,
            timestamp: Utc::now(),
            success,
        }
    }
}

impl fmt::Display for ActionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.success { "ok" } else { "failed" };
        write!(
            f,
            "[#{} {} via {}] {}\n{}",
            self.task_index, status, self.source, self.task, self.content
        )
    }
}

/// 目标完成判定（计划耗尽时由 ReplanController 写入）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionVerdict {
    pub complete: bool,
    pub reason: String,
    /// 判定时已有的结果条数，用于识别过期判定
    pub at_results: usize,
}

/// 单次 invoke 的共享可变状态
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedState {
    plan: TaskPlan,
    action_results: Vec<ActionResult>,
    step: usize,
    max_tasks: usize,
    verdict: Option<CompletionVerdict>,
    next_index: usize,
}

impl SharedState {
    /// 空计划（version 0），等待 TaskPlanner 安装首个计划
    pub fn new(max_tasks: usize) -> Self {
        Self {
            plan: TaskPlan::default(),
            action_results: Vec::new(),
            step: 0,
            max_tasks,
            verdict: None,
            next_index: 1,
        }
    }

    pub fn with_plan(plan: TaskPlan, max_tasks: usize) -> Self {
        let mut state = Self::new(max_tasks);
        state.next_index = plan.max_index().map_or(1, |m| m + 1);
        state.plan = plan;
        state
    }

    pub fn plan(&self) -> &TaskPlan {
        &self.plan
    }

    pub fn action_results(&self) -> &[ActionResult] {
        &self.action_results
    }

    pub fn last_result(&self) -> Option<&ActionResult> {
        self.action_results.last()
    }

    pub fn step(&self) -> usize {
        self.step
    }

    pub fn max_tasks(&self) -> usize {
        self.max_tasks
    }

    pub fn remaining_budget(&self) -> usize {
        self.max_tasks.saturating_sub(self.step)
    }

    pub fn budget_exhausted(&self) -> bool {
        self.step >= self.max_tasks
    }

    pub fn verdict(&self) -> Option<&CompletionVerdict> {
        self.verdict.as_ref()
    }

    /// 仅当判定覆盖了当前全部结果时才有效
    pub fn current_verdict(&self) -> Option<&CompletionVerdict> {
        self.verdict
            .as_ref()
            .filter(|v| v.at_results == self.action_results.len())
    }

    /// 下一个按计划顺序待执行的任务编号
    pub fn next_pending(&self) -> Option<usize> {
        self.plan.pending().next().map(|t| t.index)
    }

    /// 下一个可分配的任务编号
    pub fn next_index(&self) -> usize {
        self.next_index
    }

    /// 安装首个计划或替换为新版本；版本必须严格递增，且不能在任务执行中替换
    pub fn install_plan(&mut self, plan: TaskPlan) -> Result<(), AgentError> {
        if plan.version <= self.plan.version {
            return Err(AgentError::InvalidState(format!(
                "plan version must increase (current {}, new {})",
                self.plan.version, plan.version
            )));
        }
        if self.plan.in_progress().is_some() {
            return Err(AgentError::InvalidState(
                "cannot replace plan while a task is in progress".to_string(),
            ));
        }
        if let Some(max) = plan.max_index() {
            self.next_index = self.next_index.max(max + 1);
        }
        self.plan = plan;
        Ok(())
    }

    pub(crate) fn set_verdict(&mut self, complete: bool, reason: impl Into<String>) -> CompletionVerdict {
        let verdict = CompletionVerdict {
            complete,
            reason: reason.into(),
            at_results: self.action_results.len(),
        };
        self.verdict = Some(verdict.clone());
        verdict
    }

    /// Pending -> InProgress；预算耗尽、已有任务在执行或任务不可执行时返回 None
    pub(crate) fn begin_task(&mut self, index: usize) -> Option<Task> {
        if self.budget_exhausted() || self.plan.in_progress().is_some() {
            return None;
        }
        let task = self.plan.task_mut(index)?;
        if task.status != TaskStatus::Pending {
            return None;
        }
        task.status = TaskStatus::InProgress;
        Some(task.clone())
    }

    /// 取消时回滚：InProgress -> Pending，不追加结果也不计步
    pub(crate) fn abort_task(&mut self, index: usize) {
        if let Some(task) = self.plan.task_mut(index) {
            if task.status == TaskStatus::InProgress {
                task.status = TaskStatus::Pending;
            }
        }
    }

    /// 提交任务结果：标记 Done / Failed、追加结果、步数 +1（不超过预算）
    pub(crate) fn finish_task(&mut self, result: ActionResult) {
        if let Some(task) = self.plan.task_mut(result.task_index) {
            task.status = if result.success {
                TaskStatus::Done
            } else {
                TaskStatus::Failed
            };
        }
        self.action_results.push(result);
        self.step = (self.step + 1).min(self.max_tasks);
    }
}

/// 编排阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AgentPhase {
    Planning,
    Executing,
    Replanning,
    Enhancing,
    Done,
    Failed,
}

impl AgentPhase {
    /// 合法迁移：Planning → Executing → (Replanning ⇄ Executing)* → Enhancing → Done；
    /// 任一非终止阶段可进入 Failed；取消时可由 Planning / Replanning 直接进入 Enhancing
    pub fn can_transition(self, to: AgentPhase) -> bool {
        use AgentPhase::{Done, Enhancing, Executing, Failed, Planning, Replanning};
        if self.is_terminal() {
            return false;
        }
        match (self, to) {
            (_, Failed) => true,
            (Planning, Executing | Enhancing) => true,
            (Executing, Replanning | Enhancing) => true,
            (Replanning, Executing | Enhancing) => true,
            (Enhancing, Done) => true,
            _ => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, AgentPhase::Done | AgentPhase::Failed)
    }
}

/// 循环结束原因
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// 计划执行完毕且判定目标已满足
    PlanCompleted,
    /// 步数达到 max_tasks
    BudgetExhausted,
    /// 重规划失败，剩余预算按耗尽处理
    ReplanFailed { reason: String },
    /// 外部取消
    Cancelled,
}
