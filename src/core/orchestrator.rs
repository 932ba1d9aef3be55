//! Agent 编排器：主控循环
//!
//! 一次 invoke：Planning → Executing →（Replanning ⇄ Executing）* → Enhancing → Done，任一非终止阶段可进入 Failed。
//! 每次 invoke 拥有独立的 SharedState，以 `&mut` 借给 ActionSubgraph 与 ReplanController；Agent 自身只读，
//! 可在多个并发 invoke 间共享。

use std::future::Future;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::core::builder::AgentSettings;
use crate::core::{AgentError, AgentPhase, SharedState, StopReason};
use crate::react::{
    ActionExecutor, AgentEvent, Enhancer, EventBus, EventData, EventKind, ReplanController,
    StepOutcome, TaskPlanner,
};

/// 一次调用的输入
#[derive(Debug, Clone, Serialize)]
pub struct Invocation {
    pub objective: String,
    /// 结论格式要求（可为空）
    pub output_instruction: String,
}

impl Invocation {
    pub fn new(objective: impl Into<String>) -> Self {
        Self {
            objective: objective.into(),
            output_instruction: String::new(),
        }
    }

    pub fn with_output_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.output_instruction = instruction.into();
        self
    }
}

/// 一次调用的结果
#[derive(Debug, Clone, Serialize)]
pub struct AgentOutcome {
    pub run_id: String,
    pub conclusion: String,
    pub full_state: SharedState,
    pub stop_reason: StopReason,
}

/// 阶段跟踪：只允许合法迁移
struct PhaseTracker<'a> {
    run_id: &'a str,
    phase: AgentPhase,
}

impl<'a> PhaseTracker<'a> {
    fn new(run_id: &'a str) -> Self {
        Self {
            run_id,
            phase: AgentPhase::Planning,
        }
    }

    fn advance(&mut self, to: AgentPhase) -> Result<(), AgentError> {
        if !self.phase.can_transition(to) {
            return Err(AgentError::InvalidTransition {
                from: self.phase,
                to,
            });
        }
        tracing::debug!(run_id = self.run_id, from = ?self.phase, to = ?to, "phase");
        self.phase = to;
        Ok(())
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

/// 已构建的 Agent
pub struct Agent {
    settings: AgentSettings,
    planner: TaskPlanner,
    executor: ActionExecutor,
    replanner: ReplanController,
    enhancer: Enhancer,
    events: EventBus,
}

impl Agent {
    pub(crate) fn from_parts(
        settings: AgentSettings,
        planner: TaskPlanner,
        executor: ActionExecutor,
        replanner: ReplanController,
        enhancer: Enhancer,
        events: EventBus,
    ) -> Self {
        Self {
            settings,
            planner,
            executor,
            replanner,
            enhancer,
            events,
        }
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    pub fn planner(&self) -> &TaskPlanner {
        &self.planner
    }

    /// 供调用方直接驱动 ActionSubgraph（与 invoke 使用同一套 Provider 与工具）
    pub fn action_executor(&self) -> &ActionExecutor {
        &self.executor
    }

    pub fn replanner(&self) -> &ReplanController {
        &self.replanner
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.executor.tools().tool_names()
    }

    /// 订阅事件流
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<AgentEvent> {
        self.events.subscribe()
    }

    /// 所有 Provider 的累计 token 使用
    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.planner.route().adapter().token_usage()
    }

    pub async fn invoke(&self, invocation: Invocation) -> Result<AgentOutcome, AgentError> {
        self.invoke_with_cancel(invocation, CancellationToken::new())
            .await
    }

    /// 外部取消：在每个挂起点检查，直接进入 Enhancing 并以本地摘要收尾
    pub async fn invoke_with_cancel(
        &self,
        invocation: Invocation,
        cancel: CancellationToken,
    ) -> Result<AgentOutcome, AgentError> {
        if invocation.objective.trim().is_empty() {
            return Err(AgentError::InvalidObjective(
                "objective must not be empty".to_string(),
            ));
        }
        let run_id = uuid::Uuid::new_v4().to_string();
        let span = tracing::info_span!("invoke", run_id = %run_id, agent = %self.settings.name);
        self.run(run_id.clone(), invocation, cancel)
            .instrument(span)
            .await
    }

    async fn run(
        &self,
        run_id: String,
        invocation: Invocation,
        cancel: CancellationToken,
    ) -> Result<AgentOutcome, AgentError> {
        let objective = invocation.objective.trim();
        let instruction = invocation.output_instruction.trim();
        let mut phase = PhaseTracker::new(&run_id);
        let mut state = SharedState::new(self.settings.max_tasks);
        tracing::info!(max_tasks = self.settings.max_tasks, objective, "invoke started");

        let result = self
            .plan_and_execute(&run_id, objective, instruction, &mut state, &mut phase, &cancel)
            .await;
        let stop_reason = match result {
            Ok(reason) => reason,
            Err(e) => {
                tracing::error!(error = %e, step = state.step(), "invoke failed");
                phase.advance(AgentPhase::Failed)?;
                return Err(e);
            }
        };

        phase.advance(AgentPhase::Enhancing)?;
        let conclusion = self
            .enhancer
            .enhance(objective, instruction, state.action_results(), &cancel)
            .await;
        self.events.emit(
            &run_id,
            EventKind::FinalEnhancement,
            EventData::Conclusion(conclusion.clone()),
        );
        phase.advance(AgentPhase::Done)?;

        tracing::info!(
            steps = state.step(),
            results = state.action_results().len(),
            plan_version = state.plan().version,
            stop_reason = ?stop_reason,
            "invoke finished"
        );
        Ok(AgentOutcome {
            run_id,
            conclusion,
            full_state: state,
            stop_reason,
        })
    }

    /// Planning 与执行循环；返回循环结束原因，此时阶段为 Planning / Executing / Replanning 之一
    async fn plan_and_execute(
        &self,
        run_id: &str,
        objective: &str,
        instruction: &str,
        state: &mut SharedState,
        phase: &mut PhaseTracker<'_>,
        cancel: &CancellationToken,
    ) -> Result<StopReason, AgentError> {
        let budget = state.max_tasks();
        let Some(planned) =
            until_cancelled(cancel, self.planner.breakdown(objective, instruction, budget)).await
        else {
            return Ok(StopReason::Cancelled);
        };
        let plan = planned?;
        state.install_plan(plan.clone())?;
        self.events
            .emit(run_id, EventKind::TaskBreakdown, EventData::Plan(plan));
        phase.advance(AgentPhase::Executing)?;

        let subgraph = self.executor.subgraph(objective);
        loop {
            if cancel.is_cancelled() {
                return Ok(StopReason::Cancelled);
            }
            if state.budget_exhausted() {
                return Ok(StopReason::BudgetExhausted);
            }
            if let Some(index) = state.next_pending() {
                match subgraph.execute(index, state, cancel).await {
                    StepOutcome::Completed(_) => {}
                    StepOutcome::Cancelled => return Ok(StopReason::Cancelled),
                    StepOutcome::Refused(reason) => return Err(AgentError::InvalidState(reason)),
                }
                if self.settings.debug {
                    tracing::info!(
                        step = state.step(),
                        state = %serde_json::to_string(&*state).unwrap_or_default(),
                        "state after step"
                    );
                }
            }

            // 最近一步失败时无论判定如何都会重规划，不必调用判定
            let last_failed = state.last_result().is_some_and(|r| !r.success);
            if state.plan().is_exhausted() && !last_failed {
                let judged = until_cancelled(
                    cancel,
                    self.replanner.assess_completion(objective, instruction, state),
                )
                .await;
                if judged.is_none() {
                    return Ok(StopReason::Cancelled);
                }
            }

            match self.replanner.should_replan(state) {
                Some(reason) => {
                    phase.advance(AgentPhase::Replanning)?;
                    tracing::info!(reason = ?reason, step = state.step(), "replanning");
                    let replanned = until_cancelled(
                        cancel,
                        self.replanner.replan(objective, instruction, state, reason),
                    )
                    .await;
                    match replanned {
                        None => return Ok(StopReason::Cancelled),
                        Some(Ok(plan)) => {
                            self.events
                                .emit(run_id, EventKind::TaskReplan, EventData::Plan(plan));
                            phase.advance(AgentPhase::Executing)?;
                        }
                        Some(Err(e)) => {
                            // 重规划失败：剩余预算按耗尽处理，带着已有结果进入 Enhancing
                            tracing::warn!(error = %e, "replan failed, treating budget as exhausted");
                            return Ok(StopReason::ReplanFailed {
                                reason: e.to_string(),
                            });
                        }
                    }
                }
                None if state.plan().is_exhausted()
                    && state.current_verdict().is_some_and(|v| v.complete) =>
                {
                    return Ok(StopReason::PlanCompleted);
                }
                None if state.budget_exhausted() => return Ok(StopReason::BudgetExhausted),
                None if state.plan().is_exhausted() => return Ok(StopReason::PlanCompleted),
                None => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{AgentBuilder, BuilderOptions, InitOptions};

    fn mock_agent(max_tasks: usize) -> Agent {
        AgentBuilder::new(BuilderOptions::default())
            .init(InitOptions {
                max_tasks,
                ..Default::default()
            })
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_empty_objective_rejected() {
        let agent = mock_agent(3);
        let err = agent.invoke(Invocation::new("   ")).await.unwrap_err();
        assert!(matches!(err, AgentError::InvalidObjective(_)));
    }

    #[tokio::test]
    async fn test_mock_run_completes_plan() {
        let agent = mock_agent(10);
        let outcome = agent
            .invoke(Invocation::new("Find persona -> Write hooks -> Pick best"))
            .await
            .unwrap();
        assert_eq!(outcome.stop_reason, StopReason::PlanCompleted);
        assert_eq!(outcome.full_state.step(), 3);
        assert_eq!(outcome.full_state.plan().version, 1);
        assert!(outcome.conclusion.contains("Write hooks"));
        assert!(outcome.full_state.action_results().iter().all(|r| r.success));
    }

    #[tokio::test]
    async fn test_budget_caps_execution() {
        let agent = mock_agent(2);
        let outcome = agent.invoke(Invocation::new("a -> b -> c -> d")).await.unwrap();
        assert_eq!(outcome.full_state.step(), 2);
        assert_eq!(outcome.full_state.action_results().len(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let agent = mock_agent(5);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = agent
            .invoke_with_cancel(Invocation::new("a -> b"), cancel)
            .await
            .unwrap();
        assert_eq!(outcome.stop_reason, StopReason::Cancelled);
        assert_eq!(outcome.full_state.step(), 0);
        assert!(outcome.conclusion.starts_with("No task completed successfully"));
    }

    #[test]
    fn test_phase_tracker_rejects_illegal_jump() {
        let mut phase = PhaseTracker::new("r");
        assert!(phase.advance(AgentPhase::Done).is_err());
        phase.advance(AgentPhase::Executing).unwrap();
        phase.advance(AgentPhase::Enhancing).unwrap();
        phase.advance(AgentPhase::Done).unwrap();
        assert!(phase.advance(AgentPhase::Failed).is_err());
    }
}
