//! 离线 Provider（用于测试与无 Key 运行）
//!
//! - MockProvider：按 PromptPurpose 给出确定性回复，目标按 `->` 拆成任务，便于本地跑通整个编排流程
//! - FnProvider：以闭包作为 Provider，测试中精确控制每一次回复

use async_trait::async_trait;

use crate::llm::{PromptPurpose, PromptSpec, Provider, ProviderError};
use crate::react::prompts::{section, OBJECTIVE_HEADER, RESULTS_HEADER, TASK_HEADER};

pub const MOCK_NAME: &str = "mock";

/// Mock Provider：确定性回复，不访问网络
#[derive(Debug, Default)]
pub struct MockProvider;

impl MockProvider {
    fn breakdown(objective: &str) -> String {
        let tasks: Vec<String> = objective
            .split("->")
            .map(|s| s.trim().trim_end_matches(['.', '?']).to_string())
            .filter(|s| !s.is_empty())
            .collect();
        serde_json::json!({ "tasks": tasks }).to_string()
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        MOCK_NAME
    }

    async fn complete(&self, prompt: &PromptSpec, _model: &str) -> Result<String, ProviderError> {
        let objective = section(&prompt.user, OBJECTIVE_HEADER).unwrap_or("(no objective)");
        let task = section(&prompt.user, TASK_HEADER).unwrap_or("(no task)");
        let reply = match prompt.purpose {
            PromptPurpose::Breakdown => Self::breakdown(objective),
            PromptPurpose::Replan => {
                serde_json::json!({ "tasks": [format!("Review progress on: {objective}")] })
                    .to_string()
            }
            PromptPurpose::Decide => format!("Mock result for task: {task}"),
            PromptPurpose::Compose => format!("Mock summary of tool output for task: {task}"),
            PromptPurpose::Judge => r#"{"complete": true, "reason": "mock judge"}"#.to_string(),
            PromptPurpose::Enhance => {
                let results = section(&prompt.user, RESULTS_HEADER).unwrap_or("");
                format!("Conclusion for: {objective}\n\n{results}")
            }
        };
        Ok(reply)
    }
}

type ReplyFn = dyn Fn(&PromptSpec, &str) -> Result<String, ProviderError> + Send + Sync;

/// 闭包 Provider：每次调用把 (prompt, model) 交给闭包
pub struct FnProvider {
    name: String,
    reply: Box<ReplyFn>,
}

impl FnProvider {
    pub fn new<F>(name: impl Into<String>, reply: F) -> Self
    where
        F: Fn(&PromptSpec, &str) -> Result<String, ProviderError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            reply: Box::new(reply),
        }
    }
}

#[async_trait]
impl Provider for FnProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, prompt: &PromptSpec, model: &str) -> Result<String, ProviderError> {
        (self.reply)(prompt, model)
    }
}
