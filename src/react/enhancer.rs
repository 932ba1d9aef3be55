//! Enhancer：把全部 ActionResult 合成为最终结论
//!
//! Provider 调用失败、返回空文本或已取消时，退回本地拼装的摘要，保证部分进度不丢失。

use tokio_util::sync::CancellationToken;

use crate::core::ActionResult;
use crate::llm::ModelRoute;
use crate::react::prompts;

/// 本地摘要：逐条列出成功结果；没有成功结果时给出说明
pub fn fallback_digest(objective: &str, results: &[ActionResult]) -> String {
    let succeeded: Vec<&ActionResult> = results.iter().filter(|r| r.success).collect();
    let failed = results.len() - succeeded.len();
    if succeeded.is_empty() {
        return format!(
            "No task completed successfully for the objective \"{}\" ({} attempted).",
            objective.trim(),
            results.len()
        );
    }
    let mut out = format!("# {}\n", objective.trim());
    for r in succeeded {
        out.push_str(&format!("\n## {}\n{}\n", r.task, r.content.trim()));
    }
    if failed > 0 {
        out.push_str(&format!("\n({failed} task(s) failed and are not included.)\n"));
    }
    out
}

#[derive(Clone)]
pub struct Enhancer {
    route: ModelRoute,
    use_enhanced_prompt: bool,
}

impl Enhancer {
    pub fn new(route: ModelRoute, use_enhanced_prompt: bool) -> Self {
        Self {
            route,
            use_enhanced_prompt,
        }
    }

    pub async fn enhance(
        &self,
        objective: &str,
        output_instruction: &str,
        results: &[ActionResult],
        cancel: &CancellationToken,
    ) -> String {
        if cancel.is_cancelled() {
            return fallback_digest(objective, results);
        }
        let prompt =
            prompts::enhance_prompt(objective, output_instruction, results, self.use_enhanced_prompt);
        let reply = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            r = self.route.complete(&prompt) => Some(r),
        };
        match reply {
            Some(Ok(text)) if !text.trim().is_empty() => text.trim().to_string(),
            Some(Ok(_)) => {
                tracing::warn!("enhancer returned empty text, using local digest");
                fallback_digest(objective, results)
            }
            Some(Err(e)) => {
                tracing::warn!(error = %e, "enhancer failed, using local digest");
                fallback_digest(objective, results)
            }
            None => fallback_digest(objective, results),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::core::{ResultSource, Task, TaskStatus};
    use crate::llm::{FnProvider, ProviderAdapter, ProviderError};

    fn result(index: usize, task: &str, content: &str, success: bool) -> ActionResult {
        let task = Task {
            index,
            description: task.into(),
            status: TaskStatus::InProgress,
        };
        if success {
            ActionResult::succeeded(&task, content, ResultSource::Executor)
        } else {
            ActionResult::failed(&task, content, ResultSource::Executor)
        }
    }

    fn enhancer<F>(reply: F) -> Enhancer
    where
        F: Fn(&crate::llm::PromptSpec, &str) -> Result<String, ProviderError> + Send + Sync + 'static,
    {
        let mut adapter = ProviderAdapter::new();
        adapter.register(Arc::new(FnProvider::new("stub", reply)));
        Enhancer::new(ModelRoute::new(Arc::new(adapter), "stub", "m"), true)
    }

    #[test]
    fn test_fallback_digest() {
        let results = vec![
            result(1, "persona", "Ages 25-40", true),
            result(2, "hooks", "timeout", false),
        ];
        let digest = fallback_digest("Jeans ads", &results);
        assert!(digest.contains("## persona\nAges 25-40"));
        assert!(!digest.contains("timeout"));
        assert!(digest.contains("1 task(s) failed"));

        let none = fallback_digest("Jeans ads", &results[1..]);
        assert!(none.starts_with("No task completed successfully"));
    }

    #[tokio::test]
    async fn test_enhance_uses_provider_with_extended_prompt() {
        let e = enhancer(|p, _| {
            assert!(p.system.contains("senior editor"));
            Ok("  final answer  ".into())
        });
        let out = e
            .enhance("goal", "", &[result(1, "a", "x", true)], &CancellationToken::new())
            .await;
        assert_eq!(out, "final answer");
    }

    #[tokio::test]
    async fn test_enhance_falls_back_on_error_or_cancel() {
        let e = enhancer(|_, _| Err(ProviderError::Http("down".into())));
        let results = [result(1, "a", "partial", true)];
        let out = e.enhance("goal", "", &results, &CancellationToken::new()).await;
        assert!(out.contains("partial"));

        let e = enhancer(|_, _| panic!("provider must not be called after cancel"));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let out = e.enhance("goal", "", &results, &cancel).await;
        assert!(out.contains("partial"));
    }
}
