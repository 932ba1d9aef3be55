//! Provider 抽象
//!
//! 所有后端（Gemini / OpenAI / OpenRouter / Mock）实现 Provider：complete 按 PromptSpec 与模型名返回文本。
//! RetryingProvider 对限流与网络错误做指数退避重试。

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

/// Prompt 的用途：决定日志字段，也便于测试桩按用途返回不同内容
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptPurpose {
    /// 目标拆解为任务列表
    Breakdown,
    /// 重规划
    Replan,
    /// 单个任务：直接回答或选择工具
    Decide,
    /// 工具输出整理为任务结果
    Compose,
    /// 判断目标是否已完成
    Judge,
    /// 最终结论合成
    Enhance,
}

impl std::fmt::Display for PromptPurpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PromptPurpose::Breakdown => "breakdown",
            PromptPurpose::Replan => "replan",
            PromptPurpose::Decide => "decide",
            PromptPurpose::Compose => "compose",
            PromptPurpose::Judge => "judge",
            PromptPurpose::Enhance => "enhance",
        };
        f.write_str(s)
    }
}

/// 一次补全请求：system + user 两段文本（Prompt 内容对 Provider 不透明）
#[derive(Debug, Clone)]
pub struct PromptSpec {
    pub purpose: PromptPurpose,
    pub system: String,
    pub user: String,
    pub temperature: Option<f32>,
    /// 要求后端以 JSON 输出（支持时）
    pub json_mode: bool,
}

impl PromptSpec {
    pub fn new(purpose: PromptPurpose, system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            purpose,
            system: system.into(),
            user: user.into(),
            temperature: None,
            json_mode: false,
        }
    }

    pub fn with_json(mut self) -> Self {
        self.json_mode = true;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Provider 调用失败
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("missing credentials for provider {0}")]
    MissingCredentials(String),

    #[error("rate limited by provider {provider}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("HTTP {code}: {body}")]
    Status { code: u16, body: String },

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("unknown provider: {0}")]
    UnknownProvider(String),
}

impl ProviderError {
    /// 按 HTTP 状态码归类：401/403 为凭证问题，429 为限流，其余保留状态码与响应体
    pub fn from_status(provider: &str, code: u16, body: String) -> Self {
        match code {
            401 | 403 => ProviderError::MissingCredentials(format!("{provider} (HTTP {code})")),
            429 => ProviderError::RateLimited {
                provider: provider.to_string(),
                retry_after: None,
            },
            _ => ProviderError::Status { code, body },
        }
    }

    /// 为限流错误附上服务端建议的等待时间；其他错误原样返回
    pub fn with_retry_after(self, delay: Option<Duration>) -> Self {
        match self {
            ProviderError::RateLimited { provider, retry_after } => ProviderError::RateLimited {
                provider,
                retry_after: delay.or(retry_after),
            },
            other => other,
        }
    }

    /// 是否值得重试（限流、网络、5xx）
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::RateLimited { .. } | ProviderError::Http(_) => true,
            ProviderError::Status { code, .. } => *code >= 500,
            _ => false,
        }
    }
}

/// 文本补全后端
#[async_trait]
pub trait Provider: Send + Sync {
    /// 注册名（如 gemini、openai）
    fn name(&self) -> &str;

    async fn complete(&self, prompt: &PromptSpec, model: &str) -> Result<String, ProviderError>;

    /// 累计 token 使用：(prompt_tokens, completion_tokens, total_tokens)，默认不统计
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}

/// 重试配置
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(20),
        }
    }
}

impl RetryConfig {
    /// 第 attempt 次重试前的等待：base * 2^attempt，上限 max_delay；限流时优先使用服务端建议
    pub fn delay_for(&self, attempt: u32, err: &ProviderError) -> Duration {
        if let ProviderError::RateLimited {
            retry_after: Some(d),
            ..
        } = err
        {
            return (*d).min(self.max_delay);
        }
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// 带重试的 Provider 包装
pub struct RetryingProvider<P> {
    inner: P,
    config: RetryConfig,
}

impl<P: Provider> RetryingProvider<P> {
    pub fn new(inner: P, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl<P: Provider> Provider for RetryingProvider<P> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn complete(&self, prompt: &PromptSpec, model: &str) -> Result<String, ProviderError> {
        let mut attempt = 0;
        loop {
            match self.inner.complete(prompt, model).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_transient() && attempt < self.config.max_retries => {
                    let delay = self.config.delay_for(attempt, &e);
                    tracing::warn!(
                        provider = self.inner.name(),
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "provider call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn token_usage(&self) -> (u64, u64, u64) {
        self.inner.token_usage()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    struct Flaky {
        calls: AtomicU32,
        fail_times: u32,
        error: ProviderError,
    }

    #[async_trait]
    impl Provider for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn complete(&self, _prompt: &PromptSpec, _model: &str) -> Result<String, ProviderError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_times {
                Err(self.error.clone())
            } else {
                Ok("ok".to_string())
            }
        }
    }

    fn fast_retry(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        }
    }

    fn prompt() -> PromptSpec {
        PromptSpec::new(PromptPurpose::Decide, "sys", "user")
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_error() {
        let provider = RetryingProvider::new(
            Flaky {
                calls: AtomicU32::new(0),
                fail_times: 2,
                error: ProviderError::Http("reset".into()),
            },
            fast_retry(2),
        );
        assert_eq!(provider.complete(&prompt(), "m").await.unwrap(), "ok");
        assert_eq!(provider.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_max() {
        let provider = RetryingProvider::new(
            Flaky {
                calls: AtomicU32::new(0),
                fail_times: 10,
                error: ProviderError::RateLimited {
                    provider: "flaky".into(),
                    retry_after: None,
                },
            },
            fast_retry(1),
        );
        let err = provider.complete(&prompt(), "m").await.unwrap_err();
        assert!(matches!(err, ProviderError::RateLimited { .. }));
        assert_eq!(provider.inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_no_retry_for_credentials() {
        let provider = RetryingProvider::new(
            Flaky {
                calls: AtomicU32::new(0),
                fail_times: 10,
                error: ProviderError::MissingCredentials("flaky".into()),
            },
            fast_retry(3),
        );
        assert!(provider.complete(&prompt(), "m").await.is_err());
        assert_eq!(provider.inner.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            ProviderError::from_status("gemini", 429, String::new()),
            ProviderError::RateLimited { .. }
        ));
        assert!(matches!(
            ProviderError::from_status("gemini", 401, String::new()),
            ProviderError::MissingCredentials(_)
        ));
        let server = ProviderError::from_status("gemini", 503, "busy".into());
        assert!(server.is_transient());
        assert!(!ProviderError::from_status("gemini", 400, "bad".into()).is_transient());
    }

    #[test]
    fn test_with_retry_after_only_touches_rate_limit() {
        let limited = ProviderError::from_status("gemini", 429, String::new())
            .with_retry_after(Some(Duration::from_secs(7)));
        assert_eq!(
            limited,
            ProviderError::RateLimited {
                provider: "gemini".into(),
                retry_after: Some(Duration::from_secs(7)),
            }
        );
        let status = ProviderError::from_status("gemini", 500, "boom".into())
            .with_retry_after(Some(Duration::from_secs(7)));
        assert!(matches!(status, ProviderError::Status { code: 500, .. }));
    }

    #[test]
    fn test_delay_prefers_retry_after() {
        let cfg = RetryConfig::default();
        let err = ProviderError::RateLimited {
            provider: "x".into(),
            retry_after: Some(Duration::from_secs(3)),
        };
        assert_eq!(cfg.delay_for(0, &err), Duration::from_secs(3));
        let http = ProviderError::Http("x".into());
        assert_eq!(cfg.delay_for(2, &http), Duration::from_millis(2000));
    }
}
