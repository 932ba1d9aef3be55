//! OpenAI 兼容 Provider
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）；OpenRouter 复用同一实现。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::chat::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequest,
    CreateChatCompletionRequestArgs, ResponseFormat,
};
use async_openai::Client;
use async_trait::async_trait;

use crate::llm::{PromptSpec, Provider, ProviderError};

/// Token 使用统计（累计值）
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: Arc<AtomicU64>,
    pub completion_tokens: Arc<AtomicU64>,
    pub total_tokens: Arc<AtomicU64>,
}

impl TokenUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
        self.total_tokens.fetch_add(prompt + completion, Ordering::Relaxed);
    }

    pub fn get(&self) -> (u64, u64, u64) {
        (
            self.prompt_tokens.load(Ordering::Relaxed),
            self.completion_tokens.load(Ordering::Relaxed),
            self.total_tokens.load(Ordering::Relaxed),
        )
    }
}

/// OpenAI 兼容 Provider：持有 Client 与注册名，complete 时把 PromptSpec 转为 system/user 两条消息
pub struct OpenAiProvider {
    name: String,
    client: Client<OpenAIConfig>,
    pub usage: TokenUsage,
}

impl OpenAiProvider {
    pub fn new(api_key: &str, base_url: Option<&str>) -> Self {
        Self::named("openai", api_key, base_url)
    }

    /// 以自定义注册名创建（OpenRouter 等兼容端点）
    pub fn named(name: &str, api_key: &str, base_url: Option<&str>) -> Self {
        let mut config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(url) = base_url {
            config = config.with_api_base(url);
        }
        Self {
            name: name.to_string(),
            client: Client::with_config(config),
            usage: TokenUsage::new(),
        }
    }

    fn to_openai_messages(
        &self,
        prompt: &PromptSpec,
    ) -> Result<Vec<ChatCompletionRequestMessage>, ProviderError> {
        let mut messages = Vec::with_capacity(2);
        if !prompt.system.is_empty() {
            messages.push(ChatCompletionRequestMessage::System(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(prompt.system.clone())
                    .build()
                    .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?,
            ));
        }
        messages.push(ChatCompletionRequestMessage::User(
            ChatCompletionRequestUserMessageArgs::default()
                .content(prompt.user.clone())
                .build()
                .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?,
        ));
        Ok(messages)
    }

    /// json_mode 时要求 JSON 对象输出
    fn build_request(
        &self,
        prompt: &PromptSpec,
        model: &str,
    ) -> Result<CreateChatCompletionRequest, ProviderError> {
        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(model).messages(self.to_openai_messages(prompt)?);
        if let Some(t) = prompt.temperature {
            args.temperature(t);
        }
        if prompt.json_mode {
            args.response_format(ResponseFormat::JsonObject);
        }
        args.build()
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))
    }

    fn map_error(&self, err: OpenAIError) -> ProviderError {
        let text = err.to_string();
        let lower = text.to_lowercase();
        if lower.contains("rate limit") || lower.contains("429") {
            ProviderError::RateLimited {
                provider: self.name.clone(),
                retry_after: None,
            }
        } else if lower.contains("api key") || lower.contains("401") {
            ProviderError::MissingCredentials(self.name.clone())
        } else if lower.contains("deserialize") {
            ProviderError::MalformedResponse(text)
        } else {
            ProviderError::Http(text)
        }
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }

    async fn complete(&self, prompt: &PromptSpec, model: &str) -> Result<String, ProviderError> {
        let request = self.build_request(prompt, model)?;
        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| self.map_error(e))?;

        if let Some(usage) = &response.usage {
            self.usage
                .add(usage.prompt_tokens as u64, usage.completion_tokens as u64);
        }

        response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| ProviderError::MalformedResponse("empty completion".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_usage_accumulates() {
        let usage = TokenUsage::new();
        usage.add(10, 5);
        usage.add(1, 2);
        assert_eq!(usage.get(), (11, 7, 18));
    }

    #[test]
    fn test_messages_skip_empty_system() {
        let provider = OpenAiProvider::new("sk-test", None);
        let prompt = PromptSpec::new(crate::llm::PromptPurpose::Decide, "", "hello");
        let messages = provider.to_openai_messages(&prompt).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(provider.name(), "openai");
    }

    #[test]
    fn test_json_mode_sets_response_format() {
        let provider = OpenAiProvider::new("sk-test", None);
        let mut prompt = PromptSpec::new(crate::llm::PromptPurpose::Breakdown, "sys", "plan");
        let plain = provider.build_request(&prompt, "gpt-4o-mini").unwrap();
        assert!(plain.response_format.is_none());

        prompt.json_mode = true;
        let json = provider.build_request(&prompt, "gpt-4o-mini").unwrap();
        assert_eq!(json.response_format, Some(ResponseFormat::JsonObject));
    }
}
