//! OpenRouter Provider（OpenAI 兼容格式）
//!
//! OpenRouter 聚合多家模型，接口与 OpenAI 完全兼容。
//! - Base URL: https://openrouter.ai/api/v1
//! - 模型名带厂商前缀，如 `openai/gpt-4o-mini`、`google/gemini-2.5-flash`

use crate::llm::OpenAiProvider;

pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const OPENROUTER_NAME: &str = "openrouter";

/// 创建 OpenRouter Provider；base_url 为空时使用官方地址
pub fn create_openrouter_provider(api_key: &str, base_url: Option<&str>) -> OpenAiProvider {
    OpenAiProvider::named(
        OPENROUTER_NAME,
        api_key,
        Some(base_url.unwrap_or(OPENROUTER_BASE_URL)),
    )
}
