//! LLM 层：Provider 抽象、适配器与实现（Gemini / OpenAI / OpenRouter / Mock）

pub mod adapter;
pub mod gemini;
pub mod mock;
pub mod openai;
pub mod openrouter;
pub mod traits;

pub use adapter::{ModelRoute, ProviderAdapter};
pub use gemini::GeminiProvider;
pub use mock::{FnProvider, MockProvider, MOCK_NAME};
pub use openai::{OpenAiProvider, TokenUsage};
pub use openrouter::{create_openrouter_provider, OPENROUTER_NAME};
pub use traits::{PromptPurpose, PromptSpec, Provider, ProviderError, RetryConfig, RetryingProvider};
