//! ProviderAdapter：按名称解析 Provider 并统一调用
//!
//! 构建期注册（缺少 Key 的后端不注册），运行期只读；complete 按 provider 名与模型名分发并记录耗时。

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use crate::llm::{PromptSpec, Provider, ProviderError};

/// Provider 集合：名称 -> Arc<dyn Provider>
#[derive(Default, Clone)]
pub struct ProviderAdapter {
    providers: BTreeMap<String, Arc<dyn Provider>>,
}

impl ProviderAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册 Provider；同名时覆盖
    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        let name = provider.name().to_string();
        if self.providers.insert(name.clone(), provider).is_some() {
            tracing::warn!(provider = %name, "provider re-registered, previous instance replaced");
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).cloned()
    }

    pub async fn complete(
        &self,
        prompt: &PromptSpec,
        provider_name: &str,
        model: &str,
    ) -> Result<String, ProviderError> {
        let provider = self
            .providers
            .get(provider_name)
            .ok_or_else(|| ProviderError::UnknownProvider(provider_name.to_string()))?;

        let start = Instant::now();
        let result = provider.complete(prompt, model).await;
        tracing::debug!(
            provider = provider_name,
            model,
            purpose = %prompt.purpose,
            ok = result.is_ok(),
            duration_ms = start.elapsed().as_millis() as u64,
            "provider call"
        );
        result
    }

    /// 聚合所有 Provider 的 token 使用
    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.providers
            .values()
            .map(|p| p.token_usage())
            .fold((0, 0, 0), |acc, (a, b, c)| (acc.0 + a, acc.1 + b, acc.2 + c))
    }
}

/// 绑定了 provider 名与模型名的调用入口，供各组件共享
#[derive(Clone)]
pub struct ModelRoute {
    adapter: Arc<ProviderAdapter>,
    provider: String,
    model: String,
}

impl ModelRoute {
    pub fn new(
        adapter: Arc<ProviderAdapter>,
        provider: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            adapter,
            provider: provider.into(),
            model: model.into(),
        }
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn adapter(&self) -> &ProviderAdapter {
        &self.adapter
    }

    pub async fn complete(&self, prompt: &PromptSpec) -> Result<String, ProviderError> {
        self.adapter
            .complete(prompt, &self.provider, &self.model)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{FnProvider, MockProvider, PromptPurpose};

    #[tokio::test]
    async fn test_unknown_provider_is_error() {
        let adapter = ProviderAdapter::new();
        let prompt = PromptSpec::new(PromptPurpose::Decide, "", "x");
        let err = adapter.complete(&prompt, "nope", "m").await.unwrap_err();
        assert_eq!(err, ProviderError::UnknownProvider("nope".to_string()));
    }

    #[tokio::test]
    async fn test_dispatch_by_name() {
        let mut adapter = ProviderAdapter::new();
        adapter.register(Arc::new(MockProvider));
        adapter.register(Arc::new(FnProvider::new("stub", |_, _| Ok("stubbed".into()))));
        assert_eq!(adapter.names(), vec!["mock".to_string(), "stub".to_string()]);

        let prompt = PromptSpec::new(PromptPurpose::Decide, "", "x");
        assert_eq!(adapter.complete(&prompt, "stub", "m").await.unwrap(), "stubbed");
        assert!(adapter.contains("mock"));
    }

    #[tokio::test]
    async fn test_route_passes_model() {
        let mut adapter = ProviderAdapter::new();
        adapter.register(Arc::new(FnProvider::new("echo", |_, model| Ok(model.to_string()))));
        let route = ModelRoute::new(Arc::new(adapter), "echo", "gemini-2.0-flash");
        let prompt = PromptSpec::new(PromptPurpose::Judge, "", "x");
        assert_eq!(route.complete(&prompt).await.unwrap(), "gemini-2.0-flash");
        assert_eq!(route.provider(), "echo");
    }
}
