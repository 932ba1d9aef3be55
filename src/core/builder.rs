//! Agent 构建器：统一的 Agent 初始化逻辑
//!
//! 按 BuilderOptions 中存在的 Key 注册 Provider 与工具（缺 Key 即不注册），mock 始终可用；
//! init() 给出运行参数，build() 校验后产出只读的 Agent。

use std::sync::Arc;

use crate::config::{AppConfig, ProvidersSection, ToolsSection};
use crate::core::orchestrator::Agent;
use crate::core::AgentError;
use crate::llm::{
    create_openrouter_provider, GeminiProvider, MockProvider, ModelRoute, OpenAiProvider,
    Provider, ProviderAdapter, RetryingProvider,
};
use crate::react::{
    ActionExecutor, Enhancer, EventBus, EventKind, EventPayload, Listener, ReplanController,
    TaskPlanner,
};
use crate::tools::{BraveSearchTool, Tool, ToolExecutor, ToolRegistry, WebFetchTool};

const DEFAULT_TEMPERATURE: f32 = 0.7;

/// 凭据与能力开关
#[derive(Clone, Default)]
pub struct BuilderOptions {
    pub gemini_key: Option<String>,
    pub openai_key: Option<String>,
    pub brave_api_key: Option<String>,
    pub openrouter_key: Option<String>,
    pub use_enhanced_prompt: bool,
}

impl std::fmt::Debug for BuilderOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuilderOptions")
            .field("gemini_key", &present(&self.gemini_key).is_some())
            .field("openai_key", &present(&self.openai_key).is_some())
            .field("brave_api_key", &present(&self.brave_api_key).is_some())
            .field("openrouter_key", &present(&self.openrouter_key).is_some())
            .field("use_enhanced_prompt", &self.use_enhanced_prompt)
            .finish()
    }
}

/// 运行参数
#[derive(Debug, Clone)]
pub struct InitOptions {
    pub selected_provider: String,
    pub model: String,
    pub debug: bool,
    /// 单次 invoke 的步数预算
    pub max_tasks: usize,
}

impl Default for InitOptions {
    fn default() -> Self {
        Self {
            selected_provider: crate::llm::MOCK_NAME.to_string(),
            model: "mock".to_string(),
            debug: false,
            max_tasks: 10,
        }
    }
}

/// 构建后固定的 Agent 设置
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub name: String,
    pub selected_provider: String,
    pub model: String,
    pub debug: bool,
    pub max_tasks: usize,
    pub use_enhanced_prompt: bool,
}

/// 空白 Key 视为未提供
fn present(key: &Option<String>) -> Option<&str> {
    key.as_deref().map(str::trim).filter(|k| !k.is_empty())
}

/// Agent 构建器
pub struct AgentBuilder {
    name: String,
    options: BuilderOptions,
    init: InitOptions,
    providers_cfg: ProvidersSection,
    tools_cfg: ToolsSection,
    custom_providers: Vec<Arc<dyn Provider>>,
    custom_tools: Vec<Arc<dyn Tool>>,
    listeners: Vec<(EventKind, Arc<Listener>)>,
}

impl AgentBuilder {
    pub fn new(options: BuilderOptions) -> Self {
        Self {
            name: "react-agent".to_string(),
            options,
            init: InitOptions::default(),
            providers_cfg: ProvidersSection::default(),
            tools_cfg: ToolsSection::default(),
            custom_providers: Vec::new(),
            custom_tools: Vec::new(),
            listeners: Vec::new(),
        }
    }

    /// 从完整配置创建：凭据、运行参数、Provider 与工具设置一次带入
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self::new(cfg.builder_options())
            .with_name(cfg.agent.name.clone())
            .with_provider_settings(cfg.providers.clone())
            .with_tool_settings(cfg.tools.clone())
            .init(cfg.init_options())
    }

    /// 事件负载中的 agent 名
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_provider_settings(mut self, providers: ProvidersSection) -> Self {
        self.providers_cfg = providers;
        self
    }

    pub fn with_tool_settings(mut self, tools: ToolsSection) -> Self {
        self.tools_cfg = tools;
        self
    }

    /// 注册自定义 Provider（同名时覆盖内置后端）
    pub fn with_provider(mut self, provider: impl Provider + 'static) -> Self {
        self.custom_providers.push(Arc::new(provider));
        self
    }

    /// 注册自定义工具（同名时覆盖内置工具）
    pub fn with_tool(mut self, tool: impl Tool + 'static) -> Self {
        self.custom_tools.push(Arc::new(tool));
        self
    }

    /// 注册同步事件监听器
    pub fn on<F>(mut self, kind: EventKind, listener: F) -> Self
    where
        F: Fn(&EventPayload) + Send + Sync + 'static,
    {
        let listener: Arc<Listener> = Arc::new(listener);
        self.listeners.push((kind, listener));
        self
    }

    pub fn init(mut self, init: InitOptions) -> Self {
        self.init = init;
        self
    }

    /// 按 Key 注册内置后端；远程后端包一层重试
    fn build_adapter(&self) -> Result<ProviderAdapter, AgentError> {
        let cfg = &self.providers_cfg;
        let retry = cfg.retry_config();
        let mut adapter = ProviderAdapter::new();
        adapter.register(Arc::new(MockProvider));

        if let Some(key) = present(&self.options.gemini_key) {
            let gemini = GeminiProvider::new(
                key,
                cfg.gemini_endpoint.as_deref(),
                cfg.request_timeout_secs,
                cfg.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            )
            .map_err(|e| AgentError::Config(e.to_string()))?;
            adapter.register(Arc::new(RetryingProvider::new(gemini, retry.clone())));
        }
        if let Some(key) = present(&self.options.openai_key) {
            let openai = OpenAiProvider::new(key, cfg.openai_base_url.as_deref());
            adapter.register(Arc::new(RetryingProvider::new(openai, retry.clone())));
        }
        if let Some(key) = present(&self.options.openrouter_key) {
            let openrouter = create_openrouter_provider(key, cfg.openrouter_base_url.as_deref());
            adapter.register(Arc::new(RetryingProvider::new(openrouter, retry)));
        }
        for provider in &self.custom_providers {
            adapter.register(provider.clone());
        }
        Ok(adapter)
    }

    /// 构建工具注册表：有 Brave Key 时注册 web_search，域名白名单非空时注册 web_fetch
    pub fn build_tool_registry(&self) -> ToolRegistry {
        let cfg = &self.tools_cfg;
        let mut tools = ToolRegistry::new();
        if let Some(key) = present(&self.options.brave_api_key) {
            tools.register(BraveSearchTool::new(
                key,
                cfg.search.endpoint.as_deref(),
                cfg.search.result_count,
                cfg.tool_timeout_secs,
            ));
        }
        let fetch = WebFetchTool::new(
            cfg.fetch.allowed_domains.clone(),
            cfg.tool_timeout_secs,
            cfg.fetch.max_result_chars,
        );
        if fetch.has_allowed_domains() {
            tools.register(fetch);
        } else {
            tracing::warn!("tools.fetch.allowed_domains is empty, web_fetch disabled");
        }
        for tool in &self.custom_tools {
            tools.register_arc(tool.clone());
        }
        tools
    }

    pub fn build(self) -> Result<Agent, AgentError> {
        let init = &self.init;
        if init.max_tasks == 0 {
            return Err(AgentError::Config("max_tasks must be greater than 0".to_string()));
        }
        if init.model.trim().is_empty() {
            return Err(AgentError::Config("model must not be empty".to_string()));
        }
        let adapter = self.build_adapter()?;
        if !adapter.contains(&init.selected_provider) {
            return Err(AgentError::Config(format!(
                "provider '{}' is not registered (available: {})",
                init.selected_provider,
                adapter.names().join(", ")
            )));
        }

        let tools = self.build_tool_registry();
        tracing::info!(
            agent = %self.name,
            provider = %init.selected_provider,
            model = %init.model,
            max_tasks = init.max_tasks,
            providers = ?adapter.names(),
            tools = ?tools.tool_names(),
            "agent built"
        );

        let route = ModelRoute::new(
            Arc::new(adapter),
            init.selected_provider.clone(),
            init.model.trim().to_string(),
        );
        let mut events = EventBus::new(self.name.clone());
        for (kind, listener) in self.listeners {
            events.on(kind, listener);
        }
        let settings = AgentSettings {
            name: self.name,
            selected_provider: init.selected_provider.clone(),
            model: init.model.trim().to_string(),
            debug: init.debug,
            max_tasks: init.max_tasks,
            use_enhanced_prompt: self.options.use_enhanced_prompt,
        };

        Ok(Agent::from_parts(
            settings,
            TaskPlanner::new(route.clone()),
            ActionExecutor::new(
                route.clone(),
                ToolExecutor::new(tools, self.tools_cfg.tool_timeout_secs),
            ),
            ReplanController::new(route.clone()),
            Enhancer::new(route, self.options.use_enhanced_prompt),
            events,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::FnProvider;

    #[test]
    fn test_build_with_defaults_uses_mock() {
        let agent = AgentBuilder::new(BuilderOptions::default()).build().unwrap();
        assert_eq!(agent.settings().selected_provider, "mock");
        assert_eq!(agent.settings().max_tasks, 10);
        assert_eq!(agent.tool_names(), vec!["web_fetch".to_string()]);
    }

    #[test]
    fn test_build_validates_init_options() {
        let zero = AgentBuilder::new(BuilderOptions::default()).init(InitOptions {
            max_tasks: 0,
            ..Default::default()
        });
        assert!(matches!(zero.build(), Err(AgentError::Config(_))));

        let no_model = AgentBuilder::new(BuilderOptions::default()).init(InitOptions {
            model: "  ".into(),
            ..Default::default()
        });
        assert!(matches!(no_model.build(), Err(AgentError::Config(_))));
    }

    #[test]
    fn test_missing_key_disables_provider() {
        let builder = AgentBuilder::new(BuilderOptions {
            gemini_key: Some("   ".into()),
            ..Default::default()
        })
        .init(InitOptions {
            selected_provider: "gemini".into(),
            model: "gemini-2.0-flash".into(),
            ..Default::default()
        });
        match builder.build() {
            Err(AgentError::Config(msg)) => assert!(msg.contains("gemini")),
            other => panic!("expected config error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_keys_register_backends_and_tools() {
        let builder = AgentBuilder::new(BuilderOptions {
            gemini_key: Some("g".into()),
            openai_key: Some("o".into()),
            openrouter_key: Some("r".into()),
            brave_api_key: Some("b".into()),
            use_enhanced_prompt: true,
        });
        let adapter = builder.build_adapter().unwrap();
        assert_eq!(adapter.names(), vec!["gemini", "mock", "openai", "openrouter"]);
        assert_eq!(
            builder.build_tool_registry().tool_names(),
            vec!["web_fetch".to_string(), "web_search".to_string()]
        );
    }

    #[test]
    fn test_empty_fetch_allowlist_disables_web_fetch() {
        let mut tools = ToolsSection::default();
        tools.fetch.allowed_domains.clear();
        let builder = AgentBuilder::new(BuilderOptions::default()).with_tool_settings(tools);
        assert!(builder.build_tool_registry().is_empty());
    }

    #[test]
    fn test_custom_provider_selectable() {
        let agent = AgentBuilder::new(BuilderOptions::default())
            .with_provider(FnProvider::new("scripted", |_, _| Ok("x".into())))
            .init(InitOptions {
                selected_provider: "scripted".into(),
                model: "m".into(),
                debug: true,
                max_tasks: 3,
            })
            .build()
            .unwrap();
        assert_eq!(agent.settings().selected_provider, "scripted");
        assert!(agent.settings().debug);
    }

    #[test]
    fn test_from_config() {
        let mut cfg = AppConfig::default();
        cfg.agent.name = "denim-bot".into();
        cfg.agent.max_tasks = 3;
        let agent = AgentBuilder::from_config(&cfg).build().unwrap();
        assert_eq!(agent.settings().name, "denim-bot");
        assert_eq!(agent.settings().max_tasks, 3);
    }
}
