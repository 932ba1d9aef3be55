//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `REACT_AGENT__*` 覆盖（双下划线表示嵌套，如
//! `REACT_AGENT__AGENT__SELECTED_PROVIDER=openai`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::core::{BuilderOptions, InitOptions};
use crate::llm::RetryConfig;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub agent: AgentSection,
    pub credentials: CredentialsSection,
    pub providers: ProvidersSection,
    pub tools: ToolsSection,
}

/// [agent] 段：默认 Provider、模型、预算
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    /// 事件负载中的 agent 名称
    pub name: String,
    pub selected_provider: String,
    pub model: String,
    pub debug: bool,
    /// 单次 invoke 最多执行的任务数
    pub max_tasks: usize,
    /// Enhancer 使用扩展版合成 prompt
    pub use_enhanced_prompt: bool,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            name: "react-agent".to_string(),
            selected_provider: "mock".to_string(),
            model: "mock".to_string(),
            debug: false,
            max_tasks: 10,
            use_enhanced_prompt: false,
        }
    }
}

/// [credentials] 段：缺失的 Key 对应后端 / 工具不注册
#[derive(Clone, Deserialize, Default)]
#[serde(default)]
pub struct CredentialsSection {
    pub gemini_key: Option<String>,
    pub openai_key: Option<String>,
    pub brave_api_key: Option<String>,
    pub openrouter_key: Option<String>,
}

fn mask(key: &Option<String>) -> &'static str {
    if key.as_deref().is_some_and(|k| !k.is_empty()) {
        "<set>"
    } else {
        "<unset>"
    }
}

impl std::fmt::Debug for CredentialsSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialsSection")
            .field("gemini_key", &mask(&self.gemini_key))
            .field("openai_key", &mask(&self.openai_key))
            .field("brave_api_key", &mask(&self.brave_api_key))
            .field("openrouter_key", &mask(&self.openrouter_key))
            .finish()
    }
}

/// [providers] 段：超时、重试、端点覆盖
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProvidersSection {
    pub request_timeout_secs: u64,
    /// 限流 / 网络错误的最大重试次数（0 表示不重试）
    pub max_retries: u32,
    pub gemini_endpoint: Option<String>,
    pub openai_base_url: Option<String>,
    pub openrouter_base_url: Option<String>,
    pub temperature: Option<f32>,
}

impl Default for ProvidersSection {
    fn default() -> Self {
        Self {
            request_timeout_secs: 60,
            max_retries: 2,
            gemini_endpoint: None,
            openai_base_url: None,
            openrouter_base_url: None,
            temperature: None,
        }
    }
}

impl ProvidersSection {
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            ..RetryConfig::default()
        }
    }
}

/// [tools] 段：工具超时、搜索与抓取参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    pub tool_timeout_secs: u64,
    pub search: SearchSection,
    pub fetch: FetchSection,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 30,
            search: SearchSection::default(),
            fetch: FetchSection::default(),
        }
    }
}

/// [tools.search] 段：Brave Search
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchSection {
    pub endpoint: Option<String>,
    pub result_count: u32,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            endpoint: None,
            result_count: 5,
        }
    }
}

/// [tools.fetch] 段：抓取 URL 的域名白名单（含子域名；为空时不注册 web_fetch）与最大字符数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchSection {
    pub allowed_domains: Vec<String>,
    pub max_result_chars: usize,
}

fn default_allowed_domains() -> Vec<String> {
    [
        // 百科与资料
        "wikipedia.org",
        "wikimedia.org",
        "britannica.com",
        // 新闻与行业
        "reuters.com",
        "bbc.com",
        "kompas.com",
        "detik.com",
        // 社媒趋势与电商
        "medium.com",
        "tokopedia.com",
        "shopee.co.id",
        // 开发者资源
        "github.com",
        "stackoverflow.com",
        "docs.rs",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Default for FetchSection {
    fn default() -> Self {
        Self {
            allowed_domains: default_allowed_domains(),
            max_result_chars: 8000,
        }
    }
}

impl AppConfig {
    pub fn builder_options(&self) -> BuilderOptions {
        let c = &self.credentials;
        BuilderOptions {
            gemini_key: c.gemini_key.clone(),
            openai_key: c.openai_key.clone(),
            brave_api_key: c.brave_api_key.clone(),
            openrouter_key: c.openrouter_key.clone(),
            use_enhanced_prompt: self.agent.use_enhanced_prompt,
        }
    }

    pub fn init_options(&self) -> InitOptions {
        InitOptions {
            selected_provider: self.agent.selected_provider.clone(),
            model: self.agent.model.clone(),
            debug: self.agent.debug,
            max_tasks: self.agent.max_tasks,
        }
    }
}

/// 从 config 目录加载配置，环境变量 REACT_AGENT__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 REACT_AGENT__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    for name in ["config/default", "../config/default"] {
        if std::path::Path::new(&format!("{name}.toml")).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("REACT_AGENT")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("tools.fetch.allowed_domains"),
    );

    builder.build()?.try_deserialize()
}
