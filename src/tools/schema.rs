//! 工具调用 JSON Schema 生成（schemars）
//!
//! 将合法 tool call 的结构注入 decide prompt，减少 LLM 输出格式错误。

use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};

/// 任务执行时 LLM 选择工具的输出格式：`{"tool": "web_search", "args": {...}}`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ToolCall {
    /// 已注册的工具名，如 web_search、web_fetch
    pub tool: String,
    /// 工具参数，结构由该工具的 parameters schema 决定
    #[serde(default)]
    pub args: serde_json::Value,
}

/// 返回 ToolCall 的 JSON Schema 字符串
pub fn tool_call_schema_json() -> String {
    let schema = schema_for!(ToolCall);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}
