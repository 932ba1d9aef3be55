//! 工具层：Tool trait、注册表、执行器与内置工具（web_search / web_fetch）

pub mod brave;
pub mod executor;
pub mod fetch;
pub mod registry;
pub mod schema;

pub use brave::BraveSearchTool;
pub use executor::ToolExecutor;
pub use fetch::WebFetchTool;
pub use registry::{Tool, ToolError, ToolRegistry};
pub use schema::{tool_call_schema_json, ToolCall};
