//! web_search 工具：Brave Search API
//!
//! GET {endpoint}?q=...&count=N，Key 放在 X-Subscription-Token；
//! 结果整理为编号列表（标题 / URL / 摘要），摘要中的 <strong> 等标签会被去除。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::Value;

use crate::tools::fetch::strip_html_tags;
use crate::tools::Tool;

pub const BRAVE_ENDPOINT: &str = "https://api.search.brave.com/res/v1/web/search";

/// Brave 搜索工具
pub struct BraveSearchTool {
    client: Client,
    api_key: String,
    endpoint: String,
    default_count: u32,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    web: Option<WebResults>,
}

#[derive(Debug, Deserialize)]
struct WebResults {
    #[serde(default)]
    results: Vec<WebResult>,
}

#[derive(Debug, Deserialize)]
struct WebResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    description: String,
}

impl BraveSearchTool {
    pub fn new(api_key: impl Into<String>, endpoint: Option<&str>, count: u32, timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_key: api_key.into(),
            endpoint: endpoint.unwrap_or(BRAVE_ENDPOINT).to_string(),
            default_count: count.clamp(1, 20),
        }
    }

    async fn search(&self, query: &str, count: u32) -> Result<String, String> {
        let url = Url::parse_with_params(
            &self.endpoint,
            &[("q", query.to_string()), ("count", count.to_string())],
        )
        .map_err(|e| format!("Invalid endpoint: {e}"))?;

        let resp = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .header("X-Subscription-Token", &self.api_key)
            .send()
            .await
            .map_err(|e| format!("Request failed: {e}"))?;
        if !resp.status().is_success() {
            return Err(format!("HTTP {}", resp.status()));
        }
        let body: SearchResponse = resp
            .json()
            .await
            .map_err(|e| format!("Malformed search response: {e}"))?;
        Ok(format_results(query, body))
    }
}

fn format_results(query: &str, body: SearchResponse) -> String {
    let results = body.web.map(|w| w.results).unwrap_or_default();
    if results.is_empty() {
        return format!("No web results for \"{query}\"");
    }
    results
        .iter()
        .enumerate()
        .map(|(i, r)| {
            format!(
                "{}. {}\n   {}\n   {}",
                i + 1,
                strip_html_tags(&r.title),
                r.url,
                strip_html_tags(&r.description)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl Tool for BraveSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web (Brave Search) and return titles, URLs and snippets. Args: {\"query\": \"...\", \"count\": 5}"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Search query" },
                "count": { "type": "integer", "minimum": 1, "maximum": 20 }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let query = args
            .get("query")
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or("");
        if query.is_empty() {
            return Err("Missing query".to_string());
        }
        let count = args
            .get("count")
            .and_then(Value::as_u64)
            .map(|c| c.clamp(1, 20) as u32)
            .unwrap_or(self.default_count);
        tracing::info!(query = %query, count, "web_search");
        self.search(query, count).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_results_strips_markup() {
        let body: SearchResponse = serde_json::from_value(serde_json::json!({
            "web": { "results": [
                { "title": "Denim <strong>trends</strong>", "url": "https://a.example", "description": "Young <strong>adults</strong> love it" }
            ]}
        }))
        .unwrap();
        let text = format_results("denim", body);
        assert!(text.starts_with("1. Denim trends"));
        assert!(text.contains("https://a.example"));
        assert!(text.contains("Young adults love it"));
    }

    #[test]
    fn test_format_results_empty() {
        let body: SearchResponse = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(format_results("x", body), "No web results for \"x\"");
    }

    #[tokio::test]
    async fn test_missing_query_rejected() {
        let tool = BraveSearchTool::new("key", None, 5, 5);
        let err = tool.execute(serde_json::json!({"query": "  "})).await.unwrap_err();
        assert_eq!(err, "Missing query");
    }
}
