//! web_fetch 工具：抓取单个 URL 的可读文本
//!
//! 仅允许白名单域名（含子域名）；HTML 响应用 html2text 提取正文，失败时退回简易去标签；
//! 超过 max_result_chars 时截断并追加 ...[truncated]。白名单为空即全部拒绝；回环、内网与链路本地地址
//! 即使出现在白名单中也拒绝。

use std::collections::HashSet;
use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde_json::Value;

use crate::tools::Tool;

/// 简易去除 HTML 标签并压缩空白
pub(crate) fn strip_html_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                out.push(' ');
            }
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn looks_like_html(body: &str, content_type: Option<&str>) -> bool {
    if content_type.is_some_and(|ct| ct.contains("text/html")) {
        return true;
    }
    let head = body.trim_start();
    head.starts_with("<!") || head.to_ascii_lowercase().starts_with("<html")
}

/// 回环、私有、链路本地、未指定地址及 localhost 视为内部主机
fn is_internal_host(host: &str) -> bool {
    if host == "localhost" || host.ends_with(".localhost") {
        return true;
    }
    match host.trim_start_matches('[').trim_end_matches(']').parse::<IpAddr>() {
        Ok(IpAddr::V4(ip)) => {
            ip.is_loopback() || ip.is_private() || ip.is_link_local() || ip.is_unspecified()
        }
        Ok(IpAddr::V6(ip)) => {
            let segment = ip.segments()[0];
            ip.is_loopback()
                || ip.is_unspecified()
                // fc00::/7 唯一本地、fe80::/10 链路本地
                || (segment & 0xfe00) == 0xfc00
                || (segment & 0xffc0) == 0xfe80
                || ip.to_ipv4_mapped().is_some_and(|v4| is_internal_host(&v4.to_string()))
        }
        Err(_) => false,
    }
}

/// URL 抓取工具
pub struct WebFetchTool {
    client: Client,
    allowed_domains: HashSet<String>,
    max_result_chars: usize,
}

impl WebFetchTool {
    pub fn new(allowed_domains: Vec<String>, timeout_secs: u64, max_result_chars: usize) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(concat!("react-agent/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self {
            client,
            allowed_domains: allowed_domains
                .into_iter()
                .map(|d| d.trim().to_lowercase())
                .filter(|d| !d.is_empty())
                .collect(),
            max_result_chars: max_result_chars.max(1),
        }
    }

    fn check_url(&self, raw: &str) -> Result<Url, String> {
        let url = Url::parse(raw).map_err(|e| format!("Invalid URL: {e}"))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(format!("Unsupported scheme: {}", url.scheme()));
        }
        let host = url
            .host_str()
            .ok_or_else(|| "URL has no host".to_string())?
            .to_lowercase();
        if is_internal_host(&host) {
            return Err(format!("Internal host not allowed: {host}"));
        }
        if self
            .allowed_domains
            .iter()
            .any(|d| host == *d || host.ends_with(&format!(".{d}")))
        {
            Ok(url)
        } else {
            Err(format!("Domain not in allowlist: {host}"))
        }
    }

    pub fn has_allowed_domains(&self) -> bool {
        !self.allowed_domains.is_empty()
    }

    fn truncate(&self, text: String) -> String {
        if text.chars().count() > self.max_result_chars {
            text.chars().take(self.max_result_chars).collect::<String>() + "\n...[truncated]"
        } else {
            text
        }
    }

    async fn fetch(&self, url: Url) -> Result<String, String> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| format!("Request failed: {e}"))?;
        if !resp.status().is_success() {
            return Err(format!("HTTP {}", resp.status()));
        }
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = resp.text().await.map_err(|e| format!("Read body: {e}"))?;
        let body = body.trim_start_matches('\u{FEFF}');

        let text = if looks_like_html(body, content_type.as_deref()) {
            match html2text::from_read(body.as_bytes(), 120) {
                Ok(t) if !t.trim().is_empty() => t,
                _ => strip_html_tags(body),
            }
        } else {
            body.to_string()
        };
        Ok(self.truncate(text))
    }
}

#[async_trait]
impl Tool for WebFetchTool {
    fn name(&self) -> &str {
        "web_fetch"
    }

    fn description(&self) -> &str {
        "Fetch a web page and return its readable text. Args: {\"url\": \"https://...\"}"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": { "type": "string", "description": "Absolute http(s) URL" }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let raw = args.get("url").and_then(Value::as_str).unwrap_or("").trim();
        if raw.is_empty() {
            return Err("Missing url".to_string());
        }
        let url = self.check_url(raw)?;
        tracing::info!(url = %url, "web_fetch");
        self.fetch(url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_html_tags() {
        assert_eq!(
            strip_html_tags("<p>Hello <b>denim</b>\n\n world</p>"),
            "Hello denim world"
        );
    }

    #[test]
    fn test_allowlist_matches_subdomains() {
        let tool = WebFetchTool::new(vec!["wikipedia.org".into()], 5, 100);
        assert!(tool.check_url("https://en.wikipedia.org/wiki/Denim").is_ok());
        assert!(tool.check_url("https://wikipedia.org/").is_ok());
        assert!(tool.check_url("https://evilwikipedia.org/").is_err());
        assert!(tool.check_url("ftp://wikipedia.org/").is_err());
    }

    #[test]
    fn test_empty_allowlist_denies_all() {
        let tool = WebFetchTool::new(vec![], 5, 100);
        assert!(!tool.has_allowed_domains());
        assert!(tool.check_url("https://example.com/a").is_err());
    }

    #[test]
    fn test_internal_hosts_rejected() {
        let tool = WebFetchTool::new(
            vec!["localhost".into(), "169.254.169.254".into(), "10.0.0.8".into()],
            5,
            100,
        );
        for url in [
            "http://169.254.169.254/latest/meta-data/",
            "http://localhost:8080/admin",
            "http://127.0.0.1/",
            "http://10.0.0.8/",
            "http://[::1]/",
            "http://[fd00::1]/",
        ] {
            assert!(tool.check_url(url).is_err(), "{url} should be rejected");
        }
    }

    #[test]
    fn test_default_domains_exclude_metadata_endpoint() {
        let tool = WebFetchTool::new(crate::config::FetchSection::default().allowed_domains, 5, 100);
        assert!(tool.has_allowed_domains());
        assert!(tool.check_url("https://en.wikipedia.org/wiki/Denim").is_ok());
        assert!(tool.check_url("http://169.254.169.254/latest/meta-data/").is_err());
        assert!(tool.check_url("http://localhost:8080/admin").is_err());
    }

    #[test]
    fn test_truncate() {
        let tool = WebFetchTool::new(vec![], 5, 3);
        assert_eq!(tool.truncate("abcdef".into()), "abc\n...[truncated]");
        assert_eq!(tool.truncate("ab".into()), "ab");
    }

    #[test]
    fn test_looks_like_html() {
        assert!(looks_like_html("<!DOCTYPE html>", None));
        assert!(looks_like_html("plain", Some("text/html; charset=utf-8")));
        assert!(!looks_like_html("{\"a\":1}", Some("application/json")));
    }
}
