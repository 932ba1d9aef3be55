//! Gemini Provider
//!
//! 直接调用 Google Generative Language REST 接口（`models/{model}:generateContent`），
//! system 段走 systemInstruction，json_mode 时要求 `application/json` 输出。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::llm::{PromptSpec, Provider, ProviderError};

pub const GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Gemini Provider：持有 HTTP Client、API Key 与端点
pub struct GeminiProvider {
    client: Client,
    api_key: String,
    endpoint: String,
    default_temperature: f32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    candidates: Option<Vec<Candidate>>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
    code: Option<u16>,
}

impl GeminiProvider {
    pub fn new(
        api_key: impl Into<String>,
        endpoint: Option<&str>,
        timeout_secs: u64,
        default_temperature: f32,
    ) -> Result<Self, ProviderError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(ProviderError::MissingCredentials("gemini".to_string()));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ProviderError::Http(e.to_string()))?;
        Ok(Self {
            client,
            api_key,
            endpoint: endpoint
                .unwrap_or(GEMINI_ENDPOINT)
                .trim_end_matches('/')
                .to_string(),
            default_temperature,
        })
    }

    fn url(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, model)
    }

    fn build_request(&self, prompt: &PromptSpec) -> GenerateRequest {
        GenerateRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: prompt.user.clone(),
                }],
            }],
            system_instruction: (!prompt.system.is_empty()).then(|| Content {
                role: None,
                parts: vec![Part {
                    text: prompt.system.clone(),
                }],
            }),
            generation_config: GenerationConfig {
                temperature: prompt.temperature.unwrap_or(self.default_temperature),
                response_mime_type: prompt.json_mode.then(|| "application/json".to_string()),
            },
        }
    }
}

/// 解析 Retry-After 头（秒数形式；HTTP 日期形式忽略）
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// 从响应体取出首个候选的全部文本段
fn extract_text(body: &str) -> Result<String, ProviderError> {
    let parsed: GenerateResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;

    if let Some(err) = parsed.error {
        return Err(match err.code {
            Some(code) => ProviderError::from_status("gemini", code, err.message),
            None => ProviderError::MalformedResponse(err.message),
        });
    }

    let text: String = parsed
        .candidates
        .and_then(|c| c.into_iter().next())
        .and_then(|c| c.content)
        .map(|c| c.parts.into_iter().map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(ProviderError::MalformedResponse(
            "no content in Gemini response".to_string(),
        ));
    }
    Ok(text)
}

#[async_trait]
impl Provider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn complete(&self, prompt: &PromptSpec, model: &str) -> Result<String, ProviderError> {
        let body = self.build_request(prompt);
        let resp = self
            .client
            .post(self.url(model))
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Http(e.to_string()))?;

        let status = resp.status();
        let delay = retry_after(resp.headers());
        let text = resp
            .text()
            .await
            .map_err(|e| ProviderError::Http(e.to_string()))?;
        if !status.is_success() {
            return Err(
                ProviderError::from_status("gemini", status.as_u16(), text).with_retry_after(delay),
            );
        }
        extract_text(&text)
    }
}
