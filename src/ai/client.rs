//! Gemini API 客户端
//!
//! 用于相关性分析和聊天摘要，使用 Flash 模型以获得低延迟。
//!
//! API Key 读取优先级：
//! 1. 配置文件 `~/.config/group-chat-monitor/config.json`（字段 `gemini_api_key`，可选 `gemini_model`）
//! 2. 环境变量 `GEMINI_API_KEY`
//! 3. 文件 `~/.config/group-chat-monitor/gemini_key`

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;
use tracing::{debug, warn};

/// Gemini API 基础 URL
pub const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// 默认模型 - Flash（快、便宜，够用）
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// 默认超时（毫秒）
pub const DEFAULT_TIMEOUT_MS: u64 = 30000;

/// 默认最大输出 tokens
pub const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Gemini 客户端配置
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    /// API 密钥
    pub api_key: String,
    /// API 基础 URL（支持代理）
    pub base_url: String,
    /// 模型名称
    pub model: String,
    /// 请求超时（毫秒）
    pub timeout_ms: u64,
    /// 最大输出 tokens
    pub max_tokens: u32,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: GEMINI_API_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

impl GeminiConfig {
    /// 从环境和配置文件自动加载配置
    pub fn auto_load() -> Result<Self> {
        let (api_key, model) = Self::load_api_config()?;
        Ok(Self {
            api_key,
            model,
            ..Self::default()
        })
    }

    /// 按优先级尝试多个来源加载 API key 和模型名
    fn load_api_config() -> Result<(String, String)> {
        let default_model = DEFAULT_MODEL.to_string();

        // 1. 配置文件 ~/.config/group-chat-monitor/config.json
        if let Some(home) = dirs::home_dir() {
            let config_path = home.join(".config/group-chat-monitor/config.json");
            if config_path.exists() {
                if let Ok(content) = fs::read_to_string(&config_path) {
                    if let Ok(config) = serde_json::from_str::<serde_json::Value>(&content) {
                        let key = config.get("gemini_api_key").and_then(|k| k.as_str());
                        let model = config.get("gemini_model").and_then(|m| m.as_str());

                        if let Some(key) = key {
                            if !key.is_empty() {
                                let model = model
                                    .filter(|m| !m.is_empty())
                                    .map(|m| m.to_string())
                                    .unwrap_or_else(|| default_model.clone());
                                debug!("Using Gemini API key from config.json, model: {}", model);
                                return Ok((key.to_string(), model));
                            }
                        }
                    }
                }
            }
        }

        // 2. 环境变量
        if let Ok(key) = std::env::var("GEMINI_API_KEY") {
            if !key.is_empty() {
                debug!("Using GEMINI_API_KEY from environment");
                return Ok((key, default_model));
            }
        }

        // 3. key 文件
        if let Some(home) = dirs::home_dir() {
            let key_file = home.join(".config/group-chat-monitor/gemini_key");
            if key_file.exists() {
                if let Ok(key) = fs::read_to_string(&key_file) {
                    let key = key.trim().to_string();
                    if !key.is_empty() {
                        debug!("Using Gemini API key from gemini_key file");
                        return Ok((key, default_model));
                    }
                }
            }
        }

        Err(anyhow!(
            "No Gemini API key found. Add gemini_api_key to \
             ~/.config/group-chat-monitor/config.json, set GEMINI_API_KEY env var, \
             or create ~/.config/group-chat-monitor/gemini_key"
        ))
    }
}

/// generateContent 请求体
#[derive(Serialize)]
pub(crate) struct GenerateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    pub contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    pub generation_config: GenerationConfig,
}

/// 内容块
#[derive(Serialize, Deserialize)]
pub(crate) struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub parts: Vec<Part>,
}

/// 文本片段
#[derive(Serialize, Deserialize)]
pub(crate) struct Part {
    pub text: String,
}

/// 生成参数
#[derive(Serialize)]
pub(crate) struct GenerationConfig {
    #[serde(rename = "maxOutputTokens")]
    pub max_output_tokens: u32,
}

/// generateContent 响应体
#[derive(Deserialize)]
pub(crate) struct GenerateResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

/// 候选回复
#[derive(Deserialize)]
pub(crate) struct Candidate {
    pub content: Content,
}

/// API 错误响应
#[derive(Deserialize)]
pub(crate) struct ErrorResponse {
    pub error: ApiError,
}

#[derive(Deserialize)]
pub(crate) struct ApiError {
    pub message: String,
}

/// Gemini API 客户端
pub struct GeminiClient {
    client: reqwest::Client,
    pub(crate) config: GeminiConfig,
}

impl GeminiClient {
    /// 创建新客户端
    pub fn new(config: GeminiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| anyhow!("Cannot create HTTP client: {}", e))?;

        Ok(Self { client, config })
    }

    /// 从自动加载的配置创建客户端
    pub fn from_config() -> Result<Self> {
        let config = GeminiConfig::auto_load()?;
        Self::new(config)
    }

    /// 发送 prompt 并获取文本回复
    pub async fn complete(&self, prompt: &str, system: Option<&str>) -> Result<String> {
        let request = GenerateRequest {
            system_instruction: system.map(|s| Content {
                role: None,
                parts: vec![Part {
                    text: s.to_string(),
                }],
            }),
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                max_output_tokens: self.config.max_tokens,
            },
        };

        let url = format!(
            "{}/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        );

        debug!(
            model = %self.config.model,
            prompt_len = prompt.len(),
            timeout_ms = self.config.timeout_ms,
            "Sending request to Gemini API"
        );

        let start = std::time::Instant::now();
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.config.api_key)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                let elapsed = start.elapsed();
                anyhow!("API request failed after {}ms: {}", elapsed.as_millis(), e)
            })?;

        debug!(elapsed_ms = start.elapsed().as_millis(), "API request completed");

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| anyhow!("Failed to read response: {}", e))?;

        if !status.is_success() {
            // 尝试解析错误响应
            if let Ok(error_resp) = serde_json::from_str::<ErrorResponse>(&body) {
                return Err(anyhow!("API error ({}): {}", status, error_resp.error.message));
            }
            return Err(anyhow!("API error ({}): {}", status, body));
        }

        let response: GenerateResponse = serde_json::from_str(&body)
            .map_err(|e| anyhow!("Failed to parse response: {} - body: {}", e, body))?;

        // 拼接首个候选的全部文本片段
        let text = response
            .candidates
            .first()
            .map(|c| {
                c.content
                    .parts
                    .iter()
                    .map(|p| p.text.as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.is_empty() {
            warn!("Empty response from Gemini API");
        }

        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = GeminiConfig::default();
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.timeout_ms, DEFAULT_TIMEOUT_MS);
        assert_eq!(config.max_tokens, DEFAULT_MAX_TOKENS);
        assert_eq!(config.base_url, GEMINI_API_URL);
    }

    #[test]
    fn test_request_serialization_shape() {
        let request = GenerateRequest {
            system_instruction: Some(Content {
                role: None,
                parts: vec![Part {
                    text: "system".to_string(),
                }],
            }),
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: "hello".to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                max_output_tokens: 256,
            },
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(json["contents"][0]["parts"][0]["text"], "hello");
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 256);
    }

    #[test]
    fn test_response_text_extraction() {
        let body = r#"{
            "candidates": [
                {"content": {"role": "model", "parts": [{"text": "part1 "}, {"text": "part2"}]}}
            ]
        }"#;
        let parsed: GenerateResponse = serde_json::from_str(body).unwrap();
        let text = parsed
            .candidates
            .first()
            .map(|c| {
                c.content
                    .parts
                    .iter()
                    .map(|p| p.text.as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();
        assert_eq!(text, "part1 part2");
    }
}
