//! 相关性分析 - 判断群聊片段是否命中观察者兴趣
//!
//! 模型被要求只返回 JSON：`{"is_relevant": bool, "topic": "...", "summary": "..."}`。
//! 解析失败一律降级为 `NotRelevant` 而不是报错：漏掉一条通知比崩溃循环的代价小。
//! API 调用本身失败（网络、超时、限流）则向上返回错误，由调用方按瞬时错误处理。

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::ai::client::GeminiClient;

/// 相关性分析结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelevanceResult {
    /// 对话命中兴趣
    Relevant {
        /// 话题标签（用于冷却去重，精确字符串匹配）
        topic: String,
        /// 一句话摘要
        summary: String,
    },
    /// 与兴趣无关
    NotRelevant,
}

/// 相关性分析能力
#[async_trait]
pub trait RelevanceClassifier: Send + Sync {
    /// 分析格式化后的聊天片段是否命中兴趣列表
    async fn analyze(&self, history: &str, interests: &[String]) -> Result<RelevanceResult>;
}

/// 聊天摘要能力（`!summary` 命令使用）
#[async_trait]
pub trait ChatSummarizer: Send + Sync {
    /// 生成聊天片段的摘要
    async fn summarize(&self, history: &str) -> Result<String>;
}

/// 基于 Gemini 的相关性分析实现
pub struct GeminiClassifier {
    client: GeminiClient,
}

impl GeminiClassifier {
    /// 创建新的分析器
    pub fn new(client: GeminiClient) -> Self {
        Self { client }
    }

    /// 从自动加载的配置创建
    pub fn from_config() -> Result<Self> {
        Ok(Self::new(GeminiClient::from_config()?))
    }

    fn build_prompt(history: &str, interests: &[String]) -> String {
        format!(
            r#"You are monitoring a group chat on behalf of a user. Decide whether the
recent conversation below touches any of the user's interests.

The user's interests are: {interests}

Return ONLY a JSON object, no other text:
{{
  "is_relevant": true | false,
  "topic": "short topic label, e.g. startups",
  "summary": "2-3 sentence summary of what is being discussed"
}}

Rules:
- is_relevant is true only if the conversation substantively discusses one of
  the interests, not a passing mention.
- topic must be a single stable label so repeated discussions of the same
  subject produce the same topic string.
- When is_relevant is false, topic and summary may be empty strings.

The conversation is:

{history}"#,
            interests = interests.join(", "),
            history = history
        )
    }

    /// 生成聊天摘要（`!summary` 命令使用）
    pub async fn generate_summary(&self, history: &str) -> Result<String> {
        let prompt = format!(
            r#"You are a concise groupchat message summarizer. You will be given a collection
of text messages from a group chat.

You will return the key highlights in simple, clear, concise and high-entropy
language. You will not include any other text or commentary.

If nothing meaningful was discussed, return "Nothing massive was discussed in the given time period."

The conversation is:

{history}"#
        );

        debug!("Generating chat summary");
        self.client.complete(&prompt, None).await
    }
}

#[async_trait]
impl ChatSummarizer for GeminiClassifier {
    async fn summarize(&self, history: &str) -> Result<String> {
        self.generate_summary(history).await
    }
}

#[async_trait]
impl RelevanceClassifier for GeminiClassifier {
    async fn analyze(&self, history: &str, interests: &[String]) -> Result<RelevanceResult> {
        let system = "You are a relevance filter for group chat monitoring. \
                      Return only JSON, no other content.";
        let prompt = Self::build_prompt(history, interests);

        let start = std::time::Instant::now();
        let response = self.client.complete(&prompt, Some(system)).await?;
        debug!(
            elapsed_ms = start.elapsed().as_millis(),
            "Relevance analysis completed"
        );

        Ok(parse_relevance_response(&response))
    }
}

/// 解析模型回复，任何不完整或畸形的输出都按不相关处理
pub(crate) fn parse_relevance_response(response: &str) -> RelevanceResult {
    let json_str = match extract_json_from_output(response) {
        Some(s) => s,
        None => {
            warn!(response = %response, "No JSON found in relevance response, treating as not relevant");
            return RelevanceResult::NotRelevant;
        }
    };

    let parsed: serde_json::Value = match serde_json::from_str(&json_str) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, json = %json_str, "Failed to parse relevance JSON, treating as not relevant");
            return RelevanceResult::NotRelevant;
        }
    };

    let is_relevant = parsed
        .get("is_relevant")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    if !is_relevant {
        return RelevanceResult::NotRelevant;
    }

    let topic = parsed
        .get("topic")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .trim()
        .to_string();
    let summary = parsed
        .get("summary")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .trim()
        .to_string();

    // 模型声称相关但没给出话题或摘要，没有可用的通知内容
    if topic.is_empty() || summary.is_empty() {
        warn!("Relevance response marked relevant but missing topic or summary");
        return RelevanceResult::NotRelevant;
    }

    RelevanceResult::Relevant { topic, summary }
}

/// 从输出中提取 JSON 字符串
fn extract_json_from_output(output: &str) -> Option<String> {
    let start = output.find('{')?;
    let end = output.rfind('}')?;
    if end > start {
        Some(output[start..=end].to_string())
    } else {
        None
    }
}
