//! 聊天传输层 - 与聊天网络交互的抽象及 Gateway 实现
//!
//! 引擎不直接连接聊天网络，所有收发都经过 `ChatTransport` trait。
//! 生产实现 `GatewayTransport` 通过 HTTP 调用桥接网关：
//! - `POST /send` 发送消息
//! - `GET /contacts/{id}` 查询联系人展示名
//! - `GET /chats/{id}/members/{contact}` 群成员检查
//! - `GET /messages?after=<cursor>` 游标式拉取新消息

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::GatewayConfig;

/// 入站消息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// 会话 ID（群聊或私聊）
    pub conversation_id: String,
    /// 发送者 ID
    pub sender_id: String,
    /// 消息文本
    pub text: String,
    /// 发送时间
    pub sent_at: DateTime<Utc>,
}

impl InboundMessage {
    /// 是否来自群聊（WhatsApp 约定群聊 ID 以 `@g.us` 结尾）
    pub fn is_group(&self) -> bool {
        self.conversation_id.ends_with("@g.us")
    }

    /// 是否来自私聊
    pub fn is_direct(&self) -> bool {
        self.conversation_id.ends_with("@c.us")
    }
}

/// 聊天传输能力
///
/// 所有方法的失败都视为瞬时错误，调用方按"下次触发重试"策略处理，
/// 不区分断连、拒绝、限流等具体原因。
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// 发送消息给指定联系人或会话
    async fn send(&self, recipient_id: &str, text: &str) -> Result<()>;

    /// 查询联系人展示名，查不到时返回 None
    async fn contact_name(&self, contact_id: &str) -> Result<Option<String>>;

    /// 检查联系人是否为指定群聊的成员
    async fn is_member(&self, contact_id: &str, conversation_id: &str) -> Result<bool>;
}

/// 发送请求载荷
#[derive(Debug, Serialize)]
struct SendPayload<'a> {
    to: &'a str,
    text: &'a str,
}

/// 网关响应外层
#[derive(Debug, Deserialize)]
struct GatewayResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

/// 联系人查询响应
#[derive(Debug, Deserialize)]
struct ContactResponse {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    pushname: Option<String>,
}

/// 群成员检查响应
#[derive(Debug, Deserialize)]
struct MemberResponse {
    member: bool,
}

/// 拉取消息响应
#[derive(Debug, Deserialize)]
struct PollResponse {
    messages: Vec<InboundMessage>,
    #[serde(default)]
    cursor: Option<String>,
}

/// 拉取结果 - 新消息及下次拉取用的游标
#[derive(Debug)]
pub struct PolledMessages {
    pub messages: Vec<InboundMessage>,
    pub cursor: Option<String>,
}

/// Gateway 传输实现
pub struct GatewayTransport {
    client: Client,
    config: GatewayConfig,
}

impl GatewayTransport {
    /// 创建新的传输实例
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| anyhow!("Cannot create HTTP client: {}", e))?;

        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.url.trim_end_matches('/'), path)
    }

    fn auth_header(&self) -> String {
        format!("Bearer {}", self.config.token)
    }

    /// 拉取游标之后的新消息
    pub async fn poll_messages(&self, after: Option<&str>) -> Result<PolledMessages> {
        let mut request = self.client.get(self.url("/messages"));
        if let Some(cursor) = after {
            request = request.query(&[("after", cursor)]);
        }

        let response = request
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map_err(|e| anyhow!("Gateway poll failed: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("Gateway poll failed with status {}", status));
        }

        let parsed: PollResponse = response
            .json()
            .await
            .map_err(|e| anyhow!("Failed to parse poll response: {}", e))?;

        debug!(count = parsed.messages.len(), "Polled messages from gateway");
        Ok(PolledMessages {
            messages: parsed.messages,
            cursor: parsed.cursor,
        })
    }

    /// 检查网关可达性，用于 `gcm check`
    pub async fn ping(&self) -> Result<()> {
        let response = self
            .client
            .get(self.url("/health"))
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map_err(|e| anyhow!("Gateway unreachable: {}", e))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(anyhow!("Gateway health check failed: {}", response.status()))
        }
    }

    /// 检查指定会话在网关侧是否存在
    pub async fn chat_exists(&self, conversation_id: &str) -> Result<bool> {
        let response = self
            .client
            .get(self.url(&format!("/chats/{}", conversation_id)))
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map_err(|e| anyhow!("Gateway chat lookup failed: {}", e))?;

        Ok(response.status().is_success())
    }
}

#[async_trait]
impl ChatTransport for GatewayTransport {
    async fn send(&self, recipient_id: &str, text: &str) -> Result<()> {
        let payload = SendPayload {
            to: recipient_id,
            text,
        };

        let response = self
            .client
            .post(self.url("/send"))
            .header("Authorization", self.auth_header())
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| anyhow!("Gateway send failed: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("Gateway send failed with status {}", status));
        }

        let parsed: GatewayResponse = response
            .json()
            .await
            .map_err(|e| anyhow!("Failed to parse send response: {}", e))?;

        if parsed.ok {
            debug!(recipient = %recipient_id, "Message sent via gateway");
            Ok(())
        } else {
            Err(anyhow!(
                "Gateway rejected send: {}",
                parsed.error.unwrap_or_else(|| "unknown error".to_string())
            ))
        }
    }

    async fn contact_name(&self, contact_id: &str) -> Result<Option<String>> {
        let response = self
            .client
            .get(self.url(&format!("/contacts/{}", contact_id)))
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map_err(|e| anyhow!("Gateway contact lookup failed: {}", e))?;

        if !response.status().is_success() {
            // 联系人不存在不算错误，按查不到处理
            warn!(contact = %contact_id, status = %response.status(), "Contact lookup returned non-success");
            return Ok(None);
        }

        let parsed: ContactResponse = response
            .json()
            .await
            .map_err(|e| anyhow!("Failed to parse contact response: {}", e))?;

        // 优先通讯录名称，其次对方自报的 pushname
        Ok(parsed.name.filter(|n| !n.is_empty()).or(parsed
            .pushname
            .filter(|n| !n.is_empty())))
    }

    async fn is_member(&self, contact_id: &str, conversation_id: &str) -> Result<bool> {
        let response = self
            .client
            .get(self.url(&format!(
                "/chats/{}/members/{}",
                conversation_id, contact_id
            )))
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map_err(|e| anyhow!("Gateway membership check failed: {}", e))?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "Gateway membership check failed with status {}",
                response.status()
            ));
        }

        let parsed: MemberResponse = response
            .json()
            .await
            .map_err(|e| anyhow!("Failed to parse membership response: {}", e))?;

        Ok(parsed.member)
    }
}

/// Dry-run 包装 - 发送只打印不落地，查询照常透传
pub struct DryRunTransport {
    inner: Arc<dyn ChatTransport>,
}

impl DryRunTransport {
    /// 包装一个真实传输
    pub fn new(inner: Arc<dyn ChatTransport>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl ChatTransport for DryRunTransport {
    async fn send(&self, recipient_id: &str, text: &str) -> Result<()> {
        eprintln!("[DRY-RUN] Would send to {}:\n{}", recipient_id, text);
        Ok(())
    }

    async fn contact_name(&self, contact_id: &str) -> Result<Option<String>> {
        self.inner.contact_name(contact_id).await
    }

    async fn is_member(&self, contact_id: &str, conversation_id: &str) -> Result<bool> {
        self.inner.is_member(contact_id, conversation_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_message_kind() {
        let group = InboundMessage {
            conversation_id: "123@g.us".to_string(),
            sender_id: "1@c.us".to_string(),
            text: "hello".to_string(),
            sent_at: Utc::now(),
        };
        assert!(group.is_group());
        assert!(!group.is_direct());

        let dm = InboundMessage {
            conversation_id: "1@c.us".to_string(),
            sender_id: "1@c.us".to_string(),
            text: "hello".to_string(),
            sent_at: Utc::now(),
        };
        assert!(dm.is_direct());
        assert!(!dm.is_group());
    }

    #[test]
    fn test_gateway_url_joining() {
        let transport = GatewayTransport::new(GatewayConfig {
            url: "http://localhost:8090/".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(transport.url("/send"), "http://localhost:8090/send");
    }

    #[test]
    fn test_inbound_message_roundtrip() {
        let json = r#"{
            "conversation_id": "123@g.us",
            "sender_id": "44777@c.us",
            "text": "anyone going to the hackathon?",
            "sent_at": "2026-08-06T10:00:00Z"
        }"#;
        let msg: InboundMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.conversation_id, "123@g.us");
        assert_eq!(msg.text, "anyone going to the hackathon?");
    }
}
