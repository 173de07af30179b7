//! 消息格式化 - 把缓冲片段整理成分析输入，生成观察者通知文本
//!
//! 每行 `[HH:MM] 发送者: 内容`。发送者展示名通过传输层查询，
//! 带进程级缓存；查不到或查询失败时回退到 ID 的用户部分，
//! 回退值同样缓存，避免反复无效查询。

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

use super::buffer::BufferedMessage;
use crate::transport::ChatTransport;

/// 历史格式化器
pub struct HistoryFormatter {
    transport: Arc<dyn ChatTransport>,
    /// contact_id -> 展示名缓存
    cache: Mutex<HashMap<String, String>>,
}

impl HistoryFormatter {
    /// 创建格式化器
    pub fn new(transport: Arc<dyn ChatTransport>) -> Self {
        Self {
            transport,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// 把缓冲快照格式化为多行文本
    pub async fn format_history(&self, messages: &[BufferedMessage]) -> String {
        let mut lines = Vec::with_capacity(messages.len());
        for msg in messages {
            let time = msg.sent_at.format("%H:%M");
            let sender = self.display_name(&msg.sender_id).await;
            lines.push(format!("[{}] {}: {}", time, sender, msg.text));
        }
        lines.join("\n")
    }

    /// 解析发送者展示名，结果进缓存
    async fn display_name(&self, contact_id: &str) -> String {
        {
            let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(name) = cache.get(contact_id) {
                return name.clone();
            }
        }

        // 回退值：ID 的用户部分（如 447927612815@c.us -> 447927612815）
        let fallback = contact_id
            .split('@')
            .next()
            .unwrap_or(contact_id)
            .to_string();

        let resolved = match self.transport.contact_name(contact_id).await {
            Ok(Some(name)) => name,
            Ok(None) => fallback,
            Err(e) => {
                debug!(contact = %contact_id, error = %e, "Could not resolve contact name");
                fallback
            }
        };

        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.insert(contact_id.to_string(), resolved.clone());
        resolved
    }
}

/// 生成发给观察者的通知文本
pub fn notification_text(chat_name: &str, topic: &str, summary: &str) -> String {
    format!(
        "🔥 Hey! The '{}' group is talking about '{}' right now. You might want to chime in!\n\n📝 Quick summary:\n{}",
        chat_name, topic, summary
    )
}
