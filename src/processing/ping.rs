//! Ping 处理器 - `!ping` 存活检查

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use super::MessageProcessor;
use crate::transport::{ChatTransport, InboundMessage};

/// 回复 `!ping` 的存活检查处理器
pub struct PingProcessor {
    transport: Arc<dyn ChatTransport>,
}

impl PingProcessor {
    /// 创建处理器
    pub fn new(transport: Arc<dyn ChatTransport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl MessageProcessor for PingProcessor {
    fn name(&self) -> &str {
        "ping"
    }

    async fn process(&self, message: &InboundMessage) -> Result<()> {
        if message.text.trim() != "!ping" {
            return Ok(());
        }

        debug!(conversation = %message.conversation_id, "Replying to ping");
        self.transport
            .send(&message.conversation_id, "pong")
            .await
    }
}
