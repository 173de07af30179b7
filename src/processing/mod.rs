//! 消息处理层 - 把入站消息分发给所有注册的处理器
//!
//! 每条消息所有处理器都会看到；单个处理器失败只记日志，
//! 不影响其他处理器，也不向摄入路径传播。

pub mod ping;
pub mod store;
pub mod summary;

pub use ping::PingProcessor;
pub use store::StoreProcessor;
pub use summary::SummaryProcessor;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::transport::InboundMessage;

/// 消息处理器
#[async_trait]
pub trait MessageProcessor: Send + Sync {
    /// 处理器名称（用于日志）
    fn name(&self) -> &str;

    /// 处理一条入站消息
    async fn process(&self, message: &InboundMessage) -> Result<()>;
}

/// 消息路由器
pub struct MessageRouter {
    processors: Vec<Arc<dyn MessageProcessor>>,
}

impl MessageRouter {
    /// 创建路由器
    pub fn new(processors: Vec<Arc<dyn MessageProcessor>>) -> Self {
        info!(
            count = processors.len(),
            names = %processors
                .iter()
                .map(|p| p.name())
                .collect::<Vec<_>>()
                .join(", "),
            "Message router initialized"
        );
        Self { processors }
    }

    /// 把消息交给所有处理器，失败互相隔离
    pub async fn handle(&self, message: &InboundMessage) {
        debug!(
            conversation = %message.conversation_id,
            sender = %message.sender_id,
            "Routing inbound message"
        );

        for processor in &self.processors {
            if let Err(e) = processor.process(message).await {
                warn!(
                    processor = processor.name(),
                    error = %e,
                    "Processor failed, continuing with others"
                );
            }
        }
    }

    /// 已注册的处理器数量
    pub fn processor_count(&self) -> usize {
        self.processors.len()
    }
}
