//! 存储处理器 - 把监控群聊的消息写入历史存储
//!
//! 只持久化白名单内群聊的消息，私聊和未监控群聊跳过。
//! 历史供 `!summary` 等旁路功能查询，通知引擎不读它。

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use super::MessageProcessor;
use crate::store::{MessageStore, StoredMessage};
use crate::transport::InboundMessage;

/// 消息持久化处理器
pub struct StoreProcessor {
    store: Arc<dyn MessageStore>,
    monitored: HashSet<String>,
}

impl StoreProcessor {
    /// 创建处理器，`monitored` 为监控的会话 ID 集合
    pub fn new(store: Arc<dyn MessageStore>, monitored: HashSet<String>) -> Self {
        Self { store, monitored }
    }
}

#[async_trait]
impl MessageProcessor for StoreProcessor {
    fn name(&self) -> &str {
        "store"
    }

    async fn process(&self, message: &InboundMessage) -> Result<()> {
        if !self.monitored.contains(&message.conversation_id) {
            return Ok(());
        }

        self.store.append(StoredMessage::from(message)).await?;
        debug!(conversation = %message.conversation_id, "Message persisted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use std::sync::Mutex;

    struct RecordingStore {
        records: Mutex<Vec<StoredMessage>>,
    }

    #[async_trait]
    impl MessageStore for RecordingStore {
        async fn append(&self, record: StoredMessage) -> Result<()> {
            self.records.lock().unwrap().push(record);
            Ok(())
        }

        async fn messages_since(
            &self,
            conversation_id: &str,
            since: DateTime<Utc>,
        ) -> Result<Vec<StoredMessage>> {
            Ok(self
                .records
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.conversation_id == conversation_id && r.sent_at >= since)
                .cloned()
                .collect())
        }
    }

    fn message(conversation_id: &str) -> InboundMessage {
        InboundMessage {
            conversation_id: conversation_id.to_string(),
            sender_id: "1@c.us".to_string(),
            text: "hello".to_string(),
            sent_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_monitored_chat_is_persisted() {
        let store = Arc::new(RecordingStore {
            records: Mutex::new(Vec::new()),
        });
        let monitored: HashSet<String> = ["123@g.us".to_string()].into_iter().collect();
        let processor = StoreProcessor::new(Arc::clone(&store) as Arc<dyn MessageStore>, monitored);

        processor.process(&message("123@g.us")).await.unwrap();

        assert_eq!(store.records.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unmonitored_chat_is_skipped() {
        let store = Arc::new(RecordingStore {
            records: Mutex::new(Vec::new()),
        });
        let monitored: HashSet<String> = ["123@g.us".to_string()].into_iter().collect();
        let processor = StoreProcessor::new(Arc::clone(&store) as Arc<dyn MessageStore>, monitored);

        processor.process(&message("999@g.us")).await.unwrap();
        processor.process(&message("55@c.us")).await.unwrap();

        assert!(store.records.lock().unwrap().is_empty());
    }
}
